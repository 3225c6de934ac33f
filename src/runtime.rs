//! Miscellaneous types representing runtime state.

use alloc::rc::Rc;
use alloc::vec::Vec;

use core::cell::{Ref, RefCell};
use core::ops::Deref;
use core::{fmt, mem};

use checked_float::{FloatChecker, CheckedFloat};
use compact_str::CompactString;
use educe::Educe;
use rand::RngCore;

#[cfg(feature = "serde")]
use serde::{Serialize, Deserialize};

use crate::parser::ParseError;
use crate::vecmap::VecMap;

/// Error type used by [`NumberChecker`].
#[derive(Debug)]
pub enum NumberError {
    Nan,
    Infinity,
}

/// [`FloatChecker`] type used for validating a [`Number`].
pub struct NumberChecker;
impl FloatChecker<f64> for NumberChecker {
    type Error = NumberError;
    fn check(value: f64) -> Result<f64, Self::Error> {
        if value.is_nan() { return Err(NumberError::Nan); }
        if value.is_infinite() { return Err(NumberError::Infinity); }
        Ok(if value.to_bits() == 0x8000000000000000 { 0.0 } else { value }) // negative zero prints as "-0", which flowcharts never expect
    }
}

/// The type used to represent numbers in the runtime.
pub type Number = CheckedFloat<f64, NumberChecker>;

/// Parses a string into a number just as the runtime would do natively (e.g., for input answers).
pub fn parse_number(s: &str) -> Option<Number> {
    let s = s.trim();
    let parsed = match s.get(..2) {
        Some("0x" | "0X") => i64::from_str_radix(&s[2..], 16).ok().map(|x| x as f64),
        Some("0o" | "0O") => i64::from_str_radix(&s[2..], 8).ok().map(|x| x as f64),
        Some("0b" | "0B") => i64::from_str_radix(&s[2..], 2).ok().map(|x| x as f64),
        _ => s.parse::<f64>().ok(),
    };
    parsed.and_then(|x| Number::new(x).ok())
}
/// Stringifies a number just as the runtime would do natively.
pub fn stringify_number(v: Number) -> CompactString {
    debug_assert!(v.get().is_finite());
    let mut buf = ryu::Buffer::new();
    let res = buf.format_finite(v.get());
    CompactString::new(res.strip_suffix(".0").unwrap_or(res))
}

#[test]
fn test_number_to_string() {
    assert_eq!(stringify_number(Number::new(0.0).unwrap()), "0");
    assert_eq!(stringify_number(Number::new(-0.0).unwrap()), "0");
    assert_eq!(stringify_number(Number::new(1.0).unwrap()), "1");
    assert_eq!(stringify_number(Number::new(7.0).unwrap()), "7");
    assert_eq!(stringify_number(Number::new(-1.0).unwrap()), "-1");
    assert_eq!(stringify_number(Number::new(-13.0).unwrap()), "-13");
    assert_eq!(stringify_number(Number::new(2.5).unwrap()), "2.5");
    assert_eq!(stringify_number(Number::new(123456789.0).unwrap()), "123456789");
    assert_eq!(stringify_number(Number::new(5.67e50).unwrap()), "5.67e50");
    assert_eq!(stringify_number(Number::new(-8.35e30).unwrap()), "-8.35e30");
    assert_eq!(stringify_number(Number::new(6e-24).unwrap()), "6e-24");
    assert_eq!(stringify_number(Number::new(1e24).unwrap()), "1e24");
}

#[test]
fn test_parse_number() {
    assert_eq!(parse_number("42").map(Number::get), Some(42.0));
    assert_eq!(parse_number("  -3.5 ").map(Number::get), Some(-3.5));
    assert_eq!(parse_number("0x1f").map(Number::get), Some(31.0));
    assert_eq!(parse_number("0b101").map(Number::get), Some(5.0));
    assert_eq!(parse_number("1e3").map(Number::get), Some(1000.0));
    assert_eq!(parse_number(""), None);
    assert_eq!(parse_number("seven"), None);
    assert_eq!(parse_number("NaN"), None);
    assert_eq!(parse_number("inf"), None);
}

/// The type of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Type {
    Undefined, Bool, Number, String, Array,
}
impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Type::Undefined => "undefined",
            Type::Bool => "boolean",
            Type::Number => "number",
            Type::String => "string",
            Type::Array => "array",
        })
    }
}

/// A type conversion error on a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversionError {
    pub got: Type,
    pub expected: Type,
}

/// The number of arguments a [`Function`] accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
}
impl Arity {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Exact(n) => count == n,
            Arity::AtLeast(n) => count >= n,
        }
    }
}
impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "{n}"),
            Arity::AtLeast(n) => write!(f, "at least {n}"),
        }
    }
}

/// The cause/explanation of an execution error.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorCause {
    /// A variable lookup operation failed. `name` holds the name of the variable that was expected.
    UndefinedVariable { name: CompactString },
    /// A call referred to a function that does not exist.
    UndefinedFunction { name: CompactString },
    /// A call component referred to a subchart that does not exist.
    UndefinedSubChart { name: CompactString },
    /// The result of a failed type conversion.
    ConversionError { got: Type, expected: Type },
    /// An array of rank `expected` was indexed with `got` indices.
    DimensionMismatch { expected: usize, got: usize },
    /// An indexing operation read past the end of an array (or array row) of size `len`.
    IndexOutOfBounds { index: usize, len: usize },
    /// A write at `index` would grow an array (or array row) past `limit` items.
    ArrayTooLarge { index: usize, limit: usize },
    /// Attempt to index an array with a non-integer numeric value, `index`.
    IndexNotInteger { index: f64 },
    /// Attempt to index an array with a negative value, `index`.
    NegativeIndex { index: f64 },
    /// Attempt to interpret an invalid unicode code point (number) as a character.
    InvalidUnicode { value: f64 },
    /// Attempt to assign to something other than a variable or array element.
    NotAssignable,
    /// A terminal component had a label other than `Start` or `End`.
    UnknownCommand { label: CompactString },
    /// A function or subchart named `name` received the wrong number of arguments.
    ArgCount { name: CompactString, expected: Arity, got: usize },
    /// The argument for an `out` or `in out` parameter was not a plain variable.
    RefArgNotVariable { param: CompactString },
    /// Exceeded the maximum call depth.
    CallDepthLimit { limit: usize },
    /// A component label could not be parsed.
    ParseError { error: ParseError },
    /// A link pointed at a component that is not part of the running subchart.
    UnknownComponent { id: i32 },
    /// An input answer was given while the process was not waiting for one.
    NotAwaitingInput,
    /// The process was resumed from an input interrupt without an answer.
    InputNotProvided,
}
impl From<ConversionError> for ErrorCause { fn from(e: ConversionError) -> Self { Self::ConversionError { got: e.got, expected: e.expected } } }
impl From<ParseError> for ErrorCause { fn from(error: ParseError) -> Self { Self::ParseError { error } } }
impl fmt::Display for ErrorCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCause::UndefinedVariable { name } => write!(f, "variable '{name}' is not defined"),
            ErrorCause::UndefinedFunction { name } => write!(f, "function '{name}' is not defined"),
            ErrorCause::UndefinedSubChart { name } => write!(f, "subchart '{name}' is not defined"),
            ErrorCause::ConversionError { got, expected } => write!(f, "expected {expected}, but got {got}"),
            ErrorCause::DimensionMismatch { expected, got } => write!(f, "array has {expected} dimension(s), but was indexed with {got}"),
            ErrorCause::IndexOutOfBounds { index, len } => write!(f, "index {index} is out of bounds for length {len}"),
            ErrorCause::ArrayTooLarge { index, limit } => write!(f, "cannot grow an array to index {index} (at most {limit} items are allowed)"),
            ErrorCause::IndexNotInteger { index } => write!(f, "array index {index} is not an integer"),
            ErrorCause::NegativeIndex { index } => write!(f, "array index {index} is negative"),
            ErrorCause::InvalidUnicode { value } => write!(f, "{value} is not a valid character code"),
            ErrorCause::NotAssignable => f.write_str("only variables and array elements can be assigned"),
            ErrorCause::UnknownCommand { label } => write!(f, "unknown command '{label}'"),
            ErrorCause::ArgCount { name, expected, got } => write!(f, "'{name}' expects {expected} argument(s), but got {got}"),
            ErrorCause::RefArgNotVariable { param } => write!(f, "the argument for parameter '{param}' must be a variable"),
            ErrorCause::CallDepthLimit { limit } => write!(f, "exceeded the maximum call depth of {limit}"),
            ErrorCause::ParseError { error } => write!(f, "{error}"),
            ErrorCause::UnknownComponent { id } => write!(f, "component {id} does not exist"),
            ErrorCause::NotAwaitingInput => f.write_str("the program is not waiting for input"),
            ErrorCause::InputNotProvided => f.write_str("the program is waiting for input, but none was provided"),
        }
    }
}

/// The maximum number of items in an array, or in one row of a 2-D array.
pub const MAX_ARRAY_LEN: usize = 1 << 20;

/// The storage of an array value.
///
/// Arrays have one or two dimensions, fixed when they are created.
/// Writes past the end grow the array (up to [`MAX_ARRAY_LEN`] items), filling the gap with [`Value::Undefined`].
#[derive(Debug, Clone)]
pub enum Array {
    List(Vec<Value>),
    Grid(Vec<Vec<Value>>),
}
impl Array {
    /// Creates an empty array with the given number of dimensions (1 or 2).
    pub fn new(rank: usize) -> Self {
        match rank {
            2 => Array::Grid(vec![]),
            _ => Array::List(vec![]),
        }
    }
    pub fn rank(&self) -> usize {
        match self {
            Array::List(_) => 1,
            Array::Grid(_) => 2,
        }
    }
    /// The number of items, or rows for a 2-D array.
    pub fn len(&self) -> usize {
        match self {
            Array::List(x) => x.len(),
            Array::Grid(x) => x.len(),
        }
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn check_rank(&self, indices: &[usize]) -> Result<(), ErrorCause> {
        match indices.len() == self.rank() {
            true => Ok(()),
            false => Err(ErrorCause::DimensionMismatch { expected: self.rank(), got: indices.len() }),
        }
    }
    pub fn get(&self, indices: &[usize]) -> Result<Value, ErrorCause> {
        self.check_rank(indices)?;
        fn item<T: Clone>(items: &[T], index: usize) -> Result<T, ErrorCause> {
            items.get(index).cloned().ok_or(ErrorCause::IndexOutOfBounds { index, len: items.len() })
        }
        match self {
            Array::List(x) => item(x, indices[0]),
            Array::Grid(x) => {
                let row = x.get(indices[0]).ok_or(ErrorCause::IndexOutOfBounds { index: indices[0], len: x.len() })?;
                item(row, indices[1])
            }
        }
    }
    pub fn set(&mut self, indices: &[usize], value: Value) -> Result<(), ErrorCause> {
        self.check_rank(indices)?;
        fn slot<T>(items: &mut Vec<T>, index: usize, fill: fn() -> T) -> Result<&mut T, ErrorCause> {
            if index >= items.len() {
                if index >= MAX_ARRAY_LEN {
                    return Err(ErrorCause::ArrayTooLarge { index, limit: MAX_ARRAY_LEN });
                }
                items.resize_with(index + 1, fill);
            }
            Ok(&mut items[index])
        }
        match self {
            Array::List(x) => *slot(x, indices[0], Value::default)? = value,
            Array::Grid(x) => *slot(slot(x, indices[0], Vec::new)?, indices[1], Value::default)? = value,
        }
        Ok(())
    }
    /// Iterates over all items, row by row for a 2-D array.
    pub fn items(&self) -> impl Iterator<Item = &Value> {
        let (list, grid) = match self {
            Array::List(x) => (Some(x.iter()), None),
            Array::Grid(x) => (None, Some(x.iter().flatten())),
        };
        list.into_iter().flatten().chain(grid.into_iter().flatten())
    }
}
impl From<Vec<Value>> for Array { fn from(items: Vec<Value>) -> Self { Array::List(items) } }

/// Any primitive value.
///
/// Arrays are reference types: copying an array value aliases the same storage.
#[derive(Clone, Default)]
pub enum Value {
    /// The value of a variable that was declared (e.g., as an `out` argument) but never assigned.
    #[default]
    Undefined,
    Bool(bool),
    Number(Number),
    String(CompactString),
    Array(Rc<RefCell<Array>>),
}
impl Value {
    /// Gets the type of value that is stored.
    pub fn get_type(&self) -> Type {
        match self {
            Value::Undefined => Type::Undefined,
            Value::Bool(_) => Type::Bool,
            Value::Number(_) => Type::Number,
            Value::String(_) => Type::String,
            Value::Array(_) => Type::Array,
        }
    }
    /// Creates a new 1-D array value holding the given items.
    pub fn new_array(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(Array::from(items))))
    }
    /// Attempts to interpret this value as a number. Strings holding a number are converted.
    pub fn as_number(&self) -> Result<Number, ConversionError> {
        match self {
            Value::Number(x) => Ok(*x),
            Value::String(x) => parse_number(x).ok_or(ConversionError { got: Type::String, expected: Type::Number }),
            x => Err(ConversionError { got: x.get_type(), expected: Type::Number }),
        }
    }
    /// Attempts to interpret this value as a bool. Only booleans are accepted.
    pub fn as_bool(&self) -> Result<bool, ConversionError> {
        match self {
            Value::Bool(x) => Ok(*x),
            x => Err(ConversionError { got: x.get_type(), expected: Type::Bool }),
        }
    }
    /// Attempts to interpret this value as an array.
    pub fn as_array(&self) -> Result<&Rc<RefCell<Array>>, ConversionError> {
        match self {
            Value::Array(x) => Ok(x),
            x => Err(ConversionError { got: x.get_type(), expected: Type::Array }),
        }
    }
    /// Loose truthiness, as used by `and`, `or`, and `not`.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined => false,
            Value::Bool(x) => *x,
            Value::Number(x) => x.get() != 0.0,
            Value::String(x) => !x.is_empty(),
            Value::Array(_) => true,
        }
    }
    /// Converts this value into an array index: a non-negative integer.
    pub fn as_index(&self) -> Result<usize, ErrorCause> {
        let index = self.as_number()?.get();
        if index < 0.0 { return Err(ErrorCause::NegativeIndex { index }) }
        if libm::trunc(index) != index || index > usize::MAX as f64 { return Err(ErrorCause::IndexNotInteger { index }) }
        Ok(index as usize)
    }
    /// Renders this value as text, as shown by an output component.
    ///
    /// Array items are separated by commas; an array that (indirectly) contains itself is shown as `[...]`.
    pub fn to_text(&self) -> CompactString {
        fn visit(value: &Value, res: &mut CompactString, stack: &mut Vec<Rc<RefCell<Array>>>) {
            match value {
                Value::Undefined => res.push_str("undefined"),
                Value::Bool(x) => res.push_str(if *x { "true" } else { "false" }),
                Value::Number(x) => res.push_str(&stringify_number(*x)),
                Value::String(x) => res.push_str(x),
                Value::Array(x) => {
                    if stack.iter().any(|y| Rc::ptr_eq(x, y)) {
                        res.push_str("[...]");
                        return;
                    }
                    stack.push(x.clone());
                    for (i, item) in x.borrow().items().enumerate() {
                        if i != 0 { res.push(',') }
                        visit(item, res, stack);
                    }
                    stack.pop();
                }
            }
        }
        let mut res = CompactString::default();
        visit(self, &mut res, &mut vec![]);
        res
    }
}
impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("Undefined"),
            Value::Bool(x) => write!(f, "Bool({x})"),
            Value::Number(x) => write!(f, "Number({})", x.get()),
            Value::String(x) => write!(f, "String({x:?})"),
            Value::Array(_) => write!(f, "Array({:?})", self.to_text()),
        }
    }
}
impl PartialEq for Value {
    /// Primitives compare by value, arrays by identity.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}
impl From<bool> for Value { fn from(v: bool) -> Self { Value::Bool(v) } }
impl From<Number> for Value { fn from(v: Number) -> Self { Value::Number(v) } }
impl From<CompactString> for Value { fn from(v: CompactString) -> Self { Value::String(v) } }
impl From<&str> for Value { fn from(v: &str) -> Self { Value::String(v.into()) } }
impl From<Array> for Value { fn from(v: Array) -> Self { Value::Array(Rc::new(RefCell::new(v))) } }

#[test]
fn test_value_text() {
    let n = |x: f64| Value::Number(Number::new(x).unwrap());
    assert_eq!(n(3.0).to_text(), "3");
    assert_eq!(Value::from(true).to_text(), "true");
    assert_eq!(Value::Undefined.to_text(), "undefined");
    assert_eq!(Value::new_array(vec![n(1.0), "a".into(), Value::Undefined]).to_text(), "1,a,undefined");

    let arr = Value::new_array(vec![n(1.0)]);
    if let Value::Array(x) = &arr {
        x.borrow_mut().set(&[1], arr.clone()).unwrap();
    }
    assert_eq!(arr.to_text(), "1,[...]");
}

#[test]
fn test_array_indexing() {
    let mut arr = Array::new(2);
    arr.set(&[1, 2], "x".into()).unwrap();
    assert_eq!(arr.len(), 2);
    assert_eq!(arr.get(&[1, 2]).unwrap(), Value::from("x"));
    assert_eq!(arr.get(&[1, 0]).unwrap(), Value::Undefined);
    assert_eq!(arr.get(&[0, 0]).unwrap_err(), ErrorCause::IndexOutOfBounds { index: 0, len: 0 });
    assert_eq!(arr.get(&[2, 0]).unwrap_err(), ErrorCause::IndexOutOfBounds { index: 2, len: 2 });
    assert_eq!(arr.get(&[1]).unwrap_err(), ErrorCause::DimensionMismatch { expected: 2, got: 1 });
    assert_eq!(arr.set(&[1, 2, 3], Value::Undefined).unwrap_err(), ErrorCause::DimensionMismatch { expected: 2, got: 3 });

    let n = |x: f64| Value::Number(Number::new(x).unwrap());
    assert_eq!(n(4.0).as_index().unwrap(), 4);
    assert_eq!(Value::from("2").as_index().unwrap(), 2);
    assert_eq!(n(1.5).as_index().unwrap_err(), ErrorCause::IndexNotInteger { index: 1.5 });
    assert_eq!(n(-1.0).as_index().unwrap_err(), ErrorCause::NegativeIndex { index: -1.0 });
    assert_eq!(Value::from(true).as_index().unwrap_err(), ErrorCause::ConversionError { got: Type::Bool, expected: Type::Number });
}

/// Represents a shared mutable resource.
///
/// This performs no dynamic allocation for the [`Shared::Unique`] case,
/// which is assumed to be significantly more likely than [`Shared::Aliased`].
#[derive(Debug)]
pub enum Shared<T> {
    /// A shared resource which has only (this) single unique handle.
    Unique(T),
    /// One of several handles to a single shared resource.
    Aliased(Rc<RefCell<T>>),
}
impl<T: Default> Shared<T> {
    /// Sets the value of the shared resource.
    pub fn set(&mut self, value: T) {
        match self {
            Shared::Unique(x) => *x = value,
            Shared::Aliased(x) => *x.borrow_mut() = value,
        }
    }
    /// Gets a reference to the shared resource's currently stored value.
    pub fn get(&self) -> SharedRef<T> {
        match self {
            Shared::Unique(x) => SharedRef::Unique(x),
            Shared::Aliased(x) => SharedRef::Aliased(x.borrow()),
        }
    }
    /// Transitions the shared value from [`Shared::Unique`] to [`Shared::Aliased`] if it has not already,
    /// and returns an additional alias to the underlying value.
    pub fn alias_inner(&mut self) -> Rc<RefCell<T>> {
        if let Shared::Unique(x) = self {
            *self = Shared::Aliased(Rc::new(RefCell::new(mem::take(x))));
        }
        match self {
            Shared::Aliased(x) => x.clone(),
            Shared::Unique(_) => Rc::new(RefCell::new(T::default())), // replaced just above
        }
    }
    /// Creates a new instance of [`Shared`] that references the same underlying value.
    pub fn alias(&mut self) -> Self {
        Shared::Aliased(self.alias_inner())
    }
}
impl<T> From<T> for Shared<T> { fn from(value: T) -> Self { Shared::Unique(value) } }

pub enum SharedRef<'a, T> {
    Unique(&'a T),
    Aliased(Ref<'a, T>)
}
impl<T> Deref for SharedRef<'_, T> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        match self {
            SharedRef::Unique(x) => x,
            SharedRef::Aliased(x) => x,
        }
    }
}

/// Holds the variables of one scope.
///
/// Variable names are stored lowercase, as produced by the tokenizer.
#[derive(Debug, Default)]
pub struct SymbolTable(VecMap<CompactString, Shared<Value>, true>);
impl SymbolTable {
    /// Defines or redefines a value in the symbol table to a new instance of [`Shared<Value>`].
    /// An existing alias under the same name is dropped, not written through.
    pub fn define_or_redefine(&mut self, var: &str, value: Shared<Value>) {
        self.0.insert(CompactString::new(var), value);
    }
    /// Looks up the given variable in the symbol table.
    /// If a variable with the given name does not exist, returns [`None`].
    pub fn lookup(&self, var: &str) -> Option<&Shared<Value>> {
        self.0.get(var)
    }
    /// Equivalent to [`SymbolTable::lookup`] except that it returns a mutable reference.
    pub fn lookup_mut(&mut self, var: &str) -> Option<&mut Shared<Value>> {
        self.0.get_mut(var)
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    /// Iterates over the variables in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&CompactString, &Shared<Value>)> {
        self.0.iter()
    }
}

/// The chain of variable scopes visible to the running component.
///
/// The first scope holds the variables of the main subchart; every procedure call pushes a new
/// innermost scope. Lookups search from the innermost scope outwards.
#[derive(Debug)]
pub struct Environment {
    scopes: Vec<SymbolTable>,
}
impl Default for Environment {
    fn default() -> Self {
        Self { scopes: vec![SymbolTable::default()] }
    }
}
impl Environment {
    pub fn new() -> Self {
        Self::default()
    }
    /// The number of scopes, including the outermost one.
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }
    pub fn push_scope(&mut self, scope: SymbolTable) {
        self.scopes.push(scope);
    }
    /// Discards the innermost scope. The outermost scope is never removed.
    pub fn pop_scope(&mut self) -> Option<SymbolTable> {
        match self.scopes.len() > 1 {
            true => self.scopes.pop(),
            false => None,
        }
    }
    /// The outermost scope.
    pub fn globals(&self) -> &SymbolTable {
        &self.scopes[0]
    }
    /// The innermost scope.
    pub fn locals(&self) -> &SymbolTable {
        &self.scopes[self.scopes.len() - 1]
    }
    fn innermost(&mut self) -> &mut SymbolTable {
        let last = self.scopes.len() - 1;
        &mut self.scopes[last]
    }
    fn find_mut(&mut self, name: &str) -> Option<&mut Shared<Value>> {
        self.scopes.iter_mut().rev().find_map(|x| x.lookup_mut(name))
    }

    /// Gets the value of a variable, searching from the innermost scope outwards.
    pub fn get(&self, name: &str) -> Result<Value, ErrorCause> {
        self.get_soft(name).ok_or_else(|| ErrorCause::UndefinedVariable { name: name.into() })
    }
    /// As [`Environment::get`], but returns [`None`] if the variable does not exist.
    pub fn get_soft(&self, name: &str) -> Option<Value> {
        self.scopes.iter().rev().find_map(|x| x.lookup(name)).map(|x| x.get().clone())
    }
    /// Assigns to a variable in the scope that already declares it, or defines it in the innermost scope.
    /// Assigning to a by-reference parameter writes through to the caller's variable.
    pub fn set(&mut self, name: &str, value: Value) {
        match self.find_mut(name) {
            Some(x) => x.set(value),
            None => self.innermost().define_or_redefine(name, value.into()),
        }
    }
    /// Gets a by-reference handle to a variable for passing to an `out` or `in out` parameter.
    /// A variable that does not exist yet is defined as [`Value::Undefined`] in the innermost scope.
    pub fn alias(&mut self, name: &str) -> Shared<Value> {
        if self.find_mut(name).is_none() {
            self.innermost().define_or_redefine(name, Value::Undefined.into());
        }
        match self.find_mut(name) {
            Some(x) => x.alias(),
            None => Shared::Unique(Value::Undefined), // defined just above
        }
    }
}

#[test]
fn test_environment_scoping() {
    let n = |x: f64| Value::Number(Number::new(x).unwrap());
    let mut env = Environment::new();
    env.set("x", n(1.0));
    env.push_scope(SymbolTable::default());
    assert_eq!(env.get("x").unwrap(), n(1.0));

    env.set("x", n(2.0));
    env.set("y", n(3.0));
    assert_eq!(env.locals().len(), 1);
    env.pop_scope();
    assert_eq!(env.get("x").unwrap(), n(2.0));
    assert_eq!(env.get("y").unwrap_err(), ErrorCause::UndefinedVariable { name: "y".into() });
    assert!(env.pop_scope().is_none());
}

#[test]
fn test_environment_alias() {
    let n = |x: f64| Value::Number(Number::new(x).unwrap());
    let mut env = Environment::new();
    env.set("a", n(5.0));

    let mut scope = SymbolTable::default();
    scope.define_or_redefine("p", env.alias("a"));
    scope.define_or_redefine("q", env.alias("fresh"));
    assert_eq!(env.get("fresh").unwrap(), Value::Undefined);
    env.push_scope(scope);

    assert_eq!(env.get("p").unwrap(), n(5.0));
    env.set("p", n(6.0));
    env.set("q", "hi".into());
    env.pop_scope();
    assert_eq!(env.get("a").unwrap(), n(6.0));
    assert_eq!(env.get("fresh").unwrap(), Value::from("hi"));
}

/// The signature of a built-in function.
pub type NativeFunction = fn(&[Value], &mut dyn RngCore) -> Result<Value, ErrorCause>;

/// A built-in function callable from expressions.
#[derive(Clone, Copy, Educe)]
#[educe(Debug)]
pub struct Function {
    pub arity: Arity,
    #[educe(Debug(ignore))]
    pub call: NativeFunction,
}

/// The process-wide tables of functions, constants, and subcharts.
///
/// This is built once when a program is loaded and only read while it runs.
/// All names are lowercase.
#[derive(Debug, Default)]
pub struct GlobalRegistry {
    functions: VecMap<CompactString, Function, true>,
    constants: VecMap<CompactString, Value, true>,
    subcharts: VecMap<CompactString, usize, true>,
}
impl GlobalRegistry {
    /// Creates a registry with no functions, constants, or subcharts.
    pub fn new() -> Self {
        Self::default()
    }
    /// Creates a registry holding the standard functions and constants.
    pub fn standard() -> Self {
        let mut res = Self::new();
        crate::builtins::register(&mut res);
        res
    }
    pub fn define_function(&mut self, name: &str, function: Function) {
        self.functions.insert(name.into(), function);
    }
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }
    pub fn define_constant(&mut self, name: &str, value: Value) {
        self.constants.insert(name.into(), value);
    }
    pub fn constant(&self, name: &str) -> Option<&Value> {
        self.constants.get(name)
    }
    /// Registers a subchart under its lowercase name, returning `false` if the name is already taken.
    pub fn define_subchart(&mut self, name: &str, index: usize) -> bool {
        let name = CompactString::from(name.to_lowercase());
        if self.subcharts.contains_key(&name) { return false }
        self.subcharts.insert(name, index);
        true
    }
    /// Looks up the index of a subchart by (case-insensitive) name.
    pub fn subchart(&self, name: &str) -> Option<usize> {
        self.subcharts.get(name.to_lowercase().as_str()).copied()
    }
    pub fn functions(&self) -> impl Iterator<Item = (&CompactString, &Function)> {
        self.functions.iter()
    }
}

/// Settings to use for a [`Process`](crate::process::Process).
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Settings {
    /// The maximum depth of the call stack (default `1024`).
    pub max_call_depth: usize,
    /// The seed for the `random` function (default `0`).
    pub rng_seed: u64,
}
impl Default for Settings {
    fn default() -> Self {
        Self {
            max_call_depth: 1024,
            rng_seed: 0,
        }
    }
}
