//! Evaluation of expressions against an [`Environment`].

use alloc::vec::Vec;
use core::cmp::Ordering;

use compact_str::CompactString;
use rand::RngCore;

use crate::ast::*;
use crate::runtime::*;

/// Everything an expression can read or write while it is evaluated.
pub struct Evaluator<'a> {
    pub env: &'a mut Environment,
    pub globals: &'a GlobalRegistry,
    pub rng: &'a mut dyn RngCore,
}
impl Evaluator<'_> {
    pub fn eval(&mut self, expr: &Expr) -> Result<Value, ErrorCause> {
        Ok(match expr {
            Expr::Number(x) => Value::Number(*x),
            Expr::String(x) => Value::String(x.clone()),
            Expr::Bool(x) => Value::Bool(*x),
            Expr::Variable(name) => self.lookup(name)?,
            Expr::Array(items) => Value::new_array(items.iter().map(|x| self.eval(x)).collect::<Result<_, _>>()?),
            Expr::Unary { op, value } => {
                let value = self.eval(value)?;
                match op {
                    UnaryOp::Not => Value::Bool(!value.is_truthy()),
                    UnaryOp::Pos | UnaryOp::Neg => match value {
                        Value::Number(x) if *op == UnaryOp::Neg => Value::Number(Number::new(-x.get()).unwrap_or(x)),
                        Value::Number(x) => Value::Number(x),
                        x => return Err(ConversionError { got: x.get_type(), expected: Type::Number }.into()),
                    }
                }
            }
            Expr::Binary { op: BinaryOp::And, left, right } => Value::Bool(self.eval(left)?.is_truthy() && self.eval(right)?.is_truthy()),
            Expr::Binary { op: BinaryOp::Or, left, right } => Value::Bool(self.eval(left)?.is_truthy() || self.eval(right)?.is_truthy()),
            Expr::Binary { op, left, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                binary_op(*op, &left, &right)
            }
            Expr::Call { name, args } => {
                let function = *self.globals.function(name).ok_or_else(|| ErrorCause::UndefinedFunction { name: name.clone() })?;
                if !function.arity.accepts(args.len()) {
                    return Err(ErrorCause::ArgCount { name: name.clone(), expected: function.arity, got: args.len() });
                }
                let args = args.iter().map(|x| self.eval(x)).collect::<Result<Vec<_>, _>>()?;
                (function.call)(&args, self.rng)?
            }
            Expr::Index { target, indices } => {
                let target = self.eval(target)?;
                let indices = self.indices(indices)?;
                let res = target.as_array()?.borrow().get(&indices)?;
                res
            }
            Expr::Assign { target, value } => {
                let value = self.eval(value)?;
                self.assign(target, value.clone())?;
                value
            }
        })
    }

    /// Resolves a name as a variable, then a constant, then a function taking no arguments.
    fn lookup(&mut self, name: &CompactString) -> Result<Value, ErrorCause> {
        if let Some(x) = self.env.get_soft(name) { return Ok(x) }
        if let Some(x) = self.globals.constant(name) { return Ok(x.clone()) }
        match self.globals.function(name) {
            Some(f) if f.arity.accepts(0) => (f.call)(&[], self.rng),
            _ => Err(ErrorCause::UndefinedVariable { name: name.clone() }),
        }
    }

    fn indices(&mut self, indices: &[Expr]) -> Result<Vec<usize>, ErrorCause> {
        indices.iter().map(|x| self.eval(x)?.as_index()).collect()
    }

    /// Stores a value into a variable or array element.
    ///
    /// Assigning an element of a variable that does not exist yet (or is still undefined) creates an
    /// empty array with as many dimensions as there are indices.
    pub fn assign(&mut self, target: &Expr, value: Value) -> Result<(), ErrorCause> {
        match target {
            Expr::Variable(name) => {
                self.env.set(name, value);
                Ok(())
            }
            Expr::Index { target, indices } => {
                let indices = self.indices(indices)?;
                let array = match &**target {
                    Expr::Variable(name) if matches!(self.env.get_soft(name), None | Some(Value::Undefined)) => {
                        let array = Value::from(Array::new(indices.len()));
                        self.env.set(name, array.clone());
                        array
                    }
                    target => self.eval(target)?,
                };
                let res = array.as_array()?.borrow_mut().set(&indices, value);
                res
            }
            _ => Err(ErrorCause::NotAssignable),
        }
    }
}

/// Compares two values, returning [`None`] if they are not comparable.
///
/// Numbers compare with numeric strings by value; arrays are only equal to themselves.
pub fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Undefined, Value::Undefined) => Some(Ordering::Equal),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Number(a), Value::Number(b)) => Some(a.cmp(b)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Number(a), Value::String(_)) => Some(a.cmp(&right.as_number().ok()?)),
        (Value::String(_), Value::Number(b)) => Some(left.as_number().ok()?.cmp(b)),
        (Value::Array(a), Value::Array(b)) => alloc::rc::Rc::ptr_eq(a, b).then_some(Ordering::Equal),
        _ => None,
    }
}

/// Applies a non-short-circuiting binary operator.
///
/// This never fails: arithmetic on non-numbers (or producing a non-finite number) gives [`Value::Undefined`].
pub fn binary_op(op: BinaryOp, left: &Value, right: &Value) -> Value {
    let arith = |f: fn(f64, f64) -> f64| -> Value {
        match (left.as_number(), right.as_number()) {
            (Ok(a), Ok(b)) => Number::new(f(a.get(), b.get())).map(Value::Number).unwrap_or(Value::Undefined),
            _ => Value::Undefined,
        }
    };
    let cmp = |f: fn(Ordering) -> bool| Value::Bool(compare(left, right).map(f).unwrap_or(false));
    match op {
        BinaryOp::Add => match (left, right) {
            (Value::String(_), _) | (_, Value::String(_)) => {
                let mut res = left.to_text();
                res.push_str(&right.to_text());
                Value::String(res)
            }
            _ => arith(|a, b| a + b),
        }
        BinaryOp::Sub => arith(|a, b| a - b),
        BinaryOp::Mul => arith(|a, b| a * b),
        BinaryOp::Div => arith(|a, b| a / b),
        BinaryOp::Mod => arith(|a, b| a % b),
        BinaryOp::Eq => cmp(Ordering::is_eq),
        BinaryOp::NotEq => Value::Bool(!compare(left, right).map(Ordering::is_eq).unwrap_or(false)),
        BinaryOp::Less => cmp(Ordering::is_lt),
        BinaryOp::LessEq => cmp(Ordering::is_le),
        BinaryOp::Greater => cmp(Ordering::is_gt),
        BinaryOp::GreaterEq => cmp(Ordering::is_ge),
        BinaryOp::And => Value::Bool(left.is_truthy() && right.is_truthy()),
        BinaryOp::Or => Value::Bool(left.is_truthy() || right.is_truthy()),
    }
}
