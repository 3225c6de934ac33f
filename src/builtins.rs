//! The standard functions and constants available to every program.

use rand::{Rng, RngCore};

use crate::runtime::*;

fn number(value: &Value) -> Result<f64, ErrorCause> {
    Ok(value.as_number()?.get())
}
/// Wraps a numeric result; results that are not finite become [`Value::Undefined`].
fn result(value: f64) -> Value {
    Number::new(value).map(Value::Number).unwrap_or(Value::Undefined)
}

macro_rules! unary_math {
    ($($name:ident => $f:expr),*$(,)?) => {$(
        fn $name(args: &[Value], _: &mut dyn RngCore) -> Result<Value, ErrorCause> {
            let f: fn(f64) -> f64 = $f;
            Ok(result(f(number(&args[0])?)))
        }
    )*}
}
unary_math! {
    abs => libm::fabs,
    ceiling => libm::ceil,
    floor => libm::floor,
    sqrt => libm::sqrt,
    log => libm::log,
    sin => libm::sin,
    cos => libm::cos,
    tan => libm::tan,
    cot => |x| 1.0 / libm::tan(x),
    arcsin => libm::asin,
    arccos => libm::acos,
    arctan => libm::atan,
    arccot => |x| libm::atan(1.0 / x),
}

fn max(args: &[Value], _: &mut dyn RngCore) -> Result<Value, ErrorCause> {
    let mut res = number(&args[0])?;
    for arg in &args[1..] {
        res = res.max(number(arg)?);
    }
    Ok(result(res))
}
fn min(args: &[Value], _: &mut dyn RngCore) -> Result<Value, ErrorCause> {
    let mut res = number(&args[0])?;
    for arg in &args[1..] {
        res = res.min(number(arg)?);
    }
    Ok(result(res))
}
fn random(_: &[Value], rng: &mut dyn RngCore) -> Result<Value, ErrorCause> {
    Ok(result(rng.gen::<f64>()))
}

fn to_ascii(args: &[Value], _: &mut dyn RngCore) -> Result<Value, ErrorCause> {
    match &args[0] {
        Value::String(x) => Ok(x.chars().next().map(|c| result(c as u32 as f64)).unwrap_or(Value::Undefined)),
        x => Err(ConversionError { got: x.get_type(), expected: Type::String }.into()),
    }
}
fn to_character(args: &[Value], _: &mut dyn RngCore) -> Result<Value, ErrorCause> {
    let value = number(&args[0])?;
    let code = value as u32;
    match char::from_u32(code) {
        Some(c) if code as f64 == value => Ok(Value::String(core::iter::once(c).collect())),
        _ => Err(ErrorCause::InvalidUnicode { value }),
    }
}
fn length_of(args: &[Value], _: &mut dyn RngCore) -> Result<Value, ErrorCause> {
    let len = match &args[0] {
        Value::String(x) => x.chars().count(),
        Value::Array(x) => x.borrow().len(),
        x => return Err(ConversionError { got: x.get_type(), expected: Type::String }.into()),
    };
    Ok(result(len as f64))
}

fn is_array(args: &[Value], _: &mut dyn RngCore) -> Result<Value, ErrorCause> {
    Ok(Value::Bool(matches!(&args[0], Value::Array(x) if x.borrow().rank() == 1)))
}
fn is_2d_array(args: &[Value], _: &mut dyn RngCore) -> Result<Value, ErrorCause> {
    Ok(Value::Bool(matches!(&args[0], Value::Array(x) if x.borrow().rank() == 2)))
}
fn is_number(args: &[Value], _: &mut dyn RngCore) -> Result<Value, ErrorCause> {
    Ok(Value::Bool(matches!(&args[0], Value::Number(_))))
}
fn is_string(args: &[Value], _: &mut dyn RngCore) -> Result<Value, ErrorCause> {
    Ok(Value::Bool(matches!(&args[0], Value::String(_))))
}
fn is_character(args: &[Value], _: &mut dyn RngCore) -> Result<Value, ErrorCause> {
    Ok(Value::Bool(matches!(&args[0], Value::String(x) if x.chars().count() == 1)))
}

/// Adds the standard functions and the constants `pi` and `e` to a registry.
pub fn register(globals: &mut GlobalRegistry) {
    let functions: [(&str, Arity, NativeFunction); 25] = [
        ("abs", Arity::Exact(1), abs),
        ("ceiling", Arity::Exact(1), ceiling),
        ("floor", Arity::Exact(1), floor),
        ("sqrt", Arity::Exact(1), sqrt),
        ("log", Arity::Exact(1), log),
        ("sin", Arity::Exact(1), sin),
        ("cos", Arity::Exact(1), cos),
        ("tan", Arity::Exact(1), tan),
        ("cot", Arity::Exact(1), cot),
        ("arcsin", Arity::Exact(1), arcsin),
        ("arccos", Arity::Exact(1), arccos),
        ("arctan", Arity::Exact(1), arctan),
        ("arccot", Arity::Exact(1), arccot),
        ("max", Arity::AtLeast(1), max),
        ("min", Arity::AtLeast(1), min),
        ("random", Arity::Exact(0), random),
        ("to_ascii", Arity::Exact(1), to_ascii),
        ("to_character", Arity::Exact(1), to_character),
        ("length_of", Arity::Exact(1), length_of),
        ("is_array", Arity::Exact(1), is_array),
        ("is_2d_array", Arity::Exact(1), is_2d_array),
        ("is_number", Arity::Exact(1), is_number),
        ("is_string", Arity::Exact(1), is_string),
        ("is_character", Arity::Exact(1), is_character),
        ("is_boolean", Arity::Exact(1), |args, _| Ok(Value::Bool(matches!(&args[0], Value::Bool(_))))),
    ];
    for (name, arity, call) in functions {
        globals.define_function(name, Function { arity, call });
    }

    globals.define_constant("pi", result(core::f64::consts::PI));
    globals.define_constant("e", result(core::f64::consts::E));
}

#[cfg(test)]
fn call(name: &str, args: &[Value]) -> Result<Value, ErrorCause> {
    use rand::SeedableRng;
    let globals = GlobalRegistry::standard();
    let function = globals.function(name).unwrap();
    assert!(function.arity.accepts(args.len()));
    (function.call)(args, &mut rand_chacha::ChaCha8Rng::seed_from_u64(0))
}
#[cfg(test)]
fn num(x: f64) -> Value {
    Value::Number(Number::new(x).unwrap())
}

#[test]
fn test_math_functions() {
    assert_eq!(call("abs", &[num(-4.5)]).unwrap(), num(4.5));
    assert_eq!(call("ceiling", &[num(1.2)]).unwrap(), num(2.0));
    assert_eq!(call("floor", &["-1.2".into()]).unwrap(), num(-2.0));
    assert_eq!(call("sqrt", &[num(16.0)]).unwrap(), num(4.0));
    assert_eq!(call("sqrt", &[num(-1.0)]).unwrap(), Value::Undefined);
    assert_eq!(call("log", &[num(0.0)]).unwrap(), Value::Undefined);
    assert_eq!(call("max", &[num(3.0), num(7.0), num(-2.0)]).unwrap(), num(7.0));
    assert_eq!(call("min", &[num(3.0), num(7.0), num(-2.0)]).unwrap(), num(-2.0));
    assert_eq!(call("abs", &[true.into()]).unwrap_err(), ErrorCause::ConversionError { got: Type::Bool, expected: Type::Number });

    let Value::Number(r) = call("random", &[]).unwrap() else { panic!() };
    assert!((0.0..1.0).contains(&r.get()));
}

#[test]
fn test_text_functions() {
    assert_eq!(call("to_ascii", &["A".into()]).unwrap(), num(65.0));
    assert_eq!(call("to_character", &[num(97.0)]).unwrap(), Value::from("a"));
    assert_eq!(call("to_character", &[num(97.5)]).unwrap_err(), ErrorCause::InvalidUnicode { value: 97.5 });
    assert_eq!(call("length_of", &["héllo".into()]).unwrap(), num(5.0));
    assert_eq!(call("length_of", &[Value::new_array(vec![num(1.0), num(2.0)])]).unwrap(), num(2.0));
    assert_eq!(call("is_character", &["x".into()]).unwrap(), Value::Bool(true));
    assert_eq!(call("is_character", &["xy".into()]).unwrap(), Value::Bool(false));
    assert_eq!(call("is_2d_array", &[Array::new(2).into()]).unwrap(), Value::Bool(true));
    assert_eq!(call("is_array", &[Array::new(2).into()]).unwrap(), Value::Bool(false));
}
