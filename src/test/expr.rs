use std::prelude::v1::*;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::eval::*;
use crate::parser::*;
use crate::runtime::*;

fn eval_in(env: &mut Environment, src: &str) -> Result<Value, ErrorCause> {
    let globals = GlobalRegistry::standard();
    let mut rng = ChaCha8Rng::seed_from_u64(0);
    let expr = parse_expr(src)?;
    Evaluator { env, globals: &globals, rng: &mut rng }.eval(&expr)
}
fn eval(src: &str) -> Value {
    eval_in(&mut Environment::new(), src).unwrap()
}
fn n(x: f64) -> Value {
    Value::Number(Number::new(x).unwrap())
}

#[test]
fn test_arithmetic_laws() {
    for (a, b) in [("1", "2"), ("3.5", "-7"), ("10000000000", "0.25"), ("0", "12")] {
        assert_eq!(eval(&format!("{a} + {b}")), eval(&format!("{b} + {a}")));
        assert_eq!(eval(&format!("{a} * {b}")), eval(&format!("{b} * {a}")));
        assert_eq!(eval(&format!("{a} - {a}")), n(0.0));
        assert_eq!(eval(&format!("{a} / 0")), Value::Undefined);
    }
    assert_eq!(eval("7 % 0"), Value::Undefined);
    assert_eq!(eval("0 / 0"), Value::Undefined);
    assert_eq!(eval("7 % 3"), n(1.0));
    assert_eq!(eval("1 + 2 * 3 - 4 / 2"), n(5.0));
    assert_eq!(eval("(1 + 2) * 3"), n(9.0));
    assert_eq!(eval("-(2 - 5)"), n(3.0));
    assert_eq!(eval("+4"), n(4.0));
}

#[test]
fn test_string_concat() {
    assert_eq!(eval("\"x\" + 1"), Value::from("x1"));
    assert_eq!(eval("1 + \"x\""), Value::from("1x"));
    assert_eq!(eval("\"n = \" + 2.5 + \"!\""), Value::from("n = 2.5!"));
    assert_eq!(eval("\"a\" + true"), Value::from("atrue"));
    assert_eq!(eval("\"3\" * 2"), n(6.0));
    assert_eq!(eval("\"abc\" * 2"), Value::Undefined);
    assert_eq!(eval("true - 1"), Value::Undefined);
}

#[test]
fn test_comparison() {
    assert_eq!(eval("1 < 2"), Value::Bool(true));
    assert_eq!(eval("2 <= 2"), Value::Bool(true));
    assert_eq!(eval("3 > 4"), Value::Bool(false));
    assert_eq!(eval("\"b\" > \"a\""), Value::Bool(true));
    assert_eq!(eval("3 == \"3\""), Value::Bool(true));
    assert_eq!(eval("3 = 3"), Value::Bool(true));
    assert_eq!(eval("true == 1"), Value::Bool(false));
    assert_eq!(eval("true != 1"), Value::Bool(true));
    assert_eq!(eval("[1] == [1]"), Value::Bool(false));
    assert_eq!(eval("\"x\" < 1"), Value::Bool(false));
}

#[test]
fn test_logic() {
    assert_eq!(eval("true and false"), Value::Bool(false));
    assert_eq!(eval("false or 1"), Value::Bool(true));
    assert_eq!(eval("not 0"), Value::Bool(true));
    assert_eq!(eval("!\"\""), Value::Bool(true));
    assert_eq!(eval("1 < 2 && 2 < 3"), Value::Bool(true));

    // the right side is never evaluated, so the undefined variable is not an error
    assert_eq!(eval("false and nope"), Value::Bool(false));
    assert_eq!(eval("true or nope"), Value::Bool(true));
    assert_eq!(eval_in(&mut Environment::new(), "true and nope").unwrap_err(), ErrorCause::UndefinedVariable { name: "nope".into() });
}

#[test]
fn test_variables_and_assignment() {
    let mut env = Environment::new();
    assert_eq!(eval_in(&mut env, "Count := 3").unwrap(), n(3.0));
    assert_eq!(eval_in(&mut env, "COUNT * 2").unwrap(), n(6.0));
    assert_eq!(eval_in(&mut env, "a := b := count + 1").unwrap(), n(4.0));
    assert_eq!(env.get("a").unwrap(), n(4.0));
    assert_eq!(env.get("b").unwrap(), n(4.0));

    assert_eq!(eval_in(&mut env, "missing + 1").unwrap_err(), ErrorCause::UndefinedVariable { name: "missing".into() });
    match eval_in(&mut env, "3 := 4").unwrap_err() {
        ErrorCause::ParseError { error } => assert_eq!(error.kind, ParseErrorKind::BadAssignTarget),
        x => panic!("{x:?}"),
    }
    match eval_in(&mut env, "x := 3 # 4").unwrap_err() {
        ErrorCause::ParseError { error } => assert_eq!(error.kind, ParseErrorKind::UnknownToken('#')),
        x => panic!("{x:?}"),
    }
}

#[test]
fn test_arrays() {
    let mut env = Environment::new();
    eval_in(&mut env, "scores[2] := 10").unwrap();
    assert_eq!(eval_in(&mut env, "scores").unwrap().to_text(), "undefined,undefined,10");
    assert_eq!(eval_in(&mut env, "length_of(scores)").unwrap(), n(3.0));
    assert_eq!(eval_in(&mut env, "scores[2] + scores[\"2\"]").unwrap(), n(20.0));

    eval_in(&mut env, "grid[1, 2] := \"x\"").unwrap();
    assert_eq!(eval_in(&mut env, "grid[1, 2]").unwrap(), Value::from("x"));
    assert_eq!(eval_in(&mut env, "is_2d_array(grid)").unwrap(), Value::Bool(true));
    assert_eq!(eval_in(&mut env, "is_array(grid)").unwrap(), Value::Bool(false));
    assert_eq!(eval_in(&mut env, "grid[1]").unwrap_err(), ErrorCause::DimensionMismatch { expected: 2, got: 1 });

    assert_eq!(eval_in(&mut env, "scores[5]").unwrap_err(), ErrorCause::IndexOutOfBounds { index: 5, len: 3 });
    assert_eq!(eval_in(&mut env, "scores[-1]").unwrap_err(), ErrorCause::NegativeIndex { index: -1.0 });
    assert_eq!(eval_in(&mut env, "scores[0.5]").unwrap_err(), ErrorCause::IndexNotInteger { index: 0.5 });
    assert_eq!(eval_in(&mut env, "count[0]").unwrap_err(), ErrorCause::UndefinedVariable { name: "count".into() });

    assert_eq!(eval_in(&mut env, "a[1000000000000000000] := 1").unwrap_err(), ErrorCause::ArrayTooLarge { index: 1_000_000_000_000_000_000, limit: MAX_ARRAY_LEN });
    assert_eq!(eval_in(&mut env, "scores[1000000000000] := 1").unwrap_err(), ErrorCause::ArrayTooLarge { index: 1_000_000_000_000, limit: MAX_ARRAY_LEN });
    assert_eq!(eval_in(&mut env, "grid[1, 1048576] := 1").unwrap_err(), ErrorCause::ArrayTooLarge { index: 1 << 20, limit: MAX_ARRAY_LEN });
    assert_eq!(eval_in(&mut env, "length_of(scores)").unwrap(), n(3.0));
    assert_eq!(eval_in(&mut env, "scores[10000000000000000000000]").unwrap_err(), ErrorCause::IndexNotInteger { index: 1e22 });

    // copies alias the same storage
    eval_in(&mut env, "alias := scores").unwrap();
    eval_in(&mut env, "alias[0] := 1").unwrap();
    assert_eq!(eval_in(&mut env, "scores[0]").unwrap(), n(1.0));
    assert_eq!(eval_in(&mut env, "alias == scores").unwrap(), Value::Bool(true));

    assert_eq!(eval_in(&mut env, "[1, \"two\", [3]]").unwrap().to_text(), "1,two,3");
    eval_in(&mut env, "x := 5").unwrap();
    assert_eq!(eval_in(&mut env, "x[0] := 1").unwrap_err(), ErrorCause::ConversionError { got: Type::Number, expected: Type::Array });
}

#[test]
fn test_calls() {
    assert_eq!(eval("sqrt(16) + abs(-2)"), n(6.0));
    assert_eq!(eval("max(3, 9, 4)"), n(9.0));
    assert_eq!(eval("floor(pi)"), n(3.0));
    assert_eq!(eval("to_character(65) + to_ascii(\"a\")"), Value::from("A97"));
    assert_eq!(eval("is_number(12)"), Value::Bool(true));
    assert_eq!(eval("is_number(\"12\")"), Value::Bool(false));
    assert_eq!(eval("sqrt(-1)"), Value::Undefined);

    let r = eval("random");
    let r = match r {
        Value::Number(x) => x.get(),
        x => panic!("{x:?}"),
    };
    assert!((0.0..1.0).contains(&r));
    assert_eq!(eval("random"), eval("random()"));

    let mut env = Environment::new();
    assert_eq!(eval_in(&mut env, "sqrt(1, 2)").unwrap_err(), ErrorCause::ArgCount { name: "sqrt".into(), expected: Arity::Exact(1), got: 2 });
    assert_eq!(eval_in(&mut env, "max()").unwrap_err(), ErrorCause::ArgCount { name: "max".into(), expected: Arity::AtLeast(1), got: 0 });
    assert_eq!(eval_in(&mut env, "frobnicate(1)").unwrap_err(), ErrorCause::UndefinedFunction { name: "frobnicate".into() });
    assert_eq!(eval_in(&mut env, "sqrt(\"x\")").unwrap_err(), ErrorCause::ConversionError { got: Type::String, expected: Type::Number });
}
