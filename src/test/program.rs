use std::prelude::v1::*;

use crate::decoder::DecodeError;
use crate::graph::Object;
use crate::program::*;
use crate::registry::*;

use super::*;

fn hello() -> Vec<(&'static str, Vec<C>)> {
    vec![("main", vec![C::Oval("Start"), C::Output("\"Hello\""), C::Oval("End")])]
}

fn load_messages(messages: Vec<Vec<u8>>) -> Result<Program, LoadError> {
    Program::load(&messages.concat())
}

#[test]
fn test_hello_world() {
    let mut program = load(&hello());

    let mut results = vec![];
    loop {
        let res = program.step().unwrap();
        match &res {
            StepResult::Continue => continue,
            StepResult::Output(_) => program.resume().unwrap(),
            StepResult::Input(_) => panic!(),
            StepResult::Done => (),
        }
        let done = res == StepResult::Done;
        results.push(res);
        if done { break }
    }
    assert_eq!(results, [StepResult::Output("Hello".into()), StepResult::Done]);
}

#[test]
fn test_program_info() {
    let program = load(&[
        ("main", vec![C::Oval("Start"), C::Call("double(2, x)"), C::Oval("End")]),
        ("double", vec![C::Proc("double(in v, out r)"), C::Assign("r := v * 2"), C::Oval("End")]),
        ("helper", vec![C::Oval("Start"), C::Oval("End")]),
    ]);

    let info = program.info();
    assert_eq!(info.version, 14);
    assert!(!info.master_mode);
    assert_eq!(info.logging.count, 1);
    assert_eq!(info.logging.entries, [LogEntry {
        user: Some("student".into()),
        machine: Some("LAB-01".into()),
        ticks: Some(637_000_000_000_000_000),
        kind: Some(2),
    }]);

    let charts = program.subcharts();
    assert_eq!(charts.len(), 3);
    assert_eq!(charts.iter().map(|x| x.name.as_str()).collect::<Vec<_>>(), ["main", "double", "helper"]);
    assert_eq!(charts[0].kind, SubChartKind(0));
    assert_eq!(charts[0].magic, None);
    assert_eq!(charts[1].kind, SubChartKind(1));
    assert_eq!(charts[1].magic, Some(2));
    assert!(matches!(charts[1].trailer.root(), Some(Object::Array(_))));
    assert_eq!(charts[1].flowchart.len(), 3);
    assert_eq!(charts[2].flowchart.walk().len(), 2);

    assert_eq!(program.globals().subchart("DOUBLE"), Some(1));
    assert_eq!(program.globals().subchart("helper"), Some(2));
    assert_eq!(program.globals().subchart("nope"), None);

    let debug = format!("{program:?}");
    assert!(debug.starts_with("Program {"));
    assert!(debug.contains("name: \"double\""));
    assert!(debug.contains("process: Process {"));
    assert!(debug.contains("state: Running"));
}

#[test]
fn test_optional_magic() {
    let mut messages = rap_messages(&[
        ("main", vec![C::Oval("Start"), C::Call("p(1)"), C::Oval("End")]),
        ("p", vec![C::Proc("p(x)"), C::Output("x"), C::Oval("End")]),
    ]);
    assert_eq!(messages.remove(7), int_message(1));
    let mut program = load_messages(messages).unwrap();
    assert_eq!(program.subcharts()[1].magic, None);
    assert_eq!(run_to_end(&mut program, &[]).unwrap(), ["1"]);
}

#[test]
fn test_header_errors() {
    assert_eq!(load_messages(vec![]).unwrap_err(), LoadError::Structure(StructuralError::UnexpectedEnd { expected: "System.Int32" }));

    let messages = vec![int_message(14), bool_message(false), int_message(0)];
    assert_eq!(load_messages(messages).unwrap_err(), LoadError::Structure(StructuralError::NoSubCharts { count: 0 }));

    let messages = vec![int_message(14), bool_message(false), int_message(-3)];
    assert_eq!(load_messages(messages).unwrap_err(), LoadError::Structure(StructuralError::NoSubCharts { count: -3 }));

    let mut messages = rap_messages(&hello());
    messages[0] = string_message("14");
    assert_eq!(load_messages(messages).unwrap_err(), LoadError::Structure(StructuralError::UnexpectedObject {
        expected: "System.Int32",
        found: Some(RootKind::String),
    }));

    let mut messages = rap_messages(&hello());
    messages[1] = int_message(0);
    assert_eq!(load_messages(messages).unwrap_err(), LoadError::Structure(StructuralError::UnexpectedObject {
        expected: "System.Boolean",
        found: Some(RootKind::Instance(ClassKind::SystemInt32)),
    }));

    let mut messages = rap_messages(&hello());
    messages[3] = int_message(0);
    assert_eq!(load_messages(messages).unwrap_err(), LoadError::Structure(StructuralError::UnexpectedObject {
        expected: "a subchart name",
        found: Some(RootKind::Instance(ClassKind::SystemInt32)),
    }));

    let mut messages = rap_messages(&hello());
    messages[4] = enum_message("raptor.Rectangle+Kind_Of", 0);
    assert_eq!(load_messages(messages).unwrap_err(), LoadError::Structure(StructuralError::UnexpectedObject {
        expected: "raptor.Subchart_Kinds",
        found: Some(RootKind::Instance(ClassKind::RectangleKind)),
    }));
}

#[test]
fn test_body_errors() {
    let mut messages = rap_messages(&hello());
    messages.truncate(5);
    assert_eq!(load_messages(messages).unwrap_err(), LoadError::Structure(StructuralError::UnexpectedEnd { expected: "a subchart root component" }));

    let mut messages = rap_messages(&hello());
    messages[6] = int_message(1);
    assert_eq!(load_messages(messages).unwrap_err(), LoadError::Structure(StructuralError::UnexpectedObject {
        expected: "an array",
        found: Some(RootKind::Instance(ClassKind::SystemInt32)),
    }));

    let mut messages = rap_messages(&hello());
    messages.push(int_message(1));
    messages.push(bool_message(true));
    assert_eq!(load_messages(messages).unwrap_err(), LoadError::Structure(StructuralError::TrailingMessages { count: 2 }));

    let mut messages = rap_messages(&hello());
    messages.pop();
    assert_eq!(load_messages(messages).unwrap_err(), LoadError::Structure(StructuralError::UnexpectedEnd { expected: "System.Guid" }));

    let mut messages = rap_messages(&hello());
    messages.swap(7, 8);
    assert_eq!(load_messages(messages).unwrap_err(), LoadError::Structure(StructuralError::UnexpectedObject {
        expected: "raptor.logging_info",
        found: Some(RootKind::Instance(ClassKind::SystemBoolean)),
    }));

    let charts = [
        ("main", vec![C::Oval("Start"), C::Oval("End")]),
        ("Main", vec![C::Oval("Start"), C::Oval("End")]),
    ];
    assert_eq!(Program::load(&rap(&charts)).unwrap_err(), LoadError::Structure(StructuralError::DuplicateSubChart { name: "Main".into() }));

    let mut bytes = rap(&hello());
    bytes.truncate(bytes.len() - 3);
    assert!(matches!(Program::load(&bytes).unwrap_err(), LoadError::Decode(DecodeError::UnexpectedEof { .. })));
}

#[test]
fn test_component_errors() {
    let charts = [("main", vec![C::Assign("x := 1"), C::Oval("End")])];
    assert_eq!(Program::load(&rap(&charts)).unwrap_err(), LoadError::Structure(StructuralError::BadRootComponent { class: Some(ClassKind::Rectangle) }));

    let mut messages = rap_messages(&hello());
    messages[5] = string_message("Start");
    assert_eq!(load_messages(messages).unwrap_err(), LoadError::Structure(StructuralError::BadRootComponent { class: None }));

    let oval = &[("_text_str", Field::String), ("_Successor", Field::Object)];
    let rectangle = &[("_text_str", Field::String), ("_Successor", Field::Object), ("_kind", Field::Class("raptor.Rectangle+Kind_Of", RAPTOR_LIBRARY))];

    let mut s = StreamBuilder::new();
    s.header(1).assembly(RAPTOR_LIBRARY, "raptor")
        .class(1, "raptor.Oval", oval, Some(RAPTOR_LIBRARY))
            .string_object(3, "Start")
            .class(4, "raptor.Rectangle", rectangle, Some(RAPTOR_LIBRARY))
                .string_object(5, "x := 1")
                .null()
                .class(6, "raptor.Rectangle+Kind_Of", &[("value__", Field::Int32)], Some(RAPTOR_LIBRARY)).i32(7)
        .end();
    let mut messages = rap_messages(&hello());
    messages[5] = s.finish();
    assert_eq!(load_messages(messages).unwrap_err(), LoadError::Structure(StructuralError::BadRectangleKind { id: 4, value: 7 }));

    let mut s = StreamBuilder::new();
    s.header(1).assembly(RAPTOR_LIBRARY, "raptor")
        .class(1, "raptor.Oval", oval, Some(RAPTOR_LIBRARY))
            .string_object(3, "Start")
            .string_object(4, "End")
        .end();
    let mut messages = rap_messages(&hello());
    messages[5] = s.finish();
    assert_eq!(load_messages(messages).unwrap_err(), LoadError::Structure(StructuralError::NotAComponent { id: 4, class: None }));

    let mut s = StreamBuilder::new();
    s.header(1).assembly(RAPTOR_LIBRARY, "raptor")
        .class(1, "raptor.Oval", oval, Some(RAPTOR_LIBRARY))
            .typed_int(3)
            .null()
        .end();
    let mut messages = rap_messages(&hello());
    messages[5] = s.finish();
    assert_eq!(load_messages(messages).unwrap_err(), LoadError::Structure(StructuralError::BadMember { id: 1, member: "_text_str" }));
}

#[test]
fn test_error_messages() {
    let e = LoadError::Structure(StructuralError::DuplicateSubChart { name: "Main".into() });
    assert_eq!(format!("{e}"), "invalid program: subchart 'Main' is defined more than once");

    let e = LoadError::Structure(StructuralError::BadRootComponent { class: Some(ClassKind::Loop) });
    assert_eq!(format!("{e}"), "invalid program: a subchart starts with raptor.Loop, not an oval");

    let e = LoadError::Decode(DecodeError::UnresolvedReference { id: 12 });
    assert_eq!(format!("{e}"), "decode error: reference to object 12 was never resolved");
}
