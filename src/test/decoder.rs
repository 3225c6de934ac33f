use std::prelude::v1::*;

use alloc::rc::Rc;

use crate::decoder::*;
use crate::flowchart::*;
use crate::graph::*;
use crate::records::*;
use crate::registry::*;

use super::*;

fn decode_one(bytes: &[u8]) -> Message {
    let mut messages = decode(bytes).unwrap();
    assert_eq!(messages.len(), 1);
    messages.pop().unwrap()
}

#[test]
fn test_decode_message_sequence() {
    let bytes = [int_message(-17), string_message("main"), bool_message(true)].concat();
    let messages = decode(&bytes).unwrap();
    assert_eq!(messages.len(), 3);

    let int = messages[0].root_instance().unwrap();
    assert_eq!(int.kind(), ClassKind::SystemInt32);
    assert_eq!(int.int("m_value"), Some(-17));
    assert_eq!(messages[0].header.major_version, 1);

    match messages[1].root() {
        Some(Object::String(x)) => assert_eq!(x, "main"),
        x => panic!("{x:?}"),
    }
    assert_eq!(messages[2].root_instance().unwrap().boolean("m_value"), Some(true));

    assert!(decode(&[]).unwrap().is_empty());
}

#[test]
fn test_decode_latin1_strings() {
    let message = decode_one(&string_message("caf\u{e9} \u{b0}C"));
    match message.root() {
        Some(Object::String(x)) => assert_eq!(x, "caf\u{e9} \u{b0}C"),
        x => panic!("{x:?}"),
    }

    let long: String = core::iter::repeat('x').take(300).collect();
    let message = decode_one(&string_message(&long));
    assert_eq!(message.graph.string(1), Some(long.as_str()));
}

#[test]
fn test_decode_class_reuse() {
    let mut s = StreamBuilder::new();
    s.header(1).assembly(RAPTOR_LIBRARY, "raptor")
        .class(1, "raptor.Oval", &[("_text_str", Field::String), ("_Successor", Field::Object), ("_head_width", Field::Int32)], Some(RAPTOR_LIBRARY))
            .string_object(3, "Start")
            .object(4, 1)
                .null()
                .null()
                .i32(7)
            .i32(90)
        .end();
    let message = decode_one(&s.finish());
    assert_eq!(message.root_id(), 1);
    assert_eq!(message.graph.len(), 3);
    assert_eq!(message.libraries.get(&RAPTOR_LIBRARY).map(|x| x.as_str()), Some("raptor"));

    let first = message.graph.instance(1).unwrap();
    let second = message.graph.instance(4).unwrap();
    assert!(Rc::ptr_eq(&first.class, &second.class));
    assert_eq!(first.kind(), ClassKind::Oval);
    assert_eq!(first.member("_text_str"), Some(&Member::Ref(3)));
    assert_eq!(first.member("_Successor"), Some(&Member::Ref(4)));
    assert_eq!(first.int("_head_width"), Some(90));
    assert_eq!(second.member("_text_str"), Some(&Member::Null));
    assert_eq!(second.int("_head_width"), Some(7));
    assert_eq!(message.graph.string(3), Some("Start"));

    let names = first.members().map(|x| x.0).collect::<Vec<_>>();
    assert_eq!(names, ["_text_str", "_Successor", "_head_width"]);
}

#[test]
fn test_decode_forward_references() {
    let mut s = StreamBuilder::new();
    s.header(1).assembly(RAPTOR_LIBRARY, "raptor")
        .class(1, "raptor.IF_Control", &[
            ("_text_str", Field::String),
            ("_Successor", Field::Object),
            ("_left_Child", Field::Object),
            ("_right_Child", Field::Object),
        ], Some(RAPTOR_LIBRARY))
            .string_object(3, "x > 1")
            .reference(5)
            .reference(5)
            .null()
        .class(5, "raptor.Oval", &[("_text_str", Field::String), ("_Successor", Field::Object)], Some(RAPTOR_LIBRARY))
            .string_object(6, "End")
            .reference(1)
        .end();
    let message = decode_one(&s.finish());

    let root = message.graph.instance(1).unwrap();
    assert_eq!(root.member("_Successor"), Some(&Member::Ref(5)));
    assert_eq!(root.member("_left_Child"), Some(&Member::Ref(5)));
    assert_eq!(root.member("_right_Child"), Some(&Member::Null));
    assert_eq!(message.graph.instance(5).unwrap().member("_Successor"), Some(&Member::Ref(1)));
    assert!(message.graph.iter().all(|(_, x)| match x {
        Object::Instance(x) => x.values.iter().all(|x| !matches!(x, Member::Pending(_))),
        _ => true,
    }));

    let chart = Flowchart::lower(&message.graph, 5).unwrap();
    assert_eq!(chart.len(), 2);
    assert_eq!(chart.get(1).unwrap().kind, NodeKind::IfControl { left: Some(5), right: None });
    assert_eq!(chart.get(1).unwrap().successor, Some(5));
    assert_eq!(chart.get(5).unwrap().successor, Some(1));
    assert_eq!(chart.walk(), [5, 1]);
}

#[test]
fn test_decode_null_runs() {
    let mut s = StreamBuilder::new();
    s.header(1).object_array(1, 9)
        .string_object(2, "a")
        .nulls_256(3)
        .typed_int(7)
        .nulls(2)
        .reference(2)
        .null()
        .end();
    let message = decode_one(&s.finish());
    match message.root() {
        Some(Object::Array(array)) => {
            assert_eq!(array.len, 9);
            assert_eq!(array.items, [
                Member::Ref(2), Member::Null, Member::Null, Member::Null,
                Member::Primitive(Primitive::Int32(7)), Member::Null, Member::Null,
                Member::Ref(2), Member::Null,
            ]);
        }
        x => panic!("{x:?}"),
    }

    let mut s = StreamBuilder::new();
    s.header(1).object_array(1, 3).null().nulls_256(5).end();
    match decode(&s.finish()).unwrap_err() {
        DecodeError::NullRunOverflow { count: 5, remaining: 2, .. } => (),
        x => panic!("{x:?}"),
    }
}

#[test]
fn test_decode_arrays() {
    let mut s = StreamBuilder::new();
    s.header(1).primitive_array(1, 3, PrimitiveType::Int32).i32(4).i32(-5).i32(6).end();
    match decode_one(&s.finish()).root() {
        Some(Object::Array(array)) => {
            assert_eq!(array.element.type_info, TypeInfo::Primitive(PrimitiveType::Int32));
            assert_eq!(array.items, [4, -5, 6].map(|x| Member::Primitive(Primitive::Int32(x))));
        }
        x => panic!("{x:?}"),
    }

    let mut s = StreamBuilder::new();
    s.header(1).u8(7).i32(1).u8(0).i32(1).i32(2).u8(1).string_object(2, "a").null().end();
    match decode_one(&s.finish()).root() {
        Some(Object::Array(array)) => assert_eq!(array.items, [Member::Ref(2), Member::Null]),
        x => panic!("{x:?}"),
    }

    let message = decode_one(&array_message(0));
    match message.root() {
        Some(Object::Array(array)) => assert!(array.items.is_empty()),
        x => panic!("{x:?}"),
    }

    let mut s = StreamBuilder::new();
    s.header(1).object_array(1, MAX_ARRAY_LEN as i32).nulls(MAX_ARRAY_LEN as i32).end();
    match decode_one(&s.finish()).root() {
        Some(Object::Array(array)) => assert_eq!(array.items.len(), MAX_ARRAY_LEN),
        x => panic!("{x:?}"),
    }

    let mut s = StreamBuilder::new();
    s.header(1).object_array(1, 0x7fff_ffff).nulls(0x7fff_ffff).end();
    assert_eq!(decode(&s.finish()).unwrap_err(), DecodeError::ArrayTooLarge { pos: 17, len: 0x7fff_ffff, limit: MAX_ARRAY_LEN });

    let mut s = StreamBuilder::new();
    s.header(1).u8(7).i32(1).u8(0).i32(1).i32(MAX_ARRAY_LEN as i32 + 1).u8(1).end();
    assert_eq!(decode(&s.finish()).unwrap_err(), DecodeError::ArrayTooLarge { pos: 17, len: MAX_ARRAY_LEN + 1, limit: MAX_ARRAY_LEN });

    let mut s = StreamBuilder::new();
    s.header(1).u8(7).i32(1).u8(2).i32(2).i32(2).i32(2).u8(2).end();
    match decode(&s.finish()).unwrap_err() {
        DecodeError::UnsupportedArrayShape { shape: BinaryArrayType::Rectangular, rank: 2, .. } => (),
        x => panic!("{x:?}"),
    }
}

#[test]
fn test_decode_reference_errors() {
    let mut s = StreamBuilder::new();
    s.header(1).object_array(1, 1).reference(9).end();
    assert_eq!(decode(&s.finish()).unwrap_err(), DecodeError::UnresolvedReference { id: 9 });

    let mut s = StreamBuilder::new();
    s.header(4).object_array(1, 0).end();
    assert_eq!(decode(&s.finish()).unwrap_err(), DecodeError::MissingRoot { id: 4 });

    let mut s = StreamBuilder::new();
    s.header(1).object_array(1, 2).string_object(1, "again");
    match decode(&s.finish()).unwrap_err() {
        DecodeError::DuplicateObject { id: 1, .. } => (),
        x => panic!("{x:?}"),
    }

    let mut s = StreamBuilder::new();
    s.header(1).object_array(1, 2).null().end();
    match decode(&s.finish()).unwrap_err() {
        DecodeError::UnexpectedMessageEnd { id: 1, .. } => (),
        x => panic!("{x:?}"),
    }

    let mut s = StreamBuilder::new();
    s.header(1).null();
    assert_eq!(decode(&s.finish()).unwrap_err(), DecodeError::NoContainer { pos: 17 });
}

#[test]
fn test_decode_class_errors() {
    let mut s = StreamBuilder::new();
    s.header(1).class(1, "raptor.Oval", &[("_text_str", Field::String), ("_Successor", Field::Object)], Some(RAPTOR_LIBRARY));
    assert_eq!(decode(&s.finish()).unwrap_err(), DecodeError::UndeclaredLibrary { pos: 17, library_id: RAPTOR_LIBRARY });

    let mut s = StreamBuilder::new();
    s.header(1).assembly(RAPTOR_LIBRARY, "raptor").class(1, "raptor.Hexagon", &[], Some(RAPTOR_LIBRARY));
    match decode(&s.finish()).unwrap_err() {
        DecodeError::UnknownClass { library_id: RAPTOR_LIBRARY, name, .. } => assert_eq!(name, "raptor.Hexagon"),
        x => panic!("{x:?}"),
    }

    let mut s = StreamBuilder::new();
    s.header(1).assembly(RAPTOR_LIBRARY, "raptor").class(1, "raptor.Oval", &[("_text_str", Field::String)], Some(RAPTOR_LIBRARY));
    match decode(&s.finish()).unwrap_err() {
        DecodeError::MissingMember { class: ClassKind::Oval, member: "_Successor", .. } => (),
        x => panic!("{x:?}"),
    }

    let mut s = StreamBuilder::new();
    s.header(1).object(1, 8);
    match decode(&s.finish()).unwrap_err() {
        DecodeError::UnknownClassMap { map_id: 8, .. } => (),
        x => panic!("{x:?}"),
    }
}

#[test]
fn test_decode_unsupported() {
    let mut s = StreamBuilder::new();
    s.header(1).class(1, "System.Int32", &[("m_value", Field::Double)], None).u64(0);
    match decode(&s.finish()).unwrap_err() {
        DecodeError::UnsupportedPrimitive { kind: PrimitiveType::Double, .. } => (),
        x => panic!("{x:?}"),
    }

    for tag in [2, 3, 18, 19, 20, 21, 22] {
        let mut s = StreamBuilder::new();
        s.header(1).u8(tag).i32(0).i32(0);
        match decode(&s.finish()).unwrap_err() {
            DecodeError::UnsupportedRecord { pos: 17, tag: x } => assert_eq!(x as u8, tag),
            x => panic!("{x:?}"),
        }
    }

    let mut s = StreamBuilder::new();
    s.header(1).u8(0x30);
    assert_eq!(decode(&s.finish()).unwrap_err(), DecodeError::UnknownRecordTag { pos: 17, tag: 0x30 });

    let mut s = StreamBuilder::new();
    s.header(1).header(1);
    assert_eq!(decode(&s.finish()).unwrap_err(), DecodeError::UnexpectedRecord { pos: 17, tag: RecordTag::SerializedStreamHeader });

    let mut s = StreamBuilder::new();
    s.end();
    assert_eq!(decode(&s.finish()).unwrap_err(), DecodeError::MissingHeader { pos: 0, tag: RecordTag::MessageEnd });
}

#[test]
fn test_decode_truncated() {
    let bytes = int_message(5);
    for len in 1..bytes.len() {
        match decode(&bytes[..len]).unwrap_err() {
            DecodeError::UnexpectedEof { .. } => (),
            x => panic!("{len}: {x:?}"),
        }
    }
}
