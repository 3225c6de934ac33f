use std::prelude::v1::*;
use std::collections::BTreeMap;

use compact_str::CompactString;

use crate::flowchart::Node;
use crate::program::*;
use crate::records::PrimitiveType;
use crate::registry::RAPTOR_LIBRARY;

mod decoder;
mod expr;
mod program;

const RAPTOR_ASSEMBLY: &str = "raptor, Version=4.0.5.0003, Culture=neutral, PublicKeyToken=null";

/// The declared type of a class member.
#[derive(Debug, Clone, Copy)]
pub enum Field {
    Int32,
    Int16,
    Byte,
    Boolean,
    DateTime,
    Double,
    String,
    Object,
    /// A system class, by name.
    System(&'static str),
    /// A user class, by name and library id.
    Class(&'static str, i32),
}
impl Field {
    fn binary_type(self) -> u8 {
        match self {
            Field::Int32 | Field::Int16 | Field::Byte | Field::Boolean | Field::DateTime | Field::Double => 0,
            Field::String => 1,
            Field::Object => 2,
            Field::System(_) => 3,
            Field::Class(..) => 4,
        }
    }
}

/// Writes raw records of the binary stream format.
#[derive(Default)]
pub struct StreamBuilder {
    bytes: Vec<u8>,
}
impl StreamBuilder {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn finish(self) -> Vec<u8> {
        self.bytes
    }

    pub fn u8(&mut self, value: u8) -> &mut Self {
        self.bytes.push(value);
        self
    }
    pub fn i16(&mut self, value: i16) -> &mut Self {
        self.bytes.extend(value.to_le_bytes());
        self
    }
    pub fn i32(&mut self, value: i32) -> &mut Self {
        self.bytes.extend(value.to_le_bytes());
        self
    }
    pub fn u64(&mut self, value: u64) -> &mut Self {
        self.bytes.extend(value.to_le_bytes());
        self
    }
    pub fn string(&mut self, value: &str) -> &mut Self {
        let mut len = value.chars().count();
        loop {
            let byte = (len & 0x7f) as u8;
            len >>= 7;
            match len {
                0 => { self.bytes.push(byte); break }
                _ => self.bytes.push(byte | 0x80),
            }
        }
        self.bytes.extend(value.chars().map(|x| x as u8));
        self
    }

    pub fn header(&mut self, top_id: i32) -> &mut Self {
        self.u8(0).i32(top_id).i32(-1).i32(1).i32(0)
    }
    pub fn end(&mut self) -> &mut Self {
        self.u8(11)
    }
    pub fn assembly(&mut self, id: i32, name: &str) -> &mut Self {
        self.u8(12).i32(id).string(name)
    }
    /// Declares a class and starts an instance of it.
    /// Classes without a library are written as system classes.
    pub fn class(&mut self, id: i32, name: &str, fields: &[(&str, Field)], library: Option<i32>) -> &mut Self {
        self.u8(if library.is_some() { 5 } else { 4 }).i32(id).string(name).i32(fields.len() as i32);
        for (name, _) in fields {
            self.string(name);
        }
        for (_, field) in fields {
            self.u8(field.binary_type());
        }
        for (_, field) in fields {
            match field {
                Field::Int32 => { self.u8(PrimitiveType::Int32 as u8); }
                Field::Int16 => { self.u8(PrimitiveType::Int16 as u8); }
                Field::Byte => { self.u8(PrimitiveType::Byte as u8); }
                Field::Boolean => { self.u8(PrimitiveType::Boolean as u8); }
                Field::DateTime => { self.u8(PrimitiveType::DateTime as u8); }
                Field::Double => { self.u8(PrimitiveType::Double as u8); }
                Field::String | Field::Object => (),
                Field::System(class) => { self.string(class); }
                Field::Class(class, library) => { self.string(class).i32(*library); }
            }
        }
        if let Some(library) = library {
            self.i32(library);
        }
        self
    }
    /// Starts another instance of a class declared by object `map_id`.
    pub fn object(&mut self, id: i32, map_id: i32) -> &mut Self {
        self.u8(1).i32(id).i32(map_id)
    }
    pub fn string_object(&mut self, id: i32, value: &str) -> &mut Self {
        self.u8(6).i32(id).string(value)
    }
    pub fn object_array(&mut self, id: i32, len: i32) -> &mut Self {
        self.u8(16).i32(id).i32(len)
    }
    pub fn primitive_array(&mut self, id: i32, len: i32, kind: PrimitiveType) -> &mut Self {
        self.u8(15).i32(id).i32(len).u8(kind as u8)
    }
    pub fn typed_int(&mut self, value: i32) -> &mut Self {
        self.u8(8).u8(PrimitiveType::Int32 as u8).i32(value)
    }
    pub fn reference(&mut self, id: i32) -> &mut Self {
        self.u8(9).i32(id)
    }
    pub fn null(&mut self) -> &mut Self {
        self.u8(10)
    }
    pub fn nulls_256(&mut self, count: u8) -> &mut Self {
        self.u8(13).u8(count)
    }
    pub fn nulls(&mut self, count: i32) -> &mut Self {
        self.u8(14).i32(count)
    }
}

/// A flowchart component, with its control-flow successors given by its position in a list.
#[derive(Debug, Clone)]
pub enum C {
    /// A terminal with the given label (`Start` or `End`).
    Oval(&'static str),
    /// A procedure entry terminal with the given header.
    Proc(&'static str),
    Assign(&'static str),
    Call(&'static str),
    Output(&'static str),
    /// An input component with the given prompt and target.
    Input(&'static str, &'static str),
    If(&'static str, Vec<C>, Vec<C>),
    Loop(&'static str, Vec<C>, Vec<C>),
}

const COMPONENT: Field = Field::Class("raptor.Component", RAPTOR_LIBRARY);
const OVAL_FIELDS: &[(&str, Field)] = &[("_text_str", Field::String), ("_Successor", COMPONENT), ("_head_width", Field::Int32)];
const RECTANGLE_FIELDS: &[(&str, Field)] = &[("_text_str", Field::String), ("_Successor", COMPONENT), ("_kind", Field::Class("raptor.Rectangle+Kind_Of", RAPTOR_LIBRARY))];
const IF_FIELDS: &[(&str, Field)] = &[("_text_str", Field::String), ("_Successor", COMPONENT), ("_left_Child", COMPONENT), ("_right_Child", COMPONENT)];
const LOOP_FIELDS: &[(&str, Field)] = &[("_text_str", Field::String), ("_Successor", COMPONENT), ("_before_Child", COMPONENT), ("_after_Child", COMPONENT)];
const PARALLELOGRAM_FIELDS: &[(&str, Field)] = &[("_text_str", Field::String), ("_Successor", COMPONENT), ("_prompt", Field::String), ("_is_input", Field::Boolean)];
const ENUM_FIELDS: &[(&str, Field)] = &[("value__", Field::Int32)];

/// Writes the message holding a subchart's component tree, defining every component inline.
struct ChartWriter {
    stream: StreamBuilder,
    next_id: i32,
    classes: BTreeMap<&'static str, i32>,
}
impl ChartWriter {
    fn alloc(&mut self) -> i32 {
        let id = self.next_id;
        self.next_id += 1;
        if self.next_id == RAPTOR_LIBRARY {
            self.next_id += 1;
        }
        id
    }
    fn instance(&mut self, class: &'static str, fields: &[(&str, Field)]) {
        let id = self.alloc();
        match self.classes.get(class) {
            Some(&map) => { self.stream.object(id, map); }
            None => {
                self.classes.insert(class, id);
                self.stream.class(id, class, fields, Some(RAPTOR_LIBRARY));
            }
        }
    }
    fn text(&mut self, text: &str) {
        match text.is_empty() {
            true => { self.stream.null(); }
            false => {
                let id = self.alloc();
                self.stream.string_object(id, text);
            }
        }
    }
    fn rectangle_kind(&mut self, value: i32) {
        self.instance("raptor.Rectangle+Kind_Of", ENUM_FIELDS);
        self.stream.i32(value);
    }
    fn seq(&mut self, seq: &[C]) {
        let Some((first, rest)) = seq.split_first() else {
            self.stream.null();
            return;
        };
        match first {
            C::Oval(label) | C::Proc(label) => {
                let class = if matches!(first, C::Proc(_)) { "raptor.Oval_Procedure" } else { "raptor.Oval" };
                self.instance(class, OVAL_FIELDS);
                self.text(label);
                self.seq(rest);
                self.stream.i32(90);
            }
            C::Assign(label) | C::Call(label) => {
                self.instance("raptor.Rectangle", RECTANGLE_FIELDS);
                self.text(label);
                self.seq(rest);
                self.rectangle_kind(if matches!(first, C::Call(_)) { 1 } else { 0 });
            }
            C::If(label, yes, no) => {
                self.instance("raptor.IF_Control", IF_FIELDS);
                self.text(label);
                self.seq(rest);
                self.seq(yes);
                self.seq(no);
            }
            C::Loop(label, before, after) => {
                self.instance("raptor.Loop", LOOP_FIELDS);
                self.text(label);
                self.seq(rest);
                self.seq(before);
                self.seq(after);
            }
            C::Output(label) => {
                self.instance("raptor.Parallelogram", PARALLELOGRAM_FIELDS);
                self.text(label);
                self.seq(rest);
                self.text("");
                self.stream.u8(0);
            }
            C::Input(prompt, target) => {
                self.instance("raptor.Parallelogram", PARALLELOGRAM_FIELDS);
                self.text(target);
                self.seq(rest);
                self.text(prompt);
                self.stream.u8(1);
            }
        }
    }
}

/// Encodes a subchart's component tree as a message.
pub fn chart_message(chart: &[C]) -> Vec<u8> {
    let mut writer = ChartWriter { stream: StreamBuilder::new(), next_id: 1, classes: Default::default() };
    writer.stream.header(1).assembly(RAPTOR_LIBRARY, RAPTOR_ASSEMBLY);
    writer.seq(chart);
    writer.stream.end();
    writer.stream.finish()
}

pub fn int_message(value: i32) -> Vec<u8> {
    let mut s = StreamBuilder::new();
    s.header(1).class(1, "System.Int32", &[("m_value", Field::Int32)], None).i32(value).end();
    s.finish()
}
pub fn bool_message(value: bool) -> Vec<u8> {
    let mut s = StreamBuilder::new();
    s.header(1).class(1, "System.Boolean", &[("m_value", Field::Boolean)], None).u8(value as u8).end();
    s.finish()
}
pub fn string_message(value: &str) -> Vec<u8> {
    let mut s = StreamBuilder::new();
    s.header(1).string_object(1, value).end();
    s.finish()
}
pub fn enum_message(class: &str, value: i32) -> Vec<u8> {
    let mut s = StreamBuilder::new();
    s.header(1).assembly(RAPTOR_LIBRARY, RAPTOR_ASSEMBLY).class(1, class, ENUM_FIELDS, Some(RAPTOR_LIBRARY)).i32(value).end();
    s.finish()
}
pub fn array_message(len: i32) -> Vec<u8> {
    let mut s = StreamBuilder::new();
    s.header(1).object_array(1, len);
    if len > 0 {
        s.nulls(len);
    }
    s.end();
    s.finish()
}
pub fn guid_message() -> Vec<u8> {
    let mut fields = vec![("_a", Field::Int32), ("_b", Field::Int16), ("_c", Field::Int16)];
    fields.extend(["_d", "_e", "_f", "_g", "_h", "_i", "_j", "_k"].map(|x| (x, Field::Byte)));
    let mut s = StreamBuilder::new();
    s.header(1).class(1, "System.Guid", &fields, None).i32(0x12345678).i16(0x1234).i16(0x5678);
    for i in 0..8 {
        s.u8(i);
    }
    s.end();
    s.finish()
}
/// A log with one entry by `user` on `machine`.
pub fn logging_message(user: &str, machine: &str, ticks: u64) -> Vec<u8> {
    let fields = [
        ("_count", Field::Int32),
        ("_user0", Field::String),
        ("_machine0", Field::String),
        ("_date0", Field::DateTime),
        ("_kind0", Field::Class("raptor.logging_info+event_kind", RAPTOR_LIBRARY)),
    ];
    let mut s = StreamBuilder::new();
    s.header(1).assembly(RAPTOR_LIBRARY, RAPTOR_ASSEMBLY)
        .class(1, "raptor.logging_info", &fields, Some(RAPTOR_LIBRARY)).i32(1)
        .string_object(3, user)
        .string_object(4, machine)
        .u64(ticks | (1 << 62))
        .class(5, "raptor.logging_info+event_kind", ENUM_FIELDS, Some(RAPTOR_LIBRARY)).i32(2)
        .end();
    s.finish()
}

fn param_count(header: &str) -> i32 {
    match header.split_once('(') {
        Some((_, params)) if !params.trim_end_matches(')').trim().is_empty() => params.matches(',').count() as i32 + 1,
        _ => 0,
    }
}

/// Encodes a whole program as a list of messages.
/// Procedures get kind `1` and a parameter count; other subcharts get kind `0` and no count.
pub fn rap_messages(charts: &[(&str, Vec<C>)]) -> Vec<Vec<u8>> {
    let mut res = vec![int_message(14), bool_message(false), int_message(charts.len() as i32)];
    for (name, chart) in charts {
        res.push(string_message(name));
        match chart.first() {
            Some(C::Proc(header)) => {
                res.push(enum_message("raptor.Subchart_Kinds", 1));
                res.push(int_message(param_count(header)));
            }
            _ => res.push(enum_message("raptor.Subchart_Kinds", 0)),
        }
    }
    for (_, chart) in charts {
        res.push(chart_message(chart));
        res.push(array_message(0));
    }
    res.push(logging_message("student", "LAB-01", 637_000_000_000_000_000));
    res.push(bool_message(true));
    res.push(guid_message());
    res
}
pub fn rap(charts: &[(&str, Vec<C>)]) -> Vec<u8> {
    rap_messages(charts).concat()
}

pub fn load(charts: &[(&str, Vec<C>)]) -> Program {
    Program::load(&rap(charts)).unwrap()
}

/// Steps a program to completion, answering prompts from `inputs` in order, and collects its output.
pub fn run_to_end(program: &mut Program, inputs: &[&str]) -> Result<Vec<CompactString>, ExecError> {
    let mut inputs = inputs.iter();
    let mut outputs = vec![];
    for _ in 0..100000 {
        match program.step()? {
            StepResult::Continue => (),
            StepResult::Output(text) => {
                outputs.push(text);
                program.resume()?;
            }
            StepResult::Input(_) => {
                program.provide_input(inputs.next().expect("ran out of inputs"))?;
                program.resume()?;
            }
            StepResult::Done => return Ok(outputs),
        }
    }
    panic!("program did not finish");
}

/// Gets the component the next step will visit.
pub fn next_node(program: &Program) -> Option<Node> {
    let pos = program.process().position()?;
    program.subcharts()[program.process().chart()].flowchart.get(pos.node).cloned()
}
