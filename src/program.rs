//! Loading of `.rap` programs and the host-facing API.
//!
//! A `.rap` file is a sequence of messages, each holding one top-level value:
//!
//! 1. the serialization version (`System.Int32`), the master mode flag (`System.Boolean`), and the subchart count (`System.Int32`)
//! 2. per subchart: its name (a string), its kind (`Subchart_Kinds`), and optionally a `System.Int32` of unknown meaning
//! 3. per subchart: its root component (`Oval` or `Oval_Procedure`), followed by an array of unknown meaning
//! 4. the `logging_info` record, a `System.Boolean`, and a `System.Guid`
//!
//! Values of unknown meaning are checked for shape and otherwise kept as is.

use alloc::collections::BTreeMap;
use alloc::rc::Rc;
use alloc::vec::{self, Vec};
use core::fmt;
use core::iter::Peekable;

use compact_str::CompactString;
use educe::Educe;

use crate::decoder::{decode, DecodeError};
use crate::flowchart::*;
use crate::graph::*;
use crate::registry::ClassKind;
use crate::runtime::*;

pub use crate::process::{ExecError, Location, ProcessState, StepResult, Block};
use crate::process::Process;

/// The kind of top-level value a message held, for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootKind {
    Instance(ClassKind),
    String,
    Array,
}

/// A message sequence that decoded fine but does not have the shape of a program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuralError {
    /// The subchart count was zero or negative.
    NoSubCharts { count: i32 },
    /// The stream ended where a message holding `expected` should have been.
    UnexpectedEnd { expected: &'static str },
    /// A message held the wrong kind of value (`found` is [`None`] if its root is missing).
    UnexpectedObject { expected: &'static str, found: Option<RootKind> },
    /// Two subcharts have the same (case-insensitive) name.
    DuplicateSubChart { name: CompactString },
    /// There were `count` more messages after the final one.
    TrailingMessages { count: usize },
    /// A subchart's root is not an `Oval` or `Oval_Procedure`.
    BadRootComponent { class: Option<ClassKind> },
    /// A component link pointed at object `id`, which is not a component.
    NotAComponent { id: ObjectId, class: Option<ClassKind> },
    /// A member of component `id` had the wrong kind of value.
    BadMember { id: ObjectId, member: &'static str },
    /// A rectangle had an unknown kind.
    BadRectangleKind { id: ObjectId, value: i32 },
}
impl fmt::Display for StructuralError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructuralError::NoSubCharts { count } => write!(f, "there are no subcharts (count is {count})"),
            StructuralError::UnexpectedEnd { expected } => write!(f, "expected {expected}, but the file ended"),
            StructuralError::UnexpectedObject { expected, found: Some(found) } => write!(f, "expected {expected}, but found {found:?}"),
            StructuralError::UnexpectedObject { expected, found: None } => write!(f, "expected {expected}, but found nothing"),
            StructuralError::DuplicateSubChart { name } => write!(f, "subchart '{name}' is defined more than once"),
            StructuralError::TrailingMessages { count } => write!(f, "{count} unexpected message(s) at the end of the file"),
            StructuralError::BadRootComponent { class: Some(class) } => write!(f, "a subchart starts with {}, not an oval", class.name()),
            StructuralError::BadRootComponent { class: None } => f.write_str("a subchart does not start with a component"),
            StructuralError::NotAComponent { id, class: Some(class) } => write!(f, "object {id} is linked as a component, but is {}", class.name()),
            StructuralError::NotAComponent { id, class: None } => write!(f, "object {id} is linked as a component, but is not one"),
            StructuralError::BadMember { id, member } => write!(f, "component {id} has an invalid '{member}'"),
            StructuralError::BadRectangleKind { id, value } => write!(f, "component {id} has unknown rectangle kind {value}"),
        }
    }
}

/// An error while loading a program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    Decode(DecodeError),
    Structure(StructuralError),
}
impl From<DecodeError> for LoadError { fn from(e: DecodeError) -> Self { Self::Decode(e) } }
impl From<StructuralError> for LoadError { fn from(e: StructuralError) -> Self { Self::Structure(e) } }
impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::Decode(e) => write!(f, "decode error: {e}"),
            LoadError::Structure(e) => write!(f, "invalid program: {e}"),
        }
    }
}

/// The raw value of a subchart's `Subchart_Kinds` enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubChartKind(pub i32);

/// A named subchart or procedure.
#[derive(Debug)]
pub struct SubChart {
    pub name: CompactString,
    pub kind: SubChartKind,
    /// The optional number that follows the kind, whose meaning is unknown.
    pub magic: Option<i32>,
    pub flowchart: Flowchart,
    /// The array message that follows the root component, whose meaning is unknown.
    pub trailer: Message,
}

/// One entry of the edit log kept in a `.rap` file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogEntry {
    pub user: Option<CompactString>,
    pub machine: Option<CompactString>,
    /// The time of the entry, in 100ns ticks since 0001-01-01.
    pub ticks: Option<u64>,
    /// The raw value of the entry's `event_kind` enum.
    pub kind: Option<i32>,
}

/// The edit log kept in a `.rap` file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggingInfo {
    pub count: i32,
    /// Entries in index order.
    pub entries: Vec<LogEntry>,
}
impl LoggingInfo {
    /// Collects the indexed members (e.g. `_user0`, `_date0`, `_kind0`) of a `logging_info` record.
    fn from_instance(graph: &ObjectGraph, instance: &Instance) -> Self {
        let mut entries: BTreeMap<usize, LogEntry> = BTreeMap::new();
        for (name, value) in instance.members() {
            let prefix = name.trim_end_matches(|c: char| c.is_ascii_digit());
            let Ok(index) = name[prefix.len()..].parse::<usize>() else { continue };
            let entry = entries.entry(index).or_default();
            match (prefix, value) {
                ("_user", Member::Ref(id)) => entry.user = graph.string(*id).map(CompactString::new),
                ("_machine", Member::Ref(id)) => entry.machine = graph.string(*id).map(CompactString::new),
                ("_date", Member::Primitive(x)) => entry.ticks = x.ticks(),
                ("_kind", Member::Ref(id)) => entry.kind = graph.instance(*id).and_then(|x| x.int("value__")),
                ("_kind", Member::Primitive(Primitive::Int32(x))) => entry.kind = Some(*x),
                _ => (),
            }
        }
        Self {
            count: instance.int("_count").unwrap_or_default(),
            entries: entries.into_values().collect(),
        }
    }
}

/// Program-wide information read from a `.rap` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramInfo {
    pub version: i32,
    pub master_mode: bool,
    pub logging: LoggingInfo,
}

fn root_kind(message: &Message) -> Option<RootKind> {
    Some(match message.root()? {
        Object::Instance(x) => RootKind::Instance(x.kind()),
        Object::String(_) => RootKind::String,
        Object::Array(_) => RootKind::Array,
    })
}

/// A cursor over the messages of a file.
struct Messages {
    iter: Peekable<vec::IntoIter<Message>>,
}
impl Messages {
    fn next(&mut self, expected: &'static str) -> Result<Message, StructuralError> {
        self.iter.next().ok_or(StructuralError::UnexpectedEnd { expected })
    }
    /// Reads a message whose root is an instance of `class`.
    fn instance(&mut self, class: ClassKind) -> Result<Message, StructuralError> {
        let message = self.next(class.name())?;
        match message.root_instance() {
            Some(x) if x.kind() == class => Ok(message),
            _ => Err(StructuralError::UnexpectedObject { expected: class.name(), found: root_kind(&message) }),
        }
    }
    fn int(&mut self) -> Result<i32, StructuralError> {
        let message = self.instance(ClassKind::SystemInt32)?;
        message.root_instance().and_then(|x| x.int("m_value"))
            .ok_or(StructuralError::UnexpectedObject { expected: "System.Int32", found: root_kind(&message) })
    }
    fn boolean(&mut self) -> Result<bool, StructuralError> {
        let message = self.instance(ClassKind::SystemBoolean)?;
        message.root_instance().and_then(|x| x.boolean("m_value"))
            .ok_or(StructuralError::UnexpectedObject { expected: "System.Boolean", found: root_kind(&message) })
    }
    fn string(&mut self) -> Result<CompactString, StructuralError> {
        let message = self.next("a subchart name")?;
        match message.root() {
            Some(Object::String(x)) => Ok(x.clone()),
            _ => Err(StructuralError::UnexpectedObject { expected: "a subchart name", found: root_kind(&message) }),
        }
    }
    fn peek_is(&mut self, class: ClassKind) -> bool {
        self.iter.peek().and_then(Message::root_instance).is_some_and(|x| x.kind() == class)
    }
}

/// A loaded program together with the process running it.
#[derive(Educe)]
#[educe(Debug)]
pub struct Program {
    charts: Rc<[SubChart]>,
    #[educe(Debug(ignore))]
    globals: Rc<GlobalRegistry>,
    info: ProgramInfo,
    process: Process,
}
impl Program {
    /// Loads a program from the contents of a `.rap` file with default settings.
    pub fn load(bytes: &[u8]) -> Result<Self, LoadError> {
        Self::load_with_settings(bytes, Settings::default())
    }
    pub fn load_with_settings(bytes: &[u8], settings: Settings) -> Result<Self, LoadError> {
        Ok(Self::from_messages(decode(bytes)?, settings)?)
    }
    /// Builds a program from the decoded messages of a `.rap` file.
    pub fn from_messages(messages: Vec<Message>, settings: Settings) -> Result<Self, StructuralError> {
        let mut messages = Messages { iter: messages.into_iter().peekable() };

        let version = messages.int()?;
        let master_mode = messages.boolean()?;
        let count = messages.int()?;
        if count <= 0 {
            return Err(StructuralError::NoSubCharts { count });
        }

        let mut headers = vec![];
        for _ in 0..count {
            let name = messages.string()?;
            let kind = messages.instance(ClassKind::SubChartKind)?;
            let kind = kind.root_instance().and_then(|x| x.int("value__"))
                .ok_or(StructuralError::UnexpectedObject { expected: ClassKind::SubChartKind.name(), found: root_kind(&kind) })?;
            let magic = match messages.peek_is(ClassKind::SystemInt32) {
                true => Some(messages.int()?),
                false => None,
            };
            headers.push((name, SubChartKind(kind), magic));
        }

        let mut globals = GlobalRegistry::standard();
        let mut charts = Vec::with_capacity(headers.len());
        for (index, (name, kind, magic)) in headers.into_iter().enumerate() {
            let root = messages.next("a subchart root component")?;
            let flowchart = Flowchart::lower(&root.graph, root.root_id())?;
            let trailer = messages.next("an array")?;
            if root_kind(&trailer) != Some(RootKind::Array) {
                return Err(StructuralError::UnexpectedObject { expected: "an array", found: root_kind(&trailer) });
            }
            if !globals.define_subchart(&name, index) {
                return Err(StructuralError::DuplicateSubChart { name });
            }
            charts.push(SubChart { name, kind, magic, flowchart, trailer });
        }

        let logging = messages.instance(ClassKind::LoggingInfo)?;
        let logging = match logging.root_instance() {
            Some(x) => LoggingInfo::from_instance(&logging.graph, x),
            None => LoggingInfo::default(),
        };
        messages.boolean()?;
        messages.instance(ClassKind::SystemGuid)?;
        let rest = messages.iter.count();
        if rest != 0 {
            return Err(StructuralError::TrailingMessages { count: rest });
        }

        let charts: Rc<[SubChart]> = charts.into();
        let globals = Rc::new(globals);
        let process = Process::new(charts.clone(), globals.clone(), settings);
        Ok(Self { charts, globals, info: ProgramInfo { version, master_mode, logging }, process })
    }

    pub fn info(&self) -> &ProgramInfo {
        &self.info
    }
    /// The subcharts of the program; the first one is where execution starts.
    pub fn subcharts(&self) -> &[SubChart] {
        &self.charts
    }
    pub fn globals(&self) -> &GlobalRegistry {
        &self.globals
    }
    pub fn process(&self) -> &Process {
        &self.process
    }
    pub fn state(&self) -> &ProcessState {
        self.process.state()
    }
    /// Gets the value of a variable of the main subchart.
    pub fn variable(&self, name: &str) -> Option<Value> {
        self.process.env().globals().lookup(&name.to_lowercase()).map(|x| x.get().clone())
    }

    /// Executes a single component. See [`Process::step`].
    pub fn step(&mut self) -> Result<StepResult, ExecError> {
        self.process.step()
    }
    /// Answers the pending input prompt. See [`Process::provide_input`].
    pub fn provide_input(&mut self, answer: &str) -> Result<(), ExecError> {
        self.process.provide_input(answer)
    }
    /// Clears an interrupt. See [`Process::resume`].
    pub fn resume(&mut self) -> Result<(), ExecError> {
        self.process.resume()
    }
    /// Restarts the program from the beginning with no variables.
    pub fn reset(&mut self) {
        self.process.reset();
    }
}
