//! The typed component model of a subchart.
//!
//! Components are lowered from the decoded [`ObjectGraph`] of a subchart's message.
//! Only the parts the interpreter needs are kept: the label, the control-flow links, and the
//! few per-kind flags. Links stay as object ids, so loops back to earlier components are fine.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use compact_str::CompactString;

use crate::graph::*;
use crate::program::StructuralError;
use crate::registry::ClassKind;

/// Identifies a component within its subchart.
pub type NodeId = ObjectId;

/// The kind of a component and its kind-specific data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// A terminal: `Start` or `End`.
    Oval,
    /// The entry terminal of a procedure; its label is the procedure header (e.g. `swap(in out a, in out b)`).
    OvalProcedure,
    /// An assignment, or a subchart/procedure call if `call` is set.
    Rectangle { call: bool },
    /// A two-way decision.
    IfControl { left: Option<NodeId>, right: Option<NodeId> },
    /// A loop whose label is the exit condition.
    /// `before` runs before each condition test and `after` runs after each failed test.
    Loop { before: Option<NodeId>, after: Option<NodeId> },
    /// Output of the label's value, or input into the label's target if `input` is set (shown with `prompt`).
    Parallelogram { input: bool, prompt: CompactString },
}

/// A single component of a flowchart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub label: CompactString,
    pub successor: Option<NodeId>,
}

const RECTANGLE_ASSIGNMENT: i32 = 0;
const RECTANGLE_CALL: i32 = 1;

/// All components reachable from a subchart's root component.
#[derive(Debug, Clone)]
pub struct Flowchart {
    root: NodeId,
    nodes: BTreeMap<NodeId, Node>,
}
impl Flowchart {
    /// Lowers every component reachable from `root` through successor and child links.
    /// `root` itself must be an `Oval` or `Oval_Procedure`.
    pub fn lower(graph: &ObjectGraph, root: ObjectId) -> Result<Self, StructuralError> {
        match graph.instance(root).map(Instance::kind) {
            Some(ClassKind::Oval | ClassKind::OvalProcedure) => (),
            class => return Err(StructuralError::BadRootComponent { class }),
        }

        let mut nodes = BTreeMap::new();
        let mut todo = vec![root];
        while let Some(id) = todo.pop() {
            if nodes.contains_key(&id) { continue }
            let node = lower_node(graph, id)?;
            todo.extend(node.successor);
            match &node.kind {
                NodeKind::IfControl { left, right } => todo.extend([*left, *right].into_iter().flatten()),
                NodeKind::Loop { before, after } => todo.extend([*before, *after].into_iter().flatten()),
                NodeKind::Oval | NodeKind::OvalProcedure | NodeKind::Rectangle { .. } | NodeKind::Parallelogram { .. } => (),
            }
            nodes.insert(id, node);
        }
        Ok(Self { root, nodes })
    }
    /// The id of the root component.
    pub fn root(&self) -> NodeId {
        self.root
    }
    /// Gets the root component.
    pub fn root_node(&self) -> &Node {
        &self.nodes[&self.root]
    }
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }
    /// Iterates over components in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }
    pub fn len(&self) -> usize {
        self.nodes.len()
    }
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
    /// Iterates over the ids of components in control-flow order, depth first from the root.
    pub fn walk(&self) -> Vec<NodeId> {
        let mut res = vec![];
        let mut todo = vec![self.root];
        while let Some(id) = todo.pop() {
            if res.contains(&id) { continue }
            let Some(node) = self.nodes.get(&id) else { continue };
            res.push(id);
            todo.extend(node.successor);
            match &node.kind {
                NodeKind::IfControl { left, right } => todo.extend([*right, *left].into_iter().flatten()),
                NodeKind::Loop { before, after } => todo.extend([*after, *before].into_iter().flatten()),
                _ => (),
            }
        }
        res
    }
}

fn lower_node(graph: &ObjectGraph, id: ObjectId) -> Result<Node, StructuralError> {
    let instance = graph.instance(id).ok_or(StructuralError::NotAComponent { id, class: None })?;
    let kind = match instance.kind() {
        ClassKind::Oval => NodeKind::Oval,
        ClassKind::OvalProcedure => NodeKind::OvalProcedure,
        ClassKind::Rectangle => {
            let kind = enum_value(graph, instance, id, "_kind")?;
            match kind {
                RECTANGLE_ASSIGNMENT => NodeKind::Rectangle { call: false },
                RECTANGLE_CALL => NodeKind::Rectangle { call: true },
                value => return Err(StructuralError::BadRectangleKind { id, value }),
            }
        }
        ClassKind::IfControl => NodeKind::IfControl {
            left: link(graph, instance, id, "_left_Child")?,
            right: link(graph, instance, id, "_right_Child")?,
        },
        ClassKind::Loop => NodeKind::Loop {
            before: link(graph, instance, id, "_before_Child")?,
            after: link(graph, instance, id, "_after_Child")?,
        },
        ClassKind::Parallelogram => NodeKind::Parallelogram {
            input: instance.boolean("_is_input").ok_or(StructuralError::BadMember { id, member: "_is_input" })?,
            prompt: text(graph, instance, id, "_prompt")?,
        },
        class => return Err(StructuralError::NotAComponent { id, class: Some(class) }),
    };
    Ok(Node {
        id,
        kind,
        label: text(graph, instance, id, "_text_str")?,
        successor: link(graph, instance, id, "_Successor")?,
    })
}

/// Reads a string member; a null string is empty.
fn text(graph: &ObjectGraph, instance: &Instance, id: ObjectId, member: &'static str) -> Result<CompactString, StructuralError> {
    match instance.member(member) {
        Some(Member::Null) => Ok(CompactString::default()),
        Some(Member::Ref(target)) => graph.string(*target).map(CompactString::new).ok_or(StructuralError::BadMember { id, member }),
        _ => Err(StructuralError::BadMember { id, member }),
    }
}

/// Reads a link to another component.
fn link(graph: &ObjectGraph, instance: &Instance, id: ObjectId, member: &'static str) -> Result<Option<NodeId>, StructuralError> {
    match instance.member(member) {
        Some(Member::Null) => Ok(None),
        Some(Member::Ref(target)) => match graph.instance(*target).map(Instance::kind) {
            Some(class) if class.is_component() => Ok(Some(*target)),
            class => Err(StructuralError::NotAComponent { id: *target, class }),
        }
        _ => Err(StructuralError::BadMember { id, member }),
    }
}

/// Reads the underlying value of an enum member.
fn enum_value(graph: &ObjectGraph, instance: &Instance, id: ObjectId, member: &'static str) -> Result<i32, StructuralError> {
    match instance.member(member) {
        Some(Member::Ref(target)) => graph.instance(*target).and_then(|x| x.int("value__")),
        Some(Member::Primitive(Primitive::Int32(x))) => Some(*x),
        _ => None,
    }.ok_or(StructuralError::BadMember { id, member })
}
