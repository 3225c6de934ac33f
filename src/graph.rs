//! The decoded object graph of a single message.
//!
//! Every object of a message lives in one arena keyed by its stream-assigned object id.
//! Links between objects are stored as ids ([`Member::Ref`]), so cyclic graphs need no special handling.

use alloc::collections::BTreeMap;
use alloc::rc::Rc;
use alloc::vec::Vec;

use compact_str::CompactString;

use crate::records::*;
use crate::registry::ClassKind;

/// The stream-assigned identifier of an object within one message.
pub type ObjectId = i32;

/// A primitive leaf value stored inline in a class member or array element.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Primitive {
    Boolean(bool),
    Byte(u8),
    SByte(i8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    /// The raw 8-byte payload of a decimal value.
    Decimal(i64),
    /// A duration in 100ns ticks.
    TimeSpan(i64),
    /// The raw date value: the low 62 bits are the tick count and the top 2 bits are the date kind.
    DateTime(u64),
}
impl Primitive {
    /// Gets the tick count of a [`Primitive::DateTime`].
    pub fn ticks(&self) -> Option<u64> {
        match *self {
            Primitive::DateTime(x) => Some(x & 0x3fff_ffff_ffff_ffff),
            _ => None,
        }
    }
}

/// The value stored in one slot of a class instance or array.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Member {
    /// A null slot.
    Null,
    /// An inline primitive value.
    Primitive(Primitive),
    /// A link to another object of the same message.
    Ref(ObjectId),
    /// A reference to an object that has not been decoded yet.
    /// These only exist while a message is being decoded and are always patched into [`Member::Ref`] before it completes.
    Pending(ObjectId),
}

/// The schema of a class as declared by an `ObjectWithMapTyped` record.
///
/// Later `Object` records reuse a schema by referring to the id of the object that declared it.
#[derive(Debug, PartialEq, Eq)]
pub struct ClassInfo {
    pub name: CompactString,
    pub kind: ClassKind,
    pub library_id: i32,
    pub members: Vec<MemberInfo>,
}
impl ClassInfo {
    /// Gets the positional index of a member by name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.members.iter().position(|x| x.name == name)
    }
}

/// The declaration of a single class member.
#[derive(Debug, PartialEq, Eq)]
pub struct MemberInfo {
    pub name: CompactString,
    pub binary_type: BinaryType,
    pub type_info: TypeInfo,
}

/// An instance of a class, with one value per declared member in declaration order.
#[derive(Debug)]
pub struct Instance {
    pub class: Rc<ClassInfo>,
    pub values: Vec<Member>,
}
impl Instance {
    pub fn kind(&self) -> ClassKind {
        self.class.kind
    }
    /// Gets the value of a member by name.
    pub fn member(&self, name: &str) -> Option<&Member> {
        self.class.index_of(name).and_then(|i| self.values.get(i))
    }
    /// Iterates over member names and values in declaration order.
    pub fn members(&self) -> impl Iterator<Item = (&str, &Member)> {
        self.class.members.iter().map(|x| x.name.as_str()).zip(self.values.iter())
    }
    /// Gets an inline `Int32` member.
    pub fn int(&self, name: &str) -> Option<i32> {
        match self.member(name)? {
            Member::Primitive(Primitive::Int32(x)) => Some(*x),
            _ => None,
        }
    }
    /// Gets an inline `Boolean` member.
    pub fn boolean(&self, name: &str) -> Option<bool> {
        match self.member(name)? {
            Member::Primitive(Primitive::Boolean(x)) => Some(*x),
            _ => None,
        }
    }
}

/// The element type of an array.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElementType {
    pub binary_type: BinaryType,
    pub type_info: TypeInfo,
}

/// A single-dimension array.
#[derive(Debug)]
pub struct Array {
    pub element: ElementType,
    pub len: usize,
    pub items: Vec<Member>,
}

/// An object of the graph.
#[derive(Debug)]
pub enum Object {
    Instance(Instance),
    String(CompactString),
    Array(Array),
}
impl Object {
    /// Gets the number of slots this object holds (members or elements).
    pub fn slot_count(&self) -> usize {
        match self {
            Object::Instance(x) => x.class.members.len(),
            Object::Array(x) => x.len,
            Object::String(_) => 0,
        }
    }
    pub(crate) fn slots_mut(&mut self) -> Option<&mut Vec<Member>> {
        match self {
            Object::Instance(x) => Some(&mut x.values),
            Object::Array(x) => Some(&mut x.items),
            Object::String(_) => None,
        }
    }
}

/// All objects of a message, keyed by object id.
#[derive(Debug, Default)]
pub struct ObjectGraph {
    objects: BTreeMap<ObjectId, Object>,
}
impl ObjectGraph {
    pub fn get(&self, id: ObjectId) -> Option<&Object> {
        self.objects.get(&id)
    }
    pub(crate) fn get_mut(&mut self, id: ObjectId) -> Option<&mut Object> {
        self.objects.get_mut(&id)
    }
    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }
    /// Inserts a new object, returning it back if the id is already taken.
    pub(crate) fn insert(&mut self, id: ObjectId, object: Object) -> Result<(), Object> {
        if self.objects.contains_key(&id) { return Err(object) }
        self.objects.insert(id, object);
        Ok(())
    }
    pub fn len(&self) -> usize {
        self.objects.len()
    }
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &Object)> {
        self.objects.iter().map(|(k, v)| (*k, v))
    }

    /// Gets the class instance with the given id.
    pub fn instance(&self, id: ObjectId) -> Option<&Instance> {
        match self.get(id)? {
            Object::Instance(x) => Some(x),
            _ => None,
        }
    }
    /// Gets the string object with the given id.
    pub fn string(&self, id: ObjectId) -> Option<&str> {
        match self.get(id)? {
            Object::String(x) => Some(x.as_str()),
            _ => None,
        }
    }
    /// Follows a member to the object it links to, if it is a link.
    pub fn follow(&self, member: &Member) -> Option<&Object> {
        match member {
            Member::Ref(id) => self.get(*id),
            Member::Null | Member::Primitive(_) | Member::Pending(_) => None,
        }
    }
}

/// One fully decoded message: its header and the object graph rooted at the header's top id.
#[derive(Debug)]
pub struct Message {
    pub header: StreamHeader,
    pub graph: ObjectGraph,
    /// Libraries declared by the message, as `(library id, assembly name)`.
    pub libraries: crate::vecmap::VecMap<i32, CompactString, false>,
}
impl Message {
    /// The object id of the root object.
    pub fn root_id(&self) -> ObjectId {
        self.header.top_id
    }
    /// Gets the root object.
    /// A decoded message always contains its root.
    pub fn root(&self) -> Option<&Object> {
        self.graph.get(self.header.top_id)
    }
    /// Gets the root object if it is a class instance.
    pub fn root_instance(&self) -> Option<&Instance> {
        self.graph.instance(self.header.top_id)
    }
}
