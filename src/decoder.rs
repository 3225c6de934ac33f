//! The record-level state machine that turns a byte stream into [`Message`]s.
//!
//! Each message starts with a header record and ends with a `MessageEnd` record.
//! In between, records either define objects (which may be nested inside the slots of the
//! object currently being filled) or fill slots of the current object (primitives, references, nulls).
//! Objects being filled are tracked on a stack; once an object's last slot is filled it is popped
//! and filling resumes with its parent.

use alloc::collections::BTreeMap;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::fmt;

use compact_str::CompactString;

use crate::graph::*;
use crate::reader::Reader;
use crate::records::*;
use crate::registry::{self, ClassKind, SYSTEM_LIBRARY};
use crate::vecmap::VecMap;

/// The maximum number of items in a decoded array.
pub const MAX_ARRAY_LEN: usize = 1 << 20;

/// An error encountered while decoding a stream.
///
/// `pos` is the byte offset of the record or value that could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The stream ended while `needed` more bytes were expected.
    UnexpectedEof { pos: usize, needed: usize },
    /// A 7-bit encoded length prefix was longer than 5 bytes or overflowed.
    BadLengthPrefix { pos: usize },
    /// A count or length field was negative.
    NegativeLength { pos: usize, value: i32 },
    UnknownRecordTag { pos: usize, tag: u8 },
    UnknownBinaryType { pos: usize, value: u8 },
    UnknownPrimitiveType { pos: usize, value: u8 },
    UnknownArrayType { pos: usize, value: u8 },
    /// A primitive type that has no supported encoding (floating point, character, and string primitives).
    UnsupportedPrimitive { pos: usize, kind: PrimitiveType },
    /// A record kind that is recognized but not supported.
    UnsupportedRecord { pos: usize, tag: RecordTag },
    /// An array that is not single-dimensional with zero lower bound.
    UnsupportedArrayShape { pos: usize, shape: BinaryArrayType, rank: usize },
    /// A message did not start with a header record.
    MissingHeader { pos: usize, tag: RecordTag },
    /// A record that is only valid at a different point of a message.
    UnexpectedRecord { pos: usize, tag: RecordTag },
    /// A class was declared with a library id that no `Assembly` record has declared.
    UndeclaredLibrary { pos: usize, library_id: i32 },
    /// A class name that is not known for the given library.
    UnknownClass { pos: usize, library_id: i32, name: CompactString },
    /// A class declaration lacks a member that the class is known to have.
    MissingMember { pos: usize, class: ClassKind, member: &'static str },
    /// An `Object` record referred to a class schema that was never declared.
    UnknownClassMap { pos: usize, map_id: ObjectId },
    /// Two objects in the same message used the same id.
    DuplicateObject { pos: usize, id: ObjectId },
    /// A slot-filling record appeared while no object was being filled.
    NoContainer { pos: usize },
    /// An array declared more than `limit` items.
    ArrayTooLarge { pos: usize, len: usize, limit: usize },
    /// A null run was longer than the number of slots left in the object being filled.
    NullRunOverflow { pos: usize, count: usize, remaining: usize },
    /// A pending reference slot did not hold the placeholder for the object being patched in.
    ReferenceMismatch { pos: usize, id: ObjectId, found: Member },
    /// The message ended while object `id` still had unfilled slots.
    UnexpectedMessageEnd { pos: usize, id: ObjectId },
    /// A reference to object `id` was never resolved by the end of the message.
    UnresolvedReference { id: ObjectId },
    /// The message did not contain the root object named by its header.
    MissingRoot { id: ObjectId },
}
impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::UnexpectedEof { pos, needed } => write!(f, "unexpected end of stream at byte {pos} (needed {needed} more bytes)"),
            DecodeError::BadLengthPrefix { pos } => write!(f, "malformed length prefix at byte {pos}"),
            DecodeError::NegativeLength { pos, value } => write!(f, "negative length {value} at byte {pos}"),
            DecodeError::UnknownRecordTag { pos, tag } => write!(f, "unknown record tag {tag} at byte {pos}"),
            DecodeError::UnknownBinaryType { pos, value } => write!(f, "unknown binary type {value} at byte {pos}"),
            DecodeError::UnknownPrimitiveType { pos, value } => write!(f, "unknown primitive type {value} at byte {pos}"),
            DecodeError::UnknownArrayType { pos, value } => write!(f, "unknown array type {value} at byte {pos}"),
            DecodeError::UnsupportedPrimitive { pos, kind } => write!(f, "primitive type {kind:?} at byte {pos} is not implemented"),
            DecodeError::UnsupportedRecord { pos, tag } => write!(f, "record {tag:?} at byte {pos} is not implemented"),
            DecodeError::UnsupportedArrayShape { pos, shape, rank } => write!(f, "{shape:?} array of rank {rank} at byte {pos} is not supported"),
            DecodeError::MissingHeader { pos, tag } => write!(f, "expected a stream header at byte {pos}, found {tag:?}"),
            DecodeError::UnexpectedRecord { pos, tag } => write!(f, "unexpected {tag:?} record at byte {pos}"),
            DecodeError::UndeclaredLibrary { pos, library_id } => write!(f, "library {library_id} used at byte {pos} was never declared"),
            DecodeError::UnknownClass { pos, library_id, name } => write!(f, "unknown class '{name}' in library {library_id} at byte {pos}"),
            DecodeError::MissingMember { pos, class, member } => write!(f, "class {} at byte {pos} has no member '{member}'", class.name()),
            DecodeError::UnknownClassMap { pos, map_id } => write!(f, "object at byte {pos} refers to undeclared class map {map_id}"),
            DecodeError::DuplicateObject { pos, id } => write!(f, "object id {id} at byte {pos} was already defined"),
            DecodeError::NoContainer { pos } => write!(f, "member record at byte {pos} outside of any object"),
            DecodeError::ArrayTooLarge { pos, len, limit } => write!(f, "array at byte {pos} has {len} items, but at most {limit} are supported"),
            DecodeError::NullRunOverflow { pos, count, remaining } => write!(f, "run of {count} nulls at byte {pos} exceeds the {remaining} remaining slots"),
            DecodeError::ReferenceMismatch { pos, id, found } => write!(f, "patching object {id} at byte {pos} found {found:?} in the waiting slot"),
            DecodeError::UnexpectedMessageEnd { pos, id } => write!(f, "message ended at byte {pos} while object {id} was incomplete"),
            DecodeError::UnresolvedReference { id } => write!(f, "reference to object {id} was never resolved"),
            DecodeError::MissingRoot { id } => write!(f, "root object {id} was never defined"),
        }
    }
}

/// Decodes every message in the stream.
pub fn decode(data: &[u8]) -> Result<Vec<Message>, DecodeError> {
    let mut reader = Reader::new(data);
    let mut messages = vec![];
    while !reader.is_empty() {
        messages.push(decode_message(&mut reader)?);
    }
    Ok(messages)
}

/// Decodes a single message starting at the reader's current position.
/// On success, the reader is left just past the message's `MessageEnd` record.
pub fn decode_message(reader: &mut Reader<'_>) -> Result<Message, DecodeError> {
    MessageDecoder {
        reader,
        graph: Default::default(),
        classes: Default::default(),
        libraries: Default::default(),
        stack: vec![],
        pending: Default::default(),
    }.run()
}

/// The slot layout of an object being filled.
enum Slots {
    Class(Rc<ClassInfo>),
    Element(ElementType),
}

/// An object on the fill stack.
struct Frame {
    id: ObjectId,
    slots: Slots,
    filled: usize,
    len: usize,
}
impl Frame {
    fn remaining(&self) -> usize {
        self.len - self.filled
    }
    /// The kind of value expected for the next slot.
    fn expected(&self) -> Expect {
        let (binary_type, type_info) = match &self.slots {
            Slots::Class(class) => {
                let member = &class.members[self.filled];
                (member.binary_type, &member.type_info)
            }
            Slots::Element(element) => (element.binary_type, &element.type_info),
        };
        match (binary_type, type_info) {
            (BinaryType::Primitive, TypeInfo::Primitive(kind)) => Expect::Primitive(*kind),
            _ => Expect::Record,
        }
    }
}

enum Expect {
    Record,
    Primitive(PrimitiveType),
}

/// A slot waiting for a forward reference to be defined.
struct Slot {
    owner: ObjectId,
    index: usize,
}

struct MessageDecoder<'r, 'a> {
    reader: &'r mut Reader<'a>,
    graph: ObjectGraph,
    classes: BTreeMap<ObjectId, Rc<ClassInfo>>,
    libraries: VecMap<i32, CompactString, false>,
    stack: Vec<Frame>,
    pending: BTreeMap<ObjectId, Vec<Slot>>,
}
impl MessageDecoder<'_, '_> {
    fn run(mut self) -> Result<Message, DecodeError> {
        let pos = self.reader.pos();
        let tag = self.reader.read_record_tag()?;
        if tag != RecordTag::SerializedStreamHeader {
            return Err(DecodeError::MissingHeader { pos, tag });
        }
        let header = StreamHeader {
            top_id: self.reader.read_i32()?,
            header_id: self.reader.read_i32()?,
            major_version: self.reader.read_i32()?,
            minor_version: self.reader.read_i32()?,
        };

        loop {
            let expected = match self.stack.last() {
                Some(frame) => frame.expected(),
                None => Expect::Record,
            };
            match expected {
                Expect::Primitive(kind) => {
                    let pos = self.reader.pos();
                    let value = self.reader.read_primitive(kind)?;
                    self.store(Member::Primitive(value), pos)?;
                }
                Expect::Record => {
                    let pos = self.reader.pos();
                    match self.reader.read_record_tag()? {
                        RecordTag::MessageEnd => {
                            if let Some(frame) = self.stack.last() {
                                return Err(DecodeError::UnexpectedMessageEnd { pos, id: frame.id });
                            }
                            break;
                        }
                        tag => self.read_record(tag, pos)?,
                    }
                }
            }

            while self.stack.last().is_some_and(|frame| frame.remaining() == 0) {
                self.stack.pop();
            }
        }

        if let Some(id) = self.pending.keys().next() {
            return Err(DecodeError::UnresolvedReference { id: *id });
        }
        if !self.graph.contains(header.top_id) {
            return Err(DecodeError::MissingRoot { id: header.top_id });
        }
        Ok(Message { header, graph: self.graph, libraries: self.libraries })
    }

    fn read_record(&mut self, tag: RecordTag, pos: usize) -> Result<(), DecodeError> {
        match tag {
            RecordTag::Assembly => {
                let library_id = self.reader.read_i32()?;
                let name = self.reader.read_string()?;
                self.libraries.insert(library_id, name);
            }
            RecordTag::ObjectWithMapTyped => self.read_class(false, pos)?,
            RecordTag::ObjectWithMapTypedAssemId => self.read_class(true, pos)?,
            RecordTag::Object => {
                let id = self.reader.read_i32()?;
                let map_id = self.reader.read_i32()?;
                let class = self.classes.get(&map_id).cloned().ok_or(DecodeError::UnknownClassMap { pos, map_id })?;
                let values = Vec::with_capacity(class.members.len());
                self.add_object(id, Object::Instance(Instance { class: class.clone(), values }), Some(Slots::Class(class)), pos)?;
            }
            RecordTag::ObjectString => {
                let id = self.reader.read_i32()?;
                let value = self.reader.read_string()?;
                self.add_object(id, Object::String(value), None, pos)?;
            }
            RecordTag::ArraySinglePrimitive => {
                let id = self.reader.read_i32()?;
                let len = self.reader.read_len_i32()?;
                let kind = self.reader.read_primitive_type()?;
                self.add_array(id, len, ElementType { binary_type: BinaryType::Primitive, type_info: TypeInfo::Primitive(kind) }, pos)?;
            }
            RecordTag::ArraySingleObject => {
                let id = self.reader.read_i32()?;
                let len = self.reader.read_len_i32()?;
                self.add_array(id, len, ElementType { binary_type: BinaryType::Object, type_info: TypeInfo::None }, pos)?;
            }
            RecordTag::ArraySingleString => {
                let id = self.reader.read_i32()?;
                let len = self.reader.read_len_i32()?;
                self.add_array(id, len, ElementType { binary_type: BinaryType::String, type_info: TypeInfo::None }, pos)?;
            }
            RecordTag::Array => {
                let id = self.reader.read_i32()?;
                let shape = self.reader.read_array_type()?;
                let rank = self.reader.read_len_i32()?;
                let mut lengths = Vec::with_capacity(rank.min(32));
                for _ in 0..rank {
                    lengths.push(self.reader.read_len_i32()?);
                }
                if shape.has_lower_bounds() {
                    for _ in 0..rank {
                        self.reader.read_i32()?;
                    }
                }
                let binary_type = self.reader.read_binary_type()?;
                let type_info = self.reader.read_type_info(binary_type)?;
                match (shape, lengths.as_slice()) {
                    (BinaryArrayType::Single, &[len]) => self.add_array(id, len, ElementType { binary_type, type_info }, pos)?,
                    _ => return Err(DecodeError::UnsupportedArrayShape { pos, shape, rank }),
                }
            }
            RecordTag::MemberPrimitiveTyped => {
                let kind = self.reader.read_primitive_type()?;
                let value = self.reader.read_primitive(kind)?;
                self.store(Member::Primitive(value), pos)?;
            }
            RecordTag::MemberReference => {
                let id = self.reader.read_i32()?;
                let member = match self.graph.contains(id) {
                    true => Member::Ref(id),
                    false => Member::Pending(id),
                };
                self.store(member, pos)?;
            }
            RecordTag::ObjectNull => self.store_nulls(1, pos)?,
            RecordTag::ObjectNullMultiple256 => {
                let count = self.reader.read_u8()? as usize;
                self.store_nulls(count, pos)?;
            }
            RecordTag::ObjectNullMultiple => {
                let count = self.reader.read_len_i32()?;
                self.store_nulls(count, pos)?;
            }
            RecordTag::SerializedStreamHeader | RecordTag::MessageEnd => return Err(DecodeError::UnexpectedRecord { pos, tag }),
            RecordTag::ObjectWithMap | RecordTag::ObjectWithMapAssemId | RecordTag::CrossAppDomainMap
            | RecordTag::CrossAppDomainString | RecordTag::CrossAppDomainAssembly
            | RecordTag::MethodCall | RecordTag::MethodReturn => return Err(DecodeError::UnsupportedRecord { pos, tag }),
        }
        Ok(())
    }

    /// Reads a class declaration with its member schema.
    /// Classes without an explicit library id belong to the system library.
    fn read_class(&mut self, has_library: bool, pos: usize) -> Result<(), DecodeError> {
        let id = self.reader.read_i32()?;
        let name = self.reader.read_string()?;
        let count = self.reader.read_len_i32()?;

        let mut names = Vec::with_capacity(count.min(256));
        for _ in 0..count {
            names.push(self.reader.read_string()?);
        }
        let mut binary_types = Vec::with_capacity(names.len());
        for _ in 0..count {
            binary_types.push(self.reader.read_binary_type()?);
        }
        let mut members = Vec::with_capacity(names.len());
        for (name, binary_type) in names.into_iter().zip(binary_types) {
            let type_info = self.reader.read_type_info(binary_type)?;
            members.push(MemberInfo { name, binary_type, type_info });
        }

        let library_id = match has_library {
            true => self.reader.read_i32()?,
            false => SYSTEM_LIBRARY,
        };
        if library_id != SYSTEM_LIBRARY && !self.libraries.contains_key(&library_id) {
            return Err(DecodeError::UndeclaredLibrary { pos, library_id });
        }
        let kind = registry::resolve(library_id, &name).ok_or_else(|| DecodeError::UnknownClass { pos, library_id, name: name.clone() })?;

        let class = Rc::new(ClassInfo { name, kind, library_id, members });
        if let Some(&member) = kind.fields().iter().find(|x| class.index_of(x).is_none()) {
            return Err(DecodeError::MissingMember { pos, class: kind, member });
        }
        self.classes.insert(id, class.clone());

        let values = Vec::with_capacity(class.members.len());
        self.add_object(id, Object::Instance(Instance { class: class.clone(), values }), Some(Slots::Class(class)), pos)
    }

    fn add_array(&mut self, id: ObjectId, len: usize, element: ElementType, pos: usize) -> Result<(), DecodeError> {
        if len > MAX_ARRAY_LEN {
            return Err(DecodeError::ArrayTooLarge { pos, len, limit: MAX_ARRAY_LEN });
        }
        let array = Array { element: element.clone(), len, items: Vec::with_capacity(len.min(1024)) };
        self.add_object(id, Object::Array(array), Some(Slots::Element(element)), pos)
    }

    /// Adds a newly defined object to the graph.
    /// If an object is being filled, the new object is linked into its next slot.
    /// If the new object has slots of its own, it becomes the object being filled.
    fn add_object(&mut self, id: ObjectId, object: Object, slots: Option<Slots>, pos: usize) -> Result<(), DecodeError> {
        if !self.stack.is_empty() {
            self.store(Member::Ref(id), pos)?;
        }
        let len = object.slot_count();
        self.graph.insert(id, object).map_err(|_| DecodeError::DuplicateObject { pos, id })?;

        if let Some(waiting) = self.pending.remove(&id) {
            for slot in waiting {
                self.patch(slot, id, pos)?;
            }
        }

        if let Some(slots) = slots {
            self.stack.push(Frame { id, slots, filled: 0, len });
        }
        Ok(())
    }

    fn patch(&mut self, slot: Slot, id: ObjectId, pos: usize) -> Result<(), DecodeError> {
        let member = self.graph.get_mut(slot.owner)
            .and_then(Object::slots_mut)
            .and_then(|x| x.get_mut(slot.index));
        match member {
            Some(member) if *member == Member::Pending(id) => {
                *member = Member::Ref(id);
                Ok(())
            }
            Some(member) => Err(DecodeError::ReferenceMismatch { pos, id, found: *member }),
            None => Err(DecodeError::ReferenceMismatch { pos, id, found: Member::Null }),
        }
    }

    /// Stores a value into the next slot of the object being filled.
    fn store(&mut self, member: Member, pos: usize) -> Result<(), DecodeError> {
        let frame = self.stack.last_mut().ok_or(DecodeError::NoContainer { pos })?;
        let (owner, index) = (frame.id, frame.filled);
        frame.filled += 1;

        if let Some(slots) = self.graph.get_mut(owner).and_then(Object::slots_mut) {
            slots.push(member);
        }
        if let Member::Pending(id) = member {
            self.pending.entry(id).or_default().push(Slot { owner, index });
        }
        Ok(())
    }
    /// Fills the next `count` slots of the object being filled with nulls.
    fn store_nulls(&mut self, count: usize, pos: usize) -> Result<(), DecodeError> {
        let frame = self.stack.last_mut().ok_or(DecodeError::NoContainer { pos })?;
        let remaining = frame.remaining();
        if count > remaining {
            return Err(DecodeError::NullRunOverflow { pos, count, remaining });
        }
        frame.filled += count;

        if let Some(slots) = self.graph.get_mut(frame.id).and_then(Object::slots_mut) {
            slots.extend(core::iter::repeat(Member::Null).take(count));
        }
        Ok(())
    }
}
