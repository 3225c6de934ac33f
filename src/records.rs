//! Enumerations that appear on the wire of a BinaryFormatter stream.
//!
//! All of these are single bytes in the stream and are decoded with [`FromPrimitive`].
//! Unknown byte values are reported by the decoder rather than mapped to a fallback.

use num_derive::FromPrimitive;

/// The leading byte of every record in a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum RecordTag {
    SerializedStreamHeader = 0,
    Object = 1,
    ObjectWithMap = 2,
    ObjectWithMapAssemId = 3,
    ObjectWithMapTyped = 4,
    ObjectWithMapTypedAssemId = 5,
    ObjectString = 6,
    Array = 7,
    MemberPrimitiveTyped = 8,
    MemberReference = 9,
    ObjectNull = 10,
    MessageEnd = 11,
    Assembly = 12,
    ObjectNullMultiple256 = 13,
    ObjectNullMultiple = 14,
    ArraySinglePrimitive = 15,
    ArraySingleObject = 16,
    ArraySingleString = 17,
    CrossAppDomainMap = 18,
    CrossAppDomainString = 19,
    CrossAppDomainAssembly = 20,
    MethodCall = 21,
    MethodReturn = 22,
}

/// How the value of a class member or array element is encoded.
///
/// Only [`BinaryType::Primitive`] is stored inline without a record tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum BinaryType {
    Primitive = 0,
    String = 1,
    Object = 2,
    ObjectUrt = 3,
    ObjectUser = 4,
    ObjectArray = 5,
    StringArray = 6,
    PrimitiveArray = 7,
}

/// The shape of a [`RecordTag::Array`] record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum BinaryArrayType {
    Single = 0,
    Jagged = 1,
    Rectangular = 2,
    SingleOffset = 3,
    JaggedOffset = 4,
    RectangularOffset = 5,
}
impl BinaryArrayType {
    /// Checks if arrays of this shape carry a lower bound per dimension.
    pub fn has_lower_bounds(self) -> bool {
        matches!(self, BinaryArrayType::SingleOffset | BinaryArrayType::JaggedOffset | BinaryArrayType::RectangularOffset)
    }
}

/// The type of a primitive value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum PrimitiveType {
    Boolean = 1,
    Byte = 2,
    Char = 3,
    Currency = 4,
    Decimal = 5,
    Double = 6,
    Int16 = 7,
    Int32 = 8,
    Int64 = 9,
    SByte = 10,
    Single = 11,
    TimeSpan = 12,
    DateTime = 13,
    UInt16 = 14,
    UInt32 = 15,
    UInt64 = 16,
    Null = 17,
    String = 18,
}

/// Additional type information that follows the binary type byte of a member or array element.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypeInfo {
    /// No additional information ([`BinaryType::String`], [`BinaryType::Object`], and the string/object array kinds).
    None,
    /// The element type of a [`BinaryType::Primitive`] or [`BinaryType::PrimitiveArray`].
    Primitive(PrimitiveType),
    /// The class name of a [`BinaryType::ObjectUrt`] (system library) value.
    SystemClass(compact_str::CompactString),
    /// The class name and library id of a [`BinaryType::ObjectUser`] value.
    Class(compact_str::CompactString, i32),
}

/// The header record that starts every message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamHeader {
    /// The object id of the message's root object.
    pub top_id: i32,
    pub header_id: i32,
    pub major_version: i32,
    pub minor_version: i32,
}
