//! A bounds-checked little-endian cursor over a message buffer.

use compact_str::CompactString;
use num_traits::FromPrimitive;

use crate::decoder::DecodeError;
use crate::graph::Primitive;
use crate::records::*;

/// A sequential reader over an immutable byte buffer.
///
/// The cursor only ever moves forward.
/// Every read is bounds checked and reports the offset it started at on failure.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}
impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }
    /// The offset of the next byte to be read.
    pub fn pos(&self) -> usize {
        self.pos
    }
    /// Checks if every byte of the buffer has been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let end = self.pos.checked_add(len).filter(|&end| end <= self.data.len())
            .ok_or(DecodeError::UnexpectedEof { pos: self.pos, needed: len })?;
        let res = &self.data[self.pos..end];
        self.pos = end;
        Ok(res)
    }
    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut res = [0; N];
        res.copy_from_slice(self.take(N)?);
        Ok(res)
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> { Ok(self.take_array::<1>()?[0]) }
    pub fn read_i8(&mut self) -> Result<i8, DecodeError> { Ok(self.read_u8()? as i8) }
    pub fn read_bool(&mut self) -> Result<bool, DecodeError> { Ok(self.read_u8()? != 0) }
    pub fn read_i16(&mut self) -> Result<i16, DecodeError> { Ok(i16::from_le_bytes(self.take_array()?)) }
    pub fn read_u16(&mut self) -> Result<u16, DecodeError> { Ok(u16::from_le_bytes(self.take_array()?)) }
    pub fn read_i32(&mut self) -> Result<i32, DecodeError> { Ok(i32::from_le_bytes(self.take_array()?)) }
    pub fn read_u32(&mut self) -> Result<u32, DecodeError> { Ok(u32::from_le_bytes(self.take_array()?)) }
    pub fn read_i64(&mut self) -> Result<i64, DecodeError> { Ok(i64::from_le_bytes(self.take_array()?)) }
    pub fn read_u64(&mut self) -> Result<u64, DecodeError> { Ok(u64::from_le_bytes(self.take_array()?)) }

    /// Reads an `i32` which is used as a count or length and must not be negative.
    pub fn read_len_i32(&mut self) -> Result<usize, DecodeError> {
        let pos = self.pos;
        let value = self.read_i32()?;
        usize::try_from(value).map_err(|_| DecodeError::NegativeLength { pos, value })
    }

    /// Reads a 7-bit variable-length integer as used by string length prefixes.
    /// The low 7 bits of each byte are payload (least significant group first) and the high bit marks continuation.
    /// At most 5 bytes are allowed and the result must fit in an `i32`.
    pub fn read_length_prefix(&mut self) -> Result<usize, DecodeError> {
        let start = self.pos;
        let mut value: u32 = 0;
        for i in 0..5 {
            let b = self.read_u8()?;
            if i == 4 && b & 0xf8 != 0 {
                return Err(DecodeError::BadLengthPrefix { pos: start });
            }
            value |= ((b & 0x7f) as u32) << (7 * i);
            if b & 0x80 == 0 {
                return Ok(value as usize);
            }
        }
        Err(DecodeError::BadLengthPrefix { pos: start })
    }
    /// Reads a length-prefixed string.
    /// The bytes are taken as Latin-1 code points, not decoded as UTF-8.
    pub fn read_string(&mut self) -> Result<CompactString, DecodeError> {
        let len = self.read_length_prefix()?;
        Ok(self.take(len)?.iter().map(|&b| b as char).collect())
    }

    pub fn read_record_tag(&mut self) -> Result<RecordTag, DecodeError> {
        let pos = self.pos;
        let tag = self.read_u8()?;
        RecordTag::from_u8(tag).ok_or(DecodeError::UnknownRecordTag { pos, tag })
    }
    pub fn read_binary_type(&mut self) -> Result<BinaryType, DecodeError> {
        let pos = self.pos;
        let value = self.read_u8()?;
        BinaryType::from_u8(value).ok_or(DecodeError::UnknownBinaryType { pos, value })
    }
    pub fn read_primitive_type(&mut self) -> Result<PrimitiveType, DecodeError> {
        let pos = self.pos;
        let value = self.read_u8()?;
        PrimitiveType::from_u8(value).ok_or(DecodeError::UnknownPrimitiveType { pos, value })
    }
    pub fn read_array_type(&mut self) -> Result<BinaryArrayType, DecodeError> {
        let pos = self.pos;
        let value = self.read_u8()?;
        BinaryArrayType::from_u8(value).ok_or(DecodeError::UnknownArrayType { pos, value })
    }
    /// Reads the additional type information that follows a binary type byte.
    pub fn read_type_info(&mut self, kind: BinaryType) -> Result<TypeInfo, DecodeError> {
        Ok(match kind {
            BinaryType::Primitive | BinaryType::PrimitiveArray => TypeInfo::Primitive(self.read_primitive_type()?),
            BinaryType::String | BinaryType::Object | BinaryType::ObjectArray | BinaryType::StringArray => TypeInfo::None,
            BinaryType::ObjectUrt => TypeInfo::SystemClass(self.read_string()?),
            BinaryType::ObjectUser => {
                let name = self.read_string()?;
                TypeInfo::Class(name, self.read_i32()?)
            }
        })
    }

    /// Reads an untagged primitive value of the given type.
    ///
    /// `Decimal`, `TimeSpan`, and `DateTime` are all read as 8-byte values.
    /// The remaining floating point, character, and string types are not supported.
    pub fn read_primitive(&mut self, kind: PrimitiveType) -> Result<Primitive, DecodeError> {
        let pos = self.pos;
        Ok(match kind {
            PrimitiveType::Boolean => Primitive::Boolean(self.read_bool()?),
            PrimitiveType::Byte => Primitive::Byte(self.read_u8()?),
            PrimitiveType::SByte => Primitive::SByte(self.read_i8()?),
            PrimitiveType::Int16 => Primitive::Int16(self.read_i16()?),
            PrimitiveType::UInt16 => Primitive::UInt16(self.read_u16()?),
            PrimitiveType::Int32 => Primitive::Int32(self.read_i32()?),
            PrimitiveType::UInt32 => Primitive::UInt32(self.read_u32()?),
            PrimitiveType::Int64 => Primitive::Int64(self.read_i64()?),
            PrimitiveType::UInt64 => Primitive::UInt64(self.read_u64()?),
            PrimitiveType::Decimal => Primitive::Decimal(self.read_i64()?),
            PrimitiveType::TimeSpan => Primitive::TimeSpan(self.read_i64()?),
            PrimitiveType::DateTime => Primitive::DateTime(self.read_u64()?),
            PrimitiveType::Char | PrimitiveType::Double | PrimitiveType::Single
            | PrimitiveType::Currency | PrimitiveType::Null | PrimitiveType::String => return Err(DecodeError::UnsupportedPrimitive { pos, kind }),
        })
    }
}

#[test]
fn test_length_prefix() {
    assert_eq!(Reader::new(&[0x00]).read_length_prefix().unwrap(), 0);
    assert_eq!(Reader::new(&[0x7f]).read_length_prefix().unwrap(), 127);
    assert_eq!(Reader::new(&[0x80, 0x01]).read_length_prefix().unwrap(), 128);
    assert_eq!(Reader::new(&[0xc8, 0x01]).read_length_prefix().unwrap(), 200);
    assert_eq!(Reader::new(&[0xff, 0xff, 0xff, 0xff, 0x07]).read_length_prefix().unwrap(), i32::MAX as usize);

    let mut r = Reader::new(&[0x96, 0x01, 0x05]);
    assert_eq!(r.read_length_prefix().unwrap(), 150);
    assert_eq!(r.pos(), 2);

    assert!(matches!(Reader::new(&[0xff, 0xff, 0xff, 0xff, 0x7f]).read_length_prefix(), Err(DecodeError::BadLengthPrefix { pos: 0 })));
    assert!(matches!(Reader::new(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x01]).read_length_prefix(), Err(DecodeError::BadLengthPrefix { pos: 0 })));
    assert!(matches!(Reader::new(&[0x80]).read_length_prefix(), Err(DecodeError::UnexpectedEof { pos: 1, needed: 1 })));
}

#[test]
fn test_read_string() {
    let mut r = Reader::new(&[5, b'S', b't', b'a', b'r', b't', 3, 0x63, 0xe9, 0x21]);
    assert_eq!(r.read_string().unwrap(), "Start");
    assert_eq!(r.read_string().unwrap(), "c\u{e9}!");
    assert!(r.is_empty());

    let mut r = Reader::new(&[6, b'E', b'n', b'd']);
    assert!(matches!(r.read_string(), Err(DecodeError::UnexpectedEof { pos: 1, needed: 6 })));
}

#[test]
fn test_read_primitives() {
    let bytes = [
        0x01,
        0xfe, 0xff,
        0x2a, 0x00, 0x00, 0x00,
        0x00, 0x40, 0x07, 0x5a, 0x62, 0xd3, 0xd8, 0x08,
        0x9c,
    ];
    let mut r = Reader::new(&bytes);
    assert_eq!(r.read_primitive(PrimitiveType::Boolean).unwrap(), Primitive::Boolean(true));
    assert_eq!(r.read_primitive(PrimitiveType::Int16).unwrap(), Primitive::Int16(-2));
    assert_eq!(r.read_primitive(PrimitiveType::Int32).unwrap(), Primitive::Int32(42));
    assert_eq!(r.read_primitive(PrimitiveType::DateTime).unwrap(), Primitive::DateTime(0x08d8d3625a074000));
    assert_eq!(r.read_primitive(PrimitiveType::SByte).unwrap(), Primitive::SByte(-100));
    assert!(r.is_empty());

    for kind in [PrimitiveType::Char, PrimitiveType::Double] {
        assert!(matches!(Reader::new(&[0; 8]).read_primitive(kind), Err(DecodeError::UnsupportedPrimitive { pos: 0, .. })));
    }
    assert!(matches!(Reader::new(&[0x01, 0x02]).read_primitive(PrimitiveType::Int32), Err(DecodeError::UnexpectedEof { pos: 0, needed: 4 })));
}
