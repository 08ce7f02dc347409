//! Compact tagged scalar records.
//!
//! Each field starts with a single byte packing a 2-bit type tag into the
//! upper bits and a 6-bit field id into the lower bits, followed by the
//! value.  Field ids are scoped to either the positional or the
//! allele-specific context.  Since the type tag determines the value length,
//! readers can skip fields with ids they do not know.

use std::io::{Read, Write};

use byteorder::ReadBytesExt;

use crate::err::SaError;
use crate::sa::codec::{self, truncated, Decode, Encode};

/// Largest field id that fits into the 6 id bits.
pub const MAX_FIELD_ID: u8 = 0x3f;

/// Type tag of a tagged value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::FromRepr, strum::Display)]
#[repr(u8)]
pub enum TypeTag {
    Text = 0,
    Int64List = 1,
    Boolean = 2,
    Int32 = 3,
}

/// Value of a tagged field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaggedValue {
    Text(String),
    Int64List(Vec<i64>),
    Boolean(bool),
    Int32(i32),
}

impl TaggedValue {
    pub fn type_tag(&self) -> TypeTag {
        match self {
            TaggedValue::Text(_) => TypeTag::Text,
            TaggedValue::Int64List(_) => TypeTag::Int64List,
            TaggedValue::Boolean(_) => TypeTag::Boolean,
            TaggedValue::Int32(_) => TypeTag::Int32,
        }
    }
}

/// A single tagged field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedRecord {
    id: u8,
    value: TaggedValue,
}

impl TaggedRecord {
    pub fn new(id: u8, value: TaggedValue) -> Result<Self, SaError> {
        if id > MAX_FIELD_ID {
            return Err(SaError::MalformedRecord(format!(
                "field id {} does not fit into 6 bits",
                id
            )));
        }
        Ok(Self { id, value })
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    /// The leading byte: `(tag << 6) | id`.
    pub fn header_byte(&self) -> u8 {
        ((self.value.type_tag() as u8) << 6) | self.id
    }

    pub fn as_text(&self) -> Result<&str, SaError> {
        match &self.value {
            TaggedValue::Text(text) => Ok(text),
            other => Err(self.unexpected(TypeTag::Text, other)),
        }
    }

    pub fn as_int32(&self) -> Result<i32, SaError> {
        match &self.value {
            TaggedValue::Int32(value) => Ok(*value),
            other => Err(self.unexpected(TypeTag::Int32, other)),
        }
    }

    pub fn as_bool(&self) -> Result<bool, SaError> {
        match &self.value {
            TaggedValue::Boolean(value) => Ok(*value),
            other => Err(self.unexpected(TypeTag::Boolean, other)),
        }
    }

    pub fn as_int64_list(&self) -> Result<&[i64], SaError> {
        match &self.value {
            TaggedValue::Int64List(values) => Ok(values),
            other => Err(self.unexpected(TypeTag::Int64List, other)),
        }
    }

    fn unexpected(&self, expected: TypeTag, actual: &TaggedValue) -> SaError {
        SaError::MalformedRecord(format!(
            "field {} has type {}, expected {}",
            self.id,
            actual.type_tag(),
            expected
        ))
    }
}

impl Encode for TaggedRecord {
    fn encode<W: Write>(&self, writer: &mut W) -> Result<(), SaError> {
        writer.write_all(&[self.header_byte()])?;
        match &self.value {
            TaggedValue::Text(text) => codec::write_text(writer, text),
            TaggedValue::Int64List(values) => {
                codec::write_len(writer, values.len())?;
                for value in values {
                    codec::write_i64(writer, *value)?;
                }
                Ok(())
            }
            TaggedValue::Boolean(value) => codec::write_bool(writer, *value),
            TaggedValue::Int32(value) => codec::write_i32(writer, *value),
        }
    }
}

impl Decode for TaggedRecord {
    fn decode<R: Read>(reader: &mut R) -> Result<Self, SaError> {
        let header = reader.read_u8().map_err(truncated("tagged field header"))?;
        let id = header & MAX_FIELD_ID;
        // two bits, always a valid tag
        let tag = TypeTag::from_repr(header >> 6).ok_or_else(|| {
            SaError::MalformedRecord(format!("invalid type tag in byte {:#04x}", header))
        })?;
        let value = match tag {
            TypeTag::Text => TaggedValue::Text(codec::read_text(reader)?),
            TypeTag::Int64List => {
                let count = codec::read_len(reader)?;
                let mut values = Vec::new();
                for _ in 0..count {
                    values.push(codec::read_i64(reader)?);
                }
                TaggedValue::Int64List(values)
            }
            TypeTag::Boolean => TaggedValue::Boolean(codec::read_bool(reader)?),
            TypeTag::Int32 => TaggedValue::Int32(codec::read_i32(reader)?),
        };
        Ok(Self { id, value })
    }
}

/// Write a list of tagged records preceded by their count.
pub fn write_tagged<W: Write>(writer: &mut W, records: &[TaggedRecord]) -> Result<(), SaError> {
    codec::write_len(writer, records.len())?;
    for record in records {
        record.encode(writer)?;
    }
    Ok(())
}

/// Read a list of tagged records preceded by their count.
pub fn read_tagged<R: Read>(reader: &mut R) -> Result<Vec<TaggedRecord>, SaError> {
    let count = codec::read_len(reader)?;
    let mut records = Vec::new();
    for _ in 0..count {
        records.push(TaggedRecord::decode(reader)?);
    }
    Ok(records)
}

/// Field ids of the positional context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::FromRepr)]
#[repr(u8)]
pub enum PositionalId {
    GlobalMinorAllele = 0,
    GlobalMinorAlleleFrequency = 1,
    GlobalMajorAllele = 2,
    GlobalMajorAlleleFrequency = 3,
    IsRefMinorAllele = 4,
}

/// Field ids of the allele-specific context.
///
/// Population allele numbers and allele counts are laid out as consecutive
/// blocks; id 8 is reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::FromRepr)]
#[repr(u8)]
pub enum AlleleSpecificId {
    DbSnp = 0,
    AncestralAllele = 1,
    EvsCoverage = 2,
    NumEvsSamples = 3,
    EvsAfr = 4,
    EvsAll = 5,
    EvsEur = 6,
    ExacCoverage = 7,
    ExacAfrAn = 9,
    ExacAllAn = 10,
    ExacAmrAn = 11,
    ExacEasAn = 12,
    ExacFinAn = 13,
    ExacNfeAn = 14,
    ExacOthAn = 15,
    ExacSasAn = 16,
    ExacAfrAc = 17,
    ExacAllAc = 18,
    ExacAmrAc = 19,
    ExacEasAc = 20,
    ExacFinAc = 21,
    ExacNfeAc = 22,
    ExacOthAc = 23,
    ExacSasAc = 24,
    OneKgAfrAn = 25,
    OneKgAllAn = 26,
    OneKgAmrAn = 27,
    OneKgEasAn = 28,
    OneKgEurAn = 29,
    OneKgSasAn = 30,
    OneKgAfrAc = 31,
    OneKgAllAc = 32,
    OneKgAmrAc = 33,
    OneKgEasAc = 34,
    OneKgEurAc = 35,
    OneKgSasAc = 36,
}

impl AlleleSpecificId {
    pub fn tagged(self, value: TaggedValue) -> Result<TaggedRecord, SaError> {
        TaggedRecord::new(self as u8, value)
    }
}

impl PositionalId {
    pub fn tagged(self, value: TaggedValue) -> Result<TaggedRecord, SaError> {
        TaggedRecord::new(self as u8, value)
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[rstest::rstest]
    #[case(TaggedValue::Text("AC".into()), 5, vec![0x05, 0x02, b'A', b'C'])]
    #[case(TaggedValue::Int64List(vec![1]), 0, vec![0x40, 0x01, 1, 0, 0, 0, 0, 0, 0, 0])]
    #[case(TaggedValue::Boolean(true), 4, vec![0x84, 0x01])]
    #[case(TaggedValue::Int32(258), 63, vec![0xff, 0x02, 0x01, 0x00, 0x00])]
    fn layout(
        #[case] value: TaggedValue,
        #[case] id: u8,
        #[case] expected: Vec<u8>,
    ) -> Result<(), anyhow::Error> {
        let record = TaggedRecord::new(id, value)?;
        let buf = record.to_vec()?;

        assert_eq!(buf, expected);
        assert_eq!(TaggedRecord::from_slice(&buf)?, record);

        Ok(())
    }

    #[test]
    fn id_must_fit() {
        assert!(TaggedRecord::new(64, TaggedValue::Boolean(false)).is_err());
        assert!(TaggedRecord::new(63, TaggedValue::Boolean(false)).is_ok());
    }

    #[test]
    fn type_mismatch() -> Result<(), anyhow::Error> {
        let record = AlleleSpecificId::EvsCoverage.tagged(TaggedValue::Int32(7))?;
        assert_eq!(record.as_int32()?, 7);
        assert!(matches!(
            record.as_text(),
            Err(SaError::MalformedRecord(_))
        ));

        Ok(())
    }

    #[test]
    fn truncated_list() {
        let buf = vec![0x40, 0x02, 1, 0, 0, 0, 0, 0, 0, 0];
        let res = TaggedRecord::from_slice(&buf);
        assert!(matches!(res, Err(SaError::MalformedRecord(_))), "{:?}", res);
    }
}
