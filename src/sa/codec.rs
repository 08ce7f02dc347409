//! Primitive binary codec shared by all record types.
//!
//! All fixed-width integers are little endian.  Lengths and counts use a 7-bit
//! variable length encoding.  Optional text is written as `0` for absent or
//! `len + 1` followed by the UTF-8 bytes, so that absent and empty text stay
//! distinguishable.  Optional numbers are written as a presence byte (`0`/`1`)
//! followed by the value if present.

use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::err::SaError;

/// Maximal number of bytes of an encoded `u32` varint.
const MAX_VARINT_BYTES: usize = 5;

/// Map I/O errors on reads inside a record to `MalformedRecord`.
pub fn truncated(what: &'static str) -> impl FnOnce(std::io::Error) -> SaError {
    move |e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            SaError::MalformedRecord(format!("truncated {}", what))
        } else {
            SaError::Io(e)
        }
    }
}

/// Types that can be written to the binary format.
pub trait Encode {
    /// Write `self` to `writer`.
    fn encode<W: Write>(&self, writer: &mut W) -> Result<(), SaError>;

    /// Convert to a byte vector.
    fn to_vec(&self) -> Result<Vec<u8>, SaError> {
        let mut buf = Vec::new();
        self.encode(&mut buf)?;
        Ok(buf)
    }
}

/// Types that can be read from the binary format.
pub trait Decode: Sized {
    /// Read a value from `reader`.
    fn decode<R: Read>(reader: &mut R) -> Result<Self, SaError>;

    /// Read a value from `buf`, requiring that all bytes are consumed.
    fn from_slice(buf: &[u8]) -> Result<Self, SaError> {
        let mut cursor = Cursor::new(buf);
        let result = Self::decode(&mut cursor)?;
        if cursor.position() as usize != buf.len() {
            return Err(SaError::MalformedRecord(format!(
                "{} trailing bytes",
                buf.len() - cursor.position() as usize
            )));
        }
        Ok(result)
    }
}

pub fn write_varint<W: Write>(writer: &mut W, value: u32) -> Result<(), SaError> {
    let mut value = value;
    while value >= 0x80 {
        writer.write_u8((value as u8 & 0x7f) | 0x80)?;
        value >>= 7;
    }
    writer.write_u8(value as u8)?;
    Ok(())
}

pub fn read_varint<R: Read>(reader: &mut R) -> Result<u32, SaError> {
    let mut result = 0u32;
    for i in 0..MAX_VARINT_BYTES {
        let byte = reader.read_u8().map_err(truncated("varint"))?;
        let bits = (byte & 0x7f) as u32;
        if i == MAX_VARINT_BYTES - 1 && bits > 0x0f {
            return Err(SaError::MalformedRecord("varint overflows u32".into()));
        }
        result |= bits << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(result);
        }
    }
    Err(SaError::MalformedRecord("varint longer than 5 bytes".into()))
}

/// Write a length or count, failing if it does not fit the varint range.
pub fn write_len<W: Write>(writer: &mut W, len: usize) -> Result<(), SaError> {
    let len = u32::try_from(len)
        .map_err(|_| SaError::MalformedRecord(format!("length {} too large", len)))?;
    write_varint(writer, len)
}

pub fn read_len<R: Read>(reader: &mut R) -> Result<usize, SaError> {
    Ok(read_varint(reader)? as usize)
}

/// Read exactly `len` bytes without trusting `len` for the allocation.
fn read_bytes<R: Read>(reader: &mut R, len: usize) -> Result<Vec<u8>, SaError> {
    let mut buf = Vec::new();
    reader.take(len as u64).read_to_end(&mut buf)?;
    if buf.len() != len {
        return Err(SaError::MalformedRecord(format!(
            "expected {} bytes, got {}",
            len,
            buf.len()
        )));
    }
    Ok(buf)
}

fn utf8(buf: Vec<u8>) -> Result<String, SaError> {
    String::from_utf8(buf).map_err(|e| SaError::MalformedRecord(format!("invalid UTF-8: {}", e)))
}

/// Write required text as length and bytes.
pub fn write_text<W: Write>(writer: &mut W, text: &str) -> Result<(), SaError> {
    write_len(writer, text.len())?;
    writer.write_all(text.as_bytes())?;
    Ok(())
}

pub fn read_text<R: Read>(reader: &mut R) -> Result<String, SaError> {
    let len = read_len(reader)?;
    utf8(read_bytes(reader, len)?)
}

pub fn write_opt_text<W: Write>(writer: &mut W, text: Option<&str>) -> Result<(), SaError> {
    match text {
        None => write_varint(writer, 0),
        Some(text) => {
            write_len(writer, text.len() + 1)?;
            writer.write_all(text.as_bytes())?;
            Ok(())
        }
    }
}

pub fn read_opt_text<R: Read>(reader: &mut R) -> Result<Option<String>, SaError> {
    match read_len(reader)? {
        0 => Ok(None),
        len => Ok(Some(utf8(read_bytes(reader, len - 1)?)?)),
    }
}

pub fn write_bool<W: Write>(writer: &mut W, value: bool) -> Result<(), SaError> {
    writer.write_u8(value as u8)?;
    Ok(())
}

pub fn read_bool<R: Read>(reader: &mut R) -> Result<bool, SaError> {
    match reader.read_u8().map_err(truncated("boolean"))? {
        0 => Ok(false),
        1 => Ok(true),
        value => Err(SaError::MalformedRecord(format!(
            "invalid boolean byte {}",
            value
        ))),
    }
}

pub fn write_opt_i32<W: Write>(writer: &mut W, value: Option<i32>) -> Result<(), SaError> {
    write_bool(writer, value.is_some())?;
    if let Some(value) = value {
        writer.write_i32::<LittleEndian>(value)?;
    }
    Ok(())
}

pub fn read_opt_i32<R: Read>(reader: &mut R) -> Result<Option<i32>, SaError> {
    if read_bool(reader)? {
        Ok(Some(
            reader
                .read_i32::<LittleEndian>()
                .map_err(truncated("optional i32"))?,
        ))
    } else {
        Ok(None)
    }
}

pub fn write_i32<W: Write>(writer: &mut W, value: i32) -> Result<(), SaError> {
    writer.write_i32::<LittleEndian>(value)?;
    Ok(())
}

pub fn read_i32<R: Read>(reader: &mut R) -> Result<i32, SaError> {
    reader.read_i32::<LittleEndian>().map_err(truncated("i32"))
}

pub fn write_i64<W: Write>(writer: &mut W, value: i64) -> Result<(), SaError> {
    writer.write_i64::<LittleEndian>(value)?;
    Ok(())
}

pub fn read_i64<R: Read>(reader: &mut R) -> Result<i64, SaError> {
    reader.read_i64::<LittleEndian>().map_err(truncated("i64"))
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[rstest::rstest]
    #[case(0, vec![0x00])]
    #[case(127, vec![0x7f])]
    #[case(128, vec![0x80, 0x01])]
    #[case(300, vec![0xac, 0x02])]
    #[case(u32::MAX, vec![0xff, 0xff, 0xff, 0xff, 0x0f])]
    fn varint_bytes(#[case] value: u32, #[case] expected: Vec<u8>) -> Result<(), anyhow::Error> {
        let mut buf = Vec::new();
        write_varint(&mut buf, value)?;
        assert_eq!(buf, expected);
        assert_eq!(read_varint(&mut Cursor::new(&buf))?, value);

        Ok(())
    }

    #[rstest::rstest]
    #[case(vec![0x80])]
    #[case(vec![0xff, 0xff, 0xff, 0xff, 0x1f])]
    #[case(vec![0xff, 0xff, 0xff, 0xff, 0xff, 0x01])]
    fn varint_corrupt(#[case] buf: Vec<u8>) {
        let res = read_varint(&mut Cursor::new(&buf));
        assert!(matches!(res, Err(SaError::MalformedRecord(_))), "{:?}", res);
    }

    #[test]
    fn absent_and_empty_text_differ() -> Result<(), anyhow::Error> {
        let mut absent = Vec::new();
        write_opt_text(&mut absent, None)?;
        let mut empty = Vec::new();
        write_opt_text(&mut empty, Some(""))?;

        assert_eq!(absent, vec![0x00]);
        assert_eq!(empty, vec![0x01]);
        assert_eq!(read_opt_text(&mut Cursor::new(&absent))?, None);
        assert_eq!(read_opt_text(&mut Cursor::new(&empty))?, Some(String::new()));

        Ok(())
    }

    #[test]
    fn optional_i32_layout() -> Result<(), anyhow::Error> {
        let mut buf = Vec::new();
        write_opt_i32(&mut buf, Some(-2))?;
        write_opt_i32(&mut buf, None)?;

        assert_eq!(buf, vec![0x01, 0xfe, 0xff, 0xff, 0xff, 0x00]);
        let mut cursor = Cursor::new(&buf);
        assert_eq!(read_opt_i32(&mut cursor)?, Some(-2));
        assert_eq!(read_opt_i32(&mut cursor)?, None);

        Ok(())
    }

    #[test]
    fn truncated_text_is_malformed() {
        // claims five bytes, carries two
        let buf = vec![0x06, b'A', b'C'];
        let res = read_opt_text(&mut Cursor::new(&buf));
        assert!(matches!(res, Err(SaError::MalformedRecord(_))), "{:?}", res);
    }

    #[test]
    fn invalid_presence_flag() {
        let res = read_opt_i32(&mut Cursor::new(&[0x02u8, 0, 0, 0, 0]));
        assert!(matches!(res, Err(SaError::MalformedRecord(_))), "{:?}", res);
    }
}
