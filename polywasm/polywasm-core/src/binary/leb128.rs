//! LEB128 decoding for the widths the MVP format uses: varuint1/7/32 and varint7/32.
//! 64-bit integers are rejected outright rather than truncated.

use super::{cursor::Cursor, Result};
use crate::error::DecodeError;

/// Unsigned LEB128 as u32 (at most 5 bytes, unused bits of the last byte must be zero).
pub fn read_varuint32(cur: &mut Cursor) -> Result<u32> {
    let start = cur.offset();
    let mut result: u32 = 0;
    let mut shift: u32 = 0;
    loop {
        let byte = cur.read_u8()?;
        if shift == 28 && byte & 0xF0 != 0 {
            return Err(DecodeError::BadUnsigned {
                bits: 32,
                offset: start,
            });
        }
        result |= u32::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
    }
}

/// Signed LEB128 as i32 (at most 5 bytes, unused bits of the last byte must sign-extend).
pub fn read_varint32(cur: &mut Cursor) -> Result<i32> {
    let start = cur.offset();
    let mut result: i32 = 0;
    let mut shift: u32 = 0;
    loop {
        let byte = cur.read_u8()?;
        if shift == 28 {
            let unused = byte & 0x70;
            let sign = byte & 0x08;
            let extends = (sign == 0 && unused == 0) || (sign != 0 && unused == 0x70);
            if byte & 0x80 != 0 || !extends {
                return Err(DecodeError::BadSigned {
                    bits: 32,
                    offset: start,
                });
            }
        }
        result |= i32::from(byte & 0x7F) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            if shift < 32 && byte & 0x40 != 0 {
                result |= !0i32 << shift;
            }
            return Ok(result);
        }
    }
}

pub fn read_varuint1(cur: &mut Cursor) -> Result<bool> {
    let start = cur.offset();
    match read_varuint32(cur)? {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(DecodeError::BadUnsigned {
            bits: 1,
            offset: start,
        }),
    }
}

pub fn read_varuint7(cur: &mut Cursor) -> Result<u8> {
    let start = cur.offset();
    let v = read_varuint32(cur)?;
    if v > 0x7F {
        return Err(DecodeError::BadUnsigned {
            bits: 7,
            offset: start,
        });
    }
    Ok(v as u8)
}

pub fn read_varint7(cur: &mut Cursor) -> Result<i8> {
    let start = cur.offset();
    let v = read_varint32(cur)?;
    if !(-64..=63).contains(&v) {
        return Err(DecodeError::BadSigned {
            bits: 7,
            offset: start,
        });
    }
    Ok(v as i8)
}

/// Always fails: 64-bit integer immediates are outside the supported operator set.
pub fn read_varint64(cur: &mut Cursor) -> Result<i64> {
    Err(DecodeError::Unsupported64BitInteger {
        offset: cur.offset(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varuint32_basic() {
        let mut c = Cursor::new(&[0xE5, 0x8E, 0x26]); // 624485
        assert_eq!(read_varuint32(&mut c).unwrap(), 624485);
        assert!(c.is_eof());

        let mut c = Cursor::new(&[0xFF, 0xFF, 0xFF, 0xFF, 0x0F]);
        assert_eq!(read_varuint32(&mut c).unwrap(), u32::MAX);
    }

    #[test]
    fn varuint32_padded_encoding_accepted() {
        // 3 encoded in 5 bytes
        let mut c = Cursor::new(&[0x83, 0x80, 0x80, 0x80, 0x00]);
        assert_eq!(read_varuint32(&mut c).unwrap(), 3);
    }

    #[test]
    fn varuint32_rejects_overlong_and_high_bits() {
        let bytes = [0xFFu8; 6];
        let mut c = Cursor::new(&bytes);
        assert!(matches!(
            read_varuint32(&mut c),
            Err(DecodeError::BadUnsigned { bits: 32, offset: 0 })
        ));

        let mut c = Cursor::new(&[0xFF, 0xFF, 0xFF, 0xFF, 0x1F]);
        assert!(read_varuint32(&mut c).is_err());
    }

    #[test]
    fn varint32_basic() {
        // -624485 encoded as SLEB128: 9b f1 59
        let mut c = Cursor::new(&[0x9b, 0xf1, 0x59]);
        assert_eq!(read_varint32(&mut c).unwrap(), -624485);

        let mut c = Cursor::new(&[0x7F]);
        assert_eq!(read_varint32(&mut c).unwrap(), -1);

        let mut c = Cursor::new(&[0x80, 0x80, 0x80, 0x80, 0x78]);
        assert_eq!(read_varint32(&mut c).unwrap(), i32::MIN);

        let mut c = Cursor::new(&[0xFF, 0xFF, 0xFF, 0xFF, 0x07]);
        assert_eq!(read_varint32(&mut c).unwrap(), i32::MAX);
    }

    #[test]
    fn varint32_rejects_bad_sign_extension() {
        let mut c = Cursor::new(&[0xFF, 0xFF, 0xFF, 0xFF, 0x4F]);
        assert!(matches!(
            read_varint32(&mut c),
            Err(DecodeError::BadSigned { bits: 32, .. })
        ));
    }

    #[test]
    fn narrow_widths_check_high_bits() {
        assert!(read_varuint1(&mut Cursor::new(&[0x01])).unwrap());
        assert!(read_varuint1(&mut Cursor::new(&[0x02])).is_err());
        assert_eq!(read_varuint7(&mut Cursor::new(&[0x7F])).unwrap(), 0x7F);
        assert!(read_varuint7(&mut Cursor::new(&[0x80, 0x01])).is_err());
        assert_eq!(read_varint7(&mut Cursor::new(&[0x7F])).unwrap(), -1);
        assert_eq!(read_varint7(&mut Cursor::new(&[0x40])).unwrap(), -64);
        assert!(read_varint7(&mut Cursor::new(&[0xC0, 0x00])).is_err());
    }

    #[test]
    fn truncated_input_is_eof() {
        let mut c = Cursor::new(&[0x80, 0x80]);
        assert!(matches!(
            read_varuint32(&mut c),
            Err(DecodeError::UnexpectedEof { offset: 2 })
        ));
    }

    #[test]
    fn varint64_fails_loudly() {
        let mut c = Cursor::new(&[0x01]);
        assert!(matches!(
            read_varint64(&mut c),
            Err(DecodeError::Unsupported64BitInteger { offset: 0 })
        ));
    }
}
