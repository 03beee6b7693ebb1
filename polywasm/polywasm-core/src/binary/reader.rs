//! Higher-level binary helpers: length-prefixed byte runs, names, and vectors.

use super::{cursor::Cursor, leb128, Result};
use crate::error::DecodeError;

/// Read a varuint32 length followed by that many raw bytes.
pub fn read_len_prefixed_bytes<'a>(cur: &mut Cursor<'a>) -> Result<&'a [u8]> {
    let len = leb128::read_varuint32(cur)? as usize;
    cur.read_bytes(len)
}

/// Read a UTF-8 name (length-prefixed bytes).
pub fn read_name(cur: &mut Cursor) -> Result<String> {
    let offset = cur.offset();
    let bytes = read_len_prefixed_bytes(cur)?;
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|_| DecodeError::InvalidUtf8 { offset })
}

/// Read a vector of T using the provided element reader closure.
/// Length is encoded as varuint32; every element takes at least one byte, so the reservation is
/// capped by what is left in the cursor.
pub fn read_vec<'a, T, F>(cur: &mut Cursor<'a>, mut elem: F) -> Result<Vec<T>>
where
    F: FnMut(&mut Cursor<'a>) -> Result<T>,
{
    let len = leb128::read_varuint32(cur)? as usize;
    let mut out = Vec::with_capacity(len.min(cur.remaining()));
    for _ in 0..len {
        out.push(elem(cur)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_name_ok() {
        let data = [0x03, b'f', b'o', b'o'];
        let mut c = Cursor::new(&data);
        assert_eq!(read_name(&mut c).unwrap(), "foo");
        assert!(c.is_eof());
    }

    #[test]
    fn read_name_rejects_invalid_utf8() {
        let data = [0x02, 0xC3, 0x28];
        let mut c = Cursor::new(&data);
        assert!(matches!(
            read_name(&mut c),
            Err(DecodeError::InvalidUtf8 { offset: 0 })
        ));
    }

    #[test]
    fn read_vec_of_bytes() {
        let data = [0x02, 0xAA, 0xBB];
        let mut c = Cursor::new(&data);
        let v = read_vec(&mut c, |c| c.read_u8()).unwrap();
        assert_eq!(v, vec![0xAA, 0xBB]);
    }

    #[test]
    fn huge_vec_count_fails_without_allocating() {
        let data = [0xFF, 0xFF, 0xFF, 0xFF, 0x0F, 0x01];
        let mut c = Cursor::new(&data);
        assert!(matches!(
            read_vec(&mut c, |c| c.read_u8()),
            Err(DecodeError::UnexpectedEof { .. })
        ));
    }
}
