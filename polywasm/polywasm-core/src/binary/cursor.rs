//! Byte cursor with absolute offset tracking and little-endian primitives.

use crate::error::DecodeError;

/// Cursor over a byte slice. `base` is the absolute offset of `data[0]` in the module binary, so
/// sub-cursors over a section payload still report positions in the whole stream.
#[derive(Debug, Clone, Copy)]
pub struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
    base: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            base: 0,
        }
    }

    /// Current absolute byte offset.
    pub fn offset(&self) -> usize {
        self.base + self.pos
    }

    /// Remaining unread length.
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn is_eof(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn eof(&self) -> DecodeError {
        DecodeError::UnexpectedEof {
            offset: self.offset(),
        }
    }

    pub fn peek_u8(&self) -> super::Result<u8> {
        self.data.get(self.pos).copied().ok_or_else(|| self.eof())
    }

    pub fn read_u8(&mut self) -> super::Result<u8> {
        let b = self.peek_u8()?;
        self.pos += 1;
        Ok(b)
    }

    /// Read exactly n bytes and return a slice view into the underlying data.
    pub fn read_bytes(&mut self, n: usize) -> super::Result<&'a [u8]> {
        let end = self.pos.checked_add(n).ok_or_else(|| self.eof())?;
        let slice = self.data.get(self.pos..end).ok_or_else(|| self.eof())?;
        self.pos = end;
        Ok(slice)
    }

    pub fn skip(&mut self, n: usize) -> super::Result<()> {
        self.read_bytes(n).map(|_| ())
    }

    pub fn read_u16(&mut self) -> super::Result<u16> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self) -> super::Result<u32> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Only used for the raw bits of `f64.const`.
    pub fn read_u64(&mut self) -> super::Result<u64> {
        let b = self.read_bytes(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    /// Split off the next `n` bytes as a bounded cursor and advance past them.
    pub fn sub_cursor(&mut self, n: usize) -> super::Result<Cursor<'a>> {
        let base = self.offset();
        let data = self.read_bytes(n)?;
        Ok(Cursor { data, pos: 0, base })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_width_reads() {
        let bytes = [1u8, 2, 3, 4, 5, 6, 7, 8, 9];
        let mut c = Cursor::new(&bytes);
        assert_eq!(c.peek_u8().unwrap(), 1);
        assert_eq!(c.read_u8().unwrap(), 1);
        assert_eq!(c.read_u16().unwrap(), 0x0302);
        assert_eq!(c.read_u32().unwrap(), 0x07060504);
        assert_eq!(c.offset(), 7);
        assert_eq!(c.remaining(), 2);
        assert!(matches!(
            c.read_u32(),
            Err(DecodeError::UnexpectedEof { offset: 7 })
        ));
        // failed reads do not advance
        assert_eq!(c.offset(), 7);
    }

    #[test]
    fn sub_cursor_reports_absolute_offsets() {
        let bytes = [0xAA, 0xBB, 0x01, 0x02, 0xCC];
        let mut c = Cursor::new(&bytes);
        c.skip(2).unwrap();
        let mut sub = c.sub_cursor(2).unwrap();
        assert_eq!(c.offset(), 4);
        assert_eq!(sub.offset(), 2);
        assert_eq!(sub.read_u8().unwrap(), 0x01);
        assert_eq!(sub.read_u8().unwrap(), 0x02);
        assert!(sub.is_eof());
        assert!(matches!(
            sub.read_u8(),
            Err(DecodeError::UnexpectedEof { offset: 4 })
        ));
    }
}
