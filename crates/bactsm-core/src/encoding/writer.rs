use crate::EncodeError;

/// Bounded cursor over a caller-owned buffer.
#[derive(Debug)]
pub struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub const fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    pub fn as_written(&self) -> &[u8] {
        &self.buf[..self.pos]
    }

    /// Gives up the cursor and keeps the written prefix for the buffer's lifetime.
    pub fn into_written(self) -> &'a [u8] {
        &self.buf[..self.pos]
    }

    pub fn write_u8(&mut self, value: u8) -> Result<(), EncodeError> {
        self.write_all(&[value])
    }

    pub fn write_all(&mut self, data: &[u8]) -> Result<(), EncodeError> {
        let end = self
            .pos
            .checked_add(data.len())
            .filter(|end| *end <= self.buf.len())
            .ok_or(EncodeError::BufferTooSmall)?;
        self.buf[self.pos..end].copy_from_slice(data);
        self.pos = end;
        Ok(())
    }

    pub fn write_be_u16(&mut self, value: u16) -> Result<(), EncodeError> {
        self.write_all(&value.to_be_bytes())
    }

    pub fn write_be_u32(&mut self, value: u32) -> Result<(), EncodeError> {
        self.write_all(&value.to_be_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::Writer;
    use crate::EncodeError;

    #[test]
    fn writes_in_order() {
        let mut buf = [0u8; 8];
        let mut w = Writer::new(&mut buf);
        w.write_u8(1).unwrap();
        w.write_be_u16(0x0203).unwrap();
        assert_eq!(w.remaining(), 5);
        assert_eq!(w.into_written(), &[1, 2, 3]);
    }

    #[test]
    fn overflow_leaves_position_untouched() {
        let mut buf = [0u8; 3];
        let mut w = Writer::new(&mut buf);
        w.write_u8(1).unwrap();
        assert_eq!(
            w.write_be_u32(7).unwrap_err(),
            EncodeError::BufferTooSmall
        );
        assert_eq!(w.position(), 1);
    }
}
