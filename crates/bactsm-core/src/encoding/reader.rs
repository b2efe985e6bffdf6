use crate::DecodeError;

/// Forward-only cursor over an inbound frame. Reads past the end fail with
/// [`DecodeError::UnexpectedEof`] and leave the cursor where it was.
#[derive(Debug, Clone, Copy)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub const fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub const fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn peek_u8(&self) -> Result<u8, DecodeError> {
        self.buf
            .get(self.pos)
            .copied()
            .ok_or(DecodeError::UnexpectedEof)
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        let [byte] = self.read_array()?;
        Ok(byte)
    }

    pub fn read_exact(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or(DecodeError::UnexpectedEof)?;
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_exact(N)?);
        Ok(out)
    }

    /// Consumes and returns everything not yet read, e.g. the service payload
    /// behind an APDU header.
    pub fn read_remaining(&mut self) -> &'a [u8] {
        let start = self.pos.min(self.buf.len());
        self.pos = self.buf.len();
        &self.buf[start..]
    }

    pub fn read_be_u16(&mut self) -> Result<u16, DecodeError> {
        self.read_array().map(u16::from_be_bytes)
    }

    pub fn read_be_u32(&mut self) -> Result<u32, DecodeError> {
        self.read_array().map(u32::from_be_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::Reader;
    use crate::DecodeError;

    #[test]
    fn splits_header_from_payload() {
        // Complex ack header for invoke id 5, ReadProperty, then payload.
        let mut r = Reader::new(&[0x30, 0x05, 0x0C, 0x0C, 0x02, 0x00]);
        assert_eq!(r.read_u8().unwrap() >> 4, 3);
        assert_eq!(r.read_exact(2).unwrap(), &[0x05, 0x0C]);
        assert_eq!(r.position(), 3);
        assert_eq!(r.read_remaining(), &[0x0C, 0x02, 0x00]);
        assert!(r.is_empty());
        assert_eq!(r.read_remaining(), &[] as &[u8]);
    }

    #[test]
    fn big_endian_fields() {
        let mut r = Reader::new(&[0x00, 0x07, 0x02, 0x00, 0x00, 0x7B]);
        assert_eq!(r.read_be_u16().unwrap(), 7);
        assert_eq!(r.read_be_u32().unwrap(), 0x0200_007B);
    }

    #[test]
    fn short_read_does_not_advance() {
        let mut r = Reader::new(&[0x81, 0x0A, 0x00]);
        r.read_u8().unwrap();
        assert_eq!(r.read_be_u32().unwrap_err(), DecodeError::UnexpectedEof);
        assert_eq!(r.position(), 1);
        assert_eq!(r.read_exact(usize::MAX).unwrap_err(), DecodeError::UnexpectedEof);
        assert_eq!(r.peek_u8().unwrap(), 0x0A);
    }
}
