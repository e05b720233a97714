use crate::CodecError;
use bytes::Buf;

/// Bounds-checked cursor over an encoded message.
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn need(&self, n: usize, what: &'static str) -> Result<(), CodecError> {
        if self.buf.remaining() < n {
            return Err(CodecError::Truncated(what));
        }
        Ok(())
    }

    pub(crate) fn u8(&mut self, what: &'static str) -> Result<u8, CodecError> {
        self.need(1, what)?;
        Ok(self.buf.get_u8())
    }

    pub(crate) fn u32_be(&mut self, what: &'static str) -> Result<u32, CodecError> {
        self.need(4, what)?;
        Ok(self.buf.get_u32())
    }

    pub(crate) fn u32_le(&mut self, what: &'static str) -> Result<u32, CodecError> {
        self.need(4, what)?;
        Ok(self.buf.get_u32_le())
    }

    /// Reads a one-byte length prefix followed by that many UTF-8 bytes.
    pub(crate) fn short_string(&mut self, what: &'static str) -> Result<String, CodecError> {
        let len = self.u8(what)? as usize;
        self.need(len, what)?;
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        String::from_utf8(head.to_vec()).map_err(|_| CodecError::InvalidUtf8(what))
    }

    /// Everything left; the trailing payload is never length-prefixed.
    pub(crate) fn rest(self) -> &'a [u8] {
        self.buf
    }
}
