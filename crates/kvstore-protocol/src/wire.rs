use crate::error::{ProtocolError, ProtocolResult};

/// Maximum frame payload size (§6), guarding against a hostile or corrupt
/// length prefix causing an unbounded allocation.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// A forward-only cursor over a decoded frame's payload bytes. Every field
/// in the wire protocol (§6) is big-endian and either fixed-width or a
/// `len:u32`-prefixed byte blob; this is the shared reading primitive for
/// both the client and replication message codecs.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> ProtocolResult<&'a [u8]> {
        if self.pos + n > self.buf.len() {
            return Err(ProtocolError::Framing(format!(
                "expected {n} more bytes at offset {}, have {}",
                self.pos,
                self.buf.len()
            )));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn u8(&mut self) -> ProtocolResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn u32(&mut self) -> ProtocolResult<u32> {
        Ok(u32::from_be_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn u64(&mut self) -> ProtocolResult<u64> {
        Ok(u64::from_be_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub fn f32(&mut self) -> ProtocolResult<f32> {
        Ok(f32::from_be_bytes(self.take(4)?.try_into().unwrap()))
    }

    /// A `len:u32` prefixed byte blob (key, value, or query bytes).
    pub fn bytes(&mut self) -> ProtocolResult<Vec<u8>> {
        let len = self.u32()? as usize;
        if len > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge {
                size: len,
                max: MAX_MESSAGE_SIZE,
            });
        }
        Ok(self.take(len)?.to_vec())
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn finish(self) -> ProtocolResult<()> {
        if self.remaining() != 0 {
            return Err(ProtocolError::Malformed(format!(
                "{} trailing bytes after decoding",
                self.remaining()
            )));
        }
        Ok(())
    }
}

/// Accumulates a payload in the same wire encoding `Reader` decodes.
#[derive(Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn u64(&mut self, v: u64) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn f32(&mut self, v: f32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn bytes(&mut self, v: &[u8]) -> &mut Self {
        self.u32(v.len() as u32);
        self.buf.extend_from_slice(v);
        self
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }
}

/// Frame a payload as `[len:u32 big-endian][payload]` (§6).
pub fn encode_frame(payload: &[u8]) -> ProtocolResult<Vec<u8>> {
    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: payload.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }
    let mut framed = Vec::with_capacity(4 + payload.len());
    framed.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    framed.extend_from_slice(payload);
    Ok(framed)
}

/// Decode one frame from the front of `buf`, returning the payload slice and
/// the total number of bytes consumed. Returns `Ok(None)` if `buf` does not
/// yet contain a complete frame (caller should read more and retry) rather
/// than treating a short read as an error.
pub fn decode_frame(buf: &[u8]) -> ProtocolResult<Option<(&[u8], usize)>> {
    if buf.len() < 4 {
        return Ok(None);
    }
    let len = u32::from_be_bytes(buf[0..4].try_into().unwrap()) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: len,
            max: MAX_MESSAGE_SIZE,
        });
    }
    let total = 4 + len;
    if buf.len() < total {
        return Ok(None);
    }
    Ok(Some((&buf[4..total], total)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_reader_roundtrip_fixed_and_variable_fields() {
        let mut w = Writer::new();
        w.u8(7).u32(42).u64(9_999).f32(0.5).bytes(b"hello");
        let payload = w.into_vec();

        let mut r = Reader::new(&payload);
        assert_eq!(r.u8().unwrap(), 7);
        assert_eq!(r.u32().unwrap(), 42);
        assert_eq!(r.u64().unwrap(), 9_999);
        assert_eq!(r.f32().unwrap(), 0.5);
        assert_eq!(r.bytes().unwrap(), b"hello");
        r.finish().unwrap();
    }

    #[test]
    fn reader_errors_on_short_buffer() {
        let mut r = Reader::new(&[0u8, 1]);
        assert!(r.u32().is_err());
    }

    #[test]
    fn decode_frame_waits_for_full_payload() {
        let framed = encode_frame(b"abc").unwrap();
        assert_eq!(decode_frame(&framed[..3]).unwrap(), None);
        let (payload, consumed) = decode_frame(&framed).unwrap().unwrap();
        assert_eq!(payload, b"abc");
        assert_eq!(consumed, framed.len());
    }

    #[test]
    fn decode_frame_rejects_oversized_length_prefix() {
        let mut bogus = Vec::new();
        bogus.extend_from_slice(&((MAX_MESSAGE_SIZE as u32) + 1).to_be_bytes());
        let err = decode_frame(&bogus).unwrap_err();
        assert!(matches!(err, ProtocolError::MessageTooLarge { .. }));
    }
}
