//! Data message framing: the 3-byte RIPC header, keep-alive pings, and
//! packed sub-message iteration.

use rwire_buffer::ByteBuffer;

use crate::consts::{flags, DATA_HEADER_SIZE, PACKED_PREFIX_SIZE};
use crate::error::{RipcError, Result};

/// The header in front of every wire message: total length including the
/// header itself (2 bytes, big-endian) plus a flags byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataHeader {
    pub message_length: u16,
    pub flags: u8,
}

impl DataHeader {
    /// Read the header at `src`'s position without consuming anything.
    /// Returns `Ok(None)` when fewer than header-size bytes are buffered.
    pub fn peek(src: &ByteBuffer) -> Result<Option<DataHeader>> {
        if src.remaining() < DATA_HEADER_SIZE {
            return Ok(None);
        }
        let message_length = src.get_u16_at(src.position())?;
        let flags = src.get_u8_at(src.position() + 2)?;
        if (message_length as usize) < DATA_HEADER_SIZE {
            return Err(RipcError::LengthMismatch {
                declared: message_length as usize,
                actual: DATA_HEADER_SIZE,
            });
        }
        Ok(Some(DataHeader {
            message_length,
            flags,
        }))
    }

    pub fn encode(&self, dst: &mut ByteBuffer) -> Result<()> {
        dst.put_u16(self.message_length)?;
        dst.put_u8(self.flags)?;
        Ok(())
    }

    pub fn body_length(&self) -> usize {
        self.message_length as usize - DATA_HEADER_SIZE
    }

    /// A keep-alive is a bare header with no payload.
    pub fn is_ping(&self) -> bool {
        self.message_length as usize == DATA_HEADER_SIZE
    }

    pub fn is_packed(&self) -> bool {
        self.flags & flags::PACKING != 0
    }

    pub fn is_compressed(&self) -> bool {
        self.flags & flags::COMPRESSION != 0
    }

    pub fn has_optional_flags(&self) -> bool {
        self.flags & flags::HAS_OPTIONAL_FLAGS != 0
    }
}

/// Frame one complete message: header plus payload.
pub fn encode_message(dst: &mut ByteBuffer, msg_flags: u8, payload: &[u8]) -> Result<()> {
    let total = DATA_HEADER_SIZE + payload.len();
    if total > u16::MAX as usize {
        return Err(RipcError::LengthMismatch {
            declared: u16::MAX as usize,
            actual: total,
        });
    }
    DataHeader {
        message_length: total as u16,
        flags: msg_flags,
    }
    .encode(dst)?;
    dst.put_slice(payload)?;
    Ok(())
}

/// A keep-alive ping is the 3-byte header alone.
pub fn encode_ping(dst: &mut ByteBuffer) -> Result<()> {
    DataHeader {
        message_length: DATA_HEADER_SIZE as u16,
        flags: flags::DATA,
    }
    .encode(dst)
}

/// Append one packed entry: a 2-byte big-endian length prefix and the
/// payload, with no per-entry flags byte.
pub fn encode_packed_entry(dst: &mut ByteBuffer, payload: &[u8]) -> Result<()> {
    if payload.len() > u16::MAX as usize {
        return Err(RipcError::LengthMismatch {
            declared: u16::MAX as usize,
            actual: payload.len(),
        });
    }
    dst.put_u16(payload.len() as u16)?;
    dst.put_slice(payload)?;
    Ok(())
}

/// Iterates the `{u16 length, payload}` entries of a packed message body.
///
/// Zero-length entries are yielded, not skipped, so entry counts match
/// between the packing and unpacking sides. A prefix or payload that runs
/// past the end of the body is a framing error, not end-of-iteration.
pub struct PackedIter<'a> {
    body: &'a [u8],
    pos: usize,
}

impl<'a> PackedIter<'a> {
    pub fn new(body: &'a [u8]) -> Self {
        Self { body, pos: 0 }
    }
}

impl<'a> Iterator for PackedIter<'a> {
    type Item = Result<&'a [u8]>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos == self.body.len() {
            return None;
        }
        if self.body.len() - self.pos < PACKED_PREFIX_SIZE {
            let available = self.body.len() - self.pos;
            self.pos = self.body.len();
            return Some(Err(RipcError::Truncated {
                needed: PACKED_PREFIX_SIZE,
                available,
            }));
        }
        let len =
            u16::from_be_bytes([self.body[self.pos], self.body[self.pos + 1]]) as usize;
        self.pos += PACKED_PREFIX_SIZE;
        if self.body.len() - self.pos < len {
            let available = self.body.len() - self.pos;
            self.pos = self.body.len();
            return Some(Err(RipcError::Truncated {
                needed: len,
                available,
            }));
        }
        let entry = &self.body[self.pos..self.pos + len];
        self.pos += len;
        Some(Ok(entry))
    }
}
