//! Splitting oversized payloads into fragments and reassembling them.
//!
//! A fragmented message starts with a first fragment whose extended header
//! carries the total reassembled length and a fragment identifier, followed
//! by continuation fragments carrying the same identifier. The receiver
//! keeps a single in-flight reassembly context per channel; two fragmented
//! messages never interleave on one connection.

use rwire_buffer::ByteBuffer;
use tracing::trace;

use crate::consts::{flags, opt_flags, RipcVersion, DATA_HEADER_SIZE, FRAGMENT_TOTAL_LEN_SIZE};
use crate::error::{RipcError, Result};
use crate::message::DataHeader;

/// Splits payloads larger than the negotiated max fragment size into
/// complete wire messages, assigning each split a fresh identifier.
#[derive(Debug)]
pub struct Fragmenter {
    version: RipcVersion,
    max_fragment_size: usize,
    next_id: u16,
}

impl Fragmenter {
    pub fn new(version: RipcVersion, max_fragment_size: usize) -> Self {
        Self {
            version,
            max_fragment_size,
            next_id: 1,
        }
    }

    /// Whether a payload of this size exceeds one wire message.
    pub fn needs_fragmenting(&self, payload_len: usize) -> bool {
        DATA_HEADER_SIZE + payload_len > self.max_fragment_size
    }

    fn first_chunk_capacity(&self) -> usize {
        self.max_fragment_size
            - DATA_HEADER_SIZE
            - 1
            - FRAGMENT_TOTAL_LEN_SIZE
            - self.version.fragment_id_size()
    }

    fn next_chunk_capacity(&self) -> usize {
        self.max_fragment_size - DATA_HEADER_SIZE - 1 - self.version.fragment_id_size()
    }

    fn take_id(&mut self) -> u16 {
        let id = self.next_id;
        let wrapped = if self.version.fragment_id_size() == 1 {
            (self.next_id as u8).wrapping_add(1) as u16
        } else {
            self.next_id.wrapping_add(1)
        };
        self.next_id = if wrapped == 0 { 1 } else { wrapped };
        id
    }

    fn put_id(&self, dst: &mut ByteBuffer, id: u16) -> Result<()> {
        if self.version.fragment_id_size() == 1 {
            dst.put_u8(id as u8)?;
        } else {
            dst.put_u16(id)?;
        }
        Ok(())
    }

    /// Write `payload` as a run of fragment messages into `dst`, returning
    /// the number of fragments produced. `extra_flags` is OR-ed into every
    /// fragment header (compression bits).
    pub fn fragment(
        &mut self,
        payload: &[u8],
        extra_flags: u8,
        dst: &mut ByteBuffer,
    ) -> Result<usize> {
        let id = self.take_id();
        let header_flags = flags::DATA | flags::HAS_OPTIONAL_FLAGS | extra_flags;

        let first_len = payload.len().min(self.first_chunk_capacity());
        let first_total =
            DATA_HEADER_SIZE + 1 + FRAGMENT_TOTAL_LEN_SIZE + self.version.fragment_id_size()
                + first_len;
        DataHeader {
            message_length: first_total as u16,
            flags: header_flags,
        }
        .encode(dst)?;
        dst.put_u8(opt_flags::FRAGMENT_HEADER)?;
        dst.put_u32(payload.len() as u32)?;
        self.put_id(dst, id)?;
        dst.put_slice(&payload[..first_len])?;

        let mut sent = first_len;
        let mut count = 1;
        while sent < payload.len() {
            let chunk = (payload.len() - sent).min(self.next_chunk_capacity());
            let total = DATA_HEADER_SIZE + 1 + self.version.fragment_id_size() + chunk;
            DataHeader {
                message_length: total as u16,
                flags: header_flags,
            }
            .encode(dst)?;
            dst.put_u8(opt_flags::FRAGMENT)?;
            self.put_id(dst, id)?;
            dst.put_slice(&payload[sent..sent + chunk])?;
            sent += chunk;
            count += 1;
        }
        trace!(id, fragments = count, total = payload.len(), "fragmented payload");
        Ok(count)
    }
}

/// The single in-flight reassembly context for one channel.
#[derive(Debug, Default)]
pub struct FragmentReassembly {
    current: Option<InFlight>,
}

#[derive(Debug)]
struct InFlight {
    id: u16,
    total: usize,
    data: Vec<u8>,
}

impl FragmentReassembly {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_flight(&self) -> bool {
        self.current.is_some()
    }

    /// Feed one fragment body (the bytes after the flags byte, starting at
    /// the optional-flags byte). Returns the fully reassembled payload once
    /// the declared total length is reached.
    pub fn accept(&mut self, version: RipcVersion, body: &[u8]) -> Result<Option<Vec<u8>>> {
        let (opt, rest) = body
            .split_first()
            .ok_or(RipcError::Fragment("fragment body missing optional flags"))?;
        if opt & opt_flags::FRAGMENT_HEADER != 0 {
            self.accept_first(version, rest)
        } else if opt & opt_flags::FRAGMENT != 0 {
            self.accept_next(version, rest)
        } else {
            Err(RipcError::Fragment("optional flags carry no fragment bit"))
        }
    }

    fn read_id(version: RipcVersion, body: &[u8]) -> Result<(u16, &[u8])> {
        let id_size = version.fragment_id_size();
        if body.len() < id_size {
            return Err(RipcError::Truncated {
                needed: id_size,
                available: body.len(),
            });
        }
        let id = if id_size == 1 {
            body[0] as u16
        } else {
            u16::from_be_bytes([body[0], body[1]])
        };
        Ok((id, &body[id_size..]))
    }

    fn accept_first(&mut self, version: RipcVersion, body: &[u8]) -> Result<Option<Vec<u8>>> {
        if self.current.is_some() {
            return Err(RipcError::Fragment(
                "new fragmented message while one is in flight",
            ));
        }
        if body.len() < FRAGMENT_TOTAL_LEN_SIZE {
            return Err(RipcError::Truncated {
                needed: FRAGMENT_TOTAL_LEN_SIZE,
                available: body.len(),
            });
        }
        let total = u32::from_be_bytes([body[0], body[1], body[2], body[3]]) as usize;
        let (id, chunk) = Self::read_id(version, &body[FRAGMENT_TOTAL_LEN_SIZE..])?;
        if chunk.len() > total {
            return Err(RipcError::Fragment("first fragment exceeds declared total"));
        }
        let mut data = Vec::with_capacity(total);
        data.extend_from_slice(chunk);
        if data.len() == total {
            return Ok(Some(data));
        }
        self.current = Some(InFlight { id, total, data });
        Ok(None)
    }

    fn accept_next(&mut self, version: RipcVersion, body: &[u8]) -> Result<Option<Vec<u8>>> {
        let (id, chunk) = Self::read_id(version, body)?;
        let Some(current) = self.current.as_mut() else {
            return Err(RipcError::Fragment("continuation without a first fragment"));
        };
        if current.id != id {
            return Err(RipcError::Fragment("fragment identifier mismatch"));
        }
        if current.data.len() + chunk.len() > current.total {
            self.current = None;
            return Err(RipcError::Fragment("reassembly exceeds declared total"));
        }
        current.data.extend_from_slice(chunk);
        if current.data.len() == current.total {
            return Ok(self.current.take().map(|c| c.data));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Parse the wire messages a Fragmenter produced and feed each body to
    // the reassembler, the way the channel read path does.
    fn reassemble(version: RipcVersion, wire: &mut ByteBuffer) -> Vec<Vec<u8>> {
        let mut reasm = FragmentReassembly::new();
        let mut out = Vec::new();
        while let Some(header) = DataHeader::peek(wire).unwrap() {
            let mut body = vec![0u8; header.body_length()];
            wire.set_position(wire.position() + DATA_HEADER_SIZE).unwrap();
            wire.get_slice(&mut body).unwrap();
            assert!(header.has_optional_flags());
            if let Some(payload) = reasm.accept(version, &body).unwrap() {
                out.push(payload);
            }
        }
        out
    }

    fn patterned(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn roundtrip_across_multiple_fragments() {
        for version in [RipcVersion::V12, RipcVersion::V13, RipcVersion::V14] {
            let payload = patterned(3500);
            let mut frag = Fragmenter::new(version, 1024);
            assert!(frag.needs_fragmenting(payload.len()));

            let mut wire = ByteBuffer::growable(4096);
            let count = frag.fragment(&payload, 0, &mut wire).unwrap();
            assert!(count >= 4, "expected several fragments, got {count}");
            wire.flip();

            let messages = reassemble(version, &mut wire);
            assert_eq!(messages, vec![payload]);
        }
    }

    #[test]
    fn fragments_respect_max_wire_size() {
        let payload = patterned(5000);
        let mut frag = Fragmenter::new(RipcVersion::V14, 1024);
        let mut wire = ByteBuffer::growable(8192);
        frag.fragment(&payload, 0, &mut wire).unwrap();
        wire.flip();

        while let Some(header) = DataHeader::peek(&wire).unwrap() {
            assert!(header.message_length as usize <= 1024);
            wire.set_position(wire.position() + header.message_length as usize)
                .unwrap();
        }
    }

    #[test]
    fn sequential_fragmented_messages_get_distinct_ids() {
        let mut frag = Fragmenter::new(RipcVersion::V14, 256);
        let mut wire = ByteBuffer::growable(8192);
        frag.fragment(&patterned(600), 0, &mut wire).unwrap();
        frag.fragment(&patterned(600), 0, &mut wire).unwrap();
        wire.flip();

        let messages = reassemble(RipcVersion::V14, &mut wire);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], patterned(600));
        assert_eq!(messages[1], patterned(600));
    }

    #[test]
    fn continuation_without_first_is_an_error() {
        let mut reasm = FragmentReassembly::new();
        let body = [opt_flags::FRAGMENT, 0x00, 0x01, 0xAA];
        let err = reasm.accept(RipcVersion::V14, &body).unwrap_err();
        assert!(matches!(err, RipcError::Fragment(_)));
    }

    #[test]
    fn interleaved_first_fragments_are_rejected() {
        let mut frag = Fragmenter::new(RipcVersion::V14, 256);
        let mut wire = ByteBuffer::growable(2048);
        frag.fragment(&patterned(600), 0, &mut wire).unwrap();
        wire.flip();

        // extract just the first fragment's body
        let header = DataHeader::peek(&wire).unwrap().unwrap();
        let mut body = vec![0u8; header.body_length()];
        wire.set_position(DATA_HEADER_SIZE).unwrap();
        wire.get_slice(&mut body).unwrap();

        let mut reasm = FragmentReassembly::new();
        assert!(reasm.accept(RipcVersion::V14, &body).unwrap().is_none());
        assert!(reasm.in_flight());
        let err = reasm.accept(RipcVersion::V14, &body).unwrap_err();
        assert!(matches!(err, RipcError::Fragment(_)));
    }

    #[test]
    fn v12_uses_single_byte_ids() {
        // small enough to fit in one first fragment, so the wire size
        // difference is exactly the identifier width
        let payload = patterned(100);
        let mut narrow = Fragmenter::new(RipcVersion::V12, 256);
        let mut wide = Fragmenter::new(RipcVersion::V13, 256);

        let mut wire12 = ByteBuffer::growable(2048);
        let mut wire13 = ByteBuffer::growable(2048);
        narrow.fragment(&payload, 0, &mut wire12).unwrap();
        wide.fragment(&payload, 0, &mut wire13).unwrap();
        wire12.flip();
        wire13.flip();

        let h12 = DataHeader::peek(&wire12).unwrap().unwrap();
        let h13 = DataHeader::peek(&wire13).unwrap().unwrap();
        assert_eq!(h13.message_length, h12.message_length + 1);
        assert_eq!(reassemble(RipcVersion::V12, &mut wire12), vec![payload.clone()]);
        assert_eq!(reassemble(RipcVersion::V13, &mut wire13), vec![payload]);
    }
}
