//! Pulls one logical message at a time out of the raw receive buffer:
//! header scanning, unpacking, fragment reassembly, and per-message
//! decompression.

use std::collections::VecDeque;

use rwire_buffer::ByteBuffer;
use rwire_ripc::consts::DATA_HEADER_SIZE;
use rwire_ripc::message::PackedIter;
use rwire_ripc::{Compressor, DataHeader, FragmentReassembly, RipcError, RipcVersion};

use crate::error::Result;

/// One decoded wire event.
#[derive(Debug, PartialEq, Eq)]
pub enum Decoded {
    /// A complete logical application message.
    Message(Vec<u8>),
    /// A keep-alive; no payload.
    Ping,
}

/// Incremental message decoder for one channel's receive direction.
///
/// `load` consumes complete wire messages from the front of the I/O buffer
/// and never consumes a partial one: truncated bytes stay in place for the
/// next socket read. Unpacked sub-messages queue internally so each call
/// yields exactly one logical message.
pub struct MessageDecoder {
    version: RipcVersion,
    max_decompressed: usize,
    reassembly: FragmentReassembly,
    /// Whether the in-flight fragmented message needs inflating once whole.
    reassembly_compressed: bool,
    /// Whether the in-flight fragmented message unpacks once whole.
    reassembly_packed: bool,
    pending_packed: VecDeque<Vec<u8>>,
}

impl MessageDecoder {
    pub fn new(version: RipcVersion, max_decompressed: usize) -> Self {
        Self {
            version,
            max_decompressed,
            reassembly: FragmentReassembly::new(),
            reassembly_compressed: false,
            reassembly_packed: false,
            pending_packed: VecDeque::new(),
        }
    }

    /// Whether a call to `load` can yield without more socket bytes.
    pub fn has_buffered(&self, io: &ByteBuffer) -> bool {
        if !self.pending_packed.is_empty() {
            return true;
        }
        match DataHeader::peek(io) {
            Ok(Some(header)) => io.remaining() >= header.message_length as usize,
            _ => false,
        }
    }

    /// Decode the next logical message from `io`. Returns `Ok(None)` when
    /// the buffer holds no complete message (or only non-final fragments).
    pub fn load(
        &mut self,
        io: &mut ByteBuffer,
        decompressor: Option<&mut Box<dyn Compressor>>,
    ) -> Result<Option<Decoded>> {
        if let Some(sub) = self.pending_packed.pop_front() {
            return Ok(Some(Decoded::Message(sub)));
        }

        loop {
            let Some(header) = DataHeader::peek(io)? else {
                return Ok(None);
            };
            if io.remaining() < header.message_length as usize {
                return Ok(None);
            }

            // the whole message is buffered; consume it
            io.set_position(io.position() + DATA_HEADER_SIZE)?;
            let mut body = vec![0u8; header.body_length()];
            io.get_slice(&mut body)?;

            if header.is_ping() {
                return Ok(Some(Decoded::Ping));
            }

            if header.has_optional_flags() {
                if !self.reassembly.in_flight() {
                    self.reassembly_compressed = header.is_compressed();
                    self.reassembly_packed = header.is_packed();
                }
                match self.reassembly.accept(self.version, &body)? {
                    Some(whole) => {
                        let compressed = self.reassembly_compressed;
                        let packed = self.reassembly_packed;
                        self.reassembly_compressed = false;
                        self.reassembly_packed = false;
                        return self.finish(whole, compressed, packed, decompressor).map(Some);
                    }
                    // mid-reassembly; scan for the next wire message
                    None => continue,
                }
            }

            return self
                .finish(body, header.is_compressed(), header.is_packed(), decompressor)
                .map(Some);
        }
    }

    /// Decompress and unpack a complete message body.
    fn finish(
        &mut self,
        body: Vec<u8>,
        compressed: bool,
        packed: bool,
        decompressor: Option<&mut Box<dyn Compressor>>,
    ) -> Result<Decoded> {
        let body = if compressed {
            let codec = decompressor.ok_or(RipcError::Decompress(
                "compressed message on an uncompressed channel".to_string(),
            ))?;
            codec.decompress(&body, self.max_decompressed)?
        } else {
            body
        };

        if packed {
            let mut entries = PackedIter::new(&body);
            let first = match entries.next() {
                Some(entry) => entry?.to_vec(),
                // a packed message with zero entries decodes as one
                // empty message
                None => Vec::new(),
            };
            for entry in entries {
                self.pending_packed.push_back(entry?.to_vec());
            }
            return Ok(Decoded::Message(first));
        }
        Ok(Decoded::Message(body))
    }
}

#[cfg(test)]
mod tests {
    use rwire_ripc::consts::flags;
    use rwire_ripc::message::{encode_message, encode_packed_entry, encode_ping};
    use rwire_ripc::{new_compressor, CompressionType, Fragmenter};

    use super::*;

    fn decoder() -> MessageDecoder {
        MessageDecoder::new(RipcVersion::V14, 1 << 20)
    }

    #[test]
    fn loads_one_message_per_call() {
        let mut io = ByteBuffer::growable(256);
        encode_message(&mut io, flags::DATA, b"alpha").unwrap();
        encode_message(&mut io, flags::DATA, b"beta").unwrap();
        io.flip();

        let mut dec = decoder();
        assert_eq!(
            dec.load(&mut io, None).unwrap(),
            Some(Decoded::Message(b"alpha".to_vec()))
        );
        assert!(dec.has_buffered(&io));
        assert_eq!(
            dec.load(&mut io, None).unwrap(),
            Some(Decoded::Message(b"beta".to_vec()))
        );
        assert_eq!(dec.load(&mut io, None).unwrap(), None);
    }

    #[test]
    fn partial_message_stays_unconsumed() {
        let mut staging = ByteBuffer::growable(64);
        encode_message(&mut staging, flags::DATA, b"incoming").unwrap();
        staging.flip();
        let wire = staging.readable();

        // only the header plus one payload byte has arrived
        let mut io = ByteBuffer::wrap(&wire[..DATA_HEADER_SIZE + 1]);
        let before = io.position();
        let mut dec = decoder();
        assert_eq!(dec.load(&mut io, None).unwrap(), None);
        assert_eq!(io.position(), before);

        // short of a full header, same story
        let mut io = ByteBuffer::wrap(&wire[..2]);
        assert_eq!(dec.load(&mut io, None).unwrap(), None);
    }

    #[test]
    fn ping_is_reported_distinctly() {
        let mut io = ByteBuffer::new(8);
        encode_ping(&mut io).unwrap();
        io.flip();

        let mut dec = decoder();
        assert_eq!(dec.load(&mut io, None).unwrap(), Some(Decoded::Ping));
    }

    #[test]
    fn packed_sub_messages_come_out_one_per_call() {
        let mut body = ByteBuffer::growable(64);
        encode_packed_entry(&mut body, b"one").unwrap();
        encode_packed_entry(&mut body, b"").unwrap();
        encode_packed_entry(&mut body, b"three").unwrap();
        body.flip();

        let mut io = ByteBuffer::growable(128);
        encode_message(&mut io, flags::DATA | flags::PACKING, body.readable()).unwrap();
        io.flip();

        let mut dec = decoder();
        let mut out = Vec::new();
        while let Some(Decoded::Message(m)) = dec.load(&mut io, None).unwrap() {
            out.push(m);
        }
        assert_eq!(
            out,
            vec![b"one".to_vec(), Vec::new(), b"three".to_vec()]
        );
    }

    #[test]
    fn fragmented_packed_body_unpacks_after_reassembly() {
        let mut body = ByteBuffer::growable(64);
        encode_packed_entry(&mut body, b"first-entry").unwrap();
        encode_packed_entry(&mut body, b"second-entry").unwrap();
        body.flip();

        // packing survives the trip through the fragment headers
        let mut frag = Fragmenter::new(RipcVersion::V14, 16);
        let mut io = ByteBuffer::growable(256);
        frag.fragment(body.readable(), flags::PACKING, &mut io).unwrap();
        io.flip();

        let mut dec = decoder();
        assert_eq!(
            dec.load(&mut io, None).unwrap(),
            Some(Decoded::Message(b"first-entry".to_vec()))
        );
        assert_eq!(
            dec.load(&mut io, None).unwrap(),
            Some(Decoded::Message(b"second-entry".to_vec()))
        );
        assert_eq!(dec.load(&mut io, None).unwrap(), None);
    }

    #[test]
    fn fragmented_message_reassembles() {
        let payload: Vec<u8> = (0..2000u32).map(|i| (i % 253) as u8).collect();
        let mut frag = Fragmenter::new(RipcVersion::V14, 512);
        let mut io = ByteBuffer::growable(4096);
        frag.fragment(&payload, 0, &mut io).unwrap();
        io.flip();

        let mut dec = decoder();
        assert_eq!(
            dec.load(&mut io, None).unwrap(),
            Some(Decoded::Message(payload))
        );
        assert_eq!(dec.load(&mut io, None).unwrap(), None);
    }

    #[test]
    fn fragments_split_across_reads_return_none_between() {
        let payload: Vec<u8> = (0..900u32).map(|i| (i % 199) as u8).collect();
        let mut frag = Fragmenter::new(RipcVersion::V13, 512);
        let mut staging = ByteBuffer::growable(2048);
        frag.fragment(&payload, 0, &mut staging).unwrap();
        staging.flip();
        let wire = staging.readable().to_vec();

        // first fragment arrives alone
        let first_len = {
            let probe = ByteBuffer::wrap(&wire);
            DataHeader::peek(&probe).unwrap().unwrap().message_length as usize
        };
        let mut dec = MessageDecoder::new(RipcVersion::V13, 1 << 20);
        let mut io = ByteBuffer::wrap(&wire[..first_len]);
        assert_eq!(dec.load(&mut io, None).unwrap(), None);

        let mut io = ByteBuffer::wrap(&wire[first_len..]);
        assert_eq!(
            dec.load(&mut io, None).unwrap(),
            Some(Decoded::Message(payload))
        );
    }

    #[test]
    fn compressed_message_inflates_on_load() {
        let payload = b"RIC=GBP0001 BID=1.2651 ASK=1.2653 repeated fields compress well \
                        RIC=GBP0001 BID=1.2652 ASK=1.2654"
            .to_vec();
        let mut tx = new_compressor(CompressionType::Zlib, 6).unwrap();
        let mut rx = new_compressor(CompressionType::Zlib, 6).unwrap();

        let squeezed = tx.compress(&payload).unwrap();
        let mut io = ByteBuffer::growable(256);
        encode_message(&mut io, flags::DATA | flags::COMPRESSION, &squeezed).unwrap();
        io.flip();

        let mut dec = decoder();
        assert_eq!(
            dec.load(&mut io, Some(&mut rx)).unwrap(),
            Some(Decoded::Message(payload))
        );
    }

    #[test]
    fn uncompressed_message_on_compressed_channel_passes_through() {
        // below-threshold writes arrive without the compression flag; the
        // header alone decides whether to inflate
        let mut rx = new_compressor(CompressionType::Zlib, 6).unwrap();
        let mut io = ByteBuffer::growable(64);
        encode_message(&mut io, flags::DATA, b"tiny").unwrap();
        io.flip();

        let mut dec = decoder();
        assert_eq!(
            dec.load(&mut io, Some(&mut rx)).unwrap(),
            Some(Decoded::Message(b"tiny".to_vec()))
        );
    }
}
