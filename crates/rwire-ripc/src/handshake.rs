//! Handshake wire structures: connection request and the Ack/Nak replies.
//!
//! Each structure computes its own `message_length`, serializes itself into
//! a [`ByteBuffer`], and parses itself back out as a plain value. A buffer
//! that cannot fully populate the fixed header is a deterministic parse
//! failure, never a silently defaulted message, and a declared length that
//! disagrees with the bytes actually consumed is a protocol error.

use rwire_buffer::ByteBuffer;

use crate::consts::{flags, opt_flags, CompressionType, RipcVersion, MAX_COMPONENT_VERSION_LEN};
use crate::error::{RipcError, Result};

/// Reply prefix: length (2) + flags (1) + opcode (1) + header length (1) +
/// unused (1).
const REPLY_PREFIX_SIZE: usize = 6;

/// Request fixed header through the minor-version byte, excluding the
/// compression capability bitmap.
const REQUEST_FIXED_SIZE: usize = 15;

/// Ack fixed header: reply prefix + version (4) + max message size (2) +
/// session flags (1) + ping timeout (1) + major/minor (2) + compression
/// type (2) + compression level (1).
const ACK_FIXED_SIZE: usize = REPLY_PREFIX_SIZE + 13;

/// Client hello: proposed version, capabilities, and identity strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRequest {
    pub version: RipcVersion,
    pub compression: CompressionType,
    pub ping_timeout: u8,
    pub session_flags: u8,
    pub protocol_type: u8,
    pub major_version: u8,
    pub minor_version: u8,
    pub host_name: String,
    pub ip_address: String,
    pub component_version: String,
}

impl ConnectionRequest {
    fn bitmap_len(&self) -> usize {
        match self.compression {
            CompressionType::None => 0,
            _ => 1,
        }
    }

    pub fn message_length(&self) -> usize {
        REQUEST_FIXED_SIZE
            + self.bitmap_len()
            + 1
            + self.host_name.len()
            + 1
            + self.ip_address.len()
            + 2
            + component_version_wire(&self.component_version).len()
    }

    pub fn encode(&self, dst: &mut ByteBuffer) -> Result<()> {
        let start = dst.position();
        let length = self.message_length();

        dst.put_u16(length as u16)?;
        dst.put_u8(0)?; // flags
        dst.put_u32(self.version.connection_version())?;
        dst.put_u8(0)?; // unused
        dst.put_u8((REQUEST_FIXED_SIZE + self.bitmap_len()) as u8)?;
        dst.put_u8(self.bitmap_len() as u8)?;
        if self.bitmap_len() > 0 {
            dst.put_u8(self.compression.bitmap_bit())?;
        }
        dst.put_u8(self.ping_timeout)?;
        dst.put_u8(self.session_flags)?;
        dst.put_u8(self.protocol_type)?;
        dst.put_u8(self.major_version)?;
        dst.put_u8(self.minor_version)?;
        put_string_u8(dst, &self.host_name)?;
        put_string_u8(dst, &self.ip_address)?;
        put_component_version(dst, &self.component_version)?;

        check_written(length, dst.position() - start)
    }

    pub fn decode(src: &mut ByteBuffer) -> Result<Self> {
        let start = src.position();
        let declared = read_declared_length(src)?;

        let _flags = src.get_u8()?;
        let version = RipcVersion::from_connection_version(src.get_u32()?)?;
        let _unused = src.get_u8()?;
        let header_length = src.get_u8()? as usize;
        let bitmap_len = src.get_u8()? as usize;
        if header_length != REQUEST_FIXED_SIZE + bitmap_len {
            return Err(RipcError::LengthMismatch {
                declared: header_length,
                actual: REQUEST_FIXED_SIZE + bitmap_len,
            });
        }
        let mut compression = CompressionType::None;
        for _ in 0..bitmap_len {
            let bits = src.get_u8()?;
            if bits & CompressionType::Zlib.bitmap_bit() != 0 {
                compression = CompressionType::Zlib;
            } else if bits & CompressionType::Lz4.bitmap_bit() != 0 {
                compression = CompressionType::Lz4;
            }
        }
        let ping_timeout = src.get_u8()?;
        let session_flags = src.get_u8()?;
        let protocol_type = src.get_u8()?;
        let major_version = src.get_u8()?;
        let minor_version = src.get_u8()?;
        let host_name = read_string_u8(src)?;
        let ip_address = read_string_u8(src)?;
        let component_version = read_component_version(src)?;

        check_consumed(declared, src.position() - start)?;
        Ok(Self {
            version,
            compression,
            ping_timeout,
            session_flags,
            protocol_type,
            major_version,
            minor_version,
            host_name,
            ip_address,
            component_version,
        })
    }
}

/// Server acceptance: the negotiated session parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionAck {
    pub version: RipcVersion,
    pub max_user_msg_size: u16,
    pub session_flags: u8,
    pub ping_timeout: u8,
    pub major_version: u8,
    pub minor_version: u8,
    pub compression: CompressionType,
    pub compression_level: u8,
    pub component_version: String,
}

impl ConnectionAck {
    pub fn message_length(&self) -> usize {
        ACK_FIXED_SIZE + 2 + component_version_wire(&self.component_version).len()
    }

    pub fn encode(&self, dst: &mut ByteBuffer) -> Result<()> {
        let start = dst.position();
        let length = self.message_length();

        encode_reply_prefix(dst, length, opt_flags::CONNECT_ACK, ACK_FIXED_SIZE)?;
        dst.put_u32(self.version.connection_version())?;
        dst.put_u16(self.max_user_msg_size)?;
        dst.put_u8(self.session_flags)?;
        dst.put_u8(self.ping_timeout)?;
        dst.put_u8(self.major_version)?;
        dst.put_u8(self.minor_version)?;
        dst.put_u16(self.compression.to_wire())?;
        dst.put_u8(self.compression_level)?;
        put_component_version(dst, &self.component_version)?;

        check_written(length, dst.position() - start)
    }

    fn decode_body(src: &mut ByteBuffer, prefix: ReplyPrefix) -> Result<Self> {
        if prefix.header_length != ACK_FIXED_SIZE {
            return Err(RipcError::LengthMismatch {
                declared: prefix.header_length,
                actual: ACK_FIXED_SIZE,
            });
        }
        let version = RipcVersion::from_connection_version(src.get_u32()?)?;
        let max_user_msg_size = src.get_u16()?;
        let session_flags = src.get_u8()?;
        let ping_timeout = src.get_u8()?;
        let major_version = src.get_u8()?;
        let minor_version = src.get_u8()?;
        let compression = CompressionType::from_wire(src.get_u16()?)?;
        let compression_level = src.get_u8()?;
        let component_version = read_component_version(src)?;
        Ok(Self {
            version,
            max_user_msg_size,
            session_flags,
            ping_timeout,
            major_version,
            minor_version,
            compression,
            compression_level,
            component_version,
        })
    }
}

/// Server rejection with a free-text reason the client surfaces verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionNak {
    pub reason: String,
}

impl ConnectionNak {
    pub fn message_length(&self) -> usize {
        REPLY_PREFIX_SIZE + 2 + self.reason.len()
    }

    pub fn encode(&self, dst: &mut ByteBuffer) -> Result<()> {
        let start = dst.position();
        let length = self.message_length();

        encode_reply_prefix(dst, length, opt_flags::CONNECT_NAK, REPLY_PREFIX_SIZE)?;
        dst.put_u16(self.reason.len() as u16)?;
        dst.put_slice(self.reason.as_bytes())?;

        check_written(length, dst.position() - start)
    }

    fn decode_body(src: &mut ByteBuffer, prefix: ReplyPrefix) -> Result<Self> {
        if prefix.header_length != REPLY_PREFIX_SIZE {
            return Err(RipcError::LengthMismatch {
                declared: prefix.header_length,
                actual: REPLY_PREFIX_SIZE,
            });
        }
        let text_len = src.get_u16()? as usize;
        let mut raw = vec![0u8; text_len];
        src.get_slice(&mut raw)?;
        Ok(Self {
            reason: String::from_utf8_lossy(&raw).into_owned(),
        })
    }
}

/// A parsed handshake reply, Ack or Nak, dispatched on the wire opcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionReply {
    Ack(ConnectionAck),
    Nak(ConnectionNak),
}

impl ConnectionReply {
    pub fn decode(src: &mut ByteBuffer) -> Result<Self> {
        let start = src.position();
        let prefix = ReplyPrefix::decode(src)?;

        let reply = match prefix.opcode {
            opt_flags::CONNECT_ACK => ConnectionReply::Ack(ConnectionAck::decode_body(src, prefix)?),
            opt_flags::CONNECT_NAK => ConnectionReply::Nak(ConnectionNak::decode_body(src, prefix)?),
            other => return Err(RipcError::InvalidOpCode(other)),
        };
        check_consumed(prefix.message_length, src.position() - start)?;
        Ok(reply)
    }
}

#[derive(Clone, Copy)]
struct ReplyPrefix {
    message_length: usize,
    opcode: u8,
    header_length: usize,
}

impl ReplyPrefix {
    fn decode(src: &mut ByteBuffer) -> Result<Self> {
        let message_length = read_declared_length(src)?;
        let _flags = src.get_u8()?;
        let opcode = src.get_u8()?;
        let header_length = src.get_u8()? as usize;
        let _unused = src.get_u8()?;
        Ok(Self {
            message_length,
            opcode,
            header_length,
        })
    }
}

fn encode_reply_prefix(
    dst: &mut ByteBuffer,
    message_length: usize,
    opcode: u8,
    header_length: usize,
) -> Result<()> {
    dst.put_u16(message_length as u16)?;
    dst.put_u8(flags::HAS_OPTIONAL_FLAGS)?;
    dst.put_u8(opcode)?;
    dst.put_u8(header_length as u8)?;
    dst.put_u8(0)?;
    Ok(())
}

/// Read the leading length field and verify the whole declared message is
/// already buffered; anything shorter stays unconsumed at the caller.
fn read_declared_length(src: &mut ByteBuffer) -> Result<usize> {
    if src.remaining() < 2 {
        return Err(RipcError::Truncated {
            needed: 2,
            available: src.remaining(),
        });
    }
    let declared = src.get_u16()? as usize;
    if declared < 2 || declared - 2 > src.remaining() {
        return Err(RipcError::Truncated {
            needed: declared,
            available: src.remaining() + 2,
        });
    }
    Ok(declared)
}

fn check_written(declared: usize, actual: usize) -> Result<()> {
    if declared != actual {
        return Err(RipcError::LengthMismatch { declared, actual });
    }
    Ok(())
}

fn check_consumed(declared: usize, actual: usize) -> Result<()> {
    if declared != actual {
        return Err(RipcError::LengthMismatch { declared, actual });
    }
    Ok(())
}

fn put_string_u8(dst: &mut ByteBuffer, s: &str) -> Result<()> {
    dst.put_u8(s.len() as u8)?;
    dst.put_slice(s.as_bytes())?;
    Ok(())
}

fn read_string_u8(src: &mut ByteBuffer) -> Result<String> {
    let len = src.get_u8()? as usize;
    let mut raw = vec![0u8; len];
    src.get_slice(&mut raw)?;
    Ok(String::from_utf8_lossy(&raw).into_owned())
}

/// The component version as it goes on the wire, truncated to the protocol
/// maximum at a character boundary.
fn component_version_wire(s: &str) -> &str {
    if s.len() <= MAX_COMPONENT_VERSION_LEN {
        return s;
    }
    let mut end = MAX_COMPONENT_VERSION_LEN;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Container length byte, then inner string length byte, then the string.
fn put_component_version(dst: &mut ByteBuffer, s: &str) -> Result<()> {
    let wire = component_version_wire(s);
    dst.put_u8((wire.len() + 1) as u8)?;
    dst.put_u8(wire.len() as u8)?;
    dst.put_slice(wire.as_bytes())?;
    Ok(())
}

fn read_component_version(src: &mut ByteBuffer) -> Result<String> {
    let container_len = src.get_u8()? as usize;
    let inner = read_string_u8(src)?;
    if container_len != inner.len() + 1 {
        return Err(RipcError::LengthMismatch {
            declared: container_len,
            actual: inner.len() + 1,
        });
    }
    Ok(inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> ConnectionRequest {
        ConnectionRequest {
            version: RipcVersion::V14,
            compression: CompressionType::Zlib,
            ping_timeout: 60,
            session_flags: 0,
            protocol_type: 1,
            major_version: 14,
            minor_version: 1,
            host_name: "feedhost".to_string(),
            ip_address: "10.0.0.7".to_string(),
            component_version: "rwire 0.1.0".to_string(),
        }
    }

    fn encode_to_readable(msg_len: usize, encode: impl FnOnce(&mut ByteBuffer)) -> ByteBuffer {
        let mut buf = ByteBuffer::new(msg_len + 16);
        encode(&mut buf);
        buf.flip();
        buf
    }

    #[test]
    fn request_roundtrip() {
        let req = sample_request();
        let mut buf = encode_to_readable(req.message_length(), |b| req.encode(b).unwrap());
        assert_eq!(buf.remaining(), req.message_length());

        let parsed = ConnectionRequest::decode(&mut buf).unwrap();
        assert_eq!(parsed, req);
        assert_eq!(buf.remaining(), 0);
    }

    #[test]
    fn request_with_empty_strings_roundtrips() {
        let req = ConnectionRequest {
            compression: CompressionType::None,
            host_name: String::new(),
            ip_address: String::new(),
            component_version: String::new(),
            ..sample_request()
        };
        let mut buf = encode_to_readable(req.message_length(), |b| req.encode(b).unwrap());
        let parsed = ConnectionRequest::decode(&mut buf).unwrap();
        assert_eq!(parsed, req);
    }

    #[test]
    fn oversized_component_version_is_truncated_on_wire() {
        let req = ConnectionRequest {
            component_version: "v".repeat(300),
            ..sample_request()
        };
        let mut buf = encode_to_readable(req.message_length(), |b| req.encode(b).unwrap());
        let parsed = ConnectionRequest::decode(&mut buf).unwrap();
        assert_eq!(parsed.component_version.len(), MAX_COMPONENT_VERSION_LEN);
        assert_eq!(parsed.component_version, "v".repeat(MAX_COMPONENT_VERSION_LEN));
    }

    #[test]
    fn truncated_request_fails_deterministically() {
        let req = sample_request();
        let full = encode_to_readable(req.message_length(), |b| req.encode(b).unwrap());

        for keep in [0, 1, 5, req.message_length() - 1] {
            let mut short = ByteBuffer::wrap(&full.readable()[..keep]);
            let err = ConnectionRequest::decode(&mut short).unwrap_err();
            assert!(
                matches!(err, RipcError::Truncated { .. }),
                "keep={keep}: {err:?}"
            );
        }
    }

    #[test]
    fn corrupt_declared_length_is_rejected() {
        let req = sample_request();
        let full = encode_to_readable(req.message_length(), |b| req.encode(b).unwrap());

        let mut corrupted = full.readable().to_vec();
        // declare one byte more than the message actually holds
        let bogus = (req.message_length() + 1) as u16;
        corrupted[..2].copy_from_slice(&bogus.to_be_bytes());
        corrupted.push(0); // keep enough bytes buffered that the parse runs
        let mut buf = ByteBuffer::wrap(&corrupted);
        let err = ConnectionRequest::decode(&mut buf).unwrap_err();
        assert!(matches!(err, RipcError::LengthMismatch { .. }), "{err:?}");
    }

    #[test]
    fn ack_roundtrip() {
        let ack = ConnectionAck {
            version: RipcVersion::V13,
            max_user_msg_size: 6144,
            session_flags: 0,
            ping_timeout: 60,
            major_version: 14,
            minor_version: 0,
            compression: CompressionType::Lz4,
            compression_level: 0,
            component_version: "server 2.4".to_string(),
        };
        let mut buf = encode_to_readable(ack.message_length(), |b| ack.encode(b).unwrap());

        match ConnectionReply::decode(&mut buf).unwrap() {
            ConnectionReply::Ack(parsed) => assert_eq!(parsed, ack),
            other => panic!("expected Ack, got {other:?}"),
        }
    }

    #[test]
    fn nak_reason_survives_verbatim() {
        let nak = ConnectionNak {
            reason: "login denied: max sessions reached".to_string(),
        };
        let mut buf = encode_to_readable(nak.message_length(), |b| nak.encode(b).unwrap());

        match ConnectionReply::decode(&mut buf).unwrap() {
            ConnectionReply::Nak(parsed) => assert_eq!(parsed.reason, nak.reason),
            other => panic!("expected Nak, got {other:?}"),
        }
    }

    #[test]
    fn unknown_reply_opcode_is_rejected() {
        let ack = ConnectionAck {
            version: RipcVersion::V11,
            max_user_msg_size: 1024,
            session_flags: 0,
            ping_timeout: 60,
            major_version: 14,
            minor_version: 0,
            compression: CompressionType::None,
            compression_level: 0,
            component_version: String::new(),
        };
        let full = encode_to_readable(ack.message_length(), |b| ack.encode(b).unwrap());
        let mut corrupted = full.readable().to_vec();
        corrupted[3] = 0x40; // opcode byte
        let mut buf = ByteBuffer::wrap(&corrupted);
        assert!(matches!(
            ConnectionReply::decode(&mut buf),
            Err(RipcError::InvalidOpCode(0x40))
        ));
    }
}
