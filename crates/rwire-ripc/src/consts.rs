//! Protocol constants: header sizes, flag bits, version numbers, and the
//! negotiated defaults the transport starts from.

use crate::error::{RipcError, Result};

/// RIPC data message header: length (2, big-endian) + flags (1).
pub const DATA_HEADER_SIZE: usize = 3;

/// Packed sub-message prefix: length (2, big-endian), no flags byte.
pub const PACKED_PREFIX_SIZE: usize = 2;

/// First-fragment extra header: total reassembled length, big-endian.
pub const FRAGMENT_TOTAL_LEN_SIZE: usize = 4;

/// Default and maximum negotiated fragment size.
pub const DEFAULT_MAX_FRAGMENT_SIZE: usize = 6144;

/// Pending-byte threshold that triggers an implicit flush during write.
pub const DEFAULT_HIGH_WATER_MARK: usize = 6144;

/// Default flush-order strategy: high serviced twice per cycle.
pub const DEFAULT_FLUSH_ORDER: &str = "HMHLHM";

/// Longest accepted flush-order strategy string.
pub const MAX_FLUSH_ORDER_LEN: usize = 32;

/// Default keep-alive interval, in seconds.
pub const DEFAULT_PING_TIMEOUT_SECS: u8 = 60;

/// Component version strings are truncated to this many bytes on the wire.
pub const MAX_COMPONENT_VERSION_LEN: usize = 253;

/// Protocol type carried in the connection request for RWF payloads.
pub const PROTOCOL_TYPE_RWF: u8 = 0;

/// Major version of the RWF payload format spoken over the session.
pub const RWF_MAJOR_VERSION: u8 = 14;

/// Minor version of the RWF payload format spoken over the session.
pub const RWF_MINOR_VERSION: u8 = 1;

/// Client-key exchange message for versions 13+: length (2) + flags (1) +
/// key (4).
pub const KEY_EXCHANGE_SIZE: usize = 7;

/// Minimum payload size, in bytes, at which ZLIB compression engages.
pub const ZLIB_COMPRESSION_THRESHOLD: usize = 30;

/// Minimum payload size, in bytes, at which LZ4 compression engages.
pub const LZ4_COMPRESSION_THRESHOLD: usize = 300;

/// Default ZLIB compression level (0 = store, 1 = fastest, 9 = best).
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Bits in the data message `Flags` byte.
pub mod flags {
    /// An optional-flags byte follows the header.
    pub const HAS_OPTIONAL_FLAGS: u8 = 0x01;
    /// The message carries application data (also set on pings, which have
    /// no payload).
    pub const DATA: u8 = 0x02;
    /// The payload is compressed with the negotiated algorithm.
    pub const COMPRESSION: u8 = 0x04;
    /// The payload is one compressed piece of a larger compressed message.
    pub const COMP_FRAGMENT: u8 = 0x08;
    /// The payload is a sequence of length-prefixed sub-messages.
    pub const PACKING: u8 = 0x10;
}

/// Bits in the optional-flags byte (present when
/// [`flags::HAS_OPTIONAL_FLAGS`] is set).
pub mod opt_flags {
    /// Handshake reply: connection accepted.
    pub const CONNECT_ACK: u8 = 0x01;
    /// Handshake reply: connection refused.
    pub const CONNECT_NAK: u8 = 0x02;
    /// Continuation fragment of an in-flight fragmented message.
    pub const FRAGMENT: u8 = 0x04;
    /// First fragment; the total reassembled length follows the header.
    pub const FRAGMENT_HEADER: u8 = 0x08;
}

/// RIPC protocol versions this implementation speaks.
///
/// Version 13 widened the fragment identifier to two bytes and added an
/// extra key-exchange step to the handshake; version 14 kept both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RipcVersion {
    V11,
    V12,
    V13,
    V14,
}

impl RipcVersion {
    pub const MIN: RipcVersion = RipcVersion::V11;
    pub const MAX: RipcVersion = RipcVersion::V14;

    /// The 4-byte connection version carried in the handshake
    /// (big-endian, top three bytes zero).
    pub fn connection_version(self) -> u32 {
        match self {
            RipcVersion::V11 => 0x15,
            RipcVersion::V12 => 0x16,
            RipcVersion::V13 => 0x17,
            RipcVersion::V14 => 0x18,
        }
    }

    pub fn from_connection_version(raw: u32) -> Result<Self> {
        match raw {
            0x15 => Ok(RipcVersion::V11),
            0x16 => Ok(RipcVersion::V12),
            0x17 => Ok(RipcVersion::V13),
            0x18 => Ok(RipcVersion::V14),
            other => Err(RipcError::UnsupportedVersion(other)),
        }
    }

    /// Width of the on-wire fragment identifier for this version.
    pub fn fragment_id_size(self) -> usize {
        if self >= RipcVersion::V13 {
            2
        } else {
            1
        }
    }

    /// Versions 13 and later perform one extra handshake exchange
    /// (client key) after the Ack.
    pub fn requires_key_exchange(self) -> bool {
        self >= RipcVersion::V13
    }

    /// The effective version is the minimum of what both sides speak.
    pub fn negotiate(client: RipcVersion, server: RipcVersion) -> RipcVersion {
        client.min(server)
    }
}

/// Payload compression algorithm, as carried in the handshake.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CompressionType {
    #[default]
    None,
    Zlib,
    Lz4,
}

impl CompressionType {
    pub fn to_wire(self) -> u16 {
        match self {
            CompressionType::None => 0,
            CompressionType::Zlib => 1,
            CompressionType::Lz4 => 2,
        }
    }

    pub fn from_wire(raw: u16) -> Result<Self> {
        match raw {
            0 => Ok(CompressionType::None),
            1 => Ok(CompressionType::Zlib),
            2 => Ok(CompressionType::Lz4),
            other => Err(RipcError::UnsupportedVersion(other as u32)),
        }
    }

    /// Position of this algorithm in the connection-request capability
    /// bitmap. `None` occupies no bit: an empty bitmap means uncompressed.
    pub fn bitmap_bit(self) -> u8 {
        match self {
            CompressionType::None => 0,
            CompressionType::Zlib => 1 << 1,
            CompressionType::Lz4 => 1 << 2,
        }
    }

    /// The negotiated minimum payload size below which messages are sent
    /// uncompressed even on a compression-enabled channel.
    pub fn threshold(self) -> usize {
        match self {
            CompressionType::None => usize::MAX,
            CompressionType::Zlib => ZLIB_COMPRESSION_THRESHOLD,
            CompressionType::Lz4 => LZ4_COMPRESSION_THRESHOLD,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_negotiation_takes_minimum() {
        assert_eq!(
            RipcVersion::negotiate(RipcVersion::V14, RipcVersion::V13),
            RipcVersion::V13
        );
        assert_eq!(
            RipcVersion::negotiate(RipcVersion::V11, RipcVersion::V11),
            RipcVersion::V11
        );
    }

    #[test]
    fn connection_version_roundtrip() {
        for v in [
            RipcVersion::V11,
            RipcVersion::V12,
            RipcVersion::V13,
            RipcVersion::V14,
        ] {
            assert_eq!(
                RipcVersion::from_connection_version(v.connection_version()).unwrap(),
                v
            );
        }
        assert!(matches!(
            RipcVersion::from_connection_version(0x19),
            Err(RipcError::UnsupportedVersion(0x19))
        ));
    }

    #[test]
    fn fragment_id_width_by_version() {
        assert_eq!(RipcVersion::V12.fragment_id_size(), 1);
        assert_eq!(RipcVersion::V13.fragment_id_size(), 2);
        assert_eq!(RipcVersion::V14.fragment_id_size(), 2);
    }

    #[test]
    fn key_exchange_only_from_v13() {
        assert!(!RipcVersion::V12.requires_key_exchange());
        assert!(RipcVersion::V13.requires_key_exchange());
    }
}
