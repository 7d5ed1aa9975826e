use rwire_buffer::BufferError;

/// Errors that can occur while encoding or decoding RIPC wire data.
#[derive(Debug, thiserror::Error)]
pub enum RipcError {
    /// The buffer ended before a complete field or message.
    #[error("message truncated ({needed} bytes needed, {available} available)")]
    Truncated { needed: usize, available: usize },

    /// The declared message length disagrees with the bytes present.
    #[error("declared length {declared} does not match actual {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    /// A handshake reply carried an opcode that is neither Ack nor Nak.
    #[error("unknown handshake opcode {0:#04x}")]
    InvalidOpCode(u8),

    /// The connection version in a handshake is outside the supported range.
    #[error("unsupported connection version {0:#010x}")]
    UnsupportedVersion(u32),

    /// The peer rejected the connection; carries the peer's reason verbatim.
    #[error("connection refused by peer: {0}")]
    ConnectionRefused(String),

    /// A fragment arrived out of sequence or with an unknown identifier.
    #[error("fragment sequencing error: {0}")]
    Fragment(&'static str),

    #[error("compression failed: {0}")]
    Compress(String),

    #[error("decompression failed: {0}")]
    Decompress(String),

    /// The decompressed payload would exceed the receiver's output limit.
    #[error("decompressed size exceeds limit of {limit} bytes")]
    DecompressedTooLarge { limit: usize },

    #[error(transparent)]
    Buffer(#[from] BufferError),
}

pub type Result<T> = std::result::Result<T, RipcError>;
