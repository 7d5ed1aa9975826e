use rwire_buffer::BufferError;
use rwire_ripc::RipcError;

/// Errors surfaced by channel and transport operations.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The process-wide transport has not been initialized.
    #[error("transport not initialized")]
    NotInitialized,

    /// The operation requires an ACTIVE channel.
    #[error("channel is not active")]
    NotActive,

    /// The handshake has not completed yet; retry after more I/O.
    #[error("channel initialization still in progress")]
    InitInProgress,

    /// The peer rejected the connection. Terminal; carries the peer's
    /// reason verbatim.
    #[error("connection refused: {0}")]
    Refused(String),

    /// The channel is closed; all operations fail fast.
    #[error("channel closed")]
    Closed,

    /// All guaranteed output buffers are queued; flush before writing more.
    #[error("no output buffers available ({0} in use)")]
    NoBuffers(usize),

    /// A configuration value is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Ripc(#[from] RipcError),

    #[error(transparent)]
    Buffer(#[from] BufferError),

    /// A fatal socket error; the channel transitions to CLOSED.
    #[error("socket failure: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ChannelError>;
