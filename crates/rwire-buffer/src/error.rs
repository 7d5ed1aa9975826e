/// Errors that can occur in buffer-level operations.
///
/// Buffer operations report failures as values rather than panicking so that
/// callers can distinguish terminal conditions (`InvalidArgument`) from ones
/// that a retry with a larger destination resolves (`TooSmall`).
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BufferError {
    /// A destination or parameter is missing or unusable for this operation.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The destination cannot hold the content being copied.
    #[error("buffer too small ({needed} bytes needed, {available} available)")]
    TooSmall { needed: usize, available: usize },

    /// A read or write would cross the buffer's limit or capacity.
    #[error("out of bounds (index {index}, limit {limit})")]
    OutOfBounds { index: usize, limit: usize },

    /// A decoded primitive was explicitly encoded as blank/absent.
    ///
    /// Produced by the container decode layer built on top of this crate.
    #[error("decoded data is blank")]
    BlankData,

    /// Iteration reached the end of a container. A sentinel, not a fault.
    #[error("end of container")]
    EndOfContainer,
}

pub type Result<T> = std::result::Result<T, BufferError>;
