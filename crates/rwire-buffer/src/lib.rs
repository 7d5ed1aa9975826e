//! Byte-level primitives for the rwire transport.
//!
//! Two buffer types live here:
//! - [`ByteBuffer`]: a position/limit-bounded byte container with big-endian
//!   accessors for every fixed-width numeric type, NIO-style cursor
//!   discipline (flip/clear/compact/rewind/mark), and a `reserve` operation
//!   that grows the backing store without moving the write cursor.
//! - [`Buffer`]: the codec-level wrapper the container codecs and the
//!   transport both hand around. It can be backed by a shared view into a
//!   `ByteBuffer` or by a `String`, with equality and copy defined over the
//!   logical byte content regardless of backing.
//!
//! Everything else in the workspace builds on top of these two types.

pub mod buffer;
pub mod byte_buffer;
pub mod error;

pub use buffer::Buffer;
pub use byte_buffer::ByteBuffer;
pub use error::{BufferError, Result};
