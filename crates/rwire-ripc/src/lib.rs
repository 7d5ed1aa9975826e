//! RIPC session-negotiation and framing wire protocol.
//!
//! Everything in this crate is pure byte manipulation: handshake messages
//! serialize into and parse out of [`rwire_buffer::ByteBuffer`]s, data
//! framing works on in-memory regions, and the compression adapters carry
//! per-channel streaming state. Socket I/O and channel state live one layer
//! up, in `rwire-channel`.

pub mod compress;
pub mod consts;
pub mod error;
pub mod fragment;
pub mod handshake;
pub mod message;

pub use compress::{new_compressor, Compressor, Lz4Compressor, ZlibCompressor};
pub use consts::{CompressionType, RipcVersion};
pub use error::{RipcError, Result};
pub use fragment::{FragmentReassembly, Fragmenter};
pub use handshake::{ConnectionAck, ConnectionNak, ConnectionReply, ConnectionRequest};
pub use message::{DataHeader, PackedIter};
