//! Stateful RIPC channels over any `Read + Write` stream.
//!
//! A [`Channel`] drives the connection handshake ([`Channel::init`]),
//! queues writes per priority with a configurable flush-order strategy,
//! frames/fragments/compresses on the way out, and reassembles/inflates/
//! unpacks on the way in. Process-wide lifetime sits behind the
//! reference-counted [`Transport`] handle.

pub mod channel;
pub mod config;
pub mod decoder;
pub mod error;
pub mod transport;

pub use channel::{
    Channel, ChannelState, FlushOutcome, InitStatus, PackWriter, ReadEvent, SharedChannel,
    WriteArgs,
};
pub use config::{ChannelConfig, FlushOrder, Priority};
pub use decoder::{Decoded, MessageDecoder};
pub use error::{ChannelError, Result};
pub use transport::{InitOptions, Transport, TransportHandle};
