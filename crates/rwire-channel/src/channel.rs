//! The stateful channel: handshake driving, the priority write/flush
//! pipeline, and the read pipeline.

use std::collections::VecDeque;
use std::hash::{BuildHasher, Hasher};
use std::io::{ErrorKind, Read, Write};

use bytes::{Buf, Bytes, BytesMut};
use rwire_buffer::{BufferError, ByteBuffer};
use rwire_ripc::consts::{
    flags, DATA_HEADER_SIZE, KEY_EXCHANGE_SIZE, PACKED_PREFIX_SIZE, PROTOCOL_TYPE_RWF,
    RWF_MAJOR_VERSION, RWF_MINOR_VERSION,
};
use rwire_ripc::handshake::{ConnectionAck, ConnectionNak, ConnectionReply, ConnectionRequest};
use rwire_ripc::message::{encode_message, encode_packed_entry, encode_ping};
use rwire_ripc::{new_compressor, CompressionType, Compressor, Fragmenter, RipcError, RipcVersion};
use tracing::{debug, trace};

use crate::config::{ChannelConfig, Priority};
use crate::decoder::{Decoded, MessageDecoder};
use crate::error::{ChannelError, Result};
use crate::transport::TransportHandle;

const READ_CHUNK_SIZE: usize = 8 * 1024;
const RECV_CAPACITY: usize = 16 * 1024;

/// Channel lifecycle. `Closed` is terminal: every subsequent operation
/// fails fast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Inactive,
    Initializing,
    Active,
    Closed,
}

/// Per-write options.
#[derive(Debug, Clone, Copy)]
pub struct WriteArgs {
    pub priority: Priority,
    /// Frame and write immediately, bypassing the priority queues.
    pub direct_socket_write: bool,
}

impl Default for WriteArgs {
    fn default() -> Self {
        Self {
            priority: Priority::Medium,
            direct_socket_write: false,
        }
    }
}

/// Outcome of a flush pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// All queues and the staging buffer are empty.
    Complete,
    /// The socket stopped accepting bytes; this many remain to flush.
    MorePending(usize),
}

/// Outcome of one `init` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStatus {
    /// More handshake I/O is needed; call again when the socket is ready.
    InProgress,
    Active,
}

/// One decoded read-side event.
#[derive(Debug, PartialEq, Eq)]
pub enum ReadEvent {
    Message {
        payload: Vec<u8>,
        /// More complete messages are already buffered; read again before
        /// polling the socket.
        more: bool,
    },
    /// Keep-alive from the peer.
    Ping,
    /// No data available right now (non-blocking mode).
    WouldBlock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Client,
    Server,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InitPhase {
    SendRequest,
    AwaitReply,
    SendClientKey,
    AwaitRequest,
    SendReply,
    AwaitClientKey,
    Done,
}

/// Session parameters agreed during the handshake.
#[derive(Debug, Clone, Copy)]
struct Negotiated {
    version: RipcVersion,
    max_fragment_size: usize,
    compression: CompressionType,
    compression_level: u32,
}

struct QueuedWrite {
    payload: Bytes,
    packed: bool,
}

impl QueuedWrite {
    fn wire_estimate(&self) -> usize {
        DATA_HEADER_SIZE + self.payload.len()
    }
}

/// A RIPC channel over any `Read + Write` stream.
///
/// All operations take `&mut self`; a channel shared across threads goes
/// through [`SharedChannel`], which serializes the write half the way the
/// per-channel write-locking option describes.
pub struct Channel<S> {
    stream: S,
    role: Role,
    state: ChannelState,
    config: ChannelConfig,
    phase: InitPhase,
    /// Refusal reason staged by the server until the Nak is on the wire.
    pending_refusal: Option<String>,
    negotiated: Option<Negotiated>,
    recv: ByteBuffer,
    decoder: Option<MessageDecoder>,
    tx_codec: Option<Box<dyn Compressor>>,
    rx_codec: Option<Box<dyn Compressor>>,
    fragmenter: Option<Fragmenter>,
    queues: [VecDeque<QueuedWrite>; 3],
    queued_count: usize,
    /// Estimated wire bytes of everything still queued (not yet framed).
    pending_bytes: usize,
    flush_slot: usize,
    /// Framed wire bytes accepted for transmission but not yet written.
    partial: BytesMut,
}

impl<S: Read + Write> Channel<S> {
    /// Create the connecting side. The handshake runs in [`Channel::init`].
    pub fn client(handle: &TransportHandle, stream: S, config: ChannelConfig) -> Result<Self> {
        config.validate()?;
        if config.blocking && handle.global_locking() {
            return Err(ChannelError::Config(
                "blocking clients require global locking disabled".to_string(),
            ));
        }
        Ok(handle.with_create_lock(|| Self::new(stream, config, Role::Client)))
    }

    /// Create the accepting side for one just-accepted stream.
    pub fn server(handle: &TransportHandle, stream: S, config: ChannelConfig) -> Result<Self> {
        config.validate()?;
        Ok(handle.with_create_lock(|| Self::new(stream, config, Role::Server)))
    }

    fn new(stream: S, config: ChannelConfig, role: Role) -> Self {
        let mut recv = ByteBuffer::growable(RECV_CAPACITY);
        recv.flip(); // start empty in read mode
        Self {
            stream,
            role,
            state: ChannelState::Inactive,
            phase: match role {
                Role::Client => InitPhase::SendRequest,
                Role::Server => InitPhase::AwaitRequest,
            },
            config,
            pending_refusal: None,
            negotiated: None,
            recv,
            decoder: None,
            tx_codec: None,
            rx_codec: None,
            fragmenter: None,
            queues: [VecDeque::new(), VecDeque::new(), VecDeque::new()],
            queued_count: 0,
            pending_bytes: 0,
            flush_slot: 0,
            partial: BytesMut::new(),
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Consume the channel and return the inner stream.
    pub fn into_inner(self) -> S {
        self.stream
    }

    /// The protocol version agreed during the handshake.
    pub fn negotiated_version(&self) -> Option<RipcVersion> {
        self.negotiated.map(|n| n.version)
    }

    pub fn negotiated_compression(&self) -> Option<CompressionType> {
        self.negotiated.map(|n| n.compression)
    }

    /// Wire bytes queued or staged but not yet on the socket.
    pub fn pending(&self) -> usize {
        self.pending_bytes + self.partial.len()
    }

    /// Drive the handshake one step further. Blocking streams complete in
    /// one call; non-blocking streams return `InProgress` on `WouldBlock`
    /// and must be called again.
    pub fn init(&mut self) -> Result<InitStatus> {
        match self.state {
            ChannelState::Active => return Ok(InitStatus::Active),
            ChannelState::Closed => return Err(ChannelError::Closed),
            _ => self.state = ChannelState::Initializing,
        }

        loop {
            match self.phase {
                InitPhase::SendRequest => {
                    let request = self.connection_request();
                    trace!(version = ?request.version, "sending connection request");
                    self.stage_handshake(request.message_length(), |b| request.encode(b))?;
                    self.phase = InitPhase::AwaitReply;
                }
                InitPhase::AwaitReply => {
                    if !self.drain_partial()? {
                        return Ok(InitStatus::InProgress);
                    }
                    match self.try_decode_reply()? {
                        None => {
                            if !self.fill_recv()? {
                                return Ok(InitStatus::InProgress);
                            }
                        }
                        Some(ConnectionReply::Nak(nak)) => {
                            debug!(reason = %nak.reason, "connection refused");
                            self.state = ChannelState::Closed;
                            return Err(ChannelError::Refused(nak.reason));
                        }
                        Some(ConnectionReply::Ack(ack)) => {
                            if ack.version < self.config.version_floor {
                                self.state = ChannelState::Closed;
                                return Err(ChannelError::Refused(format!(
                                    "server granted {:?}, below local minimum {:?}",
                                    ack.version, self.config.version_floor
                                )));
                            }
                            self.adopt_ack(&ack);
                            self.phase = if ack.version.requires_key_exchange() {
                                let key = client_key();
                                self.stage_handshake(KEY_EXCHANGE_SIZE, |b| {
                                    b.put_u16(KEY_EXCHANGE_SIZE as u16)?;
                                    b.put_u8(0)?;
                                    b.put_u32(key)?;
                                    Ok(())
                                })?;
                                InitPhase::SendClientKey
                            } else {
                                InitPhase::Done
                            };
                        }
                    }
                }
                InitPhase::SendClientKey => {
                    if !self.drain_partial()? {
                        return Ok(InitStatus::InProgress);
                    }
                    self.phase = InitPhase::Done;
                }
                InitPhase::AwaitRequest => match self.try_decode_request()? {
                    None => {
                        if !self.fill_recv()? {
                            return Ok(InitStatus::InProgress);
                        }
                    }
                    Some(request) => self.answer_request(&request)?,
                },
                InitPhase::SendReply => {
                    if !self.drain_partial()? {
                        return Ok(InitStatus::InProgress);
                    }
                    if let Some(reason) = self.pending_refusal.take() {
                        self.state = ChannelState::Closed;
                        return Err(ChannelError::Refused(reason));
                    }
                    let key_exchange = self
                        .negotiated
                        .map(|n| n.version.requires_key_exchange())
                        .unwrap_or(false);
                    self.phase = if key_exchange {
                        InitPhase::AwaitClientKey
                    } else {
                        InitPhase::Done
                    };
                }
                InitPhase::AwaitClientKey => {
                    if self.recv.remaining() < KEY_EXCHANGE_SIZE {
                        if !self.fill_recv()? {
                            return Ok(InitStatus::InProgress);
                        }
                        continue;
                    }
                    let declared = self.recv.get_u16()? as usize;
                    if declared != KEY_EXCHANGE_SIZE {
                        self.state = ChannelState::Closed;
                        return Err(RipcError::LengthMismatch {
                            declared,
                            actual: KEY_EXCHANGE_SIZE,
                        }
                        .into());
                    }
                    let _flags = self.recv.get_u8()?;
                    let _key = self.recv.get_u32()?;
                    self.phase = InitPhase::Done;
                }
                InitPhase::Done => {
                    self.activate()?;
                    return Ok(InitStatus::Active);
                }
            }
        }
    }

    /// Queue one application message for transmission, returning the bytes
    /// still pending after the call. Crossing the high-water mark triggers
    /// an implicit flush.
    pub fn write(&mut self, payload: &[u8], args: &WriteArgs) -> Result<usize> {
        self.ensure_active()?;

        if args.direct_socket_write {
            let staged = self.frame_payload(payload, false)?;
            self.partial.extend_from_slice(staged.readable());
            self.flush()?;
            return Ok(self.pending());
        }

        if self.queued_count >= self.config.guaranteed_output_buffers {
            return Err(ChannelError::NoBuffers(self.queued_count));
        }
        let entry = QueuedWrite {
            payload: Bytes::copy_from_slice(payload),
            packed: false,
        };
        self.pending_bytes += entry.wire_estimate();
        self.queues[queue_index(args.priority)].push_back(entry);
        self.queued_count += 1;

        if self.pending() >= self.config.high_water_mark {
            trace!(pending = self.pending(), "high-water mark crossed, flushing");
            self.flush()?;
        }
        Ok(self.pending())
    }

    /// Open a packing area sized to one wire message.
    pub fn pack_writer(&self) -> Result<PackWriter> {
        let negotiated = self.require_negotiated()?;
        Ok(PackWriter {
            buf: ByteBuffer::new(negotiated.max_fragment_size - DATA_HEADER_SIZE),
        })
    }

    /// Queue a fully packed buffer as one wire message.
    pub fn write_packed(&mut self, pack: PackWriter, args: &WriteArgs) -> Result<usize> {
        self.ensure_active()?;
        if self.queued_count >= self.config.guaranteed_output_buffers {
            return Err(ChannelError::NoBuffers(self.queued_count));
        }
        let mut buf = pack.buf;
        buf.flip();
        let entry = QueuedWrite {
            payload: Bytes::copy_from_slice(buf.readable()),
            packed: true,
        };
        self.pending_bytes += entry.wire_estimate();
        self.queues[queue_index(args.priority)].push_back(entry);
        self.queued_count += 1;

        if self.pending() >= self.config.high_water_mark {
            self.flush()?;
        }
        Ok(self.pending())
    }

    /// Drain the priority queues in flush-order sequence. A socket that
    /// stops accepting bytes leaves the remainder staged and reports
    /// `MorePending`; call again when the socket is writable.
    pub fn flush(&mut self) -> Result<FlushOutcome> {
        self.ensure_active()?;
        loop {
            if !self.drain_partial()? {
                return Ok(FlushOutcome::MorePending(self.pending()));
            }
            let Some(entry) = self.next_queued() else {
                break;
            };
            self.pending_bytes -= entry.wire_estimate();
            self.queued_count -= 1;
            let staged = self.frame_payload(&entry.payload, entry.packed)?;
            self.partial.extend_from_slice(staged.readable());
        }
        if !self.drain_partial()? {
            return Ok(FlushOutcome::MorePending(self.pending()));
        }
        Ok(FlushOutcome::Complete)
    }

    /// Read the next logical message from the peer.
    pub fn read(&mut self) -> Result<ReadEvent> {
        self.ensure_active()?;
        loop {
            let Some(decoder) = self.decoder.as_mut() else {
                return Err(ChannelError::NotActive);
            };
            match decoder.load(&mut self.recv, self.rx_codec.as_mut())? {
                Some(Decoded::Message(payload)) => {
                    let more = decoder.has_buffered(&self.recv);
                    return Ok(ReadEvent::Message { payload, more });
                }
                Some(Decoded::Ping) => return Ok(ReadEvent::Ping),
                None => {
                    if !self.fill_recv()? {
                        return Ok(ReadEvent::WouldBlock);
                    }
                }
            }
        }
    }

    /// Send a keep-alive immediately.
    pub fn ping(&mut self) -> Result<()> {
        self.ensure_active()?;
        let mut staging = ByteBuffer::new(DATA_HEADER_SIZE);
        encode_ping(&mut staging)?;
        staging.flip();
        self.partial.extend_from_slice(staging.readable());
        self.drain_partial()?;
        Ok(())
    }

    /// Transition to CLOSED. Pending operations fail fast afterwards.
    pub fn close(&mut self) {
        if self.state != ChannelState::Closed {
            debug!("channel closed");
            self.state = ChannelState::Closed;
        }
    }

    fn ensure_active(&self) -> Result<()> {
        match self.state {
            ChannelState::Active => Ok(()),
            ChannelState::Closed => Err(ChannelError::Closed),
            ChannelState::Initializing => Err(ChannelError::InitInProgress),
            ChannelState::Inactive => Err(ChannelError::NotActive),
        }
    }

    fn require_negotiated(&self) -> Result<Negotiated> {
        self.negotiated.ok_or(ChannelError::NotActive)
    }

    fn connection_request(&self) -> ConnectionRequest {
        ConnectionRequest {
            version: self.config.version_ceiling,
            compression: self.config.compression,
            ping_timeout: self.config.ping_timeout_secs,
            session_flags: 0,
            protocol_type: PROTOCOL_TYPE_RWF,
            major_version: RWF_MAJOR_VERSION,
            minor_version: RWF_MINOR_VERSION,
            host_name: self.config.host_name.clone(),
            ip_address: self.config.ip_address.clone(),
            component_version: self.config.component_version.clone(),
        }
    }

    fn adopt_ack(&mut self, ack: &ConnectionAck) {
        debug!(version = ?ack.version, compression = ?ack.compression, "connection accepted");
        self.negotiated = Some(Negotiated {
            version: ack.version,
            max_fragment_size: ack.max_user_msg_size as usize,
            compression: ack.compression,
            compression_level: ack.compression_level as u32,
        });
    }

    /// Server-side accept/refuse decision for a parsed request.
    fn answer_request(&mut self, request: &ConnectionRequest) -> Result<()> {
        let version = RipcVersion::negotiate(request.version, self.config.version_ceiling);
        if version < self.config.version_floor {
            let nak = ConnectionNak {
                reason: format!(
                    "protocol version {:?} below server minimum {:?}",
                    request.version, self.config.version_floor
                ),
            };
            debug!(reason = %nak.reason, "refusing connection");
            self.pending_refusal = Some(nak.reason.clone());
            self.stage_handshake(nak.message_length(), |b| nak.encode(b))?;
            self.phase = InitPhase::SendReply;
            return Ok(());
        }

        let compression = if request.compression == self.config.compression {
            self.config.compression
        } else {
            CompressionType::None
        };
        let ack = ConnectionAck {
            version,
            max_user_msg_size: self.config.max_fragment_size as u16,
            session_flags: request.session_flags,
            ping_timeout: request.ping_timeout.min(self.config.ping_timeout_secs),
            major_version: RWF_MAJOR_VERSION,
            minor_version: RWF_MINOR_VERSION,
            compression,
            compression_level: self.config.compression_level as u8,
            component_version: self.config.component_version.clone(),
        };
        debug!(?version, ?compression, "accepting connection");
        self.negotiated = Some(Negotiated {
            version,
            max_fragment_size: self.config.max_fragment_size,
            compression,
            compression_level: self.config.compression_level,
        });
        self.stage_handshake(ack.message_length(), |b| ack.encode(b))?;
        self.phase = InitPhase::SendReply;
        Ok(())
    }

    fn activate(&mut self) -> Result<()> {
        let negotiated = self.require_negotiated()?;
        self.decoder = Some(MessageDecoder::new(
            negotiated.version,
            self.config.max_decompressed_size,
        ));
        self.tx_codec = new_compressor(negotiated.compression, negotiated.compression_level);
        self.rx_codec = new_compressor(negotiated.compression, negotiated.compression_level);
        self.fragmenter = Some(Fragmenter::new(
            negotiated.version,
            negotiated.max_fragment_size,
        ));
        self.state = ChannelState::Active;
        debug!(version = ?negotiated.version, role = ?self.role, "channel active");
        Ok(())
    }

    /// Encode a handshake message into the staging buffer.
    fn stage_handshake(
        &mut self,
        size_hint: usize,
        encode: impl FnOnce(&mut ByteBuffer) -> rwire_ripc::Result<()>,
    ) -> Result<()> {
        let mut staging = ByteBuffer::growable(size_hint + 8);
        encode(&mut staging)?;
        staging.flip();
        self.partial.extend_from_slice(staging.readable());
        Ok(())
    }

    /// Decode one handshake reply if fully buffered.
    fn try_decode_reply(&mut self) -> Result<Option<ConnectionReply>> {
        if !handshake_buffered(&self.recv) {
            return Ok(None);
        }
        match ConnectionReply::decode(&mut self.recv) {
            Ok(reply) => Ok(Some(reply)),
            Err(err) => {
                self.state = ChannelState::Closed;
                Err(err.into())
            }
        }
    }

    fn try_decode_request(&mut self) -> Result<Option<ConnectionRequest>> {
        if !handshake_buffered(&self.recv) {
            return Ok(None);
        }
        match ConnectionRequest::decode(&mut self.recv) {
            Ok(request) => Ok(Some(request)),
            Err(err) => {
                self.state = ChannelState::Closed;
                Err(err.into())
            }
        }
    }

    /// Frame one payload into complete wire messages: threshold-gated
    /// compression first, then fragmentation if the body exceeds one
    /// message.
    fn frame_payload(&mut self, payload: &[u8], packed: bool) -> Result<ByteBuffer> {
        let mut staging = ByteBuffer::growable(payload.len() + 64);
        let mut body_flags = flags::DATA;
        if packed {
            body_flags |= flags::PACKING;
        }

        let mut compressed = None;
        if let Some(codec) = self.tx_codec.as_mut() {
            if payload.len() >= codec.kind().threshold() {
                compressed = Some(codec.compress(payload)?);
                body_flags |= flags::COMPRESSION;
            }
        }
        let body: &[u8] = compressed.as_deref().unwrap_or(payload);

        let Some(fragmenter) = self.fragmenter.as_mut() else {
            return Err(ChannelError::NotActive);
        };
        if fragmenter.needs_fragmenting(body.len()) {
            // the fragment headers keep carrying the per-message bits so
            // the receiver knows to inflate and unpack after reassembly
            let mut extra = body_flags & (flags::COMPRESSION | flags::PACKING);
            if body_flags & flags::COMPRESSION != 0 {
                extra |= flags::COMP_FRAGMENT;
            }
            fragmenter.fragment(body, extra, &mut staging)?;
        } else {
            encode_message(&mut staging, body_flags, body)?;
        }
        staging.flip();
        Ok(staging)
    }

    /// Pop the next queued buffer following the flush-order strategy.
    fn next_queued(&mut self) -> Option<QueuedWrite> {
        if self.queued_count == 0 {
            return None;
        }
        let order_len = self.config.flush_order.len();
        for _ in 0..order_len {
            let priority = self.config.flush_order.at(self.flush_slot);
            self.flush_slot = (self.flush_slot + 1) % order_len;
            if let Some(entry) = self.queues[queue_index(priority)].pop_front() {
                return Some(entry);
            }
        }
        // the strategy string may omit a priority entirely
        self.queues.iter_mut().find_map(|q| q.pop_front())
    }

    /// Write staged bytes until gone or the socket pushes back. Returns
    /// `false` on `WouldBlock` with the remainder retained.
    fn drain_partial(&mut self) -> Result<bool> {
        while !self.partial.is_empty() {
            match self.stream.write(&self.partial) {
                Ok(0) => {
                    self.state = ChannelState::Closed;
                    return Err(ChannelError::Closed);
                }
                Ok(n) => {
                    trace!(bytes = n, "wrote to socket");
                    self.partial.advance(n);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(false),
                Err(err) => {
                    self.state = ChannelState::Closed;
                    return Err(err.into());
                }
            }
        }
        Ok(true)
    }

    /// Pull more socket bytes into the receive buffer. Returns `false` on
    /// `WouldBlock`; EOF closes the channel.
    fn fill_recv(&mut self) -> Result<bool> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        let n = loop {
            match self.stream.read(&mut chunk) {
                Ok(n) => break n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(false),
                Err(err) => {
                    self.state = ChannelState::Closed;
                    return Err(err.into());
                }
            }
        };
        if n == 0 {
            self.state = ChannelState::Closed;
            return Err(ChannelError::Closed);
        }
        trace!(bytes = n, "read from socket");
        // recv lives in read mode; shift unread bytes down, append, restore
        self.recv.compact();
        self.recv.put_slice(&chunk[..n])?;
        self.recv.flip();
        Ok(true)
    }
}

/// Whether one complete handshake message is buffered.
fn handshake_buffered(recv: &ByteBuffer) -> bool {
    if recv.remaining() < 2 {
        return false;
    }
    match recv.get_u16_at(recv.position()) {
        Ok(declared) => recv.remaining() >= declared as usize,
        Err(_) => false,
    }
}

fn queue_index(priority: Priority) -> usize {
    match priority {
        Priority::High => 0,
        Priority::Medium => 1,
        Priority::Low => 2,
    }
}

/// Session key sent in the version 13+ extra handshake step.
fn client_key() -> u32 {
    let mut hasher = std::collections::hash_map::RandomState::new().build_hasher();
    hasher.write_u64(u64::from(std::process::id()));
    hasher.finish() as u32
}

/// An area for packing several small messages into one wire frame,
/// acquired from [`Channel::pack_writer`].
pub struct PackWriter {
    buf: ByteBuffer,
}

impl PackWriter {
    /// Append one sub-message, returning the capacity left for more. An
    /// entry that does not fit leaves the area untouched.
    pub fn pack(&mut self, payload: &[u8]) -> Result<usize> {
        let needed = PACKED_PREFIX_SIZE + payload.len();
        if needed > self.remaining() {
            return Err(ChannelError::Buffer(BufferError::TooSmall {
                needed,
                available: self.remaining(),
            }));
        }
        encode_packed_entry(&mut self.buf, payload)?;
        Ok(self.remaining())
    }

    /// Capacity left for further packing.
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }
}

/// A channel shared across writer threads, serializing `write`, `flush`,
/// and packing behind one lock. Reads stay single-threaded by contract;
/// use [`SharedChannel::with`] from the one reader thread.
pub struct SharedChannel<S> {
    inner: std::sync::Arc<std::sync::Mutex<Channel<S>>>,
}

impl<S> Clone for SharedChannel<S> {
    fn clone(&self) -> Self {
        Self {
            inner: std::sync::Arc::clone(&self.inner),
        }
    }
}

impl<S: Read + Write> SharedChannel<S> {
    pub fn new(channel: Channel<S>) -> Self {
        Self {
            inner: std::sync::Arc::new(std::sync::Mutex::new(channel)),
        }
    }

    pub fn write(&self, payload: &[u8], args: &WriteArgs) -> Result<usize> {
        self.with(|ch| ch.write(payload, args))
    }

    pub fn flush(&self) -> Result<FlushOutcome> {
        self.with(|ch| ch.flush())
    }

    pub fn ping(&self) -> Result<()> {
        self.with(|ch| ch.ping())
    }

    /// Run any channel operation under the lock.
    pub fn with<T>(&self, f: impl FnOnce(&mut Channel<S>) -> T) -> T {
        let mut guard = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }
}
