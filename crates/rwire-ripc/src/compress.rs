//! ZLIB and LZ4 payload compression adapters.
//!
//! Each channel direction owns one adapter instance; the ZLIB adapter
//! carries its deflate dictionary across calls so consecutive messages
//! share a window, which is why adapters must never be shared between
//! channels. LZ4 operates in independent block mode and keeps no window.

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

use crate::consts::CompressionType;
use crate::error::{RipcError, Result};

const OUT_CHUNK: usize = 4096;

/// Streaming payload compressor with per-channel state.
pub trait Compressor: Send {
    fn kind(&self) -> CompressionType;

    /// Compress one message payload.
    fn compress(&mut self, input: &[u8]) -> Result<Vec<u8>>;

    /// Decompress one message payload. `max_out` caps the inflated size;
    /// exceeding it is an error, never a write past the cap.
    fn decompress(&mut self, input: &[u8], max_out: usize) -> Result<Vec<u8>>;
}

/// Construct the adapter for a negotiated compression type, or `None`
/// when the channel is uncompressed.
pub fn new_compressor(kind: CompressionType, level: u32) -> Option<Box<dyn Compressor>> {
    match kind {
        CompressionType::None => None,
        CompressionType::Zlib => Some(Box::new(ZlibCompressor::new(level))),
        CompressionType::Lz4 => Some(Box::new(Lz4Compressor::new())),
    }
}

/// DEFLATE with a zlib wrapper. Each message is flushed with a sync flush
/// so the peer can inflate it immediately while the dictionary carries
/// forward to the next message.
pub struct ZlibCompressor {
    deflate: Compress,
    inflate: Decompress,
}

impl ZlibCompressor {
    pub fn new(level: u32) -> Self {
        Self {
            deflate: Compress::new(Compression::new(level), true),
            inflate: Decompress::new(true),
        }
    }
}

impl Compressor for ZlibCompressor {
    fn kind(&self) -> CompressionType {
        CompressionType::Zlib
    }

    fn compress(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(input.len() / 2 + 64);
        let start_in = self.deflate.total_in();
        loop {
            if out.len() == out.capacity() {
                out.reserve(OUT_CHUNK);
            }
            let consumed = (self.deflate.total_in() - start_in) as usize;
            self.deflate
                .compress_vec(&input[consumed..], &mut out, FlushCompress::Sync)
                .map_err(|e| RipcError::Compress(e.to_string()))?;
            let consumed = (self.deflate.total_in() - start_in) as usize;
            // spare output room after the call means the sync flush completed
            if consumed == input.len() && out.len() < out.capacity() {
                return Ok(out);
            }
        }
    }

    fn decompress(&mut self, input: &[u8], max_out: usize) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(max_out.min(OUT_CHUNK).max(64));
        let start_in = self.inflate.total_in();
        loop {
            if out.len() == out.capacity() {
                if out.capacity() >= max_out {
                    return Err(RipcError::DecompressedTooLarge { limit: max_out });
                }
                let grow = OUT_CHUNK.min(max_out - out.capacity());
                out.reserve(grow);
            }
            let before_out = self.inflate.total_out();
            let already = (self.inflate.total_in() - start_in) as usize;
            let status = self
                .inflate
                .decompress_vec(&input[already..], &mut out, FlushDecompress::Sync)
                .map_err(|e| RipcError::Decompress(e.to_string()))?;
            let consumed = (self.inflate.total_in() - start_in) as usize;
            if consumed == input.len() && out.len() < out.capacity() {
                if out.len() > max_out {
                    return Err(RipcError::DecompressedTooLarge { limit: max_out });
                }
                return Ok(out);
            }
            // no input left, room to spare, yet nothing produced: the
            // stream is truncated or corrupt
            if status == Status::BufError
                && self.inflate.total_out() == before_out
                && out.len() < out.capacity()
            {
                return Err(RipcError::Decompress("incomplete deflate stream".into()));
            }
        }
    }
}

/// LZ4 block compression with a length-prepended frame, no dictionary
/// carried between messages and no configurable level.
#[derive(Default)]
pub struct Lz4Compressor;

impl Lz4Compressor {
    pub fn new() -> Self {
        Self
    }
}

impl Compressor for Lz4Compressor {
    fn kind(&self) -> CompressionType {
        CompressionType::Lz4
    }

    fn compress(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        Ok(lz4_flex::block::compress_prepend_size(input))
    }

    fn decompress(&mut self, input: &[u8], max_out: usize) -> Result<Vec<u8>> {
        let declared = lz4_flex::block::uncompressed_size(input)
            .map_err(|e| RipcError::Decompress(e.to_string()))?
            .0;
        if declared > max_out {
            return Err(RipcError::DecompressedTooLarge { limit: max_out });
        }
        lz4_flex::block::decompress_size_prepended(input)
            .map_err(|e| RipcError::Decompress(e.to_string()))
    }
}
