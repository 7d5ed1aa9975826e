use std::fmt::Write as _;
use std::sync::Arc;

use crate::byte_buffer::ByteBuffer;
use crate::error::{BufferError, Result};

const BYTES_PER_ROW: usize = 16;
// 16 "xx " cells plus the mid-row gap; partial rows pad flat to this width.
const HEX_FIELD_WIDTH: usize = BYTES_PER_ROW * 3 + 1;

/// Codec-level buffer wrapper.
///
/// A `Buffer` exposes a logical byte sequence that may be backed either by a
/// shared view into a [`ByteBuffer`] (`position..position + length`) or by a
/// `String`. Equality and copy operate on the logical content, so a
/// string-backed and a byte-backed buffer with identical bytes compare equal.
///
/// The byte backing is an `Arc` view: [`Buffer::copy_references`] clones the
/// handle rather than the data, which makes the shared-backing aliasing that
/// the transport relies on explicit in the type.
#[derive(Clone, Default)]
pub struct Buffer {
    backing: Backing,
    position: usize,
    length: usize,
}

#[derive(Clone, Default)]
enum Backing {
    #[default]
    None,
    Bytes(Arc<ByteBuffer>),
    Text(String),
}

impl Buffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the readable region of `data` as this buffer's backing.
    pub fn data(&mut self, data: ByteBuffer) {
        self.position = data.position();
        self.length = data.remaining();
        self.backing = Backing::Bytes(Arc::new(data));
    }

    /// Bind the region `[offset, offset + length)` of `data` as this
    /// buffer's backing.
    pub fn data_at(&mut self, data: ByteBuffer, offset: usize, length: usize) -> Result<()> {
        if offset + length > data.capacity() {
            return Err(BufferError::InvalidArgument(
                "offset + length exceeds backing capacity",
            ));
        }
        self.position = offset;
        self.length = length;
        self.backing = Backing::Bytes(Arc::new(data));
        Ok(())
    }

    /// Bind a string as this buffer's backing.
    pub fn data_string(&mut self, data: String) {
        self.position = 0;
        self.length = data.len();
        self.backing = Backing::Text(data);
    }

    /// Drop the backing and zero the view.
    pub fn clear(&mut self) {
        self.backing = Backing::None;
        self.position = 0;
        self.length = 0;
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Capacity available from `position` to the end of the backing.
    pub fn capacity(&self) -> usize {
        match &self.backing {
            Backing::None => 0,
            Backing::Bytes(bytes) => bytes.capacity() - self.position,
            Backing::Text(text) => text.len(),
        }
    }

    pub fn has_backing(&self) -> bool {
        !matches!(self.backing, Backing::None)
    }

    /// The logical byte content, or `None` if no backing is bound.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match &self.backing {
            Backing::None => None,
            Backing::Bytes(bytes) => {
                Some(&bytes.contents()[self.position..self.position + self.length])
            }
            Backing::Text(text) => Some(&text.as_bytes()[..self.length]),
        }
    }

    /// Copy the logical content into a raw byte slice.
    pub fn copy_into_slice(&self, dest: &mut [u8]) -> Result<()> {
        if self.length == 0 {
            return Ok(());
        }
        let src = self
            .as_bytes()
            .ok_or(BufferError::InvalidArgument("source has no backing"))?;
        if dest.len() < self.length {
            return Err(BufferError::TooSmall {
                needed: self.length,
                available: dest.len(),
            });
        }
        dest[..self.length].copy_from_slice(src);
        Ok(())
    }

    /// Copy the logical content into a [`ByteBuffer`] at its current
    /// position, advancing it.
    pub fn copy_into_byte_buffer(&self, dest: &mut ByteBuffer) -> Result<()> {
        if self.length == 0 {
            return Ok(());
        }
        let src = self
            .as_bytes()
            .ok_or(BufferError::InvalidArgument("source has no backing"))?;
        if dest.remaining() < self.length {
            return Err(BufferError::TooSmall {
                needed: self.length,
                available: dest.remaining(),
            });
        }
        dest.put_slice(src)
    }

    /// Copy the logical content into another `Buffer`'s backing storage at
    /// the destination's position.
    ///
    /// The destination must already hold an exclusive, writable byte backing;
    /// a missing or aliased backing is an `InvalidArgument`.
    pub fn copy_into_buffer(&self, dest: &mut Buffer) -> Result<()> {
        if self.length == 0 {
            return Ok(());
        }
        let length = self.length;
        let src = self
            .as_bytes()
            .ok_or(BufferError::InvalidArgument("source has no backing"))?
            // the borrow of dest below requires an owned copy when src
            // and dest alias the same backing
            .to_vec();

        let Backing::Bytes(bytes) = &mut dest.backing else {
            return Err(BufferError::InvalidArgument(
                "destination has no byte backing",
            ));
        };
        let Some(backing) = Arc::get_mut(bytes) else {
            return Err(BufferError::InvalidArgument(
                "destination backing is shared",
            ));
        };
        if backing.capacity() < dest.position + length {
            return Err(BufferError::TooSmall {
                needed: length,
                available: backing.capacity().saturating_sub(dest.position),
            });
        }
        backing.put_slice_at(dest.position, &src)
    }

    /// Make this buffer alias `src`'s backing. Shared view, not a deep copy:
    /// both buffers observe the same underlying bytes afterwards.
    pub fn copy_references(&mut self, src: &Buffer) {
        self.backing = src.backing.clone();
        self.position = src.position;
        self.length = src.length;
    }

    /// Render the logical content as a canonical hex dump: a 4-hex-digit
    /// offset column, 16 space-separated byte pairs per row with an extra
    /// space after the 8th, two trailing spaces, then the printable-ASCII
    /// gutter. The final partial row pads the hex field flat to the same
    /// gutter column.
    pub fn to_hex_string(&self) -> String {
        hex_dump(self.as_bytes().unwrap_or(&[]))
    }

    fn logical(&self) -> &[u8] {
        self.as_bytes().unwrap_or(&[])
    }
}

/// Byte-for-byte lexicographic equality over the logical content,
/// independent of the backing representation.
impl PartialEq for Buffer {
    fn eq(&self, other: &Self) -> bool {
        self.logical() == other.logical()
    }
}

impl Eq for Buffer {}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.backing {
            Backing::None => "none",
            Backing::Bytes(_) => "bytes",
            Backing::Text(_) => "text",
        };
        f.debug_struct("Buffer")
            .field("backing", &kind)
            .field("position", &self.position)
            .field("length", &self.length)
            .finish()
    }
}

fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::new();
    for (row, chunk) in bytes.chunks(BYTES_PER_ROW).enumerate() {
        if row > 0 {
            out.push('\n');
        }
        let _ = write!(out, "{:04x}: ", row * BYTES_PER_ROW);

        let mut hex = String::with_capacity(HEX_FIELD_WIDTH);
        let full_row = chunk.len() == BYTES_PER_ROW;
        for (i, b) in chunk.iter().enumerate() {
            let _ = write!(hex, "{b:02x} ");
            if full_row && i == 7 {
                hex.push(' ');
            }
        }
        while hex.len() < HEX_FIELD_WIDTH {
            hex.push(' ');
        }
        out.push_str(&hex);
        out.push_str("  ");

        for &b in chunk {
            out.push(if (0x20..0x7f).contains(&b) { b as char } else { '.' });
        }
    }
    out
}
