use crate::error::{BufferError, Result};

/// A growable, position/limit-bounded byte container.
///
/// All multi-byte accessors use big-endian (network) byte order regardless of
/// host endianness. Relative accessors (`get_*`/`put_*`) advance `position`;
/// absolute accessors (`*_at`) never move it.
///
/// Invariant: `0 <= position <= limit <= capacity`.
///
/// A buffer constructed with [`ByteBuffer::new`] has a fixed capacity and
/// rejects writes past its limit; one constructed with
/// [`ByteBuffer::growable`] grows its backing store on demand. Framing
/// headers use fixed buffers, fragment/compression staging uses growable
/// ones.
pub struct ByteBuffer {
    data: Vec<u8>,
    position: usize,
    limit: usize,
    mark: Option<usize>,
    growable: bool,
}

macro_rules! be_accessors {
    ($get:ident, $get_at:ident, $put:ident, $put_at:ident, $ty:ty, $n:expr) => {
        /// Read a big-endian value at `position`, advancing it.
        pub fn $get(&mut self) -> Result<$ty> {
            let value = self.$get_at(self.position)?;
            self.position += $n;
            Ok(value)
        }

        /// Read a big-endian value at an absolute index without moving `position`.
        pub fn $get_at(&self, index: usize) -> Result<$ty> {
            self.check_readable(index, $n)?;
            let mut raw = [0u8; $n];
            raw.copy_from_slice(&self.data[index..index + $n]);
            Ok(<$ty>::from_be_bytes(raw))
        }

        /// Write a big-endian value at `position`, advancing it.
        pub fn $put(&mut self, value: $ty) -> Result<()> {
            self.ensure_writable($n)?;
            self.data[self.position..self.position + $n].copy_from_slice(&value.to_be_bytes());
            self.position += $n;
            Ok(())
        }

        /// Write a big-endian value at an absolute index without moving `position`.
        pub fn $put_at(&mut self, index: usize, value: $ty) -> Result<()> {
            self.check_writable_at(index, $n)?;
            self.data[index..index + $n].copy_from_slice(&value.to_be_bytes());
            Ok(())
        }
    };
}

impl ByteBuffer {
    /// Create a fixed-capacity buffer. Writes past the limit fail with
    /// [`BufferError::OutOfBounds`].
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity],
            position: 0,
            limit: capacity,
            mark: None,
            growable: false,
        }
    }

    /// Create a buffer that grows its backing store when a write would
    /// exceed the current capacity.
    pub fn growable(capacity: usize) -> Self {
        Self {
            growable: true,
            ..Self::new(capacity)
        }
    }

    /// Create a buffer wrapping a copy of `src`, ready for reading
    /// (`position = 0`, `limit = src.len()`).
    pub fn wrap(src: &[u8]) -> Self {
        Self {
            data: src.to_vec(),
            position: 0,
            limit: src.len(),
            mark: None,
            growable: false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Move the cursor. Fails if the new position would pass the limit.
    pub fn set_position(&mut self, position: usize) -> Result<()> {
        if position > self.limit {
            return Err(BufferError::OutOfBounds {
                index: position,
                limit: self.limit,
            });
        }
        self.position = position;
        Ok(())
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Set the limit. Fails if it would fall below `position` or exceed capacity.
    pub fn set_limit(&mut self, limit: usize) -> Result<()> {
        if limit < self.position || limit > self.data.len() {
            return Err(BufferError::OutOfBounds {
                index: limit,
                limit: self.data.len(),
            });
        }
        self.limit = limit;
        Ok(())
    }

    /// Bytes remaining between `position` and `limit`.
    pub fn remaining(&self) -> usize {
        self.limit - self.position
    }

    pub fn has_remaining(&self) -> bool {
        self.remaining() > 0
    }

    /// The entire backing store, independent of cursors.
    pub fn contents(&self) -> &[u8] {
        &self.data
    }

    /// The readable region `[position, limit)`.
    pub fn readable(&self) -> &[u8] {
        &self.data[self.position..self.limit]
    }

    /// Convert a just-written region into a readable one:
    /// `limit = position; position = 0`.
    pub fn flip(&mut self) -> &mut Self {
        self.limit = self.position;
        self.position = 0;
        self.mark = None;
        self
    }

    /// Reset to the initial writable state: `position = 0; limit = capacity`.
    pub fn clear(&mut self) -> &mut Self {
        self.position = 0;
        self.limit = self.data.len();
        self.mark = None;
        self
    }

    /// Shift the unread bytes `[position, limit)` to the front, leaving the
    /// buffer writable after them: `position = limit - old position;
    /// limit = capacity`.
    pub fn compact(&mut self) -> &mut Self {
        let unread = self.limit - self.position;
        self.data.copy_within(self.position..self.limit, 0);
        self.position = unread;
        self.limit = self.data.len();
        self.mark = None;
        self
    }

    /// Reset `position` to the start without touching `limit`.
    pub fn rewind(&mut self) -> &mut Self {
        self.position = 0;
        self.mark = None;
        self
    }

    /// Record the current position for a later [`reset`](Self::reset).
    pub fn mark(&mut self) -> &mut Self {
        self.mark = Some(self.position);
        self
    }

    /// Return `position` to the last [`mark`](Self::mark).
    pub fn reset(&mut self) -> Result<()> {
        match self.mark {
            Some(mark) => {
                self.position = mark;
                Ok(())
            }
            None => Err(BufferError::InvalidArgument("reset without a mark")),
        }
    }

    /// Ensure at least `count` additional bytes are writable at `position`,
    /// growing the backing store only if needed. `position` never moves.
    /// Returns the effective limit after the call.
    pub fn reserve(&mut self, count: usize) -> usize {
        if self.position + count > self.limit {
            let new_len = self.position + count;
            if new_len > self.data.len() {
                self.data.resize(new_len, 0);
            }
            self.limit = self.data.len();
        }
        self.limit
    }

    /// Append a slice at `position`, advancing it.
    pub fn put_slice(&mut self, src: &[u8]) -> Result<()> {
        self.ensure_writable(src.len())?;
        self.data[self.position..self.position + src.len()].copy_from_slice(src);
        self.position += src.len();
        Ok(())
    }

    /// Write a slice at an absolute index without moving `position`.
    pub fn put_slice_at(&mut self, index: usize, src: &[u8]) -> Result<()> {
        self.check_writable_at(index, src.len())?;
        self.data[index..index + src.len()].copy_from_slice(src);
        Ok(())
    }

    /// Read exactly `dest.len()` bytes from `position`, advancing it.
    pub fn get_slice(&mut self, dest: &mut [u8]) -> Result<()> {
        self.check_readable(self.position, dest.len())?;
        dest.copy_from_slice(&self.data[self.position..self.position + dest.len()]);
        self.position += dest.len();
        Ok(())
    }

    /// Read a byte at `position`, advancing it.
    pub fn get_u8(&mut self) -> Result<u8> {
        let value = self.get_u8_at(self.position)?;
        self.position += 1;
        Ok(value)
    }

    /// Read a byte at an absolute index without moving `position`.
    pub fn get_u8_at(&self, index: usize) -> Result<u8> {
        self.check_readable(index, 1)?;
        Ok(self.data[index])
    }

    /// Write a byte at `position`, advancing it.
    pub fn put_u8(&mut self, value: u8) -> Result<()> {
        self.ensure_writable(1)?;
        self.data[self.position] = value;
        self.position += 1;
        Ok(())
    }

    /// Write a byte at an absolute index without moving `position`.
    pub fn put_u8_at(&mut self, index: usize, value: u8) -> Result<()> {
        self.check_writable_at(index, 1)?;
        self.data[index] = value;
        Ok(())
    }

    be_accessors!(get_i16, get_i16_at, put_i16, put_i16_at, i16, 2);
    be_accessors!(get_u16, get_u16_at, put_u16, put_u16_at, u16, 2);
    be_accessors!(get_i32, get_i32_at, put_i32, put_i32_at, i32, 4);
    be_accessors!(get_u32, get_u32_at, put_u32, put_u32_at, u32, 4);
    be_accessors!(get_i64, get_i64_at, put_i64, put_i64_at, i64, 8);
    be_accessors!(get_u64, get_u64_at, put_u64, put_u64_at, u64, 8);
    be_accessors!(get_f32, get_f32_at, put_f32, put_f32_at, f32, 4);
    be_accessors!(get_f64, get_f64_at, put_f64, put_f64_at, f64, 8);

    fn check_readable(&self, index: usize, count: usize) -> Result<()> {
        if index + count > self.limit {
            return Err(BufferError::OutOfBounds {
                index: index + count,
                limit: self.limit,
            });
        }
        Ok(())
    }

    fn check_writable_at(&self, index: usize, count: usize) -> Result<()> {
        if index + count > self.limit {
            return Err(BufferError::OutOfBounds {
                index: index + count,
                limit: self.limit,
            });
        }
        Ok(())
    }

    fn ensure_writable(&mut self, count: usize) -> Result<()> {
        if self.position + count > self.limit {
            if !self.growable {
                return Err(BufferError::OutOfBounds {
                    index: self.position + count,
                    limit: self.limit,
                });
            }
            let needed = self.position + count;
            let new_len = needed.max(self.data.len() * 2);
            self.data.resize(new_len, 0);
            self.limit = self.data.len();
        }
        Ok(())
    }
}

/// Content equality over the readable region `[position, limit)`.
impl PartialEq for ByteBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.readable() == other.readable()
    }
}

impl Eq for ByteBuffer {}

impl std::fmt::Debug for ByteBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteBuffer")
            .field("position", &self.position)
            .field("limit", &self.limit)
            .field("capacity", &self.data.len())
            .field("growable", &self.growable)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_flip_bounds_readable_region() {
        let mut buf = ByteBuffer::new(64);
        buf.put_slice(b"abcdef").unwrap();
        buf.flip();

        assert_eq!(buf.position(), 0);
        assert_eq!(buf.limit(), 6);
        assert_eq!(buf.readable(), b"abcdef");
    }

    #[test]
    fn clear_resets_to_full_capacity() {
        let mut buf = ByteBuffer::new(64);
        buf.put_slice(b"abcdef").unwrap();
        buf.flip();
        buf.clear();

        assert_eq!(buf.position(), 0);
        assert_eq!(buf.limit(), 64);
    }

    #[test]
    fn compact_preserves_unread_tail() {
        let mut buf = ByteBuffer::new(16);
        buf.put_slice(b"abcdefgh").unwrap();
        buf.flip();

        let mut head = [0u8; 3];
        buf.get_slice(&mut head).unwrap();
        assert_eq!(&head, b"abc");

        buf.compact();
        assert_eq!(buf.position(), 5);
        assert_eq!(buf.limit(), 16);

        buf.flip();
        assert_eq!(buf.readable(), b"defgh");
    }

    #[test]
    fn rewind_keeps_limit() {
        let mut buf = ByteBuffer::wrap(b"xyz");
        let mut b = [0u8; 2];
        buf.get_slice(&mut b).unwrap();
        buf.rewind();

        assert_eq!(buf.position(), 0);
        assert_eq!(buf.limit(), 3);
    }

    #[test]
    fn big_endian_adjacent_values_roundtrip() {
        let mut buf = ByteBuffer::new(10);
        buf.put_i64(0x0102030405060708).unwrap();
        buf.put_u16(0xBEEF).unwrap();
        buf.flip();

        assert_eq!(
            buf.contents()[..10],
            [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0xBE, 0xEF]
        );
        assert_eq!(buf.get_i64().unwrap(), 0x0102030405060708);
        assert_eq!(buf.get_u16().unwrap(), 0xBEEF);
    }

    #[test]
    fn floats_roundtrip_in_network_order() {
        let mut buf = ByteBuffer::new(12);
        buf.put_f32(1.5).unwrap();
        buf.put_f64(-2.25).unwrap();
        buf.flip();

        assert_eq!(buf.get_f32().unwrap(), 1.5);
        assert_eq!(buf.get_f64().unwrap(), -2.25);
    }

    #[test]
    fn absolute_accessors_never_move_position() {
        let mut buf = ByteBuffer::new(16);
        buf.put_u32(7).unwrap();
        let pos = buf.position();

        buf.put_u16_at(8, 0x1234).unwrap();
        assert_eq!(buf.position(), pos);
        assert_eq!(buf.get_u16_at(8).unwrap(), 0x1234);
        assert_eq!(buf.get_u32_at(0).unwrap(), 7);
        assert_eq!(buf.position(), pos);
    }

    #[test]
    fn reserve_never_moves_position() {
        let mut buf = ByteBuffer::new(8);
        buf.put_u32(1).unwrap();
        let pos = buf.position();

        let limit = buf.reserve(32);
        assert_eq!(buf.position(), pos);
        assert!(limit >= pos + 32);
    }

    #[test]
    fn reserve_within_capacity_is_a_no_op() {
        let mut buf = ByteBuffer::new(64);
        buf.put_u32(1).unwrap();

        let limit = buf.reserve(4);
        assert_eq!(limit, 64);
        assert_eq!(buf.capacity(), 64);
    }

    #[test]
    fn reserve_preserves_committed_data() {
        let mut buf = ByteBuffer::new(4);
        buf.put_u32(0xDEADBEEF).unwrap();
        buf.reserve(8);
        buf.put_u64(1).unwrap();
        buf.flip();

        assert_eq!(buf.get_u32().unwrap(), 0xDEADBEEF);
        assert_eq!(buf.get_u64().unwrap(), 1);
    }

    #[test]
    fn fixed_buffer_rejects_overflow() {
        let mut buf = ByteBuffer::new(3);
        let err = buf.put_u32(1).unwrap_err();
        assert!(matches!(err, BufferError::OutOfBounds { .. }));
        assert_eq!(buf.position(), 0);
    }

    #[test]
    fn growable_buffer_grows_on_demand() {
        let mut buf = ByteBuffer::growable(2);
        buf.put_u64(42).unwrap();
        buf.flip();
        assert_eq!(buf.get_u64().unwrap(), 42);
    }

    #[test]
    fn read_past_limit_fails() {
        let mut buf = ByteBuffer::wrap(b"ab");
        let err = buf.get_u32().unwrap_err();
        assert!(matches!(err, BufferError::OutOfBounds { .. }));
    }

    #[test]
    fn equality_is_content_based() {
        let a = ByteBuffer::wrap(b"hello");
        let b = ByteBuffer::wrap(b"hello");
        let c = ByteBuffer::wrap(b"hellO");
        let d = ByteBuffer::wrap(b"hell");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn equality_ignores_consumed_prefix() {
        let mut a = ByteBuffer::wrap(b"xxworld");
        let mut skip = [0u8; 2];
        a.get_slice(&mut skip).unwrap();
        let b = ByteBuffer::wrap(b"world");

        assert_eq!(a, b);
    }

    #[test]
    fn mark_and_reset() {
        let mut buf = ByteBuffer::wrap(b"abcdef");
        let mut b = [0u8; 2];
        buf.get_slice(&mut b).unwrap();
        buf.mark();
        buf.get_slice(&mut b).unwrap();
        buf.reset().unwrap();

        assert_eq!(buf.position(), 2);
    }

    #[test]
    fn reset_without_mark_fails() {
        let mut buf = ByteBuffer::new(4);
        assert!(matches!(
            buf.reset(),
            Err(BufferError::InvalidArgument(_))
        ));
    }

    #[test]
    fn set_position_past_limit_fails() {
        let mut buf = ByteBuffer::wrap(b"ab");
        assert!(buf.set_position(3).is_err());
        assert!(buf.set_position(2).is_ok());
    }
}
