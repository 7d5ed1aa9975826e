//! Channel configuration: compression, framing limits, flush strategy, and
//! locking/blocking behavior.

use rwire_ripc::consts::{
    DEFAULT_COMPRESSION_LEVEL, DEFAULT_FLUSH_ORDER, DEFAULT_HIGH_WATER_MARK,
    DEFAULT_MAX_FRAGMENT_SIZE, DEFAULT_PING_TIMEOUT_SECS, MAX_FLUSH_ORDER_LEN,
};
use rwire_ripc::{CompressionType, RipcVersion};

use crate::error::{ChannelError, Result};

/// Write priority. Buffers in the same queue flush in FIFO order; the
/// flush-order strategy interleaves the queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    High,
    Medium,
    Low,
}

/// The parsed flush-order strategy: the sequence of queues serviced per
/// flush cycle. Parsing the configuration string happens here, at the
/// boundary; the runtime only ever sees the enum sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushOrder(Vec<Priority>);

impl FlushOrder {
    /// Parse a strategy string such as `"HMHLHM"`.
    pub fn parse(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(ChannelError::Config("flush order is empty".to_string()));
        }
        if s.len() > MAX_FLUSH_ORDER_LEN {
            return Err(ChannelError::Config(format!(
                "flush order longer than {MAX_FLUSH_ORDER_LEN} entries"
            )));
        }
        let order = s
            .chars()
            .map(|c| match c {
                'H' => Ok(Priority::High),
                'M' => Ok(Priority::Medium),
                'L' => Ok(Priority::Low),
                other => Err(ChannelError::Config(format!(
                    "invalid flush order character {other:?} (expected H, M, or L)"
                ))),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self(order))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The queue serviced at slot `i`, cycling.
    pub fn at(&self, i: usize) -> Priority {
        self.0[i % self.0.len()]
    }
}

impl Default for FlushOrder {
    fn default() -> Self {
        Self::parse(DEFAULT_FLUSH_ORDER).expect("default flush order parses")
    }
}

/// Everything negotiable or tunable about one channel.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub compression: CompressionType,
    /// ZLIB level 0..=9; ignored for LZ4.
    pub compression_level: u32,
    /// Largest single wire message; larger payloads fragment.
    pub max_fragment_size: usize,
    /// Queued-buffer budget; writes beyond it fail until a flush drains.
    pub guaranteed_output_buffers: usize,
    /// Pending-byte threshold that triggers an implicit flush on write.
    pub high_water_mark: usize,
    pub flush_order: FlushOrder,
    /// Serialize Write/Flush/Pack across threads sharing one channel.
    pub channel_write_locking: bool,
    /// Declares that the underlying stream blocks. The channel itself
    /// handles both modes uniformly (blocking mode is a property of the
    /// stream, not of the channel); the declaration only rejects the
    /// combination with transport-wide creation locking, where a blocked
    /// caller would stall every other channel setup.
    pub blocking: bool,
    /// Lowest protocol version this side will accept.
    pub version_floor: RipcVersion,
    /// Highest protocol version this side will propose or grant.
    pub version_ceiling: RipcVersion,
    pub ping_timeout_secs: u8,
    /// Inflated-size cap applied when decompressing received messages.
    pub max_decompressed_size: usize,
    pub host_name: String,
    pub ip_address: String,
    pub component_version: String,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            compression: CompressionType::None,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            max_fragment_size: DEFAULT_MAX_FRAGMENT_SIZE,
            guaranteed_output_buffers: 50,
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
            flush_order: FlushOrder::default(),
            channel_write_locking: false,
            blocking: false,
            version_floor: RipcVersion::MIN,
            version_ceiling: RipcVersion::MAX,
            ping_timeout_secs: DEFAULT_PING_TIMEOUT_SECS,
            max_decompressed_size: 4 * 1024 * 1024,
            host_name: String::new(),
            ip_address: String::new(),
            component_version: String::new(),
        }
    }
}

impl ChannelConfig {
    pub fn validate(&self) -> Result<()> {
        if self.compression_level > 9 {
            return Err(ChannelError::Config(format!(
                "compression level {} out of range 0..=9",
                self.compression_level
            )));
        }
        if self.max_fragment_size > DEFAULT_MAX_FRAGMENT_SIZE {
            return Err(ChannelError::Config(format!(
                "max fragment size {} exceeds protocol limit {DEFAULT_MAX_FRAGMENT_SIZE}",
                self.max_fragment_size
            )));
        }
        // smallest useful wire message: header, optional flags, fragment
        // extension, and at least one payload byte
        if self.max_fragment_size < 16 {
            return Err(ChannelError::Config(format!(
                "max fragment size {} too small",
                self.max_fragment_size
            )));
        }
        if self.version_floor > self.version_ceiling {
            return Err(ChannelError::Config(
                "version floor exceeds ceiling".to_string(),
            ));
        }
        if self.guaranteed_output_buffers == 0 {
            return Err(ChannelError::Config(
                "guaranteed output buffers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_flush_order_services_high_twice_per_cycle() {
        let order = FlushOrder::default();
        assert_eq!(order.len(), 6);
        let highs = (0..order.len())
            .filter(|&i| order.at(i) == Priority::High)
            .count();
        assert_eq!(highs, 3);
        // cycles past the end
        assert_eq!(order.at(0), order.at(6));
    }

    #[test]
    fn flush_order_rejects_bad_input() {
        assert!(matches!(FlushOrder::parse(""), Err(ChannelError::Config(_))));
        assert!(matches!(
            FlushOrder::parse("HMX"),
            Err(ChannelError::Config(_))
        ));
        assert!(matches!(
            FlushOrder::parse(&"H".repeat(MAX_FLUSH_ORDER_LEN + 1)),
            Err(ChannelError::Config(_))
        ));
        assert!(FlushOrder::parse(&"H".repeat(MAX_FLUSH_ORDER_LEN)).is_ok());
    }

    #[test]
    fn config_validation_bounds() {
        assert!(ChannelConfig::default().validate().is_ok());

        let bad_level = ChannelConfig {
            compression_level: 10,
            ..ChannelConfig::default()
        };
        assert!(bad_level.validate().is_err());

        let bad_frag = ChannelConfig {
            max_fragment_size: DEFAULT_MAX_FRAGMENT_SIZE + 1,
            ..ChannelConfig::default()
        };
        assert!(bad_frag.validate().is_err());

        let bad_versions = ChannelConfig {
            version_floor: RipcVersion::V14,
            version_ceiling: RipcVersion::V12,
            ..ChannelConfig::default()
        };
        assert!(bad_versions.validate().is_err());
    }
}
