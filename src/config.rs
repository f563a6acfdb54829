//! Stream configuration
//!
//! This module provides the settings a [`crate::Stream`] is created with: the byte order
//! applied to every multi-byte value and the alignment every block is padded to.

use crate::{io::ByteOrder, utils::is_power_of_two, Error, Result};

/// Default block alignment. The widest primitive a block can hold is 8 bytes.
pub const DEFAULT_ALIGNMENT: usize = 8;

/// Smallest block alignment that keeps intra-block alignment valid in the final output.
pub const MIN_BLOCK_ALIGNMENT: usize = 8;

/// Configuration for a [`crate::Stream`]
///
/// The byte order is stored once here and handed to every block the stream creates. The
/// alignment decides where each block may start in the output: blocks are padded to it when
/// closed, so every block offset is a multiple of it.
///
/// # Examples
///
/// ```rust
/// use datastream::{io::ByteOrder, StreamConfig};
///
/// let config = StreamConfig::big_endian().with_alignment(16);
/// assert_eq!(config.byte_order, ByteOrder::Big);
/// assert_eq!(config.alignment, 16);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    /// Byte order for every multi-byte value, pointer slot, and relocation entry
    pub byte_order: ByteOrder,

    /// Padding granularity of every block, a power of two no smaller than 8
    pub alignment: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            byte_order: ByteOrder::Little,
            alignment: DEFAULT_ALIGNMENT,
        }
    }
}

impl StreamConfig {
    /// Creates a little-endian configuration with the default alignment
    #[must_use]
    pub fn little_endian() -> Self {
        Self::default()
    }

    /// Creates a big-endian configuration with the default alignment
    #[must_use]
    pub fn big_endian() -> Self {
        Self {
            byte_order: ByteOrder::Big,
            ..Self::default()
        }
    }

    /// Creates a configuration using the byte order of the compilation target
    #[must_use]
    pub fn native() -> Self {
        Self {
            byte_order: ByteOrder::native(),
            ..Self::default()
        }
    }

    /// Returns a copy of this configuration with a different byte order
    #[must_use]
    pub fn with_byte_order(mut self, byte_order: ByteOrder) -> Self {
        self.byte_order = byte_order;
        self
    }

    /// Returns a copy of this configuration with a different block alignment
    ///
    /// The value is checked by [`StreamConfig::validate`] when the stream is created.
    #[must_use]
    pub fn with_alignment(mut self, alignment: usize) -> Self {
        self.alignment = alignment;
        self
    }

    /// Checks that the configuration can produce a correctly aligned output.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidAlignment`] if the alignment is not a power of two or is
    /// smaller than [`MIN_BLOCK_ALIGNMENT`].
    pub fn validate(&self) -> Result<()> {
        if is_power_of_two(self.alignment).is_none() || self.alignment < MIN_BLOCK_ALIGNMENT {
            return Err(Error::InvalidAlignment(self.alignment));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_presets() {
        let default = StreamConfig::default();
        assert_eq!(default.byte_order, ByteOrder::Little);
        assert_eq!(default.alignment, 8);
        assert_eq!(StreamConfig::little_endian(), default);

        let big = StreamConfig::big_endian();
        assert_eq!(big.byte_order, ByteOrder::Big);
        assert_eq!(big.alignment, 8);

        assert_eq!(StreamConfig::native().byte_order, ByteOrder::native());
    }

    #[test]
    fn test_config_builders() {
        let config = StreamConfig::default()
            .with_byte_order(ByteOrder::Big)
            .with_alignment(64);
        assert_eq!(config.byte_order, ByteOrder::Big);
        assert_eq!(config.alignment, 64);
    }

    #[test]
    fn test_config_validation() {
        assert!(StreamConfig::default().validate().is_ok());
        assert!(StreamConfig::default().with_alignment(4096).validate().is_ok());

        for bad in [0, 1, 2, 4, 12, 24] {
            let result = StreamConfig::default().with_alignment(bad).validate();
            assert!(
                matches!(result, Err(Error::InvalidAlignment(a)) if a == bad),
                "alignment {bad} should be rejected"
            );
        }
    }
}
