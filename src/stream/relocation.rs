//! Relocation table handling.
//!
//! The relocation table lists the absolute position of every pointer slot in the data blob.
//! A loader that maps the blob at some base address walks the table and adds that base to
//! each slot, without having to understand the structure of the data itself.
//!
//! # Format
//!
//! A flat sequence of 8-byte unsigned offsets in the stream's byte order, sorted ascending
//! and free of duplicates. There is no header or count field; the number of entries is the
//! table size divided by 8.
//!
//! # Usage
//!
//! ```rust
//! use datastream::{io::ByteOrder, RelocationTable};
//!
//! let mut table = RelocationTable::new();
//! table.insert(24);
//! table.insert(8);
//! table.insert(24);
//!
//! let bytes = table.to_bytes(ByteOrder::Little);
//! assert_eq!(bytes.len(), 16);
//!
//! let parsed = RelocationTable::parse(&bytes, ByteOrder::Little)?;
//! assert_eq!(parsed.iter().collect::<Vec<_>>(), vec![8, 24]);
//! # Ok::<(), datastream::Error>(())
//! ```

use std::collections::BTreeSet;

use crate::{
    io::{read_at, to_bytes, write, ByteOrder},
    Error, Result,
};

/// Sorted, de-duplicated set of absolute pointer slot positions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelocationTable {
    offsets: BTreeSet<u64>,
}

impl RelocationTable {
    /// Size in bytes of a single table entry.
    pub const ENTRY_SIZE: usize = 8;

    /// Creates an empty relocation table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a slot position. Returns `false` if it was already present.
    pub fn insert(&mut self, offset: u64) -> bool {
        self.offsets.insert(offset)
    }

    /// Returns `true` if `offset` is a recorded slot position.
    #[must_use]
    pub fn contains(&self, offset: u64) -> bool {
        self.offsets.contains(&offset)
    }

    /// Number of entries in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// Returns `true` if the table has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Size of the serialized table in bytes.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.offsets.len() * Self::ENTRY_SIZE
    }

    /// Iterates over the slot positions in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.offsets.iter().copied()
    }

    /// Appends the serialized table to `buffer`.
    pub fn write_to_buffer(&self, buffer: &mut Vec<u8>, order: ByteOrder) {
        buffer.reserve(self.byte_len());
        for offset in &self.offsets {
            buffer.extend_from_slice(&to_bytes(*offset, order));
        }
    }

    /// Serializes the table into a new buffer.
    #[must_use]
    pub fn to_bytes(&self, order: ByteOrder) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(self.byte_len());
        self.write_to_buffer(&mut buffer, order);
        buffer
    }

    /// Parses a serialized relocation table.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the data length is not a multiple of 8 or the
    /// entries are not strictly ascending.
    pub fn parse(data: &[u8], order: ByteOrder) -> Result<Self> {
        if data.len() % Self::ENTRY_SIZE != 0 {
            return Err(malformed_error!(
                "Relocation table size {} is not a multiple of {}",
                data.len(),
                Self::ENTRY_SIZE
            ));
        }

        let mut offsets = BTreeSet::new();
        let mut previous: Option<u64> = None;
        let mut cursor = 0_usize;

        while cursor < data.len() {
            let entry = read_at::<u64>(data, &mut cursor, order)?;
            if previous.is_some_and(|p| p >= entry) {
                return Err(malformed_error!(
                    "Relocation entry {:#x} at table offset {} is not in ascending order",
                    entry,
                    cursor - Self::ENTRY_SIZE
                ));
            }
            previous = Some(entry);
            offsets.insert(entry);
        }

        Ok(Self { offsets })
    }

    /// Rebases every pointer slot in `data` by adding `base` to the stored offset.
    ///
    /// This is the fix-up a loader performs after placing the blob at address `base`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] if a slot lies outside `data`, or
    /// [`crate::Error::Malformed`] if a rebased value overflows 64 bits. Slots before the
    /// failing one have already been rebased.
    pub fn apply(&self, data: &mut [u8], base: u64, order: ByteOrder) -> Result<()> {
        for offset in &self.offsets {
            let Ok(mut cursor) = usize::try_from(*offset) else {
                return Err(Error::OutOfBounds);
            };
            let start = cursor;

            let value = read_at::<u64>(data, &mut cursor, order)?;
            let Some(rebased) = value.checked_add(base) else {
                return Err(malformed_error!(
                    "Rebasing slot at {:#x} overflows: {:#x} + {:#x}",
                    offset,
                    value,
                    base
                ));
            };

            write(&mut data[start..], rebased, order)?;
        }

        Ok(())
    }
}

impl FromIterator<u64> for RelocationTable {
    fn from_iter<I: IntoIterator<Item = u64>>(iter: I) -> Self {
        Self {
            offsets: iter.into_iter().collect(),
        }
    }
}

impl Extend<u64> for RelocationTable {
    fn extend<I: IntoIterator<Item = u64>>(&mut self, iter: I) {
        self.offsets.extend(iter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_sorts_and_deduplicates() {
        let mut table = RelocationTable::new();
        assert!(table.insert(32));
        assert!(table.insert(8));
        assert!(!table.insert(32));
        assert!(table.insert(16));

        assert_eq!(table.len(), 3);
        assert_eq!(table.byte_len(), 24);
        assert!(table.contains(16));
        assert!(!table.contains(24));
        assert_eq!(table.iter().collect::<Vec<_>>(), vec![8, 16, 32]);
    }

    #[test]
    fn test_serialization_byte_order() {
        let table: RelocationTable = [8u64, 0x0102].into_iter().collect();

        let little = table.to_bytes(ByteOrder::Little);
        assert_eq!(
            little,
            vec![8, 0, 0, 0, 0, 0, 0, 0, 0x02, 0x01, 0, 0, 0, 0, 0, 0]
        );

        let big = table.to_bytes(ByteOrder::Big);
        assert_eq!(
            big,
            vec![0, 0, 0, 0, 0, 0, 0, 8, 0, 0, 0, 0, 0, 0, 0x01, 0x02]
        );
    }

    #[test]
    fn test_empty_table() {
        let table = RelocationTable::new();
        assert!(table.is_empty());
        assert!(table.to_bytes(ByteOrder::Big).is_empty());
        assert_eq!(
            RelocationTable::parse(&[], ByteOrder::Big).unwrap(),
            RelocationTable::new()
        );
    }

    #[test]
    fn test_parse_rejects_truncated() {
        let result = RelocationTable::parse(&[0u8; 12], ByteOrder::Little);
        assert!(matches!(result, Err(Error::Malformed { .. })));
    }

    #[test]
    fn test_parse_rejects_unsorted() {
        let mut data = Vec::new();
        data.extend_from_slice(&16u64.to_le_bytes());
        data.extend_from_slice(&8u64.to_le_bytes());
        let result = RelocationTable::parse(&data, ByteOrder::Little);
        assert!(matches!(result, Err(Error::Malformed { .. })));

        let mut data = Vec::new();
        data.extend_from_slice(&8u64.to_le_bytes());
        data.extend_from_slice(&8u64.to_le_bytes());
        let result = RelocationTable::parse(&data, ByteOrder::Little);
        assert!(matches!(result, Err(Error::Malformed { .. })));
    }

    #[test]
    fn test_apply_rebases_slots() {
        let mut data = vec![0u8; 24];
        data[8..16].copy_from_slice(&16u64.to_be_bytes());
        data[16..24].copy_from_slice(&0xAAu64.to_be_bytes());

        let table: RelocationTable = std::iter::once(8u64).collect();
        table.apply(&mut data, 0x1000, ByteOrder::Big).unwrap();

        assert_eq!(&data[8..16], &0x1010u64.to_be_bytes());
        // Not a slot, left alone
        assert_eq!(&data[16..24], &0xAAu64.to_be_bytes());
    }

    #[test]
    fn test_apply_errors() {
        let table: RelocationTable = std::iter::once(8u64).collect();

        let mut short = vec![0u8; 12];
        assert!(matches!(
            table.apply(&mut short, 1, ByteOrder::Little),
            Err(Error::OutOfBounds)
        ));

        let mut data = vec![0u8; 16];
        data[8..16].copy_from_slice(&u64::MAX.to_le_bytes());
        assert!(matches!(
            table.apply(&mut data, 1, ByteOrder::Little),
            Err(Error::Malformed { .. })
        ));
    }
}
