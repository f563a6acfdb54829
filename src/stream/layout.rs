//! Block layout planning.
//!
//! This module implements the first pass of finalization: every block is closed (if the
//! caller left it open) and assigned its absolute offset in the output as the running total
//! of the aligned sizes before it. Blocks keep their creation order; there is no reordering
//! or compaction, so the only gaps in the output are alignment padding inside blocks.

use crate::{stream::block::Block, utils::to_u64, Result};

/// A region within the output with start and size.
///
/// Each block of a finalized stream occupies exactly one region.
///
/// # Examples
/// ```rust
/// use datastream::BlockRegion;
///
/// let root = BlockRegion::new(0, 16);
/// let next = BlockRegion::new(root.end_offset(), 8);
/// assert!(root.is_adjacent_to(&next));
/// assert!(!root.overlaps(&next));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRegion {
    /// Start offset in the output in bytes from the beginning.
    pub offset: u64,

    /// Size of the region in bytes.
    pub size: u64,
}

impl BlockRegion {
    /// Creates a new region with the specified offset and size.
    #[must_use]
    pub fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    /// Returns the end offset of this region (offset + size).
    #[must_use]
    pub fn end_offset(&self) -> u64 {
        self.offset + self.size
    }

    /// Checks if this region contains the specified offset.
    #[must_use]
    pub fn contains(&self, offset: u64) -> bool {
        offset >= self.offset && offset < self.end_offset()
    }

    /// Checks if this region overlaps with another region.
    #[must_use]
    pub fn overlaps(&self, other: &BlockRegion) -> bool {
        self.offset < other.end_offset() && other.offset < self.end_offset()
    }

    /// Checks if this region is empty (has zero size).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Checks if this region is adjacent to another region.
    ///
    /// Two regions are adjacent if one ends exactly where the other begins.
    #[must_use]
    pub fn is_adjacent_to(&self, other: &BlockRegion) -> bool {
        self.end_offset() == other.offset || other.end_offset() == self.offset
    }
}

/// Closes any open blocks and assigns each block its region in the output.
///
/// Returns one region per block, in the same order as `blocks`.
///
/// # Errors
///
/// Returns an error if a block size cannot be represented as a 64-bit offset.
pub(crate) fn plan_layout(blocks: &mut [Block]) -> Result<Vec<BlockRegion>> {
    let mut regions = Vec::with_capacity(blocks.len());
    let mut implicitly_closed = 0_usize;
    let mut running = 0_u64;

    for block in blocks.iter_mut() {
        let size = match block.size() {
            Some(size) => size,
            None => {
                implicitly_closed += 1;
                block.close()?
            }
        };

        let size = to_u64(size)?;
        let Some(end) = running.checked_add(size) else {
            return Err(malformed_error!(
                "Output size overflows 64 bits at block {}",
                block.identity()
            ));
        };

        regions.push(BlockRegion::new(running, size));
        running = end;
    }

    log::debug!(
        "Planned layout of {} blocks, {} bytes total ({} closed implicitly)",
        regions.len(),
        running,
        implicitly_closed
    );

    Ok(regions)
}
