//! Alignment-aware append-only byte buffers.
//!
//! A [`Block`] is one contiguous segment of the final output. It is grown only by its own
//! write methods, each of which pads the buffer so that every multi-byte value starts at an
//! offset that is a multiple of its width. Because every block itself starts at a multiple of
//! the stream alignment (at least 8), this intra-block alignment carries over unchanged to the
//! final output.
//!
//! Pointers are not written as values. [`Block::write_pointer`] reserves an 8-byte slot and
//! remembers it as a [`PointerSlot`]; [`Block::finalize_pointers`] later overwrites every slot
//! with the absolute offset of its target.
//!
//! # Lifecycle
//!
//! ```text
//! Writing ──close()──▶ Closed ──finalize_pointers()──▶ Resolved ──emit──▶ Emitted
//! ```
//!
//! Writes are only accepted while [`BlockState::Writing`]; everything else is rejected with
//! [`crate::Error::BlockClosed`] and leaves the block untouched.

use std::mem::size_of;

use strum::Display;

use crate::{
    io::{to_bytes, write_at, ByteOrder, Endian},
    stream::{
        pointer::{Pointer, PointerSlot},
        relocation::RelocationTable,
    },
    utils::{is_power_of_two, padding_for, to_u32, to_u64},
    Error, Result,
};

/// Size in bytes of a pointer slot.
pub const POINTER_SIZE: usize = 8;

/// Lifecycle stage of a [`Block`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum BlockState {
    /// Accepting writes
    Writing,
    /// Size fixed, pointer slots still hold placeholders
    Closed,
    /// Pointer slots hold absolute offsets
    Resolved,
    /// Bytes copied into the finalized output
    Emitted,
}

/// An append-only, alignment-aware byte buffer.
#[derive(Debug, Clone)]
pub struct Block {
    identity: Pointer,
    alignment: usize,
    byte_order: ByteOrder,
    buffer: Vec<u8>,
    pointers: Vec<PointerSlot>,
    state: BlockState,
}

impl Block {
    /// Creates an empty block.
    ///
    /// # Arguments
    ///
    /// * `identity` - The pointer denoting the start of this block
    /// * `byte_order` - Byte order for every multi-byte value
    /// * `alignment` - Padding granularity applied when the block is closed
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidAlignment`] if `alignment` is not a power of two.
    pub fn new(identity: Pointer, byte_order: ByteOrder, alignment: usize) -> Result<Self> {
        if is_power_of_two(alignment).is_none() {
            return Err(Error::InvalidAlignment(alignment));
        }

        Ok(Self {
            identity,
            alignment,
            byte_order,
            buffer: Vec::new(),
            pointers: Vec::new(),
            state: BlockState::Writing,
        })
    }

    /// The pointer denoting the start of this block.
    #[must_use]
    pub fn identity(&self) -> Pointer {
        self.identity
    }

    /// Padding granularity applied at close.
    #[must_use]
    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// Byte order of every multi-byte value in this block.
    #[must_use]
    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    /// Current lifecycle stage.
    #[must_use]
    pub fn state(&self) -> BlockState {
        self.state
    }

    /// Returns `true` once the block no longer accepts writes.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state != BlockState::Writing
    }

    /// Number of bytes written so far, including padding.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns `true` if nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// The aligned size of the block, available once it is closed.
    #[must_use]
    pub fn size(&self) -> Option<usize> {
        self.is_closed().then_some(self.buffer.len())
    }

    /// The bytes written so far.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.buffer
    }

    /// Pointer slots reserved in this block, in write order.
    #[must_use]
    pub fn pointers(&self) -> &[PointerSlot] {
        &self.pointers
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::BlockClosed(self.identity.index()));
        }
        Ok(())
    }

    fn pad(&mut self, n: usize) {
        let gap = padding_for(self.buffer.len(), n);
        self.buffer.resize(self.buffer.len() + gap, 0);
    }

    /// Appends raw bytes verbatim, without alignment.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::BlockClosed`] if the block is closed.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.ensure_writable()?;
        self.buffer.extend_from_slice(bytes);
        Ok(())
    }

    /// Pads the buffer with zero bytes until its length is a multiple of `n`.
    ///
    /// Alignments larger than the block alignment only hold relative to the block start and
    /// are not guaranteed in the final output.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidAlignment`] if `n` is not a power of two, or
    /// [`crate::Error::BlockClosed`] if the block is closed.
    pub fn align(&mut self, n: usize) -> Result<()> {
        if is_power_of_two(n).is_none() {
            return Err(Error::InvalidAlignment(n));
        }
        self.ensure_writable()?;

        if n > self.alignment {
            log::warn!(
                "Aligning block {} to {} exceeds its block alignment of {}",
                self.identity,
                n,
                self.alignment
            );
        }

        self.pad(n);
        Ok(())
    }

    fn write_value<T: Endian>(&mut self, value: T) -> Result<()> {
        self.ensure_writable()?;
        self.pad(size_of::<T>());
        self.buffer
            .extend_from_slice(to_bytes(value, self.byte_order).as_ref());
        Ok(())
    }

    /// Writes an `i8`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::BlockClosed`] if the block is closed.
    pub fn write_int8(&mut self, value: i8) -> Result<()> {
        self.write_value(value)
    }

    /// Writes an `i16`, aligned to 2.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::BlockClosed`] if the block is closed.
    pub fn write_int16(&mut self, value: i16) -> Result<()> {
        self.write_value(value)
    }

    /// Writes an `i32`, aligned to 4.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::BlockClosed`] if the block is closed.
    pub fn write_int32(&mut self, value: i32) -> Result<()> {
        self.write_value(value)
    }

    /// Writes an `i64`, aligned to 8.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::BlockClosed`] if the block is closed.
    pub fn write_int64(&mut self, value: i64) -> Result<()> {
        self.write_value(value)
    }

    /// Writes a `u8`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::BlockClosed`] if the block is closed.
    pub fn write_uint8(&mut self, value: u8) -> Result<()> {
        self.write_value(value)
    }

    /// Writes a `u16`, aligned to 2.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::BlockClosed`] if the block is closed.
    pub fn write_uint16(&mut self, value: u16) -> Result<()> {
        self.write_value(value)
    }

    /// Writes a `u32`, aligned to 4.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::BlockClosed`] if the block is closed.
    pub fn write_uint32(&mut self, value: u32) -> Result<()> {
        self.write_value(value)
    }

    /// Writes a `u64`, aligned to 8.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::BlockClosed`] if the block is closed.
    pub fn write_uint64(&mut self, value: u64) -> Result<()> {
        self.write_value(value)
    }

    /// Writes an `f32` by its IEEE-754 bits, aligned to 4.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::BlockClosed`] if the block is closed.
    pub fn write_float32(&mut self, value: f32) -> Result<()> {
        self.write_value(value)
    }

    /// Writes an `f64` by its IEEE-754 bits, aligned to 8.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::BlockClosed`] if the block is closed.
    pub fn write_float64(&mut self, value: f64) -> Result<()> {
        self.write_value(value)
    }

    /// Writes a length-prefixed string.
    ///
    /// Aligns to 4, writes the byte count as a `u32`, then the bytes themselves without
    /// alignment or terminator. The bytes are opaque; no encoding is checked.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::BlockClosed`] if the block is closed, or
    /// [`crate::Error::Malformed`] if the string is longer than `u32::MAX` bytes.
    pub fn write_string<S: AsRef<[u8]>>(&mut self, s: S) -> Result<()> {
        let bytes = s.as_ref();
        let len = to_u32(bytes.len())?;

        self.write_uint32(len)?;
        self.buffer.extend_from_slice(bytes);
        Ok(())
    }

    /// Reserves an 8-byte slot for the absolute offset of `target`.
    ///
    /// Aligns to 8, records the slot position, and writes placeholder zeros. Returns the slot
    /// offset within this block.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::BlockClosed`] if the block is closed.
    pub fn write_pointer(&mut self, target: Pointer) -> Result<usize> {
        self.ensure_writable()?;
        self.pad(POINTER_SIZE);

        let offset = self.buffer.len();
        self.pointers.push(PointerSlot { target, offset });
        self.buffer.resize(offset + POINTER_SIZE, 0);

        Ok(offset)
    }

    /// Freezes the block, padding it with zero bytes to the block alignment.
    ///
    /// Returns the final size.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::BlockClosed`] if the block was already closed; the block is
    /// left unchanged.
    pub fn close(&mut self) -> Result<usize> {
        self.ensure_writable()?;

        self.pad(self.alignment);
        self.state = BlockState::Closed;

        log::trace!("Closed block {} with size {}", self.identity, self.buffer.len());
        Ok(self.buffer.len())
    }

    /// Overwrites every pointer slot with the absolute offset of its target.
    ///
    /// `resolve` maps a target pointer to its absolute offset in the output. For each slot,
    /// the slot's own absolute position (`base_offset` plus the slot offset) is recorded in
    /// `registry`.
    ///
    /// # Arguments
    ///
    /// * `base_offset` - Absolute offset of this block in the output
    /// * `resolve` - Supplies the absolute offset of a target pointer
    /// * `registry` - Collects the absolute positions of all patched slots
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the block is not in the closed state, or any
    /// error returned by `resolve`. Slots are only patched once every target has resolved.
    pub fn finalize_pointers<F>(
        &mut self,
        base_offset: u64,
        mut resolve: F,
        registry: &mut RelocationTable,
    ) -> Result<()>
    where
        F: FnMut(Pointer) -> Result<u64>,
    {
        if self.state != BlockState::Closed {
            return Err(malformed_error!(
                "Block {} must be closed before its pointers are resolved, found {}",
                self.identity,
                self.state
            ));
        }

        let mut resolved = Vec::with_capacity(self.pointers.len());
        for slot in &self.pointers {
            resolved.push((slot.offset, resolve(slot.target)?));
        }

        for (slot_offset, target) in resolved {
            let mut cursor = slot_offset;
            write_at(&mut self.buffer, &mut cursor, target, self.byte_order)?;
            registry.insert(base_offset + to_u64(slot_offset)?);
        }

        self.state = BlockState::Resolved;
        Ok(())
    }

    /// Appends the resolved bytes to `out` and marks the block emitted.
    pub(crate) fn emit(&mut self, out: &mut Vec<u8>) -> Result<()> {
        if self.state != BlockState::Resolved {
            return Err(malformed_error!(
                "Block {} must be resolved before it is emitted, found {}",
                self.identity,
                self.state
            ));
        }

        out.extend_from_slice(&self.buffer);
        self.state = BlockState::Emitted;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    fn block(order: ByteOrder) -> Block {
        Block::new(Pointer::new(0, 0), order, 8).unwrap()
    }

    #[test]
    fn test_new_rejects_bad_alignment() {
        assert!(matches!(
            Block::new(Pointer::new(0, 0), ByteOrder::Little, 3),
            Err(Error::InvalidAlignment(3))
        ));
        assert!(matches!(
            Block::new(Pointer::new(0, 0), ByteOrder::Little, 0),
            Err(Error::InvalidAlignment(0))
        ));
    }

    #[test]
    fn test_write_bytes_is_unaligned() {
        let mut b = block(ByteOrder::Little);
        b.write_bytes(&[1, 2, 3]).unwrap();
        b.write_bytes(&[4]).unwrap();
        assert_eq!(b.data(), &[1, 2, 3, 4]);
        assert_eq!(b.state(), BlockState::Writing);
        assert_eq!(b.size(), None);
    }

    #[test]
    fn test_primitives_are_naturally_aligned() {
        let mut b = block(ByteOrder::Little);
        b.write_uint8(0xAA).unwrap();
        b.write_uint16(0x1122).unwrap();
        b.write_uint8(0xBB).unwrap();
        b.write_uint32(0x3344_5566).unwrap();
        b.write_int8(-1).unwrap();
        b.write_int64(-2).unwrap();

        assert_eq!(
            b.data(),
            &[
                0xAA, 0x00, 0x22, 0x11, // u8, pad, u16
                0xBB, 0x00, 0x00, 0x00, // u8, pad to 4
                0x66, 0x55, 0x44, 0x33, // u32
                0xFF, 0x00, 0x00, 0x00, // i8, pad to 8
                0xFE, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, // i64
            ]
        );
    }

    #[test]
    fn test_byte_order_applied() {
        for order in ByteOrder::iter() {
            let mut b = block(order);
            b.write_int32(0x0102_0304).unwrap();
            b.write_float64(2.5).unwrap();
            b.write_uint16(0xBEEF).unwrap();
            b.write_int16(-2).unwrap();
            b.write_float32(-0.5).unwrap();
            b.write_uint64(7).unwrap();

            let mut expected = Vec::new();
            match order {
                ByteOrder::Little => {
                    expected.extend_from_slice(&0x0102_0304i32.to_le_bytes());
                    expected.extend_from_slice(&[0; 4]);
                    expected.extend_from_slice(&2.5f64.to_le_bytes());
                    expected.extend_from_slice(&0xBEEFu16.to_le_bytes());
                    expected.extend_from_slice(&(-2i16).to_le_bytes());
                    expected.extend_from_slice(&(-0.5f32).to_le_bytes());
                    expected.extend_from_slice(&7u64.to_le_bytes());
                }
                ByteOrder::Big => {
                    expected.extend_from_slice(&0x0102_0304i32.to_be_bytes());
                    expected.extend_from_slice(&[0; 4]);
                    expected.extend_from_slice(&2.5f64.to_be_bytes());
                    expected.extend_from_slice(&0xBEEFu16.to_be_bytes());
                    expected.extend_from_slice(&(-2i16).to_be_bytes());
                    expected.extend_from_slice(&(-0.5f32).to_be_bytes());
                    expected.extend_from_slice(&7u64.to_be_bytes());
                }
            }
            assert_eq!(b.data(), expected.as_slice(), "byte order {order}");
        }
    }

    #[test]
    fn test_write_string() {
        let mut b = block(ByteOrder::Big);
        b.write_uint8(9).unwrap();
        b.write_string("héllo").unwrap();

        // "héllo" is 6 bytes in UTF-8
        assert_eq!(&b.data()[..4], &[9, 0, 0, 0]);
        assert_eq!(&b.data()[4..8], &[0, 0, 0, 6]);
        assert_eq!(&b.data()[8..], "héllo".as_bytes());

        b.write_string(b"").unwrap();
        assert_eq!(b.len(), 14 + 2 + 4);
    }

    #[test]
    fn test_align() {
        let mut b = block(ByteOrder::Little);
        b.write_uint8(1).unwrap();
        b.align(4).unwrap();
        assert_eq!(b.len(), 4);
        b.align(4).unwrap();
        assert_eq!(b.len(), 4);
        b.align(1).unwrap();
        assert_eq!(b.len(), 4);

        assert!(matches!(b.align(6), Err(Error::InvalidAlignment(6))));
        assert!(matches!(b.align(0), Err(Error::InvalidAlignment(0))));
        assert_eq!(b.len(), 4);
    }

    #[test]
    fn test_write_pointer_reserves_slot() {
        let mut b = block(ByteOrder::Little);
        b.write_uint32(1).unwrap();

        let offset = b.write_pointer(Pointer::new(0, 5)).unwrap();
        assert_eq!(offset, 8);
        assert_eq!(b.len(), 16);
        assert_eq!(&b.data()[8..], &[0u8; 8]);
        assert_eq!(
            b.pointers(),
            &[PointerSlot {
                target: Pointer::new(0, 5),
                offset: 8
            }]
        );
    }

    #[test]
    fn test_close_pads_and_freezes() {
        let mut b = block(ByteOrder::Little);
        b.write_uint8(1).unwrap();

        assert_eq!(b.close().unwrap(), 8);
        assert_eq!(b.size(), Some(8));
        assert_eq!(b.data(), &[1, 0, 0, 0, 0, 0, 0, 0]);
        assert!(b.is_closed());

        assert!(matches!(b.write_uint8(2), Err(Error::BlockClosed(0))));
        assert!(matches!(b.write_bytes(&[2]), Err(Error::BlockClosed(0))));
        assert!(matches!(b.write_string("x"), Err(Error::BlockClosed(0))));
        assert!(matches!(
            b.write_pointer(Pointer::new(0, 1)),
            Err(Error::BlockClosed(0))
        ));
        assert!(matches!(b.align(4), Err(Error::BlockClosed(0))));
        assert_eq!(b.len(), 8);
    }

    #[test]
    fn test_close_twice_is_rejected() {
        let mut b = block(ByteOrder::Little);
        b.write_uint16(3).unwrap();
        b.close().unwrap();
        let before = b.data().to_vec();

        assert!(matches!(b.close(), Err(Error::BlockClosed(0))));
        assert_eq!(b.size(), Some(8));
        assert_eq!(b.data(), before.as_slice());
    }

    #[test]
    fn test_close_empty_block() {
        let mut b = block(ByteOrder::Little);
        assert_eq!(b.close().unwrap(), 0);
        assert_eq!(b.size(), Some(0));
    }

    #[test]
    fn test_finalize_pointers_patches_slots() {
        let mut b = block(ByteOrder::Big);
        b.write_uint32(1).unwrap();
        b.write_pointer(Pointer::new(0, 1)).unwrap();
        b.write_pointer(Pointer::new(0, 2)).unwrap();
        b.close().unwrap();

        let mut registry = RelocationTable::new();
        b.finalize_pointers(
            64,
            |ptr| Ok(100 * ptr.index() as u64),
            &mut registry,
        )
        .unwrap();

        assert_eq!(b.state(), BlockState::Resolved);
        assert_eq!(&b.data()[8..16], &100u64.to_be_bytes());
        assert_eq!(&b.data()[16..24], &200u64.to_be_bytes());
        assert_eq!(registry.iter().collect::<Vec<_>>(), vec![72, 80]);
    }

    #[test]
    fn test_finalize_pointers_requires_closed() {
        let mut b = block(ByteOrder::Little);
        let mut registry = RelocationTable::new();
        let result = b.finalize_pointers(0, |_| Ok(0), &mut registry);
        assert!(matches!(result, Err(Error::Malformed { .. })));
    }

    #[test]
    fn test_finalize_pointers_resolve_failure_leaves_slots() {
        let mut b = block(ByteOrder::Little);
        b.write_pointer(Pointer::new(0, 1)).unwrap();
        b.write_pointer(Pointer::new(0, 2)).unwrap();
        b.close().unwrap();

        let mut registry = RelocationTable::new();
        let result = b.finalize_pointers(
            0,
            |ptr| {
                if ptr.index() == 2 {
                    Err(Error::UnresolvedPointer(2))
                } else {
                    Ok(8)
                }
            },
            &mut registry,
        );

        assert!(matches!(result, Err(Error::UnresolvedPointer(2))));
        assert_eq!(b.state(), BlockState::Closed);
        assert_eq!(b.data(), &[0u8; 16]);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_emit() {
        let mut b = block(ByteOrder::Little);
        b.write_uint8(7).unwrap();

        let mut out = Vec::new();
        assert!(b.emit(&mut out).is_err());

        b.close().unwrap();
        b.finalize_pointers(0, |_| Ok(0), &mut RelocationTable::new())
            .unwrap();
        b.emit(&mut out).unwrap();

        assert_eq!(b.state(), BlockState::Emitted);
        assert_eq!(out, vec![7, 0, 0, 0, 0, 0, 0, 0]);
    }
}
