//! Block allocation, pointer resolution, and output emission.
//!
//! This module implements the [`Stream`]: the owner of every [`Block`] of one output
//! artifact and the allocator of [`Pointer`] identities. Callers write through the stream,
//! which forwards each primitive write to its current block, and finish with one of the
//! finalize methods.
//!
//! # Architecture
//!
//! Blocks live in an arena (`Vec<Block>`) in creation order, which is also the order they
//! appear in the output. Pointer identities are indices into a parallel table of target
//! locations, so blocks can reference blocks that do not exist yet without any ownership
//! cycles.
//!
//! ```text
//! ┌──────────────────┐
//! │  Write Phase     │ ── open/close blocks, write primitives and pointer slots
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │  Layout Pass     │ ── close open blocks, assign each block its absolute offset
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │  Patch Pass      │ ── overwrite every slot with its target's absolute offset,
//! │                  │    record the slot position in the relocation table
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │  Emit            │ ── data blob and relocation table to their sinks
//! └──────────────────┘
//! ```
//!
//! # Nesting
//!
//! [`Stream::open_block`] pushes the current block on a stack and redirects all writes to a
//! fresh block; [`Stream::close_block`] closes it and pops back. The root block is never
//! closed explicitly; finalization closes it, along with anything else left open.
//!
//! # Usage Examples
//!
//! ```rust
//! use datastream::{Stream, StreamConfig};
//!
//! let mut stream = Stream::new(StreamConfig::little_endian())?;
//!
//! let child = stream.open_block()?;
//! stream.write_string("child")?;
//! stream.close_block()?;
//!
//! stream.write_uint32(1)?;
//! stream.write_pointer(child)?;
//!
//! let image = stream.finalize()?;
//! assert_eq!(image.read_pointer(8)?, 16);
//! assert_eq!(image.relocations().iter().collect::<Vec<_>>(), vec![8]);
//! # Ok::<(), datastream::Error>(())
//! ```

mod block;
mod image;
mod layout;
mod output;
mod pointer;
mod relocation;

pub use block::{Block, BlockState, POINTER_SIZE};
pub use image::Image;
pub use layout::BlockRegion;
pub use pointer::{Pointer, PointerSlot};
pub use relocation::RelocationTable;

use std::{
    io::Write,
    path::Path,
    sync::atomic::{AtomicUsize, Ordering},
};

use crate::{
    config::StreamConfig,
    io::ByteOrder,
    stream::{layout::plan_layout, pointer::Location},
    utils::to_u64,
    Error, Result,
};

static NEXT_STREAM_ID: AtomicUsize = AtomicUsize::new(1);

/// Single-writer layout engine for one output artifact.
#[derive(Debug)]
pub struct Stream {
    /// Process-wide id stamped into every pointer this stream allocates
    id: usize,
    config: StreamConfig,
    blocks: Vec<Block>,
    /// Target location of every allocated pointer identity, indexed by identity
    targets: Vec<Option<Location>>,
    current: usize,
    stack: Vec<usize>,
}

impl Stream {
    /// Creates a stream with its root block open and current.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidAlignment`] if the configuration is invalid.
    pub fn new(config: StreamConfig) -> Result<Self> {
        config.validate()?;

        let mut stream = Self {
            id: NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed),
            config,
            blocks: Vec::new(),
            targets: Vec::new(),
            current: 0,
            stack: Vec::new(),
        };
        stream.allocate_block()?;

        Ok(stream)
    }

    /// The configuration this stream was created with.
    #[must_use]
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Byte order applied to every block.
    #[must_use]
    pub fn byte_order(&self) -> ByteOrder {
        self.config.byte_order
    }

    /// Identity of the root block, the first block of the output.
    #[must_use]
    pub fn root(&self) -> Pointer {
        self.blocks[0].identity()
    }

    /// Identity of the block that currently receives writes.
    #[must_use]
    pub fn current(&self) -> Pointer {
        self.blocks[self.current].identity()
    }

    /// Number of blocks opened on top of the root that have not been closed yet.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Number of blocks allocated so far, including the root.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Number of pointer identities allocated so far.
    #[must_use]
    pub fn pointer_count(&self) -> usize {
        self.targets.len()
    }

    /// Looks up a block by its identity.
    ///
    /// Returns `None` if `ptr` is not the identity of a block of this stream.
    #[must_use]
    pub fn block(&self, ptr: Pointer) -> Option<&Block> {
        self.check_owned(ptr).ok()?;
        let location = self.targets.get(ptr.index()).copied().flatten()?;
        let block = &self.blocks[location.block];
        (block.identity() == ptr).then_some(block)
    }

    /// Iterates over all blocks in creation order.
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter()
    }

    /// Process-wide id of this stream, shared by every pointer it allocates.
    #[must_use]
    pub fn id(&self) -> usize {
        self.id
    }

    /// Rejects pointers allocated by another stream or never allocated at all.
    fn check_owned(&self, ptr: Pointer) -> Result<()> {
        if ptr.stream_id() != self.id || ptr.index() >= self.targets.len() {
            return Err(Error::UnknownPointer(ptr.index()));
        }
        Ok(())
    }

    /// Allocates a fresh, unbound pointer identity.
    ///
    /// The pointer can be written into blocks right away and bound to a location later with
    /// [`Stream::bind`], which makes forward references possible.
    pub fn new_pointer(&mut self) -> Pointer {
        let ptr = Pointer::new(self.id, self.targets.len());
        self.targets.push(None);
        ptr
    }

    /// Binds `ptr` to the current write position of the current block.
    ///
    /// No alignment is applied; align first if the target needs it.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::UnknownPointer`] if this stream did not allocate `ptr`, or
    /// [`crate::Error::PointerAlreadyBound`] if it is already bound.
    pub fn bind(&mut self, ptr: Pointer) -> Result<()> {
        self.check_owned(ptr)?;

        let location = Location {
            block: self.current,
            offset: self.blocks[self.current].len(),
        };

        let slot = &mut self.targets[ptr.index()];
        if slot.is_some() {
            return Err(Error::PointerAlreadyBound(ptr.index()));
        }

        *slot = Some(location);
        Ok(())
    }

    fn allocate_block(&mut self) -> Result<Pointer> {
        let identity = self.new_pointer();
        let block = Block::new(identity, self.config.byte_order, self.config.alignment)?;

        self.targets[identity.index()] = Some(Location {
            block: self.blocks.len(),
            offset: 0,
        });
        self.blocks.push(block);

        Ok(identity)
    }

    /// Opens a new block and makes it current.
    ///
    /// The previous current block is pushed on the stack and becomes current again after the
    /// matching [`Stream::close_block`]. Returns the new block's identity, which other blocks
    /// can reference with [`Stream::write_pointer`].
    ///
    /// # Errors
    ///
    /// Returns an error if the block cannot be created.
    pub fn open_block(&mut self) -> Result<Pointer> {
        let identity = self.allocate_block()?;

        self.stack.push(self.current);
        self.current = self.blocks.len() - 1;

        log::trace!("Opened block {} at depth {}", identity, self.stack.len());
        Ok(identity)
    }

    /// Closes the current block and returns to the block that was current before it.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::UnbalancedClose`] if no block is open on top of the root.
    pub fn close_block(&mut self) -> Result<()> {
        let Some(&previous) = self.stack.last() else {
            return Err(Error::UnbalancedClose);
        };

        self.blocks[self.current].close()?;
        self.stack.pop();
        self.current = previous;

        Ok(())
    }

    fn current_block(&mut self) -> &mut Block {
        &mut self.blocks[self.current]
    }

    /// Appends raw bytes to the current block, without alignment.
    ///
    /// # Errors
    ///
    /// See [`Block::write_bytes`].
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.current_block().write_bytes(bytes)
    }

    /// Pads the current block to a multiple of `n`.
    ///
    /// # Errors
    ///
    /// See [`Block::align`].
    pub fn align(&mut self, n: usize) -> Result<()> {
        self.current_block().align(n)
    }

    /// Writes an `i8` to the current block.
    ///
    /// # Errors
    ///
    /// See [`Block::write_int8`].
    pub fn write_int8(&mut self, value: i8) -> Result<()> {
        self.current_block().write_int8(value)
    }

    /// Writes an `i16` to the current block.
    ///
    /// # Errors
    ///
    /// See [`Block::write_int16`].
    pub fn write_int16(&mut self, value: i16) -> Result<()> {
        self.current_block().write_int16(value)
    }

    /// Writes an `i32` to the current block.
    ///
    /// # Errors
    ///
    /// See [`Block::write_int32`].
    pub fn write_int32(&mut self, value: i32) -> Result<()> {
        self.current_block().write_int32(value)
    }

    /// Writes an `i64` to the current block.
    ///
    /// # Errors
    ///
    /// See [`Block::write_int64`].
    pub fn write_int64(&mut self, value: i64) -> Result<()> {
        self.current_block().write_int64(value)
    }

    /// Writes a `u8` to the current block.
    ///
    /// # Errors
    ///
    /// See [`Block::write_uint8`].
    pub fn write_uint8(&mut self, value: u8) -> Result<()> {
        self.current_block().write_uint8(value)
    }

    /// Writes a `u16` to the current block.
    ///
    /// # Errors
    ///
    /// See [`Block::write_uint16`].
    pub fn write_uint16(&mut self, value: u16) -> Result<()> {
        self.current_block().write_uint16(value)
    }

    /// Writes a `u32` to the current block.
    ///
    /// # Errors
    ///
    /// See [`Block::write_uint32`].
    pub fn write_uint32(&mut self, value: u32) -> Result<()> {
        self.current_block().write_uint32(value)
    }

    /// Writes a `u64` to the current block.
    ///
    /// # Errors
    ///
    /// See [`Block::write_uint64`].
    pub fn write_uint64(&mut self, value: u64) -> Result<()> {
        self.current_block().write_uint64(value)
    }

    /// Writes an `f32` to the current block.
    ///
    /// # Errors
    ///
    /// See [`Block::write_float32`].
    pub fn write_float32(&mut self, value: f32) -> Result<()> {
        self.current_block().write_float32(value)
    }

    /// Writes an `f64` to the current block.
    ///
    /// # Errors
    ///
    /// See [`Block::write_float64`].
    pub fn write_float64(&mut self, value: f64) -> Result<()> {
        self.current_block().write_float64(value)
    }

    /// Writes a length-prefixed string to the current block.
    ///
    /// # Errors
    ///
    /// See [`Block::write_string`].
    pub fn write_string<S: AsRef<[u8]>>(&mut self, s: S) -> Result<()> {
        self.current_block().write_string(s)
    }

    /// Reserves a slot in the current block for the absolute offset of `target`.
    ///
    /// `target` may be a block identity or a pointer from [`Stream::new_pointer`]; it does
    /// not have to be bound yet, but must be bound before finalization.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::UnknownPointer`] if this stream did not allocate `target`,
    /// otherwise see [`Block::write_pointer`].
    pub fn write_pointer(&mut self, target: Pointer) -> Result<()> {
        self.check_owned(target)?;
        self.current_block().write_pointer(target)?;
        Ok(())
    }

    /// Lays out and patches every block, producing the finished [`Image`].
    ///
    /// Consumes the stream. Blocks still open are closed first.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::UnresolvedPointer`] if a written pointer was never bound.
    pub fn finalize(mut self) -> Result<Image> {
        if !self.stack.is_empty() {
            log::debug!(
                "Finalizing with {} nested blocks still open",
                self.stack.len()
            );
        }

        // Layout pass
        let regions = plan_layout(&mut self.blocks)?;

        let mut targets = Vec::with_capacity(self.targets.len());
        for location in &self.targets {
            targets.push(match location {
                Some(location) => Some(regions[location.block].offset + to_u64(location.offset)?),
                None => None,
            });
        }

        // Patch pass
        let mut relocations = RelocationTable::new();
        for (block, region) in self.blocks.iter_mut().zip(&regions) {
            block.finalize_pointers(
                region.offset,
                |ptr| {
                    targets
                        .get(ptr.index())
                        .copied()
                        .flatten()
                        .ok_or(Error::UnresolvedPointer(ptr.index()))
                },
                &mut relocations,
            )?;
        }

        let total = regions.last().map_or(0, BlockRegion::end_offset);
        let mut data = Vec::with_capacity(usize::try_from(total).unwrap_or(0));
        for block in &mut self.blocks {
            block.emit(&mut data)?;
        }

        log::debug!(
            "Resolved {} pointer slots across {} blocks",
            relocations.len(),
            self.blocks.len()
        );

        Ok(Image {
            data,
            relocations,
            regions,
            targets,
            stream_id: self.id,
            byte_order: self.config.byte_order,
        })
    }

    /// Finalizes the stream and writes the result to two sinks.
    ///
    /// The data blob goes to `data_sink`, the relocation table to `reloc_sink`. The finished
    /// image is returned for inspection.
    ///
    /// # Errors
    ///
    /// Any error of [`Stream::finalize`] or [`Image::write_to`].
    pub fn finalize_into<D, R>(self, data_sink: &mut D, reloc_sink: &mut R) -> Result<Image>
    where
        D: Write + ?Sized,
        R: Write + ?Sized,
    {
        let image = self.finalize()?;
        image.write_to(data_sink, reloc_sink)?;
        Ok(image)
    }

    /// Finalizes the stream and writes the result to two files.
    ///
    /// # Errors
    ///
    /// Any error of [`Stream::finalize`] or [`Image::write_to_files`].
    pub fn finalize_to_files<P, Q>(self, data_path: P, reloc_path: Q) -> Result<Image>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        let image = self.finalize()?;
        image.write_to_files(data_path, reloc_path)?;
        Ok(image)
    }
}
