// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]

//! # datastream
//!
//! A block-based binary layout engine for producing position-independent data images.
//!
//! Callers build an output artifact as a tree of nested blocks. Each block is an append-only
//! byte buffer that keeps every primitive naturally aligned, and any block can hold pointers
//! to any other block (or to a bound position inside one) before the final layout is known.
//! Finalization assigns every block its absolute offset, patches every pointer slot, and
//! produces two outputs:
//!
//! - the **data blob**: all blocks concatenated in creation order
//! - the **relocation table**: the absolute position of every pointer slot, so a loader that
//!   maps the blob at a base address can rebase each stored offset
//!
//! ## Features
//!
//! - **📦 Deferred pointers** - Reference blocks that are still being written, or not yet opened
//! - **📐 Natural alignment** - Every primitive lands at a multiple of its width in the output
//! - **🔀 Either byte order** - One byte order per stream, applied to values, slots and relocations
//! - **🛡️ Typed failures** - Misuse is rejected with an [`Error`], never a panic
//!
//! ## Quick Start
//!
//! ```rust
//! use datastream::prelude::*;
//!
//! let mut stream = Stream::new(StreamConfig::little_endian())?;
//!
//! stream.write_uint32(1)?;
//! let child = stream.open_block()?;
//! stream.close_block()?;
//! stream.write_pointer(child)?;
//!
//! let mut data = Vec::new();
//! let mut relocations = Vec::new();
//! let image = stream.finalize_into(&mut data, &mut relocations)?;
//!
//! assert_eq!(data.len(), 16);
//! assert_eq!(image.read_pointer(8)?, 16);
//! assert_eq!(relocations, 8u64.to_le_bytes());
//! # Ok::<(), datastream::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`Stream`] - Owns all blocks, hands out [`Pointer`] identities, drives finalization
//! - [`Block`] - One aligned, append-only segment of the output
//! - [`Image`] - The finalized data blob with its [`RelocationTable`] and block regions
//! - [`StreamConfig`] - Byte order and block alignment of a stream
//! - [`io`] - Endian-aware primitive encoding shared by all of the above
//! - [`Error`] and [`Result`] - Error handling
//!
//! ## Loading
//!
//! A consumer of the two outputs needs no knowledge of the block structure: it maps the data
//! blob, parses the relocation table with [`RelocationTable::parse`], and adds its base
//! address to each listed slot with [`RelocationTable::apply`].

#[macro_use]
pub(crate) mod error;

pub mod config;
pub mod io;
pub mod prelude;

mod stream;
mod utils;

/// `datastream` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `datastream` Error type
///
/// See [`error::Error`](Error) for the list of failure conditions.
pub use error::Error;

pub use config::StreamConfig;
pub use io::ByteOrder;
pub use stream::{
    Block, BlockRegion, BlockState, Image, Pointer, PointerSlot, RelocationTable, Stream,
    POINTER_SIZE,
};
