//! # datastream Prelude
//!
//! Re-exports everything needed to build, finalize, and load a stream.
//!
//! ```rust
//! use datastream::prelude::*;
//!
//! let stream = Stream::new(StreamConfig::big_endian())?;
//! assert_eq!(stream.byte_order(), ByteOrder::Big);
//! # Ok::<(), Error>(())
//! ```

pub use crate::{Error, Result};

pub use crate::{ByteOrder, StreamConfig};

pub use crate::{Block, BlockState, Pointer, PointerSlot, Stream};

pub use crate::{BlockRegion, Image, RelocationTable};
