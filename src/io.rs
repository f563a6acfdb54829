//! Byte order configuration and bounds-checked primitive encoding.
//!
//! This module provides the endian-aware reading and writing primitives that every other part
//! of the crate builds on. Blocks use [`to_bytes`] to append values in the stream's byte
//! order, the patch pass uses [`write_at`] to overwrite pointer slots in place, and the
//! relocation table uses [`read_at`] when it is parsed back by a loader.
//!
//! # Key Components
//!
//! - [`ByteOrder`] - Big or little endian, parsed from configuration strings
//! - [`Endian`] - Trait implemented for every primitive integer and float type
//! - [`read`] / [`read_at`] - Bounds-checked reads with offset tracking
//! - [`write`] / [`write_at`] - Bounds-checked writes with offset tracking
//!
//! # Usage Examples
//!
//! ```rust
//! use datastream::io::{read_at, write_at, ByteOrder};
//!
//! let mut data = [0u8; 8];
//! let mut offset = 0;
//!
//! write_at(&mut data, &mut offset, 1u16, ByteOrder::Big)?;
//! write_at(&mut data, &mut offset, 2u16, ByteOrder::Little)?;
//! assert_eq!(offset, 4);
//! assert_eq!(&data[..4], &[0x00, 0x01, 0x02, 0x00]);
//!
//! let mut offset = 0;
//! let first: u16 = read_at(&data, &mut offset, ByteOrder::Big)?;
//! assert_eq!(first, 1);
//! # Ok::<(), datastream::Error>(())
//! ```
//!
//! # Error Handling
//!
//! All reading and writing functions return [`crate::Result`] and fail with
//! [`crate::Error::OutOfBounds`] when the buffer is too short. The offset is only advanced on
//! success.

use strum::{Display, EnumIter, EnumString};

use crate::{Error::OutOfBounds, Result};

/// Byte order applied uniformly to every multi-byte value of a stream.
///
/// Parses from the usual configuration spellings, case-insensitively:
///
/// ```rust
/// use datastream::io::ByteOrder;
///
/// assert_eq!("le".parse::<ByteOrder>().unwrap(), ByteOrder::Little);
/// assert_eq!("Big".parse::<ByteOrder>().unwrap(), ByteOrder::Big);
/// assert_eq!(ByteOrder::Big.to_string(), "big");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, EnumIter)]
#[strum(ascii_case_insensitive)]
pub enum ByteOrder {
    /// Least significant byte first
    #[default]
    #[strum(to_string = "little", serialize = "le", serialize = "little-endian")]
    Little,
    /// Most significant byte first
    #[strum(to_string = "big", serialize = "be", serialize = "big-endian")]
    Big,
}

impl ByteOrder {
    /// The byte order of the target this crate was compiled for.
    #[must_use]
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        }
    }
}

/// Trait for primitive types that can be encoded in either byte order.
///
/// Each implementation defines a `Bytes` associated type that is the fixed-size byte array
/// for that type (e.g. `[u8; 4]` for `u32`).
pub trait Endian: Sized + Copy {
    /// Associated type representing the byte array type for this numeric type.
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Read T from a byte buffer in little-endian
    fn from_le_bytes(bytes: Self::Bytes) -> Self;
    /// Read T from a byte buffer in big-endian
    fn from_be_bytes(bytes: Self::Bytes) -> Self;

    /// Write T to a byte buffer in little-endian
    fn to_le_bytes(self) -> Self::Bytes;
    /// Write T to a byte buffer in big-endian
    fn to_be_bytes(self) -> Self::Bytes;
}

macro_rules! impl_endian {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Endian for $ty {
                type Bytes = [u8; std::mem::size_of::<$ty>()];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }

                fn from_be_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_be_bytes(bytes)
                }

                fn to_le_bytes(self) -> Self::Bytes {
                    <$ty>::to_le_bytes(self)
                }

                fn to_be_bytes(self) -> Self::Bytes {
                    <$ty>::to_be_bytes(self)
                }
            }
        )*
    };
}

impl_endian!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

/// Encodes `value` in the given byte order.
pub fn to_bytes<T: Endian>(value: T, order: ByteOrder) -> T::Bytes {
    match order {
        ByteOrder::Little => value.to_le_bytes(),
        ByteOrder::Big => value.to_be_bytes(),
    }
}

/// Safely reads a value of type `T` from the start of `data`.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes.
pub fn read<T: Endian>(data: &[u8], order: ByteOrder) -> Result<T> {
    let mut offset = 0_usize;
    read_at(data, &mut offset, order)
}

/// Safely reads a value of type `T` at `offset`, advancing `offset` past it.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes.
pub fn read_at<T: Endian>(data: &[u8], offset: &mut usize, order: ByteOrder) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(OutOfBounds);
    };
    if end > data.len() {
        return Err(OutOfBounds);
    }

    let Ok(bytes) = <T::Bytes as TryFrom<&[u8]>>::try_from(&data[*offset..end]) else {
        return Err(OutOfBounds);
    };

    *offset = end;

    Ok(match order {
        ByteOrder::Little => T::from_le_bytes(bytes),
        ByteOrder::Big => T::from_be_bytes(bytes),
    })
}

/// Safely writes `value` at the start of `data`.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes.
pub fn write<T: Endian>(data: &mut [u8], value: T, order: ByteOrder) -> Result<()> {
    let mut offset = 0_usize;
    write_at(data, &mut offset, value, order)
}

/// Safely writes `value` at `offset`, advancing `offset` past it.
///
/// This is how pointer slots are patched during finalization: the slot was reserved with
/// placeholder bytes and is overwritten in place once its target is known.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes.
pub fn write_at<T: Endian>(
    data: &mut [u8],
    offset: &mut usize,
    value: T,
    order: ByteOrder,
) -> Result<()> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(OutOfBounds);
    };
    if end > data.len() {
        return Err(OutOfBounds);
    }

    data[*offset..end].copy_from_slice(to_bytes(value, order).as_ref());
    *offset = end;

    Ok(())
}
