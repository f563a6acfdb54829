//! Mathematical utility functions.

use crate::Result;

/// Converts a `usize` to `u32`, returning an error if the value exceeds `u32::MAX`.
///
/// Used for the length prefix of strings, which is fixed at 32 bits.
///
/// # Errors
///
/// Returns an error if `value` exceeds `u32::MAX`.
pub fn to_u32(value: usize) -> Result<u32> {
    u32::try_from(value).map_err(|_| malformed_error!("Value {value} exceeds u32::MAX"))
}

/// Converts a `usize` to `u64`, returning an error on targets where that could truncate.
///
/// # Errors
///
/// Returns an error if `value` exceeds `u64::MAX`.
pub fn to_u64(value: usize) -> Result<u64> {
    u64::try_from(value).map_err(|_| malformed_error!("Value {value} exceeds u64::MAX"))
}

/// Checks if a value is a power of two and returns the exponent.
///
/// Returns `Some(n)` if `value == 2^n`, `None` otherwise (including for zero).
///
/// # Examples
///
/// ```rust,ignore
/// assert_eq!(is_power_of_two(1), Some(0));   // 2^0 = 1
/// assert_eq!(is_power_of_two(8), Some(3));   // 2^3 = 8
/// assert_eq!(is_power_of_two(0), None);
/// assert_eq!(is_power_of_two(6), None);
/// ```
#[must_use]
#[allow(clippy::cast_possible_truncation)] // trailing_zeros < 64 for usize
pub fn is_power_of_two(value: usize) -> Option<u8> {
    if value.is_power_of_two() {
        Some(value.trailing_zeros() as u8)
    } else {
        None
    }
}

/// Number of zero bytes needed to bring `len` up to a multiple of `alignment`.
///
/// `alignment` must be a power of two.
#[must_use]
pub fn padding_for(len: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two());
    len.wrapping_neg() & (alignment - 1)
}
