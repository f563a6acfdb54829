//! Shared utility functions.

mod math;

pub use math::{is_power_of_two, padding_for, to_u32, to_u64};
