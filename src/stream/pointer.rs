//! Pointer identities and the slots that reference them.
//!
//! A [`Pointer`] is a handle handed out by a [`crate::Stream`]. It names a location in the
//! output whose absolute offset is not known until finalization: either the start of a block
//! (the identity returned by [`crate::Stream::open_block`]) or an arbitrary position bound
//! later with [`crate::Stream::bind`]. Writing a pointer into a block reserves an 8-byte
//! [`PointerSlot`] that is patched with the target's absolute offset once the layout is fixed.

use std::fmt;

/// Identity of a deferred reference target.
///
/// Identities are unique and strictly increasing within one stream, and remember the stream
/// that allocated them so they cannot be used with any other. A `Pointer` carries no offset of
/// its own: before finalization it is unresolved, and afterwards its absolute offset is looked
/// up through [`crate::Image::resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pointer {
    stream: usize,
    index: usize,
}

impl Pointer {
    pub(crate) fn new(stream: usize, index: usize) -> Self {
        Self { stream, index }
    }

    /// The stream-wide identity of this pointer.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Process-wide id of the stream that allocated this pointer.
    #[must_use]
    pub fn stream_id(&self) -> usize {
        self.stream
    }
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ptr#{}", self.index)
    }
}

/// An 8-byte placeholder reserved inside a block for a future absolute offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerSlot {
    /// The pointer whose absolute offset will be stored in the slot
    pub target: Pointer,
    /// Offset of the slot from the start of its block
    pub offset: usize,
}

/// Where a pointer identity lands: a block in the stream's arena and an offset inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Location {
    pub block: usize,
    pub offset: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointer_identity() {
        let a = Pointer::new(3, 0);
        let b = Pointer::new(3, 1);

        assert_eq!(a.index(), 0);
        assert_eq!(a.stream_id(), 3);
        assert_ne!(a, b);
        assert!(a < b);
        assert_eq!(b.to_string(), "ptr#1");

        // Same index, different stream
        assert_ne!(a, Pointer::new(4, 0));
    }
}
