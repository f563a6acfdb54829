use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// The variants fall into two groups. Precondition violations are programmer errors: the
/// caller asked for something the layout rules forbid, and the offending operation was
/// rejected without touching any state. Resource failures come from the output sinks at the
/// very end of [`crate::Stream::finalize_into`] and leave any partially written output invalid.
///
/// # Error Categories
///
/// ## Precondition Violations
/// - [`Error::InvalidAlignment`] - Alignment is not a power of two, or too small for a block
/// - [`Error::BlockClosed`] - Write or close attempted on a block that is already closed
/// - [`Error::UnbalancedClose`] - `close_block` without a matching `open_block`
/// - [`Error::UnknownPointer`] - Pointer identity was not allocated by this stream
/// - [`Error::PointerAlreadyBound`] - Pointer identity was bound to a location twice
/// - [`Error::UnresolvedPointer`] - A written pointer's target was never bound
///
/// ## Data Errors
/// - [`Error::OutOfBounds`] - A bounds-checked read or write ran past the buffer
/// - [`Error::Malformed`] - Structurally invalid input, such as a truncated relocation table
///
/// ## I/O Errors
/// - [`Error::FileError`] - Sink creation or write failed
/// - [`Error::MmapFailed`] - Memory-mapped file output failed
///
/// # Examples
///
/// ```rust
/// use datastream::{Error, Stream, StreamConfig};
///
/// let mut stream = Stream::new(StreamConfig::default())?;
/// match stream.close_block() {
///     Err(Error::UnbalancedClose) => println!("the root block cannot be closed"),
///     other => panic!("unexpected result: {other:?}"),
/// }
/// # Ok::<(), datastream::Error>(())
/// ```
#[derive(Error, Debug)]
pub enum Error {
    // Precondition violations
    /// An alignment value was rejected.
    ///
    /// Alignments must be non-zero powers of two. Block alignments configured on a stream
    /// must additionally be at least as large as the widest primitive (8 bytes), otherwise
    /// intra-block alignment would not carry over to the final output.
    #[error("Invalid alignment - {0}")]
    InvalidAlignment(usize),

    /// A write or close was attempted on a closed block.
    ///
    /// The associated value is the index of the block's identity pointer.
    #[error("Block {0} is already closed")]
    BlockClosed(usize),

    /// `close_block` was called while only the root block was open.
    #[error("close_block without a matching open_block")]
    UnbalancedClose,

    /// A pointer identity that this stream never allocated was used.
    #[error("Pointer {0} was not allocated by this stream")]
    UnknownPointer(usize),

    /// A pointer identity was bound to a location more than once.
    #[error("Pointer {0} is already bound to a location")]
    PointerAlreadyBound(usize),

    /// A pointer was written into a block but its target was never bound to a location.
    #[error("Pointer {0} was written but never bound to a location")]
    UnresolvedPointer(usize),

    // Data errors
    /// An out of bound access was attempted on a byte buffer.
    #[error("Out of Bound access would have occurred!")]
    OutOfBounds,

    /// The data is damaged and could not be processed.
    ///
    /// Includes the source location where the malformation was detected.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    // I/O errors
    /// File I/O error.
    ///
    /// Wraps failures of the data or relocation sinks.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Memory-mapped output failed.
    #[error("Memory mapping failed - {0}")]
    MmapFailed(String),
}
