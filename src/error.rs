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
/// Most of these are reported back to the presentation layer as a refused operation, with
/// candidate state and emulated memory left as they were. [`Error::MemoryWrite`] is the
/// exception: it stops a patch batch midway.
///
/// # Error Categories
///
/// ## Filter Input
/// - [`Error::InvalidAddressText`] - Address bound text that is not hexadecimal
///
/// ## Patch Actions
/// - [`Error::UninitializedExecutionContext`] - The emulated core is not running
/// - [`Error::IllegalPatchPrecondition`] - A return-to-caller patch on a branch that does not save LR
/// - [`Error::UnresolvedSymbol`] - A symbol-start patch where the symbol could not be found
/// - [`Error::MemoryWrite`] - The debug interface refused a memory write
/// - [`Error::RowOutOfBounds`] - A row index that does not exist in the current candidate view
///
/// ## Classification
/// - [`Error::UnrecognizedInstruction`] - An encoding that is not one of the twelve branch forms
///
/// ## Snapshots and I/O
/// - [`Error::NothingToPersist`] - Saving was requested while there are no candidates
/// - [`Error::Malformed`] - A snapshot could not be parsed
/// - [`Error::FileError`] - Filesystem I/O errors
/// - [`Error::LockError`] - The exclusive-access guard could not be acquired
///
/// # Examples
///
/// ```rust
/// use branchwatch::{Error, instruction::BranchKind, instruction::Instruction};
///
/// match BranchKind::try_from(Instruction(0x7c08_02a6)) {
///     Ok(kind) => println!("branch: {kind}"),
///     Err(Error::UnrecognizedInstruction(raw)) => println!("not a branch: {raw:08x}"),
///     Err(e) => println!("other error: {e}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// Text supplied for an address bound is not a valid 32-bit hexadecimal number.
    ///
    /// The filter setters never propagate this; they treat it as "bound unset".
    #[error("Invalid address text - {0:?}")]
    InvalidAddressText(String),

    /// A patch action was requested while the emulated core is uninitialized.
    #[error("Core is uninitialized")]
    UninitializedExecutionContext,

    /// A return-to-caller patch was requested for a row whose branch does not save the
    /// link register. The whole batch is refused.
    #[error("Branch at row {row} does not save LR - {instruction:#010x}")]
    IllegalPatchPrecondition {
        /// The first offending row
        row: usize,
        /// The raw instruction of that row
        instruction: u32,
    },

    /// A symbol-start patch was requested for a row whose symbol could not be resolved.
    #[error("No symbol found for row {row}")]
    UnresolvedSymbol {
        /// The first offending row
        row: usize,
    },

    /// The debug interface refused to patch emulated memory at this address.
    #[error("Failed to write instruction at {0:#010x}")]
    MemoryWrite(u32),

    /// The row index does not exist in the current candidate view.
    #[error("Row {0} is out of bounds")]
    RowOutOfBounds(usize),

    /// The encoding is not one of the twelve recognized branch forms.
    ///
    /// Only reachable when the recording engine hands over a non-branch, which is an
    /// upstream contract violation.
    #[error("Unrecognized branch instruction - {0:#010x}")]
    UnrecognizedInstruction(u32),

    /// There are no candidates, so there is nothing to save.
    #[error("There is nothing to save")]
    NothingToPersist,

    /// A snapshot line could not be parsed.
    ///
    /// # Fields
    ///
    /// * `message` - What was wrong with the snapshot
    /// * `file` - Source file that rejected the snapshot
    /// * `line` - Source line that rejected the snapshot
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// What was wrong with the snapshot
        message: String,
        /// Source file that rejected the snapshot
        file: &'static str,
        /// Source line that rejected the snapshot
        line: u32,
    },

    /// Reading or writing a snapshot file failed.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// The exclusive-access guard could not be taken.
    ///
    /// The guard is backed by a mutex, which is poisoned when a thread panics while
    /// recording or patching.
    #[error("Failed to acquire the emulated system guard")]
    LockError,
}
