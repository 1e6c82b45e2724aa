//! Custom error types for dupmark operations.

use thiserror::Error;

/// Result type alias for dupmark operations
pub type Result<T> = std::result::Result<T, DupmarkError>;

/// Error type for dupmark operations
#[derive(Error, Debug)]
pub enum DupmarkError {
    /// Invalid parameter value provided
    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        /// The parameter name
        parameter: String,
        /// Explanation of why it's invalid
        reason: String,
    },

    /// Input records are not in ascending coordinate order
    #[error(
        "input is not coordinate sorted: record '{name}' at {reference}:{position} \
         follows {prev_reference}:{prev_position}"
    )]
    NotCoordinateSorted {
        /// Name of the out-of-order record
        name: String,
        /// Reference id of the out-of-order record (-1 when unplaced)
        reference: i32,
        /// 0-based position of the out-of-order record
        position: i32,
        /// Reference id of the preceding record
        prev_reference: i32,
        /// 0-based position of the preceding record
        prev_position: i32,
    },

    /// Input already carries duplicate flags and `--force` was not given
    #[error(
        "record '{name}' is already duplicate marked; \
         rerun with --force to clear existing flags and mark from scratch"
    )]
    AlreadyMarked {
        /// Name of the first flagged record encountered
        name: String,
    },

    /// The header declares more distinct libraries than the 8-bit id can hold
    #[error("{count} distinct libraries in header; at most 255 are supported")]
    TooManyLibraries {
        /// Number of distinct libraries found
        count: usize,
    },

    /// Compressed input is missing its trailing BGZF EOF block
    #[error("missing BGZF EOF block in '{path}' (use --noeof to skip this check)")]
    MissingEofBlock {
        /// Path to the offending file
        path: String,
    },

    /// A record violates structural expectations of the BAM format
    #[error("malformed record '{name}': {reason}")]
    MalformedRecord {
        /// Read name of the offending record
        name: String,
        /// Explanation of the problem
        reason: String,
    },
}
