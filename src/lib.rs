//! # crmsync
//!
//! Windowed list synchronization and similarity ranking for CRM panels that
//! render inside a webmail page while a background process owns the data.
//!
//! The crate carries the two data-management cores of such a panel:
//!
//! - **Windowed list synchronization**: a bounded, ordered window over a much
//!   larger remote record set, grown and shrunk as the user scrolls, with at
//!   most one outstanding fetch per edge and stale-page detection.
//! - **Similarity merge ranking**: per-index match results (email, phone,
//!   name) fused into one deduplicated, score-ordered candidate list that
//!   decides whether an external contact links to an existing record.
//!
//! ## Example
//!
//! ```rust,ignore
//! use crmsync::services::{IndexWeights, IndexMatches, SimilarityMerger};
//!
//! let merger = SimilarityMerger::new(IndexWeights::standard());
//! let ranked = merger.merge(&[
//!     IndexMatches::new("email", vec![contact.clone()]),
//!     IndexMatches::new("phone", vec![contact]),
//! ]);
//! assert!((ranked[0].score - 1.5).abs() < f32::EPSILON);
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod channel;
pub mod config;
pub mod models;
pub mod observability;
pub mod services;

// Re-exports for convenience
pub use channel::{Channel, MemoryChannel};
pub use config::CrmSyncConfig;
pub use models::{
    CacheEvent, CachePhase, Cursor, Direction, FetchState, ListSelection, ModuleName, OrderKey,
    Record, RecordId, SimilarityCandidate, SortIndex, SortOrder, WindowSnapshot,
};
pub use services::{
    CacheInvalidationListener, FetchCoordinator, ListSynchronizer, ScrollPolicy,
    SimilarityMerger, WindowBuffer,
};

/// Error type for crmsync operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When | Recovery |
/// |---------|-------------|----------|
/// | `TransportFailure` | Channel rejected a request or returned a malformed reply | Retry on next scroll |
/// | `StaleFetch` | A page does not continue the window edge | Window is reset |
/// | `UnknownIndex` | A match set names an index with no weight | Skipped with a warning |
/// | `InvalidDirection` | A direction string is neither forward nor backward | Programmer error |
/// | `InvalidInput` | Malformed selection, config value or CLI input | Fix the input |
/// | `OperationFailed` | I/O or initialization failure | Depends on operation |
///
/// No variant is fatal to the host process: the worst outcome of any of them
/// is an empty or refreshed list.
#[derive(Debug, ThisError)]
pub enum Error {
    /// The request/response channel failed.
    ///
    /// Raised when:
    /// - The background process rejects or drops a request
    /// - The reply cannot be decoded into the expected shape
    #[error("transport failure on '{request}': {cause}")]
    TransportFailure {
        /// The request name that failed.
        request: String,
        /// The underlying cause.
        cause: String,
    },

    /// A fetched page does not continue the current window edge.
    ///
    /// The remote set shifted between the last known edge and the fetch
    /// (an upstream insertion or deletion). The window must be discarded.
    #[error("stale fetch at {direction} edge: {reason}")]
    StaleFetch {
        /// The edge the page was meant to attach to.
        direction: Direction,
        /// Why contiguity failed.
        reason: String,
    },

    /// A similarity result referenced an index with no weight.
    #[error("unknown similarity index: {0}")]
    UnknownIndex(String),

    /// A direction argument could not be interpreted.
    #[error("invalid direction: {0}")]
    InvalidDirection(String),

    /// Invalid input was provided.
    ///
    /// Raised when:
    /// - A sort index or order string is not recognized
    /// - A configuration value is out of range
    /// - A CLI input file has the wrong shape
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    ///
    /// Raised when:
    /// - Configuration or input files cannot be read
    /// - Logging initialization fails
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

impl Error {
    /// Returns `true` for errors that force the window back to empty.
    #[must_use]
    pub const fn is_stale(&self) -> bool {
        matches!(self, Self::StaleFetch { .. })
    }

    /// Returns `true` for errors a later user action may succeed on.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::TransportFailure { .. } | Self::StaleFetch { .. })
    }
}

/// Result type alias for crmsync operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current Unix timestamp in seconds.
///
/// Uses `SystemTime::now()` with fallback to 0 if the system clock is before
/// the Unix epoch.
#[must_use]
pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidInput("test error".to_string());
        assert_eq!(err.to_string(), "invalid input: test error");

        let err = Error::TransportFailure {
            request: "list-records".to_string(),
            cause: "disconnected".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "transport failure on 'list-records': disconnected"
        );

        let err = Error::StaleFetch {
            direction: Direction::Forward,
            reason: "gap".to_string(),
        };
        assert_eq!(err.to_string(), "stale fetch at forward edge: gap");
    }

    #[test]
    fn test_error_classification() {
        let stale = Error::StaleFetch {
            direction: Direction::Backward,
            reason: "shifted".to_string(),
        };
        assert!(stale.is_stale());
        assert!(stale.is_retryable());

        let unknown = Error::UnknownIndex("fax".to_string());
        assert!(!unknown.is_stale());
        assert!(!unknown.is_retryable());
    }
}
