//! Custom error types for the monitoring library.
//!
//! This module defines the primary error type, `MonitorError`, for the crate.
//! Using the `thiserror` crate, it provides a centralized and consistent way
//! to handle the different kinds of failures that can occur, from
//! configuration parsing to geometry misuse.
//!
//! Recoverable conditions — above all a missing input collection in an event —
//! are deliberately *not* represented here. Tasks log a warning and skip the
//! affected source for that event; only genuinely unrecoverable failures
//! (bad configuration, an unregistered task type, lookups against an
//! uninitialized geometry) surface as `MonitorError`.
//!
//! Task and harness glue code uses `anyhow::Result` on top of this enum:
//! typed errors at the library seams, contextual errors in orchestration
//! code.

use thiserror::Error;

/// Convenience alias for results using the library error type.
pub type MonitorResult<T> = std::result::Result<T, MonitorError>;

/// Error type covering all library-level failure modes.
#[derive(Error, Debug)]
pub enum MonitorError {
    /// Configuration file could not be read or parsed.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Semantic error in configuration values that parsed successfully.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// File or terminal I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Store snapshot serialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Channel coordinates outside the detector acceptance.
    #[error("Invalid channel coordinates: ieta={ieta}, iphi={iphi}")]
    InvalidChannel {
        /// Pseudorapidity index as given.
        ieta: i32,
        /// Azimuthal index as given.
        iphi: u32,
    },

    /// Geometry service used before per-run initialization.
    #[error("Geometry error: {0}")]
    Geometry(String),

    /// Requested task type has no registered factory.
    #[error("Unknown task type: {0}")]
    UnknownTask(String),
}
