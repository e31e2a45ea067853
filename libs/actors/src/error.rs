//! Runtime Error Types
//!
//! Configuration mistakes (duplicate prefixes, foreign addresses, malformed
//! addresses) surface synchronously as [`RuntimeError`]. Per-message delivery
//! failures never do: they are logged on the thread that hit them and the
//! message is dropped.

use courier_types::AddressError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Main runtime error type
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Invalid wiring or arguments, reported at the call site
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    #[error("Address error: {0}")]
    Address(#[from] AddressError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Checkpoint or message (de)serialization failed
    #[error("Codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// No shuttle is registered for the destination's prefix
    #[error("No route to {destination}")]
    Unroutable { destination: String },

    /// The component was closed
    #[error("Component closed: {0}")]
    Closed(String),
}

impl RuntimeError {
    /// Create configuration error
    pub fn configuration(message: impl Into<String>, field: Option<&str>) -> Self {
        RuntimeError::Configuration {
            message: message.into(),
            field: field.map(str::to_string),
        }
    }

    pub fn closed(component: impl Into<String>) -> Self {
        RuntimeError::Closed(component.into())
    }

    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            RuntimeError::Configuration { .. } | RuntimeError::Address(_)
        )
    }
}

/// Errors reported by checkpoint store backends
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Temporary failure; the operation may succeed if retried
    #[error("Transient store failure: {0}")]
    Transient(String),

    /// Unrecoverable failure (bad configuration, corrupted data)
    #[error("Fatal store failure: {0}")]
    Fatal(String),

    #[error("Store closed")]
    Closed,
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}
