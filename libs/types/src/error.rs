//! Error types for address construction and manipulation
//!
//! Address errors are configuration-class failures: they are reported at the
//! call site and never swallowed by the runtime.

use thiserror::Error;

/// Errors raised while building, parsing, or transforming an [`Address`](crate::Address)
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// Input could not be turned into an address (no segments, bad escape)
    #[error("Invalid address '{input}': {reason}")]
    InvalidAddress { input: String, reason: String },

    /// Operation arguments do not fit the address they were applied to
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },
}

impl AddressError {
    /// Create an invalid address error
    pub fn invalid_address(input: impl Into<String>, reason: impl Into<String>) -> Self {
        AddressError::InvalidAddress {
            input: input.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        AddressError::InvalidArgument {
            reason: reason.into(),
        }
    }
}
