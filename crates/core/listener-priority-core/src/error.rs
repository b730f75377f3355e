//! Error types for priority allocation

use std::time::Duration;
use thiserror::Error;

/// Result type for allocation operations
pub type Result<T> = std::result::Result<T, AllocationError>;

/// Core error type for allocation operations
///
/// An already-registered hostname is not an error; it resolves to
/// [`Allocation::Existing`](crate::Allocation::Existing).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocationError {
    /// Required request fields are missing or empty
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The rule store could not be reached or returned malformed data
    #[error("Rule store unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The next free priority is above the listener's maximum
    #[error("Priority {priority} exceeds the listener maximum of {max_priority}")]
    PrioritySpaceExhausted { priority: u32, max_priority: u32 },

    /// A caller-imposed deadline elapsed before the allocation settled
    #[error("Allocation did not settle within {0:?}")]
    DeadlineExceeded(Duration),
}

impl AllocationError {
    /// Create an invalid request error
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Create an upstream error
    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::UpstreamUnavailable(msg.into())
    }

    /// Whether the listener has run out of priorities
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::PrioritySpaceExhausted { .. })
    }
}
