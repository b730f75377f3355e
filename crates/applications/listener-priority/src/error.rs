//! Error types for the listener priority service

use listener_priority_core::AllocationError;
use thiserror::Error;

/// Service result type
pub type Result<T> = std::result::Result<T, ListenerPriorityError>;

/// Errors that can occur in the listener priority service
///
/// Allocation failures from the core pass through unchanged as
/// [`ListenerPriorityError::Allocation`]; AWS SDK failures are flattened into
/// [`ListenerPriorityError::AwsService`] with [`ListenerPriorityError::from_aws`].
#[derive(Error, Debug)]
pub enum ListenerPriorityError {
    /// Allocation core error
    #[error(transparent)]
    Allocation(#[from] AllocationError),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Custom-resource callback could not be delivered
    #[error("Callback error: {0}")]
    Callback(String),

    /// Generic AWS service error (ELBv2)
    #[error("AWS service error: {0}")]
    AwsService(String),
}

impl ListenerPriorityError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a callback error
    pub fn callback(msg: impl Into<String>) -> Self {
        Self::Callback(msg.into())
    }

    /// Convert from generic AWS SDK error
    pub fn from_aws<E>(err: E) -> Self
    where
        E: std::fmt::Display,
    {
        Self::AwsService(err.to_string())
    }
}

/// Hand service errors back to the allocation core
///
/// Core errors come back as they went in. Anything else happened while talking
/// to the rule store, so it is an upstream failure.
impl From<ListenerPriorityError> for AllocationError {
    fn from(err: ListenerPriorityError) -> Self {
        match err {
            ListenerPriorityError::Allocation(inner) => inner,
            other => AllocationError::upstream(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_error_round_trips_unchanged() {
        let core = AllocationError::PrioritySpaceExhausted {
            priority: 50_001,
            max_priority: 50_000,
        };

        let wrapped = ListenerPriorityError::from(core.clone());

        assert_eq!(wrapped.to_string(), core.to_string());
        assert_eq!(AllocationError::from(wrapped), core);
    }

    #[test]
    fn test_aws_error_becomes_upstream_failure() {
        let err = ListenerPriorityError::from_aws("ListenerNotFound: listener does not exist");

        assert_eq!(
            err.to_string(),
            "AWS service error: ListenerNotFound: listener does not exist"
        );
        assert_eq!(
            AllocationError::from(err),
            AllocationError::upstream("AWS service error: ListenerNotFound: listener does not exist")
        );
    }

    #[test]
    fn test_callback_error_becomes_upstream_failure() {
        let err = AllocationError::from(ListenerPriorityError::callback("status 403"));

        assert!(matches!(err, AllocationError::UpstreamUnavailable(_)));
    }
}
