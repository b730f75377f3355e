//! Direct invocation envelope
//!
//! Request/response shape for callers that invoke the allocator directly
//! (an API gateway integration or a deployment pipeline step):
//!
//! ```json
//! {"listener_arn": "arn:aws:elasticloadbalancing:...:listener/app/lb/1/2", "service_name": "svc.example.com"}
//! ```
//!
//! The response carries a status code and a JSON-encoded body, either
//! `{"priority": "8"}` or `{"error": "..."}`.

use crate::service::{PriorityService, EXHAUSTED_MESSAGE};
use listener_priority_core::{AllocationError, RuleStore};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Error body when required parameters are missing
pub const MISSING_PARAMETERS_MESSAGE: &str =
    "Incorrect parameters, you need to define listener_arn and service_name";

/// Direct allocation request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectRequest {
    /// Listener to allocate on
    #[serde(default)]
    pub listener_arn: Option<String>,

    /// Hostname the new rule routes
    #[serde(default)]
    pub service_name: Option<String>,

    /// Optional bound below the listener maximum
    #[serde(default)]
    pub max_priority: Option<u32>,
}

impl DirectRequest {
    /// Create a request for `service_name` on `listener_arn`
    pub fn new(listener_arn: impl Into<String>, service_name: impl Into<String>) -> Self {
        Self {
            listener_arn: Some(listener_arn.into()),
            service_name: Some(service_name.into()),
            max_priority: None,
        }
    }

    /// Set a caller-supplied maximum priority
    pub fn with_max_priority(mut self, max_priority: u32) -> Self {
        self.max_priority = Some(max_priority);
        self
    }

    /// Both required fields, if present and non-empty
    fn required(&self) -> Option<(&str, &str)> {
        let listener = self.listener_arn.as_deref().filter(|s| !s.trim().is_empty())?;
        let service = self.service_name.as_deref().filter(|s| !s.trim().is_empty())?;
        Some((listener, service))
    }
}

/// Direct allocation response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectResponse {
    /// HTTP-style status code
    #[serde(rename = "statusCode")]
    pub status_code: u16,

    /// Response headers
    pub headers: BTreeMap<String, String>,

    /// JSON-encoded body
    pub body: String,
}

impl DirectResponse {
    fn json(status_code: u16, body: serde_json::Value) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());

        Self {
            status_code,
            headers,
            body: body.to_string(),
        }
    }

    /// Successful response carrying `priority` as a string
    pub fn priority(priority: u32) -> Self {
        Self::json(200, json!({ "priority": priority.to_string() }))
    }

    /// Failure response with a message
    pub fn error(status_code: u16, message: impl Into<String>) -> Self {
        Self::json(status_code, json!({ "error": message.into() }))
    }

    /// Whether the status code is 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

impl From<&AllocationError> for DirectResponse {
    fn from(err: &AllocationError) -> Self {
        match err {
            AllocationError::InvalidRequest(msg) => Self::error(400, msg.clone()),
            AllocationError::PrioritySpaceExhausted { .. } => Self::error(409, EXHAUSTED_MESSAGE),
            AllocationError::UpstreamUnavailable(_) => Self::error(502, err.to_string()),
            AllocationError::DeadlineExceeded(_) => Self::error(504, err.to_string()),
        }
    }
}

impl<S: RuleStore> PriorityService<S> {
    /// Handle a direct invocation
    pub async fn handle_direct(&self, request: &DirectRequest) -> DirectResponse {
        let Some((listener_arn, service_name)) = request.required() else {
            warn!("Direct request is missing listener_arn or service_name");
            return DirectResponse::error(400, MISSING_PARAMETERS_MESSAGE);
        };

        match self
            .allocate(listener_arn, service_name, request.max_priority)
            .await
        {
            Ok(allocation) => {
                info!(
                    service = %service_name,
                    result = %allocation,
                    "Returning rule priority"
                );
                DirectResponse::priority(allocation.priority())
            }
            Err(e) => {
                warn!(service = %service_name, error = %e, "Allocation failed");
                DirectResponse::from(&e)
            }
        }
    }
}
