//! CloudFormation custom-resource envelope
//!
//! CloudFormation invokes the allocator with a request event and waits for a
//! response document PUT to the pre-signed `ResponseURL`:
//!
//! ```text
//! Event                                   Response
//! ├── RequestType (Create/Update/Delete)  ├── Status (SUCCESS/FAILED)
//! ├── ResponseURL                         ├── Reason
//! ├── StackId / RequestId                 ├── PhysicalResourceId
//! ├── LogicalResourceId                   ├── StackId / RequestId / LogicalResourceId
//! └── ResourceProperties                  └── Data { "priority": "8" } or { "Message": ... }
//!     ├── listener_arn
//!     └── service_name
//! ```
//!
//! `Delete` never touches the listener: the allocator owns no resource, so
//! there is nothing to clean up.

use crate::error::Result;
use crate::service::{PriorityService, EXHAUSTED_MESSAGE};
use listener_priority_core::{AllocationError, RuleStore};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Message for events without a request type or resource properties
pub const UNEXPECTED_EVENT_MESSAGE: &str = "Unexpected event received from CloudFormation";

/// Message for events missing the listener or service name
pub const MISSING_PROPERTIES_MESSAGE: &str =
    "Missing listener_arn and service_name parameters from CloudFormation";

/// Message returned for Delete requests
pub const DELETE_MESSAGE: &str = "Resource deletion successful!";

/// Custom-resource request kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestType {
    /// Stack creation
    Create,
    /// Property change on stack update
    Update,
    /// Resource removal
    Delete,
    /// Anything CloudFormation may add later
    #[serde(other)]
    Unknown,
}

/// Properties declared on the custom resource
///
/// CloudFormation passes every property as a string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceProperties {
    /// Listener to allocate on
    #[serde(default)]
    pub listener_arn: Option<String>,

    /// Hostname the new rule routes
    #[serde(default)]
    pub service_name: Option<String>,

    /// Optional bound below the listener maximum, as a decimal string
    #[serde(default)]
    pub max_priority: Option<String>,
}

/// Custom-resource request event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CustomResourceEvent {
    /// Create, Update or Delete
    #[serde(default)]
    pub request_type: Option<RequestType>,

    /// Pre-signed URL the response must be PUT to
    #[serde(rename = "ResponseURL", default)]
    pub response_url: String,

    /// Stack the resource belongs to
    #[serde(default)]
    pub stack_id: String,

    /// Unique id of this request
    #[serde(default)]
    pub request_id: String,

    /// Logical name of the resource in the template
    #[serde(default)]
    pub logical_resource_id: String,

    /// Physical id returned by a previous response (Update and Delete only)
    #[serde(default)]
    pub physical_resource_id: Option<String>,

    /// Custom resource type, e.g. `Custom::ListenerRulePriority`
    #[serde(default)]
    pub resource_type: Option<String>,

    /// Resource properties from the template
    #[serde(default)]
    pub resource_properties: Option<ResourceProperties>,
}

impl CustomResourceEvent {
    /// Parse an event document
    ///
    /// An object whose fields have the wrong shape (a numeric property, say)
    /// still yields an event carrying the callback fields, with neither a
    /// request type nor properties, so it can be answered with FAILED instead
    /// of leaving the stack waiting. Only text that is not a JSON object fails.
    pub fn from_json(raw: &str) -> Result<Self> {
        let err = match serde_json::from_str(raw) {
            Ok(event) => return Ok(event),
            Err(e) => e,
        };

        let value: Value = serde_json::from_str(raw)?;
        let Some(fields) = value.as_object() else {
            return Err(err.into());
        };

        warn!(error = %err, "Malformed custom-resource event, keeping callback fields only");

        let text = |key: &str| {
            fields
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
        };

        Ok(Self {
            response_url: text("ResponseURL").unwrap_or_default(),
            stack_id: text("StackId").unwrap_or_default(),
            request_id: text("RequestId").unwrap_or_default(),
            logical_resource_id: text("LogicalResourceId").unwrap_or_default(),
            physical_resource_id: text("PhysicalResourceId"),
            resource_type: text("ResourceType"),
            ..Self::default()
        })
    }
}

/// Response status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseStatus {
    /// Resource operation succeeded
    Success,
    /// Resource operation failed, stack rolls back
    Failed,
}

/// Response document delivered to `ResponseURL`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CustomResourceResponse {
    /// SUCCESS or FAILED
    pub status: ResponseStatus,

    /// Where to look for details
    pub reason: String,

    /// Physical id of the resource
    pub physical_resource_id: String,

    /// Copied from the event
    pub stack_id: String,

    /// Copied from the event
    pub request_id: String,

    /// Copied from the event
    pub logical_resource_id: String,

    /// Attributes readable with `Fn::GetAtt`
    pub data: BTreeMap<String, String>,
}

impl CustomResourceResponse {
    fn for_event(
        event: &CustomResourceEvent,
        log_stream: &str,
        status: ResponseStatus,
        data: BTreeMap<String, String>,
    ) -> Self {
        Self {
            status,
            reason: format!("See the details in CloudWatch Log Stream: {}", log_stream),
            physical_resource_id: event
                .physical_resource_id
                .clone()
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| log_stream.to_string()),
            stack_id: event.stack_id.clone(),
            request_id: event.request_id.clone(),
            logical_resource_id: event.logical_resource_id.clone(),
            data,
        }
    }

    /// Successful response exposing `priority`
    pub fn priority(event: &CustomResourceEvent, log_stream: &str, priority: u32) -> Self {
        let mut data = BTreeMap::new();
        data.insert("priority".to_string(), priority.to_string());
        Self::for_event(event, log_stream, ResponseStatus::Success, data)
    }

    /// Response carrying only a message
    pub fn message(
        event: &CustomResourceEvent,
        log_stream: &str,
        status: ResponseStatus,
        message: impl Into<String>,
    ) -> Self {
        let mut data = BTreeMap::new();
        data.insert("Message".to_string(), message.into());
        Self::for_event(event, log_stream, status, data)
    }

    /// Whether the status is SUCCESS
    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }
}

impl<S: RuleStore> PriorityService<S> {
    /// Handle a custom-resource event, producing the response to deliver
    pub async fn handle_custom_resource(
        &self,
        event: &CustomResourceEvent,
    ) -> CustomResourceResponse {
        let log_stream = self.log_stream();
        let failed = |message: String| {
            CustomResourceResponse::message(event, log_stream, ResponseStatus::Failed, message)
        };

        let (request_type, properties) = match (event.request_type, &event.resource_properties) {
            (Some(request_type), Some(properties)) if request_type != RequestType::Unknown => {
                (request_type, properties)
            }
            _ => {
                warn!(request_id = %event.request_id, "Unexpected custom-resource event");
                return failed(UNEXPECTED_EVENT_MESSAGE.to_string());
            }
        };

        if request_type == RequestType::Delete {
            info!(
                request_id = %event.request_id,
                logical_resource_id = %event.logical_resource_id,
                "Delete request, nothing to release"
            );
            return CustomResourceResponse::message(
                event,
                log_stream,
                ResponseStatus::Success,
                DELETE_MESSAGE,
            );
        }

        let listener_arn = properties.listener_arn.as_deref().filter(|s| !s.trim().is_empty());
        let service_name = properties.service_name.as_deref().filter(|s| !s.trim().is_empty());
        let (Some(listener_arn), Some(service_name)) = (listener_arn, service_name) else {
            warn!(request_id = %event.request_id, "Custom resource is missing properties");
            return failed(MISSING_PROPERTIES_MESSAGE.to_string());
        };

        let max_priority = match properties.max_priority.as_deref() {
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(value) => Some(value),
                Err(_) => return failed(format!("Invalid max_priority: {}", raw)),
            },
            None => None,
        };

        info!(
            request_id = %event.request_id,
            request_type = ?request_type,
            service = %service_name,
            "Handling custom-resource request"
        );

        match self.allocate(listener_arn, service_name, max_priority).await {
            Ok(allocation) => {
                info!(
                    service = %service_name,
                    result = %allocation,
                    "Returning rule priority"
                );
                CustomResourceResponse::priority(event, log_stream, allocation.priority())
            }
            Err(e @ AllocationError::PrioritySpaceExhausted { .. }) => {
                warn!(service = %service_name, error = %e, "Listener is full");
                failed(EXHAUSTED_MESSAGE.to_string())
            }
            Err(e) => {
                warn!(service = %service_name, error = %e, "Allocation failed");
                failed(e.to_string())
            }
        }
    }
}
