//! Priority service shared by both invocation envelopes
//!
//! Wraps an [`Allocator`] with the configured defaults and runs every request
//! in its own tracing span, tagged with a fresh request id.

use crate::config::AllocatorConfig;
use listener_priority_core::{
    Allocation, AllocationError, AllocationRequest, Allocator, RuleStore, DEFAULT_MAX_PRIORITY,
};
use tracing::{info_span, Instrument};
use uuid::Uuid;

/// Message returned when a listener has no free priority left
pub const EXHAUSTED_MESSAGE: &str =
    "Load balancer has reached its rule priority limit, provision a different load balancer";

/// Allocation service used by the direct and custom-resource handlers
#[derive(Debug)]
pub struct PriorityService<S> {
    allocator: Allocator<S>,
    max_priority: u32,
    log_stream: String,
}

impl<S: RuleStore> PriorityService<S> {
    /// Create a service over `store` using the interval, deadline and bound from `config`
    pub fn new(store: S, config: &AllocatorConfig) -> Self {
        let allocator = Allocator::new(store)
            .with_interval(config.interval())
            .with_deadline(config.deadline());

        Self {
            allocator,
            max_priority: config.max_priority,
            log_stream: config.log_stream(),
        }
    }

    /// Underlying allocator
    pub fn allocator(&self) -> &Allocator<S> {
        &self.allocator
    }

    /// Default maximum priority for requests that do not bring one
    pub fn max_priority(&self) -> u32 {
        self.max_priority
    }

    /// Log stream reported to CloudFormation
    pub fn log_stream(&self) -> &str {
        &self.log_stream
    }

    /// Validate and run one allocation
    ///
    /// A caller-supplied maximum may lower the bound but never raise it above
    /// what the listener accepts.
    pub async fn allocate(
        &self,
        listener_arn: &str,
        hostname: &str,
        max_priority: Option<u32>,
    ) -> listener_priority_core::Result<Allocation> {
        let max_priority = max_priority.unwrap_or(self.max_priority);
        if max_priority > DEFAULT_MAX_PRIORITY {
            return Err(AllocationError::invalid_request(format!(
                "max priority {} is above the listener limit of {}",
                max_priority, DEFAULT_MAX_PRIORITY
            )));
        }

        let request = AllocationRequest::with_max_priority(listener_arn, hostname, max_priority)?;

        let span = info_span!(
            "allocation",
            request_id = %Uuid::new_v4(),
            listener = %request.listener_id,
            hostname = %request.hostname,
        );

        self.allocator.allocate(&request).instrument(span).await
    }
}
