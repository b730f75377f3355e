//! # Listener Priority
//!
//! Collision-free rule priorities for shared ELBv2 listeners.
//!
//! ## Architecture
//!
//! ```text
//! Direct request ───────┐
//!                       ├──> PriorityService ──> Allocator (core) ──> ElbRuleStore ──> DescribeRules
//! CloudFormation event ─┘          │
//!                                  └──> CallbackResponder ──> ResponseURL (PUT)
//! ```
//!
//! The allocation itself (lookup, next-free solver, stabilization loop) lives
//! in `listener-priority-core`. This crate adds:
//! - the ELBv2 rule store with full `NextMarker` pagination
//! - configuration (JSON file + CLI overrides)
//! - the direct and custom-resource envelopes
//! - delivery of custom-resource responses
//!
//! ## Guarantees
//!
//! A hostname that already has a rule always gets that rule's priority back.
//! A new hostname gets the lowest priority that stayed free across two reads
//! one interval apart. Two callers racing on the same listener can still
//! receive the same value; creating the second rule then fails in ELBv2.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod callback;
pub mod config;
pub mod custom_resource;
pub mod direct;
pub mod elb;
pub mod error;
pub mod service;

// Error handling
pub use error::{ListenerPriorityError, Result};

// Configuration
pub use config::{AllocatorConfig, DEFAULT_LOG_STREAM, MAX_PAGE_SIZE};

// Rule store
pub use elb::{create_rule_store, load_aws_config, ElbRuleStore};

// Envelopes
pub use custom_resource::{
    CustomResourceEvent, CustomResourceResponse, RequestType, ResourceProperties, ResponseStatus,
};
pub use direct::{DirectRequest, DirectResponse};
pub use service::{PriorityService, EXHAUSTED_MESSAGE};

// Callback delivery
pub use callback::CallbackResponder;

// Core re-exports
pub use listener_priority_core::{
    Allocation, AllocationError, AllocationRequest, Allocator, RuleStore, Snapshot,
};
