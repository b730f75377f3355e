//! Allocation configuration
//!
//! Loaded from an optional JSON file and then overridden by CLI flags:
//!
//! ```json
//! {
//!   "interval_secs": 5,
//!   "max_priority": 50000,
//!   "deadline_secs": 120,
//!   "page_size": 400,
//!   "region": "eu-west-1"
//! }
//! ```
//!
//! Every field is optional in the file.

use crate::error::{ListenerPriorityError, Result};
use listener_priority_core::{DEFAULT_MAX_PRIORITY, DEFAULT_STABILIZATION_INTERVAL_SECS};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Largest page DescribeRules accepts
pub const MAX_PAGE_SIZE: i32 = 400;

/// Physical resource id / log stream used when Lambda does not provide one
pub const DEFAULT_LOG_STREAM: &str = "listener-priority";

/// Allocator and rule-store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocatorConfig {
    /// Quiet interval between stabilization reads (seconds)
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Default maximum priority when a request does not bring its own
    #[serde(default = "default_max_priority")]
    pub max_priority: u32,

    /// Optional deadline for a whole allocation (seconds, none = unbounded)
    #[serde(default)]
    pub deadline_secs: Option<u64>,

    /// DescribeRules page size (none = service default)
    #[serde(default)]
    pub page_size: Option<i32>,

    /// AWS region (none = default provider chain)
    #[serde(default)]
    pub region: Option<String>,

    /// Log stream name reported back to CloudFormation
    #[serde(default)]
    pub log_stream_name: Option<String>,
}

fn default_interval_secs() -> u64 {
    DEFAULT_STABILIZATION_INTERVAL_SECS
}

fn default_max_priority() -> u32 {
    DEFAULT_MAX_PRIORITY
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            max_priority: default_max_priority(),
            deadline_secs: None,
            page_size: None,
            region: None,
            log_stream_name: None,
        }
    }
}

impl AllocatorConfig {
    /// Load a config file and validate it
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the stabilization interval
    pub fn with_interval_secs(mut self, secs: u64) -> Self {
        self.interval_secs = secs;
        self
    }

    /// Set the default maximum priority
    pub fn with_max_priority(mut self, max_priority: u32) -> Self {
        self.max_priority = max_priority;
        self
    }

    /// Set the allocation deadline
    pub fn with_deadline_secs(mut self, secs: Option<u64>) -> Self {
        self.deadline_secs = secs;
        self
    }

    /// Set the DescribeRules page size
    pub fn with_page_size(mut self, page_size: Option<i32>) -> Self {
        self.page_size = page_size;
        self
    }

    /// Set the AWS region
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Set the log stream name
    pub fn with_log_stream_name(mut self, name: impl Into<String>) -> Self {
        self.log_stream_name = Some(name.into());
        self
    }

    /// Check bounds the listener and the DescribeRules API impose
    pub fn validate(&self) -> Result<()> {
        if self.max_priority == 0 || self.max_priority > DEFAULT_MAX_PRIORITY {
            return Err(ListenerPriorityError::config(format!(
                "max_priority must be between 1 and {}, got {}",
                DEFAULT_MAX_PRIORITY, self.max_priority
            )));
        }
        if let Some(page_size) = self.page_size {
            if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
                return Err(ListenerPriorityError::config(format!(
                    "page_size must be between 1 and {}, got {}",
                    MAX_PAGE_SIZE, page_size
                )));
            }
        }
        if self.deadline_secs == Some(0) {
            return Err(ListenerPriorityError::config("deadline_secs must be positive"));
        }
        Ok(())
    }

    /// Stabilization interval as a duration
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Allocation deadline as a duration
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }

    /// Log stream name, falling back to the Lambda environment
    pub fn log_stream(&self) -> String {
        self.log_stream_name
            .clone()
            .or_else(|| std::env::var("AWS_LAMBDA_LOG_STREAM_NAME").ok())
            .unwrap_or_else(|| DEFAULT_LOG_STREAM.to_string())
    }
}
