//! Core types shared across listener priority components

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{AllocationError, Result};

/// Highest rule priority an ELBv2 listener accepts
pub const DEFAULT_MAX_PRIORITY: u32 = 50_000;

/// Priority of a listener rule
///
/// The default (catch-all) rule of a listener reports a non-numeric priority
/// such as `default`. It keeps its raw value here and is never considered
/// occupied by the solver.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RulePriority {
    Numeric(u32),
    Sentinel(String),
}

impl RulePriority {
    /// Parse a priority as reported by the rule store
    ///
    /// Only a bare run of ASCII digits is numeric; surrounding whitespace or a
    /// sign makes it a sentinel.
    pub fn parse(raw: &str) -> Self {
        if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(value) = raw.parse::<u32>() {
                return Self::Numeric(value);
            }
        }
        Self::Sentinel(raw.to_string())
    }

    /// Numeric value, if this is not a sentinel
    pub fn as_number(&self) -> Option<u32> {
        match self {
            Self::Numeric(value) => Some(*value),
            Self::Sentinel(_) => None,
        }
    }
}

impl std::fmt::Display for RulePriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RulePriority::Numeric(value) => write!(f, "{}", value),
            RulePriority::Sentinel(raw) => write!(f, "{}", raw),
        }
    }
}

/// Match condition of a rule (host-header, path-pattern, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleCondition {
    pub field: Option<String>,
    pub values: Vec<String>,
}

impl RuleCondition {
    pub fn new(field: Option<String>, values: Vec<String>) -> Self {
        Self { field, values }
    }

    /// Host-header condition matching a single hostname
    pub fn host_header(hostname: impl Into<String>) -> Self {
        Self {
            field: Some("host-header".to_string()),
            values: vec![hostname.into()],
        }
    }
}

/// A listener rule as observed in a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub priority: RulePriority,
    pub conditions: Vec<RuleCondition>,
}

impl Rule {
    pub fn new(priority: RulePriority, conditions: Vec<RuleCondition>) -> Self {
        Self {
            priority,
            conditions,
        }
    }

    /// Rule routing `hostname` at a numeric priority
    pub fn for_host(priority: u32, hostname: impl Into<String>) -> Self {
        Self::new(
            RulePriority::Numeric(priority),
            vec![RuleCondition::host_header(hostname)],
        )
    }

    /// The listener's catch-all rule (no conditions, sentinel priority)
    pub fn default_rule() -> Self {
        Self::new(RulePriority::Sentinel("default".to_string()), Vec::new())
    }

    /// The hostname this rule routes: first value of its first condition
    pub fn routing_hostname(&self) -> Option<&str> {
        self.conditions
            .first()
            .and_then(|condition| condition.values.first())
            .map(String::as_str)
    }
}

/// Point-in-time view of every rule on one listener
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    listener_id: String,
    rules: Vec<Rule>,
    observed_at: DateTime<Utc>,
}

impl Snapshot {
    /// Snapshot observed now
    pub fn new(listener_id: impl Into<String>, rules: Vec<Rule>) -> Self {
        Self::observed(listener_id, rules, Utc::now())
    }

    /// Snapshot observed at a given instant
    pub fn observed(
        listener_id: impl Into<String>,
        rules: Vec<Rule>,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            listener_id: listener_id.into(),
            rules,
            observed_at,
        }
    }

    pub fn listener_id(&self) -> &str {
        &self.listener_id
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn observed_at(&self) -> DateTime<Utc> {
        self.observed_at
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Numeric priorities in use, sentinels excluded
    pub fn occupied(&self) -> BTreeSet<u32> {
        self.rules
            .iter()
            .filter_map(|rule| rule.priority.as_number())
            .collect()
    }
}

/// Successful outcome of an allocation request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Allocation {
    /// The hostname already has a rule at this priority
    Existing(u32),
    /// Lowest free priority, stable across two consecutive reads
    Allocated(u32),
}

impl Allocation {
    pub fn priority(&self) -> u32 {
        match self {
            Allocation::Existing(priority) | Allocation::Allocated(priority) => *priority,
        }
    }

    pub fn is_existing(&self) -> bool {
        matches!(self, Allocation::Existing(_))
    }
}

impl std::fmt::Display for Allocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Allocation::Existing(priority) => write!(f, "existing:{}", priority),
            Allocation::Allocated(priority) => write!(f, "allocated:{}", priority),
        }
    }
}

/// One allocation request, validated at the boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRequest {
    pub listener_id: String,
    pub hostname: String,
    pub max_priority: u32,
}

impl AllocationRequest {
    /// Build a request bounded by the listener's hard limit
    pub fn new(listener_id: impl Into<String>, hostname: impl Into<String>) -> Result<Self> {
        Self::with_max_priority(listener_id, hostname, DEFAULT_MAX_PRIORITY)
    }

    /// Build a request with a caller-supplied maximum priority
    pub fn with_max_priority(
        listener_id: impl Into<String>,
        hostname: impl Into<String>,
        max_priority: u32,
    ) -> Result<Self> {
        let request = Self {
            listener_id: listener_id.into(),
            hostname: hostname.into(),
            max_priority,
        };
        request.validate()?;
        Ok(request)
    }

    /// Reject empty identifiers and a zero bound
    pub fn validate(&self) -> Result<()> {
        if self.listener_id.trim().is_empty() {
            return Err(AllocationError::invalid_request("listener id is required"));
        }
        if self.hostname.trim().is_empty() {
            return Err(AllocationError::invalid_request("hostname is required"));
        }
        if self.max_priority == 0 {
            return Err(AllocationError::invalid_request(
                "max priority must be at least 1",
            ));
        }
        Ok(())
    }
}
