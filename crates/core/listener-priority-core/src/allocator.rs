//! Allocation orchestrator
//!
//! Coordinates one allocation request:
//!
//! ```text
//! Start
//!   ├── read + find(hostname) ── found ──> Existing(p)
//!   └── absent
//!         └── stabilize (read/solve/wait)* ──> p
//!               ├── p > max_priority ──> PrioritySpaceExhausted
//!               └── otherwise ──────────> Allocated(p)
//! ```
//!
//! Reader failures end the request with `UpstreamUnavailable`; nothing is
//! retried outside the stabilization loop itself.

use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{AllocationError, Result};
use crate::solver::find;
use crate::stabilize::{stabilize, DEFAULT_STABILIZATION_INTERVAL_SECS};
use crate::traits::RuleStore;
use crate::types::{Allocation, AllocationRequest};

/// Allocates listener rule priorities against a [`RuleStore`]
///
/// Holds no per-request state, so one allocator can serve any number of
/// concurrent requests.
#[derive(Debug, Clone)]
pub struct Allocator<S> {
    store: S,
    interval: Duration,
    deadline: Option<Duration>,
}

impl<S: RuleStore> Allocator<S> {
    /// Create an allocator with the default stabilization interval and no deadline
    pub fn new(store: S) -> Self {
        Self {
            store,
            interval: Duration::from_secs(DEFAULT_STABILIZATION_INTERVAL_SECS),
            deadline: None,
        }
    }

    /// Set the quiet interval between stabilization reads
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Bound the whole allocation (lookup and stabilization) by a deadline
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    /// Resolve a priority for `request.hostname` on `request.listener_id`
    ///
    /// Returns `Existing` when a rule already routes the hostname, otherwise
    /// the stabilized lowest free priority as `Allocated`.
    pub async fn allocate(&self, request: &AllocationRequest) -> Result<Allocation> {
        request.validate()?;

        match self.deadline {
            Some(deadline) => tokio::time::timeout(deadline, self.allocate_unbounded(request))
                .await
                .map_err(|_| {
                    warn!(
                        listener = %request.listener_id,
                        hostname = %request.hostname,
                        deadline_secs = deadline.as_secs_f64(),
                        "Allocation deadline reached"
                    );
                    AllocationError::DeadlineExceeded(deadline)
                })?,
            None => self.allocate_unbounded(request).await,
        }
    }

    async fn allocate_unbounded(&self, request: &AllocationRequest) -> Result<Allocation> {
        if let Some(existing) = self.lookup(&request.listener_id, &request.hostname).await? {
            info!(
                listener = %request.listener_id,
                hostname = %request.hostname,
                priority = existing,
                "Found existing rule, reusing its priority"
            );
            return Ok(Allocation::Existing(existing));
        }

        let priority = stabilize(&self.store, &request.listener_id, self.interval).await?;

        if priority > request.max_priority {
            warn!(
                listener = %request.listener_id,
                priority,
                max_priority = request.max_priority,
                "Listener has no free priority left"
            );
            return Err(AllocationError::PrioritySpaceExhausted {
                priority,
                max_priority: request.max_priority,
            });
        }

        info!(
            listener = %request.listener_id,
            hostname = %request.hostname,
            priority,
            "Allocated rule priority"
        );

        Ok(Allocation::Allocated(priority))
    }

    /// Priority of the rule already routing `hostname`, from a fresh snapshot
    pub async fn lookup(&self, listener_id: &str, hostname: &str) -> Result<Option<u32>> {
        let snapshot = self.store.read(listener_id).await?;
        let existing = find(&snapshot, hostname);

        debug!(
            listener = %listener_id,
            hostname = %hostname,
            rules = snapshot.len(),
            found = existing.is_some(),
            "Looked up hostname"
        );

        Ok(existing)
    }

    /// Stabilized next free priority, without a hostname lookup or bound check
    pub async fn next_free(&self, listener_id: &str) -> Result<u32> {
        stabilize(&self.store, listener_id, self.interval).await
    }
}
