//! Core traits for listener priority allocation
//!
//! The RuleStore trait is the only way the allocation core observes a listener.
//! The core never writes through it: creating the rule is the caller's job.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::types::Snapshot;

/// Read-only access to the rules of a listener.
///
/// Implementations must return the complete rule set. A store backed by a
/// paginated API has to follow every page before returning, since a partial
/// listing makes the solver hand out priorities that are already taken.
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Take a point-in-time snapshot of every rule on `listener_id`
    async fn read(&self, listener_id: &str) -> Result<Snapshot>;
}

#[async_trait]
impl<T: RuleStore + ?Sized> RuleStore for Arc<T> {
    async fn read(&self, listener_id: &str) -> Result<Snapshot> {
        (**self).read(listener_id).await
    }
}

#[async_trait]
impl<T: RuleStore + ?Sized> RuleStore for &T {
    async fn read(&self, listener_id: &str) -> Result<Snapshot> {
        (**self).read(listener_id).await
    }
}
