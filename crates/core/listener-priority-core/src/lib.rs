//! Listener Priority Core - Shared types and allocation logic
//!
//! This crate defines the allocation core used by:
//! - listener-priority (AWS rule store, invocation envelopes, CLI)
//!
//! Key types:
//! - RuleStore trait (interface for anything that can list a listener's rules)
//! - Rule / Snapshot (point-in-time view of a listener)
//! - Allocator (lookup -> solve -> stabilize -> bound check)
//! - Error types

pub mod allocator;
pub mod error;
pub mod memory;
pub mod solver;
pub mod stabilize;
pub mod traits;
pub mod types;

pub use allocator::*;
pub use error::*;
pub use memory::*;
pub use solver::*;
pub use stabilize::*;
pub use traits::*;
pub use types::*;
