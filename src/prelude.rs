//! Prelude module - Commonly used types for quick imports
//!
//! This module re-exports the most commonly used types from Storygate,
//! allowing users to import them with a single `use storygate::prelude::*;`
//! statement instead of importing each type individually.

// Core types - always available
pub use crate::error::{QuotaError, StorageError};
pub use crate::gatekeeper::{GateOutcome, Gatekeeper};
pub use crate::quota_engine::{
    format_remaining_time, PlanTier, QuotaDecision, QuotaEngine, QuotaState,
};
pub use crate::storage::{MemoryQuotaStore, QuotaStorage};

// Feature-gated exports
#[cfg(feature = "postgres")]
pub use crate::postgres_store::PostgresQuotaStore;
