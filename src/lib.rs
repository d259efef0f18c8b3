//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! Storygate - Tiered Usage Quota Engine
//!
//! Gates story-generation requests behind free/premium usage quotas: free
//! accounts get a lifetime allowance, premium accounts get a daily allowance
//! that resets lazily at local midnight.
//!
//! # API Layers
//!
//! ## Prelude (Quick Start)
//!
//! Use `use storygate::prelude::*;` to import all commonly used types.
//!
//! ## Core API
//!
//! - [`QuotaEngine`] - Pure decision core over `(state, now)`
//! - [`QuotaState`] - Persisted per-user quota record
//! - [`QuotaDecision`] - Evaluation result driving allow/deny and display
//! - [`Gatekeeper`] - Orchestrates evaluate → action → apply → persist
//! - [`QuotaError`] - Error types
//!
//! ## Storage
//!
//! Quota records live behind the [`QuotaStorage`] trait with versioned
//! compare-and-swap writes. In-memory backend built in; PostgreSQL backend
//! behind the `postgres` feature.
//!
//! # Examples
//!
//! ```rust
//! use storygate::prelude::*;
//! use chrono::Utc;
//!
//! let engine = QuotaEngine::new(Utc);
//! let state = QuotaState::new_account();
//!
//! // 评估不消费配额，可重复调用用于展示
//! let decision = engine.evaluate(&state, Utc::now());
//! assert!(decision.can_act);
//! assert_eq!(decision.remaining, 2);
//!
//! // 记账返回新状态，由调用方持久化
//! let state = engine.apply_usage(&state, Utc::now());
//! assert_eq!(state.free_used, 1);
//! ```
//!
//! # Features
//!
//! - **Two-tier policy**: lifetime cap for free accounts, calendar-day cap
//!   for premium accounts with lazy midnight reset
//! - **Injectable clock**: every decision takes `now` explicitly, no hidden
//!   wall-clock reads
//! - **Race-safe accounting**: per-user serialization plus versioned CAS so
//!   concurrent submissions cannot exceed the cap
//! - **Apply-on-success only**: a failed external action never consumes quota

pub mod prelude;

pub mod constants;
pub mod error;
pub mod gatekeeper;
#[cfg(feature = "postgres")]
pub mod postgres_store;
pub mod quota_engine;
pub mod storage;

// 重新导出常用类型
pub use error::{QuotaError, StorageError};
pub use gatekeeper::{GateOutcome, Gatekeeper, StatsSnapshot};
#[cfg(feature = "postgres")]
pub use postgres_store::{PostgresQuotaStore, PostgresStoreConfig};
pub use quota_engine::{
    format_remaining_time, PlanTier, QuotaDecision, QuotaEngine, QuotaState,
};
pub use storage::{MemoryQuotaStore, QuotaStorage, VersionedQuota};
