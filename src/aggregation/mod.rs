// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Operational-store aggregation.
//!
//! [`AggregationSource`] is the seam between the assembler and the store: one
//! call per category, each honouring the same [`Cutoff`]. [`MongoAggregator`]
//! is the production implementation; tests substitute a recording mock.
//!
//! # Example
//!
//! ```rust,no_run
//! use stats_collector::aggregation::{AggregationSource, BoxFuture, Cutoff};
//! use stats_collector::stats::{FileStats, NodeStats, ProjectStats, UserStats};
//!
//! struct Empty;
//!
//! impl AggregationSource for Empty {
//!     fn files(&self, _cutoff: Cutoff) -> BoxFuture<'_, FileStats> {
//!         Box::pin(async { Ok(FileStats::default()) })
//!     }
//!     fn projects(&self, _cutoff: Cutoff) -> BoxFuture<'_, ProjectStats> {
//!         Box::pin(async { Ok(ProjectStats::default()) })
//!     }
//!     fn nodes(&self, _cutoff: Cutoff) -> BoxFuture<'_, NodeStats> {
//!         Box::pin(async { Ok(NodeStats::default()) })
//!     }
//!     fn users(&self, _cutoff: Cutoff) -> BoxFuture<'_, UserStats> {
//!         Box::pin(async { Ok(UserStats::default()) })
//!     }
//! }
//! ```

mod mongo;
pub mod pipelines;

pub use mongo::{connect_database, MongoAggregator};

use crate::error::QueryError;
use crate::stats::{FileStats, NodeStats, ProjectStats, UserStats};
use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by [`AggregationSource`] calls.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, QueryError>> + Send + 'a>>;

/// One local aggregation step of a collection run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregationStep {
    Files,
    Projects,
    Nodes,
    Users,
}

/// The order local aggregation runs in. A failure at step K leaves steps
/// `0..K` filled in and `K..` untouched.
pub const AGGREGATION_ORDER: [AggregationStep; 4] = [
    AggregationStep::Files,
    AggregationStep::Projects,
    AggregationStep::Nodes,
    AggregationStep::Users,
];

impl AggregationStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Files => "files",
            Self::Projects => "projects",
            Self::Nodes => "nodes",
            Self::Users => "users",
        }
    }
}

impl fmt::Display for AggregationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The point in time a run describes.
///
/// A current run counts everything and uses "now" for time comparisons. A
/// historical run only counts documents created before the cutoff and uses
/// the cutoff itself as "now".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cutoff {
    reference_time: DateTime<Utc>,
    bounded: bool,
}

impl Cutoff {
    /// No cutoff; the reference time is the current instant, truncated to
    /// milliseconds so the archived BSON datetime and the wire timestamp agree.
    pub fn current() -> Self {
        let now = Utc::now();
        Self::unbounded_at(now.duration_trunc(TimeDelta::milliseconds(1)).unwrap_or(now))
    }

    /// No cutoff, with an explicit reference time.
    pub fn unbounded_at(reference_time: DateTime<Utc>) -> Self {
        Self {
            reference_time,
            bounded: false,
        }
    }

    /// Only count documents created strictly before `before`.
    pub fn before(before: DateTime<Utc>) -> Self {
        Self {
            reference_time: before,
            bounded: true,
        }
    }

    /// Instant used for "now" comparisons and as the snapshot timestamp.
    pub fn reference_time(&self) -> DateTime<Utc> {
        self.reference_time
    }

    /// The created-before bound, if this is a historical run.
    pub fn created_before(&self) -> Option<DateTime<Utc>> {
        self.bounded.then_some(self.reference_time)
    }
}

/// What the assembler needs from the operational store.
///
/// Every call applies the cutoff to every query it issues. Implementations
/// must be safe to share; calls never overlap in practice, but handles are
/// long-lived.
pub trait AggregationSource: Send + Sync + 'static {
    /// File counts: total, expired links, missing links, per backend, per status.
    fn files(&self, cutoff: Cutoff) -> BoxFuture<'_, FileStats>;

    /// Project counts by visibility, plus total and deleted.
    fn projects(&self, cutoff: Cutoff) -> BoxFuture<'_, ProjectStats>;

    /// Public node counts per type, plus the overall public total.
    fn nodes(&self, cutoff: Cutoff) -> BoxFuture<'_, NodeStats>;

    /// User counts per type, real users, and sync-client users.
    /// `subscriber_count` is left unset; it comes from a remote lookup.
    fn users(&self, cutoff: Cutoff) -> BoxFuture<'_, UserStats>;
}
