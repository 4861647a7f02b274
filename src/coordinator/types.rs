//! Run modes and their outcomes.
//!
//! # Modes
//!
//! ```text
//! Collect { before }      one snapshot, optionally as of a past instant
//! CollectSince { begin }  one snapshot per day from `begin` until past now
//! Reverse                 search store ──► archive
//! Reindex                 archive ──► search store
//! Reset                   delete the search index
//! Import { path }         Grafista SQLite ──► archive + search store
//! ```
//!
//! Collect modes honour the configured dry run: snapshots are logged, not pushed.

use crate::import::ImportReport;
use crate::replay::ReplayReport;
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::PathBuf;

/// What a single invocation does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    /// Collect one snapshot. `None` means "now".
    Collect { before: Option<DateTime<Utc>> },

    /// Collect one snapshot per day, starting the day after `begin`.
    CollectSince { begin: DateTime<Utc> },

    /// Copy every search store document into the archive.
    Reverse,

    /// Push every archived document to the search store.
    Reindex,

    /// Delete the search index.
    Reset,

    /// Import a Grafista database.
    Import { path: PathBuf },
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Collect { before: None } => write!(f, "collect"),
            RunMode::Collect { before: Some(before) } => write!(f, "collect before {}", before.to_rfc3339()),
            RunMode::CollectSince { begin } => write!(f, "collect daily since {}", begin.to_rfc3339()),
            RunMode::Reverse => write!(f, "reverse import"),
            RunMode::Reindex => write!(f, "reindex"),
            RunMode::Reset => write!(f, "reset"),
            RunMode::Import { path } => write!(f, "import {}", path.display()),
        }
    }
}

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Snapshots collected; `pushed` is 0 on dry runs.
    Collected { collected: u64, pushed: u64 },
    Replayed(ReplayReport),
    Reset,
    Imported(ImportReport),
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Collected { collected, pushed } => {
                write!(f, "collected {} snapshot(s), pushed {}", collected, pushed)
            }
            RunOutcome::Replayed(report) => write!(f, "replayed: {}", report),
            RunOutcome::Reset => write!(f, "search index deleted"),
            RunOutcome::Imported(report) => write!(
                f,
                "imported {} day(s) from {} sample(s), {} dropped",
                report.days, report.samples, report.dropped_samples
            ),
        }
    }
}
