// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Snapshot assembly.
//!
//! ```text
//!   collect(cutoff)
//!     │
//!     ├── spawn ─► subscription lookup ──────────┐
//!     ├── spawn ─► identity-provider lookup ─────┤
//!     │                                          │
//!     ├── files ─► projects ─► nodes ─► users    │   (sequential, fail-fast)
//!     │                                          │
//!     └── join ◄─────────────────────────────────┘   (failures degrade only)
//! ```
//!
//! Local steps run in [`AGGREGATION_ORDER`]. The first failing step ends the
//! run; its error carries the snapshot as it stood, so the completed prefix
//! can still be inspected. Remote lookups run concurrently from the start and
//! are only joined once every local step has succeeded.

use crate::aggregation::{AggregationSource, AggregationStep, Cutoff, AGGREGATION_ORDER};
use crate::error::{CollectorError, QueryError, RemoteLookupError, Result};
use crate::metrics;
use crate::remote::RemoteLookups;
use crate::stats::Stats;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Builds [`Stats`] snapshots from an aggregation source and the remote lookups.
pub struct SnapshotAssembler<A: AggregationSource> {
    source: Arc<A>,
    lookups: RemoteLookups,
}

impl<A: AggregationSource> SnapshotAssembler<A> {
    pub fn new(source: Arc<A>, lookups: RemoteLookups) -> Self {
        Self { source, lookups }
    }

    /// Collect one snapshot.
    ///
    /// The snapshot timestamp is the cutoff's reference time.
    pub async fn collect(&self, cutoff: Cutoff) -> Result<Stats> {
        match cutoff.created_before() {
            Some(before) => info!(before = %before, "Collecting statistics before cutoff"),
            None => info!("Collecting current statistics"),
        }
        let started = Instant::now();

        let subscription = {
            let lookups = self.lookups.clone();
            tokio::spawn(async move { lookups.subscription_count().await })
        };
        let identity_provider = {
            let lookups = self.lookups.clone();
            tokio::spawn(async move { lookups.identity_provider_stats().await })
        };

        let mut stats = Stats::new(cutoff.reference_time());
        for step in AGGREGATION_ORDER {
            if let Err(source) = self.run_step(step, cutoff, &mut stats).await {
                subscription.abort();
                identity_provider.abort();
                metrics::record_collection(started.elapsed(), false);
                return Err(CollectorError::Aggregation {
                    step,
                    source,
                    partial: Box::new(stats),
                });
            }
        }

        stats.users.subscriber_count = join_lookup("store", subscription).await;
        stats.identity_provider = join_lookup("identity provider", identity_provider).await;

        metrics::record_collection(started.elapsed(), true);
        info!(elapsed_ms = started.elapsed().as_millis() as u64, "Done collecting statistics");
        Ok(stats)
    }

    async fn run_step(
        &self,
        step: AggregationStep,
        cutoff: Cutoff,
        stats: &mut Stats,
    ) -> std::result::Result<(), QueryError> {
        let started = Instant::now();
        let result = match step {
            AggregationStep::Files => self.source.files(cutoff).await.map(|v| stats.files = v),
            AggregationStep::Projects => self.source.projects(cutoff).await.map(|v| stats.projects = v),
            AggregationStep::Nodes => self.source.nodes(cutoff).await.map(|v| stats.nodes = v),
            AggregationStep::Users => self.source.users(cutoff).await.map(|mut v| {
                v.subscriber_count = None;
                stats.users = v
            }),
        };
        metrics::record_aggregation_step(step, started.elapsed(), result.is_ok());
        result
    }
}

/// Await a remote lookup; any failure is logged and yields `None`.
async fn join_lookup<T>(
    name: &'static str,
    handle: JoinHandle<std::result::Result<T, RemoteLookupError>>,
) -> Option<T> {
    match handle.await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            warn!(lookup = name, error = %e, "Ignoring error from remote lookup");
            None
        }
        Err(e) => {
            warn!(lookup = name, error = %e, "Remote lookup task did not complete");
            None
        }
    }
}
