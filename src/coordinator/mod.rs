// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Run coordinator.
//!
//! Ties together:
//! - snapshot collection via [`SnapshotAssembler`]
//! - the snapshot archive via [`SnapshotStore`]
//! - the search store via [`SearchStoreClient`]
//! - bulk replays ([`crate::replay`]) and the Grafista importer ([`crate::import`])
//!
//! # Publishing
//!
//! Every snapshot, collected or imported, is published the same way:
//! 1. inserted into the archive, which assigns its identity
//! 2. written to the search store with `PUT <collection>/<identity>`
//!
//! A 404 from the search store at step 2 fails the run with
//! [`CollectorError::NotStored`]. On a dry run nothing is written; the
//! snapshot is logged as pretty JSON instead.

mod types;

pub use types::{RunMode, RunOutcome};

use crate::aggregation::{AggregationSource, Cutoff, MongoAggregator};
use crate::assembler::SnapshotAssembler;
use crate::codec;
use crate::config::CollectorConfig;
use crate::error::{CollectorError, Result};
use crate::identity::reconcile;
use crate::import::{DailySink, GrafistaImporter, ImportReport, SinkFuture};
use crate::metrics;
use crate::remote::RemoteLookups;
use crate::replay::{self, ReplayReport};
use crate::scroll::ScrollReader;
use crate::stats::DailyStats;
use crate::store::{MongoSnapshotStore, SnapshotStore};
use crate::transport::{SearchStoreClient, SendOutcome};
use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Orchestrates one invocation of the collector.
pub struct Coordinator<A: AggregationSource = MongoAggregator, S: SnapshotStore = MongoSnapshotStore> {
    config: CollectorConfig,
    assembler: SnapshotAssembler<A>,
    archive: Arc<S>,
    search: SearchStoreClient,
}

impl Coordinator {
    /// Connect to the operational store, the archive and the search store.
    ///
    /// The archive lives in the storage database, which defaults to the
    /// operational one.
    pub async fn connect(config: CollectorConfig) -> Result<Self> {
        config.validate()?;

        info!(url = %config.operational.url, "Connecting to operational store");
        let source = MongoAggregator::connect(&config.operational.url).await?;

        info!(url = %config.operational.storage_url(), "Connecting to snapshot archive");
        let archive = MongoSnapshotStore::connect(
            config.operational.storage_url(),
            &config.operational.stats_collection,
        )
        .await?;

        let lookups =
            RemoteLookups::new(&config.remote).map_err(|e| CollectorError::Config(e.to_string()))?;
        let search = SearchStoreClient::new(&config.search)?;

        Ok(Self::with_parts(config, Arc::new(source), lookups, Arc::new(archive), search))
    }
}

impl<A: AggregationSource, S: SnapshotStore> Coordinator<A, S> {
    /// Assemble a coordinator from already-built parts.
    pub fn with_parts(
        config: CollectorConfig,
        source: Arc<A>,
        lookups: RemoteLookups,
        archive: Arc<S>,
        search: SearchStoreClient,
    ) -> Self {
        Self {
            config,
            assembler: SnapshotAssembler::new(source, lookups),
            archive,
            search,
        }
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    pub fn archive(&self) -> &Arc<S> {
        &self.archive
    }

    /// Execute one run mode.
    pub async fn run(&self, mode: RunMode) -> Result<RunOutcome> {
        info!(mode = %mode, dry_run = self.config.dry_run, "Starting run");
        let outcome = match mode {
            RunMode::Collect { before } => {
                let cutoff = match before {
                    Some(before) => Cutoff::before(before),
                    None => Cutoff::current(),
                };
                let pushed = u64::from(self.collect(cutoff).await?);
                RunOutcome::Collected { collected: 1, pushed }
            }
            RunMode::CollectSince { begin } => {
                let (collected, pushed) = self.collect_since(begin, Utc::now()).await?;
                RunOutcome::Collected { collected, pushed }
            }
            RunMode::Reverse => RunOutcome::Replayed(self.reverse_import().await?),
            RunMode::Reindex => RunOutcome::Replayed(self.reindex().await?),
            RunMode::Reset => {
                self.reset().await?;
                RunOutcome::Reset
            }
            RunMode::Import { path } => RunOutcome::Imported(self.import(&path).await?),
        };
        info!(outcome = %outcome, "Run complete");
        Ok(outcome)
    }

    /// Collect one snapshot and publish it. Returns whether it was pushed.
    pub async fn collect(&self, cutoff: Cutoff) -> Result<bool> {
        let stats = self.assembler.collect(cutoff).await?;
        Ok(self.publish(&stats).await?.is_some())
    }

    /// Collect one snapshot per day after `begin` until the cutoff passes `now`.
    ///
    /// Returns (collected, pushed).
    pub async fn collect_since(&self, begin: DateTime<Utc>, now: DateTime<Utc>) -> Result<(u64, u64)> {
        warn!(begin = %begin, "Collecting daily statistics, this may take a while");
        let mut collected = 0;
        let mut pushed = 0;

        for before in daily_cutoffs(begin, now) {
            match self.collect(Cutoff::before(before)).await {
                Ok(was_pushed) => {
                    collected += 1;
                    pushed += u64::from(was_pushed);
                }
                Err(e) => {
                    error!(before = %before, error = %e, transient = e.is_transient(), "Daily collection failed");
                    return Err(e);
                }
            }
        }

        warn!(collected, pushed, "Done collecting daily statistics");
        Ok((collected, pushed))
    }

    /// Publish a snapshot to the archive and the search store.
    ///
    /// Returns the identity it was stored under, or `None` on a dry run.
    pub async fn publish<T>(&self, snapshot: &T) -> Result<Option<String>>
    where
        T: Serialize + Sync,
    {
        if self.config.dry_run {
            let pretty =
                serde_json::to_string_pretty(snapshot).map_err(|e| CollectorError::Codec(e.to_string()))?;
            info!("Statistics:\n{}", pretty);
            warn!("Not pushing to the search store");
            return Ok(None);
        }

        let body = codec::to_wire(snapshot)?;
        let doc = codec::wire_to_document(&body)?;

        let id = match self.archive.insert(doc).await {
            Ok(id) => {
                metrics::record_snapshot_pushed("archive", true);
                id
            }
            Err(e) => {
                metrics::record_snapshot_pushed("archive", false);
                return Err(e.into());
            }
        };
        debug!(id = %id, "Snapshot archived");

        let push = reconcile(Some(&id), body);
        match self.search.send(&push).await {
            Ok(SendOutcome::Stored { .. }) => {
                metrics::record_snapshot_pushed("search", true);
                info!(id = %id, "Snapshot pushed");
                Ok(Some(id))
            }
            Ok(SendOutcome::NotFound) => {
                metrics::record_snapshot_pushed("search", false);
                Err(CollectorError::NotStored(format!(
                    "search store answered 404 for {}",
                    id
                )))
            }
            Err(e) => {
                metrics::record_snapshot_pushed("search", false);
                let e = CollectorError::from(e);
                warn!(id = %id, error = %e, transient = e.is_transient(), "Push to search store failed");
                Err(e)
            }
        }
    }

    /// Copy the search store into the archive.
    pub async fn reverse_import(&self) -> Result<ReplayReport> {
        warn!(url = %self.search.collection_url(), "Reverse-importing from the search store into the archive");
        let reader = ScrollReader::new(
            self.search.clone(),
            self.config.search.scroll_page_size,
            self.config.search.scroll_keepalive.clone(),
        );
        replay::reverse_import(reader, self.archive.as_ref(), self.config.replay.progress_interval).await
    }

    /// Push the archive to the search store.
    pub async fn reindex(&self) -> Result<ReplayReport> {
        warn!(url = %self.search.collection_url(), "Reindexing the search store from the archive");
        replay::reindex(self.archive.as_ref(), &self.search, self.config.replay.progress_interval).await
    }

    /// Delete the search index.
    pub async fn reset(&self) -> Result<()> {
        warn!(url = %self.search.collection_url(), "Resetting the search index");
        self.search.reset().await?;
        Ok(())
    }

    /// Import a Grafista database, publishing one snapshot per day.
    pub async fn import(&self, path: &Path) -> Result<ImportReport> {
        let importer = GrafistaImporter::open(path).await?;
        let mut sink = PublishDays { coordinator: self };
        let report = importer.run(&mut sink).await;
        importer.close().await;
        report
    }
}

/// Publishes each imported day through the coordinator.
struct PublishDays<'c, A: AggregationSource, S: SnapshotStore> {
    coordinator: &'c Coordinator<A, S>,
}

impl<A: AggregationSource, S: SnapshotStore> DailySink for PublishDays<'_, A, S> {
    fn push_day(&mut self, day: DailyStats) -> SinkFuture<'_> {
        let coordinator = self.coordinator;
        Box::pin(async move { coordinator.publish(&day).await.map(|_| ()) })
    }
}

/// Cutoffs for a daily backfill.
///
/// Starting from `begin`, each step adds one day and rounds to the nearest
/// UTC midnight; steps continue until the previous cutoff lies after `now`,
/// so the last cutoff is at or after `now`.
pub fn daily_cutoffs(begin: DateTime<Utc>, now: DateTime<Utc>) -> Vec<DateTime<Utc>> {
    let mut cutoffs = Vec::new();
    let mut before = begin;
    while before <= now {
        before = round_to_midnight(before + Duration::days(1));
        cutoffs.push(before);
    }
    cutoffs
}

/// Round to the nearest UTC midnight; noon rounds up.
fn round_to_midnight(t: DateTime<Utc>) -> DateTime<Utc> {
    let midnight = Utc.from_utc_datetime(&t.date_naive().and_time(NaiveTime::MIN));
    if t - midnight >= Duration::hours(12) {
        midnight + Duration::days(1)
    } else {
        midnight
    }
}
