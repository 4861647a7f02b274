//! Bulk replays between the snapshot archive and the search store.
//!
//! - **reverse**: scroll every search store document and upsert it into the
//!   archive under the same identity; a hit without one is inserted fresh.
//! - **reindex**: scan the archive and push every document to the search
//!   store, replacing in place where an identity exists.
//!
//! Neither direction is resumable. The first store or transport failure ends
//! the replay; a reindex push answered with 404 is counted and skipped.

use crate::codec;
use crate::error::{CollectorError, Result};
use crate::identity::{reconcile, reconcile_document};
use crate::metrics;
use crate::scroll::ScrollReader;
use crate::store::SnapshotStore;
use crate::transport::{SearchStoreClient, SendOutcome};
use futures::TryStreamExt;
use std::fmt;
use std::time::Instant;
use tracing::{info, warn};

/// Counts from one replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Documents read from the source side.
    pub seen: u64,
    /// Documents written to the target side.
    pub written: u64,
    /// Reindex pushes the search store answered with 404.
    pub not_found: u64,
}

impl fmt::Display for ReplayReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} seen, {} written", self.seen, self.written)?;
        if self.not_found > 0 {
            write!(f, ", {} not found", self.not_found)?;
        }
        Ok(())
    }
}

fn log_progress(direction: &str, seen: u64, interval: u64) {
    if interval > 0 && seen % interval == 0 {
        info!(direction, seen, "Replay progress");
    }
}

/// Copy every search store document into the archive.
///
/// The cursor is released on success and on failure.
pub async fn reverse_import<S>(
    mut reader: ScrollReader,
    store: &S,
    progress_interval: u64,
) -> Result<ReplayReport>
where
    S: SnapshotStore + ?Sized,
{
    let started = Instant::now();
    let mut report = ReplayReport::default();

    while let Some(hit) = reader.next_hit().await {
        let hit = hit?;
        report.seen += 1;

        let push = reconcile(Some(&hit.id), hit.source);
        let written = match codec::wire_to_document(&push.body) {
            Ok(doc) => match push.instruction.id() {
                Some(id) => store.upsert(id, doc).await.map_err(CollectorError::from),
                None => store.insert(doc).await.map(drop).map_err(CollectorError::from),
            },
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            warn!(instruction = %push.instruction, error = %e, "Reverse import aborted");
            reader.close().await;
            metrics::record_replayed("reverse", report.written);
            return Err(e);
        }
        report.written += 1;
        log_progress("reverse", report.seen, progress_interval);
    }

    metrics::record_replayed("reverse", report.written);
    info!(
        documents = report.written,
        total = reader.total().unwrap_or(0),
        pages = reader.pages_fetched(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Reverse import complete"
    );
    Ok(report)
}

/// Push every archived document to the search store.
pub async fn reindex<S>(
    store: &S,
    transport: &SearchStoreClient,
    progress_interval: u64,
) -> Result<ReplayReport>
where
    S: SnapshotStore + ?Sized,
{
    let started = Instant::now();
    let mut report = ReplayReport::default();
    let mut documents = store.scan().await?;

    let outcome = async {
        while let Some(doc) = documents.try_next().await? {
            report.seen += 1;
            let push = reconcile_document(doc);
            match transport.send(&push).await? {
                SendOutcome::Stored { .. } => report.written += 1,
                SendOutcome::NotFound => {
                    warn!(instruction = %push.instruction, "Search store has no such document; skipped");
                    report.not_found += 1;
                }
            }
            log_progress("reindex", report.seen, progress_interval);
        }
        Ok::<(), CollectorError>(())
    }
    .await;

    metrics::record_replayed("reindex", report.written);
    outcome?;
    info!(
        report = %report,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Reindex complete"
    );
    Ok(report)
}
