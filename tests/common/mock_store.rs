//! Recording mocks for the store seams.
//!
//! `MockSource` answers every aggregation step with fixed counts, records the
//! cutoff each call received, and can be told to fail at a given step.
//! `MockArchive` wraps the in-memory archive, records calls and can be told to
//! refuse writes after a number of inserts.

use bson::Document;
use stats_collector::aggregation::BoxFuture;
use stats_collector::stats::{FileStats, NodeStats, ProjectStats, UserStats};
use stats_collector::store::{DocumentStream, MemorySnapshotStore, StoreFuture};
use stats_collector::{AggregationSource, AggregationStep, Cutoff, QueryError, SnapshotStore};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// A recorded aggregation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregationCall {
    pub step: AggregationStep,
    pub cutoff: Cutoff,
}

/// Mock implementation of AggregationSource.
///
/// # Example
/// ```rust,ignore
/// let source = MockSource::failing_at(AggregationStep::Projects);
/// // ... run the assembler ...
/// assert_eq!(source.steps(), vec![AggregationStep::Files, AggregationStep::Projects]);
/// ```
#[derive(Default)]
pub struct MockSource {
    calls: Mutex<Vec<AggregationCall>>,
    fail_at: Option<AggregationStep>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_at(step: AggregationStep) -> Self {
        Self {
            fail_at: Some(step),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<AggregationCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn steps(&self) -> Vec<AggregationStep> {
        self.calls().into_iter().map(|c| c.step).collect()
    }

    fn record(&self, step: AggregationStep, cutoff: Cutoff) -> Result<(), QueryError> {
        self.calls.lock().unwrap().push(AggregationCall { step, cutoff });
        if self.fail_at == Some(step) {
            return Err(QueryError::msg(step.as_str(), "injected failure"));
        }
        Ok(())
    }
}

impl AggregationSource for MockSource {
    fn files(&self, cutoff: Cutoff) -> BoxFuture<'_, FileStats> {
        let result = self.record(AggregationStep::Files, cutoff).map(|_| {
            let mut files = FileStats {
                file_count_total: 3,
                expired_link_count: 1,
                no_link_count: 1,
                ..Default::default()
            };
            files.file_count_per_backend.insert("gcs".to_string(), 2);
            files.file_count_per_backend.insert("none".to_string(), 1);
            files
        });
        Box::pin(async move { result })
    }

    fn projects(&self, cutoff: Cutoff) -> BoxFuture<'_, ProjectStats> {
        let result = self.record(AggregationStep::Projects, cutoff).map(|_| ProjectStats {
            public_count: 1,
            private_count: 1,
            home_project_count: 2,
            total_count: 4,
            total_deleted_count: 1,
        });
        Box::pin(async move { result })
    }

    fn nodes(&self, cutoff: Cutoff) -> BoxFuture<'_, NodeStats> {
        let result = self.record(AggregationStep::Nodes, cutoff).map(|_| {
            let mut nodes = NodeStats {
                total_public_node_count: 7,
                ..Default::default()
            };
            nodes.public_node_count_per_type.insert("asset".to_string(), 5);
            nodes.public_node_count_per_type.insert("comment".to_string(), 2);
            nodes
        });
        Box::pin(async move { result })
    }

    fn users(&self, cutoff: Cutoff) -> BoxFuture<'_, UserStats> {
        let result = self.record(AggregationStep::Users, cutoff).map(|_| UserStats {
            total_user_count: 10,
            total_real_user_count: 9,
            blender_sync_count: 3,
            ..Default::default()
        });
        Box::pin(async move { result })
    }
}

/// A recorded archive write.
#[derive(Debug, Clone, PartialEq)]
pub enum ArchiveCall {
    Insert { id: String },
    Upsert { id: String },
    Scan,
}

/// Mock implementation of SnapshotStore that records all calls.
pub struct MockArchive {
    inner: MemorySnapshotStore,
    calls: Mutex<Vec<ArchiveCall>>,
    /// Refuse inserts once this many have succeeded.
    fail_after_inserts: AtomicUsize,
    inserts: AtomicUsize,
}

impl Default for MockArchive {
    fn default() -> Self {
        Self {
            inner: MemorySnapshotStore::new(),
            calls: Mutex::new(Vec::new()),
            fail_after_inserts: AtomicUsize::new(usize::MAX),
            inserts: AtomicUsize::new(0),
        }
    }
}

impl MockArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_after(inserts: usize) -> Self {
        let archive = Self::default();
        archive.fail_after_inserts.store(inserts, Ordering::SeqCst);
        archive
    }

    pub fn calls(&self) -> Vec<ArchiveCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn documents(&self) -> Vec<Document> {
        self.inner.documents()
    }

    pub fn get(&self, id: &str) -> Option<Document> {
        self.inner.get(id)
    }
}

impl SnapshotStore for MockArchive {
    fn insert(&self, doc: Document) -> StoreFuture<'_, String> {
        Box::pin(async move {
            if self.inserts.load(Ordering::SeqCst) >= self.fail_after_inserts.load(Ordering::SeqCst) {
                return Err(QueryError::msg("archive.insert", "injected failure"));
            }
            let id = self.inner.insert(doc).await?;
            self.inserts.fetch_add(1, Ordering::SeqCst);
            self.calls.lock().unwrap().push(ArchiveCall::Insert { id: id.clone() });
            Ok(id)
        })
    }

    fn upsert(&self, id: &str, doc: Document) -> StoreFuture<'_, ()> {
        self.calls.lock().unwrap().push(ArchiveCall::Upsert { id: id.to_string() });
        self.inner.upsert(id, doc)
    }

    fn scan(&self) -> StoreFuture<'_, DocumentStream> {
        self.calls.lock().unwrap().push(ArchiveCall::Scan);
        self.inner.scan()
    }
}
