//! # Stats Collector
//!
//! Collects usage statistics of a cloud platform from its operational
//! MongoDB database, archives each snapshot and pushes it to an
//! Elasticsearch-style search store.
//!
//! ## Architecture
//!
//! ```text
//!  ┌──────────────────┐     ┌───────────────────┐     ┌───────────────────┐
//!  │ MongoAggregator  │────►│ SnapshotAssembler │────►│    Coordinator    │
//!  │ files, projects, │     │ + remote lookups  │     │ archive, then PUT │
//!  │ nodes, users     │     │   (store, id)     │     └─────────┬─────────┘
//!  └──────────────────┘     └───────────────────┘               │
//!                                        ┌──────────────────────┴───┐
//!                                        ▼                          ▼
//!                             ┌──────────────────┐   reindex  ┌──────────────────┐
//!                             │  SnapshotStore   │───────────►│ SearchStoreClient│
//!                             │ (archive, Mongo) │◄───────────│  + ScrollReader  │
//!                             └──────────────────┘   reverse  └──────────────────┘
//! ```
//!
//! ## Run modes
//!
//! 1. **Collect**: one snapshot now, or as of a past cutoff
//! 2. **Collect since**: one snapshot per day from a start date
//! 3. **Reverse / Reindex**: bulk copy between the search store and the archive
//! 4. **Reset**: delete the search index
//! 5. **Import**: fold a legacy Grafista database into daily documents
//!
//! ## Usage
//!
//! ```rust,no_run
//! use stats_collector::{CollectorConfig, Coordinator, RunMode};
//!
//! #[tokio::main]
//! async fn main() -> stats_collector::Result<()> {
//!     let config = CollectorConfig::default();
//!     let coordinator = Coordinator::connect(config).await?;
//!     let outcome = coordinator.run(RunMode::Collect { before: None }).await?;
//!     println!("{}", outcome);
//!     Ok(())
//! }
//! ```

pub mod aggregation;
pub mod assembler;
pub mod codec;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod identity;
pub mod import;
pub mod metrics;
pub mod remote;
pub mod replay;
pub mod scroll;
pub mod stats;
pub mod store;
pub mod transport;

// Re-exports for convenience
pub use aggregation::{AggregationSource, AggregationStep, Cutoff, MongoAggregator, AGGREGATION_ORDER};
pub use assembler::SnapshotAssembler;
pub use config::{CollectorConfig, OperationalStoreConfig, RemoteLookupConfig, ReplayConfig, SearchStoreConfig};
pub use coordinator::{Coordinator, RunMode, RunOutcome};
pub use error::{CollectorError, QueryError, RemoteLookupError, Result, ScrollError, TransportError};
pub use identity::{Instruction, PreparedPush};
pub use remote::RemoteLookups;
pub use replay::ReplayReport;
pub use scroll::{ScrollReader, SearchHit};
pub use stats::{DailyStats, Stats};
pub use store::{MemorySnapshotStore, MongoSnapshotStore, SnapshotStore};
pub use transport::{SearchStoreClient, SendOutcome};
