// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! MongoDB implementation of [`AggregationSource`].

use super::pipelines::{self, NODE_TYPES, SERVICE_USER_TYPE};
use super::{AggregationSource, BoxFuture, Cutoff};
use crate::error::QueryError;
use crate::stats::{group_key, FileStats, NodeStats, ProjectStats, UserStats};
use bson::Document;
use futures::TryStreamExt;
use mongodb::{Client, Database};
use tracing::{debug, info};

const FILES: &str = "files";
const PROJECTS: &str = "projects";
const NODES: &str = "nodes";
const USERS: &str = "users";

/// Connect to the database named in a `mongodb://host/<database>` URL.
pub async fn connect_database(url: &str) -> Result<Database, QueryError> {
    let client = Client::with_uri_str(url)
        .await
        .map_err(|e| QueryError::mongo("connect", e))?;
    client
        .default_database()
        .ok_or_else(|| QueryError::msg("connect", format!("no database name in {:?}", url)))
}

/// Runs the fixed aggregation queries against the operational database.
///
/// The handle is cheap to clone and safe to share between tasks.
#[derive(Clone)]
pub struct MongoAggregator {
    db: Database,
}

impl MongoAggregator {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Connect using a `mongodb://host/<database>` URL.
    pub async fn connect(url: &str) -> Result<Self, QueryError> {
        let db = connect_database(url).await?;
        info!(database = %db.name(), "Connected to operational store");
        Ok(Self::new(db))
    }

    async fn count(&self, collection: &str, filter: Document) -> Result<i64, QueryError> {
        debug!(collection, filter = %filter, "count");
        let count = self
            .db
            .collection::<Document>(collection)
            .count_documents(filter)
            .await
            .map_err(|e| QueryError::mongo(format!("{}.count", collection), e))?;
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> Result<Vec<Document>, QueryError> {
        debug!(collection, stages = pipeline.len(), "aggregate");
        let operation = format!("{}.aggregate", collection);
        let mut cursor = self
            .db
            .collection::<Document>(collection)
            .aggregate(pipeline)
            .await
            .map_err(|e| QueryError::mongo(operation.clone(), e))?;

        let mut rows = Vec::new();
        while let Some(row) = cursor
            .try_next()
            .await
            .map_err(|e| QueryError::mongo(operation.clone(), e))?
        {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Run a pipeline ending in `$count: "total"`; no rows means zero.
    async fn total(&self, collection: &str, pipeline: Vec<Document>) -> Result<i64, QueryError> {
        let rows = self.aggregate(collection, pipeline).await?;
        Ok(rows
            .first()
            .map(|row| pipelines::count_value(row.get("total")))
            .unwrap_or(0))
    }

    async fn collect_files(&self, cutoff: Cutoff) -> Result<FileStats, QueryError> {
        let mut files = FileStats::default();

        info!("Counting files");
        files.file_count_total = self.count(FILES, pipelines::cutoff_filter(cutoff)).await?;

        info!("Counting files with expired links");
        files.expired_link_count = self
            .count(FILES, pipelines::expired_links_filter(cutoff))
            .await?;

        info!("Counting files with nil/empty links");
        files.no_link_count = self.count(FILES, pipelines::no_link_filter(cutoff)).await?;

        info!("Aggregating file statistics per storage backend");
        let rows = self
            .aggregate(FILES, pipelines::files_per_backend(cutoff))
            .await?;
        tally_backends(&mut files, &rows);

        info!("Aggregating file statistics per status");
        let rows = self
            .aggregate(FILES, pipelines::files_per_status(cutoff))
            .await?;
        tally_statuses(&mut files, &rows);

        Ok(files)
    }

    async fn collect_projects(&self, cutoff: Cutoff) -> Result<ProjectStats, QueryError> {
        info!("Aggregating project stats");
        let mut projects = ProjectStats::default();

        let rows = self
            .aggregate(PROJECTS, pipelines::project_visibility(cutoff))
            .await?;
        if let Some(row) = rows.first() {
            projects.public_count = pipelines::count_value(row.get("public"));
            projects.private_count = pipelines::count_value(row.get("private"));
            projects.home_project_count = pipelines::count_value(row.get("home"));
        }

        // Counted separately so the total does not depend on the visibility flags.
        projects.total_count = self
            .count(PROJECTS, pipelines::projects_total_filter(cutoff))
            .await?;
        projects.total_deleted_count = self
            .count(PROJECTS, pipelines::projects_deleted_filter(cutoff))
            .await?;

        Ok(projects)
    }

    async fn collect_nodes(&self, cutoff: Cutoff) -> Result<NodeStats, QueryError> {
        info!("Aggregating nodes stats");
        let mut nodes = NodeStats::default();

        for node_type in NODE_TYPES {
            let count = self
                .total(NODES, pipelines::public_nodes(Some(node_type), cutoff))
                .await?;
            nodes
                .public_node_count_per_type
                .insert(node_type.to_string(), count);
        }
        nodes.total_public_node_count = self
            .total(NODES, pipelines::public_nodes(None, cutoff))
            .await?;

        Ok(nodes)
    }

    async fn collect_users(&self, cutoff: Cutoff) -> Result<UserStats, QueryError> {
        info!("Aggregating users stats");
        let mut users = UserStats {
            total_user_count: self.count(USERS, pipelines::cutoff_filter(cutoff)).await?,
            ..Default::default()
        };

        for row in self
            .aggregate(USERS, pipelines::users_per_type(cutoff))
            .await?
        {
            let user_type = row_key(&row);
            users
                .count_per_type
                .insert(user_type, pipelines::count_value(row.get("count")));
        }

        let service = users
            .count_per_type
            .get(SERVICE_USER_TYPE)
            .copied()
            .unwrap_or(0);
        users.total_real_user_count = users.total_user_count - service;

        info!("Counting Blender Sync users");
        users.blender_sync_count = self
            .total(NODES, pipelines::sync_client_users(cutoff))
            .await?;

        Ok(users)
    }
}

/// Group key of an aggregation row; missing, null and empty all become `"none"`.
fn row_key(row: &Document) -> String {
    group_key(pipelines::raw_group_key(row.get("_id")).as_deref())
}

/// Fold `{_id: backend, count, total_bytes}` rows into the per-backend tallies.
///
/// Rows whose keys fold to the same tally key (null and `""`, say) are summed.
fn tally_backends(files: &mut FileStats, rows: &[Document]) {
    for row in rows {
        let backend = row_key(row);
        let bytes = pipelines::count_value(row.get("total_bytes"));
        *files.file_count_per_backend.entry(backend.clone()).or_insert(0) +=
            pipelines::count_value(row.get("count"));
        *files
            .total_bytes_storage_used_per_backend
            .entry(backend)
            .or_insert(0) += bytes;
        files.total_bytes_storage_used += bytes;
    }
}

/// Fold `{_id: status, count}` rows into the per-status tally.
fn tally_statuses(files: &mut FileStats, rows: &[Document]) {
    for row in rows {
        *files.file_count_per_status.entry(row_key(row)).or_insert(0) +=
            pipelines::count_value(row.get("count"));
    }
}

impl AggregationSource for MongoAggregator {
    fn files(&self, cutoff: Cutoff) -> BoxFuture<'_, FileStats> {
        Box::pin(self.collect_files(cutoff))
    }

    fn projects(&self, cutoff: Cutoff) -> BoxFuture<'_, ProjectStats> {
        Box::pin(self.collect_projects(cutoff))
    }

    fn nodes(&self, cutoff: Cutoff) -> BoxFuture<'_, NodeStats> {
        Box::pin(self.collect_nodes(cutoff))
    }

    fn users(&self, cutoff: Cutoff) -> BoxFuture<'_, UserStats> {
        Box::pin(self.collect_users(cutoff))
    }
}
