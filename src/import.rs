//! One-off import of legacy Grafista statistics.
//!
//! Grafista kept one sample per series per day in SQLite. Samples are read
//! in timestamp order and folded into one [`DailyStats`] per day; each day is
//! handed to a [`DailySink`] as soon as the next day starts.
//!
//! | Series | Field |
//! |--------|-------|
//! | `assets` | `nodes.public_node_count_per_type.asset` |
//! | `comments` | `nodes.public_node_count_per_type.comment` |
//! | `total_sold` | `users.count_per_type.subscriber` |
//! | `users_total` | `users.total_user_count` |
//! | `users_blender_sync` | `users.blender_sync_count` |
//!
//! Samples of any other series are logged and dropped.

use crate::error::{CollectorError, Result};
use crate::metrics;
use crate::stats::DailyStats;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use futures::TryStreamExt;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use tracing::{debug, error, info};

const SAMPLES_QUERY: &str = "select date(samples.timestamp), series.name, cast(samples.value as integer) \
     from samples left join series on (samples.serie_id = series.id) \
     order by timestamp";

/// Boxed future returned by [`DailySink::push_day`].
pub type SinkFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Receives each completed day.
pub trait DailySink: Send {
    fn push_day(&mut self, day: DailyStats) -> SinkFuture<'_>;
}

/// Collects days in memory.
impl DailySink for Vec<DailyStats> {
    fn push_day(&mut self, day: DailyStats) -> SinkFuture<'_> {
        self.push(day);
        Box::pin(async { Ok(()) })
    }
}

/// Counts from one import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub samples: u64,
    pub days: u64,
    pub dropped_samples: u64,
}

/// Folds day-ordered samples into per-day documents.
#[derive(Debug, Default)]
pub struct DayFolder {
    current: Option<DailyStats>,
    dropped: u64,
}

impl DayFolder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one sample. Returns the previous day once a new day starts.
    pub fn feed(&mut self, day: DateTime<Utc>, series: Option<&str>, value: i64) -> Option<DailyStats> {
        let new_day = self.current.as_ref().is_some_and(|current| current.timestamp != day);
        let completed = if new_day { self.current.take() } else { None };
        let doc = self.current.get_or_insert_with(|| DailyStats::new(day));

        match series {
            Some("assets") => {
                doc.nodes.public_node_count_per_type.insert("asset".to_string(), value);
            }
            Some("comments") => {
                doc.nodes.public_node_count_per_type.insert("comment".to_string(), value);
            }
            Some("total_sold") => {
                doc.users.count_per_type.insert("subscriber".to_string(), value);
            }
            Some("users_total") => doc.users.total_user_count = Some(value),
            Some("users_blender_sync") => doc.users.blender_sync_count = Some(value),
            other => {
                error!(series = ?other, day = %day.date_naive(), "Unknown series, sample dropped");
                self.dropped += 1;
            }
        }
        completed
    }

    /// The day in progress, if any sample was fed.
    pub fn finish(self) -> (Option<DailyStats>, u64) {
        (self.current, self.dropped)
    }
}

/// Parse Grafista's `date(...)` output (`YYYY-MM-DD`) as midnight UTC.
pub fn parse_day(raw: &str) -> Result<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| CollectorError::Codec(format!("unable to parse day {:?}: {}", raw, e)))?;
    Ok(Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)))
}

/// Read-only handle on a Grafista database.
pub struct GrafistaImporter {
    pool: SqlitePool,
}

impl GrafistaImporter {
    /// Open an existing database file; a missing file is an error.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let options = SqliteConnectOptions::new().filename(path).read_only(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        info!(path = %path.display(), "Opened Grafista database");
        Ok(Self { pool })
    }

    /// Fold every sample into days and push each completed day to `sink`.
    ///
    /// A sink failure ends the import.
    pub async fn run<S: DailySink + ?Sized>(&self, sink: &mut S) -> Result<ImportReport> {
        let mut report = ImportReport::default();
        let mut folder = DayFolder::new();
        let mut rows = sqlx::query_as::<_, (Option<String>, Option<String>, Option<i64>)>(SAMPLES_QUERY)
            .fetch(&self.pool);

        while let Some((day, series, value)) = rows.try_next().await? {
            report.samples += 1;
            let day = parse_day(day.as_deref().unwrap_or_default())?;
            if let Some(completed) = folder.feed(day, series.as_deref(), value.unwrap_or(0)) {
                debug!(day = %completed.timestamp.date_naive(), "Day complete");
                sink.push_day(completed).await?;
                report.days += 1;
            }
        }

        let (last, dropped) = folder.finish();
        report.dropped_samples = dropped;
        if let Some(last) = last {
            sink.push_day(last).await?;
            report.days += 1;
        }

        metrics::record_imported_days(report.days, report.dropped_samples);
        info!(
            samples = report.samples,
            days = report.days,
            dropped = report.dropped_samples,
            "Grafista import complete"
        );
        Ok(report)
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn grafista_db(samples: &[(&str, i64, i64)]) -> (TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grafista.sqlite");
        let options = SqliteConnectOptions::new().filename(&path).create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();

        sqlx::query("create table series (id integer primary key, name text)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("create table samples (timestamp text, serie_id integer, value integer)")
            .execute(&pool)
            .await
            .unwrap();
        for (id, name) in [
            (1, "assets"),
            (2, "comments"),
            (3, "total_sold"),
            (4, "users_total"),
            (5, "users_blender_sync"),
            (6, "downloads"),
        ] {
            sqlx::query("insert into series (id, name) values (?, ?)")
                .bind(id)
                .bind(name)
                .execute(&pool)
                .await
                .unwrap();
        }
        for (timestamp, serie_id, value) in samples {
            sqlx::query("insert into samples (timestamp, serie_id, value) values (?, ?, ?)")
                .bind(*timestamp)
                .bind(*serie_id)
                .bind(*value)
                .execute(&pool)
                .await
                .unwrap();
        }
        pool.close().await;
        (dir, path)
    }

    #[test]
    fn test_parse_day() {
        let day = parse_day("2016-03-14").unwrap();
        assert_eq!(day, Utc.with_ymd_and_hms(2016, 3, 14, 0, 0, 0).unwrap());
        assert!(parse_day("").is_err());
        assert!(parse_day("14/03/2016").is_err());
    }

    #[test]
    fn test_folder_emits_on_day_change() {
        let d1 = parse_day("2016-03-14").unwrap();
        let d2 = parse_day("2016-03-15").unwrap();
        let mut folder = DayFolder::new();

        assert!(folder.feed(d1, Some("assets"), 10).is_none());
        assert!(folder.feed(d1, Some("users_total"), 100).is_none());
        let first = folder.feed(d2, Some("assets"), 12).unwrap();

        assert_eq!(first.timestamp, d1);
        assert_eq!(first.nodes.public_node_count_per_type["asset"], 10);
        assert_eq!(first.users.total_user_count, Some(100));

        let (last, dropped) = folder.finish();
        let last = last.unwrap();
        assert_eq!(last.timestamp, d2);
        assert_eq!(last.users.total_user_count, None);
        assert_eq!(dropped, 0);
    }

    #[test]
    fn test_folder_drops_unknown_series() {
        let day = parse_day("2016-03-14").unwrap();
        let mut folder = DayFolder::new();
        folder.feed(day, Some("downloads"), 5);
        folder.feed(day, None, 5);
        let (doc, dropped) = folder.finish();
        assert_eq!(dropped, 2);
        assert!(doc.unwrap().nodes.public_node_count_per_type.is_empty());
    }

    #[tokio::test]
    async fn test_import_folds_days() {
        let (_dir, path) = grafista_db(&[
            ("2016-03-14 10:00:00", 1, 10),
            ("2016-03-14 10:00:00", 2, 20),
            ("2016-03-14 10:00:00", 3, 30),
            ("2016-03-14 10:00:00", 6, 99),
            ("2016-03-15 10:00:00", 4, 400),
            ("2016-03-15 10:00:00", 5, 50),
        ])
        .await;

        let importer = GrafistaImporter::open(&path).await.unwrap();
        let mut days: Vec<DailyStats> = Vec::new();
        let report = importer.run(&mut days).await.unwrap();

        assert_eq!(report, ImportReport { samples: 6, days: 2, dropped_samples: 1 });
        assert_eq!(days.len(), 2);
        assert_eq!(days[0].timestamp, parse_day("2016-03-14").unwrap());
        assert_eq!(days[0].nodes.public_node_count_per_type["asset"], 10);
        assert_eq!(days[0].nodes.public_node_count_per_type["comment"], 20);
        assert_eq!(days[0].users.count_per_type["subscriber"], 30);
        assert_eq!(days[1].users.total_user_count, Some(400));
        assert_eq!(days[1].users.blender_sync_count, Some(50));
    }

    #[tokio::test]
    async fn test_empty_database_pushes_nothing() {
        let (_dir, path) = grafista_db(&[]).await;
        let importer = GrafistaImporter::open(&path).await.unwrap();
        let mut days: Vec<DailyStats> = Vec::new();
        let report = importer.run(&mut days).await.unwrap();
        assert_eq!(report.days, 0);
        assert!(days.is_empty());
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = GrafistaImporter::open(dir.path().join("absent.sqlite")).await;
        assert!(matches!(result, Err(CollectorError::Import(_))));
    }

    struct RefusingSink;

    impl DailySink for RefusingSink {
        fn push_day(&mut self, _day: DailyStats) -> SinkFuture<'_> {
            Box::pin(async { Err(CollectorError::NotStored("refused".to_string())) })
        }
    }

    #[tokio::test]
    async fn test_sink_failure_ends_import() {
        let (_dir, path) = grafista_db(&[("2016-03-14 10:00:00", 1, 10)]).await;
        let importer = GrafistaImporter::open(&path).await.unwrap();
        let err = importer.run(&mut RefusingSink).await.unwrap_err();
        assert!(matches!(err, CollectorError::NotStored(_)));
    }
}
