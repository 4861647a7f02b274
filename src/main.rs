// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::Parser;
use stats_collector::{CollectorConfig, Coordinator, RunMode};
use std::path::PathBuf;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Collects cloud usage statistics and pushes them to the search store.
#[derive(Debug, Parser)]
#[command(name = "stats-collector", version, about)]
struct Cli {
    /// Enable info-level logging.
    #[arg(long)]
    verbose: bool,

    /// Enable debug-level logging.
    #[arg(long)]
    debug: bool,

    /// YAML or JSON config file; flags below override it.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// URL of the MongoDB database to read from.
    #[arg(long, value_name = "URL")]
    mongo: Option<String>,

    /// URL of the MongoDB database to store statistics in. Defaults to --mongo.
    #[arg(long, value_name = "URL")]
    storage: Option<String>,

    /// URL of the search store collection to push to.
    #[arg(long, value_name = "URL")]
    elastic: Option<String>,

    /// Only consider objects created before this RFC 3339 timestamp.
    #[arg(long, value_parser = parse_timestamp, conflicts_with = "allsince")]
    before: Option<DateTime<Utc>>,

    /// Collect daily statistics since this RFC 3339 timestamp until now.
    #[arg(long, value_parser = parse_timestamp)]
    allsince: Option<DateTime<Utc>>,

    /// Log statistics, but don't push them anywhere.
    #[arg(long)]
    nopush: bool,

    /// Import a Grafista SQLite database and push one document per day.
    #[arg(long, value_name = "PATH", conflicts_with_all = ["reverse", "reindex", "reset"])]
    import: Option<PathBuf>,

    /// Copy the search store into the archive, the reverse of normal operation.
    #[arg(long, conflicts_with = "reindex")]
    reverse: bool,

    /// Reindex the search store from the archive.
    #[arg(long)]
    reindex: bool,

    /// Delete the search index.
    #[arg(long, conflicts_with_all = ["reverse", "reindex"])]
    reset: bool,
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("expected an RFC 3339 timestamp: {}", e))
}

impl Cli {
    fn log_level(&self) -> &'static str {
        if self.debug {
            "debug"
        } else if self.verbose {
            "info"
        } else {
            "warn"
        }
    }

    fn apply(&self, config: &mut CollectorConfig) {
        if let Some(url) = &self.mongo {
            config.operational.url = url.clone();
        }
        if let Some(url) = &self.storage {
            config.operational.storage_url = Some(url.clone());
        }
        if let Some(url) = &self.elastic {
            config.search.url = url.clone();
        }
        if self.nopush {
            config.dry_run = true;
        }
    }

    fn mode(&self) -> RunMode {
        if let Some(path) = &self.import {
            RunMode::Import { path: path.clone() }
        } else if self.reset {
            RunMode::Reset
        } else if self.reverse {
            RunMode::Reverse
        } else if self.reindex {
            RunMode::Reindex
        } else if let Some(begin) = self.allsince {
            RunMode::CollectSince { begin }
        } else {
            RunMode::Collect { before: self.before }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_level()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = match &cli.config {
        Some(path) => CollectorConfig::load(path)?,
        None => CollectorConfig::default(),
    };
    cli.apply(&mut config);

    let mode = cli.mode();
    let coordinator = Coordinator::connect(config)
        .await
        .context("unable to connect")?;

    let outcome = coordinator
        .run(mode.clone())
        .await
        .with_context(|| format!("{} failed", mode))?;
    warn!(outcome = %outcome, "Done");
    Ok(())
}
