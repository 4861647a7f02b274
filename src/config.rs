//! Configuration for the stats collector.
//!
//! Configuration can be built programmatically, deserialized from YAML/JSON with
//! [`CollectorConfig::load`], and is finally overridden by command-line flags.
//!
//! # Quick Start
//!
//! ```rust
//! use stats_collector::config::CollectorConfig;
//!
//! let config = CollectorConfig {
//!     dry_run: true,
//!     ..CollectorConfig::for_testing("http://127.0.0.1:9200/cloudstats/stats/")
//! };
//! assert!(config.validate().is_ok());
//! ```
//!
//! # Configuration Structure
//!
//! ```text
//! CollectorConfig
//! ├── operational: OperationalStoreConfig  # source database + snapshot archive
//! ├── search: SearchStoreConfig            # collection URL, scroll paging, timeouts
//! ├── remote: RemoteLookupConfig           # subscription + identity-provider endpoints
//! ├── replay: ReplayConfig                 # progress logging cadence
//! └── dry_run: bool                        # log snapshots instead of pushing
//! ```
//!
//! # YAML Example
//!
//! ```yaml
//! operational:
//!   url: "mongodb://db.internal/cloud"
//!   storage_url: "mongodb://stats.internal/cloud"
//!
//! search:
//!   url: "http://es.internal:9200/cloudstats/stats/"
//!   scroll_page_size: 500
//!   scroll_keepalive: "1m"
//!   request_timeout: "30s"
//!
//! remote:
//!   subscription_url: "https://store.blender.org/product-counter/?prod=cloud"
//!   identity_provider_url: "https://www.blender.org/id/api/stats"
//!
//! replay:
//!   progress_interval: 100
//! ```

use crate::error::{CollectorError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

// ═══════════════════════════════════════════════════════════════════════════════
// Top-level config
// ═══════════════════════════════════════════════════════════════════════════════

/// The top-level config object handed to the [`Coordinator`](crate::Coordinator).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectorConfig {
    #[serde(default)]
    pub operational: OperationalStoreConfig,

    #[serde(default)]
    pub search: SearchStoreConfig,

    #[serde(default)]
    pub remote: RemoteLookupConfig,

    #[serde(default)]
    pub replay: ReplayConfig,

    /// Log snapshots as pretty JSON instead of pushing them anywhere.
    #[serde(default)]
    pub dry_run: bool,
}

impl CollectorConfig {
    /// Create a minimal config for testing against a local search store.
    pub fn for_testing(search_url: &str) -> Self {
        Self {
            search: SearchStoreConfig {
                url: search_url.to_string(),
                request_timeout: "5s".to_string(),
                ..Default::default()
            },
            remote: RemoteLookupConfig {
                subscription_url: "http://127.0.0.1:1/product-counter/".to_string(),
                identity_provider_url: "http://127.0.0.1:1/id/api/stats".to_string(),
                timeout: "1s".to_string(),
            },
            replay: ReplayConfig { progress_interval: 10 },
            ..Default::default()
        }
    }

    /// Load a config file. `.yaml`/`.yml` files are parsed as YAML, anything else as JSON.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| CollectorError::Config(format!("{}: {}", path.display(), e)))?;

        let is_yaml = matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("yaml") | Some("yml")
        );
        let config: Self = if is_yaml {
            serde_yaml::from_str(&raw)
                .map_err(|e| CollectorError::Config(format!("{}: {}", path.display(), e)))?
        } else {
            serde_json::from_str(&raw)
                .map_err(|e| CollectorError::Config(format!("{}: {}", path.display(), e)))?
        };
        Ok(config)
    }

    /// Check that every URL parses and paging parameters are usable.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("search.url", &self.search.url),
            ("remote.subscription_url", &self.remote.subscription_url),
            ("remote.identity_provider_url", &self.remote.identity_provider_url),
        ] {
            Url::parse(value)
                .map_err(|e| CollectorError::Config(format!("{} {:?}: {}", name, value, e)))?;
        }
        if !self.operational.url.starts_with("mongodb://")
            && !self.operational.url.starts_with("mongodb+srv://")
        {
            return Err(CollectorError::Config(format!(
                "operational.url {:?} is not a MongoDB connection string",
                self.operational.url
            )));
        }
        if self.search.scroll_page_size == 0 {
            return Err(CollectorError::Config("search.scroll_page_size must be > 0".to_string()));
        }
        if self.replay.progress_interval == 0 {
            return Err(CollectorError::Config("replay.progress_interval must be > 0".to_string()));
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// OperationalStoreConfig: where counts come from, where snapshots are archived
// ═══════════════════════════════════════════════════════════════════════════════

/// Operational store connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationalStoreConfig {
    /// Connection string of the database holding files, projects, nodes and users.
    /// The database name is taken from the URL path.
    #[serde(default = "default_operational_url")]
    pub url: String,

    /// Connection string of the database that archives snapshots.
    /// Defaults to `url` when unset.
    #[serde(default)]
    pub storage_url: Option<String>,

    /// Collection that archives snapshots.
    #[serde(default = "default_stats_collection")]
    pub stats_collection: String,
}

fn default_operational_url() -> String {
    "mongodb://localhost/cloud".to_string()
}

fn default_stats_collection() -> String {
    "cloudstats".to_string()
}

impl Default for OperationalStoreConfig {
    fn default() -> Self {
        Self {
            url: default_operational_url(),
            storage_url: None,
            stats_collection: default_stats_collection(),
        }
    }
}

impl OperationalStoreConfig {
    /// The snapshot archive connection string (falls back to the operational one).
    pub fn storage_url(&self) -> &str {
        self.storage_url.as_deref().unwrap_or(&self.url)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SearchStoreConfig: secondary store
// ═══════════════════════════════════════════════════════════════════════════════

/// Search store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchStoreConfig {
    /// Collection URL (`<host>/<index>/<type>/`).
    #[serde(default = "default_search_url")]
    pub url: String,

    /// Documents requested per scroll page.
    #[serde(default = "default_scroll_page_size")]
    pub scroll_page_size: usize,

    /// Scroll cursor keepalive, sent verbatim to the store (e.g. "1m").
    #[serde(default = "default_scroll_keepalive")]
    pub scroll_keepalive: String,

    /// Per-request timeout as a duration string (e.g. "30s").
    #[serde(default = "default_request_timeout")]
    pub request_timeout: String,
}

fn default_search_url() -> String {
    "http://localhost:9200/cloudstats/stats/".to_string()
}

fn default_scroll_page_size() -> usize {
    500
}

fn default_scroll_keepalive() -> String {
    "1m".to_string()
}

fn default_request_timeout() -> String {
    "30s".to_string()
}

impl Default for SearchStoreConfig {
    fn default() -> Self {
        Self {
            url: default_search_url(),
            scroll_page_size: default_scroll_page_size(),
            scroll_keepalive: default_scroll_keepalive(),
            request_timeout: default_request_timeout(),
        }
    }
}

impl SearchStoreConfig {
    /// Parse the request timeout string to a Duration.
    pub fn request_timeout_duration(&self) -> Duration {
        humantime::parse_duration(&self.request_timeout).unwrap_or(Duration::from_secs(30))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RemoteLookupConfig: out-of-band counters
// ═══════════════════════════════════════════════════════════════════════════════

/// Endpoints of the two remote lookups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteLookupConfig {
    /// Answers `{"total_sold": N}`.
    #[serde(default = "default_subscription_url")]
    pub subscription_url: String,

    /// Answers `{"users": {...}}`.
    #[serde(default = "default_identity_provider_url")]
    pub identity_provider_url: String,

    /// Per-lookup timeout as a duration string.
    #[serde(default = "default_remote_timeout")]
    pub timeout: String,
}

fn default_subscription_url() -> String {
    "https://store.blender.org/product-counter/?prod=cloud".to_string()
}

fn default_identity_provider_url() -> String {
    "https://www.blender.org/id/api/stats".to_string()
}

fn default_remote_timeout() -> String {
    "10s".to_string()
}

impl Default for RemoteLookupConfig {
    fn default() -> Self {
        Self {
            subscription_url: default_subscription_url(),
            identity_provider_url: default_identity_provider_url(),
            timeout: default_remote_timeout(),
        }
    }
}

impl RemoteLookupConfig {
    /// Parse the lookup timeout string to a Duration.
    pub fn timeout_duration(&self) -> Duration {
        humantime::parse_duration(&self.timeout).unwrap_or(Duration::from_secs(10))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ReplayConfig
// ═══════════════════════════════════════════════════════════════════════════════

/// Reverse-import / reindex settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// Log progress every this many documents.
    #[serde(default = "default_progress_interval")]
    pub progress_interval: u64,
}

fn default_progress_interval() -> u64 {
    100
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            progress_interval: default_progress_interval(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = CollectorConfig::default();
        assert_eq!(config.operational.url, "mongodb://localhost/cloud");
        assert_eq!(config.operational.storage_url(), "mongodb://localhost/cloud");
        assert_eq!(config.operational.stats_collection, "cloudstats");
        assert_eq!(config.search.url, "http://localhost:9200/cloudstats/stats/");
        assert_eq!(config.search.scroll_page_size, 500);
        assert_eq!(config.search.scroll_keepalive, "1m");
        assert_eq!(config.replay.progress_interval, 100);
        assert!(!config.dry_run);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_storage_url_override() {
        let config = OperationalStoreConfig {
            storage_url: Some("mongodb://archive/cloud".to_string()),
            ..Default::default()
        };
        assert_eq!(config.storage_url(), "mongodb://archive/cloud");
    }

    #[test]
    fn test_request_timeout_various_formats() {
        let test_cases = [
            ("5s", Duration::from_secs(5)),
            ("1m", Duration::from_secs(60)),
            ("500ms", Duration::from_millis(500)),
        ];

        for (input, expected) in test_cases {
            let config = SearchStoreConfig {
                request_timeout: input.to_string(),
                ..Default::default()
            };
            assert_eq!(config.request_timeout_duration(), expected, "Failed for input: {}", input);
        }
    }

    #[test]
    fn test_timeout_invalid_fallback() {
        let search = SearchStoreConfig {
            request_timeout: "soon".to_string(),
            ..Default::default()
        };
        assert_eq!(search.request_timeout_duration(), Duration::from_secs(30));

        let remote = RemoteLookupConfig {
            timeout: "".to_string(),
            ..Default::default()
        };
        assert_eq!(remote.timeout_duration(), Duration::from_secs(10));
    }

    #[test]
    fn test_validate_rejects_bad_search_url() {
        let config = CollectorConfig::for_testing("not a url");
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("search.url"));
    }

    #[test]
    fn test_validate_rejects_non_mongo_url() {
        let mut config = CollectorConfig::default();
        config.operational.url = "postgres://localhost/cloud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_page_size() {
        let mut config = CollectorConfig::default();
        config.search.scroll_page_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{"search": {"url": "http://es:9200/cloudstats/stats/"}}"#;
        let config: CollectorConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.search.url, "http://es:9200/cloudstats/stats/");
        assert_eq!(config.search.scroll_page_size, 500);
        assert_eq!(config.operational.url, "mongodb://localhost/cloud");
    }

    #[test]
    fn test_load_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("collector.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "operational:\n  url: \"mongodb://db/cloud\"\n  storage_url: \"mongodb://archive/cloud\"\nsearch:\n  scroll_page_size: 50\ndry_run: true"
        )
        .unwrap();

        let config = CollectorConfig::load(&path).unwrap();
        assert_eq!(config.operational.url, "mongodb://db/cloud");
        assert_eq!(config.operational.storage_url(), "mongodb://archive/cloud");
        assert_eq!(config.search.scroll_page_size, 50);
        assert!(config.dry_run);
    }

    #[test]
    fn test_load_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("collector.json");
        std::fs::write(&path, r#"{"replay": {"progress_interval": 25}}"#).unwrap();

        let config = CollectorConfig::load(&path).unwrap();
        assert_eq!(config.replay.progress_interval, 25);
    }

    #[test]
    fn test_load_missing_file() {
        let err = CollectorConfig::load("/nonexistent/collector.yaml").unwrap_err();
        assert!(matches!(err, CollectorError::Config(_)));
    }

    #[test]
    fn test_config_json_roundtrip() {
        let config = CollectorConfig::for_testing("http://127.0.0.1:9200/cloudstats/stats/");
        let json = serde_json::to_string(&config).unwrap();
        let parsed: CollectorConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.search.url, config.search.url);
        assert_eq!(parsed.remote.timeout, "1s");
        assert_eq!(parsed.replay.progress_interval, 10);
    }
}
