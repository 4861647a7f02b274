// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The stats snapshot.
//!
//! [`Stats`] is the one in-memory record of a collection run. Its serde
//! derive *is* the wire form sent to the search store (JSON, RFC 3339
//! timestamp, no identity). The store form lives in [`crate::codec`].
//!
//! Counters that could not be obtained are `None` and are omitted from every
//! serialized form, never written as `null` or `0`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Current snapshot schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Group key used when a grouped field is missing, null or empty.
pub const NONE_KEY: &str = "none";

/// Per-key tallies (backend, status, node type, user type).
pub type Tally = BTreeMap<String, i64>;

/// One statistics snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    #[serde(rename = "stats_schema_version")]
    pub schema_version: i32,

    /// The instant (or historical cutoff) the snapshot represents.
    pub timestamp: DateTime<Utc>,

    #[serde(default)]
    pub files: FileStats,

    #[serde(default)]
    pub projects: ProjectStats,

    #[serde(default)]
    pub nodes: NodeStats,

    #[serde(default)]
    pub users: UserStats,

    /// Counters reported by the identity provider, when it answered.
    #[serde(rename = "blender_id", default, skip_serializing_if = "Option::is_none")]
    pub identity_provider: Option<IdentityProviderStats>,
}

impl Stats {
    /// An empty snapshot for the given instant, at the current schema version.
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            timestamp,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileStats {
    pub expired_link_count: i64,
    pub no_link_count: i64,
    pub total_bytes_storage_used: i64,
    pub total_bytes_storage_used_per_backend: Tally,
    pub file_count_total: i64,
    pub file_count_per_status: Tally,
    pub file_count_per_backend: Tally,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectStats {
    pub public_count: i64,
    pub private_count: i64,
    pub home_project_count: i64,
    pub total_count: i64,
    pub total_deleted_count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeStats {
    pub public_node_count_per_type: Tally,
    pub total_public_node_count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserStats {
    pub total_user_count: i64,
    /// `total_user_count` minus service accounts.
    pub total_real_user_count: i64,
    pub count_per_type: Tally,
    /// Home projects holding a synced `startup.blend`.
    pub blender_sync_count: i64,
    /// Active subscriptions, when the store lookup answered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscriber_count: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityProviderStats {
    pub confirmed_email_count: i64,
    pub unconfirmed_email_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub privacy_policy_agreed: Option<PrivacyPolicyAgreement>,
    pub total_user_count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrivacyPolicyAgreement {
    pub latest: i64,
    pub obsolete: i64,
    pub never: i64,
}

/// Map a raw group key to its tally key: missing, null and empty become [`NONE_KEY`].
pub fn group_key(raw: Option<&str>) -> String {
    match raw {
        Some(key) if !key.is_empty() => key.to_string(),
        _ => NONE_KEY.to_string(),
    }
}

/// Legacy per-day counters imported from a Grafista database.
///
/// Only the series Grafista recorded are present; everything else is absent
/// rather than zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyStats {
    #[serde(rename = "stats_schema_version")]
    pub schema_version: i32,
    pub timestamp: DateTime<Utc>,
    pub nodes: DailyNodeStats,
    pub users: DailyUserStats,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyNodeStats {
    pub public_node_count_per_type: Tally,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyUserStats {
    pub count_per_type: Tally,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_user_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blender_sync_count: Option<i64>,
}

impl DailyStats {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            timestamp,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn sample() -> Stats {
        let mut stats = Stats::new(Utc.with_ymd_and_hms(2017, 9, 12, 10, 0, 0).unwrap());
        stats.files.file_count_total = 3;
        stats.files.file_count_per_backend.insert("gcs".to_string(), 2);
        stats.files.file_count_per_backend.insert(NONE_KEY.to_string(), 1);
        stats.users.total_user_count = 10;
        stats
    }

    #[test]
    fn test_wire_keys() {
        let value = serde_json::to_value(sample()).unwrap();
        assert_eq!(value["stats_schema_version"], json!(1));
        assert_eq!(value["timestamp"], json!("2017-09-12T10:00:00Z"));
        assert_eq!(value["files"]["file_count_total"], json!(3));
        assert_eq!(value["files"]["file_count_per_backend"]["none"], json!(1));
        assert!(value["projects"].get("total_deleted_count").is_some());
        assert!(value["nodes"].get("public_node_count_per_type").is_some());
    }

    #[test]
    fn test_unknown_optionals_omitted() {
        let value = serde_json::to_value(sample()).unwrap();
        assert!(value.get("blender_id").is_none());
        assert!(value["users"].get("subscriber_count").is_none());
        assert!(!value.to_string().contains("null"));
    }

    #[test]
    fn test_known_optionals_present() {
        let mut stats = sample();
        stats.users.subscriber_count = Some(0);
        stats.identity_provider = Some(IdentityProviderStats {
            confirmed_email_count: 5,
            unconfirmed_email_count: 2,
            privacy_policy_agreed: None,
            total_user_count: 7,
        });

        let value = serde_json::to_value(&stats).unwrap();
        assert_eq!(value["users"]["subscriber_count"], json!(0));
        assert_eq!(value["blender_id"]["total_user_count"], json!(7));
        assert!(value["blender_id"].get("privacy_policy_agreed").is_none());
    }

    #[test]
    fn test_roundtrip() {
        let mut stats = sample();
        stats.users.subscriber_count = Some(42);
        let json = serde_json::to_string(&stats).unwrap();
        let parsed: Stats = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, stats);
    }

    #[test]
    fn test_group_key_sentinel() {
        assert_eq!(group_key(None), NONE_KEY);
        assert_eq!(group_key(Some("")), NONE_KEY);
        assert_eq!(group_key(Some("gcs")), "gcs");
    }

    #[test]
    fn test_daily_stats_omits_unrecorded_series() {
        let mut daily = DailyStats::new(Utc.with_ymd_and_hms(2016, 3, 1, 0, 0, 0).unwrap());
        daily.nodes.public_node_count_per_type.insert("asset".to_string(), 12);

        let value = serde_json::to_value(&daily).unwrap();
        assert_eq!(value["nodes"]["public_node_count_per_type"]["asset"], json!(12));
        assert!(value["users"].get("total_user_count").is_none());
        assert!(value.get("files").is_none());
    }
}
