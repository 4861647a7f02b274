//! Metrics for observability.
//!
//! Exports Prometheus-compatible metrics for:
//! - Aggregation step latency and outcome
//! - Remote lookup outcome
//! - Search store requests
//! - Scroll traversal progress
//! - Replay and push throughput
//!
//! The library only records; installing an exporter is the binary's call.
//!
//! # Metric Naming Convention
//!
//! All metrics are prefixed with `statscollector_` and follow Prometheus conventions:
//! - Counters end in `_total`
//! - Histograms track distributions (duration, size)
//!
//! # Usage
//!
//! ```rust,no_run
//! use stats_collector::metrics;
//! use stats_collector::aggregation::AggregationStep;
//! use std::time::Duration;
//!
//! metrics::record_aggregation_step(AggregationStep::Files, Duration::from_millis(120), true);
//! metrics::record_search_request("PUT", "stored", Duration::from_millis(8));
//! ```

use crate::aggregation::AggregationStep;
use metrics::{counter, histogram};
use std::time::Duration;

fn status_label(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "failure"
    }
}

/// Record one local aggregation step.
pub fn record_aggregation_step(step: AggregationStep, duration: Duration, success: bool) {
    counter!(
        "statscollector_aggregation_steps_total",
        "step" => step.as_str(),
        "status" => status_label(success)
    )
    .increment(1);
    histogram!("statscollector_aggregation_step_duration_seconds", "step" => step.as_str())
        .record(duration.as_secs_f64());
}

/// Record a remote lookup outcome.
pub fn record_remote_lookup(lookup: &'static str, success: bool) {
    counter!(
        "statscollector_remote_lookups_total",
        "lookup" => lookup,
        "status" => status_label(success)
    )
    .increment(1);
}

/// Record a completed collection (whole snapshot).
pub fn record_collection(duration: Duration, success: bool) {
    counter!("statscollector_collections_total", "status" => status_label(success)).increment(1);
    histogram!("statscollector_collection_duration_seconds").record(duration.as_secs_f64());
}

/// Record a search store request by method and outcome
/// (`stored`, `not_found`, `rejected`, `network`).
pub fn record_search_request(method: &str, outcome: &'static str, duration: Duration) {
    counter!(
        "statscollector_search_requests_total",
        "method" => method.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    histogram!("statscollector_search_request_duration_seconds", "method" => method.to_string())
        .record(duration.as_secs_f64());
}

/// Record one scroll page and the number of documents it carried.
pub fn record_scroll_page(documents: usize) {
    counter!("statscollector_scroll_pages_total").increment(1);
    counter!("statscollector_scroll_documents_total").increment(documents as u64);
}

/// Record a scroll cursor release attempt.
pub fn record_scroll_release(success: bool) {
    counter!("statscollector_scroll_releases_total", "status" => status_label(success)).increment(1);
}

/// Record documents moved by a replay (`reverse` or `reindex`).
pub fn record_replayed(direction: &'static str, count: u64) {
    counter!("statscollector_replayed_documents_total", "direction" => direction).increment(count);
}

/// Record a snapshot written to one of the two stores (`archive` or `search`).
pub fn record_snapshot_pushed(target: &'static str, success: bool) {
    counter!(
        "statscollector_snapshots_pushed_total",
        "target" => target,
        "status" => status_label(success)
    )
    .increment(1);
}

/// Record legacy importer output.
pub fn record_imported_days(days: u64, dropped_samples: u64) {
    counter!("statscollector_imported_days_total").increment(days);
    if dropped_samples > 0 {
        counter!("statscollector_import_dropped_samples_total").increment(dropped_samples);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // No recorder is installed in unit tests; recording must be a silent no-op.
    #[test]
    fn test_recording_without_recorder() {
        record_aggregation_step(AggregationStep::Users, Duration::from_millis(5), false);
        record_remote_lookup("subscription", true);
        record_collection(Duration::from_secs(1), true);
        record_search_request("POST", "stored", Duration::from_millis(3));
        record_scroll_page(500);
        record_scroll_release(true);
        record_replayed("reverse", 10);
        record_snapshot_pushed("archive", true);
        record_imported_days(3, 1);
    }
}
