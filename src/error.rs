// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the stats collector.
//!
//! Errors are split by the component that raises them, and each category has
//! its own blast radius: some end the run, others only degrade the snapshot.
//!
//! # Error Categories
//!
//! | Error Type | Fatal | Description |
//! |------------|-------|-------------|
//! | [`QueryError`] | Yes | Operational store query failed (ends the run) |
//! | [`RemoteLookupError`] | No | Subscription / identity-provider lookup failed (field omitted) |
//! | [`TransportError`] | Yes | Search store rejected a request or was unreachable |
//! | [`ScrollError`] | Yes | A page of a scroll traversal failed (ends the traversal) |
//! | `Config` | Yes | Configuration invalid |
//! | `Codec` | Yes | A document could not be mapped between wire and store form |
//! | `Import` | Yes | Legacy SQLite database could not be read |
//!
//! # Degraded vs. failed runs
//!
//! [`RemoteLookupError`] never escapes the assembler: it is logged and the
//! corresponding optional field is left out of the snapshot. Everything wrapped
//! by [`CollectorError`] makes the run exit non-zero.

use crate::aggregation::AggregationStep;
use crate::stats::Stats;
use thiserror::Error;

/// Result type alias for collector operations.
pub type Result<T> = std::result::Result<T, CollectorError>;

/// Longest response body kept on a [`TransportError::Status`].
pub const MAX_ERROR_BODY_LEN: usize = 1024;

/// An operational-store query failed.
#[derive(Error, Debug)]
#[error("Query error ({operation}): {message}")]
pub struct QueryError {
    pub operation: String,
    pub message: String,
    #[source]
    pub source: Option<mongodb::error::Error>,
}

impl QueryError {
    /// Create a query error from a driver error.
    pub fn mongo(operation: impl Into<String>, source: mongodb::error::Error) -> Self {
        Self {
            operation: operation.into(),
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Create a query error without a driver source.
    pub fn msg(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            message: message.into(),
            source: None,
        }
    }
}

/// One of the two out-of-band HTTP lookups failed.
#[derive(Error, Debug)]
pub enum RemoteLookupError {
    #[error("Remote lookup {url}: request failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Remote lookup {url}: HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("Remote lookup {url}: malformed body: {message}")]
    Malformed { url: String, message: String },
}

/// The search store rejected a request, or could not be reached.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Network-level failure; there is no status code.
    #[error("{method} {url}: request failed: {source}")]
    Network {
        method: String,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The store answered with a status >= 300 (other than a tolerated 404).
    #[error("{method} {url}: HTTP {status}: {body}")]
    Status {
        method: String,
        url: String,
        status: u16,
        body: String,
    },

    /// The store answered 2xx but the body could not be decoded.
    #[error("{method} {url}: invalid response: {message}")]
    InvalidResponse {
        method: String,
        url: String,
        message: String,
    },

    #[error("Invalid search store URL: {0}")]
    Url(String),
}

impl TransportError {
    /// Build a status error, truncating the body to [`MAX_ERROR_BODY_LEN`] characters.
    pub fn status(method: impl Into<String>, url: impl Into<String>, status: u16, body: &str) -> Self {
        Self::Status {
            method: method.into(),
            url: url.into(),
            status,
            body: truncate_body(body),
        }
    }

    /// HTTP status of the failed exchange, if the store answered at all.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Network { .. } | Self::InvalidResponse { .. } | Self::Url(_) => None,
        }
    }
}

/// A scroll traversal ended abnormally.
#[derive(Error, Debug)]
pub enum ScrollError {
    #[error("Scroll page {page} failed: {source}")]
    Page {
        page: usize,
        #[source]
        source: TransportError,
    },

    #[error("Scroll page {page} carried no cursor")]
    MissingCursor { page: usize },

    #[error("Scroll page {page} was empty after {seen} of {total} documents")]
    EmptyPage { page: usize, seen: u64, total: u64 },
}

/// Errors that end a collector run.
#[derive(Error, Debug)]
pub enum CollectorError {
    /// A local aggregation step failed; `partial` holds the steps completed before it.
    #[error("{step}: {source}")]
    Aggregation {
        step: AggregationStep,
        #[source]
        source: QueryError,
        partial: Box<Stats>,
    },

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Scroll(#[from] ScrollError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Import error: {0}")]
    Import(#[from] sqlx::Error),

    /// The search store answered 404 for a snapshot push.
    #[error("Snapshot not stored: {0}")]
    NotStored(String),
}

impl CollectorError {
    /// The aggregation step that failed, if this is an aggregation failure.
    pub fn failed_step(&self) -> Option<AggregationStep> {
        match self {
            Self::Aggregation { step, .. } => Some(*step),
            _ => None,
        }
    }

    /// Whether a fresh run (with the same input) could reasonably succeed.
    ///
    /// Network-level failures are transient; rejected requests, malformed
    /// data and configuration problems are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Aggregation { .. } => true,
            Self::Query(_) => true,
            Self::Transport(e) => matches!(e, TransportError::Network { .. }),
            Self::Scroll(ScrollError::Page { source, .. }) => {
                matches!(source, TransportError::Network { .. })
            }
            Self::Scroll(_) => false,
            Self::Config(_) => false,
            Self::Codec(_) => false,
            Self::Import(_) => false,
            Self::NotStored(_) => false,
        }
    }
}

fn truncate_body(body: &str) -> String {
    match body.char_indices().nth(MAX_ERROR_BODY_LEN) {
        Some((cut, _)) => format!("{}…", &body[..cut]),
        None => body.to_string(),
    }
}
