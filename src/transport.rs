// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! HTTP exchange with the search store.
//!
//! | Instruction | Request |
//! |-------------|---------|
//! | `Create` | `POST <collection>/` |
//! | `Update { id }` | `PUT <collection>/<id>` |
//! | reset | `DELETE <index>/` (parent of the collection) |
//!
//! Status handling:
//! - `< 300`: success; the assigned `_id` is read from the body and the
//!   `Location` header is resolved and logged
//! - `404`: a normal not-found outcome, body not logged
//! - anything else `>= 300`: [`TransportError::Status`] with the (truncated) body
//!
//! There are no retries; a failed push is reported to the caller.

use crate::config::SearchStoreConfig;
use crate::error::TransportError;
use crate::identity::{Instruction, PreparedPush};
use crate::metrics;
use reqwest::header::LOCATION;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

/// Result of a push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The store accepted the document.
    Stored {
        id: Option<String>,
        version: Option<i64>,
    },
    /// The store answered 404.
    NotFound,
}

#[derive(Debug, Deserialize)]
struct PushResponse {
    #[serde(rename = "_index", default)]
    index: Option<String>,
    #[serde(rename = "_id", default)]
    id: Option<String>,
    #[serde(rename = "_version", default)]
    version: Option<i64>,
    #[serde(default)]
    created: Option<bool>,
    #[serde(default)]
    result: Option<String>,
}

/// Client for one search store collection.
#[derive(Debug, Clone)]
pub struct SearchStoreClient {
    client: reqwest::Client,
    collection_url: Url,
}

impl SearchStoreClient {
    pub fn new(config: &SearchStoreConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout_duration())
            .build()
            .map_err(|e| TransportError::Url(e.to_string()))?;
        Self::with_client(client, &config.url)
    }

    /// Wrap an existing client. A missing trailing slash on the collection URL is added.
    pub fn with_client(client: reqwest::Client, collection_url: &str) -> Result<Self, TransportError> {
        let mut url = Url::parse(collection_url)
            .map_err(|e| TransportError::Url(format!("{:?}: {}", collection_url, e)))?;
        if url.cannot_be_a_base() {
            return Err(TransportError::Url(format!("{:?} cannot hold documents", collection_url)));
        }
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(Self {
            client,
            collection_url: url,
        })
    }

    pub fn collection_url(&self) -> &Url {
        &self.collection_url
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.client
    }

    /// `<collection>/<id>`, with the identity escaped as one path segment.
    pub fn document_url(&self, id: &str) -> Result<Url, TransportError> {
        let mut url = self.collection_url.clone();
        url.path_segments_mut()
            .map_err(|_| TransportError::Url(self.collection_url.to_string()))?
            .pop_if_empty()
            .push(id);
        Ok(url)
    }

    /// The index holding the collection (the collection URL's parent).
    pub fn index_url(&self) -> Result<Url, TransportError> {
        let url = self
            .collection_url
            .join("..")
            .map_err(|e| TransportError::Url(e.to_string()))?;
        if url.path() == "/" {
            return Err(TransportError::Url(format!(
                "{} has no index component",
                self.collection_url
            )));
        }
        Ok(url)
    }

    /// Write one document according to its instruction.
    pub async fn send(&self, push: &PreparedPush) -> Result<SendOutcome, TransportError> {
        let url = match &push.instruction {
            Instruction::Create => self.collection_url.clone(),
            Instruction::Update { id } => self.document_url(id)?,
        };
        let method = Method::from_bytes(push.instruction.method().as_bytes())
            .map_err(|e| TransportError::Url(e.to_string()))?;

        let started = Instant::now();
        let response = self
            .client
            .request(method.clone(), url.clone())
            .json(&push.body)
            .send()
            .await
            .map_err(|source| {
                metrics::record_search_request(method.as_str(), "network", started.elapsed());
                TransportError::Network {
                    method: method.to_string(),
                    url: url.to_string(),
                    source,
                }
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(method = %method, url = %url, "Search store answered 404");
            metrics::record_search_request(method.as_str(), "not_found", started.elapsed());
            return Ok(SendOutcome::NotFound);
        }

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.map_err(|source| TransportError::Network {
            method: method.to_string(),
            url: url.to_string(),
            source,
        })?;

        if status.as_u16() >= 300 {
            let err = TransportError::status(method.as_str(), url.as_str(), status.as_u16(), &body);
            if let TransportError::Status { body, .. } = &err {
                warn!(method = %method, url = %url, status = status.as_u16(), body = %body, "Search store rejected document");
            }
            metrics::record_search_request(method.as_str(), "rejected", started.elapsed());
            return Err(err);
        }
        metrics::record_search_request(method.as_str(), "stored", started.elapsed());

        let parsed: PushResponse =
            serde_json::from_str(&body).map_err(|e| TransportError::InvalidResponse {
                method: method.to_string(),
                url: url.to_string(),
                message: e.to_string(),
            })?;

        if let Some(id) = &parsed.id {
            let resolved = location.as_deref().and_then(|loc| url.join(loc).ok());
            info!(
                id = %id,
                index = parsed.index.as_deref().unwrap_or(""),
                version = parsed.version.unwrap_or(0),
                created = parsed.created.unwrap_or(false),
                result = parsed.result.as_deref().unwrap_or(""),
                location = %resolved.map(|u| u.to_string()).unwrap_or_default(),
                "Document stored"
            );
        }

        Ok(SendOutcome::Stored {
            id: parsed.id,
            version: parsed.version,
        })
    }

    /// Drop the whole index. A missing index is not an error.
    pub async fn reset(&self) -> Result<(), TransportError> {
        let url = self.index_url()?;
        info!(url = %url, "Deleting search index");

        let started = Instant::now();
        let response = self
            .client
            .delete(url.clone())
            .send()
            .await
            .map_err(|source| TransportError::Network {
                method: "DELETE".to_string(),
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            let outcome = if status.is_success() { "deleted" } else { "not_found" };
            metrics::record_search_request("DELETE", outcome, started.elapsed());
            return Ok(());
        }
        metrics::record_search_request("DELETE", "rejected", started.elapsed());
        let body = response.text().await.unwrap_or_default();
        Err(TransportError::status("DELETE", url.as_str(), status.as_u16(), &body))
    }

    /// GET with a JSON body, decoding a JSON answer. Used by the scroll protocol.
    pub(crate) async fn get_with_body<B, T>(&self, url: &Url, body: &B) -> Result<T, TransportError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .client
            .get(url.clone())
            .json(body)
            .send()
            .await
            .map_err(|source| TransportError::Network {
                method: "GET".to_string(),
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|source| TransportError::Network {
            method: "GET".to_string(),
            url: url.to_string(),
            source,
        })?;
        if status.as_u16() >= 300 {
            return Err(TransportError::status("GET", url.as_str(), status.as_u16(), &text));
        }
        serde_json::from_str(&text).map_err(|e| TransportError::InvalidResponse {
            method: "GET".to_string(),
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}
