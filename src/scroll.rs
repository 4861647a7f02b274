// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cursor-based traversal of every document in the search store.
//!
//! ```text
//!   Initial ──first page──► Scrolling ──next page──► Scrolling ──seen ≥ total──► Finished
//!      │                       │                                                  ▲
//!      └──────── error ────────┴──────────────── error / close / drop ────────────┘
//! ```
//!
//! Wire protocol:
//!
//! - first page: `GET <collection>/_search?scroll=<keepalive>` with `{size, sort: ["_doc"]}`
//! - next pages: `GET /_search/scroll` with `{scroll: <keepalive>, scroll_id}`
//! - release: `GET /_search/scroll/<scroll_id>`
//!
//! Pages are fetched lazily. The traversal ends once the number of documents
//! seen reaches the total declared by the store. The cursor is released
//! exactly once on every exit path; a failed release is logged only.

use crate::codec::JsonObject;
use crate::error::{ScrollError, TransportError};
use crate::metrics;
use crate::transport::SearchStoreClient;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, info, trace, warn};
use url::Url;

/// One document returned by a search page.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SearchHit {
    #[serde(rename = "_index", default)]
    pub index: String,
    #[serde(rename = "_type", default)]
    pub doc_type: Option<String>,
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_score", default)]
    pub score: Option<f64>,
    #[serde(rename = "_source", default)]
    pub source: JsonObject,
}

/// A page of search results, as answered by the store.
#[derive(Debug, Clone, Deserialize)]
pub struct ScrollPage {
    #[serde(rename = "_scroll_id", default)]
    pub scroll_id: Option<String>,
    pub hits: PageHits,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PageHits {
    pub total: HitsTotal,
    #[serde(default)]
    pub hits: Vec<SearchHit>,
}

/// `hits.total` is a bare integer on older stores and `{value, relation}` on newer ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum HitsTotal {
    Count(u64),
    Counted { value: u64 },
}

impl HitsTotal {
    pub fn value(&self) -> u64 {
        match self {
            Self::Count(value) | Self::Counted { value } => *value,
        }
    }
}

/// Parse a raw page body.
pub fn parse_page(body: &[u8]) -> Result<ScrollPage, serde_json::Error> {
    serde_json::from_slice(body)
}

#[derive(Serialize)]
struct FirstPageRequest {
    size: usize,
    sort: [&'static str; 1],
}

#[derive(Serialize)]
struct NextPageRequest<'a> {
    scroll: &'a str,
    scroll_id: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ScrollState {
    Initial,
    Scrolling { scroll_id: String },
    Finished,
}

/// Lazily pages through the whole collection. Not restartable.
pub struct ScrollReader {
    store: SearchStoreClient,
    page_size: usize,
    keepalive: String,
    state: ScrollState,
    buffer: VecDeque<SearchHit>,
    seen: u64,
    total: Option<u64>,
    pages: usize,
    /// Most recent cursor handed out by the store and not yet released.
    open_cursor: Option<String>,
}

impl ScrollReader {
    pub fn new(store: SearchStoreClient, page_size: usize, keepalive: impl Into<String>) -> Self {
        Self {
            store,
            page_size: page_size.max(1),
            keepalive: keepalive.into(),
            state: ScrollState::Initial,
            buffer: VecDeque::new(),
            seen: 0,
            total: None,
            pages: 0,
            open_cursor: None,
        }
    }

    /// Page requests issued so far.
    pub fn pages_fetched(&self) -> usize {
        self.pages
    }

    /// Total declared by the store, once the first page has arrived.
    pub fn total(&self) -> Option<u64> {
        self.total
    }

    pub fn is_finished(&self) -> bool {
        self.state == ScrollState::Finished && self.buffer.is_empty()
    }

    /// The next document, `None` at the end, or the error that ended the traversal.
    ///
    /// After an error the traversal is over and every later call returns `None`.
    pub async fn next_hit(&mut self) -> Option<Result<SearchHit, ScrollError>> {
        loop {
            if let Some(hit) = self.buffer.pop_front() {
                return Some(Ok(hit));
            }
            if self.state == ScrollState::Finished {
                return None;
            }
            if let Err(e) = self.fetch_page().await {
                warn!(error = %e, seen = self.seen, "Scroll traversal failed");
                self.finish().await;
                return Some(Err(e));
            }
        }
    }

    /// Stop early, releasing the cursor.
    pub async fn close(mut self) {
        self.buffer.clear();
        self.finish().await;
    }

    /// Adapt into a stream; dropping the stream releases the cursor.
    pub fn into_stream(self) -> impl Stream<Item = Result<SearchHit, ScrollError>> + Send {
        futures::stream::unfold(self, |mut reader| async move {
            reader.next_hit().await.map(|item| (item, reader))
        })
    }

    async fn fetch_page(&mut self) -> Result<(), ScrollError> {
        let page_number = self.pages + 1;
        let page = match &self.state {
            ScrollState::Finished => return Ok(()),
            ScrollState::Initial => {
                let url = search_url(self.store.collection_url(), &self.keepalive)
                    .map_err(|source| ScrollError::Page { page: page_number, source })?;
                let body = FirstPageRequest {
                    size: self.page_size,
                    sort: ["_doc"],
                };
                debug!(url = %url, size = self.page_size, "Opening scroll");
                self.store.get_with_body::<_, ScrollPage>(&url, &body).await
            }
            ScrollState::Scrolling { scroll_id } => {
                let url = scroll_url(self.store.collection_url())
                    .map_err(|source| ScrollError::Page { page: page_number, source })?;
                let body = NextPageRequest {
                    scroll: &self.keepalive,
                    scroll_id,
                };
                trace!(url = %url, page = page_number, "Fetching scroll page");
                self.store.get_with_body::<_, ScrollPage>(&url, &body).await
            }
        }
        .map_err(|source| ScrollError::Page { page: page_number, source })?;
        self.pages = page_number;

        let scroll_id = page
            .scroll_id
            .filter(|id| !id.is_empty())
            .ok_or(ScrollError::MissingCursor { page: page_number })?;
        self.open_cursor = Some(scroll_id.clone());

        let total = page.hits.total.value();
        let count = page.hits.hits.len();
        self.total = Some(total);
        metrics::record_scroll_page(count);

        if count == 0 && self.seen < total {
            return Err(ScrollError::EmptyPage {
                page: page_number,
                seen: self.seen,
                total,
            });
        }

        self.seen += count as u64;
        self.buffer.extend(page.hits.hits);
        debug!(page = page_number, documents = count, seen = self.seen, total, "Scroll page received");

        if self.seen >= total {
            info!(pages = self.pages, documents = self.seen, "Scroll traversal complete");
            self.finish().await;
        } else {
            self.state = ScrollState::Scrolling { scroll_id };
        }
        Ok(())
    }

    async fn finish(&mut self) {
        self.state = ScrollState::Finished;
        if let Some(scroll_id) = self.open_cursor.take() {
            release_cursor(&self.store, &scroll_id).await;
        }
    }
}

impl Drop for ScrollReader {
    fn drop(&mut self) {
        let Some(scroll_id) = self.open_cursor.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let store = self.store.clone();
                handle.spawn(async move { release_cursor(&store, &scroll_id).await });
            }
            Err(_) => warn!("No runtime to release scroll cursor; leaving it to expire"),
        }
    }
}

fn search_url(collection: &Url, keepalive: &str) -> Result<Url, TransportError> {
    let mut url = collection
        .join("_search")
        .map_err(|e| TransportError::Url(e.to_string()))?;
    url.query_pairs_mut().append_pair("scroll", keepalive);
    Ok(url)
}

fn scroll_url(collection: &Url) -> Result<Url, TransportError> {
    collection
        .join("/_search/scroll")
        .map_err(|e| TransportError::Url(e.to_string()))
}

fn release_url(collection: &Url, scroll_id: &str) -> Result<Url, TransportError> {
    let mut url = scroll_url(collection)?;
    url.path_segments_mut()
        .map_err(|_| TransportError::Url(collection.to_string()))?
        .push(scroll_id);
    Ok(url)
}

/// Best-effort cursor release; failures are logged, never returned.
async fn release_cursor(store: &SearchStoreClient, scroll_id: &str) {
    let url = match release_url(store.collection_url(), scroll_id) {
        Ok(url) => url,
        Err(e) => {
            warn!(error = %e, "Unable to build scroll release URL");
            metrics::record_scroll_release(false);
            return;
        }
    };

    match store.http().get(url.clone()).send().await {
        Ok(response) if response.status().is_success() => {
            debug!(url = %url, "Scroll cursor released");
            metrics::record_scroll_release(true);
        }
        Ok(response) => {
            warn!(url = %url, status = response.status().as_u16(), "Unable to release scroll cursor");
            metrics::record_scroll_release(false);
        }
        Err(e) => {
            warn!(url = %url, error = %e, "Unable to release scroll cursor");
            metrics::record_scroll_release(false);
        }
    }
}
