//! Poll-log feed - fetched rows plus the filter and paging state that
//! produced them.
//!
//! A failed fetch records its message and keeps the previous rows, so the
//! table and map keep showing the last good data.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};
use trackview_env::{EnvError, FetchLogsParams, Fix, LogSource};

/// Filters and paging for the next fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedQuery {
    /// Device search term; empty means all devices
    pub part: String,
    pub start: Option<String>,
    pub end: Option<String>,
    pub limit: u32,
    pub offset: u32,
}

impl Default for FeedQuery {
    fn default() -> Self {
        Self {
            part: String::new(),
            start: None,
            end: None,
            limit: 100,
            offset: 0,
        }
    }
}

impl FeedQuery {
    /// New search term; paging restarts at the first page.
    pub fn search(self, term: &str) -> Self {
        Self {
            part: term.trim().to_string(),
            offset: 0,
            ..self
        }
    }

    pub fn with_offset(self, offset: u32) -> Self {
        Self { offset, ..self }
    }

    pub fn with_window(self, start: Option<String>, end: Option<String>) -> Self {
        Self {
            start,
            end,
            offset: 0,
            ..self
        }
    }

    pub fn to_params(&self) -> FetchLogsParams {
        FetchLogsParams {
            start: self.start.clone(),
            end: self.end.clone(),
            part: (!self.part.is_empty()).then(|| self.part.clone()),
            limit: self.limit,
            offset: self.offset,
        }
    }
}

/// Footer paging arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Page {
    pub offset: u32,
    pub limit: u32,
    pub result_count: usize,
}

impl Page {
    /// Offset of the previous page, `None` on the first page.
    pub fn prev_offset(&self) -> Option<u32> {
        (self.offset > 0).then(|| self.offset.saturating_sub(self.limit))
    }

    /// Offset of the next page, `None` when this page came back short or
    /// the next offset does not fit in a `u32`.
    pub fn next_offset(&self) -> Option<u32> {
        if self.result_count < self.limit as usize {
            return None;
        }
        self.offset.checked_add(self.limit)
    }
}

/// Snapshot of the feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeedState {
    pub logs: Vec<Fix>,
    pub loading: bool,
    pub error: Option<String>,
    pub query: FeedQuery,
}

impl FeedState {
    pub fn page(&self) -> Page {
        Page {
            offset: self.query.offset,
            limit: self.query.limit,
            result_count: self.logs.len(),
        }
    }
}

/// User-facing text for a fetch failure.
pub fn error_message(err: &EnvError) -> String {
    match err {
        EnvError::Backend { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

/// Fetches pages from a [`LogSource`] and keeps the last good rows.
pub struct LogFeed<Src: LogSource> {
    source: Arc<Src>,
    state: FeedState,
}

impl<Src: LogSource> LogFeed<Src> {
    pub fn new(source: Arc<Src>) -> Self {
        Self::with_query(source, FeedQuery::default())
    }

    pub fn with_query(source: Arc<Src>, query: FeedQuery) -> Self {
        Self {
            source,
            state: FeedState {
                query,
                ..FeedState::default()
            },
        }
    }

    pub fn state(&self) -> &FeedState {
        &self.state
    }

    pub fn logs(&self) -> &[Fix] {
        &self.state.logs
    }

    /// Fetches with the current query. Returns true when new rows arrived.
    pub async fn load(&mut self) -> bool {
        self.state.loading = true;
        self.state.error = None;

        let params = self.state.query.to_params();
        debug!(?params, "fetching poll logs");

        let fetched = match self.source.fetch(&params).await {
            Ok(response) => {
                debug!(count = response.count, "poll logs fetched");
                self.state.logs = response.data;
                true
            }
            Err(e) => {
                warn!(error = %e, "poll log fetch failed, keeping previous rows");
                self.state.error = Some(error_message(&e));
                false
            }
        };

        self.state.loading = false;
        fetched
    }

    /// Applies a search term and reloads from the first page.
    pub async fn search(&mut self, term: &str) -> bool {
        self.state.query = self.state.query.clone().search(term);
        self.load().await
    }

    /// Applies a time window and reloads from the first page.
    pub async fn set_window(&mut self, start: Option<String>, end: Option<String>) -> bool {
        self.state.query = self.state.query.clone().with_window(start, end);
        self.load().await
    }

    /// Jumps to `offset` and reloads.
    pub async fn page_to(&mut self, offset: u32) -> bool {
        self.state.query = self.state.query.clone().with_offset(offset);
        self.load().await
    }

    /// Next page if the footer allows it.
    pub async fn next_page(&mut self) -> bool {
        match self.state.page().next_offset() {
            Some(offset) => self.page_to(offset).await,
            None => false,
        }
    }

    /// Previous page if the footer allows it.
    pub async fn prev_page(&mut self) -> bool {
        match self.state.page().prev_offset() {
            Some(offset) => self.page_to(offset).await,
            None => false,
        }
    }
}
