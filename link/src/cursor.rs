//! Pull-based result cursor with read-ahead caching.
//!
//! A [`QueryCursor`] walks `[offset, offset + limit)` of a query's
//! result set, fetching one cache window at a time through
//! `getResult`. It is forward-only and cannot be restarted.

use crate::client::LogDbClient;
use crate::error::Result;
use log::debug;
use serde_json::Value as JsonValue;

/// Rows fetched per `getResult` call.
pub const DEFAULT_FETCH_WINDOW: u64 = 1000;

/// Lazy, forward-only reader over a query's result rows.
///
/// With `autoclose`, `removeQuery` is issued exactly once on every exit
/// path: awaited on normal exhaustion or [`close`](Self::close), and
/// fired from a background task when the cursor is dropped mid-way.
pub struct QueryCursor {
    client: LogDbClient,
    query_id: u64,
    /// Absolute index of the next row to yield.
    next_index: u64,
    /// One past the last requested row.
    end: u64,
    window: Vec<JsonValue>,
    window_offset: u64,
    fetch_size: u64,
    fetched: bool,
    done: bool,
    autoclose: bool,
    closed: bool,
}

impl QueryCursor {
    pub(crate) fn new(
        client: LogDbClient,
        query_id: u64,
        offset: u64,
        limit: u64,
        autoclose: bool,
    ) -> Self {
        Self {
            client,
            query_id,
            next_index: offset,
            end: offset.saturating_add(limit),
            window: Vec::new(),
            window_offset: offset,
            fetch_size: DEFAULT_FETCH_WINDOW,
            fetched: false,
            done: false,
            autoclose,
            closed: false,
        }
    }

    /// Yield the next row, fetching the next cache window when the
    /// current one is exhausted.
    ///
    /// Returns `None` once the requested range is covered or the server
    /// runs out of rows (a window shorter than the fetch size). A fetch
    /// error ends the iteration after running the autoclose cleanup.
    pub async fn next(&mut self) -> Option<Result<JsonValue>> {
        if self.done {
            return None;
        }
        if self.next_index >= self.end {
            self.finish().await;
            return None;
        }

        if !self.fetched || self.next_index >= self.window_offset + self.fetch_size {
            let fetch_offset = if self.fetched {
                self.window_offset + self.fetch_size
            } else {
                self.next_index
            };
            match self
                .client
                .get_result(self.query_id, fetch_offset, self.fetch_size)
                .await
            {
                Ok(page) => {
                    self.window = page.rows;
                    self.window_offset = fetch_offset;
                    self.fetched = true;
                }
                Err(e) => {
                    self.finish().await;
                    return Some(Err(e));
                }
            }
        }

        let relative = (self.next_index - self.window_offset) as usize;
        if relative >= self.window.len() {
            // Short window: no more rows available on the server.
            self.finish().await;
            return None;
        }

        let row = self.window[relative].clone();
        self.next_index += 1;
        Some(Ok(row))
    }

    /// Drain the remaining rows into a vector.
    pub async fn collect(mut self) -> Result<Vec<JsonValue>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next().await {
            rows.push(row?);
        }
        Ok(rows)
    }

    /// Abandon the cursor early. Idempotent; runs the autoclose cleanup.
    pub async fn close(&mut self) {
        self.finish().await;
    }

    /// The query id this cursor reads from.
    pub fn query_id(&self) -> u64 {
        self.query_id
    }

    async fn finish(&mut self) {
        self.done = true;
        if self.autoclose && !self.closed {
            self.closed = true;
            if let Err(e) = self.client.remove_query(self.query_id).await {
                debug!(
                    "[LINK_CURSOR] autoclose remove_query({}) failed: {}",
                    self.query_id, e
                );
            }
        }
    }
}

impl std::fmt::Debug for QueryCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCursor")
            .field("query_id", &self.query_id)
            .field("next_index", &self.next_index)
            .field("end", &self.end)
            .field("window_offset", &self.window_offset)
            .field("fetch_size", &self.fetch_size)
            .field("fetched", &self.fetched)
            .field("done", &self.done)
            .field("autoclose", &self.autoclose)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl Drop for QueryCursor {
    fn drop(&mut self) {
        // Abandoned before exhaustion: fire-and-forget the removal.
        if self.autoclose && !self.closed {
            self.closed = true;
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                let client = self.client.clone();
                let id = self.query_id;
                handle.spawn(async move {
                    if let Err(e) = client.remove_query(id).await {
                        debug!("[LINK_CURSOR] drop-time remove_query({}) failed: {}", id, e);
                    }
                });
            }
        }
    }
}
