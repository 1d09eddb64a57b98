//! PageQueue: the background fetcher, its bounded byte budget, and the
//! signals it shares with the single consumer (spec §4.2).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::statement::{QueryState, StatementClient, StatementPage};
use crate::types::Column;

/// Minimum wait the consumer applies before rechecking the new-page signal.
const MIN_DEQUEUE_WAIT: Duration = Duration::from_millis(50);
/// Growth increment applied to the dequeue wait on every unsatisfied poll.
const DEQUEUE_WAIT_STEP: Duration = Duration::from_millis(100);
/// Ceiling the dequeue wait will never exceed.
const MAX_DEQUEUE_WAIT: Duration = Duration::from_secs(10);

/// A decoded page together with the byte length of its original encoded
/// form, used as the queue's budget metric (spec §3 "PageQueueItem").
#[derive(Debug, Clone)]
pub struct PageQueueItem {
    /// The decoded page.
    pub page: StatementPage,
    /// Encoded length of the response this page was parsed from.
    pub size_bytes: usize,
}

/// Background fetcher plus the bounded queue and signals it shares with the
/// consumer (spec §4.2, §5).
pub struct PageQueue {
    client: Arc<StatementClient>,
    buffer_size_bytes: usize,
    discard_results: bool,

    items: Mutex<VecDeque<PageQueueItem>>,
    queued_bytes: AtomicUsize,

    errors: Mutex<Vec<Error>>,
    cancelled: Arc<AtomicBool>,

    new_page: Notify,
    columns_discovered: Notify,
    first_data: Notify,

    columns: Mutex<Option<Vec<Column>>>,
    has_results: AtomicBool,
    last_page_seen: Mutex<Option<StatementPage>>,

    fetch_task: Mutex<Option<JoinHandle<()>>>,
}

impl PageQueue {
    /// Build a queue for `client`. `buffer_size_bytes` must be strictly
    /// positive (spec §4.2 "a zero budget is rejected at construction").
    pub fn new(client: Arc<StatementClient>, buffer_size_bytes: usize, discard_results: bool) -> Result<Arc<Self>> {
        if buffer_size_bytes == 0 {
            return Err(Error::Programming("buffer size must be strictly positive".to_string()));
        }
        Ok(Arc::new(Self {
            client,
            buffer_size_bytes,
            discard_results,
            items: Mutex::new(VecDeque::new()),
            queued_bytes: AtomicUsize::new(0),
            errors: Mutex::new(Vec::new()),
            cancelled: Arc::new(AtomicBool::new(false)),
            new_page: Notify::new(),
            columns_discovered: Notify::new(),
            first_data: Notify::new(),
            columns: Mutex::new(None),
            has_results: AtomicBool::new(false),
            last_page_seen: Mutex::new(None),
            fetch_task: Mutex::new(None),
        }))
    }

    /// Trigger the external cancellation source (spec §4.2 "ShouldStop").
    pub fn request_cancellation(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.new_page.notify_waiters();
        self.columns_discovered.notify_waiters();
        self.first_data.notify_waiters();
    }

    /// Columns observed so far, if the server has reported them.
    pub async fn columns(&self) -> Option<Vec<Column>> {
        self.columns.lock().await.clone()
    }

    /// Whether any data-bearing page has been observed.
    pub fn has_seen_data(&self) -> bool {
        self.has_results.load(Ordering::SeqCst)
    }

    /// Start the fetch task if one is not already running (spec §4.2
    /// "Start-read-ahead", idempotent).
    pub async fn start_read_ahead(self: &Arc<Self>) {
        let mut guard = self.fetch_task.lock().await;
        if guard.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        let queue = Arc::clone(self);
        *guard = Some(tokio::spawn(async move {
            queue.fetch_loop().await;
        }));
    }

    async fn fetch_loop(self: Arc<Self>) {
        loop {
            if !self.should_read_ahead().await || self.should_stop().await {
                break;
            }

            match self.client.advance().await {
                Ok(page) => self.ingest_page(page).await,
                Err(error) => {
                    self.push_error(error).await;
                    break;
                }
            }
        }

        if self.client.state() == QueryState::Finished {
            let page = self.last_page_seen.lock().await.clone();
            debug!(?page, "statement finished, publishing final stats");
        }
    }

    /// Seed the queue with the page produced by `submit_initial`, since that
    /// page comes from the initial POST rather than a later `advance()` call
    /// the fetch loop would otherwise pick up (spec §4.2 "Fetch loop" only
    /// runs once a continuation URI exists to poll).
    pub async fn seed_initial_page(&self, page: StatementPage) {
        self.ingest_page(page).await;
    }

    async fn ingest_page(&self, page: StatementPage) {
        *self.last_page_seen.lock().await = Some(page.clone());

        if self.columns.lock().await.is_none() {
            if let Some(cols) = &page.columns {
                *self.columns.lock().await = Some(cols.clone());
                self.columns_discovered.notify_waiters();
            }
        }

        let has_data = page.data.as_ref().is_some_and(|rows| !rows.is_empty());
        if !self.discard_results && has_data {
            let size_bytes = self.client.last_page_size().await;
            let mut items = self.items.lock().await;
            items.push_back(PageQueueItem { page, size_bytes });
            self.queued_bytes.fetch_add(size_bytes, Ordering::SeqCst);
            if !self.has_results.swap(true, Ordering::SeqCst) {
                self.first_data.notify_waiters();
            }
            self.new_page.notify_one();
        }
    }

    async fn push_error(&self, error: Error) {
        warn!(%error, "background fetcher recorded an error");
        self.errors.lock().await.push(error);
        self.new_page.notify_waiters();
        self.columns_discovered.notify_waiters();
        self.first_data.notify_waiters();
    }

    /// Spec §4.2 "Backpressure".
    async fn should_read_ahead(&self) -> bool {
        let last_page = self.last_page_seen.lock().await;
        let reached_last_page = last_page.as_ref().is_some_and(|p| p.next_uri.is_none());
        drop(last_page);

        if reached_last_page || self.client.state() != QueryState::Running {
            return false;
        }
        if self.discard_results {
            return true;
        }
        self.queued_bytes.load(Ordering::SeqCst) < self.buffer_size_bytes
    }

    /// Spec §4.2 "Stopping". Both stop sources also drive the client's own
    /// `Cancel` so a DELETE reaches the server regardless of which side
    /// noticed first (spec §4.1 "Timeout", §5 "Cancellation").
    async fn should_stop(&self) -> bool {
        if self.cancelled.load(Ordering::SeqCst) {
            self.client.cancel().await;
            self.record_stop_error_once(Error::Cancelled).await;
            return true;
        }
        if self.client.is_timed_out() {
            self.client.cancel().await;
            self.record_stop_error_once(Error::Timeout).await;
            return true;
        }
        !self.errors.lock().await.is_empty()
    }

    async fn record_stop_error_once(&self, error: Error) {
        let mut errors = self.errors.lock().await;
        let already_recorded = errors.iter().any(|e| std::mem::discriminant(e) == std::mem::discriminant(&error));
        if !already_recorded {
            errors.push(error);
        }
    }

    /// Attempt a lock-free dequeue; on miss, wait on the new-page signal
    /// with a growing bounded timeout (spec §4.2 "Consumer wait").
    pub async fn dequeue_or_null(&self) -> Option<PageQueueItem> {
        let mut wait = MIN_DEQUEUE_WAIT;
        loop {
            if let Some(item) = self.items.lock().await.pop_front() {
                self.queued_bytes.fetch_sub(item.size_bytes, Ordering::SeqCst);
                return Some(item);
            }
            if self.is_finished().await || !self.errors.lock().await.is_empty() {
                return None;
            }

            let notified = self.new_page.notified();
            tokio::select! {
                () = notified => {}
                () = tokio::time::sleep(wait) => {}
            }
            wait = (wait + DEQUEUE_WAIT_STEP).min(MAX_DEQUEUE_WAIT);
        }
    }

    /// True when the statement has finished, the queue is drained, and no
    /// further pages can arrive.
    pub async fn is_finished(&self) -> bool {
        if self.discard_results {
            return self.client.state() == QueryState::Finished;
        }
        let queue_empty = self.items.lock().await.is_empty();
        let last_page = self.last_page_seen.lock().await;
        let no_continuation = last_page.as_ref().is_some_and(|p| p.next_uri.is_none());
        self.client.state() == QueryState::Finished && queue_empty && no_continuation
    }

    /// Aggregate all captured errors into a composite and surface it (spec
    /// §4.2 "Errors").
    pub async fn throw_if_errors(&self) -> Result<()> {
        let mut errors = self.errors.lock().await;
        if errors.is_empty() {
            return Ok(());
        }
        Err(Error::composite(std::mem::take(&mut *errors)))
    }

    /// Wait until columns are known or a stop condition applies (spec §4.2,
    /// `WaitForColumns`).
    pub async fn wait_for_columns(self: &Arc<Self>) -> Result<Option<Vec<Column>>> {
        self.start_read_ahead().await;
        loop {
            if let Some(columns) = self.columns().await {
                return Ok(Some(columns));
            }
            if self.should_stop().await {
                self.throw_if_errors().await?;
                return Ok(self.columns().await);
            }
            let notified = self.columns_discovered.notified();
            tokio::select! {
                () = notified => {}
                () = tokio::time::sleep(MIN_DEQUEUE_WAIT) => {}
            }
        }
    }

    /// Wait until data has been seen, or the statement reached its last page
    /// / stopped (spec §4.2, `HasData`).
    pub async fn wait_for_data(self: &Arc<Self>) -> bool {
        if self.discard_results {
            return false;
        }
        self.start_read_ahead().await;
        loop {
            if self.has_seen_data() {
                return true;
            }
            if self.is_finished().await || self.should_stop().await {
                return self.has_seen_data();
            }
            let notified = self.first_data.notified();
            tokio::select! {
                () = notified => {}
                () = tokio::time::sleep(MIN_DEQUEUE_WAIT) => {}
            }
        }
    }

    /// Stop the fetch task and wait for it to terminate (spec §4.3
    /// `Dispose`).
    pub async fn shutdown(&self) {
        self.request_cancellation();
        let handle = self.fetch_task.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::session::SessionProperties;

    fn dummy_client() -> Arc<StatementClient> {
        let config = ClientConfig::new("http://localhost:8080");
        let transport = crate::transport::HttpTransport::new(reqwest::Client::new(), &config);
        Arc::new(StatementClient::new(transport, config, SessionProperties::default()))
    }

    #[test]
    fn rejects_zero_buffer_budget() {
        let result = PageQueue::new(dummy_client(), 0, false);
        assert!(matches!(result, Err(Error::Programming(_))));
    }

    #[test]
    fn accepts_positive_buffer_budget() {
        let result = PageQueue::new(dummy_client(), 1024, false);
        assert!(result.is_ok());
    }
}
