//! PageStream: the single-consumer iterator over a statement's pages (spec
//! §4.3).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::queue::{PageQueue, PageQueueItem};
use crate::statement::{Stats, StatementClient, StatementPage};
use crate::types::Column;

/// Single-consumer iterator over a statement's pages. Enforces exclusivity:
/// concurrent `next()` calls fail with a programming error (spec §8 property
/// 9).
pub struct PageStream {
    client: Arc<StatementClient>,
    queue: Arc<PageQueue>,
    current: Mutex<Option<PageQueueItem>>,
    in_next: AtomicBool,
}

impl PageStream {
    /// Build a stream over `queue`, consuming pages produced by `client`.
    pub fn new(client: Arc<StatementClient>, queue: Arc<PageQueue>) -> Self {
        Self {
            client,
            queue,
            current: Mutex::new(None),
            in_next: AtomicBool::new(false),
        }
    }

    /// Advance to the next page, returning `false` once the statement has
    /// finished and no pages remain (spec §4.3 "Next").
    pub async fn next(&self) -> Result<bool> {
        if self.in_next.swap(true, Ordering::SeqCst) {
            return Err(Error::Programming(
                "concurrent calls to PageStream::next are not allowed".to_string(),
            ));
        }
        let result = self.next_inner().await;
        self.in_next.store(false, Ordering::SeqCst);
        result
    }

    async fn next_inner(&self) -> Result<bool> {
        self.queue.throw_if_errors().await?;
        if self.is_finished().await {
            return Ok(false);
        }
        self.queue.start_read_ahead().await;

        loop {
            if let Some(item) = self.queue.dequeue_or_null().await {
                *self.current.lock().await = Some(item);
                return Ok(true);
            }
            self.queue.throw_if_errors().await?;
            if self.is_finished().await {
                return Ok(false);
            }
        }
    }

    /// Terminal predicate (spec §4.3 "IsFinished").
    pub async fn is_finished(&self) -> bool {
        self.queue.is_finished().await
    }

    /// The page last returned by `next()`.
    pub async fn current(&self) -> Option<StatementPage> {
        self.current.lock().await.as_ref().map(|item| item.page.clone())
    }

    /// Stats from the most recently observed page, whether or not it carried
    /// data.
    pub async fn last_stats(&self) -> Option<Stats> {
        self.client.last_page().await.map(|page| page.stats)
    }

    /// The most recently observed page overall (not necessarily the one
    /// returned by `current()`, since the fetcher runs ahead of the
    /// consumer).
    pub async fn last_statement(&self) -> Option<StatementPage> {
        self.client.last_page().await
    }

    /// Wait for columns to become known, even after cancellation, as long as
    /// an earlier page carried them (spec §4.3 "WaitForColumns", §7).
    pub async fn wait_for_columns(&self) -> Result<Option<Vec<Column>>> {
        self.queue.wait_for_columns().await
    }

    /// Whether the statement has produced (or will produce) any rows (spec
    /// §4.3 "HasData").
    pub async fn has_data(&self) -> bool {
        self.queue.wait_for_data().await
    }

    /// Cancel the statement and wait for the background fetcher to
    /// terminate (spec §4.3 "Dispose").
    pub async fn dispose(&self) {
        self.client.cancel().await;
        self.queue.shutdown().await;
    }

    /// Drain every remaining page (spec §4.3 "ReadToEnd").
    pub async fn read_to_end(&self) -> Result<Vec<StatementPage>> {
        let mut pages = Vec::new();
        while self.next().await? {
            if let Some(page) = self.current().await {
                pages.push(page);
            }
        }
        Ok(pages)
    }
}
