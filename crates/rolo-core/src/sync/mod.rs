//! Durable mutation sync queue.
//!
//! Append-only queue of pending writes destined for the server. Items are
//! drained sequentially in enqueue order so per-record ordering stays
//! deterministic, and the queue is persisted after every item so a crash
//! mid-drain never loses more than the in-flight item's state update.
//!
//! Retry state machine per item: `pending` retries with linear backoff until
//! the retry ceiling, then parks as `failed` (retained, never silently
//! dropped) until the user retries or dismisses it.

pub mod transport;

pub use transport::{endpoints, HttpTransport, RemoteCompany, RemoteContact, SyncTransport};

use serde::Serialize;

use crate::error::Result;
use crate::models::{EntityKind, HttpMethod, SyncAction, SyncQueueItem, SyncStatus};
use crate::store::Store;
use crate::util::{compact_text, now_ms};

/// Attempts before an item transitions to `failed`
pub const MAX_RETRIES: u32 = 5;

/// Linear backoff step: `next_retry_at = now + retry_count * 30s`
pub const RETRY_BACKOFF_MS: i64 = 30_000;

/// Outcome of one drain pass
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainReport {
    /// Items confirmed by the server and removed
    pub processed: usize,
    /// Attempts that failed during this drain
    pub failed: usize,
    /// Items that crossed the retry ceiling during this drain
    pub new_failures: usize,
    pub errors: Vec<String>,
}

/// Handle over the persisted mutation queue
pub struct SyncQueue<'a> {
    store: &'a Store,
}

impl<'a> SyncQueue<'a> {
    #[must_use]
    pub const fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Append a mutation to the durable queue.
    ///
    /// Object payloads are stamped with the item id as `clientId`, the
    /// idempotency key the server uses to deduplicate retried creates.
    pub fn enqueue(
        &self,
        kind: EntityKind,
        action: SyncAction,
        endpoint: impl Into<String>,
        method: HttpMethod,
        payload: serde_json::Value,
    ) -> Result<SyncQueueItem> {
        let mut item = SyncQueueItem::new(kind, action, endpoint, method, payload);
        if let Some(object) = item.payload.as_object_mut() {
            object.insert(
                "clientId".to_string(),
                serde_json::Value::String(item.id.clone()),
            );
        }
        let mut queue = self.store.sync_queue();
        queue.push(item.clone());
        self.store.save_sync_queue(&queue)?;
        tracing::debug!(id = %item.id, endpoint = %item.endpoint, "enqueued mutation");
        Ok(item)
    }

    pub fn items(&self) -> Vec<SyncQueueItem> {
        self.store.sync_queue()
    }

    pub fn pending_count(&self) -> usize {
        self.store
            .sync_queue()
            .iter()
            .filter(|item| item.status == SyncStatus::Pending)
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.store
            .sync_queue()
            .iter()
            .filter(|item| item.status == SyncStatus::Failed)
            .count()
    }

    /// Drain eligible pending items, one at a time, in enqueue order.
    ///
    /// Pending items whose `next_retry_at` is still in the future are left
    /// for a later drain. The queue is written back after every item.
    pub async fn drain(&self, transport: &impl SyncTransport) -> DrainReport {
        let mut report = DrainReport::default();
        let now = now_ms();

        let due: Vec<String> = self
            .store
            .sync_queue()
            .iter()
            .filter(|item| item.status == SyncStatus::Pending && item.next_retry_at <= now)
            .map(|item| item.id.clone())
            .collect();

        for id in due {
            // Reload each iteration: the previous iteration persisted.
            let mut queue = self.store.sync_queue();
            let Some(position) = queue.iter().position(|item| item.id == id) else {
                continue;
            };

            let item = queue[position].clone();
            match transport.send(item.method, &item.endpoint, &item.payload).await {
                Ok(()) => {
                    queue.remove(position);
                    report.processed += 1;
                }
                Err(error) => {
                    report.failed += 1;
                    report.errors.push(format!("{}: {error}", item.endpoint));

                    let entry = &mut queue[position];
                    entry.retry_count += 1;
                    entry.last_error = Some(compact_text(&error.to_string()));
                    entry.next_retry_at =
                        now_ms() + i64::from(entry.retry_count) * RETRY_BACKOFF_MS;
                    if entry.retry_count >= MAX_RETRIES {
                        entry.status = SyncStatus::Failed;
                        report.new_failures += 1;
                        tracing::warn!(
                            id = %entry.id,
                            endpoint = %entry.endpoint,
                            "mutation exceeded retry ceiling, parked as failed"
                        );
                    }
                }
            }

            if let Err(error) = self.store.save_sync_queue(&queue) {
                tracing::warn!(%error, "failed to persist sync queue mid-drain");
            }
        }

        report
    }

    /// Reset every failed item to pending with fresh retry state
    pub fn retry_failed(&self) -> Result<usize> {
        let mut queue = self.store.sync_queue();
        let mut reset = 0;
        for item in &mut queue {
            if item.status == SyncStatus::Failed {
                item.status = SyncStatus::Pending;
                item.retry_count = 0;
                item.last_error = None;
                item.next_retry_at = now_ms();
                reset += 1;
            }
        }
        if reset > 0 {
            self.store.save_sync_queue(&queue)?;
        }
        Ok(reset)
    }

    /// Remove an item regardless of its state; returns whether it existed
    pub fn dismiss(&self, id: &str) -> Result<bool> {
        let mut queue = self.store.sync_queue();
        let before = queue.len();
        queue.retain(|item| item.id != id);
        if queue.len() == before {
            return Ok(false);
        }
        self.store.save_sync_queue(&queue)?;
        Ok(true)
    }
}
