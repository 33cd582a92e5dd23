//! Session-start orchestration.
//!
//! Fixed order per session: identity normalization, then a drain of any
//! mutations queued while offline, then hydration from the server, then a
//! final drain for whatever hydration re-queued. Normalization runs even
//! when offline; the network stages are skipped entirely without
//! connectivity and picked up by the periodic drain later.

use std::time::Duration;

use serde::Serialize;

use crate::hydrate::{hydrate, HydrationReport};
use crate::migrate::{normalize_identities, MigrationReport};
use crate::store::Store;
use crate::sync::{DrainReport, SyncQueue, SyncTransport};

/// How often the background drain wakes up
pub const AUTO_DRAIN_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Everything that happened during session start
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub migration: Option<MigrationReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub startup_drain: Option<DrainReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hydration: Option<HydrationReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_drain: Option<DrainReport>,
    pub offline: bool,
    pub errors: Vec<String>,
}

/// Run the full session-start sequence for one user.
///
/// A failed normalization is reported but does not block the rest of the
/// sequence; its completion flag stays unset so it retries next session.
pub async fn start_session(
    store: &Store,
    transport: &impl SyncTransport,
    user_id: &str,
) -> SessionReport {
    let mut report = SessionReport::default();

    match normalize_identities(store, user_id) {
        Ok(migration) => report.migration = Some(migration),
        Err(error) => {
            tracing::warn!(%error, "identity normalization failed, will retry next session");
            report.errors.push(format!("normalization: {error}"));
        }
    }

    if !transport.is_online().await {
        tracing::info!("offline session start, deferring sync and hydration");
        report.offline = true;
        return report;
    }

    let queue = SyncQueue::new(store);

    let startup = queue.drain(transport).await;
    report.errors.extend(startup.errors.iter().cloned());
    report.startup_drain = Some(startup);

    let hydration = hydrate(store, transport, &queue).await;
    if hydration.aborted {
        report.errors.push("hydration: fetch failed, pass aborted".to_string());
    }
    report.hydration = Some(hydration);

    let last = queue.drain(transport).await;
    report.errors.extend(last.errors.iter().cloned());
    report.final_drain = Some(last);

    tracing::info!(
        pending = queue.pending_count(),
        failed = queue.failed_count(),
        "session start complete"
    );
    report
}

/// One tick of the background drain. Skips quietly when there is nothing
/// pending or no connectivity.
pub async fn drain_if_due(store: &Store, transport: &impl SyncTransport) -> Option<DrainReport> {
    let queue = SyncQueue::new(store);
    if queue.pending_count() == 0 {
        return None;
    }
    if !transport.is_online().await {
        tracing::debug!("auto-drain skipped, offline");
        return None;
    }
    Some(queue.drain(transport).await)
}

/// Background loop draining the queue on a fixed interval. Runs until the
/// caller drops the future.
pub async fn run_periodic_drain(store: &Store, transport: &impl SyncTransport, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    // The first tick fires immediately; session start already drained.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if let Some(report) = drain_if_due(store, transport).await {
            tracing::debug!(
                processed = report.processed,
                failed = report.failed,
                "auto-drain tick"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::error::Result;
    use crate::models::{Contact, EntityKind, HttpMethod, SyncAction};
    use crate::sync::endpoints;
    use crate::sync::transport::{RemoteCompany, RemoteContact};
    use crate::util::is_canonical_id;

    struct FakeServer {
        online: bool,
        contacts: Vec<RemoteContact>,
        sent: RefCell<Vec<String>>,
    }

    impl FakeServer {
        fn online() -> Self {
            Self {
                online: true,
                contacts: Vec::new(),
                sent: RefCell::new(Vec::new()),
            }
        }

        fn offline() -> Self {
            Self {
                online: false,
                contacts: Vec::new(),
                sent: RefCell::new(Vec::new()),
            }
        }
    }

    impl SyncTransport for FakeServer {
        async fn send(
            &self,
            _method: HttpMethod,
            endpoint: &str,
            _payload: &serde_json::Value,
        ) -> Result<()> {
            self.sent.borrow_mut().push(endpoint.to_string());
            Ok(())
        }

        async fn fetch_contacts(&self) -> Result<Vec<RemoteContact>> {
            Ok(self.contacts.clone())
        }

        async fn fetch_companies(&self) -> Result<Vec<RemoteCompany>> {
            Ok(Vec::new())
        }

        async fn is_online(&self) -> bool {
            self.online
        }
    }

    #[tokio::test]
    async fn online_session_runs_the_full_sequence() {
        let store = Store::open_in_memory().unwrap();
        let mut legacy = Contact::new("Ada");
        legacy.id = "1699999999-abc".to_string();
        store.save_contacts(&[legacy]).unwrap();

        let queue = SyncQueue::new(&store);
        queue
            .enqueue(
                EntityKind::Contact,
                SyncAction::Create,
                endpoints::CONTACTS_UPSERT,
                HttpMethod::Post,
                serde_json::json!({"name": "queued offline"}),
            )
            .unwrap();

        let server = FakeServer::online();
        let report = start_session(&store, &server, "user-1").await;

        assert!(!report.offline);
        assert_eq!(report.migration.as_ref().unwrap().contacts_renamed, 1);
        assert_eq!(report.startup_drain.as_ref().unwrap().processed, 1);
        // Migration left the renamed contact dirty; hydration re-pushed it
        // and the final drain delivered it.
        assert_eq!(report.hydration.as_ref().unwrap().repushed, 1);
        assert_eq!(report.final_drain.as_ref().unwrap().processed, 1);
        assert!(store.sync_queue().is_empty());
        assert!(is_canonical_id(&store.contacts()[0].id));
    }

    #[tokio::test]
    async fn offline_session_still_normalizes_but_defers_sync() {
        let store = Store::open_in_memory().unwrap();
        let mut legacy = Contact::new("Ada");
        legacy.id = "1699999999-abc".to_string();
        store.save_contacts(&[legacy]).unwrap();

        let server = FakeServer::offline();
        let report = start_session(&store, &server, "user-1").await;

        assert!(report.offline);
        assert_eq!(report.migration.as_ref().unwrap().contacts_renamed, 1);
        assert!(report.hydration.is_none());
        assert!(report.startup_drain.is_none());
        assert!(server.sent.borrow().is_empty());
        assert!(is_canonical_id(&store.contacts()[0].id));
    }

    #[tokio::test]
    async fn drain_if_due_skips_empty_queue_and_offline() {
        let store = Store::open_in_memory().unwrap();
        assert!(drain_if_due(&store, &FakeServer::online()).await.is_none());

        let queue = SyncQueue::new(&store);
        queue
            .enqueue(
                EntityKind::Contact,
                SyncAction::Create,
                endpoints::CONTACTS_UPSERT,
                HttpMethod::Post,
                serde_json::json!({"name": "Ada"}),
            )
            .unwrap();
        assert!(drain_if_due(&store, &FakeServer::offline()).await.is_none());

        let report = drain_if_due(&store, &FakeServer::online()).await.unwrap();
        assert_eq!(report.processed, 1);
    }
}
