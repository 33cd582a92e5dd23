//! Session-start hydration: pull the server's view of contacts and
//! companies and merge it into the local store.
//!
//! Precedence rule: the server wins on clean records (its non-null scalars
//! overwrite), a locally dirty record is fully shielded for the session and
//! pushed back instead. Either fetch failing aborts the whole pass so stale
//! and fresh state are never mixed.

use serde::Serialize;

use crate::models::{Company, Contact, EntityKind, HttpMethod, SyncAction, SyncStatus};
use crate::store::Store;
use crate::sync::transport::{endpoints, RemoteCompany, RemoteContact};
use crate::sync::{SyncQueue, SyncTransport};
use crate::util::{is_canonical_id, now_ms};

/// Outcome of one hydration pass
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HydrationReport {
    /// Clean local records overwritten from the server
    pub updated: usize,
    /// Server records with no local counterpart, inserted clean
    pub inserted: usize,
    /// Dirty local records shielded from the server this session
    pub shielded: usize,
    /// Still-dirty records re-pushed through the sync queue
    pub repushed: usize,
    /// Whether the pass was abandoned because a fetch failed
    pub aborted: bool,
}

/// Run one hydration pass. Called once per session, after identity
/// normalization and never before it.
pub async fn hydrate(
    store: &Store,
    transport: &impl SyncTransport,
    queue: &SyncQueue<'_>,
) -> HydrationReport {
    let mut report = HydrationReport::default();

    let (contacts_result, companies_result) =
        tokio::join!(transport.fetch_contacts(), transport.fetch_companies());

    let (remote_contacts, remote_companies) = match (contacts_result, companies_result) {
        (Ok(contacts), Ok(companies)) => (contacts, companies),
        (contacts, companies) => {
            for error in [contacts.err(), companies.err()].into_iter().flatten() {
                tracing::warn!(%error, "hydration fetch failed, aborting whole pass");
            }
            report.aborted = true;
            return report;
        }
    };

    let mut companies = store.companies();
    for remote in remote_companies {
        merge_company(&mut companies, remote, &mut report);
    }
    if let Err(error) = store.save_companies(&companies) {
        tracing::warn!(%error, "failed to persist hydrated companies");
    }

    let mut contacts = store.contacts();
    for remote in remote_contacts {
        merge_contact(&mut contacts, remote, &mut report);
    }
    if let Err(error) = store.save_contacts(&contacts) {
        tracing::warn!(%error, "failed to persist hydrated contacts");
    }

    repush_dirty(store, queue, &mut report);
    report
}

fn merge_contact(contacts: &mut Vec<Contact>, remote: RemoteContact, report: &mut HydrationReport) {
    if !is_canonical_id(&remote.contact_id) {
        tracing::warn!(id = %remote.contact_id, "server contact without canonical id, skipped");
        return;
    }

    match contacts.iter_mut().find(|c| c.id == remote.contact_id) {
        Some(local) if local.needs_upsert => report.shielded += 1,
        Some(local) => {
            apply_remote_contact(local, &remote);
            report.updated += 1;
        }
        None => {
            contacts.push(contact_from_remote(remote));
            report.inserted += 1;
        }
    }
}

fn merge_company(
    companies: &mut Vec<Company>,
    remote: RemoteCompany,
    report: &mut HydrationReport,
) {
    if !is_canonical_id(&remote.company_id) {
        tracing::warn!(id = %remote.company_id, "server company without canonical id, skipped");
        return;
    }

    match companies.iter_mut().find(|c| c.id == remote.company_id) {
        Some(local) if local.needs_upsert => report.shielded += 1,
        Some(local) => {
            apply_remote_company(local, &remote);
            report.updated += 1;
        }
        None => {
            companies.push(company_from_remote(remote));
            report.inserted += 1;
        }
    }
}

/// Overwrite local scalars from the server's non-null values only
fn apply_remote_contact(local: &mut Contact, remote: &RemoteContact) {
    if let Some(name) = &remote.name {
        local.name.clone_from(name);
    }
    if remote.company.is_some() {
        local.company.clone_from(&remote.company);
    }
    if remote.title.is_some() {
        local.title.clone_from(&remote.title);
    }
    if remote.email.is_some() {
        local.email.clone_from(&remote.email);
    }
    if remote.phone.is_some() {
        local.phone.clone_from(&remote.phone);
    }
    if remote.website.is_some() {
        local.website.clone_from(&remote.website);
    }
    if remote.social_url.is_some() {
        local.social_url.clone_from(&remote.social_url);
    }
    if remote.address.is_some() {
        local.address.clone_from(&remote.address);
    }
    if remote.notes.is_some() {
        local.notes.clone_from(&remote.notes);
    }
    if remote.company_id.is_some() {
        local.company_id.clone_from(&remote.company_id);
    }
    if let Some(updated_at) = remote.updated_at {
        local.updated_at = updated_at;
    }
}

fn apply_remote_company(local: &mut Company, remote: &RemoteCompany) {
    if let Some(name) = &remote.name {
        local.name.clone_from(name);
    }
    if remote.domain.is_some() {
        local.domain.clone_from(&remote.domain);
    }
    if remote.city.is_some() {
        local.city.clone_from(&remote.city);
    }
    if remote.country.is_some() {
        local.country.clone_from(&remote.country);
    }
    if let Some(updated_at) = remote.updated_at {
        local.updated_at = updated_at;
    }
}

fn contact_from_remote(remote: RemoteContact) -> Contact {
    let now = now_ms();
    let mut contact = Contact::new(remote.name.clone().unwrap_or_default());
    contact.id = remote.contact_id.clone();
    apply_remote_contact(&mut contact, &remote);
    contact.needs_upsert = false;
    contact.created_at = remote.updated_at.unwrap_or(now);
    contact.updated_at = contact.created_at;
    contact
}

fn company_from_remote(remote: RemoteCompany) -> Company {
    let now = now_ms();
    let mut company = Company::new(remote.name.clone().unwrap_or_default());
    company.id = remote.company_id.clone();
    apply_remote_company(&mut company, &remote);
    company.needs_upsert = false;
    company.created_at = remote.updated_at.unwrap_or(now);
    company.updated_at = company.created_at;
    company
}

/// Re-issue upserts for records still dirty after the merge.
///
/// Routed through the sync queue rather than fired ad hoc, so each record
/// keeps a single point of retry and ordering. A record with an upsert
/// already pending is not enqueued twice.
fn repush_dirty(store: &Store, queue: &SyncQueue<'_>, report: &mut HydrationReport) {
    let queued: Vec<serde_json::Value> = store
        .sync_queue()
        .iter()
        .filter(|item| item.status == SyncStatus::Pending)
        .map(|item| item.payload.clone())
        .collect();
    let already_queued = |id: &str| {
        queued
            .iter()
            .any(|payload| payload.get("id").and_then(|v| v.as_str()) == Some(id))
    };

    for contact in store.contacts().iter().filter(|c| c.needs_upsert) {
        if already_queued(&contact.id) {
            continue;
        }
        match serde_json::to_value(contact) {
            Ok(payload) => {
                if let Err(error) = queue.enqueue(
                    EntityKind::Contact,
                    SyncAction::Update,
                    endpoints::CONTACTS_UPSERT,
                    HttpMethod::Post,
                    payload,
                ) {
                    tracing::warn!(%error, id = %contact.id, "failed to re-queue dirty contact");
                } else {
                    report.repushed += 1;
                }
            }
            Err(error) => tracing::warn!(%error, "failed to serialize dirty contact"),
        }
    }

    for company in store.companies().iter().filter(|c| c.needs_upsert) {
        if already_queued(&company.id) {
            continue;
        }
        match serde_json::to_value(company) {
            Ok(payload) => {
                if let Err(error) = queue.enqueue(
                    EntityKind::Company,
                    SyncAction::Update,
                    endpoints::COMPANIES_UPSERT,
                    HttpMethod::Post,
                    payload,
                ) {
                    tracing::warn!(%error, id = %company.id, "failed to re-queue dirty company");
                } else {
                    report.repushed += 1;
                }
            }
            Err(error) => tracing::warn!(%error, "failed to serialize dirty company"),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::error::{Error, Result};
    use crate::models::HttpMethod;

    struct FakeServer {
        contacts: Result<Vec<RemoteContact>>,
        companies: Result<Vec<RemoteCompany>>,
    }

    impl FakeServer {
        fn with_contacts(contacts: Vec<RemoteContact>) -> Self {
            Self {
                contacts: Ok(contacts),
                companies: Ok(Vec::new()),
            }
        }

        fn failing_contacts() -> Self {
            Self {
                contacts: Err(Error::Api("internal server error (500)".to_string())),
                companies: Ok(Vec::new()),
            }
        }
    }

    impl SyncTransport for FakeServer {
        async fn send(
            &self,
            _method: HttpMethod,
            _endpoint: &str,
            _payload: &serde_json::Value,
        ) -> Result<()> {
            Ok(())
        }

        async fn fetch_contacts(&self) -> Result<Vec<RemoteContact>> {
            match &self.contacts {
                Ok(contacts) => Ok(contacts.clone()),
                Err(_) => Err(Error::Api("internal server error (500)".to_string())),
            }
        }

        async fn fetch_companies(&self) -> Result<Vec<RemoteCompany>> {
            match &self.companies {
                Ok(companies) => Ok(companies.clone()),
                Err(_) => Err(Error::Api("internal server error (500)".to_string())),
            }
        }

        async fn is_online(&self) -> bool {
            true
        }
    }

    fn remote_contact(id: &str, name: &str) -> RemoteContact {
        RemoteContact {
            id: Some(1),
            contact_id: id.to_string(),
            name: Some(name.to_string()),
            company: None,
            title: None,
            email: None,
            phone: None,
            website: None,
            social_url: None,
            address: None,
            notes: None,
            company_id: None,
            updated_at: Some(5000),
        }
    }

    #[tokio::test]
    async fn dirty_local_record_is_shielded() {
        // Local "Jon" is dirty; server says "Jonathan" - local wins
        let store = Store::open_in_memory().unwrap();
        let mut local = Contact::new("Jon");
        local.needs_upsert = true;
        let id = local.id.clone();
        store.save_contacts(&[local]).unwrap();

        let server = FakeServer::with_contacts(vec![remote_contact(&id, "Jonathan")]);
        let queue = SyncQueue::new(&store);
        let report = hydrate(&store, &server, &queue).await;

        assert_eq!(report.shielded, 1);
        assert_eq!(store.contacts()[0].name, "Jon");
        assert!(store.contacts()[0].needs_upsert);
    }

    #[tokio::test]
    async fn clean_local_record_takes_server_values() {
        let store = Store::open_in_memory().unwrap();
        let mut local = Contact::new("Jon");
        local.needs_upsert = false;
        local.title = Some("Engineer".to_string());
        let id = local.id.clone();
        store.save_contacts(&[local]).unwrap();

        let mut remote = remote_contact(&id, "Jonathan");
        remote.email = Some("jon@acme.com".to_string());
        // title stays untouched: server value is null
        let server = FakeServer::with_contacts(vec![remote]);
        let queue = SyncQueue::new(&store);
        let report = hydrate(&store, &server, &queue).await;

        assert_eq!(report.updated, 1);
        let merged = &store.contacts()[0];
        assert_eq!(merged.name, "Jonathan");
        assert_eq!(merged.email.as_deref(), Some("jon@acme.com"));
        assert_eq!(merged.title.as_deref(), Some("Engineer"));
        assert!(!merged.needs_upsert);
    }

    #[tokio::test]
    async fn unknown_server_record_inserts_clean() {
        let store = Store::open_in_memory().unwrap();
        let id = uuid::Uuid::now_v7().to_string();
        let server = FakeServer::with_contacts(vec![remote_contact(&id, "Grace")]);
        let queue = SyncQueue::new(&store);
        let report = hydrate(&store, &server, &queue).await;

        assert_eq!(report.inserted, 1);
        let contacts = store.contacts();
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].id, id);
        assert!(!contacts[0].needs_upsert);
    }

    #[tokio::test]
    async fn fetch_failure_aborts_whole_pass() {
        let store = Store::open_in_memory().unwrap();
        let mut local = Contact::new("Jon");
        local.needs_upsert = false;
        store.save_contacts(&[local.clone()]).unwrap();

        let server = FakeServer::failing_contacts();
        let queue = SyncQueue::new(&store);
        let report = hydrate(&store, &server, &queue).await;

        assert!(report.aborted);
        assert_eq!(store.contacts(), vec![local]);
        assert!(store.sync_queue().is_empty());
    }

    #[tokio::test]
    async fn dirty_records_are_repushed_through_the_queue() {
        let store = Store::open_in_memory().unwrap();
        let local = Contact::new("Jon"); // dirty by construction
        let id = local.id.clone();
        store.save_contacts(&[local]).unwrap();

        let server = FakeServer::with_contacts(Vec::new());
        let queue = SyncQueue::new(&store);
        let report = hydrate(&store, &server, &queue).await;

        assert_eq!(report.repushed, 1);
        let items = store.sync_queue();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].endpoint, endpoints::CONTACTS_UPSERT);
        assert_eq!(
            items[0].payload.get("id").and_then(|v| v.as_str()),
            Some(id.as_str())
        );

        // A second hydration must not queue the same record twice
        let report = hydrate(&store, &server, &queue).await;
        assert_eq!(report.repushed, 0);
        assert_eq!(store.sync_queue().len(), 1);
    }

    #[tokio::test]
    async fn non_canonical_server_ids_are_skipped() {
        let store = Store::open_in_memory().unwrap();
        let server = FakeServer::with_contacts(vec![remote_contact("1699999999-abc", "Legacy")]);
        let queue = SyncQueue::new(&store);
        let report = hydrate(&store, &server, &queue).await;

        assert_eq!(report.inserted, 0);
        assert!(store.contacts().is_empty());
    }
}
