//! One-time identity normalization.
//!
//! Assigns canonical (UUID) identifiers to any record still carrying a
//! legacy free-form id and rewrites every known reference to it across the
//! local collections. The identifier maps are built in full before any
//! reference is rewritten, so a reference is never rewritten through an
//! already-renamed id.
//!
//! The pass is local, synchronous and idempotent: already-canonical ids are
//! skipped, and the per-user completion flag is only set at the very end, so
//! a failed run simply retries on the next session start.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Company, Contact};
use crate::store::{keys, Store};
use crate::util::{is_canonical_id, now_ms};

/// Structured outcome of the normalization pass, for observability
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    /// The pass had already run for this user; nothing was touched
    pub already_complete: bool,
    pub seeded_companies: usize,
    pub seeded_contacts: usize,
    pub companies_renamed: usize,
    pub contacts_renamed: usize,
    pub references_rewritten: usize,
    pub merge_records_rewritten: usize,
}

/// Older-schema contact shape, read when seeding and written back as the
/// legacy mirror (stripped of newer-only fields) for any remaining readers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyContact {
    id: String,
    name: String,
    #[serde(default)]
    company: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    company_id: Option<String>,
    #[serde(default)]
    manager_id: Option<String>,
    #[serde(default)]
    created_at: i64,
    #[serde(default)]
    updated_at: i64,
}

impl LegacyContact {
    fn into_contact(self) -> Contact {
        let now = now_ms();
        let mut contact = Contact::new(self.name);
        contact.id = self.id;
        contact.company = self.company;
        contact.title = self.title;
        contact.email = self.email;
        contact.phone = self.phone;
        contact.company_id = self.company_id;
        contact.manager_id = self.manager_id;
        contact.created_at = if self.created_at > 0 {
            self.created_at
        } else {
            now
        };
        contact.updated_at = if self.updated_at > 0 {
            self.updated_at
        } else {
            now
        };
        // Seeded records start with an empty activity timeline and stay
        // clean until the pass renames or rewrites them.
        contact.timeline = Vec::new();
        contact.needs_upsert = false;
        contact
    }

    fn from_contact(contact: &Contact) -> Self {
        Self {
            id: contact.id.clone(),
            name: contact.name.clone(),
            company: contact.company.clone(),
            title: contact.title.clone(),
            email: contact.email.clone(),
            phone: contact.phone.clone(),
            company_id: contact.company_id.clone(),
            manager_id: contact.manager_id.clone(),
            created_at: contact.created_at,
            updated_at: contact.updated_at,
        }
    }
}

/// Older-schema company shape, read when seeding the canonical collection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyCompany {
    id: String,
    name: String,
    #[serde(default)]
    domain: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    created_at: i64,
    #[serde(default)]
    updated_at: i64,
}

impl LegacyCompany {
    fn into_company(self) -> Company {
        let now = now_ms();
        let mut company = Company::new(self.name);
        company.id = self.id;
        company.domain = self.domain;
        company.city = self.city;
        company.country = self.country;
        company.created_at = if self.created_at > 0 {
            self.created_at
        } else {
            now
        };
        company.updated_at = if self.updated_at > 0 {
            self.updated_at
        } else {
            now
        };
        company.needs_upsert = false;
        company
    }
}

/// Rewrite a reference field through an identifier map; returns whether it
/// changed.
fn remap(field: &mut Option<String>, map: &HashMap<String, String>) -> bool {
    if let Some(current) = field.as_deref() {
        if let Some(canonical) = map.get(current) {
            *field = Some(canonical.clone());
            return true;
        }
    }
    false
}

/// Run the normalization pass for one user. No-op if already complete.
pub fn normalize_identities(store: &Store, user_id: &str) -> Result<MigrationReport> {
    let flag_key = keys::migration_flag(user_id);
    if store.flag(&flag_key).is_some() {
        tracing::debug!(user_id, "identity normalization already complete");
        return Ok(MigrationReport {
            already_complete: true,
            ..MigrationReport::default()
        });
    }

    let mut report = MigrationReport::default();

    // Companies first: contact rewrites depend on the finished company map.
    let mut companies = store.companies();
    if companies.is_empty() {
        let legacy: Vec<LegacyCompany> = store.load(keys::COMPANIES_LEGACY);
        companies = legacy.into_iter().map(LegacyCompany::into_company).collect();
        report.seeded_companies = companies.len();
    }

    let mut company_map: HashMap<String, String> = HashMap::new();
    for company in &mut companies {
        if is_canonical_id(&company.id) {
            continue;
        }
        let canonical = Uuid::now_v7().to_string();
        company_map.insert(company.id.clone(), canonical.clone());
        company.legacy_id = Some(std::mem::replace(&mut company.id, canonical));
        company.mark_dirty();
        report.companies_renamed += 1;
    }

    let mut contacts = store.contacts();
    if contacts.is_empty() {
        let legacy: Vec<LegacyContact> = store.load(keys::CONTACTS_LEGACY);
        contacts = legacy.into_iter().map(LegacyContact::into_contact).collect();
        report.seeded_contacts = contacts.len();
    }

    // All contacts get canonical ids before any reference is rewritten.
    let mut contact_map: HashMap<String, String> = HashMap::new();
    for contact in &mut contacts {
        if is_canonical_id(&contact.id) {
            continue;
        }
        let canonical = Uuid::now_v7().to_string();
        contact_map.insert(contact.id.clone(), canonical.clone());
        contact.legacy_id = Some(std::mem::replace(&mut contact.id, canonical));
        contact.mark_dirty();
        report.contacts_renamed += 1;
    }

    // Single rewrite pass over every cross-reference field.
    for contact in &mut contacts {
        let mut rewritten = 0;
        rewritten += usize::from(remap(&mut contact.company_id, &company_map));
        rewritten += usize::from(remap(&mut contact.org.reports_to_id, &contact_map));
        rewritten += usize::from(remap(&mut contact.manager_id, &contact_map));
        for source in &mut contact.merged_from_ids {
            if let Some(canonical) = contact_map.get(source) {
                source.clone_from(canonical);
                rewritten += 1;
            }
        }
        if rewritten > 0 {
            contact.mark_dirty();
            report.references_rewritten += rewritten;
        }
    }

    // Merge-history log: primary id and snapshot-embedded contact ids.
    let mut history = store.merge_history();
    for record in &mut history {
        let mut rewritten = false;
        if let Some(canonical) = contact_map.get(&record.primary_contact_id) {
            record.primary_contact_id.clone_from(canonical);
            rewritten = true;
        }
        for merged_id in &mut record.merged_contact_ids {
            if let Some(canonical) = contact_map.get(merged_id) {
                merged_id.clone_from(canonical);
                rewritten = true;
            }
        }
        for snapshot in &mut record.snapshots {
            if let Some(canonical) = contact_map.get(&snapshot.id) {
                snapshot.legacy_id = Some(std::mem::replace(&mut snapshot.id, canonical.clone()));
                rewritten = true;
            }
        }
        if rewritten {
            report.merge_records_rewritten += 1;
        }
    }

    store.save_companies(&companies)?;
    store.save_contacts(&contacts)?;
    store.save_merge_history(&history)?;

    // Older-schema mirror for any remaining legacy readers.
    let mirror: Vec<LegacyContact> = contacts.iter().map(LegacyContact::from_contact).collect();
    store.save(keys::CONTACTS_LEGACY, &mirror)?;

    store.set_flag(&flag_key)?;
    tracing::info!(
        user_id,
        contacts_renamed = report.contacts_renamed,
        companies_renamed = report.companies_renamed,
        references_rewritten = report.references_rewritten,
        "identity normalization complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn legacy_contact(id: &str, name: &str) -> Contact {
        let mut contact = Contact::new(name);
        contact.id = id.to_string();
        contact
    }

    #[test]
    fn mutual_reports_to_references_survive_renaming() {
        // Two legacy-id contacts referencing each other resolve post-pass
        let store = Store::open_in_memory().unwrap();
        let mut alice = legacy_contact("1699999999-abc", "Alice");
        let mut bob = legacy_contact("1699999998-xyz", "Bob");
        alice.org.reports_to_id = Some(bob.id.clone());
        bob.org.reports_to_id = Some(alice.id.clone());
        store.save_contacts(&[alice, bob]).unwrap();

        let report = normalize_identities(&store, "user-1").unwrap();
        assert_eq!(report.contacts_renamed, 2);

        let contacts = store.contacts();
        let alice = contacts.iter().find(|c| c.name == "Alice").unwrap();
        let bob = contacts.iter().find(|c| c.name == "Bob").unwrap();
        assert!(is_canonical_id(&alice.id));
        assert!(is_canonical_id(&bob.id));
        assert_eq!(alice.org.reports_to_id.as_deref(), Some(bob.id.as_str()));
        assert_eq!(bob.org.reports_to_id.as_deref(), Some(alice.id.as_str()));
        assert_eq!(alice.legacy_id.as_deref(), Some("1699999999-abc"));
    }

    #[test]
    fn company_references_are_rewritten() {
        let store = Store::open_in_memory().unwrap();
        let mut company = Company::new("Acme");
        company.id = "1690000000-co".to_string();
        store.save_companies(&[company]).unwrap();

        let mut contact = legacy_contact("1699999999-abc", "Ada");
        contact.company_id = Some("1690000000-co".to_string());
        store.save_contacts(&[contact]).unwrap();

        normalize_identities(&store, "user-1").unwrap();

        let companies = store.companies();
        let contacts = store.contacts();
        assert!(is_canonical_id(&companies[0].id));
        assert_eq!(
            contacts[0].company_id.as_deref(),
            Some(companies[0].id.as_str())
        );
    }

    #[test]
    fn reference_integrity_holds_after_pass() {
        let store = Store::open_in_memory().unwrap();
        let mut company = Company::new("Acme");
        company.id = "1690000000-co".to_string();
        store.save_companies(&[company]).unwrap();

        let mut a = legacy_contact("1-a", "A");
        a.company_id = Some("1690000000-co".to_string());
        let mut b = legacy_contact("2-b", "B");
        b.org.reports_to_id = Some("1-a".to_string());
        b.manager_id = Some("1-a".to_string());
        let mut c = Contact::new("C"); // already canonical
        c.merged_from_ids = vec!["2-b".to_string()];
        store.save_contacts(&[a, b, c]).unwrap();

        let report = normalize_identities(&store, "user-1").unwrap();
        assert_eq!(report.contacts_renamed, 2);

        let contacts = store.contacts();
        let companies = store.companies();
        let contact_ids: Vec<&str> = contacts.iter().map(|c| c.id.as_str()).collect();
        for contact in &contacts {
            assert!(is_canonical_id(&contact.id));
            if let Some(company_id) = &contact.company_id {
                assert!(companies.iter().any(|co| &co.id == company_id));
            }
            if let Some(reports_to) = &contact.org.reports_to_id {
                assert!(contact_ids.contains(&reports_to.as_str()));
            }
            for source in &contact.merged_from_ids {
                assert!(contact_ids.contains(&source.as_str()));
            }
        }
    }

    #[test]
    fn second_run_is_a_no_op() {
        let store = Store::open_in_memory().unwrap();
        store
            .save_contacts(&[legacy_contact("1699999999-abc", "Ada")])
            .unwrap();

        let first = normalize_identities(&store, "user-1").unwrap();
        assert!(!first.already_complete);
        let after_first = store.contacts();

        let second = normalize_identities(&store, "user-1").unwrap();
        assert!(second.already_complete);
        assert_eq!(second.contacts_renamed, 0);
        assert_eq!(store.contacts(), after_first);
    }

    #[test]
    fn completion_flag_is_per_user() {
        let store = Store::open_in_memory().unwrap();
        store
            .save_contacts(&[legacy_contact("1699999999-abc", "Ada")])
            .unwrap();

        normalize_identities(&store, "user-1").unwrap();
        // Different user: guarded separately, but ids are already canonical
        let report = normalize_identities(&store, "user-2").unwrap();
        assert!(!report.already_complete);
        assert_eq!(report.contacts_renamed, 0);
    }

    #[test]
    fn seeds_canonical_collections_from_legacy_mirrors() {
        let store = Store::open_in_memory().unwrap();
        let legacy = serde_json::json!([{
            "id": "1699999999-abc",
            "name": "Ada",
            "email": "ada@acme.com",
            "companyId": "1690000000-co",
            "createdAt": 1000,
            "updatedAt": 1000
        }]);
        store
            .save(
                keys::CONTACTS_LEGACY,
                legacy.as_array().unwrap().as_slice(),
            )
            .unwrap();

        let report = normalize_identities(&store, "user-1").unwrap();
        assert_eq!(report.seeded_contacts, 1);
        assert_eq!(report.contacts_renamed, 1);

        let contacts = store.contacts();
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].email.as_deref(), Some("ada@acme.com"));
        assert!(contacts[0].timeline.is_empty());
        assert!(is_canonical_id(&contacts[0].id));
    }

    #[test]
    fn merge_history_is_rewritten() {
        let store = Store::open_in_memory().unwrap();
        let primary = legacy_contact("1-a", "Ada");
        let duplicate = legacy_contact("2-b", "Ada L");
        let record =
            crate::models::MergeRecord::new(&primary, std::slice::from_ref(&duplicate));
        store.save_merge_history(&[record]).unwrap();
        store.save_contacts(&[primary, duplicate]).unwrap();

        let report = normalize_identities(&store, "user-1").unwrap();
        assert_eq!(report.merge_records_rewritten, 1);

        let contacts = store.contacts();
        let history = store.merge_history();
        let ada = contacts.iter().find(|c| c.name == "Ada").unwrap();
        assert_eq!(history[0].primary_contact_id, ada.id);
        assert!(history[0]
            .merged_contact_ids
            .iter()
            .all(|id| is_canonical_id(id)));
        assert!(history[0].snapshots.iter().all(|s| is_canonical_id(&s.id)));
    }

    #[test]
    fn legacy_mirror_is_written_back() {
        let store = Store::open_in_memory().unwrap();
        store
            .save_contacts(&[legacy_contact("1699999999-abc", "Ada")])
            .unwrap();

        normalize_identities(&store, "user-1").unwrap();

        let mirror: Vec<serde_json::Value> = store.load(keys::CONTACTS_LEGACY);
        assert_eq!(mirror.len(), 1);
        assert_eq!(mirror[0].get("name").and_then(|v| v.as_str()), Some("Ada"));
        // Newer-only fields are stripped from the mirror
        assert!(mirror[0].get("timeline").is_none());
        assert!(mirror[0].get("mergedFromIds").is_none());
    }
}
