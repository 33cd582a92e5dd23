//! Merge-history log entry

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Contact;
use crate::util::now_ms;

/// Audit record of a contact merge, with full pre-merge snapshots for undo
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeRecord {
    pub id: String,
    /// The surviving contact's canonical id
    pub primary_contact_id: String,
    /// Ids of the contacts folded into the primary
    pub merged_contact_ids: Vec<String>,
    /// Pre-merge snapshots of every involved contact
    pub snapshots: Vec<Contact>,
    /// Unix ms
    pub merged_at: i64,
}

impl MergeRecord {
    #[must_use]
    pub fn new(primary: &Contact, duplicates: &[Contact]) -> Self {
        let mut snapshots = Vec::with_capacity(duplicates.len() + 1);
        snapshots.push(primary.clone());
        snapshots.extend(duplicates.iter().cloned());

        Self {
            id: Uuid::now_v7().to_string(),
            primary_contact_id: primary.id.clone(),
            merged_contact_ids: duplicates.iter().map(|c| c.id.clone()).collect(),
            snapshots,
            merged_at: now_ms(),
        }
    }
}
