//! Contact model and its organizational sub-record

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::util::{is_canonical_id, now_ms};

/// Department within the contact's organization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Department {
    Engineering,
    Product,
    Sales,
    Marketing,
    Finance,
    Hr,
    Operations,
    Legal,
    Executive,
    Other,
}

/// Seniority level used for org-chart views
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Seniority {
    IndividualContributor,
    Manager,
    Director,
    Vp,
    CLevel,
    Founder,
}

/// How much influence the contact has over buying decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Influence {
    Low,
    Medium,
    High,
    DecisionMaker,
}

/// How developed the relationship with this contact is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelationshipStrength {
    New,
    Developing,
    Established,
    Strong,
}

/// Organizational sub-record attached to every contact.
///
/// `reports_to_id` is a self-reference to another contact by canonical id;
/// after identity normalization it must resolve or be `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrgInfo {
    #[serde(default)]
    pub department: Option<Department>,
    #[serde(default)]
    pub seniority: Option<Seniority>,
    #[serde(default)]
    pub influence: Option<Influence>,
    #[serde(default)]
    pub relationship_strength: Option<RelationshipStrength>,
    #[serde(default)]
    pub reports_to_id: Option<String>,
}

/// A task attached to a contact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskItem {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub due_at: Option<i64>,
    #[serde(default)]
    pub completed: bool,
}

/// A reminder attached to a contact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    pub id: String,
    pub title: String,
    pub remind_at: i64,
    #[serde(default)]
    pub completed: bool,
}

/// One entry in a contact's activity timeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry {
    pub id: String,
    /// Event kind, e.g. `captured`, `emailed`, `met`, `merged`
    pub kind: String,
    pub summary: String,
    /// Unix ms
    pub timestamp: i64,
}

/// A contact captured from a business card.
///
/// `id` is a canonical UUID string after identity normalization; records
/// created before the migration carry a free-form legacy identifier, which is
/// preserved in `legacy_id` once the record is renamed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: String,
    #[serde(default)]
    pub legacy_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub social_url: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    /// Foreign reference to a Company by canonical id
    #[serde(default)]
    pub company_id: Option<String>,
    /// Older-schema manager reference, kept for legacy readers
    #[serde(default)]
    pub manager_id: Option<String>,
    #[serde(default)]
    pub org: OrgInfo,
    #[serde(default)]
    pub tasks: Vec<TaskItem>,
    #[serde(default)]
    pub reminders: Vec<Reminder>,
    #[serde(default)]
    pub timeline: Vec<TimelineEntry>,
    /// Ids of contacts merged into this one, for audit/undo
    #[serde(default)]
    pub merged_from_ids: Vec<String>,
    #[serde(default)]
    pub merged_at: Option<i64>,
    /// Dirty flag: local changes not yet confirmed persisted server-side
    #[serde(default)]
    pub needs_upsert: bool,
    /// Unix ms
    pub created_at: i64,
    /// Unix ms
    pub updated_at: i64,
}

impl Contact {
    /// Create a new contact with a canonical id, marked dirty for sync
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let now = now_ms();
        Self {
            id: Uuid::now_v7().to_string(),
            legacy_id: None,
            name: name.into(),
            company: None,
            title: None,
            email: None,
            phone: None,
            website: None,
            social_url: None,
            address: None,
            notes: None,
            company_id: None,
            manager_id: None,
            org: OrgInfo::default(),
            tasks: Vec::new(),
            reminders: Vec::new(),
            timeline: Vec::new(),
            merged_from_ids: Vec::new(),
            merged_at: None,
            needs_upsert: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this record's identifier is in canonical (UUID) form
    #[must_use]
    pub fn is_canonical(&self) -> bool {
        is_canonical_id(&self.id)
    }

    /// Stamp the record as locally modified and unsynced
    pub fn mark_dirty(&mut self) {
        self.needs_upsert = true;
        self.updated_at = now_ms();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_contact_is_canonical_and_dirty() {
        let contact = Contact::new("Ada Lovelace");
        assert!(contact.is_canonical());
        assert!(contact.needs_upsert);
        assert_eq!(contact.created_at, contact.updated_at);
    }

    #[test]
    fn legacy_id_is_not_canonical() {
        let mut contact = Contact::new("Ada");
        contact.id = "1699999999-abc".to_string();
        assert!(!contact.is_canonical());
    }

    #[test]
    fn mark_dirty_touches_timestamp() {
        let mut contact = Contact::new("Ada");
        contact.needs_upsert = false;
        contact.mark_dirty();
        assert!(contact.needs_upsert);
        assert!(contact.updated_at >= contact.created_at);
    }

    #[test]
    fn serializes_camel_case() {
        let contact = Contact::new("Ada");
        let json = serde_json::to_string(&contact).unwrap();
        assert!(json.contains("\"companyId\""));
        assert!(json.contains("\"needsUpsert\""));
        assert!(json.contains("\"mergedFromIds\""));
    }

    #[test]
    fn deserializes_with_missing_optional_fields() {
        let json = r#"{"id":"1699999999-abc","name":"Ada","createdAt":1,"updatedAt":1}"#;
        let contact: Contact = serde_json::from_str(json).unwrap();
        assert_eq!(contact.name, "Ada");
        assert!(contact.company_id.is_none());
        assert!(contact.timeline.is_empty());
        assert!(!contact.needs_upsert);
    }
}
