//! Company model

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::util::{is_canonical_id, now_ms};

/// A company referenced by one or more contacts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    pub id: String,
    #[serde(default)]
    pub legacy_id: Option<String>,
    pub name: String,
    /// Email/web domain, used by the deduplication engine for matching
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    /// Dirty flag: local changes not yet confirmed persisted server-side
    #[serde(default)]
    pub needs_upsert: bool,
    /// Unix ms
    pub created_at: i64,
    /// Unix ms
    pub updated_at: i64,
}

impl Company {
    /// Create a new company with a canonical id, marked dirty for sync
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let now = now_ms();
        Self {
            id: Uuid::now_v7().to_string(),
            legacy_id: None,
            name: name.into(),
            domain: None,
            city: None,
            country: None,
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
