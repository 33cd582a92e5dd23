//! Mutation sync queue item model

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::util::now_ms;

/// Which entity collection a queued mutation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    Contact,
    Company,
    MergeHistory,
}

/// The kind of write a queued mutation performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncAction {
    Create,
    Update,
    Delete,
}

/// HTTP method for replaying a queued mutation verbatim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

/// Lifecycle state of a queued mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncStatus {
    /// Waiting for a drain (possibly backed off until `next_retry_at`)
    Pending,
    /// Exceeded the retry ceiling; retained until user retry or dismiss
    Failed,
}

/// A pending write operation destined for the server.
///
/// Items carry enough information (endpoint, method, payload) to be replayed
/// verbatim. The item `id` doubles as the `clientId` idempotency key the
/// server uses to deduplicate retried creates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncQueueItem {
    pub id: String,
    pub kind: EntityKind,
    pub action: SyncAction,
    pub endpoint: String,
    pub method: HttpMethod,
    pub payload: serde_json::Value,
    /// Unix ms
    pub enqueued_at: i64,
    #[serde(default)]
    pub retry_count: u32,
    pub status: SyncStatus,
    #[serde(default)]
    pub last_error: Option<String>,
    /// Unix ms; the item is not retried before this instant
    #[serde(default)]
    pub next_retry_at: i64,
}

impl SyncQueueItem {
    /// Create a fresh pending item, eligible for the next drain
    #[must_use]
    pub fn new(
        kind: EntityKind,
        action: SyncAction,
        endpoint: impl Into<String>,
        method: HttpMethod,
        payload: serde_json::Value,
    ) -> Self {
        let now = now_ms();
        Self {
            id: Uuid::now_v7().to_string(),
            kind,
            action,
            endpoint: endpoint.into(),
            method,
            payload,
            enqueued_at: now,
            retry_count: 0,
            status: SyncStatus::Pending,
            last_error: None,
            next_retry_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_item_is_pending_and_immediately_eligible() {
        let item = SyncQueueItem::new(
            EntityKind::Contact,
            SyncAction::Create,
            "/contacts/upsert",
            HttpMethod::Post,
            serde_json::json!({"name": "Ada"}),
        );
        assert_eq!(item.status, SyncStatus::Pending);
        assert_eq!(item.retry_count, 0);
        assert!(item.next_retry_at <= item.enqueued_at);
    }

    #[test]
    fn entity_kind_serializes_camel_case() {
        assert_eq!(
            serde_json::to_string(&EntityKind::MergeHistory).unwrap(),
            "\"mergeHistory\""
        );
        let kind: EntityKind = serde_json::from_str("\"company\"").unwrap();
        assert_eq!(kind, EntityKind::Company);
    }

    #[test]
    fn method_serializes_uppercase() {
        assert_eq!(
            serde_json::to_string(&HttpMethod::Delete).unwrap(),
            "\"DELETE\""
        );
        assert_eq!(HttpMethod::Post.as_str(), "POST");
    }
}
