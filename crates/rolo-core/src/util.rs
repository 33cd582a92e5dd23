//! Shared utility functions used across multiple modules.

use uuid::Uuid;

/// Normalize optional text by trimming whitespace and removing empties.
///
/// Returns `None` when the input is `None` or the trimmed value is empty.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Check if a string starts with `http://` or `https://`.
pub fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Truncate text to at most 180 characters for error messages.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(180).collect()
}

/// Current Unix timestamp in milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Check whether an identifier is canonical (standard UUID form).
///
/// Legacy identifiers are free-form strings (historically timestamp+random,
/// e.g. `1699999999-abc`) and never parse as UUIDs.
pub fn is_canonical_id(id: &str) -> bool {
    Uuid::parse_str(id).is_ok()
}
