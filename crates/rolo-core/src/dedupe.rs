//! Fuzzy contact deduplication and merge engine.
//!
//! Pure, stateless functions over an in-memory snapshot of contacts: field
//! normalization, Levenshtein-based similarity, pairwise signal scoring,
//! single-pass grouping, and a field-level merge policy. Output is ephemeral;
//! callers persist merge results as ordinary writes.

// Similarity scores live in 0-100, converted between f64 and u8 at the edges.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]

use std::fmt;

use serde::Serialize;

use crate::models::Contact;
use crate::util::now_ms;

/// Default minimum pairwise score for a duplicate group
pub const DEFAULT_MIN_SCORE: u8 = 60;

/// Stricter threshold used for automatic merge suggestions
pub const SUGGEST_MIN_SCORE: u8 = 70;

/// Legal suffixes stripped from company names before comparison
const LEGAL_SUFFIXES: [&str; 8] = ["ltd", "inc", "llc", "pty", "gmbh", "co", "company", "limited"];

/// Which field a match signal fired on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchField {
    Email,
    Phone,
    SocialUrl,
    NameCompany,
    Name,
    NameDomain,
}

impl fmt::Display for MatchField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Email => "email",
            Self::Phone => "phone",
            Self::SocialUrl => "social url",
            Self::NameCompany => "name + company",
            Self::Name => "name",
            Self::NameDomain => "name + email domain",
        };
        write!(f, "{label}")
    }
}

/// One fired match signal between a pair of contacts
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchReason {
    pub field: MatchField,
    pub description: String,
    pub confidence: u8,
}

/// A set of contacts believed to represent the same real person
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateGroup {
    pub contact_ids: Vec<String>,
    /// Best pairwise score within the group (0-100)
    pub top_score: u8,
    /// De-duplicated by field, sorted by descending confidence
    pub reasons: Vec<MatchReason>,
}

/// Lower-case and trim an email address
#[must_use]
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Strip a phone number to digits, preserving a leading `+`
#[must_use]
pub fn normalize_phone(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut out = String::with_capacity(trimmed.len());
    for (index, ch) in trimmed.chars().enumerate() {
        if ch.is_ascii_digit() || (ch == '+' && index == 0) {
            out.push(ch);
        }
    }
    out
}

/// Lower-case a name and collapse runs of whitespace
#[must_use]
pub fn normalize_name(raw: &str) -> String {
    raw.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lower-case a company name and strip legal suffixes (ltd, inc, llc, ...)
#[must_use]
pub fn normalize_company(raw: &str) -> String {
    raw.to_lowercase()
        .split_whitespace()
        .map(|token| token.trim_matches(|c: char| c == '.' || c == ','))
        .filter(|token| !token.is_empty() && !LEGAL_SUFFIXES.contains(token))
        .collect::<Vec<_>>()
        .join(" ")
}

fn normalize_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_lowercase()
}

fn email_domain(email: &str) -> Option<String> {
    let normalized = normalize_email(email);
    normalized.split('@').nth(1).map(ToString::to_string)
}

/// Levenshtein edit distance converted to a 0-100 similarity score
#[must_use]
pub fn similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let distance = strsim::levenshtein(a, b) as f64;
    let max_len = a.chars().count().max(b.chars().count()) as f64;
    100.0 * (1.0 - distance / max_len)
}

/// Does this contact's email domain resemble the other contact's company?
fn domain_matches_company(contact: &Contact, other: &Contact) -> bool {
    let Some(domain) = contact.email.as_deref().and_then(email_domain) else {
        return false;
    };
    let Some(stem) = domain.split('.').next() else {
        return false;
    };
    let Some(company) = other.company.as_deref() else {
        return false;
    };
    let company = normalize_company(company);
    !company.is_empty() && similarity(stem, &company) >= 60.0
}

/// Evaluate every match signal for a pair of contacts.
///
/// Signals are independent; the pair's score is the maximum confidence among
/// them. Symmetric: `score_pair(a, b)` and `score_pair(b, a)` fire the same
/// signals at the same confidences.
#[must_use]
pub fn score_pair(a: &Contact, b: &Contact) -> Vec<MatchReason> {
    let mut reasons = Vec::new();

    if let (Some(email_a), Some(email_b)) = (a.email.as_deref(), b.email.as_deref()) {
        let (email_a, email_b) = (normalize_email(email_a), normalize_email(email_b));
        if !email_a.is_empty() && email_a == email_b {
            reasons.push(MatchReason {
                field: MatchField::Email,
                description: format!("identical email address ({email_a})"),
                confidence: 100,
            });
        }
    }

    if let (Some(phone_a), Some(phone_b)) = (a.phone.as_deref(), b.phone.as_deref()) {
        let (phone_a, phone_b) = (normalize_phone(phone_a), normalize_phone(phone_b));
        if phone_a.len() >= 8 && phone_a == phone_b {
            reasons.push(MatchReason {
                field: MatchField::Phone,
                description: format!("identical phone number ({phone_a})"),
                confidence: 95,
            });
        }
    }

    if let (Some(url_a), Some(url_b)) = (a.social_url.as_deref(), b.social_url.as_deref()) {
        let (url_a, url_b) = (normalize_url(url_a), normalize_url(url_b));
        if !url_a.is_empty() && url_a == url_b {
            reasons.push(MatchReason {
                field: MatchField::SocialUrl,
                description: "identical social profile URL".to_string(),
                confidence: 95,
            });
        }
    }

    let name_sim = similarity(&normalize_name(&a.name), &normalize_name(&b.name));

    if let (Some(company_a), Some(company_b)) = (a.company.as_deref(), b.company.as_deref()) {
        let company_sim = similarity(&normalize_company(company_a), &normalize_company(company_b));
        if name_sim >= 85.0 && company_sim >= 80.0 {
            let confidence = 90.0_f64.min((name_sim + company_sim) / 2.0);
            reasons.push(MatchReason {
                field: MatchField::NameCompany,
                description: format!(
                    "similar name ({name_sim:.0}%) at similar company ({company_sim:.0}%)"
                ),
                confidence: confidence.round() as u8,
            });
        }
    }

    if name_sim >= 90.0 {
        let confidence = 70.0_f64.min(name_sim - 20.0);
        reasons.push(MatchReason {
            field: MatchField::Name,
            description: format!("very similar name ({name_sim:.0}%), no other corroboration"),
            confidence: confidence.round() as u8,
        });
    }

    // Checked in both directions so pair scoring stays symmetric
    if name_sim >= 85.0 && (domain_matches_company(a, b) || domain_matches_company(b, a)) {
        let confidence = 80.0_f64.min(name_sim);
        reasons.push(MatchReason {
            field: MatchField::NameDomain,
            description: format!("similar name ({name_sim:.0}%), email domain matches company"),
            confidence: confidence.round() as u8,
        });
    }

    reasons
}

fn best_confidence(reasons: &[MatchReason]) -> u8 {
    reasons.iter().map(|r| r.confidence).max().unwrap_or(0)
}

/// Find candidate duplicate groups across a contact snapshot.
///
/// Single pass over all unordered pairs; a contact already placed in a group
/// is never re-compared. Groups are sorted by descending top score.
#[must_use]
pub fn find_duplicate_groups(contacts: &[Contact], min_score: u8) -> Vec<DuplicateGroup> {
    let mut grouped = vec![false; contacts.len()];
    let mut groups = Vec::new();

    for i in 0..contacts.len() {
        if grouped[i] {
            continue;
        }

        let mut member_ids = vec![contacts[i].id.clone()];
        let mut reasons: Vec<MatchReason> = Vec::new();

        for j in (i + 1)..contacts.len() {
            if grouped[j] {
                continue;
            }
            let pair = score_pair(&contacts[i], &contacts[j]);
            if best_confidence(&pair) >= min_score {
                grouped[j] = true;
                member_ids.push(contacts[j].id.clone());
                reasons.extend(pair);
            }
        }

        if member_ids.len() < 2 {
            continue;
        }
        grouped[i] = true;

        let top_score = best_confidence(&reasons);
        reasons.sort_by(|left, right| right.confidence.cmp(&left.confidence));
        reasons.dedup_by_key(|reason| reason.field);

        groups.push(DuplicateGroup {
            contact_ids: member_ids,
            top_score,
            reasons,
        });
    }

    groups.sort_by(|left, right| right.top_score.cmp(&left.top_score));
    groups
}

/// A stricter, "safe to suggest automatically" view of duplicate groups
#[must_use]
pub fn suggest_merges(contacts: &[Contact], limit: usize) -> Vec<DuplicateGroup> {
    let mut groups = find_duplicate_groups(contacts, SUGGEST_MIN_SCORE);
    groups.truncate(limit);
    groups
}

/// Prefer the non-empty value; when both are non-empty, the longer one
fn fuller(primary: Option<&str>, secondary: Option<&str>) -> Option<String> {
    let primary = primary.map(str::trim).filter(|v| !v.is_empty());
    let secondary = secondary.map(str::trim).filter(|v| !v.is_empty());
    match (primary, secondary) {
        (Some(p), Some(s)) => {
            if s.chars().count() > p.chars().count() {
                Some(s.to_string())
            } else {
                Some(p.to_string())
            }
        }
        (Some(p), None) => Some(p.to_string()),
        (None, Some(s)) => Some(s.to_string()),
        (None, None) => None,
    }
}

/// Merge a duplicate into a primary contact, field by field.
///
/// Scalars follow the non-empty/longer policy, notes are concatenated, task
/// and reminder lists are unioned by id, the timeline is unioned and
/// re-sorted newest-first, and merge lineage is recorded for audit/undo.
/// The result is dirty: it still has to be pushed through the sync queue.
#[must_use]
pub fn merge_contacts(primary: &Contact, secondary: &Contact) -> Contact {
    let now = now_ms();
    let mut merged = primary.clone();

    merged.name = fuller(Some(&primary.name), Some(&secondary.name)).unwrap_or_default();
    merged.company = fuller(primary.company.as_deref(), secondary.company.as_deref());
    merged.title = fuller(primary.title.as_deref(), secondary.title.as_deref());
    merged.email = fuller(primary.email.as_deref(), secondary.email.as_deref());
    merged.phone = fuller(primary.phone.as_deref(), secondary.phone.as_deref());
    merged.website = fuller(primary.website.as_deref(), secondary.website.as_deref());
    merged.social_url = fuller(primary.social_url.as_deref(), secondary.social_url.as_deref());
    merged.address = fuller(primary.address.as_deref(), secondary.address.as_deref());
    merged.company_id = merged.company_id.or_else(|| secondary.company_id.clone());
    merged.manager_id = merged.manager_id.or_else(|| secondary.manager_id.clone());

    // Notes are never overwritten, only concatenated
    merged.notes = match (
        primary.notes.as_deref().map(str::trim).filter(|n| !n.is_empty()),
        secondary.notes.as_deref().map(str::trim).filter(|n| !n.is_empty()),
    ) {
        (Some(p), Some(s)) => Some(format!("{p}\n---\n{s}")),
        (Some(p), None) => Some(p.to_string()),
        (None, Some(s)) => Some(s.to_string()),
        (None, None) => None,
    };

    merged.org.department = merged.org.department.or(secondary.org.department);
    merged.org.seniority = merged.org.seniority.or(secondary.org.seniority);
    merged.org.influence = merged.org.influence.or(secondary.org.influence);
    merged.org.relationship_strength = merged
        .org
        .relationship_strength
        .or(secondary.org.relationship_strength);
    merged.org.reports_to_id = merged
        .org
        .reports_to_id
        .or_else(|| secondary.org.reports_to_id.clone());

    for task in &secondary.tasks {
        if !merged.tasks.iter().any(|existing| existing.id == task.id) {
            merged.tasks.push(task.clone());
        }
    }
    for reminder in &secondary.reminders {
        if !merged.reminders.iter().any(|existing| existing.id == reminder.id) {
            merged.reminders.push(reminder.clone());
        }
    }
    for entry in &secondary.timeline {
        if !merged.timeline.iter().any(|existing| existing.id == entry.id) {
            merged.timeline.push(entry.clone());
        }
    }
    merged.timeline.sort_by(|left, right| right.timestamp.cmp(&left.timestamp));

    for source in secondary
        .merged_from_ids
        .iter()
        .chain(std::iter::once(&secondary.id))
    {
        if *source != merged.id && !merged.merged_from_ids.contains(source) {
            merged.merged_from_ids.push(source.clone());
        }
    }
    merged.merged_at = Some(now);
    merged.needs_upsert = true;
    merged.updated_at = now;

    merged
}
