//! Data models for Rolo

mod company;
mod contact;
mod merge_record;
mod sync_item;

pub use company::Company;
pub use contact::{
    Contact, Department, Influence, OrgInfo, RelationshipStrength, Reminder, Seniority, TaskItem,
    TimelineEntry,
};
pub use merge_record::MergeRecord;
pub use sync_item::{EntityKind, HttpMethod, SyncAction, SyncQueueItem, SyncStatus};
