//! rolo-core - Core library for Rolo
//!
//! This crate contains the client-side data-consistency layer shared by all
//! Rolo interfaces: the local contact store, the one-time identity
//! normalization pass, the fuzzy deduplication engine, the durable mutation
//! sync queue, and the session-start hydration/reconciliation routine.

pub mod config;
pub mod dedupe;
pub mod error;
pub mod hydrate;
pub mod migrate;
pub mod models;
pub mod session;
pub mod store;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{Company, Contact};
pub use store::Store;
