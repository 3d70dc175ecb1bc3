//! budget-etl core: loads personal-finance exports into SQLite.
//!
//! Dimension tables (wallets, categories, places, events) are merged with
//! upsert-on-change semantics; the transaction fact table is reconciled
//! month by month against the cleaned export.

pub mod cleaner;
pub mod config;
pub mod consolidator;
pub mod dimension;
pub mod engine;
pub mod error;
pub mod job;
pub mod source;
pub mod store;
pub mod transaction;
pub mod types;
