//! redb table definitions for the rollout record store.
//!
//! A single table holds all rollout records, `&str` keys (sanitized rollout
//! identity) and `&[u8]` values (JSON-serialized [`crate::RolloutRecord`]).

use redb::TableDefinition;

/// Rollout records keyed by `{identity}`.
pub const RECORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("rollout_records");
