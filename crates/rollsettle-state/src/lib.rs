//! rollsettle-state — durable rollout record store.
//!
//! Backed by [redb](https://docs.rs/redb), keeps one counter record per
//! rollout identity. Records are JSON-serialized into redb's `&[u8]` value
//! column, keyed by the sanitized identity string.
//!
//! # Architecture
//!
//! The store is the single synchronization point of the system: every
//! counter fold goes through [`RecordStore::upsert`], which performs the
//! read-modify-write inside one write transaction. Write transactions are
//! serialized by redb, so two racing folds for the same identity can never
//! clobber each other's counters.
//!
//! The `RecordStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StoreError, StoreResult};
pub use store::RecordStore;
pub use types::*;
