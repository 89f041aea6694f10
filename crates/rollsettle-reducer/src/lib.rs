//! rollsettle-reducer — folds pod lifecycle notifications into records.
//!
//! The watch subsystem delivers `{identity, kind, metadata}` notifications
//! at-least-once, unordered, with possible duplicates. The reducer converts
//! each into a counter fold applied through the record store's atomic
//! `upsert`, so correctness never depends on delivery order.
//!
//! Malformed notifications are rejected before any store access — a bad
//! input is dropped, never half-applied.

pub mod capture;
pub mod event;
pub mod reducer;

pub use capture::AttributeCapture;
pub use event::{sanitize_identity, EventKind, PodNotification};
pub use reducer::{EventReducer, ReduceError};
