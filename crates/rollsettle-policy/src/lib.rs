//! rollsettle-policy — pure settle/expire classification.
//!
//! Given a record's age and its create/delete counters, [`PolicyWindows::classify`]
//! decides whether the reconciler should leave the record alone, discard it,
//! or fire the follow-up action. The function is pure: identical inputs
//! always produce the same classification.

pub mod policy;

pub use policy::{Classification, PolicyError, PolicyWindows};
