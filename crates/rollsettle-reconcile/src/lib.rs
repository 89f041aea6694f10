//! rollsettle-reconcile — the periodic reconciler loop.
//!
//! On a fixed interval, lists every rollout record, classifies it against
//! the settle policy, and performs the resulting side effect: delete the
//! record (expire), or delete it and fire the follow-up action (fire).
//! Ticks are strictly serialized with themselves — the next sleep starts
//! only after the previous tick has finished.

pub mod reconciler;

pub use reconciler::{ActionCallback, Reconciler, TickSummary};
