//! rollsettle-action — the follow-up action fired for a settled rollout.
//!
//! When the reconciler decides a rollout has settled, it hands this crate an
//! [`ActionRequest`] (identity plus the attributes captured at record
//! creation). The request is templated into a one-shot containerized job
//! payload and submitted to the external task runner over HTTP,
//! fire-and-forget.

pub mod job;
pub mod payload;
pub mod submit;

pub use job::{JobConfig, JobPayload, ScriptVolume};
pub use payload::{ActionRequest, EnvVar, SecretRef};
pub use submit::submit_job;
