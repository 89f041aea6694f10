//! One-shot job configuration and payload rendering.
//!
//! The job shape is environment-configured (`JOB_*` variables) and combined
//! with an [`ActionRequest`] to produce the payload the task runner turns
//! into a containerized job: image, command, a script mounted from a config
//! map, and the merged environment.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::payload::{ActionRequest, EnvVar};

/// Environment-configured job template settings.
///
/// Recognized variables (all optional, defaults documented per field):
/// `JOB_NAMESPACE`, `JOB_IMAGE`, `JOB_COMMAND`, `JOB_ARGS`,
/// `JOB_SCRIPT_CONFIG_MAP`, `JOB_SCRIPT_NAME`, `JOB_SCRIPT_MOUNT_PATH`,
/// `JOB_ENV`. The JSON-valued ones (`JOB_COMMAND`, `JOB_ARGS`, `JOB_ENV`)
/// fall back to their defaults with a warning when unparseable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    /// Namespace the job runs in. Default `default`.
    pub namespace: String,
    /// Container image. Default `python:3.12-alpine`.
    pub image: String,
    /// Container command. Default `["sh", "-c"]`.
    pub command: Vec<String>,
    /// Container arguments. Default runs the mounted script.
    pub args: Vec<String>,
    /// Config map holding the job script. Default `rollsettle-job-script`.
    pub script_config_map: String,
    /// Script file name inside the config map. Default `post_deploy.py`.
    pub script: String,
    /// Mount path for the script volume. Default `/mnt/exec`.
    pub script_mount_path: String,
    /// Static environment (literal values and secret refs) prepended to
    /// every job.
    pub env: Vec<EnvVar>,
}

impl Default for JobConfig {
    fn default() -> Self {
        let script_mount_path = "/mnt/exec".to_string();
        let script = "post_deploy.py".to_string();
        Self {
            namespace: "default".to_string(),
            image: "python:3.12-alpine".to_string(),
            command: vec!["sh".to_string(), "-c".to_string()],
            args: vec![format!("python {script_mount_path}/{script}")],
            script_config_map: "rollsettle-job-script".to_string(),
            script,
            script_mount_path,
            env: Vec::new(),
        }
    }
}

impl JobConfig {
    /// Read the job template from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the job template through an arbitrary lookup (for testing).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let namespace = lookup("JOB_NAMESPACE").unwrap_or(defaults.namespace);
        let image = lookup("JOB_IMAGE").unwrap_or(defaults.image);
        let script_config_map =
            lookup("JOB_SCRIPT_CONFIG_MAP").unwrap_or(defaults.script_config_map);
        let script = lookup("JOB_SCRIPT_NAME").unwrap_or(defaults.script);
        let script_mount_path =
            lookup("JOB_SCRIPT_MOUNT_PATH").unwrap_or(defaults.script_mount_path);

        let command = parse_json_var(&lookup, "JOB_COMMAND", defaults.command);
        let args = parse_json_var(
            &lookup,
            "JOB_ARGS",
            vec![format!("python {script_mount_path}/{script}")],
        );
        let env = parse_json_var(&lookup, "JOB_ENV", Vec::new());

        Self {
            namespace,
            image,
            command,
            args,
            script_config_map,
            script,
            script_mount_path,
            env,
        }
    }

    /// Render the job payload for one settled rollout.
    ///
    /// The merged environment is: static config env, then the request's
    /// attribute variables, with `APP_NAME` last.
    pub fn render(&self, request: &ActionRequest) -> JobPayload {
        let mut env = self.env.clone();
        env.extend(request.env_vars());

        JobPayload {
            name: format!("{}-job", request.identity),
            namespace: self.namespace.clone(),
            image: self.image.clone(),
            command: self.command.clone(),
            args: self.args.clone(),
            env,
            volume: ScriptVolume {
                config_map: self.script_config_map.clone(),
                mount_path: self.script_mount_path.clone(),
            },
            ttl_seconds_after_finished: 1,
            completions: 1,
            backoff_limit: 2,
            restart_policy: "OnFailure".to_string(),
        }
    }
}

/// The one-shot job payload submitted to the task runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPayload {
    pub name: String,
    pub namespace: String,
    pub image: String,
    pub command: Vec<String>,
    pub args: Vec<String>,
    pub env: Vec<EnvVar>,
    pub volume: ScriptVolume,
    pub ttl_seconds_after_finished: u32,
    pub completions: u32,
    pub backoff_limit: u32,
    pub restart_policy: String,
}

/// Config map volume the job script is mounted from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptVolume {
    pub config_map: String,
    pub mount_path: String,
}

/// Parse a JSON-valued environment variable, falling back to a default.
fn parse_json_var<T: serde::de::DeserializeOwned>(
    lookup: impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    match lookup(key) {
        Some(raw) => match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                warn!(%key, error = %e, "unparseable job setting, using default");
                default
            }
        },
        None => default,
    }
}
