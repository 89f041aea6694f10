//! Daemon configuration.
//!
//! All options are environment variables with documented defaults. An
//! absent or unparseable value falls back to its default with a warning —
//! bad configuration degrades, it never fails startup.

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use rollsettle_policy::PolicyWindows;

/// Recognized environment variables and their defaults.
///
/// | Variable | Default |
/// |---|---|
/// | `SETTLE_WINDOW_SECONDS` | `300` |
/// | `STALE_WINDOW_SECONDS` | `1800` |
/// | `RECONCILE_INTERVAL_SECONDS` | `10` |
/// | `CAPTURED_ATTRIBUTE_NAMES` | empty (comma-separated list) |
/// | `RECORD_STORE_LOCATION` | `/var/lib/rollsettle/records.redb` |
/// | `ACTION_ENDPOINT` | unset — fired actions are logged only |
/// | `ACTION_TIMEOUT_SECONDS` | `10` |
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub settle_window_secs: u64,
    pub stale_window_secs: u64,
    pub reconcile_interval_secs: u64,
    pub captured_attribute_names: Vec<String>,
    pub record_store_location: PathBuf,
    pub action_endpoint: Option<String>,
    pub action_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            settle_window_secs: 300,
            stale_window_secs: 1800,
            reconcile_interval_secs: 10,
            captured_attribute_names: Vec::new(),
            record_store_location: PathBuf::from("/var/lib/rollsettle/records.redb"),
            action_endpoint: None,
            action_timeout_secs: 10,
        }
    }
}

impl Config {
    /// Read configuration from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary lookup (for testing).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            settle_window_secs: parse_secs(
                lookup("SETTLE_WINDOW_SECONDS"),
                "SETTLE_WINDOW_SECONDS",
                defaults.settle_window_secs,
            ),
            stale_window_secs: parse_secs(
                lookup("STALE_WINDOW_SECONDS"),
                "STALE_WINDOW_SECONDS",
                defaults.stale_window_secs,
            ),
            reconcile_interval_secs: parse_secs(
                lookup("RECONCILE_INTERVAL_SECONDS"),
                "RECONCILE_INTERVAL_SECONDS",
                defaults.reconcile_interval_secs,
            ),
            captured_attribute_names: lookup("CAPTURED_ATTRIBUTE_NAMES")
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            record_store_location: lookup("RECORD_STORE_LOCATION")
                .map(PathBuf::from)
                .unwrap_or(defaults.record_store_location),
            action_endpoint: lookup("ACTION_ENDPOINT").filter(|s| !s.trim().is_empty()),
            action_timeout_secs: parse_secs(
                lookup("ACTION_TIMEOUT_SECONDS"),
                "ACTION_TIMEOUT_SECONDS",
                defaults.action_timeout_secs,
            ),
        }
    }

    /// Policy windows from the configured thresholds.
    ///
    /// An inverted pair (settle >= stale) falls back to the default windows
    /// rather than refusing to start.
    pub fn windows(&self) -> PolicyWindows {
        match PolicyWindows::new(self.settle_window_secs, self.stale_window_secs) {
            Ok(windows) => windows,
            Err(e) => {
                warn!(error = %e, "invalid window configuration, using defaults");
                let defaults = Self::default();
                PolicyWindows::new(defaults.settle_window_secs, defaults.stale_window_secs)
                    .expect("default windows are valid")
            }
        }
    }

    /// Reconciliation interval as a duration.
    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }

    /// Action submission timeout as a duration.
    pub fn action_timeout(&self) -> Duration {
        Duration::from_secs(self.action_timeout_secs)
    }
}

/// Parse a seconds value, falling back to a default on garbage.
fn parse_secs(raw: Option<String>, key: &str, default: u64) -> u64 {
    match raw {
        Some(value) => match value.trim().parse() {
            Ok(secs) => secs,
            Err(_) => {
                warn!(%key, %value, "unparseable seconds value, using default");
                default
            }
        },
        None => default,
    }
}
