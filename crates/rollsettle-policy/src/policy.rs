//! Settle policy — classifies a record by age and counter balance.
//!
//! Two thresholds drive the decision: the settle window (short) and the
//! stale window (long). A record inside the settle window is still active.
//! Past the settle window, a record that never saw both sides of the
//! lifecycle is discarded; one whose counts balanced is treated as a
//! completed rollout. Past the stale window, any record that saw a deletion
//! is force-resolved so records cannot accumulate indefinitely.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors constructing policy windows.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("settle window ({settle_secs}s) must be shorter than stale window ({stale_secs}s)")]
    InvalidWindows { settle_secs: u64, stale_secs: u64 },
}

/// Outcome of classifying a single record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Record is still within its active window; leave it for the next pass.
    NoAction,
    /// Record aged out without a conclusive lifecycle pair; discard it.
    Expire,
    /// Rollout settled; delete the record and invoke the follow-up action.
    Fire,
}

/// The two age thresholds, settle strictly shorter than stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyWindows {
    settle_secs: u64,
    stale_secs: u64,
}

impl PolicyWindows {
    /// Build a window pair, rejecting `settle >= stale`.
    pub fn new(settle_secs: u64, stale_secs: u64) -> Result<Self, PolicyError> {
        if settle_secs >= stale_secs {
            return Err(PolicyError::InvalidWindows {
                settle_secs,
                stale_secs,
            });
        }
        Ok(Self {
            settle_secs,
            stale_secs,
        })
    }

    /// Settle (short) threshold in seconds.
    pub fn settle_secs(&self) -> u64 {
        self.settle_secs
    }

    /// Stale (long) threshold in seconds.
    pub fn stale_secs(&self) -> u64 {
        self.stale_secs
    }

    /// Classify a record by its age and counters.
    ///
    /// Evaluation order matters at the window boundaries:
    ///
    /// 1. Stale override — a record that saw any deletion and aged past the
    ///    stale window fires regardless of balance. This outranks expiry, so
    ///    a delete-only record past the stale window fires instead of being
    ///    silently dropped.
    /// 2. Expire — past the settle window without ever observing a matching
    ///    create/delete pair (either counter still zero).
    /// 3. Fire — counts balanced (nonzero) between the settle and stale
    ///    windows; the stale boundary itself is inclusive.
    /// 4. Otherwise the record is still settling.
    pub fn classify(&self, age_secs: u64, created: u64, deleted: u64) -> Classification {
        if deleted > 0 && age_secs > self.stale_secs {
            return Classification::Fire;
        }
        if age_secs > self.settle_secs && (created == 0 || deleted == 0) {
            return Classification::Expire;
        }
        if age_secs > self.settle_secs && age_secs <= self.stale_secs && created == deleted {
            return Classification::Fire;
        }
        Classification::NoAction
    }
}
