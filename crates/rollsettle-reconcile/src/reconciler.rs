//! Reconciler — applies settle policy to every record, once per tick.
//!
//! Deletion happens before the follow-up action is invoked (delete-then-act):
//! a crash between the two results in a missed action rather than a record
//! that fires again on the next tick. Action submission failure is logged
//! and never retried — at-most-once delivery.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, error, info, warn};

use rollsettle_action::ActionRequest;
use rollsettle_policy::{Classification, PolicyWindows};
use rollsettle_state::{RecordStore, RolloutRecord};

/// Callback invoked with the action request when a rollout settles.
///
/// The daemon wires this to the job renderer + HTTP submitter.
pub type ActionCallback = Arc<dyn Fn(ActionRequest) -> BoxFuture + Send + Sync>;

type BoxFuture = std::pin::Pin<
    Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send>,
>;

/// Counters for one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Records examined this tick.
    pub examined: u32,
    /// Records deleted without action.
    pub expired: u32,
    /// Records deleted with the follow-up action invoked.
    pub fired: u32,
    /// Fired actions whose submission failed or timed out.
    pub action_failures: u32,
}

/// Drives settle-policy evaluation over the record store.
pub struct Reconciler {
    store: RecordStore,
    windows: PolicyWindows,
    action: Option<ActionCallback>,
    action_timeout: Duration,
}

impl Reconciler {
    /// Create a reconciler with no follow-up action wired.
    pub fn new(store: RecordStore, windows: PolicyWindows) -> Self {
        Self {
            store,
            windows,
            action: None,
            action_timeout: Duration::from_secs(10),
        }
    }

    /// Set the follow-up action callback.
    pub fn with_action(mut self, action: ActionCallback) -> Self {
        self.action = Some(action);
        self
    }

    /// Bound the time one action submission may take. A hung task runner
    /// cannot stall the tick clock beyond this.
    pub fn with_action_timeout(mut self, timeout: Duration) -> Self {
        self.action_timeout = timeout;
        self
    }

    /// Run one reconciliation pass over all records.
    ///
    /// Failures are isolated per record: a store error on one identity is
    /// logged and the pass proceeds to the next.
    pub async fn tick(&self) -> TickSummary {
        let mut summary = TickSummary::default();

        let records = match self.store.list_all() {
            Ok(records) => records,
            Err(e) => {
                error!(error = %e, "listing rollout records failed, skipping tick");
                return summary;
            }
        };

        if records.is_empty() {
            debug!("no rollout records to reconcile");
            return summary;
        }

        let now = epoch_secs();
        for record in records {
            summary.examined += 1;
            let age_secs = now.saturating_sub(record.last_updated);
            let classification =
                self.windows
                    .classify(age_secs, record.created_count, record.deleted_count);

            debug!(
                identity = %record.identity,
                age_secs,
                created = record.created_count,
                deleted = record.deleted_count,
                ?classification,
                "record classified"
            );

            match classification {
                Classification::NoAction => {}
                Classification::Expire => self.expire(&record, age_secs, &mut summary),
                Classification::Fire => self.fire(&record, age_secs, &mut summary).await,
            }
        }

        info!(
            examined = summary.examined,
            expired = summary.expired,
            fired = summary.fired,
            action_failures = summary.action_failures,
            "reconciliation tick complete"
        );
        summary
    }

    fn expire(&self, record: &RolloutRecord, age_secs: u64, summary: &mut TickSummary) {
        match self.store.delete(&record.identity) {
            Ok(_) => {
                summary.expired += 1;
                info!(
                    identity = %record.identity,
                    age_secs,
                    created = record.created_count,
                    deleted = record.deleted_count,
                    "record expired without settle action"
                );
            }
            Err(e) => {
                warn!(
                    identity = %record.identity,
                    error = %e,
                    "failed to delete expired record, will retry next tick"
                );
            }
        }
    }

    async fn fire(&self, record: &RolloutRecord, age_secs: u64, summary: &mut TickSummary) {
        // Delete before acting: a crash here means a missed action, not a
        // duplicate record.
        if let Err(e) = self.store.delete(&record.identity) {
            warn!(
                identity = %record.identity,
                error = %e,
                "failed to delete settled record, deferring action to next tick"
            );
            return;
        }
        summary.fired += 1;
        info!(
            identity = %record.identity,
            age_secs,
            created = record.created_count,
            deleted = record.deleted_count,
            "rollout settled, firing follow-up action"
        );

        let Some(action) = &self.action else {
            debug!(identity = %record.identity, "no action callback wired, fire logged only");
            return;
        };

        let request = ActionRequest {
            identity: record.identity.clone(),
            attributes: record.attributes.clone(),
        };
        match tokio::time::timeout(self.action_timeout, action(request)).await {
            Ok(Ok(())) => {
                debug!(identity = %record.identity, "follow-up action submitted");
            }
            Ok(Err(e)) => {
                summary.action_failures += 1;
                warn!(
                    identity = %record.identity,
                    error = %e,
                    "follow-up action failed, not retried"
                );
            }
            Err(_) => {
                summary.action_failures += 1;
                warn!(
                    identity = %record.identity,
                    timeout_secs = self.action_timeout.as_secs(),
                    "follow-up action timed out, not retried"
                );
            }
        }
    }

    /// Run the reconciler loop until shutdown.
    ///
    /// Ticks never overlap: the interval sleep is re-armed only after the
    /// previous tick completes, and a shutdown signal lets an in-flight
    /// tick finish before the loop exits.
    pub async fn run(
        &self,
        interval: Duration,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) {
        info!(interval_secs = interval.as_secs(), "reconciler started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    self.tick().await;
                }
                _ = shutdown.changed() => {
                    info!("reconciler shutting down");
                    break;
                }
            }
        }
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollsettle_state::{AttrValue, SCHEMA_VERSION};
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    const SETTLE: u64 = 300;
    const STALE: u64 = 1800;

    fn windows() -> PolicyWindows {
        PolicyWindows::new(SETTLE, STALE).unwrap()
    }

    /// Insert a record whose age (relative to now) is `age_secs`.
    fn seed(store: &RecordStore, identity: &str, created: u64, deleted: u64, age_secs: u64) {
        let last_updated = epoch_secs() - age_secs;
        let mut attributes = BTreeMap::new();
        attributes.insert("tier".to_string(), AttrValue::Str("web".to_string()));
        store
            .upsert(identity, |_| {
                Some(RolloutRecord {
                    identity: identity.to_string(),
                    revision_hash: "5f6b8d9".to_string(),
                    last_pod_name: format!("{identity}-5f6b8d9-x2k4p"),
                    created_count: created,
                    deleted_count: deleted,
                    last_updated,
                    attributes,
                    schema_version: SCHEMA_VERSION,
                })
            })
            .unwrap();
    }

    /// Callback that records every request it receives.
    fn recording_callback() -> (ActionCallback, Arc<Mutex<Vec<ActionRequest>>>) {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let callback: ActionCallback = {
            let fired = fired.clone();
            Arc::new(move |request| {
                let fired = fired.clone();
                Box::pin(async move {
                    fired.lock().unwrap().push(request);
                    Ok(())
                })
            })
        };
        (callback, fired)
    }

    #[tokio::test]
    async fn empty_store_tick_is_noop() {
        let store = RecordStore::open_in_memory().unwrap();
        let reconciler = Reconciler::new(store, windows());

        let summary = reconciler.tick().await;
        assert_eq!(summary, TickSummary::default());
    }

    #[tokio::test]
    async fn young_record_is_untouched() {
        let store = RecordStore::open_in_memory().unwrap();
        seed(&store, "app-a", 1, 1, 10);
        let reconciler = Reconciler::new(store.clone(), windows());

        let summary = reconciler.tick().await;
        assert_eq!(summary.examined, 1);
        assert_eq!(summary.expired + summary.fired, 0);
        assert!(store.get("app-a").unwrap().is_some());
    }

    #[tokio::test]
    async fn settled_rollout_fires_with_captured_attributes() {
        // Create + delete balanced, aged past the settle window.
        let store = RecordStore::open_in_memory().unwrap();
        seed(&store, "app-a", 1, 1, SETTLE + 5);

        let (callback, fired) = recording_callback();
        let reconciler = Reconciler::new(store.clone(), windows()).with_action(callback);

        let summary = reconciler.tick().await;
        assert_eq!(summary.fired, 1);
        assert_eq!(summary.action_failures, 0);
        assert!(store.get("app-a").unwrap().is_none());

        let fired = fired.lock().unwrap();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].identity, "app-a");
        assert_eq!(
            fired[0].attributes["tier"],
            AttrValue::Str("web".to_string())
        );
    }

    #[tokio::test]
    async fn inconclusive_record_expires_without_action() {
        // Create only, no delete ever.
        let store = RecordStore::open_in_memory().unwrap();
        seed(&store, "app-b", 1, 0, SETTLE + 1);

        let (callback, fired) = recording_callback();
        let reconciler = Reconciler::new(store.clone(), windows()).with_action(callback);

        let summary = reconciler.tick().await;
        assert_eq!(summary.expired, 1);
        assert_eq!(summary.fired, 0);
        assert!(store.get("app-b").unwrap().is_none());
        assert!(fired.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn stale_unbalanced_record_fires() {
        // Create, delete, create again — unbalanced but past the stale window.
        let store = RecordStore::open_in_memory().unwrap();
        seed(&store, "app-c", 2, 1, STALE + 1);

        let (callback, fired) = recording_callback();
        let reconciler = Reconciler::new(store.clone(), windows()).with_action(callback);

        let summary = reconciler.tick().await;
        assert_eq!(summary.fired, 1);
        assert!(store.get("app-c").unwrap().is_none());
        assert_eq!(fired.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn record_is_deleted_even_when_action_fails() {
        let store = RecordStore::open_in_memory().unwrap();
        seed(&store, "app-a", 2, 2, SETTLE + 5);

        let failing: ActionCallback =
            Arc::new(|_| Box::pin(async { anyhow::bail!("task runner unavailable") }));
        let reconciler = Reconciler::new(store.clone(), windows()).with_action(failing);

        let summary = reconciler.tick().await;
        assert_eq!(summary.fired, 1);
        assert_eq!(summary.action_failures, 1);
        // Delete-then-act: the record is gone despite the failure.
        assert!(store.get("app-a").unwrap().is_none());
    }

    #[tokio::test]
    async fn slow_action_is_timed_out() {
        let store = RecordStore::open_in_memory().unwrap();
        seed(&store, "app-a", 1, 1, SETTLE + 5);

        let hanging: ActionCallback = Arc::new(|_| {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
        });
        let reconciler = Reconciler::new(store.clone(), windows())
            .with_action(hanging)
            .with_action_timeout(Duration::from_millis(50));

        let summary = reconciler.tick().await;
        assert_eq!(summary.fired, 1);
        assert_eq!(summary.action_failures, 1);
    }

    #[tokio::test]
    async fn records_are_isolated_within_a_tick() {
        let store = RecordStore::open_in_memory().unwrap();
        seed(&store, "young", 1, 1, 10);
        seed(&store, "fire-me", 1, 1, SETTLE + 5);
        seed(&store, "expire-me", 3, 0, SETTLE + 5);

        let (callback, fired) = recording_callback();
        let reconciler = Reconciler::new(store.clone(), windows()).with_action(callback);

        let summary = reconciler.tick().await;
        assert_eq!(summary.examined, 3);
        assert_eq!(summary.fired, 1);
        assert_eq!(summary.expired, 1);

        assert!(store.get("young").unwrap().is_some());
        assert!(store.get("fire-me").unwrap().is_none());
        assert!(store.get("expire-me").unwrap().is_none());
        assert_eq!(fired.lock().unwrap()[0].identity, "fire-me");
    }

    #[tokio::test]
    async fn fire_without_callback_still_deletes() {
        let store = RecordStore::open_in_memory().unwrap();
        seed(&store, "app-a", 1, 1, SETTLE + 5);
        let reconciler = Reconciler::new(store.clone(), windows());

        let summary = reconciler.tick().await;
        assert_eq!(summary.fired, 1);
        assert!(store.get("app-a").unwrap().is_none());
    }

    #[tokio::test]
    async fn run_loop_ticks_and_shuts_down() {
        let store = RecordStore::open_in_memory().unwrap();
        seed(&store, "app-a", 1, 1, SETTLE + 5);
        let reconciler = Reconciler::new(store.clone(), windows());

        let (tx, rx) = tokio::sync::watch::channel(false);
        let handle = tokio::spawn(async move {
            reconciler.run(Duration::from_millis(10), rx).await;
        });

        // Give the loop a few intervals to tick.
        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert!(store.get("app-a").unwrap().is_none());
    }
}
