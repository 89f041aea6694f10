//! Event reducer — applies lifecycle notifications as record folds.
//!
//! Each notification becomes one fold through [`RecordStore::upsert`]. The
//! create fold seeds a record (capturing attributes exactly once) or
//! increments the created counter; the delete fold increments the deleted
//! counter and is a no-op for untracked identities — a delete arriving after
//! the record was reconciled away is expected, not an error.

use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tracing::debug;

use rollsettle_state::{RecordStore, RolloutRecord, StoreError, SCHEMA_VERSION};

use crate::capture::AttributeCapture;
use crate::event::{sanitize_identity, EventKind, PodNotification};

/// Errors applying a notification.
#[derive(Debug, Error)]
pub enum ReduceError {
    /// The notification is missing required fields or is not parseable.
    #[error("malformed notification: {0}")]
    Malformed(String),

    /// The store rejected the fold; the notification is dropped and the
    /// prior record value is intact.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Folds lifecycle notifications into the record store.
#[derive(Clone)]
pub struct EventReducer {
    store: RecordStore,
    capture: AttributeCapture,
}

impl EventReducer {
    /// Create a reducer over the given store.
    pub fn new(store: RecordStore, capture: AttributeCapture) -> Self {
        Self { store, capture }
    }

    /// Apply one notification, dispatching on its kind.
    ///
    /// Returns the record as persisted after the fold, or `None` when the
    /// fold was a no-op (delete for an untracked identity).
    pub fn apply(&self, notification: &PodNotification) -> Result<Option<RolloutRecord>, ReduceError> {
        notification.validate()?;
        match notification.kind {
            EventKind::Create => self.apply_create(notification).map(Some),
            EventKind::Delete => self.apply_delete(notification),
        }
    }

    /// Fold a create notification.
    ///
    /// Seeds the record on first sight of an identity (capturing attributes
    /// from this notification's metadata — later folds never overwrite them)
    /// or increments `created_count` and refreshes the informational fields.
    pub fn apply_create(&self, notification: &PodNotification) -> Result<RolloutRecord, ReduceError> {
        notification.validate()?;
        let identity = sanitize_identity(&notification.identity);
        let now = epoch_secs();
        let attributes = self.capture.extract(&notification.metadata);

        let record = self
            .store
            .upsert(&identity, |current| {
                Some(match current {
                    None => RolloutRecord {
                        identity: identity.clone(),
                        revision_hash: notification.revision_hash.clone().unwrap_or_default(),
                        last_pod_name: notification.pod_name.clone().unwrap_or_default(),
                        created_count: 1,
                        deleted_count: 0,
                        last_updated: now,
                        attributes,
                        schema_version: SCHEMA_VERSION,
                    },
                    Some(mut record) => {
                        record.created_count += 1;
                        if let Some(hash) = &notification.revision_hash {
                            record.revision_hash = hash.clone();
                        }
                        if let Some(name) = &notification.pod_name {
                            record.last_pod_name = name.clone();
                        }
                        record.last_updated = record.last_updated.max(now);
                        record
                    }
                })
            })?
            .expect("create fold always persists");

        debug!(
            %identity,
            created = record.created_count,
            deleted = record.deleted_count,
            "create notification folded"
        );
        Ok(record)
    }

    /// Fold a delete notification.
    ///
    /// Increments `deleted_count` for a tracked identity; returns `None`
    /// without touching the store when no record exists.
    pub fn apply_delete(
        &self,
        notification: &PodNotification,
    ) -> Result<Option<RolloutRecord>, ReduceError> {
        notification.validate()?;
        let identity = sanitize_identity(&notification.identity);
        let now = epoch_secs();

        let record = self.store.upsert(&identity, |current| {
            current.map(|mut record| {
                record.deleted_count += 1;
                record.last_updated = record.last_updated.max(now);
                record
            })
        })?;

        match &record {
            Some(record) => debug!(
                %identity,
                created = record.created_count,
                deleted = record.deleted_count,
                "delete notification folded"
            ),
            None => debug!(
                %identity,
                "delete for untracked rollout — record already reconciled away"
            ),
        }
        Ok(record)
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
