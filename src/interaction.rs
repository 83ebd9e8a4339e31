use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::auth::{Credential, CredentialProvider};
use crate::error::{ErrorClass, FeedError};
use crate::events::{FeedEvent, Notice};
use crate::models::{EntityKey, InteractionView};
use crate::state::InteractionRecord;

/// Server side of the like/follow toggles.
pub trait InteractionBackend: Send + Sync {
    /// Drive the server to `desired`. Setting a state that is already held
    /// must succeed without effect.
    fn set_like_state(
        &self,
        credential: &Credential,
        key: &EntityKey,
        desired: bool,
    ) -> BoxFuture<'static, Result<(), FeedError>>;
}

/// How a toggle's request ended up affecting the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Latest request succeeded; the optimistic state is now confirmed
    Confirmed,
    /// A newer toggle on the same key was issued; the outcome was discarded
    Superseded,
    /// Latest request failed or timed out; state reverted to the last confirmed value
    RolledBack,
}

/// Returned by [`InteractionStateManager::toggle`]. Dropping it does not
/// cancel anything; the request keeps running in the background.
pub struct ToggleHandle {
    pub key: EntityKey,
    pub seq: u64,
    pub desired: bool,
    task: JoinHandle<Resolution>,
}

impl ToggleHandle {
    /// Wait for the request to complete and its outcome to be applied.
    pub async fn resolved(self) -> Result<Resolution, FeedError> {
        Ok(self.task.await?)
    }
}

fn view_of(record: &InteractionRecord) -> InteractionView {
    InteractionView {
        active: record.optimistic_state,
        count: record.displayed_count(),
        pending: record.is_pending(),
    }
}

/// Keyed store of like/follow state with optimistic updates.
///
/// Every toggle flips the visible state at once and issues a request tagged
/// with a per-key sequence number. Only the outcome carrying the highest
/// sequence number issued for that key may change the record; anything older
/// is dropped on arrival. Keys never contend with each other.
#[derive(Clone)]
pub struct InteractionStateManager {
    records: Arc<Mutex<HashMap<EntityKey, InteractionRecord>>>,
    backend: Arc<dyn InteractionBackend>,
    credentials: Arc<dyn CredentialProvider>,
    event_sender: broadcast::Sender<FeedEvent>,
    request_timeout: Duration,
}

impl InteractionStateManager {
    pub fn new(
        backend: Arc<dyn InteractionBackend>,
        credentials: Arc<dyn CredentialProvider>,
        request_timeout: Duration,
        event_sender: broadcast::Sender<FeedEvent>,
    ) -> Self {
        Self {
            records: Arc::new(Mutex::new(HashMap::new())),
            backend,
            credentials,
            event_sender,
            request_timeout,
        }
    }

    fn lock_records(&self) -> MutexGuard<'_, HashMap<EntityKey, InteractionRecord>> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, key: &EntityKey, record: &InteractionRecord) {
        let _ = self.event_sender.send(FeedEvent::InteractionChanged {
            key: key.clone(),
            view: view_of(record),
        });
    }

    fn notify(&self, notice: Notice) {
        let _ = self.event_sender.send(FeedEvent::Notice(notice));
    }

    pub fn record(&self, key: &EntityKey) -> Option<InteractionRecord> {
        self.lock_records().get(key).cloned()
    }

    /// Current read model for `key`; an unknown key reads as inactive with a zero count.
    pub fn view(&self, key: &EntityKey) -> InteractionView {
        self.lock_records()
            .get(key)
            .map(view_of)
            .unwrap_or(InteractionView {
                active: false,
                count: 0,
                pending: false,
            })
    }

    /// Install server-reported state for `key`. Ignored while a request for
    /// the key is in flight, so a late fetch cannot undo an optimistic toggle.
    pub fn seed(&self, key: &EntityKey, state: bool, count: u64) -> bool {
        let mut records = self.lock_records();
        let previous = records.get(key);
        if previous.is_some_and(InteractionRecord::is_pending) {
            trace!(key = %key, "Skipping seed, request in flight");
            return false;
        }
        let mut record = InteractionRecord::seeded(state, count);
        // Superseded requests may still be in flight; their seqs must stay stale
        if let Some(previous) = previous {
            record.pending_request_seq = previous.pending_request_seq;
            record.settled_seq = previous.pending_request_seq;
        }
        if previous.map(view_of) != Some(view_of(&record)) {
            self.publish(key, &record);
        }
        records.insert(key.clone(), record);
        true
    }

    /// Flip the toggle for `key` and start reconciling it with the server.
    ///
    /// Without a credential nothing changes: a sign-in notice is broadcast and
    /// [`FeedError::Unauthenticated`] returned. Must be called from within a
    /// Tokio runtime.
    pub fn toggle(&self, key: &EntityKey) -> Result<ToggleHandle, FeedError> {
        let Some(credential) = self.credentials.current_credential() else {
            debug!(key = %key, "Toggle blocked, no credential");
            self.notify(Notice::sign_in_required(key.kind.sign_in_prompt()));
            return Err(FeedError::Unauthenticated);
        };

        let (seq, desired) = {
            let mut records = self.lock_records();
            let record = records.entry(key.clone()).or_default();
            record.optimistic_state = !record.optimistic_state;
            record.counter_delta += if record.optimistic_state { 1 } else { -1 };
            record.pending_request_seq += 1;
            self.publish(key, record);
            (record.pending_request_seq, record.optimistic_state)
        };
        debug!(key = %key, seq, desired, "Optimistic toggle applied");

        let request = self.backend.set_like_state(&credential, key, desired);
        let manager = self.clone();
        let task_key = key.clone();
        let task = tokio::spawn(async move {
            let outcome = match timeout(manager.request_timeout, request).await {
                Ok(outcome) => outcome,
                Err(_) => Err(FeedError::Timeout(manager.request_timeout)),
            };
            manager.reconcile(&task_key, seq, outcome)
        });

        Ok(ToggleHandle {
            key: key.clone(),
            seq,
            desired,
            task,
        })
    }

    fn reconcile(&self, key: &EntityKey, seq: u64, outcome: Result<(), FeedError>) -> Resolution {
        let mut records = self.lock_records();
        let Some(record) = records.get_mut(key) else {
            return Resolution::Superseded;
        };
        if seq != record.pending_request_seq {
            debug!(
                key = %key,
                seq,
                latest = record.pending_request_seq,
                ok = outcome.is_ok(),
                "Discarding stale response"
            );
            return Resolution::Superseded;
        }

        record.settled_seq = seq;
        match outcome {
            Ok(()) => {
                record.server_confirmed_state = Some(record.optimistic_state);
                record.confirmed_delta = record.counter_delta;
                trace!(key = %key, seq, "Toggle confirmed");
                self.publish(key, record);
                Resolution::Confirmed
            }
            Err(e) => {
                warn!(key = %key, seq, error = %e, "Toggle failed, rolling back");
                record.optimistic_state = record.rollback_state();
                record.counter_delta = record.confirmed_delta;
                self.publish(key, record);
                drop(records);

                let notice = if e.class() == ErrorClass::Gate {
                    Notice::sign_in_required("Your session has expired. Please log in again.")
                } else {
                    Notice::error("Action failed. Please try again.")
                };
                self.notify(notice);
                Resolution::RolledBack
            }
        }
    }
}
