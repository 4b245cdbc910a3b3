//! Optimistic configuration edits.
//!
//! A mutation is applied to the [`ConfigStore`] immediately (so the operator
//! sees it) and persisted in the background. Failed persists are retried with
//! exponential backoff; the local state is never rolled back.

use std::{sync::Arc, time::Duration};

use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::{
    domain::BotConfig,
    notify::Notifier,
    remote::RemoteSyncClient,
    store::{ConfigSnapshot, ConfigStore},
    Result,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(8000),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based): base, 2×base, 4×base, …
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32
            .checked_shl(retry.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// What an optimistic edit was, for operator feedback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MutationKind {
    Priority,
    EmailAdded,
    EmailRemoved,
}

impl MutationKind {
    fn success_text(self) -> &'static str {
        match self {
            MutationKind::Priority => "Priority settings saved",
            MutationKind::EmailAdded => "Email added successfully",
            MutationKind::EmailRemoved => "Email removed successfully",
        }
    }

    fn failure_text(self) -> &'static str {
        match self {
            MutationKind::Priority => "Error saving priority settings",
            MutationKind::EmailAdded | MutationKind::EmailRemoved => "Error saving configuration",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PersistOutcome {
    Persisted {
        version: u64,
        attempts: u32,
        /// This persist cleared the dirty marker.
        cleared_dirty: bool,
    },
    /// Gave up retrying because a newer save already made the store clean.
    Superseded { attempts: u32 },
    Failed { attempts: u32, error: String },
}

/// A locally applied edit whose background persist may still be running.
pub struct PendingPersist {
    pub snapshot: ConfigSnapshot,
    handle: JoinHandle<PersistOutcome>,
}

impl PendingPersist {
    /// Wait for the background persist to finish.
    pub async fn outcome(self) -> PersistOutcome {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(e) => PersistOutcome::Failed {
                attempts: 0,
                error: format!("persist task aborted: {e}"),
            },
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

#[derive(Clone)]
pub struct MutationPipeline {
    store: Arc<ConfigStore>,
    remote: Arc<dyn RemoteSyncClient>,
    notifier: Arc<Notifier>,
    retry: RetryPolicy,
}

impl MutationPipeline {
    pub fn new(
        store: Arc<ConfigStore>,
        remote: Arc<dyn RemoteSyncClient>,
        notifier: Arc<Notifier>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            remote,
            notifier,
            retry,
        }
    }

    /// Apply `patch` locally (dirty, visible immediately) and persist the
    /// result in the background.
    pub async fn apply_and_persist<F>(&self, kind: MutationKind, patch: F) -> PendingPersist
    where
        F: FnOnce(&mut BotConfig),
    {
        let snapshot = self.store.mutate(patch).await;
        debug!(version = snapshot.version, ?kind, "applied optimistic edit");

        let pipeline = self.clone();
        let first = snapshot.clone();
        let handle = tokio::spawn(async move { pipeline.persist_with_retry(kind, first).await });

        PendingPersist { snapshot, handle }
    }

    /// Persist `snapshot`; if a newer version was acknowledged first (ours
    /// may have landed on top of it server-side), re-send the current
    /// configuration once. Returns the snapshot that went out last.
    pub(crate) async fn send_in_order(&self, snapshot: ConfigSnapshot) -> Result<ConfigSnapshot> {
        let mut sending = snapshot;
        let mut resent = false;
        loop {
            self.remote.persist_config(&sending.config).await?;
            if self.store.record_persisted(sending.version).await || resent {
                return Ok(sending);
            }
            warn!(
                version = sending.version,
                "outdated persist landed late, re-sending current configuration"
            );
            resent = true;
            sending = self.store.snapshot().await;
        }
    }

    async fn persist_with_retry(&self, kind: MutationKind, snapshot: ConfigSnapshot) -> PersistOutcome {
        let mut sending = snapshot;
        let mut attempt = 1u32;
        loop {
            match self.send_in_order(sending.clone()).await {
                Ok(sent) => {
                    let cleared_dirty = self.store.mark_clean_if(sent.version).await;
                    info!(
                        version = sent.version,
                        attempt, cleared_dirty, "persisted configuration"
                    );
                    self.notifier.success(kind.success_text());
                    return PersistOutcome::Persisted {
                        version: sent.version,
                        attempts: attempt,
                        cleared_dirty,
                    };
                }
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        version = sending.version,
                        attempt,
                        "persist failed, retrying in {delay:?}: {e}"
                    );
                    sleep(delay).await;
                    attempt += 1;

                    // Retry with whatever is current so an older snapshot can
                    // never overwrite a newer edit server-side. Stop only once
                    // the server holds this edit or something newer.
                    let current = self.store.snapshot().await;
                    if !current.dirty && self.store.is_acknowledged(sending.version).await {
                        debug!(version = current.version, "persist superseded by a newer save");
                        return PersistOutcome::Superseded { attempts: attempt - 1 };
                    }
                    sending = current;
                }
                Err(e) => {
                    warn!(version = sending.version, attempt, "persist failed: {e}");
                    self.notifier.error(kind.failure_text());
                    return PersistOutcome::Failed {
                        attempts: attempt,
                        error: e.to_string(),
                    };
                }
            }
        }
    }
}
