//! Versioned, atomically swapped holder of the bot configuration.
//!
//! The store is the only writer of the configuration. Every transition bumps
//! a generation counter; a poll response is merged only if nothing happened
//! to the store since the fetch started, so a slow response can never
//! overwrite a newer local commit or a newer poll result.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::domain::BotConfig;

/// Immutable view of the store at one point in time.
#[derive(Clone, Debug)]
pub struct ConfigSnapshot {
    pub config: Arc<BotConfig>,
    /// Content revision; bumped by every mutate/replace.
    pub version: u64,
    pub dirty: bool,
}

/// Taken before a status fetch; handed back to [`ConfigStore::merge_remote`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FetchTicket {
    generation: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The remote value (or the default, if absent) replaced local state.
    Applied,
    /// Local edits are pending; remote value ignored.
    KeptLocal,
    /// The store changed while the fetch was in flight; remote value ignored.
    Stale,
}

#[derive(Debug)]
struct StoreState {
    config: Arc<BotConfig>,
    version: u64,
    generation: u64,
    dirty: bool,
    /// Highest version acknowledged by the server.
    persisted_version: u64,
}

impl StoreState {
    fn snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot {
            config: self.config.clone(),
            version: self.version,
            dirty: self.dirty,
        }
    }
}

#[derive(Debug)]
pub struct ConfigStore {
    state: Mutex<StoreState>,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new(BotConfig::default())
    }
}

impl ConfigStore {
    pub fn new(initial: BotConfig) -> Self {
        Self {
            state: Mutex::new(StoreState {
                config: Arc::new(initial.normalized()),
                version: 0,
                generation: 0,
                dirty: false,
                persisted_version: 0,
            }),
        }
    }

    pub async fn read(&self) -> Arc<BotConfig> {
        self.state.lock().await.config.clone()
    }

    pub async fn snapshot(&self) -> ConfigSnapshot {
        self.state.lock().await.snapshot()
    }

    pub async fn is_dirty(&self) -> bool {
        self.state.lock().await.dirty
    }

    pub async fn version(&self) -> u64 {
        self.state.lock().await.version
    }

    /// Replace the whole configuration with a server-authoritative value.
    ///
    /// Refused (returns `false`) while local edits are pending.
    pub async fn replace(&self, config: BotConfig) -> bool {
        let mut st = self.state.lock().await;
        if st.dirty {
            return false;
        }
        st.config = Arc::new(config.normalized());
        st.version += 1;
        st.generation += 1;
        true
    }

    /// Apply `patch` to a copy, normalize it, swap it in and mark dirty.
    pub async fn mutate<F>(&self, patch: F) -> ConfigSnapshot
    where
        F: FnOnce(&mut BotConfig),
    {
        let mut st = self.state.lock().await;
        let mut next = (*st.config).clone();
        patch(&mut next);
        next.normalize();

        st.config = Arc::new(next);
        st.version += 1;
        st.generation += 1;
        st.dirty = true;
        st.snapshot()
    }

    /// Unconditionally clear the dirty marker (explicit save).
    pub async fn mark_clean(&self) {
        let mut st = self.state.lock().await;
        if st.dirty {
            st.dirty = false;
            st.generation += 1;
        }
    }

    /// Clear the dirty marker only if no mutation happened after `version`
    /// was produced. Returns whether the store is clean afterwards because of
    /// this call.
    pub async fn mark_clean_if(&self, version: u64) -> bool {
        let mut st = self.state.lock().await;
        if !st.dirty || st.version != version {
            return false;
        }
        st.dirty = false;
        st.generation += 1;
        true
    }

    /// Record that `version` reached the server. Returns `false` if a newer
    /// version had already been acknowledged, i.e. this write may have landed
    /// on top of it.
    pub async fn record_persisted(&self, version: u64) -> bool {
        let mut st = self.state.lock().await;
        if version < st.persisted_version {
            return false;
        }
        st.persisted_version = version;
        true
    }

    /// Whether the server has acknowledged `version` or something newer.
    pub async fn is_acknowledged(&self, version: u64) -> bool {
        self.state.lock().await.persisted_version >= version
    }

    pub async fn begin_fetch(&self) -> FetchTicket {
        FetchTicket {
            generation: self.state.lock().await.generation,
        }
    }

    /// Merge the configuration carried by a status response.
    ///
    /// An absent remote config resets to the complete default.
    pub async fn merge_remote(
        &self,
        ticket: FetchTicket,
        remote: Option<BotConfig>,
    ) -> MergeOutcome {
        let mut st = self.state.lock().await;
        if st.dirty {
            return MergeOutcome::KeptLocal;
        }
        if st.generation != ticket.generation {
            return MergeOutcome::Stale;
        }

        let next = remote.unwrap_or_default().normalized();
        if *st.config != next {
            st.config = Arc::new(next);
            st.version += 1;
        }
        st.generation += 1;
        MergeOutcome::Applied
    }
}
