//! Periodic status + message-log refresh.
//!
//! Two loops, both cancelled through one token:
//! - status (default every 2 s): connection state, QR code, and the
//!   server-authoritative configuration, merged through [`ConfigStore`]
//! - message log (default every 5 s): only while the bot is connected
//!
//! Failures are logged and skipped; the next tick is the retry.

use std::{sync::Arc, time::Duration};

use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    domain::ConnectionStatus,
    live::LiveView,
    notify::Notifier,
    remote::RemoteSyncClient,
    store::{ConfigStore, MergeOutcome},
    Result,
};

/// Result of one status tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusTick {
    pub status: ConnectionStatus,
    pub merge: MergeOutcome,
    /// The bot just transitioned into `connected`.
    pub became_connected: bool,
}

pub struct PollLoop {
    store: Arc<ConfigStore>,
    remote: Arc<dyn RemoteSyncClient>,
    live: Arc<LiveView>,
    notifier: Arc<Notifier>,
    status_every: Duration,
    messages_every: Duration,
}

impl PollLoop {
    pub fn new(
        store: Arc<ConfigStore>,
        remote: Arc<dyn RemoteSyncClient>,
        live: Arc<LiveView>,
        notifier: Arc<Notifier>,
        status_every: Duration,
        messages_every: Duration,
    ) -> Self {
        Self {
            store,
            remote,
            live,
            notifier,
            status_every,
            messages_every,
        }
    }

    /// Fetch status once and apply the merge policy.
    pub async fn status_tick(&self) -> Result<StatusTick> {
        let ticket = self.store.begin_fetch().await;
        let report = self.remote.fetch_status().await?;

        let prev = self
            .live
            .set_status(report.status, report.qr_code.clone())
            .await;
        if prev != report.status {
            info!(from = prev.as_str(), to = report.status.as_str(), "connection status changed");
        }

        let merge = self.store.merge_remote(ticket, report.config).await;
        if merge != MergeOutcome::Applied {
            debug!(?merge, "kept local configuration");
        }

        Ok(StatusTick {
            status: report.status,
            merge,
            became_connected: report.status.is_connected() && !prev.is_connected(),
        })
    }

    /// Refresh the message log if connected. Returns whether a fetch ran.
    pub async fn messages_tick(&self) -> Result<bool> {
        if !self.live.status().await.is_connected() {
            return Ok(false);
        }
        let messages = self.remote.fetch_messages().await?;
        self.live.set_messages(messages).await;
        Ok(true)
    }

    /// Load contacts, groups and messages. Each fetch is guarded on its own so
    /// one failing endpoint does not starve the others.
    pub async fn refresh_roster(&self) {
        match self.remote.fetch_contacts().await {
            Ok(v) => self.live.set_contacts(v).await,
            Err(e) => warn!("contacts fetch failed: {e}"),
        }
        match self.remote.fetch_groups().await {
            Ok(v) => self.live.set_groups(v).await,
            Err(e) => warn!("groups fetch failed: {e}"),
        }
        match self.remote.fetch_messages().await {
            Ok(v) => self.live.set_messages(v).await,
            Err(e) => warn!("messages fetch failed: {e}"),
        }
    }

    /// Start both loops. They stop when `cancel` fires or the handle is
    /// dropped.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> PollHandle {
        let status = {
            let poll = self.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { poll.status_loop(cancel).await })
        };
        let messages = {
            let poll = self.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { poll.messages_loop(cancel).await })
        };
        info!(
            status_every = ?self.status_every,
            messages_every = ?self.messages_every,
            "polling started"
        );

        PollHandle {
            cancel,
            tasks: vec![status, messages],
        }
    }

    async fn status_loop(self: Arc<Self>, cancel: CancellationToken) {
        let mut tick = interval(self.status_every);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
              _ = cancel.cancelled() => break,
              _ = tick.tick() => {
                match self.status_tick().await {
                    Ok(t) if t.became_connected => {
                        let poll = self.clone();
                        tokio::spawn(async move { poll.refresh_roster().await });
                    }
                    Ok(_) => {}
                    Err(e) => warn!("status fetch failed: {e}"),
                }
                self.notifier.dismiss_expired_at(Instant::now());
              }
            }
        }
        debug!("status loop stopped");
    }

    async fn messages_loop(self: Arc<Self>, cancel: CancellationToken) {
        let start = Instant::now() + self.messages_every;
        let mut tick = interval_at(start, self.messages_every);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
              _ = cancel.cancelled() => break,
              _ = tick.tick() => {
                if let Err(e) = self.messages_tick().await {
                    warn!("messages fetch failed: {e}");
                }
              }
            }
        }
        debug!("message loop stopped");
    }
}

/// Owner of the running poll tasks.
pub struct PollHandle {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl PollHandle {
    /// Cancel both loops and wait for them to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
        info!("polling stopped");
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
