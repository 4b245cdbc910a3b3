//! Ephemeral operator notifications ("toasts").
//!
//! At most one toast is visible; a new one replaces the previous. Toasts
//! expire after a fixed TTL and never block anything.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToastKind {
    Success,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Toast {
    pub message: String,
    pub kind: ToastKind,
    pub expires_at: Instant,
}

pub struct Notifier {
    ttl: Duration,
    tx: watch::Sender<Option<Toast>>,
}

impl Notifier {
    pub fn new(ttl: Duration) -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { ttl, tx }
    }

    pub fn show(&self, kind: ToastKind, message: impl Into<String>) {
        self.show_at(kind, message, Instant::now());
    }

    pub fn show_at(&self, kind: ToastKind, message: impl Into<String>, now: Instant) {
        let message = message.into();
        match kind {
            ToastKind::Error => warn!(toast = %message, "operator notified of failure"),
            ToastKind::Success => info!(toast = %message, "operator notified"),
        }
        self.tx.send_replace(Some(Toast {
            message,
            kind,
            expires_at: now + self.ttl,
        }));
    }

    pub fn success(&self, message: impl Into<String>) {
        self.show(ToastKind::Success, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.show(ToastKind::Error, message);
    }

    pub fn current(&self) -> Option<Toast> {
        self.current_at(Instant::now())
    }

    pub fn current_at(&self, now: Instant) -> Option<Toast> {
        self.tx.borrow().clone().filter(|t| t.expires_at > now)
    }

    /// Drop the visible toast once it has expired. Returns whether one was
    /// dismissed.
    pub fn dismiss_expired_at(&self, now: Instant) -> bool {
        self.tx.send_if_modified(|slot| match slot {
            Some(t) if t.expires_at <= now => {
                *slot = None;
                true
            }
            _ => false,
        })
    }

    /// Observe toast changes (including dismissals).
    pub fn subscribe(&self) -> watch::Receiver<Option<Toast>> {
        self.tx.subscribe()
    }
}
