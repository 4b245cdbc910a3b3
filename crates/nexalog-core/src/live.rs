use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::RwLock;

use crate::domain::{Contact, ConnectionStatus, Group, Message};

/// Read-only projections of the bot that the panel displays.
#[derive(Clone, Debug, Default)]
pub struct LiveState {
    pub status: ConnectionStatus,
    pub qr_code: Option<String>,
    pub contacts: Vec<Contact>,
    pub groups: Vec<Group>,
    pub messages: Vec<Message>,
    /// A user-initiated request (save, start, stop, logout) is in flight.
    pub loading: bool,
}

/// Shared holder for [`LiveState`]. Writers are the poll loop and the panel's
/// user actions; no lock is held across a network call.
#[derive(Debug, Default)]
pub struct LiveView {
    state: RwLock<LiveState>,
    loading: AtomicBool,
}

impl LiveView {
    pub async fn snapshot(&self) -> LiveState {
        let mut st = self.state.read().await.clone();
        st.loading = self.is_loading();
        st
    }

    pub async fn status(&self) -> ConnectionStatus {
        self.state.read().await.status
    }

    /// Store the latest status; returns the previous one.
    pub async fn set_status(
        &self,
        status: ConnectionStatus,
        qr_code: Option<String>,
    ) -> ConnectionStatus {
        let mut st = self.state.write().await;
        let prev = st.status;
        st.status = status;
        st.qr_code = qr_code;
        prev
    }

    pub async fn set_contacts(&self, contacts: Vec<Contact>) {
        self.state.write().await.contacts = contacts;
    }

    pub async fn set_groups(&self, groups: Vec<Group>) {
        self.state.write().await.groups = groups;
    }

    pub async fn set_messages(&self, messages: Vec<Message>) {
        self.state.write().await.messages = messages;
    }

    pub async fn messages(&self) -> Vec<Message> {
        self.state.read().await.messages.clone()
    }

    /// Set the loading flag; `None` if it was already set. The flag is
    /// cleared when the guard drops.
    pub fn begin_loading(&self) -> Option<LoadingGuard<'_>> {
        self.loading
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| LoadingGuard {
                flag: &self.loading,
            })
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }
}

/// Holds the loading flag of a [`LiveView`].
#[derive(Debug)]
pub struct LoadingGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
