//! In-memory bot API used by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::{
    domain::{
        BotConfig, Contact, Group, Message, SendMessageRequest, SendMessageResponse, StatusReport,
    },
    remote::{BotAction, RemoteSyncClient},
    Error, Result,
};

#[derive(Default)]
pub struct FakeRemote {
    pub status: Mutex<StatusReport>,
    pub contacts: Mutex<Vec<Contact>>,
    pub groups: Mutex<Vec<Group>>,
    pub messages: Mutex<Vec<Message>>,
    pub send_response: Mutex<SendMessageResponse>,

    pub persisted: Mutex<Vec<BotConfig>>,
    pub actions: Mutex<Vec<BotAction>>,
    pub sent: Mutex<Vec<SendMessageRequest>>,
    pub status_calls: AtomicUsize,
    pub message_calls: AtomicUsize,
    pub persist_calls: AtomicUsize,

    /// Number of upcoming persists that fail with a transport error.
    pub fail_persists: AtomicUsize,
    pub fail_status: Mutex<bool>,
    pub fail_messages: Mutex<bool>,
    pub fail_contacts: Mutex<bool>,
    /// Each queued gate holds one persist call until notified.
    persist_gates: Mutex<VecDeque<Arc<Notify>>>,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_status(&self, report: StatusReport) {
        *self.status.lock().unwrap() = report;
    }

    /// The next persist call blocks until the returned gate is notified.
    pub fn hold_next_persist(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.persist_gates.lock().unwrap().push_back(gate.clone());
        gate
    }

    pub fn persisted(&self) -> Vec<BotConfig> {
        self.persisted.lock().unwrap().clone()
    }

    fn transport(what: &str) -> Error {
        Error::Transport(format!("{what}: connection refused"))
    }
}

#[async_trait]
impl RemoteSyncClient for FakeRemote {
    async fn fetch_status(&self) -> Result<StatusReport> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail_status.lock().unwrap() {
            return Err(Self::transport("GET /status"));
        }
        Ok(self.status.lock().unwrap().clone())
    }

    async fn persist_config(&self, config: &BotConfig) -> Result<()> {
        self.persist_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.persist_gates.lock().unwrap().pop_front();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let failing = self
            .fail_persists
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Self::transport("POST /config"));
        }
        self.persisted.lock().unwrap().push(config.clone());
        Ok(())
    }

    async fn fetch_contacts(&self) -> Result<Vec<Contact>> {
        if *self.fail_contacts.lock().unwrap() {
            return Err(Self::transport("GET /contacts"));
        }
        Ok(self.contacts.lock().unwrap().clone())
    }

    async fn fetch_groups(&self) -> Result<Vec<Group>> {
        Ok(self.groups.lock().unwrap().clone())
    }

    async fn fetch_messages(&self) -> Result<Vec<Message>> {
        self.message_calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail_messages.lock().unwrap() {
            return Err(Self::transport("GET /messages"));
        }
        Ok(self.messages.lock().unwrap().clone())
    }

    async fn clear_messages(&self) -> Result<()> {
        self.messages.lock().unwrap().clear();
        Ok(())
    }

    async fn bot_action(&self, action: BotAction) -> Result<()> {
        self.actions.lock().unwrap().push(action);
        Ok(())
    }

    async fn send_message(&self, req: &SendMessageRequest) -> Result<SendMessageResponse> {
        self.sent.lock().unwrap().push(req.clone());
        Ok(self.send_response.lock().unwrap().clone())
    }
}
