use async_trait::async_trait;

use crate::{
    domain::{
        BotConfig, Contact, Group, Message, SendMessageRequest, SendMessageResponse, StatusReport,
    },
    Result,
};

/// Bot lifecycle endpoints (`POST`, no body).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BotAction {
    Start,
    Stop,
    Logout,
}

impl BotAction {
    pub fn path(self) -> &'static str {
        match self {
            BotAction::Start => "/start",
            BotAction::Stop => "/stop",
            BotAction::Logout => "/logout",
        }
    }
}

/// Hexagonal port for the bot's HTTP API.
///
/// Implementations are stateless transports: no caching, no retries, no
/// timeouts beyond what the underlying client does. Network and HTTP failures
/// map to [`crate::Error::Transport`]; robustness lives in the poll loop and
/// the mutation pipeline.
#[async_trait]
pub trait RemoteSyncClient: Send + Sync {
    /// `GET /status`
    async fn fetch_status(&self) -> Result<StatusReport>;

    /// `POST /config` with the complete object; partial updates are not a
    /// thing on the wire.
    async fn persist_config(&self, config: &BotConfig) -> Result<()>;

    /// `GET /contacts`
    async fn fetch_contacts(&self) -> Result<Vec<Contact>>;

    /// `GET /groups`
    async fn fetch_groups(&self) -> Result<Vec<Group>>;

    /// `GET /messages`
    async fn fetch_messages(&self) -> Result<Vec<Message>>;

    /// `DELETE /messages`
    async fn clear_messages(&self) -> Result<()>;

    async fn bot_action(&self, action: BotAction) -> Result<()>;

    /// `POST /api/send-message`. A `success: false` answer is returned as
    /// data, not as an error.
    async fn send_message(&self, req: &SendMessageRequest) -> Result<SendMessageResponse>;
}
