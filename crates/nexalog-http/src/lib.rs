//! HTTP adapter for the bot API.
//!
//! Implements the `nexalog-core` [`RemoteSyncClient`] port over plain JSON
//! endpoints rooted at one base URL.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use nexalog_core::{
    domain::{
        BotConfig, Contact, Group, Message, SendMessageRequest, SendMessageResponse, StatusReport,
    },
    errors::Error,
    remote::{BotAction, RemoteSyncClient},
    Result,
};

pub const STATUS_PATH: &str = "/status";
pub const CONTACTS_PATH: &str = "/contacts";
pub const GROUPS_PATH: &str = "/groups";
pub const MESSAGES_PATH: &str = "/messages";
pub const CONFIG_PATH: &str = "/config";
pub const SEND_MESSAGE_PATH: &str = "/api/send-message";

const ERROR_BODY_PREVIEW: usize = 200;

#[derive(Clone, Debug)]
pub struct HttpRemote {
    base_url: String,
    http: reqwest::Client,
}

impl HttpRemote {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Config(format!("http client build failed: {e}")))?;
        Ok(Self::with_client(base_url, http))
    }

    pub fn with_client(base_url: impl Into<String>, http: reqwest::Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, http }
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn map_err(what: &str, e: reqwest::Error) -> Error {
        Error::Transport(format!("{what}: {e}"))
    }

    async fn check(what: &str, resp: reqwest::Response) -> Result<reqwest::Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        Err(Error::Transport(format!(
            "{what} failed: {status} {}",
            preview(&body)
        )))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let what = format!("GET {path}");
        debug!(%what, "request");
        let resp = self
            .http
            .get(self.endpoint(path))
            .send()
            .await
            .map_err(|e| Self::map_err(&what, e))?;
        let resp = Self::check(&what, resp).await?;
        let bytes = resp.bytes().await.map_err(|e| Self::map_err(&what, e))?;
        decode(&what, &bytes)
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response> {
        let what = format!("POST {path}");
        debug!(%what, "request");
        self.http
            .post(self.endpoint(path))
            .json(body)
            .send()
            .await
            .map_err(|e| Self::map_err(&what, e))
    }
}

/// Body decode failures count as transport errors: the server answered, but
/// not with what the panel can use, and the next tick may do better.
fn decode<T: DeserializeOwned>(what: &str, bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| {
        Error::Transport(format!(
            "{what}: unexpected response body ({e}): {}",
            preview(&String::from_utf8_lossy(bytes))
        ))
    })
}

fn preview(body: &str) -> String {
    body.chars().take(ERROR_BODY_PREVIEW).collect()
}

#[async_trait]
impl RemoteSyncClient for HttpRemote {
    async fn fetch_status(&self) -> Result<StatusReport> {
        self.get_json(STATUS_PATH).await
    }

    async fn persist_config(&self, config: &BotConfig) -> Result<()> {
        let what = format!("POST {CONFIG_PATH}");
        let resp = self.post_json(CONFIG_PATH, config).await?;
        Self::check(&what, resp).await?;
        Ok(())
    }

    async fn fetch_contacts(&self) -> Result<Vec<Contact>> {
        self.get_json(CONTACTS_PATH).await
    }

    async fn fetch_groups(&self) -> Result<Vec<Group>> {
        self.get_json(GROUPS_PATH).await
    }

    async fn fetch_messages(&self) -> Result<Vec<Message>> {
        self.get_json(MESSAGES_PATH).await
    }

    async fn clear_messages(&self) -> Result<()> {
        let what = format!("DELETE {MESSAGES_PATH}");
        let resp = self
            .http
            .delete(self.endpoint(MESSAGES_PATH))
            .send()
            .await
            .map_err(|e| Self::map_err(&what, e))?;
        Self::check(&what, resp).await?;
        Ok(())
    }

    async fn bot_action(&self, action: BotAction) -> Result<()> {
        let what = format!("POST {}", action.path());
        let resp = self
            .http
            .post(self.endpoint(action.path()))
            .send()
            .await
            .map_err(|e| Self::map_err(&what, e))?;
        Self::check(&what, resp).await?;
        Ok(())
    }

    async fn send_message(&self, req: &SendMessageRequest) -> Result<SendMessageResponse> {
        let what = format!("POST {SEND_MESSAGE_PATH}");
        let resp = self.post_json(SEND_MESSAGE_PATH, req).await?;
        let status = resp.status();
        let bytes = resp.bytes().await.map_err(|e| Self::map_err(&what, e))?;

        // Rejections usually come with a non-2xx status *and* a JSON reason;
        // prefer the reason when there is one.
        match decode::<SendMessageResponse>(&what, &bytes) {
            Ok(mut parsed) => {
                if !status.is_success() && parsed.success {
                    parsed.success = false;
                    parsed.error.get_or_insert_with(|| status.to_string());
                }
                Ok(parsed)
            }
            Err(_) if !status.is_success() => Err(Error::Transport(format!(
                "{what} failed: {status} {}",
                preview(&String::from_utf8_lossy(&bytes))
            ))),
            Err(e) => Err(e),
        }
    }
}
