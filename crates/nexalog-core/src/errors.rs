/// Core error type for the control panel.
///
/// Adapter crates map their specific errors into this type so the panel can
/// handle failures consistently (transient toast vs local validation vs server
/// refusal).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    /// Network or HTTP failure talking to the bot API. Always transient.
    #[error("transport error: {0}")]
    Transport(String),

    /// Rejected locally before any request was made.
    #[error("invalid input: {0}")]
    Validation(String),

    /// The bot API answered `success: false`.
    #[error("rejected by server: {0}")]
    ServerRejection(String),
}

impl Error {
    /// Whether the next poll tick / retry may succeed where this one failed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
