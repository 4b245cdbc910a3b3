use std::{env, fs, path::Path, time::Duration};

use crate::{errors::Error, optimistic::RetryPolicy, Result};

/// Typed runtime configuration for the control panel.
///
/// Not to be confused with [`crate::domain::BotConfig`], which is the bot's
/// own routing configuration synchronized with the server.
#[derive(Clone, Debug)]
pub struct Config {
    /// Base URL of the bot API, without a trailing slash.
    pub api_base_url: String,

    // Polling
    pub status_poll_interval: Duration,
    pub message_poll_interval: Duration,

    // Feedback
    pub toast_ttl: Duration,
    pub recent_activity_limit: usize,

    // Optimistic persistence
    pub persist_retry: RetryPolicy,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let api_base_url = env_str("NEXALOG_API_URL").unwrap_or_default();
        let api_base_url = normalize_base_url(&api_base_url)?;

        let mut cfg = Self::with_base_url(api_base_url);

        if let Some(ms) = env_u64("STATUS_POLL_MS") {
            cfg.status_poll_interval = Duration::from_millis(ms.max(100));
        }
        if let Some(ms) = env_u64("MESSAGE_POLL_MS") {
            cfg.message_poll_interval = Duration::from_millis(ms.max(100));
        }
        if let Some(ms) = env_u64("TOAST_TTL_MS") {
            cfg.toast_ttl = Duration::from_millis(ms);
        }
        if let Some(n) = env_usize("RECENT_ACTIVITY_LIMIT") {
            cfg.recent_activity_limit = n;
        }

        // Retries
        if let Some(n) = env_u32("PERSIST_RETRY_ATTEMPTS") {
            cfg.persist_retry.max_attempts = n.max(1);
        }
        if let Some(ms) = env_u64("PERSIST_RETRY_BASE_MS") {
            cfg.persist_retry.base_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = env_u64("PERSIST_RETRY_MAX_MS") {
            cfg.persist_retry.max_delay = Duration::from_millis(ms);
        }

        Ok(cfg)
    }

    /// Defaults for everything but the endpoint.
    pub fn with_base_url(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            status_poll_interval: Duration::from_millis(2000),
            message_poll_interval: Duration::from_millis(5000),
            toast_ttl: Duration::from_millis(3000),
            recent_activity_limit: 10,
            persist_retry: RetryPolicy::default(),
        }
    }
}

fn normalize_base_url(raw: &str) -> Result<String> {
    let url = raw.trim().trim_end_matches('/');
    if url.is_empty() {
        return Err(Error::Config(
            "NEXALOG_API_URL environment variable is required".to_string(),
        ));
    }
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(Error::Config(format!(
            "NEXALOG_API_URL must be an http(s) URL, got {url}"
        )));
    }
    Ok(url.to_string())
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        out.push((key.to_string(), val));
    }
    out
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    env_str(key).and_then(|s| s.trim().parse::<u32>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_trimmed_and_checked() {
        assert_eq!(
            normalize_base_url(" http://localhost:3001/ ").unwrap(),
            "http://localhost:3001"
        );
        assert!(matches!(normalize_base_url(""), Err(Error::Config(_))));
        assert!(matches!(
            normalize_base_url("localhost:3001"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn dotenv_lines_strip_quotes_and_comments() {
        let parsed = parse_dotenv(
            "# comment\nNEXALOG_API_URL=\"http://bot.local\"\n\nSTATUS_POLL_MS = 1500\nbroken line\n",
        );
        assert_eq!(
            parsed,
            vec![
                ("NEXALOG_API_URL".to_string(), "http://bot.local".to_string()),
                ("STATUS_POLL_MS".to_string(), "1500".to_string()),
            ]
        );
    }

    #[test]
    fn defaults_match_reference_periods() {
        let cfg = Config::with_base_url("http://bot.local");
        assert_eq!(cfg.status_poll_interval, Duration::from_millis(2000));
        assert_eq!(cfg.message_poll_interval, Duration::from_millis(5000));
        assert_eq!(cfg.toast_ttl, Duration::from_millis(3000));
        assert_eq!(cfg.recent_activity_limit, 10);
    }
}
