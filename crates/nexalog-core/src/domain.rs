use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const MS_PER_HOUR: u64 = 3_600_000;
pub const DEFAULT_COOLDOWN_MS: u64 = MS_PER_HOUR;
pub const DEFAULT_URGENCY_THRESHOLD: f64 = 0.5;

/// The bot's routing / auto-response / AI configuration.
///
/// Wire name: `config` (camelCase JSON). Deserialization goes through
/// [`RawBotConfig`] so every absent or `null` field falls back to its default
/// and the result is already normalized.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawBotConfig")]
pub struct BotConfig {
    pub priority_contacts: Vec<String>,
    pub priority_groups: Vec<String>,
    pub auto_response_enabled: bool,
    pub auto_response_message: String,
    /// Milliseconds.
    pub auto_response_cooldown: u64,
    pub notification_sound: bool,
    pub notification_emails: Vec<String>,
    pub ai_mode_enabled: bool,
    pub ai_custom_prompt: String,
    pub ai_urgency_threshold: f64,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            priority_contacts: Vec::new(),
            priority_groups: Vec::new(),
            auto_response_enabled: true,
            auto_response_message: String::new(),
            auto_response_cooldown: DEFAULT_COOLDOWN_MS,
            notification_sound: true,
            notification_emails: Vec::new(),
            ai_mode_enabled: true,
            ai_custom_prompt: String::new(),
            ai_urgency_threshold: DEFAULT_URGENCY_THRESHOLD,
        }
    }
}

impl BotConfig {
    /// Enforce field constraints in place: priority sets lose duplicates
    /// (first occurrence wins) and the threshold is clamped to `[0, 1]`.
    pub fn normalize(&mut self) {
        dedup_keep_first(&mut self.priority_contacts);
        dedup_keep_first(&mut self.priority_groups);
        self.ai_urgency_threshold = clamp_threshold(self.ai_urgency_threshold);
    }

    pub fn normalized(mut self) -> Self {
        self.normalize();
        self
    }

    pub fn is_priority_contact(&self, id: &str) -> bool {
        self.priority_contacts.iter().any(|c| c == id)
    }

    pub fn is_priority_group(&self, id: &str) -> bool {
        self.priority_groups.iter().any(|g| g == id)
    }

    /// Add `id` if absent, remove it if present.
    pub fn toggle_priority_contact(&mut self, id: &str) {
        toggle_member(&mut self.priority_contacts, id);
    }

    pub fn toggle_priority_group(&mut self, id: &str) {
        toggle_member(&mut self.priority_groups, id);
    }
}

fn toggle_member(set: &mut Vec<String>, id: &str) {
    if set.iter().any(|v| v == id) {
        set.retain(|v| v != id);
    } else {
        set.push(id.to_string());
    }
}

fn dedup_keep_first(items: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    items.retain(|v| seen.insert(v.clone()));
}

/// Loosely-typed mirror of [`BotConfig`] as it may appear on the wire.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawBotConfig {
    priority_contacts: Option<Vec<String>>,
    priority_groups: Option<Vec<String>>,
    auto_response_enabled: Option<bool>,
    auto_response_message: Option<String>,
    auto_response_cooldown: Option<Value>,
    notification_sound: Option<bool>,
    notification_emails: Option<Vec<String>>,
    ai_mode_enabled: Option<bool>,
    ai_custom_prompt: Option<String>,
    ai_urgency_threshold: Option<Value>,
}

impl From<RawBotConfig> for BotConfig {
    fn from(raw: RawBotConfig) -> Self {
        let d = BotConfig::default();
        BotConfig {
            priority_contacts: raw.priority_contacts.unwrap_or(d.priority_contacts),
            priority_groups: raw.priority_groups.unwrap_or(d.priority_groups),
            auto_response_enabled: raw.auto_response_enabled.unwrap_or(d.auto_response_enabled),
            auto_response_message: raw.auto_response_message.unwrap_or(d.auto_response_message),
            auto_response_cooldown: raw
                .auto_response_cooldown
                .as_ref()
                .and_then(lenient_f64)
                .map(cooldown_ms_from_f64)
                .unwrap_or(d.auto_response_cooldown),
            notification_sound: raw.notification_sound.unwrap_or(d.notification_sound),
            notification_emails: raw.notification_emails.unwrap_or(d.notification_emails),
            ai_mode_enabled: raw.ai_mode_enabled.unwrap_or(d.ai_mode_enabled),
            ai_custom_prompt: raw.ai_custom_prompt.unwrap_or(d.ai_custom_prompt),
            ai_urgency_threshold: raw
                .ai_urgency_threshold
                .as_ref()
                .and_then(lenient_f64)
                .unwrap_or(d.ai_urgency_threshold),
        }
        .normalized()
    }
}

/// Numbers may arrive as JSON numbers or numeric strings.
fn lenient_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn cooldown_ms_from_f64(ms: f64) -> u64 {
    if !ms.is_finite() || ms <= 0.0 {
        return 0;
    }
    ms.round() as u64
}

/// Clamp to `[0, 1]`; NaN becomes `0`.
pub fn clamp_threshold(v: f64) -> f64 {
    if v.is_nan() {
        return 0.0;
    }
    v.clamp(0.0, 1.0)
}

/// Parse the threshold form field. Non-numeric input yields `0.0`.
pub fn parse_threshold_input(input: &str) -> f64 {
    clamp_threshold(input.trim().parse::<f64>().unwrap_or(0.0))
}

/// Hours (as typed by the operator) to stored milliseconds.
pub fn cooldown_ms_from_hours(hours: f64) -> u64 {
    if !hours.is_finite() || hours <= 0.0 {
        return 0;
    }
    cooldown_ms_from_f64(hours * MS_PER_HOUR as f64)
}

/// Parse the cooldown form field (hours). Non-numeric input yields `0`.
pub fn parse_cooldown_hours_input(input: &str) -> u64 {
    input
        .trim()
        .parse::<f64>()
        .map(cooldown_ms_from_hours)
        .unwrap_or(0)
}

pub fn cooldown_hours(ms: u64) -> f64 {
    ms as f64 / MS_PER_HOUR as f64
}

/// Render a stored cooldown for the hours field. Zero renders empty so the
/// field shows its placeholder.
pub fn format_cooldown_hours(ms: u64) -> String {
    if ms == 0 {
        return String::new();
    }
    format!("{}", cooldown_hours(ms))
}

/// Bot connection state reported by `GET /status`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    QrReady,
    Connected,
    AuthFailed,
    #[serde(other)]
    Unknown,
}

impl ConnectionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::QrReady => "qr-ready",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::AuthFailed => "auth-failed",
            ConnectionStatus::Unknown => "unknown",
        }
    }

    /// Human label: `qr-ready` → `qr ready`.
    pub fn label(self) -> String {
        self.as_str().replace('-', " ")
    }

    pub fn is_connected(self) -> bool {
        self == ConnectionStatus::Connected
    }
}

/// Response of `GET /status`.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatusReport {
    pub status: ConnectionStatus,
    pub qr_code: Option<String>,
    pub config: Option<BotConfig>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Contact {
    pub id: String,
    pub name: Option<String>,
}

impl Contact {
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.id)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Group {
    pub id: String,
    pub name: String,
}

/// One entry of the bot's message log. Immutable once received.
///
/// `from` is the sender id; for group messages it is the group id and
/// `group_name` carries the label.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Message {
    pub from: String,
    pub group_name: Option<String>,
    pub is_group: bool,
    pub body: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
    pub is_priority: bool,
    pub auto_response_sent: bool,
    pub ai_relevance: Option<f64>,
}

impl Message {
    /// The chat identifier used for priority membership.
    pub fn chat_id(&self) -> &str {
        &self.from
    }

    pub fn display_name(&self) -> &str {
        if self.is_group {
            if let Some(name) = self.group_name.as_deref() {
                return name;
            }
        }
        &self.from
    }
}

/// Accepts epoch milliseconds or an RFC 3339 string; anything else is `None`.
fn deserialize_timestamp<'de, D>(de: D) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<Value>::deserialize(de)?;
    Ok(v.as_ref().and_then(parse_timestamp))
}

pub fn parse_timestamp(v: &Value) -> Option<DateTime<Utc>> {
    match v {
        Value::Number(n) => {
            let ms = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?;
            Utc.timestamp_millis_opt(ms).single()
        }
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .map(|dt| dt.with_timezone(&Utc))
            .ok(),
        _ => None,
    }
}

/// Whom to send a manual reply to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplyTarget {
    pub id: String,
    pub name: String,
    pub is_group: bool,
}

impl From<&Contact> for ReplyTarget {
    fn from(c: &Contact) -> Self {
        Self {
            id: c.id.clone(),
            name: c.display_name().to_string(),
            is_group: false,
        }
    }
}

impl From<&Group> for ReplyTarget {
    fn from(g: &Group) -> Self {
        Self {
            id: g.id.clone(),
            name: g.name.clone(),
            is_group: true,
        }
    }
}

/// Body of `POST /api/send-message`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub contact_id: String,
    pub message: String,
    pub is_group: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SendMessageResponse {
    pub success: bool,
    pub error: Option<String>,
}
