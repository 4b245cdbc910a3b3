//! Message classification and message-log filtering.

use crate::domain::{BotConfig, Message};

/// Facts derived from one message under one configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Classification {
    pub is_priority: bool,
    pub auto_response_sent: bool,
    pub ai_flagged: bool,
}

/// Classify `message` against `config`.
///
/// Priority membership is checked against the group set for group messages
/// and the contact set otherwise.
pub fn classify(message: &Message, config: &BotConfig) -> Classification {
    let is_priority = if message.is_group {
        config.is_priority_group(message.chat_id())
    } else {
        config.is_priority_contact(message.chat_id())
    };

    Classification {
        is_priority,
        auto_response_sent: message.auto_response_sent,
        ai_flagged: is_ai_flagged(message, config),
    }
}

/// AI mode on, relevance present, and at or above the configured threshold.
pub fn is_ai_flagged(message: &Message, config: &BotConfig) -> bool {
    if !config.ai_mode_enabled {
        return false;
    }
    message
        .ai_relevance
        .is_some_and(|r| r >= config.ai_urgency_threshold)
}

/// Message-log view modes. The two narrowing modes are mutually exclusive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFilter {
    #[default]
    All,
    PriorityOnly,
    AiFlaggedOnly,
}

impl LogFilter {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "" | "all" => Some(LogFilter::All),
            "priority" | "priority-only" => Some(LogFilter::PriorityOnly),
            "ai" | "ai-flagged" | "flagged" => Some(LogFilter::AiFlaggedOnly),
            _ => None,
        }
    }

    fn empty_text(self) -> &'static str {
        match self {
            LogFilter::All => "No messages yet. Start the bot to begin monitoring.",
            LogFilter::PriorityOnly => "No priority messages.",
            LogFilter::AiFlaggedOnly => "No messages flagged by AI.",
        }
    }
}

#[derive(Clone, Debug)]
pub struct LogRow<'a> {
    pub message: &'a Message,
    pub ai_flagged: bool,
}

/// Filtered message log, in original order.
#[derive(Clone, Debug)]
pub struct LogView<'a> {
    pub filter: LogFilter,
    pub rows: Vec<LogRow<'a>>,
}

impl LogView<'_> {
    /// Text to show instead of rows when the filter matched nothing.
    pub fn empty_state(&self) -> Option<&'static str> {
        self.rows.is_empty().then(|| self.filter.empty_text())
    }
}

/// Apply `filter` to `messages`.
///
/// "Priority only" uses the flag stamped at ingestion, so a later config
/// change does not reclassify history. "AI-flagged only" is recomputed with
/// the current threshold.
pub fn filter_log<'a>(messages: &'a [Message], filter: LogFilter, config: &BotConfig) -> LogView<'a> {
    let rows = messages
        .iter()
        .map(|message| LogRow {
            message,
            ai_flagged: is_ai_flagged(message, config),
        })
        .filter(|row| match filter {
            LogFilter::All => true,
            LogFilter::PriorityOnly => row.message.is_priority,
            LogFilter::AiFlaggedOnly => row.ai_flagged,
        })
        .collect();

    LogView { filter, rows }
}
