//! Derived, display-ready projections of roster + configuration.

use crate::domain::{BotConfig, Contact, Group, Message};

/// Case-insensitive substring match on name or id. An empty query matches
/// everything.
pub fn search_contacts<'a>(contacts: &'a [Contact], query: &str) -> Vec<&'a Contact> {
    let q = query.trim().to_lowercase();
    contacts
        .iter()
        .filter(|c| {
            q.is_empty()
                || c.id.to_lowercase().contains(&q)
                || c.name
                    .as_deref()
                    .is_some_and(|n| n.to_lowercase().contains(&q))
        })
        .collect()
}

pub fn search_groups<'a>(groups: &'a [Group], query: &str) -> Vec<&'a Group> {
    let q = query.trim().to_lowercase();
    groups
        .iter()
        .filter(|g| {
            q.is_empty() || g.id.to_lowercase().contains(&q) || g.name.to_lowercase().contains(&q)
        })
        .collect()
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DashboardSummary {
    /// Counted from the configuration, not the roster.
    pub priority_contact_count: usize,
    pub priority_group_count: usize,
    pub message_count: usize,
    /// Priority contacts that are known to the roster.
    pub priority_contacts: Vec<Contact>,
    pub priority_groups: Vec<Group>,
    pub recent: Vec<Message>,
}

impl DashboardSummary {
    pub fn build(
        config: &BotConfig,
        contacts: &[Contact],
        groups: &[Group],
        messages: &[Message],
        recent_limit: usize,
    ) -> Self {
        Self {
            priority_contact_count: config.priority_contacts.len(),
            priority_group_count: config.priority_groups.len(),
            message_count: messages.len(),
            priority_contacts: contacts
                .iter()
                .filter(|c| config.is_priority_contact(&c.id))
                .cloned()
                .collect(),
            priority_groups: groups
                .iter()
                .filter(|g| config.is_priority_group(&g.id))
                .cloned()
                .collect(),
            recent: messages.iter().take(recent_limit).cloned().collect(),
        }
    }
}
