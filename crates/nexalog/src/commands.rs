use std::fmt::Write as _;

use chrono::Local;

use nexalog_core::{
    classify::{filter_log, LogFilter},
    domain::{format_cooldown_hours, Message, ReplyTarget},
    errors::Error,
    optimistic::PendingPersist,
    panel::{ControlPanel, SettingsEdit},
    views::{search_contacts, search_groups},
    Result,
};

pub const HELP: &str = "\
Commands:
  status                         connection state and pending edits
  dashboard                      counts, priority chats, recent activity
  contacts [query]               list contacts (* = priority)
  groups [query]                 list groups (* = priority)
  toggle-contact <id>            add/remove a priority contact
  toggle-group <id>              add/remove a priority group
  emails                         list notification emails
  add-email <address>            add a notification email
  remove-email <address>         remove a notification email
  settings                       show the current configuration
  set <field> <value>            edit a setting (saved with `save`)
      fields: auto-response, message, cooldown, sound, ai, prompt, threshold
  save                           persist the configuration
  start | stop | logout          bot lifecycle
  log [all|priority|ai]          message log
  clear-log                      delete the message log
  send <contact|group> <id> <text>
  help | quit";

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Status,
    Dashboard,
    Contacts(String),
    Groups(String),
    ToggleContact(String),
    ToggleGroup(String),
    Emails,
    AddEmail(String),
    RemoveEmail(String),
    Settings,
    Set(SettingsEdit),
    Save,
    Start,
    Stop,
    Logout,
    Log(LogFilter),
    ClearLog,
    Send {
        is_group: bool,
        id: String,
        text: String,
    },
    Help,
    Quit,
}

fn split_word(s: &str) -> (&str, &str) {
    let s = s.trim();
    match s.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (s, ""),
    }
}

fn required<'a>(arg: &'a str, usage: &str) -> Result<&'a str> {
    if arg.is_empty() {
        return Err(Error::Validation(format!("usage: {usage}")));
    }
    Ok(arg)
}

fn parse_bool(v: &str) -> Result<bool> {
    match v.to_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        _ => Err(Error::Validation(format!("expected on/off, got `{v}`"))),
    }
}

fn parse_setting(field: &str, value: &str) -> Result<SettingsEdit> {
    let edit = match field.to_lowercase().as_str() {
        "auto-response" => SettingsEdit::AutoResponseEnabled(parse_bool(value)?),
        "message" => SettingsEdit::AutoResponseMessage(value.to_string()),
        "cooldown" => SettingsEdit::CooldownHours(value.to_string()),
        "sound" => SettingsEdit::NotificationSound(parse_bool(value)?),
        "ai" => SettingsEdit::AiModeEnabled(parse_bool(value)?),
        "prompt" => SettingsEdit::AiCustomPrompt(value.to_string()),
        "threshold" => SettingsEdit::AiUrgencyThreshold(value.to_string()),
        other => return Err(Error::Validation(format!("unknown setting `{other}`"))),
    };
    Ok(edit)
}

/// Parse one console line. `None` for a blank line.
pub fn parse_command(line: &str) -> Result<Option<Command>> {
    let (cmd, rest) = split_word(line);
    if cmd.is_empty() {
        return Ok(None);
    }

    let command = match cmd.trim_start_matches('/').to_lowercase().as_str() {
        "status" => Command::Status,
        "dashboard" => Command::Dashboard,
        "contacts" => Command::Contacts(rest.to_string()),
        "groups" => Command::Groups(rest.to_string()),
        "toggle-contact" => {
            Command::ToggleContact(required(rest, "toggle-contact <id>")?.to_string())
        }
        "toggle-group" => Command::ToggleGroup(required(rest, "toggle-group <id>")?.to_string()),
        "emails" => Command::Emails,
        // Validation of the address itself happens in the panel.
        "add-email" => Command::AddEmail(rest.to_string()),
        "remove-email" => {
            Command::RemoveEmail(required(rest, "remove-email <address>")?.to_string())
        }
        "settings" => Command::Settings,
        "set" => {
            let (field, value) = split_word(rest);
            required(field, "set <field> <value>")?;
            Command::Set(parse_setting(field, value)?)
        }
        "save" => Command::Save,
        "start" => Command::Start,
        "stop" => Command::Stop,
        "logout" => Command::Logout,
        "log" => Command::Log(
            LogFilter::parse(rest)
                .ok_or_else(|| Error::Validation(format!("unknown log filter `{rest}`")))?,
        ),
        "clear-log" => Command::ClearLog,
        "send" => {
            let usage = "send <contact|group> <id> <text>";
            let (kind, rest) = split_word(rest);
            let is_group = match kind.to_lowercase().as_str() {
                "contact" => false,
                "group" => true,
                _ => return Err(Error::Validation(format!("usage: {usage}"))),
            };
            let (id, text) = split_word(rest);
            Command::Send {
                is_group,
                id: required(id, usage)?.to_string(),
                text: text.to_string(),
            }
        }
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(Error::Validation(format!("unknown command `{other}`, try `help`"))),
    };
    Ok(Some(command))
}

fn format_time(m: &Message) -> String {
    match m.timestamp {
        Some(ts) => ts.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string(),
        None => "--".to_string(),
    }
}

fn format_message(m: &Message, ai_flagged: bool) -> String {
    let mut tags = String::new();
    if m.is_priority {
        tags.push_str(" [priority]");
    }
    if ai_flagged {
        tags.push_str(" [ai]");
    }
    if m.auto_response_sent {
        tags.push_str(" [auto-replied]");
    }
    format!("{} {}{}: {}", format_time(m), m.display_name(), tags, m.body)
}

fn pending_text(p: &PendingPersist, what: &str) -> String {
    format!("{what} (v{}, saving in background)", p.snapshot.version)
}

/// Run one command and render its result for the console.
pub async fn execute(panel: &ControlPanel, command: Command) -> Result<String> {
    let out = match command {
        Command::Help => HELP.to_string(),
        Command::Quit => String::new(),
        Command::Status => {
            let live = panel.live().await;
            let snap = panel.store().snapshot().await;
            let mut out = format!("Bot: {}", live.status.label());
            if let Some(qr) = live.qr_code.filter(|_| !live.status.is_connected()) {
                let _ = write!(out, "\nQR code: {qr}");
            }
            if snap.dirty {
                out.push_str("\nUnsaved changes (run `save`)");
            }
            out
        }
        Command::Dashboard => {
            let d = panel.dashboard().await;
            let mut out = format!(
                "Priority contacts: {}\nPriority groups: {}\nMessages: {}",
                d.priority_contact_count, d.priority_group_count, d.message_count
            );
            for c in &d.priority_contacts {
                let _ = write!(out, "\n  * {} ({})", c.display_name(), c.id);
            }
            for g in &d.priority_groups {
                let _ = write!(out, "\n  * {} ({})", g.name, g.id);
            }
            if !d.recent.is_empty() {
                out.push_str("\nRecent activity:");
                for m in &d.recent {
                    let _ = write!(out, "\n  {}", format_message(m, false));
                }
            }
            out
        }
        Command::Contacts(q) => {
            let live = panel.live().await;
            let config = panel.config().await;
            let found = search_contacts(&live.contacts, &q);
            if found.is_empty() {
                return Ok("No contacts found.".to_string());
            }
            found
                .iter()
                .map(|c| {
                    let mark = if config.is_priority_contact(&c.id) { "*" } else { " " };
                    format!("{mark} {} ({})", c.display_name(), c.id)
                })
                .collect::<Vec<_>>()
                .join("\n")
        }
        Command::Groups(q) => {
            let live = panel.live().await;
            let config = panel.config().await;
            let found = search_groups(&live.groups, &q);
            if found.is_empty() {
                return Ok("No groups found.".to_string());
            }
            found
                .iter()
                .map(|g| {
                    let mark = if config.is_priority_group(&g.id) { "*" } else { " " };
                    format!("{mark} {} ({})", g.name, g.id)
                })
                .collect::<Vec<_>>()
                .join("\n")
        }
        Command::ToggleContact(id) => {
            let p = panel.toggle_priority_contact(&id).await;
            let state = if p.snapshot.config.is_priority_contact(&id) {
                "now priority"
            } else {
                "no longer priority"
            };
            pending_text(&p, &format!("{id} {state}"))
        }
        Command::ToggleGroup(id) => {
            let p = panel.toggle_priority_group(&id).await;
            let state = if p.snapshot.config.is_priority_group(&id) {
                "now priority"
            } else {
                "no longer priority"
            };
            pending_text(&p, &format!("{id} {state}"))
        }
        Command::Emails => {
            let config = panel.config().await;
            if config.notification_emails.is_empty() {
                "No notification emails.".to_string()
            } else {
                config.notification_emails.join("\n")
            }
        }
        Command::AddEmail(addr) => {
            let p = panel.add_notification_email(&addr).await?;
            pending_text(&p, &format!("added {}", addr.trim()))
        }
        Command::RemoveEmail(addr) => match panel.remove_notification_email(&addr).await {
            Some(p) => pending_text(&p, &format!("removed {addr}")),
            None => format!("{addr} is not on the list"),
        },
        Command::Settings => {
            let c = panel.config().await;
            let on = |b: bool| if b { "on" } else { "off" };
            format!(
                "auto-response: {}\nmessage: {}\ncooldown: {} h\nsound: {}\nai: {}\nprompt: {}\nthreshold: {:.2}",
                on(c.auto_response_enabled),
                c.auto_response_message,
                format_cooldown_hours(c.auto_response_cooldown),
                on(c.notification_sound),
                on(c.ai_mode_enabled),
                c.ai_custom_prompt,
                c.ai_urgency_threshold,
            )
        }
        Command::Set(edit) => {
            let snap = panel.edit(edit).await;
            format!("updated (v{}, unsaved)", snap.version)
        }
        Command::Save => {
            panel.save_config().await?;
            "saved".to_string()
        }
        Command::Start => {
            panel.start_bot().await?;
            "start requested".to_string()
        }
        Command::Stop => {
            panel.stop_bot().await?;
            "stop requested".to_string()
        }
        Command::Logout => {
            panel.logout().await?;
            "logged out".to_string()
        }
        Command::Log(filter) => {
            let messages = panel.live().await.messages;
            let config = panel.config().await;
            let view = filter_log(&messages, filter, &config);
            if let Some(empty) = view.empty_state() {
                return Ok(empty.to_string());
            }
            view.rows
                .iter()
                .map(|row| format_message(row.message, row.ai_flagged))
                .collect::<Vec<_>>()
                .join("\n")
        }
        Command::ClearLog => {
            panel.clear_messages().await?;
            "message log cleared".to_string()
        }
        Command::Send { is_group, id, text } => {
            let live = panel.live().await;
            let target = if is_group {
                live.groups
                    .iter()
                    .find(|g| g.id == id)
                    .map(ReplyTarget::from)
            } else {
                live.contacts
                    .iter()
                    .find(|c| c.id == id)
                    .map(ReplyTarget::from)
            }
            .unwrap_or_else(|| ReplyTarget {
                name: id.clone(),
                id: id.clone(),
                is_group,
            });
            panel.send_message(&target, &text).await?;
            format!("sent to {}", target.name)
        }
    };
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Command {
        parse_command(line).unwrap().unwrap()
    }

    #[test]
    fn blank_line_is_not_a_command() {
        assert_eq!(parse_command("   ").unwrap(), None);
    }

    #[test]
    fn parses_simple_commands() {
        assert_eq!(parse("status"), Command::Status);
        assert_eq!(parse("/SAVE"), Command::Save);
        assert_eq!(parse("contacts  ali "), Command::Contacts("ali".into()));
        assert_eq!(parse("groups"), Command::Groups(String::new()));
        assert_eq!(parse("toggle-contact 49@c.us"), Command::ToggleContact("49@c.us".into()));
    }

    #[test]
    fn parses_settings_edits() {
        assert_eq!(
            parse("set auto-response off"),
            Command::Set(SettingsEdit::AutoResponseEnabled(false))
        );
        assert_eq!(
            parse("set message back at 9, promise"),
            Command::Set(SettingsEdit::AutoResponseMessage("back at 9, promise".into()))
        );
        assert_eq!(
            parse("set threshold 0.7"),
            Command::Set(SettingsEdit::AiUrgencyThreshold("0.7".into()))
        );
        assert!(parse_command("set sound maybe").is_err());
        assert!(parse_command("set colour red").is_err());
    }

    #[test]
    fn parses_log_filters() {
        assert_eq!(parse("log"), Command::Log(LogFilter::All));
        assert_eq!(parse("log priority"), Command::Log(LogFilter::PriorityOnly));
        assert_eq!(parse("log ai"), Command::Log(LogFilter::AiFlaggedOnly));
        assert!(parse_command("log spam").is_err());
    }

    #[test]
    fn parses_send_with_multiword_text() {
        assert_eq!(
            parse("send group 1203@g.us see you at 5"),
            Command::Send {
                is_group: true,
                id: "1203@g.us".into(),
                text: "see you at 5".into(),
            }
        );
        assert!(parse_command("send someone x hi").is_err());
        assert!(parse_command("send contact").is_err());
    }

    #[test]
    fn unknown_and_incomplete_commands_are_rejected() {
        assert!(matches!(parse_command("frobnicate"), Err(Error::Validation(_))));
        assert!(parse_command("toggle-group").is_err());
        assert!(parse_command("remove-email").is_err());
    }

    #[test]
    fn message_lines_carry_tags() {
        let m = Message {
            from: "1203@g.us".into(),
            group_name: Some("Team".into()),
            is_group: true,
            body: "standup moved".into(),
            is_priority: true,
            auto_response_sent: true,
            ..Message::default()
        };
        assert_eq!(
            format_message(&m, true),
            "-- Team [priority] [ai] [auto-replied]: standup moved"
        );
    }
}
