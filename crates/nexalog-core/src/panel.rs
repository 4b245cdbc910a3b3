//! The control-panel service: every operator action goes through here.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    classify::{filter_log, LogFilter},
    config::Config,
    domain::{
        parse_cooldown_hours_input, parse_threshold_input, BotConfig, Message, ReplyTarget,
        SendMessageRequest,
    },
    errors::Error,
    live::{LiveState, LiveView},
    notify::Notifier,
    optimistic::{MutationKind, MutationPipeline, PendingPersist},
    poll::{PollHandle, PollLoop},
    remote::{BotAction, RemoteSyncClient},
    store::{ConfigSnapshot, ConfigStore},
    views::DashboardSummary,
    Result,
};

/// A form-field edit from the settings or AI tab. These only mark the store
/// dirty; they reach the server on the next explicit save.
#[derive(Clone, Debug, PartialEq)]
pub enum SettingsEdit {
    AutoResponseEnabled(bool),
    AutoResponseMessage(String),
    /// Raw hours input.
    CooldownHours(String),
    NotificationSound(bool),
    AiModeEnabled(bool),
    AiCustomPrompt(String),
    /// Raw threshold input.
    AiUrgencyThreshold(String),
}

impl SettingsEdit {
    pub fn apply(self, cfg: &mut BotConfig) {
        match self {
            SettingsEdit::AutoResponseEnabled(v) => cfg.auto_response_enabled = v,
            SettingsEdit::AutoResponseMessage(v) => cfg.auto_response_message = v,
            SettingsEdit::CooldownHours(v) => {
                cfg.auto_response_cooldown = parse_cooldown_hours_input(&v)
            }
            SettingsEdit::NotificationSound(v) => cfg.notification_sound = v,
            SettingsEdit::AiModeEnabled(v) => cfg.ai_mode_enabled = v,
            SettingsEdit::AiCustomPrompt(v) => cfg.ai_custom_prompt = v,
            SettingsEdit::AiUrgencyThreshold(v) => {
                cfg.ai_urgency_threshold = parse_threshold_input(&v)
            }
        }
    }
}

fn email_shape() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+$").expect("static email regex"))
}

/// Trim and check a notification email before it touches the store.
pub fn validate_email(input: &str, existing: &[String]) -> Result<String> {
    let email = input.trim();
    if email.is_empty() {
        return Err(Error::Validation("email address is empty".to_string()));
    }
    if !email_shape().is_match(email) {
        return Err(Error::Validation(format!("not an email address: {email}")));
    }
    if existing.iter().any(|e| e.eq_ignore_ascii_case(email)) {
        return Err(Error::Validation(format!("{email} is already on the list")));
    }
    Ok(email.to_string())
}

pub struct ControlPanel {
    cfg: Arc<Config>,
    store: Arc<ConfigStore>,
    remote: Arc<dyn RemoteSyncClient>,
    notifier: Arc<Notifier>,
    live: Arc<LiveView>,
    pipeline: MutationPipeline,
    poller: Arc<PollLoop>,
}

impl ControlPanel {
    pub fn new(cfg: Arc<Config>, remote: Arc<dyn RemoteSyncClient>) -> Self {
        let store = Arc::new(ConfigStore::default());
        let notifier = Arc::new(Notifier::new(cfg.toast_ttl));
        let live = Arc::new(LiveView::default());
        let pipeline = MutationPipeline::new(
            store.clone(),
            remote.clone(),
            notifier.clone(),
            cfg.persist_retry,
        );
        let poller = Arc::new(PollLoop::new(
            store.clone(),
            remote.clone(),
            live.clone(),
            notifier.clone(),
            cfg.status_poll_interval,
            cfg.message_poll_interval,
        ));

        Self {
            cfg,
            store,
            remote,
            notifier,
            live,
            pipeline,
            poller,
        }
    }

    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    pub fn notifier(&self) -> &Arc<Notifier> {
        &self.notifier
    }

    pub fn poller(&self) -> &Arc<PollLoop> {
        &self.poller
    }

    pub async fn live(&self) -> LiveState {
        self.live.snapshot().await
    }

    pub async fn config(&self) -> Arc<BotConfig> {
        self.store.read().await
    }

    /// Start the status and message-log timers. Dropping the handle stops them.
    pub fn start_polling(&self) -> PollHandle {
        self.poller.clone().spawn(CancellationToken::new())
    }

    // === Optimistic edits ===

    pub async fn toggle_priority_contact(&self, contact_id: &str) -> PendingPersist {
        let id = contact_id.to_string();
        self.pipeline
            .apply_and_persist(MutationKind::Priority, move |c| {
                c.toggle_priority_contact(&id)
            })
            .await
    }

    pub async fn toggle_priority_group(&self, group_id: &str) -> PendingPersist {
        let id = group_id.to_string();
        self.pipeline
            .apply_and_persist(MutationKind::Priority, move |c| c.toggle_priority_group(&id))
            .await
    }

    /// Append a notification email. Invalid input is rejected locally and
    /// never sent.
    pub async fn add_notification_email(&self, input: &str) -> Result<PendingPersist> {
        let current = self.store.read().await;
        let email = match validate_email(input, &current.notification_emails) {
            Ok(v) => v,
            Err(e) => {
                self.notifier.error(e.to_string());
                return Err(e);
            }
        };
        Ok(self
            .pipeline
            .apply_and_persist(MutationKind::EmailAdded, move |c| {
                if !c.notification_emails.contains(&email) {
                    c.notification_emails.push(email);
                }
            })
            .await)
    }

    /// Remove a notification email; `None` if it was not on the list.
    pub async fn remove_notification_email(&self, email: &str) -> Option<PendingPersist> {
        if !self
            .store
            .read()
            .await
            .notification_emails
            .iter()
            .any(|e| e == email)
        {
            return None;
        }
        let email = email.to_string();
        Some(
            self.pipeline
                .apply_and_persist(MutationKind::EmailRemoved, move |c| {
                    c.notification_emails.retain(|e| *e != email)
                })
                .await,
        )
    }

    // === Form edits + explicit save ===

    pub async fn edit(&self, edit: SettingsEdit) -> ConfigSnapshot {
        self.store.mutate(move |c| edit.apply(c)).await
    }

    /// Persist the current configuration and clear the dirty marker on
    /// success, regardless of other in-flight persists. Edits committed while
    /// the request was pending are sent before the marker is cleared.
    pub async fn save_config(&self) -> Result<()> {
        self.with_loading(async {
            match self.send_latest().await {
                Ok(version) => {
                    self.store.mark_clean().await;
                    info!(version, "configuration saved");
                    self.notifier.success("Configuration saved");
                    Ok(())
                }
                Err(e) => {
                    warn!("save config failed: {e}");
                    self.notifier.error("Error saving configuration");
                    Err(e)
                }
            }
        })
        .await
    }

    async fn send_latest(&self) -> Result<u64> {
        let sent = self.pipeline.send_in_order(self.store.snapshot().await).await?;
        let current = self.store.snapshot().await;
        if current.version == sent.version {
            return Ok(sent.version);
        }
        debug!(
            saved = sent.version,
            current = current.version,
            "configuration changed during save, sending again"
        );
        Ok(self.pipeline.send_in_order(current).await?.version)
    }

    // === Bot lifecycle ===

    pub async fn start_bot(&self) -> Result<()> {
        self.bot_action(BotAction::Start, "Bot starting...", "Error starting bot")
            .await
    }

    pub async fn stop_bot(&self) -> Result<()> {
        self.bot_action(BotAction::Stop, "Bot stopped", "Error stopping bot")
            .await
    }

    pub async fn logout(&self) -> Result<()> {
        self.bot_action(BotAction::Logout, "Logged out successfully", "Error logging out")
            .await
    }

    async fn bot_action(&self, action: BotAction, ok: &str, failed: &str) -> Result<()> {
        self.with_loading(async {
            match self.remote.bot_action(action).await {
                Ok(()) => {
                    self.notifier.success(ok);
                    Ok(())
                }
                Err(e) => {
                    warn!(?action, "bot action failed: {e}");
                    self.notifier.error(failed);
                    Err(e)
                }
            }
        })
        .await
    }

    async fn with_loading<T, F>(&self, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        let Some(_loading) = self.live.begin_loading() else {
            return Err(Error::Validation(
                "another request is still in progress".to_string(),
            ));
        };
        fut.await
    }

    // === Message log ===

    pub async fn clear_messages(&self) -> Result<()> {
        match self.remote.clear_messages().await {
            Ok(()) => {
                self.live.set_messages(Vec::new()).await;
                self.notifier.success("Message log cleared");
                Ok(())
            }
            Err(e) => {
                warn!("clear messages failed: {e}");
                self.notifier.error("Error clearing messages");
                Err(e)
            }
        }
    }

    /// Filtered copy of the message log; pair with
    /// [`crate::classify::filter_log`] for the empty state.
    pub async fn message_log(&self, filter: LogFilter) -> Vec<Message> {
        let messages = self.live.messages().await;
        let config = self.store.read().await;
        filter_log(&messages, filter, &config)
            .rows
            .into_iter()
            .map(|row| row.message.clone())
            .collect()
    }

    /// Manual reply. Blank text is rejected locally; `success: false` becomes
    /// a [`Error::ServerRejection`] with the server's reason.
    pub async fn send_message(&self, target: &ReplyTarget, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Err(Error::Validation("message is empty".to_string()));
        }

        let req = SendMessageRequest {
            contact_id: target.id.clone(),
            message: text.to_string(),
            is_group: target.is_group,
        };
        let resp = match self.remote.send_message(&req).await {
            Ok(r) => r,
            Err(e) => {
                warn!(to = %target.id, "send message failed: {e}");
                self.notifier.error("Network error. Please try again.");
                return Err(e);
            }
        };

        if !resp.success {
            let reason = resp
                .error
                .filter(|r| !r.trim().is_empty())
                .unwrap_or_else(|| "unknown error".to_string());
            self.notifier
                .error(format!("Failed to send message: {reason}"));
            return Err(Error::ServerRejection(reason));
        }

        info!(to = %target.id, group = target.is_group, "message sent");
        self.notifier.success("Message sent successfully!");
        Ok(())
    }

    pub async fn dashboard(&self) -> DashboardSummary {
        let live = self.live.snapshot().await;
        let config = self.store.read().await;
        DashboardSummary::build(
            &config,
            &live.contacts,
            &live.groups,
            &live.messages,
            self.cfg.recent_activity_limit,
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use super::*;
    use crate::domain::{ConnectionStatus, SendMessageResponse, StatusReport};
    use crate::notify::ToastKind;
    use crate::optimistic::{PersistOutcome, RetryPolicy};
    use crate::store::MergeOutcome;
    use crate::testing::FakeRemote;

    fn panel(remote: Arc<FakeRemote>) -> ControlPanel {
        let mut cfg = Config::with_base_url("http://bot.test");
        cfg.persist_retry = RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        };
        ControlPanel::new(Arc::new(cfg), remote)
    }

    #[tokio::test]
    async fn toggles_add_remove_without_duplicates() {
        let remote = FakeRemote::new();
        let p = panel(remote.clone());

        p.toggle_priority_contact("c1").await.outcome().await;
        assert_eq!(p.config().await.priority_contacts, vec!["c1"]);
        p.toggle_priority_contact("c1").await.outcome().await;
        assert!(p.config().await.priority_contacts.is_empty());
        for _ in 0..3 {
            p.toggle_priority_contact("c2").await.outcome().await;
        }
        assert_eq!(p.config().await.priority_contacts, vec!["c2"]);
        assert_eq!(remote.persisted().len(), 5);
        assert!(!p.store().is_dirty().await);
    }

    #[tokio::test]
    async fn email_add_then_remove() {
        let remote = FakeRemote::new();
        let p = panel(remote.clone());

        let added = p.add_notification_email(" a@b.com ").await.unwrap();
        assert_eq!(added.snapshot.config.notification_emails, vec!["a@b.com"]);
        added.outcome().await;

        let removed = p.remove_notification_email("a@b.com").await.unwrap();
        assert!(removed.snapshot.config.notification_emails.is_empty());
        removed.outcome().await;

        let before = p.store().version().await;
        assert!(p.remove_notification_email("nobody@b.com").await.is_none());
        assert_eq!(p.store().version().await, before);
        assert!(!p.store().is_dirty().await);
        assert_eq!(remote.persisted().len(), 2);
    }

    #[tokio::test]
    async fn invalid_email_is_never_sent() {
        let remote = FakeRemote::new();
        let p = panel(remote.clone());

        assert!(matches!(
            p.add_notification_email("   ").await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            p.add_notification_email("not-an-email").await,
            Err(Error::Validation(_))
        ));
        p.add_notification_email("a@b.com").await.unwrap().outcome().await;
        assert!(matches!(
            p.add_notification_email("A@B.com").await,
            Err(Error::Validation(_))
        ));
        assert_eq!(remote.persist_calls.load(Ordering::SeqCst), 1);
        assert_eq!(p.notifier().current().unwrap().kind, ToastKind::Error);
    }

    #[tokio::test]
    async fn form_edits_clamp_and_mark_dirty() {
        let p = panel(FakeRemote::new());

        let s = p
            .edit(SettingsEdit::AiUrgencyThreshold("-1".into()))
            .await;
        assert_eq!(s.config.ai_urgency_threshold, 0.0);
        assert!(s.dirty);
        let s = p.edit(SettingsEdit::AiUrgencyThreshold("5".into())).await;
        assert_eq!(s.config.ai_urgency_threshold, 1.0);
        let s = p
            .edit(SettingsEdit::AiUrgencyThreshold("high".into()))
            .await;
        assert_eq!(s.config.ai_urgency_threshold, 0.0);

        let s = p.edit(SettingsEdit::CooldownHours("2".into())).await;
        assert_eq!(s.config.auto_response_cooldown, 7_200_000);
    }

    #[tokio::test]
    async fn form_edit_survives_poll_until_saved() {
        let remote = FakeRemote::new();
        remote.set_status(StatusReport {
            status: ConnectionStatus::Connected,
            qr_code: None,
            config: Some(BotConfig::default()),
        });
        let p = panel(remote.clone());

        p.edit(SettingsEdit::AiCustomPrompt("flag job offers".into()))
            .await;
        let t = p.poller().status_tick().await.unwrap();
        assert_eq!(t.merge, MergeOutcome::KeptLocal);
        assert_eq!(p.config().await.ai_custom_prompt, "flag job offers");

        p.save_config().await.unwrap();
        assert!(!p.store().is_dirty().await);
        assert_eq!(remote.persisted()[0].ai_custom_prompt, "flag job offers");
    }

    #[tokio::test]
    async fn explicit_save_clears_dirty_while_older_persist_in_flight() {
        let remote = FakeRemote::new();
        let p = panel(remote.clone());

        let gate = remote.hold_next_persist();
        let early = p.toggle_priority_contact("c1").await;
        let later = p.toggle_priority_group("g1").await;
        later.outcome().await;

        // Second toggle's own persist matched the latest version already;
        // make the store dirty again with a form edit before saving.
        p.edit(SettingsEdit::NotificationSound(false)).await;
        assert!(p.store().is_dirty().await);
        assert!(!early.is_finished());

        p.save_config().await.unwrap();
        assert!(!p.store().is_dirty().await);

        gate.notify_one();
        assert!(matches!(
            early.outcome().await,
            PersistOutcome::Persisted { cleared_dirty: false, .. }
        ));
        assert!(!p.store().is_dirty().await);
        let cfg = p.config().await;
        assert_eq!(cfg.priority_contacts, vec!["c1"]);
        assert_eq!(cfg.priority_groups, vec!["g1"]);
        assert!(!cfg.notification_sound);

        // The late single-toggle write was followed by the full current state.
        let last = remote.persisted().pop().unwrap();
        assert_eq!(last, *cfg);
    }

    #[tokio::test]
    async fn save_failure_keeps_dirty_and_reports() {
        let remote = FakeRemote::new();
        remote.fail_persists.store(1, Ordering::SeqCst);
        let p = panel(remote);

        p.edit(SettingsEdit::AutoResponseEnabled(false)).await;
        assert!(matches!(p.save_config().await, Err(Error::Transport(_))));
        assert!(p.store().is_dirty().await);
        assert!(!p.live().await.loading);
        assert_eq!(
            p.notifier().current().unwrap().message,
            "Error saving configuration"
        );
    }

    #[tokio::test]
    async fn lifecycle_actions_hit_their_endpoints() {
        let remote = FakeRemote::new();
        let p = panel(remote.clone());

        p.start_bot().await.unwrap();
        p.stop_bot().await.unwrap();
        p.logout().await.unwrap();
        assert_eq!(
            *remote.actions.lock().unwrap(),
            vec![BotAction::Start, BotAction::Stop, BotAction::Logout]
        );
        assert_eq!(
            p.notifier().current().unwrap().message,
            "Logged out successfully"
        );
    }

    #[tokio::test]
    async fn send_message_surfaces_server_reason() {
        let remote = FakeRemote::new();
        *remote.send_response.lock().unwrap() = SendMessageResponse {
            success: false,
            error: Some("chat not found".into()),
        };
        let p = panel(remote.clone());
        let target = ReplyTarget {
            id: "g1@g.us".into(),
            name: "Ops".into(),
            is_group: true,
        };

        assert!(matches!(
            p.send_message(&target, "  ").await,
            Err(Error::Validation(_))
        ));
        match p.send_message(&target, "on it").await {
            Err(Error::ServerRejection(reason)) => assert_eq!(reason, "chat not found"),
            other => panic!("unexpected: {other:?}"),
        }
        let sent = remote.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].is_group);

        *remote.send_response.lock().unwrap() = SendMessageResponse {
            success: true,
            error: None,
        };
        p.send_message(&target, "on it").await.unwrap();
    }

    #[tokio::test]
    async fn clearing_the_log_empties_local_messages() {
        let remote = FakeRemote::new();
        remote.set_status(StatusReport {
            status: ConnectionStatus::Connected,
            ..StatusReport::default()
        });
        remote.messages.lock().unwrap().push(Message {
            from: "c1".into(),
            is_priority: true,
            ..Message::default()
        });
        let p = panel(remote);

        p.poller().status_tick().await.unwrap();
        p.poller().messages_tick().await.unwrap();
        assert_eq!(p.message_log(LogFilter::PriorityOnly).await.len(), 1);

        p.clear_messages().await.unwrap();
        assert!(p.message_log(LogFilter::All).await.is_empty());
        assert_eq!(p.dashboard().await.message_count, 0);
    }

    /// Serve the last persisted configuration back through `GET /status`.
    fn echo_server_config(remote: &FakeRemote) {
        let config = remote.persisted().pop();
        remote.set_status(StatusReport {
            status: ConnectionStatus::Connected,
            qr_code: None,
            config,
        });
    }

    async fn wait_for_persist_calls(remote: &FakeRemote, n: usize) {
        while remote.persist_calls.load(Ordering::SeqCst) < n {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn toggle_during_save_with_failed_first_persist_is_kept() {
        let remote = FakeRemote::new();
        let p = panel(remote.clone());
        p.edit(SettingsEdit::NotificationSound(false)).await;

        let gate = remote.hold_next_persist();
        remote.fail_persists.store(1, Ordering::SeqCst);
        let (saved, toggle) = tokio::join!(p.save_config(), async {
            let pending = p.toggle_priority_contact("c1").await;
            // The toggle's first attempt fails while the save is still held.
            wait_for_persist_calls(&remote, 2).await;
            gate.notify_one();
            pending.outcome().await
        });
        saved.unwrap();

        assert!(matches!(
            toggle,
            PersistOutcome::Persisted { .. } | PersistOutcome::Superseded { .. }
        ));
        assert!(!p.store().is_dirty().await);
        assert_eq!(p.notifier().current().unwrap().kind, ToastKind::Success);
        let last = remote.persisted().pop().unwrap();
        assert_eq!(last.priority_contacts, vec!["c1"]);
        assert!(!last.notification_sound);

        echo_server_config(&remote);
        p.poller().status_tick().await.unwrap();
        assert_eq!(p.config().await.priority_contacts, vec!["c1"]);
    }

    #[tokio::test]
    async fn save_landing_after_newer_toggle_resends_current_config() {
        let remote = FakeRemote::new();
        let p = panel(remote.clone());
        p.edit(SettingsEdit::NotificationSound(false)).await;

        let gate = remote.hold_next_persist();
        let (saved, toggle) = tokio::join!(p.save_config(), async {
            let out = p.toggle_priority_contact("c1").await.outcome().await;
            gate.notify_one();
            out
        });
        saved.unwrap();
        assert!(matches!(
            toggle,
            PersistOutcome::Persisted { cleared_dirty: true, .. }
        ));

        // toggle, the save's older payload, then the current state again.
        let writes = remote.persisted();
        assert_eq!(writes.len(), 3);
        assert!(writes[1].priority_contacts.is_empty());
        assert_eq!(writes[2], *p.config().await);
        assert!(!p.store().is_dirty().await);

        echo_server_config(&remote);
        p.poller().status_tick().await.unwrap();
        assert_eq!(p.config().await.priority_contacts, vec!["c1"]);
    }

    #[tokio::test]
    async fn abandoned_request_releases_loading_flag() {
        let remote = FakeRemote::new();
        let p = panel(remote.clone());
        let _gate = remote.hold_next_persist();

        tokio::select! {
            _ = p.save_config() => panic!("save should still be held"),
            _ = wait_for_persist_calls(&remote, 1) => {}
        }
        assert!(!p.live().await.loading);
        p.start_bot().await.unwrap();
    }
}
