//! Core App (CA): the platform-agnostic message entry point every
//! platform adapter calls into. Owns PD and the global concurrency
//! semaphore. Grounded on `original_source/core/app.py`'s `CoreApp`.

use crate::announcement::AnnouncementScheduler;
use crate::context::AppContext;
use crate::error::BotResult;
use crate::models::{BotResponse, GenericMessage};
use crate::plugin::commands::bind;
use crate::plugin::{registry, PluginManager};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Bound on how long `handle_message` waits for a free concurrency slot
/// before giving up; mirrors the source's `asyncio.timeout(30)` wrapping
/// `async with self.semaphore`. PD applies its own per-handler timeout
/// once dispatch actually starts (see `plugin::HANDLER_TIMEOUT`), so this
/// one only bounds queueing time.
const SEMAPHORE_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

const HELP_TEXT: &str = "❓需要帮助？\n请使用 /about 获取帮助信息";

pub struct CoreApp {
    ctx: Arc<AppContext>,
    plugin_manager: PluginManager,
    semaphore: Arc<Semaphore>,
    announcements: Option<Arc<AnnouncementScheduler>>,
}

impl CoreApp {
    pub fn new(ctx: Arc<AppContext>) -> BotResult<Self> {
        let max_concurrent = ctx.config.max_concurrent;
        let plugin_manager = registry::build(ctx.clone())?;
        Ok(Self { ctx, plugin_manager, semaphore: Arc::new(Semaphore::new(max_concurrent)), announcements: None })
    }

    /// Attaches AS so `handle_message` can append a per-guild broadcast
    /// alongside the plugin dispatch response (SPEC_FULL §4.12: the caller
    /// of `get_for_guild` owns calling `mark_sent` on delivery).
    pub fn with_announcements(mut self, announcements: Arc<AnnouncementScheduler>) -> Self {
        self.announcements = Some(announcements);
        self
    }

    /// Unified message-handling entry point. Platform adapters translate
    /// their own wire format into a `GenericMessage`, call this, and send
    /// whatever `BotResponse`s come back.
    pub async fn handle_message(&self, msg: GenericMessage) -> Vec<BotResponse> {
        if msg.content.trim().eq_ignore_ascii_case("/help") {
            return vec![BotResponse::Text(HELP_TEXT.to_string())];
        }

        let mut responses = Vec::new();
        match bind::maybe_welcome(self.ctx.clone(), msg.clone()).await {
            Ok(Some(welcome)) => responses.extend(welcome),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "welcome hook failed"),
        }

        let permit = match tokio::time::timeout(SEMAPHORE_ACQUIRE_TIMEOUT, self.semaphore.clone().acquire_owned()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                tracing::warn!("concurrency semaphore closed");
                responses.push(BotResponse::Text("⚠️ 处理消息时发生错误，请稍后重试".to_string()));
                return responses;
            }
            Err(_) => {
                responses.push(BotResponse::Text("⚠️ 处理超时，请稍后重试".to_string()));
                return responses;
            }
        };

        let guild_id = msg.guild_id.clone();
        match self.plugin_manager.dispatch(msg).await {
            Ok(dispatched) => responses.extend(dispatched),
            Err(e) => {
                tracing::warn!(error = %e, "plugin dispatch failed");
                responses.push(BotResponse::Text(format!("⚠️ {}", e.user_message())));
            }
        }
        drop(permit);

        if let (Some(announcements), Some(guild_id)) = (&self.announcements, &guild_id)
            && let Some(announcement) = announcements.get_for_guild(guild_id)
        {
            responses.push(BotResponse::Text(announcement.message));
            announcements.mark_sent(guild_id);
        }

        responses
    }

    /// Commands for `/about` to list; PD excludes hidden ones already.
    pub fn command_list(&self) -> Vec<(String, String)> {
        self.plugin_manager.command_list()
    }

    /// Mirrors `CoreApp.cleanup`. Background refresh loops own their own
    /// `CancellationToken`s (SP, AS) rather than being tracked here, so
    /// there's nothing to cancel yet; kept as the one place a future
    /// per-request task registry would hook into.
    pub async fn cleanup(&self) {
        tracing::info!("core app cleanup complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::fake_context;
    use crate::models::MessageAuthor;

    fn message(content: &str) -> GenericMessage {
        GenericMessage {
            platform: "loopback".into(),
            id: "1".into(),
            channel_id: "c1".into(),
            guild_id: None,
            content: content.to_string(),
            author: MessageAuthor { id: "user-1".into(), name: "tester".into(), is_bot: false },
            timestamp_ms: 0,
            raw: serde_json::Value::Null,
            extra: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn help_short_circuits_before_dispatch() {
        let app = CoreApp::new(fake_context()).unwrap();
        let responses = app.handle_message(message("/help")).await;
        assert_eq!(responses.len(), 1);
        assert!(matches!(&responses[0], BotResponse::Text(t) if t.contains("/about")));
    }

    #[tokio::test]
    async fn active_announcement_is_appended_and_marked_sent() {
        let config = crate::config::AnnouncementsConfig {
            enabled: true,
            items: vec![crate::config::AnnouncementItem {
                id: "a1".into(),
                message: "test announcement".into(),
                start_time: "2000-01-01T00:00:00".into(),
                end_time: "2999-01-01T00:00:00".into(),
            }],
        };
        let dir = std::env::temp_dir().join(format!("core-app-as-test-{:x}", uuid::Uuid::new_v4().as_u128()));
        let scheduler = Arc::new(AnnouncementScheduler::load(&config, &dir));
        let app = CoreApp::new(fake_context()).unwrap().with_announcements(scheduler);

        let mut msg = message("/nope");
        msg.guild_id = Some("guild-1".into());
        let responses = app.handle_message(msg).await;
        assert!(responses.iter().any(|r| matches!(r, BotResponse::Text(t) if t.contains("test announcement"))));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn unknown_command_falls_through_to_dispatch_without_panicking() {
        let app = CoreApp::new(fake_context()).unwrap();
        // First interaction also triggers the welcome notice, so an unknown
        // command can yield one response (the welcome) or none at all.
        let responses = app.handle_message(message("/nope")).await;
        assert!(responses.len() <= 1);
        assert!(responses.iter().all(|r| matches!(r, BotResponse::Text(_))));
    }
}
