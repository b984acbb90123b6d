//! Plugin Dispatcher (PD): command/keyword/regex routing over a fixed,
//! compile-time plugin registry. Grounded on `original_source/core/plugin.py`
//! — `Plugin.handle_message`'s three-tier routing order (exact command,
//! then first-match keyword, then first-match regex) and
//! `PluginManager.handle_message`'s temp-handlers → plugins → unknown-command
//! fallback. The dynamic `auto_discover_plugins` directory scan has no Rust
//! counterpart; `registry.rs` lists every plugin explicitly instead.

pub mod registry;
pub mod commands;

use crate::context::AppContext;
use crate::error::{BotError, BotResult};
use crate::models::{BotResponse, GenericMessage};
use futures::future::BoxFuture;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

const HANDLER_TIMEOUT: Duration = Duration::from_secs(30);

pub type HandlerFuture = BoxFuture<'static, BotResult<Vec<BotResponse>>>;
pub type UnknownHandlerFuture = BoxFuture<'static, BotResult<Option<Vec<BotResponse>>>>;

pub type HandlerFn = Arc<dyn Fn(Arc<AppContext>, GenericMessage, String) -> HandlerFuture + Send + Sync>;
pub type UnknownHandlerFn = Arc<dyn Fn(Arc<AppContext>, GenericMessage) -> UnknownHandlerFuture + Send + Sync>;

/// Wraps a plain `async fn(ctx, msg, args) -> BotResult<Vec<BotResponse>>`
/// closure into a `HandlerFn`, so command plugin files read like the
/// original's `async def handler(self, message, args)` methods rather than
/// hand-written trait objects.
pub fn h<F, Fut>(f: F) -> HandlerFn
where
    F: Fn(Arc<AppContext>, GenericMessage, String) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = BotResult<Vec<BotResponse>>> + Send + 'static,
{
    Arc::new(move |ctx, msg, args| Box::pin(f(ctx, msg, args)))
}

pub fn unknown_handler<F, Fut>(f: F) -> UnknownHandlerFn
where
    F: Fn(Arc<AppContext>, GenericMessage) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = BotResult<Option<Vec<BotResponse>>>> + Send + 'static,
{
    Arc::new(move |ctx, msg| Box::pin(f(ctx, msg)))
}

pub struct CommandSpec {
    pub name: String,
    pub description: String,
    pub hidden: bool,
    pub handler: HandlerFn,
}

pub struct KeywordSpec {
    pub keyword: String,
    pub handler: HandlerFn,
}

pub struct RegexSpec {
    pub pattern: Regex,
    pub handler: HandlerFn,
}

pub struct Plugin {
    pub name: String,
    pub commands: Vec<CommandSpec>,
    pub keywords: Vec<KeywordSpec>,
    pub regexes: Vec<RegexSpec>,
    pub unknown_command_response: Option<UnknownHandlerFn>,
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("name", &self.name)
            .field("commands", &self.commands.iter().map(|c| &c.name).collect::<Vec<_>>())
            .finish()
    }
}

pub struct PluginBuilder {
    name: String,
    commands: Vec<CommandSpec>,
    keywords: Vec<KeywordSpec>,
    regexes: Vec<RegexSpec>,
    unknown_command_response: Option<UnknownHandlerFn>,
}

impl PluginBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), commands: vec![], keywords: vec![], regexes: vec![], unknown_command_response: None }
    }

    pub fn command(mut self, name: impl Into<String>, description: impl Into<String>, handler: HandlerFn) -> Self {
        self.commands.push(CommandSpec { name: name.into(), description: description.into(), hidden: false, handler });
        self
    }

    /// A command that exists (can be invoked) but is left off `/help`'s
    /// listing, mirroring `@on_command(..., hidden=True)` in the source.
    pub fn hidden_command(mut self, name: impl Into<String>, description: impl Into<String>, handler: HandlerFn) -> Self {
        self.commands.push(CommandSpec { name: name.into(), description: description.into(), hidden: true, handler });
        self
    }

    pub fn keyword(mut self, keyword: impl Into<String>, handler: HandlerFn) -> Self {
        self.keywords.push(KeywordSpec { keyword: keyword.into(), handler });
        self
    }

    pub fn regex(mut self, pattern: &str, handler: HandlerFn) -> BotResult<Self> {
        let compiled = Regex::new(pattern).map_err(|e| BotError::Internal(format!("invalid plugin regex {pattern}: {e}")))?;
        self.regexes.push(RegexSpec { pattern: compiled, handler });
        Ok(self)
    }

    pub fn unknown_command_response(mut self, handler: UnknownHandlerFn) -> Self {
        self.unknown_command_response = Some(handler);
        self
    }

    pub fn build(self) -> Plugin {
        Plugin {
            name: self.name,
            commands: self.commands,
            keywords: self.keywords,
            regexes: self.regexes,
            unknown_command_response: self.unknown_command_response,
        }
    }
}

/// Splits `"/rank Foo#1234"` into `("rank", "Foo#1234")`. Returns `None` if
/// `content` doesn't start with `/`.
fn split_command(content: &str) -> Option<(&str, &str)> {
    let rest = content.trim().strip_prefix('/')?;
    match rest.split_once(char::is_whitespace) {
        Some((cmd, args)) => Some((cmd, args.trim())),
        None => Some((rest, "")),
    }
}

pub struct PluginManager {
    ctx: Arc<AppContext>,
    commands: HashMap<String, Arc<Plugin>>,
    plugins: Vec<Arc<Plugin>>,
}

impl PluginManager {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx, commands: HashMap::new(), plugins: vec![] }
    }

    /// Registers a plugin, rejecting it outright if any of its commands
    /// collides with an already-registered one (spec §4.10;
    /// `core/plugin.py`'s `register_plugin` raises `ValueError` on the same
    /// condition).
    pub fn register(&mut self, plugin: Plugin) -> BotResult<()> {
        for cmd in &plugin.commands {
            if self.commands.contains_key(&cmd.name) {
                return Err(BotError::Internal(format!(
                    "command /{} from plugin {} conflicts with an already-registered plugin",
                    cmd.name, plugin.name
                )));
            }
        }
        let plugin = Arc::new(plugin);
        for cmd in &plugin.commands {
            self.commands.insert(cmd.name.clone(), plugin.clone());
        }
        self.plugins.push(plugin);
        Ok(())
    }

    /// Commands for `/help`, excluding hidden ones, in registration order.
    pub fn command_list(&self) -> Vec<(String, String)> {
        self.plugins
            .iter()
            .flat_map(|p| p.commands.iter())
            .filter(|c| !c.hidden)
            .map(|c| (c.name.clone(), c.description.clone()))
            .collect()
    }

    /// A slash-prefixed miss goes straight here; it never re-tries
    /// keyword/regex matching against content that still has its leading
    /// `/`. A non-slash miss falls through to here too, unconditional on
    /// why nothing matched.
    pub async fn dispatch(&self, msg: GenericMessage) -> BotResult<Vec<BotResponse>> {
        if let Some((cmd_name, args)) = split_command(&msg.content) {
            if let Some(plugin) = self.commands.get(cmd_name) {
                let spec = plugin.commands.iter().find(|c| c.name == cmd_name).expect("indexed by name");
                return self.run_handler(&spec.handler, msg, args.to_string()).await;
            }
            return self.unknown_command_fallback(msg).await;
        }

        for plugin in &self.plugins {
            for kw in &plugin.keywords {
                if msg.content.contains(&kw.keyword) {
                    return self.run_handler(&kw.handler, msg, msg.content.clone()).await;
                }
            }
        }
        for plugin in &self.plugins {
            for rx in &plugin.regexes {
                if rx.pattern.is_match(&msg.content) {
                    return self.run_handler(&rx.handler, msg, msg.content.clone()).await;
                }
            }
        }
        self.unknown_command_fallback(msg).await
    }

    async fn unknown_command_fallback(&self, msg: GenericMessage) -> BotResult<Vec<BotResponse>> {
        for plugin in &self.plugins {
            let Some(unknown) = &plugin.unknown_command_response else { continue };
            let fut = unknown(self.ctx.clone(), msg.clone());
            match tokio::time::timeout(HANDLER_TIMEOUT, fut).await {
                Ok(Ok(Some(responses))) => return Ok(responses),
                Ok(Ok(None)) => continue,
                Ok(Err(e)) => {
                    tracing::warn!(plugin = %plugin.name, error = %e, "unknown-command handler failed");
                    continue;
                }
                Err(_) => {
                    tracing::warn!(plugin = %plugin.name, "unknown-command handler timed out");
                    continue;
                }
            }
        }
        Ok(vec![])
    }

    async fn run_handler(&self, handler: &HandlerFn, msg: GenericMessage, args: String) -> BotResult<Vec<BotResponse>> {
        let fut = handler(self.ctx.clone(), msg, args);
        match tokio::time::timeout(HANDLER_TIMEOUT, fut).await {
            Ok(result) => result,
            Err(_) => Err(BotError::Timeout(HANDLER_TIMEOUT)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageAuthor;

    fn msg(content: &str) -> GenericMessage {
        GenericMessage {
            platform: "loopback".into(),
            id: "1".into(),
            channel_id: "c1".into(),
            guild_id: None,
            content: content.to_string(),
            author: MessageAuthor { id: "u1".into(), name: "tester".into(), is_bot: false },
            timestamp_ms: 0,
            raw: serde_json::Value::Null,
            extra: serde_json::Value::Null,
        }
    }

    fn ok_handler(text: &'static str) -> HandlerFn {
        h(move |_, _, _| async move { Ok(vec![BotResponse::Text(text.to_string())]) })
    }

    #[test]
    fn split_command_separates_name_and_args() {
        assert_eq!(split_command("/rank Foo#1234"), Some(("rank", "Foo#1234")));
        assert_eq!(split_command("/about"), Some(("about", "")));
        assert_eq!(split_command("hello"), None);
    }

    #[tokio::test]
    async fn registering_duplicate_command_is_rejected() {
        let ctx = crate::context::tests::fake_context();
        let mut pd = PluginManager::new(ctx);
        pd.register(PluginBuilder::new("a").command("x", "x", ok_handler("a")).build()).unwrap();
        let err = pd.register(PluginBuilder::new("b").command("x", "x", ok_handler("b")).build());
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn exact_command_wins_over_keyword_and_regex() {
        let ctx = crate::context::tests::fake_context();
        let mut pd = PluginManager::new(ctx);
        pd.register(
            PluginBuilder::new("p")
                .command("about", "about", ok_handler("command"))
                .keyword("about", ok_handler("keyword"))
                .regex(".*", ok_handler("regex"))
                .unwrap()
                .build(),
        )
        .unwrap();
        let out = pd.dispatch(msg("/about")).await.unwrap();
        assert!(matches!(&out[0], BotResponse::Text(t) if t == "command"));
    }

    #[tokio::test]
    async fn keyword_wins_over_regex_for_plain_text() {
        let ctx = crate::context::tests::fake_context();
        let mut pd = PluginManager::new(ctx);
        pd.register(PluginBuilder::new("p").keyword("hi", ok_handler("keyword")).regex(".*", ok_handler("regex")).unwrap().build())
            .unwrap();
        let out = pd.dispatch(msg("hi there")).await.unwrap();
        assert!(matches!(&out[0], BotResponse::Text(t) if t == "keyword"));
    }

    #[tokio::test]
    async fn unknown_command_fallback_returns_first_some() {
        let ctx = crate::context::tests::fake_context();
        let mut pd = PluginManager::new(ctx);
        pd.register(
            PluginBuilder::new("silent")
                .unknown_command_response(unknown_handler(|_, _| async { Ok(None) }))
                .build(),
        )
        .unwrap();
        pd.register(
            PluginBuilder::new("responder")
                .unknown_command_response(unknown_handler(|_, _| async {
                    Ok(Some(vec![BotResponse::Text("unknown".into())]))
                }))
                .build(),
        )
        .unwrap();
        let out = pd.dispatch(msg("/doesnotexist")).await.unwrap();
        assert!(matches!(&out[0], BotResponse::Text(t) if t == "unknown"));
    }

    #[tokio::test]
    async fn slash_command_miss_skips_keyword_and_regex_matching() {
        let ctx = crate::context::tests::fake_context();
        let mut pd = PluginManager::new(ctx);
        pd.register(
            PluginBuilder::new("p")
                .command("about", "about", ok_handler("command"))
                .keyword("/", ok_handler("keyword"))
                .regex(".*", ok_handler("regex"))
                .unwrap()
                .build(),
        )
        .unwrap();
        let out = pd.dispatch(msg("/nope")).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn non_slash_miss_still_reaches_unknown_command_fallback() {
        let ctx = crate::context::tests::fake_context();
        let mut pd = PluginManager::new(ctx);
        pd.register(
            PluginBuilder::new("responder")
                .unknown_command_response(unknown_handler(|_, _| async {
                    Ok(Some(vec![BotResponse::Text("unknown".into())]))
                }))
                .build(),
        )
        .unwrap();
        let out = pd.dispatch(msg("just some text")).await.unwrap();
        assert!(matches!(&out[0], BotResponse::Text(t) if t == "unknown"));
    }
}
