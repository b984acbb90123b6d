//! Platform adapter interface (PD's upstream producers / downstream
//! sinks). No concrete QQ/Kook/HeyBox wire protocol lives here — those
//! are out-of-scope collaborators — but CA/PD need something concrete to
//! receive from and send to, so this module defines the `Platform` trait,
//! a signed-webhook outbound sender generalizing
//! `original_source`'s `webhooks.rs` dispatcher, a bearer-guarded inbound
//! Rocket route per platform mirroring `routes::AdminKey`, and an
//! in-memory `LoopbackPlatform` reference adapter used by tests and by a
//! debug send route.

use crate::config::PlatformConfig;
use hmac::{Hmac, Mac};
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome, Request};
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("platform {0} is not registered")]
    NotRegistered(String),
    #[error("delivery to {platform} failed: {message}")]
    Delivery { platform: String, message: String },
}

#[rocket::async_trait]
pub trait Platform: Send + Sync {
    fn name(&self) -> &'static str;
    async fn send_text(&self, channel_id: &str, text: &str) -> Result<(), PlatformError>;
    async fn send_image(&self, channel_id: &str, bytes: &[u8]) -> Result<(), PlatformError>;
}

#[derive(serde::Serialize)]
struct OutboundPayload<'a> {
    channel_id: &'a str,
    kind: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_url: Option<String>,
}

/// Generic signed-webhook outbound sender. Real platform adapters would
/// translate this into their own wire call; this crate ships the generic
/// shape (POST a JSON payload, sign it the way `webhooks.rs` signs
/// outbound deliveries) rather than a per-platform SDK integration.
pub struct HttpPlatform {
    name: &'static str,
    webhook_url: String,
    secret: Option<String>,
    client: reqwest::Client,
    /// When set, `send_image` uploads to `image_store` and sends a link
    /// built from `public_base_url` instead of inlining base64 — the
    /// `image_send_method = "url"` config option from SPEC_FULL §6.
    image_store: Option<Arc<crate::image_store::ImageStore>>,
    public_base_url: Option<String>,
}

impl HttpPlatform {
    pub fn new(name: &'static str, config: &PlatformConfig) -> Self {
        Self {
            name,
            webhook_url: config.token.clone(),
            secret: if config.secret.is_empty() { None } else { Some(config.secret.clone()) },
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(5))
                .build()
                .expect("failed to build platform http client"),
            image_store: None,
            public_base_url: None,
        }
    }

    /// Switches `send_image` from base64-inlining to linking through the
    /// image store's `/images/<id>` route.
    pub fn with_url_delivery(mut self, image_store: Arc<crate::image_store::ImageStore>, public_base_url: String) -> Self {
        self.image_store = Some(image_store);
        self.public_base_url = Some(public_base_url);
        self
    }

    async fn deliver(&self, payload: OutboundPayload<'_>) -> Result<(), PlatformError> {
        let body = serde_json::to_string(&payload).map_err(|e| PlatformError::Delivery { platform: self.name.to_string(), message: e.to_string() })?;
        let mut request = self.client.post(&self.webhook_url).header("Content-Type", "application/json").header("X-Bot-Platform", self.name);
        if let Some(secret) = &self.secret
            && let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes())
        {
            mac.update(body.as_bytes());
            let signature = hex::encode(mac.finalize().into_bytes());
            request = request.header("X-Bot-Signature", format!("sha256={signature}"));
        }
        let resp = request.body(body).send().await.map_err(|e| PlatformError::Delivery { platform: self.name.to_string(), message: e.to_string() })?;
        if !resp.status().is_success() {
            return Err(PlatformError::Delivery { platform: self.name.to_string(), message: format!("HTTP {}", resp.status()) });
        }
        Ok(())
    }
}

#[rocket::async_trait]
impl Platform for HttpPlatform {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn send_text(&self, channel_id: &str, text: &str) -> Result<(), PlatformError> {
        self.deliver(OutboundPayload { channel_id, kind: "text", text: Some(text), image_base64: None, image_url: None }).await
    }

    async fn send_image(&self, channel_id: &str, bytes: &[u8]) -> Result<(), PlatformError> {
        if let (Some(store), Some(base_url)) = (&self.image_store, &self.public_base_url) {
            let id = store.save(bytes, None).map_err(|e| PlatformError::Delivery { platform: self.name.to_string(), message: e.to_string() })?;
            let url = format!("{}/images/{id}", base_url.trim_end_matches('/'));
            return self.deliver(OutboundPayload { channel_id, kind: "image", text: None, image_base64: None, image_url: Some(url) }).await;
        }
        use base64::Engine;
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        self.deliver(OutboundPayload { channel_id, kind: "image", text: None, image_base64: Some(encoded), image_url: None }).await
    }
}

#[derive(Debug, Clone)]
pub enum LoopbackDelivery {
    Text(String),
    Image { bytes_len: usize, alt_text: String },
}

/// In-memory reference adapter: records everything sent to it instead of
/// talking to a real platform. Used by tests and by the `/debug/send`
/// route so the dispatcher and command plugins are exercisable end-to-end
/// without a live platform.
#[derive(Default)]
pub struct LoopbackPlatform {
    sent: Mutex<Vec<(String, LoopbackDelivery)>>,
}

impl LoopbackPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(String, LoopbackDelivery)> {
        self.sent.lock().unwrap().clone()
    }
}

#[rocket::async_trait]
impl Platform for LoopbackPlatform {
    fn name(&self) -> &'static str {
        "loopback"
    }

    async fn send_text(&self, channel_id: &str, text: &str) -> Result<(), PlatformError> {
        self.sent.lock().unwrap().push((channel_id.to_string(), LoopbackDelivery::Text(text.to_string())));
        Ok(())
    }

    async fn send_image(&self, channel_id: &str, bytes: &[u8]) -> Result<(), PlatformError> {
        self.sent.lock().unwrap().push((channel_id.to_string(), LoopbackDelivery::Image { bytes_len: bytes.len(), alt_text: String::new() }));
        Ok(())
    }
}

/// Registry of configured outbound adapters, keyed by platform name.
/// Managed as Rocket state; `core_app`'s caller looks up the right
/// adapter after `handle_message` returns `BotResponse`s.
#[derive(Default)]
pub struct PlatformRegistry {
    platforms: HashMap<String, Arc<dyn Platform>>,
}

impl PlatformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, platform: Arc<dyn Platform>) {
        self.platforms.insert(platform.name().to_string(), platform);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Platform>> {
        self.platforms.get(name).cloned()
    }
}

/// Bearer token carried by an inbound `/platform/<name>/events` request.
/// Mirrors `routes::AdminKey`'s accept-either-header shape.
pub struct PlatformKey(pub String);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for PlatformKey {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        if let Some(auth) = req.headers().get_one("Authorization")
            && let Some(key) = auth.strip_prefix("Bearer ")
        {
            return Outcome::Success(PlatformKey(key.to_string()));
        }
        if let Some(key) = req.headers().get_one("X-Platform-Key") {
            return Outcome::Success(PlatformKey(key.to_string()));
        }
        Outcome::Forward(Status::Unauthorized)
    }
}

// --- Rocket routes ---

use crate::config::Config;
use crate::core_app::CoreApp;
use crate::models::{BotResponse, GenericMessage, MessageAuthor};
use crate::routes::AdminKey;
use rocket::post;
use rocket::serde::json::Json;
use rocket::State;

/// Inbound events reach CA via one route per platform, bearer-guarded the
/// same way `routes::AdminKey` guards admin endpoints. The body is
/// deserialized straight into `GenericMessage`; `platform` is overwritten
/// from the path segment so a misreporting adapter can't spoof it.
#[post("/platform/<name>/events", format = "json", data = "<body>")]
pub async fn platform_events(
    name: &str,
    key: PlatformKey,
    config: &State<Arc<Config>>,
    core_app: &State<Arc<CoreApp>>,
    registry: &State<Arc<PlatformRegistry>>,
    body: Json<GenericMessage>,
) -> Status {
    let expected = match name {
        "qq" => &config.platforms.qq,
        "kook" => &config.platforms.kook,
        "heybox" => &config.platforms.heybox,
        _ => return Status::NotFound,
    };
    if !expected.enabled || expected.secret.is_empty() || key.0 != expected.secret {
        return Status::Unauthorized;
    }

    let mut msg = body.into_inner();
    msg.platform = name.to_string();
    let channel_id = msg.channel_id.clone();
    let responses = core_app.handle_message(msg).await;

    if let Some(platform) = registry.get(name) {
        for response in responses {
            let result = match response {
                BotResponse::Text(text) => platform.send_text(&channel_id, &text).await,
                BotResponse::Image { bytes, .. } => platform.send_image(&channel_id, &bytes).await,
            };
            if let Err(e) = result {
                tracing::warn!(error = %e, platform = name, "outbound delivery failed");
            }
        }
    }
    Status::Accepted
}

#[derive(serde::Deserialize)]
pub struct DebugSendRequest {
    pub channel_id: String,
    pub content: String,
    #[serde(default)]
    pub author_id: String,
}

/// Admin-key-guarded loopback entry point: feeds a synthetic message
/// through CA and returns the responses inline, so command plugins are
/// exercisable without a live platform connection.
#[post("/platform/debug/send", format = "json", data = "<body>")]
pub async fn debug_send(
    _admin: AdminKey,
    core_app: &State<Arc<CoreApp>>,
    loopback: &State<Arc<LoopbackPlatform>>,
    body: Json<DebugSendRequest>,
) -> Json<Vec<String>> {
    let req = body.into_inner();
    let author_id = if req.author_id.is_empty() { "debug-user".to_string() } else { req.author_id };
    let msg = GenericMessage {
        platform: "loopback".to_string(),
        id: uuid::Uuid::new_v4().to_string(),
        channel_id: req.channel_id.clone(),
        guild_id: None,
        content: req.content,
        author: MessageAuthor { id: author_id, name: "debug".to_string(), is_bot: false },
        timestamp_ms: chrono::Utc::now().timestamp_millis(),
        raw: serde_json::Value::Null,
        extra: serde_json::Value::Null,
    };

    let responses = core_app.handle_message(msg).await;
    let mut out = Vec::with_capacity(responses.len());
    for response in responses {
        match response {
            BotResponse::Text(text) => {
                let _ = loopback.send_text(&req.channel_id, &text).await;
                out.push(text);
            }
            BotResponse::Image { bytes, alt_text } => {
                let _ = loopback.send_image(&req.channel_id, &bytes).await;
                out.push(format!("[image: {alt_text}, {} bytes]", bytes.len()));
            }
        }
    }
    Json(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn loopback_records_text_and_image_sends() {
        let platform = LoopbackPlatform::new();
        platform.send_text("c1", "hello").await.unwrap();
        platform.send_image("c1", &[1, 2, 3]).await.unwrap();
        let sent = platform.sent();
        assert_eq!(sent.len(), 2);
        assert!(matches!(&sent[0].1, LoopbackDelivery::Text(t) if t == "hello"));
        assert!(matches!(&sent[1].1, LoopbackDelivery::Image { bytes_len: 3, .. }));
    }

    #[test]
    fn registry_resolves_registered_platforms_by_name() {
        let mut registry = PlatformRegistry::new();
        registry.insert(Arc::new(LoopbackPlatform::new()));
        assert!(registry.get("loopback").is_some());
        assert!(registry.get("qq").is_none());
    }

}
