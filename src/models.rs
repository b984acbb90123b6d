use serde::{Deserialize, Serialize};

/// Immutable within one refresh cycle. Superseded atomically at the next
/// refresh; never mutated in place.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerRecord {
    /// Canonical form `"Handle#1234"`.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steam: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub psn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xbox: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub club_tag: Option<String>,
    pub rank: i64,
    /// Unified from `rankScore` or legacy `fame`.
    pub score: i64,
    /// Signed delta from the previous snapshot; derived locally if the
    /// upstream payload omits it (SPEC_FULL §4.13 item 2).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change: Option<i64>,
    #[serde(default)]
    pub platforms: Vec<String>,
}

impl PlayerRecord {
    /// The part of `name` before `#`, used for search/matching.
    pub fn handle(&self) -> &str {
        self.name.split('#').next().unwrap_or(&self.name)
    }

    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        [self.steam.as_deref(), self.psn.as_deref(), self.xbox.as_deref()]
            .into_iter()
            .flatten()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SeasonKind {
    Current,
    Historical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeasonSnapshot {
    pub season_id: String,
    pub kind: SeasonKind,
    pub fetched_at: chrono::DateTime<chrono::Utc>,
    pub players: Vec<PlayerRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClubMember {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClubModeStanding {
    pub mode: String,
    pub rank: i64,
    pub total_value: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClubRecord {
    pub club_tag: String,
    pub members: Vec<ClubMember>,
    #[serde(default)]
    pub standings: Vec<ClubModeStanding>,
}

/// `{id: UUIDv4, path, created_at, expires_at, size}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: String,
    pub path: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    pub size: u64,
}

/// Platform-agnostic inbound event. Created by a platform adapter, consumed
/// exactly once by CA/PD. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageAuthor {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub is_bot: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenericMessage {
    pub platform: String,
    pub id: String,
    pub channel_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<String>,
    pub content: String,
    pub author: MessageAuthor,
    pub timestamp_ms: i64,
    #[serde(default)]
    pub raw: serde_json::Value,
    #[serde(default)]
    pub extra: serde_json::Value,
}

/// What a command handler hands back to CA/the platform adapter.
#[derive(Debug, Clone)]
pub enum BotResponse {
    Text(String),
    Image { bytes: Vec<u8>, alt_text: String },
}

/// `{plugin_name → {key → value}}`. Each plugin reads/writes only its own
/// namespace via the `PluginData` handle (see `plugin::registry`).
pub type PluginDataMap = std::collections::HashMap<String, serde_json::Value>;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BindRecord {
    /// platform_user_id -> canonical player name, one map per platform.
    pub binds: std::collections::HashMap<String, String>,
}
