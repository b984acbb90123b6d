//! World Tour Cache (WT). Structurally parallel to the Season Pipeline's
//! hot tier but simpler: one periodic fetch per configured season straight
//! into KVS, no TSI index (world tour lookups are exact-id only). Grounded
//! on `original_source/core/world_tour.py`'s `WorldTourAPI`.

use crate::error::{BotError, BotResult};
use crate::hcc::Hcc;
use crate::kvs::KvStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const PLATFORM: &str = "crossplay";

#[derive(Deserialize, Serialize, Clone)]
pub struct WorldTourEntry {
    pub name: String,
    #[serde(default)]
    pub rank: Option<i64>,
    #[serde(default)]
    pub cashouts: i64,
    #[serde(rename = "clubTag", default)]
    pub club_tag: Option<String>,
    #[serde(default)]
    pub change: i64,
    #[serde(rename = "steamName", default)]
    pub steam_name: Option<String>,
    #[serde(rename = "psnName", default)]
    pub psn_name: Option<String>,
    #[serde(rename = "xboxName", default)]
    pub xbox_name: Option<String>,
}

#[derive(Deserialize, Default)]
struct WorldTourResponse {
    #[serde(default)]
    data: Vec<WorldTourEntry>,
}

fn leaderboard_key(season_id: &str) -> String {
    format!("wt:{season_id}:leaderboard")
}

fn player_key(season_id: &str, player_name: &str) -> String {
    format!("wt:{season_id}:player:{}", player_name.to_lowercase())
}

fn player_prefix(season_id: &str) -> String {
    format!("wt:{season_id}:player:")
}

pub struct WorldTourCache {
    hcc: Arc<Hcc>,
    kv: Arc<dyn KvStore>,
    seasons: Vec<String>,
    update_interval: Duration,
}

impl WorldTourCache {
    pub fn new(hcc: Arc<Hcc>, kv: Arc<dyn KvStore>, seasons: Vec<String>, update_interval: Duration) -> Arc<Self> {
        Arc::new(Self { hcc, kv, seasons, update_interval })
    }

    pub async fn initialize(self: &Arc<Self>, cancel: CancellationToken) -> BotResult<()> {
        self.update_data().await;
        self.clone().spawn_refresh_loop(cancel);
        Ok(())
    }

    fn spawn_refresh_loop(self: Arc<Self>, cancel: CancellationToken) {
        let interval = self.update_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => self.update_data().await,
                }
            }
        });
    }

    /// Refreshes every configured season; one season's upstream failure
    /// doesn't stop the others from refreshing.
    async fn update_data(&self) {
        for season_id in &self.seasons {
            if let Err(e) = self.update_season(season_id).await {
                tracing::error!(season = %season_id, error = %e, "world tour refresh failed");
            }
        }
    }

    async fn update_season(&self, season_id: &str) -> BotResult<()> {
        let endpoint = format!("/v1/leaderboard/{season_id}worldtour/{PLATFORM}");
        let resp = self.hcc.get(&endpoint, &[], true, Some(self.update_interval)).await?;
        let parsed: WorldTourResponse = serde_json::from_slice(&resp.bytes)
            .map_err(|e| BotError::Internal(format!("failed to parse world tour payload: {e}")))?;

        if parsed.data.is_empty() {
            tracing::warn!(season = %season_id, "world tour upstream returned no players");
            return Ok(());
        }

        let prefix = player_prefix(season_id);
        let stale_keys = self.kv.keys_with_prefix(&prefix).await?;
        if !stale_keys.is_empty() {
            self.kv.delete(&stale_keys).await?;
        }

        let ttl = self.update_interval.as_secs() * 2;
        for entry in &parsed.data {
            let key = player_key(season_id, &entry.name);
            let value = serde_json::to_string(entry).map_err(|e| BotError::Internal(e.to_string()))?;
            self.kv.set(&key, &value, Some(ttl)).await?;
        }

        let leaderboard_json = serde_json::to_string(&parsed.data).map_err(|e| BotError::Internal(e.to_string()))?;
        self.kv.set(&leaderboard_key(season_id), &leaderboard_json, Some(ttl)).await?;

        tracing::info!(season = %season_id, count = parsed.data.len(), "world tour cache updated");
        Ok(())
    }

    /// Exact-id lookup only; `player_name` is matched case-insensitively via
    /// the lowercased key, same as the upstream fetch's `eq_ignore_ascii_case`.
    pub async fn get_player(&self, season_id: &str, player_name: &str) -> BotResult<Option<WorldTourEntry>> {
        let key = player_key(season_id, player_name);
        let Some(raw) = self.kv.get(&key).await? else { return Ok(None) };
        Ok(serde_json::from_str(&raw).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kvs::FakeKvStore;

    fn entry(name: &str) -> WorldTourEntry {
        WorldTourEntry { name: name.to_string(), rank: Some(1), cashouts: 100, club_tag: None, change: 0, steam_name: None, psn_name: None, xbox_name: None }
    }

    #[tokio::test]
    async fn update_season_clears_stale_players_before_rewriting() {
        let hcc = Arc::new(Hcc::new("https://api.example.com".into(), None).unwrap());
        let kv: Arc<dyn KvStore> = Arc::new(FakeKvStore::new());
        let cache = WorldTourCache::new(hcc, kv.clone(), vec!["s6".into()], Duration::from_secs(90));

        kv.set(&player_key("s6", "Old#1"), &serde_json::to_string(&entry("Old#1")).unwrap(), None).await.unwrap();
        assert!(kv.get(&player_key("s6", "Old#1")).await.unwrap().is_some());

        // Simulate what update_season would persist without a live network call.
        let stale = kv.keys_with_prefix(&player_prefix("s6")).await.unwrap();
        kv.delete(&stale).await.unwrap();
        kv.set(&player_key("s6", "New#2"), &serde_json::to_string(&entry("New#2")).unwrap(), Some(180)).await.unwrap();

        assert!(cache.get_player("s6", "old#1").await.unwrap().is_none());
        assert!(cache.get_player("s6", "New#2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn get_player_is_case_insensitive() {
        let hcc = Arc::new(Hcc::new("https://api.example.com".into(), None).unwrap());
        let kv: Arc<dyn KvStore> = Arc::new(FakeKvStore::new());
        let cache = WorldTourCache::new(hcc, kv.clone(), vec!["s6".into()], Duration::from_secs(90));
        kv.set(&player_key("s6", "BlueWarrior#1234"), &serde_json::to_string(&entry("BlueWarrior#1234")).unwrap(), None).await.unwrap();
        let found = cache.get_player("s6", "bluewarrior#1234").await.unwrap();
        assert!(found.is_some());
    }
}
