//! A single season's fetch/store/query behavior. Current season: periodic
//! refresh into KVS plus a TSI rebuild. Historical season: one-time
//! populate into an ESS file. Grounded on `original_source/core/season.py`'s
//! `Season`/`HistorySeason` (the distinction collapses into `kind` here
//! rather than two classes, since the only difference is storage and
//! refresh cadence).

use crate::error::{BotError, BotResult};
use crate::ess::Ess;
use crate::hcc::Hcc;
use crate::kvs::KvStore;
use crate::models::{PlayerRecord, SeasonKind};
use crate::search_index::SearchIndexer;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const API_PREFIX: &str = "/v1/leaderboard";
const TOP_PLAYERS_COUNT: usize = 5;
const BATCH_SIZE: usize = 100;

fn is_cb_season(season_id: &str) -> bool {
    season_id.to_lowercase().starts_with("cb")
}

fn api_path(season_id: &str) -> String {
    if is_cb_season(season_id) {
        format!("{API_PREFIX}/{season_id}")
    } else {
        format!("{API_PREFIX}/{season_id}/crossplay")
    }
}

#[derive(Deserialize)]
struct UpstreamEnvelope {
    #[serde(default)]
    data: Vec<UpstreamPlayer>,
}

#[derive(Deserialize)]
struct UpstreamPlayer {
    name: String,
    rank: i64,
    #[serde(default, rename = "rankScore")]
    rank_score: Option<i64>,
    #[serde(default)]
    fame: Option<i64>,
    #[serde(default, rename = "steamName")]
    steam_name: Option<String>,
    #[serde(default, rename = "psnName")]
    psn_name: Option<String>,
    #[serde(default, rename = "xboxName")]
    xbox_name: Option<String>,
    #[serde(default, rename = "clubTag")]
    club_tag: Option<String>,
    #[serde(default)]
    platforms: Vec<String>,
}

enum Storage {
    Hot { kv: Arc<dyn KvStore>, indexer: Arc<SearchIndexer> },
    Cold { ess: Arc<Ess> },
}

pub struct Season {
    pub season_id: String,
    pub display_name: String,
    pub kind: SeasonKind,
    hcc: Arc<Hcc>,
    storage: Storage,
    update_interval: Duration,
    /// Multiplier applied to `update_interval` for the `player:{name}` KV
    /// TTL (SPEC_FULL §4.13 item 1: kept parameterizable rather than a
    /// hard-coded `* 2`). Unused for historical seasons, which have no TTL.
    player_ttl_multiplier: u32,
    /// Previous fetch's `name -> rank` snapshot, used to derive `change`
    /// locally (SPEC_FULL §4.13 item 2) rather than trust an upstream field.
    previous_ranks: RwLock<Option<HashMap<String, i64>>>,
}

impl Season {
    pub fn new_current(
        season_id: String,
        display_name: String,
        hcc: Arc<Hcc>,
        kv: Arc<dyn KvStore>,
        indexer: Arc<SearchIndexer>,
        update_interval: Duration,
        player_ttl_multiplier: u32,
    ) -> Arc<Self> {
        Arc::new(Self {
            season_id,
            display_name,
            kind: SeasonKind::Current,
            hcc,
            storage: Storage::Hot { kv, indexer },
            update_interval,
            player_ttl_multiplier,
            previous_ranks: RwLock::new(None),
        })
    }

    pub fn new_historical(season_id: String, display_name: String, hcc: Arc<Hcc>, ess: Arc<Ess>) -> Arc<Self> {
        Arc::new(Self {
            season_id,
            display_name,
            kind: SeasonKind::Historical,
            hcc,
            storage: Storage::Cold { ess },
            update_interval: Duration::ZERO,
            player_ttl_multiplier: 2,
            previous_ranks: RwLock::new(None),
        })
    }

    /// Fetches once; for a current season, also spawns the periodic
    /// refresh loop. Historical seasons that already hold data skip the
    /// fetch entirely (spec §4.6: one-time populate).
    pub async fn initialize(self: &Arc<Self>, cancel: CancellationToken) -> BotResult<()> {
        match &self.storage {
            Storage::Cold { ess } => {
                if ess.is_empty()? {
                    self.update_data().await?;
                }
            }
            Storage::Hot { .. } => {
                self.update_data().await?;
                self.clone().spawn_refresh_loop(cancel);
            }
        }
        Ok(())
    }

    fn spawn_refresh_loop(self: Arc<Self>, cancel: CancellationToken) {
        let interval = self.update_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately; skip it, initialize() already fetched once
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = self.update_data().await {
                            tracing::error!(season = %self.season_id, error = %e, "season refresh failed");
                        }
                    }
                }
            }
        });
    }

    pub async fn update_data(&self) -> BotResult<()> {
        let start = std::time::Instant::now();
        let path = api_path(&self.season_id);
        let resp = self.hcc.get(&path, &[], true, None).await?;
        let envelope: UpstreamEnvelope = serde_json::from_slice(&resp.bytes)
            .map_err(|e| BotError::Internal(format!("failed to parse upstream leaderboard payload: {e}")))?;

        if envelope.data.is_empty() {
            tracing::warn!(season = %self.season_id, "upstream returned no players");
            return Ok(());
        }

        let players = self.apply_rank_change(envelope.data);
        tracing::info!(season = %self.season_id, count = players.len(), "fetched season data");

        match &self.storage {
            Storage::Hot { kv, indexer } => {
                indexer.build_index(&players);
                self.store_hot(kv, &players).await?;
            }
            Storage::Cold { ess } => {
                ess.bulk_insert(&players)?;
            }
        }

        tracing::info!(
            season = %self.season_id,
            duration_ms = start.elapsed().as_millis() as u64,
            "season update complete"
        );
        Ok(())
    }

    fn apply_rank_change(&self, upstream: Vec<UpstreamPlayer>) -> Vec<PlayerRecord> {
        let mut previous = self.previous_ranks.write().unwrap();
        let previous_map = previous.clone();

        let mut next_map = HashMap::with_capacity(upstream.len());
        let players: Vec<PlayerRecord> = upstream
            .into_iter()
            .map(|p| {
                let score = p.rank_score.or(p.fame).unwrap_or(0);
                let change = previous_map
                    .as_ref()
                    .and_then(|prev| prev.get(&p.name))
                    .map(|&old_rank| old_rank - p.rank);
                next_map.insert(p.name.clone(), p.rank);
                PlayerRecord {
                    name: p.name,
                    steam: p.steam_name,
                    psn: p.psn_name,
                    xbox: p.xbox_name,
                    club_tag: p.club_tag,
                    rank: p.rank,
                    score,
                    change,
                    platforms: p.platforms,
                }
            })
            .collect();

        *previous = Some(next_map);
        players
    }

    async fn store_hot(&self, kv: &Arc<dyn KvStore>, players: &[PlayerRecord]) -> BotResult<()> {
        let player_prefix = format!("season:{}:player:", self.season_id);
        let stale_keys = kv.keys_with_prefix(&player_prefix).await?;
        if !stale_keys.is_empty() {
            kv.delete(&stale_keys).await?;
        }

        let ttl = self.update_interval.as_secs() * self.player_ttl_multiplier as u64;
        for batch in players.chunks(BATCH_SIZE) {
            let mut items = Vec::with_capacity(batch.len());
            for player in batch {
                let key = format!("season:{}:player:{}", self.season_id, player.handle().to_lowercase());
                let value = serde_json::to_string(player)
                    .map_err(|e| BotError::Internal(format!("failed to serialize player: {e}")))?;
                items.push((key, value, Some(ttl)));
            }
            kv.pipelined_set(&items).await?;
        }

        let top: Vec<&str> = players.iter().take(TOP_PLAYERS_COUNT).map(|p| p.name.as_str()).collect();
        let top_json = serde_json::to_string(&top).map_err(|e| BotError::Internal(e.to_string()))?;
        kv.set(
            &format!("season:{}:top_players", self.season_id),
            &top_json,
            Some(self.update_interval.as_secs()),
        )
        .await
    }

    pub async fn get_player_data(&self, player_name: &str, use_fuzzy_search: bool) -> BotResult<Option<PlayerRecord>> {
        match &self.storage {
            Storage::Hot { kv, indexer } => {
                let key = format!("season:{}:player:{}", self.season_id, player_name.to_lowercase());
                if let Some(raw) = kv.get(&key).await? {
                    if let Ok(player) = serde_json::from_str(&raw) {
                        return Ok(Some(player));
                    }
                }
                if use_fuzzy_search {
                    let hits = indexer.search(player_name, 1);
                    if let Some((_, player)) = hits.into_iter().next() {
                        return Ok(Some(player));
                    }
                }
                Ok(None)
            }
            Storage::Cold { ess } => ess.get_player(player_name, use_fuzzy_search).await,
        }
    }

    pub async fn get_top_players(&self, limit: usize) -> BotResult<Vec<String>> {
        match &self.storage {
            Storage::Hot { kv, .. } => {
                let raw = kv.get(&format!("season:{}:top_players", self.season_id)).await?;
                let Some(raw) = raw else { return Ok(vec![]) };
                let names: Vec<String> = serde_json::from_str(&raw).unwrap_or_default();
                Ok(names.into_iter().take(limit).collect())
            }
            Storage::Cold { ess } => ess.top_players(limit as i64).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kvs::FakeKvStore;

    fn player(name: &str, rank: i64) -> PlayerRecord {
        PlayerRecord { name: name.to_string(), steam: None, psn: None, xbox: None, club_tag: None, rank, score: 100, change: None, platforms: vec![] }
    }

    #[test]
    fn api_path_appends_crossplay_for_non_cb_seasons() {
        assert_eq!(api_path("s6"), "/v1/leaderboard/s6/crossplay");
        assert_eq!(api_path("cb1"), "/v1/leaderboard/cb1");
    }

    #[tokio::test]
    async fn hot_storage_round_trips_and_derives_rank_change() {
        let kv: Arc<dyn KvStore> = Arc::new(FakeKvStore::new());
        let indexer = Arc::new(SearchIndexer::new());
        let hcc = Arc::new(Hcc::new("https://api.example.com".into(), None).unwrap());
        let season = Season::new_current("s6".into(), "Season 6".into(), hcc, kv.clone(), indexer, Duration::from_secs(90), 2);

        let first_pass = season.apply_rank_change(vec![UpstreamPlayer {
            name: "Alpha#0001".into(), rank: 5, rank_score: Some(1000), fame: None,
            steam_name: None, psn_name: None, xbox_name: None, club_tag: None, platforms: vec![],
        }]);
        assert_eq!(first_pass[0].change, None);
        season.store_hot(&kv, &first_pass).await.unwrap();

        let second_pass = season.apply_rank_change(vec![UpstreamPlayer {
            name: "Alpha#0001".into(), rank: 3, rank_score: Some(1200), fame: None,
            steam_name: None, psn_name: None, xbox_name: None, club_tag: None, platforms: vec![],
        }]);
        assert_eq!(second_pass[0].change, Some(2));

        let found = season.get_player_data("alpha#0001", false).await.unwrap();
        assert_eq!(found.unwrap().rank, 5); // still first_pass since we stored before second apply
    }

    #[tokio::test]
    async fn store_hot_clears_stale_players_before_rewriting() {
        let kv: Arc<dyn KvStore> = Arc::new(FakeKvStore::new());
        let indexer = Arc::new(SearchIndexer::new());
        let hcc = Arc::new(Hcc::new("https://api.example.com".into(), None).unwrap());
        let season = Season::new_current("s6".into(), "Season 6".into(), hcc, kv.clone(), indexer, Duration::from_secs(90), 2);

        season.store_hot(&kv, &[player("Old#1", 1)]).await.unwrap();
        assert!(kv.get("season:s6:player:old#1").await.unwrap().is_some());

        season.store_hot(&kv, &[player("New#2", 1)]).await.unwrap();
        assert!(kv.get("season:s6:player:old#1").await.unwrap().is_none());
        assert!(kv.get("season:s6:player:new#2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn top_players_respects_limit() {
        let kv: Arc<dyn KvStore> = Arc::new(FakeKvStore::new());
        let indexer = Arc::new(SearchIndexer::new());
        let hcc = Arc::new(Hcc::new("https://api.example.com".into(), None).unwrap());
        let season = Season::new_current("s6".into(), "Season 6".into(), hcc, kv.clone(), indexer, Duration::from_secs(90), 2);
        let players = vec![player("A#1", 1), player("B#2", 2), player("C#3", 3)];
        season.store_hot(&kv, &players).await.unwrap();
        let top = season.get_top_players(2).await.unwrap();
        assert_eq!(top, vec!["A#1".to_string(), "B#2".to_string()]);
    }
}
