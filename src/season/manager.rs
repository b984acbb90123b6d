//! Process-wide season registry, built once at startup and held in Rocket
//! managed state — not a lazily-constructed singleton the way
//! `original_source/core/season.py`'s `SeasonManager.__new__` is. Grounded
//! on the same file's `SeasonManager` class for the API surface.

use crate::config::SeasonConfig;
use crate::error::BotError;
use crate::ess::Ess;
use crate::hcc::Hcc;
use crate::kvs::KvStore;
use crate::models::PlayerRecord;
use crate::search_index::SearchIndexer;
use crate::season::pipeline::Season;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct SeasonManager {
    seasons: HashMap<String, Arc<Season>>,
    pub search_indexer: Arc<SearchIndexer>,
}

impl SeasonManager {
    /// A registry with no seasons loaded, for call sites (dispatcher unit
    /// tests, fallback wiring) that never query season data.
    pub fn empty() -> Self {
        Self { seasons: HashMap::new(), search_indexer: Arc::new(SearchIndexer::new()) }
    }

    /// `season_display_names` mirrors `SeasonConfig.SEASONS`; any id in
    /// `config.seasons` without an entry falls back to its own id.
    pub async fn initialize(
        config: &SeasonConfig,
        season_display_names: &HashMap<String, String>,
        hcc: Arc<Hcc>,
        kv: Arc<dyn KvStore>,
        data_dir: &Path,
        cancel: CancellationToken,
    ) -> Result<Self, BotError> {
        let search_indexer = Arc::new(SearchIndexer::new());
        let mut seasons = HashMap::new();

        for season_id in &config.seasons {
            let display_name = season_display_names
                .get(season_id)
                .cloned()
                .unwrap_or_else(|| season_id.clone());

            let season: Arc<Season> = if config.is_current(season_id) {
                Season::new_current(
                    season_id.clone(),
                    display_name,
                    hcc.clone(),
                    kv.clone(),
                    search_indexer.clone(),
                    Duration::from_secs(config.update_interval_secs),
                    config.player_ttl_multiplier,
                )
            } else {
                let db_path = data_dir.join(format!("season_{season_id}.db"));
                let ess = Ess::open(&db_path, cancel.clone())?;
                Season::new_historical(season_id.clone(), display_name, hcc.clone(), ess)
            };

            season.initialize(cancel.clone()).await?;
            seasons.insert(season_id.to_lowercase(), season);
        }

        Ok(Self { seasons, search_indexer })
    }

    pub fn get_season(&self, season_id: &str) -> Option<&Arc<Season>> {
        self.seasons.get(&season_id.to_lowercase())
    }

    pub fn all_season_ids(&self) -> Vec<String> {
        self.seasons.keys().cloned().collect()
    }

    pub async fn get_player_data(
        &self,
        player_name: &str,
        season_id: &str,
        use_fuzzy_search: bool,
    ) -> Result<Option<PlayerRecord>, BotError> {
        match self.get_season(season_id) {
            Some(season) => season.get_player_data(player_name, use_fuzzy_search).await,
            None => Err(BotError::NotFound(format!("unknown season {season_id}"))),
        }
    }

    pub async fn get_top_players(&self, season_id: &str, limit: usize) -> Result<Vec<String>, BotError> {
        match self.get_season(season_id) {
            Some(season) => season.get_top_players(limit).await,
            None => Ok(vec![]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kvs::FakeKvStore;

    fn test_config() -> SeasonConfig {
        SeasonConfig {
            current: "s6".into(),
            seasons: vec!["s6".into()],
            update_interval_secs: 90,
            player_ttl_multiplier: 2,
        }
    }

    #[tokio::test]
    async fn initialize_registers_current_season_and_fails_gracefully_without_network() {
        let config = test_config();
        let names = HashMap::from([("s6".to_string(), "Season 6".to_string())]);
        let hcc = Arc::new(Hcc::new("https://127.0.0.1:1".into(), None).unwrap());
        let kv: Arc<dyn KvStore> = Arc::new(FakeKvStore::new());
        let tmp = std::env::temp_dir().join(format!("sm-test-{:x}", uuid::Uuid::new_v4().as_u128()));

        // Network is unreachable; update_data's first fetch fails, so
        // initialize() propagates the error rather than silently
        // registering a season with no data.
        let result = SeasonManager::initialize(&config, &names, hcc, kv, &tmp, CancellationToken::new()).await;
        assert!(result.is_err());
    }
}
