//! Shared-services bundle every plugin handler closes over. Grounded on
//! `original_source/core/app.py`'s `CoreApp.__init__` (the single place the
//! original wires season manager, club cache, redis, http client and image
//! manager together before handing them to plugins).

use crate::bind_store::BindStore;
use crate::club_cache::ClubCache;
use crate::config::Config;
use crate::hcc::Hcc;
use crate::image_store::ImageStore;
use crate::kvs::KvStore;
use crate::lock_store::LockStore;
use crate::render::RenderPool;
use crate::season::manager::SeasonManager;
use crate::world_tour::WorldTourCache;
use std::sync::Arc;

pub struct AppContext {
    pub season_manager: Arc<SeasonManager>,
    pub club_cache: Arc<ClubCache>,
    pub world_tour: Arc<WorldTourCache>,
    pub kv: Arc<dyn KvStore>,
    pub hcc: Arc<Hcc>,
    /// `None` when the render pool failed to launch at startup (SPEC_FULL
    /// §4.8: a missing Chromium binary degrades render-backed commands to
    /// text-only rather than taking the whole bot down).
    pub render_pool: Option<Arc<RenderPool>>,
    pub image_store: Arc<ImageStore>,
    pub bind_store: Arc<BindStore>,
    pub lock_store: Arc<LockStore>,
    pub config: Arc<Config>,
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::kvs::FakeKvStore;
    use crate::season::manager::SeasonManager;
    use std::time::Duration;

    /// Minimal context for plugin-dispatch/command unit tests: no network,
    /// no season data loaded, in-memory KVS.
    pub fn fake_context() -> Arc<AppContext> {
        let hcc = Arc::new(Hcc::new("https://127.0.0.1:0".into(), None).unwrap());
        let kv: Arc<dyn KvStore> = Arc::new(FakeKvStore::new());
        Arc::new(AppContext {
            season_manager: Arc::new(SeasonManager::empty()),
            club_cache: ClubCache::new(hcc.clone(), kv.clone(), Duration::from_secs(90)),
            world_tour: WorldTourCache::new(hcc.clone(), kv.clone(), vec!["s6".into()], Duration::from_secs(90)),
            kv,
            hcc,
            render_pool: None,
            image_store: ImageStore::new(std::env::temp_dir().join(format!("pd-test-{:x}", uuid::Uuid::new_v4().as_u128()))).unwrap(),
            bind_store: Arc::new(BindStore::load(std::env::temp_dir().join(format!("pd-test-bind-{:x}", uuid::Uuid::new_v4().as_u128())))),
            lock_store: Arc::new(LockStore::load(std::env::temp_dir().join(format!("pd-test-lock-{:x}", uuid::Uuid::new_v4().as_u128())))),
            config: Arc::new(test_config()),
        })
    }

    fn test_config() -> Config {
        toml::from_str(
            r#"
            [season]
            current = "s6"
            seasons = ["s6"]

            [api]
            standard_base_url = "https://api.example.com/v1"

            [kv]
            host = "127.0.0.1"
        "#,
        )
        .unwrap()
    }
}
