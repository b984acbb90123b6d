pub mod announcement;
pub mod bind_store;
pub mod club_cache;
pub mod config;
pub mod context;
pub mod core_app;
pub mod error;
pub mod ess;
pub mod hcc;
pub mod image_store;
pub mod kvs;
pub mod lock_store;
pub mod models;
pub mod persistence;
pub mod platform;
pub mod plugin;
pub mod render;
pub mod routes;
pub mod search_index;
pub mod season;
pub mod world_tour;

use announcement::AnnouncementScheduler;
use club_cache::ClubCache;
use config::Config;
use context::AppContext;
use core_app::CoreApp;
use hcc::Hcc;
use image_store::ImageStore;
use kvs::{KvStore, RedisStore};
use platform::{HttpPlatform, LoopbackPlatform, Platform, PlatformRegistry};
use render::pool::ChromeRenderer;
use render::RenderPool;
use rocket::fs::NamedFile;
use rocket::serde::json::Json;
use rocket_cors::CorsOptions;
use season::manager::SeasonManager;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use world_tour::WorldTourCache;

#[rocket::get("/api/v1/health")]
fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "the-finals-leaderboard-bot",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

#[rocket::get("/api/v1/stats")]
fn stats(core_app: &rocket::State<Arc<CoreApp>>, season_manager: &rocket::State<Arc<SeasonManager>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "commands": core_app.command_list().len(),
        "seasons": season_manager.all_season_ids(),
    }))
}

/// `/static/<path>` NamedFile fallback, the one piece of static serving
/// this bot still needs (rendered-template assets, weapon reference image).
#[rocket::get("/static/<file..>")]
async fn static_file(file: PathBuf) -> Option<NamedFile> {
    NamedFile::open(Path::new("static").join(file)).await.ok()
}

/// Builds the full managed-state bundle: HCC, KVS, SM, CC, RP (best
/// effort), IS, bind/lock stores, wired into one `AppContext`. Grounded on
/// `original_source/core/app.py`'s `CoreApp.__init__`/`initialize`, the
/// single place the original wires the same services together.
async fn build_context(config: Arc<Config>, cancel: CancellationToken) -> Result<Arc<AppContext>, error::BotError> {
    let data_dir = PathBuf::from(&config.data_dir);
    std::fs::create_dir_all(&data_dir).map_err(|e| error::BotError::Internal(format!("failed to create data dir: {e}")))?;

    let hcc = Arc::new(Hcc::new(config.api.standard_base_url.clone(), config.api.backup_base_url.clone())?);

    let kv: Arc<dyn KvStore> = Arc::new(RedisStore::new(&config.kv.url())?);

    let season_manager = Arc::new(
        SeasonManager::initialize(&config.season, &HashMap::new(), hcc.clone(), kv.clone(), &data_dir, cancel.clone()).await?,
    );

    let club_cache = ClubCache::new(hcc.clone(), kv.clone(), std::time::Duration::from_secs(config.season.update_interval_secs));
    club_cache.initialize(cancel.clone()).await?;

    let world_tour =
        WorldTourCache::new(hcc.clone(), kv.clone(), config.season.seasons.clone(), std::time::Duration::from_secs(config.season.update_interval_secs));
    world_tour.initialize(cancel.clone()).await?;

    let render_pool = match ChromeRenderer::launch() {
        Ok(renderer) => match RenderPool::new(Arc::new(renderer)).await {
            Ok(pool) => Some(Arc::new(pool)),
            Err(e) => {
                tracing::warn!(error = %e, "render pool failed to initialize, image commands degrade to text");
                None
            }
        },
        Err(e) => {
            tracing::warn!(error = %e, "headless chromium failed to launch, image commands degrade to text");
            None
        }
    };

    let image_store = ImageStore::new(&config.image_dir)?;
    image_store.spawn_eviction_loop(cancel.clone());

    let bind_store = Arc::new(bind_store::BindStore::load(data_dir.join("user_binds.json")));
    let lock_store = Arc::new(lock_store::LockStore::load(data_dir.join("id_locks.json")));

    Ok(Arc::new(AppContext {
        season_manager,
        club_cache,
        world_tour,
        kv,
        hcc,
        render_pool,
        image_store,
        bind_store,
        lock_store,
        config,
    }))
}

fn build_platform_registry(config: &Config, image_store: Arc<ImageStore>) -> (PlatformRegistry, Arc<LoopbackPlatform>) {
    let mut registry = PlatformRegistry::new();
    let loopback = Arc::new(LoopbackPlatform::new());
    registry.insert(loopback.clone());

    for (name, platform_config) in [("qq", &config.platforms.qq), ("kook", &config.platforms.kook), ("heybox", &config.platforms.heybox)] {
        if !platform_config.enabled {
            continue;
        }
        let mut adapter = HttpPlatform::new(name, platform_config);
        if config.image_send_method == config::ImageSendMethod::Url
            && let Some(base_url) = &config.public_base_url
        {
            adapter = adapter.with_url_delivery(image_store.clone(), base_url.clone());
        }
        registry.insert(Arc::new(adapter));
    }
    (registry, loopback)
}

pub async fn rocket() -> rocket::Rocket<rocket::Build> {
    let config = Arc::new(Config::load_from_env().expect("failed to load configuration"));
    build_rocket(config).await
}

pub async fn build_rocket(config: Arc<Config>) -> rocket::Rocket<rocket::Build> {
    let cancel = CancellationToken::new();

    let ctx = build_context(config.clone(), cancel.clone()).await.expect("failed to initialize app context");
    let announcements = Arc::new(AnnouncementScheduler::load(&config.announcements, config.data_dir.clone()));
    let core_app = Arc::new(
        CoreApp::new(ctx.clone())
            .expect("failed to build plugin dispatcher")
            .with_announcements(announcements.clone()),
    );
    let (platform_registry, loopback) = build_platform_registry(&config, ctx.image_store.clone());
    let platform_registry = Arc::new(platform_registry);
    let season_manager = ctx.season_manager.clone();
    let image_store = ctx.image_store.clone();

    let cors = CorsOptions::default().to_cors().expect("failed to build CORS");

    rocket::build()
        .manage(ctx)
        .manage(core_app)
        .manage(announcements)
        .manage(platform_registry)
        .manage(loopback)
        .manage(season_manager)
        .manage(image_store)
        .manage(config)
        .attach(cors)
        .mount(
            "/",
            rocket::routes![
                health,
                stats,
                static_file,
                image_store::serve_image,
                platform::platform_events,
                platform::debug_send,
            ],
        )
        .attach(rocket::fairing::AdHoc::on_shutdown("Background task shutdown", move |_rocket| {
            Box::pin(async move {
                cancel.cancel();
                println!("🛑 background refresh loops signaled to stop");
            })
        }))
}
