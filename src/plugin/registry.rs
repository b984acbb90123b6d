//! Explicit, compile-time plugin list. Replaces
//! `original_source/core/plugin.py`'s `auto_discover_plugins` directory
//! scan, which has no meaningful Rust equivalent — every command-plugin
//! module is named here instead of discovered at runtime.

use super::commands::{about, ask, bind, club, deep_search, flappy_bird, h2h, leaderboard, lock, mode_query, rank, weapon, why, world_tour};
use super::PluginManager;
use crate::context::AppContext;
use crate::error::BotResult;
use std::sync::Arc;

/// Builds a `PluginManager` with every command plugin registered, in a
/// fixed order. Registration order only matters for keyword/regex
/// fallthrough (PD routes exact commands by name lookup regardless of
/// order); plugins are listed roughly in the order their commands appear
/// in `/help`.
pub fn build(ctx: Arc<AppContext>) -> BotResult<PluginManager> {
    let mut manager = PluginManager::new(ctx);
    manager.register(about::plugin())?;
    manager.register(bind::plugin())?;
    manager.register(lock::plugin())?;
    manager.register(rank::plugin())?;
    manager.register(mode_query::plugin())?;
    manager.register(leaderboard::plugin())?;
    manager.register(h2h::plugin())?;
    manager.register(world_tour::plugin())?;
    manager.register(club::plugin())?;
    manager.register(deep_search::plugin())?;
    manager.register(weapon::plugin())?;
    manager.register(flappy_bird::plugin())?;
    manager.register(ask::plugin())?;
    manager.register(why::plugin())?;
    Ok(manager)
}
