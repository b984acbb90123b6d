//! One module per command-plugin family, each exposing a `plugin() -> Plugin`
//! constructor consumed by `plugin::registry`.

pub mod about;
pub mod ask;
pub mod bind;
pub mod club;
pub mod deep_search;
pub mod flappy_bird;
pub mod h2h;
pub mod leaderboard;
pub mod lock;
pub mod mode_query;
pub mod rank;
pub mod weapon;
pub mod why;
pub mod world_tour;

/// Shared formatting/lookup helpers used by several command plugins.
pub(crate) mod shared {
    use crate::context::AppContext;
    use crate::models::PlayerRecord;
    use std::sync::Arc;

    /// Resolves the player name a command should operate on: an explicit
    /// argument wins, otherwise falls back to the caller's bound id.
    /// Mirrors the `parts = content.split(maxsplit=1)` / bound-id-fallback
    /// pattern repeated across `rank_plugin.py`, `quick_cash_plugin.py`,
    /// `death_match_plugin.py`, `powershift_plugin.py`.
    pub fn resolve_player_arg(ctx: &AppContext, user_id: &str, args: &str) -> Option<String> {
        let trimmed = args.trim();
        if !trimmed.is_empty() {
            return Some(trimmed.to_string());
        }
        ctx.bind_store.get(user_id)
    }

    pub fn format_score(score: i64) -> String {
        let negative = score < 0;
        let digits = score.unsigned_abs().to_string();
        let mut out = String::new();
        for (i, c) in digits.chars().rev().enumerate() {
            if i > 0 && i % 3 == 0 {
                out.push(',');
            }
            out.push(c);
        }
        let grouped: String = out.chars().rev().collect();
        if negative { format!("-{grouped}") } else { grouped }
    }

    pub fn format_change(change: Option<i64>) -> String {
        match change {
            Some(c) if c > 0 => format!("▲{}", format_score(c)),
            Some(c) if c < 0 => format!("▼{}", format_score(-c)),
            Some(_) => "-".to_string(),
            None => "-".to_string(),
        }
    }

    /// Exact id lookup first (so a fully-qualified `Name#1234` never gets
    /// overridden by a fuzzy near-match), falling back to fuzzy resolution
    /// against the trigram index, replicating the two-phase lookup every
    /// query-style plugin in the source performs via `season.get_player_data`.
    pub async fn lookup_player(
        ctx: &Arc<AppContext>,
        season_id: &str,
        name: &str,
    ) -> crate::error::BotResult<Option<PlayerRecord>> {
        if let Some(player) = ctx.season_manager.get_player_data(name, season_id, false).await? {
            return Ok(Some(player));
        }
        ctx.season_manager.get_player_data(name, season_id, true).await
    }

    pub const SEPARATOR: &str = "━━━━━━━━━━━━━";
}
