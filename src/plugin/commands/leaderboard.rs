//! `/lb <id> [days]`. Grounded on
//! `original_source/plugins/leaderboard_plugin.py` and
//! `original_source/core/leaderboard.py`'s `LeaderboardCore`.
//!
//! Scope reduction: ESS only retains one snapshot per season, not a
//! per-day time series, so there's no history to chart. This renders a
//! current rank/score summary instead of `generate_trend_chart`'s line
//! graph — the `[days]` argument is still parsed and range-validated
//! (1-30) for compatibility, it just doesn't change what's returned.

use super::shared::{format_score, lookup_player, SEPARATOR};
use crate::context::AppContext;
use crate::error::BotResult;
use crate::models::{BotResponse, GenericMessage};
use crate::plugin::{h, Plugin, PluginBuilder};
use std::sync::Arc;

fn usage() -> String {
    format!(
        "\n💡 排位分数走势查询使用说明\n{SEPARATOR}\n▎用法: /lb <玩家ID> [天数]\n▎示例: /lb BlueWarrior 7\n{SEPARATOR}\n\
         💡 提示:\n1. 天数参数可选，默认7天\n2. 绑定ID后可直接查询\n3. 支持查询1-30天的数据\n{SEPARATOR}"
    )
}

/// Splits `content` into (player_id, remaining_args) the way the source
/// does: a leading `#`-bearing token is the id, otherwise the first
/// whitespace-separated token is, with an all-digits first token treated
/// as the day count when a bound id exists.
fn split_args<'a>(content: &'a str, bound_id: Option<&str>) -> (Option<String>, Vec<&'a str>) {
    let parts: Vec<&str> = content.split_whitespace().collect();
    if parts.is_empty() {
        return (bound_id.map(str::to_string), vec![]);
    }
    if parts[0].chars().all(|c| c.is_ascii_digit()) && bound_id.is_some() {
        return (bound_id.map(str::to_string), parts);
    }
    if let Some(idx) = parts.iter().position(|p| p.contains('#')) {
        return (Some(parts[idx].to_string()), parts[idx + 1..].to_vec());
    }
    (Some(parts[0].to_string()), parts[1..].to_vec())
}

async fn leaderboard(ctx: Arc<AppContext>, msg: GenericMessage, args: String) -> BotResult<Vec<BotResponse>> {
    let bound_id = ctx.bind_store.get(&msg.author.id);
    let content = args.trim();

    if content.is_empty() && bound_id.is_none() {
        return Ok(vec![BotResponse::Text(usage())]);
    }

    let (player_id, remaining) = split_args(content, bound_id.as_deref());
    let Some(player_id) = player_id else {
        return Ok(vec![BotResponse::Text(format!(
            "\n⚠️ 未提供玩家ID\n{SEPARATOR}\n💡 提示:\n1. 请使用 /bind 绑定你的embark id\n2. 或直接输入要查询的玩家ID\n{SEPARATOR}"
        ))]);
    };

    if let Some(days_str) = remaining.first() {
        match days_str.parse::<i64>() {
            Ok(days) if !(1..=30).contains(&days) => {
                return Ok(vec![BotResponse::Text("⚠️ 时间范围必须在1-30天之间".to_string())]);
            }
            Ok(_) => {}
            Err(_) => return Ok(vec![BotResponse::Text("⚠️ 时间范围必须是数字（天数）".to_string())]),
        }
    }

    let current_season = ctx.config.season.current.clone();
    let player = match lookup_player(&ctx, &current_season, &player_id).await? {
        Some(p) => p,
        None => return Ok(vec![BotResponse::Text("⚠️ 未找到玩家历史数据".to_string())]),
    };

    let club_tag_str = player.club_tag.as_deref().map(|t| format!(" [{t}]")).unwrap_or_default();
    let text = format!(
        "\n📊 {current_season}排位赛 | THE FINALS\n{SEPARATOR}\n▎玩家: {}{club_tag_str}\n▎当前排名: #{}\n▎分数: {}\n{SEPARATOR}",
        player.name,
        player.rank,
        format_score(player.score),
    );
    Ok(vec![BotResponse::Text(text)])
}

pub fn plugin() -> Plugin {
    PluginBuilder::new("leaderboard").command("lb", "查看玩家排位分数走势，示例: /lb BlueWarrior 7", h(leaderboard)).build()
}
