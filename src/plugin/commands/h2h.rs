//! `/h2h`. Grounded on `original_source/core/h2h.py`'s `H2HAPI`/`H2HQuery`
//! and `original_source/plugins/h2h_plugin.py`.

use super::shared::SEPARATOR;
use crate::context::AppContext;
use crate::error::BotResult;
use crate::models::{BotResponse, GenericMessage};
use crate::plugin::{h, Plugin, PluginBuilder};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

const PLATFORM: &str = "crossplay";
const CACHE_TTL: Duration = Duration::from_secs(60);

#[derive(Deserialize)]
struct H2hEntry {
    name: String,
    #[serde(default)]
    rank: Option<i64>,
    #[serde(default)]
    points: i64,
    #[serde(rename = "clubTag", default)]
    club_tag: Option<String>,
    #[serde(rename = "steamName", default)]
    steam_name: Option<String>,
    #[serde(rename = "psnName", default)]
    psn_name: Option<String>,
    #[serde(rename = "xboxName", default)]
    xbox_name: Option<String>,
}

#[derive(Deserialize, Default)]
struct H2hResponse {
    #[serde(default)]
    data: Vec<H2hEntry>,
}

fn usage() -> String {
    format!(
        "\n🎯 对对碰查询使用说明\n{SEPARATOR}\n🎮 使用方法:\n1. /h2h 玩家ID - 查询指定玩家\n{SEPARATOR}\n\
         💡 小贴士:\n1. 可以使用 /bind 绑定ID\n2. 支持模糊搜索\n3. 显示当前赛季数据\n{SEPARATOR}"
    )
}

/// embarkID format is `name#digits`, looser than the bind-format regex
/// (`bind_store::is_valid_game_id` requires exactly 4 digits).
fn looks_like_embark_id(id: &str) -> bool {
    match id.split_once('#') {
        Some((name, tag)) => !name.is_empty() && !tag.is_empty() && tag.chars().all(|c| c.is_ascii_digit()),
        None => false,
    }
}

fn format_player(player: &H2hEntry, current_season: &str) -> String {
    let mut platforms = Vec::new();
    if player.steam_name.is_some() {
        platforms.push("Steam");
    }
    if player.psn_name.is_some() {
        platforms.push("PSN");
    }
    if player.xbox_name.is_some() {
        platforms.push("Xbox");
    }
    let platform_display = if platforms.is_empty() { "未知".to_string() } else { platforms.join(" / ") };
    let club_tag_str = player.club_tag.as_deref().map(|t| format!(" [{t}]")).unwrap_or_default();
    let rank = player.rank.map(|r| r.to_string()).unwrap_or_else(|| "未知".to_string());

    format!(
        "\n🎯 {current_season}对对碰 | THE FINALS\n{SEPARATOR}\n📋 玩家: {}{club_tag_str}\n🖥️ 平台: {platform_display}\n📊 排名: #{rank}\n💵 积分: {}\n{SEPARATOR}",
        player.name,
        super::shared::format_score(player.points),
    )
}

async fn fetch_player(ctx: &Arc<AppContext>, player_name: &str, season: &str) -> BotResult<Option<H2hEntry>> {
    let endpoint = format!("/v1/leaderboard/{season}head2head/{PLATFORM}");
    let resp = ctx.hcc.get(&endpoint, &[("name", player_name)], true, Some(CACHE_TTL)).await?;
    let parsed: H2hResponse = serde_json::from_slice(&resp.bytes).unwrap_or_default();
    Ok(parsed.data.into_iter().find(|p| p.name.eq_ignore_ascii_case(player_name)))
}

async fn h2h(ctx: Arc<AppContext>, msg: GenericMessage, args: String) -> BotResult<Vec<BotResponse>> {
    let mut player_name = match super::shared::resolve_player_arg(&ctx, &msg.author.id, &args) {
        Some(n) => n,
        None => return Ok(vec![BotResponse::Text(usage())]),
    };

    if !looks_like_embark_id(&player_name) {
        if ctx.season_manager.search_indexer.is_ready() {
            let mut results = ctx.season_manager.search_indexer.search(&player_name, 5);
            if results.is_empty() {
                return Ok(vec![BotResponse::Text(format!("\n⚠️ 未找到玩家 `{player_name}`"))]);
            }
            if results.len() > 1 {
                if results[0].0 > results[1].0 * 1.5 {
                    player_name = results.remove(0).1.name;
                } else {
                    let list = results.iter().map(|(_, p)| format!("- {}", p.name)).collect::<Vec<_>>().join("\n");
                    return Ok(vec![BotResponse::Text(format!("\n🤔 找到多个可能匹配的玩家，请提供更精确的名称:\n{list}"))]);
                }
            } else {
                player_name = results.remove(0).1.name;
            }
        }
    }

    let current_season = ctx.config.season.current.clone();
    match fetch_player(&ctx, &player_name, &current_season).await {
        Ok(Some(player)) => Ok(vec![BotResponse::Text(format_player(&player, &current_season))]),
        Ok(None) => Ok(vec![BotResponse::Text(format!("\n⚠️ 未找到玩家 `{player_name}`"))]),
        Err(e) => {
            tracing::warn!(error = %e, player = %player_name, "h2h query failed");
            Ok(vec![BotResponse::Text("\n⚠️ 查询失败，请稍后重试".to_string())])
        }
    }
}

pub fn plugin() -> Plugin {
    PluginBuilder::new("h2h").command("h2h", "查询对对碰数据，示例: /h2h PlayerName#1234", h(h2h)).build()
}
