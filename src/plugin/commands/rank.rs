//! `/rank`, `/r`, `/all`. Grounded on
//! `original_source/plugins/rank_plugin.py`, `rank_all_plugin.py`, and
//! `original_source/core/rank.py`'s `RankQuery`.

use super::shared::{format_change, format_score, lookup_player, resolve_player_arg, SEPARATOR};
use crate::context::AppContext;
use crate::error::BotResult;
use crate::models::{BotResponse, GenericMessage, PlayerRecord};
use crate::plugin::{h, Plugin, PluginBuilder};
use crate::render::RenderRequest;
use std::sync::Arc;

const TEMPLATE_DIR: &str = "templates";
const TEMPLATE: &str = "rank.html";

/// Self-contained trivia pool; the source loads its equivalent from a
/// `did_you_know.json` data file this crate doesn't carry.
const TIPS: &[&str] = &[
    "绑定游戏ID后，大部分指令都可以省略ID参数。",
    "使用 /lock 可以防止他人查询你的战绩。",
    "/ds 支持模糊搜索，哪怕只记得玩家名的一部分。",
    "战队查询支持模糊匹配，标签不必完全精确。",
];

fn pick_tip(seed: &str) -> &'static str {
    let hash = seed.bytes().fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
    TIPS[(hash as usize) % TIPS.len()]
}

fn rank_usage() -> String {
    format!(
        "\n❌ 未提供玩家ID\n{SEPARATOR}\n🎮 使用方法:\n1. /rank 玩家ID\n{SEPARATOR}\n\
         💡 小贴士:\n1. 可以使用 /bind 绑定ID\n2. 可尝试模糊搜索"
    )
}

fn all_usage() -> String {
    format!(
        "\n❌ 未提供玩家ID\n{SEPARATOR}\n🎮 使用方法:\n- /all 玩家ID\n{SEPARATOR}\n\
         💡 小贴士:\n1. 支持模糊搜索\n2. 可以使用 /bind 绑定ID\n3. 会显示所有赛季数据"
    )
}

fn format_text_response(player: &PlayerRecord, season_id: &str) -> String {
    let club_tag_str = player.club_tag.as_deref().map(|t| format!(" [{t}]")).unwrap_or_default();
    format!(
        "\n🎮 {season_id}排位 | THE FINALS\n{SEPARATOR}\n📋 玩家: {}{club_tag_str}\n📊 排名: #{}\n💵 分数: {}\n📈 趋势: {}\n{SEPARATOR}",
        player.name,
        player.rank,
        format_score(player.score),
        format_change(player.change),
    )
}

async fn render_rank_image(ctx: &Arc<AppContext>, player: &PlayerRecord, season_id: &str) -> Option<Vec<u8>> {
    let pool = ctx.render_pool.as_ref()?;
    let (handle, tag) = player.name.split_once('#').unwrap_or((player.name.as_str(), "0000"));
    let player_name = match &player.club_tag {
        Some(tag) => format!("[{tag}]{handle}"),
        None => handle.to_string(),
    };

    let template_data = serde_json::json!({
        "player_name": player_name,
        "player_tag": tag,
        "rank": player.rank,
        "score": format_score(player.score),
        "rank_change": player.change.map(|c| c.abs().to_string()).unwrap_or_default(),
        "rank_trend": match player.change {
            Some(c) if c < 0 => "↑",
            Some(c) if c > 0 => "↓",
            _ => "",
        },
        "season": season_id,
    });

    let req = RenderRequest {
        request_id: format!("rank-{}", player.name),
        template_dir: TEMPLATE_DIR.to_string(),
        template: TEMPLATE.to_string(),
        template_data,
        wait_selectors: vec![".header".to_string()],
        quality: 85,
        screenshot_selector: Some(".poster".to_string()),
        full_page: Some(false),
        wait_timeout_ms: Some(300),
        disable_animations: true,
    };
    pool.render(req).await.ok()
}

async fn rank(ctx: Arc<AppContext>, msg: GenericMessage, args: String) -> BotResult<Vec<BotResponse>> {
    let Some(player_name) = resolve_player_arg(&ctx, &msg.author.id, &args) else {
        return Ok(vec![BotResponse::Text(rank_usage())]);
    };

    let current_season = ctx.config.season.current.clone();
    let player = match lookup_player(&ctx, &current_season, &player_name).await? {
        Some(p) => p,
        None => return Ok(vec![BotResponse::Text(format!("\n⚠️ 未找到玩家 `{player_name}`"))]),
    };

    if let Some(bytes) = render_rank_image(&ctx, &player, &current_season).await {
        return Ok(vec![BotResponse::Image { bytes, alt_text: format!("{} 排位信息", player.name) }]);
    }
    Ok(vec![BotResponse::Text(format_text_response(&player, &current_season))])
}

fn format_season_line(season_id: &str, player: Option<&PlayerRecord>) -> String {
    match player {
        Some(p) => format!("▎{season_id}: #{} (分数: {})", p.rank, format_score(p.score)),
        None => format!("▎{season_id}: 未上榜"),
    }
}

async fn all_seasons(ctx: Arc<AppContext>, msg: GenericMessage, args: String) -> BotResult<Vec<BotResponse>> {
    let Some(player_name) = resolve_player_arg(&ctx, &msg.author.id, &args) else {
        return Ok(vec![BotResponse::Text(all_usage())]);
    };

    let mut lines = Vec::new();
    let mut found_any = false;
    for season_id in &ctx.config.season.seasons {
        match lookup_player(&ctx, season_id, &player_name).await {
            Ok(player) => {
                found_any |= player.is_some();
                lines.push(format_season_line(season_id, player.as_ref()));
            }
            Err(_) => lines.push(format_season_line(season_id, None)),
        }
    }

    if !found_any {
        return Ok(vec![BotResponse::Text(format!(
            "\n❌ 未找到 {player_name} 的排名数据\n{SEPARATOR}\n可能的原因:\n1. 玩家ID输入错误\n2. 该玩家暂无排名数据\n3. 数据尚未更新\n{SEPARATOR}\n\
             💡 提示: 你可以:\n1. 检查ID是否正确\n2. 尝试使用模糊搜索\n{SEPARATOR}"
        ))]);
    }

    let tip = pick_tip(&format!("{player_name}{}", msg.timestamp_ms));
    let body = lines.join("\n");
    Ok(vec![BotResponse::Text(format!(
        "\n📊 玩家数据 | {player_name}\n{SEPARATOR}\n🏆 历史排名:\n{body}\n{SEPARATOR}\n🤖 你知道吗？[ {tip} ]"
    ))])
}

pub fn plugin() -> Plugin {
    PluginBuilder::new("rank")
        .command("rank", "查询排名信息，示例: /rank BlueWarrior", h(rank))
        .command("r", "查询排名信息（简写）", h(rank))
        .command("all", "查询全赛季排名信息", h(all_seasons))
        .build()
}
