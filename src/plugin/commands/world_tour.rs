//! `/wt`, `/wt_history`. Grounded on `original_source/core/world_tour.py`'s
//! `WorldTourAPI`/`WorldTourQuery` and
//! `original_source/plugins/world_tour_plugin.py`.

use super::shared::SEPARATOR;
use crate::context::AppContext;
use crate::error::BotResult;
use crate::models::{BotResponse, GenericMessage};
use crate::plugin::{h, Plugin, PluginBuilder};
use crate::world_tour::WorldTourEntry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

const HISTORY_LIMIT: usize = 10;

#[derive(Default)]
struct QueryHistory {
    by_user: Mutex<HashMap<String, Vec<String>>>,
}

impl QueryHistory {
    fn record(&self, user_id: &str, player_name: &str) {
        let mut by_user = self.by_user.lock().unwrap();
        let entries = by_user.entry(user_id.to_string()).or_default();
        entries.retain(|n| n != player_name);
        entries.push(player_name.to_string());
        if entries.len() > HISTORY_LIMIT {
            entries.remove(0);
        }
    }

    fn of(&self, user_id: &str) -> Vec<String> {
        self.by_user.lock().unwrap().get(user_id).cloned().unwrap_or_default()
    }
}

fn not_found_usage(seasons: &[String]) -> String {
    let season_range = match (seasons.first(), seasons.last()) {
        (Some(first), Some(last)) => format!("{first}~{last}"),
        _ => "无可用赛季".to_string(),
    };
    format!(
        "\n❌ 未提供玩家ID\n{SEPARATOR}\n🎮 使用方法:\n1. /wt 玩家ID\n2. /wt 玩家ID 赛季\n{SEPARATOR}\n\
         💡 小贴士:\n1. 可以使用 /bind 绑定ID\n2. 赛季可选: {season_range}\n3. 可尝试模糊搜索"
    )
}

/// `name#tag`, matching the source's bare-id regex
/// `^[a-zA-Z0-9_]+#\d{4}$`.
fn looks_like_exact_id(id: &str) -> bool {
    match id.split_once('#') {
        Some((name, tag)) => !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') && tag.len() == 4 && tag.chars().all(|c| c.is_ascii_digit()),
        None => false,
    }
}

/// Splits "`id` [season]" the way the source's `content.split(maxsplit=1)`
/// does, then checks whether the trailing token names a configured season.
fn split_args(content: &str, seasons: &[String]) -> (Option<String>, Option<String>) {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return (None, None);
    }
    match trimmed.rsplit_once(char::is_whitespace) {
        Some((rest, last)) if seasons.iter().any(|s| s.eq_ignore_ascii_case(last)) => {
            (Some(rest.trim().to_string()), Some(last.to_string()))
        }
        _ => (Some(trimmed.to_string()), None),
    }
}

fn format_entry(player: &WorldTourEntry, season_id: &str) -> String {
    let club_tag_str = player.club_tag.as_deref().map(|t| format!(" [{t}]")).unwrap_or_default();
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
    let platform_str = if platforms.is_empty() { "未知".to_string() } else { platforms.join("/") };
    let rank_change = match player.change {
        c if c > 0 => format!(" (↑{c})"),
        c if c < 0 => format!(" (↓{})", c.abs()),
        _ => String::new(),
    };
    let rank = player.rank.map(|r| r.to_string()).unwrap_or_else(|| "未知".to_string());

    format!(
        "\n💰 {season_id}世界巡回赛 | THE FINALS\n{SEPARATOR}\n📋 玩家: {}{club_tag_str}\n🖥️ 平台: {platform_str}\n📊 排名: #{rank}{rank_change}\n💵 奖金: ${}\n{SEPARATOR}",
        player.name,
        super::shared::format_score(player.cashouts),
    )
}

/// Reads from the WT snapshot's own `wt:{season}:player:{name}` keyspace
/// rather than issuing a per-request upstream call; the background refresh
/// loop owns populating it.
async fn fetch_player(ctx: &Arc<AppContext>, player_name: &str, season: &str) -> BotResult<Option<WorldTourEntry>> {
    ctx.world_tour.get_player(season, player_name).await
}

/// `None` means "not protected against this caller"; `Some(text)` is the
/// refusal message to return instead of querying.
fn protection_refusal(ctx: &Arc<AppContext>, caller_id: &str, target_id: &str) -> Option<String> {
    let bound = ctx.bind_store.get(caller_id);
    if bound.as_deref().map(|b| b.eq_ignore_ascii_case(target_id)).unwrap_or(false) {
        return None;
    }
    let protector = ctx.lock_store.protector_of(target_id)?;
    if protector == caller_id {
        return None;
    }
    Some(format!("❌ 该ID已被保护\n{SEPARATOR}\n该玩家已开启ID保护，无法查询其信息"))
}

async fn world_tour(ctx: Arc<AppContext>, msg: GenericMessage, args: String, history: Arc<QueryHistory>) -> BotResult<Vec<BotResponse>> {
    let seasons = &ctx.config.season.seasons;
    let bound_id = ctx.bind_store.get(&msg.author.id);
    let trimmed = args.trim();

    let query_source = if trimmed.is_empty() { bound_id.clone().unwrap_or_default() } else { trimmed.to_string() };
    if query_source.is_empty() {
        return Ok(vec![BotResponse::Text(not_found_usage(seasons))]);
    }

    let (player_name, season_arg) = split_args(&query_source, seasons);
    let Some(player_name) = player_name else {
        return Ok(vec![BotResponse::Text(not_found_usage(seasons))]);
    };

    if looks_like_exact_id(&player_name) {
        if let Some(refusal) = protection_refusal(&ctx, &msg.author.id, &player_name) {
            return Ok(vec![BotResponse::Text(refusal)]);
        }
    }

    let season = season_arg.unwrap_or_else(|| ctx.config.season.current.clone());
    match fetch_player(&ctx, &player_name, &season).await {
        Ok(Some(player)) => {
            if looks_like_exact_id(&player.name) && player.name != player_name {
                if let Some(refusal) = protection_refusal(&ctx, &msg.author.id, &player.name) {
                    return Ok(vec![BotResponse::Text(refusal)]);
                }
            }
            history.record(&msg.author.id, &player.name);
            Ok(vec![BotResponse::Text(format_entry(&player, &season))])
        }
        Ok(None) => Ok(vec![BotResponse::Text("\n⚠️ 未找到玩家数据".to_string())]),
        Err(e) => {
            tracing::warn!(error = %e, player = %player_name, "world tour query failed");
            Ok(vec![BotResponse::Text("⚠️ 查询失败，请稍后重试".to_string())])
        }
    }
}

async fn wt_history(_ctx: Arc<AppContext>, msg: GenericMessage, _args: String, history: Arc<QueryHistory>) -> BotResult<Vec<BotResponse>> {
    let entries = history.of(&msg.author.id);
    if entries.is_empty() {
        return Ok(vec![BotResponse::Text("暂无查询历史".to_string())]);
    }
    let body = entries.iter().rev().map(|id| format!("- {id}")).collect::<Vec<_>>().join("\n");
    Ok(vec![BotResponse::Text(format!("最近查询的ID:\n{body}"))])
}

pub fn plugin() -> Plugin {
    let history = Arc::new(QueryHistory::default());
    let history_for_wt = history.clone();
    let history_for_regex = history.clone();

    PluginBuilder::new("world_tour")
        .command(
            "wt",
            "查询世界巡回赛信息，示例: /wt BlueWarrior",
            h(move |ctx, msg, args| {
                let history = history_for_wt.clone();
                async move { world_tour(ctx, msg, args, history).await }
            }),
        )
        .command(
            "wt_history",
            "查看世界巡回赛查询历史",
            h(move |ctx, msg, args| {
                let history = history.clone();
                async move { wt_history(ctx, msg, args, history).await }
            }),
        )
        .regex(
            r"^[a-zA-Z0-9_]+#\d{4}$",
            h(move |ctx, msg, args| {
                let history = history_for_regex.clone();
                async move { world_tour(ctx, msg, args, history).await }
            }),
        )
        .expect("static regex is valid")
        .build()
}
