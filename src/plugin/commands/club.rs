//! `/club`. Grounded on `original_source/plugins/club_plugin.py` and
//! `original_source/core/club.py`'s `ClubQuery.process_club_command`.

use super::shared::{format_score, SEPARATOR};
use crate::context::AppContext;
use crate::error::BotResult;
use crate::models::{BotResponse, ClubMember, ClubRecord, GenericMessage};
use crate::plugin::{h, Plugin, PluginBuilder};
use crate::render::RenderRequest;
use std::sync::Arc;

const TEMPLATE_DIR: &str = "templates";
const TEMPLATE: &str = "club_info.html";

fn usage() -> String {
    format!(
        "\n❌ 未提供俱乐部标签\n{SEPARATOR}\n🎮 使用方法:\n1. /club 俱乐部标签\n{SEPARATOR}\n\
         💡 小贴士:\n1. 标签区分大小写\n2. 可使用模糊搜索\n3. 仅显示前10K玩家"
    )
}

/// Scores members against the current season, unranked members sorting
/// last, mirroring `_format_members_info`/`_prepare_template_data`'s
/// descending-by-score order with `-1` as the unranked sentinel.
async fn scored_members(ctx: &Arc<AppContext>, members: &[ClubMember]) -> Vec<(String, i64)> {
    let mut scored = Vec::with_capacity(members.len());
    for member in members {
        let score = ctx
            .season_manager
            .get_player_data(&member.name, &ctx.config.season.current, false)
            .await
            .ok()
            .flatten()
            .map(|p| p.score)
            .unwrap_or(0);
        scored.push((member.name.clone(), score));
    }
    scored.sort_by_key(|(_, score)| if *score > 0 { -*score } else { 1 });
    scored
}

fn format_leaderboard(club: &ClubRecord, current_season: &str) -> String {
    let lines: Vec<String> = club
        .standings
        .iter()
        .filter(|s| s.mode.starts_with(current_season))
        .map(|s| format!("▎{}: #{} (总分: {})", s.mode, s.rank, format_score(s.total_value)))
        .collect();
    if lines.is_empty() { "暂无排名数据".to_string() } else { lines.join("\n") }
}

fn format_text_response(club: &ClubRecord, scored: &[(String, i64)], current_season: &str) -> String {
    let members_info = if scored.is_empty() {
        "暂无成员数据".to_string()
    } else {
        scored
            .iter()
            .map(|(name, score)| {
                if *score > 0 { format!("▎{name} [{}]", format_score(*score)) } else { format!("▎{name} [未上榜]") }
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    let leaderboard_info = format_leaderboard(club, current_season);
    let member_count = club.members.len();
    if leaderboard_info != "暂无排名数据" {
        format!(
            "\n🎮 战队信息 | THE FINALS\n{SEPARATOR}\n📋 标签: {}\n👥 成员列表 (共{member_count}人):\n{members_info}\n{SEPARATOR}\n📊 战队排名:\n{leaderboard_info}\n{SEPARATOR}",
            club.club_tag
        )
    } else {
        format!(
            "\n🎮 战队信息 | THE FINALS\n{SEPARATOR}\n📋 标签: {}\n👥 成员列表 (共{member_count}人):\n{members_info}\n{SEPARATOR}",
            club.club_tag
        )
    }
}

async fn render_club_image(ctx: &Arc<AppContext>, club: &ClubRecord, scored: &[(String, i64)], current_season: &str) -> Option<Vec<u8>> {
    let pool = ctx.render_pool.as_ref()?;
    let members_data: Vec<_> = scored
        .iter()
        .enumerate()
        .map(|(idx, (name, score))| {
            let class = if *score <= 0 {
                "unranked"
            } else {
                match idx {
                    0 => "top-1",
                    1 => "top-2",
                    2 => "top-3",
                    _ => "ranked",
                }
            };
            serde_json::json!({
                "name": name,
                "score": score,
                "score_display": if *score > 0 { format_score(*score) } else { "未上榜".to_string() },
                "class": class,
                "index": idx + 1,
            })
        })
        .collect();

    let rankings_data: Vec<_> = club
        .standings
        .iter()
        .filter(|s| s.mode.starts_with(current_season))
        .map(|s| serde_json::json!({"mode": s.mode, "rank": s.rank, "score": format_score(s.total_value)}))
        .collect();

    let template_data = serde_json::json!({
        "club_tag": club.club_tag,
        "member_count": club.members.len(),
        "members": members_data,
        "rankings": if rankings_data.is_empty() { serde_json::Value::Null } else { serde_json::Value::Array(rankings_data) },
    });

    let req = RenderRequest {
        request_id: format!("club-{}", club.club_tag),
        template_dir: TEMPLATE_DIR.to_string(),
        template: TEMPLATE.to_string(),
        template_data,
        wait_selectors: vec![".header".to_string()],
        quality: 80,
        screenshot_selector: Some(".poster".to_string()),
        full_page: Some(false),
        wait_timeout_ms: Some(300),
        disable_animations: true,
    };
    pool.render(req).await.ok()
}

/// Mirrors `DeepSearch.add_club_members`: members get cached under
/// `deep_search:club:<tag>` so `/ds` can surface them alongside the
/// leaderboard index.
async fn cache_members_for_deep_search(ctx: &Arc<AppContext>, club: &ClubRecord) {
    if club.members.is_empty() {
        return;
    }
    let key = format!("{DEEP_SEARCH_CLUB_PREFIX}{}", club.club_tag);
    let mapping: std::collections::HashMap<String, String> = club
        .members
        .iter()
        .filter_map(|m| serde_json::to_string(m).ok().map(|v| (m.name.clone(), v)))
        .collect();
    if let Err(e) = ctx.kv.hmset(&key, &mapping).await {
        tracing::warn!(error = %e, club_tag = %club.club_tag, "failed to cache club members for deep search");
    }
}

pub(crate) const DEEP_SEARCH_CLUB_PREFIX: &str = "deep_search:club:";

async fn club(ctx: Arc<AppContext>, _msg: GenericMessage, args: String) -> BotResult<Vec<BotResponse>> {
    let tag = args.trim().trim_matches(|c| c == '[' || c == ']');
    if tag.is_empty() {
        return Ok(vec![BotResponse::Text(usage())]);
    }

    let data = match ctx.club_cache.get_club_data(tag, true).await? {
        Some(d) => d,
        None => match ctx.club_cache.get_club_data(tag, false).await? {
            Some(d) => d,
            None => return Ok(vec![BotResponse::Text("\n⚠️ 未找到俱乐部数据".to_string())]),
        },
    };
    let Some(club) = data.into_iter().next() else {
        return Ok(vec![BotResponse::Text("\n⚠️ 未找到俱乐部数据".to_string())]);
    };

    cache_members_for_deep_search(&ctx, &club).await;

    let scored = scored_members(&ctx, &club.members).await;
    let current_season = &ctx.config.season.current;

    if let Some(bytes) = render_club_image(&ctx, &club, &scored, current_season).await {
        return Ok(vec![BotResponse::Image { bytes, alt_text: format!("{} 战队信息", club.club_tag) }]);
    }

    Ok(vec![BotResponse::Text(format_text_response(&club, &scored, current_season))])
}

pub fn plugin() -> Plugin {
    PluginBuilder::new("club").command("club", "查询俱乐部信息，示例: /club TAG", h(club)).build()
}
