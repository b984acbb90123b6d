//! `/about` and `/info`. Grounded on `original_source/plugins/about_plugin.py`
//! and `original_source/plugins/status_plugin.py` (two distinct commands
//! that happen to share a module here since both are static/self-describing).

use super::shared::SEPARATOR;
use crate::context::AppContext;
use crate::error::BotResult;
use crate::models::{BotResponse, GenericMessage};
use crate::plugin::{h, Plugin, PluginBuilder};
use std::sync::Arc;
use std::time::Instant;

const ABOUT_TEXT: &str = "\n🎮 THE FINALS 排位查询机器人\n\
    ━━━━━━━━━━━━━\n\
    查询排位、世界巡回赛、死亡竞赛、平台争霸等赛季数据\n\
    输入 /help 查看全部指令\n\
    ━━━━━━━━━━━━━\n\
    💡 先用 /bind 绑定游戏ID，之后大部分指令可省略ID参数";

async fn about(_ctx: Arc<AppContext>, _msg: GenericMessage, _args: String) -> BotResult<Vec<BotResponse>> {
    Ok(vec![BotResponse::Text(ABOUT_TEXT.to_string())])
}

async fn info(ctx: Arc<AppContext>, _msg: GenericMessage, _args: String) -> BotResult<Vec<BotResponse>> {
    let start = Instant::now();
    let season_ready = !ctx.season_manager.all_season_ids().is_empty();
    let club_ready = ctx.club_cache.indexer.is_ready();
    let render_ready = ctx.render_pool.is_some();
    let probe_ms = start.elapsed().as_millis();

    let text = format!(
        "\n🖥️ 系统状态\n{SEPARATOR}\n\
        赛季数据: {}\n\
        公会数据: {}\n\
        渲染服务: {}\n\
        自检耗时: {probe_ms}ms\n{SEPARATOR}",
        if season_ready { "✅ 就绪" } else { "⚠️ 初始化中" },
        if club_ready { "✅ 就绪" } else { "⚠️ 初始化中" },
        if render_ready { "✅ 就绪" } else { "⚠️ 未启用" },
    );
    Ok(vec![BotResponse::Text(text)])
}

pub fn plugin() -> Plugin {
    PluginBuilder::new("about")
        .command("about", "查看机器人介绍", h(about))
        .command("info", "查看系统运行状态", h(info))
        .build()
}
