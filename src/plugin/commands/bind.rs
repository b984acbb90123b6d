//! `/bind`, `/unbind`, `/status` (bind status — distinct from `/info`'s
//! system status). Grounded on `original_source/plugins/bind_plugin.py`.

use super::shared::SEPARATOR;
use crate::bind_store::is_valid_game_id;
use crate::context::AppContext;
use crate::error::BotResult;
use crate::models::{BotResponse, GenericMessage};
use crate::plugin::{h, Plugin, PluginBuilder};
use std::sync::Arc;

fn help_text() -> String {
    format!(
        "\n📝 绑定功能说明\n{SEPARATOR}\n\
        绑定游戏ID:\n/bind <游戏ID>\n示例: /bind PlayerName#1234\n\n\
        解除绑定:\n/unbind\n\n查看当前绑定:\n/status\n\n\
        绑定后可直接使用:\n/r - 查询排位\n/wt - 查询世界巡回赛"
    )
}

async fn bind(ctx: Arc<AppContext>, msg: GenericMessage, args: String) -> BotResult<Vec<BotResponse>> {
    let game_id = args.trim();
    if game_id.is_empty() {
        return Ok(vec![BotResponse::Text(help_text())]);
    }
    if !is_valid_game_id(game_id) {
        return Ok(vec![BotResponse::Text(format!(
            "❌ 游戏ID格式错误\n{SEPARATOR}\n📝 正确格式：游戏ID#1234\n例如：Player#1234"
        ))]);
    }
    match ctx.bind_store.bind(&msg.author.id, game_id) {
        Ok(()) => Ok(vec![BotResponse::Text(format!(
            "✅ 绑定成功！\n{SEPARATOR}\n游戏ID: {game_id}\n\n现在可以直接使用:\n/r - 查询排位\n/wt - 查询世界巡回赛\n/lock - 开启隐私模式"
        ))]),
        Err(_) => Ok(vec![BotResponse::Text(format!(
            "❌ 该游戏ID已被绑定\n{SEPARATOR}\n💡 每个游戏ID只能被一个用户绑定"
        ))]),
    }
}

async fn unbind(ctx: Arc<AppContext>, msg: GenericMessage, _args: String) -> BotResult<Vec<BotResponse>> {
    let text = if ctx.bind_store.unbind(&msg.author.id) { "✅ 已解除游戏ID绑定" } else { "❌ 您当前没有绑定游戏ID" };
    Ok(vec![BotResponse::Text(text.to_string())])
}

async fn status(ctx: Arc<AppContext>, msg: GenericMessage, _args: String) -> BotResult<Vec<BotResponse>> {
    let text = match ctx.bind_store.get(&msg.author.id) {
        Some(game_id) => format!("📋 当前绑定信息\n{SEPARATOR}\n游戏ID: {game_id}"),
        None => "❌ 您当前没有绑定游戏ID".to_string(),
    };
    Ok(vec![BotResponse::Text(text)])
}

/// First-interaction welcome notice, checked on every message regardless of
/// whether it parses as a command — mirrors `BindPlugin.handle_message`'s
/// `check_first_interaction` hook, expressed here as a keyword match on the
/// empty string (always contained) rather than overriding dispatch order.
/// Tracked independently of the bind table itself (`notified_users.json` in
/// the original), so unbinding never makes the notice reappear.
async fn welcome_if_first_interaction(ctx: Arc<AppContext>, msg: GenericMessage, _args: String) -> BotResult<Vec<BotResponse>> {
    if !ctx.bind_store.is_first_interaction(&msg.author.id) {
        return Ok(vec![]);
    }
    ctx.bind_store.mark_notified(&msg.author.id);
    Ok(vec![BotResponse::Text(
        "👋 Hi, 欢迎使用！\n━━━━━━━━━━━━━━━\n🔔 温馨提示：\n建议您立即绑定游戏ID\n格式：/bind 游戏ID#1234\n━━━━━━━━━━━━━━━\n\
         💡 使用 /lock 命令可以保护您的游戏ID\n━━━━━━━━━━━━━━━\n💡 输入 /about 获取更多帮助"
            .to_string(),
    )])
}

pub fn plugin() -> Plugin {
    PluginBuilder::new("bind")
        .command("bind", "绑定游戏ID，示例: /bind PlayerName#1234", h(bind))
        .command("unbind", "解除游戏ID绑定", h(unbind))
        .command("status", "查看当前绑定的游戏ID", h(status))
        .build()
}

/// `welcome_if_first_interaction` isn't wired into `plugin()`'s command list
/// because PD has no per-message "always run" hook (spec §4.10 only defines
/// command/keyword/regex tiers); CA calls this directly before dispatch for
/// platforms that supply a stable `author.id`. See `core_app.rs`.
pub async fn maybe_welcome(ctx: Arc<AppContext>, msg: GenericMessage) -> BotResult<Option<Vec<BotResponse>>> {
    let out = welcome_if_first_interaction(ctx, msg, String::new()).await?;
    Ok(if out.is_empty() { None } else { Some(out) })
}
