//! `/lock`, `/unlock`. Grounded on `original_source/plugins/lock_plugin.py`.

use super::shared::SEPARATOR;
use crate::context::AppContext;
use crate::error::BotResult;
use crate::models::{BotResponse, GenericMessage};
use crate::plugin::{h, Plugin, PluginBuilder};
use std::sync::Arc;

async fn lock(ctx: Arc<AppContext>, msg: GenericMessage, args: String) -> BotResult<Vec<BotResponse>> {
    let game_id = args.trim();
    if game_id.is_empty() {
        return Ok(vec![BotResponse::Text(format!(
            "❌ 未提供游戏ID\n{SEPARATOR}\n🎮 使用方法:\n1. /lock 游戏ID\n{SEPARATOR}\n\
             💡 小贴士:\n1. 需要输入完整ID\n2. 每个用户只能保护一个ID\n3. 每个ID只能被一个用户保护"
        ))]);
    }
    if !game_id.contains('#') {
        return Ok(vec![BotResponse::Text(format!(
            "❌ 无效的游戏ID格式\n{SEPARATOR}\n正确格式: PlayerName#1234"
        ))]);
    }

    if let Some(protector) = ctx.lock_store.protector_of(game_id) {
        let text = if protector == msg.author.id {
            format!("❌ 该ID已被你保护\n{SEPARATOR}\n如需解除保护，请使用 /unlock")
        } else {
            format!("❌ 该ID已被其他用户保护\n{SEPARATOR}\n每个ID只能被一个用户保护")
        };
        return Ok(vec![BotResponse::Text(text)]);
    }

    match ctx.lock_store.protect(&msg.author.id, game_id) {
        Ok(()) => Ok(vec![BotResponse::Text(format!(
            "✅ ID保护成功\n{SEPARATOR}\n已保护ID: {game_id}\n现在其他用户无法查询你的信息"
        ))]),
        Err(_) => {
            let protected_id = ctx.lock_store.protected_id_of(&msg.author.id).unwrap_or_default();
            Ok(vec![BotResponse::Text(format!(
                "❌ 你已经保护了一个ID\n{SEPARATOR}\n当前保护的ID: {protected_id}\n如需更换，请先使用 /unlock"
            ))])
        }
    }
}

async fn unlock(ctx: Arc<AppContext>, msg: GenericMessage, _args: String) -> BotResult<Vec<BotResponse>> {
    let text = match ctx.lock_store.unprotect(&msg.author.id) {
        Some(game_id) => format!("✅ ID保护已解除\n{SEPARATOR}\n已解除ID: {game_id}\n现在其他用户可以查询你的信息"),
        None => format!("❌ 你没有保护任何ID\n{SEPARATOR}\n使用 /lock 来保护你的ID"),
    };
    Ok(vec![BotResponse::Text(text)])
}

pub fn plugin() -> Plugin {
    PluginBuilder::new("lock")
        .command("lock", "保护自己的游戏ID，防止他人查询", h(lock))
        .command("unlock", "解除ID保护", h(unlock))
        .build()
}
