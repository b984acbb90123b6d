//! `/bird`. Grounded on `original_source/core/flappy_bird.py`'s
//! `FlappyBirdCore` (Redis sorted-set leaderboard) and
//! `original_source/plugins/flappy_bird_plugin.py`.

use super::shared::format_score;
use crate::context::AppContext;
use crate::error::BotResult;
use crate::models::{BotResponse, GenericMessage};
use crate::plugin::{h, Plugin, PluginBuilder};
use std::sync::Arc;

const SCORES_KEY: &str = "flappy_bird:scores";
const TOP_N: isize = 4; // zrevrange is inclusive, so 0..=4 is the top 5.
const DASHES: &str = "-------------";

async fn show_leaderboard(ctx: Arc<AppContext>, _msg: GenericMessage, _args: String) -> BotResult<Vec<BotResponse>> {
    let top = ctx.kv.zrevrange_withscores(SCORES_KEY, 0, TOP_N).await?;
    if top.is_empty() {
        return Ok(vec![BotResponse::Text("暂时还没有玩家记录哦，快来玩游戏吧！".to_string())]);
    }

    let mut text = format!("\n📊 小电视数据 | FlappyBird\n{DASHES}\n🏆 前五排名:\n");
    for (i, (player_id, score)) in top.iter().enumerate() {
        text.push_str(&format!("▎{}: {player_id} (分数: {})\n", i + 1, format_score(*score as i64)));
    }
    text.push_str(DASHES);
    Ok(vec![BotResponse::Text(text)])
}

pub fn plugin() -> Plugin {
    PluginBuilder::new("flappy_bird").command("bird", "查看 Flappy Bird 游戏排行榜", h(show_leaderboard)).build()
}
