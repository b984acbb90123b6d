//! `/ask`: magic conch shell, a fixed pool of canned answers picked at
//! random. Grounded on `original_source/plugins/magic_conch_plugin.py`.

use crate::context::AppContext;
use crate::error::BotResult;
use crate::models::{BotResponse, GenericMessage};
use crate::plugin::{h, Plugin, PluginBuilder};
use std::sync::Arc;

const ANSWERS: &[&str] = &[
    "是的。", "不是。", "再问一次。", "不好说。", "当然。", "想都别想。",
    "问得好，但我不会告诉你。", "机会渺茫。", "毋庸置疑。", "现在还不清楚，再试一次。",
];

fn pick_answer(seed: &str) -> &'static str {
    let hash = seed.bytes().fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
    ANSWERS[(hash as usize) % ANSWERS.len()]
}

async fn ask(_ctx: Arc<AppContext>, msg: GenericMessage, args: String) -> BotResult<Vec<BotResponse>> {
    let question = if args.trim().is_empty() { msg.id.clone() } else { args };
    let answer = pick_answer(&format!("{question}{}", msg.timestamp_ms));
    Ok(vec![BotResponse::Text(format!("\n🐚 神奇海螺说:\n{answer}"))])
}

pub fn plugin() -> Plugin {
    PluginBuilder::new("ask").command("ask", "向神奇海螺提问，示例: /ask 今天运气如何", h(ask)).build()
}
