//! `/why`. Grounded on `original_source/plugins/why_plugin.py`.

use crate::context::AppContext;
use crate::error::BotResult;
use crate::models::{BotResponse, GenericMessage};
use crate::plugin::{h, Plugin, PluginBuilder};
use crate::render::RenderRequest;
use std::sync::Arc;

const TEMPLATE_DIR: &str = "templates";
const TEMPLATE: &str = "why.html";

const FAQ_MESSAGE: &str = "\n🤔 为什么查不到玩家信息\n\n这通常不是出错了。\n\n由于我们的数据来源专注于顶尖玩家的竞技排名，目前我们只能查询到全球排名前 10,000 的玩家。\n\n\
如果您暂时无法被查询到，这通常意味着您正在冲榜的路上（）\n\n多总结提高，持之以恒地磨炼技巧。\n总有一天会成为明星选手的。\n\n加油~";

async fn render_why_image(ctx: &Arc<AppContext>) -> Option<Vec<u8>> {
    let pool = ctx.render_pool.as_ref()?;
    let req = RenderRequest {
        request_id: "why".to_string(),
        template_dir: TEMPLATE_DIR.to_string(),
        template: TEMPLATE.to_string(),
        template_data: serde_json::json!({}),
        wait_selectors: vec![".header".to_string()],
        quality: 80,
        screenshot_selector: None,
        full_page: Some(true),
        wait_timeout_ms: Some(300),
        disable_animations: true,
    };
    pool.render(req).await.ok()
}

async fn why(ctx: Arc<AppContext>, _msg: GenericMessage, _args: String) -> BotResult<Vec<BotResponse>> {
    if let Some(bytes) = render_why_image(&ctx).await {
        return Ok(vec![BotResponse::Image { bytes, alt_text: "常见问题解答".to_string() }]);
    }
    Ok(vec![BotResponse::Text(FAQ_MESSAGE.to_string())])
}

pub fn plugin() -> Plugin {
    PluginBuilder::new("why").command("why", "解答为什么查不到玩家的常见问题", h(why)).build()
}
