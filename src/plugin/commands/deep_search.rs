//! `/ds`. Grounded on `original_source/core/deep_search.py`'s `DeepSearch`
//! and `original_source/plugins/deep_search_plugin.py`.

use super::club::DEEP_SEARCH_CLUB_PREFIX;
use super::shared::{format_score, SEPARATOR};
use crate::context::AppContext;
use crate::error::BotResult;
use crate::models::{BotResponse, GenericMessage};
use crate::plugin::{h, Plugin, PluginBuilder};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const COOLDOWN: Duration = Duration::from_secs(1);
const MIN_QUERY_LEN: usize = 2;
const MAX_RESULTS: usize = 40;

struct SearchResult {
    name: String,
    score: i64,
    club_tag: String,
}

/// Per-user cooldown, kept in process memory like the source's plain
/// `Dict[str, datetime]` (no persistence across restarts intended).
#[derive(Default)]
struct Cooldowns {
    last_query: Mutex<HashMap<String, Instant>>,
}

impl Cooldowns {
    fn check(&self, user_id: &str) -> Option<u64> {
        let mut map = self.last_query.lock().unwrap();
        let now = Instant::now();
        if let Some(last) = map.get(user_id) {
            let elapsed = now.duration_since(*last);
            if elapsed < COOLDOWN {
                return Some((COOLDOWN - elapsed).as_secs().max(1));
            }
        }
        map.insert(user_id.to_string(), now);
        None
    }
}

async fn search_club_cache(ctx: &Arc<AppContext>, query_lower: &str) -> Vec<SearchResult> {
    let mut out = Vec::new();
    let keys = match ctx.kv.keys_with_prefix(DEEP_SEARCH_CLUB_PREFIX).await {
        Ok(k) => k,
        Err(_) => return out,
    };
    for key in keys {
        let club_tag = key.trim_start_matches(DEEP_SEARCH_CLUB_PREFIX).to_string();
        let Ok(members) = ctx.kv.hgetall(&key).await else { continue };
        for (name, _raw) in members {
            if !name.to_lowercase().contains(query_lower) {
                continue;
            }
            out.push(SearchResult { name, score: 0, club_tag: club_tag.clone() });
        }
    }
    out
}

async fn search(ctx: &Arc<AppContext>, query: &str) -> Vec<SearchResult> {
    let query_lower = query.to_lowercase();
    let mut combined: HashMap<String, SearchResult> = HashMap::new();

    for (_, player) in ctx.season_manager.search_indexer.search(&query_lower, 20) {
        combined.insert(
            player.name.clone(),
            SearchResult { name: player.name.clone(), score: player.score, club_tag: player.club_tag.clone().unwrap_or_default() },
        );
    }

    for result in search_club_cache(ctx, &query_lower).await {
        combined.entry(result.name.clone()).or_insert(result);
    }

    let mut results: Vec<_> = combined.into_values().collect();
    results.sort_by(|a, b| a.name.cmp(&b.name));
    results.truncate(MAX_RESULTS);
    results
}

fn format_results(query: &str, results: &[SearchResult]) -> String {
    let mut message = format!("🔎 深度搜索 | {}\n{SEPARATOR}\n", query.trim());

    if results.is_empty() {
        message.push_str(
            "❌ 未查询到对应的玩家信息\n",
        );
        message.push_str(&format!(
            "{SEPARATOR}\n💡 小贴士:\n1. 请检查ID是否正确\n2. 尝试使用不同的搜索关键词\n3. 该玩家可能不在当前赛季排行榜中\n{SEPARATOR}"
        ));
        return message;
    }

    message.push_str("👀 所有结果:\n");
    for r in results {
        let display = if r.club_tag.is_empty() { r.name.clone() } else { format!("[{}]{}", r.club_tag, r.name) };
        if r.score > 0 {
            message.push_str(&format!("▎{display} [{}]\n", format_score(r.score)));
        } else {
            message.push_str(&format!("▎{display} [未上榜]\n"));
        }
    }
    message.push_str(SEPARATOR);
    message
}

async fn deep_search(ctx: Arc<AppContext>, msg: GenericMessage, args: String, cooldowns: Arc<Cooldowns>) -> BotResult<Vec<BotResponse>> {
    if let Some(remaining) = cooldowns.check(&msg.author.id) {
        return Ok(vec![BotResponse::Text(format!(
            "\n❌ 查询过于频繁\n{SEPARATOR}\n需要等待 {remaining} 秒才能再次查询\n请稍后再试"
        ))]);
    }

    let query = args.trim();
    if query.chars().count() < MIN_QUERY_LEN {
        return Ok(vec![BotResponse::Text(format!(
            "\n❌ 查询参数无效\n{SEPARATOR}\n💡 小贴士: 查询词 '{query}' 太短，至少需要 {MIN_QUERY_LEN} 个字符。"
        ))]);
    }

    let results = search(&ctx, query).await;
    Ok(vec![BotResponse::Text(format_results(query, &results))])
}

pub fn plugin() -> Plugin {
    let cooldowns = Arc::new(Cooldowns::default());
    PluginBuilder::new("deep_search")
        .command(
            "ds",
            "深度搜索ID，示例: /ds 玩家名",
            h(move |ctx, msg, args| {
                let cooldowns = cooldowns.clone();
                async move { deep_search(ctx, msg, args, cooldowns).await }
            }),
        )
        .build()
}
