//! `/weapon`. Grounded on `original_source/core/weapon.py`'s `WeaponData`
//! and `original_source/plugins/weapon_plugin.py`.
//!
//! Scope reduction: the source also generates a per-weapon poster image
//! via `ImageGenerator` against a season-backgrounded `weapon.html`
//! template. That path needs a `season_bg` asset set this crate doesn't
//! carry, so `/weapon` here is text-only; the miss-case reference image
//! (`weapon_names.png`) is kept since it's a flat static asset, not a
//! render pipeline.

use super::shared::SEPARATOR;
use crate::context::AppContext;
use crate::error::BotResult;
use crate::models::{BotResponse, GenericMessage};
use crate::plugin::{h, Plugin, PluginBuilder};
use crate::search_index::get_trigrams;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

const DATA_PATH: &str = "data/weapon.json";
const REFERENCE_IMAGE_PATH: &str = "resources/images/weapon_names.png";
const FALLBACK_IMAGE_URL: &str = "https://uapis.cn/static/uploads/febd9ce692dee3c97a1b8e1a3bec3cc3.png";
const FUZZY_THRESHOLD: f64 = 0.3;

#[derive(Deserialize, Clone)]
struct WeaponEntry {
    #[serde(default)]
    aliases: Vec<String>,
    introduction: Option<String>,
    #[serde(default)]
    damage: Map<String, Value>,
    #[serde(default)]
    damage_decay: Map<String, Value>,
    #[serde(default)]
    technical_data: Map<String, Value>,
    #[serde(default)]
    ttk: Map<String, Value>,
}

fn weapon_data() -> &'static HashMap<String, WeaponEntry> {
    static DATA: OnceLock<HashMap<String, WeaponEntry>> = OnceLock::new();
    DATA.get_or_init(|| {
        std::fs::read(DATA_PATH)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .unwrap_or_default()
    })
}

fn lookup(query: &str) -> Option<(&'static str, &'static WeaponEntry)> {
    let data = weapon_data();
    let normalized = query.to_lowercase();

    for (name, entry) in data {
        if name.eq_ignore_ascii_case(&normalized) || entry.aliases.iter().any(|a| a.eq_ignore_ascii_case(&normalized)) {
            return Some((name.as_str(), entry));
        }
    }

    let query_trigrams = get_trigrams(&normalized);
    if query_trigrams.is_empty() {
        return None;
    }
    let mut best: Option<(&'static str, &'static WeaponEntry, f64)> = None;
    for (name, entry) in data {
        let mut names_to_check: Vec<&str> = vec![name.as_str()];
        names_to_check.extend(entry.aliases.iter().map(String::as_str));
        for candidate in names_to_check {
            let trigrams = get_trigrams(candidate);
            if trigrams.is_empty() {
                continue;
            }
            let intersection = query_trigrams.intersection(&trigrams).count();
            let union = query_trigrams.union(&trigrams).count();
            let similarity = if union > 0 { intersection as f64 / union as f64 } else { 0.0 };
            if similarity > FUZZY_THRESHOLD && best.as_ref().map(|(_, _, s)| similarity > *s).unwrap_or(true) {
                best = Some((name.as_str(), entry, similarity));
            }
        }
    }
    best.map(|(name, entry, _)| (name, entry))
}

const DAMAGE_LABELS: &[(&str, &str)] = &[
    ("body", "躯干伤害"),
    ("head", "爆头伤害"),
    ("pellet_damage", "每颗弹丸伤害"),
    ("pellet_count", "弹丸数量"),
    ("secondary", "次要攻击"),
    ("bullet_damage", "子弹伤害"),
    ("head_bullet_damage", "子弹爆头伤害"),
    ("bullet_count", "子弹数量"),
    ("direct", "直接命中伤害"),
    ("splash", "溅射伤害"),
    ("splash_radius", "溅射范围"),
];

const TECH_DISPLAY_ORDER: &[(&str, &str)] =
    &[("rpm", "射速"), ("magazine_size", "弹匣容量"), ("empty_reload", "空仓装填"), ("tactical_reload", "战术装填"), ("fire_mode", "射击模式")];

fn label_for(table: &[(&str, &str)], key: &str) -> String {
    table.iter().find(|(k, _)| *k == key).map(|(_, v)| v.to_string()).unwrap_or_else(|| key.to_string())
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn format_damage(damage: &Map<String, Value>) -> Option<String> {
    if damage.is_empty() {
        return None;
    }
    let mut parts = vec!["▎💥 基础伤害:".to_string()];
    for (key, value) in damage {
        parts.push(format!("▎ {}: {}", label_for(DAMAGE_LABELS, key), value_to_string(value)));
    }
    Some(parts.join("\n"))
}

fn format_damage_decay(decay: &Map<String, Value>) -> Option<String> {
    if decay.is_empty() {
        return None;
    }
    let min_range = decay.get("min_range").map(value_to_string).unwrap_or_else(|| "N/A".to_string());
    let max_range = decay.get("max_range").map(value_to_string).unwrap_or_else(|| "N/A".to_string());
    let multiplier = decay.get("decay_multiplier").map(value_to_string).unwrap_or_else(|| "N/A".to_string());
    Some(format!("▎📉 伤害衰减:\n▎ 起始衰减: {min_range}m\n▎ 最大衰减: {max_range}m\n▎ 衰减系数: {multiplier}"))
}

fn numeric_damage_per_shot(damage: &Map<String, Value>) -> f64 {
    let as_f64 = |v: &Value| v.as_f64().unwrap_or(0.0);
    if let Some(body) = damage.get("body") {
        as_f64(body)
    } else if let (Some(dmg), Some(count)) = (damage.get("pellet_damage"), damage.get("pellet_count")) {
        as_f64(dmg) * as_f64(count)
    } else if let (Some(dmg), Some(count)) = (damage.get("bullet_damage"), damage.get("bullet_count")) {
        as_f64(dmg) * as_f64(count)
    } else {
        0.0
    }
}

fn parse_leading_digits(s: &str) -> u64 {
    s.chars().take_while(|c| c.is_ascii_digit()).collect::<String>().parse().unwrap_or(0)
}

fn format_technical_data(tech: &Map<String, Value>, damage: &Map<String, Value>) -> Option<String> {
    if tech.is_empty() {
        return None;
    }
    let mut parts = vec!["▎🎯 武器参数:".to_string()];
    for (key, _) in TECH_DISPLAY_ORDER {
        if let Some(value) = tech.get(*key) {
            parts.push(format!("▎ {}: {}", label_for(TECH_DISPLAY_ORDER, key), value_to_string(value)));
        }
    }
    for (key, value) in tech {
        if !TECH_DISPLAY_ORDER.iter().any(|(k, _)| k == key) {
            parts.push(format!("▎ {}: {}", label_for(TECH_DISPLAY_ORDER, key), value_to_string(value)));
        }
    }

    let rpm = tech.get("rpm").map(value_to_string).map(|s| parse_leading_digits(&s)).unwrap_or(0);
    let damage_per_shot = numeric_damage_per_shot(damage);
    let dps = if rpm > 0 && damage_per_shot > 0.0 { (rpm as f64 * damage_per_shot / 60.0) as u64 } else { 0 };
    parts.push(format!("▎ 每秒伤害 (DPS): {dps}"));
    Some(parts.join("\n"))
}

const CLASS_HP: &[(&str, &str)] = &[("轻型", "150"), ("中型", "250"), ("重型", "350")];

fn format_ttk(ttk: &Map<String, Value>) -> Option<String> {
    if ttk.is_empty() {
        return None;
    }
    let mut parts = vec!["▎🔒 武器TTK:".to_string()];
    for (class_name, hp_key) in CLASS_HP {
        match ttk.get(*hp_key).and_then(Value::as_f64) {
            Some(value) => parts.push(format!("▎ {class_name} ({hp_key} HP): {value:.3}s")),
            None => parts.push(format!("▎ {class_name} ({hp_key} HP): N/A")),
        }
    }
    Some(parts.join("\n"))
}

fn format_weapon(weapon_name: &str, entry: &WeaponEntry) -> String {
    let mut parts = vec![format!("✨ {weapon_name} | THE FINALS")];
    if let Some(intro) = &entry.introduction {
        parts.push(format!("📖 简介: {intro}"));
    }
    if let Some(p) = format_damage(&entry.damage) {
        parts.push(p);
    }
    if let Some(p) = format_damage_decay(&entry.damage_decay) {
        parts.push(p);
    }
    if let Some(p) = format_technical_data(&entry.technical_data, &entry.damage) {
        parts.push(p);
    }
    if let Some(p) = format_ttk(&entry.ttk) {
        parts.push(p);
    }

    let body = parts.join(&format!("\n{SEPARATOR}\n"));
    format!("\n{body}\n{SEPARATOR}")
}

async fn weapon(_ctx: Arc<AppContext>, _msg: GenericMessage, args: String) -> BotResult<Vec<BotResponse>> {
    let weapon_name = args.trim();
    if weapon_name.is_empty() {
        return Ok(vec![BotResponse::Text(format!(
            "\n❌ 未指定武器名称\n{SEPARATOR}\n🎮 使用方法:\n- /weapon <武器名称>\n{SEPARATOR}\n💡 小贴士:\n武器名称可以用别名"
        ))]);
    }

    let Some((name, entry)) = lookup(weapon_name) else {
        let mut responses = vec![BotResponse::Text(format!("\n⚠️ 未找到武器 {weapon_name} 的信息，您可以在下方图片中找到对应名称后重试。"))];
        match std::fs::read(REFERENCE_IMAGE_PATH) {
            Ok(bytes) => responses.push(BotResponse::Image { bytes, alt_text: "武器名称对照表".to_string() }),
            Err(_) => responses.push(BotResponse::Text(format!("图片链接: {FALLBACK_IMAGE_URL}"))),
        }
        return Ok(responses);
    };

    Ok(vec![BotResponse::Text(format_weapon(name, entry))])
}

pub fn plugin() -> Plugin {
    PluginBuilder::new("weapon").command("weapon", "查询武器信息，示例: /weapon AKM", h(weapon)).build()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(damage: &[(&str, i64)]) -> WeaponEntry {
        let mut map = Map::new();
        for (k, v) in damage {
            map.insert(k.to_string(), Value::from(*v));
        }
        WeaponEntry { aliases: vec![], introduction: None, damage: map, damage_decay: Map::new(), technical_data: Map::new(), ttk: Map::new() }
    }

    #[test]
    fn dps_uses_body_damage_when_present() {
        let e = entry(&[("body", 32)]);
        let mut tech = Map::new();
        tech.insert("rpm".to_string(), Value::from("750"));
        let formatted = format_technical_data(&tech, &e.damage).unwrap();
        assert!(formatted.contains("DPS"));
    }

    #[test]
    fn pellet_weapons_multiply_damage_by_count() {
        let e = entry(&[("pellet_damage", 10), ("pellet_count", 8)]);
        assert_eq!(numeric_damage_per_shot(&e.damage), 80.0);
    }

    #[test]
    fn leading_digits_parse_ignores_trailing_text() {
        assert_eq!(parse_leading_digits("750rpm"), 750);
        assert_eq!(parse_leading_digits(""), 0);
    }
}
