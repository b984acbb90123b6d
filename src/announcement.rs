//! Announcement Scheduler (AS): per-guild daily-capped broadcast
//! selection from config, `Asia/Shanghai` wall-clock. Grounded on
//! `original_source/core/announcement.py`'s `AnnouncementManager`.

use crate::config::AnnouncementsConfig;
use crate::persistence;
use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Asia::Shanghai;
use chrono_tz::Tz;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

const MAX_PER_GUILD_PER_DAY: u32 = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct Announcement {
    pub id: String,
    pub message: String,
}

struct ParsedAnnouncement {
    id: String,
    message: String,
    start: DateTime<Tz>,
    end: DateTime<Tz>,
}

#[derive(Default, Clone, serde::Serialize, serde::Deserialize)]
struct GuildSentState {
    date: String,
    count: u32,
}

pub struct AnnouncementScheduler {
    enabled: bool,
    announcements: Vec<ParsedAnnouncement>,
    sent_path: PathBuf,
    sent: RwLock<HashMap<String, GuildSentState>>,
}

impl AnnouncementScheduler {
    pub fn load(config: &AnnouncementsConfig, data_dir: impl Into<PathBuf>) -> Self {
        let sent_path = data_dir.into().join("sent_announcements.json");
        let sent = persistence::load_json(&sent_path);

        let mut announcements = Vec::new();
        if config.enabled {
            for item in &config.items {
                match (DateTime::parse_from_rfc3339(&item.start_time), DateTime::parse_from_rfc3339(&item.end_time)) {
                    (Ok(start), Ok(end)) => announcements.push(ParsedAnnouncement {
                        id: item.id.clone(),
                        message: item.message.clone(),
                        start: start.with_timezone(&Shanghai),
                        end: end.with_timezone(&Shanghai),
                    }),
                    _ => {
                        // Naive local timestamps (no offset) parse as Shanghai wall-clock directly.
                        match (naive_shanghai(&item.start_time), naive_shanghai(&item.end_time)) {
                            (Some(start), Some(end)) => {
                                announcements.push(ParsedAnnouncement { id: item.id.clone(), message: item.message.clone(), start, end })
                            }
                            _ => tracing::error!(id = %item.id, "failed to parse announcement time window"),
                        }
                    }
                }
            }
        }

        Self { enabled: config.enabled, announcements, sent_path, sent: RwLock::new(sent) }
    }

    fn active_announcement(&self, now: DateTime<Tz>) -> Option<&ParsedAnnouncement> {
        self.announcements.iter().find(|a| a.start <= now && now <= a.end)
    }

    /// Finds the active announcement, if any, and whether `guild_id` still
    /// has room under today's per-guild cap. Caller must call `mark_sent`
    /// after actually delivering it.
    pub fn get_for_guild(&self, guild_id: &str) -> Option<Announcement> {
        if !self.enabled {
            return None;
        }
        let now = Utc::now().with_timezone(&Shanghai);
        let active = self.active_announcement(now)?;

        let today = now.format("%Y-%m-%d").to_string();
        let sent = self.sent.read().unwrap();
        let count = sent.get(guild_id).filter(|s| s.date == today).map(|s| s.count).unwrap_or(0);
        if count >= MAX_PER_GUILD_PER_DAY {
            return None;
        }

        Some(Announcement { id: active.id.clone(), message: active.message.clone() })
    }

    pub fn mark_sent(&self, guild_id: &str) {
        let now = Utc::now().with_timezone(&Shanghai);
        let today = now.format("%Y-%m-%d").to_string();

        let mut sent = self.sent.write().unwrap();
        let entry = sent.entry(guild_id.to_string()).or_default();
        if entry.date != today {
            entry.date = today;
            entry.count = 1;
        } else {
            entry.count += 1;
        }
        let _ = persistence::save_json(&self.sent_path, &*sent);
    }
}

fn naive_shanghai(s: &str) -> Option<DateTime<Tz>> {
    let naive = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").or_else(|_| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")).ok()?;
    Shanghai.from_local_datetime(&naive).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnnouncementItem;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("announcement-test-{:x}", uuid::Uuid::new_v4().as_u128()))
    }

    fn config_with(start: &str, end: &str) -> AnnouncementsConfig {
        AnnouncementsConfig {
            enabled: true,
            items: vec![AnnouncementItem { id: "a1".into(), message: "hello".into(), start_time: start.into(), end_time: end.into() }],
        }
    }

    #[test]
    fn disabled_config_never_serves_announcements() {
        let mut config = config_with("2000-01-01T00:00:00", "2999-01-01T00:00:00");
        config.enabled = false;
        let scheduler = AnnouncementScheduler::load(&config, temp_dir());
        assert!(scheduler.get_for_guild("guild1").is_none());
    }

    #[test]
    fn outside_active_window_serves_nothing() {
        let config = config_with("2000-01-01T00:00:00", "2000-01-02T00:00:00");
        let scheduler = AnnouncementScheduler::load(&config, temp_dir());
        assert!(scheduler.get_for_guild("guild1").is_none());
    }

    #[test]
    fn active_window_serves_until_daily_cap() {
        let config = config_with("2000-01-01T00:00:00", "2999-01-01T00:00:00");
        let dir = temp_dir();
        let scheduler = AnnouncementScheduler::load(&config, &dir);
        for _ in 0..MAX_PER_GUILD_PER_DAY {
            let got = scheduler.get_for_guild("guild1");
            assert!(got.is_some());
            scheduler.mark_sent("guild1");
        }
        assert!(scheduler.get_for_guild("guild1").is_none());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn caps_are_independent_per_guild() {
        let config = config_with("2000-01-01T00:00:00", "2999-01-01T00:00:00");
        let dir = temp_dir();
        let scheduler = AnnouncementScheduler::load(&config, &dir);
        for _ in 0..MAX_PER_GUILD_PER_DAY {
            scheduler.mark_sent("guild1");
        }
        assert!(scheduler.get_for_guild("guild1").is_none());
        assert!(scheduler.get_for_guild("guild2").is_some());
        std::fs::remove_dir_all(&dir).ok();
    }
}
