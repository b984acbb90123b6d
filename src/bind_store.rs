//! Game-id bind table: one JSON document mapping platform user id -> bound
//! player name, persisted via `persistence::{load_json,save_json}`.
//! Grounded on `original_source/core/bind.py`'s `BindManager`.

use crate::models::BindRecord;
use crate::persistence;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::RwLock;

pub struct BindStore {
    path: PathBuf,
    data: RwLock<BindRecord>,
    notified_path: PathBuf,
    /// Users who've already seen the first-interaction welcome notice.
    /// Tracked separately from `binds` (original's `notified_users.json`):
    /// unbinding shouldn't make the welcome notice reappear.
    notified: RwLock<HashSet<String>>,
}

impl BindStore {
    pub fn load(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        let path = data_dir.join("binds.json");
        let notified_path = data_dir.join("notified_users.json");
        let data = persistence::load_json(&path);
        let notified = persistence::load_json(&notified_path);
        Self { path, data: RwLock::new(data), notified_path, notified: RwLock::new(notified) }
    }

    pub fn get(&self, user_id: &str) -> Option<String> {
        self.data.read().unwrap().binds.get(user_id).cloned()
    }

    /// Rejects rebinding over an id already bound to someone else, mirroring
    /// `BindPlugin._check_id_exists`.
    pub fn bind(&self, user_id: &str, game_id: &str) -> Result<(), String> {
        let mut data = self.data.write().unwrap();
        if let Some((other_user, _)) = data.binds.iter().find(|(u, id)| id.as_str() == game_id && u.as_str() != user_id) {
            return Err(format!("id already bound to another user ({other_user})"));
        }
        data.binds.insert(user_id.to_string(), game_id.to_string());
        persistence::save_json(&self.path, &*data).map_err(|e| e.to_string())
    }

    pub fn unbind(&self, user_id: &str) -> bool {
        let mut data = self.data.write().unwrap();
        let removed = data.binds.remove(user_id).is_some();
        if removed {
            let _ = persistence::save_json(&self.path, &*data);
        }
        removed
    }

    /// Whether `user_id` has never been shown the welcome notice, distinct
    /// from whether they've bound a game id.
    pub fn is_first_interaction(&self, user_id: &str) -> bool {
        !self.notified.read().unwrap().contains(user_id)
    }

    /// Records that `user_id` has now seen the welcome notice so it won't
    /// fire again, without touching the bind table.
    pub fn mark_notified(&self, user_id: &str) {
        let mut notified = self.notified.write().unwrap();
        if notified.insert(user_id.to_string()) {
            let _ = persistence::save_json(&self.notified_path, &*notified);
        }
    }
}

/// `^[a-zA-Z0-9_]+#\d{4}$`, the exact format `BindPlugin._validate_game_id`
/// enforces.
pub fn is_valid_game_id(id: &str) -> bool {
    let Some((handle, tag)) = id.split_once('#') else { return false };
    !handle.is_empty()
        && handle.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && tag.len() == 4
        && tag.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("bind-store-test-{:x}", uuid::Uuid::new_v4().as_u128()))
    }

    #[test]
    fn validates_game_id_format() {
        assert!(is_valid_game_id("Player#1234"));
        assert!(!is_valid_game_id("Player#123"));
        assert!(!is_valid_game_id("Player-1234"));
        assert!(!is_valid_game_id("Player#12345"));
    }

    #[test]
    fn binding_same_id_twice_to_different_users_is_rejected() {
        let dir = temp_dir();
        let store = BindStore::load(&dir);
        store.bind("user1", "Foo#1234").unwrap();
        assert!(store.bind("user2", "Foo#1234").is_err());
        assert_eq!(store.get("user1"), Some("Foo#1234".to_string()));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn unbind_removes_existing_entry() {
        let dir = temp_dir();
        let store = BindStore::load(&dir);
        store.bind("user1", "Foo#1234").unwrap();
        assert!(store.unbind("user1"));
        assert!(store.get("user1").is_none());
        assert!(!store.unbind("user1"));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn notified_state_is_independent_of_binds() {
        let dir = temp_dir();
        let store = BindStore::load(&dir);
        assert!(store.is_first_interaction("user1"));
        store.bind("user1", "Foo#1234").unwrap();
        assert!(store.is_first_interaction("user1"), "binding shouldn't mark notified");
        store.mark_notified("user1");
        assert!(!store.is_first_interaction("user1"));
        store.unbind("user1");
        assert!(!store.is_first_interaction("user1"), "unbinding shouldn't clear notified");
        std::fs::remove_dir_all(&dir).ok();
    }
}
