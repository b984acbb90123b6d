//! Id-protection table: one user protects at most one game id, one game id
//! is protected by at most one user. Grounded on
//! `original_source/core/lock.py`'s `LockManager`.

use crate::persistence;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

pub struct LockStore {
    path: PathBuf,
    protector_of: RwLock<HashMap<String, String>>,
    /// user id -> protected game id, the inverse index of `protector_of`.
    protected_by_user: RwLock<HashMap<String, String>>,
}

impl LockStore {
    pub fn load(data_dir: impl Into<PathBuf>) -> Self {
        let path = data_dir.into().join("locks.json");
        let stored: StoredLocks = persistence::load_json(&path);
        let protected_by_user = stored.protector_of.iter().map(|(id, user)| (user.clone(), id.clone())).collect();
        Self { path, protector_of: RwLock::new(stored.protector_of), protected_by_user: RwLock::new(protected_by_user) }
    }

    pub fn is_protected(&self, game_id: &str) -> bool {
        self.protector_of.read().unwrap().contains_key(game_id)
    }

    pub fn protector_of(&self, game_id: &str) -> Option<String> {
        self.protector_of.read().unwrap().get(game_id).cloned()
    }

    pub fn protected_id_of(&self, user_id: &str) -> Option<String> {
        self.protected_by_user.read().unwrap().get(user_id).cloned()
    }

    pub fn protect(&self, user_id: &str, game_id: &str) -> Result<(), String> {
        if self.protected_id_of(user_id).is_some() {
            return Err("user already protects an id".into());
        }
        let mut protector_of = self.protector_of.write().unwrap();
        if protector_of.contains_key(game_id) {
            return Err("id already protected".into());
        }
        protector_of.insert(game_id.to_string(), user_id.to_string());
        self.protected_by_user.write().unwrap().insert(user_id.to_string(), game_id.to_string());
        self.persist(&protector_of)
    }

    pub fn unprotect(&self, user_id: &str) -> Option<String> {
        let game_id = self.protected_by_user.write().unwrap().remove(user_id)?;
        let mut protector_of = self.protector_of.write().unwrap();
        protector_of.remove(&game_id);
        let _ = self.persist(&protector_of);
        Some(game_id)
    }

    fn persist(&self, protector_of: &HashMap<String, String>) -> Result<(), String> {
        let stored = StoredLocks { protector_of: protector_of.clone() };
        persistence::save_json(&self.path, &stored).map_err(|e| e.to_string())
    }
}

#[derive(Default, serde::Serialize, serde::Deserialize)]
struct StoredLocks {
    protector_of: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("lock-store-test-{:x}", uuid::Uuid::new_v4().as_u128()))
    }

    #[test]
    fn one_id_per_user_and_one_user_per_id() {
        let dir = temp_dir();
        let store = LockStore::load(&dir);
        store.protect("user1", "Foo#1234").unwrap();
        assert!(store.protect("user1", "Bar#5678").is_err());
        assert!(store.protect("user2", "Foo#1234").is_err());
        assert_eq!(store.protector_of("Foo#1234"), Some("user1".to_string()));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn unprotect_frees_the_id() {
        let dir = temp_dir();
        let store = LockStore::load(&dir);
        store.protect("user1", "Foo#1234").unwrap();
        assert_eq!(store.unprotect("user1"), Some("Foo#1234".to_string()));
        assert!(!store.is_protected("Foo#1234"));
        assert!(store.unprotect("user1").is_none());
        std::fs::remove_dir_all(&dir).ok();
    }
}
