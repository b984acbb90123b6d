//! Key-Value Store Facade (KVS). Uniform API over an external KV/hash/
//! sorted-set service used for the cache tiers described in spec §4.2/§6.
//! Grounded on `original_source/utils/redis_manager.py`'s method surface,
//! split across a text and binary namespace so binary values never get
//! mangled by UTF-8 decoding — defined as a trait so SP/CC unit tests don't
//! need a live Redis instance.

use crate::error::{BotError, BotResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn set(&self, key: &str, value: &str, expire_secs: Option<u64>) -> BotResult<()>;
    async fn get(&self, key: &str) -> BotResult<Option<String>>;
    async fn set_bytes(&self, key: &str, value: &[u8], expire_secs: Option<u64>) -> BotResult<()>;
    async fn get_bytes(&self, key: &str) -> BotResult<Option<Vec<u8>>>;
    async fn delete(&self, keys: &[String]) -> BotResult<u64>;
    async fn exists(&self, key: &str) -> BotResult<bool>;
    async fn keys_with_prefix(&self, prefix: &str) -> BotResult<Vec<String>>;

    async fn hgetall(&self, name: &str) -> BotResult<HashMap<String, String>>;
    async fn hmset(&self, name: &str, mapping: &HashMap<String, String>) -> BotResult<()>;
    async fn hget(&self, name: &str, field: &str) -> BotResult<Option<String>>;
    async fn hset(&self, name: &str, field: &str, value: &str) -> BotResult<()>;

    async fn zadd(&self, name: &str, mapping: &[(String, f64)]) -> BotResult<()>;
    async fn zrevrange(&self, name: &str, start: isize, stop: isize) -> BotResult<Vec<String>>;
    async fn zrevrange_withscores(&self, name: &str, start: isize, stop: isize) -> BotResult<Vec<(String, f64)>>;
    async fn zscore(&self, name: &str, member: &str) -> BotResult<Option<f64>>;
    async fn zrevrank(&self, name: &str, member: &str) -> BotResult<Option<u64>>;

    /// Atomic pipelined batch of plain string sets, required by SP's
    /// batch-of-100 write pattern (spec §4.5).
    async fn pipelined_set(&self, items: &[(String, String, Option<u64>)]) -> BotResult<()>;
}

/// Redis-backed implementation, the concrete KVS client per SPEC_FULL §1.1.
pub struct RedisStore {
    client: redis::Client,
}

impl RedisStore {
    pub fn new(url: &str) -> BotResult<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| BotError::Internal(format!("invalid redis url: {e}")))?;
        Ok(Self { client })
    }

    async fn conn(&self) -> BotResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| BotError::TransientUpstream(format!("redis connection failed: {e}")))
    }
}

fn redis_err(e: redis::RedisError) -> BotError {
    BotError::TransientUpstream(format!("redis error: {e}"))
}

#[async_trait]
impl KvStore for RedisStore {
    async fn set(&self, key: &str, value: &str, expire_secs: Option<u64>) -> BotResult<()> {
        use redis::AsyncCommands;
        let mut conn = self.conn().await?;
        match expire_secs {
            Some(ttl) => conn.set_ex::<_, _, ()>(key, value, ttl).await.map_err(redis_err),
            None => conn.set::<_, _, ()>(key, value).await.map_err(redis_err),
        }
    }

    async fn get(&self, key: &str) -> BotResult<Option<String>> {
        use redis::AsyncCommands;
        let mut conn = self.conn().await?;
        conn.get(key).await.map_err(redis_err)
    }

    async fn set_bytes(&self, key: &str, value: &[u8], expire_secs: Option<u64>) -> BotResult<()> {
        use redis::AsyncCommands;
        let mut conn = self.conn().await?;
        match expire_secs {
            Some(ttl) => conn
                .set_ex::<_, _, ()>(key, value, ttl)
                .await
                .map_err(redis_err),
            None => conn.set::<_, _, ()>(key, value).await.map_err(redis_err),
        }
    }

    async fn get_bytes(&self, key: &str) -> BotResult<Option<Vec<u8>>> {
        use redis::AsyncCommands;
        let mut conn = self.conn().await?;
        conn.get(key).await.map_err(redis_err)
    }

    async fn delete(&self, keys: &[String]) -> BotResult<u64> {
        use redis::AsyncCommands;
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn().await?;
        conn.del(keys).await.map_err(redis_err)
    }

    async fn exists(&self, key: &str) -> BotResult<bool> {
        use redis::AsyncCommands;
        let mut conn = self.conn().await?;
        conn.exists(key).await.map_err(redis_err)
    }

    async fn keys_with_prefix(&self, prefix: &str) -> BotResult<Vec<String>> {
        use redis::AsyncCommands;
        let mut conn = self.conn().await?;
        conn.keys(format!("{prefix}*")).await.map_err(redis_err)
    }

    async fn hgetall(&self, name: &str) -> BotResult<HashMap<String, String>> {
        use redis::AsyncCommands;
        let mut conn = self.conn().await?;
        conn.hgetall(name).await.map_err(redis_err)
    }

    async fn hmset(&self, name: &str, mapping: &HashMap<String, String>) -> BotResult<()> {
        use redis::AsyncCommands;
        if mapping.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn().await?;
        let pairs: Vec<(&String, &String)> = mapping.iter().collect();
        conn.hset_multiple::<_, _, _, ()>(name, &pairs)
            .await
            .map_err(redis_err)
    }

    async fn hget(&self, name: &str, field: &str) -> BotResult<Option<String>> {
        use redis::AsyncCommands;
        let mut conn = self.conn().await?;
        conn.hget(name, field).await.map_err(redis_err)
    }

    async fn hset(&self, name: &str, field: &str, value: &str) -> BotResult<()> {
        use redis::AsyncCommands;
        let mut conn = self.conn().await?;
        conn.hset::<_, _, _, ()>(name, field, value)
            .await
            .map_err(redis_err)
    }

    async fn zadd(&self, name: &str, mapping: &[(String, f64)]) -> BotResult<()> {
        use redis::AsyncCommands;
        if mapping.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn().await?;
        let pairs: Vec<(f64, &String)> = mapping.iter().map(|(m, s)| (*s, m)).collect();
        conn.zadd_multiple::<_, _, _, ()>(name, &pairs)
            .await
            .map_err(redis_err)
    }

    async fn zrevrange(&self, name: &str, start: isize, stop: isize) -> BotResult<Vec<String>> {
        use redis::AsyncCommands;
        let mut conn = self.conn().await?;
        conn.zrevrange(name, start, stop).await.map_err(redis_err)
    }

    async fn zrevrange_withscores(&self, name: &str, start: isize, stop: isize) -> BotResult<Vec<(String, f64)>> {
        use redis::AsyncCommands;
        let mut conn = self.conn().await?;
        conn.zrevrange_withscores(name, start, stop).await.map_err(redis_err)
    }

    async fn zscore(&self, name: &str, member: &str) -> BotResult<Option<f64>> {
        use redis::AsyncCommands;
        let mut conn = self.conn().await?;
        conn.zscore(name, member).await.map_err(redis_err)
    }

    async fn zrevrank(&self, name: &str, member: &str) -> BotResult<Option<u64>> {
        use redis::AsyncCommands;
        let mut conn = self.conn().await?;
        conn.zrevrank(name, member).await.map_err(redis_err)
    }

    async fn pipelined_set(&self, items: &[(String, String, Option<u64>)]) -> BotResult<()> {
        if items.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn().await?;
        let mut pipe = redis::pipe();
        for (key, value, ttl) in items {
            match ttl {
                Some(t) => {
                    pipe.set_ex(key, value, *t).ignore();
                }
                None => {
                    pipe.set(key, value).ignore();
                }
            }
        }
        pipe.query_async::<()>(&mut conn).await.map_err(redis_err)
    }
}

/// In-memory fake for unit tests (SP/CC logic, TSI hand-off) that don't need
/// a live Redis instance. Ignores TTLs (tests assert on presence/absence of
/// keys synchronously within a single tick, never real expiry).
#[derive(Default)]
pub struct FakeKvStore {
    strings: Mutex<HashMap<String, String>>,
    binaries: Mutex<HashMap<String, Vec<u8>>>,
    hashes: Mutex<HashMap<String, HashMap<String, String>>>,
    zsets: Mutex<HashMap<String, Vec<(String, f64)>>>,
}

impl FakeKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for FakeKvStore {
    async fn set(&self, key: &str, value: &str, _expire_secs: Option<u64>) -> BotResult<()> {
        self.strings.lock().unwrap().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> BotResult<Option<String>> {
        Ok(self.strings.lock().unwrap().get(key).cloned())
    }

    async fn set_bytes(&self, key: &str, value: &[u8], _expire_secs: Option<u64>) -> BotResult<()> {
        self.binaries.lock().unwrap().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn get_bytes(&self, key: &str) -> BotResult<Option<Vec<u8>>> {
        Ok(self.binaries.lock().unwrap().get(key).cloned())
    }

    async fn delete(&self, keys: &[String]) -> BotResult<u64> {
        let mut strings = self.strings.lock().unwrap();
        let mut count = 0u64;
        for k in keys {
            if strings.remove(k).is_some() {
                count += 1;
            }
        }
        Ok(count)
    }

    async fn exists(&self, key: &str) -> BotResult<bool> {
        Ok(self.strings.lock().unwrap().contains_key(key))
    }

    async fn keys_with_prefix(&self, prefix: &str) -> BotResult<Vec<String>> {
        Ok(self
            .strings
            .lock()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn hgetall(&self, name: &str) -> BotResult<HashMap<String, String>> {
        Ok(self.hashes.lock().unwrap().get(name).cloned().unwrap_or_default())
    }

    async fn hmset(&self, name: &str, mapping: &HashMap<String, String>) -> BotResult<()> {
        self.hashes
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default()
            .extend(mapping.clone());
        Ok(())
    }

    async fn hget(&self, name: &str, field: &str) -> BotResult<Option<String>> {
        Ok(self
            .hashes
            .lock()
            .unwrap()
            .get(name)
            .and_then(|h| h.get(field).cloned()))
    }

    async fn hset(&self, name: &str, field: &str, value: &str) -> BotResult<()> {
        self.hashes
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn zadd(&self, name: &str, mapping: &[(String, f64)]) -> BotResult<()> {
        let mut zsets = self.zsets.lock().unwrap();
        let entry = zsets.entry(name.to_string()).or_default();
        for (member, score) in mapping {
            entry.retain(|(m, _)| m != member);
            entry.push((member.clone(), *score));
        }
        Ok(())
    }

    async fn zrevrange(&self, name: &str, start: isize, stop: isize) -> BotResult<Vec<String>> {
        let mut zsets = self.zsets.lock().unwrap();
        let entry = zsets.entry(name.to_string()).or_default();
        entry.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
        let len = entry.len() as isize;
        let start = start.max(0).min(len);
        let stop = if stop < 0 { len + stop + 1 } else { (stop + 1).min(len) };
        if start >= stop {
            return Ok(vec![]);
        }
        Ok(entry[start as usize..stop as usize]
            .iter()
            .map(|(m, _)| m.clone())
            .collect())
    }

    async fn zrevrange_withscores(&self, name: &str, start: isize, stop: isize) -> BotResult<Vec<(String, f64)>> {
        let mut zsets = self.zsets.lock().unwrap();
        let entry = zsets.entry(name.to_string()).or_default();
        entry.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
        let len = entry.len() as isize;
        let start = start.max(0).min(len);
        let stop = if stop < 0 { len + stop + 1 } else { (stop + 1).min(len) };
        if start >= stop {
            return Ok(vec![]);
        }
        Ok(entry[start as usize..stop as usize].to_vec())
    }

    async fn zscore(&self, name: &str, member: &str) -> BotResult<Option<f64>> {
        let zsets = self.zsets.lock().unwrap();
        Ok(zsets.get(name).and_then(|entry| entry.iter().find(|(m, _)| m == member).map(|(_, s)| *s)))
    }

    async fn zrevrank(&self, name: &str, member: &str) -> BotResult<Option<u64>> {
        let mut zsets = self.zsets.lock().unwrap();
        let entry = zsets.entry(name.to_string()).or_default();
        entry.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
        Ok(entry.iter().position(|(m, _)| m == member).map(|i| i as u64))
    }

    async fn pipelined_set(&self, items: &[(String, String, Option<u64>)]) -> BotResult<()> {
        let mut strings = self.strings.lock().unwrap();
        for (key, value, _ttl) in items {
            strings.insert(key.clone(), value.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_store_round_trips_strings_and_hashes() {
        let store = FakeKvStore::new();
        store.set("player:foo", "{}", Some(60)).await.unwrap();
        assert_eq!(store.get("player:foo").await.unwrap(), Some("{}".to_string()));
        assert!(store.exists("player:foo").await.unwrap());

        let mut mapping = HashMap::new();
        mapping.insert("TAG".to_string(), "tag-json".to_string());
        store.hmset("clubs:all", &mapping).await.unwrap();
        assert_eq!(
            store.hget("clubs:all", "TAG").await.unwrap(),
            Some("tag-json".to_string())
        );
    }

    #[tokio::test]
    async fn fake_store_zrevrange_orders_descending() {
        let store = FakeKvStore::new();
        store
            .zadd("flappy_bird:scores", &[("a".into(), 3.0), ("b".into(), 9.0), ("c".into(), 1.0)])
            .await
            .unwrap();
        let top = store.zrevrange("flappy_bird:scores", 0, 1).await.unwrap();
        assert_eq!(top, vec!["b".to_string(), "a".to_string()]);
    }
}
