//! In-memory operational store.
//!
//! Honours the same container and atomicity contract as the Redis
//! implementation; scripted blocks run under one lock, so the settlement
//! scripts stay atomic. Backs the integration test suite and local
//! development without a running Redis.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::scripts::AtomicScript;
use super::{OperationalStore, StoreError};

#[derive(Default)]
struct World {
    strings: HashMap<String, String>,
    hashes: HashMap<String, HashMap<String, String>>,
    zsets: HashMap<String, BTreeMap<String, f64>>,
    lists: HashMap<String, VecDeque<String>>,
    published: Vec<(String, String)>,
}

impl World {
    fn hash_i64(&self, key: &str, field: &str) -> i64 {
        self.hashes
            .get(key)
            .and_then(|h| h.get(field))
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }

    fn hash_incr(&mut self, key: &str, field: &str, delta: i64) -> i64 {
        let value = self.hash_i64(key, field) + delta;
        self.hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        value
    }

    fn hash_set(&mut self, key: &str, field: &str, value: String) {
        self.hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value);
    }
}

#[derive(Default)]
pub struct MemoryStore {
    world: Mutex<World>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages published so far, for test inspection.
    pub fn published(&self) -> Vec<(String, String)> {
        self.world.lock().published.clone()
    }

    fn run_script(
        world: &mut World,
        script: &AtomicScript,
        keys: &[String],
        args: &[i64],
    ) -> Result<i64, StoreError> {
        match script.name {
            "freeze" => {
                let (amount, now) = (args[0], args[1]);
                if world.hash_i64(&keys[0], "available") < amount {
                    return Ok(0);
                }
                world.hash_incr(&keys[0], "available", -amount);
                world.hash_incr(&keys[0], "frozen", amount);
                world.hash_set(&keys[0], "updated_at", now.to_string());
                Ok(1)
            }
            "unfreeze" => {
                let (amount, now) = (args[0], args[1]);
                if world.hash_i64(&keys[0], "frozen") < amount {
                    return Ok(0);
                }
                world.hash_incr(&keys[0], "frozen", -amount);
                world.hash_incr(&keys[0], "available", amount);
                world.hash_set(&keys[0], "updated_at", now.to_string());
                Ok(1)
            }
            "execute_trade" => {
                let (cost, qty, now) = (args[0], args[1], args[2]);
                if world.hash_i64(&keys[0], "frozen") < cost {
                    return Ok(0);
                }
                if world.hash_i64(&keys[2], "frozen") < qty {
                    return Ok(0);
                }
                world.hash_incr(&keys[0], "frozen", -cost);
                world.hash_incr(&keys[1], "available", qty);
                world.hash_incr(&keys[2], "frozen", -qty);
                world.hash_incr(&keys[3], "available", cost);
                for key in keys {
                    world.hash_set(key, "updated_at", now.to_string());
                }
                Ok(1)
            }
            other => Err(StoreError::Corrupt {
                key: other.to_string(),
                detail: "unknown script".to_string(),
            }),
        }
    }
}

#[async_trait]
impl OperationalStore for MemoryStore {
    async fn ping(&self) -> Result<Duration, StoreError> {
        Ok(Duration::ZERO)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.world.lock().strings.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.world
            .lock()
            .strings
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<bool, StoreError> {
        let mut world = self.world.lock();
        let removed = world.strings.remove(key).is_some()
            | world.hashes.remove(key).is_some()
            | world.zsets.remove(key).is_some()
            | world.lists.remove(key).is_some();
        Ok(removed)
    }

    async fn hset_multiple(
        &self,
        key: &str,
        fields: &[(String, String)],
    ) -> Result<(), StoreError> {
        let mut world = self.world.lock();
        let hash = world.hashes.entry(key.to_string()).or_default();
        for (field, value) in fields {
            hash.insert(field.clone(), value.clone());
        }
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .world
            .lock()
            .hashes
            .get(key)
            .and_then(|h| h.get(field).cloned()))
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        Ok(self.world.lock().hashes.get(key).cloned().unwrap_or_default())
    }

    async fn hincrby(&self, key: &str, field: &str, delta: i64) -> Result<i64, StoreError> {
        Ok(self.world.lock().hash_incr(key, field, delta))
    }

    async fn zadd(&self, key: &str, score: f64, member: &str) -> Result<bool, StoreError> {
        Ok(self
            .world
            .lock()
            .zsets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string(), score)
            .is_none())
    }

    async fn zrange(
        &self,
        key: &str,
        start: isize,
        stop: isize,
        ascending: bool,
    ) -> Result<Vec<String>, StoreError> {
        let world = self.world.lock();
        let Some(zset) = world.zsets.get(key) else {
            return Ok(Vec::new());
        };
        let mut members: Vec<(&String, f64)> = zset.iter().map(|(m, s)| (m, *s)).collect();
        members.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        if !ascending {
            members.reverse();
        }
        let len = members.len() as isize;
        let norm = |i: isize| -> isize {
            if i < 0 {
                (len + i).max(0)
            } else {
                i.min(len)
            }
        };
        let (lo, hi) = (norm(start), norm(stop));
        if lo > hi {
            return Ok(Vec::new());
        }
        Ok(members
            .into_iter()
            .skip(lo as usize)
            .take((hi - lo + 1) as usize)
            .map(|(m, _)| m.clone())
            .collect())
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        Ok(self
            .world
            .lock()
            .zsets
            .get_mut(key)
            .map(|z| z.remove(member).is_some())
            .unwrap_or(false))
    }

    async fn lpush(&self, key: &str, value: &str) -> Result<i64, StoreError> {
        let mut world = self.world.lock();
        let list = world.lists.entry(key.to_string()).or_default();
        list.push_front(value.to_string());
        Ok(list.len() as i64)
    }

    async fn rpop(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .world
            .lock()
            .lists
            .get_mut(key)
            .and_then(|l| l.pop_back()))
    }

    async fn llen(&self, key: &str) -> Result<i64, StoreError> {
        Ok(self
            .world
            .lock()
            .lists
            .get(key)
            .map(|l| l.len() as i64)
            .unwrap_or(0))
    }

    async fn rpoplpush(&self, src: &str, dst: &str) -> Result<Option<String>, StoreError> {
        let mut world = self.world.lock();
        let Some(value) = world.lists.get_mut(src).and_then(|l| l.pop_back()) else {
            return Ok(None);
        };
        world
            .lists
            .entry(dst.to_string())
            .or_default()
            .push_front(value.clone());
        Ok(Some(value))
    }

    async fn lrange(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<String>, StoreError> {
        let world = self.world.lock();
        let Some(list) = world.lists.get(key) else {
            return Ok(Vec::new());
        };
        let len = list.len() as isize;
        let norm = |i: isize| -> isize {
            if i < 0 {
                (len + i).max(0)
            } else {
                i.min(len - 1)
            }
        };
        if len == 0 {
            return Ok(Vec::new());
        }
        let (lo, hi) = (norm(start), norm(stop));
        if lo > hi {
            return Ok(Vec::new());
        }
        Ok(list
            .iter()
            .skip(lo as usize)
            .take((hi - lo + 1) as usize)
            .cloned()
            .collect())
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        let mut world = self.world.lock();
        let value = world
            .strings
            .get(key)
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0)
            + 1;
        world.strings.insert(key.to_string(), value.to_string());
        Ok(value)
    }

    async fn eval_script(
        &self,
        script: &AtomicScript,
        keys: &[String],
        args: &[i64],
    ) -> Result<i64, StoreError> {
        let mut world = self.world.lock();
        Self::run_script(&mut world, script, keys, args)
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<(), StoreError> {
        self.world
            .lock()
            .published
            .push((channel.to_string(), message.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::scripts;

    #[tokio::test]
    async fn test_freeze_script_guards_balance() {
        let store = MemoryStore::new();
        let key = "asset:{USDT}:1:USDT".to_string();
        store
            .hset_multiple(&key, &[("available".into(), "1000".into())])
            .await
            .unwrap();

        let ok = store
            .eval_script(&scripts::FREEZE, &[key.clone()], &[400, 1])
            .await
            .unwrap();
        assert_eq!(ok, 1);

        let short = store
            .eval_script(&scripts::FREEZE, &[key.clone()], &[700, 2])
            .await
            .unwrap();
        assert_eq!(short, 0);

        let all = store.hgetall(&key).await.unwrap();
        assert_eq!(all.get("available").map(String::as_str), Some("600"));
        assert_eq!(all.get("frozen").map(String::as_str), Some("400"));
    }

    #[tokio::test]
    async fn test_rpoplpush_moves_tail_to_head() {
        let store = MemoryStore::new();
        store.lpush("q", "a").await.unwrap();
        store.lpush("q", "b").await.unwrap();

        // "a" is the oldest item (tail)
        let moved = store.rpoplpush("q", "q:processing").await.unwrap();
        assert_eq!(moved.as_deref(), Some("a"));
        assert_eq!(store.llen("q").await.unwrap(), 1);
        assert_eq!(store.llen("q:processing").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_zrange_ordering() {
        let store = MemoryStore::new();
        store.zadd("z", 2.0, "two").await.unwrap();
        store.zadd("z", 1.0, "one").await.unwrap();
        store.zadd("z", 3.0, "three").await.unwrap();

        let ascending = store.zrange("z", 0, -1, true).await.unwrap();
        assert_eq!(ascending, vec!["one", "two", "three"]);
        let descending = store.zrange("z", 0, 0, false).await.unwrap();
        assert_eq!(descending, vec!["three"]);
    }
}
