//! In-process [`Mirror`] backend.
//!
//! `MemoryMirror` keeps every structure behind one lock and records the time
//! of each plain key write so the GC sweep can age entries. It also supports
//! failure injection, which the tests use to exercise the best-effort paths.
//!
//! # Example
//! ```
//! use tocsin::store::{MemoryMirror, Mirror};
//!
//! let mirror = MemoryMirror::new();
//! mirror.set("raw/cpu", "0.5").unwrap();
//! mirror.zadd("p1time", "s_1_host", 100).unwrap();
//! assert_eq!(mirror.get("raw/cpu").unwrap(), Some("0.5".to_string()));
//! assert_eq!(mirror.zrange_with_scores("p1time").unwrap().len(), 1);
//! ```

use super::Mirror;
use crate::error::{StoreError, StoreResult};
use chrono::Utc;
use parking_lot::Mutex;
use rand::seq::IteratorRandom;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

#[derive(Default)]
struct Inner {
    kv: HashMap<String, (String, i64)>,
    zsets: HashMap<String, HashMap<String, i64>>,
    lists: HashMap<String, VecDeque<String>>,
    flags: HashMap<String, Instant>,
}

#[derive(Default)]
pub struct MemoryMirror {
    inner: Mutex<Inner>,
    failing: AtomicBool,
}

impl MemoryMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent operation fail with [`StoreError::Unavailable`].
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Writes `key` as if it had been written at `timestamp`.
    pub fn set_at(&self, key: &str, value: &str, timestamp: i64) {
        self.inner
            .lock()
            .kv
            .insert(key.to_string(), (value.to_string(), timestamp));
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.lock().kv.contains_key(key)
    }

    fn check(&self) -> StoreResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("injected failure".to_string()))
        } else {
            Ok(())
        }
    }
}

impl Mirror for MemoryMirror {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.check()?;
        Ok(self.inner.lock().kv.get(key).map(|(value, _)| value.clone()))
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.check()?;
        self.set_at(key, value, Utc::now().timestamp());
        Ok(())
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        self.check()?;
        self.inner.lock().kv.remove(key);
        Ok(())
    }

    fn last_write(&self, key: &str) -> StoreResult<Option<i64>> {
        self.check()?;
        Ok(self.inner.lock().kv.get(key).map(|(_, written)| *written))
    }

    fn key_count(&self) -> StoreResult<usize> {
        self.check()?;
        Ok(self.inner.lock().kv.len())
    }

    fn random_key(&self) -> StoreResult<Option<String>> {
        self.check()?;
        let inner = self.inner.lock();
        Ok(inner.kv.keys().choose(&mut rand::thread_rng()).cloned())
    }

    fn zadd(&self, set: &str, member: &str, score: i64) -> StoreResult<()> {
        self.check()?;
        self.inner
            .lock()
            .zsets
            .entry(set.to_string())
            .or_default()
            .insert(member.to_string(), score);
        Ok(())
    }

    fn zrem(&self, set: &str, member: &str) -> StoreResult<()> {
        self.check()?;
        let mut inner = self.inner.lock();
        if let Some(members) = inner.zsets.get_mut(set) {
            members.remove(member);
            if members.is_empty() {
                inner.zsets.remove(set);
            }
        }
        Ok(())
    }

    fn zrange_with_scores(&self, set: &str) -> StoreResult<Vec<(String, i64)>> {
        self.check()?;
        let inner = self.inner.lock();
        let mut members: Vec<(String, i64)> = inner
            .zsets
            .get(set)
            .map(|members| {
                members
                    .iter()
                    .map(|(member, score)| (member.clone(), *score))
                    .collect()
            })
            .unwrap_or_default();
        members.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        Ok(members)
    }

    fn rpush(&self, list: &str, value: &str) -> StoreResult<()> {
        self.check()?;
        self.inner
            .lock()
            .lists
            .entry(list.to_string())
            .or_default()
            .push_back(value.to_string());
        Ok(())
    }

    fn lpop(&self, list: &str) -> StoreResult<Option<String>> {
        self.check()?;
        Ok(self
            .inner
            .lock()
            .lists
            .get_mut(list)
            .and_then(|values| values.pop_front()))
    }

    fn llen(&self, list: &str) -> StoreResult<usize> {
        self.check()?;
        Ok(self.inner.lock().lists.get(list).map_or(0, |values| values.len()))
    }

    fn flag_set(&self, key: &str, ttl: Duration) -> StoreResult<()> {
        self.check()?;
        self.inner
            .lock()
            .flags
            .insert(key.to_string(), Instant::now() + ttl);
        Ok(())
    }

    fn flag_get(&self, key: &str) -> StoreResult<bool> {
        self.check()?;
        let mut inner = self.inner.lock();
        match inner.flags.get(key) {
            Some(expires) if *expires > Instant::now() => Ok(true),
            Some(_) => {
                inner.flags.remove(key);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    fn flag_del(&self, key: &str) -> StoreResult<()> {
        self.check()?;
        self.inner.lock().flags.remove(key);
        Ok(())
    }
}
