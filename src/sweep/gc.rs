use crate::error::StoreResult;
use crate::metrics::{GC_DELETED, STORE_ERRORS};
use crate::shutdown::Shutdown;
use crate::store::Mirror;
use crate::strategy::StrategyResolver;
use chrono::Utc;
use log::{debug, error, info};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

const SECONDS_PER_DAY: u64 = 86_400;

/// Expires stale keys of the raw value cache by random sampling.
///
/// Each tick samples about `keys / ticks-per-day` keys, so the whole
/// keyspace is visited roughly once a day. Alarm records, no-data state and
/// the no-data checker's keys are never touched.
pub struct GcSweeper {
    mirror: Arc<dyn Mirror>,
    resolver: Arc<dyn StrategyResolver>,
    interval: Duration,
    expiry: Duration,
    raw_prefix: String,
    protected_prefixes: Vec<String>,
}

impl GcSweeper {
    pub fn new(
        mirror: Arc<dyn Mirror>,
        resolver: Arc<dyn StrategyResolver>,
        interval: Duration,
        expiry: Duration,
        raw_prefix: &str,
        protected_prefixes: &[&str],
    ) -> Self {
        Self {
            mirror,
            resolver,
            interval,
            expiry,
            raw_prefix: raw_prefix.to_string(),
            protected_prefixes: protected_prefixes.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// Number of keys to sample per tick.
    pub fn sample_size(&self) -> StoreResult<usize> {
        let keys = self.mirror.key_count()?;
        if keys == 0 {
            return Ok(0);
        }
        let ticks_per_day = (SECONDS_PER_DAY / self.interval.as_secs().max(1)).max(1) as usize;
        Ok((keys / ticks_per_day).max(1))
    }

    /// Returns `true` when `key` belongs to the raw cache.
    pub fn is_collectable(&self, key: &str, nodata_keys: &HashSet<String>) -> bool {
        key.starts_with(&self.raw_prefix)
            && !self.protected_prefixes.iter().any(|p| key.starts_with(p.as_str()))
            && !nodata_keys.contains(key)
    }

    /// Samples the keyspace once, deleting expired raw keys.
    ///
    /// # Returns
    /// The number of keys deleted.
    pub fn tick(&self, now: i64) -> usize {
        match self.collect(now) {
            Ok(deleted) => {
                if deleted > 0 {
                    GC_DELETED.inc_by(deleted as u64);
                    info!("GC sweep deleted {} expired keys", deleted);
                } else {
                    debug!("GC sweep deleted nothing");
                }
                deleted
            }
            Err(e) => {
                STORE_ERRORS.inc();
                error!("GC sweep failed: {}", e);
                0
            }
        }
    }

    fn collect(&self, now: i64) -> StoreResult<usize> {
        let samples = self.sample_size()?;
        let nodata_keys: HashSet<String> = self.resolver.nodata_keys().into_iter().collect();
        let cutoff = now - self.expiry.as_secs() as i64;

        let mut deleted = 0;
        for _ in 0..samples {
            let key = match self.mirror.random_key()? {
                Some(key) => key,
                None => break,
            };
            if !self.is_collectable(&key, &nodata_keys) {
                continue;
            }
            if let Some(written) = self.mirror.last_write(&key)? {
                if written <= cutoff {
                    self.mirror.delete(&key)?;
                    debug!("Deleted {} last written at {}", key, written);
                    deleted += 1;
                }
            }
        }
        Ok(deleted)
    }

    pub async fn run(&self, shutdown: Shutdown) {
        info!("GC sweep loop started");
        while !shutdown.is_requested() {
            if !shutdown.sleep(self.interval).await {
                break;
            }
            self.tick(Utc::now().timestamp());
        }
        info!("GC sweep loop stopped");
    }
}
