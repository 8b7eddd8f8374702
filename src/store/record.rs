//! Alarm record layout on top of a [`Mirror`].
//!
//! Each open alarm is stored twice:
//! * the record itself, serialized as JSON under the event id;
//! * the id as a member of the ordered set `p<priority>time`, scored by the
//!   record timestamp.
//!
//! The two writes are separate store operations. A crash or store failure
//! between them leaves a record without an index entry (or the reverse);
//! such leftovers are reconciled by the outdated sweep, which only trusts the
//! index and removes both halves.
//!
//! The sweep itself reads the index outside the classifier's per-id lock;
//! see [`crate::sweep::OutdatedSweeper`] for the refresh race that follows.

use super::Mirror;
use crate::error::{StoreError, StoreResult};
use crate::event::EventFull;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Persistent alarm record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dto {
    pub id: String,
    pub priority: u8,
    /// Unix timestamp (seconds) of the last update.
    pub timestamp: i64,
    /// Serialized [`EventFull`].
    pub payload: String,
}

impl Dto {
    pub fn from_event(event: &EventFull, timestamp: i64) -> StoreResult<Self> {
        let payload = event
            .to_json()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        Ok(Self {
            id: event.id().to_string(),
            priority: event.priority,
            timestamp,
            payload,
        })
    }

    pub fn event(&self) -> StoreResult<EventFull> {
        EventFull::from_json(&self.payload).map_err(|e| StoreError::Corrupt(e.to_string()))
    }
}

/// Alarm records and their per-priority index.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use tocsin::store::{AlarmStore, Dto, MemoryMirror};
///
/// let store = AlarmStore::new(Arc::new(MemoryMirror::new()), 3);
/// let dto = Dto { id: "s_1_host".into(), priority: 2, timestamp: 10, payload: "{}".into() };
/// store.save(&dto).unwrap();
/// assert_eq!(store.list_open_with_timestamp().unwrap()["s_1_host"], 10);
/// ```
#[derive(Clone)]
pub struct AlarmStore {
    mirror: Arc<dyn Mirror>,
    priority_buckets: u8,
}

impl AlarmStore {
    pub fn new(mirror: Arc<dyn Mirror>, priority_buckets: u8) -> Self {
        Self {
            mirror,
            priority_buckets: priority_buckets.max(1),
        }
    }

    pub fn mirror(&self) -> &Arc<dyn Mirror> {
        &self.mirror
    }

    /// Index key for a priority, clamped into the configured bucket range.
    pub fn bucket_key(&self, priority: u8) -> String {
        format!("p{}time", priority.clamp(1, self.priority_buckets))
    }

    pub fn get(&self, id: &str) -> StoreResult<Option<Dto>> {
        match self.mirror.get(id)? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| StoreError::Corrupt(format!("{}: {}", id, e))),
            None => Ok(None),
        }
    }

    /// Writes a record and indexes it under its priority.
    ///
    /// When the priority changed since the last write, the old index entry
    /// is removed first so the id never sits in two buckets. A stored record
    /// that cannot be decoded is dropped from every other bucket.
    pub fn save(&self, dto: &Dto) -> StoreResult<()> {
        let new_bucket = self.bucket_key(dto.priority);
        match self.get(&dto.id) {
            Ok(Some(existing)) => {
                let old_bucket = self.bucket_key(existing.priority);
                if old_bucket != new_bucket {
                    self.mirror.zrem(&old_bucket, &dto.id)?;
                }
            }
            Ok(None) => {}
            Err(StoreError::Corrupt(reason)) => {
                warn!("Overwriting undecodable record {}", reason);
                for priority in 1..=self.priority_buckets {
                    let bucket = self.bucket_key(priority);
                    if bucket != new_bucket {
                        self.mirror.zrem(&bucket, &dto.id)?;
                    }
                }
            }
            Err(e) => return Err(e),
        }

        let raw = serde_json::to_string(dto).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        self.mirror.set(&dto.id, &raw)?;
        self.mirror.zadd(&new_bucket, &dto.id, dto.timestamp)
    }

    /// Rewrites the note of a stored record, leaving its index untouched.
    ///
    /// Returns `false` when no record exists for `id`.
    pub fn update_note(&self, id: &str, note: &str) -> StoreResult<bool> {
        let mut dto = match self.get(id)? {
            Some(dto) => dto,
            None => return Ok(false),
        };
        let mut event = dto.event()?;
        event.note = note.to_string();
        dto.payload = event
            .to_json()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;

        let raw = serde_json::to_string(&dto).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        self.mirror.set(id, &raw)?;
        Ok(true)
    }

    /// Removes the record and its index entry.
    ///
    /// A record that cannot be decoded is removed from every bucket.
    pub fn remove(&self, id: &str) -> StoreResult<()> {
        match self.get(id) {
            Ok(Some(dto)) => self.mirror.zrem(&self.bucket_key(dto.priority), id)?,
            Ok(None) | Err(StoreError::Corrupt(_)) => {
                for priority in 1..=self.priority_buckets {
                    self.mirror.zrem(&self.bucket_key(priority), id)?;
                }
            }
            Err(e) => return Err(e),
        }
        self.mirror.delete(id)
    }

    /// Every indexed id with its last update time.
    pub fn list_open_with_timestamp(&self) -> StoreResult<HashMap<String, i64>> {
        let mut open = HashMap::new();
        for priority in 1..=self.priority_buckets {
            for (id, timestamp) in self.mirror.zrange_with_scores(&self.bucket_key(priority))? {
                open.insert(id, timestamp);
            }
        }
        Ok(open)
    }

    pub fn open_ids(&self) -> StoreResult<Vec<String>> {
        Ok(self.list_open_with_timestamp()?.into_keys().collect())
    }

    pub fn load_event(&self, id: &str) -> StoreResult<Option<EventFull>> {
        match self.get(id)? {
            Some(dto) => dto.event().map(Some),
            None => Ok(None),
        }
    }
}
