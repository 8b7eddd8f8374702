//! Module for the set of currently open problems.
//!
//! [`ProblemMemory`] answers "is this event id already alarming?" for the
//! classifier. It owns one read/write lock; every operation is a single map
//! touch, so no per-id locking happens here. The durable counterpart lives in
//! the [`AlarmStore`]; the two are kept in step by the classifier and may
//! briefly disagree when a store write fails.
//!
//! # Example
//! ```
//! use tocsin::judge::ProblemMemory;
//!
//! let memory = ProblemMemory::new();
//! assert!(memory.mark_open("s_7_host1"));
//! assert!(memory.is_open("s_7_host1"));
//! assert_eq!(memory.count(), 1);
//! assert!(memory.mark_closed("s_7_host1"));
//! assert_eq!(memory.count(), 0);
//! ```

use crate::metrics::OPEN_PROBLEMS;
use crate::store::AlarmStore;
use crate::error::StoreResult;
use log::{error, info, warn};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};

#[derive(Default)]
pub struct ProblemMemory {
    ids: RwLock<HashSet<String>>,
    count: AtomicI64,
}

impl ProblemMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the contents with every id indexed in the store.
    ///
    /// # Returns
    /// The number of ids loaded.
    pub fn init(&self, store: &AlarmStore) -> StoreResult<usize> {
        let ids = store.open_ids()?;
        let loaded = ids.len();
        self.replace(ids);
        info!("Loaded {} open problems from the store", loaded);
        Ok(loaded)
    }

    /// Rebuilds memory after a restart.
    ///
    /// The dump at `path` wins when it exists and holds at least one id;
    /// otherwise memory is reconciled from the store. A store that cannot be
    /// read leaves memory empty.
    pub fn restore(path: &Path, store: &AlarmStore) -> Self {
        let memory = Self::new();
        match Self::load(path) {
            Ok(ids) if !ids.is_empty() => {
                info!("Restored {} open problems from {}", ids.len(), path.display());
                memory.replace(ids);
                return memory;
            }
            Ok(_) => {}
            Err(e) => warn!("Failed to read problem dump {}: {}", path.display(), e),
        }

        if let Err(e) = memory.init(store) {
            error!("Failed to load open problems from the store: {}", e);
        }
        memory
    }

    pub fn is_open(&self, id: &str) -> bool {
        self.ids.read().contains(id)
    }

    /// Marks an id open, returning `true` if it was not open before.
    pub fn mark_open(&self, id: &str) -> bool {
        let mut ids = self.ids.write();
        let inserted = ids.insert(id.to_string());
        if inserted {
            self.count.fetch_add(1, Ordering::SeqCst);
            OPEN_PROBLEMS.inc();
        }
        inserted
    }

    /// Marks an id closed, returning `true` if it was open.
    pub fn mark_closed(&self, id: &str) -> bool {
        let mut ids = self.ids.write();
        let removed = ids.remove(id);
        if removed {
            self.count.fetch_sub(1, Ordering::SeqCst);
            OPEN_PROBLEMS.dec();
        }
        removed
    }

    pub fn count(&self) -> i64 {
        self.count.load(Ordering::SeqCst)
    }

    pub fn ids(&self) -> Vec<String> {
        self.ids.read().iter().cloned().collect()
    }

    /// Writes every open id to `path` as a JSON array.
    pub fn dump(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut ids = self.ids();
        ids.sort();
        let json = serde_json::to_string(&ids)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(path, json)?;
        info!("Dumped {} open problems to {}", ids.len(), path.display());
        Ok(())
    }

    /// Reads a dump written by [`ProblemMemory::dump`].
    ///
    /// A missing or blank file yields an empty list.
    pub fn load(path: &Path) -> io::Result<Vec<String>> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&content).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    fn replace(&self, ids: Vec<String>) {
        let mut current = self.ids.write();
        let before = current.len() as i64;
        *current = ids.into_iter().collect();
        let after = current.len() as i64;
        self.count.store(after, Ordering::SeqCst);
        OPEN_PROBLEMS.add(after - before);
    }
}
