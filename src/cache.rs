//! Process-wide cache of loaded resource bundles.
//!
//! Keyed by canonical index directory. Each directory has its own slot
//! lock, so:
//!
//! - concurrent first accesses to one directory load it once
//! - a merge holds the slot while it rewrites metadata and invalidates,
//!   so no load can observe the directory half-written
//! - different directories never block each other
//!
//! Every invalidation bumps the slot's generation counter. A slot whose
//! lock was poisoned by a panicking load or write is recovered on next use
//! with its bundle dropped.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::bundle::ResourceBundle;
use crate::error::{NotFoundError, Result};

#[derive(Default)]
struct SlotState {
    bundle: Option<Arc<ResourceBundle>>,
    generation: u64,
}

impl SlotState {
    fn invalidate(&mut self) -> bool {
        self.generation += 1;
        self.bundle.take().is_some()
    }
}

#[derive(Default)]
struct Slot {
    state: Mutex<SlotState>,
}

impl Slot {
    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            let mut state = poisoned.into_inner();
            state.invalidate();
            self.state.clear_poison();
            warn!(
                generation = state.generation,
                "Resource cache slot recovered after a panic"
            );
            state
        })
    }
}

/// Cache of [`ResourceBundle`]s.
#[derive(Default)]
pub struct ResourceCache {
    slots: Mutex<HashMap<PathBuf, Arc<Slot>>>,
}

impl ResourceCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonicalises an index directory.
    ///
    /// # Errors
    ///
    /// Returns `NotFound::Directory` if the directory does not exist.
    pub fn canonical_dir(dir: &Path) -> Result<PathBuf> {
        let canonical = fs::canonicalize(dir)
            .map_err(|_| NotFoundError::Directory(dir.to_path_buf()))?;
        if !canonical.is_dir() {
            return Err(NotFoundError::Directory(dir.to_path_buf()).into());
        }
        Ok(canonical)
    }

    /// Cache key for `dir`, falling back to the absolute path when the
    /// directory no longer exists.
    fn key_for(dir: &Path) -> PathBuf {
        fs::canonicalize(dir)
            .or_else(|_| std::path::absolute(dir))
            .unwrap_or_else(|_| dir.to_path_buf())
    }

    /// The slot map is only touched by insert and lookup, so a poisoned
    /// map is still consistent.
    fn slots(&self) -> MutexGuard<'_, HashMap<PathBuf, Arc<Slot>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn slot(&self, key: &Path) -> Arc<Slot> {
        Arc::clone(self.slots().entry(key.to_path_buf()).or_default())
    }

    fn existing_slot(&self, key: &Path) -> Option<Arc<Slot>> {
        self.slots().get(key).cloned()
    }

    /// Returns the cached bundle for `dir`, loading it with `load` on a miss.
    ///
    /// `load` receives the canonical directory and runs under the slot
    /// lock. A failed load caches nothing.
    pub fn get_or_load<F>(&self, dir: &Path, load: F) -> Result<Arc<ResourceBundle>>
    where
        F: FnOnce(&Path) -> Result<ResourceBundle>,
    {
        let key = Self::canonical_dir(dir)?;
        let slot = self.slot(&key);
        let mut state = slot.lock();

        if let Some(bundle) = &state.bundle {
            debug!(dir = %key.display(), generation = state.generation, "Resource cache hit");
            return Ok(Arc::clone(bundle));
        }

        let bundle = Arc::new(load(&key)?);
        state.bundle = Some(Arc::clone(&bundle));
        info!(dir = %key.display(), generation = state.generation, "Resource bundle cached");
        Ok(bundle)
    }

    /// Drops the cached bundle for `dir`. Returns true if one was cached.
    pub fn invalidate(&self, dir: &Path) -> Result<bool> {
        let key = Self::key_for(dir);
        let Some(slot) = self.existing_slot(&key) else {
            return Ok(false);
        };
        let dropped = slot.lock().invalidate();
        info!(dir = %key.display(), dropped, "Resource cache entry invalidated");
        Ok(dropped)
    }

    /// Drops every cached bundle.
    pub fn clear(&self) -> Result<()> {
        let slots: Vec<Arc<Slot>> = self.slots().values().cloned().collect();
        for slot in &slots {
            slot.lock().invalidate();
        }
        info!(entries = slots.len(), "Resource cache cleared");
        Ok(())
    }

    /// Runs `f` with the slot for `dir` held, then invalidates the entry.
    ///
    /// Used for writes to an index directory: no load of `dir` can start
    /// until `f` has returned and the stale bundle is gone. The entry is
    /// invalidated even when `f` fails.
    pub fn exclusive<T, F>(&self, dir: &Path, f: F) -> Result<T>
    where
        F: FnOnce(&Path) -> Result<T>,
    {
        let key = Self::canonical_dir(dir)?;
        let slot = self.slot(&key);
        let mut state = slot.lock();
        let result = f(&key);
        state.invalidate();
        debug!(dir = %key.display(), generation = state.generation, "Exclusive write finished");
        result
    }

    /// Invalidation count for `dir` (0 if never cached).
    pub fn generation(&self, dir: &Path) -> Result<u64> {
        let key = Self::key_for(dir);
        match self.existing_slot(&key) {
            Some(slot) => Ok(slot.lock().generation),
            None => Ok(0),
        }
    }

    /// Returns true if a bundle for `dir` is currently cached.
    pub fn is_cached(&self, dir: &Path) -> bool {
        let key = Self::key_for(dir);
        self.existing_slot(&key)
            .is_some_and(|slot| slot.lock().bundle.is_some())
    }
}

impl std::fmt::Debug for ResourceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries = self.slots().len();
        f.debug_struct("ResourceCache")
            .field("entries", &entries)
            .finish()
    }
}
