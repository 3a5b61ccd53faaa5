//! In-memory cache of prepared templates keyed by source path.
//!
//! A cached template is returned as long as its source file has not been
//! modified since it was compiled. Once the source changes, the old template
//! is closed and a fresh one compiled in its place. Lookups of one path are
//! serialized, so concurrent callers racing on a stale entry compile it once
//! and never see a template another caller is about to close.

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock, TryLockError};

use tracing::{debug, info};

use stencil_core::PrepareOptions;

use crate::engine::TemplateEngine;
use crate::error::Result;
use crate::prepared::{prepare_template, PreparedTemplate};

/// Current template for one path. Held locked for the whole
/// check-close-compile-replace sequence.
struct SlotState<T> {
    current: Option<Arc<PreparedTemplate<T>>>,
    /// Set when the slot is dropped from the map; lookups that raced the
    /// removal retry with a fresh slot.
    retired: bool,
}

impl<T> Default for SlotState<T> {
    fn default() -> Self {
        Self {
            current: None,
            retired: false,
        }
    }
}

type Slot<T> = Mutex<SlotState<T>>;

/// A slot lock is never held while waiting for the map, and the map write
/// lock only ever try-locks slots.
pub struct TemplateCache<T> {
    slots: RwLock<HashMap<PathBuf, Arc<Slot<T>>>>,
}

impl<T> TemplateCache<T> {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
        }
    }

    fn slot(&self, path: &Path) -> Arc<Slot<T>> {
        if let Some(slot) = self.existing_slot(path) {
            return slot;
        }
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(path.to_path_buf()).or_default())
    }

    fn existing_slot(&self, path: &Path) -> Option<Arc<Slot<T>>> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
    }

    fn existing_slots(&self) -> Vec<Arc<Slot<T>>> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Run `f` on the live slot for `path`, creating it if needed.
    fn with_slot<R>(&self, path: &Path, f: impl FnOnce(&mut SlotState<T>) -> R) -> R {
        loop {
            let slot = self.slot(path);
            let mut state = slot.lock().unwrap_or_else(PoisonError::into_inner);
            if state.retired {
                continue;
            }
            return f(&mut state);
        }
    }

    /// Drop the slot for `path` from the map if it holds no template.
    fn prune(&self, path: &Path) {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        let empty = slots.get(path).map(|slot| retire_if_empty(slot)).unwrap_or(false);
        if empty {
            slots.remove(path);
        }
    }

    /// Return the cached template for `path`, compiling it with `compile`
    /// when absent, stale or closed.
    ///
    /// A stale template is closed before its replacement is compiled. If the
    /// compile fails the entry is removed and the error returned.
    pub fn get<F>(&self, path: &Path, compile: F) -> Result<Arc<PreparedTemplate<T>>>
    where
        F: FnOnce(&Path) -> Result<PreparedTemplate<T>>,
    {
        let result = self.with_slot(path, |state| -> Result<Arc<PreparedTemplate<T>>> {
            if let Some(current) = state.current.as_ref() {
                if !current.is_closed() && !current.source().is_stale() {
                    debug!(path = %path.display(), "template cache hit");
                    return Ok(Arc::clone(current));
                }
            }

            if let Some(stale) = state.current.take() {
                info!(path = %path.display(), "template source changed, recompiling");
                stale.close();
            }

            let fresh = Arc::new(compile(path)?);
            state.current = Some(Arc::clone(&fresh));
            Ok(fresh)
        });

        if result.is_err() {
            self.prune(path);
        }
        result
    }

    /// Store `template` under its own source path, closing whatever it replaces.
    pub fn insert(&self, template: Arc<PreparedTemplate<T>>) {
        let path = template.path().to_path_buf();
        let previous = self.with_slot(&path, |state| state.current.replace(Arc::clone(&template)));
        if let Some(previous) = previous {
            if !Arc::ptr_eq(&previous, &template) {
                previous.close();
            }
        }
        debug!(path = %path.display(), "stored template in cache");
    }

    /// Drop and close the template cached for `path`. Returns whether one was cached.
    pub fn invalidate(&self, path: &Path) -> bool {
        let Some(slot) = self.existing_slot(path) else {
            return false;
        };
        let removed = slot.lock().unwrap_or_else(PoisonError::into_inner).current.take();
        self.prune(path);
        match removed {
            Some(template) => {
                template.close();
                debug!(path = %path.display(), "invalidated cached template");
                true
            }
            None => false,
        }
    }

    /// Close and drop every cached template.
    pub fn clear(&self) {
        for slot in self.existing_slots() {
            let taken = slot.lock().unwrap_or_else(PoisonError::into_inner).current.take();
            if let Some(template) = taken {
                template.close();
            }
        }
        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|_, slot| !retire_if_empty(slot));
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.existing_slot(path)
            .map(|slot| slot.lock().unwrap_or_else(PoisonError::into_inner).current.is_some())
            .unwrap_or(false)
    }

    /// Number of cached templates.
    pub fn len(&self) -> usize {
        self.existing_slots()
            .iter()
            .filter(|slot| slot.lock().unwrap_or_else(PoisonError::into_inner).current.is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// [`get`](Self::get) using [`prepare_template`] as the compile step.
    pub fn prepare<E>(
        &self,
        engine: &E,
        path: &Path,
        options: &PrepareOptions,
    ) -> Result<Arc<PreparedTemplate<T>>>
    where
        E: TemplateEngine<Compiled = T>,
    {
        self.get(path, |p| prepare_template(engine, p, options))
    }
}

/// Mark `slot` retired when it holds no template. Caller holds the map write
/// lock. A slot locked by a lookup in progress is left alone.
fn retire_if_empty<T>(slot: &Slot<T>) -> bool {
    let mut state = match slot.try_lock() {
        Ok(state) => state,
        Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        Err(TryLockError::WouldBlock) => return false,
    };
    if state.current.is_none() {
        state.retired = true;
    }
    state.retired
}

impl<T> Default for TemplateCache<T> {
    fn default() -> Self {
        Self::new()
    }
}
