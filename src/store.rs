//! Persistent Record Store
//!
//! Synchronous, origin-scoped key-value storage shared by every browsing
//! context of the app. No transactions across keys; last write wins.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use crate::error::TrackerResult;
#[cfg(test)]
use crate::error::TrackerError;

/// Key-value store holding checklist records and summary counters
pub trait RecordStore {
    /// Read a value, `None` when the key is absent
    fn get(&self, key: &str) -> Option<String>;

    /// Write a value, replacing any previous one
    fn set(&self, key: &str, value: &str) -> TrackerResult<()>;

    /// Delete a key; absent keys are not an error
    fn remove(&self, key: &str) -> TrackerResult<()>;
}

impl<S: RecordStore + ?Sized> RecordStore for Rc<S> {
    fn get(&self, key: &str) -> Option<String> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> TrackerResult<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> TrackerResult<()> {
        (**self).remove(key)
    }
}

/// A mutation observed by contexts other than the writer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageChange {
    /// `None` when the whole store was cleared
    pub key: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

type Listener = Rc<dyn Fn(&StorageChange)>;

#[derive(Default)]
struct Shared {
    entries: BTreeMap<String, String>,
    listeners: Vec<(u32, Listener)>,
    next_context: u32,
    #[cfg(test)]
    rejected: BTreeSet<String>,
}

/// In-memory store shared by several simulated browsing contexts
///
/// Each handle belongs to one context. Writes through a handle notify the
/// listeners of every other context, never the writer's own.
#[derive(Clone)]
pub struct MemoryStore {
    shared: Rc<RefCell<Shared>>,
    context: u32,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let shared = Shared {
            next_context: 1,
            ..Default::default()
        };
        Self {
            shared: Rc::new(RefCell::new(shared)),
            context: 0,
        }
    }

    /// Open another context onto the same storage
    pub fn open_context(&self) -> Self {
        let mut shared = self.shared.borrow_mut();
        let context = shared.next_context;
        shared.next_context += 1;
        Self {
            shared: Rc::clone(&self.shared),
            context,
        }
    }

    /// Register a change listener for this handle's context
    pub fn subscribe(&self, listener: impl Fn(&StorageChange) + 'static) {
        self.shared
            .borrow_mut()
            .listeners
            .push((self.context, Rc::new(listener)));
    }

    /// Copy of every stored entry, sorted by key
    pub fn entries(&self) -> BTreeMap<String, String> {
        self.shared.borrow().entries.clone()
    }

    pub fn keys(&self) -> BTreeSet<String> {
        self.shared.borrow().entries.keys().cloned().collect()
    }

    /// Remove every key, notifying other contexts with a keyless change
    pub fn clear(&self) {
        self.shared.borrow_mut().entries.clear();
        self.notify(StorageChange {
            key: None,
            old_value: None,
            new_value: None,
        });
    }

    fn notify(&self, change: StorageChange) {
        // Listeners may read the store, so release the borrow first
        let listeners: Vec<Listener> = self
            .shared
            .borrow()
            .listeners
            .iter()
            .filter(|(context, _)| *context != self.context)
            .map(|(_, listener)| Rc::clone(listener))
            .collect();
        for listener in listeners {
            listener(&change);
        }
    }

    /// Make every future write to `key` fail, as a full quota would
    #[cfg(test)]
    pub(crate) fn reject_writes_to(&self, key: &str) {
        self.shared.borrow_mut().rejected.insert(key.to_string());
    }

    #[cfg(test)]
    fn check_writable(&self, key: &str) -> TrackerResult<()> {
        if self.shared.borrow().rejected.contains(key) {
            return Err(TrackerError::Storage(format!("quota exceeded writing {}", key)));
        }
        Ok(())
    }

    #[cfg(not(test))]
    fn check_writable(&self, _key: &str) -> TrackerResult<()> {
        Ok(())
    }
}

impl RecordStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.shared.borrow().entries.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> TrackerResult<()> {
        self.check_writable(key)?;
        let old_value = self
            .shared
            .borrow_mut()
            .entries
            .insert(key.to_string(), value.to_string());
        self.notify(StorageChange {
            key: Some(key.to_string()),
            old_value,
            new_value: Some(value.to_string()),
        });
        Ok(())
    }

    fn remove(&self, key: &str) -> TrackerResult<()> {
        let old_value = self.shared.borrow_mut().entries.remove(key);
        if old_value.is_some() {
            self.notify(StorageChange {
                key: Some(key.to_string()),
                old_value,
                new_value: None,
            });
        }
        Ok(())
    }
}
