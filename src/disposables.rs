//! Process-teardown tracking for everything that owns a native allocation.
//!
//! Wrappers release their native resources when dropped, but an extension
//! being unloaded cannot wait for values still reachable from host globals.
//! Every owning wrapper registers here on creation and unregisters on
//! disposal; [`DisposablesTracker::dispose_all`] sweeps the stragglers.
//!
//! Objects are disposed before value-level disposables because object
//! teardown may still need names and variants.

use std::sync::{Mutex, Weak};

use rustc_hash::FxHashMap;

use crate::object::Object;

/// A wrapper whose only teardown obligation is one native release call.
///
/// Implementations must be idempotent: the sweep may race with an explicit
/// disposal or a drop.
pub trait NativeRelease: Send + Sync {
    fn release_native(&self);
}

/// Registration id handed back to the wrapper for unregistering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DisposableId(u64);

pub struct DisposablesTracker {
    objects: Mutex<FxHashMap<u64, Weak<Object>>>,
    values: Mutex<FxHashMap<u64, Weak<dyn NativeRelease>>>,
    next_id: Mutex<u64>,
}

impl DisposablesTracker {
    pub fn new() -> Self {
        DisposablesTracker {
            objects: Mutex::new(FxHashMap::default()),
            values: Mutex::new(FxHashMap::default()),
            next_id: Mutex::new(0),
        }
    }

    fn next_id(&self) -> u64 {
        let mut next = self.next_id.lock().unwrap();
        *next += 1;
        *next
    }

    pub(crate) fn register_object(&self, object: Weak<Object>) -> DisposableId {
        let id = self.next_id();
        self.objects.lock().unwrap().insert(id, object);
        DisposableId(id)
    }

    pub(crate) fn unregister_object(&self, id: DisposableId) {
        self.objects.lock().unwrap().remove(&id.0);
    }

    pub(crate) fn register_value(&self, value: Weak<dyn NativeRelease>) -> DisposableId {
        let id = self.next_id();
        self.values.lock().unwrap().insert(id, value);
        DisposableId(id)
    }

    pub(crate) fn unregister_value(&self, id: DisposableId) {
        self.values.lock().unwrap().remove(&id.0);
    }

    /// Disposes every tracked wrapper still alive, objects first.
    pub fn dispose_all(&self) {
        let objects: Vec<Weak<Object>> = {
            let mut map = self.objects.lock().unwrap();
            map.drain().map(|(_, weak)| weak).collect()
        };
        for weak in objects {
            if let Some(object) = weak.upgrade() {
                object.dispose();
            }
        }

        let values: Vec<Weak<dyn NativeRelease>> = {
            let mut map = self.values.lock().unwrap();
            map.drain().map(|(_, weak)| weak).collect()
        };
        for weak in values {
            if let Some(value) = weak.upgrade() {
                value.release_native();
            }
        }
    }

    /// Count of tracked entries whose wrapper is still alive.
    pub fn live_count(&self) -> usize {
        let objects = self
            .objects
            .lock()
            .unwrap()
            .values()
            .filter(|w| w.upgrade().is_some())
            .count();
        let values = self
            .values
            .lock()
            .unwrap()
            .values()
            .filter(|w| w.upgrade().is_some())
            .count();
        objects + values
    }
}

impl Default for DisposablesTracker {
    fn default() -> Self {
        Self::new()
    }
}
