//! Identity registry: the single source of truth mapping native instance
//! pointers to their host wrappers, plus the per-class tables consulted at
//! first construction.
//!
//! The registry is owned by the [`Bridge`](crate::Bridge) and handed to the
//! object layer explicitly, so the core stays testable against a registry
//! populated by a fake engine. It never allocates wrappers itself:
//! resolving an unknown pointer is absence, not creation.

use std::sync::{Arc, Mutex, Weak};

use rustc_hash::FxHashMap;
use vesper_ffi::{RawBindingCallbacks, RawObjectPtr};

use crate::object::Object;

/// What the bridge knows about one native class.
#[derive(Clone, Copy, Debug)]
pub struct ClassInfo {
    /// Whether instances participate in engine reference counting.
    pub ref_counted: bool,
    /// Binding callbacks for instances of the class; `None` uses the
    /// bridge's default table.
    pub binding: Option<RawBindingCallbacks>,
}

impl ClassInfo {
    pub fn new(ref_counted: bool) -> ClassInfo {
        ClassInfo {
            ref_counted,
            binding: None,
        }
    }

    pub fn with_binding(mut self, binding: RawBindingCallbacks) -> ClassInfo {
        self.binding = Some(binding);
        self
    }
}

pub struct InstanceRegistry {
    instances: Mutex<FxHashMap<usize, Weak<Object>>>,
    classes: Mutex<FxHashMap<String, ClassInfo>>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        InstanceRegistry {
            instances: Mutex::new(FxHashMap::default()),
            classes: Mutex::new(FxHashMap::default()),
        }
    }

    /// Registers the wrapper for a live native instance.
    ///
    /// At most one wrapper may exist per instance; registering a pointer
    /// that already has a live wrapper is a contract violation.
    pub(crate) fn register(&self, ptr: RawObjectPtr, wrapper: &Arc<Object>) {
        let mut instances = self.instances.lock().unwrap();
        let previous = instances.insert(ptr as usize, Arc::downgrade(wrapper));
        debug_assert!(
            previous.is_none_or(|w| w.upgrade().is_none()),
            "native instance already has a live wrapper"
        );
    }

    /// Removes the mapping for `ptr` if it still points at `wrapper`.
    pub(crate) fn unregister(&self, ptr: RawObjectPtr, wrapper: *const Object) {
        let mut instances = self.instances.lock().unwrap();
        if let Some(existing) = instances.get(&(ptr as usize)) {
            if std::ptr::eq(existing.as_ptr(), wrapper) || existing.upgrade().is_none() {
                instances.remove(&(ptr as usize));
            }
        }
    }

    /// Resolves a native pointer to its live wrapper.
    pub fn resolve(&self, ptr: RawObjectPtr) -> Option<Arc<Object>> {
        if ptr.is_null() {
            return None;
        }
        let mut instances = self.instances.lock().unwrap();
        match instances.get(&(ptr as usize)) {
            Some(weak) => match weak.upgrade() {
                Some(wrapper) => Some(wrapper),
                None => {
                    // The wrapper died without unregistering; drop the
                    // stale entry so the slot can be reused.
                    instances.remove(&(ptr as usize));
                    None
                }
            },
            None => None,
        }
    }

    /// Number of live registered wrappers.
    pub fn live_count(&self) -> usize {
        self.instances
            .lock()
            .unwrap()
            .values()
            .filter(|w| w.upgrade().is_some())
            .count()
    }

    /// Declares a native class.
    pub fn register_class(&self, name: &str, info: ClassInfo) {
        self.classes.lock().unwrap().insert(name.to_owned(), info);
    }

    /// Class information looked up at first construction time.
    pub fn class_info(&self, name: &str) -> Option<ClassInfo> {
        self.classes.lock().unwrap().get(name).copied()
    }
}

impl Default for InstanceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
