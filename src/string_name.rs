//! Interned name values.
//!
//! A [`StringName`] wraps a natively-interned string handle. Interning
//! makes equality a pointer comparison, which is the entire reason the
//! type exists: names are compared on every dispatch.
//!
//! Names come in two flavors. Dynamic names own their native entry and
//! release it exactly once, no matter how many clones exist or which
//! teardown path gets there first. Static names are interned once at a
//! call site that lives for the process lifetime; disposing one is a no-op
//! by construction and the value stays usable.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};

use lazy_static::lazy_static;
use rustc_hash::FxHashMap;
use vesper_ffi::RawStringName;

use crate::bridge::Bridge;
use crate::disposables::{DisposableId, NativeRelease};

pub(crate) struct NameInner {
    bridge: &'static Bridge,
    raw: RawStringName,
    is_static: bool,
    released: AtomicBool,
    tracker: OnceLock<DisposableId>,
}

// The raw handle is only passed back to the engine, never dereferenced
// here; release is serialized by the `released` flag.
unsafe impl Send for NameInner {}
unsafe impl Sync for NameInner {}

impl NativeRelease for NameInner {
    fn release_native(&self) {
        if self.is_static || !self.raw.is_allocated() {
            return;
        }
        if !self.released.swap(true, Ordering::AcqRel) {
            let mut raw = self.raw;
            unsafe { (self.bridge.interface().string_name_destroy)(&mut raw) };
        }
    }
}

impl Drop for NameInner {
    fn drop(&mut self) {
        self.release_native();
        if let Some(&id) = self.tracker.get() {
            self.bridge.disposables().unregister_value(id);
        }
    }
}

/// An immutable, identity-comparable interned name.
#[derive(Clone)]
pub struct StringName {
    inner: Arc<NameInner>,
}

impl StringName {
    fn from_parts(bridge: &'static Bridge, raw: RawStringName, is_static: bool) -> StringName {
        let inner = Arc::new(NameInner {
            bridge,
            raw,
            is_static,
            released: AtomicBool::new(false),
            tracker: OnceLock::new(),
        });
        // Static names must never be swept; they are not disposable.
        if !is_static && raw.is_allocated() {
            let weak: Weak<dyn NativeRelease> = {
                let as_release: Arc<dyn NativeRelease> = inner.clone();
                Arc::downgrade(&as_release)
            };
            let id = bridge.disposables().register_value(weak);
            let _ = inner.tracker.set(id);
        }
        StringName { inner }
    }

    /// Interns `text` as a dynamic name; released exactly once when the
    /// last clone is dropped or [`dispose`](Self::dispose) runs.
    pub fn new(bridge: &'static Bridge, text: &str) -> StringName {
        if text.is_empty() {
            return StringName::empty(bridge);
        }
        let mut raw = RawStringName::NULL;
        unsafe {
            (bridge.interface().string_name_new)(&mut raw, text.as_ptr(), text.len(), false);
        }
        StringName::from_parts(bridge, raw, false)
    }

    /// Interns `text` into the process-resident table.
    ///
    /// Meant for identifiers created once and used for the rest of the
    /// process; the entry is never released.
    pub fn new_static(bridge: &'static Bridge, text: &str) -> StringName {
        if text.is_empty() {
            return StringName::empty(bridge);
        }
        let mut raw = RawStringName::NULL;
        unsafe {
            (bridge.interface().string_name_new)(&mut raw, text.as_ptr(), text.len(), true);
        }
        StringName::from_parts(bridge, raw, true)
    }

    /// The empty name. Not allocated on the native side.
    pub fn empty(bridge: &'static Bridge) -> StringName {
        StringName::from_parts(bridge, RawStringName::NULL, false)
    }

    /// Takes ownership of a name handle produced by the engine.
    pub(crate) fn take_raw(bridge: &'static Bridge, raw: RawStringName) -> StringName {
        StringName::from_parts(bridge, raw, false)
    }

    /// The raw handle, for passing back to the engine.
    ///
    /// Panics if the name was already disposed; handing a released handle
    /// to the engine is a use-after-free.
    pub(crate) fn raw(&self) -> RawStringName {
        assert!(
            !self.inner.released.load(Ordering::Acquire),
            "use of a disposed StringName"
        );
        self.inner.raw
    }

    pub fn is_empty(&self) -> bool {
        !self.inner.raw.is_allocated()
    }

    pub fn is_static(&self) -> bool {
        self.inner.is_static
    }

    /// Releases the native entry.
    ///
    /// Safe to call any number of times and concurrently with drops; the
    /// release happens at most once. For static names this is a no-op and
    /// the value remains usable.
    pub fn dispose(&self) {
        self.inner.release_native();
        if let Some(&id) = self.inner.tracker.get() {
            self.inner.bridge.disposables().unregister_value(id);
        }
    }

    /// Reads the name's text back from the engine.
    pub fn text(&self) -> String {
        if self.is_empty() {
            return String::new();
        }
        let raw = self.raw();
        let interface = self.inner.bridge.interface();
        unsafe {
            let len = (interface.string_name_text)(&raw, std::ptr::null_mut(), 0);
            let mut buf = vec![0u8; len];
            (interface.string_name_text)(&raw, buf.as_mut_ptr(), len);
            String::from_utf8_lossy(&buf).into_owned()
        }
    }
}

impl PartialEq for StringName {
    fn eq(&self, other: &Self) -> bool {
        // Interning makes identity comparison sufficient.
        self.inner.raw == other.inner.raw
    }
}

impl Eq for StringName {}

impl Hash for StringName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (self.inner.raw.ptr as usize).hash(state);
    }
}

impl fmt::Display for StringName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.inner.released.load(Ordering::Acquire) {
            return write!(f, "<disposed>");
        }
        write!(f, "{}", self.text())
    }
}

impl fmt::Debug for StringName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StringName({self})")
    }
}

lazy_static! {
    static ref STATIC_NAMES: Mutex<FxHashMap<(usize, &'static str), StringName>> =
        Mutex::new(FxHashMap::default());
}

/// Returns the cached static name for `text`, interning it on first use.
///
/// The cache lives for the process; use this for hot identifiers looked up
/// on every invocation of an operation.
pub fn static_name(bridge: &'static Bridge, text: &'static str) -> StringName {
    let key = (bridge as *const Bridge as usize, text);
    let mut cache = STATIC_NAMES.lock().unwrap();
    cache
        .entry(key)
        .or_insert_with(|| StringName::new_static(bridge, text))
        .clone()
}
