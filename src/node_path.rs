//! Pre-parsed path values.
//!
//! A [`NodePath`] owns a natively-parsed path handle. Unlike
//! [`StringName`](crate::StringName) there is no static flavor; every
//! allocated path is released exactly once across clones and teardown
//! paths.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use vesper_ffi::RawNodePath;

use crate::bridge::Bridge;
use crate::disposables::{DisposableId, NativeRelease};

pub(crate) struct PathInner {
    bridge: &'static Bridge,
    raw: RawNodePath,
    released: AtomicBool,
    tracker: OnceLock<DisposableId>,
}

// Raw handle is opaque; release is serialized by the flag.
unsafe impl Send for PathInner {}
unsafe impl Sync for PathInner {}

impl NativeRelease for PathInner {
    fn release_native(&self) {
        if !self.raw.is_allocated() {
            return;
        }
        if !self.released.swap(true, Ordering::AcqRel) {
            let mut raw = self.raw;
            unsafe { (self.bridge.interface().node_path_destroy)(&mut raw) };
        }
    }
}

impl Drop for PathInner {
    fn drop(&mut self) {
        self.release_native();
        if let Some(&id) = self.tracker.get() {
            self.bridge.disposables().unregister_value(id);
        }
    }
}

#[derive(Clone)]
pub struct NodePath {
    inner: Arc<PathInner>,
}

impl NodePath {
    fn from_parts(bridge: &'static Bridge, raw: RawNodePath) -> NodePath {
        let inner = Arc::new(PathInner {
            bridge,
            raw,
            released: AtomicBool::new(false),
            tracker: OnceLock::new(),
        });
        if raw.is_allocated() {
            let weak: Weak<dyn NativeRelease> = {
                let as_release: Arc<dyn NativeRelease> = inner.clone();
                Arc::downgrade(&as_release)
            };
            let id = bridge.disposables().register_value(weak);
            let _ = inner.tracker.set(id);
        }
        NodePath { inner }
    }

    /// Parses `path` into a native path handle.
    pub fn new(bridge: &'static Bridge, path: &str) -> NodePath {
        if path.is_empty() {
            return NodePath::empty(bridge);
        }
        let mut raw = RawNodePath::NULL;
        unsafe {
            (bridge.interface().node_path_new)(&mut raw, path.as_ptr(), path.len());
        }
        NodePath::from_parts(bridge, raw)
    }

    /// The empty path. Not allocated on the native side.
    pub fn empty(bridge: &'static Bridge) -> NodePath {
        NodePath::from_parts(bridge, RawNodePath::NULL)
    }

    /// Takes ownership of a path handle produced by the engine.
    pub(crate) fn take_raw(bridge: &'static Bridge, raw: RawNodePath) -> NodePath {
        NodePath::from_parts(bridge, raw)
    }

    /// The raw handle, for passing back to the engine.
    ///
    /// Panics if the path was already disposed.
    pub(crate) fn raw(&self) -> RawNodePath {
        assert!(
            !self.inner.released.load(Ordering::Acquire),
            "use of a disposed NodePath"
        );
        self.inner.raw
    }

    pub fn is_empty(&self) -> bool {
        !self.inner.raw.is_allocated()
    }

    /// Releases the native entry; at most once across all clones.
    pub fn dispose(&self) {
        self.inner.release_native();
        if let Some(&id) = self.inner.tracker.get() {
            self.inner.bridge.disposables().unregister_value(id);
        }
    }

    /// Reads the path's text back from the engine.
    pub fn text(&self) -> String {
        if self.is_empty() {
            return String::new();
        }
        let raw = self.raw();
        let interface = self.inner.bridge.interface();
        unsafe {
            let len = (interface.node_path_text)(&raw, std::ptr::null_mut(), 0);
            let mut buf = vec![0u8; len];
            (interface.node_path_text)(&raw, buf.as_mut_ptr(), len);
            String::from_utf8_lossy(&buf).into_owned()
        }
    }
}

impl PartialEq for NodePath {
    fn eq(&self, other: &Self) -> bool {
        self.inner.raw == other.inner.raw
    }
}

impl Eq for NodePath {}

impl Hash for NodePath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (self.inner.raw.ptr as usize).hash(state);
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.inner.released.load(Ordering::Acquire) {
            return write!(f, "<disposed>");
        }
        write!(f, "{}", self.text())
    }
}

impl fmt::Debug for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodePath({self})")
    }
}
