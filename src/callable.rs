//! Dispatchable references invokable from native code.
//!
//! A [`Callable`] is either native-bound (target object plus method name,
//! dispatched entirely inside the engine) or custom: a host-implemented
//! [`CustomCallable`] registered with the engine through a callback table.
//! The trampolines marshal the engine's borrowed argument slots into owned
//! [`Variant`]s and move the result back across the boundary.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use vesper_ffi::{
    RawCallError, RawCallable, RawCallableCustomInfo, RawHandle, RawStringName, RawVariant,
};

use crate::bridge::Bridge;
use crate::disposables::{DisposableId, NativeRelease};
use crate::error::CallError;
use crate::handle::HandleToken;
use crate::object::Object;
use crate::string_name::StringName;
use crate::variant::Variant;

/// A host-implemented dispatch target.
///
/// Implementations are registered with the engine and invoked from native
/// code; `dispatch_hash` and `eq_with` let the engine deduplicate signal
/// connections that wrap the same target.
pub trait CustomCallable: Send + Sync {
    /// Invoked with owned copies of the emitted arguments.
    fn invoke(&self, args: &[Variant]) -> Result<Variant, CallError>;

    /// Instance id of the owning object, for dispatch bookkeeping. Zero
    /// when the callable has no owner.
    fn object_id(&self) -> u64 {
        0
    }

    /// Whether the callable can still be invoked.
    fn is_valid(&self) -> bool {
        true
    }

    /// Hash the engine uses for connection deduplication. Must agree with
    /// [`eq_with`](Self::eq_with).
    fn dispatch_hash(&self) -> u64;

    /// Equality for connection deduplication. Defaults to identity.
    fn eq_with(&self, other: &dyn CustomCallable) -> bool {
        std::ptr::addr_eq(self as *const Self, other as *const dyn CustomCallable)
    }
}

/// Adapts a plain closure to [`CustomCallable`].
pub struct FnCallable {
    function: Box<dyn Fn(&[Variant]) -> Result<Variant, CallError> + Send + Sync>,
}

impl FnCallable {
    pub fn new<F>(function: F) -> FnCallable
    where
        F: Fn(&[Variant]) -> Result<Variant, CallError> + Send + Sync + 'static,
    {
        FnCallable {
            function: Box::new(function),
        }
    }
}

impl CustomCallable for FnCallable {
    fn invoke(&self, args: &[Variant]) -> Result<Variant, CallError> {
        (self.function)(args)
    }

    fn dispatch_hash(&self) -> u64 {
        self as *const FnCallable as u64
    }
}

/// What the pinned-handle arena stores for one registered custom callable.
pub(crate) struct CallableSlot {
    inner: Arc<dyn CustomCallable>,
}

/// Userdata handed to the engine for custom-callable callbacks.
struct CallableCtx {
    bridge: &'static Bridge,
    token: HandleToken,
}

struct CallableInner {
    bridge: &'static Bridge,
    raw: RawCallable,
    released: AtomicBool,
    tracker: OnceLock<DisposableId>,
}

unsafe impl Send for CallableInner {}
unsafe impl Sync for CallableInner {}

impl NativeRelease for CallableInner {
    fn release_native(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            let mut raw = self.raw;
            unsafe { (self.bridge.interface().callable_destroy)(&mut raw) };
        }
    }
}

impl Drop for CallableInner {
    fn drop(&mut self) {
        self.release_native();
        if let Some(&id) = self.tracker.get() {
            self.bridge.disposables().unregister_value(id);
        }
    }
}

/// An owned native callable record.
#[derive(Clone)]
pub struct Callable {
    inner: Arc<CallableInner>,
}

impl Callable {
    fn from_parts(bridge: &'static Bridge, raw: RawCallable) -> Callable {
        let inner = Arc::new(CallableInner {
            bridge,
            raw,
            released: AtomicBool::new(false),
            tracker: OnceLock::new(),
        });
        let weak: Weak<dyn NativeRelease> = {
            let as_release: Arc<dyn NativeRelease> = inner.clone();
            Arc::downgrade(&as_release)
        };
        let id = bridge.disposables().register_value(weak);
        let _ = inner.tracker.set(id);
        Callable { inner }
    }

    /// A callable bound to a method of a native instance; dispatch happens
    /// entirely inside the engine.
    pub fn from_method(object: &Arc<Object>, method: &StringName) -> Callable {
        let bridge = object.bridge();
        let raw_method = method.raw();
        let mut raw = RawCallable::NULL;
        unsafe {
            (bridge.interface().callable_create_bound)(&mut raw, object.native_ptr(), &raw_method);
        }
        Callable::from_parts(bridge, raw)
    }

    /// Registers a custom dispatch target with the engine.
    pub fn from_custom(bridge: &'static Bridge, custom: Arc<dyn CustomCallable>) -> Callable {
        let object_id = custom.object_id();
        let slot = Arc::new(CallableSlot { inner: custom });
        let token = bridge.handles().pin(slot);
        let ctx = Box::new(CallableCtx { bridge, token });

        let info = RawCallableCustomInfo {
            userdata: Box::into_raw(ctx) as RawHandle,
            library: bridge.library_token(),
            object_id,
            call: Some(custom_call),
            is_valid: Some(custom_is_valid),
            free: Some(custom_free),
            hash: Some(custom_hash),
            equal: Some(custom_equal),
        };

        let mut raw = RawCallable::NULL;
        unsafe { (bridge.interface().callable_create_custom)(&mut raw, &info) };
        Callable::from_parts(bridge, raw)
    }

    /// Registers a plain closure as a callable.
    pub fn from_fn<F>(bridge: &'static Bridge, function: F) -> Callable
    where
        F: Fn(&[Variant]) -> Result<Variant, CallError> + Send + Sync + 'static,
    {
        Callable::from_custom(bridge, Arc::new(FnCallable::new(function)))
    }

    /// Takes ownership of a callable record produced by the engine.
    pub(crate) fn take_raw(bridge: &'static Bridge, raw: RawCallable) -> Callable {
        Callable::from_parts(bridge, raw)
    }

    /// The raw record, for passing back to the engine.
    ///
    /// Panics if the callable was already disposed.
    pub(crate) fn raw(&self) -> RawCallable {
        assert!(
            !self.inner.released.load(Ordering::Acquire),
            "use of a disposed Callable"
        );
        self.inner.raw
    }

    /// Instance id of the owning object; zero when unowned.
    pub fn object_id(&self) -> u64 {
        let raw = self.raw();
        unsafe { (self.inner.bridge.interface().callable_object_id)(&raw) }
    }

    /// The bound method name; `None` for custom callables.
    pub fn method(&self) -> Option<StringName> {
        let raw = self.raw();
        let mut out = RawStringName::NULL;
        let bound = unsafe { (self.inner.bridge.interface().callable_method)(&raw, &mut out) };
        bound.then(|| StringName::take_raw(self.inner.bridge, out))
    }

    /// Releases the native record; at most once across all clones.
    pub fn dispose(&self) {
        self.inner.release_native();
        if let Some(&id) = self.inner.tracker.get() {
            self.inner.bridge.disposables().unregister_value(id);
        }
    }
}

impl PartialEq for Callable {
    fn eq(&self, other: &Self) -> bool {
        // The engine canonicalizes records: bound callables with the same
        // target and method, and copies of the same custom registration,
        // share their data words.
        self.inner.raw == other.inner.raw
    }
}

impl Eq for Callable {}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.inner.released.load(Ordering::Acquire) {
            return write!(f, "Callable(<disposed>)");
        }
        match self.method() {
            Some(method) => write!(f, "Callable({}::{})", self.object_id(), method),
            None => write!(f, "Callable(custom#{})", self.object_id()),
        }
    }
}

// -- engine-facing trampolines ----------------------------------------------

fn resolve_slot(userdata: RawHandle) -> Option<(&'static Bridge, Arc<CallableSlot>)> {
    let ctx = unsafe { &*(userdata as usize as *const CallableCtx) };
    let slot = ctx.bridge.handles().resolve::<CallableSlot>(ctx.token)?;
    Some((ctx.bridge, slot))
}

unsafe extern "C" fn custom_call(
    userdata: RawHandle,
    args: *const RawVariant,
    arg_count: usize,
    ret: *mut RawVariant,
    error: *mut RawCallError,
) {
    let Some((bridge, slot)) = resolve_slot(userdata) else {
        unsafe { *error = CallError::InstanceIsNull.into() };
        return;
    };

    // Borrowed slots from the engine become owned copies before host code
    // sees them.
    let raw_args = if arg_count == 0 {
        &[]
    } else {
        unsafe { std::slice::from_raw_parts(args, arg_count) }
    };
    let variants: Vec<Variant> = raw_args.iter().map(|raw| Variant::copy(bridge, raw)).collect();

    match slot.inner.invoke(&variants) {
        Ok(value) => unsafe {
            *ret = value.into_raw();
            *error = RawCallError::OK;
        },
        Err(err) => unsafe { *error = err.into() },
    }
}

unsafe extern "C" fn custom_is_valid(userdata: RawHandle) -> bool {
    match resolve_slot(userdata) {
        Some((_, slot)) => slot.inner.is_valid(),
        None => false,
    }
}

unsafe extern "C" fn custom_free(userdata: RawHandle) {
    let ctx = unsafe { Box::from_raw(userdata as usize as *mut CallableCtx) };
    ctx.bridge.handles().release(ctx.token);
}

unsafe extern "C" fn custom_hash(userdata: RawHandle) -> u64 {
    match resolve_slot(userdata) {
        Some((_, slot)) => slot.inner.dispatch_hash(),
        None => 0,
    }
}

unsafe extern "C" fn custom_equal(left: RawHandle, right: RawHandle) -> bool {
    match (resolve_slot(left), resolve_slot(right)) {
        (Some((_, left)), Some((_, right))) => left.inner.eq_with(&*right.inner),
        _ => false,
    }
}
