//! The managed/native object pair.
//!
//! An [`Object`] associates one host wrapper with one native instance. The
//! wrapper holds the instance pointer, the pinned handle that lets native
//! callbacks find it again, and the class's reference-counting mode. At
//! most one live wrapper exists per native instance; the identity registry
//! returns the same wrapper for repeated resolution and never fabricates
//! one for an unknown pointer.
//!
//! Lifecycle is a one-way state machine:
//! `Uninitialized → Live → Disposing → Disposed`. Construction converges
//! from both directions (host requests a new instance, or native code
//! already has one and needs a wrapper attached) on [`Object::initialize`]
//! with an [`InitOptions`] record. Teardown converges from explicit
//! disposal, the drop of the last wrapper reference, and the engine's
//! destroy notification onto one idempotent routine guarded by the
//! `disposing`/`disposed` flag pair: the flags are monotonic, so a
//! reentrant native callback arriving inside the teardown call stack sees
//! `disposing` already set and returns without issuing a second release.

mod script;

pub use script::{OverrideCall, ScriptInstance};

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use vesper_ffi::{
    LibraryToken, RawBindingCallbacks, RawCallError, RawHandle, RawObjectPtr, RawVariant,
};

use crate::bridge::Bridge;
use crate::disposables::DisposableId;
use crate::error::{CallError, ObjectError};
use crate::handle::HandleToken;
use crate::string_name::StringName;
use crate::variant::Variant;

/// Sent to a fresh instance right after construction, unless the options
/// suppress it.
pub const NOTIFICATION_POSTINITIALIZE: i32 = 0;
/// Sent by the engine right before an instance is destroyed.
pub const NOTIFICATION_PREDELETE: i32 = 1;

/// How to initialize a wrapper. Both creation directions use this record.
pub struct InitOptions {
    /// The native class of the instance.
    pub class_name: StringName,
    /// Existing native instance to adopt, or null to construct a fresh one.
    pub existing: RawObjectPtr,
    /// Skip attaching bindings: the native side is mid-construction and
    /// installs the binding itself when the constructor returns.
    pub binding_attached: bool,
    /// Emit the post-construction notification.
    pub postinit: bool,
    /// Take the initial reference of a ref-counted class.
    pub init_ref: bool,
    /// Host-side overrides for a user-defined class; attached as the
    /// instance's script so native virtual dispatch can reach them.
    pub script: Option<Box<dyn ScriptInstance>>,
}

impl InitOptions {
    /// A fresh engine instance requested by host code.
    pub fn fresh(class_name: StringName) -> InitOptions {
        InitOptions {
            class_name,
            existing: std::ptr::null_mut(),
            binding_attached: false,
            postinit: true,
            init_ref: true,
            script: None,
        }
    }

    /// Wrap an instance native code already constructed. Post-init is
    /// suppressed (the engine is still mid-construction) and no initial
    /// reference is taken (the native caller already holds it).
    pub fn adopt(class_name: StringName, existing: RawObjectPtr) -> InitOptions {
        InitOptions {
            class_name,
            existing,
            binding_attached: true,
            postinit: false,
            init_ref: false,
            script: None,
        }
    }

    pub fn with_script(mut self, script: Box<dyn ScriptInstance>) -> InitOptions {
        self.script = Some(script);
        self
    }

    pub fn with_postinit(mut self, postinit: bool) -> InitOptions {
        self.postinit = postinit;
        self
    }

    pub fn with_init_ref(mut self, init_ref: bool) -> InitOptions {
        self.init_ref = init_ref;
        self
    }

    pub fn with_binding_attached(mut self, attached: bool) -> InitOptions {
        self.binding_attached = attached;
        self
    }
}

/// Host wrapper of one native instance.
pub struct Object {
    bridge: &'static Bridge,
    native: AtomicUsize,
    class_name: StringName,
    ref_counted: bool,
    script: Option<Box<dyn ScriptInstance>>,
    handle: OnceLock<HandleToken>,
    tracker: OnceLock<DisposableId>,
    disposing: AtomicBool,
    disposed: AtomicBool,
}

// All native calls are issued from the engine's logical thread; the raw
// pointer is never dereferenced on the host side. Teardown is guarded by
// the monotonic flag pair, not a lock.
unsafe impl Send for Object {}
unsafe impl Sync for Object {}

impl Object {
    /// Creates a wrapper per `options` and registers it with the identity
    /// registry.
    pub fn initialize(
        bridge: &'static Bridge,
        options: InitOptions,
    ) -> Result<Arc<Object>, ObjectError> {
        let class_text = options.class_name.text();
        let info = bridge.registry().class_info(&class_text);
        let ref_counted = info.is_some_and(|i| i.ref_counted);

        let native = if options.existing.is_null() {
            let raw_name = options.class_name.raw();
            let ptr = unsafe { (bridge.interface().object_construct)(&raw_name) };
            if ptr.is_null() {
                bridge.messages().error(
                    "object",
                    format!("engine failed to construct an instance of '{class_text}'"),
                );
                return Err(ObjectError::ConstructFailed { class: class_text });
            }
            ptr
        } else {
            options.existing
        };

        let object = Arc::new(Object {
            bridge,
            native: AtomicUsize::new(native as usize),
            class_name: options.class_name,
            ref_counted,
            script: options.script,
            handle: OnceLock::new(),
            tracker: OnceLock::new(),
            disposing: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
        });

        let token = bridge.handles().pin(object.clone());
        let _ = object.handle.set(token);

        if ref_counted && options.init_ref {
            unsafe { (bridge.interface().object_init_ref)(native) };
        }

        if !options.binding_attached {
            if object.script.is_some() {
                script::attach_script_instance(&object, token);
            }
            let callbacks = info.and_then(|i| i.binding).unwrap_or_else(default_binding);
            unsafe {
                (bridge.interface().object_set_instance_binding)(
                    native,
                    bridge.library_token(),
                    token.raw(),
                    &callbacks,
                );
            }
        }

        if options.postinit {
            unsafe { (bridge.interface().object_notification)(native, NOTIFICATION_POSTINITIALIZE) };
        }

        bridge.registry().register(native, &object);
        let tracker = bridge.disposables().register_object(Arc::downgrade(&object));
        let _ = object.tracker.set(tracker);

        Ok(object)
    }

    /// Resolves a native pointer back to its wrapper.
    ///
    /// Total: null resolves to `None`, and a pointer without a live
    /// wrapper is "not found" rather than a fresh wrapper.
    pub fn from_native_ptr(bridge: &'static Bridge, ptr: RawObjectPtr) -> Option<Arc<Object>> {
        bridge.registry().resolve(ptr)
    }

    /// Resolves an instance id. Zero and reclaimed ids are `None`.
    pub fn from_instance_id(bridge: &'static Bridge, id: u64) -> Option<Arc<Object>> {
        if id == 0 {
            return None;
        }
        let ptr = unsafe { (bridge.interface().object_from_instance_id)(id) };
        bridge.registry().resolve(ptr)
    }

    pub(crate) fn bridge(&self) -> &'static Bridge {
        self.bridge
    }

    /// The native instance pointer.
    ///
    /// Panics once the wrapper is disposed; a released pointer must never
    /// reach the engine again.
    pub(crate) fn native_ptr(&self) -> RawObjectPtr {
        let ptr = self.native.load(Ordering::Acquire) as RawObjectPtr;
        assert!(
            !self.disposed.load(Ordering::Acquire) && !ptr.is_null(),
            "use of a disposed Object"
        );
        ptr
    }

    fn native_ptr_unchecked(&self) -> RawObjectPtr {
        self.native.load(Ordering::Acquire) as RawObjectPtr
    }

    pub fn class_name(&self) -> &StringName {
        &self.class_name
    }

    pub fn is_ref_counted(&self) -> bool {
        self.ref_counted
    }

    /// Whether the native instance is still reachable through this
    /// wrapper.
    pub fn is_instance_valid(&self) -> bool {
        !self.disposed.load(Ordering::Acquire) && !self.native_ptr_unchecked().is_null()
    }

    pub fn instance_id(&self) -> u64 {
        unsafe { (self.bridge.interface().object_instance_id)(self.native_ptr()) }
    }

    /// Sends an engine notification to the instance.
    pub fn notification(&self, what: i32) {
        unsafe { (self.bridge.interface().object_notification)(self.native_ptr(), what) };
    }

    /// Whether a host-side override for `name` is attached.
    pub fn has_override(&self, name: &StringName) -> bool {
        let raw_name = name.raw();
        unsafe { (self.bridge.interface().object_has_script_method)(self.native_ptr(), &raw_name) }
    }

    /// Calls the host-side override of a virtual method if one is
    /// attached.
    ///
    /// The capability query runs first, so `Ok(None)` ("no override") is
    /// distinct from an override that ran and returned nil.
    pub fn try_call_virtual(
        &self,
        name: &StringName,
        args: &[Variant],
    ) -> Result<Option<Variant>, CallError> {
        if !self.has_override(name) {
            return Ok(None);
        }
        let raw_name = name.raw();
        let raw_args: Vec<RawVariant> = args.iter().map(|a| *a.raw_ref()).collect();
        let mut ret = RawVariant::NIL;
        let mut error = RawCallError::OK;
        unsafe {
            (self.bridge.interface().object_call_script_method)(
                self.native_ptr(),
                &raw_name,
                raw_args.as_ptr(),
                raw_args.len(),
                &mut ret,
                &mut error,
            );
        }
        match CallError::from_status(error) {
            Some(err) => Err(err),
            None => Ok(Some(Variant::take(self.bridge, ret))),
        }
    }

    /// Calls a required override, panicking when none is attached.
    pub fn call_virtual(&self, name: &StringName, args: &[Variant]) -> Variant {
        match self.try_call_virtual(name, args) {
            Ok(Some(value)) => value,
            Ok(None) => panic!(
                "required override '{}' is not implemented by class '{}'",
                name, self.class_name
            ),
            Err(err) => panic!("virtual dispatch of '{name}' failed: {err}"),
        }
    }

    /// Explicitly disposes the wrapper, releasing its association with the
    /// native instance (and the instance itself when this wrapper held the
    /// last reference of a ref-counted class).
    pub fn dispose(&self) {
        self.teardown();
    }

    /// Manually destroys the native instance.
    ///
    /// Only legal for classes outside reference counting, and only while
    /// the wrapper is live. Both misuses are reported, not silently
    /// ignored.
    pub fn free(&self) -> Result<(), ObjectError> {
        if self.ref_counted {
            let err = ObjectError::FreeRefCounted {
                class: self.class_name.text(),
            };
            self.bridge.messages().error("object", err.to_string());
            return Err(err);
        }
        if self.disposing.load(Ordering::Acquire) || self.disposed.load(Ordering::Acquire) {
            let err = ObjectError::Disposed {
                class: self.class_name.text(),
            };
            self.bridge.messages().warning("object", err.to_string());
            return Err(err);
        }
        let ptr = self.native_ptr();
        // The engine fires the binding-free callback during destruction,
        // which lands back in `teardown` on this same call stack.
        unsafe { (self.bridge.interface().object_destroy)(ptr) };
        self.teardown();
        Ok(())
    }

    /// The idempotent teardown routine every destruction path converges
    /// on.
    fn teardown(&self) {
        if self.disposed.load(Ordering::Acquire) {
            return;
        }
        // Set before any native call: reentrant callbacks triggered by the
        // calls below must observe the transition.
        if self.disposing.swap(true, Ordering::AcqRel) {
            return;
        }

        let ptr = self.native_ptr_unchecked();
        if !ptr.is_null() {
            unsafe {
                (self.bridge.interface().object_free_instance_binding)(
                    ptr,
                    self.bridge.library_token(),
                );
            }
            if self.ref_counted {
                let reached_zero = unsafe { (self.bridge.interface().object_unreference)(ptr) };
                if reached_zero {
                    unsafe { (self.bridge.interface().object_destroy)(ptr) };
                }
            }
            // Cleared only now: every native call above still needed it.
            self.native.store(0, Ordering::Release);
        }

        self.disposed.store(true, Ordering::Release);

        if let Some(&token) = self.handle.get() {
            self.bridge.handles().release(token);
        }
        if !ptr.is_null() {
            self.bridge.registry().unregister(ptr, self);
        }
        if let Some(&id) = self.tracker.get() {
            self.bridge.disposables().unregister_object(id);
        }
    }
}

impl Drop for Object {
    fn drop(&mut self) {
        // Deferred-cleanup path. Restricted to the native release: nothing
        // else is safe to touch while the wrapper graph is being torn
        // down.
        if self.disposed.load(Ordering::Acquire) {
            return;
        }
        let ptr = self.native_ptr_unchecked();
        if ptr.is_null() {
            return;
        }
        if self.ref_counted {
            let reached_zero = unsafe { (self.bridge.interface().object_unreference)(ptr) };
            if reached_zero {
                unsafe { (self.bridge.interface().object_destroy)(ptr) };
            }
        }
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_instance_valid() {
            return write!(f, "<{}#disposed>", self.class_name);
        }
        write!(f, "<{}#{}>", self.class_name, self.instance_id())
    }
}

/// Binding callbacks used for classes the registry has no entry for.
pub(crate) fn default_binding() -> RawBindingCallbacks {
    RawBindingCallbacks {
        create: Some(binding_create),
        free: Some(binding_free),
        reference: Some(binding_reference),
    }
}

/// The bridge attaches bindings eagerly at construction, so the engine
/// never needs one created lazily.
unsafe extern "C" fn binding_create(_library: LibraryToken, _instance: RawObjectPtr) -> RawHandle {
    0
}

/// The engine's destroy notification: fires when the instance is being
/// freed, including frees the bridge itself requested.
unsafe extern "C" fn binding_free(library: LibraryToken, _instance: RawObjectPtr, binding: RawHandle) {
    let bridge = unsafe { Bridge::from_library_token(library) };
    let Some(token) = HandleToken::from_raw(binding) else {
        return;
    };
    if let Some(object) = bridge.handles().resolve::<Object>(token) {
        object.teardown();
    }
}

unsafe extern "C" fn binding_reference(
    _library: LibraryToken,
    _binding: RawHandle,
    _increment: bool,
) -> bool {
    true
}
