//! The fixed table of engine entry points consumed by the bridge.

use crate::{
    LibraryToken, RawCallError, RawCallable, RawHandle, RawNodePath, RawObjectPtr, RawSignal,
    RawStringName, RawVariant, RawVariantIter,
};

/// Version stamp of the extension ABI. Checked once at install time.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ApiVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ApiVersion {
    pub const CURRENT: ApiVersion = ApiVersion {
        major: 1,
        minor: 2,
        patch: 0,
    };

    /// An engine is usable when its major version matches and it is not
    /// older than the interface the bridge was built against.
    pub fn is_compatible(self, built_against: ApiVersion) -> bool {
        self.major == built_against.major
            && (self.minor, self.patch) >= (built_against.minor, built_against.patch)
    }
}

/// The three callbacks the engine needs to manage the generic instance
/// binding of one native class. Looked up by class name when the first
/// wrapper for that class is constructed.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct RawBindingCallbacks {
    /// Produce a binding token for an instance that has none yet.
    pub create: Option<unsafe extern "C" fn(library: LibraryToken, instance: RawObjectPtr) -> RawHandle>,
    /// Release a binding token. Also the engine's destroy notification: it
    /// fires when the engine frees the instance.
    pub free:
        Option<unsafe extern "C" fn(library: LibraryToken, instance: RawObjectPtr, binding: RawHandle)>,
    /// Reference-count escrow; `increment` is false on the final reference.
    /// Returning false vetoes the release.
    pub reference:
        Option<unsafe extern "C" fn(library: LibraryToken, binding: RawHandle, increment: bool) -> bool>,
}

/// Callback table attached as the script instance of a user-defined class,
/// so native virtual dispatch can reach host-side overrides.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct RawScriptInstanceInfo {
    pub userdata: RawHandle,
    pub has_method: Option<unsafe extern "C" fn(userdata: RawHandle, name: *const RawStringName) -> bool>,
    pub call_method: Option<
        unsafe extern "C" fn(
            userdata: RawHandle,
            name: *const RawStringName,
            args: *const RawVariant,
            arg_count: usize,
            ret: *mut RawVariant,
            error: *mut RawCallError,
        ),
    >,
    pub free: Option<unsafe extern "C" fn(userdata: RawHandle)>,
}

/// Dispatch record for a host-implemented callable. The engine stores the
/// userdata token and calls back through these pointers; `equal` and `hash`
/// let it deduplicate signal connections.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct RawCallableCustomInfo {
    pub userdata: RawHandle,
    pub library: LibraryToken,
    /// Instance id of the owning object, for dispatch bookkeeping. Zero if
    /// the callable has no owner.
    pub object_id: u64,
    pub call: Option<
        unsafe extern "C" fn(
            userdata: RawHandle,
            args: *const RawVariant,
            arg_count: usize,
            ret: *mut RawVariant,
            error: *mut RawCallError,
        ),
    >,
    pub is_valid: Option<unsafe extern "C" fn(userdata: RawHandle) -> bool>,
    pub free: Option<unsafe extern "C" fn(userdata: RawHandle)>,
    pub hash: Option<unsafe extern "C" fn(userdata: RawHandle) -> u64>,
    pub equal: Option<unsafe extern "C" fn(left: RawHandle, right: RawHandle) -> bool>,
}

/// The engine call surface.
///
/// A pointer to one of these, valid for the process lifetime, is handed to
/// the extension at load time. The bridge assumes nothing about the
/// implementation beyond the documented argument and return shapes, and
/// issues every call from the engine's single logical thread unless an
/// entry is documented otherwise.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct InterfaceTable {
    pub version: ApiVersion,

    // -- object lifecycle ---------------------------------------------------
    /// Construct a fresh instance of a registered native class.
    pub object_construct: unsafe extern "C" fn(class_name: *const RawStringName) -> RawObjectPtr,
    /// Destroy an instance. Fires the binding `free` callback before the
    /// memory is reclaimed.
    pub object_destroy: unsafe extern "C" fn(object: RawObjectPtr),
    /// Initialize the reference count of a fresh ref-counted instance.
    pub object_init_ref: unsafe extern "C" fn(object: RawObjectPtr) -> bool,
    /// Increment the reference count. False if the class is not ref-counted.
    pub object_reference: unsafe extern "C" fn(object: RawObjectPtr) -> bool,
    /// Decrement the reference count. True when the count reached zero and
    /// the caller must destroy the instance.
    pub object_unreference: unsafe extern "C" fn(object: RawObjectPtr) -> bool,
    pub object_instance_id: unsafe extern "C" fn(object: RawObjectPtr) -> u64,
    /// Resolve an instance id; null for unknown or reclaimed ids.
    pub object_from_instance_id: unsafe extern "C" fn(id: u64) -> RawObjectPtr,
    /// Write the instance's class name into `out`. False for null input.
    pub object_class_name:
        unsafe extern "C" fn(object: RawObjectPtr, out: *mut RawStringName) -> bool,
    pub object_notification: unsafe extern "C" fn(object: RawObjectPtr, what: i32),

    // -- instance bindings and script instances -----------------------------
    pub object_set_instance_binding: unsafe extern "C" fn(
        object: RawObjectPtr,
        library: LibraryToken,
        binding: RawHandle,
        callbacks: *const RawBindingCallbacks,
    ),
    /// Zero when no binding is attached for `library`.
    pub object_get_instance_binding:
        unsafe extern "C" fn(object: RawObjectPtr, library: LibraryToken) -> RawHandle,
    pub object_free_instance_binding:
        unsafe extern "C" fn(object: RawObjectPtr, library: LibraryToken),
    pub object_set_script_instance: unsafe extern "C" fn(
        object: RawObjectPtr,
        class_name: *const RawStringName,
        info: *const RawScriptInstanceInfo,
    ),
    pub object_has_script_method:
        unsafe extern "C" fn(object: RawObjectPtr, name: *const RawStringName) -> bool,
    pub object_call_script_method: unsafe extern "C" fn(
        object: RawObjectPtr,
        name: *const RawStringName,
        args: *const RawVariant,
        arg_count: usize,
        ret: *mut RawVariant,
        error: *mut RawCallError,
    ),

    // -- signals ------------------------------------------------------------
    /// Connect `callable` to a signal. Returns a `CallStatus` value;
    /// anything but `Ok` means no connection was made.
    pub object_connect: unsafe extern "C" fn(
        object: RawObjectPtr,
        signal: *const RawStringName,
        callable: *const RawCallable,
        flags: u32,
    ) -> u32,
    pub object_disconnect: unsafe extern "C" fn(
        object: RawObjectPtr,
        signal: *const RawStringName,
        callable: *const RawCallable,
    ),
    pub object_emit_signal: unsafe extern "C" fn(
        object: RawObjectPtr,
        signal: *const RawStringName,
        args: *const RawVariant,
        arg_count: usize,
    ) -> u32,

    // -- interned names and paths -------------------------------------------
    /// Intern a UTF-8 string. Static entries join the process-resident
    /// table and must never be released.
    pub string_name_new: unsafe extern "C" fn(
        out: *mut RawStringName,
        utf8: *const u8,
        len: usize,
        is_static: bool,
    ),
    pub string_name_destroy: unsafe extern "C" fn(name: *mut RawStringName),
    /// Take another owning reference to an interned entry.
    pub string_name_copy:
        unsafe extern "C" fn(out: *mut RawStringName, from: *const RawStringName),
    /// Two-call pattern: returns the byte length, writing up to `cap` bytes.
    pub string_name_text:
        unsafe extern "C" fn(name: *const RawStringName, buf: *mut u8, cap: usize) -> usize,
    pub node_path_new: unsafe extern "C" fn(out: *mut RawNodePath, utf8: *const u8, len: usize),
    pub node_path_destroy: unsafe extern "C" fn(path: *mut RawNodePath),
    pub node_path_text:
        unsafe extern "C" fn(path: *const RawNodePath, buf: *mut u8, cap: usize) -> usize,

    // -- callables ----------------------------------------------------------
    pub callable_create_custom:
        unsafe extern "C" fn(out: *mut RawCallable, info: *const RawCallableCustomInfo),
    pub callable_create_bound: unsafe extern "C" fn(
        out: *mut RawCallable,
        object: RawObjectPtr,
        method: *const RawStringName,
    ),
    pub callable_copy: unsafe extern "C" fn(out: *mut RawCallable, from: *const RawCallable),
    pub callable_destroy: unsafe extern "C" fn(callable: *mut RawCallable),
    pub callable_object_id: unsafe extern "C" fn(callable: *const RawCallable) -> u64,
    /// Write the bound method name into `out`; false for custom callables.
    pub callable_method:
        unsafe extern "C" fn(callable: *const RawCallable, out: *mut RawStringName) -> bool,

    // -- variants -----------------------------------------------------------
    /// Duplicate an owning payload so the copy outlives the source.
    pub variant_new_copy: unsafe extern "C" fn(out: *mut RawVariant, from: *const RawVariant),
    pub variant_destroy: unsafe extern "C" fn(variant: *mut RawVariant),
    pub variant_to_bool: unsafe extern "C" fn(variant: *const RawVariant) -> bool,
    pub variant_to_int: unsafe extern "C" fn(variant: *const RawVariant) -> i64,
    pub variant_to_float: unsafe extern "C" fn(variant: *const RawVariant) -> f64,
    /// Stringify; two-call pattern like `string_name_text`.
    pub variant_to_text:
        unsafe extern "C" fn(variant: *const RawVariant, buf: *mut u8, cap: usize) -> usize,
    pub variant_from_text: unsafe extern "C" fn(out: *mut RawVariant, utf8: *const u8, len: usize),
    /// Convert to a freshly allocated interned name.
    pub variant_to_string_name:
        unsafe extern "C" fn(variant: *const RawVariant, out: *mut RawStringName) -> bool,
    pub variant_from_string_name:
        unsafe extern "C" fn(out: *mut RawVariant, name: *const RawStringName),
    pub variant_to_node_path:
        unsafe extern "C" fn(variant: *const RawVariant, out: *mut RawNodePath) -> bool,
    pub variant_from_node_path:
        unsafe extern "C" fn(out: *mut RawVariant, path: *const RawNodePath),
    pub variant_from_object: unsafe extern "C" fn(out: *mut RawVariant, object: RawObjectPtr),
    pub variant_to_callable:
        unsafe extern "C" fn(variant: *const RawVariant, out: *mut RawCallable) -> bool,
    pub variant_from_callable:
        unsafe extern "C" fn(out: *mut RawVariant, callable: *const RawCallable),
    pub variant_from_signal: unsafe extern "C" fn(out: *mut RawVariant, signal: *const RawSignal),
    pub variant_hash: unsafe extern "C" fn(variant: *const RawVariant) -> u64,
    /// Structural equality, including recursive container contents.
    pub variant_hash_compare:
        unsafe extern "C" fn(left: *const RawVariant, right: *const RawVariant) -> bool,

    // -- variant containers -------------------------------------------------
    pub array_create: unsafe extern "C" fn(out: *mut RawVariant),
    pub array_push: unsafe extern "C" fn(array: *mut RawVariant, element: *const RawVariant),
    pub array_len: unsafe extern "C" fn(array: *const RawVariant) -> usize,
    pub variant_iter_init:
        unsafe extern "C" fn(variant: *const RawVariant, iter: *mut RawVariantIter) -> bool,
    pub variant_iter_next:
        unsafe extern "C" fn(variant: *const RawVariant, iter: *mut RawVariantIter) -> bool,
    /// Writes an owned copy of the current element into `out`.
    pub variant_iter_get: unsafe extern "C" fn(
        variant: *const RawVariant,
        iter: *const RawVariantIter,
        out: *mut RawVariant,
    ),
}
