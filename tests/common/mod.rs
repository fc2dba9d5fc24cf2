//! In-process fake engine for the integration tests.
//!
//! Implements every entry of the extension [`InterfaceTable`] over plain
//! Rust state: names are interned by content, owning variant payloads are
//! real allocations with per-allocation release counters, objects carry
//! reference counts, bindings, scripts, and signal connections, and signal
//! emission dispatches through the registered custom-callable trampolines.
//!
//! Callbacks into the bridge re-enter this module (a teardown releases
//! bindings, a dropped argument releases payloads), so the global lock is
//! never held across a callback invocation: state transitions are computed
//! under the lock and callbacks fire after it is released.
//!
//! Several test binaries share this file and each uses a subset of it.
#![allow(dead_code)]

use std::collections::HashMap;
use std::ffi::c_void;
use std::sync::{Mutex, MutexGuard};

use lazy_static::lazy_static;
use ordered_float::OrderedFloat;
use xxhash_rust::xxh64::Xxh64;

use vesper::{Bridge, BridgeConfig, ClassInfo};
use vesper_ffi::*;

// ---------------------------------------------------------------------------
// state
// ---------------------------------------------------------------------------

struct NameRec {
    ptr: usize,
    refs: usize,
    is_static: bool,
    live: bool,
}

struct PathRec {
    ptr: usize,
    refs: usize,
    live: bool,
}

enum PayloadData {
    Str(String),
    Array(Vec<RawVariant>),
}

struct PayloadRec {
    data: PayloadData,
    live: bool,
    releases: usize,
}

enum CallableKind {
    Bound { object: usize, method: usize },
    Custom(RawCallableCustomInfo),
}

struct CallableRec {
    kind: CallableKind,
    refs: usize,
}

struct ConnRec {
    signal: usize,
    callable: u64,
    flags: u32,
}

struct ObjectRec {
    class: String,
    id: u64,
    refcount: Option<u32>,
    bindings: HashMap<usize, (RawHandle, RawBindingCallbacks)>,
    script: Option<RawScriptInstanceInfo>,
    connections: Vec<ConnRec>,
    notifications: Vec<i32>,
    live: bool,
}

#[derive(Default)]
struct EngineState {
    next_id: u64,
    names: HashMap<String, NameRec>,
    name_index: HashMap<usize, String>,
    name_releases: HashMap<String, usize>,
    paths: HashMap<String, PathRec>,
    path_index: HashMap<usize, String>,
    path_releases: HashMap<String, usize>,
    payloads: HashMap<usize, PayloadRec>,
    string_stats: HashMap<String, (usize, usize)>,
    callables: HashMap<u64, CallableRec>,
    bound_lookup: HashMap<(usize, usize), u64>,
    classes: HashMap<String, bool>,
    objects: HashMap<usize, ObjectRec>,
    objects_by_id: HashMap<u64, usize>,
    destroy_counts: HashMap<usize, usize>,
}

lazy_static! {
    static ref STATE: Mutex<EngineState> = Mutex::new(EngineState::default());
}

fn state() -> MutexGuard<'static, EngineState> {
    STATE.lock().unwrap()
}

fn fresh_address() -> usize {
    // A real, unique, never-reused address; only ever compared, never
    // dereferenced by the bridge.
    Box::into_raw(Box::new(0u64)) as usize
}

impl EngineState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn name_content(&self, ptr: usize) -> Option<&str> {
        self.name_index.get(&ptr).map(String::as_str)
    }

    fn intern_name(&mut self, content: &str, is_static: bool) -> usize {
        let mut stale = None;
        if let Some(rec) = self.names.get_mut(content) {
            if rec.live {
                rec.refs += 1;
                rec.is_static |= is_static;
                return rec.ptr;
            }
            stale = Some(rec.ptr);
        }
        if let Some(old) = stale {
            self.name_index.remove(&old);
        }
        let ptr = fresh_address();
        self.names.insert(
            content.to_owned(),
            NameRec {
                ptr,
                refs: 1,
                is_static,
                live: true,
            },
        );
        self.name_index.insert(ptr, content.to_owned());
        ptr
    }

    fn release_name(&mut self, ptr: usize) {
        let Some(content) = self.name_index.get(&ptr).cloned() else {
            return;
        };
        *self.name_releases.entry(content.clone()).or_default() += 1;
        let rec = self.names.get_mut(&content).unwrap();
        if rec.is_static {
            return;
        }
        rec.refs = rec.refs.saturating_sub(1);
        if rec.refs == 0 {
            rec.live = false;
        }
    }

    fn addref_name(&mut self, ptr: usize) {
        if let Some(content) = self.name_index.get(&ptr) {
            if let Some(rec) = self.names.get_mut(content) {
                rec.refs += 1;
            }
        }
    }

    fn intern_path(&mut self, content: &str) -> usize {
        if let Some(rec) = self.paths.get_mut(content) {
            if rec.live {
                rec.refs += 1;
                return rec.ptr;
            }
        }
        let ptr = fresh_address();
        self.paths.insert(
            content.to_owned(),
            PathRec {
                ptr,
                refs: 1,
                live: true,
            },
        );
        self.path_index.insert(ptr, content.to_owned());
        ptr
    }

    fn release_path(&mut self, ptr: usize) {
        let Some(content) = self.path_index.get(&ptr).cloned() else {
            return;
        };
        *self.path_releases.entry(content.clone()).or_default() += 1;
        let rec = self.paths.get_mut(&content).unwrap();
        rec.refs = rec.refs.saturating_sub(1);
        if rec.refs == 0 {
            rec.live = false;
        }
    }

    fn alloc_payload(&mut self, data: PayloadData) -> usize {
        let ptr = fresh_address();
        if let PayloadData::Str(content) = &data {
            self.string_stats.entry(content.clone()).or_default().0 += 1;
        }
        self.payloads.insert(
            ptr,
            PayloadRec {
                data,
                live: true,
                releases: 0,
            },
        );
        ptr
    }
}

// Deferred callback work computed under the lock, run after it drops.
enum Deferred {
    ReleaseCallable(u64),
    ReleaseObjectRef(usize),
    DestroyObject(usize),
}

fn run_deferred(work: Vec<Deferred>) {
    for item in work {
        match item {
            Deferred::ReleaseCallable(id) => release_callable_ref(id),
            Deferred::ReleaseObjectRef(ptr) => release_object_ref(ptr as RawObjectPtr),
            Deferred::DestroyObject(ptr) => destroy_object_now(ptr as RawObjectPtr),
        }
    }
}

// ---------------------------------------------------------------------------
// internal engine operations (reentrancy-safe)
// ---------------------------------------------------------------------------

/// Copies a variant inside the engine. Owning payloads get a fresh
/// allocation or an extra reference, matching the engine's own semantics.
fn copy_raw_locked(s: &mut EngineState, from: &RawVariant) -> RawVariant {
    let tag = VariantTag::try_from(from.tag).expect("copy of unknown tag");
    if tag.is_trivial() {
        return *from;
    }
    match tag {
        VariantTag::String => {
            let src = unsafe { from.payload.ptr } as usize;
            let content = match s.payloads.get(&src) {
                Some(PayloadRec {
                    data: PayloadData::Str(content),
                    ..
                }) => content.clone(),
                _ => panic!("string variant points at a foreign allocation"),
            };
            let ptr = s.alloc_payload(PayloadData::Str(content));
            RawVariant {
                tag: from.tag,
                payload: RawVariantPayload {
                    ptr: ptr as *mut c_void,
                },
            }
        }
        VariantTag::Array => {
            let src = unsafe { from.payload.ptr } as usize;
            let elements = match s.payloads.get(&src) {
                Some(PayloadRec {
                    data: PayloadData::Array(elements),
                    ..
                }) => elements.clone(),
                _ => panic!("array variant points at a foreign allocation"),
            };
            let copied: Vec<RawVariant> = elements
                .iter()
                .map(|element| copy_raw_locked(s, element))
                .collect();
            let ptr = s.alloc_payload(PayloadData::Array(copied));
            RawVariant {
                tag: from.tag,
                payload: RawVariantPayload {
                    ptr: ptr as *mut c_void,
                },
            }
        }
        VariantTag::StringName => {
            let name = unsafe { from.payload.string_name };
            s.addref_name(name.ptr as usize);
            *from
        }
        VariantTag::NodePath => {
            let path = unsafe { from.payload.node_path };
            if let Some(content) = s.path_index.get(&(path.ptr as usize)) {
                let content = content.clone();
                if let Some(rec) = s.paths.get_mut(&content) {
                    rec.refs += 1;
                }
            }
            *from
        }
        VariantTag::Object => {
            let ptr = unsafe { from.payload.object } as usize;
            if let Some(rec) = s.objects.get_mut(&ptr) {
                if let Some(count) = rec.refcount.as_mut() {
                    *count += 1;
                }
            }
            *from
        }
        VariantTag::Callable => {
            let id = unsafe { from.payload.callable }.data[0];
            if let Some(rec) = s.callables.get_mut(&id) {
                rec.refs += 1;
            }
            *from
        }
        VariantTag::Signal => {
            let signal = unsafe { from.payload.signal };
            s.addref_name(signal.name.ptr as usize);
            *from
        }
        _ => panic!("fake engine does not allocate {tag:?} payloads"),
    }
}

/// Releases a variant's owned payload, collecting callback work.
fn destroy_raw_locked(s: &mut EngineState, variant: &RawVariant, deferred: &mut Vec<Deferred>) {
    let tag = VariantTag::try_from(variant.tag).expect("destroy of unknown tag");
    if tag.is_trivial() {
        return;
    }
    match tag {
        VariantTag::String | VariantTag::Array => {
            let ptr = unsafe { variant.payload.ptr } as usize;
            let freed_content;
            let freed_elements;
            {
                let Some(rec) = s.payloads.get_mut(&ptr) else {
                    return;
                };
                rec.releases += 1;
                if !rec.live {
                    return;
                }
                rec.live = false;
                match &mut rec.data {
                    PayloadData::Str(content) => {
                        freed_content = Some(content.clone());
                        freed_elements = Vec::new();
                    }
                    PayloadData::Array(elements) => {
                        freed_content = None;
                        freed_elements = std::mem::take(elements);
                    }
                }
            }
            if let Some(content) = freed_content {
                s.string_stats.entry(content).or_default().1 += 1;
            }
            for element in &freed_elements {
                destroy_raw_locked(s, element, deferred);
            }
        }
        VariantTag::StringName => {
            let name = unsafe { variant.payload.string_name };
            s.release_name(name.ptr as usize);
        }
        VariantTag::NodePath => {
            let path = unsafe { variant.payload.node_path };
            s.release_path(path.ptr as usize);
        }
        VariantTag::Object => {
            let ptr = unsafe { variant.payload.object } as usize;
            deferred.push(Deferred::ReleaseObjectRef(ptr));
        }
        VariantTag::Callable => {
            let id = unsafe { variant.payload.callable }.data[0];
            deferred.push(Deferred::ReleaseCallable(id));
        }
        VariantTag::Signal => {
            let signal = unsafe { variant.payload.signal };
            s.release_name(signal.name.ptr as usize);
        }
        _ => {}
    }
}

/// Drops one engine-held reference to a callable record; frees the custom
/// registration when the last reference goes.
fn release_callable_ref(id: u64) {
    let freed = {
        let mut s = state();
        let remove = match s.callables.get_mut(&id) {
            Some(rec) => {
                rec.refs = rec.refs.saturating_sub(1);
                rec.refs == 0
            }
            None => false,
        };
        if remove {
            match s.callables.remove(&id).unwrap().kind {
                CallableKind::Bound { object, method } => {
                    s.bound_lookup.remove(&(object, method));
                    s.release_name(method);
                    None
                }
                CallableKind::Custom(info) => Some(info),
            }
        } else {
            None
        }
    };
    if let Some(info) = freed {
        if let Some(free) = info.free {
            unsafe { free(info.userdata) };
        }
    }
}

/// Drops one variant-held reference to an object (ref-counted classes
/// only); destroys the instance when the count reaches zero.
fn release_object_ref(ptr: RawObjectPtr) {
    let destroy = {
        let mut s = state();
        match s.objects.get_mut(&(ptr as usize)) {
            Some(rec) if rec.live => match rec.refcount.as_mut() {
                Some(count) => {
                    *count = count.saturating_sub(1);
                    *count == 0
                }
                None => false,
            },
            _ => false,
        }
    };
    if destroy {
        destroy_object_now(ptr);
    }
}

/// The engine's destruction routine: marks the instance dead, then fires
/// the binding-free callbacks, frees the script, and drops connections.
fn destroy_object_now(ptr: RawObjectPtr) {
    let key = ptr as usize;
    let (bindings, script, connections) = {
        let mut s = state();
        let Some(rec) = s.objects.get_mut(&key) else {
            return;
        };
        if !rec.live {
            return;
        }
        rec.live = false;
        *s.destroy_counts.entry(key).or_default() += 1;
        let rec = s.objects.get_mut(&key).unwrap();
        let bindings: Vec<(usize, RawHandle, RawBindingCallbacks)> = rec
            .bindings
            .drain()
            .map(|(library, (handle, callbacks))| (library, handle, callbacks))
            .collect();
        let script = rec.script.take();
        let connections: Vec<ConnRec> = rec.connections.drain(..).collect();
        (bindings, script, connections)
    };

    for (library, handle, callbacks) in bindings {
        if let Some(free) = callbacks.free {
            unsafe { free(library as LibraryToken, ptr, handle) };
        }
    }
    if let Some(info) = script {
        if let Some(free) = info.free {
            unsafe { free(info.userdata) };
        }
    }
    for connection in connections {
        release_callable_ref(connection.callable);
    }
}

fn variant_text_locked(s: &EngineState, variant: &RawVariant) -> String {
    let tag = VariantTag::try_from(variant.tag).expect("text of unknown tag");
    unsafe {
        match tag {
            VariantTag::Nil => String::new(),
            VariantTag::Bool => variant.payload.boolean.to_string(),
            VariantTag::Int => variant.payload.int.to_string(),
            VariantTag::Float => variant.payload.float.to_string(),
            VariantTag::String => match s.payloads.get(&(variant.payload.ptr as usize)) {
                Some(PayloadRec {
                    data: PayloadData::Str(content),
                    ..
                }) => content.clone(),
                _ => String::new(),
            },
            VariantTag::StringName => s
                .name_content(variant.payload.string_name.ptr as usize)
                .unwrap_or("")
                .to_owned(),
            VariantTag::NodePath => s
                .path_index
                .get(&(variant.payload.node_path.ptr as usize))
                .cloned()
                .unwrap_or_default(),
            VariantTag::Vector2 => {
                let v = variant.payload.vector2;
                format!("({}, {})", v.x, v.y)
            }
            VariantTag::Vector2i => {
                let v = variant.payload.vector2i;
                format!("({}, {})", v.x, v.y)
            }
            VariantTag::Vector3 => {
                let v = variant.payload.vector3;
                format!("({}, {}, {})", v.x, v.y, v.z)
            }
            VariantTag::Object => match s.objects.get(&(variant.payload.object as usize)) {
                Some(rec) => format!("<{}#{}>", rec.class, rec.id),
                None => "<freed>".to_owned(),
            },
            VariantTag::Array => match s.payloads.get(&(variant.payload.ptr as usize)) {
                Some(PayloadRec {
                    data: PayloadData::Array(elements),
                    ..
                }) => {
                    let parts: Vec<String> = elements
                        .iter()
                        .map(|element| variant_text_locked(s, element))
                        .collect();
                    format!("[{}]", parts.join(", "))
                }
                _ => "[]".to_owned(),
            },
            VariantTag::Callable => "Callable".to_owned(),
            VariantTag::Signal => format!(
                "Signal({})",
                s.name_content(variant.payload.signal.name.ptr as usize)
                    .unwrap_or("")
            ),
            other => format!("<{other:?}>"),
        }
    }
}

fn variant_eq_locked(s: &EngineState, left: &RawVariant, right: &RawVariant) -> bool {
    if left.tag != right.tag {
        return false;
    }
    let tag = VariantTag::try_from(left.tag).expect("compare of unknown tag");
    unsafe {
        match tag {
            VariantTag::Nil => true,
            VariantTag::Bool => left.payload.boolean == right.payload.boolean,
            VariantTag::Int => left.payload.int == right.payload.int,
            VariantTag::Float => {
                OrderedFloat(left.payload.float) == OrderedFloat(right.payload.float)
            }
            VariantTag::Vector2 => left.payload.vector2 == right.payload.vector2,
            VariantTag::Vector2i => left.payload.vector2i == right.payload.vector2i,
            VariantTag::Rect2 => left.payload.rect2 == right.payload.rect2,
            VariantTag::Rect2i => left.payload.rect2i == right.payload.rect2i,
            VariantTag::Vector3 => left.payload.vector3 == right.payload.vector3,
            VariantTag::Vector3i => left.payload.vector3i == right.payload.vector3i,
            VariantTag::Vector4 => left.payload.vector4 == right.payload.vector4,
            VariantTag::Vector4i => left.payload.vector4i == right.payload.vector4i,
            VariantTag::Plane => left.payload.plane == right.payload.plane,
            VariantTag::Quaternion => left.payload.quaternion == right.payload.quaternion,
            VariantTag::Color => left.payload.color == right.payload.color,
            VariantTag::Rid => left.payload.rid == right.payload.rid,
            VariantTag::String => {
                variant_text_locked(s, left) == variant_text_locked(s, right)
            }
            VariantTag::StringName => {
                left.payload.string_name == right.payload.string_name
            }
            VariantTag::NodePath => left.payload.node_path == right.payload.node_path,
            VariantTag::Object => left.payload.object == right.payload.object,
            VariantTag::Callable => {
                left.payload.callable.data[0] == right.payload.callable.data[0]
            }
            VariantTag::Signal => {
                left.payload.signal.object == right.payload.signal.object
                    && left.payload.signal.name == right.payload.signal.name
            }
            VariantTag::Array => {
                let left_elements = match s.payloads.get(&(left.payload.ptr as usize)) {
                    Some(PayloadRec {
                        data: PayloadData::Array(elements),
                        ..
                    }) => elements,
                    _ => return false,
                };
                let right_elements = match s.payloads.get(&(right.payload.ptr as usize)) {
                    Some(PayloadRec {
                        data: PayloadData::Array(elements),
                        ..
                    }) => elements,
                    _ => return false,
                };
                left_elements.len() == right_elements.len()
                    && left_elements
                        .iter()
                        .zip(right_elements.iter())
                        .all(|(l, r)| variant_eq_locked(s, l, r))
            }
            _ => false,
        }
    }
}

fn variant_hash_locked(s: &EngineState, variant: &RawVariant, hasher: &mut Xxh64) {
    hasher.update(&variant.tag.to_le_bytes());
    let tag = VariantTag::try_from(variant.tag).expect("hash of unknown tag");
    unsafe {
        match tag {
            VariantTag::Nil => {}
            VariantTag::Bool => hasher.update(&[variant.payload.boolean as u8]),
            VariantTag::Int => hasher.update(&variant.payload.int.to_le_bytes()),
            VariantTag::Float => {
                // Canonicalized so that hash agrees with equality for NaN.
                let canonical = OrderedFloat(variant.payload.float);
                hasher.update(&canonical.into_inner().to_bits().to_le_bytes());
            }
            VariantTag::String => {
                hasher.update(variant_text_locked(s, variant).as_bytes());
            }
            VariantTag::StringName => {
                hasher.update(&(variant.payload.string_name.ptr as u64).to_le_bytes());
            }
            VariantTag::NodePath => {
                hasher.update(&(variant.payload.node_path.ptr as u64).to_le_bytes());
            }
            VariantTag::Object => {
                hasher.update(&(variant.payload.object as u64).to_le_bytes());
            }
            VariantTag::Callable => {
                hasher.update(&variant.payload.callable.data[0].to_le_bytes());
            }
            VariantTag::Signal => {
                hasher.update(&(variant.payload.signal.object as u64).to_le_bytes());
                hasher.update(&(variant.payload.signal.name.ptr as u64).to_le_bytes());
            }
            VariantTag::Array => {
                if let Some(PayloadRec {
                    data: PayloadData::Array(elements),
                    ..
                }) = s.payloads.get(&(variant.payload.ptr as usize))
                {
                    for element in elements {
                        variant_hash_locked(s, element, hasher);
                    }
                }
            }
            _ => {
                let raw: [u8; 16] =
                    std::mem::transmute_copy::<RawVariantPayload, [u8; 16]>(&variant.payload);
                hasher.update(&raw);
            }
        }
    }
}

fn write_text(text: &str, buf: *mut u8, cap: usize) -> usize {
    let bytes = text.as_bytes();
    if !buf.is_null() && cap > 0 {
        let n = cap.min(bytes.len());
        unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), buf, n) };
    }
    bytes.len()
}

unsafe fn utf8_arg(utf8: *const u8, len: usize) -> String {
    if utf8.is_null() || len == 0 {
        return String::new();
    }
    let slice = unsafe { std::slice::from_raw_parts(utf8, len) };
    String::from_utf8_lossy(slice).into_owned()
}

// ---------------------------------------------------------------------------
// interface entry points
// ---------------------------------------------------------------------------

unsafe extern "C" fn object_construct(class_name: *const RawStringName) -> RawObjectPtr {
    let mut s = state();
    let Some(class) = s.name_content(unsafe { (*class_name).ptr } as usize) else {
        return std::ptr::null_mut();
    };
    let class = class.to_owned();
    let Some(&ref_counted) = s.classes.get(&class) else {
        return std::ptr::null_mut();
    };
    let id = s.next_id();
    let ptr = fresh_address();
    s.objects.insert(
        ptr,
        ObjectRec {
            class,
            id,
            refcount: ref_counted.then_some(0),
            bindings: HashMap::new(),
            script: None,
            connections: Vec::new(),
            notifications: Vec::new(),
            live: true,
        },
    );
    s.objects_by_id.insert(id, ptr);
    ptr as RawObjectPtr
}

unsafe extern "C" fn object_destroy(object: RawObjectPtr) {
    destroy_object_now(object);
}

unsafe extern "C" fn object_init_ref(object: RawObjectPtr) -> bool {
    let mut s = state();
    match s.objects.get_mut(&(object as usize)) {
        Some(rec) if rec.live => match rec.refcount.as_mut() {
            Some(count) => {
                *count += 1;
                true
            }
            None => false,
        },
        _ => false,
    }
}

unsafe extern "C" fn object_reference(object: RawObjectPtr) -> bool {
    let mut s = state();
    match s.objects.get_mut(&(object as usize)) {
        Some(rec) if rec.live => match rec.refcount.as_mut() {
            Some(count) => {
                *count += 1;
                true
            }
            None => false,
        },
        _ => false,
    }
}

unsafe extern "C" fn object_unreference(object: RawObjectPtr) -> bool {
    let mut s = state();
    match s.objects.get_mut(&(object as usize)) {
        Some(rec) if rec.live => match rec.refcount.as_mut() {
            Some(count) => {
                *count = count.saturating_sub(1);
                *count == 0
            }
            None => false,
        },
        _ => false,
    }
}

unsafe extern "C" fn object_instance_id(object: RawObjectPtr) -> u64 {
    let s = state();
    s.objects.get(&(object as usize)).map(|r| r.id).unwrap_or(0)
}

unsafe extern "C" fn object_from_instance_id(id: u64) -> RawObjectPtr {
    let s = state();
    match s.objects_by_id.get(&id) {
        Some(&ptr) if s.objects.get(&ptr).is_some_and(|r| r.live) => ptr as RawObjectPtr,
        _ => std::ptr::null_mut(),
    }
}

unsafe extern "C" fn object_class_name(object: RawObjectPtr, out: *mut RawStringName) -> bool {
    let mut s = state();
    let Some(class) = s.objects.get(&(object as usize)).map(|r| r.class.clone()) else {
        return false;
    };
    let ptr = s.intern_name(&class, false);
    unsafe {
        *out = RawStringName {
            ptr: ptr as *mut c_void,
        };
    }
    true
}

unsafe extern "C" fn object_notification(object: RawObjectPtr, what: i32) {
    let mut s = state();
    if let Some(rec) = s.objects.get_mut(&(object as usize)) {
        if rec.live {
            rec.notifications.push(what);
        }
    }
}

unsafe extern "C" fn object_set_instance_binding(
    object: RawObjectPtr,
    library: LibraryToken,
    binding: RawHandle,
    callbacks: *const RawBindingCallbacks,
) {
    let mut s = state();
    if let Some(rec) = s.objects.get_mut(&(object as usize)) {
        if rec.live {
            rec.bindings
                .insert(library as usize, (binding, unsafe { *callbacks }));
        }
    }
}

unsafe extern "C" fn object_get_instance_binding(
    object: RawObjectPtr,
    library: LibraryToken,
) -> RawHandle {
    let s = state();
    s.objects
        .get(&(object as usize))
        .and_then(|rec| rec.bindings.get(&(library as usize)))
        .map(|(handle, _)| *handle)
        .unwrap_or(0)
}

unsafe extern "C" fn object_free_instance_binding(object: RawObjectPtr, library: LibraryToken) {
    let mut s = state();
    if let Some(rec) = s.objects.get_mut(&(object as usize)) {
        rec.bindings.remove(&(library as usize));
    }
}

unsafe extern "C" fn object_set_script_instance(
    object: RawObjectPtr,
    _class_name: *const RawStringName,
    info: *const RawScriptInstanceInfo,
) {
    let mut s = state();
    if let Some(rec) = s.objects.get_mut(&(object as usize)) {
        if rec.live {
            rec.script = Some(unsafe { *info });
        }
    }
}

unsafe extern "C" fn object_has_script_method(
    object: RawObjectPtr,
    name: *const RawStringName,
) -> bool {
    let script = {
        let s = state();
        s.objects
            .get(&(object as usize))
            .filter(|rec| rec.live)
            .and_then(|rec| rec.script)
    };
    match script {
        Some(info) => match info.has_method {
            // Callback runs without the engine lock held.
            Some(has_method) => unsafe { has_method(info.userdata, name) },
            None => false,
        },
        None => false,
    }
}

unsafe extern "C" fn object_call_script_method(
    object: RawObjectPtr,
    name: *const RawStringName,
    args: *const RawVariant,
    arg_count: usize,
    ret: *mut RawVariant,
    error: *mut RawCallError,
) {
    let script = {
        let s = state();
        s.objects
            .get(&(object as usize))
            .filter(|rec| rec.live)
            .and_then(|rec| rec.script)
    };
    match script.and_then(|info| info.call_method.map(|call| (info, call))) {
        Some((info, call)) => unsafe { call(info.userdata, name, args, arg_count, ret, error) },
        None => unsafe {
            *error = RawCallError {
                status: CallStatus::InvalidMethod.into(),
                argument: -1,
            };
        },
    }
}

unsafe extern "C" fn object_connect(
    object: RawObjectPtr,
    signal: *const RawStringName,
    callable: *const RawCallable,
    flags: u32,
) -> u32 {
    let signal_ptr = unsafe { (*signal).ptr } as usize;
    if signal_ptr == 0 {
        return CallStatus::InvalidMethod.into();
    }
    let callable_id = unsafe { (*callable).data[0] };

    // Equality check for deduplication may call back into the bridge, so
    // gather candidate infos under the lock and compare outside it.
    let (existing, candidate_info) = {
        let s = state();
        let Some(rec) = s.objects.get(&(object as usize)).filter(|r| r.live) else {
            return CallStatus::InstanceIsNull.into();
        };
        let existing: Vec<(u64, Option<RawCallableCustomInfo>)> = rec
            .connections
            .iter()
            .filter(|conn| conn.signal == signal_ptr)
            .map(|conn| {
                let info = match s.callables.get(&conn.callable).map(|r| &r.kind) {
                    Some(CallableKind::Custom(info)) => Some(*info),
                    _ => None,
                };
                (conn.callable, info)
            })
            .collect();
        let candidate_info = match s.callables.get(&callable_id).map(|r| &r.kind) {
            Some(CallableKind::Custom(info)) => Some(*info),
            _ => None,
        };
        (existing, candidate_info)
    };

    for (id, info) in existing {
        if id == callable_id {
            return CallStatus::InvalidArgument.into();
        }
        if let (Some(a), Some(b)) = (info, candidate_info) {
            if let Some(equal) = a.equal {
                if unsafe { equal(a.userdata, b.userdata) } {
                    return CallStatus::InvalidArgument.into();
                }
            }
        }
    }

    let mut s = state();
    let Some(rec) = s.objects.get_mut(&(object as usize)).filter(|r| r.live) else {
        return CallStatus::InstanceIsNull.into();
    };
    rec.connections.push(ConnRec {
        signal: signal_ptr,
        callable: callable_id,
        flags,
    });
    if let Some(rec) = s.callables.get_mut(&callable_id) {
        rec.refs += 1;
    }
    CallStatus::Ok.into()
}

unsafe extern "C" fn object_disconnect(
    object: RawObjectPtr,
    signal: *const RawStringName,
    callable: *const RawCallable,
) {
    let signal_ptr = unsafe { (*signal).ptr } as usize;
    let callable_id = unsafe { (*callable).data[0] };
    let removed = {
        let mut s = state();
        match s.objects.get_mut(&(object as usize)) {
            Some(rec) => {
                let before = rec.connections.len();
                rec.connections
                    .retain(|conn| !(conn.signal == signal_ptr && conn.callable == callable_id));
                before != rec.connections.len()
            }
            None => false,
        }
    };
    if removed {
        release_callable_ref(callable_id);
    }
}

unsafe extern "C" fn object_emit_signal(
    object: RawObjectPtr,
    signal: *const RawStringName,
    args: *const RawVariant,
    arg_count: usize,
) -> u32 {
    let signal_ptr = unsafe { (*signal).ptr } as usize;
    let targets: Vec<(u64, bool)> = {
        let mut s = state();
        let Some(rec) = s.objects.get_mut(&(object as usize)).filter(|r| r.live) else {
            return CallStatus::InstanceIsNull.into();
        };
        let targets: Vec<(u64, bool)> = rec
            .connections
            .iter()
            .filter(|conn| conn.signal == signal_ptr)
            .map(|conn| (conn.callable, conn.flags & 4 != 0))
            .collect();
        // One-shot connections disconnect before delivery, so a reentrant
        // emission cannot double-fire them.
        rec.connections
            .retain(|conn| !(conn.signal == signal_ptr && conn.flags & 4 != 0));
        targets
    };

    for (callable_id, one_shot) in targets {
        let kind = {
            let s = state();
            match s.callables.get(&callable_id).map(|rec| match &rec.kind {
                CallableKind::Custom(info) => (Some(*info), None),
                CallableKind::Bound { object, method } => (None, Some((*object, *method))),
            }) {
                Some(kind) => kind,
                None => continue,
            }
        };
        match kind {
            (Some(info), _) => {
                if let Some(call) = info.call {
                    let mut ret = RawVariant::NIL;
                    let mut error = RawCallError::OK;
                    unsafe { call(info.userdata, args, arg_count, &mut ret, &mut error) };
                    // The invoked callable handed us an owned result.
                    unsafe { variant_destroy(&mut ret) };
                }
            }
            (_, Some((target, method))) => {
                // Native-bound dispatch: route through the target's script
                // if it implements the method; otherwise drop the call.
                let name = RawStringName {
                    ptr: method as *mut c_void,
                };
                if unsafe { object_has_script_method(target as RawObjectPtr, &name) } {
                    let mut ret = RawVariant::NIL;
                    let mut error = RawCallError::OK;
                    unsafe {
                        object_call_script_method(
                            target as RawObjectPtr,
                            &name,
                            args,
                            arg_count,
                            &mut ret,
                            &mut error,
                        );
                        variant_destroy(&mut ret);
                    }
                }
            }
            _ => {}
        }
        if one_shot {
            release_callable_ref(callable_id);
        }
    }
    CallStatus::Ok.into()
}

unsafe extern "C" fn string_name_new(
    out: *mut RawStringName,
    utf8: *const u8,
    len: usize,
    is_static: bool,
) {
    let content = unsafe { utf8_arg(utf8, len) };
    let mut s = state();
    let ptr = s.intern_name(&content, is_static);
    unsafe {
        *out = RawStringName {
            ptr: ptr as *mut c_void,
        };
    }
}

unsafe extern "C" fn string_name_destroy(name: *mut RawStringName) {
    let ptr = unsafe { (*name).ptr } as usize;
    let mut s = state();
    s.release_name(ptr);
}

unsafe extern "C" fn string_name_copy(out: *mut RawStringName, from: *const RawStringName) {
    let from = unsafe { *from };
    let mut s = state();
    s.addref_name(from.ptr as usize);
    unsafe { *out = from };
}

unsafe extern "C" fn string_name_text(
    name: *const RawStringName,
    buf: *mut u8,
    cap: usize,
) -> usize {
    let s = state();
    let content = s
        .name_content(unsafe { (*name).ptr } as usize)
        .unwrap_or("")
        .to_owned();
    drop(s);
    write_text(&content, buf, cap)
}

unsafe extern "C" fn node_path_new(out: *mut RawNodePath, utf8: *const u8, len: usize) {
    let content = unsafe { utf8_arg(utf8, len) };
    let mut s = state();
    let ptr = s.intern_path(&content);
    unsafe {
        *out = RawNodePath {
            ptr: ptr as *mut c_void,
        };
    }
}

unsafe extern "C" fn node_path_destroy(path: *mut RawNodePath) {
    let ptr = unsafe { (*path).ptr } as usize;
    let mut s = state();
    s.release_path(ptr);
}

unsafe extern "C" fn node_path_text(path: *const RawNodePath, buf: *mut u8, cap: usize) -> usize {
    let s = state();
    let content = s
        .path_index
        .get(&(unsafe { (*path).ptr } as usize))
        .cloned()
        .unwrap_or_default();
    drop(s);
    write_text(&content, buf, cap)
}

unsafe extern "C" fn callable_create_custom(
    out: *mut RawCallable,
    info: *const RawCallableCustomInfo,
) {
    let mut s = state();
    let id = s.next_id();
    s.callables.insert(
        id,
        CallableRec {
            kind: CallableKind::Custom(unsafe { *info }),
            refs: 1,
        },
    );
    unsafe { *out = RawCallable { data: [id, 0] } };
}

unsafe extern "C" fn callable_create_bound(
    out: *mut RawCallable,
    object: RawObjectPtr,
    method: *const RawStringName,
) {
    let method_ptr = unsafe { (*method).ptr } as usize;
    let mut s = state();
    let key = (object as usize, method_ptr);
    let existing = s.bound_lookup.get(&key).copied();
    let id = match existing {
        Some(id) => {
            s.callables.get_mut(&id).unwrap().refs += 1;
            id
        }
        None => {
            let id = s.next_id();
            s.addref_name(method_ptr);
            s.callables.insert(
                id,
                CallableRec {
                    kind: CallableKind::Bound {
                        object: object as usize,
                        method: method_ptr,
                    },
                    refs: 1,
                },
            );
            s.bound_lookup.insert(key, id);
            id
        }
    };
    unsafe { *out = RawCallable { data: [id, 0] } };
}

unsafe extern "C" fn callable_copy(out: *mut RawCallable, from: *const RawCallable) {
    let from = unsafe { *from };
    let mut s = state();
    if let Some(rec) = s.callables.get_mut(&from.data[0]) {
        rec.refs += 1;
    }
    unsafe { *out = from };
}

unsafe extern "C" fn callable_destroy(callable: *mut RawCallable) {
    let id = unsafe { (*callable).data[0] };
    release_callable_ref(id);
}

unsafe extern "C" fn callable_object_id(callable: *const RawCallable) -> u64 {
    let id = unsafe { (*callable).data[0] };
    let s = state();
    match s.callables.get(&id).map(|rec| &rec.kind) {
        Some(CallableKind::Custom(info)) => info.object_id,
        Some(CallableKind::Bound { object, .. }) => {
            s.objects.get(object).map(|rec| rec.id).unwrap_or(0)
        }
        None => 0,
    }
}

unsafe extern "C" fn callable_method(
    callable: *const RawCallable,
    out: *mut RawStringName,
) -> bool {
    let id = unsafe { (*callable).data[0] };
    let mut s = state();
    match s.callables.get(&id).map(|rec| &rec.kind) {
        Some(&CallableKind::Bound { method, .. }) => {
            s.addref_name(method);
            unsafe {
                *out = RawStringName {
                    ptr: method as *mut c_void,
                };
            }
            true
        }
        _ => false,
    }
}

unsafe extern "C" fn variant_new_copy(out: *mut RawVariant, from: *const RawVariant) {
    let mut s = state();
    let copy = copy_raw_locked(&mut s, unsafe { &*from });
    unsafe { *out = copy };
}

unsafe extern "C" fn variant_destroy(variant: *mut RawVariant) {
    let mut deferred = Vec::new();
    {
        let mut s = state();
        destroy_raw_locked(&mut s, unsafe { &*variant }, &mut deferred);
    }
    unsafe { (*variant).tag = VariantTag::Nil.into() };
    run_deferred(deferred);
}

unsafe extern "C" fn variant_to_bool(variant: *const RawVariant) -> bool {
    let v = unsafe { &*variant };
    match VariantTag::try_from(v.tag) {
        Ok(VariantTag::Bool) => unsafe { v.payload.boolean },
        Ok(VariantTag::Int) => unsafe { v.payload.int != 0 },
        Ok(VariantTag::Float) => unsafe { v.payload.float != 0.0 },
        Ok(VariantTag::Object) => !unsafe { v.payload.object }.is_null(),
        _ => false,
    }
}

unsafe extern "C" fn variant_to_int(variant: *const RawVariant) -> i64 {
    let v = unsafe { &*variant };
    match VariantTag::try_from(v.tag) {
        Ok(VariantTag::Bool) => unsafe { v.payload.boolean as i64 },
        Ok(VariantTag::Int) => unsafe { v.payload.int },
        Ok(VariantTag::Float) => unsafe { v.payload.float as i64 },
        Ok(VariantTag::String) => {
            let s = state();
            variant_text_locked(&s, v).parse().unwrap_or(0)
        }
        _ => 0,
    }
}

unsafe extern "C" fn variant_to_float(variant: *const RawVariant) -> f64 {
    let v = unsafe { &*variant };
    match VariantTag::try_from(v.tag) {
        Ok(VariantTag::Bool) => unsafe { v.payload.boolean as u8 as f64 },
        Ok(VariantTag::Int) => unsafe { v.payload.int as f64 },
        Ok(VariantTag::Float) => unsafe { v.payload.float },
        Ok(VariantTag::String) => {
            let s = state();
            variant_text_locked(&s, v).parse().unwrap_or(0.0)
        }
        _ => 0.0,
    }
}

unsafe extern "C" fn variant_to_text(
    variant: *const RawVariant,
    buf: *mut u8,
    cap: usize,
) -> usize {
    let s = state();
    let text = variant_text_locked(&s, unsafe { &*variant });
    drop(s);
    write_text(&text, buf, cap)
}

unsafe extern "C" fn variant_from_text(out: *mut RawVariant, utf8: *const u8, len: usize) {
    let content = unsafe { utf8_arg(utf8, len) };
    let mut s = state();
    let ptr = s.alloc_payload(PayloadData::Str(content));
    unsafe {
        *out = RawVariant {
            tag: VariantTag::String.into(),
            payload: RawVariantPayload {
                ptr: ptr as *mut c_void,
            },
        };
    }
}

unsafe extern "C" fn variant_to_string_name(
    variant: *const RawVariant,
    out: *mut RawStringName,
) -> bool {
    let v = unsafe { &*variant };
    let mut s = state();
    match VariantTag::try_from(v.tag) {
        Ok(VariantTag::StringName) => {
            let name = unsafe { v.payload.string_name };
            s.addref_name(name.ptr as usize);
            unsafe { *out = name };
            true
        }
        Ok(VariantTag::String) => {
            let content = variant_text_locked(&s, v);
            let ptr = s.intern_name(&content, false);
            unsafe {
                *out = RawStringName {
                    ptr: ptr as *mut c_void,
                };
            }
            true
        }
        _ => false,
    }
}

unsafe extern "C" fn variant_from_string_name(out: *mut RawVariant, name: *const RawStringName) {
    let name = unsafe { *name };
    let mut s = state();
    s.addref_name(name.ptr as usize);
    unsafe {
        *out = RawVariant {
            tag: VariantTag::StringName.into(),
            payload: RawVariantPayload { string_name: name },
        };
    }
}

unsafe extern "C" fn variant_to_node_path(
    variant: *const RawVariant,
    out: *mut RawNodePath,
) -> bool {
    let v = unsafe { &*variant };
    let mut s = state();
    match VariantTag::try_from(v.tag) {
        Ok(VariantTag::NodePath) => {
            let path = unsafe { v.payload.node_path };
            if let Some(content) = s.path_index.get(&(path.ptr as usize)).cloned() {
                if let Some(rec) = s.paths.get_mut(&content) {
                    rec.refs += 1;
                }
            }
            unsafe { *out = path };
            true
        }
        Ok(VariantTag::String) => {
            let content = variant_text_locked(&s, v);
            let ptr = s.intern_path(&content);
            unsafe {
                *out = RawNodePath {
                    ptr: ptr as *mut c_void,
                };
            }
            true
        }
        _ => false,
    }
}

unsafe extern "C" fn variant_from_node_path(out: *mut RawVariant, path: *const RawNodePath) {
    let path = unsafe { *path };
    let mut s = state();
    if let Some(content) = s.path_index.get(&(path.ptr as usize)).cloned() {
        if let Some(rec) = s.paths.get_mut(&content) {
            rec.refs += 1;
        }
    }
    unsafe {
        *out = RawVariant {
            tag: VariantTag::NodePath.into(),
            payload: RawVariantPayload { node_path: path },
        };
    }
}

unsafe extern "C" fn variant_from_object(out: *mut RawVariant, object: RawObjectPtr) {
    let mut s = state();
    if let Some(rec) = s.objects.get_mut(&(object as usize)) {
        if let Some(count) = rec.refcount.as_mut() {
            *count += 1;
        }
    }
    unsafe {
        *out = RawVariant {
            tag: VariantTag::Object.into(),
            payload: RawVariantPayload { object },
        };
    }
}

unsafe extern "C" fn variant_to_callable(
    variant: *const RawVariant,
    out: *mut RawCallable,
) -> bool {
    let v = unsafe { &*variant };
    match VariantTag::try_from(v.tag) {
        Ok(VariantTag::Callable) => {
            let callable = unsafe { v.payload.callable };
            let mut s = state();
            if let Some(rec) = s.callables.get_mut(&callable.data[0]) {
                rec.refs += 1;
            }
            unsafe { *out = callable };
            true
        }
        _ => false,
    }
}

unsafe extern "C" fn variant_from_callable(out: *mut RawVariant, callable: *const RawCallable) {
    let callable = unsafe { *callable };
    let mut s = state();
    if let Some(rec) = s.callables.get_mut(&callable.data[0]) {
        rec.refs += 1;
    }
    unsafe {
        *out = RawVariant {
            tag: VariantTag::Callable.into(),
            payload: RawVariantPayload { callable },
        };
    }
}

unsafe extern "C" fn variant_from_signal(out: *mut RawVariant, signal: *const RawSignal) {
    let signal = unsafe { *signal };
    let mut s = state();
    s.addref_name(signal.name.ptr as usize);
    unsafe {
        *out = RawVariant {
            tag: VariantTag::Signal.into(),
            payload: RawVariantPayload { signal },
        };
    }
}

unsafe extern "C" fn variant_hash(variant: *const RawVariant) -> u64 {
    let s = state();
    let mut hasher = Xxh64::new(0);
    variant_hash_locked(&s, unsafe { &*variant }, &mut hasher);
    hasher.digest()
}

unsafe extern "C" fn variant_hash_compare(
    left: *const RawVariant,
    right: *const RawVariant,
) -> bool {
    let s = state();
    variant_eq_locked(&s, unsafe { &*left }, unsafe { &*right })
}

unsafe extern "C" fn array_create(out: *mut RawVariant) {
    let mut s = state();
    let ptr = s.alloc_payload(PayloadData::Array(Vec::new()));
    unsafe {
        *out = RawVariant {
            tag: VariantTag::Array.into(),
            payload: RawVariantPayload {
                ptr: ptr as *mut c_void,
            },
        };
    }
}

unsafe extern "C" fn array_push(array: *mut RawVariant, element: *const RawVariant) {
    let mut s = state();
    let copy = copy_raw_locked(&mut s, unsafe { &*element });
    let ptr = unsafe { (*array).payload.ptr } as usize;
    if let Some(PayloadRec {
        data: PayloadData::Array(elements),
        live: true,
        ..
    }) = s.payloads.get_mut(&ptr)
    {
        elements.push(copy);
    }
}

unsafe extern "C" fn array_len(array: *const RawVariant) -> usize {
    let s = state();
    let ptr = unsafe { (*array).payload.ptr } as usize;
    match s.payloads.get(&ptr) {
        Some(PayloadRec {
            data: PayloadData::Array(elements),
            ..
        }) => elements.len(),
        _ => 0,
    }
}

fn array_elements(variant: &RawVariant) -> Option<usize> {
    if VariantTag::try_from(variant.tag) != Ok(VariantTag::Array) {
        return None;
    }
    let s = state();
    let ptr = unsafe { variant.payload.ptr } as usize;
    match s.payloads.get(&ptr) {
        Some(PayloadRec {
            data: PayloadData::Array(elements),
            ..
        }) => Some(elements.len()),
        _ => None,
    }
}

unsafe extern "C" fn variant_iter_init(
    variant: *const RawVariant,
    iter: *mut RawVariantIter,
) -> bool {
    match array_elements(unsafe { &*variant }) {
        Some(len) if len > 0 => {
            unsafe { (*iter).state = [0, 0] };
            true
        }
        _ => false,
    }
}

unsafe extern "C" fn variant_iter_next(
    variant: *const RawVariant,
    iter: *mut RawVariantIter,
) -> bool {
    let Some(len) = array_elements(unsafe { &*variant }) else {
        return false;
    };
    let next = unsafe { (*iter).state[0] } + 1;
    if (next as usize) < len {
        unsafe { (*iter).state[0] = next };
        true
    } else {
        false
    }
}

unsafe extern "C" fn variant_iter_get(
    variant: *const RawVariant,
    iter: *const RawVariantIter,
    out: *mut RawVariant,
) {
    let mut s = state();
    let ptr = unsafe { (*variant).payload.ptr } as usize;
    let index = unsafe { (*iter).state[0] } as usize;
    let element = match s.payloads.get(&ptr) {
        Some(PayloadRec {
            data: PayloadData::Array(elements),
            ..
        }) => elements.get(index).copied(),
        _ => None,
    };
    let copy = match element {
        Some(element) => copy_raw_locked(&mut s, &element),
        None => RawVariant::NIL,
    };
    unsafe { *out = copy };
}

// ---------------------------------------------------------------------------
// the table and test-facing helpers
// ---------------------------------------------------------------------------

static TABLE: InterfaceTable = InterfaceTable {
    version: ApiVersion::CURRENT,
    object_construct,
    object_destroy,
    object_init_ref,
    object_reference,
    object_unreference,
    object_instance_id,
    object_from_instance_id,
    object_class_name,
    object_notification,
    object_set_instance_binding,
    object_get_instance_binding,
    object_free_instance_binding,
    object_set_script_instance,
    object_has_script_method,
    object_call_script_method,
    object_connect,
    object_disconnect,
    object_emit_signal,
    string_name_new,
    string_name_destroy,
    string_name_copy,
    string_name_text,
    node_path_new,
    node_path_destroy,
    node_path_text,
    callable_create_custom,
    callable_create_bound,
    callable_copy,
    callable_destroy,
    callable_object_id,
    callable_method,
    variant_new_copy,
    variant_destroy,
    variant_to_bool,
    variant_to_int,
    variant_to_float,
    variant_to_text,
    variant_from_text,
    variant_to_string_name,
    variant_from_string_name,
    variant_to_node_path,
    variant_from_node_path,
    variant_from_object,
    variant_to_callable,
    variant_from_callable,
    variant_from_signal,
    variant_hash,
    variant_hash_compare,
    array_create,
    array_push,
    array_len,
    variant_iter_init,
    variant_iter_next,
    variant_iter_get,
};

pub fn interface() -> &'static InterfaceTable {
    &TABLE
}

/// The same engine surface stamped with a different ABI version.
pub fn interface_with_version(version: ApiVersion) -> &'static InterfaceTable {
    Box::leak(Box::new(InterfaceTable { version, ..TABLE }))
}

/// Declares a class on the engine side. Idempotent; shared by every test
/// in the binary.
pub fn define_class(name: &str, ref_counted: bool) {
    let mut s = state();
    s.classes.entry(name.to_owned()).or_insert(ref_counted);
}

/// A fresh bridge over the fake engine with the standard test classes
/// declared on both sides.
pub fn new_bridge() -> &'static Bridge {
    define_class("Node", false);
    define_class("Resource", true);
    let bridge = Bridge::new(BridgeConfig::new(interface())).expect("compatible fake engine");
    bridge.registry().register_class("Node", ClassInfo::new(false));
    bridge
        .registry()
        .register_class("Resource", ClassInfo::new(true));
    bridge
}

/// Declares `name` on both the engine side and a bridge's registry.
pub fn define_class_on(bridge: &'static Bridge, name: &str, ref_counted: bool) {
    define_class(name, ref_counted);
    bridge
        .registry()
        .register_class(name, ClassInfo::new(ref_counted));
}

/// Simulates the engine constructing an instance on its own.
pub fn construct_native(class: &str) -> RawObjectPtr {
    let mut s = state();
    let ptr = s.intern_name(class, false);
    drop(s);
    let name = RawStringName {
        ptr: ptr as *mut c_void,
    };
    unsafe { object_construct(&name) }
}

/// Simulates the engine destroying an instance on its own initiative.
pub fn native_destroy(ptr: RawObjectPtr) {
    destroy_object_now(ptr);
}

/// Simulates a native-side holder taking a reference.
pub fn add_external_ref(ptr: RawObjectPtr) {
    unsafe { object_reference(ptr) };
}

/// Simulates a native-side holder releasing its reference; destroys the
/// instance if that was the last one. Returns whether it was destroyed.
pub fn release_external_ref(ptr: RawObjectPtr) -> bool {
    let dead = unsafe { object_unreference(ptr) };
    if dead {
        destroy_object_now(ptr);
    }
    dead
}

pub fn object_alive(ptr: RawObjectPtr) -> bool {
    state()
        .objects
        .get(&(ptr as usize))
        .is_some_and(|rec| rec.live)
}

pub fn destroy_count(ptr: RawObjectPtr) -> usize {
    state()
        .destroy_counts
        .get(&(ptr as usize))
        .copied()
        .unwrap_or(0)
}

pub fn refcount(ptr: RawObjectPtr) -> Option<u32> {
    state()
        .objects
        .get(&(ptr as usize))
        .and_then(|rec| rec.refcount)
}

pub fn notifications(ptr: RawObjectPtr) -> Vec<i32> {
    state()
        .objects
        .get(&(ptr as usize))
        .map(|rec| rec.notifications.clone())
        .unwrap_or_default()
}

pub fn object_ptr_of_id(id: u64) -> RawObjectPtr {
    state()
        .objects_by_id
        .get(&id)
        .map(|&ptr| ptr as RawObjectPtr)
        .unwrap_or(std::ptr::null_mut())
}

pub fn connection_count(ptr: RawObjectPtr, signal: &str) -> usize {
    let s = state();
    let Some(signal_ptr) = s.names.get(signal).filter(|rec| rec.live).map(|rec| rec.ptr) else {
        return 0;
    };
    s.objects
        .get(&(ptr as usize))
        .map(|rec| {
            rec.connections
                .iter()
                .filter(|conn| conn.signal == signal_ptr)
                .count()
        })
        .unwrap_or(0)
}

pub fn name_live(content: &str) -> bool {
    state().names.get(content).is_some_and(|rec| rec.live)
}

pub fn name_refs(content: &str) -> usize {
    state().names.get(content).map(|rec| rec.refs).unwrap_or(0)
}

pub fn name_release_count(content: &str) -> usize {
    state().name_releases.get(content).copied().unwrap_or(0)
}

pub fn name_is_static(content: &str) -> bool {
    state().names.get(content).is_some_and(|rec| rec.is_static)
}

pub fn string_payloads_created(content: &str) -> usize {
    state().string_stats.get(content).map(|s| s.0).unwrap_or(0)
}

pub fn string_payloads_released(content: &str) -> usize {
    state().string_stats.get(content).map(|s| s.1).unwrap_or(0)
}

pub fn path_release_count(content: &str) -> usize {
    state().path_releases.get(content).copied().unwrap_or(0)
}

pub fn path_live(content: &str) -> bool {
    state().paths.get(content).is_some_and(|rec| rec.live)
}
