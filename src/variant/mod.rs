//! The tagged dynamic value transported across the boundary.
//!
//! A [`Variant`] owns one [`RawVariant`]. Trivial tags (absent, booleans,
//! numbers, and the small fixed-size geometric structs) live entirely
//! inline and need no release. Every other tag carries an engine
//! allocation that must be released exactly once, which is what the
//! disposal token guarantees: the token is shared by every clone of the
//! value, and the native release happens on whichever of explicit
//! disposal, the teardown sweep, or the final drop gets there first.
//!
//! Conversions for trivial tags read the inline payload and widen or
//! narrow in place; conversions for owning tags go through the engine and
//! may themselves allocate, in which case the result is taken over as a
//! fresh owned value.

mod convert;

pub use convert::{FromVariant, ToVariant};

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use vesper_ffi::{
    Color, Plane, Quaternion, Rect2, Rect2i, Rid, RawCallable, RawNodePath, RawStringName,
    RawVariant, RawVariantIter, Vector2, Vector2i, Vector3, Vector3i, Vector4, Vector4i,
    VariantTag,
};

use crate::bridge::Bridge;
use crate::callable::Callable;
use crate::disposables::{DisposableId, NativeRelease};
use crate::node_path::NodePath;
use crate::object::Object;
use crate::signal::Signal;
use crate::string_name::StringName;

/// Reference-counted disposal token for an owning payload.
///
/// Kept separate from [`Variant`] because the value itself is duplicated
/// freely; however many copies exist, the underlying release call happens
/// exactly once.
struct VariantDisposer {
    bridge: &'static Bridge,
    raw: RawVariant,
    released: AtomicBool,
    tracker: OnceLock<DisposableId>,
}

// The payload is only handed back to the engine; release is serialized by
// the `released` flag.
unsafe impl Send for VariantDisposer {}
unsafe impl Sync for VariantDisposer {}

impl VariantDisposer {
    fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Marks the payload as no longer owned without releasing it. Used
    /// when ownership transfers to the engine.
    fn disarm(&self) {
        let already = self.released.swap(true, Ordering::AcqRel);
        assert!(!already, "ownership transfer of a disposed Variant");
        self.unregister();
    }

    fn unregister(&self) {
        if let Some(&id) = self.tracker.get() {
            self.bridge.disposables().unregister_value(id);
        }
    }
}

impl NativeRelease for VariantDisposer {
    fn release_native(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            let mut raw = self.raw;
            unsafe { (self.bridge.interface().variant_destroy)(&mut raw) };
        }
    }
}

impl Drop for VariantDisposer {
    fn drop(&mut self) {
        self.release_native();
        self.unregister();
    }
}

/// A value of any bridgeable type.
#[derive(Clone)]
pub struct Variant {
    bridge: &'static Bridge,
    raw: RawVariant,
    disposer: Option<Arc<VariantDisposer>>,
    // Boxed: a container projection holds a Variant of its own.
    projection: OnceLock<Box<ManagedValue>>,
}

// See `VariantDisposer`; the inline payload is plain data.
unsafe impl Send for Variant {}
unsafe impl Sync for Variant {}

impl Variant {
    /// The absent value.
    pub fn nil(bridge: &'static Bridge) -> Variant {
        Variant {
            bridge,
            raw: RawVariant::NIL,
            disposer: None,
            projection: OnceLock::new(),
        }
    }

    /// Takes ownership of a freshly produced native payload.
    pub(crate) fn take(bridge: &'static Bridge, raw: RawVariant) -> Variant {
        let tag = VariantTag::try_from(raw.tag).expect("engine produced an unknown variant tag");
        let disposer = if tag.is_trivial() {
            None
        } else {
            let disposer = Arc::new(VariantDisposer {
                bridge,
                raw,
                released: AtomicBool::new(false),
                tracker: OnceLock::new(),
            });
            let weak: Weak<dyn NativeRelease> = {
                let as_release: Arc<dyn NativeRelease> = disposer.clone();
                Arc::downgrade(&as_release)
            };
            let id = bridge.disposables().register_value(weak);
            let _ = disposer.tracker.set(id);
            Some(disposer)
        };
        Variant {
            bridge,
            raw,
            disposer,
            projection: OnceLock::new(),
        }
    }

    /// Duplicates a borrowed native payload so the new value outlives the
    /// source.
    pub(crate) fn copy(bridge: &'static Bridge, raw: &RawVariant) -> Variant {
        let tag = VariantTag::try_from(raw.tag).expect("engine produced an unknown variant tag");
        if tag.is_trivial() {
            return Variant {
                bridge,
                raw: *raw,
                disposer: None,
                projection: OnceLock::new(),
            };
        }
        let mut duplicate = RawVariant::NIL;
        unsafe { (bridge.interface().variant_new_copy)(&mut duplicate, raw) };
        Variant::take(bridge, duplicate)
    }

    /// Builds an engine array from `items`, copying each element in.
    pub fn array(bridge: &'static Bridge, items: &[Variant]) -> Variant {
        let mut raw = RawVariant::NIL;
        unsafe {
            (bridge.interface().array_create)(&mut raw);
            for item in items {
                (bridge.interface().array_push)(&mut raw, item.raw_ref());
            }
        }
        Variant::take(bridge, raw)
    }

    /// The tag of this value.
    pub fn tag(&self) -> VariantTag {
        VariantTag::try_from(self.raw.tag).expect("variant holds an unknown tag")
    }

    /// Whether the owned payload has been released.
    ///
    /// Trivial values own nothing and are never disposed.
    pub fn is_disposed(&self) -> bool {
        self.disposer.as_ref().is_some_and(|d| d.is_released())
    }

    /// Borrow of the raw value.
    ///
    /// Panics if the payload was already released; handing it to the
    /// engine again would be a use-after-free.
    pub(crate) fn raw_ref(&self) -> &RawVariant {
        assert!(!self.is_disposed(), "use of a disposed Variant");
        &self.raw
    }

    /// Transfers payload ownership to the caller (typically straight into
    /// an engine out-parameter). Clones of this value become disposed.
    pub(crate) fn into_raw(self) -> RawVariant {
        if let Some(disposer) = &self.disposer {
            disposer.disarm();
        }
        self.raw
    }

    /// Releases the owned payload.
    ///
    /// Safe to call any number of times, from any clone, concurrently with
    /// drops: the native release happens exactly once. Trivial values have
    /// nothing to release and remain readable.
    pub fn dispose(&self) {
        if let Some(disposer) = &self.disposer {
            disposer.release_native();
            disposer.unregister();
        }
    }

    // -- conversions --------------------------------------------------------

    /// Reads this value as a boolean, widening numeric payloads.
    pub fn as_bool(&self) -> bool {
        let raw = self.raw_ref();
        match self.tag() {
            VariantTag::Nil => false,
            VariantTag::Bool => unsafe { raw.payload.boolean },
            VariantTag::Int => unsafe { raw.payload.int != 0 },
            VariantTag::Float => unsafe { raw.payload.float != 0.0 },
            tag if tag.is_trivial() => {
                panic!("cannot convert {tag:?} variant to bool")
            }
            _ => unsafe { (self.bridge.interface().variant_to_bool)(raw) },
        }
    }

    /// Reads this value as an integer, widening or truncating numeric
    /// payloads.
    pub fn as_i64(&self) -> i64 {
        let raw = self.raw_ref();
        match self.tag() {
            VariantTag::Nil => 0,
            VariantTag::Bool => unsafe { i64::from(raw.payload.boolean) },
            VariantTag::Int => unsafe { raw.payload.int },
            VariantTag::Float => unsafe { raw.payload.float as i64 },
            tag if tag.is_trivial() => {
                panic!("cannot convert {tag:?} variant to integer")
            }
            _ => unsafe { (self.bridge.interface().variant_to_int)(raw) },
        }
    }

    pub fn as_f64(&self) -> f64 {
        let raw = self.raw_ref();
        match self.tag() {
            VariantTag::Nil => 0.0,
            VariantTag::Bool => unsafe { f64::from(raw.payload.boolean) },
            VariantTag::Int => unsafe { raw.payload.int as f64 },
            VariantTag::Float => unsafe { raw.payload.float },
            tag if tag.is_trivial() => {
                panic!("cannot convert {tag:?} variant to float")
            }
            _ => unsafe { (self.bridge.interface().variant_to_float)(raw) },
        }
    }

    /// Stringifies the value through the engine.
    pub fn as_string(&self) -> String {
        let raw = self.raw_ref();
        let interface = self.bridge.interface();
        unsafe {
            let len = (interface.variant_to_text)(raw, std::ptr::null_mut(), 0);
            let mut buf = vec![0u8; len];
            (interface.variant_to_text)(raw, buf.as_mut_ptr(), len);
            String::from_utf8_lossy(&buf).into_owned()
        }
    }

    /// Converts to an interned name. The engine conversion allocates a
    /// fresh entry which this wrapper then owns.
    pub fn as_string_name(&self) -> StringName {
        let raw = self.raw_ref();
        let mut out = RawStringName::NULL;
        let ok = unsafe { (self.bridge.interface().variant_to_string_name)(raw, &mut out) };
        assert!(
            ok,
            "cannot convert {:?} variant to StringName",
            self.tag()
        );
        StringName::take_raw(self.bridge, out)
    }

    pub fn as_node_path(&self) -> NodePath {
        let raw = self.raw_ref();
        let mut out = RawNodePath::NULL;
        let ok = unsafe { (self.bridge.interface().variant_to_node_path)(raw, &mut out) };
        assert!(ok, "cannot convert {:?} variant to NodePath", self.tag());
        NodePath::take_raw(self.bridge, out)
    }

    /// Resolves an object reference.
    ///
    /// `None` for the absent value and for instances that no longer have a
    /// live wrapper; a wrapper is never fabricated here.
    pub fn as_object(&self) -> Option<Arc<Object>> {
        let raw = self.raw_ref();
        match self.tag() {
            VariantTag::Nil => None,
            VariantTag::Object => {
                let ptr = unsafe { raw.payload.object };
                self.bridge.registry().resolve(ptr)
            }
            tag => panic!("cannot convert {tag:?} variant to Object"),
        }
    }

    pub fn as_callable(&self) -> Callable {
        let raw = self.raw_ref();
        let mut out = RawCallable::NULL;
        let ok = unsafe { (self.bridge.interface().variant_to_callable)(raw, &mut out) };
        assert!(ok, "cannot convert {:?} variant to Callable", self.tag());
        Callable::take_raw(self.bridge, out)
    }

    pub fn as_signal(&self) -> Signal {
        let raw = self.raw_ref();
        match self.tag() {
            VariantTag::Signal => {
                let raw_signal = unsafe { raw.payload.signal };
                let owner = self.bridge.registry().resolve(raw_signal.object);
                let mut name = RawStringName::NULL;
                unsafe {
                    (self.bridge.interface().string_name_copy)(&mut name, &raw_signal.name);
                }
                Signal::new_resolved(owner, StringName::take_raw(self.bridge, name))
            }
            tag => panic!("cannot convert {tag:?} variant to Signal"),
        }
    }

    /// Converts to `T`, panicking when the tags are incompatible.
    pub fn get<T: FromVariant>(&self) -> T {
        match T::from_variant(self) {
            Some(value) => value,
            None => panic!(
                "cannot convert {:?} variant to {}",
                self.tag(),
                std::any::type_name::<T>()
            ),
        }
    }

    /// Converts to `T`; `None` when the tags are incompatible.
    pub fn try_get<T: FromVariant>(&self) -> Option<T> {
        T::from_variant(self)
    }

    /// Number of elements of an array value.
    pub fn element_count(&self) -> Option<usize> {
        match self.tag() {
            VariantTag::Array => {
                Some(unsafe { (self.bridge.interface().array_len)(self.raw_ref()) })
            }
            _ => None,
        }
    }

    /// Iterates the elements of an array-like value. Empty for values the
    /// engine cannot enumerate.
    pub fn iter(&self) -> VariantIter<'_> {
        VariantIter {
            variant: self,
            cursor: RawVariantIter::default(),
            state: IterState::Fresh,
        }
    }

    /// The lazily computed host-side projection of this value.
    ///
    /// Memoized per value; the cache only ever avoids recomputation and is
    /// never consulted for ownership decisions.
    pub fn to_managed(&self) -> &ManagedValue {
        self.projection
            .get_or_init(|| Box::new(self.compute_projection()))
    }

    fn compute_projection(&self) -> ManagedValue {
        let raw = self.raw_ref();
        match self.tag() {
            VariantTag::Nil => ManagedValue::Nil,
            VariantTag::Bool => ManagedValue::Bool(unsafe { raw.payload.boolean }),
            VariantTag::Int => ManagedValue::Int(unsafe { raw.payload.int }),
            VariantTag::Float => ManagedValue::Float(unsafe { raw.payload.float }),
            VariantTag::String => ManagedValue::Str(self.as_string()),
            VariantTag::Vector2 => ManagedValue::Vector2(unsafe { raw.payload.vector2 }),
            VariantTag::Vector2i => ManagedValue::Vector2i(unsafe { raw.payload.vector2i }),
            VariantTag::Rect2 => ManagedValue::Rect2(unsafe { raw.payload.rect2 }),
            VariantTag::Rect2i => ManagedValue::Rect2i(unsafe { raw.payload.rect2i }),
            VariantTag::Vector3 => ManagedValue::Vector3(unsafe { raw.payload.vector3 }),
            VariantTag::Vector3i => ManagedValue::Vector3i(unsafe { raw.payload.vector3i }),
            VariantTag::Vector4 => ManagedValue::Vector4(unsafe { raw.payload.vector4 }),
            VariantTag::Vector4i => ManagedValue::Vector4i(unsafe { raw.payload.vector4i }),
            VariantTag::Plane => ManagedValue::Plane(unsafe { raw.payload.plane }),
            VariantTag::Quaternion => ManagedValue::Quaternion(unsafe { raw.payload.quaternion }),
            VariantTag::Color => ManagedValue::Color(unsafe { raw.payload.color }),
            VariantTag::Rid => ManagedValue::Rid(unsafe { raw.payload.rid }),
            VariantTag::StringName => ManagedValue::StringName(self.as_string_name()),
            VariantTag::NodePath => ManagedValue::NodePath(self.as_node_path()),
            VariantTag::Object => ManagedValue::Object(self.as_object()),
            VariantTag::Callable => ManagedValue::Callable(self.as_callable()),
            VariantTag::Signal => ManagedValue::Signal(self.as_signal()),
            // Containers and the large geometric types project as an owned
            // handle to the same native data.
            _ => ManagedValue::Container(Variant::copy(self.bridge, raw)),
        }
    }

    /// Structural equality through the engine, including container
    /// contents.
    pub fn structural_eq(&self, other: &Variant) -> bool {
        unsafe {
            (self.bridge.interface().variant_hash_compare)(self.raw_ref(), other.raw_ref())
        }
    }

    /// The engine's hash of this value.
    pub fn hash_value(&self) -> u64 {
        unsafe { (self.bridge.interface().variant_hash)(self.raw_ref()) }
    }
}

impl PartialEq for Variant {
    fn eq(&self, other: &Self) -> bool {
        self.structural_eq(other)
    }
}

impl fmt::Debug for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_disposed() {
            return write!(f, "Variant(<disposed {:?}>)", self.tag());
        }
        write!(f, "Variant({:?}: {})", self.tag(), self.as_string())
    }
}

enum IterState {
    Fresh,
    Running,
    Done,
}

/// Iterator over the elements of an array-like variant.
pub struct VariantIter<'a> {
    variant: &'a Variant,
    cursor: RawVariantIter,
    state: IterState,
}

impl Iterator for VariantIter<'_> {
    type Item = Variant;

    fn next(&mut self) -> Option<Variant> {
        let interface = self.variant.bridge.interface();
        let raw = self.variant.raw_ref();
        let has_current = match self.state {
            IterState::Fresh => {
                let started = unsafe { (interface.variant_iter_init)(raw, &mut self.cursor) };
                self.state = if started {
                    IterState::Running
                } else {
                    IterState::Done
                };
                started
            }
            IterState::Running => {
                let more = unsafe { (interface.variant_iter_next)(raw, &mut self.cursor) };
                if !more {
                    self.state = IterState::Done;
                }
                more
            }
            IterState::Done => false,
        };
        if !has_current {
            return None;
        }
        let mut element = RawVariant::NIL;
        unsafe { (interface.variant_iter_get)(raw, &self.cursor, &mut element) };
        Some(Variant::take(self.variant.bridge, element))
    }
}

/// Host-side projection of a [`Variant`].
#[derive(Clone, Debug)]
pub enum ManagedValue {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Vector2(Vector2),
    Vector2i(Vector2i),
    Rect2(Rect2),
    Rect2i(Rect2i),
    Vector3(Vector3),
    Vector3i(Vector3i),
    Vector4(Vector4),
    Vector4i(Vector4i),
    Plane(Plane),
    Quaternion(Quaternion),
    Color(Color),
    Rid(Rid),
    StringName(StringName),
    NodePath(NodePath),
    Object(Option<Arc<Object>>),
    Callable(Callable),
    Signal(Signal),
    /// Arrays, dictionaries, packed arrays, and the heap-allocated
    /// geometric types: an owned handle to the same native data.
    Container(Variant),
}

impl PartialEq for ManagedValue {
    fn eq(&self, other: &Self) -> bool {
        use ManagedValue::*;
        match (self, other) {
            (Nil, Nil) => true,
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Float(a), Float(b)) => a == b,
            (Str(a), Str(b)) => a == b,
            (Vector2(a), Vector2(b)) => a == b,
            (Vector2i(a), Vector2i(b)) => a == b,
            (Rect2(a), Rect2(b)) => a == b,
            (Rect2i(a), Rect2i(b)) => a == b,
            (Vector3(a), Vector3(b)) => a == b,
            (Vector3i(a), Vector3i(b)) => a == b,
            (Vector4(a), Vector4(b)) => a == b,
            (Vector4i(a), Vector4i(b)) => a == b,
            (Plane(a), Plane(b)) => a == b,
            (Quaternion(a), Quaternion(b)) => a == b,
            (Color(a), Color(b)) => a == b,
            (Rid(a), Rid(b)) => a == b,
            (StringName(a), StringName(b)) => a == b,
            (NodePath(a), NodePath(b)) => a == b,
            (Object(a), Object(b)) => match (a, b) {
                (None, None) => true,
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                _ => false,
            },
            (Callable(a), Callable(b)) => a == b,
            (Signal(a), Signal(b)) => a == b,
            (Container(a), Container(b)) => a == b,
            _ => false,
        }
    }
}
