//! The tagged dynamic value as it crosses the boundary.

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::geometry::*;
use crate::{RawCallable, RawNodePath, RawObjectPtr, RawSignal, RawStringName};
use std::ffi::c_void;

/// Discriminant of [`RawVariant`].
///
/// The numeric values are part of the engine ABI and must not be reordered.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
pub enum VariantTag {
    Nil = 0,
    Bool,
    Int,
    Float,
    String,
    Vector2,
    Vector2i,
    Rect2,
    Rect2i,
    Vector3,
    Vector3i,
    Transform2d,
    Vector4,
    Vector4i,
    Plane,
    Quaternion,
    Aabb,
    Basis,
    Transform3d,
    Projection,
    Color,
    StringName,
    NodePath,
    Rid,
    Object,
    Callable,
    Signal,
    Dictionary,
    Array,
    PackedByteArray,
    PackedInt32Array,
    PackedInt64Array,
    PackedFloat32Array,
    PackedFloat64Array,
    PackedStringArray,
    PackedVector2Array,
    PackedVector3Array,
    PackedColorArray,
    PackedVector4Array,
}

impl VariantTag {
    /// Whether a value of this tag is stored entirely inline and needs no
    /// native release.
    pub fn is_trivial(self) -> bool {
        matches!(
            self,
            VariantTag::Nil
                | VariantTag::Bool
                | VariantTag::Int
                | VariantTag::Float
                | VariantTag::Vector2
                | VariantTag::Vector2i
                | VariantTag::Rect2
                | VariantTag::Rect2i
                | VariantTag::Vector3
                | VariantTag::Vector3i
                | VariantTag::Vector4
                | VariantTag::Vector4i
                | VariantTag::Plane
                | VariantTag::Quaternion
                | VariantTag::Color
                | VariantTag::Rid
        )
    }
}

/// Payload of a [`RawVariant`]. 16 bytes; larger engine types are stored as
/// an engine-owned allocation behind `ptr`.
#[repr(C)]
#[derive(Clone, Copy)]
pub union RawVariantPayload {
    pub nil: (),
    pub boolean: bool,
    pub int: i64,
    pub float: f64,
    pub vector2: Vector2,
    pub vector2i: Vector2i,
    pub rect2: Rect2,
    pub rect2i: Rect2i,
    pub vector3: Vector3,
    pub vector3i: Vector3i,
    pub vector4: Vector4,
    pub vector4i: Vector4i,
    pub plane: Plane,
    pub quaternion: Quaternion,
    pub color: Color,
    pub rid: Rid,
    pub string_name: RawStringName,
    pub node_path: RawNodePath,
    pub object: RawObjectPtr,
    pub callable: RawCallable,
    pub signal: RawSignal,
    /// Engine-owned allocation for every other owning tag.
    pub ptr: *mut c_void,
}

/// The tagged value as laid out on the wire.
///
/// Construction, duplication, and destruction of owning payloads go through
/// the [`InterfaceTable`](crate::InterfaceTable); only trivial tags may be
/// copied inline.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct RawVariant {
    pub tag: u32,
    pub payload: RawVariantPayload,
}

impl RawVariant {
    pub const NIL: RawVariant = RawVariant {
        tag: VariantTag::Nil as u32,
        payload: RawVariantPayload { nil: () },
    };
}

impl Default for RawVariant {
    fn default() -> Self {
        RawVariant::NIL
    }
}

/// Opaque iteration cursor over an array-like variant. Initialized and
/// advanced only by the engine.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct RawVariantIter {
    pub state: [u64; 2],
}

/// Status codes for callable invocations and script-method dispatch.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
pub enum CallStatus {
    Ok = 0,
    InvalidMethod,
    InvalidArgument,
    TooManyArguments,
    TooFewArguments,
    InstanceIsNull,
}

/// Out-parameter filled by the engine (or a custom callable) after a call.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct RawCallError {
    pub status: u32,
    /// Index of the offending argument for the argument-related statuses.
    pub argument: i32,
}

impl RawCallError {
    pub const OK: RawCallError = RawCallError {
        status: CallStatus::Ok as u32,
        argument: -1,
    };
}

impl Default for RawCallError {
    fn default() -> Self {
        RawCallError::OK
    }
}
