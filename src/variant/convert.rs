//! Conversions between host types and [`Variant`].
//!
//! `ToVariant` produces an owned value; trivial payloads are built inline,
//! owning payloads go through the engine constructors. `FromVariant` is
//! the "try" shape: `None` for an incompatible tag. The panicking shape is
//! [`Variant::get`].

use std::sync::Arc;

use vesper_ffi::{
    Color, Plane, Quaternion, Rect2, Rect2i, Rid, RawVariant, RawVariantPayload, Vector2,
    Vector2i, Vector3, Vector3i, Vector4, Vector4i, VariantTag,
};

use crate::bridge::Bridge;
use crate::callable::Callable;
use crate::node_path::NodePath;
use crate::object::Object;
use crate::signal::Signal;
use crate::string_name::StringName;
use crate::variant::Variant;

pub trait ToVariant {
    fn to_variant(&self, bridge: &'static Bridge) -> Variant;
}

pub trait FromVariant: Sized {
    fn from_variant(variant: &Variant) -> Option<Self>;
}

fn inline(bridge: &'static Bridge, tag: VariantTag, payload: RawVariantPayload) -> Variant {
    Variant::take(
        bridge,
        RawVariant {
            tag: tag.into(),
            payload,
        },
    )
}

// -- scalars ----------------------------------------------------------------

impl ToVariant for bool {
    fn to_variant(&self, bridge: &'static Bridge) -> Variant {
        inline(bridge, VariantTag::Bool, RawVariantPayload { boolean: *self })
    }
}

impl FromVariant for bool {
    fn from_variant(variant: &Variant) -> Option<bool> {
        matches!(
            variant.tag(),
            VariantTag::Nil | VariantTag::Bool | VariantTag::Int | VariantTag::Float
        )
        .then(|| variant.as_bool())
    }
}

macro_rules! int_conversions {
    ($($ty:ty),* $(,)?) => {
        $(
            impl ToVariant for $ty {
                fn to_variant(&self, bridge: &'static Bridge) -> Variant {
                    inline(bridge, VariantTag::Int, RawVariantPayload { int: *self as i64 })
                }
            }

            impl FromVariant for $ty {
                fn from_variant(variant: &Variant) -> Option<$ty> {
                    matches!(
                        variant.tag(),
                        VariantTag::Nil | VariantTag::Bool | VariantTag::Int | VariantTag::Float
                    )
                    .then(|| variant.as_i64() as $ty)
                }
            }
        )*
    };
}

int_conversions!(i8, i16, i32, i64, u8, u16, u32, u64);

macro_rules! float_conversions {
    ($($ty:ty),* $(,)?) => {
        $(
            impl ToVariant for $ty {
                fn to_variant(&self, bridge: &'static Bridge) -> Variant {
                    inline(bridge, VariantTag::Float, RawVariantPayload { float: *self as f64 })
                }
            }

            impl FromVariant for $ty {
                fn from_variant(variant: &Variant) -> Option<$ty> {
                    matches!(
                        variant.tag(),
                        VariantTag::Nil | VariantTag::Bool | VariantTag::Int | VariantTag::Float
                    )
                    .then(|| variant.as_f64() as $ty)
                }
            }
        )*
    };
}

float_conversions!(f32, f64);

// -- strings ----------------------------------------------------------------

impl ToVariant for str {
    fn to_variant(&self, bridge: &'static Bridge) -> Variant {
        let mut raw = RawVariant::NIL;
        unsafe {
            (bridge.interface().variant_from_text)(&mut raw, self.as_ptr(), self.len());
        }
        Variant::take(bridge, raw)
    }
}

impl ToVariant for String {
    fn to_variant(&self, bridge: &'static Bridge) -> Variant {
        self.as_str().to_variant(bridge)
    }
}

impl FromVariant for String {
    fn from_variant(variant: &Variant) -> Option<String> {
        (variant.tag() == VariantTag::String).then(|| variant.as_string())
    }
}

// -- geometry ---------------------------------------------------------------

macro_rules! geometry_conversions {
    ($($ty:ident => $field:ident),* $(,)?) => {
        $(
            impl ToVariant for $ty {
                fn to_variant(&self, bridge: &'static Bridge) -> Variant {
                    inline(bridge, VariantTag::$ty, RawVariantPayload { $field: *self })
                }
            }

            impl FromVariant for $ty {
                fn from_variant(variant: &Variant) -> Option<$ty> {
                    (variant.tag() == VariantTag::$ty)
                        .then(|| unsafe { variant.raw_ref().payload.$field })
                }
            }
        )*
    };
}

geometry_conversions!(
    Vector2 => vector2,
    Vector2i => vector2i,
    Rect2 => rect2,
    Rect2i => rect2i,
    Vector3 => vector3,
    Vector3i => vector3i,
    Vector4 => vector4,
    Vector4i => vector4i,
    Plane => plane,
    Quaternion => quaternion,
    Color => color,
);

impl ToVariant for Rid {
    fn to_variant(&self, bridge: &'static Bridge) -> Variant {
        inline(bridge, VariantTag::Rid, RawVariantPayload { rid: *self })
    }
}

impl FromVariant for Rid {
    fn from_variant(variant: &Variant) -> Option<Rid> {
        (variant.tag() == VariantTag::Rid).then(|| unsafe { variant.raw_ref().payload.rid })
    }
}

// -- owning wrappers --------------------------------------------------------

impl ToVariant for StringName {
    fn to_variant(&self, bridge: &'static Bridge) -> Variant {
        let mut raw = RawVariant::NIL;
        let name = self.raw();
        unsafe {
            (bridge.interface().variant_from_string_name)(&mut raw, &name);
        }
        Variant::take(bridge, raw)
    }
}

impl FromVariant for StringName {
    fn from_variant(variant: &Variant) -> Option<StringName> {
        matches!(variant.tag(), VariantTag::StringName | VariantTag::String)
            .then(|| variant.as_string_name())
    }
}

impl ToVariant for NodePath {
    fn to_variant(&self, bridge: &'static Bridge) -> Variant {
        let mut raw = RawVariant::NIL;
        let path = self.raw();
        unsafe {
            (bridge.interface().variant_from_node_path)(&mut raw, &path);
        }
        Variant::take(bridge, raw)
    }
}

impl FromVariant for NodePath {
    fn from_variant(variant: &Variant) -> Option<NodePath> {
        matches!(variant.tag(), VariantTag::NodePath | VariantTag::String)
            .then(|| variant.as_node_path())
    }
}

impl ToVariant for Arc<Object> {
    fn to_variant(&self, bridge: &'static Bridge) -> Variant {
        let mut raw = RawVariant::NIL;
        unsafe {
            (bridge.interface().variant_from_object)(&mut raw, self.native_ptr());
        }
        Variant::take(bridge, raw)
    }
}

impl FromVariant for Arc<Object> {
    fn from_variant(variant: &Variant) -> Option<Arc<Object>> {
        (variant.tag() == VariantTag::Object)
            .then(|| variant.as_object())
            .flatten()
    }
}

impl ToVariant for Callable {
    fn to_variant(&self, bridge: &'static Bridge) -> Variant {
        let mut raw = RawVariant::NIL;
        let callable = self.raw();
        unsafe {
            (bridge.interface().variant_from_callable)(&mut raw, &callable);
        }
        Variant::take(bridge, raw)
    }
}

impl FromVariant for Callable {
    fn from_variant(variant: &Variant) -> Option<Callable> {
        (variant.tag() == VariantTag::Callable).then(|| variant.as_callable())
    }
}

impl ToVariant for Signal {
    fn to_variant(&self, bridge: &'static Bridge) -> Variant {
        let mut raw = RawVariant::NIL;
        let signal = self.to_raw();
        unsafe {
            (bridge.interface().variant_from_signal)(&mut raw, &signal);
        }
        Variant::take(bridge, raw)
    }
}

impl FromVariant for Signal {
    fn from_variant(variant: &Variant) -> Option<Signal> {
        (variant.tag() == VariantTag::Signal).then(|| variant.as_signal())
    }
}

impl ToVariant for Variant {
    fn to_variant(&self, _bridge: &'static Bridge) -> Variant {
        self.clone()
    }
}

impl FromVariant for Variant {
    fn from_variant(variant: &Variant) -> Option<Variant> {
        Some(variant.clone())
    }
}
