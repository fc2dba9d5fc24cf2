//! Raw ABI surface of the Vesper engine's extension interface.
//!
//! This crate defines the `#[repr(C)]` interop structs and the fixed table of
//! function pointers ([`InterfaceTable`]) that the engine hands to an
//! extension at load time. Nothing in here dereferences engine memory; the
//! types only describe layout and the call surface is treated as an opaque,
//! versioned ABI.
//!
//! The higher-level wrappers live in the `vesper` crate.

mod geometry;
mod interface;
mod variant;

pub use geometry::*;
pub use interface::*;
pub use variant::*;

use std::ffi::c_void;

/// Opaque pointer to a native engine object instance.
///
/// Never dereferenced on the extension side; only passed back through the
/// [`InterfaceTable`].
pub type RawObjectPtr = *mut c_void;

/// Opaque token the engine uses to identify the extension library that
/// registered a binding or callable.
pub type LibraryToken = *const c_void;

/// Opaque token for a pinned host-side reference.
///
/// The engine stores these in instance bindings, script instances, and
/// callable userdata; it never interprets the value. Zero is reserved for
/// "no token".
pub type RawHandle = u64;

/// A natively-allocated interned name handle.
///
/// Two names holding the same pointer are the same interned entry, which is
/// what makes identity comparison sufficient for equality.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawStringName {
    pub ptr: *mut c_void,
}

impl RawStringName {
    pub const NULL: RawStringName = RawStringName {
        ptr: std::ptr::null_mut(),
    };

    #[inline]
    pub fn is_allocated(&self) -> bool {
        !self.ptr.is_null()
    }
}

/// A natively-allocated parsed path handle.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawNodePath {
    pub ptr: *mut c_void,
}

impl RawNodePath {
    pub const NULL: RawNodePath = RawNodePath {
        ptr: std::ptr::null_mut(),
    };

    #[inline]
    pub fn is_allocated(&self) -> bool {
        !self.ptr.is_null()
    }
}

/// A native callable record. Two machine words, interpreted only by the
/// engine: either an object/method pair or a custom-callable allocation.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawCallable {
    pub data: [u64; 2],
}

impl RawCallable {
    pub const NULL: RawCallable = RawCallable { data: [0; 2] };
}

/// A native signal record: owning object plus signal name.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawSignal {
    pub object: RawObjectPtr,
    pub name: RawStringName,
}
