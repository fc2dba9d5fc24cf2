//! Host-side bindings for the Vesper engine's extension ABI.
//!
//! The engine owns objects, reference counts, and a tagged dynamic value
//! type by raw pointer and explicit (de)allocation calls; this crate owns
//! the other side of that boundary. It establishes and tears down the
//! association between host wrappers and native instances under every
//! ordering the engine can produce: creation from either side, disposal
//! triggered from either side, reentrant callbacks arriving inside a
//! teardown, and transport of the full tagged value union without leaking
//! or double-freeing.
//!
//! The pieces, bottom up:
//!
//! - [`StringName`] / [`NodePath`]: disposable wrappers over
//!   natively-interned handles, with identity-based equality and a static
//!   flavor that is never released.
//! - [`Variant`]: the tagged value. Trivial tags are inline; owning tags
//!   carry a shared disposal token that releases the native payload
//!   exactly once.
//! - [`Object`]: the managed/native pair, with one construction routine,
//!   one idempotent teardown routine, and an identity registry that keeps
//!   at most one wrapper per live instance.
//! - [`Callable`] / [`SignalAwaiter`]: dispatch records invokable from
//!   native code, and a one-shot continuation over a signal emission.
//! - [`Dispatcher`]: the thread-affine continuation queue pumped once per
//!   engine tick.
//!
//! The raw ABI lives in [`ffi`]; a [`Bridge`] built over the engine's
//! interface table wires everything together.

pub use vesper_ffi as ffi;

mod bridge;
mod callable;
mod diagnostics;
mod dispatcher;
mod disposables;
mod error;
mod handle;
mod node_path;
mod object;
mod registry;
mod signal;
mod string_name;
mod variant;

pub use bridge::{Bridge, BridgeConfig};
pub use callable::{Callable, CustomCallable, FnCallable};
pub use diagnostics::{Diagnostic, DiagnosticKind, MessageCallbackFn};
pub use dispatcher::Dispatcher;
pub use disposables::{DisposableId, DisposablesTracker, NativeRelease};
pub use error::{BridgeError, CallError, ConnectError, InstallError, ObjectError, Result};
pub use handle::{HandleArena, HandleToken};
pub use node_path::NodePath;
pub use object::{
    InitOptions, Object, OverrideCall, ScriptInstance, NOTIFICATION_POSTINITIALIZE,
    NOTIFICATION_PREDELETE,
};
pub use registry::{ClassInfo, InstanceRegistry};
pub use signal::{ConnectFlags, Signal, SignalAwaiter};
pub use string_name::{static_name, StringName};
pub use variant::{FromVariant, ManagedValue, ToVariant, Variant, VariantIter};
