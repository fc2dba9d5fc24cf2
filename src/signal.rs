//! Signals and the one-shot signal awaiter.
//!
//! [`Signal`] is the value type pairing an owner with a signal name.
//! [`SignalAwaiter`] turns one future emission into a continuation: it
//! registers a single-fire connection backed by a custom callable, and the
//! first emission captures the arguments and completes the awaiter.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bitflags::bitflags;
use vesper_ffi::{CallStatus, RawSignal, RawVariant};

use crate::bridge::Bridge;
use crate::callable::{Callable, CustomCallable};
use crate::error::{CallError, ConnectError};
use crate::object::Object;
use crate::string_name::StringName;
use crate::variant::Variant;

bitflags! {
    /// Behavior of a signal connection.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct ConnectFlags: u32 {
        /// Deliver on the next engine tick instead of synchronously.
        const DEFERRED = 1;
        /// Keep the connection when the owner is serialized.
        const PERSIST = 2;
        /// Disconnect automatically after the first emission.
        const ONE_SHOT = 4;
    }
}

impl Object {
    /// Connects `callable` to one of this instance's signals.
    ///
    /// A rejected connection is an error, never a silent no-op.
    pub fn connect(
        &self,
        signal: &StringName,
        callable: &Callable,
        flags: ConnectFlags,
    ) -> Result<(), ConnectError> {
        let raw_signal = signal.raw();
        let raw_callable = callable.raw();
        let status = unsafe {
            (self.bridge().interface().object_connect)(
                self.native_ptr(),
                &raw_signal,
                &raw_callable,
                flags.bits(),
            )
        };
        if CallStatus::try_from(status) == Ok(CallStatus::Ok) {
            Ok(())
        } else {
            Err(ConnectError::Rejected {
                signal: signal.text(),
                status,
            })
        }
    }

    /// Removes a connection established with [`connect`](Object::connect).
    pub fn disconnect(&self, signal: &StringName, callable: &Callable) {
        let raw_signal = signal.raw();
        let raw_callable = callable.raw();
        unsafe {
            (self.bridge().interface().object_disconnect)(
                self.native_ptr(),
                &raw_signal,
                &raw_callable,
            );
        }
    }

    /// Emits one of this instance's signals.
    pub fn emit_signal(&self, signal: &StringName, args: &[Variant]) -> Result<(), CallError> {
        let raw_signal = signal.raw();
        let raw_args: Vec<RawVariant> = args.iter().map(|a| *a.raw_ref()).collect();
        let status = unsafe {
            (self.bridge().interface().object_emit_signal)(
                self.native_ptr(),
                &raw_signal,
                raw_args.as_ptr(),
                raw_args.len(),
            )
        };
        match CallError::from_status(vesper_ffi::RawCallError {
            status,
            argument: -1,
        }) {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }

    /// Awaits the next emission of one of this instance's signals.
    pub fn awaiter(self: &Arc<Object>, signal: &StringName) -> Result<SignalAwaiter, ConnectError> {
        SignalAwaiter::new(self, signal, Some(self))
    }
}

/// A signal of a particular instance, as a value.
#[derive(Clone)]
pub struct Signal {
    owner: Option<Arc<Object>>,
    name: StringName,
}

impl Signal {
    pub fn new(owner: &Arc<Object>, name: StringName) -> Signal {
        Signal {
            owner: Some(owner.clone()),
            name,
        }
    }

    pub(crate) fn new_resolved(owner: Option<Arc<Object>>, name: StringName) -> Signal {
        Signal { owner, name }
    }

    pub fn owner(&self) -> Option<&Arc<Object>> {
        self.owner.as_ref()
    }

    pub fn name(&self) -> &StringName {
        &self.name
    }

    pub(crate) fn to_raw(&self) -> RawSignal {
        RawSignal {
            object: self
                .owner
                .as_ref()
                .map(|o| o.native_ptr())
                .unwrap_or(std::ptr::null_mut()),
            name: self.name.raw(),
        }
    }
}

impl PartialEq for Signal {
    fn eq(&self, other: &Self) -> bool {
        let owners = match (&self.owner, &other.owner) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        };
        owners && self.name == other.name
    }
}

impl std::fmt::Debug for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signal({:?}::{})", self.owner, self.name)
    }
}

type Continuation = Box<dyn FnOnce(&[Variant]) + Send>;

struct AwaiterState {
    bridge: &'static Bridge,
    signal: StringName,
    target_id: u64,
    completed: AtomicBool,
    result: Mutex<Vec<Variant>>,
    continuation: Mutex<Option<Continuation>>,
}

impl AwaiterState {
    /// First emission wins; later emissions are ignored even if the
    /// engine-side auto-disconnect has not landed yet.
    fn complete(&self, args: &[Variant]) {
        if self.completed.load(Ordering::Acquire) {
            return;
        }
        {
            let mut result = self.result.lock().unwrap();
            *result = args.to_vec();
        }
        self.completed.store(true, Ordering::Release);

        let continuation = self.continuation.lock().unwrap().take();
        if let Some(continuation) = continuation {
            let result = self.result.lock().unwrap().clone();
            continuation(&result);
        }
    }
}

struct AwaiterCallable {
    state: Arc<AwaiterState>,
}

impl CustomCallable for AwaiterCallable {
    fn invoke(&self, args: &[Variant]) -> Result<Variant, CallError> {
        self.state.complete(args);
        Ok(Variant::nil(self.state.bridge))
    }

    fn object_id(&self) -> u64 {
        self.state.target_id
    }

    fn dispatch_hash(&self) -> u64 {
        (self.state.signal.raw().ptr as u64).wrapping_mul(31) ^ self.state.target_id
    }
}

/// Completes, once, on the next emission of a signal.
///
/// The continuation slot is single-entry: registering a second
/// continuation replaces the first. The bridge only supports the
/// register-once/complete-once ordering; this is an accepted limitation of
/// the design, not an oversight. A continuation registered after the
/// signal already fired still runs, immediately, with the captured
/// arguments.
pub struct SignalAwaiter {
    state: Arc<AwaiterState>,
}

impl SignalAwaiter {
    /// Connects to `signal` on `source` with a single-fire connection.
    ///
    /// A connection failure is fatal to the awaiter: the error is returned
    /// and nothing was registered.
    pub fn new(
        source: &Arc<Object>,
        signal: &StringName,
        target: Option<&Arc<Object>>,
    ) -> Result<SignalAwaiter, ConnectError> {
        let bridge = source.bridge();
        let state = Arc::new(AwaiterState {
            bridge,
            signal: signal.clone(),
            target_id: target.map(|t| t.instance_id()).unwrap_or(0),
            completed: AtomicBool::new(false),
            result: Mutex::new(Vec::new()),
            continuation: Mutex::new(None),
        });

        let callable = Callable::from_custom(
            bridge,
            Arc::new(AwaiterCallable {
                state: state.clone(),
            }),
        );
        source.connect(signal, &callable, ConnectFlags::ONE_SHOT)?;
        Ok(SignalAwaiter { state })
    }

    /// Whether the awaited signal has been emitted.
    pub fn is_completed(&self) -> bool {
        self.state.completed.load(Ordering::Acquire)
    }

    /// Registers the continuation to run on completion.
    ///
    /// Runs immediately when the signal already fired. Replaces any
    /// previously registered continuation.
    pub fn on_completed<F>(&self, continuation: F)
    where
        F: FnOnce(&[Variant]) + Send + 'static,
    {
        if self.is_completed() {
            let result = self.state.result.lock().unwrap().clone();
            continuation(&result);
            return;
        }
        *self.state.continuation.lock().unwrap() = Some(Box::new(continuation));
    }

    /// The arguments of the first emission; empty until completion.
    pub fn result(&self) -> Vec<Variant> {
        self.state.result.lock().unwrap().clone()
    }
}
