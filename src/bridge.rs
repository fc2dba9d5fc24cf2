//! Bridge configuration and the process-wide engine interface.
//!
//! The engine hands the extension a pointer to its [`InterfaceTable`] at
//! load time, on the engine's own thread. [`Bridge::new`] validates the
//! table, binds that thread as the engine thread, and wires up the
//! collaborators every wrapper type needs: the pinned-handle arena, the
//! identity registry, the disposables tracker, and the continuation
//! dispatcher.
//!
//! A bridge is deliberately not a hidden singleton: tests run several fake
//! engines in one process by building one bridge per engine. Production
//! loaders call [`Bridge::install`] once to publish the bridge for
//! process-wide lookups.

use std::fmt;
use std::sync::OnceLock;
use std::thread::{self, ThreadId};

use vesper_ffi::{ApiVersion, InterfaceTable, LibraryToken};

use crate::diagnostics::{MessageCallbackFn, MessageSink};
use crate::dispatcher::Dispatcher;
use crate::disposables::DisposablesTracker;
use crate::error::InstallError;
use crate::handle::HandleArena;
use crate::registry::InstanceRegistry;

/// Options for building a [`Bridge`].
pub struct BridgeConfig {
    pub interface: &'static InterfaceTable,
    pub message_callback: Option<MessageCallbackFn>,
}

impl BridgeConfig {
    pub fn new(interface: &'static InterfaceTable) -> Self {
        BridgeConfig {
            interface,
            message_callback: None,
        }
    }

    pub fn with_message_callback(mut self, callback: MessageCallbackFn) -> Self {
        self.message_callback = Some(callback);
        self
    }
}

static INSTALLED: OnceLock<&'static Bridge> = OnceLock::new();

/// One live connection to an engine.
///
/// The value is leaked on construction: engine callbacks identify the
/// bridge by its address (the library token), so it must stay at a stable
/// location for the remainder of the process.
pub struct Bridge {
    interface: &'static InterfaceTable,
    engine_thread: ThreadId,
    handles: HandleArena,
    registry: InstanceRegistry,
    disposables: DisposablesTracker,
    dispatcher: Dispatcher,
    messages: MessageSink,
}

impl Bridge {
    /// Builds a bridge over `config.interface`.
    ///
    /// Must be called on the engine thread; the dispatcher binds to the
    /// calling thread.
    pub fn new(config: BridgeConfig) -> Result<&'static Bridge, InstallError> {
        if !config.interface.version.is_compatible(ApiVersion::CURRENT) {
            return Err(InstallError::IncompatibleVersion {
                found: config.interface.version,
                required: ApiVersion::CURRENT,
            });
        }

        let bridge = Box::leak(Box::new(Bridge {
            interface: config.interface,
            engine_thread: thread::current().id(),
            handles: HandleArena::new(),
            registry: InstanceRegistry::new(),
            disposables: DisposablesTracker::new(),
            dispatcher: Dispatcher::new(),
            messages: MessageSink::new(config.message_callback),
        }));
        Ok(bridge)
    }

    /// Builds and publishes the process-wide bridge.
    pub fn install(config: BridgeConfig) -> Result<&'static Bridge, InstallError> {
        let bridge = Bridge::new(config)?;
        INSTALLED
            .set(bridge)
            .map_err(|_| InstallError::AlreadyInstalled)?;
        Ok(bridge)
    }

    /// The process-wide bridge, if one was installed.
    pub fn installed() -> Option<&'static Bridge> {
        INSTALLED.get().copied()
    }

    /// The raw engine call surface.
    #[inline]
    pub fn interface(&self) -> &'static InterfaceTable {
        self.interface
    }

    /// The token identifying this bridge to the engine. Stable for the
    /// process lifetime.
    #[inline]
    pub fn library_token(&'static self) -> LibraryToken {
        self as *const Bridge as LibraryToken
    }

    /// Recovers the bridge from a library token previously produced by
    /// [`Bridge::library_token`].
    ///
    /// # Safety
    /// `token` must be a value obtained from `library_token` in this
    /// process.
    pub(crate) unsafe fn from_library_token(token: LibraryToken) -> &'static Bridge {
        unsafe { &*(token as *const Bridge) }
    }

    /// Whether the caller is on the engine's logical thread.
    #[inline]
    pub fn is_engine_thread(&self) -> bool {
        thread::current().id() == self.engine_thread
    }

    pub fn handles(&self) -> &HandleArena {
        &self.handles
    }

    pub fn registry(&self) -> &InstanceRegistry {
        &self.registry
    }

    pub fn disposables(&self) -> &DisposablesTracker {
        &self.disposables
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub(crate) fn messages(&self) -> &MessageSink {
        &self.messages
    }

    /// Replaces the diagnostic callback.
    pub fn set_message_callback(&self, callback: Option<MessageCallbackFn>) {
        self.messages.set_callback(callback);
    }

    /// Disposes every tracked wrapper. Called by the loader right before
    /// the extension is unloaded; see [`DisposablesTracker`].
    pub fn teardown(&'static self) {
        self.disposables.dispose_all();
    }
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("api_version", &self.interface.version)
            .field("engine_thread", &self.engine_thread)
            .field("live_wrappers", &self.registry.live_count())
            .finish_non_exhaustive()
    }
}
