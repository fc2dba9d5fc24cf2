//! Structured diagnostic messages from the bridge.
//!
//! The bridge does not log; it reports. Soft failures (a rejected manual
//! free, a dropped value that was never disposed explicitly, an invalid
//! callable invocation) produce a [`Diagnostic`] routed through the sink
//! installed at bridge configuration time. Without a callback, errors fall
//! back to stderr and everything else is dropped.

use std::fmt;
use std::sync::Mutex;

/// Severity of a diagnostic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    Error,
    Warning,
    Info,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticKind::Error => write!(f, "error"),
            DiagnosticKind::Warning => write!(f, "warning"),
            DiagnosticKind::Info => write!(f, "info"),
        }
    }
}

/// A single message emitted by the bridge.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    /// The component that produced the message, e.g. `"object"`.
    pub source: &'static str,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.source, self.kind, self.message)
    }
}

/// Callback receiving every diagnostic the bridge produces.
pub type MessageCallbackFn = fn(&Diagnostic);

pub(crate) struct MessageSink {
    callback: Mutex<Option<MessageCallbackFn>>,
}

impl MessageSink {
    pub(crate) fn new(callback: Option<MessageCallbackFn>) -> Self {
        MessageSink {
            callback: Mutex::new(callback),
        }
    }

    pub(crate) fn set_callback(&self, callback: Option<MessageCallbackFn>) {
        *self.callback.lock().unwrap() = callback;
    }

    pub(crate) fn report(&self, kind: DiagnosticKind, source: &'static str, message: String) {
        let diagnostic = Diagnostic {
            kind,
            source,
            message,
        };
        // Copied out so a callback that reports again does not deadlock.
        let callback = *self.callback.lock().unwrap();
        match callback {
            Some(callback) => callback(&diagnostic),
            None if kind == DiagnosticKind::Error => eprintln!("{diagnostic}"),
            None => {}
        }
    }

    pub(crate) fn error(&self, source: &'static str, message: String) {
        self.report(DiagnosticKind::Error, source, message);
    }

    pub(crate) fn warning(&self, source: &'static str, message: String) {
        self.report(DiagnosticKind::Warning, source, message);
    }
}
