//! Thread-affine continuation queue.
//!
//! Everything that touches native state must run on the engine's single
//! logical thread. Worker threads hand continuations to the [`Dispatcher`];
//! the engine pumps them once per tick with [`Dispatcher::drain`].
//!
//! `drain` runs only the items queued before it started. Items enqueued
//! while a drain is running, including by the continuations themselves,
//! wait for the next drain; a tick never runs a continuation scheduled
//! during that same tick.

use std::collections::VecDeque;
use std::sync::mpsc;
use std::sync::Mutex;
use std::thread::{self, ThreadId};

type Continuation = Box<dyn FnOnce() + Send>;

pub struct Dispatcher {
    owner: ThreadId,
    queue: Mutex<VecDeque<Continuation>>,
}

impl Dispatcher {
    /// Binds the queue to the calling thread.
    pub fn new() -> Self {
        Dispatcher {
            owner: thread::current().id(),
            queue: Mutex::new(VecDeque::new()),
        }
    }

    /// Whether the caller is on the owning thread.
    pub fn is_owner(&self) -> bool {
        thread::current().id() == self.owner
    }

    /// Enqueues a continuation without blocking.
    pub fn post<F>(&self, continuation: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.queue
            .lock()
            .unwrap()
            .push_back(Box::new(continuation));
    }

    /// Runs `continuation` on the owning thread and waits for it.
    ///
    /// On the owning thread itself the continuation runs inline; a native
    /// callback that schedules follow-up work is already in the right
    /// place and must not deadlock waiting on its own pump. From any other
    /// thread the call blocks, without timeout, until a `drain` has run the
    /// continuation. There is no cancellation of an in-flight `send`.
    pub fn send<F>(&self, continuation: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_owner() {
            continuation();
            return;
        }

        let (done_tx, done_rx) = mpsc::channel();
        self.post(move || {
            continuation();
            // The sender may have given up only by panicking; nothing to
            // do if the receiver is gone.
            let _ = done_tx.send(());
        });
        done_rx
            .recv()
            .expect("dispatcher dropped a pending continuation");
    }

    /// Runs every continuation queued before this call, in FIFO order.
    ///
    /// Must be called on the owning thread, once per engine tick.
    pub fn drain(&self) {
        debug_assert!(self.is_owner(), "drain called off the owning thread");

        // Snapshot first: continuations enqueued during this pass belong
        // to the next tick.
        let batch: Vec<Continuation> = {
            let mut queue = self.queue.lock().unwrap();
            queue.drain(..).collect()
        };
        for continuation in batch {
            continuation();
        }
    }

    /// Number of continuations waiting for the next drain.
    pub fn pending(&self) -> usize {
        self.queue.lock().unwrap().len()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
