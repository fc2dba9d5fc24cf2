//! Pinned cross-domain handles.
//!
//! Native code must be able to reach a specific host object without that
//! object moving or being reclaimed first. The arena maps small opaque
//! tokens to strong references; the engine only ever holds the token. A
//! token stays valid until it is explicitly released, and dereferencing a
//! released or stale token yields `None` instead of a fabricated value.
//!
//! Slots are reused with a bumped generation so a stale token can never
//! alias a newer occupant of the same slot.

use std::any::Any;
use std::sync::{Arc, Mutex};

use vesper_ffi::RawHandle;

/// Opaque token for one pinned reference. Zero is never a valid token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HandleToken(RawHandle);

impl HandleToken {
    fn pack(index: u32, generation: u32) -> Self {
        // Index is offset by one so the all-zero token stays unused.
        HandleToken((u64::from(index + 1) << 32) | u64::from(generation))
    }

    fn unpack(self) -> Option<(u32, u32)> {
        let index = (self.0 >> 32) as u32;
        if index == 0 {
            return None;
        }
        Some((index - 1, self.0 as u32))
    }

    /// The raw value handed across the boundary.
    pub fn raw(self) -> RawHandle {
        self.0
    }

    /// Reinterprets a raw value received from the engine.
    pub fn from_raw(raw: RawHandle) -> Option<Self> {
        if raw == 0 { None } else { Some(HandleToken(raw)) }
    }
}

type Pinned = Arc<dyn Any + Send + Sync>;

struct Slot {
    generation: u32,
    value: Option<Pinned>,
}

/// Arena of pinned references.
///
/// Alloc and free are serialized by the single-threaded native caller, but
/// the table is still lock-guarded: the token dereference is the one
/// synchronization point a native callback relies on.
pub struct HandleArena {
    slots: Mutex<Slots>,
}

#[derive(Default)]
struct Slots {
    entries: Vec<Slot>,
    free: Vec<u32>,
}

impl HandleArena {
    pub fn new() -> Self {
        HandleArena {
            slots: Mutex::new(Slots::default()),
        }
    }

    /// Pins a reference and returns its token.
    pub fn pin(&self, value: Pinned) -> HandleToken {
        let mut slots = self.slots.lock().unwrap();
        if let Some(index) = slots.free.pop() {
            let slot = &mut slots.entries[index as usize];
            slot.value = Some(value);
            HandleToken::pack(index, slot.generation)
        } else {
            let index = slots.entries.len() as u32;
            slots.entries.push(Slot {
                generation: 0,
                value: Some(value),
            });
            HandleToken::pack(index, 0)
        }
    }

    /// Resolves a token to the pinned value, downcast to `T`.
    ///
    /// `None` for released tokens, stale generations, and type mismatches.
    pub fn resolve<T: Any + Send + Sync>(&self, token: HandleToken) -> Option<Arc<T>> {
        let (index, generation) = token.unpack()?;
        let slots = self.slots.lock().unwrap();
        let slot = slots.entries.get(index as usize)?;
        if slot.generation != generation {
            return None;
        }
        let value = slot.value.as_ref()?.clone();
        drop(slots);
        value.downcast::<T>().ok()
    }

    /// Releases a token, returning the reference it pinned.
    ///
    /// Releasing an already-released or stale token is a no-op.
    pub fn release(&self, token: HandleToken) -> Option<Pinned> {
        let (index, generation) = token.unpack()?;
        let mut slots = self.slots.lock().unwrap();
        let slot = slots.entries.get_mut(index as usize)?;
        if slot.generation != generation || slot.value.is_none() {
            return None;
        }
        let value = slot.value.take();
        slot.generation = slot.generation.wrapping_add(1);
        slots.free.push(index);
        value
    }

    /// Number of currently pinned references.
    pub fn len(&self) -> usize {
        let slots = self.slots.lock().unwrap();
        slots.entries.len() - slots.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for HandleArena {
    fn default() -> Self {
        Self::new()
    }
}
