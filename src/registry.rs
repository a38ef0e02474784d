//! Kernel object table.
//!
//! A capped debug registry of mutexes, flag groups and timers so they can be
//! named and listed. It is allocated by [`Kernel::init`](crate::Kernel::init)
//! and released by `shutdown`. Running out of slots is never fatal: the
//! object still works, it is just missing from listings, and the overflow
//! counter records how many were left out.

use portable_atomic::{AtomicU32, Ordering};
use spin::Mutex;

use crate::errors::ObjectKind;
use crate::mem::Handle;

extern crate alloc;
use alloc::vec::Vec;

/// One recorded object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    pub kind: ObjectKind,
    pub handle: Handle,
    pub name: Option<&'static str>,
}

/// Capped table of live kernel objects.
pub struct ObjectTable {
    capacity: usize,
    /// `None` until `init`
    entries: Mutex<Option<Vec<Option<Entry>>>>,
    overflow: AtomicU32,
}

impl ObjectTable {
    pub const fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(None),
            overflow: AtomicU32::new(0),
        }
    }

    /// Allocate the slots.
    pub fn init(&self) {
        let mut slots = Vec::with_capacity(self.capacity);
        slots.resize(self.capacity, None);
        *self.entries.lock() = Some(slots);
        self.overflow.store(0, Ordering::Release);
    }

    /// Drop every entry and the slots themselves.
    pub fn shutdown(&self) {
        *self.entries.lock() = None;
        self.overflow.store(0, Ordering::Release);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Record a new object. Returns false if the table is full or not
    /// allocated.
    pub fn register(&self, kind: ObjectKind, handle: Handle) -> bool {
        let mut guard = self.entries.lock();
        let free = guard
            .as_mut()
            .and_then(|slots| slots.iter_mut().find(|slot| slot.is_none()));
        match free {
            Some(slot) => {
                *slot = Some(Entry {
                    kind,
                    handle,
                    name: None,
                });
                true
            }
            None => {
                let total = self.overflow.fetch_add(1, Ordering::AcqRel) + 1;
                log::warn!(
                    "object table full, {:?} {} not recorded ({} missing)",
                    kind,
                    handle,
                    total
                );
                false
            }
        }
    }

    /// Forget an object. Unknown objects are ignored.
    pub fn unregister(&self, kind: ObjectKind, handle: Handle) {
        self.with_entry(kind, handle, |slot| *slot = None);
    }

    /// Name a recorded object. Unknown objects are ignored.
    pub fn set_name(&self, kind: ObjectKind, handle: Handle, name: &'static str) {
        self.with_entry(kind, handle, |slot| {
            if let Some(entry) = slot {
                entry.name = Some(name);
            }
        });
    }

    pub fn name(&self, kind: ObjectKind, handle: Handle) -> Option<&'static str> {
        let guard = self.entries.lock();
        guard
            .as_ref()?
            .iter()
            .flatten()
            .find(|e| e.kind == kind && e.handle == handle)
            .and_then(|e| e.name)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .as_ref()
            .map_or(0, |slots| slots.iter().flatten().count())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call `f` on every entry of `kind`, in slot order.
    ///
    /// Entries are copied out first so `f` may take the kernel lock.
    /// Returns a note to print after the listing if objects were left out.
    pub fn traverse(&self, kind: ObjectKind, mut f: impl FnMut(&Entry)) -> Option<&'static str> {
        let snapshot: Vec<Entry> = match self.entries.lock().as_ref() {
            Some(slots) => slots.iter().flatten().filter(|e| e.kind == kind).copied().collect(),
            None => return Some("object table not allocated"),
        };
        for entry in &snapshot {
            f(entry);
        }
        if self.overflows() > 0 {
            Some("object table overflowed, listing incomplete")
        } else {
            None
        }
    }

    /// Objects that could not be recorded since `init`.
    pub fn overflows(&self) -> u32 {
        self.overflow.load(Ordering::Acquire)
    }

    fn with_entry(&self, kind: ObjectKind, handle: Handle, f: impl FnOnce(&mut Option<Entry>)) {
        let mut guard = self.entries.lock();
        let slot = guard.as_mut().and_then(|slots| {
            slots.iter_mut().find(|slot| {
                slot.as_ref()
                    .is_some_and(|e| e.kind == kind && e.handle == handle)
            })
        });
        if let Some(slot) = slot {
            f(slot);
        }
    }
}
