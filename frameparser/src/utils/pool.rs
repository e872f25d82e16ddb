use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard};

use log::trace;

use crate::utils::errors::PoolError;

#[derive(Debug)]
struct SlotTable {
    in_use: Vec<bool>,
}

fn lock(table: &Mutex<SlotTable>) -> MutexGuard<'_, SlotTable> {
    table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A fixed-capacity arena of parameter records.
///
/// Records are recycled once every buffer attached to them has released its
/// claim. Claims are [`Shared`] handles: cloning one attaches another buffer,
/// dropping it releases that buffer's claim, and the slot returns to the pool
/// with the last claim.
pub struct ParameterPool<T> {
    slots: Arc<Mutex<SlotTable>>,
    kind: &'static str,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T> fmt::Debug for ParameterPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterPool")
            .field("kind", &self.kind)
            .field("capacity", &self.capacity())
            .field("in_use", &self.in_use())
            .finish()
    }
}

impl<T> ParameterPool<T> {
    /// Creates a pool with `capacity` slots; `kind` names the records in diagnostics.
    pub fn new(kind: &'static str, capacity: usize) -> Self {
        Self {
            slots: Arc::new(Mutex::new(SlotTable {
                in_use: vec![false; capacity],
            })),
            kind,
            _marker: std::marker::PhantomData,
        }
    }

    pub fn capacity(&self) -> usize {
        lock(&self.slots).in_use.len()
    }

    pub fn in_use(&self) -> usize {
        lock(&self.slots).in_use.iter().filter(|&&used| used).count()
    }

    /// Reserves the next free slot and starts a new record in it.
    ///
    /// The lease is exclusive until [`SlotLease::into_shared`]; dropping it
    /// earlier returns the slot without the record ever becoming visible.
    pub fn acquire(&self, value: T) -> Result<SlotLease<T>, PoolError> {
        let mut table = lock(&self.slots);

        let Some(index) = table.in_use.iter().position(|&used| !used) else {
            return Err(PoolError::Exhausted {
                kind: self.kind,
                capacity: table.in_use.len(),
            });
        };

        table.in_use[index] = true;
        trace!("{} slot {index} acquired", self.kind);

        Ok(SlotLease {
            value,
            slot: SlotGuard {
                index,
                kind: self.kind,
                slots: Arc::clone(&self.slots),
            },
        })
    }
}

#[derive(Debug)]
struct SlotGuard {
    index: usize,
    kind: &'static str,
    slots: Arc<Mutex<SlotTable>>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        lock(&self.slots).in_use[self.index] = false;
        trace!("{} slot {} returned to pool", self.kind, self.index);
    }
}

/// A record being filled in, not yet attached to any buffer.
#[derive(Debug)]
pub struct SlotLease<T> {
    value: T,
    slot: SlotGuard,
}

impl<T> SlotLease<T> {
    pub fn slot_index(&self) -> usize {
        self.slot.index
    }

    /// Freezes the record and hands out the first claim on it.
    pub fn into_shared(self) -> Shared<T> {
        Shared(Arc::new(Entry {
            value: self.value,
            slot: self.slot,
        }))
    }
}

impl<T> Deref for SlotLease<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for SlotLease<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

#[derive(Debug)]
struct Entry<T> {
    value: T,
    slot: SlotGuard,
}

/// A claim on a frozen record.
#[derive(Debug)]
pub struct Shared<T>(Arc<Entry<T>>);

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> Shared<T> {
    /// Adds a claim for another buffer.
    pub fn attach(&self) -> Self {
        self.clone()
    }

    /// Gives up this claim. A claim can be released only once.
    pub fn release(self) {}

    pub fn reference_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    pub fn slot_index(&self) -> usize {
        self.0.slot.index
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<T> Deref for Shared<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_returns_after_last_release() {
        let pool = ParameterPool::new("test", 2);

        let shared = pool.acquire(7u32).unwrap().into_shared();
        let attached = shared.attach();
        assert_eq!(shared.reference_count(), 2);
        assert_eq!(pool.in_use(), 1);

        shared.release();
        assert_eq!(attached.reference_count(), 1);
        assert_eq!(pool.in_use(), 1);
        assert_eq!(*attached, 7);

        attached.release();
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn exhaustion_is_reported() {
        let pool = ParameterPool::new("frame parameters", 1);
        let _held = pool.acquire(()).unwrap();

        let err = pool.acquire(()).unwrap_err();
        assert_eq!(
            err,
            PoolError::Exhausted {
                kind: "frame parameters",
                capacity: 1
            }
        );
    }

    #[test]
    fn abandoned_lease_frees_slot() {
        let pool = ParameterPool::new("test", 1);
        {
            let mut lease = pool.acquire(Vec::<u8>::new()).unwrap();
            lease.push(1);
            assert_eq!(pool.in_use(), 1);
        }
        assert_eq!(pool.in_use(), 0);
        assert!(pool.acquire(Vec::new()).is_ok());
    }

    #[test]
    fn slots_are_reused() {
        let pool = ParameterPool::new("test", 2);
        let a = pool.acquire(1).unwrap().into_shared();
        let b = pool.acquire(2).unwrap().into_shared();
        assert_ne!(a.slot_index(), b.slot_index());

        let freed = a.slot_index();
        a.release();
        let c = pool.acquire(3).unwrap();
        assert_eq!(c.slot_index(), freed);
    }
}
