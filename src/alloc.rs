//! Typed object pool backing task allocation.
//!
//! Tasks are recycled rather than reallocated per submission. An acquired
//! object rides inside a [`Pooled`] handle; dropping the handle recycles
//! the object and returns it to the arena, so every failure branch reclaims
//! task memory without an explicit free call.

use std::{
    ops::{Deref, DerefMut},
    sync::{Arc, Mutex, Weak},
};

/// Implemented by pool-managed objects that can be wiped for reuse.
pub(crate) trait Recycle: Default + Send {
    /// Restore the object to its freshly-constructed state, dropping any
    /// owned payload. Backing storage may be kept to amortize allocation.
    fn recycle(&mut self);
}

/// Bounded pool of recycled `T` instances.
pub(crate) struct TaskArena<T: Recycle> {
    slots: Mutex<Vec<T>>,
    capacity: usize,
}

impl<T: Recycle> TaskArena<T> {
    /// Create an arena retaining at most `capacity` idle objects.
    pub(crate) fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            slots: Mutex::new(Vec::new()),
            capacity,
        })
    }

    /// Hand out an object, recycled if one is idle.
    pub(crate) fn acquire(self: &Arc<Self>) -> Pooled<T> {
        let value = self
            .slots
            .lock()
            .expect("task arena mutex poisoned")
            .pop()
            .unwrap_or_default();
        Pooled {
            value: Some(value),
            arena: Arc::downgrade(self),
        }
    }

    /// Number of idle objects currently retained.
    #[cfg(test)]
    pub(crate) fn idle(&self) -> usize {
        self.slots.lock().expect("task arena mutex poisoned").len()
    }

    fn release(&self, mut value: T) {
        value.recycle();
        let mut slots = self.slots.lock().expect("task arena mutex poisoned");
        if slots.len() < self.capacity {
            slots.push(value);
        }
        // Over capacity: the value simply drops.
    }
}

/// Owned handle to an arena-managed object.
///
/// Dereferences to `T`; on drop the object is recycled and returned to its
/// arena (or dropped outright if the arena is gone or full).
pub(crate) struct Pooled<T: Recycle> {
    value: Option<T>,
    arena: Weak<TaskArena<T>>,
}

impl<T: Recycle> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.value.as_ref().expect("pooled value taken")
    }
}

impl<T: Recycle> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.value.as_mut().expect("pooled value taken")
    }
}

impl<T: Recycle> Drop for Pooled<T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            if let Some(arena) = self.arena.upgrade() {
                arena.release(value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counter {
        hits: usize,
        recycles: usize,
    }

    impl Recycle for Counter {
        fn recycle(&mut self) {
            self.recycles += 1;
        }
    }

    #[test]
    fn acquire_reuses_released_objects() {
        let arena = TaskArena::<Counter>::new(4);
        {
            let mut first = arena.acquire();
            first.hits += 1;
        }
        assert_eq!(arena.idle(), 1);

        let second = arena.acquire();
        assert_eq!(arena.idle(), 0);
        // Same object, wiped by recycle before going idle.
        assert_eq!(second.recycles, 1);
    }

    #[test]
    fn capacity_bounds_idle_objects() {
        let arena = TaskArena::<Counter>::new(1);
        let a = arena.acquire();
        let b = arena.acquire();
        drop(a);
        drop(b);
        assert_eq!(arena.idle(), 1);
    }

    #[test]
    fn release_after_arena_drop_is_safe() {
        let arena = TaskArena::<Counter>::new(1);
        let held = arena.acquire();
        drop(arena);
        drop(held);
    }
}
