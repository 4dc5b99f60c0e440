use std::collections::VecDeque;
use std::sync::Mutex;
use std::{fmt, mem, ptr};

use tracing::{debug, trace, warn};

use crate::constants::ERR_POISONED_LOCK;
use crate::{AutoreleasePoolBuilder, ErasedManaged, ManagedObject};

/// A bounded FIFO of managed objects waiting for a deferred release.
///
/// Adding an object to the pool transfers one reference to the pool. The reference is released
/// on the next [`drain()`][Self::drain], in the order the objects were added. If the pool is full
/// when a new object arrives, the oldest pending object is released immediately to make room.
///
/// Draining is reentrancy-safe: the pending objects are moved out of the pool before any of them
/// is released, so objects added while a drain is in progress (for example by the destruction
/// hooks of the objects being released) are kept for the next drain.
///
/// The pool is itself a [`ManagedObject`] and drains whatever it still holds when its last
/// reference goes away.
///
/// # Thread safety
///
/// This type is thread-safe. Internal bookkeeping happens under a lock that is never held while
/// an object is being released.
///
/// # Example
///
/// ```rust
/// use phased_lifecycle::{AutoreleasePool, Managed, ManagedObject};
///
/// struct Message;
/// impl ManagedObject for Message {}
///
/// let pool = AutoreleasePool::new();
///
/// pool.add(Managed::new(Message).into_erased());
/// pool.add(Managed::new(Message).into_erased());
/// assert_eq!(pool.len(), 2);
///
/// pool.drain();
/// assert!(pool.is_empty());
/// ```
pub struct AutoreleasePool {
    capacity: usize,
    pending: Mutex<VecDeque<ErasedManaged>>,
}

impl AutoreleasePool {
    /// Creates a pool with no practical limit on the number of pending objects.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Creates a pool that holds at most `capacity` pending objects.
    ///
    /// Shorthand for `AutoreleasePool::builder().capacity(capacity).build()`.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self::builder().capacity(capacity).build()
    }

    /// Returns a builder for creating an [`AutoreleasePool`] with custom configuration.
    pub fn builder() -> AutoreleasePoolBuilder {
        AutoreleasePoolBuilder::new()
    }

    pub(crate) fn new_inner(capacity: usize) -> Self {
        Self {
            capacity,
            pending: Mutex::new(VecDeque::new()),
        }
    }

    /// Takes over one reference to `obj`, to be released on the next drain.
    ///
    /// If the pool is already at capacity, the oldest pending object is released right away and a
    /// warning is logged. The new object is always accepted.
    ///
    /// # Panics
    ///
    /// Adding a pool to itself is a protocol violation. In debug builds this panics; in release
    /// builds the call is logged as an error and otherwise ignored.
    pub fn add(&self, obj: ErasedManaged) {
        if ptr::addr_eq(obj.as_ptr(), ptr::from_ref(self)) {
            #[cfg(debug_assertions)]
            panic!("adding an autorelease pool to itself is not allowed");

            #[cfg(not(debug_assertions))]
            {
                tracing::error!("ignoring attempt to add an autorelease pool to itself");
                return;
            }
        }

        let (evicted, len) = {
            let mut pending = self.pending.lock().expect(ERR_POISONED_LOCK);

            let evicted = if pending.len() >= self.capacity {
                pending.pop_front()
            } else {
                None
            };

            pending.push_back(obj);
            (evicted, pending.len())
        };

        trace!(len, "object added to autorelease pool");

        if let Some(evicted) = evicted {
            warn!(
                capacity = self.capacity,
                "autorelease pool is full, releasing the oldest pending object early"
            );
            evicted.release();
        }
    }

    /// Releases every pending object, oldest first.
    ///
    /// Objects added to the pool while this runs are not released by this call; they wait for
    /// the next drain.
    pub fn drain(&self) {
        let snapshot = mem::take(&mut *self.pending.lock().expect(ERR_POISONED_LOCK));

        if snapshot.is_empty() {
            return;
        }

        debug!(count = snapshot.len(), "draining autorelease pool");

        for obj in snapshot {
            obj.release();
        }
    }

    /// The number of objects waiting to be released.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.lock().expect(ERR_POISONED_LOCK).len()
    }

    /// Whether no objects are waiting to be released.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.lock().expect(ERR_POISONED_LOCK).is_empty()
    }

    /// The number of objects the pool holds before it starts releasing the oldest ones early.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for AutoreleasePool {
    fn default() -> Self {
        Self::new()
    }
}

impl ManagedObject for AutoreleasePool {
    fn on_dealloc_prepare(&self) {
        self.drain();
    }
}

impl fmt::Debug for AutoreleasePool {
    #[cfg_attr(test, mutants::skip)] // Diagnostic output only.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutoreleasePool")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}
