use std::collections::BTreeMap;
use std::fmt;
use std::mem;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::trace;

use crate::constants::ERR_POISONED_LOCK;
use crate::error::Result;
use crate::sequencer::PhaseCursor;
use crate::{Error, Level};

/// A zero-argument action that runs when the level it is registered at is torn down.
pub(crate) type CleanupAction = Box<dyn FnOnce() + Send>;

// Every registry gets a unique ID so that handles can be matched to the registry that issued them.
static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(0);

/// Identifies one cleanup entry registered with a [`Lifecycle`][crate::Lifecycle].
///
/// Returned by [`Lifecycle::register()`][crate::Lifecycle::register] and consumed by
/// [`Lifecycle::unregister()`][crate::Lifecycle::unregister].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct CleanupHandle {
    registry_id: u64,
    entry_id: u64,
    level: Level,
}

impl CleanupHandle {
    /// The level the entry was registered at.
    #[must_use]
    pub fn level(&self) -> Level {
        self.level
    }
}

/// Table of cleanup entries, keyed by the level they must run at.
///
/// Entry IDs are assigned in increasing order, so iterating the entries of one level in key order
/// yields them in registration order.
pub(crate) struct InstanceRegistry {
    id: u64,
    state: Mutex<RegistryState>,
}

struct RegistryState {
    next_entry_id: u64,
    levels: [BTreeMap<u64, CleanupAction>; Level::COUNT],
}

impl RegistryState {
    fn entries_mut(&mut self, level: Level) -> &mut BTreeMap<u64, CleanupAction> {
        self.levels
            .get_mut(level.index())
            .expect("every level has an entry table")
    }
}

impl InstanceRegistry {
    pub(crate) fn new() -> Self {
        Self {
            id: NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed),
            state: Mutex::new(RegistryState {
                next_entry_id: 0,
                levels: std::array::from_fn(|_| BTreeMap::new()),
            }),
        }
    }

    /// Adds a cleanup entry at `level`.
    ///
    /// Fails if `level` is not available. The availability check and the insertion happen under
    /// the same lock that guards teardown transitions, so an entry can never be added to a level
    /// whose teardown pass has already collected its entries.
    pub(crate) fn register(
        &self,
        cursor: &PhaseCursor,
        level: Level,
        action: CleanupAction,
    ) -> Result<CleanupHandle> {
        let mut state = self.state.lock().expect(ERR_POISONED_LOCK);

        if !cursor.state_check(level).is_available() {
            return Err(Error::RegistryUnavailable { level });
        }

        let entry_id = state.next_entry_id;
        state.next_entry_id = entry_id
            .checked_add(1)
            .expect("cleanup entry IDs cannot realistically be exhausted");
        state.entries_mut(level).insert(entry_id, action);

        trace!(registry_id = self.id, entry_id, %level, "registered cleanup entry");

        Ok(CleanupHandle {
            registry_id: self.id,
            entry_id,
            level,
        })
    }

    /// Removes a cleanup entry without running it. Does nothing if the entry has already been
    /// removed or has already run.
    ///
    /// The removed action is dropped after the lock is released, so anything it owns may itself
    /// use the registry while being dropped.
    ///
    /// # Panics
    ///
    /// Panics if the handle was not issued by this registry or if `level` is not the level the
    /// entry was registered at. Either means the caller has lost track of its own entries.
    pub(crate) fn unregister(&self, handle: CleanupHandle, level: Level) {
        assert_eq!(
            handle.registry_id, self.id,
            "cleanup handle {handle:?} was not issued by this lifecycle"
        );
        assert_eq!(
            handle.level, level,
            "cleanup handle {handle:?} is being unregistered at the wrong level"
        );

        let removed = {
            let mut state = self.state.lock().expect(ERR_POISONED_LOCK);

            assert!(
                handle.entry_id < state.next_entry_id,
                "cleanup handle {handle:?} is unknown to this lifecycle"
            );

            state.entries_mut(level).remove(&handle.entry_id)
        };

        trace!(
            registry_id = self.id,
            entry_id = handle.entry_id,
            %level,
            was_present = removed.is_some(),
            "unregistered cleanup entry"
        );

        drop(removed);
    }

    /// Moves the cursor past `level` and removes every entry registered at it, returning the
    /// actions in the order they must run (last registered first).
    pub(crate) fn take_level_for_teardown(
        &self,
        cursor: &PhaseCursor,
        level: Level,
    ) -> Vec<CleanupAction> {
        let entries = {
            let mut state = self.state.lock().expect(ERR_POISONED_LOCK);
            cursor.cross_teardown_boundary(level);
            mem::take(state.entries_mut(level))
        };

        entries.into_values().rev().collect()
    }

    /// Whether `handle` was issued by this registry.
    pub(crate) fn issued(&self, handle: CleanupHandle) -> bool {
        handle.registry_id == self.id
    }

    /// The number of entries that have not yet run or been removed.
    pub(crate) fn len(&self) -> usize {
        let state = self.state.lock().expect(ERR_POISONED_LOCK);
        state.levels.iter().map(BTreeMap::len).sum()
    }

    /// The number of pending entries at `level`.
    pub(crate) fn len_at(&self, level: Level) -> usize {
        let mut state = self.state.lock().expect(ERR_POISONED_LOCK);
        state.entries_mut(level).len()
    }
}

impl fmt::Debug for InstanceRegistry {
    #[cfg_attr(test, mutants::skip)] // Diagnostic output only.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceRegistry")
            .field("id", &self.id)
            .field("len", &self.len())
            .finish()
    }
}
