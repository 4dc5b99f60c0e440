use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::{Level, LevelState};

/// The single cursor that tracks how far along the init/teardown timeline we are.
///
/// The cursor counts how many levels, starting from the lowest, are currently available. Crossing
/// an init boundary raises it by one, crossing a teardown boundary lowers it to the index of the
/// level being torn down. Once teardown has started the cursor never rises again.
///
/// Reads are lock-free. Transitions are only made by the owner of the timeline; teardown
/// transitions are additionally made under the registry lock so that no registration can slip
/// in at a level that is being torn down.
#[derive(Debug)]
pub(crate) struct PhaseCursor {
    available: AtomicUsize,
    tearing_down: AtomicBool,
}

impl PhaseCursor {
    pub(crate) const fn new() -> Self {
        Self {
            available: AtomicUsize::new(0),
            tearing_down: AtomicBool::new(false),
        }
    }

    pub(crate) fn state_check(&self, level: Level) -> LevelState {
        if level.index() < self.available.load(Ordering::Acquire) {
            LevelState::Available
        } else {
            LevelState::NotAvailable
        }
    }

    /// Makes `level` available. Levels must be initialized in ascending order, one at a time.
    ///
    /// # Panics
    ///
    /// Panics if levels are initialized out of order or after teardown has started.
    pub(crate) fn cross_init_boundary(&self, level: Level) {
        assert!(
            !self.tearing_down.load(Ordering::Acquire),
            "cannot initialize level {level} after teardown has started"
        );

        let previous = self.available.swap(
            level
                .index()
                .checked_add(1)
                .expect("level index is far below usize::MAX"),
            Ordering::AcqRel,
        );

        assert_eq!(
            previous,
            level.index(),
            "levels must be initialized in ascending order, one at a time"
        );
    }

    /// Makes `level` and everything above it unavailable, permanently.
    pub(crate) fn cross_teardown_boundary(&self, level: Level) {
        self.tearing_down.store(true, Ordering::Release);
        self.available.fetch_min(level.index(), Ordering::AcqRel);
    }

    pub(crate) fn is_tearing_down(&self) -> bool {
        self.tearing_down.load(Ordering::Acquire)
    }
}
