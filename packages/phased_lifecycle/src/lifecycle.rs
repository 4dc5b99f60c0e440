use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use crate::error::Result;
use crate::registry::InstanceRegistry;
use crate::sequencer::PhaseCursor;
use crate::{
    AutoreleasePool, CleanupHandle, Level, LevelState, LifecycleBuilder, Managed, ManagedObject,
};

/// The level at which the autorelease pool owned by a [`Lifecycle`] is drained during teardown.
pub const POOL_DRAIN_LEVEL: Level = Level::FrameworkNormal;

/// Owner of the global init/teardown timeline, the cleanup registry and the autorelease pool.
///
/// A program creates one `Lifecycle` near its entry point and passes it by reference to whatever
/// needs to create or register global state. Building the lifecycle initializes every [`Level`]
/// from the lowest to the highest. [`teardown()`][Self::teardown] (or dropping the lifecycle)
/// tears the levels down again from the highest to the lowest, running every cleanup entry
/// registered at a level in reverse registration order.
///
/// Once a level has begun teardown, [`state_check()`][Self::state_check] reports it as
/// [`LevelState::NotAvailable`] and any attempt to register new state at it fails. Code that
/// runs during shutdown is expected to treat this as "skip", not as an error to propagate.
///
/// # Thread safety
///
/// This type is thread-safe. Registration, unregistration and teardown transitions are
/// serialized by one lock; availability checks are lock-free. Teardown itself is expected to be
/// driven by the thread that owns the lifecycle.
///
/// # Example
///
/// ```rust
/// use std::sync::{Arc, Mutex};
///
/// use phased_lifecycle::{Level, Lifecycle};
///
/// let lifecycle = Lifecycle::new();
/// let log = Arc::new(Mutex::new(Vec::new()));
///
/// for (level, name) in [
///     (Level::AppNormal, "n1"),
///     (Level::AppHigh, "h1"),
///     (Level::AppHigh, "h2"),
/// ] {
///     let log = Arc::clone(&log);
///     lifecycle
///         .register(level, move || log.lock().unwrap().push(name))
///         .unwrap();
/// }
///
/// lifecycle.teardown();
///
/// assert_eq!(*log.lock().unwrap(), vec!["h2", "h1", "n1"]);
/// ```
pub struct Lifecycle {
    cursor: PhaseCursor,
    registry: InstanceRegistry,
    pool: Managed<AutoreleasePool>,
    torn_down: AtomicBool,
}

impl Lifecycle {
    /// Creates a lifecycle with default configuration and initializes every level.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Returns a builder for creating a [`Lifecycle`] with custom configuration.
    pub fn builder() -> LifecycleBuilder {
        LifecycleBuilder::new()
    }

    /// Creates a lifecycle with no level initialized yet.
    pub(crate) fn uninitialized(pool: AutoreleasePool) -> Self {
        Self {
            cursor: PhaseCursor::new(),
            registry: InstanceRegistry::new(),
            pool: Managed::new(pool),
            torn_down: AtomicBool::new(false),
        }
    }

    /// Crosses the init boundary of `level`, making it available.
    pub(crate) fn initialize_level(&self, level: Level) {
        self.cursor.cross_init_boundary(level);
        debug!(%level, "level initialized");

        if level == POOL_DRAIN_LEVEL {
            let pool = self.pool.retain();

            self.register(level, move || pool.drain())
                .expect("we just initialized the level, it must be available");
        }
    }

    /// Whether state at `level` may currently be created or registered.
    #[must_use]
    pub fn state_check(&self, level: Level) -> LevelState {
        self.cursor.state_check(level)
    }

    /// Registers `action` to run when `level` is torn down.
    ///
    /// Actions registered at the same level run in reverse registration order. Every action runs
    /// at most once, and not at all if it is [unregistered][Self::unregister] first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RegistryUnavailable`][crate::Error::RegistryUnavailable] if `level` has
    /// already begun teardown.
    pub fn register<F>(&self, level: Level, action: F) -> Result<CleanupHandle>
    where
        F: FnOnce() + Send + 'static,
    {
        self.registry
            .register(&self.cursor, level, Box::new(action))
    }

    /// Keeps `value` alive until `level` is torn down, then drops it.
    ///
    /// Unregistering the returned handle drops the value early.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RegistryUnavailable`][crate::Error::RegistryUnavailable] if `level` has
    /// already begun teardown. The value is dropped in that case.
    pub fn register_instance<V>(&self, level: Level, value: V) -> Result<CleanupHandle>
    where
        V: Send + 'static,
    {
        self.register(level, move || drop(value))
    }

    /// Removes a cleanup entry without running it.
    ///
    /// Does nothing if the entry has already been removed or has already run.
    ///
    /// # Panics
    ///
    /// Panics if `handle` was not issued by this lifecycle or was registered at a level other
    /// than `level`.
    pub fn unregister(&self, handle: CleanupHandle, level: Level) {
        self.registry.unregister(handle, level);
    }

    /// Whether `handle` was issued by this lifecycle.
    #[must_use]
    pub fn issued(&self, handle: CleanupHandle) -> bool {
        self.registry.issued(handle)
    }

    /// The number of cleanup entries that have neither run nor been unregistered.
    #[must_use]
    pub fn pending_cleanups(&self) -> usize {
        self.registry.len()
    }

    /// The number of pending cleanup entries at `level`.
    #[must_use]
    pub fn pending_cleanups_at(&self, level: Level) -> usize {
        self.registry.len_at(level)
    }

    /// The autorelease pool owned by this lifecycle.
    ///
    /// The pool is drained during teardown of [`POOL_DRAIN_LEVEL`] and once more after the last
    /// level has been torn down.
    #[must_use]
    pub fn pool(&self) -> &Managed<AutoreleasePool> {
        &self.pool
    }

    /// Hands one reference to `obj` to the lifecycle's autorelease pool.
    pub fn autorelease<T>(&self, obj: Managed<T>)
    where
        T: ManagedObject,
    {
        obj.autorelease(&self.pool);
    }

    /// Drains the lifecycle's autorelease pool.
    pub fn drain(&self) {
        self.pool.drain();
    }

    /// Tears down every level, from the highest to the lowest.
    ///
    /// Only the first call has any effect. Dropping the lifecycle calls this automatically.
    pub fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return;
        }

        debug!("lifecycle teardown started");

        for level in Level::ALL.into_iter().rev() {
            let actions = self.registry.take_level_for_teardown(&self.cursor, level);

            debug!(%level, entries = actions.len(), "tearing down level");

            for action in actions {
                action();
            }
        }

        // Catches anything autoreleased by cleanup actions below the pool's own drain level.
        self.pool.drain();

        debug!("lifecycle teardown finished");
    }

    /// Whether [`teardown()`][Self::teardown] has been started.
    #[must_use]
    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire) || self.cursor.is_tearing_down()
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Lifecycle {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl fmt::Debug for Lifecycle {
    #[cfg_attr(test, mutants::skip)] // Diagnostic output only.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("registry", &self.registry)
            .field("pool", &*self.pool)
            .field("torn_down", &self.is_torn_down())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::{Arc, Mutex};

    use static_assertions::assert_impl_all;

    use super::*;
    use crate::Error;

    assert_impl_all!(Lifecycle: Send, Sync);

    type Log = Arc<Mutex<Vec<String>>>;

    struct Noted {
        name: &'static str,
        log: Log,
    }

    impl ManagedObject for Noted {
        fn on_dealloc(&mut self) {
            self.log.lock().unwrap().push(format!("released {}", self.name));
        }
    }

    fn note(log: &Log, entry: &str) {
        log.lock().unwrap().push(entry.to_string());
    }

    #[test]
    fn every_level_available_after_new() {
        let lifecycle = Lifecycle::new();

        for level in Level::ALL {
            assert_eq!(lifecycle.state_check(level), LevelState::Available);
        }

        assert!(!lifecycle.is_torn_down());
    }

    #[test]
    fn pool_drain_is_registered_at_framework_normal() {
        let lifecycle = Lifecycle::new();

        assert_eq!(lifecycle.pending_cleanups_at(POOL_DRAIN_LEVEL), 1);
        assert_eq!(lifecycle.pending_cleanups(), 1);
    }

    #[test]
    fn teardown_order_across_levels() {
        let lifecycle = Lifecycle::new();
        let log = Log::default();

        for (level, name) in [
            (Level::FrameworkNormal, "n1"),
            (Level::FrameworkHigh, "h1"),
            (Level::FrameworkHigh, "h2"),
        ] {
            let log = Arc::clone(&log);
            lifecycle
                .register(level, move || note(&log, name))
                .unwrap();
        }

        lifecycle.teardown();

        assert_eq!(*log.lock().unwrap(), vec!["h2", "h1", "n1"]);
    }

    #[test]
    fn teardown_runs_once() {
        let lifecycle = Lifecycle::new();
        let log = Log::default();

        lifecycle
            .register(Level::AppLow, {
                let log = Arc::clone(&log);
                move || note(&log, "cleanup")
            })
            .unwrap();

        lifecycle.teardown();
        lifecycle.teardown();
        drop(lifecycle);

        assert_eq!(*log.lock().unwrap(), vec!["cleanup"]);
    }

    #[test]
    fn drop_tears_down() {
        let log = Log::default();

        {
            let lifecycle = Lifecycle::new();
            lifecycle
                .register(Level::AppHigh, {
                    let log = Arc::clone(&log);
                    move || note(&log, "dropped")
                })
                .unwrap();
        }

        assert_eq!(*log.lock().unwrap(), vec!["dropped"]);
    }

    #[test]
    fn handles_belong_to_their_lifecycle() {
        let first = Lifecycle::new();
        let second = Lifecycle::new();

        let handle = first.register(Level::AppNormal, || {}).unwrap();

        assert!(first.issued(handle));
        assert!(!second.issued(handle));
    }

    #[test]
    fn register_after_teardown_fails() {
        let lifecycle = Lifecycle::new();
        lifecycle.teardown();

        for level in Level::ALL {
            assert_eq!(lifecycle.state_check(level), LevelState::NotAvailable);
            assert!(matches!(
                lifecycle.register(level, || {}),
                Err(Error::RegistryUnavailable { .. })
            ));
        }
    }

    #[test]
    fn pool_drained_at_its_level() {
        let lifecycle = Lifecycle::new();
        let log = Log::default();

        lifecycle.autorelease(Managed::new(Noted {
            name: "pooled",
            log: Arc::clone(&log),
        }));

        for (level, name) in [(Level::FrameworkHigh, "above"), (Level::FrameworkLow, "below")] {
            let log = Arc::clone(&log);
            lifecycle
                .register(level, move || note(&log, name))
                .unwrap();
        }

        lifecycle.teardown();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["above", "released pooled", "below"]
        );
    }

    #[test]
    fn objects_autoreleased_by_late_cleanups_are_still_released() {
        let lifecycle = Arc::new(Lifecycle::new());
        let log = Log::default();

        let late = Managed::new(Noted {
            name: "late",
            log: Arc::clone(&log),
        });
        let pool = lifecycle.pool().retain();

        lifecycle
            .register(Level::FrameworkEssential, move || late.autorelease(&pool))
            .unwrap();

        lifecycle.teardown();

        assert_eq!(*log.lock().unwrap(), vec!["released late"]);
    }

    #[test]
    fn register_instance_drops_value_at_teardown() {
        let lifecycle = Lifecycle::new();
        let log = Log::default();

        let value = Managed::new(Noted {
            name: "instance",
            log: Arc::clone(&log),
        });
        lifecycle
            .register_instance(Level::AppNormal, value)
            .unwrap();

        assert!(log.lock().unwrap().is_empty());
        lifecycle.teardown();
        assert_eq!(*log.lock().unwrap(), vec!["released instance"]);
    }

    #[test]
    fn unregister_instance_drops_value_early() {
        let lifecycle = Lifecycle::new();
        let log = Log::default();

        let handle = lifecycle
            .register_instance(
                Level::AppNormal,
                Managed::new(Noted {
                    name: "early",
                    log: Arc::clone(&log),
                }),
            )
            .unwrap();

        lifecycle.unregister(handle, Level::AppNormal);

        assert_eq!(*log.lock().unwrap(), vec!["released early"]);
    }

    #[test]
    fn cleanup_sees_higher_levels_as_unavailable() {
        let lifecycle = Arc::new(Lifecycle::new());
        let observed = Arc::new(Mutex::new(None));

        lifecycle
            .register(Level::AppLow, {
                let lifecycle = Arc::downgrade(&lifecycle);
                let observed = Arc::clone(&observed);
                move || {
                    let lifecycle = lifecycle.upgrade().unwrap();
                    *observed.lock().unwrap() = Some((
                        lifecycle.state_check(Level::AppNormal),
                        lifecycle.state_check(Level::AppLow),
                        lifecycle.state_check(Level::AppEssential),
                    ));
                }
            })
            .unwrap();

        lifecycle.teardown();

        assert_eq!(
            *observed.lock().unwrap(),
            Some((
                LevelState::NotAvailable,
                LevelState::NotAvailable,
                LevelState::Available
            ))
        );
    }
}
