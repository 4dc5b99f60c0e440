use std::fmt;

use crate::{AutoreleasePool, Level, Lifecycle};

type InitHook = Box<dyn FnOnce(&Lifecycle) + Send>;

/// Builder for creating an instance of [`Lifecycle`].
///
/// # Examples
///
/// ```
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use std::sync::Arc;
///
/// use phased_lifecycle::{Level, LevelState, Lifecycle};
///
/// let ran = Arc::new(AtomicBool::new(false));
///
/// let lifecycle = Lifecycle::builder()
///     .pool_capacity(1024)
///     .on_init(Level::FrameworkHigh, {
///         let ran = Arc::clone(&ran);
///         move |lifecycle| {
///             // The hook's own level is already available, higher ones are not yet.
///             assert_eq!(lifecycle.state_check(Level::FrameworkHigh), LevelState::Available);
///             assert_eq!(lifecycle.state_check(Level::AppEssential), LevelState::NotAvailable);
///             ran.store(true, Ordering::Relaxed);
///         }
///     })
///     .build();
///
/// assert!(ran.load(Ordering::Relaxed));
/// assert_eq!(lifecycle.pool().capacity(), 1024);
/// ```
#[must_use]
pub struct LifecycleBuilder {
    pool_capacity: usize,
    init_hooks: Vec<(Level, InitHook)>,
}

impl LifecycleBuilder {
    pub(crate) fn new() -> Self {
        Self {
            pool_capacity: usize::MAX,
            init_hooks: Vec::new(),
        }
    }

    /// Sets the capacity of the lifecycle's autorelease pool.
    ///
    /// By default the pool has no practical limit.
    pub fn pool_capacity(mut self, capacity: usize) -> Self {
        self.pool_capacity = capacity;
        self
    }

    /// Adds a hook that runs right after `level` becomes available during [`build()`][1].
    ///
    /// Hooks run in level order. Hooks for the same level run in the order they were added.
    ///
    /// [1]: Self::build
    pub fn on_init<F>(mut self, level: Level, hook: F) -> Self
    where
        F: FnOnce(&Lifecycle) + Send + 'static,
    {
        self.init_hooks.push((level, Box::new(hook)));
        self
    }

    /// Builds the lifecycle, initializing every level from the lowest to the highest.
    #[must_use]
    pub fn build(self) -> Lifecycle {
        let pool = AutoreleasePool::builder()
            .capacity(self.pool_capacity)
            .build();
        let lifecycle = Lifecycle::uninitialized(pool);

        let mut hooks = self.init_hooks;
        hooks.sort_by_key(|(level, _)| *level);
        let mut hooks = hooks.into_iter().peekable();

        for level in Level::ALL {
            lifecycle.initialize_level(level);

            while let Some((_, hook)) = hooks.next_if(|(hook_level, _)| *hook_level == level) {
                hook(&lifecycle);
            }
        }

        lifecycle
    }
}

impl fmt::Debug for LifecycleBuilder {
    #[cfg_attr(test, mutants::skip)] // Diagnostic output only.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleBuilder")
            .field("pool_capacity", &self.pool_capacity)
            .field("init_hooks", &self.init_hooks.len())
            .finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::LevelState;

    #[test]
    fn default_pool_is_unbounded() {
        let lifecycle = LifecycleBuilder::new().build();
        assert_eq!(lifecycle.pool().capacity(), usize::MAX);
    }

    #[test]
    fn hooks_run_in_level_order_then_insertion_order() {
        let log = Arc::new(Mutex::new(Vec::new()));

        let hook = |name: &'static str| {
            let log = Arc::clone(&log);
            move |_: &Lifecycle| log.lock().unwrap().push(name)
        };

        let _lifecycle = LifecycleBuilder::new()
            .on_init(Level::AppHigh, hook("app_high"))
            .on_init(Level::FrameworkEssential, hook("essential_1"))
            .on_init(Level::AppLow, hook("app_low"))
            .on_init(Level::FrameworkEssential, hook("essential_2"))
            .build();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["essential_1", "essential_2", "app_low", "app_high"]
        );
    }

    #[test]
    fn hooks_may_register_cleanups_at_their_level() {
        let log = Arc::new(Mutex::new(Vec::new()));

        let lifecycle = LifecycleBuilder::new()
            .on_init(Level::AppEssential, {
                let log = Arc::clone(&log);
                move |lifecycle| {
                    assert_eq!(
                        lifecycle.state_check(Level::AppLow),
                        LevelState::NotAvailable
                    );
                    lifecycle
                        .register(Level::AppEssential, move || {
                            log.lock().unwrap().push("cleaned");
                        })
                        .unwrap();
                }
            })
            .build();

        lifecycle.teardown();

        assert_eq!(*log.lock().unwrap(), vec!["cleaned"]);
    }
}
