use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::{fmt, mem};

use tracing::debug;

use crate::constants::ERR_POISONED_LOCK;
use crate::error::Result;
use crate::{CleanupHandle, Level, Lifecycle, Managed, ManagedObject};

/// A lazily created, replaceable holder for one global instance of `T`.
///
/// The first [`get()`][Self::get] creates the instance and registers a cleanup entry with the
/// [`Lifecycle`] at the slot's [`Level`]. When that level is torn down, the slot lets go of the
/// instance and runs the slot's destroy action on it. Once the level has begun teardown, the slot
/// refuses to create or accept new instances, so global state cannot spring back to life during
/// shutdown.
///
/// The slot holds exactly one reference to its current instance and at most one cleanup entry.
/// Replacing the instance via [`set()`][Self::set] installs a cleanup entry for the new instance
/// before removing the entry of the old one.
///
/// A slot must only ever be used with one [`Lifecycle`] at a time. Once that lifecycle has been
/// torn down the slot is empty again and can be used with a new one. Passing a different
/// lifecycle while the slot still holds an instance registered with another one is a protocol
/// violation: `set()` panics, and so does `get()` in debug builds.
///
/// Use [`singleton_slot!`][crate::singleton_slot] to declare a slot as a static variable.
///
/// # Example
///
/// ```rust
/// use phased_lifecycle::{Level, Lifecycle, ManagedObject, Managed, SingletonSlot};
///
/// #[derive(Default)]
/// struct Settings {
///     verbose: bool,
/// }
///
/// impl ManagedObject for Settings {}
///
/// let lifecycle = Lifecycle::new();
/// let slot = SingletonSlot::new(Level::AppNormal, Settings::default);
///
/// let first = slot.get(&lifecycle).unwrap();
/// let second = slot.get(&lifecycle).unwrap();
/// assert!(Managed::ptr_eq(&first, &second));
///
/// lifecycle.teardown();
///
/// // The level is gone, so no new instance is created.
/// assert!(slot.get(&lifecycle).is_none());
/// ```
pub struct SingletonSlot<T>
where
    T: ManagedObject,
{
    level: Level,
    create: Box<dyn Fn() -> T + Send + Sync>,
    destroy: fn(Managed<T>),
    state: Arc<Mutex<SlotState<T>>>,
}

struct SlotState<T>
where
    T: ManagedObject,
{
    current: Option<Managed<T>>,

    // Present if and only if `current` is present.
    cleaner: Option<CleanupHandle>,
}

impl<T> SingletonSlot<T>
where
    T: ManagedObject,
{
    /// Creates an empty slot whose instance lives at `level` and is created by `create`.
    #[must_use]
    pub fn new<F>(level: Level, create: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            level,
            create: Box::new(create),
            destroy: Managed::release,
            state: Arc::new(Mutex::new(SlotState {
                current: None,
                cleaner: None,
            })),
        }
    }

    /// Replaces the action that the cleanup entry runs on the instance when the slot's level is
    /// torn down. The default releases the slot's reference.
    ///
    /// The action receives the slot's reference to the instance. It is only called for the
    /// instance the slot holds at teardown time, never for instances that were replaced earlier.
    #[must_use]
    pub fn with_destroy(mut self, destroy: fn(Managed<T>)) -> Self {
        self.destroy = destroy;
        self
    }

    /// The level at which the held instance is torn down.
    #[must_use]
    pub fn level(&self) -> Level {
        self.level
    }

    /// Whether the slot currently holds an instance.
    #[must_use]
    pub fn is_holding(&self) -> bool {
        self.lock().current.is_some()
    }

    /// Returns the held instance, creating it first if the slot is empty.
    ///
    /// Returns `None` without creating anything if the slot is empty and its level is not
    /// available, which is the case once the lifecycle has started tearing the level down.
    ///
    /// The instance is created at most once for as long as the slot holds it, even if multiple
    /// threads call this concurrently.
    ///
    /// # Panics
    ///
    /// In debug builds, panics if the held instance was registered with a different lifecycle.
    pub fn get(&self, lifecycle: &Lifecycle) -> Option<Managed<T>> {
        let mut state = self.lock();

        if let Some(current) = &state.current {
            let current = current.retain();
            let foreign = Self::held_for_other(&state, lifecycle);
            drop(state);

            debug_assert!(
                !foreign,
                "singleton slot at level {} holds an instance registered with another lifecycle",
                self.level
            );

            return Some(current);
        }

        if !lifecycle.state_check(self.level).is_available() {
            return None;
        }

        let instance = Managed::new((self.create)());

        match self.replace_locked(&mut state, lifecycle, Some(&instance)) {
            Ok(previous) => {
                debug_assert!(previous.is_none(), "slot was empty before creating an instance");
                drop(state);
                Some(instance)
            }
            Err(error) => {
                debug!(%error, "singleton level became unavailable while creating instance");
                drop(state);
                instance.release();
                None
            }
        }
    }

    /// Makes `instance` the held instance, or empties the slot if `instance` is `None`.
    ///
    /// The slot takes its own reference to the new instance and releases its reference to the
    /// previous one. Setting the instance the slot already holds changes nothing.
    ///
    /// Returns `false` and changes nothing if the slot's level is not available.
    ///
    /// # Panics
    ///
    /// Panics if the held instance was registered with a different lifecycle.
    pub fn set(&self, lifecycle: &Lifecycle, instance: Option<&Managed<T>>) -> bool {
        if !lifecycle.state_check(self.level).is_available() {
            return false;
        }

        let mut state = self.lock();

        if Self::held_for_other(&state, lifecycle) {
            drop(state);
            panic!(
                "singleton slot at level {} holds an instance registered with another lifecycle",
                self.level
            );
        }

        let unchanged = match (&state.current, instance) {
            (Some(current), Some(instance)) => Managed::ptr_eq(current, instance),
            (None, None) => true,
            _ => false,
        };

        if unchanged {
            return true;
        }

        match self.replace_locked(&mut state, lifecycle, instance) {
            Ok(previous) => {
                // The previous instance may use this slot while it is being released.
                drop(state);
                drop(previous);
                true
            }
            Err(error) => {
                debug!(%error, "singleton level became unavailable while replacing instance");
                false
            }
        }
    }

    /// Swaps in `instance` and its cleanup entry, returning the previous instance so the caller
    /// can release it once the slot lock is no longer held.
    fn replace_locked(
        &self,
        state: &mut SlotState<T>,
        lifecycle: &Lifecycle,
        instance: Option<&Managed<T>>,
    ) -> Result<Option<Managed<T>>> {
        let previous_cleaner = state.cleaner.take();

        if let Some(instance) = instance {
            match lifecycle.register(self.level, self.cleanup_action(instance)) {
                Ok(cleaner) => state.cleaner = Some(cleaner),
                Err(error) => {
                    state.cleaner = previous_cleaner;
                    return Err(error);
                }
            }
        }

        let previous = mem::replace(&mut state.current, instance.map(Managed::retain));

        if let Some(previous_cleaner) = previous_cleaner {
            lifecycle.unregister(previous_cleaner, self.level);
        }

        Ok(previous)
    }

    /// Builds the cleanup entry for `instance`.
    ///
    /// The entry only holds weak references: the slot owns the instance. If the slot has moved
    /// on to a different instance by the time the entry runs, the entry leaves the slot alone.
    fn cleanup_action(&self, instance: &Managed<T>) -> impl FnOnce() + Send + 'static {
        let slot_state: Weak<Mutex<SlotState<T>>> = Arc::downgrade(&self.state);
        let instance = instance.downgrade();
        let destroy = self.destroy;

        move || {
            let Some(slot_state) = slot_state.upgrade() else {
                return;
            };

            let detached = {
                let mut state = slot_state.lock().expect(ERR_POISONED_LOCK);

                let is_current = state
                    .current
                    .as_ref()
                    .is_some_and(|current| instance.refers_to(current));

                if is_current {
                    state.cleaner = None;
                    state.current.take()
                } else {
                    None
                }
            };

            if let Some(detached) = detached {
                destroy(detached);
            }
        }
    }

    // The lock is released by the callers before they panic, so the slot stays usable.
    fn held_for_other(state: &SlotState<T>, lifecycle: &Lifecycle) -> bool {
        state
            .cleaner
            .is_some_and(|cleaner| !lifecycle.issued(cleaner))
    }

    fn lock(&self) -> MutexGuard<'_, SlotState<T>> {
        self.state.lock().expect(ERR_POISONED_LOCK)
    }
}

impl<T> fmt::Debug for SingletonSlot<T>
where
    T: ManagedObject,
{
    #[cfg_attr(test, mutants::skip)] // Diagnostic output only.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingletonSlot")
            .field("level", &self.level)
            .field("is_holding", &self.is_holding())
            .finish_non_exhaustive()
    }
}

/// Declares static [`SingletonSlot`] variables.
///
/// Each slot is created on first access. Without an explicit level the slot lives at
/// [`Level::AppNormal`].
///
/// # Example
///
/// ```
/// use phased_lifecycle::{Level, Lifecycle, ManagedObject};
///
/// #[derive(Default)]
/// struct Catalog;
/// impl ManagedObject for Catalog {}
///
/// #[derive(Default)]
/// struct Fonts;
/// impl ManagedObject for Fonts {}
///
/// phased_lifecycle::singleton_slot! {
///     static CATALOG: Catalog = Catalog::default();
///     static FONTS: Fonts = Fonts::default(), level = Level::FrameworkHigh;
/// }
///
/// let lifecycle = Lifecycle::new();
///
/// assert!(CATALOG.get(&lifecycle).is_some());
/// assert_eq!(FONTS.level(), Level::FrameworkHigh);
/// ```
#[macro_export]
macro_rules! singleton_slot {
    () => {};

    ($(#[$attr:meta])* $vis:vis static $NAME:ident: $t:ty = $e:expr, level = $level:expr; $($rest:tt)*) => (
        $crate::singleton_slot!($(#[$attr])* $vis static $NAME: $t = $e, level = $level);
        $crate::singleton_slot!($($rest)*);
    );

    ($(#[$attr:meta])* $vis:vis static $NAME:ident: $t:ty = $e:expr; $($rest:tt)*) => (
        $crate::singleton_slot!($(#[$attr])* $vis static $NAME: $t = $e, level = $crate::Level::AppNormal);
        $crate::singleton_slot!($($rest)*);
    );

    ($(#[$attr:meta])* $vis:vis static $NAME:ident: $t:ty = $e:expr, level = $level:expr) => {
        $(#[$attr])* $vis static $NAME: ::std::sync::LazyLock<$crate::SingletonSlot<$t>> =
            ::std::sync::LazyLock::new(|| $crate::SingletonSlot::new($level, || $e));
    };

    ($(#[$attr:meta])* $vis:vis static $NAME:ident: $t:ty = $e:expr) => {
        $crate::singleton_slot!($(#[$attr])* $vis static $NAME: $t = $e, level = $crate::Level::AppNormal);
    };
}
