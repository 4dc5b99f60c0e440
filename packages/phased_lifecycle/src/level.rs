use std::fmt;

/// A named point in the global init/teardown timeline.
///
/// Levels are ordered by declaration: [`Level::FrameworkEssential`] is the lowest and
/// [`Level::AppHigh`] the highest. Levels become available from the lowest upwards when a
/// [`Lifecycle`][crate::Lifecycle] is built and are torn down from the highest downwards, so state
/// registered at a lower level outlives state registered at a higher one.
///
/// Framework-internal state belongs at the `Framework*` levels. Application state belongs at the
/// `App*` levels, which are torn down before any framework state.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[non_exhaustive]
pub enum Level {
    /// Torn down last. Reserved for state that everything else may rely on.
    FrameworkEssential,

    /// Low-priority framework state.
    FrameworkLow,

    /// Default level for framework state. The autorelease pool is drained at this level.
    FrameworkNormal,

    /// Framework state that should go away early.
    FrameworkHigh,

    /// Application state that other application state may rely on.
    AppEssential,

    /// Low-priority application state.
    AppLow,

    /// Default level for application state.
    #[default]
    AppNormal,

    /// Torn down first.
    AppHigh,
}

impl Level {
    /// All levels, from the lowest to the highest.
    pub const ALL: [Self; 8] = [
        Self::FrameworkEssential,
        Self::FrameworkLow,
        Self::FrameworkNormal,
        Self::FrameworkHigh,
        Self::AppEssential,
        Self::AppLow,
        Self::AppNormal,
        Self::AppHigh,
    ];

    /// The number of levels.
    pub const COUNT: usize = Self::ALL.len();

    /// The position of this level in [`Level::ALL`].
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// The name of the level, as used in log output.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::FrameworkEssential => "framework_essential",
            Self::FrameworkLow => "framework_low",
            Self::FrameworkNormal => "framework_normal",
            Self::FrameworkHigh => "framework_high",
            Self::AppEssential => "app_essential",
            Self::AppLow => "app_low",
            Self::AppNormal => "app_normal",
            Self::AppHigh => "app_high",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether state at a [`Level`] may currently be created or mutated.
///
/// Callers that receive [`LevelState::NotAvailable`] must treat their operation as a no-op.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum LevelState {
    /// The level has been initialized and has not begun teardown.
    Available,

    /// The level is not initialized yet or has begun teardown.
    NotAvailable,
}

impl LevelState {
    /// Whether this is [`LevelState::Available`].
    #[must_use]
    pub const fn is_available(self) -> bool {
        matches!(self, Self::Available)
    }
}
