use thiserror::Error;

use crate::Level;

/// Errors that can occur when registering global state with a [`Lifecycle`][crate::Lifecycle].
///
/// These are expected during shutdown and callers should treat them as "skip this operation".
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The level the caller tried to register at is not initialized yet or has already begun
    /// teardown, so no new cleanup entries may be added to it.
    #[error("cannot register a cleanup entry at level {level}: the level is not available")]
    RegistryUnavailable {
        /// The level that was not available.
        level: Level,
    },
}

/// A specialized `Result` type for lifecycle operations, returning the crate's
/// [`Error`] type as the error value.
pub(crate) type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::fmt::Debug;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Error: Send, Sync, Debug);

    #[test]
    fn message_names_level() {
        let error = Error::RegistryUnavailable {
            level: Level::AppHigh,
        };

        assert!(error.to_string().contains("app_high"));
    }
}
