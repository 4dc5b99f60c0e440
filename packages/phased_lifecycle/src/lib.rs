//! This package provides manual reference-counted object lifetimes together with the machinery
//! that governs global state across program startup and shutdown.
//!
//! # Building blocks
//!
//! - [`Managed<T>`] is a counted reference to a [`ManagedObject`]. When the last reference is
//!   released, the object's destruction hooks run in a fixed order.
//! - [`AutoreleasePool`] defers releases until the next drain. It is bounded: once full, the
//!   oldest pending object is released early.
//! - [`Lifecycle`] owns an ordered set of [`Level`]s. Levels become available from the lowest
//!   upwards and are torn down from the highest downwards. Cleanup actions registered at a level
//!   run when that level is torn down, last registered first.
//! - [`SingletonSlot`] lazily creates one global instance at a level and lets go of it when the
//!   level is torn down. Use [`singleton_slot!`] to declare slots as statics.
//!
//! Once a level has begun teardown, it refuses new state. Code that runs during shutdown checks
//! [`Lifecycle::state_check()`] (or handles [`Error::RegistryUnavailable`]) and skips whatever
//! it was about to do, so no global state can be resurrected after its cleanup has already run.
//!
//! # Example
//!
//! ```rust
//! use phased_lifecycle::{Level, LevelState, Lifecycle, Managed, ManagedObject};
//!
//! struct Theme {
//!     name: &'static str,
//! }
//!
//! impl ManagedObject for Theme {}
//!
//! phased_lifecycle::singleton_slot! {
//!     static THEME: Theme = Theme { name: "dark" }, level = Level::AppNormal;
//! }
//!
//! let lifecycle = Lifecycle::new();
//!
//! // The first access creates the instance.
//! let theme = THEME.get(&lifecycle).unwrap();
//! assert_eq!(theme.name, "dark");
//!
//! // Temporary objects can be handed to the autorelease pool instead of being released now.
//! lifecycle.autorelease(Managed::new(Theme { name: "preview" }));
//! assert_eq!(lifecycle.pool().len(), 1);
//!
//! lifecycle.teardown();
//!
//! // Nothing can be created at a level that has been torn down.
//! assert_eq!(lifecycle.state_check(Level::AppNormal), LevelState::NotAvailable);
//! assert!(THEME.get(&lifecycle).is_none());
//! ```

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

mod constants;
mod error;
mod level;
mod lifecycle;
mod lifecycle_builder;
mod managed;
mod pool;
mod pool_builder;
mod registry;
mod sequencer;
mod slot;

pub use error::*;
pub use level::*;
pub use lifecycle::*;
pub use lifecycle_builder::*;
pub use managed::*;
pub use pool::*;
pub use pool_builder::*;
pub use registry::CleanupHandle;
pub use slot::*;
