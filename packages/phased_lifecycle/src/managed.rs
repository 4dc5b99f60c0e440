use std::fmt;
use std::ops::Deref;
use std::ptr;
use std::sync::{Arc, Weak};

use crate::AutoreleasePool;

/// Capability of an object whose lifetime is governed by [`Managed<T>`] handles.
///
/// The hooks are called when the last handle to the object is released. Both are called exactly
/// once per object and [`on_dealloc_prepare()`][Self::on_dealloc_prepare] is always called
/// strictly before [`on_dealloc()`][Self::on_dealloc]. After `on_dealloc()` returns, the object
/// is gone and no handle to it can exist anymore.
///
/// The prepare hook is the place to release other managed objects (including by adding them to
/// an [`AutoreleasePool`]) while the object is still fully intact. The dealloc hook is the last
/// chance to tear down internal state.
///
/// # Example
///
/// ```rust
/// use phased_lifecycle::{Managed, ManagedObject};
///
/// struct Connection {
///     name: String,
/// }
///
/// impl ManagedObject for Connection {
///     fn on_dealloc(&mut self) {
///         self.name.clear();
///     }
/// }
///
/// let connection = Managed::new(Connection {
///     name: "primary".to_string(),
/// });
/// assert_eq!(connection.name, "primary");
/// ```
pub trait ManagedObject: Send + Sync + 'static {
    /// Called when the last reference has been released, before [`on_dealloc()`][1].
    ///
    /// [1]: ManagedObject::on_dealloc
    fn on_dealloc_prepare(&self) {}

    /// Called once as the final step of the object's life.
    fn on_dealloc(&mut self) {}
}

/// The shared allocation behind every [`Managed<T>`] handle.
///
/// The destruction hooks are driven from here so that they run exactly when the strong count
/// reaches zero, no matter which handle was released last.
struct ManagedCell<T>
where
    T: ?Sized + ManagedObject,
{
    value: T,
}

impl<T> Drop for ManagedCell<T>
where
    T: ?Sized + ManagedObject,
{
    fn drop(&mut self) {
        self.value.on_dealloc_prepare();
        self.value.on_dealloc();
    }
}

/// A counted reference to a [`ManagedObject`].
///
/// Creating an object with [`Managed::new()`] yields the first reference (count 1). Every
/// [`retain()`][Self::retain] (or `clone()`) adds one reference and every
/// [`release()`][Self::release] (or drop) removes one. When the count reaches zero the object's
/// destruction hooks run.
///
/// Releasing consumes the handle, so an object can never be released more times than it was
/// retained and a deallocated object can never be retained again.
///
/// # Thread safety
///
/// Handles are `Send` and `Sync` and may be retained and released from any thread.
///
/// # Example
///
/// ```rust
/// use phased_lifecycle::{Managed, ManagedObject};
///
/// struct Texture;
/// impl ManagedObject for Texture {}
///
/// let texture = Managed::new(Texture);
/// let extra = texture.retain();
/// assert_eq!(texture.retain_count(), 2);
///
/// extra.release();
/// assert_eq!(texture.retain_count(), 1);
/// ```
pub struct Managed<T>
where
    T: ?Sized + ManagedObject,
{
    cell: Arc<ManagedCell<T>>,
}

/// A type-erased [`Managed`] handle, as stored by an [`AutoreleasePool`].
pub type ErasedManaged = Managed<dyn ManagedObject>;

impl<T> Managed<T>
where
    T: ManagedObject,
{
    /// Creates a new managed object, returning the first reference to it.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            cell: Arc::new(ManagedCell { value }),
        }
    }

    /// Erases the type of the object, keeping the same reference.
    #[must_use]
    pub fn into_erased(self) -> ErasedManaged {
        let cell: Arc<ManagedCell<dyn ManagedObject>> = self.cell;
        Managed { cell }
    }

    /// Hands this reference over to `pool`, which releases it on its next drain.
    ///
    /// # Example
    ///
    /// ```rust
    /// use phased_lifecycle::{AutoreleasePool, Managed, ManagedObject};
    ///
    /// struct Buffer;
    /// impl ManagedObject for Buffer {}
    ///
    /// let pool = AutoreleasePool::new();
    /// let buffer = Managed::new(Buffer);
    ///
    /// buffer.retain().autorelease(&pool);
    /// assert_eq!(buffer.retain_count(), 2);
    ///
    /// pool.drain();
    /// assert_eq!(buffer.retain_count(), 1);
    /// ```
    pub fn autorelease(self, pool: &AutoreleasePool) {
        pool.add(self.into_erased());
    }

    /// Creates a non-owning reference to the object.
    #[must_use]
    pub fn downgrade(&self) -> WeakManaged<T> {
        WeakManaged {
            cell: Arc::downgrade(&self.cell),
        }
    }
}

impl<T> Managed<T>
where
    T: ?Sized + ManagedObject,
{
    /// Adds a reference to the object, returning the new handle.
    #[must_use]
    pub fn retain(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }

    /// Removes this reference. If it was the last one, the object is deallocated.
    pub fn release(self) {
        drop(self);
    }

    /// Returns the number of live references to the object.
    ///
    /// Other threads may retain or release concurrently, so the value may be stale by the time
    /// it is observed.
    #[must_use]
    pub fn retain_count(&self) -> usize {
        Arc::strong_count(&self.cell)
    }

    /// Whether two handles refer to the same object.
    #[must_use]
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Arc::ptr_eq(&this.cell, &other.cell)
    }

    /// Returns a pointer to the object, usable for identity comparisons.
    #[must_use]
    pub fn as_ptr(&self) -> *const T {
        ptr::from_ref(&self.cell.value)
    }
}

impl<T> Clone for Managed<T>
where
    T: ?Sized + ManagedObject,
{
    fn clone(&self) -> Self {
        self.retain()
    }
}

impl<T> Deref for Managed<T>
where
    T: ?Sized + ManagedObject,
{
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.cell.value
    }
}

impl<T> fmt::Debug for Managed<T>
where
    T: ?Sized + ManagedObject,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Managed")
            .field("ptr", &self.as_ptr())
            .field("retain_count", &self.retain_count())
            .finish()
    }
}

/// A non-owning reference to a [`ManagedObject`], obtained from [`Managed::downgrade()`].
///
/// Does not keep the object alive. Holding one does guarantee that the address of the object is
/// not reused, so identity comparisons against a [`Managed<T>`] stay meaningful.
pub struct WeakManaged<T>
where
    T: ManagedObject,
{
    cell: Weak<ManagedCell<T>>,
}

impl<T> WeakManaged<T>
where
    T: ManagedObject,
{
    /// Obtains a new reference to the object if it is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<Managed<T>> {
        self.cell.upgrade().map(|cell| Managed { cell })
    }

    /// Whether this refers to the same object as `managed`.
    #[must_use]
    pub fn refers_to(&self, managed: &Managed<T>) -> bool {
        ptr::addr_eq(self.cell.as_ptr(), Arc::as_ptr(&managed.cell))
    }
}

impl<T> Clone for WeakManaged<T>
where
    T: ManagedObject,
{
    fn clone(&self) -> Self {
        Self {
            cell: Weak::clone(&self.cell),
        }
    }
}

impl<T> fmt::Debug for WeakManaged<T>
where
    T: ManagedObject,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakManaged")
            .field("ptr", &self.cell.as_ptr())
            .finish()
    }
}
