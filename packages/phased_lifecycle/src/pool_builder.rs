use crate::AutoreleasePool;

/// Builder for creating an instance of [`AutoreleasePool`].
///
/// # Examples
///
/// ```
/// use phased_lifecycle::AutoreleasePool;
///
/// // Default pool, with no practical limit on the number of pending objects.
/// let pool = AutoreleasePool::builder().build();
///
/// // Pool that releases its oldest object early once 64 objects are pending.
/// let pool = AutoreleasePool::builder().capacity(64).build();
/// assert_eq!(pool.capacity(), 64);
/// ```
#[derive(Debug)]
#[must_use]
pub struct AutoreleasePoolBuilder {
    capacity: usize,
}

impl AutoreleasePoolBuilder {
    pub(crate) fn new() -> Self {
        Self {
            capacity: usize::MAX,
        }
    }

    /// Sets the maximum number of objects the pool holds before it starts releasing the oldest
    /// ones early. A capacity of zero is treated as one.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Builds the pool with the specified configuration.
    #[must_use]
    pub fn build(self) -> AutoreleasePool {
        AutoreleasePool::new_inner(self.capacity.max(1))
    }
}
