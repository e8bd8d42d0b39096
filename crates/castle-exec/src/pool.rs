//! Bounded pool of reusable resources.
//!
//! Used for database connections: every connection is opened up front,
//! handed out one owner at a time, and returned when the [`Pooled`]
//! handle drops. There is no growth and no health checking.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

struct Shared<T> {
    idle: Mutex<VecDeque<T>>,
    available: Condvar,
    size: usize,
}

/// A fixed-size pool of `T`.
///
/// Cloning the pool is cheap and every clone refers to the same set of
/// resources, so a pool can be captured by tasks running on different
/// worker threads.
pub struct ResourcePool<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for ResourcePool<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> ResourcePool<T> {
    /// Creates `size` resources eagerly with `make`.
    ///
    /// The first failure aborts construction and is returned as-is; any
    /// resources created before it are dropped. A `size` of zero is
    /// bumped to one so `acquire` can never wait forever on an empty pool.
    pub fn new<E, F>(size: usize, mut make: F) -> Result<Self, E>
    where
        F: FnMut() -> Result<T, E>,
    {
        let size = size.max(1);
        let mut idle = VecDeque::with_capacity(size);
        for _ in 0..size {
            idle.push_back(make()?);
        }

        tracing::debug!(size, "resource pool created");

        Ok(Self {
            shared: Arc::new(Shared {
                idle: Mutex::new(idle),
                available: Condvar::new(),
                size,
            }),
        })
    }

    /// Takes a resource, blocking the calling thread until one is free.
    ///
    /// Never call this from the reactor thread.
    pub fn acquire(&self) -> Pooled<T> {
        let mut idle = self.shared.idle.lock();
        loop {
            if let Some(resource) = idle.pop_front() {
                return self.wrap(resource);
            }
            self.shared.available.wait(&mut idle);
        }
    }

    /// Total number of resources owned by the pool.
    pub fn size(&self) -> usize {
        self.shared.size
    }

    /// Number of resources not currently checked out.
    pub fn idle(&self) -> usize {
        self.shared.idle.lock().len()
    }

    fn wrap(&self, resource: T) -> Pooled<T> {
        Pooled {
            resource: Some(resource),
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Exclusive handle to one pooled resource. Returns it on drop and wakes
/// one waiter.
pub struct Pooled<T> {
    resource: Option<T>,
    shared: Arc<Shared<T>>,
}

impl<T> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Only `Drop` takes the resource out.
        match &self.resource {
            Some(resource) => resource,
            None => unreachable!("pooled resource used after release"),
        }
    }
}

impl<T> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        match &mut self.resource {
            Some(resource) => resource,
            None => unreachable!("pooled resource used after release"),
        }
    }
}

impl<T> Drop for Pooled<T> {
    fn drop(&mut self) {
        if let Some(resource) = self.resource.take() {
            self.shared.idle.lock().push_back(resource);
            self.shared.available.notify_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter_pool(size: usize) -> ResourcePool<u32> {
        let mut next = 0;
        ResourcePool::new(size, || -> Result<u32, ()> {
            next += 1;
            Ok(next)
        })
        .expect("infallible factory")
    }

    #[test]
    fn test_new_creates_all_resources_eagerly() {
        let pool = counter_pool(3);
        assert_eq!(pool.size(), 3);
        assert_eq!(pool.idle(), 3);
    }

    #[test]
    fn test_new_factory_failure_fails_construction() {
        let mut made = 0;
        let result = ResourcePool::new(4, || {
            made += 1;
            if made == 3 { Err("db down") } else { Ok(made) }
        });
        assert_eq!(result.err(), Some("db down"));
        assert_eq!(made, 3);
    }

    #[test]
    fn test_new_zero_size_holds_one_resource() {
        let pool = counter_pool(0);
        assert_eq!(pool.size(), 1);
        assert_eq!(*pool.acquire(), 1);
    }

    #[test]
    fn test_drop_returns_resource_to_pool() {
        let pool = counter_pool(2);
        let a = pool.acquire();
        let b = pool.acquire();
        assert_ne!(*a, *b);
        assert_eq!(pool.idle(), 0);

        drop(a);
        assert_eq!(pool.idle(), 1);
        drop(b);
        assert_eq!(pool.idle(), 2);
    }

    #[test]
    fn test_deref_mut_mutation_survives_release() {
        let pool = counter_pool(1);
        {
            let mut handle = pool.acquire();
            *handle = 99;
        }
        assert_eq!(*pool.acquire(), 99);
    }
}
