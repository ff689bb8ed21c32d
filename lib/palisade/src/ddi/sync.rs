// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Lock wrappers used for the engine's shared state.
//!
//! The engine holds two pieces of long-lived shared state: the rule
//! table, which is read on every new flow and replaced rarely, and the
//! connection state, which is mutated by nearly every TCP segment. The
//! former sits behind a [`KRwLock`], the latter behind a [`KMutex`].
//!
//! A poisoned lock is not treated as fatal. A panic while holding one
//! of these locks can only come from a bug in the engine itself, and
//! refusing every subsequent packet would turn that bug into an
//! outage of the packet path. The guard is recovered instead.
use std::ops::Deref;
use std::ops::DerefMut;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::RwLock;

/// A mutual exclusion lock.
///
/// We name it `KMutex` on purpose. Its API is narrower than the std
/// `Mutex`: there is no `try_lock` and acquisition never fails.
pub struct KMutex<T> {
    inner: Mutex<T>,
}

pub struct KMutexGuard<'a, T: 'a> {
    guard: std::sync::MutexGuard<'a, T>,
}

impl<T> Deref for KMutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.guard.deref()
    }
}

impl<T> DerefMut for KMutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.guard.deref_mut()
    }
}

impl<T> KMutex<T> {
    pub fn into_inner(self) -> T
    where
        T: Sized,
    {
        self.inner.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn new(val: T) -> Self {
        KMutex { inner: Mutex::new(val) }
    }

    /// Acquire the mutex, blocking until it is available. The mutex
    /// is released when the guard is dropped.
    pub fn lock(&self) -> KMutexGuard<'_, T> {
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        KMutexGuard { guard }
    }
}

impl<T: Default> Default for KMutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// A reader-writer lock.
pub struct KRwLock<T> {
    inner: RwLock<T>,
}

pub struct KRwLockReadGuard<'a, T: 'a> {
    guard: std::sync::RwLockReadGuard<'a, T>,
}

pub struct KRwLockWriteGuard<'a, T: 'a> {
    guard: std::sync::RwLockWriteGuard<'a, T>,
}

impl<T> Deref for KRwLockReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.guard.deref()
    }
}

impl<T> Deref for KRwLockWriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.guard.deref()
    }
}

impl<T> DerefMut for KRwLockWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.guard.deref_mut()
    }
}

impl<T> KRwLock<T> {
    pub fn into_inner(self) -> T
    where
        T: Sized,
    {
        self.inner.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn new(val: T) -> Self {
        KRwLock { inner: RwLock::new(val) }
    }

    pub fn read(&self) -> KRwLockReadGuard<'_, T> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        KRwLockReadGuard { guard }
    }

    pub fn write(&self) -> KRwLockWriteGuard<'_, T> {
        let guard =
            self.inner.write().unwrap_or_else(PoisonError::into_inner);
        KRwLockWriteGuard { guard }
    }
}
