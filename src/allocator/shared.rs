//! Thread-shareable allocator handle
//!
//! The allocator itself assumes a single caller. This wrapper serializes every
//! operation behind one mutex for integrators that call it from several
//! threads.

use super::bridge::{AllocatorStats, Assignment, BridgeNumAllocator};
use super::number::BridgeNum;
use crate::error::Result;
use crate::registry::NumberRegistry;
use parking_lot::Mutex;
use std::sync::Arc;
use uuid::Uuid;

/// Cloneable handle to one allocator
pub struct SharedAllocator<R: NumberRegistry> {
    inner: Arc<Mutex<BridgeNumAllocator<R>>>,
}

impl<R: NumberRegistry> Clone for SharedAllocator<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: NumberRegistry> SharedAllocator<R> {
    pub fn new(allocator: BridgeNumAllocator<R>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(allocator)),
        }
    }

    pub fn allocate(&self, uuid: Uuid) -> Result<BridgeNum> {
        self.inner.lock().allocate(uuid)
    }

    pub fn free(&self, uuid: Uuid) -> Result<()> {
        self.inner.lock().free(uuid)
    }

    pub fn lookup(&self, uuid: &Uuid) -> Option<Assignment> {
        self.inner.lock().lookup(uuid)
    }

    pub fn stats(&self) -> AllocatorStats {
        self.inner.lock().stats()
    }

    /// Run `f` with exclusive access to the allocator
    pub fn with<T>(&self, f: impl FnOnce(&mut BridgeNumAllocator<R>) -> T) -> T {
        f(&mut self.inner.lock())
    }
}
