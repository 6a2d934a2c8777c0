//! Atomically swappable published value

use std::sync::{Arc, PoisonError, RwLock};

/// Holds the currently published value behind a short-held lock.
///
/// Writers prepare the replacement off to the side and only take the write
/// lock to swap the pointer. Readers clone the `Arc` out under the read lock,
/// so a reader holding an old value keeps it alive after the next publish and
/// never sees a partially built one.
#[derive(Debug)]
pub struct RevolvingState<T> {
    current: RwLock<Option<Arc<T>>>,
}

impl<T> Default for RevolvingState<T> {
    fn default() -> Self {
        Self { current: RwLock::new(None) }
    }
}

impl<T> RevolvingState<T> {
    /// Empty state; `get` returns `None` until the first `set`
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently published value
    pub fn get(&self) -> Option<Arc<T>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Publish `value`, returning the value it replaced
    pub fn set(&self, value: Arc<T>) -> Option<Arc<T>> {
        let mut slot = self.current.write().unwrap_or_else(PoisonError::into_inner);
        slot.replace(value)
    }

    pub fn is_empty(&self) -> bool {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}
