//! Atomic initialization flags for kernel subsystems.
//!
//! `InitFlag` wraps the common pattern of an `AtomicBool` static that tracks
//! whether a subsystem has been brought up, with the memory orderings picked
//! once here instead of at every call site.

use core::sync::atomic::{AtomicBool, Ordering};

/// Atomic flag for tracking initialization state.
pub struct InitFlag {
    flag: AtomicBool,
}

impl InitFlag {
    pub const fn new() -> Self {
        Self {
            flag: AtomicBool::new(false),
        }
    }

    /// Returns `true` exactly once, for the caller that should initialize.
    #[inline]
    pub fn init_once(&self) -> bool {
        !self.flag.swap(true, Ordering::SeqCst)
    }

    /// Publish initialization side effects.
    #[inline]
    pub fn mark_set(&self) {
        self.flag.store(true, Ordering::Release);
    }

    #[inline]
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    /// Observe initialization side effects.
    #[inline]
    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Relaxed check for hot paths that only gate, e.g. logging.
    #[inline]
    pub fn is_set_relaxed(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

impl Default for InitFlag {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_once_fires_once() {
        let flag = InitFlag::new();
        assert!(flag.init_once());
        assert!(!flag.init_once());
        assert!(flag.is_set());
    }

    #[test]
    fn reset_rearms() {
        let flag = InitFlag::new();
        assert!(flag.init_once());
        flag.reset();
        assert!(!flag.is_set());
        assert!(flag.init_once());
    }
}
