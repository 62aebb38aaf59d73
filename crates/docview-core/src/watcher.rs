//! Stale page detection.
//!
//! A page handed back asynchronously can be torn down by its producer, or belong to a paginator
//! that has since been replaced, before the layout queue gets to process the callback.
//! [`PageDestroyedWatcher`] answers the only question the cache needs: "is this still a live page
//! from the source I am currently attached to".

use crate::paginator::DocumentPage;

/// Tracks the current source epoch and validates pages against it.
#[derive(Debug, Clone, Default)]
pub struct PageDestroyedWatcher {
    epoch: u64,
}

impl PageDestroyedWatcher {
    /// Create a watcher at epoch 0 (no source attached yet).
    pub fn new() -> Self {
        Self::default()
    }

    /// Current source epoch.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Start a new epoch; pages minted for earlier epochs become stale.
    pub fn advance(&mut self) -> u64 {
        self.epoch = self.epoch.wrapping_add(1);
        self.epoch
    }

    /// Whether `epoch` is the current one.
    pub fn is_current(&self, epoch: u64) -> bool {
        self.epoch == epoch
    }

    /// Whether `page` must be ignored: destroyed by its producer, or produced by a detached
    /// source.
    pub fn is_destroyed(&self, page: &DocumentPage) -> bool {
        page.is_destroyed() || !self.is_current(page.source_epoch())
    }
}
