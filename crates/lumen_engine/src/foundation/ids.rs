//! Unique identifier generation
//!
//! Identifiers are plain `u64` values handed out by an [`IdGenerator`] owned by
//! whoever creates the objects (scene, resource manager). Values read back from
//! disk are reported with [`IdGenerator::observe`] so fresh ids never collide
//! with deserialized ones.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic, thread-safe id source
#[derive(Debug)]
pub struct IdGenerator {
    next: AtomicU64,
}

impl IdGenerator {
    /// Create a generator whose first id is 1 (0 is reserved for "none")
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Hand out the next unused id
    pub fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Make sure `id` will never be handed out again
    pub fn observe(&self, id: u64) {
        self.next.fetch_max(id.saturating_add(1), Ordering::Relaxed);
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
