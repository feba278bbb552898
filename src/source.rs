//! The snapshot-source seam between the task store and the resolver.
//!
//! The resolver never polls: it pulls one snapshot at initialization and is
//! pushed a fresh snapshot on every subsequent store change. Implementors
//! must notify listeners only after a mutation has fully committed, and must
//! iterate over a copy of the listener set so a listener can unsubscribe
//! itself from within its own callback.

use std::sync::Arc;

use crate::error::Result;
use crate::model::Snapshot;

/// Callback invoked with each newly pushed snapshot.
pub type SnapshotListener = Arc<dyn Fn(&Snapshot) + Send + Sync>;

/// A source of task-store snapshots.
pub trait SnapshotSource {
    /// Assemble the current full snapshot. Pulled once at initialization.
    fn snapshot(&self) -> Result<Snapshot>;

    /// Register a listener for subsequent snapshot pushes.
    fn subscribe(&self, listener: SnapshotListener) -> Subscription;
}

/// Guard for a registered listener.
///
/// The listener is removed when the guard is dropped or when
/// [`Subscription::unsubscribe`] is called explicitly. Removal is safe from
/// within a notification callback.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Wrap a removal closure.
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Remove the listener now instead of at drop time.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
