use std::sync::Arc;

use crate::store::{InMemoryStore, KeyValueStore};

/// Per-channel dispatch mutual exclusion.
///
/// The guard is set before the first await of a dispatch attempt and cleared
/// only on a terminal path (failure, explicit stop). At most one guard is held
/// per channel at any time. Operations are atomic per call; the cooperative
/// concurrency model never interleaves two dispatch attempts' synchronous
/// sections for the same channel.
#[derive(Clone)]
pub struct DispatchGuardStore {
    guards: Arc<dyn KeyValueStore<bool>>,
}

impl DispatchGuardStore {
    pub fn new(guards: Arc<dyn KeyValueStore<bool>>) -> Self {
        Self { guards }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStore::new()))
    }

    /// Acquire the guard for a channel. Returns `false` when already held.
    pub fn try_acquire(&self, channel: &str) -> bool {
        if self.is_held(channel) {
            return false;
        }
        self.guards.set(channel, true);
        true
    }

    /// Release the guard. Returns `true` when a held guard was cleared.
    pub fn release(&self, channel: &str) -> bool {
        self.guards.remove(channel).unwrap_or(false)
    }

    pub fn is_held(&self, channel: &str) -> bool {
        self.guards.get(channel).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::DispatchGuardStore;

    #[test]
    fn second_acquire_on_same_channel_is_rejected() {
        let guards = DispatchGuardStore::in_memory();

        assert!(guards.try_acquire("c1"));
        assert!(!guards.try_acquire("c1"));
        assert!(guards.is_held("c1"));
    }

    #[test]
    fn channels_are_guarded_independently() {
        let guards = DispatchGuardStore::in_memory();

        assert!(guards.try_acquire("c1"));
        assert!(guards.try_acquire("c2"));
    }

    #[test]
    fn release_makes_the_channel_acquirable_again() {
        let guards = DispatchGuardStore::in_memory();

        assert!(guards.try_acquire("c1"));
        assert!(guards.release("c1"));
        assert!(!guards.release("c1"));
        assert!(guards.try_acquire("c1"));
    }
}
