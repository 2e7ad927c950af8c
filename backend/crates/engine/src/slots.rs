use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

/// At most one in-flight tick per job id within this process.
///
/// Cross-process exclusion is not provided here; the conditional checkpoint
/// write keeps concurrent executors from both committing the same token.
#[derive(Debug, Clone, Default)]
pub struct ExecutionSlots {
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl ExecutionSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` if a tick for `id` is already running.
    pub fn try_acquire(&self, id: &str) -> Option<SlotGuard> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !in_flight.insert(id.to_string()) {
            return None;
        }
        Some(SlotGuard {
            slots: Arc::clone(&self.in_flight),
            id: id.to_string(),
        })
    }
}

/// Releases the slot when dropped.
#[derive(Debug)]
pub struct SlotGuard {
    slots: Arc<Mutex<HashSet<String>>>,
    id: String,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_until_release() {
        let slots = ExecutionSlots::new();
        let guard = slots.try_acquire("a").unwrap();
        assert!(slots.try_acquire("a").is_none());

        drop(guard);
        assert!(slots.try_acquire("a").is_some());
    }

    #[test]
    fn slots_are_per_job() {
        let slots = ExecutionSlots::new();
        let _a = slots.try_acquire("a").unwrap();
        assert!(slots.try_acquire("b").is_some());
    }

    #[test]
    fn clones_share_state() {
        let slots = ExecutionSlots::new();
        let other = slots.clone();
        let guard = other.try_acquire("a").unwrap();
        assert!(slots.try_acquire("a").is_none());

        drop(guard);
        assert!(slots.try_acquire("a").is_some());
    }
}
