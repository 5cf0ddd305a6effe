//! Per-slot persistent recurrent state.
//!
//! Each slot index owns one carried hidden state: the state the policy had
//! at the end of the previous segment written into that index. The next
//! segment written into the same index starts from it, unless the episode
//! truly terminated, in which case the actor stores the policy's initial
//! state instead.
//!
//! Entries are created once at startup and live until shutdown. Exclusivity
//! is per index only — the buffer pool's hand-off already guarantees a
//! single worker touches a given index at a time, so a per-entry mutex
//! suffices and no global lock exists.

use parking_lot::Mutex;

use crate::core::slot::SlotIndex;
use crate::model::PolicyState;

/// Table of carried recurrent states, one per slot index.
pub struct StateCarry {
    initial: PolicyState,
    states: Vec<Mutex<PolicyState>>,
}

impl StateCarry {
    /// Create a table of `n_slots` entries, all set to `initial`.
    pub fn new(n_slots: usize, initial: PolicyState) -> Self {
        let states = (0..n_slots).map(|_| Mutex::new(initial.clone())).collect();
        Self { initial, states }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// The policy's initial state.
    pub fn initial_state(&self) -> PolicyState {
        self.initial.clone()
    }

    /// Load the carried state for a slot index.
    pub fn load(&self, idx: SlotIndex) -> PolicyState {
        self.states[idx].lock().clone()
    }

    /// Store the segment-end state for a slot index.
    pub fn store(&self, idx: SlotIndex, state: PolicyState) {
        *self.states[idx].lock() = state;
    }

    /// Reset a slot index back to the initial state.
    pub fn reset(&self, idx: SlotIndex) {
        *self.states[idx].lock() = self.initial.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_table_seeded_with_initial() {
        let carry = StateCarry::new(3, vec![0.5, 0.5]);
        assert_eq!(carry.len(), 3);
        for idx in 0..3 {
            assert_eq!(carry.load(idx), vec![0.5, 0.5]);
        }
    }

    #[test]
    fn test_store_and_load() {
        let carry = StateCarry::new(2, vec![0.0]);
        carry.store(1, vec![3.0]);
        assert_eq!(carry.load(1), vec![3.0]);
        // Other entries untouched.
        assert_eq!(carry.load(0), vec![0.0]);
    }

    #[test]
    fn test_reset() {
        let carry = StateCarry::new(1, vec![0.0, 0.0]);
        carry.store(0, vec![9.0, 9.0]);
        carry.reset(0);
        assert_eq!(carry.load(0), vec![0.0, 0.0]);
    }
}
