//! Batch assembly on the learner side.
//!
//! The assembler drains B full slots FIFO, stacks their contents along a
//! leading batch dimension, and releases every index back to the free queue
//! *before* returning — so actors resume writing while the learner is still
//! doing model work. A batch owns only copies; it never aliases slot
//! memory.

use std::sync::Arc;

use crate::core::buffer_pool::{BufferPool, Ticket};
use crate::core::slot::SlotIndex;
use crate::model::PolicyState;

/// B stacked trajectory segments plus their start-state snapshots.
///
/// All per-timestep arrays have `T + 1` rows per element; row 0 is the
/// boundary carried from the previous segment.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    /// Observations, `[B][T + 1][obs]`.
    pub observations: Vec<Vec<Vec<f32>>>,
    /// Actions, `[B][T + 1]`.
    pub actions: Vec<Vec<u32>>,
    /// Behavior-policy logits, `[B][T + 1][n_actions]`.
    pub behavior_logits: Vec<Vec<Vec<f32>>>,
    /// Behavior-policy values, `[B][T + 1]`.
    pub values: Vec<Vec<f32>>,
    /// Extrinsic rewards, `[B][T + 1]`.
    pub rewards: Vec<Vec<f32>>,
    /// Intrinsic bonus rewards, `[B][T + 1]`.
    pub bonus_rewards: Vec<Vec<f32>>,
    /// Done flags, `[B][T + 1]`.
    pub dones: Vec<Vec<bool>>,
    /// True-termination flags, `[B][T + 1]`.
    pub real_dones: Vec<Vec<bool>>,
    /// Running episode returns, `[B][T + 1]`.
    pub episode_returns: Vec<Vec<f32>>,
    /// Running episode lengths, `[B][T + 1]`.
    pub episode_steps: Vec<Vec<u32>>,
    /// Running episode win flags, `[B][T + 1]`.
    pub episode_wins: Vec<Vec<bool>>,
    /// Visited-state counts, `[B][T + 1]`.
    pub visited_states: Vec<Vec<u64>>,
    /// Recurrent state at each segment's start, `[B]`.
    pub initial_states: Vec<PolicyState>,
    /// Exploration-policy states at segment start, when in use.
    pub initial_exploration_states: Option<Vec<PolicyState>>,
}

impl Batch {
    /// Number of segments.
    pub fn batch_size(&self) -> usize {
        self.actions.len()
    }

    /// Unroll length `T`.
    pub fn unroll_length(&self) -> usize {
        self.actions.first().map(|a| a.len() - 1).unwrap_or(0)
    }

    /// Deterministic batch for unit tests across the crate.
    #[cfg(test)]
    pub fn for_tests(
        batch_size: usize,
        unroll_length: usize,
        observation_len: usize,
        n_actions: usize,
    ) -> Self {
        let rows = unroll_length + 1;
        let mut batch = Batch::default();
        for b in 0..batch_size {
            batch.observations.push(
                (0..rows)
                    .map(|t| vec![(b * 100 + t) as f32; observation_len])
                    .collect(),
            );
            batch
                .actions
                .push((0..rows).map(|t| (t % n_actions) as u32).collect());
            batch
                .behavior_logits
                .push(vec![vec![0.0; n_actions]; rows]);
            batch.values.push(vec![0.0; rows]);
            batch.rewards.push(vec![0.0; rows]);
            batch.bonus_rewards.push(vec![0.0; rows]);
            batch.dones.push(vec![false; rows]);
            batch.real_dones.push(vec![false; rows]);
            batch.episode_returns.push(vec![0.0; rows]);
            batch.episode_steps.push((0..rows).map(|t| t as u32).collect());
            batch.episode_wins.push(vec![false; rows]);
            batch.visited_states.push(vec![0; rows]);
            batch.initial_states.push(PolicyState::new());
        }
        batch
    }
}

/// Learner-side assembler draining the full queue.
pub struct BatchAssembler {
    pool: Arc<BufferPool>,
    batch_size: usize,
}

impl BatchAssembler {
    /// Create an assembler producing batches of `batch_size` segments.
    pub fn new(pool: Arc<BufferPool>, batch_size: usize) -> Self {
        assert!(batch_size >= 1, "batch size must be >= 1");
        Self { pool, batch_size }
    }

    /// Block until B full slots are drained; copy then release each one.
    ///
    /// Returns `None` if a shutdown sentinel arrives, after returning any
    /// already-drained slots to the free queue.
    pub fn assemble(&self) -> Option<(Batch, Vec<SlotIndex>)> {
        let mut batch = Batch::default();
        let mut indices = Vec::with_capacity(self.batch_size);
        let mut exploration_states = Vec::new();

        while indices.len() < self.batch_size {
            let idx = match self.pool.acquire_full() {
                Ticket::Slot(idx) => idx,
                Ticket::Shutdown => return None,
            };

            {
                let slot = self.pool.slot(idx);
                batch.observations.push(slot.observations.clone());
                batch.actions.push(slot.actions.clone());
                batch.behavior_logits.push(slot.behavior_logits.clone());
                batch.values.push(slot.values.clone());
                batch.rewards.push(slot.rewards.clone());
                batch.bonus_rewards.push(slot.bonus_rewards.clone());
                batch.dones.push(slot.dones.clone());
                batch.real_dones.push(slot.real_dones.clone());
                batch.episode_returns.push(slot.episode_returns.clone());
                batch.episode_steps.push(slot.episode_steps.clone());
                batch.episode_wins.push(slot.episode_wins.clone());
                batch.visited_states.push(slot.visited_states.clone());
                batch.initial_states.push(slot.initial_state.clone());
                if let Some(state) = &slot.initial_exploration_state {
                    exploration_states.push(state.clone());
                }
            }

            // Copy done; hand the slot straight back so actors keep moving.
            self.pool.release(idx);
            indices.push(idx);
        }

        if exploration_states.len() == batch.batch_size() {
            batch.initial_exploration_states = Some(exploration_states);
        }

        Some((batch, indices))
    }
}
