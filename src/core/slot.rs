//! Trajectory slot: one fixed-length segment record.
//!
//! A slot holds `T + 1` timesteps as parallel arrays — index 0 is the
//! boundary timestep carried over from the previous segment, indices
//! `1..=T` are the steps collected this segment. The extra row lets the
//! learner bootstrap from the value of the final observation.
//!
//! Slots are preallocated once at startup and recycled through the buffer
//! pool; only integer indices ever cross worker boundaries.

use crate::model::PolicyState;

/// Index of a slot within the pool.
pub type SlotIndex = usize;

/// One timestep's worth of data, used to fill a slot row.
#[derive(Debug, Clone, Default)]
pub struct StepRecord {
    /// Observation at this timestep.
    pub observation: Vec<f32>,
    /// Action that produced this timestep.
    pub action: u32,
    /// Behavior-policy logits that produced the action.
    pub behavior_logits: Vec<f32>,
    /// Behavior-policy value estimate.
    pub value: f32,
    /// Extrinsic reward.
    pub reward: f32,
    /// Intrinsic bonus reward.
    pub bonus_reward: f32,
    /// Episode ended (either reason).
    pub done: bool,
    /// Episode truly terminated.
    pub real_done: bool,
    /// Running episode return.
    pub episode_return: f32,
    /// Running episode length.
    pub episode_step: u32,
    /// Whether the episode has produced a win so far.
    pub episode_win: bool,
    /// Distinct states visited by the bonus module, if tracked.
    pub visited_states: u64,
}

/// Fixed-capacity trajectory segment plus its recurrent-state snapshot.
#[derive(Debug, Clone)]
pub struct TrajectorySlot {
    /// Observations, `T + 1` rows.
    pub observations: Vec<Vec<f32>>,
    /// Actions taken, `T + 1` entries.
    pub actions: Vec<u32>,
    /// Behavior-policy logits, `T + 1` rows.
    pub behavior_logits: Vec<Vec<f32>>,
    /// Behavior-policy value estimates.
    pub values: Vec<f32>,
    /// Extrinsic rewards.
    pub rewards: Vec<f32>,
    /// Intrinsic bonus rewards.
    pub bonus_rewards: Vec<f32>,
    /// Done flags (terminated or truncated).
    pub dones: Vec<bool>,
    /// True-termination flags.
    pub real_dones: Vec<bool>,
    /// Running episode returns.
    pub episode_returns: Vec<f32>,
    /// Running episode lengths.
    pub episode_steps: Vec<u32>,
    /// Running episode win flags.
    pub episode_wins: Vec<bool>,
    /// Visited-state counts.
    pub visited_states: Vec<u64>,
    /// Recurrent state at segment start.
    pub initial_state: PolicyState,
    /// Exploration-policy state at segment start, when one is in use.
    pub initial_exploration_state: Option<PolicyState>,
}

impl TrajectorySlot {
    /// Allocate a zeroed slot for segments of `unroll_length` steps.
    pub fn new(unroll_length: usize, observation_len: usize, n_actions: usize) -> Self {
        let rows = unroll_length + 1;
        Self {
            observations: vec![vec![0.0; observation_len]; rows],
            actions: vec![0; rows],
            behavior_logits: vec![vec![0.0; n_actions]; rows],
            values: vec![0.0; rows],
            rewards: vec![0.0; rows],
            bonus_rewards: vec![0.0; rows],
            dones: vec![false; rows],
            real_dones: vec![false; rows],
            episode_returns: vec![0.0; rows],
            episode_steps: vec![0; rows],
            episode_wins: vec![false; rows],
            visited_states: vec![0; rows],
            initial_state: PolicyState::new(),
            initial_exploration_state: None,
        }
    }

    /// Number of rows (`T + 1`).
    pub fn rows(&self) -> usize {
        self.actions.len()
    }

    /// Unroll length `T`.
    pub fn unroll_length(&self) -> usize {
        self.rows() - 1
    }

    /// Write one timestep's record at row `t`.
    ///
    /// # Panics
    ///
    /// Panics if `t` is out of range.
    pub fn record(&mut self, t: usize, step: StepRecord) {
        assert!(t < self.rows(), "slot row {} out of range", t);
        self.observations[t] = step.observation;
        self.actions[t] = step.action;
        self.behavior_logits[t] = step.behavior_logits;
        self.values[t] = step.value;
        self.rewards[t] = step.reward;
        self.bonus_rewards[t] = step.bonus_reward;
        self.dones[t] = step.done;
        self.real_dones[t] = step.real_done;
        self.episode_returns[t] = step.episode_return;
        self.episode_steps[t] = step.episode_step;
        self.episode_wins[t] = step.episode_win;
        self.visited_states[t] = step.visited_states;
    }

    /// Read back one timestep's record from row `t`.
    pub fn step_record(&self, t: usize) -> StepRecord {
        assert!(t < self.rows(), "slot row {} out of range", t);
        StepRecord {
            observation: self.observations[t].clone(),
            action: self.actions[t],
            behavior_logits: self.behavior_logits[t].clone(),
            value: self.values[t],
            reward: self.rewards[t],
            bonus_reward: self.bonus_rewards[t],
            done: self.dones[t],
            real_done: self.real_dones[t],
            episode_return: self.episode_returns[t],
            episode_step: self.episode_steps[t],
            episode_win: self.episode_wins[t],
            visited_states: self.visited_states[t],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_dimensions() {
        let slot = TrajectorySlot::new(20, 4, 3);
        assert_eq!(slot.rows(), 21);
        assert_eq!(slot.unroll_length(), 20);
        assert_eq!(slot.observations[0].len(), 4);
        assert_eq!(slot.behavior_logits[0].len(), 3);
    }

    #[test]
    fn test_record_roundtrip() {
        let mut slot = TrajectorySlot::new(5, 2, 2);
        let step = StepRecord {
            observation: vec![1.0, 2.0],
            action: 1,
            behavior_logits: vec![0.3, -0.3],
            value: 0.7,
            reward: 1.0,
            bonus_reward: 0.2,
            done: true,
            real_done: false,
            episode_return: 3.5,
            episode_step: 17,
            episode_win: true,
            visited_states: 42,
        };
        slot.record(3, step.clone());
        let back = slot.step_record(3);
        assert_eq!(back.observation, step.observation);
        assert_eq!(back.action, 1);
        assert_eq!(back.value, 0.7);
        assert!(back.done);
        assert!(!back.real_done);
        assert_eq!(back.episode_step, 17);
        assert_eq!(back.visited_states, 42);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_record_out_of_range() {
        let mut slot = TrajectorySlot::new(5, 2, 2);
        slot.record(6, StepRecord::default());
    }
}
