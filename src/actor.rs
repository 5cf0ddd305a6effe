//! Actor worker: collects fixed-length trajectory segments.
//!
//! Each worker cycles `acquire slot → unroll T environment steps → publish`
//! until it receives a shutdown sentinel from the free queue. The policy
//! snapshot is read once per segment, so a segment's behavior policy may be
//! several updates behind the learner by the time it is consumed — the
//! off-policy correction exists precisely for that gap.
//!
//! An environment error is fatal for the worker: the partially written slot
//! goes back to the free queue unpublished and the worker reports
//! [`TrainError::WorkerFatal`]. It is not restarted.

use std::sync::Arc;

use log::{debug, info};

use crate::bonus::{BonusModule, TransitionView};
use crate::core::buffer_pool::{BufferPool, Ticket};
use crate::core::episode_state::EpisodeState;
use crate::core::policy_slot::PolicySlot;
use crate::core::slot::StepRecord;
use crate::core::state_carry::StateCarry;
use crate::env::Environment;
use crate::error::TrainError;
use crate::model::Policy;

/// Sample an action index from unnormalized logits.
pub fn sample_logits(logits: &[f32]) -> u32 {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&l| (l - max).exp()).collect();
    let total: f32 = exps.iter().sum();
    let mut r = fastrand::f32() * total;
    for (i, &p) in exps.iter().enumerate() {
        r -= p;
        if r <= 0.0 {
            return i as u32;
        }
    }
    (logits.len() - 1) as u32
}

/// Lifetime statistics a worker reports when it stops.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActorReport {
    /// Worker id.
    pub actor_id: usize,
    /// Segments published.
    pub segments: usize,
    /// Episodes completed.
    pub episodes: usize,
    /// Environment steps taken.
    pub steps: u64,
}

/// One parallel simulation stream.
pub struct ActorWorker<E: Environment> {
    actor_id: usize,
    unroll_length: usize,
    env: E,
    pool: Arc<BufferPool>,
    policy_slot: Arc<PolicySlot>,
    carry: Arc<StateCarry>,
    exploration_carry: Option<Arc<StateCarry>>,
    exploration_policy: Option<Arc<dyn Policy>>,
    bonus: Box<dyn BonusModule>,
}

impl<E: Environment> ActorWorker<E> {
    /// Create a worker over its own environment instance.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        actor_id: usize,
        unroll_length: usize,
        env: E,
        pool: Arc<BufferPool>,
        policy_slot: Arc<PolicySlot>,
        carry: Arc<StateCarry>,
        exploration_carry: Option<Arc<StateCarry>>,
        exploration_policy: Option<Arc<dyn Policy>>,
        bonus: Box<dyn BonusModule>,
    ) -> Self {
        Self {
            actor_id,
            unroll_length,
            env,
            pool,
            policy_slot,
            carry,
            exploration_carry,
            exploration_policy,
            bonus,
        }
    }

    /// Run until a shutdown sentinel or a fatal environment error.
    pub fn run(mut self) -> Result<ActorReport, TrainError> {
        let mut report = ActorReport {
            actor_id: self.actor_id,
            ..Default::default()
        };

        let fatal = |actor_id: usize, e: crate::env::EnvError| TrainError::WorkerFatal {
            actor_id,
            reason: e.to_string(),
        };

        let n_actions = self.env.n_actions();
        let mut obs = self.env.reset().map_err(|e| fatal(self.actor_id, e))?;

        // Boundary row carried into row 0 of the next segment.
        let mut boundary = StepRecord {
            observation: obs.clone(),
            behavior_logits: vec![0.0; n_actions],
            ..Default::default()
        };
        let mut episode_return = 0.0f32;
        let mut episode_step = 0u32;
        let mut episode_win = false;

        loop {
            let idx = match self.pool.acquire_free() {
                Ticket::Slot(idx) => idx,
                Ticket::Shutdown => {
                    debug!("actor {} received shutdown sentinel", self.actor_id);
                    break;
                }
            };

            let (policy, _version) = self.policy_slot.snapshot();
            let mut state = self.carry.load(idx);
            let mut exploration_state = self.exploration_carry.as_ref().map(|c| c.load(idx));

            {
                let mut slot = self.pool.slot(idx);
                slot.initial_state = state.clone();
                slot.initial_exploration_state = exploration_state.clone();
                slot.record(0, boundary.clone());
            }

            for t in 1..=self.unroll_length {
                let exploration_logits = match (&self.exploration_policy, exploration_state.as_mut())
                {
                    (Some(explorer), Some(es)) => {
                        let out = explorer.step(&obs, es, None);
                        *es = out.state;
                        Some(out.logits)
                    }
                    _ => None,
                };

                let out = policy.step(&obs, &state, exploration_logits.as_deref());
                state = out.state;
                let action = sample_logits(&out.logits);

                let step = match self.env.step(action) {
                    Ok(step) => step,
                    Err(e) => {
                        // The partial segment is unusable; return the slot
                        // unpublished so no index leaks.
                        self.pool.abort(idx);
                        return Err(fatal(self.actor_id, e));
                    }
                };
                report.steps += 1;

                let bonus_reward = self.bonus.reward(&TransitionView {
                    observation: &obs,
                    action,
                    next_observation: &step.observation,
                });

                episode_step += 1;
                episode_return += step.reward;
                if step.reward > 0.0 {
                    episode_win = true;
                }

                let episode = EpisodeState::from_flags(step.terminated, step.truncated);

                if episode.is_done() {
                    report.episodes += 1;
                    self.bonus.on_episode_end();
                    if episode.resets_carry() {
                        state = policy.initial_state();
                        if let (Some(explorer), Some(es)) =
                            (&self.exploration_policy, exploration_state.as_mut())
                        {
                            *es = explorer.initial_state();
                        }
                    }
                    obs = match self.env.reset() {
                        Ok(o) => o,
                        Err(e) => {
                            self.pool.abort(idx);
                            return Err(fatal(self.actor_id, e));
                        }
                    };
                } else {
                    obs = step.observation.clone();
                }

                // The stored observation is the next policy input: the fresh
                // episode's first frame when this step ended the episode.
                self.pool.slot(idx).record(
                    t,
                    StepRecord {
                        observation: obs.clone(),
                        action,
                        behavior_logits: out.logits,
                        value: out.value,
                        reward: step.reward,
                        bonus_reward,
                        done: episode.is_done(),
                        real_done: episode.is_terminal(),
                        episode_return,
                        episode_step,
                        episode_win,
                        visited_states: self.bonus.visited_states(),
                    },
                );

                if episode.is_done() {
                    episode_return = 0.0;
                    episode_step = 0;
                    episode_win = false;
                }
            }

            // Snapshot the segment-end state into the carry table, then keep
            // the last row as the next segment's boundary.
            self.carry.store(idx, state.clone());
            if let (Some(carry), Some(es)) = (&self.exploration_carry, exploration_state.as_ref())
            {
                carry.store(idx, es.clone());
            }
            boundary = self.pool.slot(idx).step_record(self.unroll_length);

            self.pool.publish_full(idx);
            report.segments += 1;
        }

        info!(
            "actor {} stopped after {} segments ({} episodes, {} steps)",
            self.actor_id, report.segments, report.episodes, report.steps
        );
        Ok(report)
    }
}
