//! Run configuration.
//!
//! Every numeric hyperparameter of the training loop lives here; argument
//! parsing is the caller's concern. The whole struct serializes into the
//! checkpoint so a run can be reconstructed from its artifacts.
//!
//! Validation happens once, before any worker thread is spawned; an invalid
//! combination is a [`TrainError::Config`], never a runtime surprise.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::bonus::BonusKind;
use crate::error::TrainError;
use crate::scheduling::LrSchedule;

/// Full hyperparameter set for one training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    /// Stop after this many environment frames.
    pub total_frames: u64,
    /// Steps collected per trajectory segment (T).
    pub unroll_length: usize,
    /// Segments per training batch (B).
    pub batch_size: usize,
    /// Trajectory slots in the pool (N).
    pub num_buffers: usize,
    /// Parallel actor workers.
    pub num_actors: usize,
    /// Learner threads sharing the model.
    pub num_learner_threads: usize,

    /// Discount factor.
    pub discounting: f32,
    /// Importance-weight clip (rho_bar).
    pub rho_bar: f32,
    /// Trace-cutting clip (c_bar).
    pub c_bar: f32,
    /// Combined rewards are clipped to `[-reward_clip, reward_clip]`.
    pub reward_clip: f32,

    /// Scale applied to intrinsic rewards before summing with extrinsic.
    pub intrinsic_reward_coef: f32,
    /// Train on the intrinsic signal alone (task-free pretraining).
    pub intrinsic_only: bool,

    /// Weight of the value-function loss.
    pub baseline_cost: f32,
    /// Weight of the entropy bonus.
    pub entropy_cost: f32,
    /// Weight of the forward-dynamics auxiliary loss.
    pub forward_loss_coef: f32,
    /// Weight of the inverse-dynamics auxiliary loss.
    pub inverse_loss_coef: f32,
    /// Weight of the RND distillation loss.
    pub rnd_loss_coef: f32,

    /// Observation quantization scale for the count bonus.
    pub count_resolution: f32,
    /// Ridge regularizer seeding the episodic inverse covariance.
    pub episodic_ridge: f32,

    /// Which intrinsic bonus drives exploration.
    pub bonus: BonusKind,
    /// Learning-rate schedule.
    pub lr_schedule: LrSchedule,

    /// Wall-clock seconds between checkpoint saves.
    pub checkpoint_interval_secs: u64,
    /// Where to write checkpoints; `None` disables checkpointing.
    pub checkpoint_path: Option<PathBuf>,
    /// Checkpoint holding a pretrained exploration policy. Only valid for
    /// bonus variants that define one.
    pub exploration_checkpoint: Option<PathBuf>,
    /// Bound on the per-actor join wait at shutdown.
    pub join_timeout_secs: u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            total_frames: 30_000_000,
            unroll_length: 80,
            batch_size: 32,
            num_buffers: 64,
            num_actors: 4,
            num_learner_threads: 2,
            discounting: 0.99,
            rho_bar: 1.0,
            c_bar: 1.0,
            reward_clip: 1.0,
            intrinsic_reward_coef: 0.5,
            intrinsic_only: false,
            baseline_cost: 0.5,
            entropy_cost: 0.0005,
            forward_loss_coef: 10.0,
            inverse_loss_coef: 0.1,
            rnd_loss_coef: 0.1,
            count_resolution: 1000.0,
            episodic_ridge: 0.1,
            bonus: BonusKind::None,
            lr_schedule: LrSchedule::default(),
            checkpoint_interval_secs: 600,
            checkpoint_path: None,
            exploration_checkpoint: None,
            join_timeout_secs: 10,
        }
    }
}

impl TrainConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the total frame count to train for.
    pub fn with_total_frames(mut self, frames: u64) -> Self {
        self.total_frames = frames;
        self
    }

    /// Set the unroll length.
    pub fn with_unroll_length(mut self, unroll_length: usize) -> Self {
        self.unroll_length = unroll_length;
        self
    }

    /// Set the batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the pool size.
    pub fn with_num_buffers(mut self, num_buffers: usize) -> Self {
        self.num_buffers = num_buffers;
        self
    }

    /// Set the actor count.
    pub fn with_num_actors(mut self, num_actors: usize) -> Self {
        self.num_actors = num_actors;
        self
    }

    /// Set the learner thread count.
    pub fn with_num_learner_threads(mut self, n: usize) -> Self {
        self.num_learner_threads = n;
        self
    }

    /// Set the discount factor.
    pub fn with_discounting(mut self, discounting: f32) -> Self {
        self.discounting = discounting;
        self
    }

    /// Set both clipping constants.
    pub fn with_clipping(mut self, rho_bar: f32, c_bar: f32) -> Self {
        self.rho_bar = rho_bar;
        self.c_bar = c_bar;
        self
    }

    /// Set the intrinsic-reward coefficient.
    pub fn with_intrinsic_reward_coef(mut self, coef: f32) -> Self {
        self.intrinsic_reward_coef = coef;
        self
    }

    /// Select the bonus variant.
    pub fn with_bonus(mut self, bonus: BonusKind) -> Self {
        self.bonus = bonus;
        self
    }

    /// Set the learning-rate schedule.
    pub fn with_lr_schedule(mut self, schedule: LrSchedule) -> Self {
        self.lr_schedule = schedule;
        self
    }

    /// Enable checkpointing to a path.
    pub fn with_checkpoint_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.checkpoint_path = Some(path.into());
        self
    }

    /// Frames produced by one learning step.
    pub fn frames_per_step(&self) -> u64 {
        (self.unroll_length * self.batch_size) as u64
    }

    /// Reject invalid combinations before any worker spawns.
    pub fn validate(&self) -> Result<(), TrainError> {
        let fail = |msg: String| Err(TrainError::Config(msg));

        if self.unroll_length == 0 {
            return fail("unroll_length must be >= 1".into());
        }
        if self.batch_size == 0 {
            return fail("batch_size must be >= 1".into());
        }
        if self.num_actors == 0 {
            return fail("num_actors must be >= 1".into());
        }
        if self.num_learner_threads == 0 {
            return fail("num_learner_threads must be >= 1".into());
        }
        if self.num_buffers < self.batch_size {
            return fail(format!(
                "num_buffers ({}) must be >= batch_size ({}), or assembly deadlocks",
                self.num_buffers, self.batch_size
            ));
        }
        if self.num_buffers < self.num_actors {
            return fail(format!(
                "num_buffers ({}) must be >= num_actors ({}) so every actor can hold a slot",
                self.num_buffers, self.num_actors
            ));
        }
        if !(0.0..=1.0).contains(&self.discounting) {
            return fail(format!("discounting must be in [0, 1], got {}", self.discounting));
        }
        if !(self.rho_bar >= self.c_bar && self.c_bar >= 1.0) {
            return fail(format!(
                "clipping constants must satisfy rho_bar >= c_bar >= 1, got rho_bar={} c_bar={}",
                self.rho_bar, self.c_bar
            ));
        }
        if !(self.reward_clip > 0.0) {
            return fail(format!("reward_clip must be > 0, got {}", self.reward_clip));
        }
        if !(self.intrinsic_reward_coef >= 0.0) {
            return fail(format!(
                "intrinsic_reward_coef must be >= 0, got {}",
                self.intrinsic_reward_coef
            ));
        }
        if self.intrinsic_only && self.bonus == BonusKind::None {
            return fail("intrinsic_only requires a bonus variant".into());
        }
        if self.exploration_checkpoint.is_some() && self.bonus == BonusKind::None {
            return fail(
                "an exploration checkpoint was supplied but the selected variant defines no \
                 exploration model"
                    .into(),
            );
        }
        if let Err(msg) = self.lr_schedule.validate() {
            return fail(msg);
        }
        Ok(())
    }
}
