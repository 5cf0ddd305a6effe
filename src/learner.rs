//! Learner loop: batch assembly, correction, loss composition, update.
//!
//! Several learner threads may run concurrently: assembly and the model
//! forward pass overlap freely, but gradient application and parameter
//! publication are serialized through one injected critical section, so
//! actors never observe an interleaved partial update.
//!
//! Reward composition follows the collection-time convention: the reward
//! entering the correction is `clamp(extrinsic + coef * intrinsic, -clip,
//! +clip)` (or the scaled intrinsic signal alone in task-free pretraining).
//!
//! A batch element whose correction turns out non-finite is skipped
//! visibly — logged, counted in the metrics, masked out of the update.
//! Only when every element in a batch is degenerate does the learner halt.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use log::{info, warn};
use parking_lot::Mutex;

use crate::batch::{Batch, BatchAssembler};
use crate::bonus::{AuxLoss, BonusModule};
use crate::config::TrainConfig;
use crate::core::policy_slot::PolicySlot;
use crate::error::TrainError;
use crate::metrics::MetricsSink;
use crate::model::{LearnerModel, UnrollOutput, UpdateStats};
use crate::vtrace;

/// Combine extrinsic and scaled intrinsic rewards, before clipping.
pub fn compose_rewards(
    extrinsic: &[f32],
    intrinsic: &[f32],
    intrinsic_coef: f32,
    intrinsic_only: bool,
) -> Vec<f32> {
    debug_assert_eq!(extrinsic.len(), intrinsic.len());
    extrinsic
        .iter()
        .zip(intrinsic)
        .map(|(&r, &b)| {
            if intrinsic_only {
                intrinsic_coef * b
            } else if intrinsic_coef > 0.0 {
                r + intrinsic_coef * b
            } else {
                r
            }
        })
        .collect()
}

/// Clip rewards to the symmetric range `[-clip, clip]`.
pub fn clip_rewards(rewards: &[f32], clip: f32) -> Vec<f32> {
    rewards.iter().map(|&r| r.clamp(-clip, clip)).collect()
}

/// Per-batch corrected targets with a validity mask.
#[derive(Debug, Clone)]
pub struct VtraceTargets {
    /// Corrected value targets, `[B][T]`.
    pub vs: Vec<Vec<f32>>,
    /// Policy-gradient advantages, `[B][T]`.
    pub pg_advantages: Vec<Vec<f32>>,
    /// Whether each element survived the correction.
    pub valid: Vec<bool>,
}

impl VtraceTargets {
    /// Elements skipped as numerically degenerate.
    pub fn degenerate_count(&self) -> usize {
        self.valid.iter().filter(|v| !**v).count()
    }
}

/// Run the off-policy correction for every batch element.
///
/// Elements whose correction is non-finite are skipped visibly (warn log,
/// zeroed targets, `valid = false`). If every element degenerates, the
/// whole step is a [`TrainError::NumericalDegenerate`].
pub fn compute_batch_targets(
    batch: &Batch,
    unroll: &UnrollOutput,
    config: &TrainConfig,
) -> Result<VtraceTargets, TrainError> {
    let batch_size = batch.batch_size();
    let unroll_length = batch.unroll_length();

    let mut targets = VtraceTargets {
        vs: vec![vec![0.0; unroll_length]; batch_size],
        pg_advantages: vec![vec![0.0; unroll_length]; batch_size],
        valid: vec![false; batch_size],
    };

    for b in 0..batch_size {
        // Row j + 1 holds the action/reward produced from observation j,
        // so behavior data comes from rows 1..=T and target data from the
        // unroll at rows 0..T, with the bootstrap at row T.
        let behavior_logits = &batch.behavior_logits[b][1..=unroll_length];
        let target_logits = &unroll.logits[b][..unroll_length];
        let actions = &batch.actions[b][1..=unroll_length];
        let values = &unroll.values[b][..unroll_length];
        let bootstrap_value = unroll.values[b][unroll_length];

        let composed = compose_rewards(
            &batch.rewards[b][1..=unroll_length],
            &batch.bonus_rewards[b][1..=unroll_length],
            config.intrinsic_reward_coef,
            config.intrinsic_only,
        );
        let rewards = clip_rewards(&composed, config.reward_clip);

        let discounts: Vec<f32> = batch.real_dones[b][1..=unroll_length]
            .iter()
            .map(|&real_done| if real_done { 0.0 } else { config.discounting })
            .collect();

        match vtrace::from_logits(
            behavior_logits,
            target_logits,
            actions,
            &rewards,
            &discounts,
            values,
            bootstrap_value,
            config.rho_bar,
            config.c_bar,
        ) {
            Ok(out) => {
                targets.vs[b] = out.vs;
                targets.pg_advantages[b] = out.pg_advantages;
                targets.valid[b] = true;
            }
            Err(e) => {
                warn!("skipping degenerate batch element {}: {}", b, e);
            }
        }
    }

    if targets.degenerate_count() == batch_size {
        return Err(TrainError::NumericalDegenerate(
            "every element of the batch was degenerate".into(),
        ));
    }
    Ok(targets)
}

/// Lifetime statistics a learner thread reports when it stops.
#[derive(Debug, Clone, Copy, Default)]
pub struct LearnerReport {
    /// Learner thread id.
    pub learner_id: usize,
    /// Learning steps completed.
    pub steps: usize,
    /// Batch elements skipped as degenerate.
    pub degenerate_elements: usize,
}

/// One learner thread's training loop.
pub struct LearnerLoop<M: LearnerModel> {
    learner_id: usize,
    config: TrainConfig,
    assembler: BatchAssembler,
    model: Arc<M>,
    policy_slot: Arc<PolicySlot>,
    bonus: Box<dyn BonusModule>,
    frames: Arc<AtomicU64>,
    learn_lock: Arc<Mutex<()>>,
    shutdown: Arc<AtomicBool>,
    sink: Arc<Mutex<Box<dyn MetricsSink>>>,
}

impl<M: LearnerModel> LearnerLoop<M> {
    /// Create one learner thread's loop.
    ///
    /// `learn_lock` is the explicit critical section shared by every
    /// learner thread; the constructor takes it rather than defaulting to
    /// any process-wide lock.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        learner_id: usize,
        config: TrainConfig,
        assembler: BatchAssembler,
        model: Arc<M>,
        policy_slot: Arc<PolicySlot>,
        bonus: Box<dyn BonusModule>,
        frames: Arc<AtomicU64>,
        learn_lock: Arc<Mutex<()>>,
        shutdown: Arc<AtomicBool>,
        sink: Arc<Mutex<Box<dyn MetricsSink>>>,
    ) -> Self {
        Self {
            learner_id,
            config,
            assembler,
            model,
            policy_slot,
            bonus,
            frames,
            learn_lock,
            shutdown,
            sink,
        }
    }

    /// Run until the frame target, a shutdown sentinel, or a fatal error.
    pub fn run(mut self) -> Result<LearnerReport, TrainError> {
        let mut report = LearnerReport {
            learner_id: self.learner_id,
            ..Default::default()
        };

        while self.frames.load(Ordering::Acquire) < self.config.total_frames
            && !self.shutdown.load(Ordering::Acquire)
        {
            let Some((batch, _indices)) = self.assembler.assemble() else {
                break;
            };

            // Forward pass and correction run outside the critical section.
            let unroll = self.model.unroll(&batch);
            let targets = compute_batch_targets(&batch, &unroll, &self.config)?;
            report.degenerate_elements += targets.degenerate_count();
            let aux = self.bonus.aux_losses(&batch);
            let lr = self
                .config
                .lr_schedule
                .lr_at(self.frames.load(Ordering::Acquire));

            let (stats, frames_now, policy_version) = {
                let _guard = self.learn_lock.lock();
                let stats = self.model.apply_update(&batch, &targets, &aux, lr);
                let version = self.policy_slot.publish(self.model.snapshot());
                let frames_now = self
                    .frames
                    .fetch_add(self.config.frames_per_step(), Ordering::AcqRel)
                    + self.config.frames_per_step();
                (stats, frames_now, version)
            };
            report.steps += 1;

            let metrics = step_metrics(
                &batch,
                &targets,
                &stats,
                &aux,
                lr,
                &self.config,
                policy_version,
            );
            self.sink.lock().record(frames_now, &metrics);
        }

        info!(
            "learner {} stopped after {} steps",
            self.learner_id, report.steps
        );
        Ok(report)
    }
}

/// Flatten one learning step into `name → scalar` metrics.
fn step_metrics(
    batch: &Batch,
    targets: &VtraceTargets,
    stats: &UpdateStats,
    aux: &[AuxLoss],
    lr: f64,
    config: &TrainConfig,
    policy_version: u64,
) -> Vec<(&'static str, f64)> {
    let batch_size = batch.batch_size();
    let unroll_length = batch.unroll_length();

    let mut episodes = 0usize;
    let mut return_sum = 0.0f64;
    let mut length_sum = 0.0f64;
    let mut wins = 0usize;
    let mut visited_max = 0u64;
    let mut extrinsic_sum = 0.0f64;
    let mut intrinsic_sum = 0.0f64;
    let mut total_sum = 0.0f64;
    let mut steps = 0usize;

    for b in 0..batch_size {
        for t in 1..=unroll_length {
            if batch.dones[b][t] {
                episodes += 1;
                return_sum += batch.episode_returns[b][t] as f64;
                length_sum += batch.episode_steps[b][t] as f64;
                if batch.episode_wins[b][t] {
                    wins += 1;
                }
            }
            visited_max = visited_max.max(batch.visited_states[b][t]);
            let extrinsic = batch.rewards[b][t] as f64;
            let intrinsic = (config.intrinsic_reward_coef * batch.bonus_rewards[b][t]) as f64;
            extrinsic_sum += extrinsic;
            intrinsic_sum += intrinsic;
            total_sum += if config.intrinsic_only {
                intrinsic
            } else {
                extrinsic + intrinsic
            };
            steps += 1;
        }
    }
    let steps = steps.max(1) as f64;

    let baseline_loss = config.baseline_cost * stats.baseline_loss;
    let entropy_loss = config.entropy_cost * stats.entropy_loss;
    let aux_total: f32 = aux.iter().map(AuxLoss::weighted).sum();
    let total_loss = stats.pg_loss + baseline_loss + entropy_loss + aux_total;

    let mut metrics: Vec<(&'static str, f64)> = vec![
        ("total_loss", total_loss as f64),
        ("pg_loss", stats.pg_loss as f64),
        ("baseline_loss", baseline_loss as f64),
        ("entropy_loss", entropy_loss as f64),
        ("total_episodes", episodes as f64),
        (
            "mean_episode_return",
            if episodes > 0 {
                return_sum / episodes as f64
            } else {
                0.0
            },
        ),
        (
            "mean_episode_length",
            if episodes > 0 {
                length_sum / episodes as f64
            } else {
                0.0
            },
        ),
        ("episode_win_rate", wins as f64 / batch_size.max(1) as f64),
        ("visited_states", visited_max as f64),
        ("mean_extrinsic_reward", extrinsic_sum / steps),
        ("mean_intrinsic_reward", intrinsic_sum / steps),
        ("mean_total_reward", total_sum / steps),
        ("degenerate_elements", targets.degenerate_count() as f64),
        ("learning_rate", lr),
        ("policy_version", policy_version as f64),
    ];
    for loss in aux {
        metrics.push((loss.name, loss.weighted() as f64));
    }
    metrics
}
