//! Intrinsic exploration bonuses.
//!
//! Every variant satisfies one contract: a non-negative scalar reward per
//! transition, a per-episode reset hook, and whatever auxiliary losses the
//! variant needs optimized. The buffer/correction core treats all variants
//! uniformly through [`BonusModule`]; variant selection happens exactly once
//! at startup via [`BonusKind`] and [`build_bonus`].
//!
//! Variants:
//! - `count` — visitation-frequency bonus, decaying as `N(s)^(-1/2)`.
//! - `curiosity` — forward-dynamics prediction error in embedding space.
//! - `rnd` — distillation error between a frozen random target network and
//!   a trained predictor.
//! - `episodic` — elliptical novelty against a per-episode memory of
//!   embedded states, reset every episode.
//! - `combined` — sum or product of two base variants.

pub mod combined;
pub mod count;
pub mod curiosity;
pub mod episodic;
pub mod rnd;

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::batch::Batch;
use crate::config::TrainConfig;
use crate::error::TrainError;
use crate::model::{ForwardDynamics, InverseDynamics, StateEmbedder};

pub use combined::{CombinedBonus, CombineOp};
pub use count::CountBonus;
pub use curiosity::CuriosityBonus;
pub use episodic::EpisodicNovelty;
pub use rnd::RndBonus;

/// One observed transition, borrowed from the actor's working buffers.
#[derive(Debug, Clone, Copy)]
pub struct TransitionView<'a> {
    /// Observation before the action.
    pub observation: &'a [f32],
    /// Action taken.
    pub action: u32,
    /// Observation after the action.
    pub next_observation: &'a [f32],
}

/// A named auxiliary objective a bonus variant needs optimized.
#[derive(Debug, Clone)]
pub struct AuxLoss {
    /// Metric name, e.g. `forward_dynamics_loss`.
    pub name: &'static str,
    /// Configured weight folded into the total objective.
    pub weight: f32,
    /// Unweighted loss value.
    pub value: f32,
}

impl AuxLoss {
    /// The weighted contribution to the total loss.
    pub fn weighted(&self) -> f32 {
        self.weight * self.value
    }
}

/// Uniform contract every bonus variant satisfies toward the core.
///
/// Actors call `reward` per environment step and `on_episode_end` at
/// episode boundaries; the learner calls `aux_losses` per batch. The core
/// never special-cases a variant's internals.
pub trait BonusModule: Send {
    /// Non-negative intrinsic reward for one transition.
    fn reward(&mut self, transition: &TransitionView<'_>) -> f32;

    /// Reset any per-episode memory. Called at every episode boundary.
    fn on_episode_end(&mut self) {}

    /// Auxiliary objectives for the learner to fold into the total loss.
    fn aux_losses(&mut self, _batch: &Batch) -> Vec<AuxLoss> {
        Vec::new()
    }

    /// Distinct states visited, when the variant tracks them.
    fn visited_states(&self) -> u64 {
        0
    }
}

/// The no-op bonus used by the vanilla baseline.
#[derive(Debug, Default)]
pub struct NoBonus;

impl BonusModule for NoBonus {
    fn reward(&mut self, _transition: &TransitionView<'_>) -> f32 {
        0.0
    }
}

/// Base bonus variants that can stand alone or be combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseBonusKind {
    /// Visitation-count bonus.
    Count,
    /// Forward-dynamics curiosity.
    Curiosity,
    /// Random-network distillation.
    Rnd,
    /// Per-episode elliptical novelty.
    Episodic,
}

/// Bonus variant selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BonusKind {
    /// Vanilla baseline, no intrinsic reward.
    None,
    /// Visitation-count bonus.
    Count,
    /// Forward-dynamics curiosity.
    Curiosity,
    /// Random-network distillation.
    Rnd,
    /// Per-episode elliptical novelty.
    Episodic,
    /// Two base variants combined by sum or product.
    Combined {
        /// First component.
        first: BaseBonusKind,
        /// Second component.
        second: BaseBonusKind,
        /// How the two scalars combine.
        op: CombineOp,
    },
}

/// External networks the bonus variants draw on.
///
/// Only the networks a selected variant actually needs must be present;
/// the builder rejects incomplete combinations at startup.
#[derive(Clone, Default)]
pub struct BonusNetworks {
    /// State-embedding network (curiosity, episodic).
    pub embedder: Option<Arc<dyn StateEmbedder>>,
    /// Forward-dynamics network (curiosity).
    pub forward_dynamics: Option<Arc<dyn ForwardDynamics>>,
    /// Inverse-dynamics network (curiosity, episodic).
    pub inverse_dynamics: Option<Arc<dyn InverseDynamics>>,
    /// Frozen random target network (rnd).
    pub rnd_target: Option<Arc<dyn StateEmbedder>>,
    /// Trained predictor network (rnd).
    pub rnd_predictor: Option<Arc<dyn StateEmbedder>>,
}

impl BonusNetworks {
    fn embedder(&self, variant: &str) -> Result<Arc<dyn StateEmbedder>, TrainError> {
        self.embedder.clone().ok_or_else(|| {
            TrainError::Config(format!("{} bonus requires a state-embedding network", variant))
        })
    }

    fn forward(&self, variant: &str) -> Result<Arc<dyn ForwardDynamics>, TrainError> {
        self.forward_dynamics.clone().ok_or_else(|| {
            TrainError::Config(format!("{} bonus requires a forward-dynamics network", variant))
        })
    }

    fn inverse(&self, variant: &str) -> Result<Arc<dyn InverseDynamics>, TrainError> {
        self.inverse_dynamics.clone().ok_or_else(|| {
            TrainError::Config(format!("{} bonus requires an inverse-dynamics network", variant))
        })
    }

    fn rnd_pair(
        &self,
        variant: &str,
    ) -> Result<(Arc<dyn StateEmbedder>, Arc<dyn StateEmbedder>), TrainError> {
        match (self.rnd_target.clone(), self.rnd_predictor.clone()) {
            (Some(target), Some(predictor)) => Ok((target, predictor)),
            _ => Err(TrainError::Config(format!(
                "{} bonus requires both a random target and a predictor network",
                variant
            ))),
        }
    }
}

fn build_base(
    kind: BaseBonusKind,
    nets: &BonusNetworks,
    config: &TrainConfig,
) -> Result<Box<dyn BonusModule>, TrainError> {
    match kind {
        BaseBonusKind::Count => Ok(Box::new(CountBonus::new(config.count_resolution))),
        BaseBonusKind::Curiosity => Ok(Box::new(CuriosityBonus::new(
            nets.embedder("curiosity")?,
            nets.forward("curiosity")?,
            nets.inverse("curiosity")?,
            config.forward_loss_coef,
            config.inverse_loss_coef,
        ))),
        BaseBonusKind::Rnd => {
            let (target, predictor) = nets.rnd_pair("rnd")?;
            Ok(Box::new(RndBonus::new(target, predictor, config.rnd_loss_coef)))
        }
        BaseBonusKind::Episodic => Ok(Box::new(EpisodicNovelty::new(
            nets.embedder("episodic")?,
            nets.inverse("episodic")?,
            config.episodic_ridge,
            config.inverse_loss_coef,
        ))),
    }
}

/// Build the bonus module a configuration selects.
///
/// Missing external networks are a [`TrainError::Config`], raised before
/// any worker spawns.
pub fn build_bonus(
    kind: BonusKind,
    nets: &BonusNetworks,
    config: &TrainConfig,
) -> Result<Box<dyn BonusModule>, TrainError> {
    match kind {
        BonusKind::None => Ok(Box::new(NoBonus)),
        BonusKind::Count => build_base(BaseBonusKind::Count, nets, config),
        BonusKind::Curiosity => build_base(BaseBonusKind::Curiosity, nets, config),
        BonusKind::Rnd => build_base(BaseBonusKind::Rnd, nets, config),
        BonusKind::Episodic => build_base(BaseBonusKind::Episodic, nets, config),
        BonusKind::Combined { first, second, op } => {
            let first = build_base(first, nets, config)?;
            let second = build_base(second, nets, config)?;
            Ok(Box::new(CombinedBonus::new(first, second, op)))
        }
    }
}

/// Squared L2 distance between two equal-length vectors.
pub(crate) fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}
