//! Random-network-distillation bonus.
//!
//! A frozen, randomly initialized target network defines an arbitrary but
//! fixed embedding of each state; a predictor network is trained to match
//! it. States the predictor has not yet learned to reproduce are novel, so
//! the bonus is the distillation error and the auxiliary loss is the same
//! quantity minimized over the batch.

use std::sync::Arc;

use crate::batch::Batch;
use crate::bonus::{squared_l2, AuxLoss, BonusModule, TransitionView};
use crate::model::StateEmbedder;

/// RND bonus: distillation error between target and predictor.
pub struct RndBonus {
    target: Arc<dyn StateEmbedder>,
    predictor: Arc<dyn StateEmbedder>,
    distill_cost: f32,
}

impl RndBonus {
    /// Create from the frozen target, the trained predictor, and the
    /// configured distillation-loss weight.
    pub fn new(
        target: Arc<dyn StateEmbedder>,
        predictor: Arc<dyn StateEmbedder>,
        distill_cost: f32,
    ) -> Self {
        Self {
            target,
            predictor,
            distill_cost,
        }
    }

    fn distillation_error(&self, observation: &[f32]) -> f32 {
        let target = self.target.embed(observation);
        let predicted = self.predictor.embed(observation);
        squared_l2(&predicted, &target).sqrt()
    }
}

impl BonusModule for RndBonus {
    fn reward(&mut self, transition: &TransitionView<'_>) -> f32 {
        self.distillation_error(transition.next_observation)
    }

    fn aux_losses(&mut self, batch: &Batch) -> Vec<AuxLoss> {
        let mut total = 0.0f32;
        let mut n = 0usize;
        for b in 0..batch.batch_size() {
            for t in 1..=batch.unroll_length() {
                let target = self.target.embed(&batch.observations[b][t]);
                let predicted = self.predictor.embed(&batch.observations[b][t]);
                total += 0.5 * squared_l2(&predicted, &target);
                n += 1;
            }
        }
        vec![AuxLoss {
            name: "rnd_loss",
            weight: self.distill_cost,
            value: total / n.max(1) as f32,
        }]
    }
}
