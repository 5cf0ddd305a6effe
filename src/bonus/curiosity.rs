//! Forward-dynamics curiosity bonus.
//!
//! The bonus is the forward model's prediction error in embedding space:
//! transitions the dynamics model cannot yet predict are novel. The
//! embedding itself is shaped by an inverse-dynamics objective so it keeps
//! only features the agent can influence.

use std::sync::Arc;

use crate::batch::Batch;
use crate::bonus::{squared_l2, AuxLoss, BonusModule, TransitionView};
use crate::model::{ForwardDynamics, InverseDynamics, StateEmbedder};
use crate::vtrace::log_softmax;

/// Curiosity bonus driven by external embedding and dynamics networks.
pub struct CuriosityBonus {
    embedder: Arc<dyn StateEmbedder>,
    forward: Arc<dyn ForwardDynamics>,
    inverse: Arc<dyn InverseDynamics>,
    forward_cost: f32,
    inverse_cost: f32,
}

impl CuriosityBonus {
    /// Create from the external networks and the configured loss weights.
    pub fn new(
        embedder: Arc<dyn StateEmbedder>,
        forward: Arc<dyn ForwardDynamics>,
        inverse: Arc<dyn InverseDynamics>,
        forward_cost: f32,
        inverse_cost: f32,
    ) -> Self {
        Self {
            embedder,
            forward,
            inverse,
            forward_cost,
            inverse_cost,
        }
    }
}

impl BonusModule for CuriosityBonus {
    fn reward(&mut self, transition: &TransitionView<'_>) -> f32 {
        let embedding = self.embedder.embed(transition.observation);
        let next_embedding = self.embedder.embed(transition.next_observation);
        let predicted = self.forward.predict(&embedding, transition.action);
        0.5 * squared_l2(&predicted, &next_embedding)
    }

    fn aux_losses(&mut self, batch: &Batch) -> Vec<AuxLoss> {
        let mut forward_total = 0.0f32;
        let mut inverse_total = 0.0f32;
        let mut n = 0usize;

        for b in 0..batch.batch_size() {
            for t in 0..batch.unroll_length() {
                let embedding = self.embedder.embed(&batch.observations[b][t]);
                let next_embedding = self.embedder.embed(&batch.observations[b][t + 1]);
                let action = batch.actions[b][t + 1];

                let predicted = self.forward.predict(&embedding, action);
                forward_total += 0.5 * squared_l2(&predicted, &next_embedding);

                let logits = self.inverse.action_logits(&embedding, &next_embedding);
                inverse_total += -log_softmax(&logits)[action as usize];
                n += 1;
            }
        }

        let n = n.max(1) as f32;
        vec![
            AuxLoss {
                name: "forward_dynamics_loss",
                weight: self.forward_cost,
                value: forward_total / n,
            },
            AuxLoss {
                name: "inverse_dynamics_loss",
                weight: self.inverse_cost,
                value: inverse_total / n,
            },
        ]
    }
}
