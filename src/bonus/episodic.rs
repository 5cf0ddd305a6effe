//! Per-episode elliptical novelty bonus.
//!
//! Maintains the inverse covariance `C⁻¹` of the embedded states visited in
//! the current episode, seeded as `(1/λ)·I`. The bonus for a new embedding
//! `e` is the elliptical distance `b = eᵀ C⁻¹ e`, after which `C⁻¹` absorbs
//! `e` via a Sherman–Morrison rank-one update:
//!
//! ```text
//! u = C⁻¹ e
//! b = eᵀ u
//! C⁻¹ ← C⁻¹ − u uᵀ / (1 + b)
//! ```
//!
//! The memory resets at every episode boundary, so revisiting a direction
//! within an episode pays less and less while a fresh episode starts novel
//! again. `b` is non-negative because `C⁻¹` stays positive definite.
//!
//! The embedding itself is trained through an inverse-dynamics objective,
//! exposed as this variant's auxiliary loss.

use std::sync::Arc;

use crate::batch::Batch;
use crate::bonus::{AuxLoss, BonusModule, TransitionView};
use crate::model::{InverseDynamics, StateEmbedder};
use crate::vtrace::log_softmax;

/// Elliptical episodic-novelty bonus.
pub struct EpisodicNovelty {
    embedder: Arc<dyn StateEmbedder>,
    inverse: Arc<dyn InverseDynamics>,
    ridge: f32,
    inverse_cost: f32,
    /// Inverse covariance of this episode's embeddings, `dim x dim`.
    inv_cov: Vec<Vec<f32>>,
}

impl EpisodicNovelty {
    /// Create with a ridge regularizer `λ > 0` seeding `C⁻¹ = (1/λ)·I`.
    pub fn new(
        embedder: Arc<dyn StateEmbedder>,
        inverse: Arc<dyn InverseDynamics>,
        ridge: f32,
        inverse_cost: f32,
    ) -> Self {
        let dim = embedder.dim();
        let mut this = Self {
            embedder,
            inverse,
            ridge,
            inverse_cost,
            inv_cov: vec![vec![0.0; dim]; dim],
        };
        this.reset_memory();
        this
    }

    fn reset_memory(&mut self) {
        let dim = self.inv_cov.len();
        let seed = 1.0 / self.ridge;
        for i in 0..dim {
            for j in 0..dim {
                self.inv_cov[i][j] = if i == j { seed } else { 0.0 };
            }
        }
    }

    /// Elliptical bonus for an embedding, updating the memory in place.
    fn elliptical_bonus(&mut self, embedding: &[f32]) -> f32 {
        let dim = self.inv_cov.len();
        debug_assert_eq!(embedding.len(), dim);

        // u = C⁻¹ e
        let u: Vec<f32> = (0..dim)
            .map(|i| {
                self.inv_cov[i]
                    .iter()
                    .zip(embedding)
                    .map(|(c, e)| c * e)
                    .sum()
            })
            .collect();
        // b = eᵀ u
        let b: f32 = embedding.iter().zip(&u).map(|(e, v)| e * v).sum();

        // Rank-one downdate.
        let denom = 1.0 + b;
        for i in 0..dim {
            for j in 0..dim {
                self.inv_cov[i][j] -= u[i] * u[j] / denom;
            }
        }

        b.max(0.0)
    }
}

impl BonusModule for EpisodicNovelty {
    fn reward(&mut self, transition: &TransitionView<'_>) -> f32 {
        let embedding = self.embedder.embed(transition.next_observation);
        self.elliptical_bonus(&embedding)
    }

    fn on_episode_end(&mut self) {
        self.reset_memory();
    }

    fn aux_losses(&mut self, batch: &Batch) -> Vec<AuxLoss> {
        let mut total = 0.0f32;
        let mut n = 0usize;
        for b in 0..batch.batch_size() {
            for t in 0..batch.unroll_length() {
                let embedding = self.embedder.embed(&batch.observations[b][t]);
                let next_embedding = self.embedder.embed(&batch.observations[b][t + 1]);
                let action = batch.actions[b][t + 1];
                let logits = self.inverse.action_logits(&embedding, &next_embedding);
                total += -log_softmax(&logits)[action as usize];
                n += 1;
            }
        }
        vec![AuxLoss {
            name: "inverse_dynamics_loss",
            weight: self.inverse_cost,
            value: total / n.max(1) as f32,
        }]
    }
}
