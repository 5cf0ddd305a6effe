//! External model contracts.
//!
//! Network architectures live outside this crate; the training loop only
//! fixes their tensor interfaces. All tensors are plain `f32` vectors with
//! explicit batch/time layout, so implementations are free to back them with
//! any framework.
//!
//! - [`Policy`]: the actor-side snapshot used to generate behavior.
//! - [`LearnerModel`]: the trainable model the learner drives.
//! - [`StateEmbedder`], [`ForwardDynamics`], [`InverseDynamics`]: the
//!   embedding and dynamics networks consumed by bonus modules.
//! - [`ModuleStates`]: opaque per-module parameter blobs for checkpointing.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::batch::Batch;
use crate::bonus::AuxLoss;
use crate::learner::VtraceTargets;

/// Flattened recurrent hidden state of a policy.
///
/// Empty for feed-forward policies; the core never inspects the contents,
/// only carries them between segments.
pub type PolicyState = Vec<f32>;

/// Output of a single-step policy forward pass.
#[derive(Debug, Clone)]
pub struct PolicyStep {
    /// Unnormalized action-distribution logits.
    pub logits: Vec<f32>,
    /// Value estimate for the input observation.
    pub value: f32,
    /// Updated recurrent state.
    pub state: PolicyState,
}

/// Behavior-policy contract read by actor workers.
///
/// A snapshot is immutable once published; actors read one `Arc` per
/// segment, which is exactly the staleness the off-policy correction
/// accounts for.
pub trait Policy: Send + Sync {
    /// The recurrent state a fresh episode starts from.
    fn initial_state(&self) -> PolicyState;

    /// One forward step. `exploration_logits`, when present, are the logits
    /// of an auxiliary exploration policy conditioning the main policy.
    fn step(
        &self,
        observation: &[f32],
        state: &PolicyState,
        exploration_logits: Option<&[f32]>,
    ) -> PolicyStep;
}

/// Target-policy outputs for a full batch unroll.
///
/// Row `t` in `logits`/`values` corresponds to the observation at timestep
/// `t` of the segment (0-based, `T + 1` rows per element). The last value
/// row is the bootstrap value.
#[derive(Debug, Clone)]
pub struct UnrollOutput {
    /// Logits, `[batch][T + 1][n_actions]`.
    pub logits: Vec<Vec<Vec<f32>>>,
    /// Value estimates, `[batch][T + 1]`.
    pub values: Vec<Vec<f32>>,
}

/// Scalar loss components reported back from a parameter update.
///
/// Values are unweighted; the learner applies the configured costs when
/// composing the total objective.
#[derive(Debug, Clone, Default)]
pub struct UpdateStats {
    /// Policy-gradient loss.
    pub pg_loss: f32,
    /// Value-function (baseline) loss.
    pub baseline_loss: f32,
    /// Entropy of the target policy (reported as a loss term).
    pub entropy_loss: f32,
    /// Global gradient norm, if the implementation tracks one.
    pub grad_norm: Option<f32>,
}

/// Trainable-model contract driven by the learner loop.
///
/// `unroll` and `snapshot` may be called concurrently from several learner
/// threads; `apply_update` is only ever called inside the learner's global
/// critical section.
pub trait LearnerModel: Send + Sync {
    /// Recompute policy outputs for every timestep of the batch under the
    /// current parameters, starting from the recorded segment-start states.
    fn unroll(&self, batch: &Batch) -> UnrollOutput;

    /// Apply one gradient step for the composed objective. The V-trace
    /// targets carry a per-element validity mask; skipped elements must not
    /// contribute to the update.
    fn apply_update(
        &self,
        batch: &Batch,
        targets: &VtraceTargets,
        aux_losses: &[AuxLoss],
        lr: f64,
    ) -> UpdateStats;

    /// Produce an immutable actor-facing snapshot of the current parameters.
    fn snapshot(&self) -> Arc<dyn Policy>;
}

/// State-embedding network contract.
pub trait StateEmbedder: Send + Sync {
    /// Dimension of the embedding space.
    fn dim(&self) -> usize;

    /// Embed a single observation.
    fn embed(&self, observation: &[f32]) -> Vec<f32>;
}

/// Forward-dynamics network: predicts the next embedding from the current
/// embedding and the chosen action.
pub trait ForwardDynamics: Send + Sync {
    /// Predicted next-state embedding.
    fn predict(&self, embedding: &[f32], action: u32) -> Vec<f32>;
}

/// Inverse-dynamics network: predicts which action connected two embeddings.
pub trait InverseDynamics: Send + Sync {
    /// Unnormalized logits over the action space.
    fn action_logits(&self, embedding: &[f32], next_embedding: &[f32]) -> Vec<f32>;
}

/// Checkpoint access to every trainable module and optimizer.
///
/// The training loop treats parameters as opaque byte blobs keyed by module
/// name; implementations serialize with whatever their framework provides.
/// On load, each present entry is restored independently and missing entries
/// are left untouched.
pub trait ModuleStates: Send {
    /// Serialized parameters per trainable module.
    fn save_modules(&self) -> BTreeMap<String, Vec<u8>>;

    /// Serialized optimizer state per module.
    fn save_optimizers(&self) -> BTreeMap<String, Vec<u8>> {
        BTreeMap::new()
    }

    /// Restore module parameters from the entries that are present.
    fn load_modules(&mut self, modules: &BTreeMap<String, Vec<u8>>);

    /// Restore optimizer states from the entries that are present.
    fn load_optimizers(&mut self, _optimizers: &BTreeMap<String, Vec<u8>>) {}
}
