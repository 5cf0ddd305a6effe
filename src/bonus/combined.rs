//! Composition of two bonus variants.
//!
//! The combined reward is the sum or product of the component rewards per
//! timestep. A product gates one signal by the other — the shape used to
//! combine a lifetime-novelty signal with an episodic one. Auxiliary losses
//! from both components are forwarded unchanged.

use serde::{Deserialize, Serialize};

use crate::batch::Batch;
use crate::bonus::{AuxLoss, BonusModule, TransitionView};

/// How two component bonuses combine into one scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombineOp {
    /// `b = b1 + b2`
    Sum,
    /// `b = b1 * b2`
    Product,
}

/// Two bonus variants behind the single-module contract.
pub struct CombinedBonus {
    first: Box<dyn BonusModule>,
    second: Box<dyn BonusModule>,
    op: CombineOp,
}

impl CombinedBonus {
    /// Combine two modules with the given operator.
    pub fn new(first: Box<dyn BonusModule>, second: Box<dyn BonusModule>, op: CombineOp) -> Self {
        Self { first, second, op }
    }
}

impl BonusModule for CombinedBonus {
    fn reward(&mut self, transition: &TransitionView<'_>) -> f32 {
        let a = self.first.reward(transition);
        let b = self.second.reward(transition);
        match self.op {
            CombineOp::Sum => a + b,
            CombineOp::Product => a * b,
        }
    }

    fn on_episode_end(&mut self) {
        self.first.on_episode_end();
        self.second.on_episode_end();
    }

    fn aux_losses(&mut self, batch: &Batch) -> Vec<AuxLoss> {
        let mut losses = self.first.aux_losses(batch);
        losses.extend(self.second.aux_losses(batch));
        losses
    }

    fn visited_states(&self) -> u64 {
        self.first.visited_states().max(self.second.visited_states())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedBonus {
        value: f32,
        episodes: usize,
    }

    impl BonusModule for FixedBonus {
        fn reward(&mut self, _transition: &TransitionView<'_>) -> f32 {
            self.value
        }
        fn on_episode_end(&mut self) {
            self.episodes += 1;
        }
        fn aux_losses(&mut self, _batch: &Batch) -> Vec<AuxLoss> {
            vec![AuxLoss {
                name: "fixed_loss",
                weight: 1.0,
                value: self.value,
            }]
        }
        fn visited_states(&self) -> u64 {
            self.episodes as u64
        }
    }

    fn view() -> TransitionView<'static> {
        TransitionView {
            observation: &[0.0],
            action: 0,
            next_observation: &[0.0],
        }
    }

    #[test]
    fn test_sum() {
        let mut combined = CombinedBonus::new(
            Box::new(FixedBonus { value: 0.5, episodes: 0 }),
            Box::new(FixedBonus { value: 0.25, episodes: 0 }),
            CombineOp::Sum,
        );
        assert!((combined.reward(&view()) - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_product_gates() {
        let mut combined = CombinedBonus::new(
            Box::new(FixedBonus { value: 0.5, episodes: 0 }),
            Box::new(FixedBonus { value: 0.0, episodes: 0 }),
            CombineOp::Product,
        );
        // One component at zero gates the whole bonus.
        assert_eq!(combined.reward(&view()), 0.0);
    }

    #[test]
    fn test_episode_end_propagates_to_both() {
        let mut combined = CombinedBonus::new(
            Box::new(FixedBonus { value: 0.1, episodes: 0 }),
            Box::new(FixedBonus { value: 0.2, episodes: 0 }),
            CombineOp::Sum,
        );
        combined.on_episode_end();
        combined.on_episode_end();
        assert_eq!(combined.visited_states(), 2);
    }

    #[test]
    fn test_aux_losses_concatenated() {
        let mut combined = CombinedBonus::new(
            Box::new(FixedBonus { value: 0.1, episodes: 0 }),
            Box::new(FixedBonus { value: 0.2, episodes: 0 }),
            CombineOp::Sum,
        );
        let batch = Batch::for_tests(1, 2, 1, 2);
        let losses = combined.aux_losses(&batch);
        assert_eq!(losses.len(), 2);
        assert!((losses[0].value - 0.1).abs() < 1e-6);
        assert!((losses[1].value - 0.2).abs() < 1e-6);
    }
}
