//! Visitation-count bonus.
//!
//! Observations are quantized, hashed, and counted; the bonus for the
//! `n`-th visit to a state is `n^(-1/2)`, so novelty pays most on first
//! contact and decays toward zero as a state becomes familiar.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::bonus::{BonusModule, TransitionView};

/// Count-based intrinsic bonus over hashed observations.
pub struct CountBonus {
    counts: HashMap<u64, u64>,
    resolution: f32,
}

impl CountBonus {
    /// Create with a quantization scale; observations are rounded to
    /// `1/resolution` before hashing so nearby continuous observations
    /// share a count bucket.
    pub fn new(resolution: f32) -> Self {
        Self {
            counts: HashMap::new(),
            resolution,
        }
    }

    fn state_key(&self, observation: &[f32]) -> u64 {
        let mut hasher = DefaultHasher::new();
        for &x in observation {
            ((x * self.resolution).round() as i64).hash(&mut hasher);
        }
        hasher.finish()
    }

    /// Visit count for an observation (0 if never seen).
    pub fn count(&self, observation: &[f32]) -> u64 {
        self.counts
            .get(&self.state_key(observation))
            .copied()
            .unwrap_or(0)
    }
}

impl BonusModule for CountBonus {
    fn reward(&mut self, transition: &TransitionView<'_>) -> f32 {
        let key = self.state_key(transition.next_observation);
        let count = self.counts.entry(key).or_insert(0);
        *count += 1;
        ((*count) as f32).sqrt().recip()
    }

    fn visited_states(&self) -> u64 {
        self.counts.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transition<'a>(obs: &'a [f32], next: &'a [f32]) -> TransitionView<'a> {
        TransitionView {
            observation: obs,
            action: 0,
            next_observation: next,
        }
    }

    #[test]
    fn test_first_visit_pays_one() {
        let mut bonus = CountBonus::new(1000.0);
        let r = bonus.reward(&transition(&[0.0], &[1.0]));
        assert!((r - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_bonus_decays_with_visits() {
        let mut bonus = CountBonus::new(1000.0);
        let r1 = bonus.reward(&transition(&[0.0], &[1.0]));
        let r2 = bonus.reward(&transition(&[0.0], &[1.0]));
        let r4 = {
            bonus.reward(&transition(&[0.0], &[1.0]));
            bonus.reward(&transition(&[0.0], &[1.0]))
        };
        assert!(r1 > r2 && r2 > r4);
        assert!((r2 - 1.0 / 2f32.sqrt()).abs() < 1e-6);
        assert!((r4 - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_distinct_states_tracked() {
        let mut bonus = CountBonus::new(1000.0);
        bonus.reward(&transition(&[0.0], &[1.0]));
        bonus.reward(&transition(&[1.0], &[2.0]));
        bonus.reward(&transition(&[2.0], &[1.0]));
        assert_eq!(bonus.visited_states(), 2);
        assert_eq!(bonus.count(&[1.0]), 2);
        assert_eq!(bonus.count(&[9.0]), 0);
    }

    #[test]
    fn test_counts_survive_episode_end() {
        // Visitation counts are lifetime statistics, not per-episode memory.
        let mut bonus = CountBonus::new(1000.0);
        bonus.reward(&transition(&[0.0], &[1.0]));
        bonus.on_episode_end();
        let r = bonus.reward(&transition(&[0.0], &[1.0]));
        assert!((r - 1.0 / 2f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_quantization_buckets_nearby_observations() {
        let mut bonus = CountBonus::new(10.0);
        bonus.reward(&transition(&[0.0], &[1.001]));
        let r = bonus.reward(&transition(&[0.0], &[1.004]));
        // Same bucket at resolution 10.
        assert!((r - 1.0 / 2f32.sqrt()).abs() < 1e-6);
    }
}
