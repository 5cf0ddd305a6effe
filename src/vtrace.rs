//! V-trace off-policy correction.
//!
//! Trajectories are collected under a behavior policy that may lag the
//! learner's target policy by several updates. V-trace turns those lagged
//! segments into valid value targets and policy-gradient advantages via
//! clipped importance sampling.
//!
//! Per timestep, with clipping constants `rho_bar >= c_bar >= 1`:
//!
//! ```text
//! rho_t = min(rho_bar, pi_target(a|x) / pi_behavior(a|x))
//! c_t   = min(c_bar,   pi_target(a|x) / pi_behavior(a|x))
//! delta_t = rho_t * (r_t + gamma_t * V(x_{t+1}) - V(x_t))
//! v_T = V(x_T)                                  (bootstrap)
//! v_t = V(x_t) + delta_t + gamma_t * c_t * (v_{t+1} - V(x_{t+1}))
//! A_t = rho_t * (r_t + gamma_t * v_{t+1} - V(x_t))
//! ```
//!
//! `gamma_t` arrives precomputed as a per-step discount: zero where the
//! episode truly terminated, the plain discount factor everywhere else —
//! truncation does not zero it.
//!
//! Ratios are computed from log-probabilities with the log-ratio clamped
//! before exponentiation, so raw probability ratios can never overflow.
//! Non-finite inputs or outputs are a [`TrainError::NumericalDegenerate`],
//! surfaced to the caller rather than folded into an update.

use crate::error::TrainError;

/// Log-ratio clamp applied before `exp()`. Importance ratios beyond
/// `exp(20)` indicate severe policy divergence and would be clipped away
/// regardless, so the clamp only guards the arithmetic.
const MAX_LOG_RATIO: f32 = 20.0;

/// Default importance-weight clip.
pub const DEFAULT_RHO_BAR: f32 = 1.0;
/// Default trace-cutting clip.
pub const DEFAULT_C_BAR: f32 = 1.0;

/// Inputs for one batch element, all of length `T` except the bootstrap.
#[derive(Debug, Clone)]
pub struct VtraceInput<'a> {
    /// `log pi_behavior(a_t | x_t)` recorded at collection time.
    pub behavior_log_probs: &'a [f32],
    /// `log pi_target(a_t | x_t)` recomputed at learning time.
    pub target_log_probs: &'a [f32],
    /// Clipped combined rewards.
    pub rewards: &'a [f32],
    /// Per-step discounts, zero at true termination.
    pub discounts: &'a [f32],
    /// Target-policy value estimates `V(x_t)`.
    pub values: &'a [f32],
    /// `V(x_T)`, the value of the state after the last timestep.
    pub bootstrap_value: f32,
}

/// Corrected targets for one batch element.
#[derive(Debug, Clone)]
pub struct VtraceOutput {
    /// Corrected value targets `v_t`.
    pub vs: Vec<f32>,
    /// Policy-gradient advantages `A_t` (importance weight included).
    pub pg_advantages: Vec<f32>,
    /// Clipped importance weights `rho_t`.
    pub rhos: Vec<f32>,
}

/// Compute V-trace targets and advantages from per-action log-probabilities.
pub fn from_log_probs(
    input: &VtraceInput<'_>,
    rho_bar: f32,
    c_bar: f32,
) -> Result<VtraceOutput, TrainError> {
    let n = input.rewards.len();
    if n == 0 {
        return Ok(VtraceOutput {
            vs: Vec::new(),
            pg_advantages: Vec::new(),
            rhos: Vec::new(),
        });
    }

    assert_eq!(input.behavior_log_probs.len(), n);
    assert_eq!(input.target_log_probs.len(), n);
    assert_eq!(input.discounts.len(), n);
    assert_eq!(input.values.len(), n);
    debug_assert!(
        rho_bar >= c_bar && c_bar >= 1.0,
        "clipping constants must satisfy rho_bar >= c_bar >= 1"
    );

    if !input.bootstrap_value.is_finite() {
        return Err(TrainError::NumericalDegenerate(
            "non-finite bootstrap value".into(),
        ));
    }
    for t in 0..n {
        if !input.rewards[t].is_finite()
            || !input.values[t].is_finite()
            || !input.discounts[t].is_finite()
        {
            return Err(TrainError::NumericalDegenerate(format!(
                "non-finite reward/value/discount at step {}",
                t
            )));
        }
    }

    let mut rhos = vec![0.0f32; n];
    let mut cs = vec![0.0f32; n];
    for t in 0..n {
        let log_ratio = input.target_log_probs[t] - input.behavior_log_probs[t];
        if !log_ratio.is_finite() {
            return Err(TrainError::NumericalDegenerate(format!(
                "non-finite importance log-ratio at step {}",
                t
            )));
        }
        let ratio = log_ratio.clamp(-MAX_LOG_RATIO, MAX_LOG_RATIO).exp();
        rhos[t] = ratio.min(rho_bar);
        cs[t] = ratio.min(c_bar);
    }

    let mut vs = vec![0.0f32; n];
    let mut pg_advantages = vec![0.0f32; n];
    let mut next_vs = input.bootstrap_value;
    let mut next_value = input.bootstrap_value;

    for t in (0..n).rev() {
        let reward = input.rewards[t];
        let discount = input.discounts[t];
        let value = input.values[t];

        let delta = rhos[t] * (reward + discount * next_value - value);
        vs[t] = value + delta + discount * cs[t] * (next_vs - next_value);
        // next_vs still holds v_{t+1} at this point.
        pg_advantages[t] = rhos[t] * (reward + discount * next_vs - value);

        next_vs = vs[t];
        next_value = value;
    }

    for t in 0..n {
        if !vs[t].is_finite() || !pg_advantages[t].is_finite() {
            return Err(TrainError::NumericalDegenerate(format!(
                "non-finite corrected target at step {}",
                t
            )));
        }
    }

    Ok(VtraceOutput {
        vs,
        pg_advantages,
        rhos,
    })
}

/// Compute V-trace from raw behavior/target logits and taken actions.
///
/// Per-action log-probabilities are derived with a max-subtracted
/// log-softmax over each logits row.
#[allow(clippy::too_many_arguments)]
pub fn from_logits(
    behavior_logits: &[Vec<f32>],
    target_logits: &[Vec<f32>],
    actions: &[u32],
    rewards: &[f32],
    discounts: &[f32],
    values: &[f32],
    bootstrap_value: f32,
    rho_bar: f32,
    c_bar: f32,
) -> Result<VtraceOutput, TrainError> {
    let n = actions.len();
    assert_eq!(behavior_logits.len(), n);
    assert_eq!(target_logits.len(), n);

    let behavior_log_probs: Vec<f32> = (0..n)
        .map(|t| action_log_prob(&behavior_logits[t], actions[t]))
        .collect();
    let target_log_probs: Vec<f32> = (0..n)
        .map(|t| action_log_prob(&target_logits[t], actions[t]))
        .collect();

    from_log_probs(
        &VtraceInput {
            behavior_log_probs: &behavior_log_probs,
            target_log_probs: &target_log_probs,
            rewards,
            discounts,
            values,
            bootstrap_value,
        },
        rho_bar,
        c_bar,
    )
}

/// Numerically stable log-softmax.
pub fn log_softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let sum_exp: f32 = logits.iter().map(|&l| (l - max).exp()).sum();
    let log_z = max + sum_exp.ln();
    logits.iter().map(|&l| l - log_z).collect()
}

/// Log-probability of one action under a logits row.
pub fn action_log_prob(logits: &[f32], action: u32) -> f32 {
    log_softmax(logits)[action as usize]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn on_policy_input<'a>(
        log_probs: &'a [f32],
        rewards: &'a [f32],
        discounts: &'a [f32],
        values: &'a [f32],
        bootstrap: f32,
    ) -> VtraceInput<'a> {
        VtraceInput {
            behavior_log_probs: log_probs,
            target_log_probs: log_probs,
            rewards,
            discounts,
            values,
            bootstrap_value: bootstrap,
        }
    }

    #[test]
    fn test_on_policy_reduces_to_nstep_return() {
        // With behavior == target all ratios are 1, so the recursion
        // collapses to v_t = r_t + gamma * v_{t+1} with v_T = bootstrap.
        let log_probs = vec![-1.2, -0.7, -2.0];
        let rewards = vec![1.0, -0.5, 2.0];
        let gamma = 0.9;
        let discounts = vec![gamma; 3];
        let values = vec![0.3, 0.8, -0.1];
        let bootstrap = 0.6;

        let out = from_log_probs(
            &on_policy_input(&log_probs, &rewards, &discounts, &values, bootstrap),
            1.0,
            1.0,
        )
        .unwrap();

        for rho in &out.rhos {
            assert!((rho - 1.0).abs() < 1e-6);
        }

        let v2 = rewards[2] + gamma * bootstrap;
        let v1 = rewards[1] + gamma * v2;
        let v0 = rewards[0] + gamma * v1;
        assert!((out.vs[2] - v2).abs() < 1e-5, "vs[2]={} v2={}", out.vs[2], v2);
        assert!((out.vs[1] - v1).abs() < 1e-5);
        assert!((out.vs[0] - v0).abs() < 1e-5);
    }

    #[test]
    fn test_ratios_never_exceed_clip() {
        // Ratios > 1 (target much more likely) and -> 0 both stay within
        // [0, rho_bar] after clipping.
        let behavior = vec![-8.0, -0.01, -3.0];
        let target = vec![-0.01, -12.0, -3.0];
        let rewards = vec![1.0, 1.0, 1.0];
        let discounts = vec![0.99; 3];
        let values = vec![0.0; 3];

        let out = from_log_probs(
            &VtraceInput {
                behavior_log_probs: &behavior,
                target_log_probs: &target,
                rewards: &rewards,
                discounts: &discounts,
                values: &values,
                bootstrap_value: 0.0,
            },
            1.0,
            1.0,
        )
        .unwrap();

        assert!((out.rhos[0] - 1.0).abs() < 1e-6, "large ratio clipped to 1");
        assert!(out.rhos[1] < 1e-4, "tiny ratio stays near 0");
        assert!((out.rhos[2] - 1.0).abs() < 1e-6, "equal policies give 1");
        for rho in &out.rhos {
            assert!(*rho <= 1.0 + 1e-6 && *rho >= 0.0);
        }
    }

    #[test]
    fn test_true_termination_zeroes_future() {
        // Discount zero at the terminal step cuts the recursion: the target
        // there is exactly the final reward.
        let log_probs = vec![-1.0, -1.0];
        let rewards = vec![0.5, 1.0];
        let discounts = vec![0.99, 0.0];
        let values = vec![0.2, 0.9];

        let out = from_log_probs(
            &on_policy_input(&log_probs, &rewards, &discounts, &values, 123.0),
            1.0,
            1.0,
        )
        .unwrap();

        assert!((out.vs[1] - 1.0).abs() < 1e-5);
        // The bogus bootstrap never leaks past the zero discount.
        assert!((out.vs[0] - (0.5 + 0.99 * 1.0)).abs() < 1e-5);
    }

    #[test]
    fn test_truncation_keeps_discount() {
        // A truncated episode bootstraps: same rewards, nonzero discount at
        // the cut-off step, so the bootstrap value flows in.
        let log_probs = vec![-1.0];
        let rewards = vec![1.0];
        let values = vec![0.0];
        let bootstrap = 2.0;

        let truncated = from_log_probs(
            &on_policy_input(&log_probs, &rewards, &[0.9], &values, bootstrap),
            1.0,
            1.0,
        )
        .unwrap();
        let terminated = from_log_probs(
            &on_policy_input(&log_probs, &rewards, &[0.0], &values, bootstrap),
            1.0,
            1.0,
        )
        .unwrap();

        assert!((truncated.vs[0] - (1.0 + 0.9 * 2.0)).abs() < 1e-5);
        assert!((terminated.vs[0] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_importance_weight_scales_advantage() {
        // A_t = rho_t * (r + gamma * v_{t+1} - V), so a ratio below the clip
        // scales the advantage directly.
        let behavior = vec![-0.5];
        let target = vec![-1.5]; // ratio = exp(-1) < 1, unclipped
        let rewards = vec![1.0];
        let discounts = vec![0.9];
        let values = vec![0.25];
        let bootstrap = 0.5;

        let out = from_log_probs(
            &VtraceInput {
                behavior_log_probs: &behavior,
                target_log_probs: &target,
                rewards: &rewards,
                discounts: &discounts,
                values: &values,
                bootstrap_value: bootstrap,
            },
            1.0,
            1.0,
        )
        .unwrap();

        let rho = (-1.0f32).exp();
        let expected = rho * (1.0 + 0.9 * 0.5 - 0.25);
        assert!((out.rhos[0] - rho).abs() < 1e-6);
        assert!(
            (out.pg_advantages[0] - expected).abs() < 1e-5,
            "advantage {} expected {}",
            out.pg_advantages[0],
            expected
        );
    }

    #[test]
    fn test_extreme_log_ratios_stay_finite() {
        let behavior = vec![-200.0, -1e-8];
        let target = vec![-1e-8, -200.0];
        let rewards = vec![1.0, -1.0];
        let discounts = vec![0.99, 0.99];
        let values = vec![0.5, 0.5];

        let out = from_log_probs(
            &VtraceInput {
                behavior_log_probs: &behavior,
                target_log_probs: &target,
                rewards: &rewards,
                discounts: &discounts,
                values: &values,
                bootstrap_value: 0.0,
            },
            1.0,
            1.0,
        )
        .unwrap();

        for t in 0..2 {
            assert!(out.vs[t].is_finite());
            assert!(out.pg_advantages[t].is_finite());
            assert!(out.rhos[t].is_finite());
        }
    }

    #[test]
    fn test_non_finite_input_is_degenerate() {
        let behavior = vec![f32::NAN];
        let target = vec![-1.0];
        let rewards = vec![1.0];
        let discounts = vec![0.99];
        let values = vec![0.5];

        let err = from_log_probs(
            &VtraceInput {
                behavior_log_probs: &behavior,
                target_log_probs: &target,
                rewards: &rewards,
                discounts: &discounts,
                values: &values,
                bootstrap_value: 0.0,
            },
            1.0,
            1.0,
        )
        .unwrap_err();

        assert!(matches!(err, TrainError::NumericalDegenerate(_)));
    }

    #[test]
    fn test_non_finite_reward_is_degenerate() {
        let log_probs = vec![-1.0];
        let rewards = vec![f32::INFINITY];
        let discounts = vec![0.99];
        let values = vec![0.5];

        let err = from_log_probs(
            &on_policy_input(&log_probs, &rewards, &discounts, &values, 0.0),
            1.0,
            1.0,
        )
        .unwrap_err();
        assert!(matches!(err, TrainError::NumericalDegenerate(_)));
    }

    #[test]
    fn test_empty_input() {
        let out = from_log_probs(
            &VtraceInput {
                behavior_log_probs: &[],
                target_log_probs: &[],
                rewards: &[],
                discounts: &[],
                values: &[],
                bootstrap_value: 0.0,
            },
            1.0,
            1.0,
        )
        .unwrap();
        assert!(out.vs.is_empty());
        assert!(out.pg_advantages.is_empty());
    }

    #[test]
    fn test_log_softmax_normalizes() {
        let lp = log_softmax(&[1.0, 2.0, 3.0]);
        let total: f32 = lp.iter().map(|l| l.exp()).sum();
        assert!((total - 1.0).abs() < 1e-5);
        // Larger logit, larger log-probability.
        assert!(lp[2] > lp[1] && lp[1] > lp[0]);
    }

    #[test]
    fn test_from_logits_matches_log_probs() {
        let behavior_logits = vec![vec![0.2, -0.4, 1.0], vec![0.0, 0.0, 0.0]];
        let target_logits = vec![vec![1.0, 0.0, -1.0], vec![0.5, 0.5, 0.5]];
        let actions = vec![2u32, 0u32];
        let rewards = vec![1.0, 0.0];
        let discounts = vec![0.99, 0.99];
        let values = vec![0.1, 0.2];

        let via_logits = from_logits(
            &behavior_logits,
            &target_logits,
            &actions,
            &rewards,
            &discounts,
            &values,
            0.3,
            1.0,
            1.0,
        )
        .unwrap();

        let behavior_lp: Vec<f32> = (0..2)
            .map(|t| action_log_prob(&behavior_logits[t], actions[t]))
            .collect();
        let target_lp: Vec<f32> = (0..2)
            .map(|t| action_log_prob(&target_logits[t], actions[t]))
            .collect();
        let via_probs = from_log_probs(
            &VtraceInput {
                behavior_log_probs: &behavior_lp,
                target_log_probs: &target_lp,
                rewards: &rewards,
                discounts: &discounts,
                values: &values,
                bootstrap_value: 0.3,
            },
            1.0,
            1.0,
        )
        .unwrap();

        for t in 0..2 {
            assert!((via_logits.vs[t] - via_probs.vs[t]).abs() < 1e-6);
            assert!((via_logits.pg_advantages[t] - via_probs.pg_advantages[t]).abs() < 1e-6);
        }
    }
}
