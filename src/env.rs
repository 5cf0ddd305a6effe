//! Environment contract for actor workers.
//!
//! The simulator itself is an external collaborator; this module only fixes
//! the step/reset interface the actor loop drives. Observations are flat
//! `f32` feature vectors and actions are discrete indices.
//!
//! The `terminated` / `truncated` distinction matters: `terminated` means the
//! episode truly ended in an absorbing state (goal, death), `truncated` means
//! an external limit (time, step cap) cut it off. Only true termination
//! zeroes the discount and resets the carried recurrent state downstream.

use std::fmt;

/// Result of one environment step.
#[derive(Debug, Clone)]
pub struct EnvStep {
    /// Observation after the step.
    pub observation: Vec<f32>,
    /// Extrinsic reward for the transition.
    pub reward: f32,
    /// Episode truly ended (absorbing state).
    pub terminated: bool,
    /// Episode cut off by an external limit.
    pub truncated: bool,
}

impl EnvStep {
    /// Episode ended for either reason.
    pub fn done(&self) -> bool {
        self.terminated || self.truncated
    }
}

/// Error raised by an environment; fatal for the calling actor.
#[derive(Debug)]
pub struct EnvError(pub String);

impl EnvError {
    /// Create an error from any displayable cause.
    pub fn new(msg: impl fmt::Display) -> Self {
        Self(msg.to_string())
    }
}

impl fmt::Display for EnvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "environment error: {}", self.0)
    }
}

impl std::error::Error for EnvError {}

/// Contract an environment must satisfy to be driven by an actor worker.
///
/// An environment step that returns `Err` is fatal for the worker: the
/// worker terminates and is reported, since correctness of shared recurrent
/// state after a partial failure cannot be guaranteed.
pub trait Environment: Send {
    /// Reset to a fresh episode and return the initial observation.
    fn reset(&mut self) -> Result<Vec<f32>, EnvError>;

    /// Advance by one action.
    fn step(&mut self, action: u32) -> Result<EnvStep, EnvError>;

    /// Size of the discrete action space.
    fn n_actions(&self) -> usize;

    /// Length of the flat observation vector.
    fn observation_len(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_step_done() {
        let step = EnvStep {
            observation: vec![0.0],
            reward: 0.0,
            terminated: false,
            truncated: true,
        };
        assert!(step.done());

        let step = EnvStep {
            observation: vec![0.0],
            reward: 0.0,
            terminated: false,
            truncated: false,
        };
        assert!(!step.done());
    }

    #[test]
    fn test_env_error_display() {
        let err = EnvError::new("socket closed");
        assert!(err.to_string().contains("socket closed"));
    }
}
