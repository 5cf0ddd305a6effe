//! Learning-rate scheduling.
//!
//! Schedules are pure functions of the global frame count, so their only
//! mutable state is the frame counter itself — which the checkpoint already
//! persists. The same shape could schedule the intrinsic-reward
//! coefficient; the trainer currently applies a static coefficient and
//! leaves that hook unwired.

use serde::{Deserialize, Serialize};

/// Learning-rate schedule, evaluated at the current frame count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LrSchedule {
    /// Fixed learning rate.
    Constant {
        /// The learning rate.
        lr: f64,
    },
    /// Linear interpolation from `start_lr` at frame 0 to `end_lr` at
    /// `total_frames`, held at `end_lr` afterwards.
    LinearDecay {
        /// Learning rate at frame 0.
        start_lr: f64,
        /// Learning rate at and after `total_frames`.
        end_lr: f64,
        /// Frames over which to decay.
        total_frames: u64,
    },
}

impl LrSchedule {
    /// Learning rate for a given frame count.
    pub fn lr_at(&self, frames: u64) -> f64 {
        match self {
            LrSchedule::Constant { lr } => *lr,
            LrSchedule::LinearDecay {
                start_lr,
                end_lr,
                total_frames,
            } => {
                if *total_frames == 0 {
                    return *start_lr;
                }
                let progress = (frames.min(*total_frames) as f64) / (*total_frames as f64);
                start_lr + (end_lr - start_lr) * progress
            }
        }
    }

    /// Reject non-finite or negative rates.
    pub fn validate(&self) -> Result<(), String> {
        let check = |name: &str, lr: f64| {
            if !lr.is_finite() || lr < 0.0 {
                Err(format!("{} must be finite and non-negative, got {}", name, lr))
            } else {
                Ok(())
            }
        };
        match self {
            LrSchedule::Constant { lr } => check("lr", *lr),
            LrSchedule::LinearDecay {
                start_lr, end_lr, ..
            } => {
                check("start_lr", *start_lr)?;
                check("end_lr", *end_lr)
            }
        }
    }
}

impl Default for LrSchedule {
    fn default() -> Self {
        LrSchedule::Constant { lr: 1e-4 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant() {
        let s = LrSchedule::Constant { lr: 3e-4 };
        assert_eq!(s.lr_at(0), 3e-4);
        assert_eq!(s.lr_at(1_000_000), 3e-4);
    }

    #[test]
    fn test_linear_decay_endpoints() {
        let s = LrSchedule::LinearDecay {
            start_lr: 1e-3,
            end_lr: 0.0,
            total_frames: 1000,
        };
        assert!((s.lr_at(0) - 1e-3).abs() < 1e-12);
        assert!((s.lr_at(500) - 5e-4).abs() < 1e-12);
        assert!(s.lr_at(1000).abs() < 1e-12);
        // Held at end_lr past the horizon.
        assert!(s.lr_at(10_000).abs() < 1e-12);
    }

    #[test]
    fn test_linear_decay_zero_horizon() {
        let s = LrSchedule::LinearDecay {
            start_lr: 1e-3,
            end_lr: 0.0,
            total_frames: 0,
        };
        assert_eq!(s.lr_at(123), 1e-3);
    }

    #[test]
    fn test_validate_rejects_negative() {
        let s = LrSchedule::Constant { lr: -1.0 };
        assert!(s.validate().is_err());
        let s = LrSchedule::LinearDecay {
            start_lr: 1e-3,
            end_lr: f64::NAN,
            total_frames: 10,
        };
        assert!(s.validate().is_err());
    }
}
