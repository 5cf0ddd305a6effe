//! Error taxonomy for the training loop.
//!
//! Errors fall into four classes with different propagation policies:
//!
//! - `WorkerFatal`: an actor's environment step failed. The worker terminates
//!   and is reported; it is never restarted, and training continues with
//!   reduced parallelism.
//! - `Config`: an invalid configuration, rejected at startup before any
//!   worker thread is spawned.
//! - `NumericalDegenerate`: importance ratios or corrected values became
//!   non-finite. Surfaced to the learner, which skips the offending batch
//!   elements visibly or halts; never silently folded into an update.
//! - `Interrupted`: an external stop signal arrived; shutdown was orderly
//!   (checkpoint, drain, exit) rather than abrupt.

use std::fmt;
use std::io;

/// Top-level error type for the training loop.
#[derive(Debug)]
pub enum TrainError {
    /// An actor's environment raised; the worker terminated and was reported.
    WorkerFatal {
        /// Which actor died.
        actor_id: usize,
        /// The environment's error message.
        reason: String,
    },
    /// Invalid configuration, detected before any workers were spawned.
    Config(String),
    /// Non-finite importance ratios or corrected values.
    NumericalDegenerate(String),
    /// External stop signal during training.
    Interrupted,
    /// IO error during checkpoint save/load.
    Io(io::Error),
    /// Checkpoint record could not be encoded or decoded.
    Checkpoint(String),
}

impl fmt::Display for TrainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainError::WorkerFatal { actor_id, reason } => {
                write!(f, "actor {} failed fatally: {}", actor_id, reason)
            }
            TrainError::Config(msg) => write!(f, "invalid configuration: {}", msg),
            TrainError::NumericalDegenerate(msg) => {
                write!(f, "numerically degenerate correction: {}", msg)
            }
            TrainError::Interrupted => write!(f, "training interrupted by stop signal"),
            TrainError::Io(e) => write!(f, "IO error: {}", e),
            TrainError::Checkpoint(msg) => write!(f, "checkpoint error: {}", msg),
        }
    }
}

impl std::error::Error for TrainError {}

impl From<io::Error> for TrainError {
    fn from(e: io::Error) -> Self {
        TrainError::Io(e)
    }
}
