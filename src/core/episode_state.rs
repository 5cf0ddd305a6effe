//! Episode termination classification.
//!
//! The `terminated` / `truncated` distinction is load-bearing for the
//! off-policy correction: only true termination zeroes the per-step
//! discount and resets the carried recurrent state. Truncation ends the
//! episode for bookkeeping but the value of the cut-off state still
//! bootstraps, and the hidden state carries over.

/// How (or whether) an episode ended at a given timestep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EpisodeState {
    /// Episode is ongoing.
    #[default]
    Running,
    /// Episode truly ended in an absorbing state.
    Terminal,
    /// Episode was cut off by an external limit.
    Truncated,
}

impl EpisodeState {
    /// Classify from the raw environment flags. Terminal wins if both are set.
    #[inline]
    pub fn from_flags(terminated: bool, truncated: bool) -> Self {
        if terminated {
            Self::Terminal
        } else if truncated {
            Self::Truncated
        } else {
            Self::Running
        }
    }

    /// Whether the carried recurrent state resets. True only for `Terminal`.
    #[inline]
    pub fn resets_carry(&self) -> bool {
        matches!(self, Self::Terminal)
    }

    /// Whether the per-step discount is zeroed. True only for `Terminal`.
    #[inline]
    pub fn zeroes_discount(&self) -> bool {
        matches!(self, Self::Terminal)
    }

    /// Whether the episode ended for either reason.
    #[inline]
    pub fn is_done(&self) -> bool {
        !matches!(self, Self::Running)
    }

    /// Whether this is a true termination.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal)
    }
}
