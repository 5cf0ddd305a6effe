//! Core shared-memory machinery: the slot arena, its ownership protocol,
//! and the per-slot recurrent-state carry.

pub mod buffer_pool;
pub mod episode_state;
pub mod policy_slot;
pub mod slot;
pub mod state_carry;

pub use buffer_pool::{BufferPool, PoolCounts, Ticket};
pub use episode_state::EpisodeState;
pub use policy_slot::{PolicySlot, SharedPolicySlot};
pub use slot::{SlotIndex, StepRecord, TrajectorySlot};
pub use state_carry::StateCarry;
