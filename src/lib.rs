//! # Asynchronous actor-learner training with intrinsic exploration
//!
//! An IMPALA-style actor-learner training loop for reinforcement-learning
//! agents, augmented with pluggable intrinsic exploration bonuses (count,
//! curiosity, random-network distillation, episodic novelty, and
//! combinations).
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  Actor 0          Actor 1          Actor N                       │
//! │  ┌────────┐       ┌────────┐       ┌────────┐                    │
//! │  │ env    │       │ env    │       │ env    │                    │
//! │  │ policy │       │ policy │       │ policy │                    │
//! │  │ bonus  │       │ bonus  │       │ bonus  │                    │
//! │  └───┬────┘       └───┬────┘       └───┬────┘                    │
//! │      │   acquire_free / publish_full   │                         │
//! │      └────────────────┼────────────────┘                         │
//! │                       ▼                                          │
//! │              ┌────────────────┐      ┌──────────────┐            │
//! │              │   BufferPool   │      │  PolicySlot  │            │
//! │              │ (slot arena +  │      │ (versioned   │            │
//! │              │  index queues) │      │  snapshots)  │            │
//! │              └───────┬────────┘      └──────▲───────┘            │
//! │                      │ acquire_full         │ publish            │
//! │                      ▼                      │                    │
//! │              ┌────────────────────────────────┐                  │
//! │              │ Learner threads                │                  │
//! │              │ assemble → V-trace → update    │                  │
//! │              └────────────────────────────────┘                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Actors continuously fill fixed-length trajectory slots; learner threads
//! continuously drain them, apply the V-trace off-policy correction, and
//! update shared parameters. The buffer pool is the only synchronization
//! point: blocking `acquire_free`/`acquire_full` form the system's sole
//! backpressure mechanism, and slot ownership transfers exclusively through
//! the index queues.
//!
//! Neural networks, environments, and optimizers are external collaborators
//! behind the traits in [`model`] and [`env`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use intrinsic_rl::{BonusKind, BonusNetworks, Trainer, TrainConfig};
//!
//! let config = TrainConfig::new()
//!     .with_total_frames(30_000_000)
//!     .with_num_actors(8)
//!     .with_bonus(BonusKind::Episodic);
//!
//! let trainer = Trainer::new(config)?;
//! let report = trainer.run(
//!     model,
//!     |actor_id| make_env(actor_id),
//!     networks,
//!     None,
//!     Box::new(ConsoleSink::new(10_000)),
//!     Some(&mut module_states),
//! )?;
//! ```

pub mod actor;
pub mod batch;
pub mod bonus;
pub mod checkpoint;
pub mod config;
pub mod core;
pub mod env;
pub mod error;
pub mod learner;
pub mod metrics;
pub mod model;
pub mod scheduling;
pub mod trainer;
pub mod vtrace;

pub use actor::{ActorReport, ActorWorker};
pub use batch::{Batch, BatchAssembler};
pub use bonus::{
    build_bonus, AuxLoss, BaseBonusKind, BonusKind, BonusModule, BonusNetworks, CombineOp,
    CombinedBonus, CountBonus, CuriosityBonus, EpisodicNovelty, NoBonus, RndBonus, TransitionView,
};
pub use checkpoint::{CheckpointRecord, Checkpointer};
pub use config::TrainConfig;
pub use crate::core::{
    BufferPool, EpisodeState, PolicySlot, PoolCounts, SharedPolicySlot, SlotIndex, StateCarry,
    StepRecord, Ticket, TrajectorySlot,
};
pub use env::{EnvError, EnvStep, Environment};
pub use error::TrainError;
pub use learner::{
    clip_rewards, compose_rewards, compute_batch_targets, LearnerLoop, LearnerReport,
    VtraceTargets,
};
pub use metrics::{ConsoleSink, CsvSink, MetricsSink, MultiSink, NullSink};
pub use model::{
    ForwardDynamics, InverseDynamics, LearnerModel, ModuleStates, Policy, PolicyState, PolicyStep,
    StateEmbedder, UnrollOutput, UpdateStats,
};
pub use scheduling::LrSchedule;
pub use trainer::{TrainReport, Trainer};
pub use vtrace::{VtraceInput, VtraceOutput, DEFAULT_C_BAR, DEFAULT_RHO_BAR};
