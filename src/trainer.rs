//! Top-level training orchestration.
//!
//! Wires the pool, carry tables, policy slot, actor workers, and learner
//! threads together, then supervises: drains worker reports, writes
//! checkpoints on a wall-clock interval, and drives orderly shutdown —
//! one sentinel per worker, bounded join waits, a final checkpoint.
//!
//! Failure policy: a single dead actor is reported and the run continues
//! with reduced parallelism; all actors dead is fatal. A learner error is
//! fatal. Both fatal paths still attempt a final checkpoint on the way out.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{error, info, warn};
use parking_lot::Mutex;

use crate::actor::{ActorReport, ActorWorker};
use crate::batch::BatchAssembler;
use crate::bonus::{build_bonus, BonusNetworks};
use crate::checkpoint::{CheckpointRecord, Checkpointer};
use crate::config::TrainConfig;
use crate::core::buffer_pool::BufferPool;
use crate::core::policy_slot::PolicySlot;
use crate::core::state_carry::StateCarry;
use crate::env::Environment;
use crate::error::TrainError;
use crate::learner::LearnerLoop;
use crate::metrics::MetricsSink;
use crate::model::{LearnerModel, ModuleStates, Policy};

/// Summary of a run that reached its frame target.
#[derive(Debug, Default)]
pub struct TrainReport {
    /// Environment frames processed.
    pub frames: u64,
    /// Learning steps across all learner threads.
    pub learner_steps: usize,
    /// Reports from actors that stopped cleanly.
    pub actor_reports: Vec<ActorReport>,
    /// `(actor_id, reason)` for workers that died.
    pub worker_failures: Vec<(usize, String)>,
}

/// Orchestrates one training run.
pub struct Trainer {
    config: TrainConfig,
    shutdown: Arc<AtomicBool>,
}

impl Trainer {
    /// Validate the configuration and build a trainer.
    ///
    /// Configuration errors surface here, before any worker is spawned.
    pub fn new(config: TrainConfig) -> Result<Self, TrainError> {
        config.validate()?;
        Ok(Self {
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// The run configuration.
    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// Flag an external signal handler can set to request orderly shutdown.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Run to the frame target (or until interrupted).
    ///
    /// `env_factory` is called once per actor id. `module_states`, when
    /// present, feeds checkpoint capture; restoring a previous checkpoint
    /// into it is the caller's move before calling `run`.
    pub fn run<E, M, F>(
        &self,
        model: Arc<M>,
        mut env_factory: F,
        networks: BonusNetworks,
        exploration_policy: Option<Arc<dyn Policy>>,
        sink: Box<dyn MetricsSink>,
        module_states: Option<&mut dyn ModuleStates>,
    ) -> Result<TrainReport, TrainError>
    where
        E: Environment + 'static,
        M: LearnerModel + 'static,
        F: FnMut(usize) -> Result<E, TrainError>,
    {
        let config = &self.config;
        config.validate()?;

        // Everything that can be rejected happens before the first spawn.
        let mut actor_bonuses = Vec::with_capacity(config.num_actors);
        for _ in 0..config.num_actors {
            actor_bonuses.push(build_bonus(config.bonus, &networks, config)?);
        }
        let mut learner_bonuses = Vec::with_capacity(config.num_learner_threads);
        for _ in 0..config.num_learner_threads {
            learner_bonuses.push(build_bonus(config.bonus, &networks, config)?);
        }

        let mut envs = Vec::with_capacity(config.num_actors);
        for actor_id in 0..config.num_actors {
            envs.push(env_factory(actor_id)?);
        }
        let observation_len = envs[0].observation_len();
        let n_actions = envs[0].n_actions();

        let initial_policy = model.snapshot();
        let policy_slot = Arc::new(PolicySlot::new(Arc::clone(&initial_policy)));
        let pool = Arc::new(BufferPool::new(
            config.num_buffers,
            config.unroll_length,
            observation_len,
            n_actions,
        ));
        let carry = Arc::new(StateCarry::new(
            config.num_buffers,
            initial_policy.initial_state(),
        ));
        let exploration_carry = exploration_policy
            .as_ref()
            .map(|p| Arc::new(StateCarry::new(config.num_buffers, p.initial_state())));

        let frames = Arc::new(AtomicU64::new(0));
        let learn_lock = Arc::new(Mutex::new(()));
        let sink: Arc<Mutex<Box<dyn MetricsSink>>> = Arc::new(Mutex::new(sink));

        info!(
            "starting run: {} actors, {} learner threads, {} slots, unroll {}, batch {}",
            config.num_actors,
            config.num_learner_threads,
            config.num_buffers,
            config.unroll_length,
            config.batch_size
        );

        // Actor threads report (id, result) when they stop.
        let (report_tx, report_rx) = crossbeam_channel::unbounded();
        let mut actor_handles = Vec::with_capacity(config.num_actors);
        for (actor_id, env) in envs.into_iter().enumerate() {
            let worker = ActorWorker::new(
                actor_id,
                config.unroll_length,
                env,
                Arc::clone(&pool),
                Arc::clone(&policy_slot),
                Arc::clone(&carry),
                exploration_carry.clone(),
                exploration_policy.clone(),
                actor_bonuses.remove(0),
            );
            let tx = report_tx.clone();
            let handle = thread::Builder::new()
                .name(format!("actor-{}", actor_id))
                .spawn(move || {
                    let result = worker.run();
                    let _ = tx.send((actor_id, result));
                })
                .expect("failed to spawn actor thread");
            actor_handles.push(handle);
        }
        drop(report_tx);

        let mut learner_handles = Vec::with_capacity(config.num_learner_threads);
        for learner_id in 0..config.num_learner_threads {
            let learner = LearnerLoop::new(
                learner_id,
                config.clone(),
                BatchAssembler::new(Arc::clone(&pool), config.batch_size),
                Arc::clone(&model),
                Arc::clone(&policy_slot),
                learner_bonuses.remove(0),
                Arc::clone(&frames),
                Arc::clone(&learn_lock),
                Arc::clone(&self.shutdown),
                Arc::clone(&sink),
            );
            let handle = thread::Builder::new()
                .name(format!("learner-{}", learner_id))
                .spawn(move || learner.run())
                .expect("failed to spawn learner thread");
            learner_handles.push(handle);
        }

        let mut checkpointer = config.checkpoint_path.as_ref().map(|path| {
            Checkpointer::new(path, Duration::from_secs(config.checkpoint_interval_secs))
        });
        let capture = |frames: u64, states: Option<&dyn ModuleStates>| {
            CheckpointRecord::capture(frames, config, states)
        };

        let mut report = TrainReport::default();
        let mut live_actors = config.num_actors;
        let mut interrupted = false;

        // Supervision loop: watch for the frame target, worker deaths,
        // interrupts, and the checkpoint interval.
        loop {
            if frames.load(Ordering::Acquire) >= config.total_frames {
                break;
            }
            if self.shutdown.load(Ordering::Acquire) {
                interrupted = true;
                warn!("stop signal received, beginning orderly shutdown");
                break;
            }

            while let Ok((actor_id, result)) = report_rx.try_recv() {
                live_actors -= 1;
                match result {
                    Ok(actor_report) => report.actor_reports.push(actor_report),
                    Err(e) => {
                        error!("{}", e);
                        report.worker_failures.push((actor_id, e.to_string()));
                    }
                }
            }
            if live_actors == 0 {
                error!("all actor workers have died, aborting the run");
                break;
            }
            if learner_handles.iter().any(|h| h.is_finished()) {
                // Learners only stop early on error; the join below
                // surfaces it.
                break;
            }

            if let Some(cp) = checkpointer.as_mut() {
                if cp.should_save() {
                    let record = capture(frames.load(Ordering::Acquire), module_states.as_deref());
                    if let Err(e) = cp.save(&record) {
                        error!("checkpoint save failed: {}", e);
                    }
                }
            }

            thread::sleep(Duration::from_millis(100));
        }

        // Orderly shutdown: one sentinel per worker, then bounded joins.
        pool.push_actor_shutdown(config.num_actors);
        pool.push_learner_shutdown(config.num_learner_threads);

        let mut learner_error = None;
        for handle in learner_handles {
            match handle.join() {
                Ok(Ok(learner_report)) => report.learner_steps += learner_report.steps,
                Ok(Err(e)) => {
                    error!("{}", e);
                    learner_error = Some(e);
                }
                Err(_) => {
                    learner_error = Some(TrainError::NumericalDegenerate(
                        "learner thread panicked".into(),
                    ));
                }
            }
        }

        let deadline = Instant::now() + Duration::from_secs(config.join_timeout_secs);
        for handle in actor_handles {
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(10));
            }
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                warn!("an actor thread did not stop within the join timeout; detaching it");
            }
        }
        while let Ok((actor_id, result)) = report_rx.try_recv() {
            match result {
                Ok(actor_report) => report.actor_reports.push(actor_report),
                Err(e) => report.worker_failures.push((actor_id, e.to_string())),
            }
        }

        report.frames = frames.load(Ordering::Acquire);

        // Final checkpoint regardless of how the run ended.
        if let Some(cp) = checkpointer.as_mut() {
            let record = capture(report.frames, module_states.as_deref());
            if let Err(e) = cp.save(&record) {
                error!("final checkpoint save failed: {}", e);
            }
        }
        sink.lock().flush();

        if let Some(e) = learner_error {
            return Err(e);
        }
        if live_actors == 0 {
            let (actor_id, reason) = report
                .worker_failures
                .first()
                .cloned()
                .unwrap_or((0, "unknown".into()));
            return Err(TrainError::WorkerFatal { actor_id, reason });
        }
        if interrupted {
            info!(
                "interrupted after {} frames; checkpoint written and workers drained",
                report.frames
            );
            return Err(TrainError::Interrupted);
        }

        info!(
            "run finished: {} frames, {} learner steps, {} worker failures",
            report.frames,
            report.learner_steps,
            report.worker_failures.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::Batch;
    use crate::bonus::{AuxLoss, BonusKind};
    use crate::env::{EnvError, EnvStep};
    use crate::learner::VtraceTargets;
    use crate::metrics::NullSink;
    use crate::model::{PolicyState, PolicyStep, UnrollOutput, UpdateStats};
    use tempfile::tempdir;

    struct SmokeEnv {
        counter: f32,
        steps_in_episode: u32,
        period: u32,
        fail_immediately: bool,
    }

    impl SmokeEnv {
        fn new(period: u32) -> Self {
            Self {
                counter: 0.0,
                steps_in_episode: 0,
                period,
                fail_immediately: false,
            }
        }
    }

    impl Environment for SmokeEnv {
        fn reset(&mut self) -> Result<Vec<f32>, EnvError> {
            self.counter = 0.0;
            self.steps_in_episode = 0;
            Ok(vec![0.0, 0.0])
        }
        fn step(&mut self, _action: u32) -> Result<EnvStep, EnvError> {
            if self.fail_immediately {
                return Err(EnvError::new("dead on arrival"));
            }
            self.counter += 1.0;
            self.steps_in_episode += 1;
            let terminated = self.steps_in_episode >= self.period;
            if terminated {
                self.steps_in_episode = 0;
                self.counter = 0.0;
            }
            Ok(EnvStep {
                observation: vec![self.counter, 1.0],
                reward: if terminated { 1.0 } else { 0.0 },
                terminated,
                truncated: false,
            })
        }
        fn n_actions(&self) -> usize {
            2
        }
        fn observation_len(&self) -> usize {
            2
        }
    }

    struct UniformPolicy;

    impl Policy for UniformPolicy {
        fn initial_state(&self) -> PolicyState {
            vec![0.0]
        }
        fn step(
            &self,
            _observation: &[f32],
            state: &PolicyState,
            _exploration_logits: Option<&[f32]>,
        ) -> PolicyStep {
            PolicyStep {
                logits: vec![0.0, 0.0],
                value: 0.0,
                state: vec![state[0] + 1.0],
            }
        }
    }

    #[derive(Default)]
    struct SmokeModel;

    impl LearnerModel for SmokeModel {
        fn unroll(&self, batch: &Batch) -> UnrollOutput {
            let rows = batch.unroll_length() + 1;
            UnrollOutput {
                logits: vec![vec![vec![0.0, 0.0]; rows]; batch.batch_size()],
                values: vec![vec![0.0; rows]; batch.batch_size()],
            }
        }
        fn apply_update(
            &self,
            _batch: &Batch,
            _targets: &VtraceTargets,
            _aux: &[AuxLoss],
            _lr: f64,
        ) -> UpdateStats {
            UpdateStats::default()
        }
        fn snapshot(&self) -> Arc<dyn Policy> {
            Arc::new(UniformPolicy)
        }
    }

    fn small_config() -> TrainConfig {
        TrainConfig::new()
            .with_total_frames(32)
            .with_unroll_length(4)
            .with_batch_size(2)
            .with_num_buffers(4)
            .with_num_actors(2)
            .with_num_learner_threads(1)
            .with_bonus(BonusKind::Count)
    }

    #[test]
    fn test_invalid_config_rejected_before_spawning() {
        let config = small_config().with_num_buffers(1);
        assert!(matches!(Trainer::new(config), Err(TrainError::Config(_))));
    }

    #[test]
    fn test_smoke_run_reaches_frame_target() {
        let dir = tempdir().unwrap();
        let ckpt = dir.path().join("model.json");
        let mut config = small_config().with_checkpoint_path(&ckpt);
        config.checkpoint_interval_secs = 0;

        let trainer = Trainer::new(config).unwrap();
        let report = trainer
            .run(
                Arc::new(SmokeModel),
                |_actor_id| Ok(SmokeEnv::new(6)),
                BonusNetworks::default(),
                None,
                Box::new(NullSink),
                None,
            )
            .expect("smoke run should succeed");

        assert!(report.frames >= 32, "frames = {}", report.frames);
        assert!(report.learner_steps >= 4);
        assert!(report.worker_failures.is_empty());
        // Both actors stopped cleanly on their sentinels.
        assert_eq!(report.actor_reports.len(), 2);
        // Final checkpoint written.
        assert!(ckpt.exists());
        let record = Checkpointer::load(&ckpt).unwrap();
        assert_eq!(record.frames, report.frames);
        assert!(record.config.is_some());
    }

    #[test]
    fn test_stop_signal_interrupts_orderly() {
        let config = small_config().with_total_frames(1_000_000_000);
        let trainer = Trainer::new(config).unwrap();

        let shutdown = trainer.shutdown_handle();
        let signal = thread::spawn(move || {
            thread::sleep(Duration::from_millis(300));
            shutdown.store(true, Ordering::Release);
        });

        let result = trainer.run(
            Arc::new(SmokeModel),
            |_actor_id| Ok(SmokeEnv::new(6)),
            BonusNetworks::default(),
            None,
            Box::new(NullSink),
            None,
        );

        signal.join().unwrap();
        // Shutdown was orderly (workers drained, joins completed) but the
        // run still reports the interruption.
        assert!(matches!(result, Err(TrainError::Interrupted)));
    }

    #[test]
    fn test_all_actors_dead_is_fatal() {
        let config = small_config().with_total_frames(1_000_000_000);
        let trainer = Trainer::new(config).unwrap();

        let result = trainer.run(
            Arc::new(SmokeModel),
            |_actor_id| {
                let mut env = SmokeEnv::new(6);
                env.fail_immediately = true;
                Ok(env)
            },
            BonusNetworks::default(),
            None,
            Box::new(NullSink),
            None,
        );

        assert!(matches!(result, Err(TrainError::WorkerFatal { .. })));
    }

    #[test]
    fn test_env_factory_error_propagates_before_spawn() {
        let trainer = Trainer::new(small_config()).unwrap();
        let result = trainer.run(
            Arc::new(SmokeModel),
            |actor_id| -> Result<SmokeEnv, TrainError> {
                Err(TrainError::Config(format!(
                    "no simulator available for actor {}",
                    actor_id
                )))
            },
            BonusNetworks::default(),
            None,
            Box::new(NullSink),
            None,
        );
        assert!(matches!(result, Err(TrainError::Config(_))));
    }
}
