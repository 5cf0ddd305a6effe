//! Checkpointing.
//!
//! A checkpoint is one structured record: opaque serialized parameters for
//! every trainable module, per-module optimizer states, the learning-rate
//! schedule, the frame count, and the full run configuration. Every field
//! is optional on load — whatever is present gets restored, the rest is
//! left at its freshly initialized value.
//!
//! Saves happen on a fixed wall-clock interval and once more at shutdown.
//! The record is written to a temporary file and renamed into place so a
//! crash mid-save never corrupts the previous checkpoint.

use std::collections::BTreeMap;
use std::fs;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use log::info;
use serde::{Deserialize, Serialize};

use crate::config::TrainConfig;
use crate::error::TrainError;
use crate::model::ModuleStates;
use crate::scheduling::LrSchedule;

/// Persisted training state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckpointRecord {
    /// Frames processed when the checkpoint was taken.
    pub frames: u64,
    /// Serialized parameters per trainable module.
    #[serde(default)]
    pub modules: BTreeMap<String, Vec<u8>>,
    /// Serialized optimizer state per module.
    #[serde(default)]
    pub optimizers: BTreeMap<String, Vec<u8>>,
    /// Learning-rate schedule in effect.
    #[serde(default)]
    pub schedule: Option<LrSchedule>,
    /// Full run configuration.
    #[serde(default)]
    pub config: Option<TrainConfig>,
}

impl CheckpointRecord {
    /// Build a record from the live training state.
    pub fn capture(
        frames: u64,
        config: &TrainConfig,
        module_states: Option<&dyn ModuleStates>,
    ) -> Self {
        let (modules, optimizers) = match module_states {
            Some(states) => (states.save_modules(), states.save_optimizers()),
            None => (BTreeMap::new(), BTreeMap::new()),
        };
        Self {
            frames,
            modules,
            optimizers,
            schedule: Some(config.lr_schedule.clone()),
            config: Some(config.clone()),
        }
    }

    /// Restore whatever fields are present into the live modules.
    pub fn restore(&self, module_states: &mut dyn ModuleStates) {
        if !self.modules.is_empty() {
            module_states.load_modules(&self.modules);
        }
        if !self.optimizers.is_empty() {
            module_states.load_optimizers(&self.optimizers);
        }
    }
}

/// Interval-driven checkpoint writer.
pub struct Checkpointer {
    path: PathBuf,
    interval: Duration,
    last_save: Instant,
}

impl Checkpointer {
    /// Create a checkpointer writing to `path` every `interval` of wall
    /// clock. The first interval starts now.
    pub fn new(path: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            path: path.into(),
            interval,
            last_save: Instant::now(),
        }
    }

    /// Destination path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the wall-clock interval has elapsed since the last save.
    pub fn should_save(&self) -> bool {
        self.last_save.elapsed() >= self.interval
    }

    /// Write a record, replacing the previous checkpoint atomically.
    pub fn save(&mut self, record: &CheckpointRecord) -> Result<(), TrainError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        {
            let file = fs::File::create(&tmp)?;
            let writer = BufWriter::new(file);
            serde_json::to_writer(writer, record)
                .map_err(|e| TrainError::Checkpoint(e.to_string()))?;
        }
        fs::rename(&tmp, &self.path)?;
        self.last_save = Instant::now();
        info!(
            "wrote checkpoint at {} frames to {}",
            record.frames,
            self.path.display()
        );
        Ok(())
    }

    /// Load a record from a path.
    pub fn load(path: impl AsRef<Path>) -> Result<CheckpointRecord, TrainError> {
        let file = fs::File::open(path.as_ref())?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader).map_err(|e| TrainError::Checkpoint(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    struct RecordingStates {
        saved_modules: BTreeMap<String, Vec<u8>>,
        loaded_modules: Option<BTreeMap<String, Vec<u8>>>,
        loaded_optimizers: Option<BTreeMap<String, Vec<u8>>>,
    }

    impl RecordingStates {
        fn new() -> Self {
            let mut saved_modules = BTreeMap::new();
            saved_modules.insert("policy".into(), vec![1, 2, 3]);
            saved_modules.insert("state_embedding".into(), vec![4, 5]);
            Self {
                saved_modules,
                loaded_modules: None,
                loaded_optimizers: None,
            }
        }
    }

    impl ModuleStates for RecordingStates {
        fn save_modules(&self) -> BTreeMap<String, Vec<u8>> {
            self.saved_modules.clone()
        }
        fn save_optimizers(&self) -> BTreeMap<String, Vec<u8>> {
            let mut map = BTreeMap::new();
            map.insert("policy".into(), vec![9]);
            map
        }
        fn load_modules(&mut self, modules: &BTreeMap<String, Vec<u8>>) {
            self.loaded_modules = Some(modules.clone());
        }
        fn load_optimizers(&mut self, optimizers: &BTreeMap<String, Vec<u8>>) {
            self.loaded_optimizers = Some(optimizers.clone());
        }
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ckpt/model.json");
        let config = TrainConfig::default();
        let states = RecordingStates::new();

        let record = CheckpointRecord::capture(12_345, &config, Some(&states));
        let mut checkpointer = Checkpointer::new(&path, Duration::from_secs(3600));
        checkpointer.save(&record).unwrap();

        let loaded = Checkpointer::load(&path).unwrap();
        assert_eq!(loaded.frames, 12_345);
        assert_eq!(loaded.modules.get("policy").unwrap(), &vec![1, 2, 3]);
        assert_eq!(loaded.optimizers.get("policy").unwrap(), &vec![9]);
        assert!(loaded.schedule.is_some());
        assert_eq!(loaded.config.as_ref().unwrap().total_frames, config.total_frames);
    }

    #[test]
    fn test_restore_applies_present_fields() {
        let config = TrainConfig::default();
        let source = RecordingStates::new();
        let record = CheckpointRecord::capture(1, &config, Some(&source));

        let mut target = RecordingStates::new();
        record.restore(&mut target);
        assert_eq!(
            target.loaded_modules.unwrap().get("policy").unwrap(),
            &vec![1, 2, 3]
        );
        assert!(target.loaded_optimizers.is_some());
    }

    #[test]
    fn test_missing_fields_load_as_empty() {
        // A minimal record with only a frame count still loads; every other
        // field falls back to its default.
        let dir = tempdir().unwrap();
        let path = dir.path().join("minimal.json");
        fs::write(&path, r#"{"frames": 7}"#).unwrap();

        let record = Checkpointer::load(&path).unwrap();
        assert_eq!(record.frames, 7);
        assert!(record.modules.is_empty());
        assert!(record.schedule.is_none());
        assert!(record.config.is_none());

        // Restoring an empty record touches nothing.
        let mut target = RecordingStates::new();
        record.restore(&mut target);
        assert!(target.loaded_modules.is_none());
    }

    #[test]
    fn test_should_save_respects_interval() {
        let dir = tempdir().unwrap();
        let checkpointer = Checkpointer::new(dir.path().join("c.json"), Duration::from_secs(3600));
        assert!(!checkpointer.should_save());

        let checkpointer = Checkpointer::new(dir.path().join("c.json"), Duration::from_secs(0));
        assert!(checkpointer.should_save());
    }

    #[test]
    fn test_corrupt_checkpoint_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "not json").unwrap();
        let err = Checkpointer::load(&path).unwrap_err();
        assert!(matches!(err, TrainError::Checkpoint(_)));
    }
}
