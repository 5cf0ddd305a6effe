//! Metrics sinks.
//!
//! The learner emits one flat `name → scalar` record per completed learning
//! step. Sinks are deliberately dumb: they receive the record and format
//! it; aggregation happens upstream.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;

/// Receiver of per-step training metrics.
pub trait MetricsSink: Send {
    /// Record one learning step's metrics.
    fn record(&mut self, frames: u64, metrics: &[(&'static str, f64)]);

    /// Flush any buffered output.
    fn flush(&mut self) {}
}

/// Sink that drops everything.
#[derive(Debug, Default)]
pub struct NullSink;

impl MetricsSink for NullSink {
    fn record(&mut self, _frames: u64, _metrics: &[(&'static str, f64)]) {}
}

/// Console logger printing a compact line at a frame interval.
pub struct ConsoleSink {
    log_interval_frames: u64,
    last_logged: u64,
    start: Instant,
}

impl ConsoleSink {
    /// Log roughly every `log_interval_frames` frames.
    pub fn new(log_interval_frames: u64) -> Self {
        Self {
            log_interval_frames,
            last_logged: 0,
            start: Instant::now(),
        }
    }

    fn lookup(metrics: &[(&'static str, f64)], key: &str) -> f64 {
        metrics
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, v)| *v)
            .unwrap_or(0.0)
    }
}

impl MetricsSink for ConsoleSink {
    fn record(&mut self, frames: u64, metrics: &[(&'static str, f64)]) {
        if frames < self.last_logged + self.log_interval_frames {
            return;
        }
        self.last_logged = frames;

        let elapsed = self.start.elapsed().as_secs_f64();
        let fps = if elapsed > 0.0 {
            frames as f64 / elapsed
        } else {
            0.0
        };
        println!(
            "frames {:>10} | fps {:>8.0} | loss {:>9.4} | return {:>8.2} | win {:>5.2} | intrinsic {:>8.4}",
            frames,
            fps,
            Self::lookup(metrics, "total_loss"),
            Self::lookup(metrics, "mean_episode_return"),
            Self::lookup(metrics, "episode_win_rate"),
            Self::lookup(metrics, "mean_intrinsic_reward"),
        );
    }

    fn flush(&mut self) {
        let _ = std::io::stdout().flush();
    }
}

/// CSV logger with columns fixed by the first record.
pub struct CsvSink {
    writer: BufWriter<File>,
    columns: Vec<&'static str>,
    wrote_header: bool,
}

impl CsvSink {
    /// Create a CSV sink writing to `path`.
    pub fn new(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            columns: Vec::new(),
            wrote_header: false,
        })
    }
}

impl MetricsSink for CsvSink {
    fn record(&mut self, frames: u64, metrics: &[(&'static str, f64)]) {
        if !self.wrote_header {
            self.columns = metrics.iter().map(|(name, _)| *name).collect();
            let header: Vec<&str> = std::iter::once("frames")
                .chain(self.columns.iter().copied())
                .collect();
            let _ = writeln!(self.writer, "{}", header.join(","));
            self.wrote_header = true;
        }

        let mut row = vec![frames.to_string()];
        for column in &self.columns {
            let value = metrics
                .iter()
                .find(|(name, _)| name == column)
                .map(|(_, v)| format!("{:.6}", v))
                .unwrap_or_default();
            row.push(value);
        }
        let _ = writeln!(self.writer, "{}", row.join(","));
    }

    fn flush(&mut self) {
        let _ = self.writer.flush();
    }
}

impl Drop for CsvSink {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Fan-out to several sinks.
#[derive(Default)]
pub struct MultiSink {
    sinks: Vec<Box<dyn MetricsSink>>,
}

impl MultiSink {
    /// Create an empty multi-sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink.
    pub fn add<S: MetricsSink + 'static>(mut self, sink: S) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }
}

impl MetricsSink for MultiSink {
    fn record(&mut self, frames: u64, metrics: &[(&'static str, f64)]) {
        for sink in &mut self.sinks {
            sink.record(frames, metrics);
        }
    }

    fn flush(&mut self) {
        for sink in &mut self.sinks {
            sink.flush();
        }
    }
}
