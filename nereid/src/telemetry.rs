// src/telemetry.rs
//
// Telemetry sinks for the research harness.
// - EventSink: trait consumed by the episode runner
// - NoopSink:  discards all events
// - FileSink:  one JSON object per line, for offline analysis / replay

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::env::{StepInfo, StepResult};
use crate::observation::OBS_VERSION;
use crate::perturb::AppliedPerturbation;

/// Per-step record written to the JSONL stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    /// Observation schema version.
    pub obs_version: u32,
    /// Episode index within the run.
    pub episode: u64,
    /// Step index within the episode.
    pub step_index: u64,
    /// Scalar reward.
    pub reward: f64,
    /// Forward-velocity reward term.
    pub reward_fwd: f64,
    /// Control-cost reward term (negative).
    pub reward_ctrl: f64,
    /// Root x position.
    pub x_position: f64,
    /// Root x velocity.
    pub x_velocity: f64,
    /// Whether this step truncated the episode.
    pub truncated: bool,
    /// Perturbation applied this step, if any.
    pub perturbation: Option<AppliedPerturbation>,
}

impl StepRecord {
    pub fn from_step(episode: u64, result: &StepResult) -> Self {
        let StepInfo {
            reward_fwd,
            reward_ctrl,
            x_position,
            x_velocity,
            step_index,
            ref perturbation,
            ..
        } = result.info;
        Self {
            obs_version: OBS_VERSION,
            episode,
            step_index,
            reward: result.reward,
            reward_fwd,
            reward_ctrl,
            x_position,
            x_velocity,
            truncated: result.truncated,
            perturbation: perturbation.clone(),
        }
    }
}

/// Per-episode record written when an episode ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeSummary {
    /// Episode index within the run.
    pub episode: u64,
    /// Seed the episode ran under.
    pub seed: u64,
    /// Number of steps taken.
    pub length: u64,
    /// Sum of rewards.
    pub episode_return: f64,
    /// Final root x position.
    pub final_x: f64,
    /// Whether the episode ended by truncation.
    pub truncated: bool,
}

/// Abstract sink for run telemetry.
pub trait EventSink {
    fn log_step(&mut self, record: &StepRecord);
    fn log_episode(&mut self, summary: &EpisodeSummary);
}

/// Sink that discards all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn log_step(&mut self, _record: &StepRecord) {}
    fn log_episode(&mut self, _summary: &EpisodeSummary) {}
}

/// JSONL file sink. Step and episode records share the stream, tagged
/// by a `kind` field.
pub struct FileSink {
    writer: BufWriter<File>,
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Line<'a> {
    Step(&'a StepRecord),
    Episode(&'a EpisodeSummary),
}

impl FileSink {
    /// Create a new sink writing to `path`.
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    fn write_line(&mut self, line: &Line<'_>) {
        // Telemetry must not take the run down with it, so I/O and
        // encoding errors are dropped.
        if let Ok(mut bytes) = serde_json::to_vec(line) {
            bytes.push(b'\n');
            let _ = self.writer.write_all(&bytes);
        }
    }

    /// Flush buffered lines to disk.
    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl EventSink for FileSink {
    fn log_step(&mut self, record: &StepRecord) {
        self.write_line(&Line::Step(record));
    }

    fn log_episode(&mut self, summary: &EpisodeSummary) {
        self.write_line(&Line::Episode(summary));
        let _ = self.writer.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn sample_summary() -> EpisodeSummary {
        EpisodeSummary {
            episode: 0,
            seed: 42,
            length: 10,
            episode_return: 1.25,
            final_x: 0.4,
            truncated: true,
        }
    }

    #[test]
    fn noop_sink_accepts_events() {
        let mut sink = NoopSink;
        sink.log_episode(&sample_summary());
    }

    #[test]
    fn file_sink_writes_tagged_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.jsonl");
        {
            let mut sink = FileSink::create(&path).unwrap();
            sink.log_episode(&sample_summary());
            sink.flush().unwrap();
        }
        let text = fs::read_to_string(&path).unwrap();
        let line: serde_json::Value = serde_json::from_str(text.trim()).unwrap();
        assert_eq!(line["kind"], "episode");
        assert_eq!(line["seed"], 42);
        assert_eq!(line["episode_return"], 1.25);
    }
}
