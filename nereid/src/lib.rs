//! Nereid core library.
//!
//! Gym-style planar swimmer environment with perturbation injection
//! for robustness research. The binary (`src/main.rs`) is just a thin
//! research harness around these components.
//!
//! # Architecture
//!
//! - **Model** (`model`): the on-disk XML model description — load,
//!   narrow attribute patching (actuator gear, geom size), and
//!   byte-identical restore.
//!
//! - **Dynamics** (`dynamics`): deterministic planar swimmer chain in
//!   a viscous fluid, parameterized entirely by the model description.
//!
//! - **Perturbations** (`perturb`): seeded noise applied to exactly one
//!   of action, observation, reward, or a physical model parameter.
//!
//! - **Environment** (`env`): the reset/step lifecycle consumed by RL
//!   training loops, plus a sequential vectorised wrapper.
//!
//! - **Telemetry** (`telemetry`): JSONL event sinks for offline
//!   analysis, and **Metrics** (`metrics`) for run summaries.
//!
//! Determinism is a design requirement throughout: same seed + same
//! action sequence produces identical observation and reward streams.

pub mod dynamics;
pub mod env;
pub mod error;
pub mod metrics;
pub mod model;
pub mod observation;
pub mod perturb;
pub mod telemetry;

// --- Re-exports for ergonomic external use ---------------------------------

pub use dynamics::SwimmerDynamics;
pub use env::{EnvConfig, StepInfo, StepResult, SwimmerEnv, VecEnv};
pub use error::{Error, Result};
pub use metrics::{DrawdownTracker, OnlineStats};
pub use model::{
    parse_model, resolve_model_path, ActuatorSpec, AttributePatch, JointSpec, ModelFile,
    ModelSpec, SegmentSpec,
};
pub use observation::{Observation, OBS_VERSION};
pub use perturb::{
    apply_offset, AppliedPerturbation, NoiseFactor, NoiseKind, PerturbConfig, PerturbSampler,
};
pub use telemetry::{EpisodeSummary, EventSink, FileSink, NoopSink, StepRecord};
