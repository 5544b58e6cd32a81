// src/main.rs
//
// Research-harness CLI for the nereid swimmer environment.
//
// Constraints:
// - Noise-factor precedence: --factor overrides env;
//   if missing use NEREID_NOISE_FACTOR (default disabled).
// - Deterministic runs via --seed (per-episode seeds derived from it).
// - Episode count / length, optional JSONL telemetry, verbosity.
// - Print a concise run header and per-run return statistics.

use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};

use nereid::env::{EnvConfig, SwimmerEnv};
use nereid::metrics::{DrawdownTracker, OnlineStats};
use nereid::perturb::{NoiseFactor, NoiseKind, PerturbConfig};
use nereid::telemetry::{EpisodeSummary, EventSink, FileSink, NoopSink, StepRecord};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

#[derive(Copy, Clone, Debug, ValueEnum)]
enum FactorArg {
    Disabled,
    Action,
    Observation,
    Reward,
    ActuatorGear,
    BodyShape,
}

impl From<FactorArg> for NoiseFactor {
    fn from(arg: FactorArg) -> Self {
        match arg {
            FactorArg::Disabled => NoiseFactor::Disabled,
            FactorArg::Action => NoiseFactor::Action,
            FactorArg::Observation => NoiseFactor::Observation,
            FactorArg::Reward => NoiseFactor::Reward,
            FactorArg::ActuatorGear => NoiseFactor::ActuatorGear,
            FactorArg::BodyShape => NoiseFactor::BodyShape,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum KindArg {
    Gauss,
    Shift,
    Uniform,
}

impl From<KindArg> for NoiseKind {
    fn from(arg: KindArg) -> Self {
        match arg {
            KindArg::Gauss => NoiseKind::Gauss,
            KindArg::Shift => NoiseKind::Shift,
            KindArg::Uniform => NoiseKind::Uniform,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "nereid",
    about = "Perturbation-aware swimmer environment (research harness)",
    version
)]
struct Args {
    /// Number of episodes to run.
    #[arg(long, default_value_t = 10)]
    episodes: u64,

    /// Steps per episode.
    #[arg(long, default_value_t = 1000)]
    steps: u64,

    /// Deterministic base seed; episode i runs under seed + i.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Perturbation target (optional).
    /// If omitted, uses NEREID_NOISE_FACTOR (default disabled).
    #[arg(long, value_enum)]
    factor: Option<FactorArg>,

    /// Perturbation kind.
    #[arg(long, value_enum, default_value = "gauss")]
    kind: KindArg,

    /// Gaussian mean for action/observation/reward noise.
    #[arg(long, default_value_t = 0.0)]
    mu: f64,

    /// Gaussian stddev for action/observation/reward noise.
    #[arg(long, default_value_t = 0.01)]
    sigma: f64,

    /// Constant offset for the shift kind.
    #[arg(long, default_value_t = 0.005)]
    shift: f64,

    /// Model description file; bare names resolve against assets/.
    #[arg(long, default_value = "swimmer.xml")]
    model: String,

    /// Write step/episode telemetry as JSONL to this path.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Verbosity: -v prints per-episode lines.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

/// Resolve the effective noise factor using standard precedence:
/// CLI > NEREID_NOISE_FACTOR env var > disabled.
fn resolve_effective_factor(cli: Option<NoiseFactor>) -> (NoiseFactor, &'static str) {
    if let Some(factor) = cli {
        return (factor, "cli");
    }
    if let Ok(value) = std::env::var("NEREID_NOISE_FACTOR") {
        if let Some(factor) = NoiseFactor::parse(&value) {
            return (factor, "env");
        }
        eprintln!("ignoring unrecognized NEREID_NOISE_FACTOR={value:?}");
    }
    (NoiseFactor::Disabled, "default")
}

fn run(args: &Args) -> nereid::Result<()> {
    let (factor, source) = resolve_effective_factor(args.factor.map(Into::into));
    eprintln!("effective_noise_factor={} source={}", factor.as_str(), source);

    let perturb_config = PerturbConfig {
        factor,
        kind: args.kind.into(),
        noise_mu: args.mu,
        noise_sigma: args.sigma,
        noise_shift: args.shift,
        ..PerturbConfig::default()
    };
    let env_config = EnvConfig {
        model_path: args.model.clone(),
        max_steps: args.steps,
        ..EnvConfig::default()
    };

    let mut env = SwimmerEnv::new(env_config, perturb_config.clone())?;

    let mut file_sink;
    let mut noop_sink = NoopSink;
    let sink: &mut dyn EventSink = match &args.out {
        Some(path) => {
            file_sink = FileSink::create(path)?;
            &mut file_sink
        }
        None => &mut noop_sink,
    };

    eprintln!(
        "run: episodes={} steps={} seed={} factor={} kind={} model={}",
        args.episodes,
        args.steps,
        args.seed,
        factor.as_str(),
        perturb_config.kind.as_str(),
        args.model,
    );

    let mut returns = OnlineStats::default();
    let mut final_x = OnlineStats::default();
    let mut drawdown = DrawdownTracker::default();
    let mut cumulative_return = 0.0;

    // Exploration policy: uniform random torques, seeded so the whole
    // run replays exactly.
    let mut policy_rng = ChaCha8Rng::seed_from_u64(args.seed);
    let num_actuators = env.num_actuators();

    for episode in 0..args.episodes {
        let seed = args.seed.wrapping_add(episode);
        env.reset(Some(seed))?;

        let mut episode_return = 0.0;
        let mut length = 0u64;
        let mut last_x = 0.0;
        loop {
            let action: Vec<f64> = (0..num_actuators)
                .map(|_| policy_rng.gen_range(-1.0..1.0))
                .collect();
            let result = env.step(&action)?;
            episode_return += result.reward;
            length += 1;
            last_x = result.info.x_position;
            sink.log_step(&StepRecord::from_step(episode, &result));
            if result.truncated {
                break;
            }
        }

        sink.log_episode(&EpisodeSummary {
            episode,
            seed,
            length,
            episode_return,
            final_x: last_x,
            truncated: true,
        });

        returns.add(episode_return);
        final_x.add(last_x);
        cumulative_return += episode_return;
        drawdown.add(cumulative_return);

        if args.verbose > 0 {
            eprintln!(
                "episode={episode} seed={seed} length={length} return={episode_return:.6} final_x={last_x:.4}"
            );
        }
    }

    println!(
        "episodes={} return_mean={:.6} return_std={:.6} return_min={:.6} return_max={:.6} final_x_mean={:.4} max_drawdown={:.6}",
        returns.n(),
        returns.mean(),
        returns.std(),
        returns.min(),
        returns.max(),
        final_x.mean(),
        drawdown.max_drawdown(),
    );

    Ok(())
}

fn main() {
    let args = Args::parse();
    if let Err(e) = run(&args) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
