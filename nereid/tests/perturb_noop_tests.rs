// tests/perturb_noop_tests.rs
//
// The no-op contract: a disabled perturbation leaves stepping exactly
// equal to the plain path, and degenerate noise settings (zero mean,
// zero spread) do not move the trajectory either.

use std::fs;
use std::path::PathBuf;

use nereid::{
    EnvConfig, NoiseFactor, NoiseKind, PerturbConfig, StepResult, SwimmerEnv,
};

fn run(perturb: PerturbConfig, model_path: Option<String>, seed: u64) -> Vec<StepResult> {
    let env_config = EnvConfig {
        model_path: model_path.unwrap_or_else(|| "swimmer.xml".to_string()),
        ..EnvConfig::default()
    };
    let mut env = SwimmerEnv::new(env_config, perturb).unwrap();
    env.reset(Some(seed)).unwrap();
    (0..25)
        .map(|i| {
            let a = (i as f64 * 0.21).sin();
            env.step(&[a, -a]).unwrap()
        })
        .collect()
}

fn strip_perturbation(results: Vec<StepResult>) -> Vec<StepResult> {
    results
        .into_iter()
        .map(|mut r| {
            r.info.perturbation = None;
            r
        })
        .collect()
}

#[test]
fn disabled_factor_matches_plain_path_exactly() {
    let plain = run(PerturbConfig::default(), None, 42);
    // A disabled factor with exotic settings elsewhere must change nothing.
    let mut cfg = PerturbConfig::default();
    cfg.kind = NoiseKind::Shift;
    cfg.noise_shift = 123.0;
    cfg.noise_sigma = 9.0;
    assert_eq!(cfg.factor, NoiseFactor::Disabled);
    let disabled = run(cfg, None, 42);
    assert_eq!(plain, disabled);
}

#[test]
fn zero_width_action_noise_is_a_no_op() {
    let plain = run(PerturbConfig::default(), None, 7);

    let mut cfg = PerturbConfig::with_factor(NoiseFactor::Action);
    cfg.noise_mu = 0.0;
    cfg.noise_sigma = 0.0;
    let noised = run(cfg, None, 7);

    // The perturbed run tags each step with a zero offset; everything
    // else must match.
    for r in &noised {
        let applied = r.info.perturbation.as_ref().unwrap();
        assert_eq!(applied.offset, 0.0);
    }
    assert_eq!(plain, strip_perturbation(noised));
}

#[test]
fn zero_width_observation_noise_is_a_no_op() {
    let plain = run(PerturbConfig::default(), None, 8);

    let mut cfg = PerturbConfig::with_factor(NoiseFactor::Observation);
    cfg.noise_mu = 0.0;
    cfg.noise_sigma = 0.0;
    let noised = run(cfg, None, 8);

    assert_eq!(plain, strip_perturbation(noised));
}

#[test]
fn zero_shift_gear_noise_leaves_trajectory_unchanged() {
    // Patching gear with a +0 shift exercises the full patch / reload /
    // restore cycle without changing physics.
    let dir = tempfile::tempdir().unwrap();
    let stock = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("assets")
        .join("swimmer.xml");
    let scratch = dir.path().join("swimmer.xml");
    fs::copy(&stock, &scratch).unwrap();
    let scratch = scratch.to_string_lossy().into_owned();

    let plain = run(PerturbConfig::default(), Some(scratch.clone()), 11);

    let mut cfg = PerturbConfig::with_factor(NoiseFactor::ActuatorGear);
    cfg.kind = NoiseKind::Shift;
    cfg.noise_shift = 0.0;
    let noised = run(cfg, Some(scratch), 11);

    for r in &noised {
        let applied = r.info.perturbation.as_ref().unwrap();
        assert_eq!(applied.offset, 0.0);
    }
    assert_eq!(plain, strip_perturbation(noised));
}
