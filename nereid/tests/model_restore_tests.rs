// tests/model_restore_tests.rs
//
// The model-file contract: a physical-parameter perturbation rewrites
// the document for the duration of one step and the file is back to
// its pristine content, byte for byte, before step returns. Misses
// (unknown joint/body) leave the file untouched and do not error.
//
// Each test works on its own tempdir copy of the stock model so tests
// can run in parallel without sharing a mutable file.

use std::fs;
use std::path::{Path, PathBuf};

use nereid::{EnvConfig, ModelFile, NoiseFactor, NoiseKind, PerturbConfig, SwimmerEnv};

fn stock_model_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("assets")
        .join("swimmer.xml")
}

/// Copy the stock model into a tempdir and return (dir guard, path).
fn scratch_model() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("swimmer.xml");
    fs::copy(stock_model_path(), &path).unwrap();
    (dir, path)
}

fn env_with(model_path: &Path, perturb: PerturbConfig) -> SwimmerEnv {
    let env_config = EnvConfig {
        model_path: model_path.to_string_lossy().into_owned(),
        ..EnvConfig::default()
    };
    SwimmerEnv::new(env_config, perturb).unwrap()
}

#[test]
fn gear_perturbation_restores_file_after_step() {
    let (_dir, path) = scratch_model();
    let pristine = fs::read_to_string(&path).unwrap();

    let mut env = env_with(&path, PerturbConfig::with_factor(NoiseFactor::ActuatorGear));
    env.reset(Some(42)).unwrap();
    for _ in 0..5 {
        let result = env.step(&[0.5, -0.5]).unwrap();
        let applied = result.info.perturbation.expect("gear patch must apply");
        assert_eq!(applied.factor, NoiseFactor::ActuatorGear);
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            pristine,
            "model file must be byte-identical after the step"
        );
    }
}

#[test]
fn shape_perturbation_restores_file_after_step() {
    let (_dir, path) = scratch_model();
    let pristine = fs::read_to_string(&path).unwrap();

    let mut env = env_with(&path, PerturbConfig::with_factor(NoiseFactor::BodyShape));
    env.reset(Some(43)).unwrap();
    for _ in 0..5 {
        let result = env.step(&[0.25, 0.25]).unwrap();
        let applied = result.info.perturbation.expect("shape patch must apply");
        assert_eq!(applied.factor, NoiseFactor::BodyShape);
        assert_eq!(fs::read_to_string(&path).unwrap(), pristine);
    }
}

#[test]
fn unknown_joint_is_logged_and_skipped() {
    let (_dir, path) = scratch_model();
    let pristine = fs::read_to_string(&path).unwrap();

    let mut perturb = PerturbConfig::with_factor(NoiseFactor::ActuatorGear);
    perturb.gear_joint = "hip_4".to_string();
    let mut env = env_with(&path, perturb);
    env.reset(Some(1)).unwrap();

    let result = env.step(&[0.0, 0.0]).unwrap();
    assert!(result.info.perturbation.is_none());
    assert_eq!(fs::read_to_string(&path).unwrap(), pristine);
}

#[test]
fn unknown_body_is_logged_and_skipped() {
    let (_dir, path) = scratch_model();
    let pristine = fs::read_to_string(&path).unwrap();

    let mut perturb = PerturbConfig::with_factor(NoiseFactor::BodyShape);
    perturb.shape_body = "left_leg".to_string();
    let mut env = env_with(&path, perturb);
    env.reset(Some(1)).unwrap();

    let result = env.step(&[0.0, 0.0]).unwrap();
    assert!(result.info.perturbation.is_none());
    assert_eq!(fs::read_to_string(&path).unwrap(), pristine);
}

#[test]
fn gear_patch_changes_dynamics_for_the_step() {
    // A large constant gear shift must change the trajectory relative
    // to an unperturbed run with the same seed and actions.
    let (_dir, path_a) = scratch_model();
    let (_dir_b, path_b) = scratch_model();

    let mut shifted = PerturbConfig::with_factor(NoiseFactor::ActuatorGear);
    shifted.kind = NoiseKind::Shift;
    shifted.noise_shift = 100.0;
    let mut perturbed = env_with(&path_a, shifted);
    let mut plain = env_with(&path_b, PerturbConfig::default());

    perturbed.reset(Some(9)).unwrap();
    plain.reset(Some(9)).unwrap();

    let mut diverged = false;
    for _ in 0..10 {
        let a = perturbed.step(&[0.8, -0.2]).unwrap();
        let b = plain.step(&[0.8, -0.2]).unwrap();
        if a.observation != b.observation {
            diverged = true;
            break;
        }
    }
    assert!(diverged, "gear shift must affect the trajectory");
}

#[test]
fn model_file_patch_and_restore_round_trip() {
    let (_dir, path) = scratch_model();
    let pristine = fs::read_to_string(&path).unwrap();

    let mut model = ModelFile::load(&path.to_string_lossy()).unwrap();
    model.patch_actuator_gear("motor1_rot", &|g| g + 25.0).unwrap();
    assert_ne!(fs::read_to_string(&path).unwrap(), pristine);
    model.restore().unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), pristine);
}

#[test]
fn missing_model_file_is_an_io_style_error() {
    let env_config = EnvConfig {
        model_path: "/nonexistent/swimmer.xml".to_string(),
        ..EnvConfig::default()
    };
    let err = SwimmerEnv::new(env_config, PerturbConfig::default()).unwrap_err();
    assert!(matches!(err, nereid::Error::ModelNotFound(_)));
}
