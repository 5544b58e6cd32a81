// src/env.rs
//
// Gym-style swimmer environment with perturbation injection.
//
// Lifecycle:
// - reset(seed) -> Observation
// - step(action) -> StepResult { observation, reward, terminated, truncated, info }
//
// A model-parameter perturbation rewrites the on-disk model file,
// reloads the affected physical parameters for that step, and restores
// the file to its pristine content before the step returns. Signal
// perturbations (action / observation / reward) never touch the file.
//
// All state transitions are deterministic given the seed.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::dynamics::SwimmerDynamics;
use crate::error::Result;
use crate::model::ModelFile;
use crate::observation::Observation;
use crate::perturb::{
    apply_offset, AppliedPerturbation, NoiseFactor, NoiseKind, PerturbConfig, PerturbSampler,
};

/// Environment configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvConfig {
    /// Model description file; bare names resolve against `assets/`.
    pub model_path: String,
    /// Weight on forward velocity in the reward.
    pub forward_reward_weight: f64,
    /// Weight on the quadratic control cost.
    pub ctrl_cost_weight: f64,
    /// Half-width of the uniform state noise applied at reset.
    pub reset_noise_scale: f64,
    /// Hide the root x/y from observations.
    pub exclude_current_positions_from_observation: bool,
    /// Physics substeps per control step.
    pub frame_skip: usize,
    /// Episode length before truncation.
    pub max_steps: u64,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            model_path: "swimmer.xml".to_string(),
            forward_reward_weight: 1.0,
            ctrl_cost_weight: 1e-4,
            reset_noise_scale: 0.1,
            exclude_current_positions_from_observation: true,
            frame_skip: 4,
            max_steps: 1000,
        }
    }
}

impl EnvConfig {
    /// Config with zero reset noise, for exact-replay tests.
    pub fn deterministic() -> Self {
        Self {
            reset_noise_scale: 0.0,
            ..Self::default()
        }
    }
}

/// Additional information returned from a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepInfo {
    /// Forward-velocity reward term.
    pub reward_fwd: f64,
    /// Control-cost reward term (negative).
    pub reward_ctrl: f64,
    /// Root x position after the step.
    pub x_position: f64,
    /// Root y position after the step.
    pub y_position: f64,
    /// Euclidean distance of the root from the origin.
    pub distance_from_origin: f64,
    /// Root x velocity over the control step.
    pub x_velocity: f64,
    /// Root y velocity over the control step.
    pub y_velocity: f64,
    /// Step index within the episode (1-based after the first step).
    pub step_index: u64,
    /// Model file backing this environment.
    pub model_path: String,
    /// Perturbation applied this step, if any.
    pub perturbation: Option<AppliedPerturbation>,
}

/// Result of a single environment step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// The observation after taking the action.
    pub observation: Observation,
    /// The reward for this step.
    pub reward: f64,
    /// Whether the episode reached a terminal state. The swimmer has
    /// none, so this is always false.
    pub terminated: bool,
    /// Whether the episode hit the step limit.
    pub truncated: bool,
    /// Additional information about the step.
    pub info: StepInfo,
}

/// Gym-style swimmer environment.
#[derive(Debug)]
pub struct SwimmerEnv {
    env_config: EnvConfig,
    perturb_config: PerturbConfig,
    model: ModelFile,
    dynamics: SwimmerDynamics,
    sampler: PerturbSampler,
    /// Reset-noise RNG, reseeded on every reset.
    rng: ChaCha8Rng,
    step_index: u64,
    truncated: bool,
    seed: u64,
}

impl SwimmerEnv {
    /// Create an environment. Fails if the model file is missing or
    /// unusable.
    pub fn new(env_config: EnvConfig, perturb_config: PerturbConfig) -> Result<Self> {
        let model = ModelFile::load(&env_config.model_path)?;
        let dynamics = SwimmerDynamics::from_spec(model.spec())?;
        Ok(Self {
            env_config,
            perturb_config,
            model,
            dynamics,
            sampler: PerturbSampler::new(0),
            rng: ChaCha8Rng::seed_from_u64(0),
            step_index: 0,
            truncated: false,
            seed: 0,
        })
    }

    /// Environment with default config and no perturbation.
    pub fn default_env() -> Result<Self> {
        Self::new(EnvConfig::default(), PerturbConfig::default())
    }

    pub fn env_config(&self) -> &EnvConfig {
        &self.env_config
    }

    pub fn perturb_config(&self) -> &PerturbConfig {
        &self.perturb_config
    }

    /// Number of action components.
    pub fn num_actuators(&self) -> usize {
        self.dynamics.num_actuators()
    }

    /// Length of the flat observation vector.
    pub fn observation_len(&self) -> usize {
        let nq = self.dynamics.nq();
        let hidden = if self.env_config.exclude_current_positions_from_observation {
            2
        } else {
            0
        };
        nq - hidden + nq
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn step_index(&self) -> u64 {
        self.step_index
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Reset the environment with an optional seed.
    ///
    /// Restores the model file if a previous step left it patched,
    /// rebuilds the dynamics from the pristine spec, and draws the
    /// initial state noise. Returns the initial observation.
    pub fn reset(&mut self, seed: Option<u64>) -> Result<Observation> {
        let seed = seed.unwrap_or_else(|| self.rng.gen());
        self.seed = seed;
        self.rng = ChaCha8Rng::seed_from_u64(seed);
        self.sampler.reseed(seed);

        if self.model.is_dirty() {
            self.model.restore()?;
        }
        self.dynamics = SwimmerDynamics::from_spec(self.model.spec())?;

        let nq = self.dynamics.nq();
        let scale = self.env_config.reset_noise_scale;
        let mut qpos = vec![0.0; nq];
        let mut qvel = vec![0.0; nq];
        if scale > 0.0 {
            for v in qpos.iter_mut() {
                *v = self.rng.gen_range(-scale..scale);
            }
            for v in qvel.iter_mut() {
                *v = self.rng.gen_range(-scale..scale);
            }
        }
        self.dynamics.set_state(&qpos, &qvel)?;

        self.step_index = 0;
        self.truncated = false;
        Ok(self.observe())
    }

    /// Take a step in the environment.
    pub fn step(&mut self, action: &[f64]) -> Result<StepResult> {
        if self.truncated {
            // Stepping past truncation is a caller bug; answer with the
            // terminal observation rather than advancing physics.
            let observation = self.observe();
            let info = self.build_info(0.0, 0.0, 0.0, 0.0, None);
            return Ok(StepResult {
                observation,
                reward: 0.0,
                terminated: false,
                truncated: true,
                info,
            });
        }

        let factor = self.perturb_config.factor;
        let mut applied: Option<AppliedPerturbation> = None;

        // Physical-parameter perturbation: patch the file, reload the
        // parameters for this step.
        if factor.is_model_param() {
            applied = self.patch_model()?;
            if applied.is_some() {
                let spec = self.model.current_spec()?;
                self.dynamics.apply_spec_params(&spec)?;
            }
        }

        // Action perturbation.
        let mut ctrl = action.to_vec();
        if factor == NoiseFactor::Action {
            let offset = self.sampler.signal_offset(&self.perturb_config);
            match self.perturb_config.kind {
                NoiseKind::Uniform => ctrl.fill(offset),
                _ => apply_offset(&mut ctrl, offset),
            }
            applied = Some(AppliedPerturbation {
                factor,
                kind: self.perturb_config.kind,
                offset,
            });
        }

        let (x_before, y_before) = self.dynamics.xy();
        self.dynamics.step(&ctrl, self.env_config.frame_skip)?;
        let (x_after, y_after) = self.dynamics.xy();

        let dt = self.dynamics.timestep() * self.env_config.frame_skip.max(1) as f64;
        let x_velocity = (x_after - x_before) / dt;
        let y_velocity = (y_after - y_before) / dt;

        let forward_reward = self.env_config.forward_reward_weight * x_velocity;
        // Control cost is charged on the control actually applied,
        // perturbation included.
        let ctrl_cost =
            self.env_config.ctrl_cost_weight * ctrl.iter().map(|a| a * a).sum::<f64>();

        self.step_index += 1;
        let mut observation = self.observe();

        // Observation perturbation.
        if factor == NoiseFactor::Observation {
            let offset = self.sampler.signal_offset(&self.perturb_config);
            match self.perturb_config.kind {
                NoiseKind::Uniform => {
                    observation.position.fill(offset);
                    observation.velocity.fill(offset);
                }
                _ => {
                    apply_offset(&mut observation.position, offset);
                    apply_offset(&mut observation.velocity, offset);
                }
            }
            applied = Some(AppliedPerturbation {
                factor,
                kind: self.perturb_config.kind,
                offset,
            });
        }

        let mut reward = forward_reward - ctrl_cost;

        // Reward perturbation.
        if factor == NoiseFactor::Reward {
            let offset = self.sampler.signal_offset(&self.perturb_config);
            reward = match self.perturb_config.kind {
                NoiseKind::Uniform => offset,
                _ => reward + offset,
            };
            applied = Some(AppliedPerturbation {
                factor,
                kind: self.perturb_config.kind,
                offset,
            });
        }

        // Put the model file back before handing control to the caller.
        if factor.is_model_param() {
            self.model.restore()?;
            self.dynamics.apply_spec_params(self.model.spec())?;
        }

        self.truncated = self.step_index >= self.env_config.max_steps;

        let info = self.build_info(forward_reward, ctrl_cost, x_velocity, y_velocity, applied);
        Ok(StepResult {
            observation,
            reward,
            terminated: false,
            truncated: self.truncated,
            info,
        })
    }

    /// Patch the model file per the configured factor. A miss (no
    /// matching motor/geom) leaves the file untouched and returns None.
    fn patch_model(&mut self) -> Result<Option<AppliedPerturbation>> {
        let cfg = self.perturb_config.clone();
        match cfg.factor {
            NoiseFactor::ActuatorGear => {
                let offset = self.sampler.gear_offset(&cfg);
                let replace = cfg.kind == NoiseKind::Uniform;
                let patch = self.model.patch_actuator_gear(&cfg.gear_joint, &|g| {
                    if replace {
                        offset
                    } else {
                        g + offset
                    }
                })?;
                Ok(patch.map(|_| AppliedPerturbation {
                    factor: cfg.factor,
                    kind: cfg.kind,
                    offset,
                }))
            }
            NoiseFactor::BodyShape => {
                let offset = self.sampler.shape_offset(&cfg);
                let replace = cfg.kind == NoiseKind::Uniform;
                let patch = self.model.patch_geom_size(&cfg.shape_body, &|s| {
                    if replace {
                        offset
                    } else {
                        s + offset
                    }
                })?;
                Ok(patch.map(|_| AppliedPerturbation {
                    factor: cfg.factor,
                    kind: cfg.kind,
                    offset,
                }))
            }
            _ => Ok(None),
        }
    }

    fn observe(&self) -> Observation {
        Observation::from_state(
            self.dynamics.qpos(),
            self.dynamics.qvel(),
            self.env_config.exclude_current_positions_from_observation,
            self.step_index,
            self.step_index as f64
                * self.dynamics.timestep()
                * self.env_config.frame_skip.max(1) as f64,
        )
    }

    fn build_info(
        &self,
        forward_reward: f64,
        ctrl_cost: f64,
        x_velocity: f64,
        y_velocity: f64,
        perturbation: Option<AppliedPerturbation>,
    ) -> StepInfo {
        let (x, y) = self.dynamics.xy();
        StepInfo {
            reward_fwd: forward_reward,
            reward_ctrl: -ctrl_cost,
            x_position: x,
            y_position: y,
            distance_from_origin: (x * x + y * y).sqrt(),
            x_velocity,
            y_velocity,
            step_index: self.step_index,
            model_path: self.model.path().display().to_string(),
            perturbation,
        }
    }
}

/// Vectorised environment: N independent swimmers stepped sequentially.
///
/// Model-file perturbations are applied and restored inside each
/// member's step, so members may share a model path.
pub struct VecEnv {
    envs: Vec<SwimmerEnv>,
}

impl VecEnv {
    /// Create N environments with identical configuration.
    pub fn new(n: usize, env_config: EnvConfig, perturb_config: PerturbConfig) -> Result<Self> {
        let mut envs = Vec::with_capacity(n);
        for _ in 0..n {
            envs.push(SwimmerEnv::new(env_config.clone(), perturb_config.clone())?);
        }
        Ok(Self { envs })
    }

    pub fn num_envs(&self) -> usize {
        self.envs.len()
    }

    pub fn num_actuators(&self) -> usize {
        self.envs.first().map(|e| e.num_actuators()).unwrap_or(0)
    }

    /// Reset all environments with optional per-environment seeds.
    /// Missing seeds are drawn from each member's own RNG.
    pub fn reset_all(&mut self, seeds: Option<&[u64]>) -> Result<Vec<Observation>> {
        self.envs
            .iter_mut()
            .enumerate()
            .map(|(i, env)| env.reset(seeds.and_then(|s| s.get(i).copied())))
            .collect()
    }

    /// Step all environments with the given actions.
    pub fn step(&mut self, actions: &[Vec<f64>]) -> Result<Vec<StepResult>> {
        assert_eq!(
            actions.len(),
            self.envs.len(),
            "actions length must match number of environments"
        );
        self.envs
            .iter_mut()
            .zip(actions.iter())
            .map(|(env, action)| env.step(action))
            .collect()
    }

    /// Which environments have hit their step limit.
    pub fn truncations(&self) -> Vec<bool> {
        self.envs.iter().map(|e| e.is_truncated()).collect()
    }

    pub fn seeds(&self) -> Vec<u64> {
        self.envs.iter().map(|e| e.seed()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_env() -> SwimmerEnv {
        SwimmerEnv::new(EnvConfig::deterministic(), PerturbConfig::default()).unwrap()
    }

    #[test]
    fn reset_returns_initial_observation() {
        let mut env = make_env();
        let obs = env.reset(Some(42)).unwrap();
        assert_eq!(obs.step_index, 0);
        assert_eq!(obs.len(), env.observation_len());
        assert!(!env.is_truncated());
    }

    #[test]
    fn observation_len_matches_exclusion_flag() {
        let env = make_env();
        // 5 qpos with x/y hidden + 5 qvel.
        assert_eq!(env.observation_len(), 8);

        let mut cfg = EnvConfig::deterministic();
        cfg.exclude_current_positions_from_observation = false;
        let env = SwimmerEnv::new(cfg, PerturbConfig::default()).unwrap();
        assert_eq!(env.observation_len(), 10);
    }

    #[test]
    fn step_advances_index_and_never_terminates() {
        let mut env = make_env();
        env.reset(Some(42)).unwrap();
        let action = vec![0.5, -0.5];
        for i in 1..=20u64 {
            let result = env.step(&action).unwrap();
            assert!(!result.terminated);
            assert_eq!(result.info.step_index, i);
        }
    }

    #[test]
    fn reward_decomposes_into_info_terms() {
        let mut env = make_env();
        env.reset(Some(7)).unwrap();
        let result = env.step(&[1.0, -1.0]).unwrap();
        let rebuilt = result.info.reward_fwd + result.info.reward_ctrl;
        assert!((result.reward - rebuilt).abs() < 1e-12);
    }

    #[test]
    fn zero_action_has_zero_ctrl_cost() {
        let mut env = make_env();
        env.reset(Some(7)).unwrap();
        let result = env.step(&[0.0, 0.0]).unwrap();
        assert_eq!(result.info.reward_ctrl, 0.0);
    }

    #[test]
    fn episode_truncates_at_step_limit() {
        let mut cfg = EnvConfig::deterministic();
        cfg.max_steps = 5;
        let mut env = SwimmerEnv::new(cfg, PerturbConfig::default()).unwrap();
        env.reset(Some(1)).unwrap();
        let action = vec![0.1, 0.1];
        for _ in 0..4 {
            assert!(!env.step(&action).unwrap().truncated);
        }
        assert!(env.step(&action).unwrap().truncated);
        // Stepping past truncation does not advance physics.
        let frozen = env.step(&action).unwrap();
        assert!(frozen.truncated);
        assert_eq!(frozen.reward, 0.0);
    }

    #[test]
    fn vec_env_smoke() {
        let mut vec_env =
            VecEnv::new(3, EnvConfig::deterministic(), PerturbConfig::default()).unwrap();
        assert_eq!(vec_env.num_envs(), 3);
        let observations = vec_env.reset_all(Some(&[10, 20, 30])).unwrap();
        assert_eq!(observations.len(), 3);
        let actions = vec![vec![0.0, 0.0]; 3];
        let results = vec_env.step(&actions).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(vec_env.seeds(), vec![10, 20, 30]);
        assert_eq!(vec_env.truncations(), vec![false; 3]);
    }
}
