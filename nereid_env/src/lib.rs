// nereid_env/src/lib.rs
//
// Python bindings for the nereid swimmer environment.
//
// Provides a Gym-style API for training RL agents:
// - Env: Single environment with reset(seed) and step(action)
// - VecEnv: Vectorised environments for parallel rollouts
//
// All operations are deterministic given seeds.

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};

use nereid::{
    AppliedPerturbation, EnvConfig, NoiseFactor, NoiseKind, Observation, PerturbConfig, StepInfo,
    SwimmerEnv as RustSwimmerEnv, VecEnv as RustVecEnv,
};

fn to_py_err(err: nereid::Error) -> PyErr {
    PyValueError::new_err(err.to_string())
}

/// Convert a Rust Observation to a Python dictionary.
fn observation_to_dict(py: Python<'_>, obs: &Observation) -> PyResult<Py<PyDict>> {
    let dict = PyDict::new_bound(py);

    dict.set_item("obs_version", obs.obs_version)?;
    dict.set_item("step_index", obs.step_index)?;
    dict.set_item("time", obs.time)?;
    dict.set_item("position", obs.position.clone())?;
    dict.set_item("velocity", obs.velocity.clone())?;
    dict.set_item("flat", obs.to_vec())?;

    Ok(dict.into())
}

/// Convert an applied perturbation to a Python dictionary.
fn perturbation_to_dict(py: Python<'_>, applied: &AppliedPerturbation) -> PyResult<Py<PyDict>> {
    let dict = PyDict::new_bound(py);
    dict.set_item("factor", applied.factor.as_str())?;
    dict.set_item("kind", applied.kind.as_str())?;
    dict.set_item("offset", applied.offset)?;
    Ok(dict.into())
}

/// Convert StepInfo to a Python dictionary.
fn step_info_to_dict(py: Python<'_>, info: &StepInfo) -> PyResult<Py<PyDict>> {
    let dict = PyDict::new_bound(py);

    dict.set_item("reward_fwd", info.reward_fwd)?;
    dict.set_item("reward_ctrl", info.reward_ctrl)?;
    dict.set_item("x_position", info.x_position)?;
    dict.set_item("y_position", info.y_position)?;
    dict.set_item("distance_from_origin", info.distance_from_origin)?;
    dict.set_item("x_velocity", info.x_velocity)?;
    dict.set_item("y_velocity", info.y_velocity)?;
    dict.set_item("step_index", info.step_index)?;
    dict.set_item("model_path", info.model_path.clone())?;
    match &info.perturbation {
        Some(applied) => dict.set_item("perturbation", perturbation_to_dict(py, applied)?)?,
        None => dict.set_item("perturbation", py.None())?,
    }

    Ok(dict.into())
}

fn parse_perturb_config(
    factor: &str,
    kind: &str,
    mu: f64,
    sigma: f64,
    shift: f64,
) -> PyResult<PerturbConfig> {
    let factor = NoiseFactor::parse(factor).ok_or_else(|| {
        PyValueError::new_err(format!(
            "Unknown factor: {factor}. Use 'disabled', 'action', 'observation', 'reward', 'actuator_gear', or 'body_shape'"
        ))
    })?;
    let kind = NoiseKind::parse(kind).ok_or_else(|| {
        PyValueError::new_err(format!(
            "Unknown kind: {kind}. Use 'gauss', 'shift', or 'uniform'"
        ))
    })?;
    Ok(PerturbConfig {
        factor,
        kind,
        noise_mu: mu,
        noise_sigma: sigma,
        noise_shift: shift,
        ..PerturbConfig::default()
    })
}

/// Gym-style environment wrapper.
///
/// Provides the standard RL interface:
/// - reset(seed) -> observation
/// - step(action) -> (observation, reward, terminated, truncated, info)
#[pyclass]
pub struct Env {
    inner: RustSwimmerEnv,
}

#[pymethods]
impl Env {
    /// Create a new environment.
    ///
    /// Args:
    ///     model_path: Model description file (default: "swimmer.xml")
    ///     factor: Perturbation target (default: "disabled")
    ///     kind: Perturbation kind (default: "gauss")
    ///     mu/sigma/shift: Noise parameters
    ///     max_steps: Episode length before truncation (default: 1000)
    #[new]
    #[pyo3(signature = (
        model_path="swimmer.xml",
        factor="disabled",
        kind="gauss",
        mu=0.0,
        sigma=0.01,
        shift=0.005,
        max_steps=1000
    ))]
    #[allow(clippy::too_many_arguments)]
    fn new(
        model_path: &str,
        factor: &str,
        kind: &str,
        mu: f64,
        sigma: f64,
        shift: f64,
        max_steps: u64,
    ) -> PyResult<Self> {
        let perturb = parse_perturb_config(factor, kind, mu, sigma, shift)?;
        let env_config = EnvConfig {
            model_path: model_path.to_string(),
            max_steps,
            ..EnvConfig::default()
        };
        let inner = RustSwimmerEnv::new(env_config, perturb).map_err(to_py_err)?;
        Ok(Self { inner })
    }

    /// Reset the environment.
    ///
    /// Args:
    ///     seed: Optional seed for deterministic reset
    ///
    /// Returns:
    ///     observation: Dict containing the initial observation
    #[pyo3(signature = (seed=None))]
    fn reset(&mut self, py: Python<'_>, seed: Option<u64>) -> PyResult<Py<PyDict>> {
        let obs = self.inner.reset(seed).map_err(to_py_err)?;
        observation_to_dict(py, &obs)
    }

    /// Take a step in the environment.
    ///
    /// Args:
    ///     action: List[float] of joint torques in [-1, 1]
    ///
    /// Returns:
    ///     Tuple of (observation, reward, terminated, truncated, info)
    fn step<'py>(
        &mut self,
        py: Python<'py>,
        action: Vec<f64>,
    ) -> PyResult<(Py<PyDict>, f64, bool, bool, Py<PyDict>)> {
        let result = self.inner.step(&action).map_err(to_py_err)?;

        let obs = observation_to_dict(py, &result.observation)?;
        let info = step_info_to_dict(py, &result.info)?;

        Ok((obs, result.reward, result.terminated, result.truncated, info))
    }

    /// Number of action components.
    #[getter]
    fn num_actuators(&self) -> usize {
        self.inner.num_actuators()
    }

    /// Length of the flat observation vector.
    #[getter]
    fn observation_len(&self) -> usize {
        self.inner.observation_len()
    }

    /// Current step index within the episode.
    #[getter]
    fn step_index(&self) -> u64 {
        self.inner.step_index()
    }

    /// Whether the episode hit the step limit.
    #[getter]
    fn is_truncated(&self) -> bool {
        self.inner.is_truncated()
    }

    /// The seed of the current episode.
    #[getter]
    fn seed(&self) -> u64 {
        self.inner.seed()
    }
}

/// Vectorised environment for parallel rollouts.
///
/// Manages N independent Env instances.
#[pyclass]
pub struct VecEnv {
    inner: RustVecEnv,
}

#[pymethods]
impl VecEnv {
    /// Create a new vectorised environment.
    ///
    /// Args:
    ///     n: Number of environments
    ///     model_path / factor / kind / mu / sigma / shift / max_steps:
    ///         as for Env, shared by all members
    #[new]
    #[pyo3(signature = (
        n,
        model_path="swimmer.xml",
        factor="disabled",
        kind="gauss",
        mu=0.0,
        sigma=0.01,
        shift=0.005,
        max_steps=1000
    ))]
    #[allow(clippy::too_many_arguments)]
    fn new(
        n: usize,
        model_path: &str,
        factor: &str,
        kind: &str,
        mu: f64,
        sigma: f64,
        shift: f64,
        max_steps: u64,
    ) -> PyResult<Self> {
        if n == 0 {
            return Err(PyValueError::new_err("n must be > 0"));
        }
        let perturb = parse_perturb_config(factor, kind, mu, sigma, shift)?;
        let env_config = EnvConfig {
            model_path: model_path.to_string(),
            max_steps,
            ..EnvConfig::default()
        };
        let inner = RustVecEnv::new(n, env_config, perturb).map_err(to_py_err)?;
        Ok(Self { inner })
    }

    /// Reset all environments.
    ///
    /// Args:
    ///     seeds: Optional list of per-environment seeds
    ///
    /// Returns:
    ///     List of observation dicts
    #[pyo3(signature = (seeds=None))]
    fn reset(&mut self, py: Python<'_>, seeds: Option<Vec<u64>>) -> PyResult<Py<PyList>> {
        let observations = self
            .inner
            .reset_all(seeds.as_deref())
            .map_err(to_py_err)?;
        let list = PyList::empty_bound(py);
        for obs in &observations {
            list.append(observation_to_dict(py, obs)?)?;
        }
        Ok(list.into())
    }

    /// Step all environments.
    ///
    /// Args:
    ///     actions: List of per-environment action lists
    ///
    /// Returns:
    ///     Tuple of (observations, rewards, terminateds, truncateds, infos)
    #[allow(clippy::type_complexity)]
    fn step<'py>(
        &mut self,
        py: Python<'py>,
        actions: Vec<Vec<f64>>,
    ) -> PyResult<(Py<PyList>, Vec<f64>, Vec<bool>, Vec<bool>, Py<PyList>)> {
        if actions.len() != self.inner.num_envs() {
            return Err(PyValueError::new_err(format!(
                "actions length {} must match num_envs {}",
                actions.len(),
                self.inner.num_envs()
            )));
        }
        let results = self.inner.step(&actions).map_err(to_py_err)?;

        let observations = PyList::empty_bound(py);
        let infos = PyList::empty_bound(py);
        let mut rewards = Vec::with_capacity(results.len());
        let mut terminateds = Vec::with_capacity(results.len());
        let mut truncateds = Vec::with_capacity(results.len());
        for result in &results {
            observations.append(observation_to_dict(py, &result.observation)?)?;
            infos.append(step_info_to_dict(py, &result.info)?)?;
            rewards.push(result.reward);
            terminateds.push(result.terminated);
            truncateds.push(result.truncated);
        }

        Ok((
            observations.into(),
            rewards,
            terminateds,
            truncateds,
            infos.into(),
        ))
    }

    /// Number of environments.
    #[getter]
    fn num_envs(&self) -> usize {
        self.inner.num_envs()
    }

    /// Number of action components per environment.
    #[getter]
    fn num_actuators(&self) -> usize {
        self.inner.num_actuators()
    }

    /// Per-environment seeds.
    #[getter]
    fn seeds(&self) -> Vec<u64> {
        self.inner.seeds()
    }

    /// Per-environment truncation flags.
    #[getter]
    fn truncations(&self) -> Vec<bool> {
        self.inner.truncations()
    }
}

/// Python module definition.
#[pymodule]
fn nereid_env(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<Env>()?;
    m.add_class::<VecEnv>()?;
    m.add("OBS_VERSION", nereid::OBS_VERSION)?;
    Ok(())
}
