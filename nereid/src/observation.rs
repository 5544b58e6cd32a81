// src/observation.rs
//
// Versioned observation schema.
//
// The observation is the flattened [position | velocity] snapshot of
// the swimmer, optionally excluding the root x/y so policies cannot
// trivially read their absolute position. Serializable for logging and
// replay; deterministic field ordering for byte-identity comparisons.

use serde::{Deserialize, Serialize};

/// Current observation schema version.
/// Increment when adding/removing/changing fields.
pub const OBS_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Observation schema version.
    pub obs_version: u32,
    /// Step index within the episode (0 for the reset observation).
    pub step_index: u64,
    /// Simulated time in seconds since reset.
    pub time: f64,
    /// Generalized positions, root x/y already excluded when the
    /// environment is configured to hide them.
    pub position: Vec<f64>,
    /// Generalized velocities.
    pub velocity: Vec<f64>,
}

impl Observation {
    /// Assemble an observation from raw state buffers.
    pub fn from_state(
        qpos: &[f64],
        qvel: &[f64],
        exclude_current_positions: bool,
        step_index: u64,
        time: f64,
    ) -> Self {
        let position = if exclude_current_positions {
            qpos[2..].to_vec()
        } else {
            qpos.to_vec()
        };
        Self {
            obs_version: OBS_VERSION,
            step_index,
            time,
            position,
            velocity: qvel.to_vec(),
        }
    }

    /// Flat feature vector: positions then velocities.
    pub fn to_vec(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.position.len() + self.velocity.len());
        out.extend_from_slice(&self.position);
        out.extend_from_slice(&self.velocity);
        out
    }

    /// Feature vector length.
    pub fn len(&self) -> usize {
        self.position.len() + self.velocity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Canonical JSON encoding, used by determinism tests to assert
    /// byte-identical observation streams.
    pub fn to_canonical_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclusion_drops_root_xy() {
        let qpos = [1.0, 2.0, 0.3, 0.1, -0.1];
        let qvel = [0.0; 5];
        let excl = Observation::from_state(&qpos, &qvel, true, 0, 0.0);
        assert_eq!(excl.position, vec![0.3, 0.1, -0.1]);
        assert_eq!(excl.len(), 8);

        let full = Observation::from_state(&qpos, &qvel, false, 0, 0.0);
        assert_eq!(full.position.len(), 5);
        assert_eq!(full.len(), 10);
    }

    #[test]
    fn flat_vector_orders_position_then_velocity() {
        let obs = Observation::from_state(&[0.0, 0.0, 1.0], &[2.0, 3.0, 4.0], true, 0, 0.0);
        assert_eq!(obs.to_vec(), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn canonical_json_is_stable() {
        let obs = Observation::from_state(&[0.0, 0.0, 0.5], &[0.0, 0.0, 0.0], true, 3, 0.12);
        assert_eq!(
            obs.to_canonical_json().unwrap(),
            obs.clone().to_canonical_json().unwrap()
        );
    }
}
