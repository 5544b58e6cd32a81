// src/dynamics.rs
//
// Planar swimmer dynamics: a chain of capsule segments joined by
// torque-actuated hinge joints, moving through a viscous fluid with
// anisotropic drag (higher normal to a segment than along it).
//
// Generalized coordinates:
//   qpos = [x, y, body_angle, joint_angle_0 .. joint_angle_{n-1}]
//   qvel = [vx, vy, body_omega, joint_vel_0 .. joint_vel_{n-1}]
//
// Integration is semi-implicit Euler at the model timestep; one control
// step advances `frame_skip` substeps. Everything here is deterministic.

use crate::error::{Error, Result};
use crate::model::ModelSpec;

/// Number of root coordinates preceding the joint angles in qpos/qvel.
pub const ROOT_DOF: usize = 3;

/// Normal drag is this much stronger than tangential drag, a flat-plate
/// approximation.
const NORMAL_DRAG_RATIO: f64 = 5.0;

/// Rotational drag coefficient relative to viscosity.
const ANGULAR_DRAG_COEFF: f64 = 2.0;

/// Joint angles are kept inside this range for numerical stability.
const JOINT_ANGLE_LIMIT: f64 = 1.5;

/// Per-segment parameters derived from the model spec.
#[derive(Debug, Clone, Copy)]
struct Segment {
    length: f64,
    mass: f64,
    inertia: f64,
}

/// Per-actuator parameters derived from the model spec.
#[derive(Debug, Clone, Copy)]
struct Actuator {
    gear: f64,
    damping: f64,
}

/// Deterministic swimmer physics stepper.
#[derive(Debug, Clone)]
pub struct SwimmerDynamics {
    timestep: f64,
    viscosity: f64,
    segments: Vec<Segment>,
    actuators: Vec<Actuator>,
    qpos: Vec<f64>,
    qvel: Vec<f64>,
}

impl SwimmerDynamics {
    /// Build a stepper from a parsed model description.
    pub fn from_spec(spec: &ModelSpec) -> Result<Self> {
        if spec.segments.len() != spec.actuators.len() + 1 {
            return Err(Error::Model(format!(
                "segment/actuator mismatch: {} segments, {} actuators",
                spec.segments.len(),
                spec.actuators.len()
            )));
        }
        let segments: Vec<Segment> = spec
            .segments
            .iter()
            .map(|s| {
                let length = s.length();
                // Flat-plate mass model: mass scales with the segment's
                // cross section so geometry perturbations are felt.
                let mass = 4.0 * s.radius * length.max(f64::EPSILON);
                Segment {
                    length,
                    mass,
                    inertia: mass * length * length / 12.0,
                }
            })
            .collect();
        let actuators: Vec<Actuator> = (0..spec.actuators.len())
            .map(|i| Actuator {
                gear: spec.actuators[i].gear,
                damping: spec.actuated_damping(i),
            })
            .collect();
        let nq = ROOT_DOF + actuators.len();
        Ok(Self {
            timestep: spec.timestep,
            viscosity: spec.viscosity,
            segments,
            actuators,
            qpos: vec![0.0; nq],
            qvel: vec![0.0; nq],
        })
    }

    /// Re-derive physical parameters from `spec` without disturbing the
    /// current qpos/qvel state. Used when the model file has been
    /// patched mid-episode.
    pub fn apply_spec_params(&mut self, spec: &ModelSpec) -> Result<()> {
        let fresh = Self::from_spec(spec)?;
        if fresh.qpos.len() != self.qpos.len() {
            return Err(Error::Model(
                "patched model changed the number of degrees of freedom".to_string(),
            ));
        }
        self.timestep = fresh.timestep;
        self.viscosity = fresh.viscosity;
        self.segments = fresh.segments;
        self.actuators = fresh.actuators;
        Ok(())
    }

    pub fn num_actuators(&self) -> usize {
        self.actuators.len()
    }

    /// Generalized position dimension.
    pub fn nq(&self) -> usize {
        self.qpos.len()
    }

    /// Integration timestep in seconds.
    pub fn timestep(&self) -> f64 {
        self.timestep
    }

    pub fn qpos(&self) -> &[f64] {
        &self.qpos
    }

    pub fn qvel(&self) -> &[f64] {
        &self.qvel
    }

    /// Planar position of the chain root.
    pub fn xy(&self) -> (f64, f64) {
        (self.qpos[0], self.qpos[1])
    }

    /// Overwrite the full generalized state.
    pub fn set_state(&mut self, qpos: &[f64], qvel: &[f64]) -> Result<()> {
        if qpos.len() != self.qpos.len() || qvel.len() != self.qvel.len() {
            return Err(Error::Model(format!(
                "state has {}+{} components, model expects {}+{}",
                qpos.len(),
                qvel.len(),
                self.qpos.len(),
                self.qvel.len()
            )));
        }
        self.qpos.copy_from_slice(qpos);
        self.qvel.copy_from_slice(qvel);
        Ok(())
    }

    /// Advance `frame_skip` substeps under constant control torques.
    ///
    /// Control inputs are clamped to [-1, 1] before gearing.
    pub fn step(&mut self, ctrl: &[f64], frame_skip: usize) -> Result<()> {
        if ctrl.len() != self.actuators.len() {
            return Err(Error::ActionShape {
                got: ctrl.len(),
                expected: self.actuators.len(),
            });
        }
        for _ in 0..frame_skip.max(1) {
            self.substep(ctrl);
        }
        Ok(())
    }

    /// Segment centers and absolute orientations, root first.
    fn segment_poses(&self) -> Vec<(f64, f64, f64)> {
        let n = self.segments.len();
        let mut poses = Vec::with_capacity(n);

        let mut angle = self.qpos[2];
        let half = self.segments[0].length * 0.5;
        let mut cx = self.qpos[0];
        let mut cy = self.qpos[1];
        poses.push((cx, cy, angle));

        let mut tip_x = cx + half * angle.cos();
        let mut tip_y = cy + half * angle.sin();

        for i in 1..n {
            angle += self.qpos[ROOT_DOF + (i - 1)];
            let half = self.segments[i].length * 0.5;
            cx = tip_x + half * angle.cos();
            cy = tip_y + half * angle.sin();
            poses.push((cx, cy, angle));
            tip_x = cx + half * angle.cos();
            tip_y = cy + half * angle.sin();
        }

        poses
    }

    fn substep(&mut self, ctrl: &[f64]) {
        let dt = self.timestep;
        let n_joints = self.actuators.len();
        let poses = self.segment_poses();

        let (vx, vy, body_omega) = (self.qvel[0], self.qvel[1], self.qvel[2]);

        // Viscous drag accumulated over the chain.
        let mut drag_fx = 0.0;
        let mut drag_fy = 0.0;
        let mut drag_torque = 0.0;

        for (i, seg) in self.segments.iter().enumerate() {
            let (_, _, angle) = poses[i];
            let (sin_a, cos_a) = angle.sin_cos();

            // Decompose the chain velocity into tangential / normal
            // components in the segment frame.
            let v_t = vx * cos_a + vy * sin_a;
            let v_n = -vx * sin_a + vy * cos_a;

            let drag_t = -self.viscosity * v_t * seg.length;
            let drag_n = -self.viscosity * NORMAL_DRAG_RATIO * v_n * seg.length;

            drag_fx += drag_t * cos_a - drag_n * sin_a;
            drag_fy += drag_t * sin_a + drag_n * cos_a;

            // Angular drag against the segment's absolute rotation rate.
            let omega = body_omega
                + self.qvel[ROOT_DOF..ROOT_DOF + i.min(n_joints)]
                    .iter()
                    .sum::<f64>();
            drag_torque -=
                self.viscosity * ANGULAR_DRAG_COEFF * omega * seg.length * seg.length;
        }

        let total_mass: f64 = self.segments.iter().map(|s| s.mass).sum();
        let total_inertia: f64 = self.segments.iter().map(|s| s.inertia).sum();

        // Geared joint torques with their reaction on the root segment.
        let mut torques = vec![0.0f64; n_joints];
        let mut reaction = 0.0;
        for (i, act) in self.actuators.iter().enumerate() {
            let t = act.gear * ctrl[i].clamp(-1.0, 1.0);
            torques[i] = t;
            reaction += t;
        }

        let ax = drag_fx / total_mass;
        let ay = drag_fy / total_mass;
        let body_alpha = (drag_torque - reaction) / total_inertia;

        // Semi-implicit Euler: velocities first, then positions.
        self.qvel[0] += ax * dt;
        self.qvel[1] += ay * dt;
        self.qvel[2] += body_alpha * dt;
        self.qpos[0] += self.qvel[0] * dt;
        self.qpos[1] += self.qvel[1] * dt;
        self.qpos[2] += self.qvel[2] * dt;

        for i in 0..n_joints {
            let seg = &self.segments[i + 1];
            let act = &self.actuators[i];
            let joint_vel = self.qvel[ROOT_DOF + i];
            let joint_drag = -self.viscosity * joint_vel * seg.length - act.damping * joint_vel;
            let alpha = (torques[i] + joint_drag) / seg.inertia;

            self.qvel[ROOT_DOF + i] += alpha * dt;
            self.qpos[ROOT_DOF + i] += self.qvel[ROOT_DOF + i] * dt;
            self.qpos[ROOT_DOF + i] =
                self.qpos[ROOT_DOF + i].clamp(-JOINT_ANGLE_LIMIT, JOINT_ANGLE_LIMIT);
        }
    }
}
