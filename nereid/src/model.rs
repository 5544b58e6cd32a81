// src/model.rs
//
// On-disk model description for the swimmer.
//
// The model is an XML document in the MuJoCo MJCF dialect (the subset
// this crate actually consumes): an <option> element with integration
// and fluid parameters, a nested <body>/<geom>/<joint> tree describing
// the segment chain, and an <actuator> block mapping motors to joints.
//
// Two mutation paths exist, both deliberately narrow:
// - patch a single numeric attribute (motor gear, geom size) and write
//   the file back;
// - restore the file to the pristine text captured at load time.
//
// Patching is plain single-threaded file I/O. Concurrent access to the
// same model path is unsupported.

use std::fs;
use std::path::{Path, PathBuf};

use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One link of the swimmer chain: a capsule geom under a named body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentSpec {
    /// Name of the enclosing body.
    pub body: String,
    /// Capsule radius.
    pub radius: f64,
    /// Capsule half-length along its axis.
    pub half_length: f64,
}

impl SegmentSpec {
    /// Full segment length used by the dynamics.
    pub fn length(&self) -> f64 {
        2.0 * self.half_length
    }
}

/// A named hinge joint with its damping coefficient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointSpec {
    pub name: String,
    pub damping: f64,
}

/// A motor driving one joint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActuatorSpec {
    /// Target joint name (the `joint` attribute).
    pub joint: String,
    /// Torque scaling from control input to joint torque.
    pub gear: f64,
}

/// Parsed physical parameters of a swimmer model document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Model name from the root element.
    pub name: String,
    /// Integration timestep (seconds).
    pub timestep: f64,
    /// Fluid viscosity coefficient.
    pub viscosity: f64,
    /// Segment chain, in document order.
    pub segments: Vec<SegmentSpec>,
    /// All named hinge joints, in document order.
    pub joints: Vec<JointSpec>,
    /// Actuators, in document order.
    pub actuators: Vec<ActuatorSpec>,
}

impl ModelSpec {
    /// Number of actuated joints.
    pub fn num_actuators(&self) -> usize {
        self.actuators.len()
    }

    /// Damping of the joint driven by actuator `idx` (0.0 if the joint
    /// carries no damping attribute).
    pub fn actuated_damping(&self, idx: usize) -> f64 {
        let joint = &self.actuators[idx].joint;
        self.joints
            .iter()
            .find(|j| &j.name == joint)
            .map(|j| j.damping)
            .unwrap_or(0.0)
    }
}

/// Record of a single attribute rewrite, reported in step info and
/// telemetry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributePatch {
    /// Element the attribute lives on ("motor" or "geom").
    pub element: String,
    /// Selector that matched it (joint name or body name).
    pub target: String,
    /// Attribute name ("gear" or "size").
    pub attribute: String,
    /// Value before the rewrite.
    pub old: f64,
    /// Value after the rewrite.
    pub new: f64,
}

/// Handle on an on-disk model document.
///
/// Owns the resolved path, the pristine text captured at load time, and
/// the spec parsed from that text. Patches go through the filesystem so
/// the document on disk is always the source of truth for `current_spec`.
#[derive(Debug)]
pub struct ModelFile {
    path: PathBuf,
    original: String,
    spec: ModelSpec,
    dirty: bool,
}

impl ModelFile {
    /// Load a model document.
    ///
    /// `path` resolution mirrors the conventions of the research
    /// scripts this crate serves: absolute and explicitly relative
    /// paths are used as-is, `~` expands against `$HOME`, and a bare
    /// file name resolves against the crate's `assets/` directory.
    pub fn load(path: &str) -> Result<Self> {
        let path = resolve_model_path(path)?;
        let original = fs::read_to_string(&path)?;
        let spec = parse_model(&original)?;
        Ok(Self {
            path,
            original,
            spec,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Spec parsed from the pristine document.
    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    /// Whether the on-disk document currently differs from the
    /// pristine text.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Parse whatever is on disk right now.
    pub fn current_spec(&self) -> Result<ModelSpec> {
        let text = fs::read_to_string(&self.path)?;
        parse_model(&text)
    }

    /// Rewrite the `gear` attribute of the motor driving `joint`,
    /// replacing its value with `apply(old)`.
    ///
    /// Returns `Ok(None)` without touching the file when no motor
    /// matches; the miss is logged to stderr.
    pub fn patch_actuator_gear(
        &mut self,
        joint: &str,
        apply: &dyn Fn(f64) -> f64,
    ) -> Result<Option<AttributePatch>> {
        let text = fs::read_to_string(&self.path)?;
        match rewrite_motor_gear(&text, joint, apply)? {
            Some((patched, old, new)) => {
                fs::write(&self.path, patched)?;
                self.dirty = true;
                Ok(Some(AttributePatch {
                    element: "motor".to_string(),
                    target: joint.to_string(),
                    attribute: "gear".to_string(),
                    old,
                    new,
                }))
            }
            None => {
                eprintln!(
                    "no motor found for joint '{}' in {}; model left unchanged",
                    joint,
                    self.path.display()
                );
                Ok(None)
            }
        }
    }

    /// Rewrite the first component of the `size` attribute of the first
    /// geom under the body named `body`, replacing it with `apply(old)`.
    /// Remaining size components are preserved.
    ///
    /// Returns `Ok(None)` without touching the file when no geom
    /// matches; the miss is logged to stderr.
    pub fn patch_geom_size(
        &mut self,
        body: &str,
        apply: &dyn Fn(f64) -> f64,
    ) -> Result<Option<AttributePatch>> {
        let text = fs::read_to_string(&self.path)?;
        match rewrite_geom_size(&text, body, apply)? {
            Some((patched, old, new)) => {
                fs::write(&self.path, patched)?;
                self.dirty = true;
                Ok(Some(AttributePatch {
                    element: "geom".to_string(),
                    target: body.to_string(),
                    attribute: "size".to_string(),
                    old,
                    new,
                }))
            }
            None => {
                eprintln!(
                    "no geom found under body '{}' in {}; model left unchanged",
                    body,
                    self.path.display()
                );
                Ok(None)
            }
        }
    }

    /// Rewrite the document with the pristine text captured at load
    /// time, byte for byte.
    pub fn restore(&mut self) -> Result<()> {
        fs::write(&self.path, &self.original)?;
        self.dirty = false;
        Ok(())
    }
}

/// Resolve a model path per the conventions in `ModelFile::load`.
pub fn resolve_model_path(path: &str) -> Result<PathBuf> {
    let resolved = if path.starts_with('.') || path.starts_with('/') {
        PathBuf::from(path)
    } else if let Some(rest) = path.strip_prefix("~/") {
        match std::env::var_os("HOME") {
            Some(home) => PathBuf::from(home).join(rest),
            None => PathBuf::from(path),
        }
    } else {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("assets")
            .join(path)
    };
    if !resolved.exists() {
        return Err(Error::ModelNotFound(resolved));
    }
    Ok(resolved)
}

fn attr_value(attr: &quick_xml::events::attributes::Attribute<'_>) -> String {
    String::from_utf8_lossy(&attr.value).into_owned()
}

fn parse_f64(value: &str, context: &str) -> Result<f64> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|_| Error::Model(format!("{context}: not a number: {value:?}")))
}

/// Parse a model document into a `ModelSpec`.
pub fn parse_model(text: &str) -> Result<ModelSpec> {
    let mut reader = Reader::from_str(text);

    let mut name = String::new();
    let mut timestep = 0.01;
    let mut viscosity = 0.1;
    let mut segments: Vec<SegmentSpec> = Vec::new();
    let mut joints: Vec<JointSpec> = Vec::new();
    let mut actuators: Vec<ActuatorSpec> = Vec::new();

    // Stack of enclosing body names, for attributing geoms.
    let mut body_stack: Vec<String> = Vec::new();

    loop {
        let event = reader.read_event()?;
        match &event {
            Event::Start(e) | Event::Empty(e) => {
                let is_empty = matches!(event, Event::Empty(_));
                match e.name().as_ref() {
                    b"mujoco" => {
                        for attr in e.attributes().flatten() {
                            if attr.key.as_ref() == b"model" {
                                name = attr_value(&attr);
                            }
                        }
                    }
                    b"option" => {
                        for attr in e.attributes().flatten() {
                            match attr.key.as_ref() {
                                b"timestep" => {
                                    timestep = parse_f64(&attr_value(&attr), "option timestep")?
                                }
                                b"viscosity" => {
                                    viscosity = parse_f64(&attr_value(&attr), "option viscosity")?
                                }
                                _ => {}
                            }
                        }
                    }
                    b"body" => {
                        let mut body_name = String::new();
                        for attr in e.attributes().flatten() {
                            if attr.key.as_ref() == b"name" {
                                body_name = attr_value(&attr);
                            }
                        }
                        if !is_empty {
                            body_stack.push(body_name);
                        }
                    }
                    b"geom" => {
                        if let Some(body) = body_stack.last() {
                            let mut size = None;
                            for attr in e.attributes().flatten() {
                                if attr.key.as_ref() == b"size" {
                                    size = Some(attr_value(&attr));
                                }
                            }
                            if let Some(size) = size {
                                let mut parts = size.split_whitespace();
                                let radius = match parts.next() {
                                    Some(v) => parse_f64(v, "geom size")?,
                                    None => {
                                        return Err(Error::Model(format!(
                                            "geom under body {body:?} has empty size"
                                        )))
                                    }
                                };
                                let half_length = match parts.next() {
                                    Some(v) => parse_f64(v, "geom size")?,
                                    None => radius,
                                };
                                segments.push(SegmentSpec {
                                    body: body.clone(),
                                    radius,
                                    half_length,
                                });
                            }
                        }
                    }
                    b"joint" => {
                        let mut joint_name = None;
                        let mut joint_type = None;
                        let mut damping = 0.0;
                        for attr in e.attributes().flatten() {
                            match attr.key.as_ref() {
                                b"name" => joint_name = Some(attr_value(&attr)),
                                b"type" => joint_type = Some(attr_value(&attr)),
                                b"damping" => {
                                    damping = parse_f64(&attr_value(&attr), "joint damping")?
                                }
                                _ => {}
                            }
                        }
                        let is_hinge = joint_type.as_deref().map_or(true, |t| t == "hinge");
                        if let (Some(joint_name), true) = (joint_name, is_hinge) {
                            joints.push(JointSpec {
                                name: joint_name,
                                damping,
                            });
                        }
                    }
                    b"motor" => {
                        let mut joint = None;
                        let mut gear = 1.0;
                        for attr in e.attributes().flatten() {
                            match attr.key.as_ref() {
                                b"joint" => joint = Some(attr_value(&attr)),
                                b"gear" => gear = parse_f64(&attr_value(&attr), "motor gear")?,
                                _ => {}
                            }
                        }
                        if let Some(joint) = joint {
                            actuators.push(ActuatorSpec { joint, gear });
                        }
                    }
                    _ => {}
                }
            }
            Event::End(e) => {
                if e.name().as_ref() == b"body" {
                    body_stack.pop();
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if segments.is_empty() {
        return Err(Error::Model("model has no segment geoms".to_string()));
    }
    if actuators.is_empty() {
        return Err(Error::Model("model has no actuators".to_string()));
    }
    for actuator in &actuators {
        if !joints.iter().any(|j| j.name == actuator.joint) {
            return Err(Error::Model(format!(
                "motor targets unknown joint {:?}",
                actuator.joint
            )));
        }
    }
    if segments.len() != actuators.len() + 1 {
        return Err(Error::Model(format!(
            "{} segments require {} actuated joints, model has {}",
            segments.len(),
            segments.len() - 1,
            actuators.len()
        )));
    }

    Ok(ModelSpec {
        name,
        timestep,
        viscosity,
        segments,
        joints,
        actuators,
    })
}

/// Rebuild a start/empty tag with one attribute's value replaced.
fn rebuild_with_attribute(e: &BytesStart<'_>, key: &[u8], value: &str) -> BytesStart<'static> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut out = BytesStart::new(name);
    for attr in e.attributes().flatten() {
        let attr_key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        if attr.key.as_ref() == key {
            out.push_attribute((attr_key.as_str(), value));
        } else {
            let existing = attr_value(&attr);
            out.push_attribute((attr_key.as_str(), existing.as_str()));
        }
    }
    out
}

/// Inspect a `<motor>` tag; if it drives `joint`, rebuild it with the
/// gear attribute rewritten through `apply`.
fn try_patch_motor(
    e: &BytesStart<'_>,
    joint: &str,
    apply: &dyn Fn(f64) -> f64,
) -> Result<Option<(BytesStart<'static>, f64, f64)>> {
    let mut target = false;
    let mut gear = None;
    for attr in e.attributes().flatten() {
        match attr.key.as_ref() {
            b"joint" if attr_value(&attr) == joint => target = true,
            b"gear" => gear = Some(attr_value(&attr)),
            _ => {}
        }
    }
    if !target {
        return Ok(None);
    }
    let old = match gear {
        Some(v) => parse_f64(&v, "motor gear")?,
        None => 1.0,
    };
    let new = apply(old);
    let elem = rebuild_with_attribute(e, b"gear", &format_attr(new));
    Ok(Some((elem, old, new)))
}

/// Rewrite the gear of the motor whose `joint` attribute matches.
/// Returns the new document text plus (old, new) gear values, or None
/// if no motor matched.
fn rewrite_motor_gear(
    text: &str,
    joint: &str,
    apply: &dyn Fn(f64) -> f64,
) -> Result<Option<(String, f64, f64)>> {
    let mut reader = Reader::from_str(text);
    let mut writer = Writer::new(Vec::new());
    let mut patched: Option<(f64, f64)> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) if e.name().as_ref() == b"motor" && patched.is_none() => {
                match try_patch_motor(&e, joint, apply)? {
                    Some((elem, old, new)) => {
                        patched = Some((old, new));
                        writer.write_event(Event::Start(elem))?;
                    }
                    None => writer.write_event(Event::Start(e))?,
                }
            }
            Event::Empty(e) if e.name().as_ref() == b"motor" && patched.is_none() => {
                match try_patch_motor(&e, joint, apply)? {
                    Some((elem, old, new)) => {
                        patched = Some((old, new));
                        writer.write_event(Event::Empty(elem))?;
                    }
                    None => writer.write_event(Event::Empty(e))?,
                }
            }
            Event::Eof => break,
            event => writer.write_event(event)?,
        }
    }

    Ok(patched.map(|(old, new)| {
        let bytes = writer.into_inner();
        (String::from_utf8_lossy(&bytes).into_owned(), old, new)
    }))
}

/// Rewrite the first size component of the first geom under `body`.
/// Returns the new document text plus (old, new) values, or None if no
/// geom matched.
fn rewrite_geom_size(
    text: &str,
    body: &str,
    apply: &dyn Fn(f64) -> f64,
) -> Result<Option<(String, f64, f64)>> {
    let mut reader = Reader::from_str(text);
    let mut writer = Writer::new(Vec::new());
    let mut body_stack: Vec<String> = Vec::new();
    let mut patched: Option<(f64, f64)> = None;

    // Rebuild a geom tag with the first size component rewritten.
    let patch_geom = |e: &BytesStart<'_>| -> Result<Option<(BytesStart<'static>, f64, f64)>> {
        let mut size = None;
        for attr in e.attributes().flatten() {
            if attr.key.as_ref() == b"size" {
                size = Some(attr_value(&attr));
            }
        }
        let size = match size {
            Some(s) => s,
            None => return Ok(None),
        };
        let mut parts: Vec<&str> = size.split_whitespace().collect();
        let old = match parts.first() {
            Some(v) => parse_f64(v, "geom size")?,
            None => {
                return Err(Error::Model(format!(
                    "geom under body {body:?} has empty size"
                )))
            }
        };
        let new = apply(old);
        let formatted = format_attr(new);
        parts[0] = &formatted;
        let rewritten = parts.join(" ");
        Ok(Some((rebuild_with_attribute(e, b"size", &rewritten), old, new)))
    };

    loop {
        match reader.read_event()? {
            Event::Start(e) if e.name().as_ref() == b"body" => {
                let mut name = String::new();
                for attr in e.attributes().flatten() {
                    if attr.key.as_ref() == b"name" {
                        name = attr_value(&attr);
                    }
                }
                body_stack.push(name);
                writer.write_event(Event::Start(e))?;
            }
            Event::End(e) if e.name().as_ref() == b"body" => {
                body_stack.pop();
                writer.write_event(Event::End(e))?;
            }
            Event::Start(e)
                if e.name().as_ref() == b"geom"
                    && patched.is_none()
                    && body_stack.last().map(String::as_str) == Some(body) =>
            {
                match patch_geom(&e)? {
                    Some((elem, old, new)) => {
                        patched = Some((old, new));
                        writer.write_event(Event::Start(elem))?;
                    }
                    None => writer.write_event(Event::Start(e))?,
                }
            }
            Event::Empty(e)
                if e.name().as_ref() == b"geom"
                    && patched.is_none()
                    && body_stack.last().map(String::as_str) == Some(body) =>
            {
                match patch_geom(&e)? {
                    Some((elem, old, new)) => {
                        patched = Some((old, new));
                        writer.write_event(Event::Empty(elem))?;
                    }
                    None => writer.write_event(Event::Empty(e))?,
                }
            }
            Event::Eof => break,
            event => writer.write_event(event)?,
        }
    }

    Ok(patched.map(|(old, new)| {
        let bytes = writer.into_inner();
        (String::from_utf8_lossy(&bytes).into_owned(), old, new)
    }))
}

/// Format a numeric attribute the way the stock models write them:
/// integral values without a trailing ".0".
fn format_attr(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODEL: &str = r#"<mujoco model="swimmer">
  <option timestep="0.01" viscosity="0.1"/>
  <worldbody>
    <body name="torso">
      <geom name="torso_geom" type="capsule" size="0.1 0.5"/>
      <joint name="slider1" type="slide"/>
      <joint name="slider2" type="slide"/>
      <joint name="free_body_rot" type="hinge"/>
      <body name="mid">
        <geom name="mid_geom" type="capsule" size="0.1 0.5"/>
        <joint name="motor1_rot" type="hinge" damping="0.1"/>
        <body name="back">
          <geom name="back_geom" type="capsule" size="0.1 0.5"/>
          <joint name="motor2_rot" type="hinge" damping="0.1"/>
        </body>
      </body>
    </body>
  </worldbody>
  <actuator>
    <motor joint="motor1_rot" gear="150"/>
    <motor joint="motor2_rot" gear="150"/>
  </actuator>
</mujoco>
"#;

    #[test]
    fn parses_segments_joints_actuators() {
        let spec = parse_model(MODEL).unwrap();
        assert_eq!(spec.name, "swimmer");
        assert_eq!(spec.timestep, 0.01);
        assert_eq!(spec.viscosity, 0.1);
        assert_eq!(spec.segments.len(), 3);
        assert_eq!(spec.segments[2].body, "back");
        assert_eq!(spec.segments[0].radius, 0.1);
        assert_eq!(spec.segments[0].half_length, 0.5);
        assert_eq!(spec.actuators.len(), 2);
        assert_eq!(spec.actuators[0].joint, "motor1_rot");
        assert_eq!(spec.actuators[0].gear, 150.0);
        assert_eq!(spec.actuated_damping(0), 0.1);
    }

    #[test]
    fn gear_rewrite_changes_only_target_motor() {
        let (patched, old, new) = rewrite_motor_gear(MODEL, "motor1_rot", &|g| g + 10.0)
            .unwrap()
            .unwrap();
        assert_eq!(old, 150.0);
        assert_eq!(new, 160.0);
        let spec = parse_model(&patched).unwrap();
        assert_eq!(spec.actuators[0].gear, 160.0);
        assert_eq!(spec.actuators[1].gear, 150.0);
    }

    #[test]
    fn gear_rewrite_unknown_joint_is_none() {
        assert!(rewrite_motor_gear(MODEL, "hip_4", &|g| g).unwrap().is_none());
    }

    #[test]
    fn geom_rewrite_preserves_other_size_components() {
        let (patched, old, new) = rewrite_geom_size(MODEL, "back", &|s| s * 2.0)
            .unwrap()
            .unwrap();
        assert_eq!(old, 0.1);
        assert_eq!(new, 0.2);
        let spec = parse_model(&patched).unwrap();
        assert_eq!(spec.segments[2].radius, 0.2);
        assert_eq!(spec.segments[2].half_length, 0.5);
        // Other bodies untouched.
        assert_eq!(spec.segments[0].radius, 0.1);
    }

    #[test]
    fn geom_rewrite_unknown_body_is_none() {
        assert!(rewrite_geom_size(MODEL, "left_leg", &|s| s).unwrap().is_none());
    }

    #[test]
    fn missing_actuators_rejected() {
        let bad = r#"<mujoco model="m"><worldbody><body name="a"><geom size="0.1"/></body></worldbody></mujoco>"#;
        assert!(matches!(parse_model(bad), Err(Error::Model(_))));
    }
}
