// src/error.rs
//
// Crate-wide error type. The environment is best-effort: the only
// hard failures are construction-time (missing or malformed model
// file) and I/O on the model path during a step.

use std::path::PathBuf;

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The resolved model path does not exist.
    #[error("model file {} does not exist", .0.display())]
    ModelNotFound(PathBuf),

    /// The model document parsed but is not usable as a swimmer
    /// description (no segments, no actuators, bad numeric attribute).
    #[error("invalid model description: {0}")]
    Model(String),

    /// Low-level XML syntax error from the parser.
    #[error("malformed model XML: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Action vector length does not match the actuator count.
    #[error("action has {got} components, model has {expected} actuators")]
    ActionShape { got: usize, expected: usize },

    /// Propagated I/O errors (model file read/write/restore).
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
