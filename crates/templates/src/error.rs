//! Error type shared by preparation, rendering, caching and watching.

use std::path::PathBuf;

use stencil_core::{EvalError, ParseError};

use crate::lifecycle::AlreadyClosed;
use crate::schema::{InvalidData, PathConflict};

/// Errors that can occur while preparing, rendering, caching or watching templates.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    /// Filesystem I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The engine could not compile a source.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The engine failed while rendering.
    #[error(transparent)]
    Eval(#[from] EvalError),

    /// Variable paths of a template disagree about list vs. map.
    #[error("Schema conflict: {0}")]
    Conflict(#[from] PathConflict),

    /// Template data is missing required structure.
    #[error("{0}")]
    Invalid(#[from] InvalidData),

    /// The template or fragment was used after being closed.
    #[error("{0}")]
    AlreadyClosed(#[from] AlreadyClosed),

    /// The file extension does not name a known template format.
    #[error("Unexpected type of file: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    /// A template references a fragment that was not supplied.
    #[error("Missing fragment: {0}")]
    MissingFragment(String),

    /// Filesystem watcher error.
    #[error("Notify watcher error: {0}")]
    Notify(#[from] notify::Error),

    #[error("Directory watcher is already running")]
    AlreadyRunning,

    #[error("Directory watcher is not running")]
    NotRunning,

    /// A stopped watcher cannot be started again.
    #[error("Directory watcher was stopped")]
    Stopped,

    /// Bad arguments, e.g. a watch root that is not a directory.
    #[error("Invalid options: {0}")]
    InvalidOptions(String),
}

/// Result alias for template operations.
pub type Result<T> = std::result::Result<T, TemplateError>;
