use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a run. Filter failures on individual clusters are not
/// errors; they produce tagged, excluded clusters.
#[derive(Error, Debug)]
pub enum HapError {
    /// Bad parameters or tables, detected before any worker starts
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// The input directory layout does not match <sample>/<replicate>/<file>
    #[error("Input structure error: {message}")]
    InputStructure { message: String },

    /// A state that only a logic defect can produce
    #[error("Internal consistency error: {message}")]
    InternalConsistency { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Checkpoint error for {path}: {source}")]
    Checkpoint {
        path: PathBuf,
        #[source]
        source: bincode::Error,
    },

    #[error("Could not parse sequences from {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

pub type Result<T> = std::result::Result<T, HapError>;

impl HapError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn input_structure(message: impl Into<String>) -> Self {
        Self::InputStructure {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalConsistency {
            message: message.into(),
        }
    }

    pub fn parse(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.to_string(),
        }
    }
}
