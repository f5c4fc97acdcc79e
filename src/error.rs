//! Error types for gpulaunch
//!
//! Only failures of the launcher itself are errors. A training program that
//! exits non-zero is a completed launch, reported through `LaunchOutcome`.

use std::path::PathBuf;
use thiserror::Error;

/// Exit code a shell uses when the command cannot be found
pub const EXIT_NOT_FOUND: i32 = 127;

/// Exit code a shell uses when the command is found but not executable
pub const EXIT_NOT_EXECUTABLE: i32 = 126;

/// Main error type for gpulaunch operations
#[derive(Error, Debug)]
pub enum LaunchError {
    /// I/O error with path context
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The training program could not be started
    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Launch profile could not be parsed
    #[error("Invalid profile '{path}': {message}")]
    Profile { path: PathBuf, message: String },

    /// A scheduler command failed
    #[error("{command} failed: {message}")]
    Scheduler { command: String, message: String },

    /// No batch scheduler on this host
    #[error("No Slurm scheduler detected (sbatch not found on PATH)")]
    NoScheduler,

    /// Unparsable wall-clock limit
    #[error("Invalid time limit: {0}")]
    InvalidTimeLimit(String),
}

impl LaunchError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a spawn error for the given program
    pub fn spawn(program: impl Into<String>, source: std::io::Error) -> Self {
        Self::Spawn {
            program: program.into(),
            source,
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a scheduler command error
    pub fn scheduler(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Scheduler {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Process exit code for this error, following shell conventions
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Spawn { source, .. } => match source.kind() {
                std::io::ErrorKind::NotFound => EXIT_NOT_FOUND,
                std::io::ErrorKind::PermissionDenied => EXIT_NOT_EXECUTABLE,
                _ => 1,
            },
            _ => 1,
        }
    }
}

/// Result type alias for gpulaunch operations
pub type Result<T> = std::result::Result<T, LaunchError>;

impl From<std::io::Error> for LaunchError {
    fn from(err: std::io::Error) -> Self {
        LaunchError::Io {
            path: PathBuf::new(),
            source: err,
        }
    }
}

/// Extension trait for adding path context to std::io::Result
pub trait IoResultExt<T> {
    /// Add path context to an I/O error
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| LaunchError::io(path, e))
    }
}
