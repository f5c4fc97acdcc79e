//! # gpulaunch - GPU training job launcher
//!
//! gpulaunch runs an external training program on a single accelerator.
//! It exposes one device index through `CUDA_VISIBLE_DEVICES`, forwards a
//! configuration path and a write-image interval, and returns the
//! program's exit status as its own. The same launch can be rendered as a
//! Slurm batch script and submitted with `sbatch`.
//!
//! ## Quick Start
//!
//! ```no_run
//! use gpulaunch::config::LaunchConfig;
//! use gpulaunch::core::JobLauncher;
//! use std::path::PathBuf;
//!
//! let config = LaunchConfig {
//!     device: 1,
//!     config_path: PathBuf::from("configs/base_modl,k=1.yaml"),
//!     write_image: 0,
//!     ..Default::default()
//! };
//!
//! let outcome = JobLauncher::new(config).run().unwrap();
//! std::process::exit(outcome.exit_code());
//! ```
//!
//! ## Batch Submission
//!
//! ```no_run
//! use gpulaunch::config::LaunchConfig;
//! use gpulaunch::system::{JobScheduler, SlurmScript};
//!
//! let config = LaunchConfig::default();
//! println!("{}", SlurmScript::render(&config).unwrap());
//!
//! let scheduler = JobScheduler::detect().unwrap();
//! let job_id = scheduler.submit(&config).unwrap();
//! println!("Submitted job {}", job_id);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod core;
pub mod error;
pub mod system;

// Re-export commonly used types
pub use config::{BatchDirectives, LaunchConfig};
pub use core::{JobLauncher, LaunchOutcome};
pub use error::{LaunchError, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports for common usage
    //!
    //! ```no_run
    //! use gpulaunch::prelude::*;
    //! ```

    pub use crate::config::{BatchDirectives, CliArgs, LaunchConfig};
    pub use crate::core::{JobLauncher, LaunchOutcome, DEVICE_ENV};
    pub use crate::error::{LaunchError, Result};
    pub use crate::system::{JobInfo, JobScheduler, JobStatus, SlurmScript};
}
