//! Batch scheduler integration module
//!
//! Slurm script rendering, job submission and the job context of the
//! current process.

pub mod hpc;

pub use hpc::{JobInfo, JobScheduler, JobStatus, SlurmScript};
