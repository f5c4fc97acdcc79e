//! Configuration settings for gpulaunch
//!
//! Defines the launch description, the batch directives, CLI arguments,
//! and how the three configuration layers are merged:
//! built-in defaults, then an optional JSON profile, then flags/env.

use crate::error::{IoResultExt, LaunchError, Result};
use crate::system::hpc::parse_slurm_time;
use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// gpulaunch - run a GPU training job locally or through Slurm
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "gpulaunch")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Launch a GPU training job on one device, locally or via sbatch")]
#[command(long_about = r#"
gpulaunch restricts the visible accelerator to a single device index and runs
the training entry point with a configuration file and a write-image interval.
The exit status of the training program becomes the exit status of gpulaunch.

Examples:
  gpulaunch                                    # Run with built-in defaults
  gpulaunch --device 1 --config cfg.yaml       # Pick device and config
  gpulaunch script --partition gpu --time 4h   # Print an sbatch script
  gpulaunch submit --gpu-type a100             # Submit to Slurm
  gpulaunch status 123456                      # Query a submitted job
"#)]
pub struct CliArgs {
    /// JSON launch profile (fields override built-in defaults)
    #[arg(long, global = true, value_name = "PATH")]
    pub profile: Option<PathBuf>,

    /// Accelerator index exposed to the training program
    #[arg(short = 'd', long, global = true, env = "GPULAUNCH_DEVICE", value_name = "INDEX")]
    pub device: Option<u32>,

    /// Training configuration file (YAML, forwarded untouched)
    #[arg(short = 'c', long = "config", global = true, env = "GPULAUNCH_CONFIG", value_name = "PATH")]
    pub config_path: Option<PathBuf>,

    /// Write-image interval forwarded to the training program
    #[arg(long, global = true, env = "GPULAUNCH_WRITE_IMAGE", value_name = "N")]
    pub write_image: Option<u32>,

    /// Interpreter used to run the entry point
    #[arg(long = "python", global = true, value_name = "PROGRAM")]
    pub interpreter: Option<String>,

    /// Training entry point
    #[arg(long, global = true, value_name = "PATH")]
    pub entry_point: Option<PathBuf>,

    /// Working directory for the training program
    #[arg(long = "workdir", global = true, value_name = "DIR")]
    pub work_dir: Option<PathBuf>,

    // === Batch directives ===
    /// Batch job name
    #[arg(long, global = true, value_name = "NAME")]
    pub job_name: Option<String>,

    /// Number of GPUs requested from the scheduler
    #[arg(long, global = true, value_name = "NUM")]
    pub gpus: Option<u32>,

    /// GPU type requested from the scheduler (e.g. a100, v100)
    #[arg(long, global = true, value_name = "TYPE")]
    pub gpu_type: Option<String>,

    /// Scheduler partition
    #[arg(short = 'p', long, global = true, value_name = "NAME")]
    pub partition: Option<String>,

    /// Wall-clock limit (Slurm syntax like 1-00:00:00, or 4h, 90m)
    #[arg(short = 't', long, global = true, value_name = "LIMIT")]
    pub time: Option<String>,

    /// Scheduler output file pattern (e.g. slurm-%j.out)
    #[arg(short = 'o', long, global = true, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Show what would be run or submitted without doing it
    #[arg(short = 'n', long, global = true)]
    pub dry_run: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (warnings and errors only)
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Log format on stderr
    #[arg(long, global = true, value_enum, default_value = "text")]
    pub log_format: LogFormat,

    /// Subcommands (defaults to `run`)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Run the training program on this host
    #[command(name = "run")]
    Run,

    /// Print the Slurm batch script for this launch
    #[command(name = "script")]
    Script,

    /// Submit the batch script with sbatch
    #[command(name = "submit")]
    Submit,

    /// Show the state of a submitted job
    #[command(name = "status")]
    Status {
        /// Slurm job id
        job_id: String,
    },

    /// Cancel a submitted job
    #[command(name = "cancel")]
    Cancel {
        /// Slurm job id
        job_id: String,
    },

    /// Print the current Slurm job context as JSON
    #[command(name = "env")]
    Env,
}

/// Log output format
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

/// Resource requests consumed by the batch scheduler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchDirectives {
    /// Job name
    pub job_name: String,
    /// Number of GPUs
    pub gpus: u32,
    /// GPU type, if the cluster distinguishes them
    pub gpu_type: Option<String>,
    /// Partition/queue
    pub partition: Option<String>,
    /// Time limit (seconds)
    pub time_limit: u64,
    /// Output file pattern
    pub output: Option<PathBuf>,
}

impl Default for BatchDirectives {
    fn default() -> Self {
        Self {
            job_name: "train".to_string(),
            gpus: 1,
            gpu_type: Some("a100".to_string()),
            partition: Some("gpu".to_string()),
            time_limit: 24 * 3600, // 24 hours
            output: None,
        }
    }
}

/// Everything needed to launch one training run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LaunchConfig {
    /// Accelerator index made visible to the child
    pub device: u32,
    /// Training configuration path, never opened here
    pub config_path: PathBuf,
    /// Write-image interval, passed through uninterpreted
    pub write_image: u32,
    /// Interpreter program
    pub interpreter: String,
    /// Entry point script
    pub entry_point: PathBuf,
    /// Working directory for the child
    pub work_dir: Option<PathBuf>,
    /// Scheduler resource requests
    pub batch: BatchDirectives,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            device: 0,
            config_path: PathBuf::from("configs/base_modl,k=1.yaml"),
            write_image: 0,
            interpreter: "python".to_string(),
            entry_point: PathBuf::from("train.py"),
            work_dir: None,
            batch: BatchDirectives::default(),
        }
    }
}

impl LaunchConfig {
    /// Load a JSON profile; missing fields keep their defaults
    pub fn load_profile(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_path(path)?;
        serde_json::from_str(&content).map_err(|e| LaunchError::Profile {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Build the effective configuration from CLI arguments
    pub fn from_cli(args: &CliArgs) -> Result<Self> {
        let mut config = match &args.profile {
            Some(path) => Self::load_profile(path)?,
            None => Self::default(),
        };

        config.apply_overrides(args)?;
        config.validate()?;

        Ok(config)
    }

    /// Apply flag and environment overrides on top of this configuration
    pub fn apply_overrides(&mut self, args: &CliArgs) -> Result<()> {
        if let Some(device) = args.device {
            self.device = device;
        }
        if let Some(ref path) = args.config_path {
            self.config_path = path.clone();
        }
        if let Some(interval) = args.write_image {
            self.write_image = interval;
        }
        if let Some(ref interpreter) = args.interpreter {
            self.interpreter = interpreter.clone();
        }
        if let Some(ref entry) = args.entry_point {
            self.entry_point = entry.clone();
        }
        if let Some(ref dir) = args.work_dir {
            self.work_dir = Some(dir.clone());
        }

        if let Some(ref name) = args.job_name {
            self.batch.job_name = name.clone();
        }
        if let Some(gpus) = args.gpus {
            self.batch.gpus = gpus;
        }
        if let Some(ref gpu_type) = args.gpu_type {
            self.batch.gpu_type = Some(gpu_type.clone());
        }
        if let Some(ref partition) = args.partition {
            self.batch.partition = Some(partition.clone());
        }
        if let Some(ref time) = args.time {
            self.batch.time_limit = parse_time_limit(time)?;
        }
        if let Some(ref output) = args.output {
            self.batch.output = Some(output.clone());
        }

        Ok(())
    }

    /// Check the configuration without touching the filesystem
    pub fn validate(&self) -> Result<()> {
        if self.interpreter.trim().is_empty() {
            return Err(LaunchError::config("interpreter must not be empty"));
        }
        if self.entry_point.as_os_str().is_empty() {
            return Err(LaunchError::config("entry point must not be empty"));
        }
        if self.config_path.as_os_str().is_empty() {
            return Err(LaunchError::config("config path must not be empty"));
        }
        if self.batch.gpus == 0 {
            return Err(LaunchError::config("at least one GPU must be requested"));
        }
        if self.batch.time_limit == 0 {
            return Err(LaunchError::config("time limit must be greater than zero"));
        }

        check_directive_word("job name", &self.batch.job_name)?;
        if let Some(ref gpu_type) = self.batch.gpu_type {
            check_directive_word("GPU type", gpu_type)?;
            if gpu_type.contains(':') {
                return Err(LaunchError::config(format!("GPU type {:?} must not contain ':'", gpu_type)));
            }
        }
        if let Some(ref partition) = self.batch.partition {
            check_directive_word("partition", partition)?;
        }
        if let Some(ref output) = self.batch.output {
            check_directive_path("output", output)?;
        }
        if let Some(ref dir) = self.work_dir {
            check_directive_path("working directory", dir)?;
        }
        Ok(())
    }
}

/// Batch directive values are single words on one `#SBATCH` line
fn check_directive_word(what: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(LaunchError::config(format!("{} must not be empty", what)));
    }
    if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(LaunchError::config(format!(
            "{} {:?} must not contain whitespace or control characters",
            what, value
        )));
    }
    Ok(())
}

fn check_directive_path(what: &str, path: &Path) -> Result<()> {
    if path.to_string_lossy().chars().any(char::is_control) {
        return Err(LaunchError::config(format!(
            "{} path {:?} must not contain control characters",
            what, path
        )));
    }
    Ok(())
}

/// Parse a wall-clock limit in Slurm syntax or as a humantime duration
///
/// A bare number is minutes, as in `sbatch --time`.
pub fn parse_time_limit(limit: &str) -> Result<u64> {
    let limit = limit.trim();

    if let Some(seconds) = parse_slurm_time(limit) {
        return Ok(seconds);
    }

    humantime::parse_duration(limit)
        .map(|d| d.as_secs())
        .map_err(|e| LaunchError::InvalidTimeLimit(format!("{}: {}", limit, e)))
}
