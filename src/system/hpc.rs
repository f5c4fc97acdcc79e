//! Slurm batch scheduler integration
//!
//! Renders batch scripts for a launch, submits them with `sbatch`,
//! queries and cancels jobs, and reads the job context when running
//! inside an allocation.

use crate::config::LaunchConfig;
use crate::core::{shell, JobLauncher};
use crate::error::{IoResultExt, LaunchError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

/// Slurm job context of the current process
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInfo {
    /// Job ID
    pub job_id: Option<String>,
    /// Job name
    pub job_name: Option<String>,
    /// Partition the job runs in
    pub partition: Option<String>,
    /// Time limit (seconds)
    pub time_limit: Option<u64>,
    /// Node list
    pub node_list: Vec<String>,
    /// GPU indices allocated to the job
    pub gpus: Vec<String>,
}

impl JobInfo {
    /// Collect job information from the process environment
    pub fn collect() -> Self {
        Self::from_env(|key| env::var(key).ok())
    }

    /// Collect job information from an arbitrary variable lookup
    pub fn from_env<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let job_id = lookup("SLURM_JOB_ID");
        if job_id.is_none() {
            return Self::default();
        }

        // SLURM_NODELIST is the older spelling
        let node_list = lookup("SLURM_JOB_NODELIST")
            .or_else(|| lookup("SLURM_NODELIST"))
            .map(|s| expand_node_list(&s))
            .unwrap_or_default();

        let gpus = lookup("SLURM_JOB_GPUS")
            .or_else(|| lookup("SLURM_STEP_GPUS"))
            .map(|s| {
                s.split(',')
                    .map(|g| g.trim().to_string())
                    .filter(|g| !g.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            job_id,
            job_name: lookup("SLURM_JOB_NAME"),
            partition: lookup("SLURM_JOB_PARTITION"),
            time_limit: lookup("SLURM_TIMELIMIT").and_then(|s| parse_slurm_time(&s)),
            node_list,
            gpus,
        }
    }

    /// Check if running inside a job
    pub fn is_job(&self) -> bool {
        self.job_id.is_some()
    }
}

/// Batch script for one launch
pub struct SlurmScript;

impl SlurmScript {
    /// Render the `#SBATCH` header followed by the launch command line
    ///
    /// The configuration is validated first, so no directive value can
    /// break out of its `#SBATCH` line.
    pub fn render(config: &LaunchConfig) -> Result<String> {
        config.validate()?;

        let batch = &config.batch;
        let mut script = String::from("#!/bin/bash\n");

        script.push_str(&format!("#SBATCH --job-name={}\n", shell::quote(&batch.job_name)));

        let gres = match batch.gpu_type {
            Some(ref kind) => format!("gpu:{}:{}", kind, batch.gpus),
            None => format!("gpu:{}", batch.gpus),
        };
        script.push_str(&format!("#SBATCH --gres={}\n", gres));

        if let Some(ref partition) = batch.partition {
            script.push_str(&format!("#SBATCH --partition={}\n", partition));
        }
        script.push_str(&format!("#SBATCH --time={}\n", format_slurm_time(batch.time_limit)));

        if let Some(ref output) = batch.output {
            script.push_str(&format!("#SBATCH --output={}\n", path_word("output", output)?));
        }
        if let Some(ref dir) = config.work_dir {
            script.push_str(&format!("#SBATCH --chdir={}\n", path_word("working directory", dir)?));
        }

        script.push('\n');
        script.push_str(&JobLauncher::new(config.clone()).command_line()?);
        script.push('\n');

        Ok(script)
    }
}

/// Shell-quoted directive value for a path
fn path_word(what: &str, path: &Path) -> Result<String> {
    path.to_str()
        .map(shell::quote)
        .ok_or_else(|| LaunchError::config(format!("{} path {:?} is not valid UTF-8", what, path)))
}

/// Submitted job state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    /// Queued, held or being configured
    Pending,
    /// Running or completing
    Running,
    /// Finished with exit code 0
    Completed,
    /// Failed, timed out or lost its node
    Failed,
    /// Cancelled by a user or admin
    Cancelled,
    /// State not recognised
    Unknown,
}

impl JobStatus {
    /// Map a Slurm state name (squeue %T or sacct State) to a status
    pub fn from_slurm(state: &str) -> Self {
        // sacct reports e.g. "CANCELLED by 1000"
        let state = state.split_whitespace().next().unwrap_or("").to_uppercase();
        match state.as_str() {
            "PENDING" | "CONFIGURING" | "REQUEUED" | "SUSPENDED" => JobStatus::Pending,
            "RUNNING" | "COMPLETING" => JobStatus::Running,
            "COMPLETED" => JobStatus::Completed,
            "FAILED" | "TIMEOUT" | "NODE_FAIL" | "OUT_OF_MEMORY" | "BOOT_FAIL" => JobStatus::Failed,
            "CANCELLED" => JobStatus::Cancelled,
            _ => JobStatus::Unknown,
        }
    }
}

/// Slurm scheduler interface
pub struct JobScheduler {
    sbatch: PathBuf,
}

impl JobScheduler {
    /// Detect Slurm on this host
    pub fn detect() -> Result<Self> {
        which("sbatch")
            .map(|sbatch| Self { sbatch })
            .ok_or(LaunchError::NoScheduler)
    }

    /// Use a specific sbatch binary
    pub fn with_sbatch(sbatch: impl Into<PathBuf>) -> Self {
        Self {
            sbatch: sbatch.into(),
        }
    }

    /// Submit a launch as a batch job, returning the job ID
    pub fn submit(&self, config: &LaunchConfig) -> Result<String> {
        let script = SlurmScript::render(config)?;
        tracing::debug!("Submitting batch script:\n{}", script);

        let mut child = Command::new(&self.sbatch)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| LaunchError::spawn(self.sbatch.display().to_string(), e))?;

        // sbatch may exit before reading; its stderr explains why
        let written = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(script.as_bytes()),
            None => Ok(()),
        };

        let output = child.wait_with_output().with_path(&self.sbatch)?;

        if !output.status.success() {
            return Err(LaunchError::scheduler("sbatch", stderr_message(&output)));
        }
        written.with_path(&self.sbatch)?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_submitted_job_id(&stdout).ok_or_else(|| {
            LaunchError::scheduler("sbatch", format!("unexpected output: {}", stdout.trim()))
        })
    }

    /// Cancel a job
    pub fn cancel(&self, job_id: &str) -> Result<()> {
        let output = self.run_tool("scancel", &[job_id])?;

        if output.status.success() {
            Ok(())
        } else {
            Err(LaunchError::scheduler("scancel", stderr_message(&output)))
        }
    }

    /// Get job status
    pub fn status(&self, job_id: &str) -> Result<JobStatus> {
        let output = self.run_tool("squeue", &["-j", job_id, "-h", "-o", "%T"])?;

        let state = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if output.status.success() && !state.is_empty() {
            return Ok(JobStatus::from_slurm(&state));
        }

        // Finished jobs drop out of squeue; ask the accounting database
        let output = self.run_tool("sacct", &["-j", job_id, "-n", "-X", "-o", "State"])?;

        if !output.status.success() {
            return Err(LaunchError::scheduler("sacct", stderr_message(&output)));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout
            .lines()
            .find(|line| !line.trim().is_empty())
            .map(JobStatus::from_slurm)
            .unwrap_or(JobStatus::Unknown))
    }

    /// Sibling Slurm tool, resolved next to sbatch when possible
    fn tool_path(&self, tool: &str) -> PathBuf {
        match self.sbatch.parent().map(|dir| dir.join(tool)) {
            Some(path) if path.is_file() => path,
            _ => PathBuf::from(tool),
        }
    }

    fn run_tool(&self, tool: &str, args: &[&str]) -> Result<Output> {
        let program = self.tool_path(tool);
        tracing::debug!("Running {} {}", program.display(), args.join(" "));

        Command::new(&program)
            .args(args)
            .output()
            .map_err(|e| LaunchError::spawn(program.display().to_string(), e))
    }
}

// Helper functions

fn stderr_message(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

fn which(cmd: &str) -> Option<PathBuf> {
    env::var_os("PATH").and_then(|paths| {
        env::split_paths(&paths).find_map(|dir| {
            let full_path = dir.join(cmd);
            if full_path.is_file() {
                Some(full_path)
            } else {
                None
            }
        })
    })
}

/// Parse "Submitted batch job 12345" (or `--parsable` "12345;cluster")
pub fn parse_submitted_job_id(stdout: &str) -> Option<String> {
    let last = stdout.split_whitespace().last()?;
    let id = last.split(';').next()?;
    if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit() || c == '_') {
        Some(id.to_string())
    } else {
        None
    }
}

/// Parse a Slurm time limit into seconds
///
/// Accepts `MM`, `MM:SS`, `HH:MM:SS`, `D-HH`, `D-HH:MM` and `D-HH:MM:SS`.
pub fn parse_slurm_time(s: &str) -> Option<u64> {
    fn num(p: &str) -> Option<u64> {
        p.parse().ok()
    }

    let s = s.trim();

    if let Some((days, rest)) = s.split_once('-') {
        let days = num(days)?;
        let parts: Vec<&str> = rest.split(':').collect();
        let within_day = match parts.as_slice() {
            [h] => hms(num(h)?, 0, 0)?,
            [h, m] => hms(num(h)?, num(m)?, 0)?,
            [h, m, sec] => hms(num(h)?, num(m)?, num(sec)?)?,
            _ => return None,
        };
        return days.checked_mul(86400)?.checked_add(within_day);
    }

    let parts: Vec<&str> = s.split(':').collect();
    match parts.as_slice() {
        [m] => hms(0, num(m)?, 0),
        [m, sec] => hms(0, num(m)?, num(sec)?),
        [h, m, sec] => hms(num(h)?, num(m)?, num(sec)?),
        _ => None,
    }
}

/// Seconds in `h:m:s`, or `None` on overflow
fn hms(hours: u64, minutes: u64, seconds: u64) -> Option<u64> {
    hours
        .checked_mul(3600)?
        .checked_add(minutes.checked_mul(60)?)?
        .checked_add(seconds)
}

/// Format seconds as a Slurm time limit
pub fn format_slurm_time(seconds: u64) -> String {
    let days = seconds / 86400;
    let hours = (seconds % 86400) / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if days > 0 {
        format!("{}-{:02}:{:02}:{:02}", days, hours, minutes, secs)
    } else {
        format!("{:02}:{:02}:{:02}", hours, minutes, secs)
    }
}

/// Most hosts a single bracketed entry may expand to
const MAX_EXPANDED_NODES: u64 = 4096;

/// Expand a Slurm node list such as `gpu[01-03,07],login1`
///
/// Entries that are malformed, use a reversed range, or would expand past
/// [`MAX_EXPANDED_NODES`] are kept verbatim.
pub fn expand_node_list(nodelist: &str) -> Vec<String> {
    let mut nodes = Vec::new();

    for entry in split_top_level(nodelist) {
        if entry.is_empty() {
            continue;
        }
        match expand_entry(entry) {
            Some(expanded) => nodes.extend(expanded),
            None => nodes.push(entry.to_string()),
        }
    }

    nodes
}

fn expand_entry(entry: &str) -> Option<Vec<String>> {
    let open = entry.find('[')?;
    let close = open + entry[open..].find(']')?;

    let prefix = &entry[..open];
    let suffix = &entry[close + 1..];
    let mut nodes = Vec::new();

    for range in entry[open + 1..close].split(',') {
        match range.split_once('-') {
            Some((start, end)) => {
                let s: u32 = start.parse().ok()?;
                let e: u32 = end.parse().ok()?;
                if s > e || nodes.len() as u64 + u64::from(e - s) + 1 > MAX_EXPANDED_NODES {
                    return None;
                }
                let width = start.len();
                for i in s..=e {
                    nodes.push(format!("{}{:0width$}{}", prefix, i, suffix, width = width));
                }
            }
            None => {
                if nodes.len() as u64 >= MAX_EXPANDED_NODES {
                    return None;
                }
                nodes.push(format!("{}{}{}", prefix, range, suffix));
            }
        }
    }

    Some(nodes)
}

/// Split on commas that are not inside brackets
fn split_top_level(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, c) in s.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(s[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(s[start..].trim());

    parts
}
