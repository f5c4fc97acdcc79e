//! Training job launcher
//!
//! Builds the child invocation from a [`LaunchConfig`] and runs it with
//! inherited stdio. The only environment change is the device-visibility
//! variable; the child's exit status is handed back untouched.

use crate::config::LaunchConfig;
use crate::core::{shell, SignalGuard};
use crate::error::{LaunchError, Result};
use std::ffi::OsString;
use std::process::{Command, ExitStatus};
use std::time::{Duration, Instant};

/// Variable restricting which accelerators the child can see
pub const DEVICE_ENV: &str = "CUDA_VISIBLE_DEVICES";

/// Flag carrying the training configuration path
pub const CONFIG_FLAG: &str = "--config";

/// Flag carrying the write-image interval
pub const WRITE_IMAGE_FLAG: &str = "--write_image";

/// Launches the external training program
#[derive(Debug, Clone)]
pub struct JobLauncher {
    config: LaunchConfig,
}

impl JobLauncher {
    /// Create a launcher for the given configuration
    pub fn new(config: LaunchConfig) -> Self {
        Self { config }
    }

    /// Get the launch configuration
    pub fn config(&self) -> &LaunchConfig {
        &self.config
    }

    /// Program that is executed (the interpreter)
    pub fn program(&self) -> &str {
        &self.config.interpreter
    }

    /// Arguments after the program: entry point and the two forwarded flags
    pub fn args(&self) -> Vec<OsString> {
        vec![
            self.config.entry_point.clone().into_os_string(),
            CONFIG_FLAG.into(),
            self.config.config_path.clone().into_os_string(),
            WRITE_IMAGE_FLAG.into(),
            self.config.write_image.to_string().into(),
        ]
    }

    /// Full argument vector, lossily converted for display
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program().to_string())
            .chain(self.args().iter().map(|a| a.to_string_lossy().into_owned()))
            .collect()
    }

    /// The single environment mutation applied to the child
    pub fn device_env(&self) -> (&'static str, String) {
        (DEVICE_ENV, self.config.device.to_string())
    }

    /// Build the child command without spawning it
    pub fn command(&self) -> Command {
        let (key, value) = self.device_env();

        let mut cmd = Command::new(self.program());
        cmd.args(self.args()).env(key, value);

        if let Some(ref dir) = self.config.work_dir {
            cmd.current_dir(dir);
        }

        cmd
    }

    /// Shell-quoted one-liner equivalent to [`command`](Self::command)
    ///
    /// Fails if an argument is not valid UTF-8, since the rendered line
    /// would no longer pass the same bytes to the child.
    pub fn command_line(&self) -> Result<String> {
        let (key, value) = self.device_env();

        let mut words = Vec::with_capacity(5);
        for arg in self.args() {
            let word = arg.into_string().map_err(|raw| {
                LaunchError::config(format!(
                    "argument {:?} is not valid UTF-8 and cannot be written as a shell command",
                    raw
                ))
            })?;
            words.push(word);
        }

        Ok(format!(
            "{}={} {} {}",
            key,
            shell::quote(&value),
            shell::quote_command(self.program()),
            shell::join(words)
        ))
    }

    /// Run the training program and wait for it to exit
    ///
    /// A non-zero exit of the child is not an error; only a failure to
    /// start or wait for it is.
    pub fn run(&self) -> Result<LaunchOutcome> {
        tracing::info!(
            "Launching on device {} with config {:?} (write_image={})",
            self.config.device,
            self.config.config_path,
            self.config.write_image
        );
        tracing::debug!("Command: {:?}", self.argv());

        let start = Instant::now();
        let mut child = self
            .command()
            .spawn()
            .map_err(|e| LaunchError::spawn(self.program(), e))?;

        tracing::debug!("Started child process {}", child.id());

        let _signals = match SignalGuard::install(child.id()) {
            Ok(guard) => Some(guard),
            Err(e) => {
                tracing::warn!("Could not install signal handling: {}", e);
                None
            }
        };

        let status = child
            .wait()
            .map_err(|e| LaunchError::spawn(self.program(), e))?;

        let outcome = LaunchOutcome {
            status,
            duration: start.elapsed(),
        };

        if outcome.success() {
            tracing::info!("Training finished in {}", outcome.elapsed_display());
        } else {
            match outcome.signal_name() {
                Some(name) => tracing::warn!(
                    "Training killed by {} after {}",
                    name,
                    outcome.elapsed_display()
                ),
                None => tracing::warn!(
                    "Training exited with code {} after {}",
                    outcome.exit_code(),
                    outcome.elapsed_display()
                ),
            }
        }

        Ok(outcome)
    }
}

/// Result of a completed launch
#[derive(Debug, Clone, Copy)]
pub struct LaunchOutcome {
    /// Raw exit status of the child
    pub status: ExitStatus,
    /// Wall time from spawn to exit
    pub duration: Duration,
}

impl LaunchOutcome {
    /// Check whether the child exited successfully
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Signal that terminated the child, if any
    #[cfg(unix)]
    pub fn signal(&self) -> Option<i32> {
        use std::os::unix::process::ExitStatusExt;
        self.status.signal()
    }

    /// Signal that terminated the child, if any
    #[cfg(not(unix))]
    pub fn signal(&self) -> Option<i32> {
        None
    }

    /// Exit code to propagate: the child's code, or 128 + signal
    pub fn exit_code(&self) -> i32 {
        match (self.status.code(), self.signal()) {
            (Some(code), _) => code,
            (None, Some(sig)) => 128 + sig,
            (None, None) => 1,
        }
    }

    #[cfg(unix)]
    fn signal_name(&self) -> Option<String> {
        self.signal().map(|sig| {
            nix::sys::signal::Signal::try_from(sig)
                .map(|s| s.as_str().to_string())
                .unwrap_or_else(|_| format!("signal {}", sig))
        })
    }

    #[cfg(not(unix))]
    fn signal_name(&self) -> Option<String> {
        None
    }

    fn elapsed_display(&self) -> String {
        let rounded = Duration::from_secs(self.duration.as_secs());
        humantime::format_duration(rounded).to_string()
    }
}
