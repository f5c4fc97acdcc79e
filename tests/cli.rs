//! End-to-end tests of the gpulaunch binary

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn gpulaunch() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_gpulaunch"));
    for var in [
        "GPULAUNCH_DEVICE",
        "GPULAUNCH_CONFIG",
        "GPULAUNCH_WRITE_IMAGE",
        "RUST_LOG",
        "SLURM_JOB_ID",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

fn run(args: &[&str]) -> Output {
    gpulaunch()
        .args(args)
        .output()
        .expect("failed to run gpulaunch")
}

fn write_script(dir: &Path, body: &str) -> PathBuf {
    let script = dir.join("train.sh");
    std::fs::write(&script, body).unwrap();
    script
}

#[test]
fn dry_run_prints_command_line() {
    let out = run(&["--dry-run", "--device", "2", "--config", "my cfg.yaml", "--write-image", "5"]);

    assert!(out.status.success());
    assert_eq!(
        String::from_utf8_lossy(&out.stdout),
        "CUDA_VISIBLE_DEVICES=2 python train.py --config 'my cfg.yaml' --write_image 5\n"
    );
}

#[test]
fn script_subcommand_prints_batch_script() {
    let out = run(&["script", "--partition", "debug", "--time", "90m"]);

    assert!(out.status.success());
    let script = String::from_utf8_lossy(&out.stdout);
    assert!(script.starts_with("#!/bin/bash\n"));
    assert!(script.contains("#SBATCH --partition=debug\n"));
    assert!(script.contains("#SBATCH --time=01:30:00\n"));
}

#[test]
fn script_subcommand_rejects_multiline_partition() {
    let out = run(&["script", "--partition", "gpu\n#SBATCH --account=other"]);

    assert_eq!(out.status.code(), Some(1));
    assert!(out.stdout.is_empty());
    assert!(String::from_utf8_lossy(&out.stderr).starts_with("Error:"));
}

#[test]
fn invalid_time_limit_exits_one() {
    let out = run(&["script", "--time", "soon"]);

    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("Error:"));
}

#[test]
fn missing_interpreter_exits_127() {
    let out = run(&["--python", "/nonexistent/bin/python-gpulaunch", "-q"]);

    assert_eq!(out.status.code(), Some(127));
    assert!(String::from_utf8_lossy(&out.stderr).contains("Error:"));
}

#[test]
fn json_log_format() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "exit 0\n");

    let out = run(&[
        "--log-format",
        "json",
        "--python",
        "sh",
        "--entry-point",
        script.to_str().unwrap(),
    ]);

    assert!(out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    let first = stderr.lines().next().expect("no log output");
    let event: serde_json::Value = serde_json::from_str(first).unwrap();
    assert_eq!(event["level"], "INFO");
}

#[cfg(unix)]
mod unix {
    use super::*;
    use nix::sys::signal::{kill, killpg, Signal};
    use nix::unistd::Pid;
    use std::os::unix::process::CommandExt;
    use std::process::Stdio;
    use std::time::{Duration, Instant};

    fn wait_for(path: &Path) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !path.exists() {
            assert!(Instant::now() < deadline, "timed out waiting for {:?}", path);
            std::thread::sleep(Duration::from_millis(20));
        }
    }

    /// Start the launcher as leader of its own process group
    fn spawn_training(dir: &Path, body: &str) -> std::process::Child {
        let script = write_script(dir, body);
        gpulaunch()
            .args(["-q", "--python", "sh", "--entry-point"])
            .arg(&script)
            .arg("--workdir")
            .arg(dir)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .process_group(0)
            .spawn()
            .expect("failed to spawn gpulaunch")
    }

    #[test]
    fn exit_code_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "exit 5\n");

        let out = run(&["-q", "--python", "sh", "--entry-point", script.to_str().unwrap()]);
        assert_eq!(out.status.code(), Some(5));
    }

    #[test]
    fn interrupt_lets_child_clean_up() {
        let dir = tempfile::tempdir().unwrap();
        let mut launcher = spawn_training(
            dir.path(),
            "trap 'touch cleaned; exit 0' INT\ntouch ready\nwhile :; do sleep 0.1; done\n",
        );

        wait_for(&dir.path().join("ready"));
        std::thread::sleep(Duration::from_millis(200));

        // Ctrl-C reaches the whole foreground group
        let pgid = Pid::from_raw(launcher.id() as i32);
        killpg(pgid, Signal::SIGINT).unwrap();

        let status = launcher.wait().unwrap();
        assert_eq!(status.code(), Some(0));
        assert!(dir.path().join("cleaned").exists());
    }

    #[test]
    fn terminate_is_forwarded_to_child() {
        let dir = tempfile::tempdir().unwrap();
        let mut launcher = spawn_training(
            dir.path(),
            "trap 'exit 7' TERM\ntouch ready\nwhile :; do sleep 0.1; done\n",
        );

        wait_for(&dir.path().join("ready"));
        std::thread::sleep(Duration::from_millis(200));

        kill(Pid::from_raw(launcher.id() as i32), Signal::SIGTERM).unwrap();

        let status = launcher.wait().unwrap();
        assert_eq!(status.code(), Some(7));
    }
}
