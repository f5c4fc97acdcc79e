//! gpulaunch CLI - GPU training job launcher
//!
//! Runs the training program on one device, or hands it to Slurm.

use clap::Parser;
use gpulaunch::config::{CliArgs, Commands, LaunchConfig, LogFormat};
use gpulaunch::core::JobLauncher;
use gpulaunch::error::{LaunchError, Result};
use gpulaunch::system::{JobInfo, JobScheduler, SlurmScript};
use tracing_subscriber::EnvFilter;

fn main() {
    // Parse CLI arguments
    let args = CliArgs::parse();

    init_logging(&args);

    // Exit code is the child's for `run`, 0 otherwise
    match run(args) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}

fn init_logging(args: &CliArgs) {
    let default_level = if args.quiet {
        "warn"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // stdout belongs to the training program
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match args.log_format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn run(args: CliArgs) -> Result<i32> {
    match args.command.clone().unwrap_or(Commands::Run) {
        Commands::Run => cmd_run(&args),
        Commands::Script => cmd_script(&args),
        Commands::Submit => cmd_submit(&args),
        Commands::Status { job_id } => cmd_status(&job_id),
        Commands::Cancel { job_id } => cmd_cancel(&job_id),
        Commands::Env => cmd_env(),
    }
}

fn cmd_run(args: &CliArgs) -> Result<i32> {
    let config = LaunchConfig::from_cli(args)?;
    let launcher = JobLauncher::new(config);

    if args.dry_run {
        if let Some(ref dir) = launcher.config().work_dir {
            println!("cd {}", gpulaunch::core::shell::quote(&dir.to_string_lossy()));
        }
        println!("{}", launcher.command_line()?);
        return Ok(0);
    }

    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    tracing::info!("Host: {}", host);

    let job = JobInfo::collect();
    if let Some(ref job_id) = job.job_id {
        tracing::info!(
            "Slurm job {} on {} (GPUs: {})",
            job_id,
            job.node_list.join(","),
            if job.gpus.is_empty() { "-".to_string() } else { job.gpus.join(",") }
        );
    }

    let outcome = launcher.run()?;
    Ok(outcome.exit_code())
}

fn cmd_script(args: &CliArgs) -> Result<i32> {
    let config = LaunchConfig::from_cli(args)?;
    print!("{}", SlurmScript::render(&config)?);
    Ok(0)
}

fn cmd_submit(args: &CliArgs) -> Result<i32> {
    let config = LaunchConfig::from_cli(args)?;

    if args.dry_run {
        println!("=== Dry Run Mode ===");
        println!("The following script would be submitted:\n");
        print!("{}", SlurmScript::render(&config)?);
        return Ok(0);
    }

    let scheduler = JobScheduler::detect()?;
    let job_id = scheduler.submit(&config)?;

    tracing::info!("Submitted {} as job {}", config.batch.job_name, job_id);
    println!("{}", job_id);
    Ok(0)
}

fn cmd_status(job_id: &str) -> Result<i32> {
    let scheduler = JobScheduler::detect()?;
    let status = scheduler.status(job_id)?;
    println!("{}: {:?}", job_id, status);
    Ok(0)
}

fn cmd_cancel(job_id: &str) -> Result<i32> {
    let scheduler = JobScheduler::detect()?;
    scheduler.cancel(job_id)?;
    tracing::info!("Cancelled job {}", job_id);
    Ok(0)
}

fn cmd_env() -> Result<i32> {
    let info = JobInfo::collect();
    let json = serde_json::to_string_pretty(&info)
        .map_err(|e| LaunchError::config(format!("Failed to serialize job info: {}", e)))?;
    println!("{}", json);
    Ok(0)
}
