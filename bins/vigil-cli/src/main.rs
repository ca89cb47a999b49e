mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "vigil")]
#[command(about = "Vigil CLI - Submit, track and test jobs on the cluster", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a job script to the cluster
    Submit {
        /// Local path of the job script
        script: String,

        /// Job name (defaults to the script file stem)
        #[arg(short, long)]
        name: Option<String>,

        /// Wall-clock limit (HH:MM:SS)
        #[arg(short, long, default_value = "01:00:00")]
        time: String,

        /// Memory request (e.g. 4G, 512M)
        #[arg(short, long, default_value = "4G")]
        mem: String,

        /// CPUs per task
        #[arg(short, long, default_value = "1")]
        cpus: u32,

        /// Node count
        #[arg(long, default_value = "1")]
        nodes: u32,
    },

    /// Query the status of a job
    Status {
        /// Scheduler job id
        job_id: String,
    },

    /// Cancel a job
    Cancel {
        /// Scheduler job id
        job_id: String,
    },

    /// Collect results and metrics of a finished job
    Results {
        /// Scheduler job id
        job_id: String,

        /// Job name used at submission (output artifact prefix)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Poll jobs until they finish
    Monitor {
        /// Scheduler job ids
        job_ids: Vec<String>,

        /// Poll interval in seconds
        #[arg(short, long, default_value = "30")]
        interval: u64,

        /// Give up after this many minutes
        #[arg(short, long, default_value = "720")]
        max_wait: u64,
    },

    /// Run a test suite definition on the cluster
    RunSuite {
        /// Local path of the suite JSON file
        file: String,

        /// Submit all cases at once instead of chaining them
        #[arg(short, long, default_value = "false")]
        parallel: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Submit {
            script,
            name,
            time,
            mem,
            cpus,
            nodes,
        } => {
            commands::submit(&script, name.as_deref(), &time, &mem, cpus, nodes).await?;
        }
        Commands::Status { job_id } => {
            commands::status(&job_id).await?;
        }
        Commands::Cancel { job_id } => {
            commands::cancel(&job_id).await?;
        }
        Commands::Results { job_id, name } => {
            commands::results(&job_id, name.as_deref()).await?;
        }
        Commands::Monitor {
            job_ids,
            interval,
            max_wait,
        } => {
            commands::monitor(&job_ids, interval, max_wait).await?;
        }
        Commands::RunSuite { file, parallel } => {
            commands::run_suite(&file, parallel).await?;
        }
    }

    Ok(())
}
