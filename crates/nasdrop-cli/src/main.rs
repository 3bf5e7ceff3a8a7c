//! nasdrop operator CLI.
//!
//! Works directly against the shared store named by DATABASE_PATH (loaded from
//! the environment or `.env`, like the services).

use anyhow::Context;
use clap::{Parser, Subcommand};
use nasdrop_cli::{init_tracing, job_row, notification_row, JOB_TABLE_HEADER};
use nasdrop_core::{Config, JobState};
use nasdrop_db::{NotificationRepository, TokenRepository, UploadJobRepository};
use serde::Serialize;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "nasdrop", about = "nasdrop operator CLI")]
struct Cli {
    /// Print JSON instead of a table
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Delete expired upload tokens
    SweepTokens,
    /// List upload jobs, newest first
    Jobs {
        /// Filter by state: received, relaying, stored, error
        #[arg(long)]
        state: Option<JobState>,
        /// Maximum number of jobs
        #[arg(long, default_value = "50")]
        limit: i64,
    },
    /// Show a single job
    Job {
        /// Job UUID
        id: Uuid,
    },
    /// Send an errored job back to the relay with its attempts reset
    Retry {
        /// Job UUID
        id: Uuid,
    },
    /// List notifications waiting for the command front
    Outbox,
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize output")?;
    println!("{}", out);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = Config::from_env()?;
    config.validate()?;
    let pool = nasdrop_db::connect(&config)
        .await
        .with_context(|| format!("Failed to open {}", config.base.database_path.display()))?;

    match cli.command {
        Commands::SweepTokens => {
            let tokens = TokenRepository::new(
                pool,
                chrono::Duration::seconds(config.base.token_expiry_seconds),
            );
            let removed = tokens.sweep_expired().await?;
            if cli.json {
                print_json(&serde_json::json!({ "removed": removed }))?;
            } else {
                println!("Removed {} expired token(s)", removed);
            }
        }
        Commands::Jobs { state, limit } => {
            let jobs = UploadJobRepository::new(pool).list(state, limit).await?;
            if cli.json {
                print_json(&jobs)?;
            } else {
                println!("{}", JOB_TABLE_HEADER);
                for job in &jobs {
                    println!("{}", job_row(job));
                }
            }
        }
        Commands::Job { id } => {
            let job = UploadJobRepository::new(pool)
                .get(id)
                .await?
                .with_context(|| format!("Job {} not found", id))?;
            print_json(&job)?;
        }
        Commands::Retry { id } => {
            let requeued = UploadJobRepository::new(pool).requeue_failed(id).await?;
            if !requeued {
                anyhow::bail!("Job {} is not in the error state", id);
            }
            if cli.json {
                print_json(&serde_json::json!({ "id": id, "state": JobState::Received }))?;
            } else {
                println!("Job {} queued for relay", id);
            }
        }
        Commands::Outbox => {
            let pending = NotificationRepository::new(pool).drain().await?;
            if cli.json {
                print_json(&pending)?;
            } else if pending.is_empty() {
                println!("Outbox is empty");
            } else {
                for n in &pending {
                    println!("{}", notification_row(n));
                }
            }
        }
    }

    Ok(())
}
