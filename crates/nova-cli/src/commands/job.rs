//! `novaforge job` subcommands

use super::{load_dispatcher, print_json};
use anyhow::{bail, Context, Result};
use clap::Subcommand;
use nova_core::JobId;
use nova_forge::{Job, WorkerReport};
use std::path::Path;

#[derive(Subcommand)]
pub enum JobCommands {
    /// List jobs, newest first
    List {
        /// Only jobs owned by this API key's account
        #[arg(long)]
        api_key: Option<String>,

        /// Output format (table or json)
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Show one job
    Status {
        /// Job ID
        id: String,
    },

    /// Report a worker outcome for a claimed job
    Report {
        /// Job ID
        id: String,

        /// Locator of the finished asset
        #[arg(long, conflicts_with = "failed")]
        complete: Option<String>,

        /// Failure message
        #[arg(long)]
        failed: Option<String>,
    },

    /// Publish the queue entry of a queued job again
    Requeue {
        /// Job ID
        id: String,
    },
}

pub fn run(config: Option<&Path>, cmd: JobCommands) -> Result<()> {
    let dispatcher = load_dispatcher(config)?;

    match cmd {
        JobCommands::List { api_key, format } => {
            let jobs = match api_key {
                Some(key) => dispatcher.history(&dispatcher.authenticate(&key)?)?,
                None => dispatcher.jobs()?,
            };
            if format == "json" {
                print_json(&jobs)
            } else {
                print_table(&jobs);
                Ok(())
            }
        }
        JobCommands::Status { id } => print_json(&dispatcher.job(&parse_id(&id)?)?),
        JobCommands::Report {
            id,
            complete,
            failed,
        } => {
            let report = match (complete, failed) {
                (Some(result_locator), None) => WorkerReport::Complete { result_locator },
                (None, Some(error)) => WorkerReport::Failed { error },
                _ => bail!("Pass exactly one of --complete or --failed"),
            };
            let job_id = parse_id(&id)?;
            let outcome = dispatcher.report(&job_id, &report)?;
            print_json(&serde_json::json!({ "job_id": job_id, "outcome": outcome }))
        }
        JobCommands::Requeue { id } => {
            let job_id = parse_id(&id)?;
            let key = dispatcher.requeue(&job_id)?;
            print_json(&serde_json::json!({ "job_id": job_id, "queue_key": key }))
        }
    }
}

fn parse_id(id: &str) -> Result<JobId> {
    id.parse()
        .with_context(|| format!("Invalid job id '{}'", id))
}

fn print_table(jobs: &[Job]) {
    if jobs.is_empty() {
        println!("No jobs.");
        return;
    }
    println!(
        "{:<36}  {:<11}  {:<11}  {:<20}  OUTPUT",
        "ID", "STATE", "BACKEND", "CREATED"
    );
    for job in jobs {
        println!(
            "{:<36}  {:<11}  {:<11}  {:<20}  {}",
            job.id,
            job.state.to_string(),
            job.backend.to_string(),
            job.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            job.output_name
        );
    }
}
