//! NovaForge CLI - dispatch content requests, serve workers, inspect jobs

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{dispatch, job, poll, serve};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "novaforge")]
#[command(about = "AI content pipeline orchestrator", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file to use instead of the global and project config layers
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a content request
    Dispatch {
        /// Caller API key
        #[arg(long)]
        api_key: String,

        /// Natural-language prompt
        #[arg(long, short)]
        prompt: String,

        /// Reference image passed to the classifier
        #[arg(long)]
        image_url: Option<String>,
    },

    /// Claim the next queued job, as a worker would
    Poll,

    /// Job inspection and worker reports
    #[command(subcommand)]
    Job(job::JobCommands),

    /// Run the HTTP interface
    Serve {
        /// Address to bind (defaults to [server].bind)
        #[arg(long)]
        bind: Option<String>,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Dispatch {
            api_key,
            prompt,
            image_url,
        } => dispatch::run(
            config,
            dispatch::DispatchArgs {
                api_key,
                prompt,
                image_url,
            },
        ),
        Commands::Poll => poll::run(config),
        Commands::Job(cmd) => job::run(config, cmd),
        Commands::Serve { bind } => serve::run(config, bind),
    }
}
