use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use vetter::config::VetterConfig;

mod cmd;

#[derive(Parser)]
#[command(name = "vetter")]
#[command(version, about = "Evidence-gated validation runs with human approval checkpoints")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Emit log lines as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Print command results as JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create .vetter/vetter.toml with default settings
    Init,
    /// Start a validation run
    Kickoff {
        #[arg(long)]
        project: String,

        #[arg(long)]
        user: String,

        /// Kickoff payload as JSON, or @path to read it from a file
        #[arg(long)]
        input: Option<String>,

        /// Only create the run; execute it later with `vetter execute`
        #[arg(long)]
        no_run: bool,
    },
    /// Execute a pending run or re-invoke an interrupted one
    Execute { run_id: String },
    /// Show one run, or list recent runs
    Status {
        run_id: Option<String>,

        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Decide a pending approval and continue the run
    Decide {
        run_id: String,
        checkpoint: String,
        decision: String,

        #[arg(long)]
        notes: Option<String>,

        #[arg(long = "by")]
        decided_by: Option<String>,
    },
    /// Fail a run by hand
    Fail {
        run_id: String,

        #[arg(long)]
        reason: String,
    },
    /// Expire approval requests older than the configured TTL
    Sweep,
    /// List checkpoints and their decision options
    Checkpoints,
    /// Serve the HTTP API
    Serve {
        #[arg(short, long)]
        port: Option<u16>,

        #[arg(long)]
        dev: bool,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    Show,
    Validate,
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    let mut config = VetterConfig::load(&project_dir)?;
    if cli.log_json {
        config.logging.json = true;
    }
    let _log_guard = vetter::logging::init(&config.logging, cli.verbose)?;

    match &cli.command {
        Commands::Init => cmd::cmd_init(&project_dir)?,
        Commands::Kickoff {
            project,
            user,
            input,
            no_run,
        } => {
            cmd::cmd_kickoff(
                &cli,
                &project_dir,
                config,
                project,
                user,
                input.as_deref(),
                *no_run,
            )
            .await?
        }
        Commands::Execute { run_id } => cmd::cmd_execute(&cli, &project_dir, config, run_id).await?,
        Commands::Status { run_id, limit } => {
            cmd::cmd_status(&cli, &project_dir, config, run_id.as_deref(), *limit).await?
        }
        Commands::Decide {
            run_id,
            checkpoint,
            decision,
            notes,
            decided_by,
        } => {
            cmd::cmd_decide(
                &cli,
                &project_dir,
                config,
                run_id,
                checkpoint,
                decision,
                notes.clone(),
                decided_by.clone(),
            )
            .await?
        }
        Commands::Fail { run_id, reason } => {
            cmd::cmd_fail(&cli, &project_dir, config, run_id, reason).await?
        }
        Commands::Sweep => cmd::cmd_sweep(&cli, &project_dir, config).await?,
        Commands::Checkpoints => cmd::cmd_checkpoints(&cli)?,
        Commands::Serve { port, dev } => cmd::cmd_serve(project_dir, config, *port, *dev).await?,
        Commands::Config { command } => cmd::cmd_config(&project_dir, &config, command.clone())?,
    }

    Ok(())
}
