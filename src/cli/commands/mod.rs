//! CLI parser and command dispatch.

mod cache_cmd;
mod jobs;
mod scrape;
mod status;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Settings;
use crate::models::JobStatus;

use super::helpers::build_context;

#[derive(Parser)]
#[command(name = "promo")]
#[command(about = "Promotional-campaign scraping and job orchestration")]
#[command(version)]
pub struct Cli {
    /// Data directory (overrides config file)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape a campaign (fans out over subcategories when only a category is given)
    Scrape {
        /// Campaign identifier
        campaign_id: String,
        /// Category to scrape within the campaign
        #[arg(short = 'C', long)]
        category: Option<String>,
        /// Subcategory filter (requires --category)
        #[arg(short, long)]
        subcategory: Option<String>,
        /// Maximum load-more clicks per page (1-50)
        #[arg(short = 'm', long)]
        max_clicks: Option<u32>,
        /// Skip the result cache and force a fresh scrape
        #[arg(short, long)]
        fresh: bool,
        /// Wait for the job to finish and print the result
        #[arg(short, long)]
        watch: bool,
    },

    /// Show one job, or all jobs and overall state for a campaign
    Status {
        /// Job id or campaign identifier
        id: String,
    },

    /// Inspect and manage the job queue
    Jobs {
        #[command(subcommand)]
        command: JobCommands,
    },

    /// Inspect and manage the result cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
}

#[derive(Subcommand)]
enum JobCommands {
    /// List jobs, optionally filtered by status
    List {
        /// Filter: pending, running, completed, failed
        #[arg(short, long, value_parser = parse_status)]
        status: Option<JobStatus>,
    },
    /// Show scheduler counters
    Stats,
    /// Cancel a pending or running job
    Cancel {
        /// Job id
        job_id: String,
    },
    /// Delete terminal jobs older than the given age
    Purge {
        /// Minimum age in minutes
        #[arg(short, long, default_value = "60")]
        older_than: i64,
    },
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Show hit/miss counters and entry count
    Stats,
    /// Drop all cached results (memory and durable mirror)
    Clear,
}

fn parse_status(s: &str) -> Result<JobStatus, String> {
    match s {
        "pending" => Ok(JobStatus::Pending),
        "running" => Ok(JobStatus::Running),
        "completed" => Ok(JobStatus::Completed),
        "failed" => Ok(JobStatus::Failed),
        other => Err(format!("unknown status '{other}'")),
    }
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref())?;
    if cli.data_dir.is_some() {
        settings.data_dir = cli.data_dir;
    }

    let ctx = build_context(settings).await?;

    match cli.command {
        Commands::Scrape {
            campaign_id,
            category,
            subcategory,
            max_clicks,
            fresh,
            watch,
        } => {
            scrape::cmd_scrape(
                &ctx,
                &campaign_id,
                category,
                subcategory,
                max_clicks,
                fresh,
                watch,
            )
            .await
        }
        Commands::Status { id } => status::cmd_status(&ctx, &id).await,
        Commands::Jobs { command } => match command {
            JobCommands::List { status } => jobs::cmd_jobs_list(&ctx, status).await,
            JobCommands::Stats => jobs::cmd_jobs_stats(&ctx).await,
            JobCommands::Cancel { job_id } => jobs::cmd_jobs_cancel(&ctx, &job_id).await,
            JobCommands::Purge { older_than } => jobs::cmd_jobs_purge(&ctx, older_than).await,
        },
        Commands::Cache { command } => match command {
            CacheCommands::Stats => cache_cmd::cmd_cache_stats(&ctx).await,
            CacheCommands::Clear => cache_cmd::cmd_cache_clear(&ctx).await,
        },
    }
}
