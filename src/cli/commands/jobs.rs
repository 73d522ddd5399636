//! Job queue inspection and maintenance commands.

use console::style;

use crate::models::JobStatus;

use super::super::helpers::AppContext;

pub async fn cmd_jobs_list(ctx: &AppContext, status: Option<JobStatus>) -> anyhow::Result<()> {
    let jobs = ctx.scheduler.list_by_status(status).await;

    if jobs.is_empty() {
        println!("No matching jobs");
        return Ok(());
    }

    println!(
        "{:<38} {:<9} {:<12} {:<20} CREATED",
        "ID", "STATUS", "TYPE", "CAMPAIGN"
    );
    for job in jobs {
        println!(
            "{:<38} {:<9} {:<12} {:<20} {}",
            job.id,
            job.status.as_str(),
            format!("{:?}", job.job_type).to_lowercase(),
            job.metadata.campaign_id,
            job.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }

    Ok(())
}

pub async fn cmd_jobs_stats(ctx: &AppContext) -> anyhow::Result<()> {
    let stats = ctx.scheduler.stats().await;
    println!("Jobs: {} total", stats.total);
    println!("  pending:   {}", stats.pending);
    println!("  running:   {}", stats.running);
    println!("  completed: {}", stats.completed);
    println!("  failed:    {}", stats.failed);
    Ok(())
}

pub async fn cmd_jobs_cancel(ctx: &AppContext, job_id: &str) -> anyhow::Result<()> {
    if ctx.scheduler.cancel(job_id).await {
        println!("{} Cancelled job {}", style("✓").green(), job_id);
    } else {
        println!(
            "{} Job {} not found or already terminal",
            style("!").yellow(),
            job_id
        );
    }
    Ok(())
}

pub async fn cmd_jobs_purge(ctx: &AppContext, older_than_minutes: i64) -> anyhow::Result<()> {
    let removed = ctx
        .scheduler
        .purge_completed_older_than(older_than_minutes)
        .await;
    println!(
        "{} Purged {} terminal jobs older than {} minutes",
        style("✓").green(),
        removed,
        older_than_minutes
    );
    Ok(())
}
