//! Scrape command.

use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::models::{Job, JobStatus, ScrapeRequest};

use super::super::helpers::AppContext;

pub async fn cmd_scrape(
    ctx: &AppContext,
    campaign_id: &str,
    category: Option<String>,
    subcategory: Option<String>,
    max_clicks: Option<u32>,
    fresh: bool,
    watch: bool,
) -> anyhow::Result<()> {
    let request = ScrapeRequest::new(campaign_id, category, subcategory, max_clicks)?;

    if !fresh {
        if let Some(result) = ctx.orchestrator.cached_result(&request).await {
            println!(
                "{} Cached result for {}",
                style("✓").green(),
                request.cache_key()
            );
            println!("{}", serde_json::to_string_pretty(&result)?);
            return Ok(());
        }
    }

    let job = ctx.orchestrator.submit_scrape(&request).await;
    println!(
        "{} Job {} ({:?}) submitted for {}",
        style("✓").green(),
        job.id,
        job.job_type,
        request.cache_key()
    );

    if !watch {
        println!("  Track it with: promo status {campaign_id}");
        return Ok(());
    }

    let finished = watch_job(ctx, &job.id).await?;
    match finished.status {
        JobStatus::Completed => {
            println!("{} Job {} completed", style("✓").green(), finished.id);
            if let Some(result) = finished.result {
                println!("{}", serde_json::to_string_pretty(&result)?);
            }
            Ok(())
        }
        JobStatus::Failed => {
            let reason = finished.error.unwrap_or_else(|| "unknown".into());
            println!("{} Job {} failed: {}", style("✗").red(), finished.id, reason);
            std::process::exit(1);
        }
        // Terminal statuses only; the watch loop never returns otherwise.
        _ => unreachable!("watch loop returned a non-terminal job"),
    }
}

/// Poll the job until it settles, showing progress on a spinner.
async fn watch_job(ctx: &AppContext, job_id: &str) -> anyhow::Result<Job> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {wide_msg}")
            .unwrap(),
    );
    pb.enable_steady_tick(Duration::from_millis(120));

    loop {
        let Some(job) = ctx.orchestrator.get_job(job_id).await else {
            pb.finish_and_clear();
            anyhow::bail!("job {job_id} disappeared from the scheduler");
        };

        if job.status.is_terminal() {
            pb.finish_and_clear();
            return Ok(job);
        }

        let mut msg = format!("{} [{}]", job.id, job.status.as_str());
        if let Some(ref progress) = job.progress {
            msg.push_str(&format!(" {} items", progress.items));
            if !progress.message.is_empty() {
                msg.push_str(&format!(" ({})", progress.message));
            }
        }
        pb.set_message(msg);

        tokio::time::sleep(Duration::from_secs(2)).await;
    }
}
