//! Campaign status command.

use console::style;

use crate::models::Job;
use crate::orchestrator::OverallStatus;

use super::super::helpers::AppContext;

/// Status by job id or campaign id; job ids win when both match.
pub async fn cmd_status(ctx: &AppContext, id: &str) -> anyhow::Result<()> {
    if let Some(job) = ctx.orchestrator.get_job(id).await {
        println!("{}", serde_json::to_string_pretty(&job)?);
        return Ok(());
    }

    let campaign_id = id;
    let campaign = ctx.orchestrator.get_jobs_for_campaign(campaign_id).await;

    if campaign.jobs.is_empty() {
        println!("No job or campaign found for '{campaign_id}'");
        return Ok(());
    }

    let badge = match campaign.overall_status {
        OverallStatus::Completed => style("completed").green(),
        OverallStatus::Failed => style("failed").red(),
        OverallStatus::Partial => style("partial").yellow(),
        OverallStatus::Running => style("running").cyan(),
        OverallStatus::Pending => style("pending").dim(),
    };
    println!("Campaign {campaign_id}: {badge}");
    println!(
        "  {} pending, {} running, {} completed, {} failed",
        campaign.summary.pending,
        campaign.summary.running,
        campaign.summary.completed,
        campaign.summary.failed
    );
    println!();

    for job in &campaign.jobs {
        print_job_line(job);
    }

    Ok(())
}

fn print_job_line(job: &Job) {
    let mut scope = String::new();
    if let Some(ref category) = job.metadata.category {
        scope.push_str(category);
    }
    if let Some(ref subcategory) = job.metadata.subcategory {
        scope.push('/');
        scope.push_str(subcategory);
    }
    if scope.is_empty() {
        scope.push('-');
    }

    let mut line = format!(
        "  {}  {:<9}  {:<12}  {}",
        &job.id[..8],
        job.status.as_str(),
        format!("{:?}", job.job_type).to_lowercase(),
        scope
    );
    if let Some(ref error) = job.error {
        line.push_str(&format!("  ({error})"));
    }
    println!("{line}");
}
