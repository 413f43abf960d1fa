use std::path::Path;

use colored::*;
use reach_rules::{AudienceEstimate, RuleGroup, SchemaViolations, Translation};
use serde::Serialize;

use crate::client::{CliError, CreatedCampaign, DashboardStats, StatusCount};

pub fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_translation(translation: &Translation) -> Result<(), CliError> {
    print_json(&translation.query)?;
    if translation.lossy {
        eprintln!(
            "{} OR branches and nesting were flattened into one AND group; \
             use --mode preserve_groups for an exact query",
            "warning:".yellow().bold()
        );
    }
    eprintln!("  conditions: {}", translation.condition_count);
    Ok(())
}

pub fn print_valid(path: &Path, detail: &str) {
    println!("{} {} ({detail})", "✔".green().bold(), path.display());
}

pub fn print_invalid(path: &Path, violations: &SchemaViolations) {
    println!("{} {}", "✘".red().bold(), path.display());
    for violation in violations.iter() {
        println!("  {violation}");
    }
}

pub fn print_unreadable(path: &Path, error: &CliError) {
    println!("{} {}: {error}", "✘".red().bold(), path.display());
}

pub fn print_estimate(estimate: &AudienceEstimate) {
    println!(
        "{} {}",
        "Audience size:".green().bold(),
        estimate.audience_size.to_string().bold()
    );
    if !estimate.sample_user_ids.is_empty() {
        println!("  Sample: {}", estimate.sample_user_ids.join(", "));
    }
}

pub fn print_synthesized(tree: &RuleGroup) -> Result<(), CliError> {
    eprintln!(
        "{} {} condition(s), root combinator {}",
        "✔ Rules generated:".green().bold(),
        tree.condition_count(),
        tree.combinator
    );
    print_json(tree)
}

pub fn print_campaign_created(created: &CreatedCampaign) {
    println!(
        "{} {} (id: {})",
        "✔ Campaign created:".green().bold(),
        created.campaign.name.bold(),
        created.campaign.id
    );
    println!("  Status: {}", created.campaign.status);
    println!("  Audience size: {}", created.campaign.audience_size);
    println!("  Segment: {} ({})", created.segment.name, created.segment.id);
    println!("  Created at: {}", created.campaign.created_at);
}

pub fn print_stats(stats: &DashboardStats, statuses: &[StatusCount]) {
    println!("{}", "Reach dashboard".bold());
    println!("  Customers: {}", stats.total_customers);
    println!("  Segments:  {}", stats.total_segments);
    println!("  Campaigns: {}", stats.total_campaigns);
    println!("  Orders:    {}", stats.total_sales);
    if !statuses.is_empty() {
        println!("{}", "Campaigns by status".bold());
        for status in statuses {
            println!("  {:<11} {}", status.name, status.value);
        }
    }
}
