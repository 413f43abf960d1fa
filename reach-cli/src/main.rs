use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use reach_rules::{
    load_document, load_documents, translate, translate_with_report, BackendQuery, ModelSchema,
    RuleDocument, TranslationMode,
};

mod client;
mod output;

use client::{CliError, CreateCampaignRequest, GatewayClient, DEFAULT_GATEWAY_URL};

#[derive(Parser)]
#[command(name = "reach")]
#[command(about = "Reach - audience rules and campaigns from the command line", long_about = None)]
struct Cli {
    #[arg(long, global = true, env = "REACH_GATEWAY_URL", default_value = DEFAULT_GATEWAY_URL)]
    gateway: String,
    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Translate a rule tree file into the backend query shape
    Translate(TranslateArgs),
    /// Check rule files (JSON or YAML) against the rule model
    Validate(ValidateArgs),
    /// Estimate the audience of a rule file through the gateway
    Preview(RulesArgs),
    /// Turn a plain-language description into rules through the gateway
    Synthesize(SynthesizeArgs),
    /// Manage campaigns
    #[command(subcommand)]
    Campaign(CampaignCommands),
    /// Show dashboard totals and campaigns per status
    Stats,
    /// Show version information
    Version,
}

#[derive(Args)]
struct TranslateArgs {
    /// Rule tree file
    path: PathBuf,
    #[arg(long, default_value = "flatten")]
    mode: TranslationMode,
}

#[derive(Args)]
struct ValidateArgs {
    /// Files or directories to check
    #[arg(required = true)]
    paths: Vec<PathBuf>,
}

#[derive(Args)]
struct RulesArgs {
    /// Rule tree or backend query file
    path: PathBuf,
    /// Applied when the file holds a rule tree
    #[arg(long, default_value = "flatten")]
    mode: TranslationMode,
}

#[derive(Args)]
struct SynthesizeArgs {
    description: String,
    /// Requests sharing a session and description are answered once
    #[arg(long, env = "REACH_SESSION_ID")]
    session: Option<String>,
}

#[derive(Subcommand)]
enum CampaignCommands {
    /// Create a segment from a rule file and a campaign targeting it
    Create(CreateCampaignArgs),
}

#[derive(Args)]
struct CreateCampaignArgs {
    #[arg(long)]
    name: String,
    /// Message template; `{name}` is replaced per customer
    #[arg(long)]
    message: String,
    #[arg(long)]
    segment_name: Option<String>,
    #[command(flatten)]
    rules: RulesArgs,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();

    if let Err(err) = reach_core::logging::init_tracing(Some(&cli.log_level)) {
        eprintln!("failed to initialise tracing: {err}");
    }

    match cli.command {
        Commands::Translate(args) => {
            let tree = reach_rules::load_tree(&args.path)?;
            ModelSchema.validate(&tree).map_err(|violations| {
                output::print_invalid(&args.path, &violations);
                CliError::Validation(format!("{} is not a valid rule tree", args.path.display()))
            })?;
            let translation = translate_with_report(&tree, args.mode)?;
            output::print_translation(&translation)
        }
        Commands::Validate(args) => validate(&args.paths),
        Commands::Version => {
            println!("Reach CLI v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        command => {
            let client = GatewayClient::new(&cli.gateway)?;
            match command {
                Commands::Preview(args) => {
                    let query = load_query(&args.path, args.mode)?;
                    let estimate = client.preview(&query).await?;
                    output::print_estimate(&estimate);
                }
                Commands::Synthesize(args) => {
                    let tree = client
                        .with_session(args.session)
                        .synthesize(&args.description)
                        .await?;
                    output::print_synthesized(&tree)?;
                }
                Commands::Campaign(CampaignCommands::Create(args)) => {
                    let request = CreateCampaignRequest {
                        campaign_name: args.name,
                        message: args.message,
                        segment_name: args.segment_name,
                        segment_rules: load_query(&args.rules.path, args.rules.mode)?,
                    };
                    let created = client.create_campaign(&request).await?;
                    output::print_campaign_created(&created);
                }
                Commands::Stats => {
                    let stats = client.dashboard_stats().await?;
                    let statuses = client.campaign_status().await?;
                    output::print_stats(&stats, &statuses);
                }
                Commands::Translate(_) | Commands::Validate(_) | Commands::Version => {}
            }
            Ok(())
        }
    }
}

/// Reads a rule file as a backend query, translating trees with `mode`.
fn load_query(path: &Path, mode: TranslationMode) -> Result<BackendQuery, CliError> {
    match load_document(path)? {
        RuleDocument::Query(query) => Ok(query),
        RuleDocument::Tree(tree) => {
            ModelSchema.validate(&tree).map_err(|violations| {
                output::print_invalid(path, &violations);
                CliError::Validation(format!("{} is not a valid rule tree", path.display()))
            })?;
            Ok(translate(&tree, mode)?)
        }
    }
}

fn validate(paths: &[PathBuf]) -> Result<(), CliError> {
    let mut failures = 0usize;
    for path in paths {
        let documents = match load_documents(path) {
            Ok(documents) => documents,
            Err(err) => {
                output::print_unreadable(path, &CliError::from(err));
                failures += 1;
                continue;
            }
        };

        for (file, document) in documents {
            match document {
                RuleDocument::Query(query) => output::print_valid(
                    &file,
                    &format!("backend query, {} condition(s)", query.condition_count()),
                ),
                RuleDocument::Tree(tree) => match ModelSchema.validate(&tree) {
                    Ok(()) => output::print_valid(
                        &file,
                        &format!("rule tree, {} condition(s)", tree.condition_count()),
                    ),
                    Err(violations) => {
                        output::print_invalid(&file, &violations);
                        failures += 1;
                    }
                },
            }
        }
    }

    if failures > 0 {
        return Err(CliError::Validation(format!(
            "{failures} rule file(s) failed validation"
        )));
    }
    Ok(())
}
