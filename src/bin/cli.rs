//! koushihime CLI
//!
//! Local execution entry point for the push pipeline.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use koushihime::{
    error::Result,
    models::Config,
    pipeline,
    services::{BanRuleEngine, WikiPageClient},
    storage::{JsonRuleStore, RuleStore},
};

/// koushihime - wiki update push pipeline
#[derive(Parser, Debug)]
#[command(
    name = "koushihime",
    version,
    about = "Filters wiki recent changes and caches images for push announcements"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process recent changes and emit accepted candidates
    Run {
        /// Window length in minutes, ending now (default: from config)
        #[arg(long)]
        window_minutes: Option<u32>,

        /// Write candidates as JSON to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Evaluate a single title without consuming quota
    Check {
        /// Page title
        title: String,
    },

    /// List ban rules with remaining quota
    Rules,

    /// Validate configuration
    Validate,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load_or_default(&cli.config);
    log::debug!("Loaded configuration from {}", cli.config.display());

    match cli.command {
        Command::Run {
            window_minutes,
            output,
        } => {
            config.validate()?;
            let window = window_minutes.unwrap_or(config.pipeline.window_minutes);
            let rules = JsonRuleStore::open(&config.rules.path).await?;

            let outcome = pipeline::run_push(Arc::new(config), &rules, window).await?;
            let json = serde_json::to_string_pretty(&outcome.candidates)?;

            match output {
                Some(path) => {
                    std::fs::write(&path, json)?;
                    log::info!(
                        "{} candidates written to {}",
                        outcome.candidates.len(),
                        path.display()
                    );
                }
                None => println!("{json}"),
            }
        }

        Command::Check { title } => {
            let rules = JsonRuleStore::open(&config.rules.path).await?;
            let client = WikiPageClient::new(&config)?;
            let engine = BanRuleEngine::from_config(&config.rules);

            let metadata = client.fetch_metadata(&title).await?;
            let evaluation = engine.evaluate(&metadata, &rules.list_rules().await?);

            log::info!(
                "'{}' namespace={:?} categories={}",
                metadata.title,
                metadata.namespace,
                metadata.categories.len()
            );
            println!("{}", serde_json::to_string_pretty(&evaluation)?);
        }

        Command::Rules => {
            let rules = JsonRuleStore::open(&config.rules.path).await?;
            for rule in rules.list_rules().await? {
                println!(
                    "{:>5}  {:<8}  quota={:<4}  {}",
                    rule.id,
                    format!("{:?}", rule.kind()),
                    rule.quota,
                    rule.pattern
                );
            }
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!("✓ Config OK");
        }
    }

    Ok(())
}
