use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docfix::{
    ChangeLog, ChangeLogRunner, FixConfig, FixError, JsonFileStore, MalformedRecordPolicy,
    RunMode, ShippedChangeLog,
};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "docfix")]
#[command(about = "Apply recorded one-shot data fixes to the declarations store")]
struct Cli {
    /// Store file (overrides DOCFIX_STORE_PATH)
    #[arg(long, global = true)]
    store: Option<PathBuf>,
    /// Collection recording applied change sets (overrides DOCFIX_CHANGELOG_COLLECTION)
    #[arg(long, global = true)]
    changelog_collection: Option<String>,
    /// skip | abort (overrides DOCFIX_ON_MALFORMED)
    #[arg(long, global = true, value_parser = parse_policy)]
    on_malformed: Option<MalformedRecordPolicy>,
    /// declarations | legacy (overrides DOCFIX_CHANGELOG)
    #[arg(long, global = true, value_parser = parse_changelog)]
    changelog: Option<ShippedChangeLog>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply every pending change set
    Run {
        /// Select and plan, but write nothing
        #[arg(long)]
        dry_run: bool,
    },
    /// List change sets and when they were applied
    Status,
}

fn parse_policy(raw: &str) -> std::result::Result<MalformedRecordPolicy, FixError> {
    raw.parse()
}

fn parse_changelog(raw: &str) -> std::result::Result<ShippedChangeLog, FixError> {
    raw.parse()
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = FixConfig::from_env().context("failed to load docfix configuration")?;
    if let Some(store) = cli.store {
        config = config.store_path(store);
    }
    if let Some(collection) = cli.changelog_collection.as_deref() {
        config = config.changelog_collection(collection);
    }
    if let Some(policy) = cli.on_malformed {
        config = config.on_malformed(policy);
    }
    if let Some(changelog) = cli.changelog {
        config = config.changelog(changelog);
    }
    if let Command::Run { dry_run } = cli.command {
        config = config.dry_run(dry_run);
    }
    config.validate().context("invalid docfix configuration")?;

    let store = JsonFileStore::open(&config.store_path)
        .await
        .with_context(|| format!("failed to open store '{}'", config.store_path.display()))?;
    let changelog = config.changelog.build(config.on_malformed)?;
    tracing::debug!(changelog = %config.changelog, changesets = changelog.len(), "loaded change log");

    let outcome = match cli.command {
        Command::Run { .. } => run(&store, &changelog, &config).await,
        Command::Status => status(&store, &changelog, &config).await,
    };

    store.close().await;
    outcome
}

async fn run(store: &JsonFileStore, changelog: &ChangeLog, config: &FixConfig) -> Result<()> {
    let runner = ChangeLogRunner::with_collection(store, &config.changelog_collection)?;
    let summary = runner
        .run(changelog, config.mode)
        .await
        .context("change log run stopped")?;

    let verb = match summary.mode {
        RunMode::Apply => "Applied",
        RunMode::DryRun => "Planned",
    };
    for applied in &summary.applied {
        println!(
            "{} {:03} '{}': selected={} matched={} modified={} warnings={}",
            verb,
            applied.order,
            applied.id,
            applied.outcome.selected,
            applied.outcome.matched,
            applied.outcome.modified,
            applied.outcome.warnings
        );
    }
    println!(
        "{} change set(s) run, {} already applied",
        summary.applied.len(),
        summary.already_applied
    );
    Ok(())
}

async fn status(store: &JsonFileStore, changelog: &ChangeLog, config: &FixConfig) -> Result<()> {
    let runner = ChangeLogRunner::with_collection(store, &config.changelog_collection)?;
    for entry in runner.status(changelog).await? {
        let state = match entry.applied_at {
            Some(at) => format!("applied {}", at.to_rfc3339()),
            None => "pending".to_string(),
        };
        println!("{:03} [{}] {} ({})", entry.order, state, entry.id, entry.author);
        println!("      {}", entry.description);
    }
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("docfix=info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
