//! SiteBuild CLI
//!
//! The `sitebuild` command records content changes in the build ledger and
//! notifies static-site build services about them.
//!
//! Every invocation is one unit of work: queued notifications are flushed
//! once, after the command ran, and collected messages are printed last.
//!
//! ## Commands
//!
//! - `track`: Record a changed entity for a destination
//! - `latest`: Show a destination's latest build id
//! - `diff`: List entities changed between two builds
//! - `trigger-latest`: Rebuild a destination unless it is already current
//! - `status`: Compare a destination's published build with the ledger

use anyhow::{bail, Context, Result};
use build_ledger::BuildId;
use clap::{Parser, Subcommand};
use sitebuild_core::{BuildServices, Message, ServerRegistry, SiteBuildConfig, UnitOfWork};
use std::path::{Path, PathBuf};
use tracing::{info, Instrument, Level};

#[derive(Parser)]
#[command(name = "sitebuild")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Build ledger and notification dispatcher for static sites", long_about = None)]
struct Cli {
    /// Configuration file (default: $SITEBUILD_CONFIG or ./sitebuild.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a changed entity and notify the destination at exit
    Track {
        destination: String,
        entity_type: String,
        entity_id: String,

        /// Record the change without notifying the destination
        #[arg(long)]
        no_notify: bool,
    },

    /// Print the latest build id of a destination (-1 when none)
    Latest { destination: String },

    /// List entities changed after build FROM up to and including build TO
    Diff {
        destination: String,
        #[arg(allow_negative_numbers = true)]
        from: i64,
        to: i64,
    },

    /// List ids of one entity type changed between two builds
    Changes {
        destination: String,
        entity_type: String,

        /// Last build already processed (default: full history)
        #[arg(long, allow_negative_numbers = true)]
        since: Option<i64>,

        /// Build to stop at (default: the latest)
        #[arg(long)]
        until: Option<i64>,
    },

    /// Queue a build notification with an explicit build id
    Trigger { destination: String, build_id: i64 },

    /// Notify a destination with its latest build unless it is already current
    TriggerLatest {
        /// Destination (default: first destination with notifications enabled)
        destination: Option<String>,
    },

    /// Show whether a destination publishes its latest build
    Status { destination: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    sitebuild_core::telemetry::init_tracing(cli.json, level);

    let services = load_services(cli.config.as_deref()).await?;
    run(&services, cli.command).await
}

async fn load_services(config: Option<&Path>) -> Result<BuildServices> {
    let config = SiteBuildConfig::discover(config).context("Failed to load configuration")?;
    BuildServices::from_config(&config)
        .await
        .context("Failed to connect to the build ledger")
}

/// Run one command as one unit of work.
///
/// The unit is finished even when the command fails, so notifications
/// queued before the failure still go out.
async fn run(services: &BuildServices, command: Commands) -> Result<()> {
    let work = services.begin();
    let outcome = dispatch(&work, command)
        .instrument(work.span().clone())
        .await;

    let report = work.finish().await;
    print_messages(&report.messages);

    outcome?;
    if report.has_errors() {
        bail!("Finished with errors");
    }
    Ok(())
}

async fn dispatch(work: &UnitOfWork, command: Commands) -> Result<()> {
    match command {
        Commands::Track {
            destination,
            entity_type,
            entity_id,
            no_notify,
        } => cmd_track(work, &destination, &entity_type, &entity_id, !no_notify).await,
        Commands::Latest { destination } => cmd_latest(work, &destination).await,
        Commands::Diff {
            destination,
            from,
            to,
        } => cmd_diff(work, &destination, BuildId(from), BuildId(to)).await,
        Commands::Changes {
            destination,
            entity_type,
            since,
            until,
        } => {
            cmd_changes(
                work,
                &destination,
                &entity_type,
                since.map(BuildId),
                until.map(BuildId),
            )
            .await
        }
        Commands::Trigger {
            destination,
            build_id,
        } => cmd_trigger(work, &destination, BuildId(build_id)),
        Commands::TriggerLatest { destination } => {
            cmd_trigger_latest(work, destination.as_deref()).await
        }
        Commands::Status { destination } => cmd_status(work, &destination).await,
    }
}

fn print_messages(messages: &[Message]) {
    for message in messages {
        if message.is_error() {
            eprintln!("error: {}", message);
        } else {
            println!("{}", message);
        }
    }
}

fn ensure_destination(work: &UnitOfWork, destination: &str) -> Result<()> {
    if !work.notifier().registry().contains(destination) {
        bail!("No server found with id {}.", destination);
    }
    Ok(())
}

/// Record a change
async fn cmd_track(
    work: &UnitOfWork,
    destination: &str,
    entity_type: &str,
    entity_id: &str,
    notify: bool,
) -> Result<()> {
    let build_id = work
        .tracker()
        .track(destination, entity_type, entity_id, notify)
        .await
        .with_context(|| format!("Failed to track {} {}", entity_type, entity_id))?;

    println!("{}", build_id);
    Ok(())
}

/// Show the latest build id
async fn cmd_latest(work: &UnitOfWork, destination: &str) -> Result<()> {
    let latest = work.tracker().latest_build(destination).await?;
    println!("{}", latest);
    Ok(())
}

/// List changed entities
async fn cmd_diff(work: &UnitOfWork, destination: &str, from: BuildId, to: BuildId) -> Result<()> {
    let changes = work.tracker().diff(from, to, destination).await?;

    if changes.is_empty() {
        info!(%from, %to, destination, "no incremental history for this range, resync everything");
        return Ok(());
    }

    for change in changes {
        println!("{} {}", change.entity_type, change.entity_id);
    }
    Ok(())
}

/// List changed ids of one entity type
async fn cmd_changes(
    work: &UnitOfWork,
    destination: &str,
    entity_type: &str,
    since: Option<BuildId>,
    until: Option<BuildId>,
) -> Result<()> {
    let until = match until {
        Some(until) => until,
        None => work.tracker().latest_build(destination).await?,
    };
    let since = since.unwrap_or(BuildId::NONE);

    let ids = work
        .tracker()
        .changes_for_type(Some(since), Some(until), destination, entity_type)
        .await?;
    for id in ids {
        println!("{}", id);
    }
    Ok(())
}

/// Queue a notification for an explicit build
fn cmd_trigger(work: &UnitOfWork, destination: &str, build_id: BuildId) -> Result<()> {
    ensure_destination(work, destination)?;
    work.notifier().trigger(destination, build_id);
    println!("Queued build {} for server {}.", build_id, destination);
    Ok(())
}

/// Rebuild unless current. The outcome is reported through the messages.
async fn cmd_trigger_latest(work: &UnitOfWork, destination: Option<&str>) -> Result<()> {
    let reconciler = work.reconciler();
    match destination {
        Some(destination) => {
            reconciler
                .trigger_latest_build(work.tracker(), destination)
                .await?
        }
        None => reconciler.trigger_default_latest_build(work.tracker()).await?,
    };
    Ok(())
}

/// Compare published and latest build
async fn cmd_status(work: &UnitOfWork, destination: &str) -> Result<()> {
    ensure_destination(work, destination)?;

    let latest = work.tracker().latest_build(destination).await?;
    if work
        .reconciler()
        .is_destination_current(latest, destination)
        .await
    {
        println!("{}: up to date at build {}", destination, latest);
    } else {
        println!("{}: outdated, latest build is {}", destination, latest);
    }
    Ok(())
}
