//! bridgenum CLI
//!
//! Drives the bridge number allocator against file-backed registries. Every
//! invocation is a fresh process start, so recovery runs first. Numbers that
//! were freed come back as reservations; numbers still in use stay active.
//!
//! # Examples
//!
//! ```bash
//! # Get (or create) the bridge number for an instance
//! bridgenum allocate 6ba7b810-9dad-11d1-80b4-00c04fd430c8
//!
//! # Release it; the number stays reserved for this instance
//! bridgenum free 6ba7b810-9dad-11d1-80b4-00c04fd430c8
//!
//! # Show all assignments
//! bridgenum --config /etc/bridgenum.toml list
//! ```

use bridgenum::registry::{FileNetworkStatus, FileNumberRegistry};
use bridgenum::{AssignmentState, BridgeNumAllocator, Settings};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

/// Sticky bridge number allocation
#[derive(Parser, Debug)]
#[command(name = "bridgenum")]
#[command(version = bridgenum::VERSION)]
#[command(about = "Allocate stable bridge numbers for application instances", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML)
    #[arg(long, global = true, env = "BRIDGENUM_CONFIG")]
    config: Option<PathBuf>,

    /// Log directory path
    #[arg(long, global = true, default_value = "logs", env = "BRIDGENUM_LOG_DIR")]
    log_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get or create the bridge number for an instance
    Allocate {
        /// Instance UUID
        uuid: Uuid,
    },

    /// Release the bridge number of an instance
    Free {
        /// Instance UUID
        uuid: Uuid,
    },

    /// List all assignments
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration
    Config,

    /// Show version
    Version,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(&cli)?;

    let settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Allocate { uuid } => {
            let mut allocator = open_allocator(&settings)?;
            let number = allocator.allocate(uuid)?;
            println!("{}", number);
            Ok(())
        }
        Commands::Free { uuid } => {
            let mut allocator = open_allocator(&settings)?;
            allocator.free(uuid)?;
            println!("✅ Bridge number for {} released", uuid);
            Ok(())
        }
        Commands::List { json } => list_command(&settings, json),
        Commands::Config => {
            print!("{}", settings.to_toml()?);
            Ok(())
        }
        Commands::Version => {
            println!("bridgenum {}", bridgenum::VERSION);
            Ok(())
        }
    }
}

/// Setup logging with rolling files and console output
fn setup_logging(cli: &Cli) -> anyhow::Result<()> {
    std::fs::create_dir_all(&cli.log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &cli.log_dir, "bridgenum.log");

    let log_level = cli
        .log_level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::WARN);

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(!cli.no_color),
        )
        .with(fmt::layer().with_writer(file_appender).with_ansi(false))
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .init();

    Ok(())
}

/// Open the registries and resume allocator state from them
fn open_allocator(settings: &Settings) -> anyhow::Result<BridgeNumAllocator<FileNumberRegistry>> {
    let registry = FileNumberRegistry::open(&settings.registry.number_registry)?;
    let status = FileNetworkStatus::new(&settings.registry.network_status);

    let (allocator, report) =
        BridgeNumAllocator::resume(settings.allocator.clone(), registry, &status)?;
    info!(
        recovered = report.recovered(),
        resumed = report.resumed,
        skipped = report.skipped(),
        "Allocator ready"
    );

    Ok(allocator)
}

fn list_command(settings: &Settings, json: bool) -> anyhow::Result<()> {
    let allocator = open_allocator(settings)?;

    if json {
        let entries: Vec<_> = allocator
            .assignments()
            .map(|(uuid, assignment)| serde_json::json!({ "uuid": uuid, "assignment": assignment }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    let stats = allocator.stats();
    println!(
        "Bridge numbers: {} active, {} reserved, {} free of {}",
        stats.active, stats.reserved, stats.free, stats.capacity
    );
    println!("───────────────────────────────────────────────────");
    for (uuid, assignment) in allocator.assignments() {
        let state = match assignment.state {
            AssignmentState::Active => "active",
            AssignmentState::Reserved => "reserved",
        };
        println!("  {:>3}  {}  {}", assignment.number, uuid, state);
    }

    Ok(())
}
