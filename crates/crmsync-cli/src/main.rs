mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{b2c::B2cSubcommand, sf::SfSubcommand};
use output::OperationMode;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "crm-sync",
    about = "Deploy crm-sync to a B2C Commerce instance and connect it to a Salesforce org",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from crmsync.yaml or .git/)
    #[arg(long, global = true, env = "CRM_SYNC_ROOT")]
    root: Option<PathBuf>,

    /// How results are printed
    #[arg(
        long,
        global = true,
        value_enum,
        env = "CRM_SYNC_OPERATION_MODE",
        default_value = "console"
    )]
    operation_mode: OperationMode,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Commerce instance: auth, sites, cartridges, code and data deployment
    B2c {
        #[command(subcommand)]
        subcommand: B2cSubcommand,
    },

    /// Salesforce org: auth, metadata build and deploy, instance records
    Sf {
        #[command(subcommand)]
        subcommand: SfSubcommand,
    },
}

/// `RUST_LOG` when it is set and parses, otherwise `default_level` for everything.
fn log_filter(rust_log: Option<&str>, default_level: Level) -> EnvFilter {
    rust_log
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::default().add_directive(default_level.into()))
}

fn main() {
    let cli = Cli::parse();

    let long_running = match &cli.command {
        Commands::B2c { subcommand } => cmd::b2c::is_long_running(subcommand),
        Commands::Sf { subcommand } => cmd::sf::is_long_running(subcommand),
    };
    let default_level = if long_running {
        Level::INFO
    } else {
        Level::WARN
    };

    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(rust_log.as_deref(), default_level))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());
    let mode = cli.operation_mode;

    let result = match cli.command {
        Commands::B2c { subcommand } => cmd::b2c::run(&root, subcommand, mode),
        Commands::Sf { subcommand } => cmd::sf::run(&root, subcommand, mode),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
