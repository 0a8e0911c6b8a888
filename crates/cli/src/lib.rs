pub mod commands;

use std::process::ExitCode;

use assetflow_core::config::{AppConfig, LoadOptions, LogFormat};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "assetflow",
    about = "Assetflow operator CLI",
    long_about = "Operate the asset request store: migrations, demo data, config inspection, and request lifecycle actions.",
    after_help = "Examples:\n  assetflow doctor --json\n  assetflow requests list --status pending\n  assetflow requests fulfill <id> --item 0=2"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo request dataset into the configured collection")]
    Seed,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Validate config, store connectivity, and schema readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Query and act on asset requests")]
    Requests {
        #[arg(long, env = "ASSETFLOW_ACTOR", default_value = "cli", help = "Actor recorded in audit events")]
        actor: String,
        #[command(subcommand)]
        command: commands::requests::RequestCommand,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => commands::config::run(),
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Requests { actor, command } => commands::requests::run(&actor, command),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Logs go to stderr so stdout stays a single machine-readable document. `RUST_LOG`
/// wins over the configured level.
fn init_logging() {
    let (level, format) = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => (config.logging.level, config.logging.format),
        Err(_) => ("warn".to_string(), LogFormat::Compact),
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    let _ = match format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
