//! pawmedia: probe media locators, pick a source tier, resolve sequences.

use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

mod commands;
mod output;

#[derive(Parser)]
#[command(
    name = "pawmedia",
    about = "pawmedia: media tier selection and substitution for PawMatch",
    version,
    after_help = "Run 'pawmedia <command> --help' for details on each command."
)]
struct Cli {
    /// Path to a TOML config file (default: $PAWMEDIA_CONFIG, ./pawmedia.toml, ~/.pawmedia/config.toml)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Never touch the network: remote locators count as unavailable and
    /// remote catalog tiers are skipped
    #[arg(long, global = true)]
    offline: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe locators once and report which load
    Probe {
        /// Locators to probe (URLs, asset:// paths or paths under the asset root)
        #[arg(required = true)]
        locators: Vec<String>,
    },
    /// Run tier selection and report every tier examined
    Select,
    /// Resolve a sequence, printing each update as slots settle
    Resolve {
        /// Primary locators, comma separated (default: select a tier)
        #[arg(long, value_delimiter = ',')]
        primary: Vec<String>,
        /// Backup locators, comma separated (default: configured backups)
        #[arg(long, value_delimiter = ',')]
        pool: Vec<String>,
        /// Print only the final sequence
        #[arg(long)]
        final_only: bool,
    },
    /// Print the effective configuration
    Config,
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish)
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    if cli.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    let mode = output::OutputMode::from_flag(cli.json);
    let config = cli.config.as_deref();
    let offline = cli.offline;
    if offline {
        tracing::info!("offline mode: remote locators are unavailable");
    }

    let result = match cli.command {
        Commands::Probe { locators } => commands::probe::run(config, offline, &locators, mode).await,
        Commands::Select => commands::select::run(config, offline, mode).await,
        Commands::Resolve {
            primary,
            pool,
            final_only,
        } => commands::resolve::run(config, offline, primary, pool, final_only, mode).await,
        Commands::Config => commands::show_config(config, mode),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "pawmedia", &mut std::io::stdout());
            Ok(())
        }
    };

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        match mode {
            output::OutputMode::Json => output::print_json(&serde_json::json!({
                "error": true,
                "message": format!("{e:#}"),
            })),
            output::OutputMode::Text => eprintln!("  Error: {e:#}"),
        }
        std::process::exit(1);
    }

    result
}
