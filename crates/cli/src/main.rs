// stlink - street-name linkage from the command line

mod doctor;
mod exit_codes;
mod link;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use streetlink_arbiter::ArbiterError;
use streetlink_linker::LinkError;

use exit_codes::{arbiter_exit_code, link_exit_code, EXIT_ERROR, EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "stlink")]
#[command(about = "Link community-map street segments to an official street registry")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// Log verbosity when RUST_LOG is unset (-v info, -vv debug)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Link map segments to registry ids and write the mapping
    #[command(after_help = "\
Examples:
  stlink run tel-aviv.toml
  stlink run tel-aviv.toml -o mapping.csv
  stlink run tel-aviv.toml --json > result.json
  stlink run all.toml --all-localities --no-arbiter
  stlink run tel-aviv.toml --locality 'חיפה' -o haifa.csv

Data file paths in the config are relative to the config file.
Mapping CSV columns: segment_id,segment_name,official_id")]
    Run {
        /// Run config (TOML)
        config: PathBuf,

        /// Write the mapping CSV here instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Print the full result (summary, mapping, per-segment reports) as JSON
        #[arg(long)]
        json: bool,

        /// Override the config's locality
        #[arg(long, conflicts_with = "all_localities")]
        locality: Option<String>,

        /// Ignore the config's locality and link every locality
        #[arg(long)]
        all_localities: bool,

        /// Skip arbitration; ambiguous segments stay unresolved
        #[arg(long)]
        no_arbiter: bool,

        /// Suppress the summary on stderr
        #[arg(long, short = 'q')]
        quiet: bool,
    },

    /// Check a config and its data files without linking
    #[command(after_help = "\
Examples:
  stlink validate tel-aviv.toml
  stlink validate tel-aviv.toml --json")]
    Validate {
        /// Run config (TOML)
        config: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show how street names normalize
    #[command(after_help = "\
Examples:
  stlink normalize \"שד' רוטשילד\" 'רח. הרצל'
  cut -d, -f2 segments.csv | stlink normalize
  stlink normalize --config tel-aviv.toml 'כי׳ המדינה'")]
    Normalize {
        /// Names to normalize (omit to read one per line from stdin)
        names: Vec<String>,

        /// Use this config's abbreviation rules
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Report arbiter provider, model and key status
    #[command(after_help = "\
Examples:
  stlink doctor --config tel-aviv.toml
  stlink doctor --config tel-aviv.toml --json

Exit codes: 0 ready, 10 disabled, 11 missing key, 12 invalid settings")]
    Doctor {
        /// Run config whose [arbitration] section to check
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (",
        env!("STLINK_COMMIT"),
        ")",
        "\nlinker:  streetlink-linker ",
        env!("CARGO_PKG_VERSION"),
        "\ntarget:  ",
        env!("STLINK_TARGET"),
    )
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Run {
            config,
            output,
            json,
            locality,
            all_localities,
            no_arbiter,
            quiet,
        } => link::cmd_run(link::RunArgs {
            config,
            output,
            json,
            locality,
            all_localities,
            no_arbiter,
            quiet,
        }),
        Commands::Validate { config, json } => link::cmd_validate(config, json),
        Commands::Normalize { names, config, json } => link::cmd_normalize(names, config, json),
        Commands::Doctor { config, json } => doctor::cmd_doctor(config, json),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn usage(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_ERROR, message: msg.into(), hint: None }
    }

    pub fn link(err: LinkError) -> Self {
        let hint = match &err {
            LinkError::MissingColumn { .. } => {
                Some("map column names under [registry.columns] / [segments.columns]".to_string())
            }
            LinkError::NoData { .. } => Some("check `locality` or run `stlink validate` to list localities".to_string()),
            _ => None,
        };
        Self { code: link_exit_code(&err), message: err.to_string(), hint }
    }

    pub fn arbiter(err: ArbiterError) -> Self {
        let hint = match &err {
            ArbiterError::MissingKey { .. } => Some("or pass --no-arbiter to leave ambiguous segments unresolved".to_string()),
            _ => None,
        };
        Self { code: arbiter_exit_code(&err), message: err.to_string(), hint }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}
