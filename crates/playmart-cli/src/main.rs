#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{Parser, Subcommand};
use output::{CliError, OutputMode};
use playmart_core::config::{self, PipelineConfig};
use playmart_core::{ErrorCode, PipelineError};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "playmart: song play logs into a star-schema warehouse",
    long_about = None
)]
struct Cli {
    /// Enable debug logging for playmart crates.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Output format (overrides `--json` and `PLAYMART_FORMAT`).
    #[arg(long, value_enum, global = true)]
    format: Option<OutputMode>,

    /// Config file (default: ./playmart.toml, then the user config dir).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        output::resolve_output_mode(self.format, self.json)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Warehouse",
        about = "Create or upgrade the warehouse schema",
        after_help = "EXAMPLES:\n    # Create playmart.db with every table and index\n    playmart init\n\n    # Use another warehouse file\n    PLAYMART_DB=/tmp/mart.db playmart init"
    )]
    Init,

    #[command(
        next_help_heading = "Warehouse",
        about = "Drop and recreate warehouse tables",
        long_about = "Drop every table and re-apply the schema. With --staging-only, \
                      only the staging tables are emptied; dimensions and songplays are kept.",
        after_help = "EXAMPLES:\n    # Start over from an empty warehouse\n    playmart reset\n\n    # Discard staged data only\n    playmart reset --staging-only"
    )]
    Reset(cmd::reset::ResetArgs),

    #[command(
        next_help_heading = "Pipeline",
        about = "Bulk-load event logs and the song catalog into staging",
        after_help = "EXAMPLES:\n    # Load the configured sources\n    playmart load\n\n    # Load camelCase logs through a JSONPaths file\n    playmart load --events data/log_data --jsonpath data/log_json_path.json"
    )]
    Load(cmd::load::LoadArgs),

    #[command(
        next_help_heading = "Pipeline",
        about = "Rebuild the users, songs, artists and time dimensions"
    )]
    Build,

    #[command(
        next_help_heading = "Pipeline",
        about = "Merge staged plays into songplays without duplicating them"
    )]
    Merge,

    #[command(
        next_help_heading = "Pipeline",
        about = "Run the full job: load, build, merge",
        after_help = "EXAMPLES:\n    # Nightly job\n    playmart run\n\n    # Machine-readable report\n    playmart run --json"
    )]
    Run,

    #[command(
        next_help_heading = "Reporting",
        about = "Show totals and the most active songs and users",
        after_help = "EXAMPLES:\n    # Default ranking size from queries.top_n\n    playmart stats\n\n    # Top ten as JSON\n    playmart stats --top 10 --json"
    )]
    Stats(cmd::stats::StatsArgs),
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("PLAYMART_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "playmart=debug,info"
        } else {
            "playmart=info,warn"
        })
    });

    let format = env::var("PLAYMART_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    // Logs go to stderr so stdout stays parseable.
    let registry = tracing_subscriber::registry().with(filter);
    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn dispatch(command: &Commands, config: &PipelineConfig, output: OutputMode) -> anyhow::Result<()> {
    match command {
        Commands::Init => cmd::init::run_init(config, output),
        Commands::Reset(args) => cmd::reset::run_reset(args, config, output),
        Commands::Load(args) => cmd::load::run_load(args, config, output),
        Commands::Build => cmd::build::run_build(config, output),
        Commands::Merge => cmd::merge::run_merge(config, output),
        Commands::Run => cmd::run::run_job(config, output),
        Commands::Stats(args) => cmd::stats::run_stats(args, config, output),
    }
}

fn config_error(err: &anyhow::Error) -> CliError {
    let code = ErrorCode::ConfigParseError;
    CliError::with_details(
        format!("{err:#}"),
        code.hint().unwrap_or_else(|| code.message()),
        code.code(),
    )
}

fn command_error(err: &anyhow::Error) -> CliError {
    err.downcast_ref::<PipelineError>()
        .map_or_else(|| CliError::new(format!("{err:#}")), CliError::from)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let output = cli.output_mode();

    let result = config::load_config(cli.config.as_deref())
        .map_err(|err| config_error(&err))
        .and_then(|config| {
            info!(warehouse = %config.warehouse.path.display(), "configuration resolved");
            dispatch(&cli.command, &config, output).map_err(|err| command_error(&err))
        });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            // Nothing more useful to do if stderr itself is gone.
            let _ = output::render_error(output, &err);
            ExitCode::FAILURE
        }
    }
}
