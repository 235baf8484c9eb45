mod cmd;
mod output;

use clap::{Parser, Subcommand};
use cmd::config::ConfigSubcommand;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "pipette",
    about = "Dual-pipette transfer scheduler: simulate plans and inspect rig configuration",
    version
)]
struct Cli {
    /// Output as JSON
    #[arg(long, short = 'j', global = true)]
    json: bool,

    /// Log scheduling decisions (debug level)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate a transfer plan against the recording rig
    Run {
        /// Rig configuration (YAML)
        #[arg(long, env = "PIPETTE_RIG")]
        rig: PathBuf,

        /// Transfer plan (CSV with a header row)
        #[arg(long)]
        plan: PathBuf,

        /// Mode preset replacing the rig's own: safe, simple, test or debug
        #[arg(long)]
        mode: Option<String>,

        /// Profile overrides, one `key: value` per line
        #[arg(long)]
        profile: Option<PathBuf>,

        /// Write the run report as JSON to this path
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Inspect and validate rig configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Convert a well label to its tip index or back
    Well {
        /// Label such as `B3`, or index 1-96
        value: String,
    },

    /// Show how a volume is split into carryover legs
    Split {
        /// Volume in µL
        volume: f64,

        /// Pipette maximum volume in µL
        #[arg(long)]
        max: f64,

        /// Largest number of legs before clamping
        #[arg(long, default_value = "5")]
        max_cycles: u32,

        /// Keep every required leg instead of clamping
        #[arg(long)]
        no_safety_catch: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Run {
            rig,
            plan,
            mode,
            profile,
            report,
        } => cmd::run::run(
            cmd::run::RunArgs {
                rig: &rig,
                plan: &plan,
                mode: mode.as_deref(),
                profile: profile.as_deref(),
                report: report.as_deref(),
            },
            cli.json,
        ),
        Commands::Config { subcommand } => cmd::config::run(subcommand, cli.json),
        Commands::Well { value } => cmd::well::run(&value, cli.json),
        Commands::Split {
            volume,
            max,
            max_cycles,
            no_safety_catch,
        } => cmd::split::run(volume, max, max_cycles, !no_safety_catch, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
