mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{archive::ArchivesSubcommand, run::RunArgs, update::StatusArg};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "pace",
    about = "Drive a coding agent through a prioritized feature backlog, one session at a time",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from feature_list.json or .git/)
    #[arg(long, global = true, env = "PACE_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run agent sessions until every feature passes or a stop condition hits
    Run(RunArgs),

    /// Show backlog progress and what comes next
    Status {
        /// Include per-category and per-priority counts
        #[arg(long, short = 'v')]
        verbose: bool,
    },

    /// Show the highest-priority failing feature
    Next {
        /// Print only the feature id
        #[arg(long)]
        id: bool,
    },

    /// Mark a feature as passing or failing
    Update {
        id: String,
        #[arg(value_enum)]
        status: StatusArg,
    },

    /// Check feature_list.json for structural problems
    Validate,

    /// Move the current feature list and progress log into .pace/archives/
    Archive {
        /// Recorded in the archive's .archive-info.json
        #[arg(long, default_value = "reinitialize")]
        reason: String,

        /// Leave the progress log in place
        #[arg(long)]
        no_progress: bool,
    },

    /// Inspect and prune archives
    Archives {
        #[command(subcommand)]
        subcommand: ArchivesSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Run(_) => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Run(args) => cmd::run::run(&root, args, cli.json),
        Commands::Status { verbose } => cmd::status::run(&root, verbose, cli.json),
        Commands::Next { id } => cmd::next::run(&root, id, cli.json),
        Commands::Update { id, status } => cmd::update::run(&root, &id, status, cli.json),
        Commands::Validate => cmd::validate::run(&root, cli.json),
        Commands::Archive {
            reason,
            no_progress,
        } => cmd::archive::archive(&root, &reason, no_progress, cli.json),
        Commands::Archives { subcommand } => cmd::archive::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        let code = e
            .downcast_ref::<cmd::run::RunExit>()
            .map_or(1, cmd::run::RunExit::exit_code);
        std::process::exit(code);
    }
}
