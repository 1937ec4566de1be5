use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use objmill_config::ConfigLoader;
use tracing_subscriber::EnvFilter;

mod commands;

/// Incremental, variant-aware builds for C projects.
///
/// Source files are listed in JSON manifests under build/. Each run selects
/// the files the chosen variant needs, recompiles the ones whose cached
/// objects are stale, and links the result.
///
/// EXAMPLES:
///     objmill                          Build the native variant
///     objmill gtk --release            Optimized GTK build
///     objmill emscripten --enable-wasm Build the WebAssembly front end
///     objmill native -O 2 --32-bit     32-bit build at -O2
///     objmill -O gtk                   GTK build at plain -O
///     objmill redep                    Recalculate header dependencies
///     objmill clean                    Remove all cached objects
///
/// ENVIRONMENT VARIABLES:
///     OBJMILL_CC         Compiler (and final tool) to use
///     OBJMILL_FINCC      Final link tool to use
///     OBJMILL_JOBS       Maximum concurrent compiler processes
///     OBJMILL_BUILD_DIR  Directory holding files.json and the object cache
///     OBJMILL_JSON       Set to '1' for JSON output
///     RUST_LOG           Log filter, overrides --verbose and --quiet
#[derive(Parser)]
#[command(name = "objmill")]
#[command(version)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    build: commands::build::BuildArgs,

    /// Verbose output (debug logging)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Quiet output (warnings and errors only)
    #[arg(long, short = 'q', global = true, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Recalculate dependencies of every manifest entry
    ///
    /// Runs the dependency compiler (`gcc -MM` unless configured otherwise)
    /// over each source and rewrites the manifests in place.
    Redep,

    /// Remove all cached object files
    Clean,

    /// List built-in and configured variants
    ///
    /// EXAMPLES:
    ///     objmill variants             Table of variants
    ///     objmill variants --json      Machine-readable list
    Variants {
        /// JSON output
        #[arg(long, env = "OBJMILL_JSON")]
        json: bool,
    },
}

fn init_logging(verbose: bool, quiet: bool) {
    let level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let config = ConfigLoader::new()
        .load_from_directory(&std::env::current_dir()?)
        .context("Failed to load configuration")?;

    match cli.command {
        Some(Commands::Redep) => commands::redep::run(&config, cli.quiet),
        Some(Commands::Clean) => commands::clean::run(&config, cli.quiet),
        Some(Commands::Variants { json }) => commands::variants::run(&config, json),
        None => commands::build::run(&config, cli.build, cli.quiet),
    }
}
