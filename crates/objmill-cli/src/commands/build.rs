//! Build command - resolve, compile and link one variant

use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use objmill_build::variant::DEFAULT_VARIANT;
use objmill_build::{ArchWidth, BuildContext, BuildError, BuildOptions, Builder, OptLevel};
use objmill_config::Config;
use std::path::PathBuf;

/// Build arguments, accepted when no subcommand is given
#[derive(Args, Debug, Default)]
pub struct BuildArgs {
    /// Variant to build (see `objmill variants`)
    pub variant: Option<String>,

    /// Optimized build without debug information (-O3)
    #[arg(long)]
    pub release: bool,

    /// Optimization level; without a number, plain -O
    #[arg(long = "optimization-level", short = 'O', value_name = "N")]
    pub optimization: Option<Option<String>>,

    /// Output file path
    #[arg(long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Target architecture width
    #[arg(long, value_enum)]
    pub arch_width: Option<Width>,

    /// Shorthand for --arch-width 32
    #[arg(long = "32-bit")]
    pub bits32: bool,

    /// Compile without debugging information
    #[arg(long)]
    pub disable_debug: bool,

    /// Enable instrumentation callbacks (-DINSTRUMENT)
    #[arg(long)]
    pub instrument: bool,

    /// Link with -pg
    #[arg(long)]
    pub profile: bool,

    /// Emit WebAssembly from the emscripten variant
    #[arg(long)]
    pub enable_wasm: bool,

    /// Compiler, also used as the final tool
    #[arg(long, value_name = "CC")]
    pub cc: Option<String>,

    /// Final link or archive tool
    #[arg(long, value_name = "CC")]
    pub fincc: Option<String>,

    /// Maximum concurrent compiler processes (default: one per file)
    #[arg(long, short = 'j', value_name = "N")]
    pub jobs: Option<usize>,

    /// JSON output
    #[arg(long, env = "OBJMILL_JSON")]
    pub json: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Width {
    #[value(name = "32")]
    W32,
    #[value(name = "64")]
    W64,
}

impl From<Width> for ArchWidth {
    fn from(width: Width) -> Self {
        match width {
            Width::W32 => ArchWidth::Bits32,
            Width::W64 => ArchWidth::Bits64,
        }
    }
}

impl BuildArgs {
    /// Variant named on the command line and the explicit `-O` level.
    ///
    /// A word after `-O` that is not a number is a plain `-O` followed by
    /// the variant, so `objmill -O gtk` builds gtk.
    fn target(&self) -> Result<(Option<&str>, Option<OptLevel>)> {
        let variant = self.variant.as_deref();
        let Some(optimization) = &self.optimization else {
            return Ok((variant, None));
        };
        let Some(value) = optimization else {
            return Ok((variant, Some(OptLevel::Bare)));
        };

        match value.parse::<u8>() {
            Ok(level) => Ok((variant, Some(OptLevel::Level(level)))),
            Err(_) if variant.is_none() => Ok((Some(value.as_str()), Some(OptLevel::Bare))),
            Err(_) => bail!("Invalid optimization level '{}'", value),
        }
    }

    /// Variant to build and per-invocation switches; an explicit level beats --release
    pub fn resolve(&self) -> Result<(&str, BuildOptions)> {
        let (variant, level) = self.target()?;
        let mut options = BuildOptions {
            arch_width: if self.bits32 {
                Some(ArchWidth::Bits32)
            } else {
                self.arch_width.map(Into::into)
            },
            debug_info: !self.disable_debug,
            instrument: self.instrument,
            profile: self.profile,
            enable_wasm: self.enable_wasm,
            output: self.output.clone(),
            cc: self.cc.clone(),
            fincc: self.fincc.clone(),
            ..Default::default()
        };

        if self.release {
            options = options.release();
        }
        if let Some(level) = level {
            options.optimization = level;
        }
        Ok((variant.unwrap_or(DEFAULT_VARIANT), options))
    }
}

/// Run the build command
pub fn run(config: &Config, args: BuildArgs, quiet: bool) -> Result<()> {
    let (variant, options) = args.resolve()?;

    let mut builder = Builder::from_config(config, variant, options)
        .with_context(|| format!("Failed to set up variant '{}'", variant))?;
    if let Some(jobs) = args.jobs {
        builder = builder.with_jobs(Some(jobs));
    }

    match builder.build() {
        Ok(context) => {
            if args.json {
                print_json(&context);
            } else if !quiet {
                print_summary(&context);
            }
            Ok(())
        }
        Err(error) => {
            if args.json {
                print_failure_json(variant, &error);
            } else {
                print_failures(&error);
            }
            Err(error).context("Build failed")
        }
    }
}

fn print_summary(context: &BuildContext) {
    let stats = &context.stats;
    println!(
        "Built {} ({}) in {:.2}s",
        context.output.display(),
        context.variant,
        stats.total_time.as_secs_f64()
    );
    println!(
        "  Files: {} linked, {} compiled",
        stats.total_files, stats.compiled_files
    );
    if stats.restarts > 0 {
        println!("  Flag restarts: {}", stats.restarts);
    }
    if stats.tasks_run > 0 {
        println!("  Pre-build tasks: {}", stats.tasks_run);
    }
}

fn print_failures(error: &BuildError) {
    if let BuildError::CompilationFailed { failures } = error {
        println!("Files that errored:");
        for file in failures {
            println!("  {}", file.display());
        }
    }
}

fn print_json(context: &BuildContext) {
    let stats = &context.stats;
    println!(
        "{}",
        serde_json::json!({
            "success": true,
            "variant": context.variant,
            "output": context.output.display().to_string(),
            "flags": context.flags.tokens(),
            "files": stats.total_files,
            "compiled": stats.compiled_files,
            "restarts": stats.restarts,
            "tasks": stats.tasks_run,
            "resolution_time": stats.resolution_time.as_secs_f64(),
            "compilation_time": stats.compilation_time.as_secs_f64(),
            "linking_time": stats.linking_time.as_secs_f64(),
            "total_time": stats.total_time.as_secs_f64(),
        })
    );
}

fn print_failure_json(variant: &str, error: &BuildError) {
    let failures: Vec<String> = match error {
        BuildError::CompilationFailed { failures } => {
            failures.iter().map(|p| p.display().to_string()).collect()
        }
        _ => Vec::new(),
    };
    println!(
        "{}",
        serde_json::json!({
            "success": false,
            "variant": variant,
            "error": error.to_string(),
            "failures": failures,
        })
    );
}
