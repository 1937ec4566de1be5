//! Build orchestration
//!
//! Ties the pieces together for one invocation: load manifests, build the
//! initial flag set for the variant, resolve until stable, run pre-build
//! tasks, compile stale files, then link every included object.

use crate::cache::{KeyDeriver, ObjectCache};
use crate::compiler::{CompileReport, ParallelCompiler};
use crate::depgen::{self, CompilerScanner, DependencyScanner};
use crate::error::{BuildError, BuildResult};
use crate::flags::FlagSet;
use crate::linker::{Linker, DEFAULT_ARCHIVER};
use crate::manifest::ManifestStore;
use crate::script::TaskRunner;
use crate::selection::{ResolutionOutcome, SelectionEngine};
use crate::variant::{BuildOptions, PkgFlags, VariantConfig, DEFAULT_VARIANT};
use objmill_config::Config;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Compiler used by `redep` unless configured otherwise
pub const DEFAULT_DEP_CC: &str = "gcc";

/// Where things live and how hard to work
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Project root; manifest paths and the output are relative to it
    pub root: PathBuf,
    /// Directory holding `files.json` and the manifest sets
    pub manifest_dir: PathBuf,
    pub cache_dir: PathBuf,
    /// Concurrent compiler limit, `None` for one process per file
    pub jobs: Option<usize>,
    pub fail_on_task_error: bool,
    /// Extra flags folded into object cache keys
    pub tracked_flags: Vec<String>,
    pub dep_cc: String,
    pub archiver: String,
}

impl BuildConfig {
    /// Defaults for a project rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let manifest_dir = root.join("build");
        Self {
            cache_dir: manifest_dir.join("objs"),
            manifest_dir,
            root,
            jobs: None,
            fail_on_task_error: false,
            tracked_flags: Vec::new(),
            dep_cc: DEFAULT_DEP_CC.to_string(),
            archiver: DEFAULT_ARCHIVER.to_string(),
        }
    }

    /// Take directories, limits and tools from loaded configuration
    pub fn from_config(config: &Config) -> Self {
        let toolchain = config.toolchain();
        Self {
            root: config.root(),
            manifest_dir: config.build_dir(),
            cache_dir: config.cache_dir(),
            jobs: config.jobs(),
            fail_on_task_error: config.fail_on_task_error(),
            tracked_flags: config.tracked_flags().to_vec(),
            dep_cc: toolchain.dep_cc.unwrap_or_else(|| DEFAULT_DEP_CC.to_string()),
            archiver: toolchain
                .archiver
                .unwrap_or_else(|| DEFAULT_ARCHIVER.to_string()),
        }
    }
}

/// Build statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildStats {
    /// Files taking part in the link
    pub total_files: usize,
    /// Files recompiled this run
    pub compiled_files: usize,
    /// Resolution passes thrown away because of `@use`
    pub restarts: usize,
    /// Pre-build commands executed
    pub tasks_run: usize,
    pub resolution_time: Duration,
    pub compilation_time: Duration,
    pub linking_time: Duration,
    pub total_time: Duration,
}

/// Result of a successful build
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub variant: String,
    /// Final artifact, relative to the project root unless given absolute
    pub output: PathBuf,
    /// The settled flag set
    pub flags: FlagSet,
    pub outcome: ResolutionOutcome,
    pub stats: BuildStats,
}

/// Runs builds, cleans and dependency scans for one project
#[derive(Debug, Clone)]
pub struct Builder {
    config: BuildConfig,
    variant: VariantConfig,
    options: BuildOptions,
}

impl Builder {
    /// Builder for the default variant
    pub fn new(config: BuildConfig) -> BuildResult<Self> {
        let variant = VariantConfig::builtin(DEFAULT_VARIANT)
            .ok_or_else(|| BuildError::UnknownVariant(DEFAULT_VARIANT.to_string()))?;
        Ok(Self {
            config,
            variant,
            options: BuildOptions::default(),
        })
    }

    /// Builder for `variant` as described by loaded configuration.
    ///
    /// Configured toolchain compilers only replace the default `gcc`;
    /// `options.cc` and `options.fincc` still override every variant.
    pub fn from_config(config: &Config, variant: &str, options: BuildOptions) -> BuildResult<Self> {
        let mut variant = VariantConfig::resolve(variant, &config.project.variants)?;
        let toolchain = config.toolchain();
        variant.apply_toolchain(toolchain.cc.as_deref(), toolchain.fincc.as_deref());

        Ok(Self {
            config: BuildConfig::from_config(config),
            variant,
            options,
        })
    }

    pub fn with_variant(mut self, variant: VariantConfig) -> Self {
        self.variant = variant;
        self
    }

    pub fn with_options(mut self, options: BuildOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_jobs(mut self, jobs: Option<usize>) -> Self {
        self.config.jobs = jobs;
        self
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    pub fn variant(&self) -> &VariantConfig {
        &self.variant
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    fn cache(&self) -> BuildResult<ObjectCache> {
        let deriver = KeyDeriver::new().with_tracked_flags(&self.config.tracked_flags)?;
        Ok(ObjectCache::new(&self.config.cache_dir).with_deriver(deriver))
    }

    /// Execute the build
    pub fn build(&self) -> BuildResult<BuildContext> {
        let build_start = Instant::now();
        info!("Building variant {}", self.variant);

        let store = ManifestStore::load(&self.config.manifest_dir)?;
        let sets = store.active_sets(&self.variant.exclude_manifests);

        let pkg = PkgFlags::query(&self.variant.pkg_config)?;
        let flags = self.variant.initial_flags(&self.options, &pkg);
        let end_flags = self.variant.end_flags(&self.options, &pkg);
        let output = self.variant.output(&self.options);

        let resolve_start = Instant::now();
        let engine = SelectionEngine::new(&self.config.root, self.cache()?);
        let resolution = engine.resolve(&sets, flags)?;
        let resolution_time = resolve_start.elapsed();

        let tasks = TaskRunner::new(&self.config.root, resolution.flags.build_type())
            .with_fail_on_error(self.config.fail_on_task_error)
            .run_all(&resolution.outcome.to_compile)?;

        let compile_start = Instant::now();
        let report = self.compile(&engine, &resolution.flags, &resolution.outcome)?;
        let compilation_time = compile_start.elapsed();

        if !report.is_success() {
            error!(
                "Files that errored: {}",
                report
                    .failures
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            return Err(BuildError::CompilationFailed {
                failures: report.failures,
            });
        }

        let link_start = Instant::now();
        let objects = engine.object_paths(&resolution.outcome, &resolution.flags);
        Linker::new(self.variant.final_tool(&self.options), &self.config.root)
            .with_archiver(&self.config.archiver)
            .link(&resolution.flags, &end_flags, &objects, &output)?;
        let linking_time = link_start.elapsed();

        let stats = BuildStats {
            total_files: resolution.outcome.included_files.len(),
            compiled_files: report.completed,
            restarts: resolution.restarts,
            tasks_run: tasks.executed,
            resolution_time,
            compilation_time,
            linking_time,
            total_time: build_start.elapsed(),
        };
        info!(
            "Built {} in {:.2}s",
            output.display(),
            stats.total_time.as_secs_f64()
        );

        Ok(BuildContext {
            variant: self.variant.name.clone(),
            output,
            flags: resolution.flags,
            outcome: resolution.outcome,
            stats,
        })
    }

    fn compile(
        &self,
        engine: &SelectionEngine,
        flags: &FlagSet,
        outcome: &ResolutionOutcome,
    ) -> BuildResult<CompileReport> {
        if outcome.to_compile.is_empty() {
            info!("No files to compile");
            return Ok(CompileReport::default());
        }

        engine.cache().ensure_dir()?;
        let report = ParallelCompiler::new(flags.compiler(), &self.config.root)
            .with_jobs(self.config.jobs)
            .compile(flags, &outcome.to_compile)?;

        info!(
            "{}/{} compiled successfully",
            report.succeeded(),
            outcome.to_compile.len()
        );
        Ok(report)
    }

    /// Remove every cached object file
    pub fn clean(&self) -> BuildResult<usize> {
        info!("Removing all built files in {}", self.config.cache_dir.display());
        ObjectCache::new(&self.config.cache_dir).clean()
    }

    /// Recalculate dependencies with the configured dependency compiler
    pub fn redep(&self) -> BuildResult<usize> {
        let scanner = CompilerScanner::new(&self.config.dep_cc, &self.config.root);
        self.redep_with(&scanner)
    }

    /// Recalculate dependencies with any scanner
    pub fn redep_with(&self, scanner: &dyn DependencyScanner) -> BuildResult<usize> {
        let mut store = ManifestStore::load(&self.config.manifest_dir)?;
        depgen::regenerate(&mut store, scanner)
    }
}
