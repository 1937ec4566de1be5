//! objmill build engine
//!
//! Incremental, variant-aware builds of a C codebase described by JSON
//! file manifests:
//! - Flag sets with exclusive groups (architecture width)
//! - Directive-driven file selection with `@use` restarts
//! - A flat object cache keyed by source location and tracked flags
//! - Parallel compilation, unbounded or on a fixed worker pool
//! - Final link or static archive
//! - Dependency regeneration through the compiler's `-MM` mode

pub mod builder;
pub mod cache;
pub mod compiler;
pub mod depgen;
pub mod directive;
pub mod error;
pub mod flags;
pub mod linker;
pub mod manifest;
pub mod script;
pub mod selection;
pub mod variant;

// Re-export main types
pub use builder::{BuildConfig, BuildContext, BuildStats, Builder};
pub use cache::{KeyDeriver, ObjectCache, ObjectCacheKey, StaleReason, TrackedFeature};
pub use compiler::{CompileReport, CompileTask, ParallelCompiler};
pub use depgen::{parse_dependency_output, regenerate, CompilerScanner, DependencyScanner};
pub use directive::{Directive, Group};
pub use error::{BuildError, BuildResult};
pub use flags::{FlagSet, ARCH_WIDTH};
pub use linker::{LinkMode, Linker};
pub use manifest::{FileEntry, ManifestSet, ManifestStore};
pub use script::{TaskReport, TaskResult, TaskRunner};
pub use selection::{Attempt, Resolution, ResolutionOutcome, SelectionEngine};
pub use variant::{ArchWidth, BuildOptions, OptLevel, PkgFlags, VariantConfig};
