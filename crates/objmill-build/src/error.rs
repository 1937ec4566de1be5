/// Build system error types
use std::path::PathBuf;
use thiserror::Error;

pub type BuildResult<T> = Result<T, BuildError>;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Failed to read manifest at {path}: {error}")]
    ManifestRead { path: PathBuf, error: String },

    #[error("Malformed manifest '{manifest}': {error}")]
    ManifestParse { manifest: String, error: String },

    #[error("Invalid directive '{directive}': {reason}")]
    InvalidDirective { directive: String, reason: String },

    #[error("Unknown variant '{0}'")]
    UnknownVariant(String),

    #[error("Variant '{variant}' inherits from itself through '{via}'")]
    VariantCycle { variant: String, via: String },

    #[error("pkg-config failed for {packages}: {error}")]
    PkgConfig { packages: String, error: String },

    #[error("Too many tracked flags for the object cache key ({count}, at most {max})")]
    TooManyTrackedFlags { count: usize, max: usize },

    #[error("Flag resolution did not settle after {restarts} restarts; check for conflicting @use directives")]
    ResolutionDiverged { restarts: usize },

    #[error("Pre-build task for {file} failed with exit code {exit_code}: {command}")]
    TaskFailed {
        file: PathBuf,
        command: String,
        exit_code: i32,
    },

    #[error("Failed to run '{program}': {error}")]
    Spawn {
        program: String,
        error: std::io::Error,
    },

    #[error("{} file(s) failed to compile: {}", .failures.len(), display_paths(.failures))]
    CompilationFailed { failures: Vec<PathBuf> },

    #[error("'{tool}' exited with status {status} while producing {output}")]
    LinkFailed {
        tool: String,
        output: PathBuf,
        status: i32,
    },

    #[error("Dependency scan failed for {file}: {error}")]
    DependencyScan { file: PathBuf, error: String },

    #[error("I/O error at {path}: {error}")]
    IoError {
        path: PathBuf,
        error: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] objmill_config::ConfigError),
}

impl BuildError {
    /// Create a manifest read error
    pub fn manifest_read(path: impl Into<PathBuf>, error: impl ToString) -> Self {
        Self::ManifestRead {
            path: path.into(),
            error: error.to_string(),
        }
    }

    /// Create a manifest parse error naming the offending manifest set
    pub fn manifest(manifest: impl Into<String>, error: impl ToString) -> Self {
        Self::ManifestParse {
            manifest: manifest.into(),
            error: error.to_string(),
        }
    }

    /// Create an invalid directive error
    pub fn directive(directive: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDirective {
            directive: directive.into(),
            reason: reason.into(),
        }
    }

    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::IoError {
            path: path.into(),
            error,
        }
    }

    /// Create a spawn error
    pub fn spawn(program: impl Into<String>, error: std::io::Error) -> Self {
        Self::Spawn {
            program: program.into(),
            error,
        }
    }

    /// Whether this error is a configuration error that aborts before compiling
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::ManifestRead { .. }
                | Self::ManifestParse { .. }
                | Self::InvalidDirective { .. }
                | Self::UnknownVariant(_)
                | Self::VariantCycle { .. }
                | Self::TooManyTrackedFlags { .. }
                | Self::Config(_)
        )
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
