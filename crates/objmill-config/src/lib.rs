//! objmill configuration system
//!
//! Provides configuration management for objmill builds:
//! - Project configuration (objmill.toml)
//! - Global user configuration (~/.objmill/config.toml)
//! - Environment variable overrides (OBJMILL_*)
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded and merged in the following order (later overrides earlier):
//! 1. Global config (~/.objmill/config.toml)
//! 2. Project config (./objmill.toml)
//! 3. Environment variables (OBJMILL_*)
//! 4. CLI flags
//!
//! # Example
//!
//! ```no_run
//! use objmill_config::ConfigLoader;
//! use std::path::Path;
//!
//! let mut loader = ConfigLoader::new();
//! let config = loader.load_from_directory(Path::new(".")).unwrap();
//! println!("manifests live in {}", config.build_dir().display());
//! ```

pub mod global;
pub mod loader;
pub mod project;

use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax in {file}: {error}")]
    TomlParseError {
        file: PathBuf,
        error: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Home directory not found")]
    HomeNotFound,
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

// Re-export main types
pub use global::GlobalConfig;
pub use loader::{Config, ConfigLoader, Toolchain};
pub use project::{BuildSection, CacheSection, ProjectConfig, ToolchainSection, VariantOverride};
