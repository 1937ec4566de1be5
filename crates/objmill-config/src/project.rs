//! Project Configuration (objmill.toml)
//!
//! Handles project-level configuration stored in `objmill.toml` at the project root.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Name of the project configuration file
pub const PROJECT_CONFIG_FILE: &str = "objmill.toml";

/// Project configuration from objmill.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Compiler, final tool and helper programs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub toolchain: Option<ToolchainSection>,

    /// Manifest and object cache locations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildSection>,

    /// Object cache key settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheSection>,

    /// Variant overrides and additions, keyed by variant name
    #[serde(default)]
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub variants: BTreeMap<String, VariantOverride>,
}

/// `[toolchain]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ToolchainSection {
    /// Compiler used for object files
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cc: Option<String>,

    /// Tool used for the final link/archive step
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fincc: Option<String>,

    /// Compiler invoked in dependency-scan mode by `redep`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dep_cc: Option<String>,

    /// Archiver program name; a final tool with this name selects archive mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archiver: Option<String>,
}

/// `[build]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct BuildSection {
    /// Directory holding `files.json` and the per-set manifests (default: "build")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,

    /// Flat object cache directory (default: "<dir>/objs")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,

    /// Maximum number of concurrent compiler processes (default: unbounded)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jobs: Option<usize>,

    /// Abort the build when a pre-build task exits nonzero
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fail_on_task_error: Option<bool>,
}

/// `[cache]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct CacheSection {
    /// Extra flag tokens that contribute a bit to object cache keys
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tracked_flags: Vec<String>,
}

/// `[variants.<name>]` table
///
/// Every field is optional; unset fields keep the value of the built-in
/// variant of the same name, or of `inherits` for new variants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct VariantOverride {
    /// Built-in variant to start from when defining a new one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inherits: Option<String>,

    /// Build type matched by `@flags` directives (defaults to the variant name)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub compiler: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_tool: Option<String>,

    /// Extra compiler flags appended after the base flags
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flags: Option<Vec<String>>,

    /// Extra trailing link-only flags
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_flags: Option<Vec<String>>,

    /// pkg-config packages whose cflags/libs are merged in
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pkg_config: Option<Vec<String>>,

    /// Indices into `files.json` of manifest sets to leave out
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclude_manifests: Option<Vec<usize>>,

    /// Default output path for this variant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
}

impl ProjectConfig {
    /// Load project configuration from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path)?;
        let config: ProjectConfig =
            toml::from_str(&content).map_err(|error| ConfigError::TomlParseError {
                file: path.to_path_buf(),
                error,
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Parse project configuration from a TOML string
    pub fn parse(content: &str) -> ConfigResult<Self> {
        let config: ProjectConfig =
            toml::from_str(content).map_err(|error| ConfigError::TomlParseError {
                file: PathBuf::from(PROJECT_CONFIG_FILE),
                error,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(build) = &self.build {
            if build.jobs == Some(0) {
                return Err(ConfigError::InvalidValue {
                    field: "build.jobs".to_string(),
                    reason: "must be at least 1".to_string(),
                });
            }
        }

        for (name, variant) in &self.variants {
            if name.is_empty() {
                return Err(ConfigError::ValidationError(
                    "variant name cannot be empty".to_string(),
                ));
            }
            if variant.build_type.as_deref() == Some("") {
                return Err(ConfigError::InvalidValue {
                    field: format!("variants.{}.build_type", name),
                    reason: "cannot be empty".to_string(),
                });
            }
        }

        Ok(())
    }
}
