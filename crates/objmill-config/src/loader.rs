//! Configuration Loader
//!
//! Handles loading and merging configuration from multiple sources with proper precedence.

use crate::global::GlobalConfig;
use crate::project::{ProjectConfig, ToolchainSection, PROJECT_CONFIG_FILE};
use crate::{ConfigError, ConfigResult};
use std::env;
use std::path::{Path, PathBuf};

/// Configuration loader
///
/// Loads configuration from multiple sources and merges them with proper precedence:
/// 1. Global config (~/.objmill/config.toml) - lowest priority
/// 2. Project config (./objmill.toml) - overrides global
/// 3. Environment variables (OBJMILL_*) - overrides project
/// 4. CLI flags - highest priority (handled by caller)
pub struct ConfigLoader {
    /// Cached global config path
    global_config_path: Option<PathBuf>,
}

/// Merged configuration result
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Project configuration, with environment overrides applied
    pub project: ProjectConfig,

    /// Global configuration
    pub global: GlobalConfig,

    /// Project root directory (where objmill.toml was found)
    pub project_root: Option<PathBuf>,
}

/// Toolchain after merging global and project settings
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Toolchain {
    pub cc: Option<String>,
    pub fincc: Option<String>,
    pub dep_cc: Option<String>,
    pub archiver: Option<String>,
}

impl Config {
    /// Root that relative config paths are resolved against
    pub fn root(&self) -> PathBuf {
        self.project_root.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    /// Directory holding `files.json` and the per-set manifests
    pub fn build_dir(&self) -> PathBuf {
        let dir = self
            .project
            .build
            .as_ref()
            .and_then(|b| b.dir.clone())
            .unwrap_or_else(|| PathBuf::from("build"));
        self.root().join(dir)
    }

    /// Flat object cache directory
    pub fn cache_dir(&self) -> PathBuf {
        match self.project.build.as_ref().and_then(|b| b.cache_dir.clone()) {
            Some(dir) => self.root().join(dir),
            None => self.build_dir().join("objs"),
        }
    }

    /// Concurrency cap; `None` means one process per task
    pub fn jobs(&self) -> Option<usize> {
        self.project.build.as_ref().and_then(|b| b.jobs)
    }

    pub fn fail_on_task_error(&self) -> bool {
        self.project
            .build
            .as_ref()
            .and_then(|b| b.fail_on_task_error)
            .unwrap_or(false)
    }

    /// Extra cache-key flags from `[cache] tracked_flags`
    pub fn tracked_flags(&self) -> &[String] {
        self.project
            .cache
            .as_ref()
            .map(|c| c.tracked_flags.as_slice())
            .unwrap_or(&[])
    }

    /// Merge the project toolchain over the global one
    pub fn toolchain(&self) -> Toolchain {
        let empty = ToolchainSection::default();
        let global = self.global.toolchain.as_ref().unwrap_or(&empty);
        let project = self.project.toolchain.as_ref().unwrap_or(&empty);

        Toolchain {
            cc: project.cc.clone().or_else(|| global.cc.clone()),
            fincc: project.fincc.clone().or_else(|| global.fincc.clone()),
            dep_cc: project.dep_cc.clone().or_else(|| global.dep_cc.clone()),
            archiver: project.archiver.clone().or_else(|| global.archiver.clone()),
        }
    }
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            global_config_path: None,
        }
    }

    /// Use an explicit global config path instead of ~/.objmill/config.toml
    pub fn with_global_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.global_config_path = Some(path.into());
        self
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to find objmill.toml, then loads and merges
    /// global config if it exists.
    pub fn load_from_directory(&mut self, start_dir: &Path) -> ConfigResult<Config> {
        let (project_root, project_config) = self.find_project_config(start_dir)?;
        let global_config = self.load_global_config().unwrap_or_default();
        let project_config = self.apply_env_overrides(project_config)?;

        Ok(Config {
            project: project_config,
            global: global_config,
            // No objmill.toml: the start directory is the project root
            project_root: project_root.or_else(|| Some(start_dir.to_path_buf())),
        })
    }

    /// Load configuration from a specific project config file
    pub fn load_from_file(&mut self, config_path: &Path) -> ConfigResult<Config> {
        let project_config = ProjectConfig::load_from_file(config_path)?;
        let global_config = self.load_global_config().unwrap_or_default();
        let project_config = self.apply_env_overrides(project_config)?;

        Ok(Config {
            project: project_config,
            global: global_config,
            project_root: config_path.parent().map(|p| p.to_path_buf()),
        })
    }

    /// Find project configuration by walking up directory tree
    fn find_project_config(
        &self,
        start_dir: &Path,
    ) -> ConfigResult<(Option<PathBuf>, ProjectConfig)> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(PROJECT_CONFIG_FILE);

            if config_path.exists() {
                let project_config = ProjectConfig::load_from_file(&config_path)?;
                return Ok((Some(current), project_config));
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => return Ok((None, ProjectConfig::default())),
            }
        }
    }

    /// Load global configuration from ~/.objmill/config.toml
    fn load_global_config(&mut self) -> ConfigResult<GlobalConfig> {
        let path = match &self.global_config_path {
            Some(path) => path.clone(),
            None => {
                let path = GlobalConfig::global_config_path()?;
                self.global_config_path = Some(path.clone());
                path
            }
        };

        // Global config is optional
        if !path.exists() {
            return Ok(GlobalConfig::default());
        }

        GlobalConfig::load_from_file(&path)
    }

    /// Apply environment variable overrides to project config
    ///
    /// Recognized: OBJMILL_CC, OBJMILL_FINCC, OBJMILL_JOBS, OBJMILL_BUILD_DIR
    fn apply_env_overrides(&self, mut config: ProjectConfig) -> ConfigResult<ProjectConfig> {
        if let Ok(cc) = env::var("OBJMILL_CC") {
            config.toolchain.get_or_insert_with(Default::default).cc = Some(cc);
        }

        if let Ok(fincc) = env::var("OBJMILL_FINCC") {
            config.toolchain.get_or_insert_with(Default::default).fincc = Some(fincc);
        }

        if let Ok(jobs) = env::var("OBJMILL_JOBS") {
            let jobs: usize = jobs.parse().map_err(|_| ConfigError::InvalidValue {
                field: "OBJMILL_JOBS".to_string(),
                reason: format!("expected a positive integer, got '{}'", jobs),
            })?;
            if jobs == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "OBJMILL_JOBS".to_string(),
                    reason: "must be at least 1".to_string(),
                });
            }
            config.build.get_or_insert_with(Default::default).jobs = Some(jobs);
        }

        if let Ok(dir) = env::var("OBJMILL_BUILD_DIR") {
            config.build.get_or_insert_with(Default::default).dir = Some(PathBuf::from(dir));
        }

        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
