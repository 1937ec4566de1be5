//! Flat object-file cache shared by every variant
pub mod key;
pub mod staleness;

pub use key::{KeyDeriver, ObjectCacheKey, TrackedFeature, MAX_TRACKED_FEATURES};
pub use staleness::StaleReason;

use crate::error::{BuildError, BuildResult};
use crate::flags::FlagSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Extension of cached object files
pub const OBJECT_EXTENSION: &str = "o";

/// The on-disk object cache directory
#[derive(Debug, Clone)]
pub struct ObjectCache {
    dir: PathBuf,
    deriver: KeyDeriver,
}

impl ObjectCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            deriver: KeyDeriver::new(),
        }
    }

    pub fn with_deriver(mut self, deriver: KeyDeriver) -> Self {
        self.deriver = deriver;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn deriver(&self) -> &KeyDeriver {
        &self.deriver
    }

    /// Path of the cached object for `source` under `flags`
    pub fn object_path(&self, source: &Path, flags: &FlagSet) -> PathBuf {
        self.dir.join(self.deriver.derive(source, flags).file_name())
    }

    /// Whether the cached object must be rebuilt, and why
    pub fn staleness(
        &self,
        source: &Path,
        object: &Path,
        dependencies: &[PathBuf],
    ) -> BuildResult<Option<StaleReason>> {
        staleness::check(source, object, dependencies)
    }

    pub fn ensure_dir(&self) -> BuildResult<()> {
        fs::create_dir_all(&self.dir).map_err(|e| BuildError::io(&self.dir, e))
    }

    /// Delete every cached object. Returns how many were removed.
    pub fn clean(&self) -> BuildResult<usize> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(BuildError::io(&self.dir, e)),
        };

        let mut removed = 0;
        for entry in entries {
            let path = entry.map_err(|e| BuildError::io(&self.dir, e))?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == OBJECT_EXTENSION) {
                fs::remove_file(&path).map_err(|e| BuildError::io(&path, e))?;
                removed += 1;
            }
        }

        Ok(removed)
    }
}
