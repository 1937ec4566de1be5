//! Modification-time staleness checks for cached objects

use crate::error::{BuildError, BuildResult};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Why an object must be rebuilt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleReason {
    /// No object in the cache yet
    MissingObject,
    /// The source was modified after the object was written
    SourceNewer,
    /// A listed dependency was modified after the object was written
    DependencyNewer(PathBuf),
    /// A listed dependency no longer exists
    MissingDependency(PathBuf),
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingObject => write!(f, "object file does not exist"),
            Self::SourceNewer => write!(f, "object file is older than the source"),
            Self::DependencyNewer(dep) => write!(f, "dependency {} changed", dep.display()),
            Self::MissingDependency(dep) => write!(f, "dependency {} is missing", dep.display()),
        }
    }
}

/// Decide whether `object` is out of date.
///
/// Checks stop at the first reason found.
pub fn check(
    source: &Path,
    object: &Path,
    dependencies: &[PathBuf],
) -> BuildResult<Option<StaleReason>> {
    let object_time = match modified(object) {
        Ok(time) => time,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Ok(Some(StaleReason::MissingObject));
        }
        Err(e) => return Err(BuildError::io(object, e)),
    };

    let source_time = modified(source).map_err(|e| BuildError::io(source, e))?;
    if object_time < source_time {
        return Ok(Some(StaleReason::SourceNewer));
    }

    for dep in dependencies {
        match modified(dep) {
            Ok(time) if time > object_time => {
                return Ok(Some(StaleReason::DependencyNewer(dep.clone())));
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(Some(StaleReason::MissingDependency(dep.clone())));
            }
            Err(e) => return Err(BuildError::io(dep, e)),
        }
    }

    Ok(None)
}

fn modified(path: &Path) -> io::Result<SystemTime> {
    fs::metadata(path)?.modified()
}
