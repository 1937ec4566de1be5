//! Dependency regeneration
//!
//! Rescans every manifest entry with the compiler's `-MM` mode and
//! overwrites its dependency list. Nothing is compiled and the flag set is
//! never consulted.

use crate::error::{BuildError, BuildResult};
use crate::manifest::ManifestStore;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

/// Produces the raw make-rule text describing a source's dependencies
pub trait DependencyScanner {
    fn scan(&self, source: &Path, include_paths: &[PathBuf]) -> BuildResult<String>;
}

/// Runs `<compiler> -MM <source> -I<path>...`
#[derive(Debug, Clone)]
pub struct CompilerScanner {
    program: String,
    working_dir: PathBuf,
}

impl CompilerScanner {
    pub fn new(program: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            working_dir: working_dir.into(),
        }
    }
}

impl DependencyScanner for CompilerScanner {
    fn scan(&self, source: &Path, include_paths: &[PathBuf]) -> BuildResult<String> {
        let output = Command::new(&self.program)
            .arg("-MM")
            .arg(source)
            .args(include_paths.iter().map(|p| format!("-I{}", p.display())))
            .current_dir(&self.working_dir)
            .output()
            .map_err(|e| BuildError::spawn(&self.program, e))?;

        if !output.status.success() {
            return Err(BuildError::DependencyScan {
                file: source.to_path_buf(),
                error: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Turn a make rule into the list of prerequisites after the source itself.
///
/// Backslash continuations are joined, everything up to the first `:` is
/// dropped and the first remaining token (the source) is discarded.
pub fn parse_dependency_output(source: &Path, output: &str) -> Vec<PathBuf> {
    let joined = output.replace("\\\n", " ").replace("\\\r\n", " ").replace('\\', "");
    let prerequisites = match joined.find(':') {
        Some(index) => &joined[index + 1..],
        None => joined.as_str(),
    };

    let mut tokens = prerequisites.split_whitespace();
    match tokens.next() {
        Some(first) if Path::new(first) != source => warn!(
            "Dependency scan of {} listed {} first",
            source.display(),
            first
        ),
        _ => {}
    }

    tokens.map(PathBuf::from).collect()
}

/// Rescan every entry of every set and persist the store.
///
/// Returns the number of entries rescanned.
pub fn regenerate(
    store: &mut ManifestStore,
    scanner: &dyn DependencyScanner,
) -> BuildResult<usize> {
    let mut scanned = 0;

    for set in store.sets_mut() {
        debug!("Scanning dependencies of manifest '{}'", set.name);
        for (source, entry) in set.entries.iter_mut() {
            let output = scanner.scan(source, &entry.include_paths)?;
            entry.dependencies = parse_dependency_output(source, &output);
            scanned += 1;
        }
    }

    store.save()?;
    info!("Recalculated dependencies for {} file(s)", scanned);
    Ok(scanned)
}
