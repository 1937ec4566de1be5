//! Manifest store
//!
//! The manifest directory holds `files.json`, a list of manifest-set names,
//! and one `<name>-files.json` per set mapping source paths to their
//! [`FileEntry`]. The `description` and `archive` keys of a set are markers,
//! not files.

use crate::directive::Directive;
use crate::error::{BuildError, BuildResult};
use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Index file listing the manifest sets, in load order
pub const MANIFEST_INDEX: &str = "files.json";

const DESCRIPTION_KEY: &str = "description";
const ARCHIVE_KEY: &str = "archive";

/// Build information for one source file
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileEntry {
    /// Headers and other inputs whose modification invalidates the object
    #[serde(default)]
    pub dependencies: Vec<PathBuf>,
    /// Directives and raw compiler arguments, evaluated left to right
    #[serde(default)]
    pub additional_flags: Vec<Directive>,
    #[serde(default)]
    pub include_paths: Vec<PathBuf>,
    /// Shell commands run before the file is compiled
    #[serde(default, rename = "tasks")]
    pub pre_build_tasks: Vec<String>,
}

impl FileEntry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dependencies(mut self, dependencies: Vec<PathBuf>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn with_directive(mut self, directive: Directive) -> Self {
        self.additional_flags.push(directive);
        self
    }

    pub fn with_include_paths(mut self, include_paths: Vec<PathBuf>) -> Self {
        self.include_paths = include_paths;
        self
    }

    pub fn with_tasks(mut self, tasks: Vec<String>) -> Self {
        self.pre_build_tasks = tasks;
        self
    }

    /// Flags this entry may require through `@use`
    pub fn use_tokens(&self) -> impl Iterator<Item = &str> {
        self.additional_flags.iter().filter_map(|d| match d {
            Directive::Use(token) => Some(token.as_str()),
            _ => None,
        })
    }
}

/// One named file manifest
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ManifestSet {
    pub name: String,
    pub description: Option<Value>,
    pub archive: Option<Value>,
    /// Entries in declared order
    pub entries: Vec<(PathBuf, FileEntry)>,
}

impl ManifestSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_entry(mut self, path: impl Into<PathBuf>, entry: FileEntry) -> Self {
        self.entries.push((path.into(), entry));
        self
    }

    /// File name of this set inside the manifest directory
    pub fn file_name(name: &str) -> String {
        format!("{}-files.json", name)
    }

    /// Load a set from `<dir>/<name>-files.json`
    pub fn load(dir: &Path, name: &str) -> BuildResult<Self> {
        let path = dir.join(Self::file_name(name));
        let text = fs::read_to_string(&path).map_err(|e| BuildError::manifest_read(&path, e))?;
        Self::parse(name, &text)
    }

    /// Parse a set from JSON text
    pub fn parse(name: &str, text: &str) -> BuildResult<Self> {
        let object: Map<String, Value> =
            serde_json::from_str(text).map_err(|e| BuildError::manifest(name, e))?;

        let mut set = Self::new(name);
        for (key, value) in object {
            match key.as_str() {
                DESCRIPTION_KEY => set.description = Some(value),
                ARCHIVE_KEY => set.archive = Some(value),
                _ => {
                    let entry: FileEntry = serde_json::from_value(value).map_err(|e| {
                        BuildError::manifest(name, format!("entry '{}': {}", key, e))
                    })?;
                    set.entries.push((PathBuf::from(key), entry));
                }
            }
        }

        Ok(set)
    }

    /// Render the set as four-space-indented JSON
    pub fn to_json(&self) -> BuildResult<String> {
        let mut object = Map::new();
        if let Some(description) = &self.description {
            object.insert(DESCRIPTION_KEY.to_string(), description.clone());
        }
        if let Some(archive) = &self.archive {
            object.insert(ARCHIVE_KEY.to_string(), archive.clone());
        }
        for (path, entry) in &self.entries {
            let value =
                serde_json::to_value(entry).map_err(|e| BuildError::manifest(&self.name, e))?;
            object.insert(path.to_string_lossy().into_owned(), value);
        }

        let mut buffer = Vec::new();
        let formatter = PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
        object
            .serialize(&mut serializer)
            .map_err(|e| BuildError::manifest(&self.name, e))?;

        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    /// Write the set back to `<dir>/<name>-files.json`
    pub fn save(&self, dir: &Path) -> BuildResult<()> {
        let path = dir.join(Self::file_name(&self.name));
        fs::write(&path, self.to_json()?).map_err(|e| BuildError::io(&path, e))
    }
}

/// All manifest sets of a project, in `files.json` order
#[derive(Debug, Clone, Default)]
pub struct ManifestStore {
    dir: PathBuf,
    sets: Vec<ManifestSet>,
}

impl ManifestStore {
    /// Create a store from already-loaded sets
    pub fn new(dir: impl Into<PathBuf>, sets: Vec<ManifestSet>) -> Self {
        Self {
            dir: dir.into(),
            sets,
        }
    }

    /// Load `files.json` and every set it names
    pub fn load(dir: impl AsRef<Path>) -> BuildResult<Self> {
        let dir = dir.as_ref();
        let index_path = dir.join(MANIFEST_INDEX);
        let text = fs::read_to_string(&index_path)
            .map_err(|e| BuildError::manifest_read(&index_path, e))?;
        let names: Vec<String> =
            serde_json::from_str(&text).map_err(|e| BuildError::manifest(MANIFEST_INDEX, e))?;

        let sets = names
            .iter()
            .map(|name| ManifestSet::load(dir, name))
            .collect::<BuildResult<Vec<_>>>()?;

        Ok(Self::new(dir, sets))
    }

    /// Persist every set; `files.json` itself is never rewritten
    pub fn save(&self) -> BuildResult<()> {
        self.sets.iter().try_for_each(|set| set.save(&self.dir))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn sets(&self) -> &[ManifestSet] {
        &self.sets
    }

    pub fn sets_mut(&mut self) -> &mut [ManifestSet] {
        &mut self.sets
    }

    pub fn get(&self, name: &str) -> Option<&ManifestSet> {
        self.sets.iter().find(|set| set.name == name)
    }

    /// Sets taking part in a build, leaving out the given `files.json` indices
    pub fn active_sets(&self, excluded: &[usize]) -> Vec<&ManifestSet> {
        self.sets
            .iter()
            .enumerate()
            .filter(|(index, _)| !excluded.contains(index))
            .map(|(_, set)| set)
            .collect()
    }

    /// Total number of file entries
    pub fn file_count(&self) -> usize {
        self.sets.iter().map(|set| set.entries.len()).sum()
    }
}

/// Distinct `@use` tokens across the given sets
pub fn distinct_use_tokens(sets: &[&ManifestSet]) -> BTreeSet<String> {
    sets.iter()
        .flat_map(|set| set.entries.iter())
        .flat_map(|(_, entry)| entry.use_tokens())
        .map(str::to_string)
        .collect()
}
