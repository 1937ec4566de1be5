//! Final link or archive step

use crate::error::{BuildError, BuildResult};
use crate::flags::FlagSet;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::info;

/// Default archiver; a final tool with this name produces a static archive
pub const DEFAULT_ARCHIVER: &str = "ar";

/// How the final artifact is produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkMode {
    /// `<tool> <flags> -o <output> <objects> <end flags>`
    Link,
    /// `<archiver> rcs <output> <objects>`
    Archive,
}

impl LinkMode {
    /// Pick the mode from the final tool's file name
    pub fn for_tool(tool: &str, archiver: &str) -> Self {
        let name = Path::new(tool)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(tool);
        if name == archiver {
            LinkMode::Archive
        } else {
            LinkMode::Link
        }
    }
}

/// Runs the final tool over every included object
#[derive(Debug, Clone)]
pub struct Linker {
    tool: String,
    mode: LinkMode,
    working_dir: PathBuf,
}

impl Linker {
    pub fn new(tool: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        let tool = tool.into();
        let mode = LinkMode::for_tool(&tool, DEFAULT_ARCHIVER);
        Self {
            tool,
            mode,
            working_dir: working_dir.into(),
        }
    }

    /// Override the archiver name used to detect archive mode
    pub fn with_archiver(mut self, archiver: &str) -> Self {
        self.mode = LinkMode::for_tool(&self.tool, archiver);
        self
    }

    pub fn mode(&self) -> LinkMode {
        self.mode
    }

    pub fn tool(&self) -> &str {
        &self.tool
    }

    /// Arguments for the final command
    pub fn arguments(
        &self,
        flags: &FlagSet,
        end_flags: &[String],
        objects: &[PathBuf],
        output: &Path,
    ) -> Vec<String> {
        let objects = objects.iter().map(|o| o.to_string_lossy().into_owned());
        match self.mode {
            LinkMode::Link => flags
                .tokens()
                .iter()
                .flat_map(|t| t.split_whitespace())
                .map(str::to_string)
                .chain(["-o".to_string(), output.to_string_lossy().into_owned()])
                .chain(objects)
                .chain(
                    end_flags
                        .iter()
                        .flat_map(|t| t.split_whitespace())
                        .map(str::to_string),
                )
                .collect(),
            LinkMode::Archive => ["rcs".to_string(), output.to_string_lossy().into_owned()]
                .into_iter()
                .chain(objects)
                .collect(),
        }
    }

    /// Produce `output` from `objects`
    pub fn link(
        &self,
        flags: &FlagSet,
        end_flags: &[String],
        objects: &[PathBuf],
        output: &Path,
    ) -> BuildResult<()> {
        let args = self.arguments(flags, end_flags, objects, output);
        info!("{} {}", self.tool, args.join(" "));

        let status = Command::new(&self.tool)
            .args(&args)
            .current_dir(&self.working_dir)
            .status()
            .map_err(|e| BuildError::spawn(&self.tool, e))?;

        if !status.success() {
            return Err(BuildError::LinkFailed {
                tool: self.tool.clone(),
                output: output.to_path_buf(),
                status: status.code().unwrap_or(-1),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_mode_detection() {
        assert_eq!(LinkMode::for_tool("gcc", "ar"), LinkMode::Link);
        assert_eq!(LinkMode::for_tool("ar", "ar"), LinkMode::Archive);
        assert_eq!(LinkMode::for_tool("/usr/bin/ar", "ar"), LinkMode::Archive);
        assert_eq!(LinkMode::for_tool("emar", "emar"), LinkMode::Archive);
        assert_eq!(LinkMode::for_tool("emar", "ar"), LinkMode::Link);
    }

    #[test]
    fn test_link_arguments() {
        let linker = Linker::new("gcc", ".");
        let flags = FlagSet::new("native", "gcc").with_flags(["-Wall", "-O2"]);
        let args = linker.arguments(
            &flags,
            &["-lSDL".to_string(), "-lm".to_string()],
            &[PathBuf::from("objs/a.o"), PathBuf::from("objs/b.o")],
            Path::new("halfix"),
        );
        assert_eq!(
            args,
            vec!["-Wall", "-O2", "-o", "halfix", "objs/a.o", "objs/b.o", "-lSDL", "-lm"]
        );
    }

    #[test]
    fn test_archive_arguments_skip_flags() {
        let linker = Linker::new("ar", ".");
        let flags = FlagSet::new("native", "gcc").with_flags(["-Wall"]);
        let args = linker.arguments(
            &flags,
            &["-lm".to_string()],
            &[PathBuf::from("a.o")],
            Path::new("libcpu.a"),
        );
        assert_eq!(args, vec!["rcs", "libcpu.a", "a.o"]);
    }

    #[test]
    fn test_with_archiver_overrides_detection() {
        let linker = Linker::new("llvm-ar", ".").with_archiver("llvm-ar");
        assert_eq!(linker.mode(), LinkMode::Archive);
    }
}
