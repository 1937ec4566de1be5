//! File selection and staleness
//!
//! One resolution attempt walks every manifest entry in declared order,
//! evaluates its directives against an immutable [`FlagSet`] snapshot, and
//! either finishes with a [`ResolutionOutcome`] or asks for a restart with
//! one more flag. [`SelectionEngine::resolve`] repeats attempts until one is
//! stable, so every file is judged under the final flag set.

use crate::cache::ObjectCache;
use crate::compiler::CompileTask;
use crate::directive::Directive;
use crate::error::{BuildError, BuildResult};
use crate::flags::{FlagSet, ARCH_WIDTH};
use crate::manifest::{distinct_use_tokens, FileEntry, ManifestSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Files selected by one stable attempt
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionOutcome {
    /// Every file that takes part in the link, in manifest order
    pub included_files: Vec<PathBuf>,
    /// The subset of included files whose objects are stale
    pub to_compile: Vec<CompileTask>,
}

/// Result of a single resolution attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt {
    Stable(ResolutionOutcome),
    /// A `@use` directive required a missing flag; retry with this set
    Restart(FlagSet),
}

/// A stable resolution together with the flag set it was computed under
#[derive(Debug, Clone)]
pub struct Resolution {
    pub flags: FlagSet,
    pub outcome: ResolutionOutcome,
    pub restarts: usize,
}

/// What the directives of one entry decided
#[derive(Debug)]
enum Evaluation<'e> {
    Include { extra_args: Vec<String> },
    Skip,
    Require(&'e str),
}

/// Walks manifests and decides what to link and what to compile
#[derive(Debug, Clone)]
pub struct SelectionEngine {
    root: PathBuf,
    cache: ObjectCache,
}

impl SelectionEngine {
    /// `root` is the directory manifest paths are relative to
    pub fn new(root: impl Into<PathBuf>, cache: ObjectCache) -> Self {
        Self {
            root: root.into(),
            cache,
        }
    }

    pub fn cache(&self) -> &ObjectCache {
        &self.cache
    }

    /// Run attempts until one is stable.
    ///
    /// Architecture-width flags are pruned before every attempt and after the
    /// last one. Fails with [`BuildError::ResolutionDiverged`] if more restarts
    /// happen than there are distinct `@use` flags, which only conflicting
    /// requirements can cause.
    pub fn resolve(&self, sets: &[&ManifestSet], mut flags: FlagSet) -> BuildResult<Resolution> {
        let limit = distinct_use_tokens(sets).len();
        let mut restarts = 0;

        loop {
            flags.prune_exclusive(ARCH_WIDTH);
            match self.resolve_attempt(sets, &flags)? {
                Attempt::Stable(outcome) => {
                    flags.prune_exclusive(ARCH_WIDTH);
                    return Ok(Resolution {
                        flags,
                        outcome,
                        restarts,
                    });
                }
                Attempt::Restart(next) => {
                    restarts += 1;
                    if restarts > limit {
                        return Err(BuildError::ResolutionDiverged { restarts });
                    }
                    flags = next;
                }
            }
        }
    }

    /// One pass over every manifest under a fixed flag set
    pub fn resolve_attempt(&self, sets: &[&ManifestSet], flags: &FlagSet) -> BuildResult<Attempt> {
        let mut outcome = ResolutionOutcome::default();

        for set in sets {
            for (source, entry) in &set.entries {
                let extra_args = match evaluate(source, entry, flags) {
                    Evaluation::Include { extra_args } => extra_args,
                    Evaluation::Skip => continue,
                    Evaluation::Require(token) => {
                        info!(
                            "Recomputing files to compile to account for {} (required by {})",
                            token,
                            source.display()
                        );
                        let mut next = flags.clone();
                        next.add_flag(token);
                        return Ok(Attempt::Restart(next));
                    }
                };

                outcome.included_files.push(source.clone());

                let object = self.cache.object_path(source, flags);
                let dependencies: Vec<PathBuf> =
                    entry.dependencies.iter().map(|d| self.root.join(d)).collect();

                if let Some(reason) =
                    self.cache
                        .staleness(&self.root.join(source), &object, &dependencies)?
                {
                    debug!("Rebuilding {} because {}", source.display(), reason);
                    outcome.to_compile.push(CompileTask {
                        source: source.clone(),
                        extra_args,
                        include_paths: entry.include_paths.clone(),
                        object,
                        pre_build_tasks: entry.pre_build_tasks.clone(),
                        reason,
                    });
                }
            }
        }

        Ok(Attempt::Stable(outcome))
    }

    /// Object paths of the included files, in link order
    pub fn object_paths(&self, outcome: &ResolutionOutcome, flags: &FlagSet) -> Vec<PathBuf> {
        outcome
            .included_files
            .iter()
            .map(|source| self.cache.object_path(source, flags))
            .collect()
    }
}

/// Evaluate an entry's directives left to right
fn evaluate<'e>(source: &Path, entry: &'e FileEntry, flags: &FlagSet) -> Evaluation<'e> {
    let mut extra_args = Vec::new();

    for directive in &entry.additional_flags {
        match directive {
            Directive::Flags(group) => {
                if !group.admits_build_type(flags.build_type()) {
                    debug!(
                        "Skipping file {} because build type is \"{}\"",
                        source.display(),
                        flags.build_type()
                    );
                    return Evaluation::Skip;
                }
            }
            Directive::Options(group) => {
                if !group.admits_flags(flags) {
                    debug!(
                        "Skipping file {} because active flags do not match \"{}\"",
                        source.display(),
                        group
                    );
                    return Evaluation::Skip;
                }
            }
            Directive::Use(token) => {
                if !flags.has_flag(token) {
                    return Evaluation::Require(token);
                }
            }
            Directive::RawArg(arg) => extra_args.push(arg.clone()),
        }
    }

    Evaluation::Include { extra_args }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directive::Group;

    fn entry(directives: &[&str]) -> FileEntry {
        directives
            .iter()
            .fold(FileEntry::new(), |e, d| e.with_directive(d.parse().unwrap()))
    }

    #[test]
    fn test_evaluate_collects_raw_args() {
        let flags = FlagSet::new("native", "gcc");
        let e = entry(&["-Wno-unused", "@flags=native", "-DX"]);
        match evaluate(Path::new("a.c"), &e, &flags) {
            Evaluation::Include { extra_args } => {
                assert_eq!(extra_args, vec!["-Wno-unused", "-DX"])
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_evaluate_skip_precedes_later_use() {
        let flags = FlagSet::new("native", "gcc");
        let e = entry(&["@flags=gtk", "@use=-fPIC"]);
        assert!(matches!(evaluate(Path::new("a.c"), &e, &flags), Evaluation::Skip));
    }

    #[test]
    fn test_evaluate_use_requires_missing_flag() {
        let flags = FlagSet::new("native", "gcc");
        let e = entry(&["@use=-fPIC"]);
        assert!(matches!(
            evaluate(Path::new("a.c"), &e, &flags),
            Evaluation::Require("-fPIC")
        ));

        let flags = flags.with_flags(["-fPIC"]);
        assert!(matches!(
            evaluate(Path::new("a.c"), &e, &flags),
            Evaluation::Include { .. }
        ));
    }

    #[test]
    fn test_evaluate_options() {
        let flags = FlagSet::new("native", "gcc").with_flags(["-m32"]);
        let keep = FileEntry::new().with_directive(Directive::Options(Group::parse("-m32")));
        let drop = FileEntry::new().with_directive(Directive::Options(Group::parse("!-m32")));
        assert!(matches!(evaluate(Path::new("a.c"), &keep, &flags), Evaluation::Include { .. }));
        assert!(matches!(evaluate(Path::new("a.c"), &drop, &flags), Evaluation::Skip));
    }
}
