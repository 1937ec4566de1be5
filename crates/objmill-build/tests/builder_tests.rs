//! End-to-end builds driven by fake compiler scripts
#![cfg(unix)]

use objmill_build::{
    BuildConfig, BuildError, BuildResult, Builder, DependencyScanner, ManifestStore,
    VariantConfig,
};
use pretty_assertions::assert_eq;
use serial_test::serial;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Records its arguments, fails for any `*bad*.c` source, touches `-o` otherwise
const FAKE_CC: &str = r#"echo "cc $*" >> "$(dirname "$0")/calls.log"
out=""
fail=""
while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift ;;
    *bad*.c) fail=1 ;;
  esac
  shift
done
if [ -n "$fail" ]; then exit 1; fi
if [ -n "$out" ]; then : > "$out"; fi
exit 0
"#;

const FAKE_LD: &str = r#"echo "ld $*" >> "$(dirname "$0")/calls.log"
while [ $# -gt 0 ]; do
  if [ "$1" = "-o" ]; then : > "$2"; fi
  shift
done
exit 0
"#;

struct Project {
    dir: TempDir,
    cc: PathBuf,
    ld: PathBuf,
}

impl Project {
    fn new(manifest: &str, sources: &[&str]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let build = dir.path().join("build");
        fs::create_dir_all(&build).unwrap();
        fs::write(build.join("files.json"), r#"["core"]"#).unwrap();
        fs::write(build.join("core-files.json"), manifest).unwrap();

        for source in sources {
            let path = dir.path().join(source);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "int x;\n").unwrap();
        }

        let tools = dir.path().join("tools");
        fs::create_dir_all(&tools).unwrap();
        let cc = write_script(&tools, "cc", FAKE_CC);
        let ld = write_script(&tools, "ld", FAKE_LD);
        Self { dir, cc, ld }
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn builder(&self) -> Builder {
        let variant = VariantConfig {
            compiler: self.cc.to_string_lossy().into_owned(),
            final_tool: self.ld.to_string_lossy().into_owned(),
            ..VariantConfig::plain("native")
        };
        Builder::new(BuildConfig::new(self.root()))
            .unwrap()
            .with_variant(variant)
    }

    fn calls(&self) -> Vec<String> {
        fs::read_to_string(self.root().join("tools/calls.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn link_calls(&self) -> usize {
        self.calls().iter().filter(|c| c.starts_with("ld ")).count()
    }
}

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}", body)).unwrap();
    let mut permissions = fs::metadata(&path).unwrap().permissions();
    permissions.set_mode(0o755);
    fs::set_permissions(&path, permissions).unwrap();
    path
}

const TWO_FILES: &str = r#"{
    "src/a.c": { "include_paths": ["include"] },
    "src/b.c": { "additional_flags": ["-DB"] }
}"#;

#[test]
#[serial]
fn test_build_compiles_and_links() {
    let project = Project::new(TWO_FILES, &["src/a.c", "src/b.c"]);

    let context = project.builder().build().unwrap();

    assert_eq!(context.stats.total_files, 2);
    assert_eq!(context.stats.compiled_files, 2);
    assert_eq!(context.output, PathBuf::from("halfix"));
    assert!(project.root().join("halfix").exists());

    let calls = project.calls();
    assert_eq!(calls.len(), 3);
    // compile processes run concurrently, so their log lines may interleave
    let compile_a = calls.iter().find(|c| c.contains("src/a.c")).unwrap();
    assert!(compile_a.contains("src/a.c -c -o"));
    assert!(compile_a.ends_with("-Iinclude"));
    let compile_b = calls.iter().find(|c| c.contains("src/b.c")).unwrap();
    assert!(compile_b.contains("src/b.c -DB -c -o"));

    let link = &calls[2];
    assert!(link.starts_with("ld "));
    assert!(link.contains("-o halfix"));
    assert!(link.ends_with("-lSDL -lSDLmain -lm -lz"));

    for task in &context.outcome.to_compile {
        assert!(task.object.exists(), "{}", task.object.display());
    }
}

#[test]
#[serial]
fn test_second_build_compiles_nothing_but_still_links() {
    let project = Project::new(TWO_FILES, &["src/a.c", "src/b.c"]);
    let builder = project.builder();

    let first = builder.build().unwrap();
    let second = builder.build().unwrap();

    assert_eq!(first.stats.compiled_files, 2);
    assert_eq!(second.stats.compiled_files, 0);
    assert!(second.outcome.to_compile.is_empty());
    assert_eq!(second.outcome.included_files.len(), 2);
    assert_eq!(project.link_calls(), 2);
}

#[test]
#[serial]
fn test_failures_are_collected_in_order_and_skip_link() {
    let manifest = r#"{
        "src/bad_one.c": {},
        "src/good.c": {},
        "src/bad_two.c": {}
    }"#;
    let project = Project::new(manifest, &["src/bad_one.c", "src/good.c", "src/bad_two.c"]);

    let err = project.builder().build().unwrap_err();

    match err {
        BuildError::CompilationFailed { failures } => assert_eq!(
            failures,
            vec![PathBuf::from("src/bad_one.c"), PathBuf::from("src/bad_two.c")]
        ),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(project.link_calls(), 0);
}

#[test]
#[serial]
fn test_bounded_jobs_keep_submission_order() {
    let manifest = r#"{
        "src/bad_one.c": {},
        "src/a.c": {},
        "src/b.c": {},
        "src/bad_two.c": {},
        "src/c.c": {}
    }"#;
    let project = Project::new(
        manifest,
        &["src/bad_one.c", "src/a.c", "src/b.c", "src/bad_two.c", "src/c.c"],
    );

    let err = project.builder().with_jobs(Some(2)).build().unwrap_err();

    match err {
        BuildError::CompilationFailed { failures } => assert_eq!(
            failures,
            vec![PathBuf::from("src/bad_one.c"), PathBuf::from("src/bad_two.c")]
        ),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
#[serial]
fn test_missing_compiler_is_a_compile_failure() {
    let project = Project::new(r#"{ "src/a.c": {} }"#, &["src/a.c"]);
    let variant = VariantConfig {
        compiler: project.root().join("tools/nope").to_string_lossy().into_owned(),
        ..VariantConfig::plain("native")
    };

    let err = project.builder().with_variant(variant).build().unwrap_err();
    assert!(matches!(err, BuildError::CompilationFailed { ref failures } if failures.len() == 1));
}

#[test]
#[serial]
fn test_link_failure_is_fatal() {
    let project = Project::new(r#"{ "src/a.c": {} }"#, &["src/a.c"]);
    let failing_ld = write_script(&project.root().join("tools"), "failing-ld", "exit 2\n");
    let variant = VariantConfig {
        compiler: project.cc.to_string_lossy().into_owned(),
        final_tool: failing_ld.to_string_lossy().into_owned(),
        ..VariantConfig::plain("native")
    };

    let err = project.builder().with_variant(variant).build().unwrap_err();
    assert!(matches!(err, BuildError::LinkFailed { status: 2, .. }));
}

#[test]
#[serial]
fn test_pre_build_tasks_run_only_for_stale_files() {
    let manifest = r#"{
        "src/a.c": { "tasks": ["echo generated >> tasks.log"] }
    }"#;
    let project = Project::new(manifest, &["src/a.c"]);
    let builder = project.builder();

    let first = builder.build().unwrap();
    builder.build().unwrap();

    assert_eq!(first.stats.tasks_run, 1);
    let log = fs::read_to_string(project.root().join("tasks.log")).unwrap();
    assert_eq!(log, "generated\n");
}

#[test]
#[serial]
fn test_use_restart_is_counted() {
    let manifest = r#"{
        "src/a.c": {},
        "src/pic.c": { "additional_flags": ["@use=-fPIC"] }
    }"#;
    let project = Project::new(manifest, &["src/a.c", "src/pic.c"]);

    let context = project.builder().build().unwrap();

    assert_eq!(context.stats.restarts, 1);
    assert!(context.flags.has_flag("-fPIC"));
    let calls = project.calls();
    assert!(calls
        .iter()
        .filter(|c| c.starts_with("cc "))
        .all(|c| c.contains("-fPIC")));
}

#[test]
#[serial]
fn test_clean_removes_objects() {
    let project = Project::new(TWO_FILES, &["src/a.c", "src/b.c"]);
    let builder = project.builder();
    builder.build().unwrap();

    assert_eq!(builder.clean().unwrap(), 2);
    assert_eq!(builder.clean().unwrap(), 0);

    let rebuilt = builder.build().unwrap();
    assert_eq!(rebuilt.stats.compiled_files, 2);
}

#[test]
#[serial]
fn test_archive_mode() {
    let project = Project::new(TWO_FILES, &["src/a.c", "src/b.c"]);
    let ar = write_script(&project.root().join("tools"), "ar", FAKE_LD);
    let variant = VariantConfig {
        compiler: project.cc.to_string_lossy().into_owned(),
        final_tool: ar.to_string_lossy().into_owned(),
        output: Some(PathBuf::from("libcore.a")),
        ..VariantConfig::plain("native")
    };

    project.builder().with_variant(variant).build().unwrap();

    let calls = project.calls();
    let archive = calls.last().unwrap();
    assert!(archive.starts_with("ld rcs libcore.a "), "{archive}");
    assert!(!archive.contains("-lSDL"));
}

struct FixedScanner;

impl DependencyScanner for FixedScanner {
    fn scan(&self, source: &Path, include_paths: &[PathBuf]) -> BuildResult<String> {
        let mut rule = format!("x.o: {} \\\n", source.display());
        for include in include_paths {
            rule.push_str(&format!("  {}/common.h \\\n", include.display()));
        }
        rule.push_str("  config.h\n");
        Ok(rule)
    }
}

#[test]
#[serial]
fn test_redep_rewrites_dependencies() {
    let manifest = r#"{
    "description": "Core emulator files",
    "src/a.c": {
        "dependencies": ["stale.h"],
        "additional_flags": ["@flags=native|gtk"],
        "include_paths": ["include"]
    },
    "src/b.c": {}
}"#;
    let project = Project::new(manifest, &["src/a.c", "src/b.c"]);

    let scanned = project.builder().redep_with(&FixedScanner).unwrap();
    assert_eq!(scanned, 2);

    let store = ManifestStore::load(project.root().join("build")).unwrap();
    let core = store.get("core").unwrap();
    assert_eq!(
        core.entries[0].1.dependencies,
        vec![PathBuf::from("include/common.h"), PathBuf::from("config.h")]
    );
    assert_eq!(core.entries[1].1.dependencies, vec![PathBuf::from("config.h")]);
    assert!(core.description.is_some());

    let text = fs::read_to_string(project.root().join("build/core-files.json")).unwrap();
    assert!(text.contains("\n    \"src/a.c\": {\n        \"dependencies\""), "{text}");
    assert!(text.contains("\"@flags=native|gtk\""));
}
