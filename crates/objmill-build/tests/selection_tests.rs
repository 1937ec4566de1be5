//! Resolution tests against manifests on disk

use objmill_build::{
    BuildError, FlagSet, ManifestStore, ObjectCache, SelectionEngine, StaleReason,
};
use pretty_assertions::assert_eq;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

/// Create a project with one manifest set named `core` and empty sources
fn create_project(manifest: &str, sources: &[&str]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let build = dir.path().join("build");
    fs::create_dir_all(&build).unwrap();
    fs::write(build.join("files.json"), r#"["core"]"#).unwrap();
    fs::write(build.join("core-files.json"), manifest).unwrap();

    for source in sources {
        let path = dir.path().join(source);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, "int x;\n").unwrap();
    }
    dir
}

fn engine(dir: &TempDir) -> SelectionEngine {
    SelectionEngine::new(dir.path(), ObjectCache::new(dir.path().join("build/objs")))
}

fn set_mtime(path: &Path, time: SystemTime) {
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(time)
        .unwrap();
}

fn paths(items: &[&str]) -> Vec<PathBuf> {
    items.iter().map(PathBuf::from).collect()
}

const GTK_MANIFEST: &str = r#"{
    "a.c": { "dependencies": [], "additional_flags": [], "include_paths": [] },
    "b.c": { "dependencies": [], "additional_flags": ["@flags=gtk"], "include_paths": [] }
}"#;

#[test]
fn test_native_excludes_gtk_only_file() {
    let dir = create_project(GTK_MANIFEST, &["a.c", "b.c"]);
    let store = ManifestStore::load(dir.path().join("build")).unwrap();

    let resolution = engine(&dir)
        .resolve(&store.active_sets(&[]), FlagSet::new("native", "gcc"))
        .unwrap();

    assert_eq!(resolution.outcome.included_files, paths(&["a.c"]));
    assert_eq!(resolution.outcome.to_compile.len(), 1);
    assert_eq!(resolution.restarts, 0);
}

#[test]
fn test_gtk_includes_both_files() {
    let dir = create_project(GTK_MANIFEST, &["a.c", "b.c"]);
    let store = ManifestStore::load(dir.path().join("build")).unwrap();

    let resolution = engine(&dir)
        .resolve(&store.active_sets(&[]), FlagSet::new("gtk", "gcc"))
        .unwrap();

    assert_eq!(resolution.outcome.included_files, paths(&["a.c", "b.c"]));
    assert_eq!(resolution.outcome.to_compile.len(), 2);
    assert!(resolution
        .outcome
        .to_compile
        .iter()
        .all(|task| task.reason == StaleReason::MissingObject));
}

#[test]
fn test_negated_build_type() {
    let manifest = r#"{
        "a.c": { "additional_flags": ["@flags=!gtk"] },
        "b.c": {}
    }"#;
    let dir = create_project(manifest, &["a.c", "b.c"]);
    let store = ManifestStore::load(dir.path().join("build")).unwrap();
    let sets = store.active_sets(&[]);

    for (build_type, expected) in [
        ("native", vec!["a.c", "b.c"]),
        ("win32", vec!["a.c", "b.c"]),
        ("gtk", vec!["b.c"]),
    ] {
        let resolution = engine(&dir)
            .resolve(&sets, FlagSet::new(build_type, "gcc"))
            .unwrap();
        assert_eq!(resolution.outcome.included_files, paths(&expected), "{build_type}");
    }
}

#[test]
fn test_use_restarts_and_reevaluates_earlier_files() {
    let manifest = r#"{
        "shared.c": { "additional_flags": ["@options=-fPIC"] },
        "a.c": { "additional_flags": ["-DA"] },
        "pic.c": { "additional_flags": ["@use=-fPIC"] }
    }"#;
    let dir = create_project(manifest, &["shared.c", "a.c", "pic.c"]);
    let store = ManifestStore::load(dir.path().join("build")).unwrap();
    let engine = engine(&dir);

    let resolution = engine
        .resolve(&store.active_sets(&[]), FlagSet::new("native", "gcc").with_flags(["-O0"]))
        .unwrap();

    assert_eq!(resolution.restarts, 1);
    assert!(resolution.flags.has_flag("-fPIC"));
    // shared.c was skipped on the first pass and must be picked up on the second
    assert_eq!(
        resolution.outcome.included_files,
        paths(&["shared.c", "a.c", "pic.c"])
    );

    for task in &resolution.outcome.to_compile {
        assert_eq!(
            task.object,
            engine.cache().object_path(&task.source, &resolution.flags)
        );
    }
    let a = &resolution.outcome.to_compile[1];
    assert_eq!(a.extra_args, vec!["-DA".to_string()]);
}

#[test]
fn test_use_of_present_flag_is_noop() {
    let manifest = r#"{ "pic.c": { "additional_flags": ["@use=-fPIC"] } }"#;
    let dir = create_project(manifest, &["pic.c"]);
    let store = ManifestStore::load(dir.path().join("build")).unwrap();

    let flags = FlagSet::new("libcpu", "gcc").with_flags(["-fPIC", "-O2"]);
    let resolution = engine(&dir)
        .resolve(&store.active_sets(&[]), flags.clone())
        .unwrap();

    assert_eq!(resolution.restarts, 0);
    assert_eq!(resolution.flags, flags);
}

#[test]
fn test_use_of_arch_width_replaces_previous_width() {
    let manifest = r#"{
        "a.c": { "additional_flags": ["@use=-m32"] },
        "b.c": { "additional_flags": ["@options=-m32"] },
        "c.c": { "additional_flags": ["@options=-m64"] }
    }"#;
    let dir = create_project(manifest, &["a.c", "b.c", "c.c"]);
    let store = ManifestStore::load(dir.path().join("build")).unwrap();

    let resolution = engine(&dir)
        .resolve(
            &store.active_sets(&[]),
            FlagSet::new("native", "gcc").with_flags(["-m64"]),
        )
        .unwrap();

    assert!(resolution.flags.has_flag("-m32"));
    assert!(!resolution.flags.has_flag("-m64"));
    assert_eq!(resolution.outcome.included_files, paths(&["a.c", "b.c"]));
}

#[test]
fn test_conflicting_requirements_diverge() {
    let manifest = r#"{
        "a.c": { "additional_flags": ["@use=-m32"] },
        "b.c": { "additional_flags": ["@use=-m64"] }
    }"#;
    let dir = create_project(manifest, &["a.c", "b.c"]);
    let store = ManifestStore::load(dir.path().join("build")).unwrap();

    let err = engine(&dir)
        .resolve(&store.active_sets(&[]), FlagSet::new("native", "gcc"))
        .unwrap_err();

    assert!(matches!(err, BuildError::ResolutionDiverged { restarts: 3 }));
}

#[test]
fn test_excluded_manifest_sets_are_skipped() {
    let dir = create_project(r#"{ "a.c": {} }"#, &["a.c", "cpu.c"]);
    let build = dir.path().join("build");
    fs::write(build.join("files.json"), r#"["core", "cpu"]"#).unwrap();
    fs::write(build.join("cpu-files.json"), r#"{ "cpu.c": {} }"#).unwrap();
    let store = ManifestStore::load(&build).unwrap();

    let resolution = engine(&dir)
        .resolve(&store.active_sets(&[0]), FlagSet::new("libcpu", "gcc"))
        .unwrap();

    assert_eq!(resolution.outcome.included_files, paths(&["cpu.c"]));
}

#[test]
fn test_fresh_object_is_not_recompiled_until_dependency_changes() {
    let manifest = r#"{
        "src/a.c": { "dependencies": ["include/a.h"], "include_paths": ["include"] }
    }"#;
    let dir = create_project(manifest, &["src/a.c", "include/a.h"]);
    let store = ManifestStore::load(dir.path().join("build")).unwrap();
    let sets = store.active_sets(&[]);
    let engine = engine(&dir);
    let flags = FlagSet::new("native", "gcc").with_flags(["-O0"]);

    let base = SystemTime::now() - Duration::from_secs(3600);
    set_mtime(&dir.path().join("src/a.c"), base);
    set_mtime(&dir.path().join("include/a.h"), base);

    let object = engine.cache().object_path(Path::new("src/a.c"), &flags);
    engine.cache().ensure_dir().unwrap();
    fs::write(&object, "obj").unwrap();
    set_mtime(&object, base + Duration::from_secs(10));

    let resolution = engine.resolve(&sets, flags.clone()).unwrap();
    assert_eq!(resolution.outcome.included_files, paths(&["src/a.c"]));
    assert!(resolution.outcome.to_compile.is_empty());

    set_mtime(&dir.path().join("include/a.h"), base + Duration::from_secs(20));

    let resolution = engine.resolve(&sets, flags).unwrap();
    assert_eq!(resolution.outcome.to_compile.len(), 1);
    let task = &resolution.outcome.to_compile[0];
    assert_eq!(task.source, PathBuf::from("src/a.c"));
    assert_eq!(task.include_paths, paths(&["include"]));
    assert_eq!(
        task.reason,
        StaleReason::DependencyNewer(dir.path().join("include/a.h"))
    );
}

#[test]
fn test_source_newer_than_object() {
    let dir = create_project(r#"{ "a.c": {} }"#, &["a.c"]);
    let store = ManifestStore::load(dir.path().join("build")).unwrap();
    let engine = engine(&dir);
    let flags = FlagSet::new("native", "gcc");

    let base = SystemTime::now() - Duration::from_secs(3600);
    let object = engine.cache().object_path(Path::new("a.c"), &flags);
    engine.cache().ensure_dir().unwrap();
    fs::write(&object, "obj").unwrap();
    set_mtime(&object, base);
    set_mtime(&dir.path().join("a.c"), base + Duration::from_secs(5));

    let resolution = engine.resolve(&store.active_sets(&[]), flags).unwrap();
    assert_eq!(resolution.outcome.to_compile[0].reason, StaleReason::SourceNewer);
}

#[test]
fn test_different_flags_use_different_objects() {
    let dir = create_project(r#"{ "a.c": {} }"#, &["a.c"]);
    let store = ManifestStore::load(dir.path().join("build")).unwrap();
    let engine = engine(&dir);
    let sets = store.active_sets(&[]);

    let debug = engine
        .resolve(&sets, FlagSet::new("native", "gcc").with_flags(["-g3", "-O0"]))
        .unwrap();
    let release = engine
        .resolve(&sets, FlagSet::new("native", "gcc").with_flags(["-O3"]))
        .unwrap();

    assert_ne!(
        debug.outcome.to_compile[0].object,
        release.outcome.to_compile[0].object
    );
}

#[test]
fn test_malformed_manifest_names_the_set() {
    let dir = create_project(r#"{ "a.c": { "additional_flags": ["@bogus=1"] } }"#, &["a.c"]);
    let err = ManifestStore::load(dir.path().join("build")).unwrap_err();
    assert!(err.is_configuration());
    assert!(err.to_string().contains("core"), "{err}");
}
