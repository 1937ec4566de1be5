//! Build variants and initial flag construction
//!
//! A variant names a target configuration: its build type (what `@flags`
//! directives match against), the compiler and final tool, extra compiler
//! and link-only flags, pkg-config packages, and manifest sets to leave out.
//! Built-in variants can be overridden and new ones defined in
//! `objmill.toml`.

use crate::error::{BuildError, BuildResult};
use crate::flags::FlagSet;
use objmill_config::VariantOverride;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// Variant used when none is named
pub const DEFAULT_VARIANT: &str = "native";

/// Compiler and final tool of variants that do not name their own
pub const DEFAULT_COMPILER: &str = "gcc";

/// Output path when neither the variant nor the caller picks one
pub const DEFAULT_OUTPUT: &str = "halfix";

/// Flags every build starts from
pub const BASE_FLAGS: &[&str] = &["-Wall", "-Wextra", "-Werror", "-g3", "-std=c99"];

/// Link-only flags every build starts from
pub const BASE_END_FLAGS: &[&str] = &["-lSDL", "-lSDLmain", "-lm", "-lz"];

const DEBUG_FLAG: &str = "-g3";
const BUILTIN_NAMES: &[&str] = &[
    "native",
    "gtk",
    "win32",
    "libcpu",
    "libcpu-wasm",
    "emscripten",
];

/// Optimization level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptLevel {
    /// Plain `-O`
    Bare,
    /// `-O<n>`
    Level(u8),
}

impl OptLevel {
    pub fn flag(&self) -> String {
        match self {
            Self::Bare => "-O".to_string(),
            Self::Level(n) => format!("-O{}", n),
        }
    }
}

impl Default for OptLevel {
    fn default() -> Self {
        Self::Level(0)
    }
}

/// Target pointer width
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchWidth {
    Bits32,
    Bits64,
}

impl ArchWidth {
    pub fn flag(&self) -> &'static str {
        match self {
            Self::Bits32 => "-m32",
            Self::Bits64 => "-m64",
        }
    }
}

/// Per-invocation build switches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions {
    pub optimization: OptLevel,
    pub arch_width: Option<ArchWidth>,
    pub debug_info: bool,
    /// Adds `-DINSTRUMENT`
    pub instrument: bool,
    /// Adds `-pg` at link time
    pub profile: bool,
    /// Emit WebAssembly from the emscripten variant
    pub enable_wasm: bool,
    pub output: Option<PathBuf>,
    /// Sets both compiler and final tool
    pub cc: Option<String>,
    /// Sets only the final tool
    pub fincc: Option<String>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            optimization: OptLevel::default(),
            arch_width: None,
            debug_info: true,
            instrument: false,
            profile: false,
            enable_wasm: false,
            output: None,
            cc: None,
            fincc: None,
        }
    }
}

impl BuildOptions {
    /// `-O3` without debug info
    pub fn release(mut self) -> Self {
        self.optimization = OptLevel::Level(3);
        self.debug_info = false;
        self
    }
}

/// Flags reported by pkg-config for a variant's packages
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PkgFlags {
    pub cflags: Vec<String>,
    pub libs: Vec<String>,
}

impl PkgFlags {
    /// Run `pkg-config --cflags` and `--libs` for `packages`
    pub fn query(packages: &[String]) -> BuildResult<Self> {
        if packages.is_empty() {
            return Ok(Self::default());
        }
        Ok(Self {
            cflags: pkg_config("--cflags", packages)?,
            libs: pkg_config("--libs", packages)?,
        })
    }
}

fn pkg_config(mode: &str, packages: &[String]) -> BuildResult<Vec<String>> {
    let output = Command::new("pkg-config")
        .arg(mode)
        .args(packages)
        .output()
        .map_err(|e| BuildError::spawn("pkg-config", e))?;

    if !output.status.success() {
        return Err(BuildError::PkgConfig {
            packages: packages.join(" "),
            error: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let flags: Vec<String> = String::from_utf8_lossy(&output.stdout)
        .split_whitespace()
        .map(str::to_string)
        .collect();
    debug!("pkg-config {} {}: {}", mode, packages.join(" "), flags.join(" "));
    Ok(flags)
}

/// A fully resolved build variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantConfig {
    pub name: String,
    pub build_type: String,
    pub compiler: String,
    pub final_tool: String,
    pub flags: Vec<String>,
    pub end_flags: Vec<String>,
    pub pkg_config: Vec<String>,
    /// Indices into `files.json`
    pub exclude_manifests: Vec<usize>,
    pub output: Option<PathBuf>,
}

impl VariantConfig {
    /// A gcc variant with no extras whose build type is its name
    pub fn plain(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            build_type: name.clone(),
            name,
            compiler: DEFAULT_COMPILER.to_string(),
            final_tool: DEFAULT_COMPILER.to_string(),
            flags: Vec::new(),
            end_flags: Vec::new(),
            pkg_config: Vec::new(),
            exclude_manifests: Vec::new(),
            output: None,
        }
    }

    /// Names of the variants that need no configuration
    pub fn builtin_names() -> &'static [&'static str] {
        BUILTIN_NAMES
    }

    pub fn builtin(name: &str) -> Option<Self> {
        let mut variant = Self::plain(name);
        match name {
            "native" => {}
            "gtk" => variant.pkg_config = strings(&["gtk+-3.0"]),
            "win32" => variant.end_flags = strings(&["-lgdi32", "-lcomdlg32"]),
            "libcpu" => {
                variant.flags = strings(&["-fPIC", "-shared", "-DLIBCPU"]);
                variant.exclude_manifests = vec![0, 2];
            }
            "libcpu-wasm" => {
                variant.build_type = "libcpu".to_string();
                variant.compiler = "emcc".to_string();
                variant.final_tool = "emcc".to_string();
                variant.flags = strings(&["-fPIC", "-s", "SIDE_MODULE=1", "-DLIBCPU"]);
                variant.exclude_manifests = vec![0, 2];
                variant.output = Some(PathBuf::from("libcpu.wasm"));
            }
            "emscripten" => {
                variant.compiler = "emcc".to_string();
                variant.final_tool = "emcc".to_string();
                variant.end_flags =
                    strings(&["-s", "NO_FILESYSTEM=1", "-s", "TOTAL_MEMORY=256MB"]);
                variant.output = Some(PathBuf::from("halfix.js"));
            }
            _ => return None,
        }
        Some(variant)
    }

    /// Resolve `name` against the built-ins and configured overrides
    pub fn resolve(name: &str, overrides: &BTreeMap<String, VariantOverride>) -> BuildResult<Self> {
        Self::resolve_chain(name, overrides, &mut Vec::new())
    }

    fn resolve_chain(
        name: &str,
        overrides: &BTreeMap<String, VariantOverride>,
        seen: &mut Vec<String>,
    ) -> BuildResult<Self> {
        if seen.iter().any(|s| s == name) {
            return Err(BuildError::VariantCycle {
                variant: seen.first().cloned().unwrap_or_default(),
                via: name.to_string(),
            });
        }
        seen.push(name.to_string());

        let Some(config) = overrides.get(name) else {
            return Self::builtin(name).ok_or_else(|| BuildError::UnknownVariant(name.to_string()));
        };

        let mut variant = match &config.inherits {
            Some(parent) => {
                let mut base = Self::resolve_chain(parent, overrides, seen)?;
                base.name = name.to_string();
                base.build_type = name.to_string();
                base
            }
            None => Self::builtin(name).unwrap_or_else(|| Self::plain(name)),
        };
        variant.merge_override(config);
        Ok(variant)
    }

    /// Apply configured fields; flag lists are appended, everything else replaced
    pub fn merge_override(&mut self, config: &VariantOverride) {
        if let Some(build_type) = &config.build_type {
            self.build_type = build_type.clone();
        }
        if let Some(compiler) = &config.compiler {
            self.compiler = compiler.clone();
        }
        if let Some(final_tool) = &config.final_tool {
            self.final_tool = final_tool.clone();
        }
        if let Some(flags) = &config.flags {
            self.flags.extend(flags.iter().cloned());
        }
        if let Some(end_flags) = &config.end_flags {
            self.end_flags.extend(end_flags.iter().cloned());
        }
        if let Some(packages) = &config.pkg_config {
            self.pkg_config = packages.clone();
        }
        if let Some(excluded) = &config.exclude_manifests {
            self.exclude_manifests = excluded.clone();
        }
        if let Some(output) = &config.output {
            self.output = Some(output.clone());
        }
    }

    /// Swap configured toolchain compilers in where the variant still uses
    /// the default. Variants with their own compiler, such as emcc, keep it.
    pub fn apply_toolchain(&mut self, cc: Option<&str>, fincc: Option<&str>) {
        if let Some(cc) = cc {
            if self.compiler == DEFAULT_COMPILER {
                self.compiler = cc.to_string();
            }
        }
        if let Some(tool) = fincc.or(cc) {
            if self.final_tool == DEFAULT_COMPILER {
                self.final_tool = tool.to_string();
            }
        }
    }

    /// Every built-in and configured variant, sorted by name
    pub fn all(overrides: &BTreeMap<String, VariantOverride>) -> BuildResult<Vec<Self>> {
        let mut names: Vec<&str> = BUILTIN_NAMES.to_vec();
        names.extend(overrides.keys().map(String::as_str));
        names.sort_unstable();
        names.dedup();
        names
            .into_iter()
            .map(|name| Self::resolve(name, overrides))
            .collect()
    }

    pub fn is_builtin(&self) -> bool {
        BUILTIN_NAMES.contains(&self.name.as_str())
    }

    /// Final artifact path
    pub fn output(&self, options: &BuildOptions) -> PathBuf {
        options
            .output
            .clone()
            .or_else(|| self.output.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT))
    }

    /// Compiler after command-line overrides
    pub fn compiler(&self, options: &BuildOptions) -> String {
        options.cc.clone().unwrap_or_else(|| self.compiler.clone())
    }

    /// Final tool after command-line overrides
    pub fn final_tool(&self, options: &BuildOptions) -> String {
        options
            .fincc
            .clone()
            .or_else(|| options.cc.clone())
            .unwrap_or_else(|| self.final_tool.clone())
    }

    /// The flag set resolution starts from
    pub fn initial_flags(&self, options: &BuildOptions, pkg: &PkgFlags) -> FlagSet {
        let output = self.output(options);
        let mut flags = FlagSet::new(&self.build_type, self.compiler(options))
            .with_variant(&self.name)
            .with_flags(BASE_FLAGS.iter().copied());

        if cfg!(target_endian = "big") {
            flags.push("-DCFG_BIG_ENDIAN");
        }
        flags.extend(self.flags.iter().cloned());
        flags.extend(pkg.cflags.iter().cloned());

        if let Some(width) = options.arch_width {
            flags.push(width.flag());
        }
        if options.instrument {
            flags.push("-DINSTRUMENT");
        }
        if !options.debug_info {
            flags.remove_flag(DEBUG_FLAG);
        }
        if self.build_type == "emscripten" {
            flags.replace_flag("-std=c99", "-std=gnu99");
        }
        if self.build_type == "libcpu" && has_extension(&output, "js") {
            flags.remove_flag("-shared");
            flags.extend(["-s", "STANDALONE_WASM=1"]);
        }

        flags.push(format!(
            "-D{}_BUILD",
            self.build_type.to_uppercase().replace('-', "_")
        ));
        flags.push(options.optimization.flag());
        flags
    }

    /// Trailing link-only flags
    pub fn end_flags(&self, options: &BuildOptions, pkg: &PkgFlags) -> Vec<String> {
        let output = self.output(options);
        let mut end_flags = strings(BASE_END_FLAGS);
        end_flags.extend(pkg.libs.iter().cloned());
        end_flags.extend(self.end_flags.iter().cloned());

        if options.profile {
            end_flags.push("-pg".to_string());
        }
        if self.build_type == "emscripten" {
            end_flags.push("-s".to_string());
            end_flags.push(format!("WASM={}", u8::from(options.enable_wasm)));
        }
        if has_extension(&output, "js") || has_extension(&output, "wasm") {
            end_flags.retain(|f| f != "-lSDLmain" && f != "-lz");
        }
        end_flags
    }
}

impl fmt::Display for VariantConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (build type {}, {} / {})",
            self.name, self.build_type, self.compiler, self.final_tool
        )
    }
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension().is_some_and(|e| e == extension)
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
