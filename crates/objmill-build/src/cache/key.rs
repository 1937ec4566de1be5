//! Object cache key derivation
//!
//! An object file name is `<dir-hash>-<stem>-<flag-id>.o`. The flag id is a
//! 64-bit mask laid out as:
//!
//! ```text
//! bit 63      architecture width (-m32)
//! bits 32..63 hash of the variant name
//! bits 0..32  one bit per tracked feature
//! ```
//!
//! Everything is computed from the source path and the flag set alone, so
//! the key never depends on manifest iteration order.

use crate::error::{BuildError, BuildResult};
use crate::flags::FlagSet;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;

/// Number of feature bits available below the variant hash
pub const MAX_TRACKED_FEATURES: usize = 32;

const VARIANT_SHIFT: u32 = 32;
const VARIANT_MASK: u64 = 0x7fff_ffff;
const ARCH_32_BIT: u64 = 1 << 63;
const ARCH_32_FLAG: &str = "-m32";

/// Something about the invocation that changes the produced object
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackedFeature {
    /// A flag token is active
    Flag(String),
    /// The compiler has this name
    Compiler(String),
}

impl TrackedFeature {
    fn is_active(&self, flags: &FlagSet) -> bool {
        match self {
            Self::Flag(token) => flags.has_flag(token),
            Self::Compiler(name) => flags.compiler() == name,
        }
    }
}

fn default_features() -> Vec<TrackedFeature> {
    let flag = |t: &str| TrackedFeature::Flag(t.to_string());
    vec![
        flag("-g3"),
        flag("-O0"),
        flag("-O1"),
        flag("-O2"),
        flag("-O3"),
        TrackedFeature::Compiler("emcc".to_string()),
        flag("-pie"),
        flag("-DINSTRUMENT"),
        flag("-O"),
        flag("-DLIBCPU"),
        flag("SIDE_MODULE=1"),
        flag("-fPIC"),
    ]
}

/// Cache key of one object file
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectCacheKey {
    dir_hash: String,
    stem: String,
    flag_id: u64,
}

impl ObjectCacheKey {
    pub fn flag_id(&self) -> u64 {
        self.flag_id
    }

    /// File name inside the cache directory
    pub fn file_name(&self) -> String {
        format!("{}.o", self)
    }
}

impl fmt::Display for ObjectCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.dir_hash, self.stem, base36(self.flag_id))
    }
}

/// Derives [`ObjectCacheKey`]s from a table of tracked features
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDeriver {
    features: Vec<TrackedFeature>,
}

impl KeyDeriver {
    pub fn new() -> Self {
        Self {
            features: default_features(),
        }
    }

    /// Track additional flag tokens, each taking the next free bit
    pub fn with_tracked_flags(mut self, tokens: &[String]) -> BuildResult<Self> {
        for token in tokens {
            let feature = TrackedFeature::Flag(token.clone());
            if !self.features.contains(&feature) {
                self.features.push(feature);
            }
        }

        if self.features.len() > MAX_TRACKED_FEATURES {
            return Err(BuildError::TooManyTrackedFlags {
                count: self.features.len(),
                max: MAX_TRACKED_FEATURES,
            });
        }

        Ok(self)
    }

    pub fn features(&self) -> &[TrackedFeature] {
        &self.features
    }

    /// Flag-derived part of the key
    pub fn flag_id(&self, flags: &FlagSet) -> u64 {
        let mut id = self
            .features
            .iter()
            .enumerate()
            .filter(|(_, feature)| feature.is_active(flags))
            .fold(0u64, |id, (bit, _)| id | (1 << bit));

        id |= (hash_prefix(flags.variant()) & VARIANT_MASK) << VARIANT_SHIFT;

        if flags.has_flag(ARCH_32_FLAG) {
            id |= ARCH_32_BIT;
        }

        id
    }

    pub fn derive(&self, source: &Path, flags: &FlagSet) -> ObjectCacheKey {
        let dir = source
            .parent()
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .unwrap_or_default();

        ObjectCacheKey {
            dir_hash: base36(hash_prefix(&dir) & 0xffff_ffff),
            stem: object_stem(source),
            flag_id: self.flag_id(flags),
        }
    }
}

impl Default for KeyDeriver {
    fn default() -> Self {
        Self::new()
    }
}

/// File name with a trailing `.c` removed
fn object_stem(source: &Path) -> String {
    let name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match name.strip_suffix(".c") {
        Some(stem) if !stem.is_empty() => stem.to_string(),
        _ => name,
    }
}

/// First eight bytes of the SHA-256 digest, big-endian
fn hash_prefix(text: &str) -> u64 {
    let digest = Sha256::digest(text.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix)
}

fn base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }

    let mut digits = Vec::new();
    while value > 0 {
        digits.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    digits.iter().rev().map(|&d| d as char).collect()
}
