//! Per-file manifest directives
//!
//! Each string in a file entry's `additional_flags` is either a directive
//! (starting with `@`) or a raw compiler argument. Directives are parsed once
//! when the manifest is loaded:
//!
//! - `@flags=gtk|win32|!libcpu` keeps the file only for the listed build types
//! - `@options=-m32|!-DLIBCPU` keeps the file only when the listed flags are active
//! - `@use=-fPIC` requires a flag; resolution restarts if it is missing

use crate::error::{BuildError, BuildResult};
use crate::flags::FlagSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Prefix marking a directive
pub const DIRECTIVE_SIGIL: char = '@';

/// One entry of a file's `additional_flags`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Directive {
    /// Build-type filter
    Flags(Group),
    /// Active-flag filter
    Options(Group),
    /// Required flag
    Use(String),
    /// Extra compiler argument for this file only
    RawArg(String),
}

/// A `|`-separated list of names, each optionally negated with `!`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Group {
    parts: Vec<GroupPart>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum GroupPart {
    Include(String),
    Exclude(String),
}

impl Group {
    pub fn parse(text: &str) -> Self {
        let parts = text
            .split('|')
            .filter(|part| !part.is_empty())
            .map(|part| match part.strip_prefix('!') {
                Some(name) => GroupPart::Exclude(name.to_string()),
                None => GroupPart::Include(part.to_string()),
            })
            .collect();
        Self { parts }
    }

    pub fn allowed(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().filter_map(|part| match part {
            GroupPart::Include(name) => Some(name.as_str()),
            GroupPart::Exclude(_) => None,
        })
    }

    pub fn excluded(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().filter_map(|part| match part {
            GroupPart::Exclude(name) => Some(name.as_str()),
            GroupPart::Include(_) => None,
        })
    }

    /// `@flags` semantics: the build type must be listed (an empty
    /// allow-list admits every build type) and must not be excluded.
    pub fn admits_build_type(&self, build_type: &str) -> bool {
        let mut allowed = self.allowed().peekable();
        let listed = allowed.peek().is_none() || allowed.any(|name| name == build_type);
        listed && !self.excluded().any(|name| name == build_type)
    }

    /// `@options` semantics: every listed flag must be active and no
    /// excluded flag may be active.
    pub fn admits_flags(&self, flags: &FlagSet) -> bool {
        self.allowed().all(|flag| flags.has_flag(flag))
            && !self.excluded().any(|flag| flags.has_flag(flag))
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .parts
            .iter()
            .map(|part| match part {
                GroupPart::Include(name) => name.clone(),
                GroupPart::Exclude(name) => format!("!{}", name),
            })
            .collect();
        write!(f, "{}", parts.join("|"))
    }
}

impl Directive {
    pub fn is_directive(&self) -> bool {
        !matches!(self, Self::RawArg(_))
    }
}

impl FromStr for Directive {
    type Err = BuildError;

    fn from_str(text: &str) -> BuildResult<Self> {
        if !text.starts_with(DIRECTIVE_SIGIL) {
            return Ok(Self::RawArg(text.to_string()));
        }

        let (keyword, value) = match text.split_once('=') {
            Some((keyword, value)) => (keyword, Some(value)),
            None => (text, None),
        };

        match keyword {
            "@flags" => Ok(Self::Flags(Group::parse(value.unwrap_or("")))),
            "@options" => Ok(Self::Options(Group::parse(value.unwrap_or("")))),
            "@use" => match value {
                Some(token) if !token.is_empty() => Ok(Self::Use(token.to_string())),
                _ => Err(BuildError::directive(text, "@use requires a flag")),
            },
            _ => Err(BuildError::directive(
                text,
                format!("unknown directive keyword '{}'", keyword),
            )),
        }
    }
}

impl TryFrom<String> for Directive {
    type Error = BuildError;

    fn try_from(text: String) -> BuildResult<Self> {
        text.parse()
    }
}

impl From<Directive> for String {
    fn from(directive: Directive) -> Self {
        directive.to_string()
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flags(group) => write!(f, "@flags={}", group),
            Self::Options(group) => write!(f, "@options={}", group),
            Self::Use(token) => write!(f, "@use={}", token),
            Self::RawArg(arg) => write!(f, "{}", arg),
        }
    }
}
