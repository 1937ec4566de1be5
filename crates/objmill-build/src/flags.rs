//! Flag resolution
//!
//! A [`FlagSet`] is the ordered list of compiler flags for one invocation,
//! together with the variant it was built for, the build type matched by
//! `@flags` directives and the compiler name. It only grows during resolution; the one exception is
//! exclusive-group pruning, where the most recently appended member wins.

use std::fmt;

/// Architecture-width flags; at most one may be active
pub const ARCH_WIDTH: &[&str] = &["-m32", "-m64"];

/// Ordered compiler flags plus the scalar settings they were built from
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FlagSet {
    tokens: Vec<String>,
    variant: String,
    build_type: String,
    compiler: String,
}

impl FlagSet {
    /// Create an empty flag set for the given build type and compiler
    pub fn new(build_type: impl Into<String>, compiler: impl Into<String>) -> Self {
        Self {
            tokens: Vec::new(),
            variant: String::new(),
            build_type: build_type.into(),
            compiler: compiler.into(),
        }
    }

    /// Name the variant these flags belong to
    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = variant.into();
        self
    }

    /// Append tokens unconditionally
    pub fn with_flags<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extend(tokens);
        self
    }

    /// Append a token even if it is already present.
    ///
    /// Used while assembling the initial set, where repeated option
    /// prefixes such as `-s` are legitimate.
    pub fn push(&mut self, token: impl Into<String>) {
        self.tokens.push(token.into());
    }

    pub fn extend<I, S>(&mut self, tokens: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tokens.extend(tokens.into_iter().map(Into::into));
    }

    /// Append a token unless it is already present. Returns whether it was added.
    pub fn add_flag(&mut self, token: impl Into<String>) -> bool {
        let token = token.into();
        if self.has_flag(&token) {
            return false;
        }
        self.tokens.push(token);
        true
    }

    /// Remove the first occurrence of a token. Returns whether it was present.
    pub fn remove_flag(&mut self, token: &str) -> bool {
        match self.tokens.iter().position(|t| t == token) {
            Some(index) => {
                self.tokens.remove(index);
                true
            }
            None => false,
        }
    }

    /// Replace every occurrence of `from` with `to`
    pub fn replace_flag(&mut self, from: &str, to: &str) {
        for token in self.tokens.iter_mut().filter(|t| t.as_str() == from) {
            *token = to.to_string();
        }
    }

    pub fn has_flag(&self, token: &str) -> bool {
        self.tokens.iter().any(|t| t == token)
    }

    /// Keep only the most recently appended member of an exclusive group
    pub fn prune_exclusive(&mut self, group: &[&str]) {
        let Some(last) = self
            .tokens
            .iter()
            .rposition(|t| group.contains(&t.as_str()))
        else {
            return;
        };

        let mut index = 0;
        self.tokens.retain(|t| {
            let keep = index == last || !group.contains(&t.as_str());
            index += 1;
            keep
        });
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Variant name, falling back to the build type when none was given
    pub fn variant(&self) -> &str {
        if self.variant.is_empty() {
            &self.build_type
        } else {
            &self.variant
        }
    }

    /// Variant identifier matched by `@flags` directives
    pub fn build_type(&self) -> &str {
        &self.build_type
    }

    pub fn compiler(&self) -> &str {
        &self.compiler
    }

    pub fn set_compiler(&mut self, compiler: impl Into<String>) {
        self.compiler = compiler.into();
    }
}

impl fmt::Display for FlagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tokens.join(" "))
    }
}
