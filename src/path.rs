//! Library path pattern expansion.
//!
//! A path pattern is a plain string containing zero or more macros:
//!
//! - `{name}`: the logical library name
//! - `{assets}`: the asset root
//! - `{project}`: the project root, one level above the assets
//! - `{devel}`: the development build output directory
//!
//! Expansion is plain substitution of every occurrence. Tokens that are not
//! one of the macros above are left in the result untouched.

use std::path::PathBuf;

pub const NAME_MACRO: &str = "{name}";
pub const ASSETS_MACRO: &str = "{assets}";
pub const PROJECT_MACRO: &str = "{project}";
pub const DEVEL_MACRO: &str = "{devel}";

/// Default pattern for the running platform.
#[must_use]
pub fn default_pattern() -> &'static str {
    #[cfg(windows)]
    {
        "{devel}/{name}.dll"
    }
    #[cfg(target_os = "macos")]
    {
        "{assets}/Plugins/{name}.dylib"
    }
    #[cfg(not(any(windows, target_os = "macos")))]
    {
        "{assets}/Plugins/{name}.so"
    }
}

/// Expand `pattern` for `library`.
#[must_use]
pub fn resolve(pattern: &str, library: &str, assets: &str, project: &str, devel: &str) -> String {
    pattern
        .replace(NAME_MACRO, library)
        .replace(ASSETS_MACRO, assets)
        .replace(PROJECT_MACRO, project)
        .replace(DEVEL_MACRO, devel)
}

/// A path pattern together with the roots its macros expand to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathResolver {
    pattern: String,
    assets: String,
    project: String,
    devel: String,
}

impl PathResolver {
    #[must_use]
    pub fn new(
        pattern: impl Into<String>,
        assets: impl Into<String>,
        project: impl Into<String>,
        devel: impl Into<String>,
    ) -> Self {
        Self {
            pattern: pattern.into(),
            assets: assets.into(),
            project: project.into(),
            devel: devel.into(),
        }
    }

    /// Build a resolver whose project and development roots are derived
    /// from the asset root.
    #[must_use]
    pub fn from_assets(pattern: impl Into<String>, assets: impl Into<String>) -> Self {
        let assets = assets.into();
        let project = project_root(&assets);
        let devel = devel_root(&assets);
        Self::new(pattern, assets, project, devel)
    }

    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn set_pattern(&mut self, pattern: impl Into<String>) {
        self.pattern = pattern.into();
    }

    #[must_use]
    pub fn assets(&self) -> &str {
        &self.assets
    }

    #[must_use]
    pub fn project(&self) -> &str {
        &self.project
    }

    #[must_use]
    pub fn devel(&self) -> &str {
        &self.devel
    }

    /// Expand the pattern for `library`.
    #[must_use]
    pub fn resolve(&self, library: &str) -> PathBuf {
        PathBuf::from(self.resolve_str(library))
    }

    #[must_use]
    pub fn resolve_str(&self, library: &str) -> String {
        resolve(
            &self.pattern,
            library,
            &self.assets,
            &self.project,
            &self.devel,
        )
    }
}

impl Default for PathResolver {
    fn default() -> Self {
        Self::from_assets(default_pattern(), "Assets")
    }
}

/// Project root for an asset directory.
#[must_use]
pub fn project_root(assets: &str) -> String {
    format!("{assets}/..")
}

/// Development build directory for an asset directory.
#[must_use]
pub fn devel_root(assets: &str) -> String {
    format!("{assets}/../../../target/debug")
}

/// Brace-delimited tokens still present in an expanded path.
///
/// Only used for diagnostics; an unknown token is never an error.
#[must_use]
pub fn unresolved_macros(expanded: &str) -> Vec<&str> {
    let mut found = Vec::new();
    let mut rest = expanded;
    while let Some(start) = rest.find('{') {
        let tail = &rest[start..];
        match tail.find('}') {
            Some(end) => {
                found.push(&tail[..=end]);
                rest = &tail[end + 1..];
            }
            None => break,
        }
    }
    found
}
