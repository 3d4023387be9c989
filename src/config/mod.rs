use crate::error::{LoaderError, Result};
use crate::path::{self, PathResolver};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Loader configuration, read from `~/.shine/loader.yaml` by default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Path pattern used to locate native libraries
    #[serde(default = "default_library_path")]
    pub library_path: String,

    /// Asset root substituted for `{assets}`
    #[serde(default = "default_assets_dir")]
    pub assets_dir: String,

    /// Project root substituted for `{project}`; one level above the assets
    /// when unset
    #[serde(default)]
    pub project_dir: Option<String>,

    /// Development build root substituted for `{devel}`
    #[serde(default)]
    pub devel_dir: Option<String>,

    #[serde(default)]
    pub lifecycle: LifecycleConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Load every registered library when the host enables or resumes
    #[serde(default = "default_true")]
    pub load_on_enable: bool,

    /// Unload every library when the host pauses
    #[serde(default)]
    pub unload_on_pause: bool,
}

fn default_library_path() -> String {
    path::default_pattern().to_string()
}

fn default_assets_dir() -> String {
    "Assets".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            library_path: default_library_path(),
            assets_dir: default_assets_dir(),
            project_dir: None,
            devel_dir: None,
            lifecycle: LifecycleConfig::default(),
        }
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            load_on_enable: true,
            unload_on_pause: false,
        }
    }
}

impl LoaderConfig {
    /// Load configuration from default location
    pub fn load_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| LoaderError::Config {
            message: format!("failed to read {}: {}", path.display(), e),
        })?;

        serde_yaml::from_str(&contents).map_err(|e| LoaderError::Config {
            message: format!("failed to parse {}: {}", path.display(), e),
        })
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let contents = serde_yaml::to_string(self).map_err(|e| LoaderError::Config {
            message: format!("failed to serialize config: {e}"),
        })?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| LoaderError::Config {
                message: format!("failed to create {}: {}", parent.display(), e),
            })?;
        }

        fs::write(path, contents).map_err(|e| LoaderError::Config {
            message: format!("failed to write {}: {}", path.display(), e),
        })
    }

    /// Get default configuration path
    pub fn default_config_path() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or_else(|| LoaderError::Config {
            message: "failed to get home directory".to_string(),
        })?;

        Ok(home.join(".shine").join("loader.yaml"))
    }

    /// Path resolver for these settings.
    #[must_use]
    pub fn resolver(&self) -> PathResolver {
        let project = self
            .project_dir
            .clone()
            .unwrap_or_else(|| path::project_root(&self.assets_dir));
        let devel = self
            .devel_dir
            .clone()
            .unwrap_or_else(|| path::devel_root(&self.assets_dir));
        PathResolver::new(&self.library_path, &self.assets_dir, project, devel)
    }
}
