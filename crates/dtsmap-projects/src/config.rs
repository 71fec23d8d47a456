//! Workspace configuration: defaults, optional TOML file, environment overrides

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable naming an optional TOML config file.
pub const CONFIG_ENV: &str = "DTSMAP_CONFIG";
/// Environment variable overriding the work directory.
pub const WORK_DIR_ENV: &str = "WORK_DIR";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Where projects live and how their repositories are fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Root of all state; projects go under `<work_dir>/projects`.
    pub work_dir: PathBuf,
    /// Directory inside a checkout holding the device-tree sources.
    pub dts_subdir: String,
    /// Name of the checkout directory inside a project.
    pub checkout_dir: String,
    /// Branch pulled in sparse mode.
    pub branch: String,
    /// Sparse checkout of `dts_subdir` instead of a shallow full clone.
    pub sparse_checkout: bool,
    /// Git executable.
    pub git_program: PathBuf,
    /// Repository key → clone URL.
    pub repos: BTreeMap<String, String>,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        let repos = BTreeMap::from([
            (
                "linux".to_string(),
                "https://git.kernel.org/pub/scm/linux/kernel/git/torvalds/linux.git".to_string(),
            ),
            (
                "linux-next".to_string(),
                "https://git.kernel.org/pub/scm/linux/kernel/git/next/linux-next.git".to_string(),
            ),
        ]);
        WorkspaceConfig {
            work_dir: PathBuf::from("work"),
            dts_subdir: "arch/arm64/boot/dts/qcom".to_string(),
            checkout_dir: "linux".to_string(),
            branch: "master".to_string(),
            sparse_checkout: true,
            git_program: PathBuf::from("git"),
            repos,
        }
    }
}

impl WorkspaceConfig {
    /// Parse a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: WorkspaceConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Build from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup: the file named by
    /// `DTSMAP_CONFIG` if any, then `WORK_DIR` on top.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = match lookup(CONFIG_ENV) {
            Some(path) if !path.is_empty() => Self::load(Path::new(&path))?,
            _ => Self::default(),
        };
        if let Some(work_dir) = lookup(WORK_DIR_ENV).filter(|v| !v.is_empty()) {
            config.work_dir = PathBuf::from(work_dir);
        }
        tracing::debug!(work_dir = %config.work_dir.display(), "workspace configuration loaded");
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.repos.is_empty() {
            return Err(ConfigError::Invalid("at least one repository is required".into()));
        }
        if self.checkout_dir.is_empty() || self.checkout_dir.contains(['/', '\\']) {
            return Err(ConfigError::Invalid(format!(
                "checkout_dir must be a plain directory name, got {:?}",
                self.checkout_dir
            )));
        }
        Ok(())
    }

    pub fn projects_dir(&self) -> PathBuf {
        self.work_dir.join("projects")
    }

    pub fn repo_url(&self, key: &str) -> Option<&str> {
        self.repos.get(key).map(String::as_str)
    }

    /// Key used when a project does not name its repository.
    pub fn default_repo(&self) -> &str {
        if self.repos.contains_key("linux") {
            "linux"
        } else {
            self.repos.keys().next().map_or("linux", String::as_str)
        }
    }
}
