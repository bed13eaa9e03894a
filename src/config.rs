//! Configuration management with layered loading
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. Global config: `$XDG_CONFIG_HOME/wastetree/wastetree.toml`
//! 3. Local config: `<project_dir>/.wastetree.toml`
//! 4. Environment variables: `WASTETREE__*` prefix

use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::application::ApplicationError;
use crate::domain::{DeletedPolicy, PathPolicy};

/// Tree build settings.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TreeSettings {
    /// How stored materialized paths are validated at load
    pub path_policy: PathPolicy,
}

/// Scope resolution settings.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScopeSettings {
    /// Keep soft-deleted points in effective scopes (historical reports)
    pub include_deleted: bool,
}

impl ScopeSettings {
    pub fn deleted_policy(&self) -> DeletedPolicy {
        DeletedPolicy::from_include_deleted(self.include_deleted)
    }
}

/// Rollup settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RollupSettings {
    /// Roll up independent tenants in parallel
    pub parallel: bool,
}

impl Default for RollupSettings {
    fn default() -> Self {
        Self { parallel: true }
    }
}

/// Raw settings for intermediate parsing (`None` means "not specified, inherit").
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawSettings {
    pub data_file: Option<PathBuf>,
    pub tree: RawTreeSettings,
    pub scope: RawScopeSettings,
    pub rollup: RawRollupSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawTreeSettings {
    pub path_policy: Option<PathPolicy>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawScopeSettings {
    pub include_deleted: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawRollupSettings {
    pub parallel: Option<bool>,
}

/// Unified configuration for wastetree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// JSON dataset with points, registrations and project scopes
    pub data_file: PathBuf,
    pub tree: TreeSettings,
    pub scope: ScopeSettings,
    pub rollup: RollupSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_file: default_data_file(),
            tree: TreeSettings::default(),
            scope: ScopeSettings::default(),
            rollup: RollupSettings::default(),
        }
    }
}

/// Default dataset location (XDG data dir).
fn default_data_file() -> PathBuf {
    ProjectDirs::from("", "", "wastetree")
        .map(|dirs| dirs.data_dir().join("points.json"))
        .unwrap_or_else(|| PathBuf::from("~/.wastetree/points.json"))
}

/// Get the XDG config directory for wastetree.
pub fn global_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "wastetree").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("wastetree.toml"))
}

/// Get the path to the local config file in a project directory.
pub fn local_config_path(project_dir: &Path) -> PathBuf {
    project_dir.join(".wastetree.toml")
}

/// Load a TOML file into RawSettings for manual merging.
fn load_raw_settings(path: &Path) -> Result<RawSettings, ApplicationError> {
    let content = std::fs::read_to_string(path).map_err(|e| ApplicationError::Config {
        message: format!("read {}: {}", path.display(), e),
    })?;
    toml::from_str(&content).map_err(|e| ApplicationError::Config {
        message: format!("parse {}: {}", path.display(), e),
    })
}

/// Expand `~`, `$VAR` and `${VAR}` in a path string.
pub fn expand_env_vars(path: &str) -> String {
    shellexpand::full(path)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| path.to_string())
}

impl Settings {
    fn expand_paths(&mut self) {
        let expanded = expand_env_vars(self.data_file.to_string_lossy().as_ref());
        self.data_file = PathBuf::from(expanded);
    }

    /// Overlay wins where it specifies a value.
    fn merge_with(&self, overlay: &RawSettings) -> Self {
        Self {
            data_file: overlay
                .data_file
                .clone()
                .unwrap_or_else(|| self.data_file.clone()),
            tree: TreeSettings {
                path_policy: overlay.tree.path_policy.unwrap_or(self.tree.path_policy),
            },
            scope: ScopeSettings {
                include_deleted: overlay
                    .scope
                    .include_deleted
                    .unwrap_or(self.scope.include_deleted),
            },
            rollup: RollupSettings {
                parallel: overlay.rollup.parallel.unwrap_or(self.rollup.parallel),
            },
        }
    }

    /// Load settings with layered precedence.
    ///
    /// # Arguments
    /// * `project_dir` - Optional directory holding a local `.wastetree.toml`
    pub fn load(project_dir: Option<&Path>) -> Result<Self, ApplicationError> {
        let mut current = Self::default();

        if let Some(global_path) = global_config_path() {
            if global_path.exists() {
                current = current.merge_with(&load_raw_settings(&global_path)?);
            }
        }

        if let Some(dir) = project_dir {
            let local_path = local_config_path(dir);
            if local_path.exists() {
                current = current.merge_with(&load_raw_settings(&local_path)?);
            }
        }

        current = Self::apply_env_overrides(current)?;
        current.expand_paths();

        Ok(current)
    }

    /// Load from one explicit file on top of the defaults (no global, no env).
    pub fn load_file(path: &Path) -> Result<Self, ApplicationError> {
        let mut settings = Self::default().merge_with(&load_raw_settings(path)?);
        settings.expand_paths();
        Ok(settings)
    }

    /// Apply WASTETREE__* environment variables as explicit overrides.
    fn apply_env_overrides(mut settings: Self) -> Result<Self, ApplicationError> {
        let config = Config::builder()
            .add_source(Environment::with_prefix("WASTETREE").separator("__"))
            .build()
            .map_err(config_err)?;

        if let Ok(val) = config.get_string("data_file") {
            settings.data_file = PathBuf::from(val);
        }
        if let Ok(val) = config.get_string("tree.path_policy") {
            settings.tree.path_policy = parse_path_policy(&val)?;
        }
        if let Ok(val) = config.get_bool("scope.include_deleted") {
            settings.scope.include_deleted = val;
        }
        if let Ok(val) = config.get_bool("rollup.parallel") {
            settings.rollup.parallel = val;
        }

        Ok(settings)
    }

    /// Show the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ApplicationError> {
        toml::to_string_pretty(self).map_err(|e| ApplicationError::Config {
            message: format!("serialize config: {e}"),
        })
    }

    /// Generate a template config file.
    pub fn template() -> String {
        r#"# wastetree configuration
#
# Locations (by precedence, lowest to highest):
#   Global: ~/.config/wastetree/wastetree.toml
#   Local:  <project_dir>/.wastetree.toml
#   Env:    WASTETREE__* environment variables, e.g. WASTETREE__SCOPE__INCLUDE_DELETED=true

# JSON dataset with points, registrations and scopes
# data_file = "~/.local/share/wastetree/points.json"

[tree]
# verify:    keep stored paths, fail rollups of customers with drifted paths
# recompute: replace stored paths with the ones derived from parent links
# strict:    refuse to build a tenant whose stored paths disagree
# path_policy = "verify"

[scope]
# Keep soft-deleted points in effective scopes (historical reports)
# include_deleted = false

[rollup]
# Roll up independent customers in parallel
# parallel = true
"#
        .to_string()
    }
}

fn parse_path_policy(val: &str) -> Result<PathPolicy, ApplicationError> {
    match val.to_ascii_lowercase().as_str() {
        "verify" => Ok(PathPolicy::Verify),
        "recompute" => Ok(PathPolicy::Recompute),
        "strict" => Ok(PathPolicy::Strict),
        other => Err(ApplicationError::Config {
            message: format!("invalid tree.path_policy: {other}"),
        }),
    }
}

fn config_err(e: ConfigError) -> ApplicationError {
    ApplicationError::Config {
        message: e.to_string(),
    }
}
