//! Configuration management with layered loading
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. Global config: `$XDG_CONFIG_HOME/outliner/outliner.toml`
//! 3. Local config: `<dir>/.outliner.toml`
//! 4. Environment variables: `OUTLINER__SECTION__KEY`

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use config::{Config, ConfigError, Environment};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::application::ApplicationError;

/// Which parent kinds the hierarchy resolver may produce.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HierarchySettings {
    /// Objects with a folder path resolve to their folder.
    pub show_folders: bool,
    /// Sub-objects appear under their owning object.
    pub show_components: bool,
    /// Content of nested scopes appears under the nested-scope object.
    pub show_nested_scopes: bool,
    /// Unloaded descriptors appear (partitioned domains only).
    pub show_unloaded: bool,
}

impl Default for HierarchySettings {
    fn default() -> Self {
        Self {
            show_folders: true,
            show_components: false,
            show_nested_scopes: true,
            show_unloaded: true,
        }
    }
}

/// Initial state of the built-in filters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FilterSettings {
    pub only_selected: bool,
    pub hide_temporary: bool,
    pub hide_components: bool,
    pub hide_nested_scopes: bool,
    pub hide_unloaded: bool,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            only_selected: false,
            hide_temporary: false,
            hide_components: true,
            hide_nested_scopes: false,
            hide_unloaded: false,
        }
    }
}

/// Visibility of the pin column.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PinnedColumn {
    /// Shown for partitioned domains only.
    #[default]
    Auto,
    On,
    Off,
}

impl FromStr for PinnedColumn {
    type Err = ApplicationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(PinnedColumn::Auto),
            "on" => Ok(PinnedColumn::On),
            "off" => Ok(PinnedColumn::Off),
            other => Err(ApplicationError::Config {
                message: format!("invalid pinned_column '{other}' (expected auto, on or off)"),
            }),
        }
    }
}

impl fmt::Display for PinnedColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PinnedColumn::Auto => "auto",
            PinnedColumn::On => "on",
            PinnedColumn::Off => "off",
        };
        f.write_str(name)
    }
}

/// Raw hierarchy section: `None` means "not specified, inherit".
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawHierarchySettings {
    pub show_folders: Option<bool>,
    pub show_components: Option<bool>,
    pub show_nested_scopes: Option<bool>,
    pub show_unloaded: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawFilterSettings {
    pub only_selected: Option<bool>,
    pub hide_temporary: Option<bool>,
    pub hide_components: Option<bool>,
    pub hide_nested_scopes: Option<bool>,
    pub hide_unloaded: Option<bool>,
}

/// Raw settings for intermediate parsing.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawSettings {
    pub hierarchy: RawHierarchySettings,
    pub filters: RawFilterSettings,
    pub pinned_column: Option<PinnedColumn>,
}

impl HierarchySettings {
    fn merge(&self, overlay: &RawHierarchySettings) -> Self {
        Self {
            show_folders: overlay.show_folders.unwrap_or(self.show_folders),
            show_components: overlay.show_components.unwrap_or(self.show_components),
            show_nested_scopes: overlay.show_nested_scopes.unwrap_or(self.show_nested_scopes),
            show_unloaded: overlay.show_unloaded.unwrap_or(self.show_unloaded),
        }
    }
}

impl FilterSettings {
    fn merge(&self, overlay: &RawFilterSettings) -> Self {
        Self {
            only_selected: overlay.only_selected.unwrap_or(self.only_selected),
            hide_temporary: overlay.hide_temporary.unwrap_or(self.hide_temporary),
            hide_components: overlay.hide_components.unwrap_or(self.hide_components),
            hide_nested_scopes: overlay.hide_nested_scopes.unwrap_or(self.hide_nested_scopes),
            hide_unloaded: overlay.hide_unloaded.unwrap_or(self.hide_unloaded),
        }
    }
}

/// Unified configuration for the outliner.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    pub pinned_column: PinnedColumn,
    pub hierarchy: HierarchySettings,
    pub filters: FilterSettings,
}

/// Get the XDG config directory for the outliner.
pub fn global_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "outliner").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("outliner.toml"))
}

/// Get the path to the local config file in a directory.
pub fn local_config_path(dir: &Path) -> PathBuf {
    dir.join(".outliner.toml")
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

impl Settings {
    /// Overlay wins where it specifies a value.
    pub fn merge_with(&self, overlay: &RawSettings) -> Self {
        Self {
            pinned_column: overlay.pinned_column.unwrap_or(self.pinned_column),
            hierarchy: self.hierarchy.merge(&overlay.hierarchy),
            filters: self.filters.merge(&overlay.filters),
        }
    }

    /// Load settings with layered precedence, using the XDG global file.
    pub fn load(local_dir: Option<&Path>) -> Result<Self, ApplicationError> {
        let global = global_config_path();
        Self::load_layers(global.as_deref(), local_dir)
    }

    /// Load settings from an explicit global file and local directory.
    /// Missing files are skipped.
    pub fn load_layers(global: Option<&Path>, local_dir: Option<&Path>) -> Result<Self, ApplicationError> {
        let mut current = Self::default();

        if let Some(global_path) = global {
            if global_path.exists() {
                let raw = load_raw_settings(global_path)?;
                current = current.merge_with(&raw);
            }
        }

        if let Some(dir) = local_dir {
            let local_path = local_config_path(dir);
            if local_path.exists() {
                let raw = load_raw_settings(&local_path)?;
                current = current.merge_with(&raw);
            }
        }

        Self::apply_env_overrides(current)
    }

    /// Apply OUTLINER__* environment variables as explicit overrides.
    fn apply_env_overrides(mut settings: Self) -> Result<Self, ApplicationError> {
        let builder = Config::builder().add_source(
            Environment::with_prefix("OUTLINER")
                .separator("__")
                .try_parsing(true),
        );
        let config = builder.build().map_err(config_err)?;

        let flag = |key: &str, target: &mut bool| {
            if let Ok(val) = config.get_bool(key) {
                *target = val;
            }
        };
        flag("hierarchy.show_folders", &mut settings.hierarchy.show_folders);
        flag("hierarchy.show_components", &mut settings.hierarchy.show_components);
        flag("hierarchy.show_nested_scopes", &mut settings.hierarchy.show_nested_scopes);
        flag("hierarchy.show_unloaded", &mut settings.hierarchy.show_unloaded);
        flag("filters.only_selected", &mut settings.filters.only_selected);
        flag("filters.hide_temporary", &mut settings.filters.hide_temporary);
        flag("filters.hide_components", &mut settings.filters.hide_components);
        flag("filters.hide_nested_scopes", &mut settings.filters.hide_nested_scopes);
        flag("filters.hide_unloaded", &mut settings.filters.hide_unloaded);

        if let Ok(val) = config.get_string("pinned_column") {
            settings.pinned_column = val.parse()?;
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
        r#"# outliner configuration
#
# Locations (by precedence, lowest to highest):
#   Global: ~/.config/outliner/outliner.toml
#   Local:  <dir>/.outliner.toml
#   Env:    OUTLINER__SECTION__KEY, e.g. OUTLINER__FILTERS__HIDE_TEMPORARY=true

# Pin column: auto (partitioned domains only), on, off
# pinned_column = "auto"

[hierarchy]
# show_folders = true
# show_components = false
# show_nested_scopes = true
# show_unloaded = true

[filters]
# only_selected = false
# hide_temporary = false
# hide_components = true
# hide_nested_scopes = false
# hide_unloaded = false
"#
        .to_string()
    }
}

fn config_err(e: ConfigError) -> ApplicationError {
    ApplicationError::Config {
        message: e.to_string(),
    }
}
