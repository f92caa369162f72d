//! Configuration management with layered loading
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. Global config: `$XDG_CONFIG_HOME/augtree/augtree.toml`
//! 3. Local config: `<dir>/.augtree.toml`
//! 4. Environment variables: `AUGTREE_*` prefix

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use config::{Config, ConfigError, Environment};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::application::{ApplicationError, IoResultExt};
use crate::util::path::expand_env_vars;

/// What `save` does with a modified file.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SaveMode {
    /// Replace the file in place.
    #[default]
    Overwrite,
    /// Keep the original as `<file>.augsave`.
    Backup,
    /// Write `<file>.augnew`, leave the original alone.
    NewFile,
    /// Compute the changes but write nothing.
    Noop,
}

impl SaveMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SaveMode::Overwrite => "overwrite",
            SaveMode::Backup => "backup",
            SaveMode::NewFile => "newfile",
            SaveMode::Noop => "noop",
        }
    }
}

impl fmt::Display for SaveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SaveMode {
    type Err = ApplicationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "overwrite" => Ok(SaveMode::Overwrite),
            "backup" => Ok(SaveMode::Backup),
            "newfile" => Ok(SaveMode::NewFile),
            "noop" => Ok(SaveMode::Noop),
            other => Err(ApplicationError::Config {
                message: format!("unknown save mode: {other}"),
            }),
        }
    }
}

/// Raw settings for intermediate parsing (everything optional to detect
/// "not specified").
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawSettings {
    pub root: Option<PathBuf>,
    pub loadpath: Option<Vec<String>>,
    pub context: Option<String>,
    pub save_mode: Option<SaveMode>,
    pub enable_span: Option<bool>,
    pub autoload: Option<bool>,
    pub load_on_open: Option<bool>,
}

/// Unified configuration for augtree sessions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Filesystem root all file paths are resolved against (default: /)
    pub root: PathBuf,
    /// Directories searched for lens modules
    pub loadpath: Vec<String>,
    /// Context for relative path expressions (default: /files)
    pub context: String,
    pub save_mode: SaveMode,
    /// Record source spans while loading
    pub enable_span: bool,
    /// Register the lens engine's default transforms on open
    pub autoload: bool,
    /// Load all files on open
    pub load_on_open: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/"),
            loadpath: Vec::new(),
            context: "/files".into(),
            save_mode: SaveMode::Overwrite,
            enable_span: false,
            autoload: true,
            load_on_open: true,
        }
    }
}

/// Get the XDG config directory for augtree.
pub fn global_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "augtree").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("augtree.toml"))
}

/// Get the path to the local config file in a directory.
pub fn local_config_path(dir: &Path) -> PathBuf {
    dir.join(".augtree.toml")
}

/// Load a TOML file into RawSettings for manual merging.
fn load_raw_settings(path: &Path) -> Result<RawSettings, ApplicationError> {
    let content = std::fs::read_to_string(path).with_path_context("read config", path)?;
    toml::from_str(&content).map_err(|e| ApplicationError::Config {
        message: format!("parse {}: {}", path.display(), e),
    })
}

/// Merge arrays with union semantics and negation support.
///
/// - Items from overlay are appended to base, keeping first-seen order
/// - Items prefixed with `!` remove the corresponding item from the result
/// - Duplicates are dropped
///
/// ```ignore
/// merge_array(&["a", "b"], &["c"])       // → ["a", "b", "c"]
/// merge_array(&["a", "b"], &["!a", "c"]) // → ["b", "c"]
/// ```
pub fn merge_array(base: &[String], overlay: &[String]) -> Vec<String> {
    let mut result: Vec<String> = Vec::new();
    for item in base {
        if !result.contains(item) {
            result.push(item.clone());
        }
    }
    for item in overlay {
        if let Some(negated) = item.strip_prefix('!') {
            result.retain(|r| r != negated);
        } else if !result.contains(item) {
            result.push(item.clone());
        }
    }
    result
}

impl Settings {
    /// Expand shell variables and tilde in path-like fields.
    fn expand_paths(&mut self) {
        let expanded = expand_env_vars(self.root.to_string_lossy().as_ref());
        self.root = PathBuf::from(expanded);
        self.loadpath = self.loadpath.iter().map(|p| expand_env_vars(p)).collect();
    }

    /// Merge overlay config onto self (base) with union semantics for arrays.
    fn merge_with(&self, overlay: &RawSettings) -> Self {
        Self {
            loadpath: overlay
                .loadpath
                .as_ref()
                .map(|o| merge_array(&self.loadpath, o))
                .unwrap_or_else(|| self.loadpath.clone()),
            ..self.apply_scalars(overlay)
        }
    }

    /// Apply global config onto defaults with REPLACE semantics for arrays.
    fn apply_global(&self, global: &RawSettings) -> Self {
        Self {
            loadpath: global
                .loadpath
                .clone()
                .unwrap_or_else(|| self.loadpath.clone()),
            ..self.apply_scalars(global)
        }
    }

    fn apply_scalars(&self, raw: &RawSettings) -> Self {
        Self {
            root: raw.root.clone().unwrap_or_else(|| self.root.clone()),
            loadpath: self.loadpath.clone(),
            context: raw.context.clone().unwrap_or_else(|| self.context.clone()),
            save_mode: raw.save_mode.unwrap_or(self.save_mode),
            enable_span: raw.enable_span.unwrap_or(self.enable_span),
            autoload: raw.autoload.unwrap_or(self.autoload),
            load_on_open: raw.load_on_open.unwrap_or(self.load_on_open),
        }
    }

    /// Load settings with layered precedence.
    ///
    /// # Arguments
    /// * `local_dir` - Optional directory holding a `.augtree.toml`
    ///
    /// # Array Merge Semantics
    /// - Defaults → Global: REPLACE
    /// - Global → Local: UNION with negation support
    /// - Any → Env vars: REPLACE
    pub fn load(local_dir: Option<&Path>) -> Result<Self, ApplicationError> {
        let mut current = Self::default();

        if let Some(global_path) = global_config_path() {
            if global_path.exists() {
                let raw = load_raw_settings(&global_path)?;
                current = current.apply_global(&raw);
            }
        }

        if let Some(dir) = local_dir {
            let local_path = local_config_path(dir);
            if local_path.exists() {
                let raw = load_raw_settings(&local_path)?;
                current = current.merge_with(&raw);
            }
        }

        current = Self::apply_env_overrides(current)?;
        current.expand_paths();

        Ok(current)
    }

    /// Apply AUGTREE_* environment variables as explicit overrides.
    fn apply_env_overrides(mut settings: Self) -> Result<Self, ApplicationError> {
        let builder = Config::builder().add_source(
            Environment::with_prefix("AUGTREE")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("loadpath")
                .try_parsing(true),
        );

        let config = builder.build().map_err(config_err)?;

        if let Ok(val) = config.get_string("root") {
            settings.root = PathBuf::from(val);
        }
        if let Ok(val) = config.get::<Vec<String>>("loadpath") {
            settings.loadpath = val;
        }
        if let Ok(val) = config.get_string("context") {
            settings.context = val;
        }
        if let Ok(val) = config.get_string("save_mode") {
            settings.save_mode = val.parse()?;
        }
        if let Ok(val) = config.get_bool("enable_span") {
            settings.enable_span = val;
        }
        if let Ok(val) = config.get_bool("autoload") {
            settings.autoload = val;
        }
        if let Ok(val) = config.get_bool("load_on_open") {
            settings.load_on_open = val;
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
        r#"# augtree configuration
#
# Locations (by precedence, lowest to highest):
#   Global: ~/.config/augtree/augtree.toml  (defines your baseline)
#   Local:  <dir>/.augtree.toml             (additions)
#   Env:    AUGTREE_* environment variables (explicit overrides)
#
# Use "!item" in a local loadpath to REMOVE an inherited entry.

# Filesystem root for all managed files
# root = "/"

# Lens search path
# loadpath = ["/usr/share/augeas/lenses"]

# Context for relative path expressions
# context = "/files"

# overwrite | backup | newfile | noop
# save_mode = "overwrite"

# enable_span = false
# autoload = true
# load_on_open = true
"#
        .to_string()
    }
}

fn config_err(e: ConfigError) -> ApplicationError {
    ApplicationError::Config {
        message: e.to_string(),
    }
}
