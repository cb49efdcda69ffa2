//! Repository configuration
//!
//! Stored at `<root>/.arbor.toml` and passed explicitly into every operation;
//! there is no global config state. Every change to the shared-source list is
//! paired with the matching filesystem change by the caller.
//!
//! ```toml
//! default-branch = "main"
//!
//! [[shared]]
//! source = ".env"
//! type = "symlink"
//! managed = true
//!
//! [[shared]]
//! source = "npm ci"
//! type = "command"
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::path::format_path_for_display;

/// Config file name, relative to the repository root.
pub const CONFIG_FILE_NAME: &str = ".arbor.toml";

/// Default branch used when none is configured.
pub const FALLBACK_DEFAULT_BRANCH: &str = "main";

/// How a shared source reaches each worktree.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SharedKind {
    /// Each worktree gets a symlink to the canonical copy
    Symlink,
    /// Each worktree gets an independent copy
    Copy,
    /// A shell command run once in each newly created worktree
    Command,
}

impl SharedKind {
    /// Whether this kind places a file or directory in worktrees.
    pub fn is_file_based(self) -> bool {
        match self {
            SharedKind::Symlink | SharedKind::Copy => true,
            SharedKind::Command => false,
        }
    }
}

/// A configured propagation rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedEntry {
    /// Path relative to a worktree root, or a shell command
    pub source: String,
    #[serde(rename = "type")]
    pub kind: SharedKind,
    /// Canonical copy lives in the shared directory rather than the
    /// default-branch worktree
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub managed: bool,
}

impl SharedEntry {
    pub fn new(source: impl Into<String>, kind: SharedKind, managed: bool) -> Self {
        Self {
            source: source.into(),
            kind,
            // Commands have no canonical copy
            managed: managed && kind.is_file_based(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(
        default,
        rename = "default-branch",
        skip_serializing_if = "Option::is_none"
    )]
    pub default_branch: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shared: Vec<SharedEntry>,

    /// Captures unknown fields for validation warnings
    #[serde(flatten, default, skip_serializing)]
    unknown: HashMap<String, toml::Value>,
}

impl Config {
    /// Configured default branch, or `"main"`.
    pub fn default_branch_or_fallback(&self) -> &str {
        self.default_branch
            .as_deref()
            .unwrap_or(FALLBACK_DEFAULT_BRANCH)
    }

    pub fn find_shared(&self, source: &str) -> Option<&SharedEntry> {
        self.shared.iter().find(|e| e.source == source)
    }

    /// File-based entries (symlink and copy), in configured order.
    pub fn file_entries(&self) -> impl Iterator<Item = &SharedEntry> {
        self.shared.iter().filter(|e| e.kind.is_file_based())
    }

    /// Command entries, in configured order.
    pub fn command_entries(&self) -> impl Iterator<Item = &SharedEntry> {
        self.shared.iter().filter(|e| e.kind == SharedKind::Command)
    }

    /// Config with `entry` appended.
    pub fn with_shared(&self, entry: SharedEntry) -> Self {
        let mut next = self.clone();
        next.shared.push(entry);
        next
    }

    /// Config without the entry for `source`.
    pub fn without_shared(&self, source: &str) -> Self {
        let mut next = self.clone();
        next.shared.retain(|e| e.source != source);
        next
    }

    /// Parse TOML config text.
    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        toml::from_str(contents).context("Failed to parse config TOML")
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        toml::to_string(self).context("Failed to serialize config")
    }

    /// Top-level keys that were not recognized.
    pub fn unknown_keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.unknown.keys().cloned().collect();
        keys.sort();
        keys
    }
}

/// Find unknown keys in config TOML content.
///
/// Unrecognized keys are silently ignored on load; this lets the CLI warn.
pub fn find_unknown_keys(contents: &str) -> Vec<String> {
    Config::from_toml(contents)
        .map(|c| c.unknown_keys())
        .unwrap_or_default()
}

/// Persistence for [`Config`].
pub trait ConfigStore {
    fn load(&self) -> anyhow::Result<Config>;
    fn save(&self, config: &Config) -> anyhow::Result<()>;
}

/// TOML file store. A missing file loads as the default config.
#[derive(Debug, Clone)]
pub struct TomlConfigStore {
    path: PathBuf,
}

impl TomlConfigStore {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `<root>/.arbor.toml`.
    pub fn for_root(root: &Path) -> Self {
        Self::at(root.join(CONFIG_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for TomlConfigStore {
    fn load(&self) -> anyhow::Result<Config> {
        if !self.path.exists() {
            return Ok(Config::default());
        }
        let contents = std::fs::read_to_string(&self.path).with_context(|| {
            format!(
                "Failed to read config file {}",
                format_path_for_display(&self.path)
            )
        })?;
        let config = Config::from_toml(&contents).with_context(|| {
            format!("Invalid config file {}", format_path_for_display(&self.path))
        })?;
        for key in config.unknown_keys() {
            log::warn!("Unknown key '{key}' in {}", self.path.display());
        }
        Ok(config)
    }

    /// Write via a temp file in the same directory, then rename over the
    /// original, so a failed write never leaves a truncated config.
    fn save(&self, config: &Config) -> anyhow::Result<()> {
        let contents = config.to_toml()?;
        let dir = self
            .path
            .parent()
            .context("Config path has no parent directory")?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
        tmp.write_all(contents.as_bytes())?;
        tmp.persist(&self.path).with_context(|| {
            format!(
                "Failed to write config file {}",
                format_path_for_display(&self.path)
            )
        })?;
        log::debug!("Saved config to {}", self.path.display());
        Ok(())
    }
}

/// In-memory store, for library consumers and tests.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    config: RefCell<Config>,
    fail_saves: RefCell<bool>,
    saves: RefCell<usize>,
}

impl MemoryConfigStore {
    pub fn new(config: Config) -> Self {
        Self {
            config: RefCell::new(config),
            ..Self::default()
        }
    }

    /// Make later saves fail.
    pub fn fail_saves(&self, fail: bool) {
        *self.fail_saves.borrow_mut() = fail;
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        *self.saves.borrow()
    }

    pub fn current(&self) -> Config {
        self.config.borrow().clone()
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load(&self) -> anyhow::Result<Config> {
        Ok(self.current())
    }

    fn save(&self, config: &Config) -> anyhow::Result<()> {
        if *self.fail_saves.borrow() {
            anyhow::bail!("config store is read-only");
        }
        *self.config.borrow_mut() = config.clone();
        *self.saves.borrow_mut() += 1;
        Ok(())
    }
}
