// src/config.rs
//! Configuration file parsing
//!
//! Supports a TOML configuration file with the following sections:
//! - [engine] - Engine state file, installed source, dependency reporting
//! - [lock] - Lock file and /proc location
//! - [packages] - Security module prefix, native architecture
//! - [privileges] - Whether mutating commands require root
//!
//! Every key has a default, so an empty file (or no file at all when the
//! default path is used) is a valid configuration.

use crate::error::Error;
use crate::transaction::{DependencyPolicy, RecapPolicy};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// TOML configuration file structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineSection,

    #[serde(default)]
    pub lock: LockSection,

    #[serde(default)]
    pub packages: PackagesSection,

    #[serde(default)]
    pub privileges: PrivilegesSection,
}

/// Engine configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    /// Engine state document
    #[serde(default = "default_state")]
    pub state: PathBuf,

    /// Where installed packages are listed from
    #[serde(default)]
    pub installed_source: InstalledSource,

    /// Category of bare update-state installs in recaps
    #[serde(default)]
    pub dependency_policy: DependencyPolicy,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            state: default_state(),
            installed_source: InstalledSource::default(),
            dependency_policy: DependencyPolicy::default(),
        }
    }
}

fn default_state() -> PathBuf {
    PathBuf::from("/var/lib/pkgrecap/state.json")
}

/// Source of installed packages for read-only queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstalledSource {
    /// The engine state document
    #[default]
    Snapshot,
    /// The system RPM database
    Rpmdb,
}

/// Lock configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct LockSection {
    #[serde(default = "default_lock_path")]
    pub path: PathBuf,

    /// Where lock holders are inspected
    #[serde(default = "default_proc_root")]
    pub proc_root: PathBuf,
}

impl Default for LockSection {
    fn default() -> Self {
        Self {
            path: default_lock_path(),
            proc_root: default_proc_root(),
        }
    }
}

fn default_lock_path() -> PathBuf {
    PathBuf::from(crate::lock::PackageLock::DEFAULT_PATH)
}

fn default_proc_root() -> PathBuf {
    PathBuf::from("/proc")
}

/// Package naming section
#[derive(Debug, Clone, Deserialize)]
pub struct PackagesSection {
    /// Name prefix marking security modules
    #[serde(default = "default_module_prefix")]
    pub module_prefix: String,

    /// Architecture preferred when collapsing multi-arch listings
    #[serde(default = "default_native_arch")]
    pub native_arch: String,
}

impl Default for PackagesSection {
    fn default() -> Self {
        Self {
            module_prefix: default_module_prefix(),
            native_arch: default_native_arch(),
        }
    }
}

fn default_module_prefix() -> String {
    "sm-".to_string()
}

fn default_native_arch() -> String {
    std::env::consts::ARCH.to_string()
}

/// Privileges section
#[derive(Debug, Clone, Deserialize)]
pub struct PrivilegesSection {
    /// Refuse install, remove and update unless running as root
    #[serde(default = "default_true")]
    pub require_root: bool,
}

impl Default for PrivilegesSection {
    fn default() -> Self {
        Self { require_root: true }
    }
}

fn default_true() -> bool {
    true
}

impl Config {
    /// System-wide configuration file
    pub const DEFAULT_PATH: &'static str = "/etc/pkgrecap/pkgrecap.toml";

    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = Self::parse(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load an explicit file, or the default file when it exists
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None if Path::new(Self::DEFAULT_PATH).exists() => Self::load(Self::DEFAULT_PATH),
            None => {
                debug!("No configuration file, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Parse and validate TOML content
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Check values serde cannot
    pub fn validate(&self) -> crate::Result<()> {
        if self.engine.state.as_os_str().is_empty() {
            return Err(Error::Config("engine.state must not be empty".to_string()));
        }
        if self.lock.path.as_os_str().is_empty() {
            return Err(Error::Config("lock.path must not be empty".to_string()));
        }
        if self.lock.path == self.engine.state {
            return Err(Error::Config(
                "lock.path and engine.state must be different files".to_string(),
            ));
        }
        if self.packages.native_arch.is_empty() {
            return Err(Error::Config("packages.native_arch must not be empty".to_string()));
        }
        if self
            .packages
            .module_prefix
            .contains(['*', '?', '[', ']'])
        {
            return Err(Error::Config(format!(
                "packages.module_prefix must not contain glob characters: '{}'",
                self.packages.module_prefix
            )));
        }
        Ok(())
    }

    /// Recap settings derived from this configuration
    pub fn recap_policy(&self) -> RecapPolicy {
        RecapPolicy {
            module_prefix: self.packages.module_prefix.clone(),
            dependency_policy: self.engine.dependency_policy,
            native_arch: self.packages.native_arch.clone(),
        }
    }
}
