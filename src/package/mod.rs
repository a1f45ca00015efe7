// src/package/mod.rs

//! Package identity and metadata
//!
//! `PackageRef` is the canonical NEVRA identity every other module works with.
//! `PackageInfo` is what the engine's package index hands back for a candidate,
//! and `PackageDetails` is the record emitted by the `info` command.

pub mod version;

pub use version::{compare_evr, rpmvercmp};

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical package identity: name, epoch, version, release, arch
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageRef {
    pub name: String,
    #[serde(default)]
    pub epoch: u64,
    pub version: String,
    pub release: String,
    pub arch: String,
}

impl PackageRef {
    pub fn new(
        name: impl Into<String>,
        epoch: u64,
        version: impl Into<String>,
        release: impl Into<String>,
        arch: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            epoch,
            version: version.into(),
            release: release.into(),
            arch: arch.into(),
        }
    }

    /// Parse a NEVRA string
    ///
    /// Accepted forms:
    /// - "foo-1:2.0-3.el9.x86_64" → epoch=1
    /// - "foo-2.0-3.el9.x86_64" → epoch=0
    /// - "python3-foo-bar-2.0-3.noarch" → name="python3-foo-bar"
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidPackage(s.to_string());

        let (rest, arch) = s.rsplit_once('.').ok_or_else(invalid)?;
        let (rest, release) = rest.rsplit_once('-').ok_or_else(invalid)?;
        let (name, ev) = rest.rsplit_once('-').ok_or_else(invalid)?;

        let (epoch, version) = match ev.split_once(':') {
            Some((e, v)) if e.is_empty() => (0, v),
            Some((e, v)) => (e.parse::<u64>().map_err(|_| invalid())?, v),
            None => (0, ev),
        };

        if name.is_empty() || version.is_empty() || release.is_empty() || arch.is_empty() {
            return Err(invalid());
        }

        Ok(Self::new(name, epoch, version, release, arch))
    }

    /// User-facing version: "epoch:version-release", epoch only when non-zero
    pub fn evr(&self) -> String {
        if self.epoch > 0 {
            format!("{}:{}-{}", self.epoch, self.version, self.release)
        } else {
            format!("{}-{}", self.version, self.release)
        }
    }

    /// True when `other` is this same build for a different architecture
    pub fn is_same_package_other_arch(&self, other: &PackageRef) -> bool {
        self.name == other.name
            && self.version == other.version
            && self.release == other.release
            && self.arch != other.arch
    }
}

impl fmt::Display for PackageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}:{}-{}.{}",
            self.name, self.epoch, self.version, self.release, self.arch
        )
    }
}

/// A candidate returned by the engine's package index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageInfo {
    #[serde(flatten)]
    pub package: PackageRef,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub license: String,
    /// Name of the source package this was built from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,
    /// Internal packages hidden from listings unless explicitly requested
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub hidden: bool,
    /// Install time in UNIX seconds (installed packages only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_time: Option<i64>,
    /// Names of the packages this one obsoletes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub obsoletes: Vec<String>,
}

impl PackageInfo {
    pub fn new(package: PackageRef, summary: impl Into<String>) -> Self {
        Self {
            package,
            summary: summary.into(),
            description: String::new(),
            license: String::new(),
            source_name: None,
            hidden: false,
            install_time: None,
            obsoletes: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.package.name
    }
}

/// Detail record emitted by the `info` command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDetails {
    pub name: String,
    pub base_package_name: String,
    pub license: String,
    pub epoch: u64,
    pub version: String,
    pub release: String,
    pub arch: String,
    pub summary: String,
    pub description: String,
}

impl From<&PackageInfo> for PackageDetails {
    fn from(info: &PackageInfo) -> Self {
        let pkg = &info.package;
        Self {
            name: pkg.name.clone(),
            base_package_name: info
                .source_name
                .clone()
                .unwrap_or_else(|| pkg.name.clone()),
            license: info.license.clone(),
            epoch: pkg.epoch,
            version: pkg.version.clone(),
            release: pkg.release.clone(),
            arch: pkg.arch.clone(),
            summary: info.summary.clone(),
            description: info.description.clone(),
        }
    }
}
