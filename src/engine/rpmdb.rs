// src/engine/rpmdb.rs

//! Installed packages from the system RPM database
//!
//! Read-only: shells out to `rpm -qa` once and caches the result.

use super::{glob_matches, PackageIndex, Source};
use crate::error::{Error, Result};
use crate::package::{PackageInfo, PackageRef};
use std::cell::OnceCell;
use std::process::Command;
use tracing::{debug, warn};

const QUERY_FORMAT: &str = "%{NAME}\t%{EPOCHNUM}\t%{VERSION}\t%{RELEASE}\t%{ARCH}\t%{INSTALLTIME}\t%{LICENSE}\t%{SOURCERPM}\t%{SUMMARY}\n";

/// Installed source backed by the `rpm` binary
#[derive(Debug)]
pub struct RpmDb {
    program: String,
    packages: OnceCell<Vec<PackageInfo>>,
}

impl RpmDb {
    pub fn new() -> Self {
        Self::with_program("rpm")
    }

    /// Use another `rpm` binary
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            packages: OnceCell::new(),
        }
    }

    fn packages(&self) -> Result<&[PackageInfo]> {
        if let Some(packages) = self.packages.get() {
            return Ok(packages);
        }

        debug!("Querying installed RPM packages");
        let output = Command::new(&self.program)
            .args(["-qa", "--queryformat", QUERY_FORMAT])
            .output()
            .map_err(|e| Error::Engine(format!("Failed to run {}: {}. Is rpm installed?", self.program, e)))?;

        if !output.status.success() {
            return Err(Error::Engine(format!(
                "rpm -qa failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let packages = parse_query_output(&String::from_utf8_lossy(&output.stdout));
        debug!("Found {} installed packages", packages.len());
        Ok(self.packages.get_or_init(|| packages))
    }
}

impl Default for RpmDb {
    fn default() -> Self {
        Self::new()
    }
}

impl PackageIndex for RpmDb {
    fn search(&self, source: Source, pattern: &str) -> Result<Vec<PackageInfo>> {
        if source == Source::Available {
            return Ok(Vec::new());
        }

        Ok(self
            .packages()?
            .iter()
            .filter(|p| glob_matches(pattern, p.name()))
            .cloned()
            .collect())
    }
}

/// Parse `rpm -qa` output in this module's query format
///
/// Malformed lines are skipped with a warning.
pub fn parse_query_output(output: &str) -> Vec<PackageInfo> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let parsed = parse_line(line);
            if parsed.is_none() {
                warn!("Skipping unexpected rpm output line: {}", line);
            }
            parsed
        })
        .collect()
}

fn parse_line(line: &str) -> Option<PackageInfo> {
    let parts: Vec<&str> = line.splitn(9, '\t').collect();
    if parts.len() < 9 {
        return None;
    }

    let field = |s: &str| if s == "(none)" { String::new() } else { s.to_string() };

    // gpg-pubkey entries have no arch
    let arch = match parts[4] {
        "(none)" | "" => "noarch",
        arch => arch,
    };

    let package = PackageRef::new(
        parts[0],
        parts[1].parse().unwrap_or(0),
        parts[2],
        parts[3],
        arch,
    );

    let mut info = PackageInfo::new(package, field(parts[8]));
    info.install_time = parts[5].parse().ok();
    info.license = field(parts[6]);
    info.source_name = parts[7]
        .strip_suffix(".rpm")
        .and_then(|srpm| PackageRef::parse(srpm).ok())
        .map(|src| src.name);
    Some(info)
}
