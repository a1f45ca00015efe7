// src/engine/mod.rs

//! Boundary with the package-transaction engine
//!
//! The engine owns package metadata and the pending transaction. This crate
//! only asks it for candidates, tells it what to mark, reads back the raw
//! members and asks it to run them.
//!
//! - `SnapshotEngine`: engine state kept in a JSON document
//! - `RpmDb`: read-only view of the installed RPM database
//! - `LayeredIndex`: installed packages from one index, available from another

mod rpmdb;
mod snapshot;

pub use rpmdb::{parse_query_output, RpmDb};
pub use snapshot::{SnapshotEngine, SnapshotState};

use crate::error::Result;
use crate::events::EventSink;
use crate::package::PackageInfo;
use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where candidates come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Installed,
    Available,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Installed => write!(f, "installed"),
            Self::Available => write!(f, "available"),
        }
    }
}

/// Read access to package metadata
pub trait PackageIndex {
    /// Candidates for a glob pattern
    ///
    /// Implementations may return more than the pattern strictly names;
    /// callers re-filter on the package name.
    fn search(&self, source: Source, pattern: &str) -> Result<Vec<PackageInfo>>;

    /// Most recent install time among installed packages, in UNIX seconds
    fn last_transaction_time(&self) -> Result<Option<i64>> {
        let installed = self.search(Source::Installed, "*")?;
        Ok(installed.iter().filter_map(|p| p.install_time).max())
    }
}

/// The transaction side of the engine
///
/// Marking calls return how many members were added. Warnings raised while
/// marking go through the given sink.
pub trait TransactionEngine: PackageIndex {
    fn mark_install(&mut self, patterns: &[String], sink: &dyn EventSink) -> Result<usize>;

    fn mark_remove(&mut self, patterns: &[String], sink: &dyn EventSink) -> Result<usize>;

    /// Empty `patterns` means every installed package
    fn mark_update(&mut self, patterns: &[String], sink: &dyn EventSink) -> Result<usize>;

    /// Raw members of the pending transaction
    fn transaction(&self) -> Transaction;

    /// Apply the pending transaction, reporting progress through `sink`
    fn run_transaction(&mut self, sink: &dyn EventSink) -> Result<()>;

    /// Close the package database handle
    fn close(&mut self) -> Result<()>;
}

/// Installed packages from one index, available packages from another
pub struct LayeredIndex<'a> {
    installed: &'a dyn PackageIndex,
    available: &'a dyn PackageIndex,
}

impl<'a> LayeredIndex<'a> {
    pub fn new(installed: &'a dyn PackageIndex, available: &'a dyn PackageIndex) -> Self {
        Self {
            installed,
            available,
        }
    }
}

impl PackageIndex for LayeredIndex<'_> {
    fn search(&self, source: Source, pattern: &str) -> Result<Vec<PackageInfo>> {
        match source {
            Source::Installed => self.installed.search(source, pattern),
            Source::Available => self.available.search(source, pattern),
        }
    }

    fn last_transaction_time(&self) -> Result<Option<i64>> {
        self.installed.last_transaction_time()
    }
}

/// Glob match of a pattern against a package name
///
/// An unparsable pattern matches nothing here; the query layer reports it.
pub(crate) fn glob_matches(pattern: &str, candidate: &str) -> bool {
    glob::Pattern::new(pattern)
        .map(|p| p.matches(candidate))
        .unwrap_or(false)
}
