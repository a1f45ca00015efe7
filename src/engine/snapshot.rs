// src/engine/snapshot.rs

//! Engine whose state lives in a JSON document
//!
//! ```json
//! {
//!   "installed": [{"name": "foo", "version": "1", "release": "1", "arch": "noarch", ...}],
//!   "available": [...],
//!   "transaction": [{"package": {...}, "state": "u", "updates": [...]}]
//! }
//! ```
//!
//! Marking computes members from the two package sets. A recorded
//! `transaction` replaces whatever marking would compute; it is how raw engine
//! states are replayed. Running the transaction applies it to `installed` and
//! rewrites the document atomically.

use super::{glob_matches, PackageIndex, Source, TransactionEngine};
use crate::error::{Error, Result};
use crate::events::{Event, EventSink};
use crate::package::{compare_evr, PackageInfo, PackageRef};
use crate::transaction::{MemberState, Transaction, TransactionMember};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// On-disk engine state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotState {
    #[serde(default)]
    pub installed: Vec<PackageInfo>,
    #[serde(default)]
    pub available: Vec<PackageInfo>,
    /// Raw members to replay instead of computing them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<Vec<TransactionMember>>,
}

/// Transaction engine over a `SnapshotState` file
#[derive(Debug)]
pub struct SnapshotEngine {
    path: PathBuf,
    state: SnapshotState,
    native_arch: String,
    pending: Vec<TransactionMember>,
    closed: bool,
}

impl SnapshotEngine {
    /// Load the state document at `path`
    pub fn open<P: AsRef<Path>>(path: P, native_arch: impl Into<String>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let content = fs::read_to_string(&path).map_err(|e| {
            Error::Engine(format!("Cannot read engine state {}: {}", path.display(), e))
        })?;
        let state: SnapshotState = serde_json::from_str(&content).map_err(|e| {
            Error::Engine(format!("Invalid engine state {}: {}", path.display(), e))
        })?;

        debug!(
            "Loaded engine state from {:?}: {} installed, {} available",
            path,
            state.installed.len(),
            state.available.len()
        );
        Ok(Self::from_state(path, state, native_arch))
    }

    pub fn from_state(path: PathBuf, state: SnapshotState, native_arch: impl Into<String>) -> Self {
        Self {
            path,
            state,
            native_arch: native_arch.into(),
            pending: Vec::new(),
            closed: false,
        }
    }

    pub fn state(&self) -> &SnapshotState {
        &self.state
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Recorded members, if the document carries some
    fn recorded(&self) -> Option<usize> {
        self.state.transaction.as_ref().map(|members| {
            debug!("Using the {} recorded transaction members", members.len());
            members.len()
        })
    }

    fn push(&mut self, member: TransactionMember) -> bool {
        if self.is_marked(&member.package) {
            return false;
        }
        self.pending.push(member);
        true
    }

    fn is_marked(&self, package: &PackageRef) -> bool {
        self.pending.iter().any(|m| &m.package == package)
    }

    fn installed_named(&self, name: &str) -> Vec<&PackageInfo> {
        self.state
            .installed
            .iter()
            .filter(|p| p.name() == name)
            .collect()
    }

    /// Newest candidate, preferring the native arch among equal versions
    fn newest<'a>(&self, candidates: impl Iterator<Item = &'a PackageInfo>) -> Option<&'a PackageInfo> {
        let arch_rank = |p: &PackageInfo| match p.package.arch.as_str() {
            a if a == self.native_arch => 2,
            "noarch" => 1,
            _ => 0,
        };
        candidates.max_by(|a, b| {
            compare_evr(&a.package, &b.package).then_with(|| arch_rank(a).cmp(&arch_rank(b)))
        })
    }

    /// Add an obsoletion pair for every installed package `new` obsoletes
    ///
    /// Packages already updated or obsoleted by another member are left to it.
    fn mark_obsoletions(&mut self, new: &PackageInfo) -> usize {
        let replaced: Vec<PackageRef> = self
            .state
            .installed
            .iter()
            .filter(|p| p.name() != new.name() && new.obsoletes.iter().any(|o| o == p.name()))
            .filter(|p| !self.is_marked(&p.package))
            .map(|p| p.package.clone())
            .collect();

        if replaced.is_empty() {
            return 0;
        }

        let mut member = TransactionMember::new(new.package.clone(), MemberState::Obsoleting);
        for old in &replaced {
            member = member.with_obsoletion_of(old.clone());
        }
        let mut added = usize::from(self.push(member));
        for old in replaced {
            let old_member = TransactionMember::new(old, MemberState::ObsoleteReplaced)
                .with_replaced_by(new.package.clone());
            added += usize::from(self.push(old_member));
        }
        added
    }

    fn mark_update_of(&mut self, old: &PackageRef, new: &PackageRef) -> usize {
        if self.is_marked(old) || self.is_marked(new) {
            return 0;
        }
        let member = TransactionMember::new(new.clone(), MemberState::Update).with_update_of(old.clone());
        let replaced = TransactionMember::new(old.clone(), MemberState::UpdateReplaced)
            .with_replaced_by(new.clone());
        usize::from(self.push(member)) + usize::from(self.push(replaced))
    }

    fn apply(&mut self, members: &[TransactionMember], sink: &dyn EventSink) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let total = members.len() as u64;

        for (i, member) in members.iter().enumerate() {
            sink.emit(Event::progress(i as u64 + 1, total, member.package.to_string()))?;

            match &member.state {
                MemberState::NewInstall | MemberState::Update | MemberState::Obsoleting => {
                    let mut info = self
                        .state
                        .available
                        .iter()
                        .find(|p| p.package == member.package)
                        .cloned()
                        .unwrap_or_else(|| PackageInfo::new(member.package.clone(), ""));
                    info.install_time = Some(now);
                    self.state.installed.retain(|p| p.package != member.package);
                    self.state.installed.push(info);
                }
                MemberState::UpdateReplaced
                | MemberState::ObsoleteReplaced
                | MemberState::Erase => {
                    self.state.installed.retain(|p| p.package != member.package);
                }
                MemberState::Unrecognized(code) => {
                    return Err(Error::UnexpectedState(format!(
                        "{} for {}",
                        code, member.package
                    )));
                }
            }
        }
        Ok(())
    }

    fn persist(&self) -> Result<()> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, &self.state)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| Error::Io(e.error))?;

        debug!("Wrote engine state to {:?}", self.path);
        Ok(())
    }
}

impl PackageIndex for SnapshotEngine {
    /// Matches the pattern against the name or the full NEVRA
    fn search(&self, source: Source, pattern: &str) -> Result<Vec<PackageInfo>> {
        let packages = match source {
            Source::Installed => &self.state.installed,
            Source::Available => &self.state.available,
        };

        Ok(packages
            .iter()
            .filter(|p| {
                glob_matches(pattern, p.name()) || glob_matches(pattern, &p.package.to_string())
            })
            .cloned()
            .collect())
    }
}

impl TransactionEngine for SnapshotEngine {
    fn mark_install(&mut self, patterns: &[String], sink: &dyn EventSink) -> Result<usize> {
        if let Some(count) = self.recorded() {
            return Ok(count);
        }

        let mut added = 0;
        let mut already_installed = false;

        for pattern in patterns {
            let mut names: Vec<String> = self
                .state
                .available
                .iter()
                .filter(|p| glob_matches(pattern, p.name()))
                .map(|p| p.name().to_string())
                .collect();
            names.sort();
            names.dedup();

            for name in names {
                let Some(candidate) =
                    self.newest(self.state.available.iter().filter(|p| p.name() == name))
                else {
                    continue;
                };
                let candidate = candidate.clone();

                let current = self
                    .newest(self.installed_named(&name).into_iter())
                    .map(|p| p.package.clone());

                match current {
                    Some(current)
                        if compare_evr(&current, &candidate.package) != Ordering::Less =>
                    {
                        already_installed = true;
                        sink.record(
                            "WARNING",
                            &format!("Package {} already installed and latest version", current),
                        )?;
                    }
                    Some(current) => {
                        added += self.mark_update_of(&current, &candidate.package);
                    }
                    None => {
                        let obsoleted = self.mark_obsoletions(&candidate);
                        if obsoleted == 0 {
                            let member = TransactionMember::new(
                                candidate.package.clone(),
                                MemberState::NewInstall,
                            );
                            added += usize::from(self.push(member));
                        }
                        added += obsoleted;
                    }
                }
            }
        }

        if added == 0 && !already_installed {
            return Err(Error::NoMatch("No package(s) available to install".to_string()));
        }

        info!("Marked {} members for install", added);
        Ok(added)
    }

    fn mark_remove(&mut self, patterns: &[String], _sink: &dyn EventSink) -> Result<usize> {
        if let Some(count) = self.recorded() {
            return Ok(count);
        }

        let matched: Vec<PackageRef> = self
            .state
            .installed
            .iter()
            .filter(|p| patterns.iter().any(|pattern| glob_matches(pattern, p.name())))
            .map(|p| p.package.clone())
            .collect();

        let mut added = 0;
        for package in matched {
            added += usize::from(self.push(TransactionMember::new(package, MemberState::Erase)));
        }

        if added == 0 {
            return Err(Error::NoMatch("No package(s) marked for removal".to_string()));
        }

        info!("Marked {} members for removal", added);
        Ok(added)
    }

    fn mark_update(&mut self, patterns: &[String], _sink: &dyn EventSink) -> Result<usize> {
        if let Some(count) = self.recorded() {
            return Ok(count);
        }

        let selected = |name: &str| {
            patterns.is_empty() || patterns.iter().any(|pattern| glob_matches(pattern, name))
        };

        let installed: Vec<PackageRef> = self
            .state
            .installed
            .iter()
            .filter(|p| selected(p.name()))
            .map(|p| p.package.clone())
            .collect();

        let mut added = 0;

        for old in &installed {
            let newer = self.newest(self.state.available.iter().filter(|p| {
                p.name() == old.name
                    && p.package.arch == old.arch
                    && compare_evr(&p.package, old) == Ordering::Greater
            }));
            if let Some(new) = newer.map(|p| p.package.clone()) {
                added += self.mark_update_of(old, &new);
            }
        }

        let obsoletes_selected = |p: &PackageInfo| {
            p.obsoletes.iter().any(|o| installed.iter().any(|i| &i.name == o))
        };

        let mut obsoleting: Vec<String> = self
            .state
            .available
            .iter()
            .filter(|p| self.installed_named(p.name()).is_empty() && obsoletes_selected(*p))
            .map(|p| p.name().to_string())
            .collect();
        obsoleting.sort();
        obsoleting.dedup();

        for name in obsoleting {
            let Some(new) = self.newest(
                self.state
                    .available
                    .iter()
                    .filter(|p| p.name() == name && obsoletes_selected(*p)),
            ) else {
                continue;
            };
            let new = new.clone();
            added += self.mark_obsoletions(&new);
        }

        info!("Marked {} members for update", added);
        Ok(added)
    }

    fn transaction(&self) -> Transaction {
        match &self.state.transaction {
            Some(members) => Transaction::new(members.clone()),
            None => Transaction::new(self.pending.clone()),
        }
    }

    fn run_transaction(&mut self, sink: &dyn EventSink) -> Result<()> {
        if self.closed {
            return Err(Error::Engine("The package database is closed".to_string()));
        }

        let members = self.transaction().into_members();
        if members.is_empty() {
            return Ok(());
        }

        self.apply(&members, sink)?;
        self.state.transaction = None;
        self.pending.clear();
        self.persist()?;

        info!("Applied {} transaction members", members.len());
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            debug!("Closing package database {:?}", self.path);
            self.closed = true;
        }
        Ok(())
    }
}
