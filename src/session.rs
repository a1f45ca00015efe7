// src/session.rs

//! Command session
//!
//! One `Session` per invocation. It owns the engine, knows the configuration
//! and writes everything user-visible through the injected sink.
//!
//! Mutating commands (`check-update`, `install`, `remove`, `update`) run under
//! the package lock and end with a `recap` record. `list`, `info` and
//! `last-updated` only read.

use crate::config::{Config, InstalledSource};
use crate::engine::{LayeredIndex, PackageIndex, RpmDb, SnapshotEngine, TransactionEngine};
use crate::error::{Error, Result};
use crate::events::{Event, EventSink};
use crate::lock::{with_lock, ProcFs, ProcessInspector};
use crate::query::{self, PackageKind, QueryOptions, StatusFilter};
use crate::transaction::{recap, RecapPolicy};
use chrono::{Local, TimeZone};
use tracing::{debug, info};

/// State shared by all commands of one invocation
pub struct Session<'a> {
    config: Config,
    engine: Box<dyn TransactionEngine>,
    installed: Option<Box<dyn PackageIndex>>,
    inspector: Box<dyn ProcessInspector>,
    sink: &'a dyn EventSink,
}

impl<'a> Session<'a> {
    /// Build the engine and helpers described by `config`
    pub fn open(config: Config, sink: &'a dyn EventSink) -> Result<Self> {
        let engine = SnapshotEngine::open(&config.engine.state, &config.packages.native_arch)?;
        let installed: Option<Box<dyn PackageIndex>> = match config.engine.installed_source {
            InstalledSource::Snapshot => None,
            InstalledSource::Rpmdb => Some(Box::new(RpmDb::new())),
        };

        let mut session = Self::new(config, Box::new(engine), sink);
        session.installed = installed;
        Ok(session)
    }

    pub fn new(config: Config, engine: Box<dyn TransactionEngine>, sink: &'a dyn EventSink) -> Self {
        let inspector = Box::new(ProcFs::new(&config.lock.proc_root));
        Self {
            config,
            engine,
            installed: None,
            inspector,
            sink,
        }
    }

    /// List installed packages from another index
    pub fn with_installed_index(mut self, installed: Box<dyn PackageIndex>) -> Self {
        self.installed = Some(installed);
        self
    }

    pub fn with_inspector(mut self, inspector: Box<dyn ProcessInspector>) -> Self {
        self.inspector = inspector;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Recap the updates available, without applying them
    pub fn check_update(&mut self, patterns: &[String]) -> Result<()> {
        self.locked(|engine, sink, policy| {
            engine.mark_update(patterns, sink)?;
            recap_and_apply(engine, sink, policy, None)
        })
    }

    /// Emit details about matching packages
    pub fn info(&self, patterns: &[String]) -> Result<()> {
        let options = self.query_options(PackageKind::Any).show_hidden(true);
        let packages = self.with_index(|index| query::package_infos(index, patterns, &options))?;
        self.sink.emit(Event::PkgInfos { packages })
    }

    pub fn install(&mut self, kind: PackageKind, patterns: &[String]) -> Result<()> {
        self.ensure_privileges()?;
        let patterns = self.command_patterns(kind, patterns)?;

        self.locked(|engine, sink, policy| {
            engine.mark_install(&patterns, sink)?;
            recap_and_apply(
                engine,
                sink,
                policy,
                Some("All requested packages installed successfully"),
            )
        })
    }

    pub fn list(
        &self,
        filter: StatusFilter,
        kind: PackageKind,
        patterns: &[String],
        show_hidden: bool,
    ) -> Result<()> {
        let options = self.query_options(kind).show_hidden(show_hidden);
        let packages = self.with_index(|index| query::list_packages(index, filter, patterns, &options))?;
        self.sink.emit(Event::Listing { packages })
    }

    pub fn remove(&mut self, kind: PackageKind, patterns: &[String]) -> Result<()> {
        self.ensure_privileges()?;
        let patterns = self.command_patterns(kind, patterns)?;

        self.locked(|engine, sink, policy| {
            engine.mark_remove(&patterns, sink)?;
            recap_and_apply(
                engine,
                sink,
                policy,
                Some("All requested packages removed successfully"),
            )
        })
    }

    /// Update matching packages, or the whole system without patterns
    pub fn update(&mut self, patterns: &[String]) -> Result<()> {
        self.ensure_privileges()?;
        let confirm = if patterns.is_empty() {
            "All packages updated successfully"
        } else {
            "All requested packages updated successfully"
        };

        self.locked(|engine, sink, policy| {
            engine.mark_update(patterns, sink)?;
            recap_and_apply(engine, sink, policy, Some(confirm))
        })
    }

    /// Emit the local date of the most recent install
    pub fn last_updated(&self) -> Result<()> {
        let last = self.with_index(|index| index.last_transaction_time())?;

        let message = match last.and_then(|t| Local.timestamp_opt(t, 0).single()) {
            Some(date) => date.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => "The system has never been updated".to_string(),
        };
        self.sink.emit(Event::info(message))
    }

    fn ensure_privileges(&self) -> Result<()> {
        if self.config.privileges.require_root && !nix::unistd::geteuid().is_root() {
            return Err(Error::PermissionDenied(
                "You need to be root to perform this command".to_string(),
            ));
        }
        Ok(())
    }

    /// Patterns for install and remove, rewritten for security modules
    fn command_patterns(&self, kind: PackageKind, patterns: &[String]) -> Result<Vec<String>> {
        if patterns.is_empty() {
            return Err(Error::NoMatch("No package pattern given".to_string()));
        }
        Ok(query::normalize_patterns(
            patterns,
            kind,
            &self.config.packages.module_prefix,
        ))
    }

    fn query_options(&self, kind: PackageKind) -> QueryOptions {
        QueryOptions::new(
            kind,
            self.config.packages.module_prefix.clone(),
            self.config.packages.native_arch.clone(),
        )
    }

    fn with_index<T>(&self, f: impl FnOnce(&dyn PackageIndex) -> Result<T>) -> Result<T> {
        let engine: &dyn PackageIndex = &*self.engine;
        match &self.installed {
            Some(installed) => f(&LayeredIndex::new(&**installed, engine)),
            None => f(engine),
        }
    }

    fn locked<T>(
        &mut self,
        work: impl FnOnce(&mut dyn TransactionEngine, &dyn EventSink, &RecapPolicy) -> Result<T>,
    ) -> Result<T> {
        let policy = self.config.recap_policy();
        let sink = self.sink;
        let lock_path = self.config.lock.path.clone();

        debug!("Taking package lock at {:?}", lock_path);
        with_lock(&lock_path, &*self.inspector, &mut *self.engine, |engine| {
            work(engine, sink, &policy)
        })
    }
}

/// Emit the recap, then run the transaction when asked to
///
/// An empty recap is still emitted, but nothing is run and no confirmation
/// follows.
fn recap_and_apply(
    engine: &mut dyn TransactionEngine,
    sink: &dyn EventSink,
    policy: &RecapPolicy,
    confirm: Option<&str>,
) -> Result<()> {
    let report = recap(&engine.transaction(), policy)?;
    let empty = report.is_empty();
    sink.emit(Event::Recap(report))?;

    let Some(confirm) = confirm else {
        return Ok(());
    };
    if empty {
        info!("Nothing to do");
        return Ok(());
    }

    engine.run_transaction(sink)?;
    sink.emit(Event::info(confirm))
}
