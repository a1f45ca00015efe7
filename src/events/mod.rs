// src/events/mod.rs

//! Structured event protocol
//!
//! Everything user-visible leaves the process as one JSON object per line,
//! tagged with a `type` field. Components never print; they are handed an
//! `EventSink` and write through it.
//!
//! # Levels
//!
//! Plain messages carry `debug`, `info`, `warning` or `error`. Three payload
//! levels carry data instead of a message:
//!
//! - `progress`: `{"type":"progress","current":1,"total":3,"hint":"..."}`
//! - `recap`: `{"type":"recap","install":[...],"update":[...]}`
//! - `listing` / `pkginfos`: `{"type":"listing","packages":[...]}`
//!
//! Level names coming from other subsystems are coalesced with
//! `Level::coalesce`; anything that does not map onto the protocol is an
//! `Error::UnexpectedLevel`.

mod sink;

pub use sink::{CollectingSink, JsonLinesSink};

use crate::error::{Error, Result};
use crate::package::PackageDetails;
use crate::query::ListingEntry;
use crate::transaction::RecapReport;
use serde::Serialize;
use std::fmt;

/// Protocol level, after coalescing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Debug,
    Info,
    Warning,
    Error,
    Progress,
    Recap,
    Listing,
    PkgInfos,
}

impl Level {
    /// Map a level name from any subsystem onto the protocol
    ///
    /// Rules, applied in order on the lowercased name: `critical` and `fatal`
    /// become `error`, anything starting with `debug` becomes `debug`,
    /// anything starting with `info` becomes `info`.
    pub fn coalesce(name: &str) -> Result<Self> {
        let mut level = name.to_lowercase();

        if level == "critical" || level == "fatal" {
            level = "error".to_string();
        }
        if level.starts_with("debug") {
            level = "debug".to_string();
        }
        if level.starts_with("info") {
            level = "info".to_string();
        }

        match level.as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warning" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            "progress" => Ok(Self::Progress),
            "recap" => Ok(Self::Recap),
            "listing" => Ok(Self::Listing),
            "pkginfos" => Ok(Self::PkgInfos),
            _ => Err(Error::UnexpectedLevel(name.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Progress => "progress",
            Self::Recap => "recap",
            Self::Listing => "listing",
            Self::PkgInfos => "pkginfos",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One protocol record
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Event {
    Debug { message: String },
    Info { message: String },
    Warning { message: String },
    Error { message: String },
    Progress { current: u64, total: u64, hint: String },
    Recap(RecapReport),
    Listing { packages: Vec<ListingEntry> },
    PkgInfos { packages: Vec<PackageDetails> },
}

impl Event {
    /// Build a plain message record
    ///
    /// Payload levels cannot be expressed as a message and are rejected.
    pub fn message(level: Level, message: impl Into<String>) -> Result<Self> {
        let message = message.into();
        match level {
            Level::Debug => Ok(Self::Debug { message }),
            Level::Info => Ok(Self::Info { message }),
            Level::Warning => Ok(Self::Warning { message }),
            Level::Error => Ok(Self::Error { message }),
            payload => Err(Error::UnexpectedLevel(format!(
                "{} (a payload level cannot carry a plain message)",
                payload
            ))),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::Info {
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::Warning {
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn progress(current: u64, total: u64, hint: impl Into<String>) -> Self {
        Self::Progress {
            current,
            total,
            hint: hint.into(),
        }
    }

    pub fn level(&self) -> Level {
        match self {
            Self::Debug { .. } => Level::Debug,
            Self::Info { .. } => Level::Info,
            Self::Warning { .. } => Level::Warning,
            Self::Error { .. } => Level::Error,
            Self::Progress { .. } => Level::Progress,
            Self::Recap(_) => Level::Recap,
            Self::Listing { .. } => Level::Listing,
            Self::PkgInfos { .. } => Level::PkgInfos,
        }
    }
}

/// Destination for protocol records
///
/// Passed explicitly to every component that reports anything, including the
/// engine, so that its warnings and progress use the same protocol.
pub trait EventSink {
    /// Write one record
    fn emit(&self, event: Event) -> Result<()>;

    /// Write a plain message given a level name from another subsystem
    fn record(&self, level: &str, message: &str) -> Result<()> {
        let level = Level::coalesce(level)?;
        self.emit(Event::message(level, message)?)
    }
}

impl<S: EventSink + ?Sized> EventSink for &S {
    fn emit(&self, event: Event) -> Result<()> {
        (**self).emit(event)
    }
}
