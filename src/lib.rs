// src/lib.rs

//! pkgrecap
//!
//! Reporting and coordination layer in front of a package-transaction engine.
//!
//! # Architecture
//!
//! - Recap: the engine's raw transaction members become a categorized,
//!   deterministically ordered report (`install`, `installdep`, `update`, `remove`)
//! - Query: listings and package details, re-filtered by name and collapsed
//!   across architectures
//! - Events: everything user-visible is a JSON line with a `type` field
//! - Lock: one administrator at a time, with a readable diagnostic when not

pub mod config;
pub mod engine;
mod error;
pub mod events;
pub mod lock;
pub mod ordering;
pub mod package;
pub mod query;
pub mod session;
pub mod transaction;

pub use config::Config;
pub use engine::{PackageIndex, SnapshotEngine, Source, TransactionEngine};
pub use error::{Error, Result};
pub use events::{CollectingSink, Event, EventSink, JsonLinesSink, Level};
pub use lock::{with_lock, LockOwner, PackageLock, ProcFs};
pub use package::{PackageDetails, PackageInfo, PackageRef};
pub use query::{ListingEntry, PackageKind, QueryOptions, StatusFilter};
pub use session::Session;
pub use transaction::{
    recap, Category, DependencyPolicy, MemberState, RecapPolicy, RecapReport, Transaction,
    TransactionMember,
};
