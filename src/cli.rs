// src/cli.rs
//! CLI definitions for pkgrecap
//!
//! This module contains the command-line interface definitions using clap.
//! The commands themselves live in `pkgrecap::session`.

use clap::{Parser, Subcommand, ValueEnum};
use pkgrecap::{PackageKind, StatusFilter};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pkgrecap")]
#[command(version)]
#[command(about = "Package transaction recaps, listings and lock arbitration as JSON lines", long_about = None)]
pub struct Cli {
    /// Report full error chains and raise diagnostics to debug
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Configuration file (default: /etc/pkgrecap/pkgrecap.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Engine state file, overriding the configuration
    #[arg(long, global = true, value_name = "FILE")]
    pub state: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Recap the available updates without applying them
    CheckUpdate {
        /// Glob patterns matched against package names, e.g. 'nb*'
        #[arg(value_name = "PATTERN")]
        patterns: Vec<String>,
    },

    /// Show details about packages
    Info {
        #[arg(value_name = "PATTERN", required = true)]
        patterns: Vec<String>,
    },

    /// Install packages or security modules
    Install {
        #[arg(value_enum, value_name = "TYPE")]
        kind: KindArg,

        #[arg(value_name = "PATTERN", required = true)]
        patterns: Vec<String>,
    },

    /// List packages or security modules
    List {
        #[arg(value_enum, value_name = "FILTER")]
        filter: FilterArg,

        #[arg(value_enum, value_name = "TYPE")]
        kind: KindArg,

        #[arg(value_name = "PATTERN")]
        patterns: Vec<String>,

        /// Also show hidden security modules
        #[arg(long)]
        show_hidden: bool,
    },

    /// Remove installed packages or security modules
    Remove {
        #[arg(value_enum, value_name = "TYPE")]
        kind: KindArg,

        #[arg(value_name = "PATTERN", required = true)]
        patterns: Vec<String>,
    },

    /// Update packages, or the whole system when no pattern is given
    Update {
        #[arg(value_name = "PATTERN")]
        patterns: Vec<String>,
    },

    /// Show the date of the last system update
    LastUpdated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    Packages,
    Modules,
}

impl From<KindArg> for PackageKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Packages => PackageKind::Packages,
            KindArg::Modules => PackageKind::Modules,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FilterArg {
    All,
    Installed,
    Available,
}

impl From<FilterArg> for StatusFilter {
    fn from(filter: FilterArg) -> Self {
        match filter {
            FilterArg::All => StatusFilter::All,
            FilterArg::Installed => StatusFilter::Installed,
            FilterArg::Available => StatusFilter::Available,
        }
    }
}
