// src/ordering.rs

//! Deterministic ordering for package listings and transaction recaps
//!
//! Listings are ordered by name (case-insensitive), then epoch, version,
//! release and architecture.
//!
//! Recaps are grouped by what each member will be reported as: explicit
//! installs first, then obsoletions, updates, dependency installs and finally
//! removals. Within a group security modules come before plain packages, then
//! the listing order applies.

use crate::package::{rpmvercmp, PackageRef};
use crate::transaction::{DependencyPolicy, MemberState, TransactionMember};
use std::cmp::Ordering;

/// Recap group of a transaction member, in report order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TransactionRank {
    Install = 0,
    Obsoleting = 1,
    Updating = 2,
    DependencyInstall = 3,
    Erase = 4,
    /// Old halves, never reported on their own
    Replaced = 5,
    Unrecognized = 9,
}

/// Rank a member for the recap
pub fn transaction_rank(member: &TransactionMember, policy: DependencyPolicy) -> TransactionRank {
    match member.state {
        MemberState::NewInstall if member.is_dependency => TransactionRank::DependencyInstall,
        MemberState::NewInstall => TransactionRank::Install,
        MemberState::Update | MemberState::Obsoleting => {
            if !member.obsoletes.is_empty() {
                TransactionRank::Obsoleting
            } else if !member.updates.is_empty() {
                TransactionRank::Updating
            } else if policy == DependencyPolicy::DependencyFlag && member.is_dependency {
                TransactionRank::DependencyInstall
            } else {
                TransactionRank::Install
            }
        }
        MemberState::Erase => TransactionRank::Erase,
        MemberState::UpdateReplaced | MemberState::ObsoleteReplaced => TransactionRank::Replaced,
        MemberState::Unrecognized(_) => TransactionRank::Unrecognized,
    }
}

/// Listing order: name (case-insensitive), epoch, version, release, arch
pub fn list_cmp(a: &PackageRef, b: &PackageRef) -> Ordering {
    a.name
        .to_lowercase()
        .cmp(&b.name.to_lowercase())
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.epoch.cmp(&b.epoch))
        .then_with(|| rpmvercmp(&a.version, &b.version))
        .then_with(|| a.version.cmp(&b.version))
        .then_with(|| rpmvercmp(&a.release, &b.release))
        .then_with(|| a.release.cmp(&b.release))
        .then_with(|| a.arch.cmp(&b.arch))
}

/// Recap order: rank, security modules first, then listing order
///
/// Falls back to the state code so that the order is total even for
/// duplicate packages.
pub fn transaction_cmp(
    a: &TransactionMember,
    b: &TransactionMember,
    module_prefix: &str,
    policy: DependencyPolicy,
) -> Ordering {
    let is_plain = |m: &TransactionMember| !is_module(&m.package.name, module_prefix);

    transaction_rank(a, policy)
        .cmp(&transaction_rank(b, policy))
        .then_with(|| is_plain(a).cmp(&is_plain(b)))
        .then_with(|| list_cmp(&a.package, &b.package))
        .then_with(|| a.state.code().cmp(b.state.code()))
        .then_with(|| a.is_dependency.cmp(&b.is_dependency))
}

/// True when `name` carries the security-module prefix
pub fn is_module(name: &str, module_prefix: &str) -> bool {
    !module_prefix.is_empty() && name.starts_with(module_prefix)
}
