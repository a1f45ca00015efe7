// src/transaction/recap.rs

//! Transaction recap: what a pending transaction will do, by category
//!
//! The engine books every update and obsoletion twice, once as the new package
//! and once as the old one. Reporting both halves would produce duplicated,
//! contradictory events, so the old halves are only validated and every change
//! is rebuilt from the new half's `updates` / `obsoletes` relations. Both
//! halves must reference each other. Multilib copies of one change are then
//! collapsed into a single entry.

use super::{MemberState, Transaction, TransactionMember};
use crate::error::{Error, Result};
use crate::ordering;
use crate::package::PackageRef;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// How to report a new package that neither updates nor obsoletes anything
/// but sits in an update-state member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyPolicy {
    /// Absence of relations means a plain install
    #[default]
    Relations,
    /// Use the engine's dependency flag to report it as `installdep`
    DependencyFlag,
}

/// Settings the recap depends on
#[derive(Debug, Clone, Default)]
pub struct RecapPolicy {
    /// Name prefix of security modules, sorted first within each group
    pub module_prefix: String,
    pub dependency_policy: DependencyPolicy,
    /// Architecture kept when one change is reported for several arches
    pub native_arch: String,
}

/// Recap category, in report order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    Install,
    InstallDep,
    Update,
    Remove,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::InstallDep => "installdep",
            Self::Update => "update",
            Self::Remove => "remove",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of the recap
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RecapEntry {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl RecapEntry {
    fn install(new: &PackageRef) -> Self {
        Self {
            name: new.name.clone(),
            old: None,
            new: Some(new.evr()),
            reason: None,
        }
    }

    fn update(old: &PackageRef, new: &PackageRef) -> Self {
        Self {
            name: old.name.clone(),
            old: Some(old.evr()),
            new: Some(new.evr()),
            reason: None,
        }
    }

    fn removal(old: &PackageRef, reason: String) -> Self {
        Self {
            name: old.name.clone(),
            old: Some(old.evr()),
            new: None,
            reason: Some(reason),
        }
    }
}

/// Categorized, ordered summary of a transaction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecapReport {
    entries: BTreeMap<Category, Vec<RecapEntry>>,
}

impl RecapReport {
    /// True when the transaction has nothing to do
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries of one category, in report order
    pub fn get(&self, category: Category) -> &[RecapEntry] {
        self.entries.get(&category).map_or(&[], Vec::as_slice)
    }

    /// Non-empty categories with their entries
    pub fn categories(&self) -> impl Iterator<Item = (Category, &[RecapEntry])> {
        self.entries.iter().map(|(c, e)| (*c, e.as_slice()))
    }

    /// Total number of entries
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

}

impl Serialize for RecapReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (category, entries) in &self.entries {
            map.serialize_entry(category.as_str(), entries)?;
        }
        map.end()
    }
}

/// Entries by category, each with the package it was built from
#[derive(Default)]
struct Collected {
    entries: BTreeMap<Category, Vec<(PackageRef, RecapEntry)>>,
}

impl Collected {
    fn push(&mut self, category: Category, source: &PackageRef, entry: RecapEntry) {
        self.entries
            .entry(category)
            .or_default()
            .push((source.clone(), entry));
    }

    fn into_report(self, native_arch: &str) -> RecapReport {
        let entries = self
            .entries
            .into_iter()
            .map(|(category, entries)| (category, collapse_multiarch(entries, native_arch)))
            .collect();
        RecapReport { entries }
    }
}

/// Collapse adjacent identical entries built from one package on several arches
///
/// The entry keeps the native arch as its source when one of them is native.
fn collapse_multiarch(
    entries: Vec<(PackageRef, RecapEntry)>,
    native_arch: &str,
) -> Vec<RecapEntry> {
    let mut kept: Vec<(PackageRef, RecapEntry)> = Vec::with_capacity(entries.len());

    for (source, entry) in entries {
        match kept.last_mut() {
            Some((last_source, last_entry))
                if *last_entry == entry && last_source.is_same_package_other_arch(&source) =>
            {
                debug!("Collapsing {} into {}", source, last_source);
                if source.arch == native_arch && last_source.arch != native_arch {
                    *last_source = source;
                }
            }
            _ => kept.push((source, entry)),
        }
    }
    kept.into_iter().map(|(_, entry)| entry).collect()
}

/// Build the recap of a pending transaction
///
/// Fails with `Error::UnexpectedState` when a member has a state this crate
/// does not know, when a replaced member does not point at exactly one
/// replacement inside the transaction, or when a replacement lists a package
/// that is not marked as replaced by it. No report is produced in that case.
pub fn recap(transaction: &Transaction, policy: &RecapPolicy) -> Result<RecapReport> {
    let mut ordered: Vec<&TransactionMember> = transaction.members().iter().collect();
    ordered.sort_by(|a, b| {
        ordering::transaction_cmp(a, b, &policy.module_prefix, policy.dependency_policy)
    });

    let mut report = Collected::default();

    for member in ordered {
        let pkg = &member.package;

        match &member.state {
            MemberState::NewInstall => {
                let category = if member.is_dependency {
                    Category::InstallDep
                } else {
                    Category::Install
                };
                report.push(category, pkg, RecapEntry::install(pkg));
            }
            MemberState::Erase => {
                report.push(Category::Remove, pkg, RecapEntry::removal(pkg, String::new()));
            }
            MemberState::UpdateReplaced | MemberState::ObsoleteReplaced => {
                check_replaced(transaction, member)?;
            }
            MemberState::Update | MemberState::Obsoleting => {
                if member.updates.is_empty() && member.obsoletes.is_empty() {
                    let category = match policy.dependency_policy {
                        DependencyPolicy::DependencyFlag if member.is_dependency => {
                            Category::InstallDep
                        }
                        _ => Category::Install,
                    };
                    report.push(category, pkg, RecapEntry::install(pkg));
                    continue;
                }

                for old in &member.updates {
                    check_replacement(transaction, member, old, MemberState::UpdateReplaced)?;
                    report.push(Category::Update, pkg, RecapEntry::update(old, pkg));
                }
                for old in &member.obsoletes {
                    check_replacement(transaction, member, old, MemberState::ObsoleteReplaced)?;
                    let reason = format!("Replaced by {}-{}", pkg.name, pkg.evr());
                    report.push(Category::Remove, old, RecapEntry::removal(old, reason));
                }
            }
            MemberState::Unrecognized(code) => {
                return Err(Error::UnexpectedState(format!(
                    "the transaction includes '{}' with state '{}', which is not handled",
                    pkg, code
                )));
            }
        }
    }

    let report = report.into_report(&policy.native_arch);
    debug!(
        "Recap of {} members: {} entries",
        transaction.len(),
        report.len()
    );
    Ok(report)
}

/// A package listed in `updates` / `obsoletes` must be in the transaction in
/// the matching replaced state, naming `member` as its replacement
fn check_replacement(
    transaction: &Transaction,
    member: &TransactionMember,
    old: &PackageRef,
    expected: MemberState,
) -> Result<()> {
    let pkg = &member.package;
    let verb = if expected == MemberState::UpdateReplaced {
        "updates"
    } else {
        "obsoletes"
    };

    let replaced = transaction
        .find(old)
        .and_then(|id| transaction.get(id))
        .ok_or_else(|| {
            Error::UnexpectedState(format!(
                "'{}' {} '{}', which is not part of the transaction",
                pkg, verb, old
            ))
        })?;

    if replaced.state != expected || !replaced.replaced_by.contains(pkg) {
        return Err(Error::UnexpectedState(format!(
            "'{}' {} '{}', which is not marked as replaced by it",
            pkg, verb, old
        )));
    }

    Ok(())
}

/// A replaced member must name exactly one replacement, and that replacement
/// must be in the transaction and point back at it
fn check_replaced(transaction: &Transaction, member: &TransactionMember) -> Result<()> {
    let pkg = &member.package;
    let verb = if member.state == MemberState::UpdateReplaced {
        "updated"
    } else {
        "obsoleted"
    };

    let target = match member.replaced_by.as_slice() {
        [target] => target,
        [] => {
            return Err(Error::UnexpectedState(format!(
                "'{}' is {} but nothing in the transaction replaces it",
                pkg, verb
            )));
        }
        several => {
            let mut msg = format!("'{}' is {} by several packages:", pkg, verb);
            for other in several {
                msg.push_str(&format!("\n    {}", other));
            }
            return Err(Error::UnexpectedState(msg));
        }
    };

    let replacement = transaction
        .find(target)
        .and_then(|id| transaction.get(id))
        .ok_or_else(|| {
            Error::UnexpectedState(format!(
                "'{}' is {} by '{}', which is not part of the transaction",
                pkg, verb, target
            ))
        })?;

    let back_refs = if member.state == MemberState::UpdateReplaced {
        &replacement.updates
    } else {
        &replacement.obsoletes
    };

    if !back_refs.contains(pkg) {
        return Err(Error::UnexpectedState(format!(
            "'{}' is {} by '{}', which does not list it as replaced",
            pkg, verb, target
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TransactionMember as Member;

    fn pkg(name: &str, version: &str, release: &str) -> PackageRef {
        PackageRef::new(name, 0, version, release, "noarch")
    }

    fn policy() -> RecapPolicy {
        RecapPolicy {
            module_prefix: "sm-".to_string(),
            dependency_policy: DependencyPolicy::Relations,
            native_arch: "x86_64".to_string(),
        }
    }

    fn assert_reported_once(report: &RecapReport) {
        let mut seen = std::collections::HashSet::new();
        for (_, entries) in report.categories() {
            for entry in entries {
                assert!(seen.insert(entry.name.clone()), "{} reported twice", entry.name);
            }
        }
    }

    fn update_pair(name: &str, old: &str, new: &str) -> Vec<Member> {
        let old_pkg = pkg(name, "1", old);
        let new_pkg = pkg(name, "1", new);
        vec![
            Member::new(new_pkg.clone(), MemberState::Update).with_update_of(old_pkg.clone()),
            Member::new(old_pkg, MemberState::UpdateReplaced).with_replaced_by(new_pkg),
        ]
    }

    #[test]
    fn test_simple_update() {
        let txn = Transaction::new(update_pair("foo", "1", "2"));
        let report = recap(&txn, &policy()).unwrap();

        assert_eq!(
            serde_json::to_string(&report).unwrap(),
            r#"{"update":[{"name":"foo","old":"1-1","new":"1-2"}]}"#
        );
    }

    #[test]
    fn test_empty_transaction_is_empty_report() {
        let report = recap(&Transaction::default(), &policy()).unwrap();
        assert!(report.is_empty());
        assert_eq!(serde_json::to_string(&report).unwrap(), "{}");
    }

    #[test]
    fn test_installs_and_dependencies() {
        let txn = Transaction::new(vec![
            Member::new(pkg("plouf", "2", "1"), MemberState::NewInstall).as_dependency(),
            Member::new(pkg("sm-plouf", "1", "1"), MemberState::NewInstall),
        ]);
        let report = recap(&txn, &policy()).unwrap();

        assert_eq!(report.get(Category::Install)[0].name, "sm-plouf");
        assert_eq!(report.get(Category::Install)[0].new.as_deref(), Some("1-1"));
        assert_eq!(report.get(Category::InstallDep)[0].name, "plouf");
        assert!(report.get(Category::Update).is_empty());
    }

    #[test]
    fn test_erase_has_empty_reason() {
        let txn = Transaction::new(vec![Member::new(pkg("toto", "1", "1"), MemberState::Erase)]);
        let report = recap(&txn, &policy()).unwrap();

        assert_eq!(
            serde_json::to_string(&report).unwrap(),
            r#"{"remove":[{"name":"toto","old":"1-1","reason":""}]}"#
        );
    }

    #[test]
    fn test_obsoletion_reported_as_removal() {
        let bar = pkg("bar", "1", "1");
        let baz = PackageRef::new("baz", 1, "2", "1", "noarch");
        let txn = Transaction::new(vec![
            Member::new(bar.clone(), MemberState::ObsoleteReplaced).with_replaced_by(baz.clone()),
            Member::new(baz, MemberState::Obsoleting).with_obsoletion_of(bar),
        ]);
        let report = recap(&txn, &policy()).unwrap();

        let removed = report.get(Category::Remove);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].name, "bar");
        assert_eq!(removed[0].old.as_deref(), Some("1-1"));
        assert_eq!(removed[0].reason.as_deref(), Some("Replaced by baz-1:2-1"));
        assert!(report.get(Category::Install).is_empty());
    }

    #[test]
    fn test_bare_update_member_is_install() {
        let txn = Transaction::new(vec![
            Member::new(pkg("bar", "1", "2"), MemberState::Update),
            Member::new(pkg("plouf", "2", "1"), MemberState::Update).as_dependency(),
        ]);

        let report = recap(&txn, &policy()).unwrap();
        let names: Vec<_> = report.get(Category::Install).iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["bar", "plouf"]);

        let flag_policy = RecapPolicy {
            dependency_policy: DependencyPolicy::DependencyFlag,
            ..policy()
        };
        let report = recap(&txn, &flag_policy).unwrap();
        assert_eq!(report.get(Category::Install).len(), 1);
        assert_eq!(report.get(Category::InstallDep)[0].name, "plouf");
    }

    #[test]
    fn test_report_order() {
        let mut members = update_pair("toto", "1", "2");
        members.extend(update_pair("foo", "1", "2"));
        members.push(Member::new(pkg("zed", "1", "1"), MemberState::Erase));
        members.push(Member::new(pkg("plouf", "2", "1"), MemberState::NewInstall).as_dependency());
        members.push(Member::new(pkg("bar", "1", "2"), MemberState::NewInstall));

        let report = recap(&Transaction::new(members), &policy()).unwrap();
        let json = serde_json::to_string(&report).unwrap();

        assert_eq!(
            json,
            concat!(
                r#"{"install":[{"name":"bar","new":"1-2"}],"#,
                r#""installdep":[{"name":"plouf","new":"2-1"}],"#,
                r#""update":[{"name":"foo","old":"1-1","new":"1-2"},{"name":"toto","old":"1-1","new":"1-2"}],"#,
                r#""remove":[{"name":"zed","old":"1-1","reason":""}]}"#
            )
        );
    }

    #[test]
    fn test_order_stable_across_permutations() {
        let mut members = update_pair("foo", "1", "2");
        members.extend(update_pair("Bar", "1", "3"));
        members.push(Member::new(pkg("baz", "1", "1"), MemberState::Erase));
        members.push(Member::new(pkg("sm-a", "1", "1"), MemberState::NewInstall));

        let expected = serde_json::to_string(&recap(&Transaction::new(members.clone()), &policy()).unwrap()).unwrap();

        members.reverse();
        let reversed = serde_json::to_string(&recap(&Transaction::new(members.clone()), &policy()).unwrap()).unwrap();
        assert_eq!(expected, reversed);

        members.rotate_left(2);
        let rotated = serde_json::to_string(&recap(&Transaction::new(members), &policy()).unwrap()).unwrap();
        assert_eq!(expected, rotated);
    }

    #[test]
    fn test_each_package_reported_once() {
        let mut members = update_pair("foo", "1", "2");
        members.push(Member::new(pkg("bar", "1", "1"), MemberState::Erase));
        members.push(Member::new(pkg("baz", "1", "1"), MemberState::NewInstall));

        let report = recap(&Transaction::new(members), &policy()).unwrap();
        assert_reported_once(&report);
        assert_eq!(report.len(), 3);
    }

    #[test]
    fn test_obsoletion_of_updated_package_is_fatal() {
        let old = pkg("foo", "1", "1");
        let new = pkg("foo", "2", "1");
        let other = pkg("foo2", "1", "1");
        let txn = Transaction::new(vec![
            Member::new(new.clone(), MemberState::Update).with_update_of(old.clone()),
            Member::new(old.clone(), MemberState::UpdateReplaced).with_replaced_by(new),
            Member::new(other, MemberState::Obsoleting).with_obsoletion_of(old),
        ]);

        let err = recap(&txn, &policy()).unwrap_err();
        assert!(matches!(err, Error::UnexpectedState(_)));
        assert!(err.to_string().contains("not marked as replaced by it"));
    }

    #[test]
    fn test_second_obsoleter_of_one_package_is_fatal() {
        let bar = pkg("bar", "1", "1");
        let baz1 = pkg("baz", "1", "1");
        let baz2 = pkg("baz", "2", "1");
        let txn = Transaction::new(vec![
            Member::new(baz1.clone(), MemberState::Obsoleting).with_obsoletion_of(bar.clone()),
            Member::new(baz2, MemberState::Obsoleting).with_obsoletion_of(bar.clone()),
            Member::new(bar, MemberState::ObsoleteReplaced).with_replaced_by(baz1),
        ]);

        assert!(matches!(
            recap(&txn, &policy()),
            Err(Error::UnexpectedState(_))
        ));
    }

    #[test]
    fn test_replacement_of_missing_package_is_fatal() {
        let txn = Transaction::new(vec![
            Member::new(pkg("foo", "1", "2"), MemberState::Update).with_update_of(pkg("foo", "1", "1")),
        ]);

        let err = recap(&txn, &policy()).unwrap_err();
        assert!(err.to_string().contains("not part of the transaction"));
    }

    #[test]
    fn test_multilib_update_reported_once() {
        let mut members = Vec::new();
        for arch in ["i686", "x86_64"] {
            let old = PackageRef::new("glibc", 0, "1", "1", arch);
            let new = PackageRef::new("glibc", 0, "1", "2", arch);
            members.push(Member::new(new.clone(), MemberState::Update).with_update_of(old.clone()));
            members.push(Member::new(old, MemberState::UpdateReplaced).with_replaced_by(new));
        }

        let report = recap(&Transaction::new(members), &policy()).unwrap();
        assert_eq!(
            serde_json::to_string(&report).unwrap(),
            r#"{"update":[{"name":"glibc","old":"1-1","new":"1-2"}]}"#
        );
    }

    #[test]
    fn test_multilib_with_different_old_versions_kept() {
        let mut members = Vec::new();
        for (arch, old_release) in [("i686", "0"), ("x86_64", "1")] {
            let old = PackageRef::new("glibc", 0, "1", old_release, arch);
            let new = PackageRef::new("glibc", 0, "1", "2", arch);
            members.push(Member::new(new.clone(), MemberState::Update).with_update_of(old.clone()));
            members.push(Member::new(old, MemberState::UpdateReplaced).with_replaced_by(new));
        }

        let report = recap(&Transaction::new(members), &policy()).unwrap();
        assert_eq!(report.get(Category::Update).len(), 2);
    }

    #[test]
    fn test_multilib_erase_reported_once() {
        let txn = Transaction::new(vec![
            Member::new(PackageRef::new("zlib", 0, "1", "1", "x86_64"), MemberState::Erase),
            Member::new(PackageRef::new("zlib", 0, "1", "1", "i686"), MemberState::Erase),
        ]);

        let report = recap(&txn, &policy()).unwrap();
        assert_eq!(report.get(Category::Remove).len(), 1);
        assert_reported_once(&report);
    }

    #[test]
    fn test_unrecognized_state_is_fatal() {
        let txn = Transaction::new(vec![
            Member::new(pkg("foo", "1", "1"), MemberState::NewInstall),
            Member::new(pkg("bar", "1", "1"), MemberState::from_code("x")),
        ]);

        let err = recap(&txn, &policy()).unwrap_err();
        assert!(err.is_invariant_violation());
        assert!(err.to_string().contains("state 'x'"));
    }

    #[test]
    fn test_several_replacements_is_fatal() {
        let old = pkg("foo", "1", "1");
        let txn = Transaction::new(vec![
            Member::new(pkg("foo", "1", "2"), MemberState::Update).with_update_of(old.clone()),
            Member::new(pkg("foo", "1", "3"), MemberState::Update).with_update_of(old.clone()),
            Member::new(old, MemberState::UpdateReplaced)
                .with_replaced_by(pkg("foo", "1", "2"))
                .with_replaced_by(pkg("foo", "1", "3")),
        ]);

        let err = recap(&txn, &policy()).unwrap_err();
        assert!(matches!(err, Error::UnexpectedState(_)));
        assert!(err.to_string().contains("several packages"));
    }

    #[test]
    fn test_missing_replacement_is_fatal() {
        let txn = Transaction::new(vec![Member::new(
            pkg("foo", "1", "1"),
            MemberState::ObsoleteReplaced,
        )]);
        assert!(recap(&txn, &policy()).is_err());

        let txn = Transaction::new(vec![Member::new(pkg("foo", "1", "1"), MemberState::UpdateReplaced)
            .with_replaced_by(pkg("foo", "1", "9"))]);
        let err = recap(&txn, &policy()).unwrap_err();
        assert!(err.to_string().contains("not part of the transaction"));
    }

    #[test]
    fn test_replacement_must_point_back() {
        let old = pkg("foo", "1", "1");
        let new = pkg("foo", "1", "2");
        let txn = Transaction::new(vec![
            Member::new(new.clone(), MemberState::Update),
            Member::new(old, MemberState::UpdateReplaced).with_replaced_by(new),
        ]);

        let err = recap(&txn, &policy()).unwrap_err();
        assert!(err.to_string().contains("does not list it"));
    }
}
