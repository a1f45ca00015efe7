// src/query/mod.rs

//! Package listing and matching
//!
//! The engine's search primitive is allowed to over-match, so every candidate
//! is checked again here against the user's patterns, by name only. Results
//! are sorted in listing order and collapsed across architectures.

use crate::engine::{PackageIndex, Source};
use crate::error::{Error, Result};
use crate::ordering::{is_module, list_cmp};
use crate::package::{PackageDetails, PackageInfo, PackageRef};
use serde::Serialize;
use std::collections::HashSet;
use tracing::debug;

/// What a command works on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackageKind {
    /// Regular packages, security modules excluded
    Packages,
    /// Security modules only; patterns get the module prefix
    Modules,
    /// Both, patterns untouched
    Any,
}

/// Which sources a listing covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusFilter {
    All,
    Installed,
    Available,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingStatus {
    Installed,
    Available,
}

/// One row of a `listing` record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListingEntry {
    pub status: ListingStatus,
    #[serde(flatten)]
    pub package: PackageRef,
    pub summary: String,
}

impl ListingEntry {
    fn new(status: ListingStatus, info: &PackageInfo) -> Self {
        Self {
            status,
            package: info.package.clone(),
            summary: info.summary.clone(),
        }
    }
}

/// Knobs shared by listing and info queries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
    pub kind: PackageKind,
    pub show_hidden: bool,
    pub module_prefix: String,
    pub native_arch: String,
}

impl QueryOptions {
    pub fn new(kind: PackageKind, module_prefix: impl Into<String>, native_arch: impl Into<String>) -> Self {
        Self {
            kind,
            show_hidden: false,
            module_prefix: module_prefix.into(),
            native_arch: native_arch.into(),
        }
    }

    pub fn show_hidden(mut self, show: bool) -> Self {
        self.show_hidden = show;
        self
    }

    fn accepts_kind(&self, info: &PackageInfo) -> bool {
        let module = is_module(info.name(), &self.module_prefix);
        match self.kind {
            PackageKind::Packages => !module,
            PackageKind::Modules => module,
            PackageKind::Any => true,
        }
    }

    fn accepts(&self, info: &PackageInfo) -> bool {
        self.accepts_kind(info) && (self.show_hidden || !info.hidden)
    }
}

impl AsRef<PackageRef> for PackageInfo {
    fn as_ref(&self) -> &PackageRef {
        &self.package
    }
}

impl AsRef<PackageRef> for ListingEntry {
    fn as_ref(&self) -> &PackageRef {
        &self.package
    }
}

/// Default and rewrite user patterns
///
/// No pattern means everything. For security modules, patterns lacking the
/// module prefix get it: `b*` becomes `<prefix>b*`.
pub fn normalize_patterns(patterns: &[String], kind: PackageKind, module_prefix: &str) -> Vec<String> {
    if patterns.is_empty() {
        return normalize_patterns(&["*".to_string()], kind, module_prefix);
    }

    patterns
        .iter()
        .map(|pattern| {
            if kind == PackageKind::Modules && !pattern.starts_with(module_prefix) {
                format!("{}{}", module_prefix, pattern)
            } else {
                pattern.clone()
            }
        })
        .collect()
}

/// Collapse adjacent entries that are one package built for several arches
///
/// Input must be in listing order. The native arch wins; otherwise the first
/// entry seen is kept. Applying this twice changes nothing.
pub fn dedup_multiarch<T: AsRef<PackageRef>>(items: Vec<T>, native_arch: &str) -> Vec<T> {
    let mut kept: Vec<T> = Vec::with_capacity(items.len());

    for item in items {
        match kept.last_mut() {
            Some(last) if last.as_ref().is_same_package_other_arch(item.as_ref()) => {
                if item.as_ref().arch == native_arch && last.as_ref().arch != native_arch {
                    *last = item;
                }
            }
            _ => kept.push(item),
        }
    }
    kept
}

/// Candidates from one source whose name matches one of `patterns`
///
/// Patterns are used as given; callers normalize them first. Hidden packages
/// are kept here, filtering happens in `visible`.
fn matching(
    index: &dyn PackageIndex,
    source: Source,
    patterns: &[String],
    options: &QueryOptions,
) -> Result<Vec<PackageInfo>> {
    let mut seen = HashSet::new();
    let mut found = Vec::new();

    for pattern in patterns {
        let glob = glob::Pattern::new(pattern).map_err(|e| Error::InvalidPattern {
            pattern: pattern.clone(),
            reason: e.to_string(),
        })?;

        let candidates = index.search(source, pattern)?;
        debug!("{} {} candidates for '{}'", candidates.len(), source, pattern);

        for info in candidates {
            if glob.matches(info.name()) && seen.insert(info.package.clone()) {
                found.push(info);
            }
        }
    }

    found.retain(|info| options.accepts_kind(info));
    found.sort_by(|a, b| list_cmp(&a.package, &b.package));
    Ok(found)
}

fn visible(infos: Vec<PackageInfo>, options: &QueryOptions) -> Vec<PackageInfo> {
    let shown: Vec<PackageInfo> = infos.into_iter().filter(|i| options.accepts(i)).collect();
    dedup_multiarch(shown, &options.native_arch)
}

/// Build the `listing` payload
///
/// `All` lists installed entries first, then available ones. Available
/// entries never include a name that is installed.
pub fn list_packages(
    index: &dyn PackageIndex,
    filter: StatusFilter,
    patterns: &[String],
    options: &QueryOptions,
) -> Result<Vec<ListingEntry>> {
    let patterns = normalize_patterns(patterns, options.kind, &options.module_prefix);
    let installed = matching(index, Source::Installed, &patterns, options)?;

    let mut entries = Vec::new();

    if filter != StatusFilter::Available {
        entries.extend(
            visible(installed.clone(), options)
                .iter()
                .map(|info| ListingEntry::new(ListingStatus::Installed, info)),
        );
    }

    if filter != StatusFilter::Installed {
        let installed_names: HashSet<&str> = installed.iter().map(|i| i.name()).collect();
        let available: Vec<PackageInfo> = matching(index, Source::Available, &patterns, options)?
            .into_iter()
            .filter(|info| !installed_names.contains(info.name()))
            .collect();
        entries.extend(
            visible(available, options)
                .iter()
                .map(|info| ListingEntry::new(ListingStatus::Available, info)),
        );
    }

    Ok(entries)
}

/// Build the `pkginfos` payload: installed matches, then available ones not installed
pub fn package_infos(
    index: &dyn PackageIndex,
    patterns: &[String],
    options: &QueryOptions,
) -> Result<Vec<PackageDetails>> {
    let patterns = normalize_patterns(patterns, options.kind, &options.module_prefix);
    let installed = matching(index, Source::Installed, &patterns, options)?;
    let installed_names: HashSet<String> = installed.iter().map(|i| i.name().to_string()).collect();

    let available: Vec<PackageInfo> = matching(index, Source::Available, &patterns, options)?
        .into_iter()
        .filter(|info| !installed_names.contains(info.name()))
        .collect();

    let mut details: Vec<PackageDetails> = visible(installed, options)
        .iter()
        .map(PackageDetails::from)
        .collect();
    details.extend(visible(available, options).iter().map(PackageDetails::from));
    Ok(details)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Index that returns everything, whatever the pattern
    struct Greedy {
        installed: Vec<PackageInfo>,
        available: Vec<PackageInfo>,
    }

    impl PackageIndex for Greedy {
        fn search(&self, source: Source, _pattern: &str) -> Result<Vec<PackageInfo>> {
            Ok(match source {
                Source::Installed => self.installed.clone(),
                Source::Available => self.available.clone(),
            })
        }
    }

    fn info(name: &str, version: &str, arch: &str) -> PackageInfo {
        PackageInfo::new(PackageRef::new(name, 0, version, "1", arch), format!("{} summary", name))
    }

    fn options(kind: PackageKind) -> QueryOptions {
        QueryOptions::new(kind, "sm-", "x86_64")
    }

    fn names(entries: &[ListingEntry]) -> Vec<String> {
        entries
            .iter()
            .map(|e| format!("{}:{}", e.package.name, e.package.arch))
            .collect()
    }

    fn patterns(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_normalize_patterns() {
        assert_eq!(normalize_patterns(&[], PackageKind::Packages, "sm-"), vec!["*"]);
        assert_eq!(normalize_patterns(&[], PackageKind::Modules, "sm-"), vec!["sm-*"]);
        assert_eq!(
            normalize_patterns(&patterns(&["b*", "sm-a"]), PackageKind::Modules, "sm-"),
            vec!["sm-b*", "sm-a"]
        );
        assert_eq!(
            normalize_patterns(&patterns(&["b*"]), PackageKind::Packages, "sm-"),
            vec!["b*"]
        );
    }

    #[test]
    fn test_refilter_on_name_only() {
        let index = Greedy {
            installed: vec![info("foo", "1", "noarch"), info("bar", "1", "noarch")],
            available: vec![],
        };
        let entries = list_packages(&index, StatusFilter::All, &patterns(&["f*"]), &options(PackageKind::Packages)).unwrap();
        assert_eq!(names(&entries), ["foo:noarch"]);
    }

    #[test]
    fn test_star_equals_no_pattern() {
        let index = Greedy {
            installed: vec![info("foo", "1", "noarch"), info("sm-x", "1", "noarch")],
            available: vec![info("bar", "1", "noarch")],
        };
        let opts = options(PackageKind::Packages);
        assert_eq!(
            list_packages(&index, StatusFilter::All, &[], &opts).unwrap(),
            list_packages(&index, StatusFilter::All, &patterns(&["*"]), &opts).unwrap()
        );
    }

    #[test]
    fn test_kinds_split_on_prefix() {
        let index = Greedy {
            installed: vec![info("foo", "1", "noarch"), info("sm-fw", "1", "noarch")],
            available: vec![],
        };

        let pkgs = list_packages(&index, StatusFilter::Installed, &[], &options(PackageKind::Packages)).unwrap();
        assert_eq!(names(&pkgs), ["foo:noarch"]);

        let modules = list_packages(&index, StatusFilter::Installed, &patterns(&["f*"]), &options(PackageKind::Modules)).unwrap();
        assert_eq!(names(&modules), ["sm-fw:noarch"]);
    }

    #[test]
    fn test_hidden_filter() {
        let mut hidden = info("sm-core", "1", "noarch");
        hidden.hidden = true;
        let index = Greedy {
            installed: vec![hidden, info("sm-web", "1", "noarch")],
            available: vec![],
        };

        let opts = options(PackageKind::Modules);
        assert_eq!(list_packages(&index, StatusFilter::All, &[], &opts).unwrap().len(), 1);

        let opts = opts.show_hidden(true);
        assert_eq!(list_packages(&index, StatusFilter::All, &[], &opts).unwrap().len(), 2);
    }

    #[test]
    fn test_available_excludes_installed_names() {
        let index = Greedy {
            installed: vec![info("foo", "1", "noarch")],
            available: vec![info("foo", "2", "noarch"), info("bar", "1", "noarch")],
        };
        let entries = list_packages(&index, StatusFilter::Available, &[], &options(PackageKind::Packages)).unwrap();
        assert_eq!(names(&entries), ["bar:noarch"]);
        assert_eq!(entries[0].status, ListingStatus::Available);
    }

    #[test]
    fn test_all_lists_installed_first() {
        let index = Greedy {
            installed: vec![info("zsh", "1", "x86_64")],
            available: vec![info("apr", "1", "x86_64")],
        };
        let entries = list_packages(&index, StatusFilter::All, &[], &options(PackageKind::Packages)).unwrap();
        assert_eq!(names(&entries), ["zsh:x86_64", "apr:x86_64"]);
        assert_eq!(entries[0].status, ListingStatus::Installed);
    }

    #[test]
    fn test_sorted_case_insensitive() {
        let index = Greedy {
            installed: vec![info("zlib", "1", "noarch"), info("Bash", "1", "noarch"), info("apr", "1", "noarch")],
            available: vec![],
        };
        let entries = list_packages(&index, StatusFilter::Installed, &[], &options(PackageKind::Packages)).unwrap();
        assert_eq!(names(&entries), ["apr:noarch", "Bash:noarch", "zlib:noarch"]);
    }

    #[test]
    fn test_dedup_native_wins() {
        let items = vec![
            info("glibc", "2.38", "aarch64"),
            info("glibc", "2.38", "i686"),
            info("glibc", "2.38", "x86_64"),
            info("zlib", "1", "i686"),
        ];
        let deduped = dedup_multiarch(items, "x86_64");
        let arches: Vec<_> = deduped.iter().map(|i| i.package.arch.as_str()).collect();
        assert_eq!(arches, ["x86_64", "i686"]);

        let again = dedup_multiarch(deduped.clone(), "x86_64");
        assert_eq!(again, deduped);
    }

    #[test]
    fn test_dedup_first_wins_without_native() {
        let items = vec![info("glibc", "2.38", "aarch64"), info("glibc", "2.38", "i686")];
        let deduped = dedup_multiarch(items, "ppc64le");
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].package.arch, "aarch64");
    }

    #[test]
    fn test_dedup_keeps_other_versions() {
        let items = vec![info("foo", "1", "i686"), info("foo", "2", "x86_64")];
        assert_eq!(dedup_multiarch(items, "x86_64").len(), 2);
    }

    #[test]
    fn test_invalid_pattern() {
        let index = Greedy {
            installed: vec![],
            available: vec![],
        };
        let err = list_packages(&index, StatusFilter::All, &patterns(&["[abc"]), &options(PackageKind::Packages)).unwrap_err();
        assert!(matches!(err, Error::InvalidPattern { .. }));
    }

    #[test]
    fn test_listing_entry_json_is_flat() {
        let entry = ListingEntry::new(ListingStatus::Installed, &info("foo", "1", "noarch"));
        let json = serde_json::to_string(&entry).unwrap();
        assert_eq!(
            json,
            r#"{"status":"installed","name":"foo","epoch":0,"version":"1","release":"1","arch":"noarch","summary":"foo summary"}"#
        );
    }

    #[test]
    fn test_package_infos() {
        let mut foo = info("foo", "1", "noarch");
        foo.license = "MIT".to_string();
        foo.source_name = Some("foo-src".to_string());
        let index = Greedy {
            installed: vec![foo],
            available: vec![info("foo", "2", "noarch"), info("fob", "1", "noarch"), info("bar", "1", "noarch")],
        };

        let details = package_infos(&index, &patterns(&["fo*"]), &options(PackageKind::Any)).unwrap();
        let names: Vec<_> = details.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["foo", "fob"]);
        assert_eq!(details[0].base_package_name, "foo-src");
        assert_eq!(details[0].license, "MIT");
    }
}
