// src/package/version.rs

//! RPM-style version comparison
//!
//! Versions are compared segment by segment: runs of digits compare
//! numerically, runs of letters lexically, a numeric segment is newer than an
//! alphabetic one, and `~` sorts before everything (pre-releases).

use super::PackageRef;
use std::cmp::Ordering;

/// Compare two version or release strings the way rpm does
pub fn rpmvercmp(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }

    let mut a = a.as_bytes();
    let mut b = b.as_bytes();

    loop {
        a = skip_separators(a);
        b = skip_separators(b);

        // Tilde: anything with a tilde is older than anything without
        match (a.first() == Some(&b'~'), b.first() == Some(&b'~')) {
            (true, true) => {
                a = &a[1..];
                b = &b[1..];
                continue;
            }
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            (false, false) => {}
        }

        if a.is_empty() || b.is_empty() {
            break;
        }

        let numeric = a[0].is_ascii_digit();
        let (seg_a, rest_a) = split_segment(a, numeric);
        let (seg_b, rest_b) = split_segment(b, numeric);
        a = rest_a;
        b = rest_b;

        // Segment types differ: numeric is newer
        if seg_b.is_empty() {
            return if numeric {
                Ordering::Greater
            } else {
                Ordering::Less
            };
        }

        let ord = if numeric {
            let seg_a = trim_leading_zeros(seg_a);
            let seg_b = trim_leading_zeros(seg_b);
            seg_a.len().cmp(&seg_b.len()).then_with(|| seg_a.cmp(seg_b))
        } else {
            seg_a.cmp(seg_b)
        };

        if ord != Ordering::Equal {
            return ord;
        }
    }

    match (a.is_empty(), b.is_empty()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, _) => Ordering::Greater,
    }
}

/// Compare two packages by epoch, then version, then release
pub fn compare_evr(a: &PackageRef, b: &PackageRef) -> Ordering {
    a.epoch
        .cmp(&b.epoch)
        .then_with(|| rpmvercmp(&a.version, &b.version))
        .then_with(|| rpmvercmp(&a.release, &b.release))
}

fn skip_separators(s: &[u8]) -> &[u8] {
    let start = s
        .iter()
        .position(|c| c.is_ascii_alphanumeric() || *c == b'~')
        .unwrap_or(s.len());
    &s[start..]
}

fn split_segment(s: &[u8], numeric: bool) -> (&[u8], &[u8]) {
    let end = s
        .iter()
        .position(|c| {
            if numeric {
                !c.is_ascii_digit()
            } else {
                !c.is_ascii_alphabetic()
            }
        })
        .unwrap_or(s.len());
    s.split_at(end)
}

fn trim_leading_zeros(s: &[u8]) -> &[u8] {
    let start = s.iter().position(|c| *c != b'0').unwrap_or(s.len());
    &s[start..]
}
