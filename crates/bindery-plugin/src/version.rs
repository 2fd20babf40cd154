// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Dotted version comparison for `min_app_version` checks.

use std::cmp::Ordering;

/// Plugin API version of this host. Manifests declaring a higher
/// `min_app_version` are rejected.
pub const HOST_VERSION: &str = "1.0.0";

/// Compare two dotted versions numerically, component by component.
///
/// Missing components count as zero ("1.2" == "1.2.0"). Non-numeric
/// components compare as zero after any leading digits are taken, so
/// "2.0-beta" reads as 2.0.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let left = components(a);
    let right = components(b);
    let len = left.len().max(right.len());
    for i in 0..len {
        let l = left.get(i).copied().unwrap_or(0);
        let r = right.get(i).copied().unwrap_or(0);
        match l.cmp(&r) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

fn components(version: &str) -> Vec<u64> {
    version
        .trim()
        .split('.')
        .map(|part| {
            let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse().unwrap_or(0)
        })
        .collect()
}
