//! Tag projection and tag-set diffing. Both functions are pure: projection
//! reads only stored findings, and the diff touches nothing outside the
//! `anomaly:` namespace plus the fixed legacy bare-name set.

use std::collections::BTreeSet;

use crate::models::AnomalyLog;

pub const ANOMALY_TAG_PREFIX: &str = "anomaly:";

/// Bare tag names written by pre-namespace versions. Removed alongside
/// `anomaly:*` tags on every sync so old documents migrate cleanly.
pub const LEGACY_ANOMALY_TAG_NAMES: &[&str] = &[
    "balance_mismatch",
    "check_sequence_gap",
    "layout_irregularity",
    "page_discontinuity",
    "duplicate_lines",
    "reversed_columns",
    "truncated_total",
    "image_manipulation",
    "detected",
];

/// The exact tag set a document should carry, independent of remote state.
/// One namespaced tag per distinct anomaly type; no findings, no tags.
pub fn project_tags(logs: &[AnomalyLog]) -> BTreeSet<String> {
    logs.iter()
        .map(|log| format!("{}{}", ANOMALY_TAG_PREFIX, log.anomaly_type.as_str()))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagDiff {
    pub to_remove: BTreeSet<String>,
    pub to_add: BTreeSet<String>,
}

impl TagDiff {
    pub fn is_empty(&self) -> bool {
        self.to_remove.is_empty() && self.to_add.is_empty()
    }
}

fn is_owned(name: &str) -> bool {
    name.starts_with(ANOMALY_TAG_PREFIX) || LEGACY_ANOMALY_TAG_NAMES.contains(&name)
}

/// Minimal mutation taking the remote tag set to the desired one. Tags
/// outside the ownership boundary are never candidates for removal, and
/// applying the diff twice with unchanged inputs yields an empty second
/// diff.
pub fn diff_tags<'a, I>(remote: I, desired: &BTreeSet<String>) -> TagDiff
where
    I: IntoIterator<Item = &'a str>,
{
    let remote: BTreeSet<&str> = remote.into_iter().collect();

    let to_remove = remote
        .iter()
        .filter(|name| is_owned(name) && !desired.contains(**name))
        .map(|name| name.to_string())
        .collect();
    let to_add = desired
        .iter()
        .filter(|name| !remote.contains(name.as_str()))
        .cloned()
        .collect();

    TagDiff { to_remove, to_add }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnomalyLog, AnomalyType, Severity};
    use chrono::Utc;

    fn log(anomaly_type: AnomalyType) -> AnomalyLog {
        AnomalyLog {
            id: uuid::Uuid::new_v4().to_string(),
            paperless_doc_id: 1,
            anomaly_type,
            severity: Severity::Medium,
            description: String::new(),
            amount: None,
            detected_at: Utc::now(),
            resolved: false,
        }
    }

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn projection_is_one_tag_per_distinct_type() {
        let logs = vec![
            log(AnomalyType::BalanceMismatch),
            log(AnomalyType::BalanceMismatch),
            log(AnomalyType::DuplicateLines),
        ];
        let desired = project_tags(&logs);
        assert_eq!(
            desired,
            set(&["anomaly:balance_mismatch", "anomaly:duplicate_lines"])
        );
    }

    #[test]
    fn empty_findings_project_to_empty_set() {
        assert!(project_tags(&[]).is_empty());
    }

    #[test]
    fn unrelated_tags_are_never_touched() {
        let desired = set(&["anomaly:balance_mismatch"]);
        let diff = diff_tags(
            ["taxes-2024", "inbox", "anomaly:duplicate_lines"],
            &desired,
        );
        assert_eq!(diff.to_remove, set(&["anomaly:duplicate_lines"]));
        assert_eq!(diff.to_add, set(&["anomaly:balance_mismatch"]));
    }

    #[test]
    fn legacy_bare_tags_are_migrated_away() {
        let diff = diff_tags(
            ["balance_mismatch", "detected", "taxes-2024"],
            &BTreeSet::new(),
        );
        assert_eq!(diff.to_remove, set(&["balance_mismatch", "detected"]));
        assert!(diff.to_add.is_empty());
    }

    #[test]
    fn applying_the_diff_twice_yields_an_empty_second_diff() {
        let desired = set(&["anomaly:balance_mismatch", "anomaly:page_discontinuity"]);
        let remote = set(&["anomaly:truncated_total", "balance_mismatch", "inbox"]);

        let first = diff_tags(remote.iter().map(|s| s.as_str()), &desired);
        assert!(!first.is_empty());

        let mut converged: BTreeSet<String> = remote;
        for name in &first.to_remove {
            converged.remove(name);
        }
        converged.extend(first.to_add.iter().cloned());

        let second = diff_tags(converged.iter().map(|s| s.as_str()), &desired);
        assert!(second.is_empty());
        assert!(converged.contains("inbox"));
    }

    #[test]
    fn matching_state_produces_empty_diff() {
        let desired = set(&["anomaly:balance_mismatch"]);
        let diff = diff_tags(["anomaly:balance_mismatch", "inbox"], &desired);
        assert!(diff.is_empty());
    }
}
