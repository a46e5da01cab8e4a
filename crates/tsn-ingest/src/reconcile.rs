//! Presence-based reconciliation.
//!
//! The destination is the source of truth. A candidate is written only when
//! no existing record has the same `(timestamp, source_id)` key; values are
//! never compared, so an existing value always wins over a different
//! candidate value.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::record::{CanonicalRecord, RecordKey};

/// Return the candidates whose key is absent from `existing`, in candidate
/// order.
///
/// Duplicate keys among the candidates are all forwarded; collapsing them
/// is [`dedup_candidates`]'s job. Runs in `O(|existing| + |candidates|)`.
pub fn reconcile(existing: &[CanonicalRecord], candidates: &[CanonicalRecord]) -> Vec<CanonicalRecord> {
    let present: HashSet<RecordKey<'_>> = existing.iter().map(CanonicalRecord::key).collect();

    candidates
        .iter()
        .filter(|candidate| !present.contains(&candidate.key()))
        .cloned()
        .collect()
}

/// What to do with candidates that share a key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Pass every copy through to reconciliation and the write.
    #[default]
    Forward,
    /// Keep only the first candidate seen for each key.
    KeepFirst,
}

/// Apply `policy` to a candidate set before reconciliation.
pub fn dedup_candidates(candidates: Vec<CanonicalRecord>, policy: DuplicatePolicy) -> Vec<CanonicalRecord> {
    match policy {
        DuplicatePolicy::Forward => candidates,
        DuplicatePolicy::KeepFirst => {
            let mut seen = HashSet::with_capacity(candidates.len());
            let keep: Vec<bool> = candidates
                .iter()
                .map(|c| seen.insert((c.timestamp, c.source_id.as_str())))
                .collect();
            candidates
                .into_iter()
                .zip(keep)
                .filter_map(|(c, keep)| keep.then_some(c))
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn rec(month: u32, value: f64, source: &str) -> CanonicalRecord {
        CanonicalRecord::new(NaiveDate::from_ymd_opt(2023, month, 1).unwrap(), value, source)
    }

    #[test]
    fn test_empty_existing_forwards_everything() {
        let candidates = vec![rec(1, 10.0, "a"), rec(2, 20.0, "a")];
        assert_eq!(reconcile(&[], &candidates), candidates);
    }

    #[test]
    fn test_existing_keys_are_excluded() {
        let existing = vec![rec(1, 10.0, "a")];
        let candidates = vec![rec(1, 10.0, "a"), rec(2, 20.0, "a"), rec(1, 5.0, "b")];
        assert_eq!(
            reconcile(&existing, &candidates),
            vec![rec(2, 20.0, "a"), rec(1, 5.0, "b")]
        );
    }

    #[test]
    fn test_existing_value_wins_on_mismatch() {
        let existing = vec![rec(1, 20.0, "src2")];
        let candidates = vec![rec(1, 99.0, "src2")];
        assert!(reconcile(&existing, &candidates).is_empty());
    }

    #[test]
    fn test_duplicate_candidates_are_all_forwarded() {
        let existing = vec![rec(1, 1.0, "a")];
        let candidates = vec![rec(2, 2.0, "a"), rec(1, 1.0, "a"), rec(2, 3.0, "a"), rec(2, 2.0, "a")];
        let out = reconcile(&existing, &candidates);
        assert_eq!(out, vec![rec(2, 2.0, "a"), rec(2, 3.0, "a"), rec(2, 2.0, "a")]);
    }

    #[test]
    fn test_rerun_after_write_is_empty() {
        let mut existing = vec![rec(1, 1.0, "a"), rec(3, 3.0, "b")];
        let candidates = vec![rec(1, 1.0, "a"), rec(2, 2.0, "a"), rec(3, 3.0, "a"), rec(2, 2.0, "a")];

        let write_set = reconcile(&existing, &candidates);
        assert_eq!(write_set.len(), 3);

        existing.extend(write_set);
        assert!(reconcile(&existing, &candidates).is_empty());
    }

    #[test]
    fn test_output_keys_never_in_existing_and_counts_match() {
        let existing = vec![rec(1, 0.0, "a"), rec(2, 0.0, "b"), rec(4, 0.0, "a")];
        let candidates: Vec<_> = (1..=6)
            .flat_map(|m| [rec(m, 1.0, "a"), rec(m, 1.0, "b"), rec(m, 2.0, "a")])
            .collect();

        let out = reconcile(&existing, &candidates);
        let existing_keys: HashSet<_> = existing.iter().map(CanonicalRecord::key).collect();

        assert!(out.iter().all(|r| !existing_keys.contains(&r.key())));
        for candidate in candidates.iter().filter(|c| !existing_keys.contains(&c.key())) {
            let in_candidates = candidates.iter().filter(|c| *c == candidate).count();
            let in_output = out.iter().filter(|c| *c == candidate).count();
            assert_eq!(in_candidates, in_output, "count mismatch for {}", candidate.key());
        }
    }

    #[test]
    fn test_keep_first_policy() {
        let candidates = vec![rec(1, 1.0, "a"), rec(1, 2.0, "a"), rec(1, 3.0, "b"), rec(2, 4.0, "a")];
        let kept = dedup_candidates(candidates.clone(), DuplicatePolicy::KeepFirst);
        assert_eq!(kept, vec![rec(1, 1.0, "a"), rec(1, 3.0, "b"), rec(2, 4.0, "a")]);

        let forwarded = dedup_candidates(candidates.clone(), DuplicatePolicy::Forward);
        assert_eq!(forwarded, candidates);
    }

    #[test]
    fn test_policy_parsing() {
        let policy: DuplicatePolicy = serde_yaml::from_str("keep_first").unwrap();
        assert_eq!(policy, DuplicatePolicy::KeepFirst);
        assert_eq!(DuplicatePolicy::default(), DuplicatePolicy::Forward);
    }
}
