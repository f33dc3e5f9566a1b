//! Reconciliation planner.
//!
//! Diffs a source listing against one destination listing and produces the
//! actions that converge the destination:
//!
//! | source | destination | action |
//! |---|---|---|
//! | present | absent | copy |
//! | mtime ≤ dest mtime | present | none |
//! | newer, same fingerprint | present | touch |
//! | newer, different fingerprint | present | copy |
//! | absent | present | delete |
//!
//! Keys are compared after prefix substitution: a source key matches the
//! destination key [`BucketRule::dest_name`] maps it to.

use std::collections::HashSet;
use sync_types::{Action, BucketRule, CopyStrategy, ObjectRecord, Snapshot};

use crate::strategy::choose_strategy;

/// Actions for one destination, split into the two execution phases.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    /// Copy and touch actions.
    pub forward: Vec<Action>,
    /// Delete actions.
    pub cleanup: Vec<Action>,
}

/// Action counts of a [`Plan`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanSummary {
    /// Server-side copies.
    pub express: usize,
    /// Stream-through copies.
    pub stream: usize,
    /// Metadata touches.
    pub touches: usize,
    /// Deletions.
    pub deletes: usize,
}

impl PlanSummary {
    /// Total number of actions.
    pub fn total(&self) -> usize {
        self.express + self.stream + self.touches + self.deletes
    }
}

impl Plan {
    /// Total number of actions in both phases.
    pub fn len(&self) -> usize {
        self.forward.len() + self.cleanup.len()
    }

    /// Check whether the destination is already converged.
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty() && self.cleanup.is_empty()
    }

    /// Iterate over every action, forward phase first.
    pub fn iter(&self) -> impl Iterator<Item = &Action> {
        self.forward.iter().chain(self.cleanup.iter())
    }

    /// Count actions by kind and strategy.
    pub fn summary(&self) -> PlanSummary {
        let mut summary = PlanSummary::default();
        for action in self.iter() {
            match action {
                Action::Copy {
                    strategy: CopyStrategy::Express,
                    ..
                } => summary.express += 1,
                Action::Copy {
                    strategy: CopyStrategy::Stream,
                    ..
                } => summary.stream += 1,
                Action::Touch { .. } => summary.touches += 1,
                Action::Delete { .. } => summary.deletes += 1,
            }
        }
        summary
    }
}

/// Plan the actions that converge `dest` to `source` under `rule`.
///
/// The timestamp check runs before the fingerprint check: a destination that
/// is as new as or newer than its source is left alone even when the
/// fingerprints differ.
pub fn plan(rule: &BucketRule, source: &Snapshot, dest: &Snapshot) -> Plan {
    let copy = |record: &ObjectRecord| Action::Copy {
        key: record.key.clone(),
        size: record.size,
        strategy: choose_strategy(&source.account, &dest.account, record.size),
    };

    let mut forward = Vec::new();
    let mut mapped = HashSet::with_capacity(source.len());

    for (key, record) in &source.objects {
        let dest_key = rule.dest_name(key);
        match dest.get(&dest_key) {
            None => forward.push(copy(record)),
            Some(existing) if record.last_modified <= existing.last_modified => {}
            Some(existing) if record.fingerprint == existing.fingerprint => {
                forward.push(Action::Touch {
                    key: dest_key.clone(),
                })
            }
            Some(_) => forward.push(copy(record)),
        }
        mapped.insert(dest_key);
    }

    let cleanup = dest
        .objects
        .keys()
        .filter(|key| !mapped.contains(key.as_str()))
        .map(|key| Action::Delete { key: key.clone() })
        .collect();

    Plan { forward, cleanup }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::collections::HashSet;
    use sync_types::{AccountId, ObjectRecord};

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn rule(src_prefix: &str, dest_prefix: &str) -> BucketRule {
        BucketRule {
            source_bucket: "src".into(),
            source_prefix: src_prefix.into(),
            source_region: "us-west-2".into(),
            dest_bucket: "dest".into(),
            dest_prefix: dest_prefix.into(),
            dest_regions: vec!["eu-west-1".into()],
        }
    }

    fn obj(key: &str, mtime: DateTime<Utc>, fp: &str, size: u64) -> ObjectRecord {
        ObjectRecord::new(key, mtime, fp, size)
    }

    fn snap(records: Vec<ObjectRecord>) -> Snapshot {
        Snapshot::from_records(AccountId::Base, records)
    }

    fn as_set(plan: &Plan) -> HashSet<Action> {
        plan.iter().cloned().collect()
    }

    #[test]
    fn newer_source_with_same_fingerprint_is_touched() {
        let source = snap(vec![obj("a", t(2), "X", 10)]);
        let dest = snap(vec![obj("a", t(1), "X", 10)]);
        let plan = plan(&rule("", ""), &source, &dest);
        assert_eq!(plan.forward, vec![Action::Touch { key: "a".into() }]);
        assert!(plan.cleanup.is_empty());
    }

    #[test]
    fn equal_timestamp_wins_over_fingerprint_mismatch() {
        let source = snap(vec![obj("a", t(2), "X", 10)]);
        let dest = snap(vec![obj("a", t(2), "Y", 10)]);
        assert!(plan(&rule("", ""), &source, &dest).is_empty());
    }

    #[test]
    fn newer_destination_is_converged() {
        let source = snap(vec![obj("a", t(1), "X", 10)]);
        let dest = snap(vec![obj("a", t(5), "Y", 99)]);
        assert!(plan(&rule("", ""), &source, &dest).is_empty());
    }

    #[test]
    fn newer_source_with_new_content_is_copied() {
        let source = snap(vec![obj("a", t(2), "X", 10)]);
        let dest = snap(vec![obj("a", t(1), "Y", 10)]);
        let plan = plan(&rule("", ""), &source, &dest);
        assert_eq!(
            plan.forward,
            vec![Action::Copy {
                key: "a".into(),
                size: 10,
                strategy: CopyStrategy::Express,
            }]
        );
    }

    #[test]
    fn missing_destination_is_copied() {
        let source = snap(vec![obj("a", t(1), "X", 7)]);
        let plan = plan(&rule("", ""), &source, &snap(vec![]));
        assert_eq!(plan.summary().express, 1);
        assert_eq!(plan.forward[0].key(), "a");
    }

    #[test]
    fn destination_only_key_is_deleted_regardless_of_attributes() {
        let dest = snap(vec![obj("b", t(100), "Z", u64::MAX)]);
        let plan = plan(&rule("", ""), &snap(vec![]), &dest);
        assert!(plan.forward.is_empty());
        assert_eq!(plan.cleanup, vec![Action::Delete { key: "b".into() }]);
    }

    #[test]
    fn keys_match_after_prefix_substitution() {
        let source = snap(vec![
            obj("srcfolder/same", t(1), "X", 1),
            obj("srcfolder/new", t(1), "X", 1),
        ]);
        let dest = snap(vec![
            obj("destfolder/same", t(1), "X", 1),
            obj("destfolder/stale", t(1), "X", 1),
        ]);
        let plan = plan(&rule("srcfolder/", "destfolder/"), &source, &dest);
        assert_eq!(
            as_set(&plan),
            HashSet::from([
                Action::Copy {
                    key: "srcfolder/new".into(),
                    size: 1,
                    strategy: CopyStrategy::Express,
                },
                Action::Delete {
                    key: "destfolder/stale".into()
                },
            ])
        );
    }

    #[test]
    fn touch_targets_destination_key() {
        let source = snap(vec![obj("in/a", t(2), "X", 1)]);
        let dest = snap(vec![obj("out/a", t(1), "X", 1)]);
        let plan = plan(&rule("in/", "out/"), &source, &dest);
        assert_eq!(plan.forward, vec![Action::Touch { key: "out/a".into() }]);
    }

    #[test]
    fn cross_account_destination_streams() {
        let source = snap(vec![obj("a", t(1), "X", 10)]);
        let dest = Snapshot::empty(AccountId::AccessKey("CN".into()));
        let plan = plan(&rule("", ""), &source, &dest);
        assert_eq!(plan.summary().stream, 1);
        assert_eq!(plan.summary().express, 0);
    }

    #[test]
    fn action_count_matches_set_arithmetic() {
        // Exhaustive small grid: each key is in src only, dest only, or both
        // with every timestamp / fingerprint relationship.
        let mut src = Vec::new();
        let mut dst = Vec::new();
        let mut expected = 0;
        for i in 0..5 {
            src.push(obj(&format!("only-src-{i}"), t(i), "X", 1));
            dst.push(obj(&format!("only-dst-{i}"), t(i), "X", 1));
            expected += 2;
        }
        let cases = [
            (t(1), t(1), "X", "X", false),
            (t(1), t(1), "X", "Y", false),
            (t(2), t(1), "X", "X", true),
            (t(2), t(1), "X", "Y", true),
            (t(1), t(2), "X", "X", false),
            (t(1), t(2), "X", "Y", false),
        ];
        for (i, (s_time, d_time, s_fp, d_fp, acts)) in cases.iter().enumerate() {
            let key = format!("both-{i}");
            src.push(obj(&key, *s_time, s_fp, 1));
            dst.push(obj(&key, *d_time, d_fp, 1));
            if *acts {
                expected += 1;
            }
        }

        let source = snap(src);
        let dest = snap(dst);
        let plan = plan(&rule("", ""), &source, &dest);
        assert_eq!(plan.len(), expected);
        assert_eq!(plan.summary().total(), expected);
        assert_eq!(plan.summary().deletes, 5);
        assert_eq!(plan.summary().touches, 1);
        assert_eq!(plan.summary().express, 6);

        // One action at most per key.
        let keys: HashSet<&str> = plan.iter().map(Action::key).collect();
        assert_eq!(keys.len(), plan.len());
    }

    #[test]
    fn plan_is_idempotent_after_convergence() {
        let rule = rule("s/", "d/");
        let now = t(10);
        let source = snap(vec![
            obj("s/a", t(1), "A", 1),
            obj("s/b", t(5), "B", 2),
            obj("s/c", t(5), "C", 3),
        ]);
        let dest = snap(vec![
            obj("d/b", t(1), "B", 2),
            obj("d/c", t(1), "OLD", 3),
            obj("d/gone", t(1), "G", 4),
        ]);
        let first = plan(&rule, &source, &dest);
        assert_eq!(first.len(), 4);

        // Apply the plan the way the storage API would: writes stamp "now".
        let mut converged = dest.objects.clone();
        for action in first.iter() {
            match action {
                Action::Copy { key, .. } => {
                    let record = &source.objects[key];
                    let dest_key = rule.dest_name(key);
                    converged.insert(
                        dest_key.clone(),
                        obj(&dest_key, now, record.fingerprint.as_str(), record.size),
                    );
                }
                Action::Touch { key } => {
                    if let Some(record) = converged.get_mut(key) {
                        record.last_modified = now + Duration::seconds(1);
                    }
                }
                Action::Delete { key } => {
                    converged.remove(key);
                }
            }
        }
        let dest = Snapshot::new(AccountId::Base, converged);
        assert!(plan(&rule, &source, &dest).is_empty());
    }

    #[test]
    fn empty_listings_plan_nothing() {
        assert!(plan(&rule("", ""), &snap(vec![]), &snap(vec![])).is_empty());
    }
}
