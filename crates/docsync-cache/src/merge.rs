//! Merge policy for external changes
//!
//! Applied when a flush (or a reload of a dirty document) finds the backing
//! file changed since the cache last observed it. The body last seen on
//! disk is the common ancestor: it tells an external edit apart from a line
//! the cache itself changed.
//!
//! # Rules
//! - Task identity is the trimmed text plus its occurrence index, so a
//!   document listing "buy milk" twice matches each copy separately
//! - Cache content wins for matched lines: text, indent and passthrough
//!   lines all come from the cache
//! - A disk line changed since the base with a more terminal status
//!   promotes the cached line (`archived > completed > pending`); the
//!   winner's stamps come along
//! - Disk tasks that are new since the base are appended in disk order with
//!   their disk status; disk tasks still present in the base were edited or
//!   removed by the cache and are dropped
//! - Without a base (document created in memory) every disk-only task is new

use docsync_model::{Body, Entry, LineRecord};
use std::collections::HashMap;

/// Result of reconciling cached content with disk content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Merged content
    pub body: Body,
    /// Disk-only tasks appended
    pub added: usize,
    /// Cached tasks that took a more terminal status from disk
    pub promoted: usize,
}

impl MergeOutcome {
    /// Whether the merge changed the cached content
    #[inline]
    #[must_use]
    pub fn changed(&self) -> bool {
        self.added > 0 || self.promoted > 0
    }
}

/// Tasks grouped by identity, in document order
struct Occurrences<'a>(HashMap<&'a str, Vec<(usize, &'a LineRecord)>>);

impl<'a> Occurrences<'a> {
    fn of(body: &'a Body) -> Self {
        let mut map: HashMap<&str, Vec<(usize, &LineRecord)>> = HashMap::new();
        for (idx, record) in body.tasks() {
            map.entry(record.identity()).or_default().push((idx, record));
        }
        Self(map)
    }

    fn nth(&self, identity: &str, nth: usize) -> Option<(usize, &'a LineRecord)> {
        self.0.get(identity).and_then(|found| found.get(nth)).copied()
    }
}

/// Merge `disk` into `cached`, using `base` as the last observed disk body
#[must_use]
pub fn merge(base: Option<&Body>, cached: &Body, disk: &Body) -> MergeOutcome {
    let theirs = Occurrences::of(disk);
    let ancestor = base.map(Occurrences::of);
    let unchanged_since_base = |identity: &str, nth: usize, record: &LineRecord| {
        ancestor
            .as_ref()
            .and_then(|a| a.nth(identity, nth))
            .is_some_and(|(_, seen)| seen == record)
    };

    let mut matched = vec![false; disk.entries.len()];
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut body = cached.clone();
    let mut promoted = 0;

    for task in body.entries.iter_mut().filter_map(Entry::as_task_mut) {
        let nth = next_occurrence(&mut counts, task.identity());
        let Some((idx, disk_task)) = theirs.nth(task.identity(), nth) else {
            continue;
        };
        matched[idx] = true;
        if disk_task.status > task.status && !unchanged_since_base(task.identity(), nth, disk_task) {
            task.status = disk_task.status;
            task.completed_at = disk_task.completed_at.or(task.completed_at);
            task.archived_at = disk_task.archived_at;
            promoted += 1;
        }
    }

    let mut added = 0;
    let mut disk_counts: HashMap<String, usize> = HashMap::new();
    for (idx, record) in disk.tasks() {
        let nth = next_occurrence(&mut disk_counts, record.identity());
        if matched[idx] {
            continue;
        }
        let in_base = ancestor
            .as_ref()
            .is_some_and(|a| a.nth(record.identity(), nth).is_some());
        if !in_base {
            body.entries.push(Entry::Task(record.clone()));
            added += 1;
        }
    }

    MergeOutcome {
        body,
        added,
        promoted,
    }
}

fn next_occurrence(counts: &mut HashMap<String, usize>, identity: &str) -> usize {
    let slot = counts.entry(identity.to_string()).or_insert(0);
    let nth = *slot;
    *slot += 1;
    nth
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsync_model::{LineStatus, Stamp};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn task(text: &str, status: LineStatus) -> Entry {
        let mut record = LineRecord::pending(text);
        record.status = status;
        if status != LineStatus::Pending {
            record.completed_at = Stamp::parse("2025-01-01");
        }
        if status == LineStatus::Archived {
            record.archived_at = Stamp::parse("2025-01-02T09:00:00Z");
        }
        Entry::Task(record)
    }

    fn body(entries: Vec<Entry>) -> Body {
        Body {
            entries,
            trailing_newline: true,
        }
    }

    #[test]
    fn both_sides_additions_survive() {
        let base = vec![Entry::raw("# Today"), task("buy milk", LineStatus::Pending)];
        let mut ours = base.clone();
        ours.push(task("ours", LineStatus::Pending));
        let mut theirs = base;
        theirs.push(task("theirs", LineStatus::Pending));

        let outcome = merge(None, &body(ours), &body(theirs));
        assert_eq!(
            outcome.body,
            body(vec![
                Entry::raw("# Today"),
                task("buy milk", LineStatus::Pending),
                task("ours", LineStatus::Pending),
                task("theirs", LineStatus::Pending),
            ])
        );
        assert_eq!((outcome.added, outcome.promoted), (1, 0));
    }

    #[test]
    fn more_terminal_status_wins_in_both_directions() {
        let ours = body(vec![
            task("a", LineStatus::Archived),
            task("b", LineStatus::Pending),
        ]);
        let theirs = body(vec![
            task("a", LineStatus::Completed),
            task("b", LineStatus::Completed),
        ]);

        let outcome = merge(None, &ours, &theirs);
        let statuses: Vec<_> = outcome.body.tasks().map(|(_, t)| t.status).collect();
        assert_eq!(statuses, vec![LineStatus::Archived, LineStatus::Completed]);
        assert_eq!(outcome.promoted, 1);
        assert_eq!(
            outcome.body.tasks().nth(1).unwrap().1.completed_at,
            Stamp::parse("2025-01-01")
        );
    }

    #[test]
    fn duplicate_texts_match_by_occurrence() {
        let ours = body(vec![task("water plants", LineStatus::Pending)]);
        let theirs = body(vec![
            task("water plants", LineStatus::Pending),
            task("water plants", LineStatus::Pending),
        ]);
        let outcome = merge(None, &ours, &theirs);
        assert_eq!(outcome.body.tasks().count(), 2);
        assert_eq!(outcome.added, 1);
    }

    #[test]
    fn disk_only_archived_lines_stay_archived() {
        let ours = body(vec![task("mine", LineStatus::Archived)]);
        let theirs = body(vec![task("other process", LineStatus::Archived)]);
        let outcome = merge(None, &ours, &theirs);
        assert!(outcome
            .body
            .tasks()
            .all(|(_, t)| t.status == LineStatus::Archived));
    }

    #[test]
    fn passthrough_comes_from_cache() {
        let ours = body(vec![Entry::raw("# Mine"), task("x", LineStatus::Pending)]);
        let theirs = body(vec![Entry::raw("# Theirs"), task("x", LineStatus::Pending)]);
        let outcome = merge(None, &ours, &theirs);
        assert_eq!(outcome.body, ours);
        assert!(!outcome.changed());
    }

    #[test]
    fn cache_edit_is_not_undone_by_external_append() {
        let base = body(vec![task("buy milk", LineStatus::Pending)]);
        let ours = body(vec![task("buy oat milk", LineStatus::Pending)]);
        let theirs = body(vec![
            task("buy milk", LineStatus::Pending),
            task("external", LineStatus::Pending),
        ]);

        let outcome = merge(Some(&base), &ours, &theirs);
        assert_eq!(
            outcome.body,
            body(vec![
                task("buy oat milk", LineStatus::Pending),
                task("external", LineStatus::Pending),
            ])
        );
        assert_eq!(outcome.added, 1);
    }

    #[test]
    fn cache_reopen_survives_unrelated_disk_change() {
        let base = body(vec![task("a", LineStatus::Completed)]);
        let ours = body(vec![task("a", LineStatus::Pending)]);
        let theirs = body(vec![task("a", LineStatus::Completed), task("b", LineStatus::Pending)]);

        let outcome = merge(Some(&base), &ours, &theirs);
        let statuses: Vec<_> = outcome.body.tasks().map(|(_, t)| t.status).collect();
        assert_eq!(statuses, vec![LineStatus::Pending, LineStatus::Pending]);
        assert_eq!(outcome.promoted, 0);
    }

    #[test]
    fn external_completion_since_base_still_promotes() {
        let base = body(vec![task("a", LineStatus::Pending)]);
        let ours = base.clone();
        let theirs = body(vec![task("a", LineStatus::Completed)]);
        let outcome = merge(Some(&base), &ours, &theirs);
        assert_eq!(outcome.promoted, 1);
    }

    #[test]
    fn new_duplicate_on_disk_is_appended() {
        let base = body(vec![task("water plants", LineStatus::Pending)]);
        let ours = body(vec![task("water plants", LineStatus::Completed)]);
        let theirs = body(vec![
            task("water plants", LineStatus::Pending),
            task("water plants", LineStatus::Pending),
        ]);
        let outcome = merge(Some(&base), &ours, &theirs);
        assert_eq!(outcome.body.tasks().count(), 2);
        assert_eq!(outcome.added, 1);
    }

    fn arb_entry() -> impl Strategy<Value = Entry> {
        let status = prop_oneof![
            Just(LineStatus::Pending),
            Just(LineStatus::Completed),
            Just(LineStatus::Archived),
        ];
        prop_oneof![
            1 => "# [a-c]".prop_map(Entry::raw),
            4 => ("[a-d]", status).prop_map(|(text, status)| task(&text, status)),
        ]
    }

    fn arb_body() -> impl Strategy<Value = Body> {
        proptest::collection::vec(arb_entry(), 0..12).prop_map(body)
    }

    proptest! {
        #[test]
        fn prop_merge_with_self_is_identity(ours in arb_body()) {
            let outcome = merge(None, &ours, &ours);
            prop_assert_eq!(outcome.body, ours);
        }

        #[test]
        fn prop_no_line_is_lost(ours in arb_body(), theirs in arb_body()) {
            let merged = merge(None, &ours, &theirs).body;
            prop_assert!(merged.entries.len() >= ours.entries.len());
            for (_, record) in theirs.tasks() {
                let count = |b: &Body| b.tasks().filter(|(_, t)| t.identity() == record.identity()).count();
                prop_assert!(count(&merged) >= count(&theirs));
            }
        }

        #[test]
        fn prop_archived_is_never_demoted(ours in arb_body(), theirs in arb_body()) {
            let merged = merge(None, &ours, &theirs).body;
            for ((_, before), (_, after)) in ours.tasks().zip(merged.tasks()) {
                prop_assert!(after.status >= before.status);
            }
        }

        #[test]
        fn prop_unchanged_disk_keeps_cache_content(base in arb_body(), ours in arb_body()) {
            let outcome = merge(Some(&base), &ours, &base);
            prop_assert!(!outcome.changed());
            prop_assert_eq!(outcome.body, ours);
        }

        #[test]
        fn prop_merge_is_stable(ours in arb_body(), theirs in arb_body()) {
            let once = merge(None, &ours, &theirs).body;
            let twice = merge(None, &once, &theirs);
            prop_assert!(!twice.changed());
            prop_assert_eq!(twice.body, once);
        }
    }
}
