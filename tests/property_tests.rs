//! Property-based tests for windowing and similarity merging.
//!
//! Uses proptest to verify invariants across random inputs:
//! - A window is always a contiguous slice of the remote order
//! - A window never exceeds its capacity when nothing is visible
//! - A visible run at the evictable edge grows the window by at most its length
//! - Merging is deterministic, deduplicated and score-ordered
//! - Adding match sets never lowers a candidate's score or its rank

// Property tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::cast_possible_truncation,
    clippy::float_cmp
)]

use proptest::prelude::*;
use std::collections::HashMap;

use crmsync::models::{Direction, Record, RecordId, SortIndex, SortOrder};
use crmsync::services::{IndexMatches, IndexWeights, SimilarityMerger, WindowBuffer};

fn remote(n: usize) -> Vec<Record> {
    (0..n)
        .map(|i| Record::new(format!("r{i:04}"), "Contacts", format!("n{i:04}"), i as i64))
        .collect()
}

fn match_sets() -> impl Strategy<Value = Vec<(String, Vec<u8>)>> {
    prop::collection::vec(
        (
            prop::sample::select(vec!["email", "phone", "name", "emails", "full_name"]),
            prop::collection::vec(0u8..12, 0..6),
        )
            .prop_map(|(index, ids)| (index.to_string(), ids)),
        0..8,
    )
}

fn to_matches(sets: &[(String, Vec<u8>)]) -> Vec<IndexMatches> {
    sets.iter()
        .map(|(index, ids)| {
            let records = ids
                .iter()
                .map(|i| Record::new(format!("c{i}"), "Contacts", "", 0))
                .collect();
            IndexMatches::new(index.clone(), records)
        })
        .collect()
}

proptest! {
    /// Property: forward then backward paging keeps the window contiguous
    /// and within capacity.
    #[test]
    fn prop_window_is_contiguous_slice(
        total in 1usize..120,
        max in 1usize..30,
        pages in prop::collection::vec(1usize..10, 1..25),
        back_pages in prop::collection::vec(1usize..10, 0..10),
    ) {
        let source = remote(total);
        let mut window = WindowBuffer::new(max, SortIndex::Updated, SortOrder::Ascending);

        let mut next = 0;
        for size in pages {
            let end = (next + size).min(total);
            let page = source[next..end].to_vec();
            window.append(page, next as u64, |_| false).unwrap();
            next = end;
        }
        for size in back_pages {
            let Some(head) = window.head_offset() else { break };
            let head = head as usize;
            let start = head.saturating_sub(size);
            let page = source[start..head].to_vec();
            let edge = head.saturating_sub(1) as u64;
            window.prepend(page, edge, |_| false).unwrap();
        }

        prop_assert!(window.len() <= max);
        let head = window.head_offset().unwrap() as usize;
        let tail = window.tail_offset().unwrap() as usize;
        prop_assert_eq!(tail + 1 - head, window.len());
        let held: Vec<_> = window.records().cloned().collect();
        prop_assert_eq!(held.as_slice(), &source[head..=tail]);
    }

    /// Property: with a viewport over some records, the window stays a
    /// contiguous slice and exceeds capacity only by the visible run at the
    /// edge it last evicted from.
    #[test]
    fn prop_window_capacity_with_visible_records(
        total in 1usize..120,
        max in 1usize..20,
        view_start in 0usize..120,
        view_len in 0usize..15,
        steps in prop::collection::vec((any::<bool>(), 1usize..12), 1..40),
    ) {
        let source = remote(total);
        let visible = |id: &RecordId| {
            id.as_str()[1..]
                .parse::<usize>()
                .is_ok_and(|i| (view_start..view_start + view_len).contains(&i))
        };
        let mut window = WindowBuffer::new(max, SortIndex::Updated, SortOrder::Ascending);
        let mut evictable = Direction::Backward;

        for (forward, size) in steps {
            let report = if forward {
                let start = window.tail_offset().map_or(0, |t| t as usize + 1);
                let end = (start + size).min(total);
                let page = source[start..end].to_vec();
                window.append(page, start as u64, visible).unwrap()
            } else {
                let Some(head) = window.head_offset().filter(|&h| h > 0) else { continue };
                let head = head as usize;
                let start = head.saturating_sub(size);
                let page = source[start..head].to_vec();
                window.prepend(page, (head - 1) as u64, visible).unwrap()
            };
            if !report.exhausted {
                evictable = if forward { Direction::Backward } else { Direction::Forward };
            }

            let pinned = window.visible_run(evictable, visible);
            prop_assert!(
                window.len() <= max + pinned,
                "size {} exceeds {} + {} visible", window.len(), max, pinned
            );
            if window.is_empty() {
                continue;
            }
            let head = window.head_offset().unwrap() as usize;
            let tail = window.tail_offset().unwrap() as usize;
            prop_assert_eq!(tail + 1 - head, window.len());
            let held: Vec<_> = window.records().cloned().collect();
            prop_assert_eq!(held.as_slice(), &source[head..=tail]);
        }
    }

    /// Property: merging the same input twice gives the same list.
    #[test]
    fn prop_merge_is_deterministic(sets in match_sets()) {
        let merger = SimilarityMerger::default();
        let matches = to_matches(&sets);
        prop_assert_eq!(merger.merge(&matches), merger.merge(&matches));
    }

    /// Property: candidates are unique, sorted by score, and scored by the
    /// sum of their match weights.
    #[test]
    fn prop_merge_scores_and_order(sets in match_sets()) {
        let weights = IndexWeights::standard();
        let ranked = SimilarityMerger::new(weights.clone()).merge(&to_matches(&sets));

        let mut expected: HashMap<String, f32> = HashMap::new();
        for (index, ids) in &sets {
            let weight = weights.weight(index).unwrap();
            for i in ids {
                *expected.entry(format!("c{i}")).or_default() += weight;
            }
        }

        prop_assert_eq!(ranked.len(), expected.len());
        for pair in ranked.windows(2) {
            prop_assert!(pair[0].score >= pair[1].score);
        }
        for candidate in &ranked {
            let want = expected[candidate.record.id.as_str()];
            prop_assert!((candidate.score - want).abs() < 1e-4);
        }
    }

    /// Property: more match sets never lower an existing score, and never
    /// move a candidate below one whose score did not change.
    #[test]
    fn prop_merge_is_monotonic(base in match_sets(), more in match_sets()) {
        let merger = SimilarityMerger::default();
        let before = merger.merge(&to_matches(&base));
        let combined: Vec<_> = base.iter().chain(more.iter()).cloned().collect();
        let after = merger.merge(&to_matches(&combined));

        for candidate in &before {
            let grown = after
                .iter()
                .find(|c| c.record.id == candidate.record.id)
                .map(|c| c.score);
            prop_assert!(grown.is_some_and(|s| s >= candidate.score - 1e-6));
        }

        let rank = |id: &RecordId| after.iter().position(|c| &c.record.id == id);
        for (i, above) in before.iter().enumerate() {
            for below in &before[i + 1..] {
                let Some(below_after) = rank(&below.record.id) else { continue };
                if after[below_after].score != below.score {
                    continue;
                }
                let above_after = rank(&above.record.id).unwrap();
                prop_assert!(
                    above_after < below_after,
                    "{} fell below unchanged {}", above.record.id, below.record.id
                );
            }
        }
    }
}
