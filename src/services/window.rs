//! Bounded, ordered window over a remote record set.
//!
//! The window materializes a contiguous slice of the remote order. Pages are
//! attached at the tail (forward) or head (backward) and the opposite edge is
//! trimmed back to `max_size`.
//!
//! Visible records are never evicted. If the evictable edge is visible, the
//! window may hold `max_size` plus that visible run; anything beyond is
//! dropped from the far end of the page just attached.
//!
//! # Contiguity
//!
//! Every entry carries its display position. A page attaches only if its
//! nearest record sits exactly one position past the edge and its cursor is
//! strictly beyond the edge cursor:
//!
//! ```text
//!  window  [ c3 c4 c5 ]            tail offset 5
//!  page              [ c6 c7 ]     edge offset 6  -> attach
//!  page                 [ c9 ]     edge offset 9  -> StaleFetch
//! ```
//!
//! A failed check means the remote set shifted under the window. The remote
//! offers no diff primitive, so the caller discards the whole window.

use std::collections::{HashSet, VecDeque};

use crate::models::{
    Cursor, Direction, Record, RecordId, SortIndex, SortOrder, WindowEntry, WindowSnapshot,
};
use crate::{Error, Result};

/// Outcome of attaching one page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Records attached.
    pub inserted: usize,
    /// Records evicted from the opposite edge, in eviction order.
    pub evicted: Vec<RecordId>,
    /// Eviction stopped at a visible record.
    pub eviction_skipped: bool,
    /// Records dropped from the attached edge to honour the capacity bound.
    pub trimmed: Vec<RecordId>,
    /// The page was empty and the direction is now exhausted.
    pub exhausted: bool,
}

/// Per-direction exhaustion flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Exhaustion {
    /// No more data past the tail.
    pub forward: bool,
    /// No more data before the head.
    pub backward: bool,
}

/// Ordered record window with capacity, eviction and contiguity checks.
#[derive(Debug, Clone)]
pub struct WindowBuffer {
    max_size: usize,
    index: SortIndex,
    order: SortOrder,
    entries: VecDeque<WindowEntry>,
    ids: HashSet<RecordId>,
    exhausted: [bool; 2],
    generation: u64,
}

impl WindowBuffer {
    /// Creates an empty window.
    #[must_use]
    pub fn new(max_size: usize, index: SortIndex, order: SortOrder) -> Self {
        Self {
            max_size: max_size.max(1),
            index,
            order,
            entries: VecDeque::new(),
            ids: HashSet::new(),
            exhausted: [false; 2],
            generation: 0,
        }
    }

    /// Maximum size before eviction.
    #[must_use]
    pub const fn max_size(&self) -> usize {
        self.max_size
    }

    /// Number of materialized records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when nothing is materialized.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Generation tag, bumped by every reset.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Active sort index.
    #[must_use]
    pub const fn index(&self) -> SortIndex {
        self.index
    }

    /// Active sort order.
    #[must_use]
    pub const fn order(&self) -> SortOrder {
        self.order
    }

    /// Returns `true` if fetches in `direction` found no more data.
    #[must_use]
    pub const fn is_exhausted(&self, direction: Direction) -> bool {
        self.exhausted[direction.slot()]
    }

    /// Both exhaustion flags.
    #[must_use]
    pub const fn exhaustion(&self) -> Exhaustion {
        Exhaustion {
            forward: self.exhausted[0],
            backward: self.exhausted[1],
        }
    }

    /// Cursor at the edge a `direction` fetch continues from.
    #[must_use]
    pub fn edge(&self, direction: Direction) -> Option<&Cursor> {
        match direction {
            Direction::Forward => self.entries.back(),
            Direction::Backward => self.entries.front(),
        }
        .map(|e| &e.cursor)
    }

    /// Display position of the head record.
    #[must_use]
    pub fn head_offset(&self) -> Option<u64> {
        self.entries.front().map(|e| e.offset)
    }

    /// Display position of the tail record.
    #[must_use]
    pub fn tail_offset(&self) -> Option<u64> {
        self.entries.back().map(|e| e.offset)
    }

    /// Returns `true` if a record with `id` is materialized.
    #[must_use]
    pub fn contains(&self, id: &RecordId) -> bool {
        self.ids.contains(id)
    }

    /// Materialized records in display order.
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.entries.iter().map(|e| &e.record)
    }

    /// Copies the window for the rendering collaborator.
    #[must_use]
    pub fn snapshot(&self) -> WindowSnapshot {
        WindowSnapshot {
            generation: self.generation,
            entries: self.entries.iter().cloned().collect(),
            forward_exhausted: self.exhausted[0],
            backward_exhausted: self.exhausted[1],
        }
    }

    /// Attaches a page at the tail.
    ///
    /// `edge_offset` is the display position of the first page record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StaleFetch`] if the page does not continue the tail.
    /// The window is left untouched; the caller must [`reset`](Self::reset).
    pub fn append<F>(
        &mut self,
        records: Vec<Record>,
        edge_offset: u64,
        is_visible: F,
    ) -> Result<IngestReport>
    where
        F: Fn(&RecordId) -> bool,
    {
        self.ingest(Direction::Forward, records, edge_offset, is_visible)
    }

    /// Attaches a page at the head.
    ///
    /// `records` are in display order; `edge_offset` is the display position
    /// of the last page record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StaleFetch`] if the page does not precede the head.
    pub fn prepend<F>(
        &mut self,
        records: Vec<Record>,
        edge_offset: u64,
        is_visible: F,
    ) -> Result<IngestReport>
    where
        F: Fn(&RecordId) -> bool,
    {
        self.ingest(Direction::Backward, records, edge_offset, is_visible)
    }

    /// Attaches a page at the edge named by `direction`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StaleFetch`] on any contiguity violation.
    pub fn ingest<F>(
        &mut self,
        direction: Direction,
        records: Vec<Record>,
        edge_offset: u64,
        is_visible: F,
    ) -> Result<IngestReport>
    where
        F: Fn(&RecordId) -> bool,
    {
        if records.is_empty() {
            self.exhausted[direction.slot()] = true;
            tracing::debug!(%direction, "Direction exhausted");
            return Ok(IngestReport {
                exhausted: true,
                ..IngestReport::default()
            });
        }

        let entries = self.positioned(direction, records, edge_offset)?;
        self.check_contiguous(direction, &entries)?;

        let was_empty = self.entries.is_empty();
        let inserted = entries.len();
        for entry in entries.iter().map(|e| e.record.id.clone()) {
            self.ids.insert(entry);
        }
        match direction {
            Direction::Forward => self.entries.extend(entries),
            Direction::Backward => {
                for entry in entries.into_iter().rev() {
                    self.entries.push_front(entry);
                }
            },
        }

        // A fill from the very first position has nothing before it.
        if was_empty && self.head_offset() == Some(0) {
            self.exhausted[Direction::Backward.slot()] = true;
        }

        let (evicted, eviction_skipped) = self.evict(direction.opposite(), &is_visible);
        let trimmed = if eviction_skipped {
            self.trim(direction, &is_visible)
        } else {
            Vec::new()
        };
        let inserted = inserted.saturating_sub(trimmed.len());
        tracing::debug!(
            %direction,
            inserted,
            evicted = evicted.len(),
            eviction_skipped,
            trimmed = trimmed.len(),
            size = self.entries.len(),
            "Page attached"
        );

        Ok(IngestReport {
            inserted,
            evicted,
            eviction_skipped,
            trimmed,
            exhausted: false,
        })
    }

    /// Replaces a materialized record with a refetched copy, in place.
    ///
    /// Returns `false` if no record with that id is materialized.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StaleFetch`] if the new copy's key no longer fits
    /// between its neighbours.
    pub fn replace(&mut self, record: Record) -> Result<bool> {
        let Some(pos) = self.entries.iter().position(|e| e.record.id == record.id) else {
            return Ok(false);
        };
        let cursor = record.cursor(self.index);
        let after_prev = pos == 0
            || self
                .order
                .compare(&self.entries[pos - 1].cursor, &cursor)
                .is_lt();
        let before_next = self
            .entries
            .get(pos + 1)
            .is_none_or(|next| self.order.compare(&cursor, &next.cursor).is_lt());
        if !(after_prev && before_next) {
            return Err(Error::StaleFetch {
                direction: Direction::Forward,
                reason: format!("record {} moved out of its position", record.id),
            });
        }
        let entry = &mut self.entries[pos];
        entry.cursor = cursor;
        entry.record = record;
        Ok(true)
    }

    /// Clears all records and both exhausted flags.
    ///
    /// Bumps the generation so replies to earlier requests are recognizable.
    /// Does not fetch anything.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.ids.clear();
        self.exhausted = [false; 2];
        self.generation += 1;
        tracing::debug!(generation = self.generation, "Window reset");
    }

    /// Switches the sort and resets.
    pub fn reorder(&mut self, index: SortIndex, order: SortOrder) {
        self.index = index;
        self.order = order;
        self.reset();
    }

    fn positioned(
        &self,
        direction: Direction,
        records: Vec<Record>,
        edge_offset: u64,
    ) -> Result<Vec<WindowEntry>> {
        let count = records.len() as u64;
        let out_of_range = || Error::StaleFetch {
            direction,
            reason: format!("{count} records do not fit at display position {edge_offset}"),
        };
        let (first, last) = match direction {
            Direction::Forward => (
                edge_offset,
                edge_offset.checked_add(count - 1).ok_or_else(out_of_range)?,
            ),
            Direction::Backward => (
                edge_offset.checked_sub(count - 1).ok_or_else(out_of_range)?,
                edge_offset,
            ),
        };

        Ok(records
            .into_iter()
            .zip(first..=last)
            .map(|(record, offset)| WindowEntry {
                offset,
                cursor: record.cursor(self.index),
                record,
            })
            .collect())
    }

    fn check_contiguous(&self, direction: Direction, page: &[WindowEntry]) -> Result<()> {
        let stale = |reason: String| Error::StaleFetch { direction, reason };

        let mut seen = HashSet::with_capacity(page.len());
        for entry in page {
            if self.ids.contains(&entry.record.id) || !seen.insert(&entry.record.id) {
                return Err(stale(format!("record {} already in window", entry.record.id)));
            }
        }
        if page
            .windows(2)
            .any(|pair| !self.order.compare(&pair[0].cursor, &pair[1].cursor).is_lt())
        {
            return Err(stale("page is not strictly ordered".to_string()));
        }

        let (Some(head), Some(tail)) = (self.entries.front(), self.entries.back()) else {
            return Ok(());
        };
        let (Some(page_first), Some(page_last)) = (page.first(), page.last()) else {
            return Ok(());
        };

        match direction {
            Direction::Forward => {
                if tail.offset.checked_add(1) != Some(page_first.offset) {
                    return Err(stale(format!(
                        "page starts at {} but tail is at {}",
                        page_first.offset, tail.offset
                    )));
                }
                if !self.order.compare(&tail.cursor, &page_first.cursor).is_lt() {
                    return Err(stale(format!(
                        "key {} does not follow tail key {}",
                        page_first.cursor, tail.cursor
                    )));
                }
            },
            Direction::Backward => {
                if page_last.offset.checked_add(1) != Some(head.offset) {
                    return Err(stale(format!(
                        "page ends at {} but head is at {}",
                        page_last.offset, head.offset
                    )));
                }
                if !self.order.compare(&page_last.cursor, &head.cursor).is_lt() {
                    return Err(stale(format!(
                        "key {} does not precede head key {}",
                        page_last.cursor, head.cursor
                    )));
                }
            },
        }
        Ok(())
    }

    /// Trims `edge` down to `max_size`, never evicting a visible record.
    fn evict<F>(&mut self, edge: Direction, is_visible: &F) -> (Vec<RecordId>, bool)
    where
        F: Fn(&RecordId) -> bool,
    {
        let mut evicted = Vec::new();
        let mut skipped = false;
        while self.entries.len() > self.max_size {
            let candidate = match edge {
                Direction::Backward => self.entries.front(),
                Direction::Forward => self.entries.back(),
            };
            let Some(candidate) = candidate else {
                break;
            };
            if is_visible(&candidate.record.id) {
                skipped = true;
                break;
            }
            let removed = match edge {
                Direction::Backward => self.entries.pop_front(),
                Direction::Forward => self.entries.pop_back(),
            };
            if let Some(removed) = removed {
                self.ids.remove(&removed.record.id);
                evicted.push(removed.record.id);
            }
        }

        if !evicted.is_empty() {
            // Evicted records can be fetched again from that edge.
            self.exhausted[edge.slot()] = false;
            metrics::counter!("window_records_evicted_total").increment(evicted.len() as u64);
        }
        if skipped {
            metrics::counter!("window_eviction_skipped_total").increment(1);
        }
        (evicted, skipped)
    }

    /// Shrinks the window from the attached `edge` after a skipped eviction.
    ///
    /// The window may exceed `max_size` by the visible run at the opposite
    /// edge, and by no more. Stops early at a visible record.
    fn trim<F>(&mut self, edge: Direction, is_visible: &F) -> Vec<RecordId>
    where
        F: Fn(&RecordId) -> bool,
    {
        let allowed = self.max_size + self.visible_run(edge.opposite(), is_visible);
        let mut trimmed = Vec::new();
        while self.entries.len() > allowed {
            let candidate = match edge {
                Direction::Forward => self.entries.back(),
                Direction::Backward => self.entries.front(),
            };
            if candidate.is_none_or(|c| is_visible(&c.record.id)) {
                break;
            }
            let removed = match edge {
                Direction::Forward => self.entries.pop_back(),
                Direction::Backward => self.entries.pop_front(),
            };
            if let Some(removed) = removed {
                self.ids.remove(&removed.record.id);
                trimmed.push(removed.record.id);
            }
        }

        if !trimmed.is_empty() {
            self.exhausted[edge.slot()] = false;
            metrics::counter!("window_records_trimmed_total").increment(trimmed.len() as u64);
        }
        trimmed
    }

    /// Number of consecutive visible records starting at `edge`.
    #[must_use]
    pub fn visible_run<F>(&self, edge: Direction, is_visible: F) -> usize
    where
        F: Fn(&RecordId) -> bool,
    {
        let visible = |e: &&WindowEntry| is_visible(&e.record.id);
        match edge {
            Direction::Backward => self.entries.iter().take_while(visible).count(),
            Direction::Forward => self.entries.iter().rev().take_while(visible).count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(i: u32) -> Record {
        Record::new(format!("k{i:02}"), "Contacts", format!("name {i:02}"), i64::from(i))
    }

    fn page(range: std::ops::Range<u32>) -> Vec<Record> {
        range.map(rec).collect()
    }

    fn window(max: usize) -> WindowBuffer {
        WindowBuffer::new(max, SortIndex::Id, SortOrder::Ascending)
    }

    const NONE_VISIBLE: fn(&RecordId) -> bool = |_| false;

    #[test]
    fn test_append_to_empty_accepts_any_start() {
        let mut w = window(10);
        let report = w.append(page(4..7), 4, NONE_VISIBLE).unwrap();
        assert_eq!(report.inserted, 3);
        assert_eq!(w.head_offset(), Some(4));
        assert_eq!(w.tail_offset(), Some(6));
        assert!(!w.is_exhausted(Direction::Backward));
    }

    #[test]
    fn test_fill_from_start_marks_backward_exhausted() {
        let mut w = window(10);
        w.append(page(0..3), 0, NONE_VISIBLE).unwrap();
        assert!(w.is_exhausted(Direction::Backward));
        assert!(!w.is_exhausted(Direction::Forward));
    }

    #[test]
    fn test_append_contiguous_pages() {
        let mut w = window(10);
        w.append(page(0..3), 0, NONE_VISIBLE).unwrap();
        w.append(page(3..5), 3, NONE_VISIBLE).unwrap();
        let ids: Vec<_> = w.records().map(|r| r.id.as_str().to_string()).collect();
        assert_eq!(ids, vec!["k00", "k01", "k02", "k03", "k04"]);
    }

    #[test]
    fn test_append_gap_is_stale_and_leaves_window() {
        let mut w = window(10);
        w.append(page(0..6), 0, NONE_VISIBLE).unwrap();
        let err = w.append(vec![rec(10)], 10, NONE_VISIBLE).unwrap_err();
        assert!(err.is_stale());
        assert_eq!(w.len(), 6);
    }

    #[test]
    fn test_append_key_behind_tail_is_stale() {
        let mut w = WindowBuffer::new(10, SortIndex::Updated, SortOrder::Ascending);
        w.append(page(0..3), 0, NONE_VISIBLE).unwrap();
        // Right position, but the key does not move past the tail.
        let mut moved = rec(7);
        moved.updated = 1;
        let err = w.append(vec![moved], 3, NONE_VISIBLE).unwrap_err();
        assert!(matches!(err, Error::StaleFetch { ref reason, .. } if reason.contains("follow")));
    }

    #[test]
    fn test_append_unordered_page_is_stale() {
        let mut w = window(10);
        let err = w.append(vec![rec(2), rec(1)], 0, NONE_VISIBLE).unwrap_err();
        assert!(matches!(err, Error::StaleFetch { ref reason, .. } if reason.contains("strictly")));
    }

    #[test]
    fn test_prepend_contiguous() {
        let mut w = window(10);
        w.append(page(5..8), 5, NONE_VISIBLE).unwrap();
        w.prepend(page(2..5), 4, NONE_VISIBLE).unwrap();
        assert_eq!(w.head_offset(), Some(2));
        assert_eq!(w.len(), 6);
        assert_eq!(w.edge(Direction::Backward).map(|c| c.id.as_str()), Some("k02"));
    }

    #[test]
    fn test_prepend_gap_is_stale() {
        let mut w = window(10);
        w.append(page(5..8), 5, NONE_VISIBLE).unwrap();
        let err = w.prepend(page(1..3), 2, NONE_VISIBLE).unwrap_err();
        assert!(matches!(err, Error::StaleFetch { direction: Direction::Backward, .. }));
    }

    #[test]
    fn test_prepend_past_start_is_stale() {
        let mut w = window(10);
        w.append(page(1..3), 1, NONE_VISIBLE).unwrap();
        let err = w.prepend(page(0..3), 0, NONE_VISIBLE).unwrap_err();
        assert!(err.is_stale());
    }

    #[test]
    fn test_empty_page_exhausts_direction() {
        let mut w = window(10);
        w.append(page(0..2), 0, NONE_VISIBLE).unwrap();
        let report = w.append(Vec::new(), 0, NONE_VISIBLE).unwrap();
        assert!(report.exhausted);
        assert!(w.is_exhausted(Direction::Forward));

        w.reset();
        assert!(!w.is_exhausted(Direction::Forward));
        assert!(!w.is_exhausted(Direction::Backward));
        assert!(w.is_empty());
        assert_eq!(w.generation(), 1);
    }

    #[test]
    fn test_eviction_from_head_on_append() {
        let mut w = window(4);
        w.append(page(0..4), 0, NONE_VISIBLE).unwrap();
        let report = w.append(page(4..6), 4, NONE_VISIBLE).unwrap();
        assert_eq!(report.evicted, vec![RecordId::new("k00"), RecordId::new("k01")]);
        assert_eq!(w.len(), 4);
        // Evicted head records can be fetched again.
        assert!(!w.is_exhausted(Direction::Backward));
    }

    #[test]
    fn test_eviction_from_tail_on_prepend() {
        let mut w = window(3);
        w.append(page(3..6), 3, NONE_VISIBLE).unwrap();
        let report = w.prepend(page(1..3), 2, NONE_VISIBLE).unwrap();
        assert_eq!(report.evicted, vec![RecordId::new("k05"), RecordId::new("k04")]);
        assert_eq!(w.tail_offset(), Some(3));
    }

    #[test]
    fn test_eviction_skipped_for_visible_record() {
        let mut w = window(3);
        w.append(page(0..3), 0, NONE_VISIBLE).unwrap();
        let visible = |id: &RecordId| id.as_str() == "k00";
        let report = w.append(page(3..5), 3, visible).unwrap();
        assert!(report.eviction_skipped);
        assert!(report.evicted.is_empty());
        // One visible record at the head allows one record over capacity.
        assert_eq!(report.trimmed, vec![RecordId::new("k04")]);
        assert_eq!(report.inserted, 1);
        assert_eq!(w.len(), 4);
        assert_eq!(w.tail_offset(), Some(3));
    }

    #[test]
    fn test_visible_run_bounds_prepend() {
        let mut w = window(4);
        w.append(page(4..8), 4, NONE_VISIBLE).unwrap();
        let visible = |id: &RecordId| matches!(id.as_str(), "k06" | "k07");
        let report = w.prepend(page(0..4), 3, visible).unwrap();
        assert!(report.eviction_skipped);
        assert_eq!(w.visible_run(Direction::Forward, visible), 2);
        assert_eq!(w.len(), 6);
        assert_eq!(w.head_offset(), Some(2));
        assert_eq!(report.trimmed, vec![RecordId::new("k00"), RecordId::new("k01")]);
    }

    #[test]
    fn test_fully_visible_window_is_not_trimmed() {
        let mut w = window(2);
        w.append(page(0..2), 0, NONE_VISIBLE).unwrap();
        let report = w.append(page(2..4), 2, |_| true).unwrap();
        assert!(report.trimmed.is_empty());
        assert_eq!(w.len(), 4);
    }

    #[test]
    fn test_page_beyond_last_position_is_stale() {
        let mut w = window(5);
        let err = w.append(page(0..2), u64::MAX, NONE_VISIBLE).unwrap_err();
        assert!(err.is_stale());
        assert!(w.is_empty());

        w.append(vec![rec(0)], u64::MAX, NONE_VISIBLE).unwrap();
        let err = w.append(vec![rec(1)], u64::MAX, NONE_VISIBLE).unwrap_err();
        assert!(err.is_stale());
        assert_eq!(w.tail_offset(), Some(u64::MAX));
    }

    #[test]
    fn test_prepend_onto_last_position_is_stale() {
        let mut w = window(5);
        w.append(vec![rec(5)], u64::MAX, NONE_VISIBLE).unwrap();
        let err = w.prepend(vec![rec(1)], u64::MAX, NONE_VISIBLE).unwrap_err();
        assert!(err.is_stale());
        assert_eq!(w.len(), 1);
    }

    #[test]
    fn test_replace_in_place() {
        let mut w = window(5);
        w.append(page(0..3), 0, NONE_VISIBLE).unwrap();
        let mut refreshed = rec(1);
        refreshed.data = serde_json::json!({"phone": "555"});
        assert!(w.replace(refreshed).unwrap());
        assert_eq!(w.records().nth(1).map(|r| r.data["phone"].clone()), Some("555".into()));
        assert!(!w.replace(rec(9)).unwrap());
    }

    #[test]
    fn test_replace_out_of_order_is_stale() {
        let mut w = WindowBuffer::new(5, SortIndex::Updated, SortOrder::Ascending);
        w.append(page(0..3), 0, NONE_VISIBLE).unwrap();
        let mut moved = rec(0);
        moved.updated = 99;
        assert!(w.replace(moved).unwrap_err().is_stale());
    }

    #[test]
    fn test_descending_order_append() {
        let mut w = WindowBuffer::new(5, SortIndex::Id, SortOrder::Descending);
        w.append(vec![rec(9), rec(8)], 0, NONE_VISIBLE).unwrap();
        w.append(vec![rec(7)], 2, NONE_VISIBLE).unwrap();
        assert!(w.append(vec![rec(8)], 3, NONE_VISIBLE).is_err());
    }
}
