//! Window, direction, and fetch state types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{Cursor, ModuleName, Record, RecordId, SortIndex, SortOrder};
use crate::{Error, Result};

/// Edge a page is fetched for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Append at the tail, evict at the head.
    Forward,
    /// Prepend at the head, evict at the tail.
    Backward,
}

impl Direction {
    /// Both directions, forward first.
    pub const ALL: [Self; 2] = [Self::Forward, Self::Backward];

    /// Returns the opposite direction.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Forward => Self::Backward,
            Self::Backward => Self::Forward,
        }
    }

    /// Returns the wire name of the direction.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Backward => "backward",
        }
    }

    pub(crate) const fn slot(self) -> usize {
        match self {
            Self::Forward => 0,
            Self::Backward => 1,
        }
    }
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "forward" | "next" | "down" => Ok(Self::Forward),
            "backward" | "back" | "prev" | "up" => Ok(Self::Backward),
            other => Err(Error::InvalidDirection(other.to_string())),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-direction fetch state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchState {
    /// No request outstanding.
    #[default]
    Idle,
    /// One request outstanding; further requests are dropped.
    InFlight,
    /// The last request failed. Retryable like `Idle`.
    Failed,
}

impl FetchState {
    /// Returns `true` while a request is outstanding.
    #[must_use]
    pub const fn is_in_flight(self) -> bool {
        matches!(self, Self::InFlight)
    }
}

/// The (module, filter, sort) selection a window materializes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListSelection {
    /// Module being listed.
    pub module: ModuleName,
    /// Optional named filter understood by the data owner.
    pub filter: Option<String>,
    /// Active sort index.
    pub index: SortIndex,
    /// Active sort order.
    pub order: SortOrder,
}

impl ListSelection {
    /// Creates a selection with the default sort.
    #[must_use]
    pub fn new(module: impl Into<ModuleName>) -> Self {
        Self {
            module: module.into(),
            filter: None,
            index: SortIndex::default(),
            order: SortOrder::default(),
        }
    }

    /// Sets the sort index.
    #[must_use]
    pub const fn with_index(mut self, index: SortIndex) -> Self {
        self.index = index;
        self
    }

    /// Sets the sort order.
    #[must_use]
    pub const fn with_order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    /// Sets the filter.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }
}

/// A record materialized in a window, with its display position.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowEntry {
    /// Display position in the remote order (0-based).
    pub offset: u64,
    /// Strict cursor under the active index.
    pub cursor: Cursor,
    /// The record itself.
    pub record: Record,
}

/// Read-only copy of a window handed to the rendering collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowSnapshot {
    /// Window generation; bumps on every reset.
    pub generation: u64,
    /// Entries in display order.
    pub entries: Vec<WindowEntry>,
    /// Whether forward fetches found no more data.
    pub forward_exhausted: bool,
    /// Whether backward fetches found no more data.
    pub backward_exhausted: bool,
}

impl WindowSnapshot {
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

    /// Record ids in display order.
    #[must_use]
    pub fn ids(&self) -> Vec<RecordId> {
        self.entries.iter().map(|e| e.record.id.clone()).collect()
    }

    /// Cursor of the head record, `None` when empty.
    #[must_use]
    pub fn head(&self) -> Option<&Cursor> {
        self.entries.first().map(|e| &e.cursor)
    }

    /// Cursor of the tail record, `None` when empty.
    #[must_use]
    pub fn tail(&self) -> Option<&Cursor> {
        self.entries.last().map(|e| &e.cursor)
    }
}
