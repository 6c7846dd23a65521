//! Data models for crmsync.
//!
//! This module contains the record, window, event and ranking types shared by
//! the services.

mod events;
mod record;
mod similarity;
mod window;

pub use events::{CACHE_FETCH_EVENT, CacheEvent, CachePhase};
pub use record::{Cursor, ModuleName, OrderKey, Record, RecordId, SortIndex, SortOrder};
pub use similarity::{Identified, SimilarityCandidate};
pub use window::{Direction, FetchState, ListSelection, WindowEntry, WindowSnapshot};
