//! Similarity candidate types.

use serde::{Deserialize, Serialize};
use std::hash::Hash;

use super::{Record, RecordId};

/// A value with a stable identity that similarity merging deduplicates on.
pub trait Identified {
    /// Identity type.
    type Id: Eq + Hash + Clone;

    /// Returns the identity of this value.
    fn identity(&self) -> &Self::Id;
}

impl Identified for Record {
    type Id = RecordId;

    fn identity(&self) -> &RecordId {
        &self.id
    }
}

/// A ranked similarity candidate.
///
/// Scores are accumulated weights, so a record corroborated by several
/// indices can exceed 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityCandidate<T = Record> {
    /// The matched value.
    pub record: T,
    /// Accumulated score.
    pub score: f32,
}

impl<T> SimilarityCandidate<T> {
    /// Creates a candidate.
    #[must_use]
    pub const fn new(record: T, score: f32) -> Self {
        Self { record, score }
    }
}
