//! Weighted similarity merging.
//!
//! Match results arrive per index (email, phone, name). Each index carries a
//! fixed weight; a record matched by several indices accumulates the sum of
//! their weights into one candidate:
//!
//! ```text
//! score(r) = sum(weight(i) for each index i that matched r)
//! ```
//!
//! | Index | Weight | Aliases |
//! |-------|--------|---------|
//! | email | 1.0 | `emails`, `ydn$emails` |
//! | phone | 0.5 | `phones`, `ydn$phones` |
//! | name  | 0.2 | `full_name`, `ydn$fullname` |
//!
//! Candidates are kept sorted by score, highest first. Equal scores keep the
//! order in which the records were first seen.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::{Identified, ModuleName, Record, SimilarityCandidate};
use crate::{Error, Result};

const STANDARD_WEIGHTS: [(&str, f32); 9] = [
    ("email", 1.0),
    ("emails", 1.0),
    ("ydn$emails", 1.0),
    ("phone", 0.5),
    ("phones", 0.5),
    ("ydn$phones", 0.5),
    ("name", 0.2),
    ("full_name", 0.2),
    ("ydn$fullname", 0.2),
];

/// Weight per similarity index name.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexWeights {
    weights: HashMap<String, f32>,
}

impl Default for IndexWeights {
    fn default() -> Self {
        Self::standard()
    }
}

impl IndexWeights {
    /// The fixed email/phone/name weights.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            weights: STANDARD_WEIGHTS
                .iter()
                .map(|(name, weight)| ((*name).to_string(), *weight))
                .collect(),
        }
    }

    /// Builds a custom weight table.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a negative or non-finite weight.
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, f32)>,
        S: Into<String>,
    {
        let mut weights = HashMap::new();
        for (name, weight) in pairs {
            let name = name.into();
            if !weight.is_finite() || weight < 0.0 {
                return Err(Error::InvalidInput(format!(
                    "weight for index '{name}' must be finite and >= 0, got {weight}"
                )));
            }
            weights.insert(name.to_lowercase(), weight);
        }
        Ok(Self { weights })
    }

    /// Looks up the weight of `index` (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownIndex`] if the index has no weight.
    pub fn weight(&self, index: &str) -> Result<f32> {
        self.weights
            .get(&index.to_lowercase())
            .copied()
            .ok_or_else(|| Error::UnknownIndex(index.to_string()))
    }
}

#[derive(Debug, Clone)]
struct Ranked<T> {
    seq: u64,
    candidate: SimilarityCandidate<T>,
}

impl<T> Ranked<T> {
    /// `true` if `self` ranks strictly before `other`.
    fn precedes(&self, other: &Self) -> bool {
        match self.candidate.score.total_cmp(&other.candidate.score) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => self.seq < other.seq,
        }
    }
}

/// Incremental weighted merge of match sets, deduplicated by identity.
///
/// The candidate list is sorted after every [`add`](Self::add); scores only
/// grow, so a candidate only ever moves toward the head.
pub struct WeightedMerge<T: Identified> {
    ranked: Vec<Ranked<T>>,
    seen: HashMap<T::Id, u64>,
    next_seq: u64,
}

impl<T: Identified> Default for WeightedMerge<T> {
    fn default() -> Self {
        Self {
            ranked: Vec::new(),
            seen: HashMap::new(),
            next_seq: 0,
        }
    }
}

impl<T: Identified> WeightedMerge<T> {
    /// Creates an empty merge.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one match with `weight`.
    ///
    /// A value already present accumulates the weight into its score; a new
    /// value is inserted after every candidate with a greater or equal score.
    pub fn add(&mut self, value: T, weight: f32) {
        let entry = if let Some(&seq) = self.seen.get(value.identity()) {
            let Some(pos) = self.ranked.iter().position(|r| r.seq == seq) else {
                return;
            };
            let mut entry = self.ranked.remove(pos);
            entry.candidate.score += weight;
            entry
        } else {
            let seq = self.next_seq;
            self.next_seq += 1;
            self.seen.insert(value.identity().clone(), seq);
            Ranked {
                seq,
                candidate: SimilarityCandidate::new(value, weight),
            }
        };

        let at = self.ranked.partition_point(|r| r.precedes(&entry));
        self.ranked.insert(at, entry);
    }

    /// Number of distinct candidates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ranked.len()
    }

    /// Returns `true` if nothing was added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranked.is_empty()
    }

    /// Candidates in rank order.
    pub fn candidates(&self) -> impl Iterator<Item = &SimilarityCandidate<T>> {
        self.ranked.iter().map(|r| &r.candidate)
    }

    /// Consumes the merge, returning candidates in rank order.
    #[must_use]
    pub fn into_candidates(self) -> Vec<SimilarityCandidate<T>> {
        self.ranked.into_iter().map(|r| r.candidate).collect()
    }
}

/// Matches found by one similarity index.
///
/// Deserializes from the reply shape `{index, module, result: [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMatches<T = Record> {
    /// Index name, e.g. `email`.
    pub index: String,
    /// Module the matches belong to.
    #[serde(default)]
    pub module: Option<ModuleName>,
    /// Matched values in index order.
    #[serde(rename = "result", alias = "matches", default = "Vec::new")]
    pub matches: Vec<T>,
}

impl<T> IndexMatches<T> {
    /// Creates a match set for `index`.
    #[must_use]
    pub fn new(index: impl Into<String>, matches: Vec<T>) -> Self {
        Self {
            index: index.into(),
            module: None,
            matches,
        }
    }
}

/// Fuses per-index match sets into one ranked candidate list.
#[derive(Debug, Clone, Default)]
pub struct SimilarityMerger {
    weights: IndexWeights,
}

impl SimilarityMerger {
    /// Creates a merger with the given weights.
    #[must_use]
    pub const fn new(weights: IndexWeights) -> Self {
        Self { weights }
    }

    /// The weight table in use.
    #[must_use]
    pub const fn weights(&self) -> &IndexWeights {
        &self.weights
    }

    /// Merges match sets, highest score first.
    ///
    /// Sets for an unknown index are skipped with a warning. Feeding the same
    /// sets in the same order always yields the same list.
    #[must_use]
    pub fn merge<T>(&self, results: &[IndexMatches<T>]) -> Vec<SimilarityCandidate<T>>
    where
        T: Identified + Clone,
    {
        let mut merge = WeightedMerge::new();
        for set in results {
            let weight = match self.weights.weight(&set.index) {
                Ok(weight) => weight,
                Err(e) => {
                    tracing::warn!(error = %e, matches = set.matches.len(), "Skipping match set");
                    metrics::counter!("similarity_unknown_index_total").increment(1);
                    continue;
                },
            };
            for value in &set.matches {
                merge.add(value.clone(), weight);
            }
        }

        tracing::debug!(
            sets = results.len(),
            candidates = merge.len(),
            "Similarity results merged"
        );
        merge.into_candidates()
    }
}
