//! Link-or-create decisions for external contacts.
//!
//! The data owner runs one similarity query per index and replies with the
//! match sets; [`SimilarityService`] merges them and decides whether the
//! contact must be linked to an existing record or may be created anew.

use std::sync::Arc;

use crate::channel::{Channel, QUERY_SIMILAR, decode};
use crate::models::{Record, SimilarityCandidate};
use crate::Result;

use super::similarity::{IndexMatches, SimilarityMerger};

/// Score at or above which a candidate is a certain match.
///
/// A single email match reaches it on its own.
pub const CERTAIN_MATCH_SCORE: f32 = 1.0;

/// Outcome of a similarity lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkDecision {
    /// Ranked candidates, highest score first.
    pub candidates: Vec<SimilarityCandidate>,
    /// `false` once any candidate is a certain match.
    pub allow_create: bool,
}

impl LinkDecision {
    /// Decides from ranked candidates.
    #[must_use]
    pub fn from_candidates(candidates: Vec<SimilarityCandidate>) -> Self {
        let allow_create = !candidates
            .iter()
            .any(|c| c.score >= CERTAIN_MATCH_SCORE);
        Self {
            candidates,
            allow_create,
        }
    }

    /// The best certain match, if any.
    #[must_use]
    pub fn certain_match(&self) -> Option<&SimilarityCandidate> {
        self.candidates
            .first()
            .filter(|c| c.score >= CERTAIN_MATCH_SCORE)
    }
}

/// Queries similar records over a channel and ranks them.
pub struct SimilarityService {
    channel: Arc<dyn Channel>,
    merger: SimilarityMerger,
}

impl SimilarityService {
    /// Creates a service with the standard weights.
    #[must_use]
    pub fn new(channel: Arc<dyn Channel>) -> Self {
        Self::with_merger(channel, SimilarityMerger::default())
    }

    /// Creates a service with a custom merger.
    #[must_use]
    pub fn with_merger(channel: Arc<dyn Channel>, merger: SimilarityMerger) -> Self {
        Self { channel, merger }
    }

    /// Looks up records similar to `contact`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::TransportFailure`] if the query fails or the
    /// reply is not a list of match sets.
    pub async fn find_similar(&self, contact: serde_json::Value) -> Result<LinkDecision> {
        let reply = self.channel.send(QUERY_SIMILAR, contact).await?;
        let sets: Vec<IndexMatches<Record>> = decode(QUERY_SIMILAR, reply)?;
        let decision = LinkDecision::from_candidates(self.merger.merge(&sets));
        tracing::info!(
            sets = sets.len(),
            candidates = decision.candidates.len(),
            allow_create = decision.allow_create,
            "Similar records ranked"
        );
        metrics::counter!("similarity_queries_total").increment(1);
        Ok(decision)
    }
}
