//! Business logic services.
//!
//! Services hold the list window and similarity state and talk to the data
//! owner through an injected [`crate::channel::Channel`].

mod fetch;
mod invalidation;
mod linking;
mod scroll;
mod similarity;
mod sources;
mod synchronizer;
mod window;

pub use fetch::{FetchCoordinator, FetchedPage, PageRequest};
pub use invalidation::{CacheInvalidationListener, CacheNotice};
pub use linking::{CERTAIN_MATCH_SCORE, LinkDecision, SimilarityService};
pub use scroll::{ScrollDecision, ScrollPolicy, Viewport};
pub use similarity::{IndexMatches, IndexWeights, SimilarityMerger, WeightedMerge};
pub use sources::{ProfileSource, ProfileSources};
pub use synchronizer::{ListSynchronizer, LoadOutcome, WindowRenderer};
pub use window::{Exhaustion, IngestReport, WindowBuffer};
