//! Cache broadcast event types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ModuleName;

/// Event type carried by cache-fetch broadcasts.
pub const CACHE_FETCH_EVENT: &str = "sugarcrm-cache-fetch";

/// Phase of a background cache refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CachePhase {
    /// The data owner started refreshing the module cache.
    Start,
    /// The refresh finished; `count` new records arrived.
    #[serde(alias = "end")]
    Done,
}

/// Broadcast notice that the remote cache for a module changed.
///
/// Deserializes from the wire shape `{type, module, phase, count}`; the older
/// `state` field name is accepted for `phase`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEvent {
    /// Unique identifier for this event.
    #[serde(default = "new_event_id")]
    pub event_id: String,
    /// Broadcast type name.
    #[serde(rename = "type", default = "default_event_type")]
    pub event_type: String,
    /// Module whose cache changed.
    pub module: ModuleName,
    /// Refresh phase.
    #[serde(alias = "state")]
    pub phase: CachePhase,
    /// Number of new records, only meaningful on `Done`.
    #[serde(default)]
    pub count: Option<u64>,
}

impl CacheEvent {
    /// Creates a `Start` event for `module`.
    #[must_use]
    pub fn started(module: impl Into<ModuleName>) -> Self {
        Self {
            event_id: new_event_id(),
            event_type: default_event_type(),
            module: module.into(),
            phase: CachePhase::Start,
            count: None,
        }
    }

    /// Creates a `Done` event for `module` with `count` new records.
    #[must_use]
    pub fn done(module: impl Into<ModuleName>, count: u64) -> Self {
        Self {
            event_id: new_event_id(),
            event_type: default_event_type(),
            module: module.into(),
            phase: CachePhase::Done,
            count: Some(count),
        }
    }

    /// Returns the new record count, zero when absent.
    #[must_use]
    pub fn new_records(&self) -> u64 {
        self.count.unwrap_or(0)
    }
}

fn new_event_id() -> String {
    Uuid::new_v4().to_string()
}

fn default_event_type() -> String {
    CACHE_FETCH_EVENT.to_string()
}
