//! Request/response channel to the background data owner.
//!
//! The channel is an opaque asynchronous capability keyed by a request name
//! and a JSON payload. Services receive it at construction time as an
//! `Arc<dyn Channel>`; nothing looks a channel up from process-wide state.
//!
//! # Requests
//!
//! | Request | Payload | Reply |
//! |---------|---------|-------|
//! | [`LIST_RECORDS`] | [`PageQuery`] | [`PageReply`] |
//! | [`QUERY_SIMILAR`] | contact object | `[{index, module, result: [Record]}]` |
//!
//! # Pagination
//!
//! `reverse` selects descending key iteration and `descending` the display
//! order, so a backward page in a descending list iterates ascending. The
//! reply `offset` is the display position of `records[0]`; a backward reply
//! lists the nearest record first.

mod memory;

pub use memory::MemoryChannel;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::models::{Cursor, ModuleName, Record, SortIndex};
use crate::{Error, Result};

/// Lists one page of a module's records.
pub const LIST_RECORDS: &str = "list-records";

/// Queries records similar to an external contact.
pub const QUERY_SIMILAR: &str = "query-similar";

/// Asynchronous request/response channel.
///
/// # Implementor Notes
///
/// - Methods use `&self` to enable sharing via `Arc<dyn Channel>`
/// - A rejected or dropped request is reported as [`Error::TransportFailure`]
/// - There is no cancellation: callers discard unwanted replies on arrival
#[async_trait]
pub trait Channel: Send + Sync {
    /// Sends `payload` under `request` and resolves with the reply.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransportFailure`] if the data owner rejects the
    /// request or the channel is disconnected.
    async fn send(&self, request: &str, payload: serde_json::Value) -> Result<serde_json::Value>;
}

/// Payload of a [`LIST_RECORDS`] request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageQuery {
    /// Module to list.
    pub module: ModuleName,
    /// Optional named filter.
    #[serde(default)]
    pub filter: Option<String>,
    /// Sort index.
    pub index: SortIndex,
    /// Display order is descending.
    #[serde(default)]
    pub descending: bool,
    /// Iterate keys in descending order.
    #[serde(default)]
    pub reverse: bool,
    /// Maximum records to return.
    pub limit: usize,
    /// Exclusive cursor to continue from; `None` starts at the list edge.
    #[serde(default)]
    pub after: Option<Cursor>,
}

impl PageQuery {
    /// Returns `true` when the query walks toward the display head.
    #[must_use]
    pub const fn is_backward(&self) -> bool {
        self.reverse != self.descending
    }
}

/// Reply to a [`LIST_RECORDS`] request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageReply {
    /// Records in iteration order.
    pub records: Vec<Record>,
    /// Display position of `records[0]`.
    #[serde(default)]
    pub offset: u64,
}

/// Encodes a payload for `request`.
pub(crate) fn encode<T: Serialize>(request: &str, payload: &T) -> Result<serde_json::Value> {
    serde_json::to_value(payload).map_err(|e| Error::TransportFailure {
        request: request.to_string(),
        cause: format!("encode payload: {e}"),
    })
}

/// Decodes the reply to `request`.
pub(crate) fn decode<T: DeserializeOwned>(request: &str, reply: serde_json::Value) -> Result<T> {
    serde_json::from_value(reply).map_err(|e| Error::TransportFailure {
        request: request.to_string(),
        cause: format!("malformed reply: {e}"),
    })
}
