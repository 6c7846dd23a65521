//! In-memory channel serving records from a local table.
//!
//! Stands in for the background process in tests and in the CLI `browse`
//! command. It counts transport invocations, can hold replies until released,
//! can fail the next request, and lets callers mutate the upstream set to
//! provoke stale pages.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Semaphore;

use super::{Channel, LIST_RECORDS, PageQuery, PageReply, QUERY_SIMILAR, decode};
use crate::models::{ModuleName, Record, RecordId, SortOrder};
use crate::{Error, Result};

/// Channel backed by in-process record tables.
#[derive(Default)]
pub struct MemoryChannel {
    tables: Mutex<HashMap<ModuleName, Vec<Record>>>,
    similar_reply: Mutex<serde_json::Value>,
    calls: AtomicUsize,
    requests: Mutex<Vec<String>>,
    fail_next: Mutex<Option<String>>,
    gate: Mutex<Option<Arc<Semaphore>>>,
}

impl MemoryChannel {
    /// Creates an empty channel.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a channel holding `records`, grouped by module.
    #[must_use]
    pub fn with_records(records: impl IntoIterator<Item = Record>) -> Self {
        let channel = Self::new();
        for record in records {
            channel.insert(record);
        }
        channel
    }

    /// Inserts or replaces a record upstream.
    pub fn insert(&self, record: Record) {
        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        let table = tables.entry(record.module.clone()).or_default();
        table.retain(|r| r.id != record.id);
        table.push(record);
    }

    /// Removes a record upstream. Returns `true` if it existed.
    pub fn remove(&self, module: &ModuleName, id: &RecordId) -> bool {
        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        tables.get_mut(module).is_some_and(|table| {
            let before = table.len();
            table.retain(|r| &r.id != id);
            table.len() != before
        })
    }

    /// Sets the reply returned for [`QUERY_SIMILAR`].
    pub fn set_similar_reply(&self, reply: serde_json::Value) {
        *self
            .similar_reply
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = reply;
    }

    /// Fails the next request with `cause`.
    pub fn fail_next(&self, cause: impl Into<String>) {
        *self.fail_next.lock().unwrap_or_else(PoisonError::into_inner) = Some(cause.into());
    }

    /// Holds every subsequent reply until [`release`](Self::release) is called.
    pub fn hold(&self) {
        *self.gate.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(Arc::new(Semaphore::new(0)));
    }

    /// Lets `replies` held requests proceed.
    pub fn release(&self, replies: usize) {
        if let Some(gate) = self
            .gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            gate.add_permits(replies);
        }
    }

    /// Number of transport invocations so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Request names in invocation order.
    #[must_use]
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn list_page(&self, query: &PageQuery) -> PageReply {
        let tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        let mut display: Vec<&Record> = tables
            .get(&query.module)
            .map(|table| {
                table
                    .iter()
                    .filter(|r| matches_filter(r, query.filter.as_deref()))
                    .collect()
            })
            .unwrap_or_default();

        let order = if query.descending {
            SortOrder::Descending
        } else {
            SortOrder::Ascending
        };
        display.sort_by(|a, b| order.compare(&a.cursor(query.index), &b.cursor(query.index)));

        if query.is_backward() {
            // Records strictly before the cursor, nearest first.
            let end = query.after.as_ref().map_or(display.len(), |after| {
                display.partition_point(|r| order.compare(&r.cursor(query.index), after).is_lt())
            });
            let start = end.saturating_sub(query.limit);
            let records = display[start..end].iter().rev().map(|r| (*r).clone()).collect();
            PageReply {
                records,
                offset: end.saturating_sub(1) as u64,
            }
        } else {
            let start = query.after.as_ref().map_or(0, |after| {
                display.partition_point(|r| order.compare(&r.cursor(query.index), after).is_le())
            });
            let end = (start + query.limit).min(display.len());
            let records = display[start..end].iter().map(|r| (*r).clone()).collect();
            PageReply {
                records,
                offset: start as u64,
            }
        }
    }

    async fn wait_for_release(&self, request: &str) -> Result<()> {
        let gate = self
            .gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(gate) = gate {
            gate.acquire()
                .await
                .map_err(|e| Error::TransportFailure {
                    request: request.to_string(),
                    cause: e.to_string(),
                })?
                .forget();
        }
        Ok(())
    }
}

fn matches_filter(record: &Record, filter: Option<&str>) -> bool {
    let Some(filter) = filter else {
        return true;
    };
    record
        .data
        .get("tags")
        .and_then(serde_json::Value::as_array)
        .is_some_and(|tags| tags.iter().any(|t| t.as_str() == Some(filter)))
}

#[async_trait]
impl Channel for MemoryChannel {
    async fn send(&self, request: &str, payload: serde_json::Value) -> Result<serde_json::Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.to_string());

        self.wait_for_release(request).await?;

        let failure = self
            .fail_next
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(cause) = failure {
            return Err(Error::TransportFailure {
                request: request.to_string(),
                cause,
            });
        }

        match request {
            LIST_RECORDS => {
                let query: PageQuery = decode(request, payload)?;
                let reply = self.list_page(&query);
                super::encode(request, &reply)
            },
            QUERY_SIMILAR => Ok(self
                .similar_reply
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()),
            other => Err(Error::TransportFailure {
                request: other.to_string(),
                cause: "unknown request".to_string(),
            }),
        }
    }
}
