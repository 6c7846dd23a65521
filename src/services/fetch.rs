//! Single-flight page fetching per window edge.
//!
//! Each direction has one slot. A request claims the slot when it is issued
//! and releases it when its reply (or failure) arrives. Issuing a second
//! request for the same direction and generation while the first is
//! outstanding returns `None` and never reaches the channel.
//!
//! Requests are two-phase so the claim is synchronous:
//!
//! ```text
//! request_page()  -> Some(PageRequest)   slot InFlight
//! request_page()  -> None                dropped
//! PageRequest::send().await              one Channel::send
//!                 -> Ok(FetchedPage)     slot Idle
//!                 -> Err(_)              slot Failed (retryable)
//! ```
//!
//! Replies carry the window generation they were issued for. The caller
//! compares it with the window's current generation and discards late pages.

use std::sync::{Arc, Mutex, PoisonError};

use crate::channel::{Channel, LIST_RECORDS, PageQuery, PageReply, decode, encode};
use crate::models::{Cursor, Direction, FetchState, ListSelection, Record};
use crate::Result;

/// A page ready to attach to a window.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPage {
    /// Edge the page belongs to.
    pub direction: Direction,
    /// Window generation the request was issued for.
    pub generation: u64,
    /// Records in display order.
    pub records: Vec<Record>,
    /// Display position of the record nearest the edge.
    pub edge_offset: u64,
}

#[derive(Debug, Clone, Copy, Default)]
struct Slot {
    state: FetchState,
    generation: u64,
    ticket: u64,
}

#[derive(Debug, Default)]
struct Slots {
    slots: [Slot; 2],
    next_ticket: u64,
}

type SharedSlots = Arc<Mutex<Slots>>;

fn lock(slots: &SharedSlots) -> std::sync::MutexGuard<'_, Slots> {
    slots.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Issues page requests with at most one in flight per direction.
pub struct FetchCoordinator {
    channel: Arc<dyn Channel>,
    selection: ListSelection,
    slots: SharedSlots,
}

impl FetchCoordinator {
    /// Creates a coordinator for `selection` over `channel`.
    #[must_use]
    pub fn new(channel: Arc<dyn Channel>, selection: ListSelection) -> Self {
        Self {
            channel,
            selection,
            slots: Arc::default(),
        }
    }

    /// The selection pages are requested for.
    #[must_use]
    pub const fn selection(&self) -> &ListSelection {
        &self.selection
    }

    /// Switches the selection for subsequent requests.
    ///
    /// Outstanding requests keep running; their pages carry the old
    /// generation and are discarded by the caller.
    pub fn set_selection(&mut self, selection: ListSelection) {
        self.selection = selection;
    }

    /// Current state of `direction`.
    #[must_use]
    pub fn state(&self, direction: Direction) -> FetchState {
        lock(&self.slots).slots[direction.slot()].state
    }

    /// Claims `direction` and prepares a page request.
    ///
    /// `cursor` is the window edge to continue from (`None` on an empty
    /// window). Returns `None` without any I/O if a request for the same
    /// direction and generation is already in flight.
    #[must_use]
    pub fn request_page(
        &self,
        direction: Direction,
        cursor: Option<Cursor>,
        page_size: usize,
        generation: u64,
    ) -> Option<PageRequest> {
        let ticket = {
            let mut slots = lock(&self.slots);
            let slot = slots.slots[direction.slot()];
            if slot.state.is_in_flight() && slot.generation == generation {
                tracing::debug!(%direction, generation, "Fetch already in flight, request dropped");
                metrics::counter!("fetch_requests_dropped_total", "direction" => direction.as_str())
                    .increment(1);
                return None;
            }
            slots.next_ticket += 1;
            let ticket = slots.next_ticket;
            slots.slots[direction.slot()] = Slot {
                state: FetchState::InFlight,
                generation,
                ticket,
            };
            ticket
        };

        let descending = self.selection.order.is_descending();
        let query = PageQuery {
            module: self.selection.module.clone(),
            filter: self.selection.filter.clone(),
            index: self.selection.index,
            descending,
            reverse: descending != (direction == Direction::Backward),
            limit: page_size.max(1),
            after: cursor,
        };

        Some(PageRequest {
            channel: Arc::clone(&self.channel),
            slots: Arc::clone(&self.slots),
            direction,
            generation,
            ticket,
            query,
            settled: false,
        })
    }
}

/// A claimed, not yet sent page request.
///
/// Dropping it unsent releases the slot.
pub struct PageRequest {
    channel: Arc<dyn Channel>,
    slots: SharedSlots,
    direction: Direction,
    generation: u64,
    ticket: u64,
    query: PageQuery,
    settled: bool,
}

impl PageRequest {
    /// Edge this request fetches for.
    #[must_use]
    pub const fn direction(&self) -> Direction {
        self.direction
    }

    /// Window generation this request was issued for.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Payload that will be sent.
    #[must_use]
    pub const fn query(&self) -> &PageQuery {
        &self.query
    }

    /// Sends the request and waits for the reply.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::TransportFailure`] if the channel fails or the
    /// reply is malformed. The slot moves to `Failed` and a later request may
    /// retry.
    pub async fn send(mut self) -> Result<FetchedPage> {
        metrics::counter!("fetch_requests_total", "direction" => self.direction.as_str())
            .increment(1);
        let result = self.exchange().await;

        match &result {
            Ok(reply) => {
                tracing::debug!(
                    direction = %self.direction,
                    generation = self.generation,
                    records = reply.records.len(),
                    offset = reply.offset,
                    "Page received"
                );
                self.settle(FetchState::Idle);
            },
            Err(e) => {
                tracing::warn!(direction = %self.direction, error = %e, "Page fetch failed");
                metrics::counter!("fetch_failures_total", "direction" => self.direction.as_str())
                    .increment(1);
                self.settle(FetchState::Failed);
            },
        }

        let reply = result?;
        let mut records = reply.records;
        if self.direction == Direction::Backward {
            // Backward replies list the nearest record first.
            records.reverse();
        }
        Ok(FetchedPage {
            direction: self.direction,
            generation: self.generation,
            records,
            edge_offset: reply.offset,
        })
    }

    async fn exchange(&self) -> Result<PageReply> {
        let payload = encode(LIST_RECORDS, &self.query)?;
        let reply = self.channel.send(LIST_RECORDS, payload).await?;
        decode(LIST_RECORDS, reply)
    }

    fn settle(&mut self, state: FetchState) {
        self.settled = true;
        let mut slots = lock(&self.slots);
        let slot = &mut slots.slots[self.direction.slot()];
        // A newer request owns the slot after a reset.
        if slot.ticket == self.ticket && slot.state.is_in_flight() {
            slot.state = state;
        }
    }
}

impl Drop for PageRequest {
    fn drop(&mut self) {
        if !self.settled {
            self.settle(FetchState::Idle);
        }
    }
}
