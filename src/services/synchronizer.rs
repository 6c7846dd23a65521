//! List synchronization: window, fetches, scroll and cache notices together.
//!
//! [`ListSynchronizer`] owns one window for one selection. It asks the
//! scroll policy what to load, claims the edge through the fetch coordinator,
//! and attaches replies to the window. Replies issued for an earlier window
//! generation are dropped on arrival.
//!
//! A page that fails contiguity resets the window to empty. Nothing is
//! refetched automatically; the next scroll or refresh fills it again.

use std::sync::Arc;

use crate::channel::Channel;
use crate::config::CrmSyncConfig;
use crate::models::{
    Direction, ListSelection, ModuleName, Record, RecordId, SortIndex, SortOrder, WindowSnapshot,
};
use crate::Result;

use super::fetch::{FetchCoordinator, FetchedPage, PageRequest};
use super::invalidation::CacheNotice;
use super::scroll::{ScrollDecision, ScrollPolicy, Viewport};
use super::window::WindowBuffer;

/// Rendering collaborator of a synchronized list.
///
/// # Implementor Notes
///
/// - Methods use `&self` to enable sharing via `Arc<dyn WindowRenderer>`
/// - `is_record_visible` is queried during eviction and must not block
pub trait WindowRenderer: Send + Sync {
    /// The window contents changed.
    fn on_window_changed(&self, snapshot: &WindowSnapshot);

    /// Returns `true` if the record is currently on screen.
    fn is_record_visible(&self, id: &RecordId) -> bool;

    /// A cache refresh started for `module`.
    fn on_cache_updating(&self, _module: &ModuleName) {}

    /// `count` new records wait behind a manual refresh.
    fn on_new_records(&self, _module: &ModuleName, _count: u64) {}

    /// The cache refresh finished with nothing new.
    fn on_cache_settled(&self, _module: &ModuleName) {}
}

/// Result of one load attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Records were attached.
    Loaded {
        /// Records attached.
        inserted: usize,
        /// Records evicted from the opposite edge.
        evicted: usize,
    },
    /// The edge has no more records.
    Exhausted,
    /// The reply belonged to an earlier window generation.
    Discarded,
    /// The page did not continue the window; the window was reset.
    Reset,
    /// Nothing was requested: the edge is exhausted, in flight, or the
    /// window is empty and the direction is backward.
    Skipped,
}

/// Keeps a bounded window in step with a remote record list.
pub struct ListSynchronizer {
    window: WindowBuffer,
    coordinator: FetchCoordinator,
    policy: ScrollPolicy,
    renderer: Arc<dyn WindowRenderer>,
    page_size: usize,
    initial_fill: usize,
}

impl ListSynchronizer {
    /// Creates a synchronizer with an empty window.
    #[must_use]
    pub fn new(
        channel: Arc<dyn Channel>,
        renderer: Arc<dyn WindowRenderer>,
        selection: ListSelection,
        config: &CrmSyncConfig,
    ) -> Self {
        let window = WindowBuffer::new(config.window.max_size, selection.index, selection.order);
        Self {
            window,
            coordinator: FetchCoordinator::new(channel, selection),
            policy: ScrollPolicy::from_config(&config.scroll),
            renderer,
            page_size: config.window.page_size,
            initial_fill: config.scroll.viewport_items + config.window.overshoot,
        }
    }

    /// The window.
    #[must_use]
    pub const fn window(&self) -> &WindowBuffer {
        &self.window
    }

    /// The fetch coordinator.
    #[must_use]
    pub const fn coordinator(&self) -> &FetchCoordinator {
        &self.coordinator
    }

    /// The active selection.
    #[must_use]
    pub const fn selection(&self) -> &ListSelection {
        self.coordinator.selection()
    }

    /// Copies the window.
    #[must_use]
    pub fn snapshot(&self) -> WindowSnapshot {
        self.window.snapshot()
    }

    /// Claims `direction` and prepares its request.
    ///
    /// Returns `None` if the edge is exhausted or already in flight, or if a
    /// backward load is asked of an empty window.
    #[must_use]
    pub fn begin_load(&self, direction: Direction) -> Option<PageRequest> {
        if self.window.is_exhausted(direction) {
            return None;
        }
        if direction == Direction::Backward && self.window.is_empty() {
            return None;
        }
        let cursor = self.window.edge(direction).cloned();
        self.coordinator
            .request_page(direction, cursor, self.page_size, self.window.generation())
    }

    /// Attaches the result of a request from [`begin_load`](Self::begin_load).
    ///
    /// # Errors
    ///
    /// Returns the transport error of a failed fetch. A stale page is not an
    /// error: the window is reset and [`LoadOutcome::Reset`] is returned.
    pub fn complete_load(&mut self, result: Result<FetchedPage>) -> Result<LoadOutcome> {
        let page = result?;
        if page.generation != self.window.generation() {
            tracing::debug!(
                direction = %page.direction,
                page_generation = page.generation,
                generation = self.window.generation(),
                "Discarding page from earlier generation"
            );
            metrics::counter!("window_pages_discarded_total").increment(1);
            return Ok(LoadOutcome::Discarded);
        }

        let renderer = Arc::clone(&self.renderer);
        let ingested = self.window.ingest(
            page.direction,
            page.records,
            page.edge_offset,
            |id| renderer.is_record_visible(id),
        );
        match ingested {
            Ok(report) => {
                self.renderer.on_window_changed(&self.window.snapshot());
                if report.exhausted {
                    Ok(LoadOutcome::Exhausted)
                } else {
                    Ok(LoadOutcome::Loaded {
                        inserted: report.inserted,
                        evicted: report.evicted.len(),
                    })
                }
            },
            Err(e) if e.is_stale() => {
                tracing::warn!(
                    error = %e,
                    module = %self.selection().module,
                    "Stale page, resetting window"
                );
                metrics::counter!("window_stale_fetch_total").increment(1);
                self.reset();
                Ok(LoadOutcome::Reset)
            },
            Err(e) => Err(e),
        }
    }

    /// Loads one page for `direction`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::TransportFailure`] if the fetch fails.
    pub async fn load(&mut self, direction: Direction) -> Result<LoadOutcome> {
        let Some(request) = self.begin_load(direction) else {
            return Ok(LoadOutcome::Skipped);
        };
        let result = request.send().await;
        self.complete_load(result)
    }

    /// Loads pages for `direction` until the window holds `target` records.
    ///
    /// Stops early on exhaustion, a reset, a skipped load, or a page trimmed
    /// away entirely. Returns the
    /// number of records attached.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::TransportFailure`] if a fetch fails.
    pub async fn fill(&mut self, direction: Direction, target: usize) -> Result<usize> {
        let generation = self.window.generation();
        let target = target.min(self.window.max_size());
        let mut attached = 0;
        while self.window.len() < target && self.window.generation() == generation {
            match self.load(direction).await? {
                LoadOutcome::Loaded { inserted, .. } if inserted > 0 => attached += inserted,
                _ => break,
            }
        }
        Ok(attached)
    }

    /// Reacts to remaining item counts beyond the viewport.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::TransportFailure`] if a fetch fails.
    pub async fn on_scroll(
        &mut self,
        remaining_forward: f64,
        remaining_backward: f64,
    ) -> Result<ScrollDecision> {
        let decision = self.policy.on_scroll_delta(
            remaining_forward,
            remaining_backward,
            self.window.exhaustion(),
        );
        for direction in decision.directions() {
            self.load(direction).await?;
        }
        Ok(decision)
    }

    /// Reacts to viewport geometry after a scroll.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::TransportFailure`] if a fetch fails.
    pub async fn on_viewport(&mut self, viewport: Viewport) -> Result<ScrollDecision> {
        self.on_scroll(
            self.policy.remaining_items(viewport.pixels_below()),
            self.policy.remaining_items(viewport.pixels_above()),
        )
        .await
    }

    /// Empties the window and notifies the renderer.
    ///
    /// Replies still in flight are discarded when they arrive.
    pub fn reset(&mut self) {
        self.window.reset();
        self.renderer.on_window_changed(&self.window.snapshot());
    }

    /// Discards the window and fills it again from the list head.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::TransportFailure`] if a fetch fails.
    pub async fn refresh(&mut self) -> Result<usize> {
        tracing::info!(module = %self.selection().module, "Refreshing list");
        self.reset();
        self.fill(Direction::Forward, self.initial_fill).await
    }

    /// Switches the selection, refilling only if it changed.
    ///
    /// Returns `true` if the window was rebuilt.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::TransportFailure`] if a fetch fails.
    pub async fn set_selection(&mut self, selection: ListSelection) -> Result<bool> {
        if &selection == self.selection() {
            return Ok(false);
        }
        tracing::debug!(
            module = %selection.module,
            index = %selection.index,
            descending = selection.order.is_descending(),
            "Selection changed"
        );
        self.window.reorder(selection.index, selection.order);
        self.coordinator.set_selection(selection);
        self.renderer.on_window_changed(&self.window.snapshot());
        self.fill(Direction::Forward, self.initial_fill).await?;
        Ok(true)
    }

    /// Switches module, keeping sort and clearing the filter.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::TransportFailure`] if a fetch fails.
    pub async fn set_module(&mut self, module: impl Into<ModuleName>) -> Result<bool> {
        let current = self.selection();
        let selection = ListSelection {
            module: module.into(),
            filter: None,
            index: current.index,
            order: current.order,
        };
        self.set_selection(selection).await
    }

    /// Switches sort index and order.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::TransportFailure`] if a fetch fails.
    pub async fn set_order(&mut self, index: SortIndex, order: SortOrder) -> Result<bool> {
        let selection = self.selection().clone().with_index(index).with_order(order);
        self.set_selection(selection).await
    }

    /// Switches filter.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::TransportFailure`] if a fetch fails.
    pub async fn set_filter(&mut self, filter: Option<String>) -> Result<bool> {
        let mut selection = self.selection().clone();
        selection.filter = filter;
        self.set_selection(selection).await
    }

    /// Swaps in a refetched copy of a materialized record.
    ///
    /// Returns `false` if the record is not materialized. A copy that no
    /// longer fits its position resets the window.
    pub fn replace_record(&mut self, record: Record) -> bool {
        match self.window.replace(record) {
            Ok(replaced) => {
                if replaced {
                    self.renderer.on_window_changed(&self.window.snapshot());
                }
                replaced
            },
            Err(e) => {
                tracing::warn!(error = %e, "Replaced record moved, resetting window");
                self.reset();
                false
            },
        }
    }

    /// Forwards a cache notice for this list's module to the renderer.
    ///
    /// The window is never modified.
    pub fn apply_cache_notice(&self, notice: &CacheNotice) {
        if notice.module() != &self.selection().module {
            return;
        }
        match notice {
            CacheNotice::Updating { module } => self.renderer.on_cache_updating(module),
            CacheNotice::NewRecordsAvailable { module, count } => {
                self.renderer.on_new_records(module, *count);
            },
            CacheNotice::UpToDate { module } => self.renderer.on_cache_settled(module),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MemoryChannel;
    use crate::config::WindowConfig;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        snapshots: Mutex<Vec<WindowSnapshot>>,
        notices: Mutex<Vec<String>>,
    }

    impl WindowRenderer for Recorder {
        fn on_window_changed(&self, snapshot: &WindowSnapshot) {
            self.snapshots.lock().unwrap().push(snapshot.clone());
        }

        fn is_record_visible(&self, _id: &RecordId) -> bool {
            false
        }

        fn on_cache_updating(&self, module: &ModuleName) {
            self.notices.lock().unwrap().push(format!("{module}:updating"));
        }

        fn on_new_records(&self, module: &ModuleName, count: u64) {
            self.notices.lock().unwrap().push(format!("{module}:{count}"));
        }

        fn on_cache_settled(&self, module: &ModuleName) {
            self.notices.lock().unwrap().push(format!("{module}:settled"));
        }
    }

    fn contacts(n: u32) -> Arc<MemoryChannel> {
        Arc::new(MemoryChannel::with_records((0..n).map(|i| {
            Record::new(format!("k{i:03}"), "Contacts", format!("n{i:03}"), i64::from(i))
        })))
    }

    fn config(max_size: usize, page_size: usize) -> CrmSyncConfig {
        CrmSyncConfig::default().with_window(
            WindowConfig::default()
                .with_max_size(max_size)
                .with_page_size(page_size),
        )
    }

    fn sync(
        channel: Arc<MemoryChannel>,
        config: &CrmSyncConfig,
    ) -> (ListSynchronizer, Arc<Recorder>) {
        let renderer = Arc::new(Recorder::default());
        let selection = ListSelection::new("Contacts").with_index(SortIndex::Id);
        (ListSynchronizer::new(channel, renderer.clone(), selection, config), renderer)
    }

    #[tokio::test]
    async fn test_refresh_fills_viewport_plus_overshoot() {
        let (mut sync, renderer) = sync(contacts(100), &config(50, 5));
        let attached = sync.refresh().await.unwrap();
        // 10 viewport items + 3 overshoot, in pages of 5.
        assert_eq!(attached, 15);
        assert_eq!(sync.window().len(), 15);
        assert!(sync.window().is_exhausted(Direction::Backward));
        assert!(!renderer.snapshots.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_load_until_exhausted() {
        let (mut sync, _) = sync(contacts(4), &config(50, 3));
        let first = sync.load(Direction::Forward).await.unwrap();
        assert!(matches!(first, LoadOutcome::Loaded { inserted: 3, .. }));
        let second = sync.load(Direction::Forward).await.unwrap();
        assert!(matches!(second, LoadOutcome::Loaded { inserted: 1, .. }));
        assert_eq!(sync.load(Direction::Forward).await.unwrap(), LoadOutcome::Exhausted);
        assert_eq!(sync.load(Direction::Forward).await.unwrap(), LoadOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_backward_load_on_empty_window_is_skipped() {
        let (mut sync, _) = sync(contacts(4), &config(50, 3));
        assert_eq!(sync.load(Direction::Backward).await.unwrap(), LoadOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_scroll_back_after_eviction() {
        let channel = contacts(30);
        let (mut sync, _) = sync(channel, &config(6, 3));
        sync.fill(Direction::Forward, 6).await.unwrap();
        sync.load(Direction::Forward).await.unwrap();
        assert_eq!(sync.window().head_offset(), Some(3));
        assert!(!sync.window().is_exhausted(Direction::Backward));

        let decision = sync.on_scroll(20.0, 0.0).await.unwrap();
        assert!(decision.load_backward);
        assert_eq!(sync.window().head_offset(), Some(0));
        assert_eq!(sync.window().len(), 6);
    }

    #[tokio::test]
    async fn test_upstream_insert_resets_window() {
        let channel = contacts(10);
        let (mut sync, _) = sync(channel.clone(), &config(50, 3));
        sync.load(Direction::Forward).await.unwrap();
        // A record sorting before the tail shifts every later position.
        channel.insert(Record::new("k000a", "Contacts", "new", 0));
        assert_eq!(sync.load(Direction::Forward).await.unwrap(), LoadOutcome::Reset);
        assert!(sync.window().is_empty());
        assert_eq!(sync.window().generation(), 1);
    }

    #[tokio::test]
    async fn test_set_selection_only_when_changed() {
        let channel = contacts(10);
        let (mut sync, _) = sync(channel.clone(), &config(50, 5));
        sync.refresh().await.unwrap();
        let calls = channel.call_count();

        let same = sync.selection().clone();
        assert!(!sync.set_selection(same).await.unwrap());
        assert_eq!(channel.call_count(), calls);

        assert!(sync.set_order(SortIndex::Id, SortOrder::Descending).await.unwrap());
        assert_eq!(
            sync.window().records().next().map(|r| r.id.as_str()),
            Some("k009")
        );
    }

    #[tokio::test]
    async fn test_transport_failure_surfaces_and_retries() {
        let channel = contacts(10);
        let (mut sync, _) = sync(channel.clone(), &config(50, 5));
        channel.fail_next("disconnected");
        assert!(sync.load(Direction::Forward).await.unwrap_err().is_retryable());
        assert!(sync.window().is_empty());
        assert!(matches!(sync.load(Direction::Forward).await.unwrap(), LoadOutcome::Loaded { .. }));
    }

    #[test]
    fn test_cache_notice_never_touches_window() {
        let (sync, renderer) = sync(contacts(1), &config(50, 5));
        sync.apply_cache_notice(&CacheNotice::NewRecordsAvailable {
            module: "Contacts".into(),
            count: 3,
        });
        sync.apply_cache_notice(&CacheNotice::NewRecordsAvailable {
            module: "Leads".into(),
            count: 9,
        });
        assert_eq!(*renderer.notices.lock().unwrap(), vec!["Contacts:3".to_string()]);
        assert!(renderer.snapshots.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cache_update_cycle_reaches_renderer() {
        let (mut sync, renderer) = sync(contacts(10), &config(50, 5));
        sync.load(Direction::Forward).await.unwrap();
        let before = sync.snapshot();
        let changes = renderer.snapshots.lock().unwrap().len();

        sync.apply_cache_notice(&CacheNotice::Updating {
            module: "Contacts".into(),
        });
        sync.apply_cache_notice(&CacheNotice::UpToDate {
            module: "Contacts".into(),
        });
        sync.apply_cache_notice(&CacheNotice::Updating {
            module: "Leads".into(),
        });

        assert_eq!(
            *renderer.notices.lock().unwrap(),
            vec!["Contacts:updating".to_string(), "Contacts:settled".to_string()]
        );
        assert_eq!(sync.snapshot(), before);
        assert_eq!(renderer.snapshots.lock().unwrap().len(), changes);
    }

    // Answers every request with the same reply.
    struct FixedReply(serde_json::Value);

    #[async_trait::async_trait]
    impl Channel for FixedReply {
        async fn send(
            &self,
            _request: &str,
            _payload: serde_json::Value,
        ) -> Result<serde_json::Value> {
            Ok(self.0.clone())
        }
    }

    fn at_offset(ids: &[&str], offset: u64) -> Arc<FixedReply> {
        let records: Vec<_> = ids
            .iter()
            .map(|id| serde_json::json!({"id": id, "module": "Contacts"}))
            .collect();
        Arc::new(FixedReply(serde_json::json!({"records": records, "offset": offset})))
    }

    fn over(channel: Arc<FixedReply>) -> ListSynchronizer {
        let selection = ListSelection::new("Contacts").with_index(SortIndex::Id);
        ListSynchronizer::new(channel, Arc::new(Recorder::default()), selection, &config(50, 5))
    }

    #[tokio::test]
    async fn test_page_past_last_position_resets() {
        let mut sync = over(at_offset(&["a", "b"], u64::MAX));
        assert_eq!(sync.load(Direction::Forward).await.unwrap(), LoadOutcome::Reset);
        assert!(sync.window().is_empty());
    }

    #[tokio::test]
    async fn test_tail_at_last_position_cannot_be_extended() {
        let mut sync = over(at_offset(&["a"], u64::MAX));
        let first = sync.load(Direction::Forward).await.unwrap();
        assert!(matches!(first, LoadOutcome::Loaded { inserted: 1, .. }));
        assert_eq!(sync.window().tail_offset(), Some(u64::MAX));

        assert_eq!(sync.load(Direction::Forward).await.unwrap(), LoadOutcome::Reset);
        assert!(sync.window().is_empty());
    }
}
