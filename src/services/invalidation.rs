//! Cache change notices for a rendered list.
//!
//! The background process broadcasts when it starts and finishes refreshing a
//! module's cache. New records are never spliced into a live window: the
//! listener only turns those broadcasts into user-facing notices and keeps a
//! running count of records waiting behind a manual refresh.

use tokio::sync::broadcast::{self, error::RecvError};

use crate::models::{CacheEvent, CachePhase, ModuleName};
use crate::observability::CacheEventSource;

/// A notice for the rendering collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheNotice {
    /// A cache refresh started.
    Updating {
        /// Module being refreshed.
        module: ModuleName,
    },
    /// New records wait behind a manual refresh.
    NewRecordsAvailable {
        /// Module with new records.
        module: ModuleName,
        /// Records pending since the last refresh.
        count: u64,
    },
    /// The refresh finished without new records.
    UpToDate {
        /// Module refreshed.
        module: ModuleName,
    },
}

impl CacheNotice {
    /// Module the notice concerns.
    #[must_use]
    pub const fn module(&self) -> &ModuleName {
        match self {
            Self::Updating { module }
            | Self::NewRecordsAvailable { module, .. }
            | Self::UpToDate { module } => module,
        }
    }
}

/// Subscribes to cache broadcasts for one module.
pub struct CacheInvalidationListener {
    module: ModuleName,
    receiver: Option<broadcast::Receiver<CacheEvent>>,
    pending: u64,
    updating: bool,
}

impl CacheInvalidationListener {
    /// Attaches to `source` for `module`.
    #[must_use]
    pub fn new(module: impl Into<ModuleName>, source: &impl CacheEventSource) -> Self {
        let module = module.into();
        tracing::debug!(%module, "Cache listener attached");
        Self {
            module,
            receiver: Some(source.subscribe()),
            pending: 0,
            updating: false,
        }
    }

    /// Module listened for.
    #[must_use]
    pub const fn module(&self) -> &ModuleName {
        &self.module
    }

    /// Switches module and clears pending state.
    pub fn set_module(&mut self, module: impl Into<ModuleName>) {
        self.module = module.into();
        self.pending = 0;
        self.updating = false;
    }

    /// Records waiting behind a manual refresh.
    #[must_use]
    pub const fn pending(&self) -> u64 {
        self.pending
    }

    /// Returns `true` between a start and a done broadcast.
    #[must_use]
    pub const fn is_updating(&self) -> bool {
        self.updating
    }

    /// Returns `true` until [`detach`](Self::detach) is called.
    #[must_use]
    pub const fn is_attached(&self) -> bool {
        self.receiver.is_some()
    }

    /// Clears the pending count; call when the user refreshes the list.
    pub fn take_pending(&mut self) -> u64 {
        std::mem::take(&mut self.pending)
    }

    /// Unsubscribes. Further [`next_notice`](Self::next_notice) calls return
    /// `None` immediately.
    pub fn detach(&mut self) {
        if self.receiver.take().is_some() {
            tracing::debug!(module = %self.module, "Cache listener detached");
        }
    }

    /// Turns one broadcast into a notice.
    ///
    /// Events for other modules are ignored.
    pub fn handle(&mut self, event: &CacheEvent) -> Option<CacheNotice> {
        if event.module != self.module {
            return None;
        }
        let module = self.module.clone();
        match event.phase {
            CachePhase::Start => {
                self.updating = true;
                Some(CacheNotice::Updating { module })
            },
            CachePhase::Done => {
                self.updating = false;
                self.pending += event.new_records();
                tracing::debug!(
                    %module,
                    new = event.new_records(),
                    pending = self.pending,
                    "Cache refreshed"
                );
                if self.pending > 0 {
                    Some(CacheNotice::NewRecordsAvailable {
                        module,
                        count: self.pending,
                    })
                } else {
                    Some(CacheNotice::UpToDate { module })
                }
            },
        }
    }

    /// Waits for the next notice for this module.
    ///
    /// Returns `None` once detached or when the source is gone.
    pub async fn next_notice(&mut self) -> Option<CacheNotice> {
        loop {
            let received = self.receiver.as_mut()?.recv().await;
            let event = match received {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(module = %self.module, skipped, "Cache listener lagged");
                    metrics::counter!("cache_listener_lagged_total").increment(skipped);
                    continue;
                },
                Err(RecvError::Closed) => {
                    self.receiver = None;
                    return None;
                },
            };
            if let Some(notice) = self.handle(&event) {
                return Some(notice);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::EventBus;

    #[test]
    fn test_pending_accumulates_until_taken() {
        let bus = EventBus::new(8);
        let mut listener = CacheInvalidationListener::new("Contacts", &bus);

        assert_eq!(
            listener.handle(&CacheEvent::started("Contacts")),
            Some(CacheNotice::Updating {
                module: "Contacts".into()
            })
        );
        assert!(listener.is_updating());
        listener.handle(&CacheEvent::done("Contacts", 2));
        let notice = listener.handle(&CacheEvent::done("Contacts", 3));
        assert_eq!(
            notice,
            Some(CacheNotice::NewRecordsAvailable {
                module: "Contacts".into(),
                count: 5
            })
        );
        assert_eq!(listener.take_pending(), 5);
        assert_eq!(listener.pending(), 0);
    }

    #[test]
    fn test_done_without_records_is_up_to_date() {
        let bus = EventBus::new(8);
        let mut listener = CacheInvalidationListener::new("Leads", &bus);
        assert_eq!(
            listener.handle(&CacheEvent::done("Leads", 0)),
            Some(CacheNotice::UpToDate {
                module: "Leads".into()
            })
        );
        assert!(listener.handle(&CacheEvent::done("Contacts", 9)).is_none());
    }

    #[tokio::test]
    async fn test_next_notice_filters_module() {
        let bus = EventBus::new(8);
        let mut listener = CacheInvalidationListener::new("Contacts", &bus);
        bus.publish(CacheEvent::done("Leads", 4));
        bus.publish(CacheEvent::done("Contacts", 1));

        let notice = listener.next_notice().await;
        assert_eq!(
            notice.as_ref().map(CacheNotice::module).map(ModuleName::as_str),
            Some("Contacts")
        );
    }

    #[tokio::test]
    async fn test_detached_listener_returns_none() {
        let bus = EventBus::new(8);
        let mut listener = CacheInvalidationListener::new("Contacts", &bus);
        listener.detach();
        bus.publish(CacheEvent::started("Contacts"));
        assert!(!listener.is_attached());
        assert!(listener.next_notice().await.is_none());
    }

    #[tokio::test]
    async fn test_closed_source_ends_stream() {
        let bus = EventBus::new(8);
        let mut listener = CacheInvalidationListener::new("Contacts", &bus);
        drop(bus);
        assert!(listener.next_notice().await.is_none());
    }
}
