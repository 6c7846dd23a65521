//! Scroll-driven fetch decisions.

use crate::config::ScrollConfig;
use crate::models::Direction;

use super::window::Exhaustion;

/// Pixel geometry of the list viewport after a scroll.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Viewport {
    /// Total scrollable content height.
    pub scroll_height: f64,
    /// Visible height.
    pub client_height: f64,
    /// Distance scrolled from the top.
    pub scroll_top: f64,
}

impl Viewport {
    /// Pixels of content below the visible area.
    #[must_use]
    pub fn pixels_below(&self) -> f64 {
        (self.scroll_height - self.client_height - self.scroll_top).max(0.0)
    }

    /// Pixels of content above the visible area.
    #[must_use]
    pub fn pixels_above(&self) -> f64 {
        self.scroll_top.max(0.0)
    }
}

/// Which edges to fetch after a scroll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrollDecision {
    /// Fetch a page at the tail.
    pub load_forward: bool,
    /// Fetch a page at the head.
    pub load_backward: bool,
}

impl ScrollDecision {
    /// Returns `true` if nothing needs fetching.
    #[must_use]
    pub const fn is_idle(self) -> bool {
        !self.load_forward && !self.load_backward
    }

    /// Directions to fetch, forward first.
    pub fn directions(self) -> impl Iterator<Item = Direction> {
        Direction::ALL.into_iter().filter(move |d| match d {
            Direction::Forward => self.load_forward,
            Direction::Backward => self.load_backward,
        })
    }
}

/// Decides when the window needs another page.
///
/// A page is requested for an edge when fewer than `threshold` items remain
/// beyond the viewport on that side and the edge is not exhausted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollPolicy {
    threshold: f64,
    item_height_px: f64,
}

impl Default for ScrollPolicy {
    fn default() -> Self {
        Self::from_config(&ScrollConfig::default())
    }
}

impl ScrollPolicy {
    /// Creates a policy with a remaining-items threshold.
    #[must_use]
    pub fn new(threshold: usize, item_height_px: u32) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let threshold = threshold as f64;
        Self {
            threshold,
            item_height_px: f64::from(item_height_px.max(1)),
        }
    }

    /// Creates a policy from configuration.
    #[must_use]
    pub fn from_config(config: &ScrollConfig) -> Self {
        Self::new(config.threshold, config.item_height_px)
    }

    /// Converts a pixel distance into a number of items.
    #[must_use]
    pub fn remaining_items(&self, pixels: f64) -> f64 {
        pixels.max(0.0) / self.item_height_px
    }

    /// Decides from remaining item counts on each side.
    #[must_use]
    pub fn on_scroll_delta(
        &self,
        remaining_forward: f64,
        remaining_backward: f64,
        exhausted: Exhaustion,
    ) -> ScrollDecision {
        ScrollDecision {
            load_forward: !exhausted.forward && remaining_forward < self.threshold,
            load_backward: !exhausted.backward && remaining_backward < self.threshold,
        }
    }

    /// Decides from viewport geometry.
    #[must_use]
    pub fn on_viewport(&self, viewport: Viewport, exhausted: Exhaustion) -> ScrollDecision {
        self.on_scroll_delta(
            self.remaining_items(viewport.pixels_below()),
            self.remaining_items(viewport.pixels_above()),
            exhausted,
        )
    }
}
