use crate::core::geo::{LatLng, LatLngBounds};
use serde::{Deserialize, Serialize};

/// Tracks the geographic rectangle currently visible on screen, plus zoom.
///
/// The tracker is fed from navigation-settled events (after a drag or zoom
/// gesture completes, not on every intermediate frame) and is the single
/// source of truth for viewport containment tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewportTracker {
    attached: bool,
    bounds: Option<LatLngBounds>,
    zoom: f64,
}

impl ViewportTracker {
    pub fn new() -> Self {
        Self {
            attached: false,
            bounds: None,
            zoom: 0.0,
        }
    }

    /// Marks the underlying map as attached and seeds the initial view.
    pub fn attach(&mut self, bounds: LatLngBounds, zoom: f64) {
        self.attached = true;
        self.bounds = Some(bounds);
        self.zoom = zoom;
    }

    /// Updates the tracked view after a drag/zoom gesture settles.
    ///
    /// A no-op when the map has not been attached yet; navigation callbacks
    /// can fire during page setup and must not propagate errors.
    pub fn on_navigation_settled(&mut self, bounds: LatLngBounds, zoom: f64) {
        if !self.attached {
            log::debug!("navigation event before map attach, ignoring");
            return;
        }
        self.bounds = Some(bounds);
        self.zoom = zoom;
    }

    /// Whether a position lies within the current viewport.
    ///
    /// Everything is "visible" before the first navigation event so that an
    /// initial fetch can render markers before bounds are known.
    pub fn contains(&self, position: &LatLng) -> bool {
        match &self.bounds {
            Some(bounds) => bounds.contains(position),
            None => true,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn bounds(&self) -> Option<&LatLngBounds> {
        self.bounds.as_ref()
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    /// Center of the current viewport, if known.
    pub fn center(&self) -> Option<LatLng> {
        self.bounds.as_ref().map(|b| b.center())
    }

    /// Tears down tracker state when the owning page unmounts.
    pub fn detach(&mut self) {
        self.attached = false;
        self.bounds = None;
    }
}

impl Default for ViewportTracker {
    fn default() -> Self {
        Self::new()
    }
}
