//! The root engine object tying the components together.
//!
//! [`MarkerMap`] owns the store, viewport tracker, filter, cluster manager,
//! overlay manager, and sync controller, and is the single dispatcher for
//! [`MapEvent`]s. Hosts feed it events as they arrive and call
//! [`pump`](MarkerMap::pump) from their frame or poll loop to apply settled
//! network operations.
//!
//! Visibility is derived, never stored: a marker is drawn exactly when the
//! active filter matches it and the viewport contains it, evaluated in that
//! order. Every mutation that can change the answer ends in
//! `refresh_visibility`, which reconciles render handles and rebuilds the
//! cluster grouping from scratch.

use crate::{
    core::{
        geo::LatLng,
        viewport::ViewportTracker,
    },
    input::events::MapEvent,
    marker::{
        filter::FilterEngine,
        record::{Category, MarkerRecord, UserId},
        store::MarkerStore,
    },
    rendering::adapter::MapRenderer,
    spatial::clustering::{ClusterManager, ClusteringConfig},
    sync::{backend::MarkerBackend, controller::SyncController, controller::SyncEvent},
    ui::overlay::OverlayManager,
    Result,
};
use std::sync::Arc;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct MarkerMapConfig {
    /// Map center when geolocation is unavailable
    pub default_center: LatLng,
    /// Fetch radius around the center, in meters
    pub fetch_radius: f64,
    /// Category assigned to markers placed by a direct map click
    pub default_category: Category,
    pub clustering: ClusteringConfig,
}

impl Default for MarkerMapConfig {
    fn default() -> Self {
        Self {
            default_center: LatLng::new(37.5665, 126.978),
            fetch_radius: 500.0,
            default_category: Category::Benign,
            clustering: ClusteringConfig::default(),
        }
    }
}

impl MarkerMapConfig {
    pub fn with_default_center(mut self, center: LatLng) -> Self {
        self.default_center = center;
        self
    }

    pub fn with_fetch_radius(mut self, radius: f64) -> Self {
        self.fetch_radius = radius;
        self
    }

    pub fn with_default_category(mut self, category: Category) -> Self {
        self.default_category = category;
        self
    }

    pub fn with_clustering(mut self, clustering: ClusteringConfig) -> Self {
        self.clustering = clustering;
        self
    }
}

/// Marker synchronization engine for one map instance
pub struct MarkerMap<R: MapRenderer> {
    config: MarkerMapConfig,
    renderer: R,
    store: MarkerStore,
    tracker: ViewportTracker,
    filter: FilterEngine,
    clusters: ClusterManager,
    overlays: OverlayManager,
    sync: SyncController,
    current_user: Option<UserId>,
    /// Events produced synchronously (local deletes), drained by `pump`
    queued: Vec<SyncEvent>,
}

impl<R: MapRenderer> MarkerMap<R> {
    pub fn new(renderer: R, backend: Arc<dyn MarkerBackend>, config: MarkerMapConfig) -> Self {
        let sync = SyncController::new(backend, config.fetch_radius);
        Self {
            clusters: ClusterManager::new(config.clustering.clone()),
            config,
            renderer,
            store: MarkerStore::new(),
            tracker: ViewportTracker::new(),
            filter: FilterEngine::default(),
            overlays: OverlayManager::new(),
            sync,
            current_user: None,
            queued: Vec::new(),
        }
    }

    /// Identifies the signed-in user; affects the "mine" filter and which
    /// overlays render a delete control.
    pub fn set_current_user(&mut self, user: Option<UserId>) {
        self.current_user = user;
    }

    pub fn current_user(&self) -> Option<&UserId> {
        self.current_user.as_ref()
    }

    /// Applies one event. Errors are local to the event (an unknown marker
    /// id, a renderer refusal) and never leave the engine inconsistent.
    pub fn handle_event(&mut self, event: MapEvent) -> Result<()> {
        match event {
            MapEvent::Ready { bounds, zoom } => {
                self.tracker.attach(bounds, zoom);
                self.refetch();
                Ok(())
            }
            MapEvent::NavigationSettled { bounds, zoom } => {
                self.tracker.on_navigation_settled(bounds, zoom);
                self.refresh_visibility()
            }
            MapEvent::MarkerClicked { id } => self.overlays.open(
                &id,
                &mut self.store,
                &mut self.renderer,
                self.current_user.as_ref(),
            ),
            MapEvent::MapClicked { position } => {
                if self.overlays.has_open() {
                    self.overlays.close(&mut self.store, &mut self.renderer);
                    return Ok(());
                }
                self.sync.create_optimistic(
                    position,
                    self.config.default_category,
                    &mut self.store,
                    &mut self.renderer,
                )?;
                self.refresh_visibility()
            }
            MapEvent::CreateSubmitted { position, category } => {
                self.sync.request_create_confirmed(position, category);
                Ok(())
            }
            MapEvent::OverlayCloseClicked => {
                self.overlays.close(&mut self.store, &mut self.renderer);
                Ok(())
            }
            MapEvent::DeleteClicked => {
                let Some(id) = self.overlays.open_marker().cloned() else {
                    log::warn!("delete clicked with no overlay open, ignoring");
                    return Ok(());
                };
                if let Some(settled) = self.sync.request_delete(
                    id,
                    &mut self.store,
                    &mut self.renderer,
                    &mut self.overlays,
                ) {
                    self.queued.push(settled);
                    return self.refresh_visibility();
                }
                Ok(())
            }
            MapEvent::FilterSelected { token } => {
                self.filter.set_active(token);
                self.refresh_visibility()
            }
            MapEvent::Unmounted => {
                self.teardown();
                Ok(())
            }
        }
    }

    /// Applies settled network operations and retries overlay wiring.
    /// Returns the outcome events for the host to surface; visibility has
    /// already been refreshed when any are returned.
    pub fn pump(&mut self) -> Vec<SyncEvent> {
        self.overlays.poll_wiring(&mut self.renderer);

        let mut events: Vec<SyncEvent> = self.queued.drain(..).collect();
        events.extend(
            self.sync
                .pump(&mut self.store, &mut self.renderer, &mut self.overlays),
        );

        if !events.is_empty() {
            if let Err(err) = self.refresh_visibility() {
                log::error!("visibility refresh after sync failed: {}", err);
            }
        }
        events
    }

    /// Issues a bulk fetch around the current viewport center (or the
    /// configured default before the first view is known).
    pub fn refetch(&mut self) {
        let center = self
            .tracker
            .center()
            .unwrap_or(self.config.default_center);
        self.sync.request_fetch(center);
    }

    /// Reconciles render handles with the derived visibility predicate and
    /// rebuilds the cluster grouping. Filter first, then viewport: a record
    /// the filter rejects is invisible no matter where the map is looking.
    fn refresh_visibility(&mut self) -> Result<()> {
        let user = self.current_user.clone();
        let mut to_show = Vec::new();
        let mut to_hide = Vec::new();

        for record in self.store.all() {
            let visible = self.filter.matches(record, user.as_ref())
                && self.tracker.contains(&record.position);
            match (visible, record.render.is_some()) {
                (true, false) => to_show.push(record.id.clone()),
                (false, true) => to_hide.push(record.id.clone()),
                _ => {}
            }
        }

        for id in &to_hide {
            if self.overlays.open_marker() == Some(id) {
                self.overlays.close(&mut self.store, &mut self.renderer);
            }
            if let Some(record) = self.store.get_mut(id) {
                if let Some(handle) = record.render.take() {
                    self.renderer.destroy_marker(handle);
                }
            }
        }

        for id in &to_show {
            let Some((position, category)) = self
                .store
                .get(id)
                .map(|record| (record.position, record.category))
            else {
                continue;
            };
            // A marker the SDK refuses to draw is skipped, not fatal: the
            // rest of the pass and the cluster rebuild must still happen.
            let handle = match self.renderer.create_marker(&position, category) {
                Ok(handle) => handle,
                Err(err) => {
                    log::warn!("marker {} could not be drawn: {}", id, err);
                    continue;
                }
            };
            if let Some(record) = self.store.get_mut(id) {
                record.render = Some(handle);
            }
        }

        let token = self.filter.active();
        let zoom = self.tracker.zoom();
        let visible: Vec<&MarkerRecord> = self
            .store
            .all()
            .filter(|record| record.render.is_some())
            .collect();
        self.clusters
            .rebuild(&visible, token, zoom, &mut self.renderer)
    }

    /// Page unmount: cancels sequencing for in-flight operations, drops all
    /// interaction state, and tears down every native handle.
    pub fn teardown(&mut self) {
        self.sync.teardown();
        self.overlays.teardown();
        self.clusters.clear(&mut self.renderer);
        self.store.clear(&mut self.renderer);
        self.tracker.detach();
    }

    pub fn store(&self) -> &MarkerStore {
        &self.store
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    pub fn overlays(&self) -> &OverlayManager {
        &self.overlays
    }

    pub fn clusters(&self) -> &ClusterManager {
        &self.clusters
    }

    pub fn tracker(&self) -> &ViewportTracker {
        &self.tracker
    }

    pub fn filter(&self) -> &FilterEngine {
        &self.filter
    }

    pub fn sync(&self) -> &SyncController {
        &self.sync
    }

    pub fn config(&self) -> &MarkerMapConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::geo::LatLngBounds,
        marker::filter::FilterToken,
        rendering::adapter::recording::RecordingRenderer,
        sync::backend::{CreateMarkerRequest, RemoteMarker},
        Result,
    };
    use async_trait::async_trait;

    /// Backend stub for paths that never reach the network
    struct NullBackend;

    #[async_trait]
    impl MarkerBackend for NullBackend {
        async fn fetch_markers(&self, _center: LatLng, _radius: f64) -> Result<Vec<RemoteMarker>> {
            Ok(Vec::new())
        }

        async fn create_marker(&self, _request: CreateMarkerRequest) -> Result<RemoteMarker> {
            unreachable!("not exercised")
        }

        async fn delete_marker(&self, _id: &crate::marker::record::MarkerId) -> Result<()> {
            Ok(())
        }
    }

    fn engine() -> MarkerMap<RecordingRenderer> {
        MarkerMap::new(
            RecordingRenderer::new(),
            Arc::new(NullBackend),
            MarkerMapConfig::default(),
        )
    }

    fn wide_view() -> MapEvent {
        MapEvent::Ready {
            bounds: LatLngBounds::from_coords(30.0, 120.0, 45.0, 135.0),
            zoom: 16.0,
        }
    }

    #[tokio::test]
    async fn test_map_click_places_optimistic_marker() {
        let mut map = engine();
        map.handle_event(wide_view()).unwrap();
        map.handle_event(MapEvent::MapClicked {
            position: LatLng::new(37.5, 127.0),
        })
        .unwrap();

        assert_eq!(map.store().len(), 1);
        let record = map.store().all().next().unwrap();
        assert!(record.id.is_local());
        assert_eq!(record.category, Category::Benign);
        assert!(record.render.is_some());
        assert_eq!(map.renderer().live_markers.len(), 1);
    }

    #[tokio::test]
    async fn test_map_click_closes_open_overlay_instead_of_creating() {
        let mut map = engine();
        map.handle_event(wide_view()).unwrap();
        map.handle_event(MapEvent::MapClicked {
            position: LatLng::new(37.5, 127.0),
        })
        .unwrap();
        let id = map.store().all().next().unwrap().id.clone();
        map.handle_event(MapEvent::MarkerClicked { id }).unwrap();
        assert!(map.overlays().has_open());

        map.handle_event(MapEvent::MapClicked {
            position: LatLng::new(37.6, 127.1),
        })
        .unwrap();

        assert!(!map.overlays().has_open());
        assert_eq!(map.store().len(), 1);
    }

    #[tokio::test]
    async fn test_filter_change_hides_and_restores_markers() {
        let mut map = engine();
        map.handle_event(wide_view()).unwrap();
        map.handle_event(MapEvent::MapClicked {
            position: LatLng::new(37.5, 127.0),
        })
        .unwrap();

        map.handle_event(MapEvent::FilterSelected {
            token: FilterToken::Hazard,
        })
        .unwrap();
        assert!(map.renderer().live_markers.is_empty());

        map.handle_event(MapEvent::FilterSelected {
            token: FilterToken::All,
        })
        .unwrap();
        assert_eq!(map.renderer().live_markers.len(), 1);
    }

    #[tokio::test]
    async fn test_navigation_away_hides_marker_and_closes_its_overlay() {
        let mut map = engine();
        map.handle_event(wide_view()).unwrap();
        map.handle_event(MapEvent::MapClicked {
            position: LatLng::new(37.5, 127.0),
        })
        .unwrap();
        let id = map.store().all().next().unwrap().id.clone();
        map.handle_event(MapEvent::MarkerClicked { id }).unwrap();

        map.handle_event(MapEvent::NavigationSettled {
            bounds: LatLngBounds::from_coords(0.0, 0.0, 1.0, 1.0),
            zoom: 16.0,
        })
        .unwrap();

        assert!(map.renderer().live_markers.is_empty());
        assert!(map.renderer().live_overlays.is_empty());
        assert!(!map.overlays().has_open());
        // The record itself survives; only its handles are gone.
        assert_eq!(map.store().len(), 1);
    }

    #[tokio::test]
    async fn test_deleting_local_marker_skips_network() {
        let mut map = engine();
        map.handle_event(wide_view()).unwrap();
        map.handle_event(MapEvent::MapClicked {
            position: LatLng::new(37.5, 127.0),
        })
        .unwrap();
        let id = map.store().all().next().unwrap().id.clone();
        map.handle_event(MapEvent::MarkerClicked { id: id.clone() })
            .unwrap();

        map.handle_event(MapEvent::DeleteClicked).unwrap();
        let events = map.pump();

        // The initial fetch may or may not have settled by now; the delete
        // outcome must be there either way.
        assert!(events
            .iter()
            .any(|event| matches!(event, SyncEvent::Deleted { id: deleted } if *deleted == id)));
        assert!(map.store().is_empty());
        assert!(map.renderer().live_markers.is_empty());
        assert!(map.renderer().live_overlays.is_empty());
    }

    #[tokio::test]
    async fn test_delete_click_without_overlay_is_ignored() {
        let mut map = engine();
        map.handle_event(wide_view()).unwrap();
        assert!(map.handle_event(MapEvent::DeleteClicked).is_ok());
        assert!(!map
            .pump()
            .iter()
            .any(|event| matches!(event, SyncEvent::Deleted { .. })));
    }

    #[tokio::test]
    async fn test_undrawable_marker_is_skipped_not_fatal() {
        let mut map = engine();
        map.handle_event(wide_view()).unwrap();
        map.handle_event(MapEvent::MapClicked {
            position: LatLng::new(37.5, 127.0),
        })
        .unwrap();
        map.handle_event(MapEvent::FilterSelected {
            token: FilterToken::Hazard,
        })
        .unwrap();
        assert!(map.renderer().live_markers.is_empty());

        // Re-showing fails at the SDK; the refresh must finish anyway and
        // still reach the cluster rebuild.
        map.renderer_mut().fail_marker_creates = true;
        let rebuilds_before = map.renderer().cluster_rebuilds;
        map.handle_event(MapEvent::FilterSelected {
            token: FilterToken::All,
        })
        .unwrap();

        assert!(map.renderer().live_markers.is_empty());
        assert!(map.store().all().next().unwrap().render.is_none());
        assert_eq!(map.renderer().cluster_rebuilds, rebuilds_before + 1);
    }

    #[tokio::test]
    async fn test_teardown_releases_every_handle() {
        let mut map = engine();
        map.handle_event(wide_view()).unwrap();
        map.handle_event(MapEvent::MapClicked {
            position: LatLng::new(37.5, 127.0),
        })
        .unwrap();
        let id = map.store().all().next().unwrap().id.clone();
        map.handle_event(MapEvent::MarkerClicked { id }).unwrap();

        map.handle_event(MapEvent::Unmounted).unwrap();

        assert!(map.store().is_empty());
        assert!(map.renderer().live_markers.is_empty());
        assert!(map.renderer().live_overlays.is_empty());
        assert!(!map.tracker().is_attached());
        assert!(map.clusters().clusters().is_empty());
    }
}
