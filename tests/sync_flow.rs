//! End-to-end engine scenarios against an in-memory backend: fetch/render,
//! confirmed and optimistic creation, deletion (including refusals), and the
//! ordering guarantees between deletes and in-flight fetches.

use async_trait::async_trait;
use pawmap::{
    prelude::*,
    rendering::adapter::recording::RecordingRenderer,
    sync::backend::{CreateMarkerRequest, RemoteMarker},
};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Mutex,
};

#[derive(Clone, Copy)]
enum DeleteRefusal {
    Unauthenticated,
    NotOwner,
}

/// In-memory stand-in for the markers service
struct FakeBackend {
    markers: Mutex<Vec<RemoteMarker>>,
    next_id: AtomicU64,
    /// Milliseconds to hold a fetch after snapshotting its payload,
    /// simulating a response computed before later mutations
    fetch_delay_ms: AtomicU64,
    refuse_delete: Mutex<Option<DeleteRefusal>>,
    refuse_create: Mutex<bool>,
}

impl FakeBackend {
    fn new() -> Self {
        Self {
            markers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(100),
            fetch_delay_ms: AtomicU64::new(0),
            refuse_delete: Mutex::new(None),
            refuse_create: Mutex::new(false),
        }
    }

    fn seed(&self, id: u64, owner: Option<&str>, lat: f64, lng: f64, category: Category) {
        self.markers.lock().unwrap().push(RemoteMarker {
            id: MarkerId::from_server(id),
            owner: owner.map(UserId::new),
            position: LatLng::new(lat, lng),
            category,
        });
    }
}

#[async_trait]
impl MarkerBackend for FakeBackend {
    async fn fetch_markers(&self, _center: LatLng, _radius: f64) -> Result<Vec<RemoteMarker>> {
        // Snapshot first, then stall: mutations landing during the stall are
        // not reflected in the payload, like a slow real response.
        let payload = self.markers.lock().unwrap().clone();
        let delay = self.fetch_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        Ok(payload)
    }

    async fn create_marker(&self, request: CreateMarkerRequest) -> Result<RemoteMarker> {
        if *self.refuse_create.lock().unwrap() {
            return Err(Error::Unauthenticated);
        }
        let remote = RemoteMarker {
            id: MarkerId::from_server(self.next_id.fetch_add(1, Ordering::SeqCst)),
            owner: Some(UserId::new("u1")),
            position: LatLng::new(request.latitude, request.longitude),
            category: Category::from_code(request.type_code)?,
        };
        self.markers.lock().unwrap().push(remote.clone());
        Ok(remote)
    }

    async fn delete_marker(&self, id: &MarkerId) -> Result<()> {
        match *self.refuse_delete.lock().unwrap() {
            Some(DeleteRefusal::Unauthenticated) => return Err(Error::Unauthenticated),
            Some(DeleteRefusal::NotOwner) => return Err(Error::NotOwner),
            None => {}
        }
        self.markers.lock().unwrap().retain(|marker| &marker.id != id);
        Ok(())
    }
}

fn engine(backend: Arc<FakeBackend>) -> MarkerMap<RecordingRenderer> {
    MarkerMap::new(
        RecordingRenderer::new(),
        backend,
        MarkerMapConfig::default(),
    )
}

fn ready() -> MapEvent {
    MapEvent::Ready {
        bounds: LatLngBounds::from_coords(30.0, 120.0, 45.0, 135.0),
        zoom: 16.0,
    }
}

/// Pumps the engine until an event matching the predicate arrives
async fn pump_until<F>(map: &mut MarkerMap<RecordingRenderer>, mut pred: F) -> Vec<SyncEvent>
where
    F: FnMut(&SyncEvent) -> bool,
{
    let mut collected = Vec::new();
    for _ in 0..400 {
        collected.extend(map.pump());
        if collected.iter().any(&mut pred) {
            return collected;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("expected event never arrived; saw {:?}", collected);
}

#[tokio::test]
async fn test_initial_fetch_renders_markers() {
    let backend = Arc::new(FakeBackend::new());
    backend.seed(1, Some("u1"), 37.50, 127.00, Category::Hazard(HazardKind::IcySurface));
    backend.seed(2, Some("u2"), 37.51, 127.01, Category::Benign);

    let mut map = engine(backend);
    map.handle_event(ready()).unwrap();
    pump_until(&mut map, |e| matches!(e, SyncEvent::FetchApplied { count: 2 })).await;

    assert_eq!(map.store().len(), 2);
    assert_eq!(map.renderer().live_markers.len(), 2);
    assert!(map.store().contains(&MarkerId::from_server(1)));
    assert!(map.store().contains(&MarkerId::from_server(2)));
}

#[tokio::test]
async fn test_confirmed_create_appears_under_server_id() {
    let backend = Arc::new(FakeBackend::new());
    let mut map = engine(backend);
    map.handle_event(ready()).unwrap();
    pump_until(&mut map, |e| matches!(e, SyncEvent::FetchApplied { .. })).await;

    map.handle_event(MapEvent::CreateSubmitted {
        position: LatLng::new(37.5, 127.0),
        category: Category::Hazard(HazardKind::Construction),
    })
    .unwrap();
    let events = pump_until(&mut map, |e| matches!(e, SyncEvent::Created { .. })).await;

    let created_id = events
        .iter()
        .find_map(|e| match e {
            SyncEvent::Created { id } => Some(id.clone()),
            _ => None,
        })
        .unwrap();
    assert!(!created_id.is_local());
    let record = map.store().get(&created_id).unwrap();
    assert_eq!(record.category, Category::Hazard(HazardKind::Construction));
    assert!(record.render.is_some());
}

#[tokio::test]
async fn test_create_rejection_leaves_map_untouched() {
    let backend = Arc::new(FakeBackend::new());
    *backend.refuse_create.lock().unwrap() = true;

    let mut map = engine(backend);
    map.handle_event(ready()).unwrap();
    pump_until(&mut map, |e| matches!(e, SyncEvent::FetchApplied { .. })).await;

    map.handle_event(MapEvent::CreateSubmitted {
        position: LatLng::new(37.5, 127.0),
        category: Category::Benign,
    })
    .unwrap();
    let events = pump_until(&mut map, |e| matches!(e, SyncEvent::CreateFailed(_))).await;

    assert!(events
        .iter()
        .any(|e| matches!(e, SyncEvent::CreateFailed(Error::Unauthenticated))));
    assert!(map.store().is_empty());
    assert!(map.renderer().live_markers.is_empty());
}

#[tokio::test]
async fn test_delete_wins_over_stale_fetch() {
    let backend = Arc::new(FakeBackend::new());
    backend.seed(1, Some("u1"), 37.50, 127.00, Category::Benign);

    let mut map = engine(backend.clone());
    map.set_current_user(Some(UserId::new("u1")));
    map.handle_event(ready()).unwrap();
    pump_until(&mut map, |e| matches!(e, SyncEvent::FetchApplied { .. })).await;

    // A slow refetch snapshots its payload (still containing marker 1),
    // then the delete confirms while that response is in flight.
    backend.fetch_delay_ms.store(150, Ordering::SeqCst);
    map.refetch();

    let id = MarkerId::from_server(1);
    map.handle_event(MapEvent::MarkerClicked { id: id.clone() }).unwrap();
    map.handle_event(MapEvent::DeleteClicked).unwrap();
    pump_until(&mut map, |e| matches!(e, SyncEvent::Deleted { .. })).await;
    assert!(!map.store().contains(&id));

    // The stale payload must not resurrect the deleted marker.
    pump_until(&mut map, |e| matches!(e, SyncEvent::FetchApplied { .. })).await;
    assert!(!map.store().contains(&id));
    assert!(map.renderer().live_markers.is_empty());
}

#[tokio::test]
async fn test_optimistic_marker_survives_non_inclusive_fetch() {
    let backend = Arc::new(FakeBackend::new());
    backend.seed(1, Some("u2"), 37.50, 127.00, Category::Benign);
    backend.fetch_delay_ms.store(100, Ordering::SeqCst);

    let mut map = engine(backend);
    map.handle_event(ready()).unwrap();

    // Placed while the initial fetch is still in flight; its payload was
    // snapshotted before this marker existed.
    map.handle_event(MapEvent::MapClicked {
        position: LatLng::new(37.52, 127.02),
    })
    .unwrap();
    let local_id = map
        .store()
        .all()
        .find(|r| r.id.is_local())
        .unwrap()
        .id
        .clone();

    pump_until(&mut map, |e| matches!(e, SyncEvent::FetchApplied { .. })).await;

    assert!(map.store().contains(&MarkerId::from_server(1)));
    assert!(map.store().contains(&local_id));
    assert!(map.store().get(&local_id).unwrap().render.is_some());
    assert_eq!(map.renderer().live_markers.len(), 2);
}

#[tokio::test]
async fn test_confirmed_create_survives_in_flight_fetch() {
    let backend = Arc::new(FakeBackend::new());
    backend.fetch_delay_ms.store(150, Ordering::SeqCst);

    let mut map = engine(backend);
    // The initial fetch snapshots an empty payload, then stalls.
    map.handle_event(ready()).unwrap();

    // Confirmed while that payload is in flight; the server assigned the id
    // after the snapshot, so the payload cannot contain it.
    map.handle_event(MapEvent::CreateSubmitted {
        position: LatLng::new(37.5, 127.0),
        category: Category::Hazard(HazardKind::DeicingChemical),
    })
    .unwrap();
    let events = pump_until(&mut map, |e| matches!(e, SyncEvent::Created { .. })).await;
    let created_id = events
        .iter()
        .find_map(|e| match e {
            SyncEvent::Created { id } => Some(id.clone()),
            _ => None,
        })
        .unwrap();

    pump_until(&mut map, |e| matches!(e, SyncEvent::FetchApplied { .. })).await;

    assert!(map.store().contains(&created_id));
    assert!(map.store().get(&created_id).unwrap().render.is_some());
    assert_eq!(map.renderer().live_markers.len(), 1);
}

#[tokio::test]
async fn test_not_owner_delete_keeps_record() {
    let backend = Arc::new(FakeBackend::new());
    backend.seed(1, Some("u1"), 37.50, 127.00, Category::Benign);
    *backend.refuse_delete.lock().unwrap() = Some(DeleteRefusal::NotOwner);

    let mut map = engine(backend);
    map.set_current_user(Some(UserId::new("u1")));
    map.handle_event(ready()).unwrap();
    pump_until(&mut map, |e| matches!(e, SyncEvent::FetchApplied { .. })).await;

    let id = MarkerId::from_server(1);
    map.handle_event(MapEvent::MarkerClicked { id: id.clone() }).unwrap();
    map.handle_event(MapEvent::DeleteClicked).unwrap();
    let events = pump_until(&mut map, |e| matches!(e, SyncEvent::DeleteFailed { .. })).await;

    let error = events
        .iter()
        .find_map(|e| match e {
            SyncEvent::DeleteFailed { error, .. } => Some(error),
            _ => None,
        })
        .unwrap();
    assert!(matches!(error, Error::NotOwner));
    assert!(error.is_authorization());
    assert!(map.store().contains(&id));
    assert_eq!(map.renderer().live_markers.len(), 1);
}

#[tokio::test]
async fn test_unauthenticated_delete_reports_sign_in() {
    let backend = Arc::new(FakeBackend::new());
    backend.seed(1, Some("u1"), 37.50, 127.00, Category::Benign);
    *backend.refuse_delete.lock().unwrap() = Some(DeleteRefusal::Unauthenticated);

    let mut map = engine(backend);
    map.set_current_user(Some(UserId::new("u1")));
    map.handle_event(ready()).unwrap();
    pump_until(&mut map, |e| matches!(e, SyncEvent::FetchApplied { .. })).await;

    let id = MarkerId::from_server(1);
    map.handle_event(MapEvent::MarkerClicked { id: id.clone() }).unwrap();
    map.handle_event(MapEvent::DeleteClicked).unwrap();
    let events = pump_until(&mut map, |e| matches!(e, SyncEvent::DeleteFailed { .. })).await;

    assert!(events.iter().any(|e| matches!(
        e,
        SyncEvent::DeleteFailed {
            error: Error::Unauthenticated,
            ..
        }
    )));
    assert!(map.store().contains(&id));
}

#[tokio::test]
async fn test_teardown_cancels_in_flight_fetch() {
    let backend = Arc::new(FakeBackend::new());
    backend.seed(1, Some("u1"), 37.50, 127.00, Category::Benign);
    backend.fetch_delay_ms.store(50, Ordering::SeqCst);

    let mut map = engine(backend);
    map.handle_event(ready()).unwrap();
    map.handle_event(MapEvent::Unmounted).unwrap();

    // Give the stale completion ample time to arrive; it must be dropped.
    for _ in 0..30 {
        assert!(map.pump().is_empty());
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(map.store().is_empty());
    assert!(map.renderer().live_markers.is_empty());
}

#[tokio::test]
async fn test_mine_filter_shows_only_own_markers() {
    let backend = Arc::new(FakeBackend::new());
    backend.seed(1, Some("u1"), 37.50, 127.00, Category::Hazard(HazardKind::StrayAnimal));
    backend.seed(2, Some("u2"), 37.51, 127.01, Category::Benign);

    let mut map = engine(backend);
    map.set_current_user(Some(UserId::new("u1")));
    map.handle_event(ready()).unwrap();
    pump_until(&mut map, |e| matches!(e, SyncEvent::FetchApplied { .. })).await;

    map.handle_event(MapEvent::FilterSelected {
        token: FilterToken::Mine,
    })
    .unwrap();
    assert_eq!(map.renderer().live_markers.len(), 1);
    assert!(map.store().get(&MarkerId::from_server(1)).unwrap().render.is_some());
    assert!(map.store().get(&MarkerId::from_server(2)).unwrap().render.is_none());

    // Signed out, "mine" matches nothing at all.
    map.set_current_user(None);
    map.handle_event(MapEvent::FilterSelected {
        token: FilterToken::Mine,
    })
    .unwrap();
    assert!(map.renderer().live_markers.is_empty());

    map.handle_event(MapEvent::FilterSelected {
        token: FilterToken::Hazard,
    })
    .unwrap();
    assert_eq!(map.renderer().live_markers.len(), 1);
    assert!(map.store().get(&MarkerId::from_server(1)).unwrap().render.is_some());
}

#[tokio::test]
async fn test_no_duplicate_ids_across_mixed_operations() {
    let backend = Arc::new(FakeBackend::new());
    backend.seed(1, Some("u1"), 37.50, 127.00, Category::Benign);

    let mut map = engine(backend);
    map.handle_event(ready()).unwrap();
    pump_until(&mut map, |e| matches!(e, SyncEvent::FetchApplied { .. })).await;

    map.handle_event(MapEvent::MapClicked {
        position: LatLng::new(37.52, 127.02),
    })
    .unwrap();
    map.handle_event(MapEvent::CreateSubmitted {
        position: LatLng::new(37.53, 127.03),
        category: Category::Benign,
    })
    .unwrap();
    pump_until(&mut map, |e| matches!(e, SyncEvent::Created { .. })).await;

    // Refetch now also returns the confirmed marker; nothing may duplicate.
    map.refetch();
    pump_until(&mut map, |e| matches!(e, SyncEvent::FetchApplied { .. })).await;

    assert_eq!(map.store().len(), 3);
    let drawn = map.store().all().filter(|r| r.render.is_some()).count();
    assert_eq!(map.renderer().live_markers.len(), drawn);
    assert_eq!(drawn, 3);
}
