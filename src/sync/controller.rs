//! Orchestrates fetch/create/delete against the marker store.
//!
//! Network calls are spawned onto the async runtime; their completions come
//! back over a channel and are applied by [`SyncController::pump`] on the
//! engine's single thread. Visibility is always re-derived from the store's
//! current contents after a completion, never from state captured when the
//! request was issued, which is what keeps interleaved completions safe.
//!
//! Ordering rules:
//! - ids deleted while a fetch is outstanding are tombstoned; a late fetch
//!   payload cannot resurrect them.
//! - optimistic local-only records and freshly confirmed creates survive a
//!   fetch payload that does not yet include them.
//! - `teardown` bumps a generation counter; completions from an older
//!   generation are dropped, so a callback resolving after page unmount is
//!   a no-op.

use crate::{
    core::geo::LatLng,
    marker::{
        record::{Category, MarkerId, MarkerRecord},
        store::MarkerStore,
    },
    prelude::HashSet,
    rendering::adapter::MapRenderer,
    runtime,
    sync::backend::{CreateMarkerRequest, MarkerBackend, RemoteMarker},
    ui::overlay::OverlayManager,
    Error, Result,
};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::Arc;

/// A settled backend operation, tagged with the generation it was issued in
#[derive(Debug)]
enum SyncCompletion {
    Fetch {
        generation: u64,
        result: Result<Vec<RemoteMarker>>,
    },
    Create {
        generation: u64,
        result: Result<RemoteMarker>,
    },
    Delete {
        generation: u64,
        id: MarkerId,
        result: std::result::Result<(), Error>,
    },
}

/// Outcome of an applied completion, for the UI layer to surface
#[derive(Debug)]
pub enum SyncEvent {
    /// Store was replaced from a fetch; `count` records are now authoritative
    FetchApplied { count: usize },
    /// Fetch failed; previous store state is intact
    FetchFailed(Error),
    /// Confirmed creation; the record is in the store under its server id
    Created { id: MarkerId },
    /// Creation rejected; nothing was created or rendered
    CreateFailed(Error),
    /// Confirmed deletion; record and handles are gone
    Deleted { id: MarkerId },
    /// Deletion rejected; the record is untouched. The error distinguishes
    /// not-owner and unauthenticated from generic failures.
    DeleteFailed { id: MarkerId, error: Error },
}

/// Coordinates backend mutations with the marker store
pub struct SyncController {
    backend: Arc<dyn MarkerBackend>,
    result_tx: Sender<SyncCompletion>,
    result_rx: Receiver<SyncCompletion>,
    /// Bumped on teardown; completions from older generations are dropped
    generation: u64,
    fetches_in_flight: usize,
    /// Ids deleted while a fetch was outstanding
    tombstones: HashSet<MarkerId>,
    /// Optimistic local-only ids the server does not know about yet
    pending_local: HashSet<MarkerId>,
    /// Server ids confirmed while a fetch was outstanding
    recent_creates: HashSet<MarkerId>,
    /// Handles of spawned request tasks, aborted on teardown
    in_flight: Vec<Box<dyn runtime::AsyncHandle>>,
    fetch_radius: f64,
}

impl SyncController {
    pub fn new(backend: Arc<dyn MarkerBackend>, fetch_radius: f64) -> Self {
        let (result_tx, result_rx) = unbounded();
        Self {
            backend,
            result_tx,
            result_rx,
            generation: 0,
            fetches_in_flight: 0,
            tombstones: HashSet::default(),
            pending_local: HashSet::default(),
            recent_creates: HashSet::default(),
            in_flight: Vec::new(),
            fetch_radius,
        }
    }

    /// Issues a bulk fetch around `center`. Applied by `pump` on completion.
    pub fn request_fetch(&mut self, center: LatLng) {
        self.fetches_in_flight += 1;
        let backend = self.backend.clone();
        let tx = self.result_tx.clone();
        let generation = self.generation;
        let radius = self.fetch_radius;

        self.in_flight.push(runtime::spawn(async move {
            let result = backend.fetch_markers(center, radius).await;
            let _ = tx.send(SyncCompletion::Fetch { generation, result });
        }));
    }

    /// Creates and renders a local-only marker immediately, with a
    /// client-generated id and no network round trip. Used for low-friction
    /// default-category placement from a direct map click.
    pub fn create_optimistic(
        &mut self,
        position: LatLng,
        category: Category,
        store: &mut MarkerStore,
        renderer: &mut dyn MapRenderer,
    ) -> Result<MarkerId> {
        let mut record = MarkerRecord::new_local(position, category);
        record.render = Some(renderer.create_marker(&record.position, record.category)?);
        let id = record.id.clone();
        store.add(record, renderer);
        self.pending_local.insert(id.clone());
        Ok(id)
    }

    /// Issues a server-confirmed creation. Nothing is created or rendered
    /// locally until the backend acknowledges; a rejection leaves the map
    /// exactly as it was.
    pub fn request_create_confirmed(&mut self, position: LatLng, category: Category) {
        let backend = self.backend.clone();
        let tx = self.result_tx.clone();
        let generation = self.generation;

        self.in_flight.push(runtime::spawn(async move {
            let result = backend
                .create_marker(CreateMarkerRequest::new(position, category))
                .await;
            let _ = tx.send(SyncCompletion::Create { generation, result });
        }));
    }

    /// Issues a deletion. A local-only optimistic marker is removed
    /// immediately without a network call, since the server never saw it.
    pub fn request_delete(
        &mut self,
        id: MarkerId,
        store: &mut MarkerStore,
        renderer: &mut dyn MapRenderer,
        overlays: &mut OverlayManager,
    ) -> Option<SyncEvent> {
        if id.is_local() {
            self.pending_local.remove(&id);
            store.remove(&id, renderer);
            overlays.on_marker_removed(&id);
            return Some(SyncEvent::Deleted { id });
        }

        let backend = self.backend.clone();
        let tx = self.result_tx.clone();
        let generation = self.generation;

        self.in_flight.push(runtime::spawn(async move {
            let result = backend.delete_marker(&id).await;
            let _ = tx.send(SyncCompletion::Delete {
                generation,
                id,
                result,
            });
        }));
        None
    }

    /// Whether any completion is waiting to be applied
    pub fn has_pending_results(&self) -> bool {
        !self.result_rx.is_empty()
    }

    pub fn fetches_in_flight(&self) -> usize {
        self.fetches_in_flight
    }

    /// Drains settled operations and applies them to the store. Returns the
    /// outcome events in application order; callers refresh visibility and
    /// cluster grouping afterwards whenever any event is returned.
    pub fn pump(
        &mut self,
        store: &mut MarkerStore,
        renderer: &mut dyn MapRenderer,
        overlays: &mut OverlayManager,
    ) -> Vec<SyncEvent> {
        self.in_flight.retain(|handle| !handle.is_finished());

        let mut events = Vec::new();

        while let Ok(completion) = self.result_rx.try_recv() {
            match completion {
                SyncCompletion::Fetch { generation, result } => {
                    if generation != self.generation {
                        log::debug!("dropping stale fetch completion");
                        continue;
                    }
                    self.fetches_in_flight = self.fetches_in_flight.saturating_sub(1);
                    match result {
                        Ok(remotes) => {
                            let count = self.apply_fetch(remotes, store, renderer, overlays);
                            events.push(SyncEvent::FetchApplied { count });
                        }
                        Err(err) => {
                            // Previous store state stays intact.
                            events.push(SyncEvent::FetchFailed(err));
                        }
                    }
                    if self.fetches_in_flight == 0 {
                        self.tombstones.clear();
                        self.recent_creates.clear();
                    }
                }
                SyncCompletion::Create { generation, result } => {
                    if generation != self.generation {
                        log::debug!("dropping stale create completion");
                        continue;
                    }
                    match result {
                        Ok(remote) => {
                            let id = remote.id.clone();
                            store.add(remote.into_record(), renderer);
                            if self.fetches_in_flight > 0 {
                                self.recent_creates.insert(id.clone());
                            }
                            events.push(SyncEvent::Created { id });
                        }
                        Err(err) => {
                            events.push(SyncEvent::CreateFailed(err));
                        }
                    }
                }
                SyncCompletion::Delete {
                    generation,
                    id,
                    result,
                } => {
                    if generation != self.generation {
                        log::debug!("dropping stale delete completion");
                        continue;
                    }
                    match result {
                        Ok(()) => {
                            store.remove(&id, renderer);
                            overlays.on_marker_removed(&id);
                            self.recent_creates.remove(&id);
                            if self.fetches_in_flight > 0 {
                                self.tombstones.insert(id.clone());
                            }
                            events.push(SyncEvent::Deleted { id });
                        }
                        Err(error) => {
                            // No destructive side effect on refusal.
                            events.push(SyncEvent::DeleteFailed { id, error });
                        }
                    }
                }
            }
        }

        events
    }

    /// Applies a fetch payload: tombstoned ids are filtered out, and records
    /// the server does not know about yet (optimistic locals, creates
    /// confirmed after the fetch was issued) are carried over.
    fn apply_fetch(
        &mut self,
        remotes: Vec<RemoteMarker>,
        store: &mut MarkerStore,
        renderer: &mut dyn MapRenderer,
        overlays: &mut OverlayManager,
    ) -> usize {
        overlays.close(store, renderer);

        let payload_ids: HashSet<MarkerId> =
            remotes.iter().map(|remote| remote.id.clone()).collect();

        // Data-only snapshots; replace_all will tear the handles down and
        // the next visibility refresh re-renders the carried records.
        let carried: Vec<MarkerRecord> = store
            .all()
            .filter(|record| {
                !payload_ids.contains(&record.id)
                    && (self.pending_local.contains(&record.id)
                        || self.recent_creates.contains(&record.id))
            })
            .map(|record| {
                MarkerRecord::new(
                    record.id.clone(),
                    record.owner.clone(),
                    record.position,
                    record.category,
                )
            })
            .collect();

        let mut records: Vec<MarkerRecord> = remotes
            .into_iter()
            .filter(|remote| !self.tombstones.contains(&remote.id))
            .map(RemoteMarker::into_record)
            .collect();
        records.extend(carried);

        let count = records.len();
        store.replace_all(records, renderer);
        count
    }

    /// Page unmount: outstanding request tasks are aborted where the
    /// runtime supports it, anything that still completes is dropped by the
    /// generation check, and all sequencing state is reset.
    pub fn teardown(&mut self) {
        for handle in self.in_flight.drain(..) {
            handle.cancel();
        }
        self.generation += 1;
        self.fetches_in_flight = 0;
        self.tombstones.clear();
        self.pending_local.clear();
        self.recent_creates.clear();
    }
}
