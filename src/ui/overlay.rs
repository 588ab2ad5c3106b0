use crate::{
    marker::{
        record::{MarkerId, UserId},
        store::MarkerStore,
    },
    rendering::adapter::{MapRenderer, OverlayHandle},
    Error, Result,
};

/// Wiring attempts before a delete control is reported as failed
const MAX_WIRE_ATTEMPTS: u32 = 10;

/// Owns the single "currently open" info overlay.
///
/// Per marker the lifecycle is Idle -> (click) -> Open -> (close click,
/// delete success, or any other marker's click) -> Idle. Globally at most
/// one overlay is open: opening a marker first forces the previous one back
/// to Idle and unlinks its handle, so no dangling reference survives.
#[derive(Debug, Default)]
pub struct OverlayManager {
    open: Option<(MarkerId, OverlayHandle)>,
    /// Delete-control wiring waiting for the overlay DOM to exist
    pending_wiring: Option<(OverlayHandle, u32)>,
}

impl OverlayManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the overlay for a marker, closing any previously open overlay
    /// first. The delete control is only rendered when the current user owns
    /// the marker; its handler is wired once the overlay's native
    /// representation exists (polled with bounded retries via
    /// [`poll_wiring`](Self::poll_wiring)).
    pub fn open(
        &mut self,
        id: &MarkerId,
        store: &mut MarkerStore,
        renderer: &mut dyn MapRenderer,
        current_user: Option<&UserId>,
    ) -> Result<()> {
        self.close(store, renderer);

        let record = store
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        let anchor = record
            .render
            .ok_or_else(|| Error::Render(format!("marker {} is not drawn", id)))?;

        let deletable = current_user.map_or(false, |user| record.is_owned_by(user));
        let handle = renderer.open_overlay(anchor, id, deletable)?;
        record.overlay = Some(handle);
        self.open = Some((id.clone(), handle));

        if deletable && !renderer.wire_delete_control(handle) {
            self.pending_wiring = Some((handle, 1));
        }

        Ok(())
    }

    /// Forces the open overlay (if any) back to Idle
    pub fn close(&mut self, store: &mut MarkerStore, renderer: &mut dyn MapRenderer) {
        if let Some((id, handle)) = self.open.take() {
            renderer.close_overlay(handle);
            if let Some(record) = store.get_mut(&id) {
                record.overlay = None;
            }
        }
        self.pending_wiring = None;
    }

    /// Retries pending delete-control wiring. Called from the engine's pump
    /// so a slow overlay DOM gets a bounded number of attempts; after that
    /// the failure is reported rather than silently dropped.
    pub fn poll_wiring(&mut self, renderer: &mut dyn MapRenderer) {
        if let Some((handle, attempts)) = self.pending_wiring.take() {
            if renderer.wire_delete_control(handle) {
                return;
            }
            if attempts >= MAX_WIRE_ATTEMPTS {
                log::error!(
                    "failed to wire overlay delete control after {} attempts",
                    attempts
                );
                return;
            }
            self.pending_wiring = Some((handle, attempts + 1));
        }
    }

    /// Clears overlay state when a marker is removed from the store. The
    /// store already closed the native overlay while detaching handles.
    pub fn on_marker_removed(&mut self, id: &MarkerId) {
        if let Some((open_id, _)) = &self.open {
            if open_id == id {
                self.open = None;
                self.pending_wiring = None;
            }
        }
    }

    /// Id of the marker whose overlay is open, if any
    pub fn open_marker(&self) -> Option<&MarkerId> {
        self.open.as_ref().map(|(id, _)| id)
    }

    pub fn has_open(&self) -> bool {
        self.open.is_some()
    }

    pub fn has_pending_wiring(&self) -> bool {
        self.pending_wiring.is_some()
    }

    /// Page unmount: drop all interaction state. Handles are torn down by
    /// the store's cascading clear.
    pub fn teardown(&mut self) {
        self.open = None;
        self.pending_wiring = None;
    }
}
