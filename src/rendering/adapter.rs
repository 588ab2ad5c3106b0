//! Contract required from the external map SDK.
//!
//! The engine never talks to map-native objects directly; it holds opaque
//! handles and asks the renderer to create, destroy, and group them. The
//! recording implementation at the bottom is what the test suite uses to
//! assert the no-leak and single-overlay invariants.

use crate::{
    core::geo::LatLng,
    marker::record::{Category, MarkerId},
    spatial::clustering::Cluster,
    Result,
};
use serde::{Deserialize, Serialize};

/// Opaque id of a drawn map marker object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RenderHandle(pub u64);

/// Opaque id of an open info overlay anchored to a marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OverlayHandle(pub u64);

/// Visual style applied to cluster groups at rebuild time
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterStyle {
    /// CSS background color for the cluster badge
    pub background: &'static str,
}

/// Primitives the engine requires from the map SDK.
///
/// All methods are synchronous from the engine's point of view; the SDK's
/// own async work (image loading, DOM creation) surfaces through
/// `overlay_ready`, which the overlay manager polls with bounded retries.
pub trait MapRenderer {
    /// Draws a point marker and returns its handle.
    fn create_marker(&mut self, position: &LatLng, category: Category) -> Result<RenderHandle>;

    /// Destroys a drawn marker. Must be idempotent for already-destroyed
    /// handles so teardown paths can be defensive.
    fn destroy_marker(&mut self, handle: RenderHandle);

    /// Opens a closable overlay anchored to a marker.
    fn open_overlay(
        &mut self,
        anchor: RenderHandle,
        marker_id: &MarkerId,
        deletable: bool,
    ) -> Result<OverlayHandle>;

    /// Closes an open overlay. Idempotent.
    fn close_overlay(&mut self, handle: OverlayHandle);

    /// Whether the overlay's native/DOM representation exists yet. Delete
    /// control wiring must wait for this.
    fn overlay_ready(&self, handle: OverlayHandle) -> bool;

    /// Attaches the delete-control click handler to a ready overlay.
    /// Returns false when the overlay is not ready yet.
    fn wire_delete_control(&mut self, handle: OverlayHandle) -> bool;

    /// Replaces the entire cluster grouping with the given clusters, styled
    /// uniformly. A failure here degrades to un-clustered markers.
    fn rebuild_clusters(&mut self, clusters: &[Cluster], style: &ClusterStyle) -> Result<()>;

    /// Removes all cluster groupings (markers stay drawn).
    fn clear_clusters(&mut self);
}

/// In-memory renderer that records every call, used by the test suite.
pub mod recording {
    use super::*;
    use crate::prelude::HashSet;

    #[derive(Debug, Default)]
    pub struct RecordingRenderer {
        next_handle: u64,
        /// Handles currently attached to the map
        pub live_markers: HashSet<RenderHandle>,
        pub live_overlays: HashSet<OverlayHandle>,
        /// Number of overlay_ready polls to answer false before true
        pub overlay_ready_after: u32,
        ready_polls: u32,
        pub wired_overlays: HashSet<OverlayHandle>,
        pub cluster_rebuilds: u32,
        pub last_cluster_count: usize,
        pub last_style: Option<ClusterStyle>,
        /// When set, rebuild_clusters fails (native cluster init failure)
        pub fail_clusters: bool,
        /// When set, create_marker fails (native marker init failure)
        pub fail_marker_creates: bool,
        pub markers_created: u32,
        pub markers_destroyed: u32,
    }

    impl RecordingRenderer {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl MapRenderer for RecordingRenderer {
        fn create_marker(
            &mut self,
            _position: &LatLng,
            _category: Category,
        ) -> Result<RenderHandle> {
            if self.fail_marker_creates {
                return Err(crate::Error::Render("marker init failed".to_string()));
            }
            self.next_handle += 1;
            let handle = RenderHandle(self.next_handle);
            self.live_markers.insert(handle);
            self.markers_created += 1;
            Ok(handle)
        }

        fn destroy_marker(&mut self, handle: RenderHandle) {
            if self.live_markers.remove(&handle) {
                self.markers_destroyed += 1;
            }
        }

        fn open_overlay(
            &mut self,
            _anchor: RenderHandle,
            _marker_id: &MarkerId,
            _deletable: bool,
        ) -> Result<OverlayHandle> {
            self.next_handle += 1;
            let handle = OverlayHandle(self.next_handle);
            self.live_overlays.insert(handle);
            self.ready_polls = 0;
            Ok(handle)
        }

        fn close_overlay(&mut self, handle: OverlayHandle) {
            self.live_overlays.remove(&handle);
            self.wired_overlays.remove(&handle);
        }

        fn overlay_ready(&self, handle: OverlayHandle) -> bool {
            self.live_overlays.contains(&handle) && self.ready_polls >= self.overlay_ready_after
        }

        fn wire_delete_control(&mut self, handle: OverlayHandle) -> bool {
            if self.ready_polls < self.overlay_ready_after {
                self.ready_polls += 1;
                return false;
            }
            if self.live_overlays.contains(&handle) {
                self.wired_overlays.insert(handle);
                true
            } else {
                false
            }
        }

        fn rebuild_clusters(&mut self, clusters: &[Cluster], style: &ClusterStyle) -> Result<()> {
            if self.fail_clusters {
                return Err(crate::Error::Render("cluster init failed".to_string()));
            }
            self.cluster_rebuilds += 1;
            self.last_cluster_count = clusters.len();
            self.last_style = Some(style.clone());
            Ok(())
        }

        fn clear_clusters(&mut self) {
            self.last_cluster_count = 0;
        }
    }
}
