//! # pawmap
//!
//! Marker synchronization engine for a dog-walking companion map.
//!
//! This library keeps a remote set of geo-tagged hazard/point-of-interest
//! markers reconciled with local rendering and interaction state: viewport
//! visibility, per-category filtering, grid clustering, optimistic creation,
//! server-confirmed deletion, and a single-open info overlay per map.
//!
//! The map SDK, geolocation, and REST backend are external collaborators
//! reached through traits; everything stateful lives here.

pub mod core;
pub mod input;
pub mod marker;
pub mod rendering;
pub mod runtime;
pub mod spatial;
pub mod sync;
pub mod ui;

pub mod prelude;

// Re-export public API
pub use crate::core::{
    geo::{LatLng, LatLngBounds},
    geolocate::Geolocator,
    map::{MarkerMap, MarkerMapConfig},
    viewport::ViewportTracker,
};

pub use crate::marker::{
    filter::{FilterEngine, FilterToken},
    record::{Category, HazardKind, MarkerId, MarkerRecord, UserId},
    store::MarkerStore,
};

pub use crate::input::events::MapEvent;

pub use crate::rendering::adapter::{MapRenderer, OverlayHandle, RenderHandle};

pub use crate::spatial::clustering::{Cluster, ClusterManager, ClusteringConfig};

pub use crate::sync::{backend::MarkerBackend, controller::SyncController};

pub use crate::ui::overlay::OverlayManager;

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types, covering the failure taxonomy the engine has to
/// distinguish: transient network trouble, authorization refusals (which the
/// UI surfaces with specific messages), malformed server payloads, and
/// map-native resource failures.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("sign-in required")]
    Unauthenticated,

    #[error("only the marker owner may do that")]
    NotOwner,

    #[error("malformed server response: {0}")]
    MalformedResponse(String),

    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("render error: {0}")]
    Render(String),

    #[error("marker not found: {0}")]
    NotFound(String),

    #[error("geolocation error: {0}")]
    Geolocation(String),
}

impl Error {
    /// True for the authorization variants that must be surfaced with their
    /// own user-visible messages rather than a generic retry prompt.
    pub fn is_authorization(&self) -> bool {
        matches!(self, Error::Unauthenticated | Error::NotOwner)
    }
}
