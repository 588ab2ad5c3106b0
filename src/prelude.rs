//! Prelude module for common pawmap types and traits
//!
//! Re-exports the most commonly used types for easy importing with
//! `use pawmap::prelude::*;`

pub use crate::core::{
    geo::{LatLng, LatLngBounds},
    geolocate::{FixedGeolocator, Geolocator},
    map::{MarkerMap, MarkerMapConfig},
    viewport::ViewportTracker,
};

pub use crate::marker::{
    filter::{FilterEngine, FilterToken},
    record::{Category, HazardKind, MarkerId, MarkerRecord, UserId},
    store::MarkerStore,
};

pub use crate::input::events::MapEvent;

pub use crate::rendering::adapter::{
    ClusterStyle, MapRenderer, OverlayHandle, RenderHandle,
};

pub use crate::spatial::clustering::{Cluster, ClusterManager, ClusteringConfig};

pub use crate::sync::{
    backend::{HttpMarkerBackend, MarkerBackend},
    controller::{SyncController, SyncEvent},
};

pub use crate::ui::overlay::OverlayManager;

pub use crate::{Error, Result};

pub use std::{
    sync::Arc,
    time::Duration,
};

pub use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet};

pub use futures::Future;
pub use std::pin::Pin;
