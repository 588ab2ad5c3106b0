//! User and map-SDK events, funneled through a single dispatcher.
//!
//! Every interaction the engine reacts to arrives as one of these variants,
//! so all state transitions happen in one place
//! ([`MarkerMap::handle_event`](crate::core::map::MarkerMap::handle_event))
//! and ordering between interleaved gestures stays deterministic.

use crate::{
    core::geo::{LatLng, LatLngBounds},
    marker::{filter::FilterToken, record::MarkerId},
    Category,
};

#[derive(Debug, Clone, PartialEq)]
pub enum MapEvent {
    /// The map SDK finished initializing with its first view
    Ready { bounds: LatLngBounds, zoom: f64 },
    /// A drag or zoom gesture settled on a new view
    NavigationSettled { bounds: LatLngBounds, zoom: f64 },
    /// A marker glyph was tapped
    MarkerClicked { id: MarkerId },
    /// The map background was tapped (closes an open overlay, otherwise
    /// places an optimistic default-category marker)
    MapClicked { position: LatLng },
    /// The registration form was submitted with an explicit category
    CreateSubmitted { position: LatLng, category: Category },
    /// The open overlay's close control was tapped
    OverlayCloseClicked,
    /// The open overlay's delete control was tapped
    DeleteClicked,
    /// A filter chip was selected
    FilterSelected { token: FilterToken },
    /// The owning page is unmounting
    Unmounted,
}
