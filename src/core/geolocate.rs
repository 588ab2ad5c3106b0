//! One-shot device positioning.
//!
//! The engine only needs a single position fix to center the initial view
//! and fetch radius. Platform geolocation lives behind a trait; when it is
//! unavailable or refuses, callers fall back to a configured default center
//! rather than failing the page.

use crate::{core::geo::LatLng, Error, Result};
use async_trait::async_trait;

/// One-shot position source
#[async_trait]
pub trait Geolocator: Send + Sync {
    /// The device's current position. Implementations should apply their
    /// own timeout; the engine treats any error as "use the fallback".
    async fn current_position(&self) -> Result<LatLng>;
}

/// A geolocator that always reports the same position, or always fails.
/// Used in tests and as a stand-in on platforms without positioning.
pub struct FixedGeolocator {
    position: Option<LatLng>,
}

impl FixedGeolocator {
    pub fn new(position: LatLng) -> Self {
        Self {
            position: Some(position),
        }
    }

    pub fn unavailable() -> Self {
        Self { position: None }
    }
}

#[async_trait]
impl Geolocator for FixedGeolocator {
    async fn current_position(&self) -> Result<LatLng> {
        self.position
            .ok_or_else(|| Error::Geolocation("position unavailable".to_string()))
    }
}

/// Resolves the starting map center: the device position when the platform
/// provides a usable one, the configured fallback otherwise.
pub async fn resolve_center(geolocator: &dyn Geolocator, fallback: LatLng) -> LatLng {
    match geolocator.current_position().await {
        Ok(position) if position.is_valid() => position,
        Ok(position) => {
            log::warn!("geolocation returned out-of-range {:?}, using fallback", position);
            fallback
        }
        Err(err) => {
            log::warn!("geolocation unavailable ({}), using fallback", err);
            fallback
        }
    }
}
