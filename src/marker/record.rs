use crate::{
    core::geo::LatLng,
    rendering::adapter::{OverlayHandle, RenderHandle},
    Error, Result,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

/// Stable marker identifier.
///
/// Server-issued ids are numeric strings; optimistic local-only markers get
/// a `local-` prefixed id generated from time plus a nonce, so the two
/// populations can never collide and a backend fetch can be reconciled by id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarkerId(pub String);

impl MarkerId {
    pub fn from_server(id: u64) -> Self {
        Self(id.to_string())
    }

    /// Generates a client-side id for a marker created before the server has
    /// acknowledged it.
    pub fn new_local() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        static EPOCH: once_cell::sync::Lazy<instant::Instant> =
            once_cell::sync::Lazy::new(instant::Instant::now);

        let millis = EPOCH.elapsed().as_millis() as u64;
        let count = COUNTER.fetch_add(1, Ordering::Relaxed);

        let mut hasher = fxhash::FxHasher::default();
        millis.hash(&mut hasher);
        count.hash(&mut hasher);
        let nonce = hasher.finish() & 0xffff_ffff;

        Self(format!("local-{}-{:08x}", millis, nonce))
    }

    /// True for client-generated ids that the server does not know about.
    pub fn is_local(&self) -> bool {
        self.0.starts_with("local-")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MarkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of the user who placed a marker
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

/// Hazard sub-categories. The hazard category always carries one of these;
/// the benign category never does, so invalid combinations cannot be built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HazardKind {
    StrayAnimal,
    IcySurface,
    DeicingChemical,
    Construction,
}

/// Marker category as a closed tagged variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Benign,
    Hazard(HazardKind),
}

impl Category {
    /// Wire encoding used by the backend's small-integer `type` field.
    /// Benign is 0; hazard subtypes are 1..=4.
    pub fn to_code(self) -> u8 {
        match self {
            Category::Benign => 0,
            Category::Hazard(HazardKind::StrayAnimal) => 1,
            Category::Hazard(HazardKind::IcySurface) => 2,
            Category::Hazard(HazardKind::DeicingChemical) => 3,
            Category::Hazard(HazardKind::Construction) => 4,
        }
    }

    /// Decodes the backend's `type` code. Unknown codes are a malformed
    /// response, not a panic.
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(Category::Benign),
            1 => Ok(Category::Hazard(HazardKind::StrayAnimal)),
            2 => Ok(Category::Hazard(HazardKind::IcySurface)),
            3 => Ok(Category::Hazard(HazardKind::DeicingChemical)),
            4 => Ok(Category::Hazard(HazardKind::Construction)),
            other => Err(Error::MalformedResponse(format!(
                "unknown marker type code {}",
                other
            ))),
        }
    }

    pub fn is_hazard(self) -> bool {
        matches!(self, Category::Hazard(_))
    }
}

/// The canonical marker unit.
///
/// Render and overlay handles are exclusively owned by the record; whoever
/// removes or replaces a record is responsible for detaching them through
/// the renderer first so no map-native object leaks.
#[derive(Debug)]
pub struct MarkerRecord {
    pub id: MarkerId,
    pub owner: Option<UserId>,
    pub position: LatLng,
    pub category: Category,
    pub render: Option<RenderHandle>,
    pub overlay: Option<OverlayHandle>,
}

impl MarkerRecord {
    pub fn new(id: MarkerId, owner: Option<UserId>, position: LatLng, category: Category) -> Self {
        Self {
            id,
            owner,
            position,
            category,
            render: None,
            overlay: None,
        }
    }

    /// Creates a local-only record for optimistic placement
    pub fn new_local(position: LatLng, category: Category) -> Self {
        Self::new(MarkerId::new_local(), None, position, category)
    }

    pub fn is_owned_by(&self, user: &UserId) -> bool {
        self.owner.as_ref() == Some(user)
    }
}
