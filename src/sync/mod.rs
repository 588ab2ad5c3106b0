pub mod backend;
pub mod controller;

// Re-export the essential types
pub use backend::{CreateMarkerRequest, HttpMarkerBackend, MarkerBackend, RemoteMarker};
pub use controller::{SyncController, SyncEvent};
