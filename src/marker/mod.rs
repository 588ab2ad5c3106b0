pub mod filter;
pub mod record;
pub mod store;

// Re-export the essential types
pub use filter::{FilterEngine, FilterToken};
pub use record::{Category, HazardKind, MarkerId, MarkerRecord, UserId};
pub use store::MarkerStore;
