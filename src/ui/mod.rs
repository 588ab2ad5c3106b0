pub mod overlay;

pub use overlay::OverlayManager;
