pub mod adapter;

pub use adapter::{ClusterStyle, MapRenderer, OverlayHandle, RenderHandle};
