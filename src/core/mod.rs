pub mod geo;
pub mod geolocate;
pub mod map;
pub mod viewport;
