//! Headless demo: drives the marker engine against a live markers service.
//!
//! Run with a base URL, e.g. `cargo run --example walk_map http://localhost:8080`.
//! Uses the recording renderer, so "rendering" is just handle bookkeeping;
//! the interesting part is the fetch/create/delete event flow printed below.

use pawmap::prelude::*;
use pawmap::rendering::adapter::recording::RecordingRenderer;

#[tokio::main]
async fn main() {
    env_logger::init();

    let base_url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "http://localhost:8080".to_string());
    println!("fetching markers from {}", base_url);

    let backend = Arc::new(HttpMarkerBackend::new(base_url));
    let mut map = MarkerMap::new(
        RecordingRenderer::new(),
        backend,
        MarkerMapConfig::default(),
    );

    // Seoul city center view.
    map.handle_event(MapEvent::Ready {
        bounds: LatLngBounds::from_coords(37.4, 126.8, 37.7, 127.2),
        zoom: 14.0,
    })
    .unwrap();

    for _ in 0..200 {
        for event in map.pump() {
            println!("{:?}", event);
            match event {
                SyncEvent::FetchApplied { count } => {
                    println!(
                        "{} markers in store, {} drawn, {} clusters",
                        count,
                        map.store().len(),
                        map.clusters().clusters().len()
                    );
                    return;
                }
                SyncEvent::FetchFailed(err) => {
                    eprintln!("fetch failed: {}", err);
                    return;
                }
                _ => {}
            }
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    eprintln!("no response from {:?}", std::env::args().nth(1));
}
