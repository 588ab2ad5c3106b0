use crate::{
    marker::record::{MarkerId, MarkerRecord},
    prelude::HashMap,
    rendering::adapter::MapRenderer,
};

/// Authoritative in-memory collection of marker records, keyed by id.
///
/// The store is the single shared mutable resource of the engine. Every
/// mutating operation detaches the render/overlay handles of any record it
/// drops or replaces *before* the record goes away, so map-native resources
/// never leak. Only the sync controller performs bulk replacement.
#[derive(Debug, Default)]
pub struct MarkerStore {
    records: HashMap<MarkerId, MarkerRecord>,
}

impl MarkerStore {
    pub fn new() -> Self {
        Self {
            records: HashMap::default(),
        }
    }

    /// Full swap after a backend fetch. Tears down every previous render and
    /// overlay handle first, then installs the new records. Incoming
    /// duplicates by id collapse to the last occurrence.
    pub fn replace_all(&mut self, records: Vec<MarkerRecord>, renderer: &mut dyn MapRenderer) {
        for (_, record) in self.records.drain() {
            Self::detach_handles(record, renderer);
        }
        for mut record in records {
            if let Some(previous) = self.records.remove(&record.id) {
                // Fetch payloads should not carry handles, but be safe.
                Self::detach_handles(previous, renderer);
            }
            record.overlay = None;
            self.records.insert(record.id.clone(), record);
        }
    }

    /// Inserts a record. An existing record with the same id is replaced and
    /// its handles are detached first.
    pub fn add(&mut self, record: MarkerRecord, renderer: &mut dyn MapRenderer) {
        if let Some(previous) = self.records.remove(&record.id) {
            Self::detach_handles(previous, renderer);
        }
        self.records.insert(record.id.clone(), record);
    }

    /// Removes a record, detaching its handles. Returns the stripped record.
    pub fn remove(&mut self, id: &MarkerId, renderer: &mut dyn MapRenderer) -> Option<MarkerRecord> {
        self.records.remove(id).map(|record| {
            let mut stripped = record;
            if let Some(overlay) = stripped.overlay.take() {
                renderer.close_overlay(overlay);
            }
            if let Some(render) = stripped.render.take() {
                renderer.destroy_marker(render);
            }
            stripped
        })
    }

    pub fn get(&self, id: &MarkerId) -> Option<&MarkerRecord> {
        self.records.get(id)
    }

    pub fn get_mut(&mut self, id: &MarkerId) -> Option<&mut MarkerRecord> {
        self.records.get_mut(id)
    }

    pub fn contains(&self, id: &MarkerId) -> bool {
        self.records.contains_key(id)
    }

    pub fn all(&self) -> impl Iterator<Item = &MarkerRecord> {
        self.records.values()
    }

    pub fn all_mut(&mut self) -> impl Iterator<Item = &mut MarkerRecord> {
        self.records.values_mut()
    }

    pub fn ids(&self) -> impl Iterator<Item = &MarkerId> {
        self.records.keys()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Cascading teardown on page unmount
    pub fn clear(&mut self, renderer: &mut dyn MapRenderer) {
        for (_, record) in self.records.drain() {
            Self::detach_handles(record, renderer);
        }
    }

    fn detach_handles(mut record: MarkerRecord, renderer: &mut dyn MapRenderer) {
        if let Some(overlay) = record.overlay.take() {
            renderer.close_overlay(overlay);
        }
        if let Some(render) = record.render.take() {
            renderer.destroy_marker(render);
        }
    }
}
