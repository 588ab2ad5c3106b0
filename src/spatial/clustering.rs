use crate::{
    core::geo::{LatLng, LatLngBounds},
    marker::{filter::FilterToken, record::MarkerRecord},
    prelude::HashMap,
    rendering::adapter::{ClusterStyle, MapRenderer, RenderHandle},
    Result,
};

/// A visual aggregation of nearby markers
#[derive(Debug, Clone)]
pub struct Cluster {
    /// Grid-cell derived identifier
    pub id: String,
    /// Center point of the clustered markers
    pub center: LatLng,
    /// Geographic bounds of the clustered markers
    pub bounds: LatLngBounds,
    /// Render handles grouped under this cluster
    pub items: Vec<RenderHandle>,
}

impl Cluster {
    fn from_cell(id: String, members: &[(&MarkerRecord, RenderHandle)]) -> Self {
        let mut bounds = LatLngBounds::new(members[0].0.position, members[0].0.position);
        for (record, _) in &members[1..] {
            bounds.extend(&record.position);
        }
        Self {
            id,
            center: bounds.center(),
            bounds,
            items: members.iter().map(|(_, handle)| *handle).collect(),
        }
    }

    pub fn count(&self) -> usize {
        self.items.len()
    }

    pub fn is_single(&self) -> bool {
        self.items.len() == 1
    }
}

/// Configuration for cluster grouping
#[derive(Debug, Clone)]
pub struct ClusteringConfig {
    /// Grid cell size in degrees at zoom 0; halves with every zoom level
    pub base_cell_size: f64,
    /// Zoom level at and above which clustering is disabled
    pub disable_at_zoom: f64,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            base_cell_size: 60.0,
            disable_at_zoom: 15.0,
        }
    }
}

/// Groups visible markers into cluster representations.
///
/// Rebuilding is not incremental: every call clears the previous grouping
/// entirely and re-inserts the render handles of the currently visible,
/// filter-matching markers. At the scale this engine handles (hundreds of
/// markers) a full rebuild per viewport or filter change is fast enough and
/// keeps the cluster state trivially consistent with the store.
#[derive(Debug, Default)]
pub struct ClusterManager {
    config: ClusteringConfig,
    clusters: Vec<Cluster>,
    /// Set when the renderer refused cluster grouping; markers then stay
    /// attached un-clustered.
    degraded: bool,
}

impl ClusterManager {
    pub fn new(config: ClusteringConfig) -> Self {
        Self {
            config,
            clusters: Vec::new(),
            degraded: false,
        }
    }

    /// Clears the previous grouping and re-clusters the given records at the
    /// given zoom, applying the filter token's style. Records without a
    /// render handle are skipped; they are not on the map.
    pub fn rebuild(
        &mut self,
        visible: &[&MarkerRecord],
        token: FilterToken,
        zoom: f64,
        renderer: &mut dyn MapRenderer,
    ) -> Result<()> {
        renderer.clear_clusters();
        self.clusters.clear();

        let drawn: Vec<(&MarkerRecord, RenderHandle)> = visible
            .iter()
            .filter_map(|record| record.render.map(|handle| (*record, handle)))
            .collect();

        if zoom >= self.config.disable_at_zoom {
            for (i, member) in drawn.iter().enumerate() {
                self.clusters
                    .push(Cluster::from_cell(format!("single_{}", i), &[*member]));
            }
        } else {
            let cell_size = self.config.base_cell_size / 2_f64.powf(zoom);
            let mut grid: HashMap<(i32, i32), Vec<(&MarkerRecord, RenderHandle)>> =
                HashMap::default();

            for member in drawn {
                let cell_x = (member.0.position.lng / cell_size).floor() as i32;
                let cell_y = (member.0.position.lat / cell_size).floor() as i32;
                grid.entry((cell_x, cell_y)).or_default().push(member);
            }

            for ((cell_x, cell_y), members) in &grid {
                self.clusters.push(Cluster::from_cell(
                    format!("cluster_{}_{}", cell_x, cell_y),
                    members,
                ));
            }
        }

        let style = Self::style_for(token);
        if let Err(err) = renderer.rebuild_clusters(&self.clusters, &style) {
            // Degrade to un-clustered markers rather than blocking the page.
            log::warn!("cluster grouping unavailable, markers stay un-clustered: {}", err);
            self.clusters.clear();
            self.degraded = true;
            return Ok(());
        }
        self.degraded = false;

        Ok(())
    }

    /// Each filter token maps to a distinct badge background color
    pub fn style_for(token: FilterToken) -> ClusterStyle {
        let background = match token {
            FilterToken::All => "#4a90d9",
            FilterToken::Benign => "#7ac943",
            FilterToken::Hazard => "#e05746",
            FilterToken::Mine => "#f5a623",
        };
        ClusterStyle { background }
    }

    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Removes all grouping, for page teardown
    pub fn clear(&mut self, renderer: &mut dyn MapRenderer) {
        renderer.clear_clusters();
        self.clusters.clear();
    }
}
