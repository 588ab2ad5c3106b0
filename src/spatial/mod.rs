pub mod clustering;

pub use clustering::{Cluster, ClusterManager, ClusteringConfig};
