//! Connectivity analysis over the current tower set.
//!
//! - `cluster`: LOS adjacency and connected components
//! - `edges`: Diagnostic visibility edges, hop waves, and coverage summary

pub mod cluster;
pub mod edges;

pub use cluster::{analyze_clusters, tower_adjacency, ClusterMap};
pub use edges::{build_visibility_edges, coverage_summary, hop_waves, CoverageSummary, VisibilityEdge};
