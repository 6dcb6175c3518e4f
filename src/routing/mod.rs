//! Corridor routing over candidate and tower cells.
//!
//! - `graph`: Weighted routing graph and shortest-path search
//! - `bridge`: Merges disconnected clusters along minimum path-loss corridors
//! - `slim`: Shortens over-limit intra-cluster hop chains

pub mod bridge;
pub mod graph;
pub mod slim;

pub use bridge::BridgeSolver;
pub use graph::{refresh_link_cache, RoutingGraph};
pub use slim::{CorridorStatus, HopSlimmer};
