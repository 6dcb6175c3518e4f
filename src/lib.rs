//! Radio-relay placement planning over a hexagonal cell grid.
//!
//! Given terrain elevation, road access, population, and boundary data per
//! H3 cell, this library incrementally selects tower locations that maximize
//! covered population while keeping every tower connected to the rest of the
//! network through line-of-sight links. It integrates:
//! - Fresnel-clearance and path-loss computation with a persistent link cache
//! - Cluster analysis over the current tower set
//! - Corridor routing to bridge disconnected clusters
//! - Hop-count slimming of over-long relay chains
//! - Local hill-climbing relocation ("wiggle")
//! - Greedy population-maximizing tower selection
//!
//! ## Module Organization
//!
//! - `params`: Model parameters (mast height, frequency, link limits)
//! - `error`: Planner error type
//! - `surface`: Per-cell planning surface and tower set
//! - `clearance`: Clearance/path-loss engine and the persistent link store
//! - `los`: Line-of-sight predicate used as the single adjacency test
//! - `analysis`: Cluster analysis and diagnostic visibility edges
//! - `routing`: Routing graph, bridge solver, and hop-limit slimmer
//! - `placement`: Wiggle refinement and the greedy selector
//!
//! ## Public API
//!
//! Each placement stage exposes a `step` call that performs one atomic unit
//! of work against a shared [`surface::Surface`] and [`clearance::ClearanceStore`]
//! and returns the number of units processed. An external driver loops the
//! stages until each reports zero.

pub mod analysis;
pub mod clearance;
pub mod error;
pub mod los;
pub mod params;
pub mod placement;
pub mod routing;
pub mod surface;

pub use clearance::{ClearanceStore, LinkKey, LinkProfile};
pub use error::PlanError;
pub use los::line_of_sight;
pub use params::ModelParams;
pub use surface::{CellData, Provenance, Surface, Tower};
