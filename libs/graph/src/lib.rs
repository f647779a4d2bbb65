//! `pcore-graph`: the per-App DAG of spec→workflow→step→resource nodes,
//! pure layout algorithms over it, and an observer broadcaster.

pub mod broadcaster;
pub mod errors;
pub mod layout;
pub mod manager;
pub mod model;

pub use broadcaster::{GraphBroadcaster, GraphSnapshot};
pub use errors::GraphError;
pub use layout::{compute_layout, LayoutAlgorithm, LayoutResult, LayoutTunables, Point};
pub use manager::GraphModel;
pub use model::Graph;
