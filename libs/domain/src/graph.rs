//! GraphNode and GraphEdge: the wire-level shape of the per-App DAG.
//! The traversal/layout logic lives in `pcore-graph`; this crate only
//! defines the persisted/broadcast shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::{GraphEdgeType, GraphNodeType};
use crate::ids::{AppId, GraphEdgeId, GraphNodeId};
use crate::spec::PropertyMap;

/// Timing triple reported on every [`GraphNode`].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct NodeTiming {
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
}

/// One node of the per-App graph. `state` mirrors the underlying Run or
/// Resource state one-to-one and is a plain string so the graph layer does
/// not need to know every entity's status enum.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: GraphNodeId,
    pub app_id: AppId,
    pub node_type: GraphNodeType,
    pub name: String,
    pub state: String,
    pub timing: NodeTiming,
    #[serde(default)]
    pub properties: PropertyMap,
}

/// One edge of the per-App graph.
///
/// Invariant: no self-edges; `contains` edges form a forest (spec →
/// workflow → step; spec → resource). Enforced on insertion by
/// `pcore-graph`, not by this type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub id: GraphEdgeId,
    pub app_id: AppId,
    pub from: GraphNodeId,
    pub to: GraphNodeId,
    pub edge_type: GraphEdgeType,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_timing_defaults_to_unset() {
        let timing = NodeTiming::default();
        assert!(timing.started_at.is_none());
        assert!(timing.duration_ms.is_none());
    }
}
