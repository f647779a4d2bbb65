//! Layout algorithms: pure functions of the graph plus tunables.
//! Layout is never persisted; it is recomputed on demand.

use std::collections::HashMap;
use std::f64::consts::PI;

use petgraph::visit::Bfs;
use serde::{Deserialize, Serialize};

use pcore_domain::{GraphEdgeType, GraphNodeId};

use crate::model::Graph;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutAlgorithm {
    Hierarchical,
    Radial,
    Force,
    Grid,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LayoutTunables {
    pub node_spacing: f64,
    pub canvas_width: f64,
    pub canvas_height: f64,
}

impl Default for LayoutTunables {
    fn default() -> Self {
        Self {
            node_spacing: 120.0,
            canvas_width: 1600.0,
            canvas_height: 900.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Positions for every node currently in the graph, keyed by id.
pub type LayoutResult = HashMap<GraphNodeId, Point>;

#[must_use]
pub fn compute_layout(graph: &Graph, algorithm: LayoutAlgorithm, tunables: LayoutTunables) -> LayoutResult {
    match algorithm {
        LayoutAlgorithm::Hierarchical => hierarchical(graph, tunables),
        LayoutAlgorithm::Radial => radial(graph, tunables),
        LayoutAlgorithm::Force => force(graph, tunables),
        LayoutAlgorithm::Grid => grid(graph, tunables),
    }
}

/// Top-down layering by `Contains` depth from each root (a node with no
/// incoming `Contains` edge).
fn hierarchical(graph: &Graph, tunables: LayoutTunables) -> LayoutResult {
    let pg = graph.petgraph();
    let mut depth: HashMap<petgraph::graph::NodeIndex, usize> = HashMap::new();

    let roots: Vec<_> = pg
        .node_indices()
        .filter(|&idx| {
            !pg.edges_directed(idx, petgraph::Direction::Incoming)
                .any(|e| *e.weight() == GraphEdgeType::Contains)
        })
        .collect();

    for root in roots {
        let mut bfs = Bfs::new(pg, root);
        depth.entry(root).or_insert(0);
        while let Some(idx) = bfs.next(pg) {
            let d = depth.get(&idx).copied().unwrap_or(0);
            for edge in pg.edges_directed(idx, petgraph::Direction::Outgoing) {
                if *edge.weight() == GraphEdgeType::Contains {
                    let next = edge.target();
                    depth.entry(next).or_insert(d + 1);
                }
            }
        }
    }

    let mut per_depth_count: HashMap<usize, usize> = HashMap::new();
    let mut result = LayoutResult::new();
    for idx in pg.node_indices() {
        let d = depth.get(&idx).copied().unwrap_or(0);
        let slot = per_depth_count.entry(d).or_insert(0);
        result.insert(
            pg[idx].id,
            Point {
                x: (*slot as f64) * tunables.node_spacing,
                y: (d as f64) * tunables.node_spacing,
            },
        );
        *slot += 1;
    }
    result
}

/// Concentric rings by `Contains` depth, same depth computation as
/// `hierarchical` but projected onto a circle per ring.
fn radial(graph: &Graph, tunables: LayoutTunables) -> LayoutResult {
    let linear = hierarchical(graph, tunables);
    let center_x = tunables.canvas_width / 2.0;
    let center_y = tunables.canvas_height / 2.0;

    let mut by_ring: HashMap<i64, Vec<GraphNodeId>> = HashMap::new();
    for (id, p) in &linear {
        let ring = (p.y / tunables.node_spacing).round() as i64;
        by_ring.entry(ring).or_default().push(*id);
    }

    let mut result = LayoutResult::new();
    for (ring, ids) in by_ring {
        let radius = (ring as f64) * tunables.node_spacing;
        let n = ids.len().max(1);
        for (i, id) in ids.into_iter().enumerate() {
            let angle = 2.0 * PI * (i as f64) / (n as f64);
            result.insert(
                id,
                Point {
                    x: center_x + radius * angle.cos(),
                    y: center_y + radius * angle.sin(),
                },
            );
        }
    }
    result
}

/// A deterministic spring-style approximation: nodes repel each other and
/// edges pull connected nodes together, iterated a fixed number of times
/// from a grid starting layout. Deterministic (no RNG) so layout snapshots
/// are reproducible across calls with the same graph.
fn force(graph: &Graph, tunables: LayoutTunables) -> LayoutResult {
    const ITERATIONS: usize = 50;
    let mut positions = grid(graph, tunables);
    let edges = graph.edges();
    let ids: Vec<GraphNodeId> = positions.keys().copied().collect();

    for _ in 0..ITERATIONS {
        let mut displacement: HashMap<GraphNodeId, Point> = ids.iter().map(|id| (*id, Point { x: 0.0, y: 0.0 })).collect();

        for i in 0..ids.len() {
            for j in (i + 1)..ids.len() {
                let (a, b) = (ids[i], ids[j]);
                let pa = positions[&a];
                let pb = positions[&b];
                let dx = pa.x - pb.x;
                let dy = pa.y - pb.y;
                let dist_sq = (dx * dx + dy * dy).max(1.0);
                let repel = tunables.node_spacing * tunables.node_spacing / dist_sq;
                displacement.get_mut(&a).unwrap().x += dx * repel * 0.01;
                displacement.get_mut(&a).unwrap().y += dy * repel * 0.01;
                displacement.get_mut(&b).unwrap().x -= dx * repel * 0.01;
                displacement.get_mut(&b).unwrap().y -= dy * repel * 0.01;
            }
        }

        for (from, to, _) in &edges {
            if let (Some(&pa), Some(&pb)) = (positions.get(from), positions.get(to)) {
                let dx = pb.x - pa.x;
                let dy = pb.y - pa.y;
                if let Some(d) = displacement.get_mut(from) {
                    d.x += dx * 0.05;
                    d.y += dy * 0.05;
                }
            }
        }

        for id in &ids {
            let d = displacement[id];
            let p = positions.get_mut(id).unwrap();
            p.x = (p.x + d.x).clamp(0.0, tunables.canvas_width);
            p.y = (p.y + d.y).clamp(0.0, tunables.canvas_height);
        }
    }

    positions
}

/// Simple row-major grid, used as the `grid` algorithm and as the starting
/// point for `force`.
fn grid(graph: &Graph, tunables: LayoutTunables) -> LayoutResult {
    let cols = (tunables.canvas_width / tunables.node_spacing).floor().max(1.0) as usize;
    let mut result = LayoutResult::new();
    for (i, n) in graph.nodes().into_iter().enumerate() {
        let col = i % cols;
        let row = i / cols;
        result.insert(
            n.id,
            Point {
                x: (col as f64) * tunables.node_spacing,
                y: (row as f64) * tunables.node_spacing,
            },
        );
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use pcore_domain::{AppId, GraphEdge, GraphEdgeId, GraphNode, GraphNodeId, GraphNodeType, NodeTiming, PropertyMap};

    fn node(app_id: AppId, name: &str) -> GraphNode {
        GraphNode {
            id: GraphNodeId::new(),
            app_id,
            node_type: GraphNodeType::Resource,
            name: name.to_string(),
            state: "requested".to_string(),
            timing: NodeTiming::default(),
            properties: PropertyMap::new(),
        }
    }

    #[test]
    fn grid_layout_covers_every_node() {
        let app_id = AppId::new();
        let mut graph = Graph::new();
        for i in 0..5 {
            graph.add_node(node(app_id, &format!("n{i}")));
        }
        let positions = compute_layout(&graph, LayoutAlgorithm::Grid, LayoutTunables::default());
        assert_eq!(positions.len(), 5);
    }

    #[test]
    fn hierarchical_layout_places_root_at_depth_zero() {
        let app_id = AppId::new();
        let mut graph = Graph::new();
        let root = node(app_id, "spec");
        let child = node(app_id, "step");
        let (root_id, child_id) = (root.id, child.id);
        graph.add_node(root);
        graph.add_node(child);
        graph
            .add_edge(GraphEdge { id: GraphEdgeId::new(), app_id, from: root_id, to: child_id, edge_type: GraphEdgeType::Contains })
            .unwrap();

        let positions = hierarchical(&graph, LayoutTunables::default());
        assert_eq!(positions[&root_id].y, 0.0);
        assert!(positions[&child_id].y > 0.0);
    }

    #[test]
    fn force_layout_keeps_nodes_within_canvas() {
        let app_id = AppId::new();
        let mut graph = Graph::new();
        for i in 0..8 {
            graph.add_node(node(app_id, &format!("n{i}")));
        }
        let tunables = LayoutTunables::default();
        let positions = compute_layout(&graph, LayoutAlgorithm::Force, tunables);
        for p in positions.values() {
            assert!(p.x >= 0.0 && p.x <= tunables.canvas_width);
            assert!(p.y >= 0.0 && p.y <= tunables.canvas_height);
        }
    }
}
