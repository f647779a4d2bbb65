//! In-memory per-App DAG, kept consistent with the Store.

use std::collections::HashMap;

use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};

use pcore_domain::{GraphEdge, GraphEdgeType, GraphNode, GraphNodeId};

use crate::errors::GraphError;

/// The per-App graph: a `petgraph::DiGraph` plus an id→index lookup so
/// callers can address nodes by their stable [`GraphNodeId`] instead of
/// petgraph's internal indices.
#[derive(Default)]
pub struct Graph {
    inner: DiGraph<GraphNode, GraphEdgeType>,
    index_of: HashMap<GraphNodeId, NodeIndex>,
}

impl Graph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: GraphNode) -> GraphNodeId {
        let id = node.id;
        let idx = self.inner.add_node(node);
        self.index_of.insert(id, idx);
        id
    }

    pub fn update_node_state(&mut self, id: GraphNodeId, state: String) -> Result<(), GraphError> {
        let idx = *self.index_of.get(&id).ok_or(GraphError::NodeNotFound(id))?;
        self.inner[idx].state = state;
        Ok(())
    }

    /// Adds an edge, enforcing: no self-edges; `Contains` edges keep the
    /// graph a forest (a node has at most one incoming `Contains` edge).
    pub fn add_edge(&mut self, edge: GraphEdge) -> Result<(), GraphError> {
        if edge.from == edge.to {
            return Err(GraphError::SelfEdge(edge.from));
        }
        let from_idx = *self.index_of.get(&edge.from).ok_or(GraphError::NodeNotFound(edge.from))?;
        let to_idx = *self.index_of.get(&edge.to).ok_or(GraphError::NodeNotFound(edge.to))?;

        if edge.edge_type == GraphEdgeType::Contains {
            let already_contained = self
                .inner
                .edges_directed(to_idx, petgraph::Direction::Incoming)
                .any(|e| *e.weight() == GraphEdgeType::Contains);
            if already_contained {
                return Err(GraphError::NotAForest { from: edge.from, to: edge.to });
            }
        }

        self.inner.add_edge(from_idx, to_idx, edge.edge_type);
        Ok(())
    }

    #[must_use]
    pub fn nodes(&self) -> Vec<&GraphNode> {
        self.inner.node_weights().collect()
    }

    #[must_use]
    pub fn node(&self, id: GraphNodeId) -> Option<&GraphNode> {
        self.index_of.get(&id).map(|idx| &self.inner[*idx])
    }

    #[must_use]
    pub fn edges(&self) -> Vec<(GraphNodeId, GraphNodeId, GraphEdgeType)> {
        self.inner
            .edge_indices()
            .filter_map(|e| {
                let (from, to) = self.inner.edge_endpoints(e)?;
                Some((self.inner[from].id, self.inner[to].id, self.inner[e]))
            })
            .collect()
    }

    /// Invariant 4: the graph for every App is acyclic.
    #[must_use]
    pub fn is_acyclic(&self) -> bool {
        !is_cyclic_directed(&self.inner)
    }

    pub(crate) fn petgraph(&self) -> &DiGraph<GraphNode, GraphEdgeType> {
        &self.inner
    }

    pub(crate) fn index_of(&self, id: GraphNodeId) -> Option<NodeIndex> {
        self.index_of.get(&id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pcore_domain::{AppId, GraphEdgeId, GraphNodeId, GraphNodeType, NodeTiming, PropertyMap};

    fn node(name: &str, app_id: AppId) -> GraphNode {
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
    fn rejects_self_edges() {
        let app_id = AppId::new();
        let mut graph = Graph::new();
        let n = node("db", app_id);
        let id = n.id;
        graph.add_node(n);
        let edge = GraphEdge {
            id: GraphEdgeId::new(),
            app_id,
            from: id,
            to: id,
            edge_type: GraphEdgeType::Contains,
        };
        assert!(matches!(graph.add_edge(edge), Err(GraphError::SelfEdge(_))));
    }

    #[test]
    fn contains_edges_form_a_forest() {
        let app_id = AppId::new();
        let mut graph = Graph::new();
        let parent_a = node("spec", app_id);
        let parent_b = node("workflow", app_id);
        let child = node("step", app_id);
        let (a_id, b_id, c_id) = (parent_a.id, parent_b.id, child.id);
        graph.add_node(parent_a);
        graph.add_node(parent_b);
        graph.add_node(child);

        graph
            .add_edge(GraphEdge { id: GraphEdgeId::new(), app_id, from: a_id, to: c_id, edge_type: GraphEdgeType::Contains })
            .unwrap();

        let result = graph.add_edge(GraphEdge {
            id: GraphEdgeId::new(),
            app_id,
            from: b_id,
            to: c_id,
            edge_type: GraphEdgeType::Contains,
        });
        assert!(matches!(result, Err(GraphError::NotAForest { .. })));
    }

    #[test]
    fn new_graph_is_acyclic() {
        let graph = Graph::new();
        assert!(graph.is_acyclic());
    }
}
