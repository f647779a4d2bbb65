//! `GraphModel` facade: keeps the Store, the in-memory per-App cache, and
//! the broadcaster consistent.

use std::collections::HashMap;
use std::sync::Arc;

use pcore_domain::{AppId, GraphEdge, GraphEdgeType, GraphNode, GraphNodeId};
use pcore_store::Store;
use tokio::sync::{broadcast, RwLock};

use crate::broadcaster::{GraphBroadcaster, GraphSnapshot};
use crate::errors::GraphError;
use crate::layout::{compute_layout, LayoutAlgorithm, LayoutResult, LayoutTunables};
use crate::model::Graph;

pub struct GraphModel {
    store: Arc<dyn Store>,
    cache: RwLock<HashMap<AppId, Graph>>,
    broadcaster: GraphBroadcaster,
}

impl GraphModel {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            cache: RwLock::new(HashMap::new()),
            broadcaster: GraphBroadcaster::new(),
        }
    }

    pub async fn add_node(&self, node: GraphNode) -> Result<GraphNodeId, GraphError> {
        let app_id = node.app_id;
        let stored = self.store.add_graph_node(node).await?;
        let id = stored.id;
        {
            let mut cache = self.cache.write().await;
            cache.entry(app_id).or_default().add_node(stored);
        }
        self.publish(app_id).await?;
        Ok(id)
    }

    pub async fn update_node_state(&self, app_id: AppId, id: GraphNodeId, state: String) -> Result<(), GraphError> {
        self.store.update_graph_node_state(id, state.clone()).await?;
        {
            let mut cache = self.cache.write().await;
            cache.entry(app_id).or_default().update_node_state(id, state)?;
        }
        self.publish(app_id).await?;
        Ok(())
    }

    pub async fn add_edge(&self, edge: GraphEdge) -> Result<(), GraphError> {
        let app_id = edge.app_id;
        // Validate against the in-memory forest invariant before persisting.
        {
            let mut cache = self.cache.write().await;
            cache.entry(app_id).or_default().add_edge(edge.clone())?;
        }
        self.store.add_graph_edge(edge).await?;
        self.publish(app_id).await?;
        Ok(())
    }

    /// Rehydrates the in-memory cache for `app_id` from the Store; used at
    /// startup before the cache has ever been populated.
    pub async fn load_graph(&self, app_id: AppId) -> Result<(), GraphError> {
        let nodes = self.store.get_graph_nodes(app_id, None).await?;
        let edges = self.store.get_graph_edges(app_id, None).await?;
        let mut graph = Graph::new();
        for node in nodes {
            graph.add_node(node);
        }
        for edge in edges {
            // Edges were already validated when first inserted; a forest
            // violation here means corrupted persisted state, which we
            // surface rather than silently drop.
            graph.add_edge(edge)?;
        }
        self.cache.write().await.insert(app_id, graph);
        Ok(())
    }

    pub async fn get_graph(&self, app_id: AppId) -> (Vec<GraphNode>, Vec<(GraphNodeId, GraphNodeId, GraphEdgeType)>) {
        let cache = self.cache.read().await;
        match cache.get(&app_id) {
            Some(graph) => (
                graph.nodes().into_iter().cloned().collect(),
                graph.edges(),
            ),
            None => (Vec::new(), Vec::new()),
        }
    }

    pub async fn compute_layout(&self, app_id: AppId, algorithm: LayoutAlgorithm, tunables: LayoutTunables) -> LayoutResult {
        let cache = self.cache.read().await;
        match cache.get(&app_id) {
            Some(graph) => compute_layout(graph, algorithm, tunables),
            None => LayoutResult::new(),
        }
    }

    pub async fn subscribe(&self, app_id: AppId) -> broadcast::Receiver<GraphSnapshot> {
        self.broadcaster.subscribe(app_id).await
    }

    async fn publish(&self, app_id: AppId) -> Result<(), GraphError> {
        let cache = self.cache.read().await;
        if let Some(graph) = cache.get(&app_id) {
            let snapshot = GraphSnapshot {
                app_id,
                nodes: graph.nodes().into_iter().cloned().collect(),
                edges: graph
                    .edges()
                    .into_iter()
                    .map(|(from, to, edge_type)| GraphEdge {
                        id: pcore_domain::GraphEdgeId::new(),
                        app_id,
                        from,
                        to,
                        edge_type,
                    })
                    .collect(),
            };
            self.broadcaster.publish(snapshot).await;
        }
        Ok(())
    }
}
