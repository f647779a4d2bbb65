//! GraphModel failure taxonomy.

use pcore_domain::GraphNodeId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("node not found: {0}")]
    NodeNotFound(GraphNodeId),

    #[error("self-edges are not allowed: {0}")]
    SelfEdge(GraphNodeId),

    #[error("edge would break the 'contains' forest invariant: {from} -> {to}")]
    NotAForest { from: GraphNodeId, to: GraphNodeId },

    #[error(transparent)]
    Store(#[from] pcore_store::StoreError),
}
