//! Per-App broadcast hub for graph snapshots.
//!
//! On every node/edge change, all subscribers for that App receive the full
//! current snapshot. Delivery is best-effort and non-blocking for the
//! engine: a slow subscriber's bounded queue simply drops the oldest
//! snapshot rather than stalling the broadcaster.

use std::collections::HashMap;
use std::sync::Arc;

use pcore_domain::{AppId, GraphEdge, GraphNode};
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};

/// Bounded per-subscriber queue depth, default 64 snapshots.
const CHANNEL_CAPACITY: usize = 64;

/// The full current state of one App's graph, sent to every subscriber on
/// every change.
#[derive(Debug, Clone, Serialize)]
pub struct GraphSnapshot {
    pub app_id: AppId,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

#[derive(Default)]
pub struct GraphBroadcaster {
    channels: Arc<RwLock<HashMap<AppId, broadcast::Sender<GraphSnapshot>>>>,
}

impl GraphBroadcaster {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self, app_id: AppId) -> broadcast::Receiver<GraphSnapshot> {
        let mut channels = self.channels.write().await;
        if let Some(sender) = channels.get(&app_id) {
            sender.subscribe()
        } else {
            let (tx, rx) = broadcast::channel(CHANNEL_CAPACITY);
            channels.insert(app_id, tx);
            rx
        }
    }

    /// Publishes a snapshot to every subscriber of `app_id`. Slow
    /// subscribers who have fallen behind the channel's capacity lose their
    /// oldest buffered snapshots (the next `recv` yields `Lagged`); the
    /// broadcaster never blocks on them.
    pub async fn publish(&self, snapshot: GraphSnapshot) {
        let channels = self.channels.read().await;
        if let Some(sender) = channels.get(&snapshot.app_id) {
            let _ = sender.send(snapshot);
        }
    }

    /// Drops the channel for `app_id` once nobody is listening, so a
    /// long-lived server doesn't accumulate dead senders for torn-down Apps.
    pub async fn cleanup(&self, app_id: AppId) {
        let mut channels = self.channels.write().await;
        if let Some(sender) = channels.get(&app_id) {
            if sender.receiver_count() == 0 {
                channels.remove(&app_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_panic() {
        let hub = GraphBroadcaster::new();
        hub.publish(GraphSnapshot { app_id: AppId::new(), nodes: vec![], edges: vec![] }).await;
    }

    #[tokio::test]
    async fn subscriber_receives_published_snapshot() {
        let hub = GraphBroadcaster::new();
        let app_id = AppId::new();
        let mut rx = hub.subscribe(app_id).await;
        hub.publish(GraphSnapshot { app_id, nodes: vec![], edges: vec![] }).await;
        let snapshot = rx.recv().await.unwrap();
        assert_eq!(snapshot.app_id, app_id);
    }
}
