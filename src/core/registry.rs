// src/core/registry.rs
use crate::types::PositionView;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Latest view of every monitored position. Each monitor writes only its own
/// symbol; everyone else reads clones.
#[derive(Clone, Default)]
pub struct SnapshotRegistry {
    inner: Arc<RwLock<HashMap<String, PositionView>>>,
}

impl SnapshotRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn publish(&self, view: PositionView) {
        self.inner.write().await.insert(view.symbol.clone(), view);
    }

    pub async fn remove(&self, symbol: &str) {
        self.inner.write().await.remove(symbol);
    }

    pub async fn get(&self, symbol: &str) -> Option<PositionView> {
        self.inner.read().await.get(symbol).cloned()
    }

    /// All views, sorted by symbol.
    pub async fn all(&self) -> Vec<PositionView> {
        let mut views: Vec<_> = self.inner.read().await.values().cloned().collect();
        views.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        views
    }
}
