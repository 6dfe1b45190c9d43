pub mod library;

pub use library::{GroupKind, GroupLibrary, GROUP_PREFIX};

use crate::connector::Connector;
use crate::error::{PlotError, PlotResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// One (source, metric) pair discovered by a connector refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub origin: String,
    pub source: String,
    pub metric: String,
}

impl CatalogRecord {
    pub fn new(
        origin: impl Into<String>,
        source: impl Into<String>,
        metric: impl Into<String>,
    ) -> Self {
        Self {
            origin: origin.into(),
            source: source.into(),
            metric: metric.into(),
        }
    }
}

#[derive(Clone)]
pub struct CatalogOrigin {
    pub name: String,
    pub connector: Arc<dyn Connector>,
    pub sources: BTreeMap<String, BTreeSet<String>>,
}

impl CatalogOrigin {
    pub fn new(name: impl Into<String>, connector: Arc<dyn Connector>) -> Self {
        Self {
            name: name.into(),
            connector,
            sources: BTreeMap::new(),
        }
    }

    pub fn has_metric(&self, source: &str, metric: &str) -> bool {
        self.sources
            .get(source)
            .map_or(false, |metrics| metrics.contains(metric))
    }

    pub fn metric_count(&self) -> usize {
        self.sources.values().map(|metrics| metrics.len()).sum()
    }
}

/// A resolved metric, carrying the connector that serves it.
#[derive(Clone)]
pub struct CatalogMetric {
    pub origin: String,
    pub source: String,
    pub name: String,
    pub connector: Arc<dyn Connector>,
}

impl std::fmt::Debug for CatalogMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogMetric")
            .field("origin", &self.origin)
            .field("source", &self.source)
            .field("name", &self.name)
            .field("connector", &self.connector.name())
            .finish()
    }
}

/// Immutable view of the catalog. Readers keep the `Arc` they took for the
/// whole request.
#[derive(Clone, Default)]
pub struct CatalogSnapshot {
    pub version: u64,
    origins: BTreeMap<String, CatalogOrigin>,
}

impl CatalogSnapshot {
    pub fn origin(&self, name: &str) -> Option<&CatalogOrigin> {
        self.origins.get(name)
    }

    pub fn origins(&self) -> impl Iterator<Item = &CatalogOrigin> {
        self.origins.values()
    }

    pub fn get_metric(&self, origin: &str, source: &str, metric: &str) -> PlotResult<CatalogMetric> {
        let entry = self
            .origins
            .get(origin)
            .ok_or_else(|| PlotError::UnresolvedMetric(format!("unknown origin `{}'", origin)))?;

        if !entry.has_metric(source, metric) {
            return Err(PlotError::UnresolvedMetric(format!(
                "unknown metric `{}' for source `{}' in origin `{}'",
                metric, source, origin
            )));
        }

        Ok(CatalogMetric {
            origin: origin.to_string(),
            source: source.to_string(),
            name: metric.to_string(),
            connector: entry.connector.clone(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSummary {
    pub version: u64,
    pub origins: BTreeMap<String, BTreeMap<String, BTreeSet<String>>>,
}

impl From<&CatalogSnapshot> for CatalogSummary {
    fn from(snapshot: &CatalogSnapshot) -> Self {
        Self {
            version: snapshot.version,
            origins: snapshot
                .origins
                .iter()
                .map(|(name, origin)| (name.clone(), origin.sources.clone()))
                .collect(),
        }
    }
}

/// Registry of origins and the metrics their connectors expose. Refreshes
/// build a new snapshot aside and swap it in one step.
pub struct Catalog {
    snapshot: RwLock<Arc<CatalogSnapshot>>,
    channel_capacity: usize,
}

impl Catalog {
    pub fn new(channel_capacity: usize) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(CatalogSnapshot::default())),
            channel_capacity: channel_capacity.max(1),
        }
    }

    pub async fn snapshot(&self) -> Arc<CatalogSnapshot> {
        self.snapshot.read().await.clone()
    }

    pub async fn register_origin(&self, name: &str, connector: Arc<dyn Connector>) {
        let mut current = self.snapshot.write().await;
        let mut next = CatalogSnapshot::clone(&current);
        next.origins
            .insert(name.to_string(), CatalogOrigin::new(name, connector));
        next.version += 1;
        *current = Arc::new(next);

        info!("Registered origin {}", name);
    }

    /// Re-discovers the metrics of `origin` and publishes them. On failure
    /// the previous snapshot stays in place.
    pub async fn refresh(&self, origin: &str) -> PlotResult<usize> {
        let connector = self
            .snapshot()
            .await
            .origin(origin)
            .map(|entry| entry.connector.clone())
            .ok_or_else(|| PlotError::NotFound(format!("origin `{}'", origin)))?;

        let (tx, mut rx) = mpsc::channel::<CatalogRecord>(self.channel_capacity);
        let collector = tokio::spawn(async move {
            let mut sources: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
            while let Some(record) = rx.recv().await {
                sources.entry(record.source).or_default().insert(record.metric);
            }
            sources
        });

        debug!("Refreshing origin {} through {}", origin, connector.name());
        let outcome = connector.refresh(origin, tx).await;

        // The sender is gone once refresh returns, so the collector ends.
        let sources = collector
            .await
            .map_err(|e| PlotError::connector(connector.name(), e))?;

        if let Err(e) = outcome {
            error!("Refresh of origin {} failed: {}", origin, e);
            return Err(e);
        }

        let count = sources.values().map(|metrics| metrics.len()).sum();

        let mut current = self.snapshot.write().await;
        let mut next = CatalogSnapshot::clone(&current);
        match next.origins.get_mut(origin) {
            Some(entry) => entry.sources = sources,
            None => {
                warn!("Origin {} vanished during refresh", origin);
                return Err(PlotError::NotFound(format!("origin `{}'", origin)));
            }
        }
        next.version += 1;
        *current = Arc::new(next);

        info!("Origin {} refreshed with {} metrics", origin, count);
        Ok(count)
    }

    /// Refreshes every origin, logging and skipping the ones that fail.
    pub async fn refresh_all(&self) -> usize {
        let names: Vec<String> = self
            .snapshot()
            .await
            .origins()
            .map(|origin| origin.name.clone())
            .collect();

        let mut refreshed = 0;
        for name in names {
            match self.refresh(&name).await {
                Ok(_) => refreshed += 1,
                Err(e) => warn!("Skipping origin {}: {}", name, e),
            }
        }

        refreshed
    }

    pub fn spawn_refresh_loop(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let refreshed = self.refresh_all().await;
                debug!("Periodic catalog refresh updated {} origins", refreshed);
            }
        })
    }
}
