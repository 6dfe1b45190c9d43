pub mod catalog;
pub mod connector;
pub mod error;
pub mod federation;
pub mod plot;
pub mod query;
pub mod request;
pub mod time;

pub use catalog::{Catalog, CatalogRecord, GroupLibrary};
pub use connector::{Connector, ConnectorSettings, HttpConnector, MemoryConnector};
pub use error::{PlotError, PlotResult};
pub use federation::{
    Diagnostic, DiagnosticKind, FederatedPlots, FederatedValues, Federator, Graph, OperGroup,
    PlotWindow, SeriesRef, Stack,
};
pub use plot::{ConsolidationType, OperatorType, Plot, Series, Value};
pub use query::{Query, QueryMetric};
pub use request::{PlotRequest, PlotResponse};

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

#[derive(Debug, Clone)]
pub struct PlotlineConfig {
    pub bind_address: String,
    pub default_sample: usize,
    pub query_timeout_seconds: u64,
    pub refresh_interval_seconds: u64,
    pub catalog_channel_capacity: usize,
    pub max_sample: usize,
    // JSON file with origins, groups and graphs
    pub settings_path: Option<String>,
}

impl Default for PlotlineConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:12003".to_string(),
            default_sample: 400,
            query_timeout_seconds: 30,
            refresh_interval_seconds: 300, // 5 minutes
            catalog_channel_capacity: 1024,
            max_sample: federation::MAX_SAMPLE,
            settings_path: None,
        }
    }
}

impl PlotlineConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(bind_addr) = std::env::var("BIND_ADDRESS") {
            config.bind_address = bind_addr;
        }

        if let Ok(sample) = std::env::var("DEFAULT_SAMPLE") {
            config.default_sample = sample.parse().unwrap_or(400);
        }

        if let Ok(timeout) = std::env::var("QUERY_TIMEOUT_SECONDS") {
            config.query_timeout_seconds = timeout.parse().unwrap_or(30);
        }

        if let Ok(interval) = std::env::var("REFRESH_INTERVAL_SECONDS") {
            config.refresh_interval_seconds = interval.parse().unwrap_or(300);
        }

        if let Ok(capacity) = std::env::var("CATALOG_CHANNEL_CAPACITY") {
            config.catalog_channel_capacity = capacity.parse().unwrap_or(1024);
        }

        if let Ok(max_sample) = std::env::var("MAX_SAMPLE") {
            config.max_sample = max_sample.parse().unwrap_or(federation::MAX_SAMPLE);
        }

        if let Ok(path) = std::env::var("PLOTLINE_CONFIG") {
            config.settings_path = Some(path);
        }

        config
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_seconds)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_seconds.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginSettings {
    pub name: String,
    pub connector: ConnectorSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlotlineSettings {
    #[serde(default)]
    pub origins: Vec<OriginSettings>,
    #[serde(flatten)]
    pub library: GroupLibrary,
    #[serde(default)]
    pub graphs: Vec<Graph>,
}

impl PlotlineSettings {
    pub fn load(path: impl AsRef<Path>) -> PlotResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let settings: PlotlineSettings = serde_json::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> PlotResult<()> {
        let mut origins = std::collections::HashSet::new();
        for origin in &self.origins {
            if origin.name.is_empty() {
                return Err(PlotError::Config("origin without a name".to_string()));
            }
            if !origins.insert(origin.name.as_str()) {
                return Err(PlotError::Config(format!("duplicate origin `{}'", origin.name)));
            }
        }

        let mut graphs = std::collections::HashSet::new();
        for graph in &self.graphs {
            if graph.id.is_empty() {
                return Err(PlotError::Config(format!("graph `{}' has no id", graph.name)));
            }
            if !graphs.insert(graph.id.as_str()) {
                return Err(PlotError::Config(format!("duplicate graph `{}'", graph.id)));
            }
        }

        Ok(())
    }
}

pub struct Plotline {
    config: PlotlineConfig,
    catalog: Arc<Catalog>,
    graphs: HashMap<String, Graph>,
    federator: Federator,
}

impl Plotline {
    pub fn new(config: PlotlineConfig) -> Self {
        Self::with_library(config, GroupLibrary::default())
    }

    pub fn with_library(config: PlotlineConfig, library: GroupLibrary) -> Self {
        let catalog = Arc::new(Catalog::new(config.catalog_channel_capacity));
        let federator = Federator::new(catalog.clone(), Arc::new(library), config.query_timeout());

        Self {
            config,
            catalog,
            graphs: HashMap::new(),
            federator,
        }
    }

    pub async fn from_settings(config: PlotlineConfig, settings: PlotlineSettings) -> PlotResult<Self> {
        settings.validate()?;

        let mut plotline = Self::with_library(config, settings.library);
        for origin in &settings.origins {
            let connector = origin.connector.build(&origin.name)?;
            plotline.register_origin(&origin.name, connector).await;
        }
        for graph in settings.graphs {
            plotline.add_graph(graph);
        }

        info!(
            "Loaded {} origins and {} graphs",
            settings.origins.len(),
            plotline.graphs.len()
        );
        Ok(plotline)
    }

    /// Builds an instance from the settings file named in `config`, if any.
    pub async fn from_config(config: PlotlineConfig) -> PlotResult<Self> {
        match config.settings_path.clone() {
            Some(path) => {
                let settings = PlotlineSettings::load(&path)?;
                Self::from_settings(config, settings).await
            }
            None => Ok(Self::new(config)),
        }
    }

    pub async fn register_origin(&self, name: &str, connector: Arc<dyn Connector>) {
        self.catalog.register_origin(name, connector).await;
    }

    pub fn add_graph(&mut self, graph: Graph) {
        self.graphs.insert(graph.id.clone(), graph);
    }

    /// Refreshes every origin once; returns how many succeeded.
    pub async fn refresh(&self) -> usize {
        self.catalog.refresh_all().await
    }

    pub fn start_refresh(&self) -> JoinHandle<()> {
        self.catalog
            .clone()
            .spawn_refresh_loop(self.config.refresh_interval())
    }

    pub fn graph(&self, id: &str) -> PlotResult<&Graph> {
        self.graphs
            .get(id)
            .ok_or_else(|| PlotError::NotFound(format!("graph `{}'", id)))
    }

    pub fn graphs(&self) -> impl Iterator<Item = &Graph> {
        self.graphs.values()
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn config(&self) -> &PlotlineConfig {
        &self.config
    }

    pub fn federator(&self) -> &Federator {
        &self.federator
    }

    fn request_graph<'a>(&'a self, request: &'a PlotRequest) -> PlotResult<Cow<'a, Graph>> {
        if let Some(graph) = &request.graph {
            return Ok(Cow::Borrowed(graph));
        }
        if let Some(graph) = request.metric_graph()? {
            return Ok(Cow::Owned(graph));
        }
        match &request.id {
            Some(id) => self.graph(id).map(Cow::Borrowed),
            None => Err(PlotError::InvalidArgument(
                "request names no graph".to_string(),
            )),
        }
    }

    pub async fn plots(&self, request: &PlotRequest) -> PlotResult<PlotResponse> {
        let graph = self.request_graph(request)?;
        let window = request.resolve_window(chrono::Utc::now(), self.config.default_sample)?;
        if window.sample > self.config.max_sample {
            return Err(PlotError::InvalidArgument(format!(
                "sample {} exceeds the configured maximum of {}",
                window.sample, self.config.max_sample
            )));
        }

        let plots = self.federator.plots(&graph, &window).await?;
        Ok(PlotResponse::new(&graph, plots))
    }

    pub async fn values(&self, request: &PlotRequest) -> PlotResult<FederatedValues> {
        let graph = self.request_graph(request)?;
        let ref_time = request.time.unwrap_or_else(chrono::Utc::now);

        self.federator
            .values(&graph, ref_time, &request.percentiles)
            .await
    }
}
