use super::Connector;
use crate::catalog::CatalogRecord;
use crate::error::{PlotError, PlotResult};
use crate::plot::Series;
use crate::query::Query;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Entry of the remote `/metrics` listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteMetric {
    pub source: String,
    pub metric: String,
}

/// Plot source reachable over JSON/HTTP.
pub struct HttpConnector {
    name: String,
    base_url: String,
    client: reqwest::Client,
}

impl HttpConnector {
    pub fn new(name: impl Into<String>, url: impl Into<String>, timeout: Duration) -> PlotResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let base_url = url.into().trim_end_matches('/').to_string();

        Ok(Self {
            name: name.into(),
            base_url,
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn check_status(&self, response: reqwest::Response) -> PlotResult<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        error!("Connector {} got HTTP {}: {}", self.name, status, body);
        Err(PlotError::connector(
            self.name.clone(),
            format!("HTTP error: {}", status),
        ))
    }
}

#[async_trait]
impl Connector for HttpConnector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_plots(&self, query: &Query) -> PlotResult<Vec<Series>> {
        let url = format!("{}/plots", self.base_url);
        debug!("Connector {} posting {} to {}", self.name, query, url);

        let response = self
            .client
            .post(&url)
            .json(query)
            .send()
            .await
            .map_err(|e| PlotError::connector(self.name.clone(), format!("Network error: {}", e)))?;

        let response = self.check_status(response).await?;
        response.json::<Vec<Series>>().await.map_err(|e| {
            PlotError::connector(self.name.clone(), format!("Failed to parse response: {}", e))
        })
    }

    async fn refresh(&self, origin: &str, output: mpsc::Sender<CatalogRecord>) -> PlotResult<()> {
        let url = format!("{}/metrics", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| PlotError::connector(self.name.clone(), format!("Network error: {}", e)))?;

        let metrics = self
            .check_status(response)
            .await?
            .json::<Vec<RemoteMetric>>()
            .await
            .map_err(|e| {
                PlotError::connector(self.name.clone(), format!("Failed to parse response: {}", e))
            })?;

        info!(
            "Connector {} discovered {} metrics for origin {}",
            self.name,
            metrics.len(),
            origin
        );

        for metric in metrics {
            output
                .send(CatalogRecord::new(origin, metric.source, metric.metric))
                .await
                .map_err(|e| PlotError::connector(self.name.clone(), e))?;
        }

        Ok(())
    }
}
