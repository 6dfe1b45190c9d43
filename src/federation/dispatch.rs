use super::plan::Batch;
use crate::connector::Connector;
use crate::error::{PlotError, PlotResult};
use crate::query::Query;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

/// Runs `call` once per batch, concurrently, each bounded by `timeout`.
/// Results come back in batch order whatever the completion order was.
pub(crate) async fn dispatch<T, F, Fut>(
    batches: &[Batch],
    timeout: Duration,
    call: F,
) -> Vec<PlotResult<T>>
where
    T: Send + 'static,
    F: Fn(Arc<dyn Connector>, Query) -> Fut,
    Fut: Future<Output = PlotResult<T>> + Send + 'static,
{
    let mut tasks = JoinSet::new();

    for (index, batch) in batches.iter().enumerate() {
        let name = batch.connector.name().to_string();
        let call = call(batch.connector.clone(), batch.query.clone());

        debug!("Dispatching {} to connector {}", batch.query, name);
        tasks.spawn(async move {
            let result = match tokio::time::timeout(timeout, call).await {
                Ok(result) => result,
                Err(_) => Err(PlotError::connector(
                    name,
                    format!("timed out after {:?}", timeout),
                )),
            };
            (index, result)
        });
    }

    let mut slots: Vec<Option<PlotResult<T>>> = batches.iter().map(|_| None).collect();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, result)) => slots[index] = Some(result),
            Err(e) => error!("Connector task failed: {}", e),
        }
    }

    slots
        .into_iter()
        .zip(batches)
        .map(|(slot, batch)| {
            slot.unwrap_or_else(|| {
                Err(PlotError::connector(
                    batch.connector.name(),
                    "connector task aborted",
                ))
            })
        })
        .inspect(|result| {
            if let Err(e) = result {
                warn!("{}", e);
            }
        })
        .collect()
}
