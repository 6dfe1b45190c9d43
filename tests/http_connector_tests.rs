use axum::{http::StatusCode, response::Json, routing::{get, post}, Router};
use chrono::{DateTime, TimeZone, Utc};
use plotline::catalog::Catalog;
use plotline::connector::http::RemoteMetric;
use plotline::plot::{Plot, Series};
use plotline::{
    Connector, ConnectorSettings, DiagnosticKind, Federator, GroupLibrary, Graph, HttpConnector,
    MemoryConnector, OperGroup, OperatorType, PlotError, PlotWindow, Query, QueryMetric, SeriesRef,
    Stack,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

fn at(offset: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + offset, 0).unwrap()
}

async fn remote_plots(Json(query): Json<Query>) -> Json<Vec<Series>> {
    let series = query
        .group
        .series
        .iter()
        .map(|entry| {
            let plots = (0..60)
                .map(|i| {
                    let value = if i == 30 { f64::NAN } else { 2.0 };
                    Plot::new(query.start_time + chrono::Duration::seconds(i * 10), value)
                })
                .collect();
            Series::with_plots(entry.name.clone(), plots)
        })
        .collect();

    Json(series)
}

async fn remote_metrics() -> Json<Vec<RemoteMetric>> {
    Json(vec![
        RemoteMetric {
            source: "edge1".to_string(),
            metric: "requests".to_string(),
        },
        RemoteMetric {
            source: "edge2".to_string(),
            metric: "requests".to_string(),
        },
    ])
}

async fn broken() -> StatusCode {
    StatusCode::SERVICE_UNAVAILABLE
}

async fn spawn_stub(healthy: bool) -> SocketAddr {
    let app = if healthy {
        Router::new()
            .route("/plots", post(remote_plots))
            .route("/metrics", get(remote_metrics))
    } else {
        Router::new()
            .route("/plots", post(broken))
            .route("/metrics", get(remote_metrics))
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn connector(addr: SocketAddr) -> HttpConnector {
    HttpConnector::new("remote", format!("http://{}/", addr), Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_get_plots_round_trip() {
    let addr = spawn_stub(true).await;
    let connector = connector(addr);

    let mut query = Query::new(at(0), at(600), 60);
    query.add_series("s0", QueryMetric::new("remote", "edge1", "requests"));
    query.add_series("s1", QueryMetric::new("remote", "edge2", "requests"));

    let series = connector.get_plots(&query).await.unwrap();
    assert_eq!(series.len(), 2);
    assert_eq!(series[1].name, "s1");
    assert_eq!(series[0].len(), 60);
    assert!(series[0].plots[30].is_nan());
    assert_eq!(series[0].plots[0].time, at(0));
}

#[tokio::test]
async fn test_refresh_populates_catalog() {
    let addr = spawn_stub(true).await;
    let catalog = Catalog::new(1);
    catalog.register_origin("remote", Arc::new(connector(addr))).await;

    assert_eq!(catalog.refresh("remote").await.unwrap(), 2);
    let snapshot = catalog.snapshot().await;
    assert!(snapshot.get_metric("remote", "edge2", "requests").is_ok());
}

#[tokio::test]
async fn test_http_errors_become_connector_failures() {
    let addr = spawn_stub(false).await;
    let connector = connector(addr);

    let mut query = Query::new(at(0), at(600), 60);
    query.add_series("s0", QueryMetric::new("remote", "edge1", "requests"));

    let result = connector.get_plots(&query).await;
    assert!(matches!(result, Err(PlotError::ConnectorFailure { .. })));
}

#[tokio::test]
async fn test_unreachable_remote_fails_its_group_only() {
    // Nothing listens on a freshly released port
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };

    let catalog = Arc::new(Catalog::new(16));
    let local = Arc::new(MemoryConnector::new("local"));
    local.insert("db1", "cpu", at(0), 1.0).await;
    catalog.register_origin("local", local).await;
    catalog.refresh("local").await.unwrap();

    let remote = ConnectorSettings::Http {
        url: format!("http://{}", addr),
        timeout_seconds: 1,
    }
    .build("remote")
    .unwrap();
    catalog.register_origin("remote", remote).await;
    assert!(catalog.refresh("remote").await.is_err());

    let federator = Federator::new(catalog, Arc::new(GroupLibrary::default()), Duration::from_secs(5));
    let graph = Graph::new("g", "mixed").with_stack(
        Stack::new("s")
            .with_group(OperGroup::new("db", OperatorType::None).with_series(SeriesRef::new("db1", "local", "db1", "cpu")))
            .with_group(OperGroup::new("edge", OperatorType::Sum).with_series(SeriesRef::new("edge1", "remote", "edge1", "requests"))),
    );

    let result = federator.plots(&graph, &PlotWindow::new(at(0), at(600), 6)).await.unwrap();
    assert_eq!(result.find("db1").unwrap().plots[0].value, 1.0);
    let edge = result.group("edge").unwrap();
    assert!(edge.series.is_empty());
    assert_eq!(edge.diagnostics[0].kind, DiagnosticKind::UnresolvedMetric);
}

#[tokio::test]
async fn test_federation_over_http_origin() {
    let addr = spawn_stub(true).await;
    let catalog = Arc::new(Catalog::new(16));
    catalog.register_origin("remote", Arc::new(connector(addr))).await;
    catalog.refresh_all().await;

    let federator = Federator::new(catalog, Arc::new(GroupLibrary::default()), Duration::from_secs(5));
    let graph = Graph::new("g", "edge").with_stack(
        Stack::new("s").with_group(
            OperGroup::new("requests", OperatorType::Sum)
                .with_series(SeriesRef::new("e1", "remote", "edge1", "requests"))
                .with_series(SeriesRef::new("e2", "remote", "edge2", "requests")),
        ),
    );

    let result = federator.plots(&graph, &PlotWindow::new(at(0), at(600), 6)).await.unwrap();
    let requests = result.find("requests").unwrap();
    assert_eq!(requests.len(), 6);
    assert!(requests.plots.iter().all(|p| p.value == 4.0));
}
