use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use plotline::{
    catalog::CatalogSummary, FederatedValues, PlotError, PlotRequest, PlotResponse, Plotline,
    PlotlineConfig,
};
use serde::Serialize;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

type AppState = Arc<Plotline>;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    catalog_version: u64,
    origins: usize,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    info!("Starting plotline server");

    let config = PlotlineConfig::from_env();
    info!("Bind address: {}", config.bind_address);
    info!("Default sample: {}", config.default_sample);
    info!("Query timeout: {}s", config.query_timeout_seconds);

    let bind_address = config.bind_address.clone();
    let plotline = Plotline::from_config(config).await?;

    let refreshed = plotline.refresh().await;
    info!("Initial catalog refresh updated {} origins", refreshed);
    let _refresh = plotline.start_refresh();

    let app_state: AppState = Arc::new(plotline);

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/catalog", get(catalog))
        .route("/plots", post(plots))
        .route("/plots/values", post(values))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .into_inner(),
        )
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!("Server listening on {}", bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}

fn api_error(e: PlotError) -> ApiError {
    let status = match &e {
        PlotError::NotFound(_) => StatusCode::NOT_FOUND,
        PlotError::InvalidArgument(_)
        | PlotError::InvalidRange(_)
        | PlotError::UnresolvedMetric(_)
        | PlotError::BackendConflict { .. } => StatusCode::BAD_REQUEST,
        PlotError::ConnectorFailure { .. } | PlotError::Http(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        error!("Request failed: {}", e);
    } else {
        warn!("Request rejected: {}", e);
    }

    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let snapshot = state.catalog().snapshot().await;

    Json(HealthResponse {
        status: "healthy".to_string(),
        catalog_version: snapshot.version,
        origins: snapshot.origins().count(),
    })
}

async fn catalog(State(state): State<AppState>) -> Json<CatalogSummary> {
    let snapshot = state.catalog().snapshot().await;
    Json(CatalogSummary::from(snapshot.as_ref()))
}

async fn plots(
    State(state): State<AppState>,
    Json(request): Json<PlotRequest>,
) -> Result<Json<PlotResponse>, ApiError> {
    state.plots(&request).await.map(Json).map_err(api_error)
}

async fn values(
    State(state): State<AppState>,
    Json(request): Json<PlotRequest>,
) -> Result<Json<FederatedValues>, ApiError> {
    state.values(&request).await.map(Json).map_err(api_error)
}
