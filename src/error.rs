use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlotError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Backend conflict in group `{group}': {message}")]
    BackendConflict { group: String, message: String },

    #[error("Unresolved metric: {0}")]
    UnresolvedMetric(String),

    #[error("Connector `{connector}' failed: {message}")]
    ConnectorFailure { connector: String, message: String },

    #[error("Invalid time range `{0}'")]
    InvalidRange(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl PlotError {
    pub fn connector(connector: impl Into<String>, message: impl ToString) -> Self {
        PlotError::ConnectorFailure {
            connector: connector.into(),
            message: message.to_string(),
        }
    }
}

pub type PlotResult<T> = Result<T, PlotError>;
