use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatakitError {
    #[error("Kubernetes error: {0}")]
    KubernetesError(String),

    #[error("Failed to list {kind}: {message}")]
    ListFailed { kind: String, message: String },

    #[error("Invalid API server URL '{0}'")]
    InvalidUrl(String),

    #[error("Unusable credential file {path}: {message}")]
    CredentialError { path: String, message: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Event watch error: {0}")]
    WatchError(String),

    #[error("Autodiscovery error: {0}")]
    DiscoveryError(String),

    #[error("Input '{0}' is not registered")]
    InputNotFound(String),

    #[error("Invalid input configuration: {0}")]
    InputConfigError(String),

    #[error("Scrape of {url} failed: {message}")]
    ScrapeError { url: String, message: String },

    #[error("Feed error: {0}")]
    FeedError(String),

    #[error("Metrics error: {0}")]
    MetricsError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DatakitError>;
