use thiserror::Error;

#[derive(Error, Debug)]
pub enum PhishError {
    #[error("Database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("API Error: {0}")]
    Api(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Invalid URL {0}")]
    InvalidUrl(String),

    #[error("Scheduler is no longer running")]
    SchedulerClosed,
}
