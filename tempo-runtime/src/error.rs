use thiserror::Error;

#[derive(Error, Debug)]
pub enum TempoError {
    /// A request-level rejection carrying the HTTP status it maps to.
    #[error("{detail}")]
    Rejection { status_code: u16, detail: String },

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Kafka error: {0}")]
    Kafka(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Analytics store error: {0}")]
    Olap(String),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl TempoError {
    pub fn rejection(status_code: u16, detail: impl Into<String>) -> Self {
        TempoError::Rejection {
            status_code,
            detail: detail.into(),
        }
    }

    /// HTTP status this error maps to. Infrastructure kinds surface as 500;
    /// handlers that want a degraded payload instead must catch them first.
    pub fn status_code(&self) -> u16 {
        match self {
            TempoError::Rejection { status_code, .. } => *status_code,
            _ => 500,
        }
    }

    pub fn detail(&self) -> String {
        match self {
            TempoError::Rejection { detail, .. } => detail.clone(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for TempoError {
    fn from(e: reqwest::Error) -> Self {
        TempoError::Rpc(e.to_string())
    }
}

impl From<serde_json::Error> for TempoError {
    fn from(e: serde_json::Error) -> Self {
        TempoError::Serialization(e.to_string())
    }
}

impl From<sqlx::Error> for TempoError {
    fn from(e: sqlx::Error) -> Self {
        TempoError::Database(e.to_string())
    }
}

impl From<prost::DecodeError> for TempoError {
    fn from(e: prost::DecodeError) -> Self {
        TempoError::Serialization(e.to_string())
    }
}
