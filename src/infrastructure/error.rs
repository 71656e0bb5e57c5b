use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Credential store error: {0}")]
    Credential(String),
    #[error("OAuth rejected: {0}")]
    OAuth(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Google Tasks API error: http {status}; {body}")]
    Api { status: u16, body: String },
    #[error("timed out after {0}s")]
    Timeout(u64),
    #[error("File watch error: {0}")]
    Watch(#[from] notify::Error),
}

impl InfraError {
    pub fn from_reqwest(context: &str, error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Network(format!("{context}: request timed out: {error}"))
        } else {
            Self::Network(format!("{context}: {error}"))
        }
    }
}
