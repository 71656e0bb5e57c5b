use crate::infrastructure::error::InfraError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("authorization unavailable: {0}")]
    Auth(String),
    #[error("authorization was not completed within {seconds}s")]
    AuthTimeout { seconds: u64 },
    #[error("sync failed: {0}")]
    Sync(String),
    #[error(
        "sync failed after creating {} of {requested} tasks: {reason}",
        .created_ids.len()
    )]
    SyncPartial {
        created_ids: Vec<String>,
        requested: usize,
        reason: String,
    },
}

impl CoreError {
    pub fn auth(error: InfraError) -> Self {
        match error {
            InfraError::Timeout(seconds) => Self::AuthTimeout { seconds },
            other => Self::Auth(other.to_string()),
        }
    }

    pub fn sync(error: InfraError) -> Self {
        Self::Sync(error.to_string())
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_) | Self::AuthTimeout { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::Auth(_) => "auth",
            Self::AuthTimeout { .. } => "auth_timeout",
            Self::Sync(_) => "sync",
            Self::SyncPartial { .. } => "sync_partial",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_creation_reports_created_count() {
        let error = CoreError::SyncPartial {
            created_ids: vec!["a".to_string(), "b".to_string()],
            requested: 5,
            reason: "http 503".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "sync failed after creating 2 of 5 tasks: http 503"
        );
    }

    #[test]
    fn consent_timeout_maps_to_auth_timeout() {
        assert_eq!(
            CoreError::auth(InfraError::Timeout(60)),
            CoreError::AuthTimeout { seconds: 60 }
        );
        assert!(CoreError::auth(InfraError::Network("offline".to_string())).is_auth());
    }
}
