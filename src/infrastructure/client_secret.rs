use crate::infrastructure::error::InfraError;
use serde::Deserialize;
use std::fs;
use std::path::Path;

pub const DEFAULT_AUTHORIZATION_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const DEFAULT_TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSecret {
    pub client_id: String,
    pub client_secret: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
}

#[derive(Debug, Deserialize)]
struct ClientSecretFile {
    installed: Option<ClientSecretSection>,
    web: Option<ClientSecretSection>,
}

#[derive(Debug, Deserialize)]
struct ClientSecretSection {
    client_id: String,
    client_secret: String,
    auth_uri: Option<String>,
    token_uri: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn parse_client_secret(raw: &str) -> Result<ClientSecret, InfraError> {
    let file: ClientSecretFile = serde_json::from_str(raw)?;
    let section = file.installed.or(file.web).ok_or_else(|| {
        InfraError::InvalidConfig("client secret has neither 'installed' nor 'web' section".to_string())
    })?;

    let client_id = section.client_id.trim().to_string();
    if client_id.is_empty() {
        return Err(InfraError::InvalidConfig("client_id must not be empty".to_string()));
    }

    Ok(ClientSecret {
        client_id,
        client_secret: section.client_secret.trim().to_string(),
        authorization_endpoint: non_empty(section.auth_uri)
            .unwrap_or_else(|| DEFAULT_AUTHORIZATION_ENDPOINT.to_string()),
        token_endpoint: non_empty(section.token_uri)
            .unwrap_or_else(|| DEFAULT_TOKEN_ENDPOINT.to_string()),
    })
}

pub fn load_client_secret(path: &Path) -> Result<ClientSecret, InfraError> {
    let raw = fs::read_to_string(path).map_err(|error| {
        InfraError::InvalidConfig(format!(
            "cannot read client secret {}: {error}",
            path.display()
        ))
    })?;
    parse_client_secret(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn installed_app_secret_is_parsed() {
        let secret = parse_client_secret(
            r#"{"installed": {
                "client_id": "id.apps.googleusercontent.com",
                "client_secret": "shh",
                "auth_uri": "https://accounts.google.com/o/oauth2/auth",
                "token_uri": "https://oauth2.googleapis.com/token",
                "redirect_uris": ["http://localhost"]
            }}"#,
        )
        .expect("parse secret");
        assert_eq!(secret.client_id, "id.apps.googleusercontent.com");
        assert_eq!(secret.authorization_endpoint, "https://accounts.google.com/o/oauth2/auth");
    }

    #[test]
    fn web_section_falls_back_to_default_endpoints() {
        let secret = parse_client_secret(r#"{"web": {"client_id": "id", "client_secret": "s"}}"#)
            .expect("parse secret");
        assert_eq!(secret.token_endpoint, DEFAULT_TOKEN_ENDPOINT);
        assert_eq!(secret.authorization_endpoint, DEFAULT_AUTHORIZATION_ENDPOINT);
    }

    #[test]
    fn missing_section_is_invalid() {
        assert!(matches!(
            parse_client_secret(r#"{"other": {}}"#),
            Err(InfraError::InvalidConfig(_))
        ));
    }
}
