use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

/// Registered application identity at a token endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    pub token_endpoint: String,
    pub client_id: String,
    pub client_secret: String,
}

/// What the client trades for an access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenGrant {
    AuthorizationCode { code: String, redirect_uri: String },
    RefreshToken(String),
}

impl TokenGrant {
    pub fn grant_type(&self) -> &'static str {
        match self {
            Self::AuthorizationCode { .. } => "authorization_code",
            Self::RefreshToken(_) => "refresh_token",
        }
    }

    fn form(self, client: &ClientCredentials) -> Vec<(&'static str, String)> {
        let mut form = vec![
            ("grant_type", self.grant_type().to_string()),
            ("client_id", client.client_id.clone()),
            ("client_secret", client.client_secret.clone()),
        ];
        match self {
            Self::AuthorizationCode { code, redirect_uri } => {
                form.push(("code", code));
                form.push(("redirect_uri", redirect_uri));
            }
            Self::RefreshToken(refresh_token) => form.push(("refresh_token", refresh_token)),
        }
        form
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: i64,
    pub token_type: Option<String>,
    pub scope: Option<String>,
}

/// Token endpoint calls.
///
/// A response the authorization server answered with an error is
/// `InfraError::OAuth`; anything that never got an answer is
/// `InfraError::Network`.
#[async_trait]
pub trait OAuthHttpClient: Send + Sync {
    async fn request_token(
        &self,
        client: &ClientCredentials,
        grant: TokenGrant,
    ) -> Result<TokenResponse, InfraError>;
}

/// Consent page URL asking for offline access, so the first code exchange
/// also yields a refresh token.
pub fn build_authorization_url(
    authorization_endpoint: &str,
    client_id: &str,
    redirect_uri: &str,
    scopes: &[String],
    state: &str,
) -> Result<String, InfraError> {
    if scopes.is_empty() {
        return Err(InfraError::OAuth("no scopes requested".to_string()));
    }
    if state.trim().is_empty() {
        return Err(InfraError::OAuth("csrf state is empty".to_string()));
    }

    let mut url = Url::parse(authorization_endpoint).map_err(|error| {
        InfraError::OAuth(format!("bad authorization endpoint '{authorization_endpoint}': {error}"))
    })?;
    url.query_pairs_mut().extend_pairs([
        ("response_type", "code"),
        ("client_id", client_id),
        ("redirect_uri", redirect_uri),
        ("scope", scopes.join(" ").as_str()),
        ("access_type", "offline"),
        ("prompt", "consent"),
        ("state", state),
    ]);
    Ok(url.into())
}

#[derive(Debug, Clone, Default)]
pub struct ReqwestOAuthClient {
    client: Client,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TokenEndpointReply {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    token_type: Option<String>,
    scope: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl TokenEndpointReply {
    fn into_response(self) -> Result<TokenResponse, InfraError> {
        let access_token = match self.access_token.as_deref().map(str::trim) {
            Some(value) if !value.is_empty() => value.to_string(),
            _ => return Err(InfraError::Network("token reply carried no access_token".to_string())),
        };
        Ok(TokenResponse {
            access_token,
            refresh_token: self.refresh_token.filter(|value| !value.trim().is_empty()),
            expires_in: self.expires_in.unwrap_or_default().max(0),
            token_type: self.token_type,
            scope: self.scope,
        })
    }
}

/// Only an OAuth `error` body or a 400/401 is a rejection of the grant.
/// Anything else that went wrong (throttling, a proxy page, a garbled
/// body) says nothing about the credential and stays transient.
fn interpret_reply(
    status: StatusCode,
    reply: Option<TokenEndpointReply>,
) -> Result<TokenResponse, InfraError> {
    match reply {
        Some(TokenEndpointReply {
            error: Some(code),
            error_description,
            ..
        }) => Err(InfraError::OAuth(format!(
            "{code}: {}",
            error_description.unwrap_or_default()
        ))),
        _ if matches!(status, StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED) => Err(
            InfraError::OAuth(format!("token endpoint answered http {}", status.as_u16())),
        ),
        Some(reply) if status.is_success() => reply.into_response(),
        _ => Err(InfraError::Network(format!(
            "unexpected token endpoint reply (http {})",
            status.as_u16()
        ))),
    }
}

impl ReqwestOAuthClient {
    pub fn new(timeout: Duration) -> Result<Self, InfraError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| InfraError::Network(format!("failed to build http client: {error}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl OAuthHttpClient for ReqwestOAuthClient {
    async fn request_token(
        &self,
        client: &ClientCredentials,
        grant: TokenGrant,
    ) -> Result<TokenResponse, InfraError> {
        let grant_type = grant.grant_type();
        let response = self
            .client
            .post(&client.token_endpoint)
            .form(&grant.form(client))
            .send()
            .await
            .map_err(|error| InfraError::from_reqwest(grant_type, error))?;

        let status = response.status();
        if status.is_server_error()
            || matches!(status, StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS)
        {
            return Err(InfraError::Network(format!(
                "{grant_type}: token endpoint unavailable (http {})",
                status.as_u16()
            )));
        }
        let body = response
            .bytes()
            .await
            .map_err(|error| InfraError::from_reqwest(grant_type, error))?;

        interpret_reply(status, serde_json::from_slice(&body).ok())
    }
}
