use crate::domain::models::OAuthToken;
use crate::error::CoreError;
use crate::infrastructure::client_secret::ClientSecret;
use crate::infrastructure::clock::{system_now, NowProvider};
use crate::infrastructure::connectivity::ConnectivityProbe;
use crate::infrastructure::consent::{AuthorizationPrompt, ConsentRequest};
use crate::infrastructure::credential_store::CredentialStore;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::oauth_client::{
    ClientCredentials, OAuthHttpClient, TokenGrant, TokenResponse,
};
use async_trait::async_trait;
use chrono::Duration;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

const TOKEN_LEEWAY_SECONDS: i64 = 60;

#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub scopes: Vec<String>,
    pub token_endpoint: String,
    pub authorization_endpoint: String,
    pub auth_timeout: std::time::Duration,
}

impl OAuthConfig {
    pub fn from_client_secret(
        secret: &ClientSecret,
        scopes: Vec<String>,
        auth_timeout: std::time::Duration,
    ) -> Self {
        Self {
            client_id: secret.client_id.clone(),
            client_secret: secret.client_secret.clone(),
            scopes,
            token_endpoint: secret.token_endpoint.clone(),
            authorization_endpoint: secret.authorization_endpoint.clone(),
            auth_timeout,
        }
    }

    pub fn client_credentials(&self) -> ClientCredentials {
        ClientCredentials {
            token_endpoint: self.token_endpoint.clone(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialState {
    Unloaded,
    Loaded(OAuthToken),
    NeedsReauth,
}

/// Anything that can hand out a bearer token for the Tasks API.
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String, CoreError>;
}

struct CredentialSlot {
    state: CredentialState,
    last_failure: Option<CoreError>,
}

/// Owner of the process-wide OAuth credential.
///
/// Every attempt runs under one async mutex. A caller that queued behind
/// an attempt which then failed gets that attempt's error instead of
/// starting another refresh or consent flow of its own.
pub struct CredentialManager<S, C>
where
    S: CredentialStore,
    C: OAuthHttpClient,
{
    config: OAuthConfig,
    credential_store: Arc<S>,
    oauth_client: Arc<C>,
    prompt: Arc<dyn AuthorizationPrompt>,
    probe: Arc<dyn ConnectivityProbe>,
    slot: Mutex<CredentialSlot>,
    attempts: AtomicU64,
    now_provider: NowProvider,
}

impl<S, C> CredentialManager<S, C>
where
    S: CredentialStore,
    C: OAuthHttpClient,
{
    pub fn new(
        config: OAuthConfig,
        credential_store: Arc<S>,
        oauth_client: Arc<C>,
        prompt: Arc<dyn AuthorizationPrompt>,
        probe: Arc<dyn ConnectivityProbe>,
    ) -> Self {
        Self {
            config,
            credential_store,
            oauth_client,
            prompt,
            probe,
            slot: Mutex::new(CredentialSlot {
                state: CredentialState::Unloaded,
                last_failure: None,
            }),
            attempts: AtomicU64::new(0),
            now_provider: system_now(),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn is_token_valid(&self, token: &OAuthToken) -> bool {
        token.is_valid_at((self.now_provider)(), TOKEN_LEEWAY_SECONDS)
    }

    pub async fn state(&self) -> CredentialState {
        self.slot.lock().await.state.clone()
    }

    /// Returns a usable token, refreshing or re-authorizing as needed.
    pub async fn acquire(&self) -> Result<OAuthToken, CoreError> {
        let observed = self.attempts.load(Ordering::SeqCst);
        let mut slot = self.slot.lock().await;

        if self.attempts.load(Ordering::SeqCst) != observed {
            if let Some(error) = slot.last_failure.clone() {
                return Err(error);
            }
        }

        self.load_if_needed(&mut slot)?;
        if let CredentialState::Loaded(token) = &slot.state {
            if self.is_token_valid(token) {
                return Ok(token.clone());
            }
        }

        let outcome = self.renew(&mut slot).await;
        slot.last_failure = outcome.as_ref().err().cloned();
        self.attempts.fetch_add(1, Ordering::SeqCst);
        outcome
    }

    /// Skips any stored credential and runs the consent flow.
    pub async fn authorize_interactively(&self) -> Result<OAuthToken, CoreError> {
        let mut slot = self.slot.lock().await;
        let outcome = match self.ensure_online().await {
            Ok(()) => self.reauthorize(&mut slot).await,
            Err(error) => Err(error),
        };
        slot.last_failure = outcome.as_ref().err().cloned();
        self.attempts.fetch_add(1, Ordering::SeqCst);
        outcome
    }

    /// Stored credential, if any, without touching the network.
    pub async fn stored_token(&self) -> Result<Option<OAuthToken>, CoreError> {
        let mut slot = self.slot.lock().await;
        self.load_if_needed(&mut slot)?;
        Ok(match &slot.state {
            CredentialState::Loaded(token) => Some(token.clone()),
            _ => None,
        })
    }

    pub async fn sign_out(&self) -> Result<(), CoreError> {
        let mut slot = self.slot.lock().await;
        self.credential_store.delete_token().map_err(CoreError::auth)?;
        slot.state = CredentialState::NeedsReauth;
        slot.last_failure = None;
        info!("signed out; stored credential removed");
        Ok(())
    }

    fn load_if_needed(&self, slot: &mut CredentialSlot) -> Result<(), CoreError> {
        if slot.state == CredentialState::Unloaded {
            slot.state = match self.credential_store.load_token().map_err(CoreError::auth)? {
                Some(token) => CredentialState::Loaded(token),
                None => CredentialState::NeedsReauth,
            };
        }
        Ok(())
    }

    async fn renew(&self, slot: &mut CredentialSlot) -> Result<OAuthToken, CoreError> {
        self.ensure_online().await?;

        if let CredentialState::Loaded(stored) = slot.state.clone() {
            match stored.refresh_token.clone().filter(|_| stored.can_refresh()) {
                Some(refresh_token) => match self.refresh(refresh_token).await {
                    Ok(response) => {
                        let token = self.token_from_response(response, stored.refresh_token.clone());
                        self.credential_store.save_token(&token).map_err(CoreError::auth)?;
                        info!(expiry = %token.expiry, "access token refreshed");
                        slot.state = CredentialState::Loaded(token.clone());
                        return Ok(token);
                    }
                    Err(InfraError::OAuth(reason)) => {
                        warn!(%reason, "refresh rejected; discarding stored credential");
                        self.credential_store.delete_token().map_err(CoreError::auth)?;
                        slot.state = CredentialState::NeedsReauth;
                    }
                    Err(error) => {
                        warn!(%error, "refresh failed; keeping credential for the next attempt");
                        return Err(CoreError::auth(error));
                    }
                },
                None => {
                    info!("stored token expired without a refresh token");
                    slot.state = CredentialState::NeedsReauth;
                }
            }
        }

        self.reauthorize(slot).await
    }

    async fn ensure_online(&self) -> Result<(), CoreError> {
        if self.probe.is_online().await {
            Ok(())
        } else {
            Err(CoreError::Auth("no network connection available".to_string()))
        }
    }

    async fn refresh(&self, refresh_token: String) -> Result<TokenResponse, InfraError> {
        self.oauth_client
            .request_token(
                &self.config.client_credentials(),
                TokenGrant::RefreshToken(refresh_token),
            )
            .await
    }

    async fn reauthorize(&self, slot: &mut CredentialSlot) -> Result<OAuthToken, CoreError> {
        info!("starting interactive authorization");
        slot.state = CredentialState::NeedsReauth;

        let grant = self
            .prompt
            .authorize(ConsentRequest {
                authorization_endpoint: self.config.authorization_endpoint.clone(),
                client_id: self.config.client_id.clone(),
                scopes: self.config.scopes.clone(),
                timeout: self.config.auth_timeout,
            })
            .await
            .map_err(CoreError::auth)?;

        let response = self
            .oauth_client
            .request_token(
                &self.config.client_credentials(),
                TokenGrant::AuthorizationCode {
                    code: grant.code,
                    redirect_uri: grant.redirect_uri,
                },
            )
            .await
            .map_err(CoreError::auth)?;

        let token = self.token_from_response(response, None);
        self.credential_store.save_token(&token).map_err(CoreError::auth)?;
        info!(expiry = %token.expiry, "authorization granted");
        slot.state = CredentialState::Loaded(token.clone());
        Ok(token)
    }

    fn token_from_response(
        &self,
        response: TokenResponse,
        fallback_refresh_token: Option<String>,
    ) -> OAuthToken {
        let expiry = (self.now_provider)() + Duration::seconds(response.expires_in.max(0));
        let scopes = response
            .scope
            .map(|scope| scope.split_whitespace().map(str::to_string).collect::<Vec<_>>())
            .filter(|scopes| !scopes.is_empty())
            .unwrap_or_else(|| self.config.scopes.clone());
        OAuthToken {
            access_token: response.access_token,
            refresh_token: response.refresh_token.or(fallback_refresh_token),
            expiry,
            scopes,
            token_type: response.token_type.unwrap_or_else(|| "Bearer".to_string()),
        }
    }
}

#[async_trait]
impl<S, C> AccessTokenSource for CredentialManager<S, C>
where
    S: CredentialStore,
    C: OAuthHttpClient,
{
    async fn access_token(&self) -> Result<String, CoreError> {
        self.acquire().await.map(|token| token.access_token)
    }
}
