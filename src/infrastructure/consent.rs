//! Interactive OAuth consent over a loopback redirect.
//!
//! Binds an ephemeral port on 127.0.0.1, hands the consent URL to a
//! launcher (the system browser by default) and waits, bounded, for
//! Google to redirect back with `?code=..&state=..`.

use crate::infrastructure::error::InfraError;
use crate::infrastructure::oauth_client::build_authorization_url;
use async_trait::async_trait;
use base64::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, Clone)]
pub struct ConsentRequest {
    pub authorization_endpoint: String,
    pub client_id: String,
    pub scopes: Vec<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationGrant {
    pub code: String,
    pub redirect_uri: String,
}

#[async_trait]
pub trait AuthorizationPrompt: Send + Sync {
    async fn authorize(&self, request: ConsentRequest) -> Result<AuthorizationGrant, InfraError>;
}

pub type UrlLauncher = Arc<dyn Fn(&str) -> Result<(), InfraError> + Send + Sync>;

pub struct LoopbackAuthorizationPrompt {
    launcher: UrlLauncher,
}

impl Default for LoopbackAuthorizationPrompt {
    fn default() -> Self {
        Self::new(Arc::new(|url: &str| {
            open::that(url).map_err(InfraError::from)
        }))
    }
}

impl LoopbackAuthorizationPrompt {
    pub fn new(launcher: UrlLauncher) -> Self {
        Self { launcher }
    }
}

#[async_trait]
impl AuthorizationPrompt for LoopbackAuthorizationPrompt {
    async fn authorize(&self, request: ConsentRequest) -> Result<AuthorizationGrant, InfraError> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        let redirect_uri = format!("http://127.0.0.1:{port}/");
        let state = generate_csrf_state()?;

        let url = build_authorization_url(
            &request.authorization_endpoint,
            &request.client_id,
            &redirect_uri,
            &request.scopes,
            &state,
        )?;
        info!(%url, "opening browser for consent");
        if let Err(error) = (self.launcher)(&url) {
            warn!(%error, "could not open a browser; visit the consent URL manually");
        }

        let deadline = Instant::now() + request.timeout;
        let code = wait_for_callback(&listener, &state, deadline, request.timeout).await?;
        Ok(AuthorizationGrant { code, redirect_uri })
    }
}

fn generate_csrf_state() -> Result<String, InfraError> {
    let mut bytes = [0u8; 32];
    getrandom::getrandom(&mut bytes)
        .map_err(|error| InfraError::OAuth(format!("failed to generate random state: {error}")))?;
    Ok(BASE64_URL_SAFE_NO_PAD.encode(bytes))
}

/// How long one connection may stay silent before it is dropped, so an idle
/// preconnect from the browser cannot hold up the real redirect.
const CONNECTION_READ_TIMEOUT: Duration = Duration::from_secs(2);

enum CallbackOutcome {
    Code(String),
    Rejected(String),
    Ignored,
}

async fn wait_for_callback(
    listener: &TcpListener,
    expected_state: &str,
    deadline: Instant,
    budget: Duration,
) -> Result<String, InfraError> {
    loop {
        let accepted = timeout_at(deadline, listener.accept())
            .await
            .map_err(|_| InfraError::Timeout(budget.as_secs()))?;
        let (mut stream, _) = accepted?;

        let read_deadline = deadline.min(Instant::now() + CONNECTION_READ_TIMEOUT);
        let outcome = match timeout_at(read_deadline, read_request_target(&mut stream)).await {
            Ok(Ok(Some(target))) => evaluate_callback(&target, expected_state),
            Ok(Ok(None)) => CallbackOutcome::Ignored,
            Ok(Err(error)) => {
                warn!(%error, "failed to read oauth callback");
                CallbackOutcome::Ignored
            }
            Err(_) if Instant::now() >= deadline => {
                return Err(InfraError::Timeout(budget.as_secs()))
            }
            Err(_) => {
                debug!("dropping silent connection on the oauth callback port");
                continue;
            }
        };

        match outcome {
            CallbackOutcome::Code(code) => {
                send_html(&mut stream, "200 OK", "Connected", "You can close this tab.").await;
                return Ok(code);
            }
            CallbackOutcome::Rejected(message) => {
                send_html(&mut stream, "400 Bad Request", "Authorization failed", &message).await;
                return Err(InfraError::OAuth(message));
            }
            CallbackOutcome::Ignored => {
                send_html(&mut stream, "404 Not Found", "Not found", "Waiting for authorization.")
                    .await;
            }
        }
    }
}

async fn read_request_target(stream: &mut TcpStream) -> Result<Option<String>, InfraError> {
    let mut buf = [0u8; 8192];
    let size = stream.read(&mut buf).await?;
    if size == 0 {
        return Ok(None);
    }
    let request = String::from_utf8_lossy(&buf[..size]);
    let mut parts = request.lines().next().unwrap_or_default().split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("GET"), Some(target)) => Ok(Some(target.to_string())),
        _ => Ok(None),
    }
}

fn evaluate_callback(target: &str, expected_state: &str) -> CallbackOutcome {
    let Ok(url) = Url::parse(&format!("http://127.0.0.1{target}")) else {
        return CallbackOutcome::Ignored;
    };
    let params: HashMap<String, String> = url.query_pairs().into_owned().collect();

    if let Some(error) = params.get("error") {
        let detail = params.get("error_description").unwrap_or(error);
        return CallbackOutcome::Rejected(format!("consent denied: {detail}"));
    }
    let Some(code) = params.get("code").filter(|code| !code.trim().is_empty()) else {
        return CallbackOutcome::Ignored;
    };
    if params.get("state").map(String::as_str) != Some(expected_state) {
        return CallbackOutcome::Rejected("oauth state mismatch".to_string());
    }
    CallbackOutcome::Code(code.clone())
}

async fn send_html(stream: &mut TcpStream, status: &str, title: &str, message: &str) {
    let body = format!("<html><body><h2>{title}</h2><p>{message}</p></body></html>");
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    if let Err(error) = stream.write_all(response.as_bytes()).await {
        debug!(%error, "failed to write oauth callback response");
        return;
    }
    if let Err(error) = stream.flush().await {
        debug!(%error, "failed to flush oauth callback response");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn request(timeout: Duration) -> ConsentRequest {
        ConsentRequest {
            authorization_endpoint: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            client_id: "client-id".to_string(),
            scopes: vec!["https://www.googleapis.com/auth/tasks".to_string()],
            timeout,
        }
    }

    fn capturing_launcher() -> (UrlLauncher, Arc<Mutex<Option<String>>>) {
        let captured = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&captured);
        let launcher: UrlLauncher = Arc::new(move |url: &str| {
            *sink.lock().expect("launcher mutex poisoned") = Some(url.to_string());
            Ok(())
        });
        (launcher, captured)
    }

    async fn wait_for_url(captured: &Arc<Mutex<Option<String>>>) -> Url {
        loop {
            if let Some(url) = captured.lock().expect("launcher mutex poisoned").clone() {
                return Url::parse(&url).expect("consent url");
            }
            tokio::task::yield_now().await;
        }
    }

    async fn hit_callback(redirect_uri: &str, query: &str) {
        let redirect = Url::parse(redirect_uri).expect("redirect uri");
        let address = format!("127.0.0.1:{}", redirect.port().expect("port"));
        let mut stream = TcpStream::connect(address).await.expect("connect callback");
        let request = format!("GET /?{query} HTTP/1.1\r\nHost: 127.0.0.1\r\n\r\n");
        stream.write_all(request.as_bytes()).await.expect("write request");
        let mut response = Vec::new();
        let _ = stream.read_to_end(&mut response).await;
    }

    fn param(url: &Url, key: &str) -> String {
        url.query_pairs()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.into_owned())
            .expect("query param")
    }

    #[tokio::test]
    async fn callback_with_matching_state_yields_code() {
        let (launcher, captured) = capturing_launcher();
        let prompt = LoopbackAuthorizationPrompt::new(launcher);
        let flow = tokio::spawn(async move { prompt.authorize(request(Duration::from_secs(10))).await });

        let consent = wait_for_url(&captured).await;
        let redirect_uri = param(&consent, "redirect_uri");
        let state = param(&consent, "state");
        hit_callback(&redirect_uri, "favicon=1").await;
        hit_callback(&redirect_uri, &format!("code=the-code&state={state}")).await;

        let grant = flow.await.expect("join").expect("grant");
        assert_eq!(grant.code, "the-code");
        assert_eq!(grant.redirect_uri, redirect_uri);
    }

    #[tokio::test]
    async fn silent_preconnect_does_not_block_the_redirect() {
        let (launcher, captured) = capturing_launcher();
        let prompt = LoopbackAuthorizationPrompt::new(launcher);
        let flow = tokio::spawn(async move { prompt.authorize(request(Duration::from_secs(20))).await });

        let consent = wait_for_url(&captured).await;
        let redirect_uri = param(&consent, "redirect_uri");
        let state = param(&consent, "state");
        let port = Url::parse(&redirect_uri).expect("redirect uri").port().expect("port");
        let _idle = TcpStream::connect(format!("127.0.0.1:{port}"))
            .await
            .expect("preconnect");
        hit_callback(&redirect_uri, &format!("code=after-idle&state={state}")).await;

        let grant = tokio::time::timeout(Duration::from_secs(10), flow)
            .await
            .expect("redirect served before the consent deadline")
            .expect("join")
            .expect("grant");
        assert_eq!(grant.code, "after-idle");
    }

    #[tokio::test]
    async fn state_mismatch_is_rejected() {
        let (launcher, captured) = capturing_launcher();
        let prompt = LoopbackAuthorizationPrompt::new(launcher);
        let flow = tokio::spawn(async move { prompt.authorize(request(Duration::from_secs(10))).await });

        let consent = wait_for_url(&captured).await;
        hit_callback(&param(&consent, "redirect_uri"), "code=abc&state=forged").await;

        let error = flow.await.expect("join").expect_err("mismatch");
        assert!(matches!(error, InfraError::OAuth(_)));
    }

    #[tokio::test]
    async fn no_callback_times_out() {
        let (launcher, _captured) = capturing_launcher();
        let prompt = LoopbackAuthorizationPrompt::new(launcher);
        let error = prompt
            .authorize(request(Duration::from_millis(50)))
            .await
            .expect_err("timeout");
        assert!(matches!(error, InfraError::Timeout(_)));
    }
}
