//! OAuth 2.0 PKCE flow for Google APIs.
//!
//! Authorization Code flow with PKCE (RFC 7636) and a loopback redirect, as
//! Google recommends for desktop applications.
//!
//! # Flow Overview
//!
//! 1. Generate a code verifier, its SHA-256 challenge and a random state
//! 2. Bind a local HTTP listener on the first free port of the configured range
//! 3. Open the user's browser on Google's consent page
//! 4. Google redirects to the listener with the authorization code
//! 5. Exchange the code (with the verifier) for access and refresh tokens

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng as _;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::auth::{Authorizer, RefreshedToken};
use crate::error::{ProviderError, ProviderResult};
use crate::provider::BoxFuture;

use super::config::OAuthCredentials;
use super::tokens::TokenInfo;

/// The PKCE code verifier length (in bytes, before base64 encoding).
const CODE_VERIFIER_LENGTH: usize = 32;

/// Timeout for waiting for the OAuth callback.
const CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

/// Browsers open speculative connections that never send a request.
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// OAuth client for Google APIs.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    credentials: OAuthCredentials,
    http_client: reqwest::Client,
    port_range: (u16, u16),
}

impl OAuthClient {
    /// Creates a new OAuth client.
    pub fn new(credentials: OAuthCredentials, http_client: reqwest::Client, port_range: (u16, u16)) -> Self {
        Self {
            credentials,
            http_client,
            port_range,
        }
    }

    /// Runs the interactive consent flow and returns the obtained tokens.
    ///
    /// # Errors
    ///
    /// Returns an error if no port is available, the user denies access, the
    /// callback times out, the state does not match, or the exchange fails.
    pub async fn authorize(&self, scopes: &[String]) -> ProviderResult<TokenInfo> {
        let pkce = PkceFlow::new();

        let (listener, port) = bind_loopback_server(self.port_range).await?;
        let redirect_uri = format!("http://127.0.0.1:{}/callback", port);

        let auth_url = pkce.build_auth_url(
            &self.credentials.auth_uri,
            &self.credentials.client_id,
            &redirect_uri,
            scopes,
        )?;

        info!("starting OAuth flow, opening browser");
        debug!(url = %auth_url, "authorization URL");

        if let Err(e) = open::that(&auth_url) {
            warn!(error = %e, "failed to open browser");
            eprintln!("\nPlease open this URL in your browser:\n\n{}\n", auth_url);
        }

        let (code, received_state) = wait_for_callback(listener, CALLBACK_TIMEOUT).await?;

        if received_state != pkce.state {
            return Err(ProviderError::authentication(
                "OAuth state mismatch - possible CSRF attack",
            ));
        }

        info!("received authorization code, exchanging for tokens");
        self.exchange_code(&code, &pkce.verifier, &redirect_uri, scopes)
            .await
    }

    /// Exchanges a refresh token for a new access token.
    pub async fn refresh_token(&self, refresh_token: &str) -> ProviderResult<RefreshedToken> {
        let params = [
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let response = self.post_token_request(&params, "token refresh").await?;
        info!("refreshed access token");
        Ok(RefreshedToken {
            access_token: response.access_token,
            expires_in: response.expires_in,
            refresh_token: response.refresh_token,
        })
    }

    /// Exchanges an authorization code for tokens.
    pub async fn exchange_code(
        &self,
        code: &str,
        verifier: &str,
        redirect_uri: &str,
        scopes: &[String],
    ) -> ProviderResult<TokenInfo> {
        let params = [
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("code", code),
            ("code_verifier", verifier),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri),
        ];

        let response = self.post_token_request(&params, "token exchange").await?;

        // Google reports the scopes actually granted; the user may untick some
        let granted = response
            .scope
            .as_deref()
            .map(|s| s.split_whitespace().map(String::from).collect())
            .unwrap_or_else(|| scopes.to_vec());

        info!("obtained tokens");
        Ok(TokenInfo::new(
            response.access_token,
            response.refresh_token,
            response.expires_in,
            granted,
        ))
    }

    async fn post_token_request(&self, params: &[(&str, &str)], what: &str) -> ProviderResult<TokenResponse> {
        let response = self
            .http_client
            .post(&self.credentials.token_uri)
            .form(params)
            .send()
            .await
            .map_err(ProviderError::from_reqwest)?;

        let status = response.status();
        let body = response.text().await.map_err(ProviderError::from_reqwest)?;

        if status.is_server_error() {
            return Err(ProviderError::server(format!("{} failed ({}): {}", what, status, body)));
        }
        if !status.is_success() {
            // invalid_grant and friends: the refresh token or code is dead
            return Err(ProviderError::authentication(format!(
                "{} failed ({}): {}",
                what, status, body
            )));
        }

        serde_json::from_str(&body)
            .map_err(|e| ProviderError::invalid_response(format!("invalid token response: {}", e)))
    }
}

impl Authorizer for OAuthClient {
    fn authorize<'a>(&'a self, scopes: &'a [String]) -> BoxFuture<'a, ProviderResult<TokenInfo>> {
        Box::pin(async move { OAuthClient::authorize(self, scopes).await })
    }

    fn refresh<'a>(&'a self, refresh_token: &'a str) -> BoxFuture<'a, ProviderResult<RefreshedToken>> {
        Box::pin(async move { self.refresh_token(refresh_token).await })
    }
}

/// Tries to bind a TCP listener on an available port in the given range.
async fn bind_loopback_server(port_range: (u16, u16)) -> ProviderResult<(TcpListener, u16)> {
    for port in port_range.0..=port_range.1 {
        if let Ok(listener) = TcpListener::bind(("127.0.0.1", port)).await {
            debug!(port, "bound loopback server");
            return Ok((listener, port));
        }
    }
    Err(ProviderError::configuration(format!(
        "no available port in range {}-{}",
        port_range.0, port_range.1
    )))
}

/// Waits for the OAuth callback and extracts the authorization code and state.
///
/// The listener is owned by this call, so its port is free again as soon as
/// the callback arrives, the timeout fires, or the flow is dropped.
async fn wait_for_callback(listener: TcpListener, timeout: Duration) -> ProviderResult<(String, String)> {
    match tokio::time::timeout(timeout, accept_callback(&listener)).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::authentication("OAuth callback timeout")),
    }
}

async fn accept_callback(listener: &TcpListener) -> ProviderResult<(String, String)> {
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                if let Some(result) = handle_callback(stream).await {
                    return result;
                }
            }
            Err(e) => error!(error = %e, "failed to accept connection"),
        }
    }
}

/// Handles one HTTP request on the callback server.
///
/// Returns `None` for requests that are not the OAuth redirect (favicon etc.).
async fn handle_callback(mut stream: TcpStream) -> Option<ProviderResult<(String, String)>> {
    let (reader, mut writer) = stream.split();
    let mut request_line = String::new();
    tokio::time::timeout(
        REQUEST_READ_TIMEOUT,
        BufReader::new(reader).read_line(&mut request_line),
    )
    .await
    .ok()?
    .ok()?;

    let result = parse_callback_request(&request_line)?;

    let response = if result.is_ok() {
        "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nConnection: close\r\n\r\n\
        <html><body><h1>Authorization successful</h1>\
        <p>You can close this window and return to the calendar widget.</p></body></html>"
    } else {
        "HTTP/1.1 400 Bad Request\r\nContent-Type: text/html; charset=utf-8\r\nConnection: close\r\n\r\n\
        <html><body><h1>Authorization failed</h1>\
        <p>You can close this window.</p></body></html>"
    };
    let _ = writer.write_all(response.as_bytes()).await;
    let _ = writer.flush().await;

    Some(result)
}

/// Parses the request line `GET /callback?code=...&state=... HTTP/1.1`.
fn parse_callback_request(request_line: &str) -> Option<ProviderResult<(String, String)>> {
    let mut parts = request_line.split_whitespace();
    if parts.next() != Some("GET") {
        return None;
    }
    let target = parts.next()?;
    let url = Url::parse(&format!("http://127.0.0.1{}", target)).ok()?;
    if url.path() != "/callback" && url.path() != "/" {
        return None;
    }

    let mut code = None;
    let mut state = None;
    let mut error = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        return Some(Err(ProviderError::authentication(format!(
            "authorization denied: {}",
            error
        ))));
    }

    match code {
        Some(code) => Some(Ok((code, state.unwrap_or_default()))),
        // a bare GET / is not the redirect
        None if url.query().is_none() => None,
        None => Some(Err(ProviderError::authentication(
            "missing authorization code in callback",
        ))),
    }
}

/// PKCE flow state.
#[derive(Debug)]
pub struct PkceFlow {
    /// The code verifier (high-entropy random string).
    pub verifier: String,
    /// The code challenge (SHA-256 hash of verifier, base64url encoded).
    pub challenge: String,
    /// Random state for CSRF protection.
    pub state: String,
}

impl PkceFlow {
    /// Creates a new PKCE flow with random verifier and state.
    pub fn new() -> Self {
        let verifier = random_token(CODE_VERIFIER_LENGTH);
        let challenge = Self::compute_challenge(&verifier);
        let state = random_token(16);

        Self {
            verifier,
            challenge,
            state,
        }
    }

    /// Computes the S256 challenge for a code verifier.
    pub fn compute_challenge(verifier: &str) -> String {
        let digest = Sha256::digest(verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(digest)
    }

    /// Builds the authorization URL.
    pub fn build_auth_url(
        &self,
        auth_uri: &str,
        client_id: &str,
        redirect_uri: &str,
        scopes: &[String],
    ) -> ProviderResult<String> {
        let mut url = Url::parse(auth_uri)
            .map_err(|e| ProviderError::configuration(format!("invalid auth_uri: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("client_id", client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &scopes.join(" "))
            .append_pair("code_challenge", &self.challenge)
            .append_pair("code_challenge_method", "S256")
            .append_pair("state", &self.state)
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent");
        Ok(url.into())
    }
}

impl Default for PkceFlow {
    fn default() -> Self {
        Self::new()
    }
}

fn random_token(len: usize) -> String {
    let mut rng = rand::rng();
    let bytes: Vec<u8> = (0..len).map(|_| rng.random()).collect();
    URL_SAFE_NO_PAD.encode(&bytes)
}

/// Response from the token endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::google::config::GOOGLE_AUTH_URL;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> OAuthClient {
        let credentials = OAuthCredentials::new("client.apps.googleusercontent.com", "secret")
            .with_token_uri(format!("{}/token", server.uri()));
        OAuthClient::new(credentials, reqwest::Client::new(), (8085, 8095))
    }

    #[test]
    fn pkce_verifier_length() {
        let flow = PkceFlow::new();
        // Base64 encoding of 32 bytes = 43 characters (no padding)
        assert_eq!(flow.verifier.len(), 43);
    }

    #[test]
    fn pkce_challenge_matches_rfc_example() {
        // RFC 7636 appendix B
        let challenge = PkceFlow::compute_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk");
        assert_eq!(challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
    }

    #[test]
    fn pkce_values_are_random() {
        let flow1 = PkceFlow::new();
        let flow2 = PkceFlow::new();
        assert_ne!(flow1.challenge, flow2.challenge);
        assert_ne!(flow1.state, flow2.state);
    }

    #[test]
    fn auth_url_format() {
        let flow = PkceFlow::new();
        let url = flow
            .build_auth_url(
                GOOGLE_AUTH_URL,
                "test-client.apps.googleusercontent.com",
                "http://127.0.0.1:8085/callback",
                &[
                    "https://www.googleapis.com/auth/calendar.readonly".to_string(),
                    "https://www.googleapis.com/auth/tasks".to_string(),
                ],
            )
            .unwrap();

        assert!(url.starts_with(GOOGLE_AUTH_URL));
        let parsed = Url::parse(&url).unwrap();
        let pairs: std::collections::HashMap<_, _> = parsed.query_pairs().into_owned().collect();
        assert_eq!(pairs["client_id"], "test-client.apps.googleusercontent.com");
        assert_eq!(pairs["redirect_uri"], "http://127.0.0.1:8085/callback");
        assert_eq!(pairs["code_challenge"], flow.challenge);
        assert_eq!(pairs["code_challenge_method"], "S256");
        assert_eq!(pairs["state"], flow.state);
        assert_eq!(pairs["access_type"], "offline");
        assert_eq!(
            pairs["scope"],
            "https://www.googleapis.com/auth/calendar.readonly https://www.googleapis.com/auth/tasks"
        );
    }

    #[test]
    fn callback_parsing() {
        let ok = parse_callback_request("GET /callback?code=4%2F0Ab&state=xyz HTTP/1.1\r\n");
        let (code, state) = ok.unwrap().unwrap();
        assert_eq!(code, "4/0Ab");
        assert_eq!(state, "xyz");

        let root = parse_callback_request("GET /?code=abc&state=s HTTP/1.1\r\n");
        assert_eq!(root.unwrap().unwrap().0, "abc");

        let denied = parse_callback_request("GET /callback?error=access_denied HTTP/1.1\r\n");
        assert!(denied.unwrap().unwrap_err().message().contains("access_denied"));

        assert!(parse_callback_request("GET /favicon.ico HTTP/1.1\r\n").is_none());
        assert!(parse_callback_request("GET / HTTP/1.1\r\n").is_none());
        assert!(parse_callback_request("POST /callback?code=a HTTP/1.1\r\n").is_none());
    }

    fn free_port() -> u16 {
        std::net::TcpListener::bind(("127.0.0.1", 0))
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    #[tokio::test]
    async fn callback_timeout_releases_port() {
        let port = free_port();
        let (listener, bound) = bind_loopback_server((port, port)).await.unwrap();
        assert_eq!(bound, port);

        let err = wait_for_callback(listener, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert_eq!(err.message(), "OAuth callback timeout");

        let (_listener, again) = bind_loopback_server((port, port)).await.unwrap();
        assert_eq!(again, port);
    }

    #[tokio::test]
    async fn callback_skips_unrelated_requests() {
        let port = free_port();
        let (listener, _) = bind_loopback_server((port, port)).await.unwrap();
        let waiting = tokio::spawn(wait_for_callback(listener, Duration::from_secs(5)));

        let mut favicon = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        favicon.write_all(b"GET /favicon.ico HTTP/1.1\r\n\r\n").await.unwrap();
        drop(favicon);

        let mut browser = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        browser
            .write_all(b"GET /callback?code=4%2F0Ab&state=xyz HTTP/1.1\r\n\r\n")
            .await
            .unwrap();
        let mut page = String::new();
        tokio::io::AsyncReadExt::read_to_string(&mut browser, &mut page)
            .await
            .unwrap();
        assert!(page.starts_with("HTTP/1.1 200 OK"));

        let (code, state) = waiting.await.unwrap().unwrap();
        assert_eq!(code, "4/0Ab");
        assert_eq!(state, "xyz");
        TcpListener::bind(("127.0.0.1", port)).await.unwrap();
    }

    #[tokio::test]
    async fn exchange_code_records_granted_scopes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code_verifier=verifier"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.token",
                "refresh_token": "1//refresh",
                "expires_in": 3599,
                "scope": "https://www.googleapis.com/auth/calendar.readonly",
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let requested = vec![
            "https://www.googleapis.com/auth/calendar.readonly".to_string(),
            "https://www.googleapis.com/auth/tasks".to_string(),
        ];
        let tokens = client_for(&server)
            .exchange_code("code", "verifier", "http://127.0.0.1:8085/callback", &requested)
            .await
            .unwrap();

        assert_eq!(tokens.access_token, "ya29.token");
        assert_eq!(tokens.refresh_token.as_deref(), Some("1//refresh"));
        assert!(!tokens.is_expired());
        assert!(!tokens.has_scopes(&requested));
    }

    #[tokio::test]
    async fn refresh_token_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.new",
                "expires_in": 3599
            })))
            .mount(&server)
            .await;

        let refreshed = client_for(&server).refresh_token("1//refresh").await.unwrap();
        assert_eq!(refreshed.access_token, "ya29.new");
        assert_eq!(refreshed.expires_in, Some(3599));
        assert!(refreshed.refresh_token.is_none());
    }

    #[tokio::test]
    async fn refresh_token_revoked_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Token has been expired or revoked."
            })))
            .mount(&server)
            .await;

        let err = client_for(&server).refresh_token("1//dead").await.unwrap_err();
        assert_eq!(err.code(), crate::error::ProviderErrorCode::AuthenticationFailed);
    }

    #[tokio::test]
    async fn refresh_token_server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client_for(&server).refresh_token("1//refresh").await.unwrap_err();
        assert!(err.is_retryable());
    }
}
