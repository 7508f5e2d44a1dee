//! Request execution shared by the Calendar and Tasks clients.

use reqwest::RequestBuilder;
use reqwest::header::RETRY_AFTER;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::{ProviderError, ProviderResult};
use crate::retry::parse_retry_after;

/// Upper bound on pages followed for one listing.
pub(crate) const MAX_PAGES: usize = 100;

/// Sends the request and decodes a JSON body.
pub(crate) async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> ProviderResult<T> {
    let response = send(request).await?;
    let body = response.text().await.map_err(ProviderError::from_reqwest)?;
    serde_json::from_str(&body).map_err(|e| {
        ProviderError::invalid_response(format!("failed to parse response: {}", e)).with_source(e)
    })
}

/// Sends the request and discards the body.
pub(crate) async fn send_empty(request: RequestBuilder) -> ProviderResult<()> {
    send(request).await.map(|_| ())
}

async fn send(request: RequestBuilder) -> ProviderResult<reqwest::Response> {
    let response = request.send().await.map_err(ProviderError::from_reqwest)?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = parse_retry_after(response.headers().get(RETRY_AFTER));
    let body = response.text().await.unwrap_or_default();
    let error = ProviderError::from_status(status.as_u16(), &body, retry_after);
    warn!(status = status.as_u16(), error = %error, "API request failed");
    Err(error)
}
