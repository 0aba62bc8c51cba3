// deskboot-net/src/http.rs
use std::time::Duration;

use deskboot_common::error::{BootError, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::Client;
use tracing::{debug, error};

use crate::validation::validate_url;

const DOWNLOAD_TIMEOUT_SECS: u64 = 120;
const CONNECT_TIMEOUT_SECS: u64 = 30;
const USER_AGENT_STRING: &str = concat!("deskboot/", env!("CARGO_PKG_VERSION"), " (Rust)");

pub fn build_http_client() -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_STRING));
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    let client = Client::builder()
        .timeout(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .default_headers(headers)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .inspect_err(|e| error!("Failed to build HTTP client: {}", e))?;
    Ok(client)
}

/// Downloads a small text document such as an installer script. Only https is allowed.
pub async fn fetch_text(client: &Client, url: &str) -> Result<String> {
    validate_url(url)?;
    debug!("Fetching {}", url);

    let response = client
        .get(url)
        .send()
        .await
        .inspect_err(|e| error!("HTTP request failed for {}: {}", url, e))?;
    let status = response.status();
    debug!("Received HTTP status: {} for {}", status, url);

    if !status.is_success() {
        error!("HTTP error {} for URL {}", status, url);
        return Err(BootError::HttpError(format!("HTTP error {status} for URL {url}")));
    }

    let body = response
        .text()
        .await
        .inspect_err(|e| error!("Failed to read response body from {}: {}", url, e))?;
    debug!("Fetched {} bytes from {}", body.len(), url);
    Ok(body)
}
