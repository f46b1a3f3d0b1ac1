// pydeps-net/src/http.rs
use std::time::Duration;

use pydeps_common::cache::CachedPage;
use pydeps_common::error::{PydepsError, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, RequestBuilder, StatusCode};
use tracing::debug;

use crate::netrc::Credentials;
use crate::validation::validate_url;

const REQUEST_TIMEOUT_SECS: u64 = 120;
const CONNECT_TIMEOUT_SECS: u64 = 30;
const USER_AGENT_STRING: &str = concat!(
    "pydeps/",
    env!("CARGO_PKG_VERSION"),
    " (Rust; python dependency resolver)"
);
/// JSON first, then HTML.
const SIMPLE_ACCEPT: &str = "application/vnd.pypi.simple.v1+json, \
     application/vnd.pypi.simple.v1+html;q=0.2, text/html;q=0.01";

/// Transport used by the registry client. Tests substitute an in-memory
/// implementation.
#[allow(async_fn_in_trait)]
pub trait IndexFetcher {
    /// Fetches a simple-index project page. A missing project is
    /// [`PydepsError::NotFound`].
    async fn fetch_page(&self, url: &str, credentials: Option<&Credentials>) -> Result<CachedPage>;

    async fn fetch_bytes(&self, url: &str, credentials: Option<&Credentials>) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        Ok(Self {
            client: build_http_client(timeout)?,
        })
    }

    async fn send(&self, request: RequestBuilder, url: &str) -> Result<reqwest::Response> {
        let response = request.send().await.map_err(|e| {
            debug!("HTTP request failed for {url}: {e}");
            PydepsError::RegistryFetch {
                url: url.to_string(),
                reason: e.to_string(),
            }
        })?;
        let status = response.status();
        debug!("Received HTTP status: {status} for {url}");
        match status {
            s if s.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(PydepsError::NotFound(url.to_string())),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(PydepsError::RegistryFetch {
                url: url.to_string(),
                reason: format!("access denied ({status}); check netrc credentials"),
            }),
            _ => Err(PydepsError::RegistryFetch {
                url: url.to_string(),
                reason: format!("HTTP error {status}"),
            }),
        }
    }
}

impl IndexFetcher for HttpFetcher {
    async fn fetch_page(&self, url: &str, credentials: Option<&Credentials>) -> Result<CachedPage> {
        validate_url(url)?;
        let request = with_auth(
            self.client
                .get(url)
                .header(ACCEPT, HeaderValue::from_static(SIMPLE_ACCEPT)),
            credentials,
        );
        let response = self.send(request, url).await?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.map_err(|e| PydepsError::RegistryFetch {
            url: url.to_string(),
            reason: format!("failed to read response body: {e}"),
        })?;
        Ok(CachedPage {
            url: url.to_string(),
            content_type,
            body,
        })
    }

    async fn fetch_bytes(&self, url: &str, credentials: Option<&Credentials>) -> Result<Vec<u8>> {
        validate_url(url)?;
        let request = with_auth(self.client.get(url), credentials);
        let response = self.send(request, url).await?;
        let bytes = response.bytes().await.map_err(|e| PydepsError::RegistryFetch {
            url: url.to_string(),
            reason: format!("failed to read response body bytes: {e}"),
        })?;
        debug!("Downloaded {} bytes from {url}", bytes.len());
        Ok(bytes.to_vec())
    }
}

fn with_auth(request: RequestBuilder, credentials: Option<&Credentials>) -> RequestBuilder {
    match credentials {
        Some(c) => request.basic_auth(&c.login, Some(&c.password)),
        None => request,
    }
}

pub fn build_http_client(timeout: Option<Duration>) -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_STRING));
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    Client::builder()
        .timeout(timeout.unwrap_or(Duration::from_secs(REQUEST_TIMEOUT_SECS)))
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .default_headers(headers)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(PydepsError::from)
}
