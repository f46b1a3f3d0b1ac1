// pydeps-net/src/registry.rs
//! Version listings from simple-index or PyPI JSON API endpoints, backed by
//! the URL-keyed cache.

use futures::future::join_all;
use pydeps_common::cache::{Cache, CacheMode, CachedPage};
use pydeps_common::config::{Config, PYPI_JSON_API_URL};
use pydeps_common::error::{PydepsError, Result};
use pydeps_common::model::artifact::{group_by_version, Artifact, PackageVersion};
use pydeps_common::model::requirement::canonicalize_name;
use tracing::{debug, warn};
use url::Url;

use crate::http::IndexFetcher;
use crate::json_api::parse_json_api_page;
use crate::netrc::{Credentials, Netrc};
use crate::simple::parse_project_page;
use crate::validation::{verify_checksum, verify_content_type};

/// Protocol an endpoint speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    /// PEP 503 / PEP 691 simple repository.
    SimpleIndex,
    /// PyPI JSON API.
    JsonApi,
}

#[derive(Debug, Clone)]
pub struct IndexEndpoint {
    pub url: String,
    pub credentials: Option<Credentials>,
    pub kind: EndpointKind,
}

impl IndexEndpoint {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            credentials: None,
            kind: EndpointKind::SimpleIndex,
        }
    }

    pub fn json_api(url: &str) -> Self {
        Self {
            kind: EndpointKind::JsonApi,
            ..Self::new(url)
        }
    }

    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    /// `<index>/<canonical-name>/`, or `<base>/<canonical-name>/json` for
    /// the JSON API.
    pub fn project_url(&self, name: &str) -> String {
        match self.kind {
            EndpointKind::SimpleIndex => format!("{}/{}/", self.url, canonicalize_name(name)),
            EndpointKind::JsonApi => format!("{}/{}/json", self.url, canonicalize_name(name)),
        }
    }

    fn parse_listing(&self, page: &CachedPage, name: &str) -> Result<Vec<Artifact>> {
        match self.kind {
            EndpointKind::SimpleIndex => parse_project_page(page, name),
            EndpointKind::JsonApi => parse_json_api_page(&page.body, &page.url, name),
        }
    }

    fn host(&self) -> Option<String> {
        Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
    }
}

pub struct RegistryClient<F: IndexFetcher> {
    fetcher: F,
    endpoints: Vec<IndexEndpoint>,
    cache: Cache,
    cache_mode: CacheMode,
    merge_indexes: bool,
    ignore_errors: bool,
}

impl<F: IndexFetcher> RegistryClient<F> {
    pub fn new(fetcher: F, endpoints: Vec<IndexEndpoint>, cache: Cache, cache_mode: CacheMode) -> Self {
        Self {
            fetcher,
            endpoints,
            cache,
            cache_mode,
            merge_indexes: false,
            ignore_errors: false,
        }
    }

    /// Endpoints from `config.index_urls`, in order, without duplicates.
    /// Credentials are attached to every endpoint except the default public
    /// index. With `use_pypi_json_api` the JSON API is the only endpoint.
    pub fn from_config(fetcher: F, config: &Config, netrc: Option<&Netrc>) -> Result<Self> {
        let mut endpoints: Vec<IndexEndpoint> = Vec::new();
        if config.use_pypi_json_api {
            debug!("Listing versions from the PyPI JSON API");
            endpoints.push(IndexEndpoint::json_api(PYPI_JSON_API_URL));
        }
        let index_urls = config.index_urls.iter().filter(|_| !config.use_pypi_json_api);
        for raw in index_urls {
            let endpoint = IndexEndpoint::new(raw);
            if endpoints.iter().any(|e| e.url == endpoint.url) {
                continue;
            }
            let credentials = match netrc {
                Some(netrc) if !config.is_default_index(&endpoint.url) => {
                    netrc.credentials_for_url(&endpoint.url)
                }
                _ => None,
            };
            if credentials.is_some() {
                debug!("Using netrc credentials for {}", endpoint.url);
            }
            endpoints.push(endpoint.with_credentials(credentials));
        }
        let cache = Cache::new(config)?;
        Ok(Self {
            fetcher,
            endpoints,
            cache,
            cache_mode: CacheMode::from_flag(config.use_cached_index),
            merge_indexes: config.merge_indexes,
            ignore_errors: config.ignore_errors,
        })
    }

    pub fn with_merge_indexes(mut self, merge_indexes: bool) -> Self {
        self.merge_indexes = merge_indexes;
        self
    }

    pub fn with_ignore_errors(mut self, ignore_errors: bool) -> Self {
        self.ignore_errors = ignore_errors;
        self
    }

    pub fn endpoints(&self) -> &[IndexEndpoint] {
        &self.endpoints
    }

    /// Every published version of `name`, newest first. The first endpoint
    /// with artifacts wins unless indexes are merged. Endpoint failures are
    /// logged and contribute nothing.
    pub async fn list_versions(&self, name: &str) -> Vec<PackageVersion> {
        let mut artifacts: Vec<Artifact> = Vec::new();
        if self.merge_indexes {
            let listings = join_all(
                self.endpoints
                    .iter()
                    .map(|endpoint| self.fetch_listing(endpoint, name)),
            )
            .await;
            for (endpoint, listing) in self.endpoints.iter().zip(listings) {
                match listing {
                    Ok(found) => artifacts.extend(found),
                    Err(e) => self.report(&endpoint.url, &e),
                }
            }
            return group_by_version(artifacts);
        }
        for endpoint in &self.endpoints {
            match self.fetch_listing(endpoint, name).await {
                Ok(found) if found.is_empty() => {
                    debug!("No artifacts for {name} on {}", endpoint.url);
                }
                Ok(found) => {
                    debug!("{} artifacts for {name} on {}", found.len(), endpoint.url);
                    artifacts.extend(found);
                    break;
                }
                Err(e) => self.report(&endpoint.url, &e),
            }
        }
        group_by_version(artifacts)
    }

    async fn fetch_listing(&self, endpoint: &IndexEndpoint, name: &str) -> Result<Vec<Artifact>> {
        let url = endpoint.project_url(name);
        if self.cache_mode == CacheMode::UseCache {
            if let Some(page) = self.cache.load_page(&url) {
                match endpoint.parse_listing(&page, name) {
                    Ok(artifacts) => {
                        debug!("Using cached index page for {url}");
                        return Ok(artifacts);
                    }
                    Err(e) => warn!("Cached index page for {url} is unreadable ({e}); refetching"),
                }
            }
        }

        match self.fetcher.fetch_page(&url, endpoint.credentials.as_ref()).await {
            Ok(page) => {
                if let Err(e) = self.cache.store_page(&page) {
                    warn!("Failed to cache index page {url}: {e}");
                }
                endpoint.parse_listing(&page, name)
            }
            Err(PydepsError::NotFound(_)) => Ok(Vec::new()),
            Err(e) => match self
                .cache
                .load_page(&url)
                .map(|page| endpoint.parse_listing(&page, name))
            {
                Some(Ok(artifacts)) => {
                    warn!("Refresh of {url} failed ({e}); using the cached copy");
                    Ok(artifacts)
                }
                _ => Err(e),
            },
        }
    }

    fn report(&self, endpoint: &str, error: &PydepsError) {
        if self.ignore_errors {
            debug!("Ignoring failure from {endpoint}: {error}");
        } else {
            warn!("Failed to fetch from {endpoint}: {error}");
        }
    }

    fn credentials_for(&self, url: &str) -> Option<&Credentials> {
        let host = Url::parse(url).ok()?.host_str()?.to_string();
        self.endpoints
            .iter()
            .find(|e| e.credentials.is_some() && e.host().as_deref() == Some(host.as_str()))
            .and_then(|e| e.credentials.as_ref())
    }

    /// Artifact bytes, verified against the published sha256. Cached bytes
    /// that no longer verify are fetched again.
    pub async fn fetch_artifact(&self, artifact: &Artifact) -> Result<Vec<u8>> {
        if let Some(data) = self.cache.load_bytes(&artifact.url) {
            match &artifact.sha256 {
                Some(expected) if verify_checksum(&data, expected, &artifact.filename).is_err() => {
                    debug!("Cached {} fails verification; refetching", artifact.filename);
                }
                _ => return Ok(data),
            }
        }

        let data = self
            .fetcher
            .fetch_bytes(&artifact.url, self.credentials_for(&artifact.url))
            .await?;
        if let Some(expected) = &artifact.sha256 {
            verify_checksum(&data, expected, &artifact.filename)?;
        }
        verify_content_type(&data, &artifact.filename)?;
        if let Err(e) = self.cache.store_bytes(&artifact.url, &data) {
            warn!("Failed to cache {}: {e}", artifact.filename);
        }
        Ok(data)
    }

    /// The PEP 658 metadata file, when the index publishes one.
    pub async fn fetch_metadata(&self, artifact: &Artifact) -> Result<Option<String>> {
        if !artifact.has_metadata {
            return Ok(None);
        }
        let url = artifact.metadata_url();
        let data = match self.cache.load_bytes(&url) {
            Some(data) => data,
            None => {
                let data = self
                    .fetcher
                    .fetch_bytes(&url, self.credentials_for(&url))
                    .await?;
                if let Err(e) = self.cache.store_bytes(&url, &data) {
                    warn!("Failed to cache {url}: {e}");
                }
                data
            }
        };
        Ok(Some(String::from_utf8_lossy(&data).into_owned()))
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::BTreeMap;

    use super::*;

    /// Canned responses keyed by URL, with a request log.
    #[derive(Default)]
    struct CannedFetcher {
        pages: BTreeMap<String, std::result::Result<String, String>>,
        bytes: BTreeMap<String, Vec<u8>>,
        requests: RefCell<Vec<String>>,
    }

    impl IndexFetcher for CannedFetcher {
        async fn fetch_page(
            &self,
            url: &str,
            _credentials: Option<&Credentials>,
        ) -> Result<CachedPage> {
            self.requests.borrow_mut().push(url.to_string());
            match self.pages.get(url) {
                Some(Ok(body)) => Ok(CachedPage {
                    url: url.to_string(),
                    content_type: Some("text/html".to_string()),
                    body: body.clone(),
                }),
                Some(Err(reason)) => Err(PydepsError::RegistryFetch {
                    url: url.to_string(),
                    reason: reason.clone(),
                }),
                None => Err(PydepsError::NotFound(url.to_string())),
            }
        }

        async fn fetch_bytes(&self, url: &str, _credentials: Option<&Credentials>) -> Result<Vec<u8>> {
            self.requests.borrow_mut().push(url.to_string());
            self.bytes
                .get(url)
                .cloned()
                .ok_or_else(|| PydepsError::NotFound(url.to_string()))
        }
    }

    fn link(filename: &str) -> String {
        format!("<a href=\"https://files.example/{filename}\">{filename}</a>\n")
    }

    fn client(fetcher: CannedFetcher, dir: &std::path::Path, mode: CacheMode) -> RegistryClient<CannedFetcher> {
        RegistryClient::new(
            fetcher,
            vec![IndexEndpoint::new("https://one.example/simple/"), IndexEndpoint::new("https://two.example/simple")],
            Cache::at(dir).unwrap(),
            mode,
        )
    }

    #[tokio::test]
    async fn first_endpoint_with_data_wins() {
        let dir = tempfile::tempdir().unwrap();
        let mut fetcher = CannedFetcher::default();
        fetcher.pages.insert(
            "https://one.example/simple/pkg-a/".into(),
            Err("connection refused".into()),
        );
        fetcher.pages.insert(
            "https://two.example/simple/pkg-a/".into(),
            Ok(link("pkg_a-1.0.tar.gz") + &link("pkg_a-1.5-py3-none-any.whl")),
        );
        let registry = client(fetcher, dir.path(), CacheMode::Refresh);
        let versions = registry.list_versions("Pkg_A").await;
        let listed: Vec<String> = versions.iter().map(|v| v.version.to_string()).collect();
        assert_eq!(listed, vec!["1.5", "1.0"]);
    }

    #[tokio::test]
    async fn merge_combines_endpoints() {
        let dir = tempfile::tempdir().unwrap();
        let mut fetcher = CannedFetcher::default();
        fetcher
            .pages
            .insert("https://one.example/simple/pkg-a/".into(), Ok(link("pkg_a-1.0.tar.gz")));
        fetcher
            .pages
            .insert("https://two.example/simple/pkg-a/".into(), Ok(link("pkg_a-2.0.tar.gz")));

        let first_only = client(fetcher, dir.path(), CacheMode::Refresh);
        assert_eq!(first_only.list_versions("pkg-a").await.len(), 1);

        let merged = first_only.with_merge_indexes(true);
        assert_eq!(merged.list_versions("pkg-a").await.len(), 2);
    }

    #[tokio::test]
    async fn use_cache_skips_the_network_and_refresh_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let url = "https://one.example/simple/pkg-a/";
        let mut fetcher = CannedFetcher::default();
        fetcher.pages.insert(url.into(), Ok(link("pkg_a-1.0.tar.gz")));
        let warm = client(fetcher, dir.path(), CacheMode::Refresh);
        assert_eq!(warm.list_versions("pkg-a").await.len(), 1);

        // Same cache, but every endpoint now fails.
        let mut failing = CannedFetcher::default();
        failing.pages.insert(url.into(), Err("timeout".into()));
        let cached = client(failing, dir.path(), CacheMode::UseCache);
        assert_eq!(cached.list_versions("pkg-a").await.len(), 1);
        assert!(cached.fetcher.requests.borrow().is_empty());

        let mut failing = CannedFetcher::default();
        failing.pages.insert(url.into(), Err("timeout".into()));
        let refresh = client(failing, dir.path(), CacheMode::Refresh);
        assert_eq!(refresh.list_versions("pkg-a").await.len(), 1);
        assert_eq!(refresh.fetcher.requests.borrow().len(), 1);
    }

    #[tokio::test]
    async fn unreadable_cached_page_is_refetched() {
        let dir = tempfile::tempdir().unwrap();
        let url = "https://one.example/simple/pkg-a/";
        let cache = Cache::at(dir.path()).unwrap();
        cache
            .store_page(&CachedPage {
                url: url.to_string(),
                content_type: Some("application/vnd.pypi.simple.v1+json".to_string()),
                body: "{\"files\": [".to_string(),
            })
            .unwrap();

        let mut fetcher = CannedFetcher::default();
        fetcher.pages.insert(url.into(), Ok(link("pkg_a-1.0.tar.gz")));
        let registry = client(fetcher, dir.path(), CacheMode::UseCache);
        let versions = registry.list_versions("pkg-a").await;
        assert_eq!(versions.len(), 1);
        assert_eq!(registry.fetcher.requests.borrow().as_slice(), [url.to_string()]);

        // The live page replaced the broken entry.
        let stored = cache.load_page(url).unwrap();
        assert!(stored.body.contains("pkg_a-1.0.tar.gz"));
    }

    #[tokio::test]
    async fn json_api_endpoint_replaces_the_indexes() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::with_cache_dir(dir.path());
        config.index_urls = vec!["https://one.example/simple".to_string()];
        config.use_pypi_json_api = true;

        let url = "https://pypi.org/pypi/pkg-a/json";
        let mut fetcher = CannedFetcher::default();
        fetcher.pages.insert(
            url.into(),
            Ok(r#"{"releases": {"1.0": [{"filename": "pkg_a-1.0.tar.gz",
                "url": "https://files.example/pkg_a-1.0.tar.gz",
                "digests": {"sha256": "00"}, "yanked": false}]}}"#
                .to_string()),
        );
        let registry = RegistryClient::from_config(fetcher, &config, None).unwrap();
        assert_eq!(registry.endpoints().len(), 1);
        assert_eq!(registry.endpoints()[0].kind, EndpointKind::JsonApi);

        let versions = registry.list_versions("Pkg_A").await;
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].artifacts[0].sha256.as_deref(), Some("00"));
        assert_eq!(registry.fetcher.requests.borrow().as_slice(), [url.to_string()]);
    }

    #[tokio::test]
    async fn artifacts_are_verified() {
        let dir = tempfile::tempdir().unwrap();
        let zip_bytes = b"PK\x03\x04\x14\x00\x00\x00\x08\x00rest".to_vec();
        let mut artifact =
            Artifact::from_filename("pkg_a-1.0-py3-none-any.whl", "https://files.example/pkg_a-1.0-py3-none-any.whl")
                .unwrap();
        artifact.sha256 = Some(crate::validation::sha256_hex(&zip_bytes));

        let mut fetcher = CannedFetcher::default();
        fetcher.bytes.insert(artifact.url.clone(), zip_bytes.clone());
        let registry = client(fetcher, dir.path(), CacheMode::Refresh);
        assert_eq!(registry.fetch_artifact(&artifact).await.unwrap(), zip_bytes);
        // Second call is served from the cache.
        registry.fetch_artifact(&artifact).await.unwrap();
        assert_eq!(registry.fetcher.requests.borrow().len(), 1);

        let mut tampered = artifact.clone();
        tampered.url = "https://files.example/other.whl".to_string();
        tampered.sha256 = Some("00".repeat(32));
        let mut fetcher = CannedFetcher::default();
        fetcher.bytes.insert(tampered.url.clone(), zip_bytes);
        let registry = client(fetcher, dir.path(), CacheMode::Refresh);
        assert!(matches!(
            registry.fetch_artifact(&tampered).await,
            Err(PydepsError::ChecksumMismatch(_))
        ));
    }
}
