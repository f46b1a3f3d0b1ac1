// pydeps-core/src/package_data.rs
//! Per-package entries of the output `packages` list.

use pydeps_common::dependency::ResolvedPackage;
use pydeps_common::error::Result;
use pydeps_common::model::artifact::{Artifact, DistributionKind};
use pydeps_common::model::PackageIdentity;
use pydeps_net::http::IndexFetcher;
use serde::Serialize;
use tracing::debug;

use crate::provider::PypiProvider;

const PYPI_BASE: &str = "https://pypi.org";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageData {
    #[serde(rename = "type")]
    pub package_type: &'static str,
    pub name: String,
    pub version: String,
    pub primary_language: &'static str,
    pub purl: String,
    pub filename: Option<String>,
    pub download_url: Option<String>,
    pub sha256: Option<String>,
    pub distribution: Option<&'static str>,
    pub requires_python: Option<String>,
    pub is_yanked: bool,
    pub repository_homepage_url: String,
    pub repository_download_url: Option<String>,
    pub api_data_url: String,
}

impl PackageData {
    pub fn new(identity: &PackageIdentity, artifact: Option<&Artifact>) -> Self {
        let name = identity.name.clone();
        let version = identity.version.to_string();
        Self {
            package_type: "pypi",
            purl: identity.purl(),
            filename: artifact.map(|a| a.filename.clone()),
            download_url: artifact.map(|a| a.url.clone()),
            sha256: artifact.and_then(|a| a.sha256.clone()),
            distribution: artifact.map(|a| match a.kind {
                DistributionKind::Sdist => "sdist",
                DistributionKind::Wheel => "wheel",
            }),
            requires_python: artifact.and_then(|a| a.requires_python.clone()),
            is_yanked: artifact.is_some_and(|a| a.yanked),
            repository_homepage_url: format!("{PYPI_BASE}/project/{name}/{version}"),
            repository_download_url: artifact.map(|a| {
                format!(
                    "{PYPI_BASE}/packages/source/{}/{name}/{}",
                    name.chars().next().unwrap_or('_'),
                    a.filename
                )
            }),
            api_data_url: format!("{PYPI_BASE}/pypi/{name}/{version}/json"),
            primary_language: "Python",
            name,
            version,
        }
    }
}

/// Supplies the enrichment data for a resolved package.
#[allow(async_fn_in_trait)]
pub trait PackageDataFetcher {
    async fn fetch_package_data(&self, package: &ResolvedPackage) -> Result<Vec<PackageData>>;
}

/// Describes the pinned artifact. With `prefer_source`, a published sdist of
/// the same release replaces a pinned wheel.
impl<F: IndexFetcher> PackageDataFetcher for PypiProvider<F> {
    async fn fetch_package_data(&self, package: &ResolvedPackage) -> Result<Vec<PackageData>> {
        let mut artifact = package.artifact.clone();
        let pinned_is_wheel = artifact.as_ref().map_or(true, Artifact::is_wheel);
        if self.context().prefer_source && pinned_is_wheel {
            let versions = self.versions(&package.identity.name).await;
            let sdist = versions
                .iter()
                .find(|v| v.version == package.identity.version)
                .and_then(|v| v.artifacts.iter().find(|a| a.is_sdist()))
                .cloned();
            if let Some(sdist) = sdist {
                debug!("Reporting sdist {} for {}", sdist.filename, package.identity);
                artifact = Some(sdist);
            }
        }
        Ok(vec![PackageData::new(&package.identity, artifact.as_ref())])
    }
}

#[cfg(test)]
mod tests {
    use pydeps_common::model::Version;

    use super::*;

    #[test]
    fn urls_and_checksums() {
        let identity = PackageIdentity::new("pkg-a", Version::parse("1.5").unwrap());
        let mut artifact = Artifact::from_filename(
            "pkg_a-1.5-py3-none-any.whl",
            "https://files.example/pkg_a-1.5-py3-none-any.whl",
        )
        .unwrap();
        artifact.sha256 = Some("ab".repeat(32));
        let data = PackageData::new(&identity, Some(&artifact));
        assert_eq!(data.purl, "pkg:pypi/pkg-a@1.5");
        assert_eq!(data.distribution, Some("wheel"));
        assert_eq!(data.api_data_url, "https://pypi.org/pypi/pkg-a/1.5/json");
        assert_eq!(
            data.repository_download_url.as_deref(),
            Some("https://pypi.org/packages/source/p/pkg-a/pkg_a-1.5-py3-none-any.whl")
        );
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["type"], "pypi");
        assert_eq!(json["download_url"], "https://files.example/pkg_a-1.5-py3-none-any.whl");

        let bare = PackageData::new(&identity, None);
        assert_eq!(bare.download_url, None);
        assert!(!bare.is_yanked);
    }
}
