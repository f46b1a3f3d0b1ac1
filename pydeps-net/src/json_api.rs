// pydeps-net/src/json_api.rs
//! PyPI JSON API project documents (`/pypi/<name>/json`).

use std::collections::BTreeMap;

use pydeps_common::error::{PydepsError, Result};
use pydeps_common::model::artifact::Artifact;
use pydeps_common::model::requirement::canonicalize_name;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::simple::link_to_artifact;

#[derive(Debug, Deserialize)]
struct ProjectDocument {
    #[serde(default)]
    releases: BTreeMap<String, Vec<ReleaseFile>>,
}

#[derive(Debug, Deserialize)]
struct ReleaseFile {
    filename: String,
    url: String,
    #[serde(default)]
    digests: BTreeMap<String, String>,
    #[serde(default)]
    requires_python: Option<String>,
    #[serde(default)]
    yanked: bool,
}

/// Artifacts of every release listed in a JSON API document for `project`.
pub fn parse_json_api_page(body: &str, page_url: &str, project: &str) -> Result<Vec<Artifact>> {
    let base = Url::parse(page_url).map_err(|e| {
        PydepsError::ParseError("JSON API page", format!("bad page URL '{page_url}': {e}"))
    })?;
    let document: ProjectDocument = serde_json::from_str(body)?;
    let project = canonicalize_name(project);

    let mut artifacts = Vec::new();
    for (release, files) in document.releases {
        for file in files {
            let Some(mut artifact) = link_to_artifact(&base, &file.url, &file.filename) else {
                debug!("Skipping file {} of release {release}", file.filename);
                continue;
            };
            if artifact.name != project {
                debug!("Ignoring {} in the document for {project}", file.filename);
                continue;
            }
            if let Some(sha) = file.digests.get("sha256") {
                artifact.sha256 = Some(sha.to_ascii_lowercase());
            }
            artifact.requires_python = file.requires_python.filter(|v| !v.trim().is_empty());
            artifact.yanked = file.yanked;
            artifacts.push(artifact);
        }
    }
    Ok(artifacts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn releases_become_artifacts() {
        let body = r#"{
  "info": {"name": "Pkg_A", "version": "1.5"},
  "last_serial": 42,
  "releases": {
    "1.0": [
      {"filename": "pkg_a-1.0.tar.gz", "url": "https://files.example/pkg_a-1.0.tar.gz",
       "digests": {"md5": "x", "sha256": "ABCD"}, "requires_python": "", "yanked": true,
       "packagetype": "sdist"}
    ],
    "1.5": [
      {"filename": "pkg_a-1.5-py3-none-any.whl", "url": "https://files.example/pkg_a-1.5-py3-none-any.whl",
       "digests": {"sha256": "ef01"}, "requires_python": ">=3.8", "yanked": false,
       "packagetype": "bdist_wheel", "size": 10}
    ],
    "2.0": []
  },
  "urls": []
}"#;
        let artifacts =
            parse_json_api_page(body, "https://pypi.org/pypi/pkg-a/json", "PKG-A").unwrap();
        assert_eq!(artifacts.len(), 2);

        let sdist = &artifacts[0];
        assert!(sdist.is_sdist());
        assert!(sdist.yanked);
        assert_eq!(sdist.sha256.as_deref(), Some("abcd"));
        assert_eq!(sdist.requires_python, None);

        let wheel = &artifacts[1];
        assert!(wheel.is_wheel());
        assert_eq!(wheel.version.to_string(), "1.5");
        assert_eq!(wheel.requires_python.as_deref(), Some(">=3.8"));
    }

    #[test]
    fn truncated_documents_are_errors() {
        assert!(parse_json_api_page("{\"releases\": {", "https://pypi.org/pypi/a/json", "a").is_err());
    }
}
