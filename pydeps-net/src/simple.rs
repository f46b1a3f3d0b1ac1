// pydeps-net/src/simple.rs
//! Simple repository pages: PEP 503 HTML and PEP 691 JSON.

use once_cell::sync::Lazy;
use pydeps_common::cache::CachedPage;
use pydeps_common::error::{PydepsError, Result};
use pydeps_common::model::artifact::Artifact;
use pydeps_common::model::requirement::canonicalize_name;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

static ANCHOR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<a\s+([^>]*)>(.*?)</a\s*>").expect("anchor pattern is valid")
});

static ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([A-Za-z_:][-A-Za-z0-9_:.]*)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+)))?"#)
        .expect("attribute pattern is valid")
});

static ENTITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[A-Za-z]+);").expect("entity pattern is valid")
});

/// Extracts the artifacts of `project` from a fetched page. Links for other
/// projects and unrecognized filenames are skipped.
pub fn parse_project_page(page: &CachedPage, project: &str) -> Result<Vec<Artifact>> {
    let content_type = page
        .content_type
        .as_deref()
        .unwrap_or_default()
        .to_ascii_lowercase();
    let artifacts = if content_type.contains("json") {
        parse_json_page(&page.body, &page.url)?
    } else if content_type.contains("html") || page.body.trim_start().starts_with('<') {
        parse_html_page(&page.body, &page.url)?
    } else {
        return Err(PydepsError::ParseError(
            "index page",
            format!(
                "unsupported content type '{}' from {}",
                page.content_type.as_deref().unwrap_or("<none>"),
                page.url
            ),
        ));
    };

    let project = canonicalize_name(project);
    Ok(artifacts
        .into_iter()
        .filter(|a| {
            let keep = a.name == project;
            if !keep {
                debug!("Ignoring {} on the page for {project}", a.filename);
            }
            keep
        })
        .collect())
}

pub fn parse_html_page(body: &str, page_url: &str) -> Result<Vec<Artifact>> {
    let base = Url::parse(page_url).map_err(|e| {
        PydepsError::ParseError("index page", format!("bad page URL '{page_url}': {e}"))
    })?;
    let mut artifacts = Vec::new();
    for caps in ANCHOR_RE.captures_iter(body) {
        let mut href = None;
        let mut requires_python = None;
        let mut yanked = false;
        let mut has_metadata = false;
        for attr in ATTR_RE.captures_iter(&caps[1]) {
            let name = attr[1].to_ascii_lowercase();
            let value = attr
                .get(2)
                .or_else(|| attr.get(3))
                .or_else(|| attr.get(4))
                .map(|m| unescape_html(m.as_str()));
            match name.as_str() {
                "href" => href = value,
                "data-requires-python" => requires_python = value.filter(|v| !v.trim().is_empty()),
                "data-yanked" => yanked = true,
                "data-dist-info-metadata" | "data-core-metadata" => {
                    has_metadata = value.as_deref() != Some("false");
                }
                _ => {}
            }
        }
        let Some(href) = href else { continue };
        let text = unescape_html(caps[2].trim());
        match link_to_artifact(&base, &href, &text) {
            Some(mut artifact) => {
                artifact.requires_python = requires_python;
                artifact.yanked = yanked;
                artifact.has_metadata = has_metadata;
                artifacts.push(artifact);
            }
            None => debug!("Skipping link {href}"),
        }
    }
    Ok(artifacts)
}

#[derive(Debug, Deserialize)]
struct JsonPage {
    #[serde(default)]
    files: Vec<JsonFile>,
}

#[derive(Debug, Deserialize)]
struct JsonFile {
    filename: String,
    url: String,
    #[serde(default)]
    hashes: serde_json::Map<String, Value>,
    #[serde(default, rename = "requires-python")]
    requires_python: Option<String>,
    #[serde(default)]
    yanked: Value,
    #[serde(default, rename = "core-metadata")]
    core_metadata: Value,
    #[serde(default, rename = "dist-info-metadata")]
    dist_info_metadata: Value,
}

pub fn parse_json_page(body: &str, page_url: &str) -> Result<Vec<Artifact>> {
    let base = Url::parse(page_url).map_err(|e| {
        PydepsError::ParseError("index page", format!("bad page URL '{page_url}': {e}"))
    })?;
    let page: JsonPage = serde_json::from_str(body)?;
    let mut artifacts = Vec::new();
    for file in page.files {
        let Some(mut artifact) = link_to_artifact(&base, &file.url, &file.filename) else {
            debug!("Skipping file {}", file.filename);
            continue;
        };
        if let Some(Value::String(sha)) = file.hashes.get("sha256") {
            artifact.sha256 = Some(sha.to_ascii_lowercase());
        }
        artifact.requires_python = file.requires_python.filter(|v| !v.trim().is_empty());
        artifact.yanked = truthy(&file.yanked);
        artifact.has_metadata = truthy(&file.core_metadata) || truthy(&file.dist_info_metadata);
        artifacts.push(artifact);
    }
    Ok(artifacts)
}

/// PEP 691 uses `false`, a reason string, or a hash mapping.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(_) | Value::Object(_) => true,
        _ => false,
    }
}

pub(crate) fn link_to_artifact(base: &Url, href: &str, text: &str) -> Option<Artifact> {
    let mut url = base.join(href).ok()?;
    let sha256 = url.fragment().and_then(|fragment| {
        fragment
            .strip_prefix("sha256=")
            .map(str::to_ascii_lowercase)
    });
    url.set_fragment(None);

    let filename = if looks_like_distribution(text) {
        text.to_string()
    } else {
        let segment = url.path_segments()?.next_back()?.to_string();
        segment.replace("%2B", "+").replace("%2b", "+")
    };
    let mut artifact = Artifact::from_filename(&filename, url.as_str()).ok()?;
    artifact.sha256 = sha256;
    Some(artifact)
}

fn looks_like_distribution(text: &str) -> bool {
    !text.is_empty()
        && !text.contains(char::is_whitespace)
        && [".whl", ".tar.gz", ".zip", ".tgz", ".tar.bz2", ".tar.xz", ".tar"]
            .iter()
            .any(|ext| text.to_ascii_lowercase().ends_with(ext))
}

pub fn unescape_html(text: &str) -> String {
    ENTITY_RE
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let entity = &caps[1];
            let decoded = if let Some(hex) = entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = entity.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                match entity {
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "amp" => Some('&'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    _ => None,
                }
            };
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}
