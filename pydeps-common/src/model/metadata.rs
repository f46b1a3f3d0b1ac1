// pydeps-common/src/model/metadata.rs
//! Core metadata (`METADATA` / `PKG-INFO`) and egg-info `requires.txt`.

use serde::Serialize;
use tracing::warn;

use super::requirement::Requirement;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CoreMetadata {
    pub name: Option<String>,
    pub version: Option<String>,
    pub summary: Option<String>,
    pub home_page: Option<String>,
    pub license: Option<String>,
    pub author: Option<String>,
    pub requires_python: Option<String>,
    pub requires_dist: Vec<String>,
    pub provides_extra: Vec<String>,
}

impl CoreMetadata {
    /// Reads the RFC 822 style header block. Header names are case
    /// insensitive; indented lines continue the previous header; the first
    /// blank line starts the description body and ends parsing.
    pub fn parse(text: &str) -> Self {
        let mut headers: Vec<(String, String)> = Vec::new();
        for line in text.lines() {
            if line.trim().is_empty() {
                break;
            }
            if line.starts_with([' ', '\t']) {
                if let Some((_, value)) = headers.last_mut() {
                    value.push(' ');
                    value.push_str(line.trim());
                }
                continue;
            }
            if let Some((key, value)) = line.split_once(':') {
                headers.push((key.trim().to_ascii_lowercase(), value.trim().to_string()));
            }
        }

        let mut meta = Self::default();
        for (key, value) in headers {
            let single = if value.is_empty() || value == "UNKNOWN" {
                None
            } else {
                Some(value.clone())
            };
            match key.as_str() {
                "name" => meta.name = single,
                "version" => meta.version = single,
                "summary" => meta.summary = single,
                "home-page" => meta.home_page = single,
                "license" => meta.license = single,
                "author" => meta.author = single,
                "requires-python" => meta.requires_python = single,
                "requires-dist" if !value.is_empty() => meta.requires_dist.push(value),
                "provides-extra" if !value.is_empty() => meta.provides_extra.push(value),
                _ => {}
            }
        }
        meta
    }

    /// Parsed `Requires-Dist` entries. Malformed entries are dropped with a
    /// warning; they never fail the owning package.
    pub fn requirements(&self) -> Vec<Requirement> {
        parse_requirement_lines(self.requires_dist.iter().map(String::as_str))
    }
}

pub fn parse_requirement_lines<'a, I>(lines: I) -> Vec<Requirement>
where
    I: IntoIterator<Item = &'a str>,
{
    lines
        .into_iter()
        .filter_map(|line| match Requirement::parse(line) {
            Ok(req) => Some(req),
            Err(e) => {
                warn!("Skipping malformed requirement {line:?}: {e}");
                None
            }
        })
        .collect()
}

/// Converts an egg-info `requires.txt` into PEP 508 lines. Section headers
/// `[extra]`, `[extra:marker]` and `[:marker]` become markers on the lines
/// below them.
pub fn requires_txt_lines(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut section_marker: Option<String> = None;
    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(header) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            let (extra, marker) = match header.split_once(':') {
                Some((extra, marker)) => (extra.trim(), marker.trim()),
                None => (header.trim(), ""),
            };
            section_marker = match (extra.is_empty(), marker.is_empty()) {
                (true, true) => None,
                (true, false) => Some(marker.to_string()),
                (false, true) => Some(format!("extra == \"{extra}\"")),
                (false, false) => Some(format!("({marker}) and extra == \"{extra}\"")),
            };
            continue;
        }
        match &section_marker {
            Some(marker) => out.push(format!("{line}; {marker}")),
            None => out.push(line.to_string()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const METADATA: &str = "Metadata-Version: 2.1
Name: pkg-a
Version: 1.0
Summary: A package
License: UNKNOWN
Requires-Python: >=3.7
Requires-Dist: pkg-b (>=2.0)
Requires-Dist: pkg-c; extra == 'fast'
Requires-Dist: not a requirement !!
Provides-Extra: fast
Description: first line
        second line

Requires-Dist: body-is-ignored
";

    #[test]
    fn reads_headers() {
        let meta = CoreMetadata::parse(METADATA);
        assert_eq!(meta.name.as_deref(), Some("pkg-a"));
        assert_eq!(meta.version.as_deref(), Some("1.0"));
        assert_eq!(meta.license, None);
        assert_eq!(meta.requires_python.as_deref(), Some(">=3.7"));
        assert_eq!(meta.requires_dist.len(), 3);
        assert_eq!(meta.provides_extra, vec!["fast".to_string()]);

        let reqs = meta.requirements();
        assert_eq!(reqs.len(), 2);
        assert_eq!(reqs[0].name, "pkg-b");
        assert!(reqs[1].marker.is_some());
    }

    #[test]
    fn requires_txt_sections() {
        let text = "requests>=2\n\n[socks]\nPySocks!=1.5.7\n\n[:sys_platform == \"win32\"]\ncolorama\n\n[tests:python_version < \"3.8\"]\nmock\n";
        let lines = requires_txt_lines(text);
        assert_eq!(
            lines,
            vec![
                "requests>=2".to_string(),
                "PySocks!=1.5.7; extra == \"socks\"".to_string(),
                "colorama; sys_platform == \"win32\"".to_string(),
                "mock; (python_version < \"3.8\") and extra == \"tests\"".to_string(),
            ]
        );
        assert_eq!(parse_requirement_lines(lines.iter().map(String::as_str)).len(), 4);
    }
}
