// pydeps-core/src/manifest/requirements.rs
//! pip requirement files.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use pydeps_common::error::{PydepsError, Result};
use pydeps_common::model::Requirement;
use serde_json::Value;
use tracing::debug;

use super::{DependentPackage, ManifestPackageData};

/// Requirements and index options collected from a file and everything it
/// includes with `-r`.
#[derive(Debug, Clone, Default)]
pub struct RequirementsFile {
    pub path: PathBuf,
    pub requirements: Vec<Requirement>,
    pub index_url: Option<String>,
    pub extra_index_urls: Vec<String>,
    /// Lines that were recognized but not resolved: editables, bare URLs,
    /// local paths, constraint files.
    pub skipped: Vec<String>,
}

impl RequirementsFile {
    /// `--index-url` first, then every `--extra-index-url`.
    pub fn index_urls(&self) -> Vec<String> {
        self.index_url
            .iter()
            .chain(self.extra_index_urls.iter())
            .cloned()
            .collect()
    }

    pub fn package_data(&self) -> ManifestPackageData {
        let mut data = ManifestPackageData::new("pip_requirements");
        if let Some(index_url) = &self.index_url {
            data.extra_data
                .insert("index_url".to_string(), Value::String(index_url.clone()));
        }
        if !self.extra_index_urls.is_empty() {
            data.extra_data.insert(
                "extra_index_urls".to_string(),
                Value::from(self.extra_index_urls.clone()),
            );
        }
        data.dependencies = self
            .requirements
            .iter()
            .map(|r| DependentPackage::from_requirement(r, "install"))
            .collect();
        data
    }
}

pub fn parse_requirements_file(path: &Path) -> Result<RequirementsFile> {
    let mut parsed = RequirementsFile {
        path: path.to_path_buf(),
        ..RequirementsFile::default()
    };
    let mut visited = BTreeSet::new();
    read_into(path, &mut parsed, &mut visited)?;
    debug!(
        "{}: {} requirement(s), {} skipped line(s)",
        path.display(),
        parsed.requirements.len(),
        parsed.skipped.len()
    );
    Ok(parsed)
}

fn read_into(path: &Path, parsed: &mut RequirementsFile, visited: &mut BTreeSet<PathBuf>) -> Result<()> {
    let key = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    if !visited.insert(key) {
        debug!("Already read {}; skipping include", path.display());
        return Ok(());
    }
    let text = fs::read_to_string(path).map_err(|e| {
        PydepsError::Config(format!("Failed to read requirements file {}: {e}", path.display()))
    })?;
    let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();

    for line in logical_lines(&text) {
        match classify_line(&line) {
            Line::Requirement(text) => parsed.requirements.push(Requirement::parse(&text)?),
            Line::Include(target) => read_into(&base_dir.join(target), parsed, visited)?,
            Line::IndexUrl(url) => parsed.index_url = Some(url),
            Line::ExtraIndexUrl(url) => {
                if !parsed.extra_index_urls.contains(&url) {
                    parsed.extra_index_urls.push(url);
                }
            }
            Line::Skipped => parsed.skipped.push(line),
            Line::Ignored => {}
        }
    }
    Ok(())
}

/// Joins `\` continuations and strips comments.
fn logical_lines(text: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for raw in text.lines() {
        let stripped = strip_comment(raw);
        match stripped.strip_suffix('\\') {
            Some(head) => {
                current.push_str(head);
                current.push(' ');
            }
            None => {
                current.push_str(stripped);
                let line = current.trim().to_string();
                if !line.is_empty() {
                    lines.push(line);
                }
                current.clear();
            }
        }
    }
    let tail = current.trim();
    if !tail.is_empty() {
        lines.push(tail.to_string());
    }
    lines
}

/// A `#` starts a comment at the beginning of a line or after whitespace.
fn strip_comment(line: &str) -> &str {
    let bytes = line.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        if *b == b'#' && (i == 0 || bytes[i - 1].is_ascii_whitespace()) {
            return line[..i].trim_end();
        }
    }
    line.trim_end()
}

#[derive(Debug, PartialEq, Eq)]
enum Line {
    Requirement(String),
    Include(String),
    IndexUrl(String),
    ExtraIndexUrl(String),
    Skipped,
    Ignored,
}

/// Value of `-x VALUE`, `-xVALUE`, `--opt VALUE` or `--opt=VALUE`.
fn option_value<'a>(line: &'a str, names: &[&str]) -> Option<&'a str> {
    for name in names {
        let Some(rest) = line.strip_prefix(name) else {
            continue;
        };
        let value = if let Some(v) = rest.strip_prefix('=') {
            v
        } else if rest.starts_with(char::is_whitespace) {
            rest
        } else if !name.starts_with("--") && !rest.is_empty() {
            rest
        } else {
            continue;
        };
        let value = value.trim();
        if !value.is_empty() {
            return Some(value);
        }
    }
    None
}

fn classify_line(line: &str) -> Line {
    if let Some(target) = option_value(line, &["--requirement", "-r"]) {
        return Line::Include(target.to_string());
    }
    if let Some(url) = option_value(line, &["--index-url", "-i"]) {
        return Line::IndexUrl(url.trim_end_matches('/').to_string());
    }
    if let Some(url) = option_value(line, &["--extra-index-url"]) {
        return Line::ExtraIndexUrl(url.trim_end_matches('/').to_string());
    }
    if option_value(line, &["--editable", "-e", "--constraint", "-c"]).is_some() {
        debug!("Skipping unsupported requirement line: {line}");
        return Line::Skipped;
    }
    if line.starts_with('-') {
        debug!("Ignoring pip option: {line}");
        return Line::Ignored;
    }
    let lower = line.to_ascii_lowercase();
    let looks_like_location = lower.contains("://")
        || lower.starts_with('.')
        || lower.starts_with('/')
        || lower.ends_with(".whl")
        || lower.ends_with(".tar.gz")
        || lower.ends_with(".zip");
    if looks_like_location && !line.contains('@') {
        debug!("Skipping URL or path requirement: {line}");
        return Line::Skipped;
    }
    // Per-requirement options such as `--hash` follow the requirement.
    let requirement = match line.find(" --") {
        Some(idx) => line[..idx].trim(),
        None => line,
    };
    Line::Requirement(requirement.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comments_continuations_and_options() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base.txt");
        fs::write(
            &base,
            "# shared\nsix==1.16.0 \\\n    --hash=sha256:00\n-r requirements.txt\n",
        )
        .unwrap();
        let main = dir.path().join("requirements.txt");
        fs::write(
            &main,
            "\
--index-url https://private.example/simple/
--extra-index-url=https://extra.example/simple
-r base.txt
pkg-a>=1.0,<2.0  # inline comment
Pkg_B[Speed] ; python_version >= \"3.6\"
-e git+https://example.com/repo.git#egg=repo
./local/pkg
https://example.com/pkg-1.0.tar.gz
--no-binary :all:
",
        )
        .unwrap();

        let parsed = parse_requirements_file(&main).unwrap();
        let names: Vec<String> = parsed.requirements.iter().map(|r| r.to_string()).collect();
        assert_eq!(
            names,
            vec![
                "six==1.16.0",
                "pkg-a<2.0,>=1.0",
                "pkg-b[speed]; python_version >= \"3.6\"",
            ]
        );
        assert_eq!(
            parsed.index_urls(),
            vec![
                "https://private.example/simple".to_string(),
                "https://extra.example/simple".to_string()
            ]
        );
        assert_eq!(parsed.skipped.len(), 3);

        let data = parsed.package_data();
        assert_eq!(data.dependencies.len(), 3);
        assert_eq!(data.dependencies[0].purl, "pkg:pypi/six@1.16.0");
    }

    #[test]
    fn malformed_lines_fail_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.txt");
        fs::write(&path, "pkg-a>>1\n").unwrap();
        assert!(parse_requirements_file(&path).is_err());
        assert!(parse_requirements_file(&dir.path().join("missing.txt")).is_err());
    }

    #[test]
    fn option_forms() {
        assert_eq!(option_value("-rbase.txt", &["-r"]), Some("base.txt"));
        assert_eq!(option_value("-r  base.txt", &["-r"]), Some("base.txt"));
        assert_eq!(option_value("--requirement=x.txt", &["--requirement"]), Some("x.txt"));
        assert_eq!(option_value("--requirementx", &["--requirement"]), None);
        assert_eq!(classify_line("requests"), Line::Requirement("requests".to_string()));
    }
}
