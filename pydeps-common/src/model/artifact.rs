// pydeps-common/src/model/artifact.rs
//! Distribution artifacts as listed by a simple index.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::requirement::canonicalize_name;
use super::specifier::SpecifierSet;
use super::version::Version;
use crate::error::{PydepsError, Result};

const SDIST_EXTENSIONS: &[&str] = &[".tar.gz", ".tgz", ".tar.bz2", ".tar.xz", ".zip", ".tar"];

/// One `interpreter-abi-platform` wheel compatibility tag.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WheelTag {
    pub python: String,
    pub abi: String,
    pub platform: String,
}

impl WheelTag {
    pub fn new(python: &str, abi: &str, platform: &str) -> Self {
        Self {
            python: python.to_ascii_lowercase(),
            abi: abi.to_ascii_lowercase(),
            platform: platform.to_ascii_lowercase(),
        }
    }

    /// Expands a compressed tag set such as `py2.py3-none-any`.
    pub fn expand(python: &str, abi: &str, platform: &str) -> Vec<Self> {
        let mut tags = Vec::new();
        for py in python.split('.') {
            for a in abi.split('.') {
                for plat in platform.split('.') {
                    tags.push(Self::new(py, a, plat));
                }
            }
        }
        tags
    }
}

impl fmt::Display for WheelTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.python, self.abi, self.platform)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistributionKind {
    Sdist,
    Wheel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub filename: String,
    pub url: String,
    pub kind: DistributionKind,
    /// Canonical project name encoded in the filename.
    pub name: String,
    pub version: Version,
    /// Empty for sdists.
    pub tags: Vec<WheelTag>,
    pub sha256: Option<String>,
    pub requires_python: Option<String>,
    pub yanked: bool,
    /// A PEP 658 `<url>.metadata` file is published.
    pub has_metadata: bool,
}

impl Artifact {
    /// Builds an artifact from its filename, with no optional link metadata.
    pub fn from_filename(filename: &str, url: &str) -> Result<Self> {
        let (name, version, kind, tags) = parse_filename(filename)?;
        Ok(Self {
            filename: filename.to_string(),
            url: url.to_string(),
            kind,
            name,
            version,
            tags,
            sha256: None,
            requires_python: None,
            yanked: false,
            has_metadata: false,
        })
    }

    pub fn is_wheel(&self) -> bool {
        self.kind == DistributionKind::Wheel
    }

    pub fn is_sdist(&self) -> bool {
        self.kind == DistributionKind::Sdist
    }

    /// Parsed `Requires-Python`. Unparseable hints are ignored.
    pub fn requires_python_specifier(&self) -> Option<SpecifierSet> {
        self.requires_python
            .as_deref()
            .and_then(|raw| SpecifierSet::parse(raw).ok())
    }

    /// Location of the PEP 658 metadata file.
    pub fn metadata_url(&self) -> String {
        let base = self.url.split('#').next().unwrap_or(&self.url);
        format!("{base}.metadata")
    }
}

/// A version and every artifact published for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageVersion {
    pub version: Version,
    pub artifacts: Vec<Artifact>,
}

impl PackageVersion {
    /// Yanked only when every artifact is yanked.
    pub fn is_yanked(&self) -> bool {
        !self.artifacts.is_empty() && self.artifacts.iter().all(|a| a.yanked)
    }
}

/// Groups artifacts by version, newest first.
pub fn group_by_version(artifacts: Vec<Artifact>) -> Vec<PackageVersion> {
    let mut grouped: std::collections::BTreeMap<Version, Vec<Artifact>> =
        std::collections::BTreeMap::new();
    for artifact in artifacts {
        let slot = grouped.entry(artifact.version.clone()).or_default();
        if !slot.iter().any(|a| a.filename == artifact.filename) {
            slot.push(artifact);
        }
    }
    grouped
        .into_iter()
        .rev()
        .map(|(version, artifacts)| PackageVersion { version, artifacts })
        .collect()
}

fn parse_filename(filename: &str) -> Result<(String, Version, DistributionKind, Vec<WheelTag>)> {
    let err = |reason: &str| PydepsError::ParseError("artifact", format!("'{filename}': {reason}"));

    if let Some(stem) = filename.strip_suffix(".whl") {
        let parts: Vec<&str> = stem.split('-').collect();
        let (name, version, py, abi, plat) = match parts.as_slice() {
            [name, version, py, abi, plat] => (*name, *version, *py, *abi, *plat),
            [name, version, _build, py, abi, plat] => (*name, *version, *py, *abi, *plat),
            _ => return Err(err("malformed wheel filename")),
        };
        let version = Version::parse(version).map_err(|_| err("invalid version"))?;
        return Ok((
            canonicalize_name(name),
            version,
            DistributionKind::Wheel,
            WheelTag::expand(py, abi, plat),
        ));
    }

    let lower = filename.to_ascii_lowercase();
    let stem = SDIST_EXTENSIONS
        .iter()
        .find(|ext| lower.ends_with(*ext))
        .map(|ext| &filename[..filename.len() - ext.len()])
        .ok_or_else(|| err("not a wheel or source distribution"))?;

    // Names may contain dashes; take the right-most split whose tail is a version.
    let mut split_at = stem.len();
    while let Some(idx) = stem[..split_at].rfind('-') {
        let (name, version) = (&stem[..idx], &stem[idx + 1..]);
        if !name.is_empty() {
            if let Ok(version) = Version::parse(version) {
                return Ok((canonicalize_name(name), version, DistributionKind::Sdist, Vec::new()));
            }
        }
        split_at = idx;
    }
    Err(err("cannot split name and version"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wheels() {
        let a = Artifact::from_filename(
            "Foo_Bar-1.2.0-1-cp39-cp39-manylinux_2_17_x86_64.manylinux2014_x86_64.whl",
            "https://files.example/foo.whl",
        )
        .unwrap();
        assert_eq!(a.name, "foo-bar");
        assert_eq!(a.version.to_string(), "1.2.0");
        assert!(a.is_wheel());
        assert_eq!(a.tags.len(), 2);
        assert_eq!(a.tags[1].to_string(), "cp39-cp39-manylinux2014_x86_64");

        let universal = Artifact::from_filename("six-1.16.0-py2.py3-none-any.whl", "u").unwrap();
        assert_eq!(universal.tags.len(), 2);
    }

    #[test]
    fn parses_sdists() {
        let a = Artifact::from_filename("python-dateutil-2.8.2.tar.gz", "u").unwrap();
        assert_eq!(a.name, "python-dateutil");
        assert_eq!(a.version.to_string(), "2.8.2");
        assert!(a.is_sdist());
        assert!(a.tags.is_empty());

        let z = Artifact::from_filename("pkg_a-1.0rc1.zip", "u").unwrap();
        assert_eq!(z.version.to_string(), "1.0rc1");
    }

    #[test]
    fn rejects_other_files() {
        assert!(Artifact::from_filename("pkg-1.0.egg", "u").is_err());
        assert!(Artifact::from_filename("pkg-1.0-py3-none.whl", "u").is_err());
        assert!(Artifact::from_filename("pkg.tar.gz", "u").is_err());
    }

    #[test]
    fn groups_newest_first() {
        let artifacts = vec![
            Artifact::from_filename("a-1.0.tar.gz", "u1").unwrap(),
            Artifact::from_filename("a-2.0.tar.gz", "u2").unwrap(),
            Artifact::from_filename("a-1.0-py3-none-any.whl", "u3").unwrap(),
            Artifact::from_filename("a-1.0.tar.gz", "u1-dup").unwrap(),
        ];
        let grouped = group_by_version(artifacts);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].version.to_string(), "2.0");
        assert_eq!(grouped[1].artifacts.len(), 2);
    }

    #[test]
    fn metadata_url_drops_fragment() {
        let a = Artifact::from_filename("a-1.0-py3-none-any.whl", "https://h/a-1.0-py3-none-any.whl#sha256=00")
            .unwrap();
        assert_eq!(a.metadata_url(), "https://h/a-1.0-py3-none-any.whl.metadata");
    }
}
