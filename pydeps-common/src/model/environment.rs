// pydeps-common/src/model/environment.rs
//! Target interpreter and operating system, expanded into wheel tags and
//! marker variables.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use super::artifact::{Artifact, WheelTag};
use super::marker::MarkerEnvironment;
use super::version::Version;
use crate::error::{PydepsError, Result};

pub const SUPPORTED_PYTHON_VERSIONS: &[&str] =
    &["27", "36", "37", "38", "39", "310", "311", "312", "313"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingSystem {
    Linux,
    Macos,
    Windows,
}

impl OperatingSystem {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "linux" => Ok(Self::Linux),
            "macos" | "mac" => Ok(Self::Macos),
            "windows" => Ok(Self::Windows),
            other => Err(PydepsError::UnsupportedEnvironment(format!(
                "Invalid operating system: {other}. Must be one of: linux, macos, windows"
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Macos => "macos",
            Self::Windows => "windows",
        }
    }

    /// Platform tags, most specific first.
    fn platforms(self) -> Vec<String> {
        match self {
            Self::Linux => {
                let mut platforms: Vec<String> = (17..=28)
                    .rev()
                    .map(|glibc| format!("manylinux_2_{glibc}_x86_64"))
                    .collect();
                platforms.extend(
                    ["manylinux2014_x86_64", "manylinux2010_x86_64", "manylinux1_x86_64", "linux_x86_64"]
                        .map(String::from),
                );
                platforms
            }
            Self::Macos => {
                let mut platforms = Vec::new();
                for major in (11..=14).rev() {
                    for arch in ["x86_64", "universal2", "intel"] {
                        platforms.push(format!("macosx_{major}_0_{arch}"));
                    }
                }
                for minor in (6..=15).rev() {
                    for arch in ["x86_64", "universal2", "intel"] {
                        platforms.push(format!("macosx_10_{minor}_{arch}"));
                    }
                }
                platforms
            }
            Self::Windows => vec!["win_amd64".to_string()],
        }
    }
}

impl fmt::Display for OperatingSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The resolution target. Built once per run and shared read-only.
#[derive(Debug, Clone)]
pub struct Environment {
    major: u8,
    minor: u8,
    operating_system: OperatingSystem,
    tags: Vec<WheelTag>,
    tag_rank: BTreeMap<WheelTag, usize>,
    markers: MarkerEnvironment,
}

/// Validates the target and expands it into tags and marker variables.
pub fn select_compatible_environment(
    python_version: &str,
    operating_system: &str,
) -> Result<Environment> {
    let compact = python_version.trim().replace('.', "");
    if !SUPPORTED_PYTHON_VERSIONS.contains(&compact.as_str()) {
        return Err(PydepsError::UnsupportedEnvironment(format!(
            "Invalid python version: {python_version}. Must be one of: {}",
            SUPPORTED_PYTHON_VERSIONS.join(", ")
        )));
    }
    let operating_system = OperatingSystem::parse(operating_system)?;
    // Every supported version is a one-digit major followed by the minor.
    let (major, minor) = compact.split_at(1);
    let major: u8 = major
        .parse()
        .map_err(|_| PydepsError::UnsupportedEnvironment(python_version.to_string()))?;
    let minor: u8 = minor
        .parse()
        .map_err(|_| PydepsError::UnsupportedEnvironment(python_version.to_string()))?;
    Ok(Environment::new(major, minor, operating_system))
}

impl Environment {
    fn new(major: u8, minor: u8, operating_system: OperatingSystem) -> Self {
        let tags = compatible_tags(major, minor, operating_system);
        let mut tag_rank = BTreeMap::new();
        for (rank, tag) in tags.iter().enumerate() {
            tag_rank.entry(tag.clone()).or_insert(rank);
        }
        let markers = marker_variables(major, minor, operating_system);
        Self {
            major,
            minor,
            operating_system,
            tags,
            tag_rank,
            markers,
        }
    }

    pub fn python_version(&self) -> (u8, u8) {
        (self.major, self.minor)
    }

    /// `3.9`-style version string.
    pub fn python_version_string(&self) -> String {
        format!("{}.{}", self.major, self.minor)
    }

    /// The interpreter version used for `Requires-Python` checks.
    pub fn python_full_version(&self) -> Version {
        Version::from_release(&[u64::from(self.major), u64::from(self.minor), 0])
    }

    pub fn operating_system(&self) -> OperatingSystem {
        self.operating_system
    }

    pub fn tags(&self) -> &[WheelTag] {
        &self.tags
    }

    pub fn markers(&self) -> &MarkerEnvironment {
        &self.markers
    }

    /// Lower is better; `None` when no tag of the wheel is supported.
    pub fn wheel_rank(&self, artifact: &Artifact) -> Option<usize> {
        artifact
            .tags
            .iter()
            .filter_map(|tag| self.tag_rank.get(tag).copied())
            .min()
    }

    /// `Requires-Python` admits the target interpreter. Missing or
    /// unparseable hints admit it.
    pub fn supports_python(&self, artifact: &Artifact) -> bool {
        match artifact.requires_python_specifier() {
            Some(spec) => spec.contains(&self.python_full_version(), Some(true)),
            None => true,
        }
    }

    /// Installable here: an sdist, or a wheel with a supported tag, and an
    /// acceptable `Requires-Python`.
    pub fn is_compatible(&self, artifact: &Artifact) -> bool {
        let tags_ok = artifact.is_sdist() || self.wheel_rank(artifact).is_some();
        tags_ok && self.supports_python(artifact)
    }
}

fn compatible_tags(major: u8, minor: u8, os: OperatingSystem) -> Vec<WheelTag> {
    let platforms = os.platforms();
    let interpreter = format!("cp{major}{minor}");
    let mut tags = Vec::new();

    let abis: Vec<String> = match (major, minor) {
        (2, _) if os == OperatingSystem::Windows => vec![format!("{interpreter}m")],
        (2, _) => vec![format!("{interpreter}mu"), format!("{interpreter}m")],
        (3, m) if m < 8 => vec![format!("{interpreter}m")],
        _ => vec![interpreter.clone()],
    };
    for abi in &abis {
        for platform in &platforms {
            tags.push(WheelTag::new(&interpreter, abi, platform));
        }
    }
    if major == 3 {
        for platform in &platforms {
            tags.push(WheelTag::new(&interpreter, "abi3", platform));
        }
    }
    for platform in &platforms {
        tags.push(WheelTag::new(&interpreter, "none", platform));
    }
    if major == 3 {
        for older in (2..minor).rev() {
            for platform in &platforms {
                tags.push(WheelTag::new(&format!("cp3{older}"), "abi3", platform));
            }
        }
    }

    let mut py_versions = vec![format!("py{major}{minor}")];
    if minor > 0 {
        py_versions.push(format!("py{major}"));
    }
    py_versions.extend((0..minor).rev().map(|m| format!("py{major}{m}")));

    for py in &py_versions {
        for platform in &platforms {
            tags.push(WheelTag::new(py, "none", platform));
        }
    }
    tags.push(WheelTag::new(&interpreter, "none", "any"));
    for py in &py_versions {
        tags.push(WheelTag::new(py, "none", "any"));
    }
    tags
}

fn marker_variables(major: u8, minor: u8, os: OperatingSystem) -> MarkerEnvironment {
    let (os_name, sys_platform, platform_system, machine) = match os {
        OperatingSystem::Linux => ("posix", "linux", "Linux", "x86_64"),
        OperatingSystem::Macos => ("posix", "darwin", "Darwin", "x86_64"),
        OperatingSystem::Windows => ("nt", "win32", "Windows", "AMD64"),
    };
    let version = format!("{major}.{minor}");
    let mut env = MarkerEnvironment::default();
    env.set("extra", "");
    env.set("implementation_name", "cpython");
    env.set("implementation_version", format!("{version}.0"));
    env.set("os_name", os_name);
    env.set("platform_machine", machine);
    env.set("platform_python_implementation", "CPython");
    env.set("platform_release", "");
    env.set("platform_system", platform_system);
    env.set("platform_version", "");
    env.set("python_full_version", format!("{version}.0"));
    env.set("python_version", version);
    env.set("sys_platform", sys_platform);
    env
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unsupported_targets() {
        assert!(matches!(
            select_compatible_environment("35", "linux"),
            Err(PydepsError::UnsupportedEnvironment(_))
        ));
        assert!(matches!(
            select_compatible_environment("39", "freebsd"),
            Err(PydepsError::UnsupportedEnvironment(_))
        ));
    }

    #[test]
    fn accepts_dotted_versions_and_aliases() {
        let env = select_compatible_environment("3.10", "mac").unwrap();
        assert_eq!(env.python_version(), (3, 10));
        assert_eq!(env.operating_system(), OperatingSystem::Macos);
        assert_eq!(env.markers().get("sys_platform"), Some("darwin"));
        assert_eq!(env.markers().get("python_version"), Some("3.10"));
    }

    #[test]
    fn tags_are_most_specific_first() {
        let env = select_compatible_environment("39", "linux").unwrap();
        let tags = env.tags();
        assert_eq!(tags[0].to_string(), "cp39-cp39-manylinux_2_28_x86_64");
        assert_eq!(tags.last().unwrap().to_string(), "py30-none-any");

        let rank = |name: &str| env.wheel_rank(&Artifact::from_filename(name, "u").unwrap());
        let native = rank("a-1.0-cp39-cp39-manylinux2014_x86_64.whl").unwrap();
        let abi3 = rank("a-1.0-cp36-abi3-manylinux2014_x86_64.whl").unwrap();
        let pure = rank("a-1.0-py3-none-any.whl").unwrap();
        assert!(native < abi3 && abi3 < pure);
        assert_eq!(rank("a-1.0-cp39-cp39-win_amd64.whl"), None);
        assert_eq!(rank("a-1.0-cp310-cp310-manylinux2014_x86_64.whl"), None);
    }

    #[test]
    fn requires_python_filters_artifacts() {
        let env = select_compatible_environment("38", "windows").unwrap();
        let mut a = Artifact::from_filename("a-1.0.tar.gz", "u").unwrap();
        assert!(env.is_compatible(&a));
        a.requires_python = Some(">=3.9".to_string());
        assert!(!env.is_compatible(&a));
        a.requires_python = Some(">=3.6, <4".to_string());
        assert!(env.is_compatible(&a));
    }
}
