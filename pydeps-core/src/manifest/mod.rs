// pydeps-core/src/manifest/mod.rs
//! Readers for the manifests a run starts from, and the `files` entries
//! echoed in the output.

pub mod requirements;
pub mod setup_py;

use std::collections::BTreeMap;
use std::path::Path;

use pydeps_common::model::specifier::Operator;
use pydeps_common::model::Requirement;
use serde::Serialize;
use serde_json::Value;

pub use requirements::{parse_requirements_file, RequirementsFile};
pub use setup_py::{load_setup_py, SetupPyInfo, SetupPyManifest};

/// A dependency as declared by a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependentPackage {
    pub purl: String,
    pub extracted_requirement: String,
    pub scope: String,
    pub is_runtime: bool,
    pub is_optional: bool,
    pub is_pinned: bool,
}

impl DependentPackage {
    pub fn from_requirement(requirement: &Requirement, scope: &str) -> Self {
        let pinned_version = requirement
            .specifier
            .iter()
            .find(|s| s.operator() == Operator::Equal && !s.is_wildcard())
            .and_then(|s| s.version().cloned());
        let purl = match &pinned_version {
            Some(version) => format!("pkg:pypi/{}@{version}", requirement.name),
            None => format!("pkg:pypi/{}", requirement.name),
        };
        Self {
            purl,
            extracted_requirement: requirement.to_string(),
            scope: scope.to_string(),
            is_runtime: scope == "install",
            is_optional: scope != "install",
            is_pinned: pinned_version.is_some(),
        }
    }
}

/// What a manifest declares about the package it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManifestPackageData {
    #[serde(rename = "type")]
    pub package_type: &'static str,
    pub datasource_id: &'static str,
    pub name: Option<String>,
    pub version: Option<String>,
    pub primary_language: &'static str,
    pub extra_data: BTreeMap<String, Value>,
    pub dependencies: Vec<DependentPackage>,
}

impl ManifestPackageData {
    pub fn new(datasource_id: &'static str) -> Self {
        Self {
            package_type: "pypi",
            datasource_id,
            name: None,
            version: None,
            primary_language: "Python",
            extra_data: BTreeMap::new(),
            dependencies: Vec::new(),
        }
    }
}

/// One entry of the output `files` list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileEntry {
    #[serde(rename = "type")]
    pub entry_type: &'static str,
    pub path: String,
    pub package_data: Vec<ManifestPackageData>,
}

impl FileEntry {
    pub fn new(path: impl Into<String>, package_data: ManifestPackageData) -> Self {
        Self {
            entry_type: "file",
            path: path.into(),
            package_data: vec![package_data],
        }
    }
}

/// The file name alone, or `<file>` when the path has none.
pub fn generic_path(path: &Path) -> String {
    let normalized = path.to_string_lossy().replace('\\', "/");
    match normalized.rsplit('/').next() {
        Some(name) if !name.is_empty() && name != ".." && name != "." => name.to_string(),
        _ => "<file>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generic_paths_drop_the_directory() {
        assert_eq!(generic_path(Path::new("/home/ci/work/requirements.txt")), "requirements.txt");
        assert_eq!(generic_path(Path::new("C:\\src\\app\\setup.py")), "setup.py");
        assert_eq!(generic_path(Path::new("setup.py")), "setup.py");
        assert_eq!(generic_path(Path::new("/")), "<file>");
    }

    #[test]
    fn dependent_package_purls() {
        let pinned = Requirement::parse("Pkg_A==1.0").unwrap();
        let dep = DependentPackage::from_requirement(&pinned, "install");
        assert_eq!(dep.purl, "pkg:pypi/pkg-a@1.0");
        assert!(dep.is_pinned);
        assert!(dep.is_runtime);

        let ranged = Requirement::parse("pkg-b>=2; python_version >= '3'").unwrap();
        let dep = DependentPackage::from_requirement(&ranged, "speedups");
        assert_eq!(dep.purl, "pkg:pypi/pkg-b");
        assert!(!dep.is_pinned);
        assert!(dep.is_optional);
    }
}
