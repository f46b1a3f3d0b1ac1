// pydeps-common/src/model/candidate.rs
use std::collections::BTreeSet;
use std::fmt;

use serde::{Serialize, Serializer};

use super::artifact::Artifact;
use super::requirement::identifier_for;
use super::version::Version;

/// Canonical name plus version; the node key of the resolved graph.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PackageIdentity {
    pub name: String,
    pub version: Version,
}

impl PackageIdentity {
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }

    /// `pkg:pypi/<name>@<version>`
    pub fn purl(&self) -> String {
        format!("pkg:pypi/{}@{}", self.name, self.version)
    }
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.purl())
    }
}

impl Serialize for PackageIdentity {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One concrete version of one package (optionally with extras) for the
/// active environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub name: String,
    pub version: Version,
    pub extras: BTreeSet<String>,
    /// `None` only for candidates built outside a registry, such as in tests.
    pub artifact: Option<Artifact>,
}

impl Candidate {
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
            extras: BTreeSet::new(),
            artifact: None,
        }
    }

    pub fn with_extras(mut self, extras: BTreeSet<String>) -> Self {
        self.extras = extras;
        self
    }

    pub fn with_artifact(mut self, artifact: Artifact) -> Self {
        self.artifact = Some(artifact);
        self
    }

    /// Resolution identifier this candidate is pinned under.
    pub fn identifier(&self) -> String {
        identifier_for(&self.name, &self.extras)
    }

    pub fn identity(&self) -> PackageIdentity {
        PackageIdentity::new(self.name.clone(), self.version.clone())
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=={}", self.identifier(), self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_and_identifier() {
        let candidate = Candidate::new("requests", Version::parse("2.31.0").unwrap())
            .with_extras(["socks".to_string()].into_iter().collect());
        assert_eq!(candidate.identifier(), "requests[socks]");
        assert_eq!(candidate.identity().purl(), "pkg:pypi/requests@2.31.0");
        assert_eq!(candidate.to_string(), "requests[socks]==2.31.0");
        assert_eq!(
            serde_json::to_string(&candidate.identity()).unwrap(),
            "\"pkg:pypi/requests@2.31.0\""
        );
    }
}
