// pydeps-common/src/model/specifier.rs
//! PEP 440 version specifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use super::version::Version;
use crate::error::{PydepsError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Operator {
    Compatible,
    Equal,
    NotEqual,
    LessEqual,
    GreaterEqual,
    Less,
    Greater,
    Arbitrary,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Compatible => "~=",
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::LessEqual => "<=",
            Self::GreaterEqual => ">=",
            Self::Less => "<",
            Self::Greater => ">",
            Self::Arbitrary => "===",
        }
    }

    /// Longest-first so `===` wins over `==`.
    const ALL: [Operator; 8] = [
        Self::Arbitrary,
        Self::Compatible,
        Self::Equal,
        Self::NotEqual,
        Self::LessEqual,
        Self::GreaterEqual,
        Self::Less,
        Self::Greater,
    ];
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One comparator clause such as `>=1.0` or `==2.*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Specifier {
    operator: Operator,
    /// Raw version text as written (without a `.*` suffix).
    raw: String,
    version: Option<Version>,
    wildcard: bool,
}

impl Specifier {
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        let err = |reason: &str| PydepsError::ParseError("specifier", format!("'{text}': {reason}"));

        let operator = Operator::ALL
            .into_iter()
            .find(|op| text.starts_with(op.as_str()))
            .ok_or_else(|| err("missing comparison operator"))?;
        let rest = text[operator.as_str().len()..].trim();
        if rest.is_empty() {
            return Err(err("missing version"));
        }
        if rest.contains(char::is_whitespace) {
            return Err(err("unexpected whitespace in version"));
        }

        if operator == Operator::Arbitrary {
            return Ok(Self {
                operator,
                raw: rest.to_string(),
                version: Version::parse(rest).ok(),
                wildcard: false,
            });
        }

        let (raw, wildcard) = match rest.strip_suffix(".*") {
            Some(prefix) => (prefix, true),
            None => (rest, false),
        };
        if wildcard && !matches!(operator, Operator::Equal | Operator::NotEqual) {
            return Err(err("wildcards are only allowed with == and !="));
        }

        let version = Version::parse(raw).map_err(|_| err("invalid version"))?;
        if wildcard && (version.is_prerelease() || version.is_postrelease() || version.has_local()) {
            return Err(err("wildcards may only follow a release segment"));
        }
        if version.has_local() && !matches!(operator, Operator::Equal | Operator::NotEqual) {
            return Err(err("local versions are only allowed with == and !="));
        }
        if operator == Operator::Compatible && version.release().len() < 2 {
            return Err(err("~= needs at least two release segments"));
        }

        Ok(Self {
            operator,
            raw: raw.to_string(),
            version: Some(version),
            wildcard,
        })
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn version(&self) -> Option<&Version> {
        self.version.as_ref()
    }

    pub fn is_wildcard(&self) -> bool {
        self.wildcard
    }

    /// Whether this clause explicitly admits pre-releases.
    pub fn prereleases(&self) -> bool {
        match self.operator {
            Operator::NotEqual => false,
            _ => self.version.as_ref().is_some_and(Version::is_prerelease),
        }
    }

    /// Clause evaluation, ignoring pre-release policy.
    pub fn matches(&self, candidate: &Version) -> bool {
        let Some(spec) = &self.version else {
            return self.operator == Operator::Arbitrary
                && candidate.to_string().eq_ignore_ascii_case(&self.raw);
        };
        match self.operator {
            Operator::Arbitrary => candidate.to_string().eq_ignore_ascii_case(&self.raw),
            Operator::Equal => self.equal(spec, candidate),
            Operator::NotEqual => !self.equal(spec, candidate),
            Operator::LessEqual => candidate.public() <= *spec,
            Operator::GreaterEqual => candidate.public() >= *spec,
            Operator::Less => {
                let candidate = candidate.public();
                candidate < *spec
                    && !(!spec.is_prerelease()
                        && candidate.is_prerelease()
                        && candidate.base() == spec.base())
            }
            Operator::Greater => {
                candidate.public() > *spec
                    && !(!spec.is_postrelease()
                        && candidate.is_postrelease()
                        && candidate.base() == spec.base())
                    && !(candidate.has_local() && candidate.base() == spec.base())
            }
            Operator::Compatible => {
                let prefix = &spec.release()[..spec.release().len() - 1];
                candidate.public() >= *spec && release_prefix_matches(spec.epoch(), prefix, candidate)
            }
        }
    }

    fn equal(&self, spec: &Version, candidate: &Version) -> bool {
        if self.wildcard {
            return release_prefix_matches(spec.epoch(), spec.release(), candidate);
        }
        if spec.has_local() {
            candidate == spec
        } else {
            candidate.public() == *spec
        }
    }
}

/// `candidate` shares `epoch` and starts with `prefix` once its release is
/// zero-padded to the prefix length.
fn release_prefix_matches(epoch: u64, prefix: &[u64], candidate: &Version) -> bool {
    if candidate.epoch() != epoch {
        return false;
    }
    let release = candidate.release();
    prefix
        .iter()
        .enumerate()
        .all(|(i, &n)| release.get(i).copied().unwrap_or(0) == n)
}

impl fmt::Display for Specifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.operator, self.raw)?;
        if self.wildcard {
            write!(f, ".*")?;
        }
        Ok(())
    }
}

/// A conjunction of specifier clauses. Empty matches every final release.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SpecifierSet {
    specifiers: Vec<Specifier>,
}

pub fn parse_specifier(text: &str) -> Result<SpecifierSet> {
    SpecifierSet::parse(text)
}

impl SpecifierSet {
    pub fn parse(text: &str) -> Result<Self> {
        let specifiers = text
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Specifier::parse)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { specifiers })
    }

    pub fn is_empty(&self) -> bool {
        self.specifiers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Specifier> {
        self.specifiers.iter()
    }

    /// Conjunction of both sets.
    pub fn merged(&self, other: &SpecifierSet) -> SpecifierSet {
        let mut specifiers = self.specifiers.clone();
        for spec in &other.specifiers {
            if !specifiers.contains(spec) {
                specifiers.push(spec.clone());
            }
        }
        SpecifierSet { specifiers }
    }

    /// Any clause opts in to pre-releases.
    pub fn prereleases(&self) -> bool {
        self.specifiers.iter().any(Specifier::prereleases)
    }

    /// An exact `==` (non-wildcard) or `===` pin is present.
    pub fn is_pinned(&self) -> bool {
        self.specifiers.iter().any(|s| {
            s.operator == Operator::Arbitrary || (s.operator == Operator::Equal && !s.wildcard)
        })
    }

    /// `prereleases`: `Some(true)` forces acceptance, `Some(false)` forces
    /// rejection, `None` defers to the clauses.
    pub fn contains(&self, version: &Version, prereleases: Option<bool>) -> bool {
        let allow_pre = prereleases.unwrap_or_else(|| self.prereleases());
        if !allow_pre && version.is_prerelease() {
            return false;
        }
        self.specifiers.iter().all(|s| s.matches(version))
    }

    /// Keeps matching versions, in input order. Pre-releases are dropped unless
    /// admitted by `prereleases`/the clauses, or unless nothing else matches.
    pub fn filter<'a, I>(&self, versions: I, prereleases: Option<bool>) -> Vec<&'a Version>
    where
        I: IntoIterator<Item = &'a Version>,
    {
        let allow_pre = prereleases.unwrap_or_else(|| self.prereleases());
        let mut finals = Vec::new();
        let mut pres = Vec::new();
        for version in versions {
            if !self.specifiers.iter().all(|s| s.matches(version)) {
                continue;
            }
            if version.is_prerelease() && !allow_pre {
                pres.push(version);
            } else {
                finals.push(version);
            }
        }
        if finals.is_empty() && prereleases != Some(false) {
            pres
        } else {
            finals
        }
    }
}

impl fmt::Display for SpecifierSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = self.specifiers.iter().map(ToString::to_string).collect();
        parts.sort();
        write!(f, "{}", parts.join(","))
    }
}

impl FromStr for SpecifierSet {
    type Err = PydepsError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for SpecifierSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
