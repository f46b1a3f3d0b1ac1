// pydeps-common/src/model/requirement.rs
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Serialize, Serializer};

use super::marker::{MarkerEnvironment, MarkerTree};
use super::specifier::SpecifierSet;
use crate::error::{PydepsError, Result};

static NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([A-Za-z0-9](?:[A-Za-z0-9._-]*[A-Za-z0-9])?)\s*")
        .expect("name pattern is valid")
});

static SEPARATORS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[-_.]+").expect("separator pattern is valid"));

/// Lowercased with every run of `-`, `_`, `.` folded to a single `-`.
pub fn canonicalize_name(name: &str) -> String {
    SEPARATORS_RE
        .replace_all(name.trim(), "-")
        .to_ascii_lowercase()
}

/// A PEP 508 dependency declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Requirement {
    pub name: String,
    pub extras: BTreeSet<String>,
    pub specifier: SpecifierSet,
    pub marker: Option<MarkerTree>,
    pub url: Option<String>,
}

impl Requirement {
    pub fn parse(text: &str) -> Result<Self> {
        let err = |reason: &str| PydepsError::ParseError("requirement", format!("'{text}': {reason}"));

        let caps = NAME_RE
            .captures(text)
            .ok_or_else(|| err("missing project name"))?;
        let name = canonicalize_name(&caps[1]);
        let mut rest = text[caps[0].len()..].trim_start();

        let mut extras = BTreeSet::new();
        if let Some(after) = rest.strip_prefix('[') {
            let close = after.find(']').ok_or_else(|| err("unterminated extras"))?;
            for extra in after[..close].split(',').map(str::trim) {
                if extra.is_empty() {
                    continue;
                }
                if !NAME_RE.is_match(extra) {
                    return Err(err("invalid extra name"));
                }
                extras.insert(canonicalize_name(extra));
            }
            rest = after[close + 1..].trim_start();
        }

        let mut url = None;
        let (spec_text, marker_text) = if let Some(after) = rest.strip_prefix('@') {
            let after = after.trim_start();
            // The marker separator after a URL must be preceded by whitespace.
            let (link, marker) = match after.find(" ;").or_else(|| after.find("\t;")) {
                Some(idx) => (&after[..idx], Some(&after[idx + 2..])),
                None => (after, None),
            };
            let link = link.trim();
            if link.is_empty() {
                return Err(err("empty URL"));
            }
            url = Some(link.to_string());
            ("", marker)
        } else {
            match rest.split_once(';') {
                Some((spec, marker)) => (spec, Some(marker)),
                None => (rest, None),
            }
        };

        let spec_text = spec_text.trim();
        let spec_text = match spec_text.strip_prefix('(') {
            Some(inner) => inner
                .strip_suffix(')')
                .ok_or_else(|| err("unbalanced parentheses"))?,
            None => spec_text,
        };
        let specifier = SpecifierSet::parse(spec_text)?;

        let marker = match marker_text.map(str::trim) {
            Some("") => return Err(err("empty marker")),
            Some(m) => Some(MarkerTree::parse(m)?),
            None => None,
        };

        Ok(Self {
            name,
            extras,
            specifier,
            marker,
            url,
        })
    }

    /// A requirement on exactly `name` with no constraint.
    pub fn unconstrained(name: &str) -> Self {
        Self {
            name: canonicalize_name(name),
            extras: BTreeSet::new(),
            specifier: SpecifierSet::default(),
            marker: None,
            url: None,
        }
    }

    /// Resolution identifier: `name` or `name[extra1,extra2]`.
    pub fn key(&self) -> String {
        identifier_for(&self.name, &self.extras)
    }

    /// Whether the marker holds in `env`; requirements without a marker always apply.
    pub fn applies_to(&self, env: &MarkerEnvironment) -> Result<bool> {
        match &self.marker {
            Some(marker) => marker.evaluate(env),
            None => Ok(true),
        }
    }
}

pub fn identifier_for(name: &str, extras: &BTreeSet<String>) -> String {
    if extras.is_empty() {
        name.to_string()
    } else {
        let extras: Vec<&str> = extras.iter().map(String::as_str).collect();
        format!("{name}[{}]", extras.join(","))
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())?;
        if let Some(url) = &self.url {
            write!(f, " @ {url}")?;
            if self.marker.is_some() {
                write!(f, " ")?;
            }
        } else {
            write!(f, "{}", self.specifier)?;
        }
        if let Some(marker) = &self.marker {
            write!(f, "; {marker}")?;
        }
        Ok(())
    }
}

impl FromStr for Requirement {
    type Err = PydepsError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for Requirement {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::version::Version;

    #[test]
    fn canonical_names() {
        assert_eq!(canonicalize_name("Django_Rest.Framework"), "django-rest-framework");
        assert_eq!(canonicalize_name("a--_b"), "a-b");
    }

    #[test]
    fn parses_full_form() {
        let req: Requirement = "Requests[Socks, security] >=2.8.1, ==2.8.* ; python_version < '3.10'"
            .parse()
            .unwrap();
        assert_eq!(req.name, "requests");
        assert_eq!(req.key(), "requests[security,socks]");
        assert!(req
            .specifier
            .contains(&Version::parse("2.8.1").unwrap(), None));
        assert!(req.marker.is_some());
        assert_eq!(
            req.to_string(),
            "requests[security,socks]==2.8.*,>=2.8.1; python_version < \"3.10\""
        );
    }

    #[test]
    fn parenthesized_and_bare() {
        let req = Requirement::parse("zope.interface (>=4.0)").unwrap();
        assert_eq!(req.name, "zope-interface");
        assert_eq!(req.specifier.to_string(), ">=4.0");

        let bare = Requirement::parse("six").unwrap();
        assert!(bare.specifier.is_empty());
        assert_eq!(bare, Requirement::unconstrained("Six"));
    }

    #[test]
    fn url_requirements() {
        let req =
            Requirement::parse("pip @ https://example.com/pip-1.0.zip ; sys_platform == 'linux'")
                .unwrap();
        assert_eq!(req.url.as_deref(), Some("https://example.com/pip-1.0.zip"));
        assert!(req.marker.is_some());
    }

    #[test]
    fn malformed() {
        for bad in ["", ">=1.0", "pkg[extra", "pkg >=", "pkg ==1.0;", "pkg (>=1.0"] {
            assert!(Requirement::parse(bad).is_err(), "{bad:?} should fail");
        }
    }
}
