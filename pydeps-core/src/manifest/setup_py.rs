// pydeps-core/src/manifest/setup_py.rs
//! `setup.py` and `setup.cfg` dependency declarations.
//!
//! Static inspection reads literal keyword arguments of the `setup()` call.
//! Execution is opt-in and always happens in a separate interpreter through
//! a shim that replaces `setup()` and prints what it was called with.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use once_cell::sync::Lazy;
use pydeps_aio::process::run_command_async;
use pydeps_common::config::{Config, SetupPyFallback};
use pydeps_common::error::{PydepsError, Result};
use pydeps_common::model::specifier::SpecifierSet;
use pydeps_common::model::{Environment, Requirement};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::{DependentPackage, ManifestPackageData};

const SHIM_BEGIN: &str = "PYDEPS-SETUP-BEGIN";
const SHIM_END: &str = "PYDEPS-SETUP-END";
const DEFAULT_SHIM_TIMEOUT: Duration = Duration::from_secs(120);

const SETUP_SHIM: &str = r#"import json
import os
import runpy
import sys

captured = {}


def _capture(*args, **kwargs):
    captured.update(kwargs)


try:
    import setuptools
    setuptools.setup = _capture
except ImportError:
    pass
try:
    import distutils.core
    distutils.core.setup = _capture
except ImportError:
    pass

target = sys.argv[1]
sys.argv = [target, "--name"]
sys.path.insert(0, os.path.dirname(os.path.abspath(target)))
runpy.run_path(target, run_name="__main__")


def _lines(value):
    if value is None:
        return []
    if isinstance(value, str):
        return [line.strip() for line in value.splitlines() if line.strip()]
    return [str(item) for item in value]


out = {
    "name": None if captured.get("name") is None else str(captured.get("name")),
    "version": None if captured.get("version") is None else str(captured.get("version")),
    "python_requires": None if captured.get("python_requires") is None else str(captured.get("python_requires")),
    "install_requires": _lines(captured.get("install_requires")),
    "extras_require": {str(k): _lines(v) for k, v in (captured.get("extras_require") or {}).items()},
}
print("PYDEPS-SETUP-BEGIN")
print(json.dumps(out))
print("PYDEPS-SETUP-END")
"#;

static KEYWORD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(name|version|python_requires|install_requires|extras_require)\s*=\s*")
        .expect("keyword pattern is valid")
});

static STRING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"'([^'\\\n]*)'|"([^"\\\n]*)""#).expect("string pattern is valid")
});

static EXTRA_KEY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:'([^']+)'|"([^"]+)")\s*:\s*"#).expect("extras key pattern is valid")
});

/// Declared package fields, from whichever source provided them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SetupPyInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub python_requires: Option<String>,
    #[serde(default)]
    pub install_requires: Vec<String>,
    #[serde(default)]
    pub extras_require: BTreeMap<String, Vec<String>>,
}

impl SetupPyInfo {
    /// `install_requires` followed by every extra's entries, each gated on
    /// `extra == "<name>"`.
    pub fn requirement_lines(&self) -> Vec<String> {
        let mut lines = self.install_requires.clone();
        for (extra, entries) in &self.extras_require {
            // `extras_require` keys may carry a marker: `extra:marker`.
            let (extra, key_marker) = match extra.split_once(':') {
                Some((e, m)) => (e.trim(), Some(m.trim())),
                None => (extra.trim(), None),
            };
            for entry in entries {
                let (requirement, marker) = match entry.split_once(';') {
                    Some((r, m)) => (r.trim(), Some(m.trim())),
                    None => (entry.trim(), None),
                };
                let mut conditions: Vec<String> = Vec::new();
                for m in [marker, key_marker].into_iter().flatten() {
                    if !m.is_empty() {
                        conditions.push(format!("({m})"));
                    }
                }
                if !extra.is_empty() {
                    conditions.push(format!("extra == \"{extra}\""));
                }
                if conditions.is_empty() {
                    lines.push(requirement.to_string());
                } else {
                    lines.push(format!("{requirement}; {}", conditions.join(" and ")));
                }
            }
        }
        lines
    }

    fn merge_missing(&mut self, other: &SetupPyInfo) {
        if self.name.is_none() {
            self.name = other.name.clone();
        }
        if self.version.is_none() {
            self.version = other.version.clone();
        }
        if self.python_requires.is_none() {
            self.python_requires = other.python_requires.clone();
        }
    }
}

/// Literal keyword arguments found anywhere in the file. Values built at
/// runtime (variables, function calls) are not seen.
pub fn parse_setup_py_text(text: &str) -> SetupPyInfo {
    let mut info = SetupPyInfo::default();
    for caps in KEYWORD_RE.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        let rest = &text[whole.end()..];
        match &caps[1] {
            "name" if info.name.is_none() => info.name = leading_string(rest),
            "version" if info.version.is_none() => info.version = leading_string(rest),
            "python_requires" if info.python_requires.is_none() => {
                info.python_requires = leading_string(rest)
            }
            "install_requires" if info.install_requires.is_empty() => {
                info.install_requires = string_list(rest);
            }
            "extras_require" if info.extras_require.is_empty() => {
                info.extras_require = string_dict(rest);
            }
            _ => {}
        }
    }
    info
}

fn leading_string(rest: &str) -> Option<String> {
    let caps = STRING_RE.captures(rest)?;
    let whole = caps.get(0)?;
    if whole.start() != 0 {
        return None;
    }
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn strings_in(body: &str) -> Vec<String> {
    STRING_RE
        .captures_iter(body)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// `[...]` or `(...)` of string literals, or a single multi-line string.
fn string_list(rest: &str) -> Vec<String> {
    if let Some(body) = balanced(rest) {
        return strings_in(body);
    }
    leading_string(rest)
        .map(|s| s.lines().map(str::trim).filter(|l| !l.is_empty()).map(String::from).collect())
        .unwrap_or_default()
}

fn string_dict(rest: &str) -> BTreeMap<String, Vec<String>> {
    let mut extras = BTreeMap::new();
    if !rest.starts_with('{') {
        return extras;
    }
    let Some(body) = balanced(rest) else {
        return extras;
    };
    let mut offset = 0;
    while let Some(caps) = EXTRA_KEY_RE.captures(&body[offset..]) {
        let (Some(whole), Some(key)) = (caps.get(0), caps.get(1).or_else(|| caps.get(2))) else {
            break;
        };
        let value_start = offset + whole.end();
        let value = &body[value_start..];
        let entries = string_list(value);
        extras.insert(key.as_str().to_string(), entries);
        offset = value_start + balanced(value).map_or(0, |b| b.len() + 2);
        if offset >= body.len() {
            break;
        }
    }
    extras
}

/// Contents between an opening bracket at the start of `text` and its
/// matching close. String literals are skipped.
fn balanced(text: &str) -> Option<&str> {
    let open = text.chars().next()?;
    if !matches!(open, '[' | '(' | '{') {
        return None;
    }
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '[' | '(' | '{' => depth += 1,
            ']' | ')' | '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&text[1..i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// `[metadata]` name/version and `[options]` / `[options.extras_require]`
/// dependency lists.
pub fn parse_setup_cfg_text(text: &str) -> SetupPyInfo {
    let mut info = SetupPyInfo::default();
    let mut section = String::new();
    let mut current_key: Option<String> = None;

    for raw in text.lines() {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
            continue;
        }
        if let Some(name) = trimmed.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            section = name.trim().to_ascii_lowercase();
            current_key = None;
            continue;
        }
        let continuation = raw.starts_with(char::is_whitespace);
        let (key, value) = if continuation {
            match &current_key {
                Some(key) => (key.clone(), trimmed),
                None => continue,
            }
        } else {
            match trimmed.split_once('=') {
                Some((k, v)) => {
                    let key = k.trim().to_ascii_lowercase();
                    current_key = Some(key.clone());
                    (key, v.trim())
                }
                None => continue,
            }
        };
        if value.is_empty() {
            continue;
        }
        match (section.as_str(), key.as_str()) {
            ("metadata", "name") => info.name = Some(value.to_string()),
            ("metadata", "version") => info.version = Some(value.to_string()),
            ("options", "python_requires") => info.python_requires = Some(value.to_string()),
            ("options", "install_requires") => info.install_requires.push(value.to_string()),
            ("options.extras_require", extra) => info
                .extras_require
                .entry(extra.to_string())
                .or_default()
                .push(value.to_string()),
            _ => {}
        }
    }
    info
}

/// Runs `setup.py` under the capture shim in a separate interpreter.
pub async fn run_setup_py_insecurely(
    setup_py: &Path,
    python: &str,
    timeout: Option<Duration>,
) -> Result<SetupPyInfo> {
    let mut shim = tempfile::Builder::new()
        .prefix("pydeps-setup-shim")
        .suffix(".py")
        .tempfile()?;
    shim.write_all(SETUP_SHIM.as_bytes())?;
    shim.flush()?;

    let target = std::fs::canonicalize(setup_py)?;
    let cwd = target.parent().map(Path::to_path_buf);
    let args = vec![
        shim.path().display().to_string(),
        target.display().to_string(),
    ];
    warn!("Executing {} to inspect its dependencies", target.display());
    let output = run_command_async(
        python,
        &args,
        cwd,
        None,
        Some(timeout.unwrap_or(DEFAULT_SHIM_TIMEOUT)),
    )
    .await?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
        return Err(PydepsError::CommandExecError(format!(
            "{python} {} exited with {}: {}",
            target.display(),
            output.status,
            tail.into_iter().rev().collect::<Vec<_>>().join(" | ")
        )));
    }
    parse_shim_output(&stdout)
}

fn parse_shim_output(stdout: &str) -> Result<SetupPyInfo> {
    let body = stdout
        .split_once(SHIM_BEGIN)
        .and_then(|(_, rest)| rest.split_once(SHIM_END))
        .map(|(body, _)| body.trim())
        .ok_or_else(|| {
            PydepsError::CommandExecError("setup.py never called setup()".to_string())
        })?;
    Ok(serde_json::from_str(body)?)
}

/// A local `setup.py` with the direct requirements it contributes.
#[derive(Debug, Clone)]
pub struct SetupPyManifest {
    pub path: PathBuf,
    pub info: SetupPyInfo,
    pub requirements: Vec<Requirement>,
}

impl SetupPyManifest {
    pub fn package_data(&self) -> ManifestPackageData {
        let mut data = ManifestPackageData::new("pypi_setup_py");
        data.name = self.info.name.clone();
        data.version = self.info.version.clone();
        if let Some(python_requires) = &self.info.python_requires {
            data.extra_data.insert(
                "python_requires".to_string(),
                Value::String(python_requires.clone()),
            );
        }
        data.dependencies = self
            .requirements
            .iter()
            .map(|r| DependentPackage::from_requirement(r, "install"))
            .collect();
        for (extra, entries) in &self.info.extras_require {
            for entry in entries {
                match Requirement::parse(entry) {
                    Ok(r) => data
                        .dependencies
                        .push(DependentPackage::from_requirement(&r, extra)),
                    Err(e) => debug!("Ignoring extra requirement {entry:?}: {e}"),
                }
            }
        }
        data
    }
}

/// Reads a local `setup.py`. Its `python_requires` must admit the target
/// interpreter; otherwise the manifest is [`PydepsError::IncompatibleManifest`].
pub async fn load_setup_py(
    path: &Path,
    config: &Config,
    environment: &Environment,
) -> Result<SetupPyManifest> {
    let text = tokio::fs::read_to_string(path).await.map_err(|e| {
        PydepsError::Config(format!("Failed to read {}: {e}", path.display()))
    })?;
    let mut info = parse_setup_py_text(&text);
    let cfg_path = path.with_file_name("setup.cfg");
    let cfg = match tokio::fs::read_to_string(&cfg_path).await {
        Ok(cfg_text) => Some(parse_setup_cfg_text(&cfg_text)),
        Err(_) => None,
    };
    if let Some(cfg) = &cfg {
        info.merge_missing(cfg);
    }
    check_python_requires(path, info.python_requires.as_deref(), environment)?;

    let lines = if config.analyze_setup_py_insecurely {
        let executed =
            run_setup_py_insecurely(path, &config.python_executable, config.timeout).await?;
        check_python_requires(path, executed.python_requires.as_deref(), environment)?;
        info.merge_missing(&executed);
        info.install_requires = executed.install_requires.clone();
        info.extras_require = executed.extras_require;
        executed.install_requires
    } else {
        let mut lines = info.install_requires.clone();
        let consult_cfg = lines.is_empty() || config.setup_py_fallback == SetupPyFallback::Always;
        if let (true, Some(cfg)) = (consult_cfg, &cfg) {
            debug!("Adding install_requires from {}", cfg_path.display());
            for line in &cfg.install_requires {
                if !lines.contains(line) {
                    lines.push(line.clone());
                }
            }
            if info.extras_require.is_empty() {
                info.extras_require = cfg.extras_require.clone();
            }
        }
        if lines.is_empty() {
            debug!(
                "{} declares no literal install_requires; enable insecure analysis to execute it",
                path.display()
            );
        }
        lines
    };

    let requirements = lines
        .iter()
        .map(|line| Requirement::parse(line))
        .collect::<Result<Vec<_>>>()?;
    Ok(SetupPyManifest {
        path: path.to_path_buf(),
        info,
        requirements,
    })
}

fn check_python_requires(path: &Path, python_requires: Option<&str>, environment: &Environment) -> Result<()> {
    let Some(python_requires) = python_requires.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(());
    };
    let specifier = match SpecifierSet::parse(python_requires) {
        Ok(specifier) => specifier,
        Err(e) => {
            warn!("Ignoring unparseable python_requires {python_requires:?}: {e}");
            return Ok(());
        }
    };
    if specifier.contains(&environment.python_full_version(), Some(true)) {
        Ok(())
    } else {
        Err(PydepsError::IncompatibleManifest {
            path: path.display().to_string(),
            reason: format!(
                "Python version {} is not compatible with python_requires {python_requires}",
                environment.python_version_string()
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use pydeps_common::model::select_compatible_environment;

    use super::*;

    const SETUP_PY: &str = r#"
from setuptools import setup, find_packages

setup(
    name="pkg-a",
    version='1.2.0',
    python_requires=">=3.7",
    packages=find_packages(),
    install_requires=[
        "six>=1.10",  # pinned below 2
        'requests[security] >= 2.0 ; python_version >= "3"',
    ],
    extras_require={
        "test": ["pytest", "mock; python_version < '3.3'"],
        'docs': ['sphinx'],
    },
)
"#;

    #[test]
    fn static_setup_py() {
        let info = parse_setup_py_text(SETUP_PY);
        assert_eq!(info.name.as_deref(), Some("pkg-a"));
        assert_eq!(info.version.as_deref(), Some("1.2.0"));
        assert_eq!(info.python_requires.as_deref(), Some(">=3.7"));
        assert_eq!(
            info.install_requires,
            vec![
                "six>=1.10".to_string(),
                "requests[security] >= 2.0 ; python_version >= \"3\"".to_string()
            ]
        );
        assert_eq!(info.extras_require["test"], vec!["pytest", "mock; python_version < '3.3'"]);
        assert_eq!(info.extras_require["docs"], vec!["sphinx"]);

        let lines = info.requirement_lines();
        assert!(lines.contains(&"sphinx; extra == \"docs\"".to_string()));
        assert!(lines.contains(&"mock; (python_version < '3.3') and extra == \"test\"".to_string()));
        for line in &lines {
            Requirement::parse(line).unwrap();
        }
    }

    #[test]
    fn dynamic_values_are_not_seen() {
        let info = parse_setup_py_text("REQS = open('r.txt').read()\nsetup(install_requires=REQS)\n");
        assert!(info.install_requires.is_empty());
    }

    #[test]
    fn setup_cfg_lists() {
        let cfg = "\
[metadata]
name = pkg-b
version = 0.3

[options]
python_requires = >=3.8
install_requires =
    attrs>=21
    click
[options.extras_require]
yaml = pyyaml
";
        let info = parse_setup_cfg_text(cfg);
        assert_eq!(info.name.as_deref(), Some("pkg-b"));
        assert_eq!(info.install_requires, vec!["attrs>=21", "click"]);
        assert_eq!(info.extras_require["yaml"], vec!["pyyaml"]);
        assert_eq!(info.python_requires.as_deref(), Some(">=3.8"));
    }

    #[test]
    fn shim_output() {
        let stdout = format!(
            "noise\n{SHIM_BEGIN}\n{{\"name\": \"x\", \"install_requires\": [\"a\"], \"extras_require\": {{}}}}\n{SHIM_END}\n"
        );
        let info = parse_shim_output(&stdout).unwrap();
        assert_eq!(info.install_requires, vec!["a"]);
        assert!(parse_shim_output("nothing").is_err());
    }

    #[tokio::test]
    async fn incompatible_python_requires() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("setup.py");
        std::fs::write(&path, "setup(name='x', python_requires='>=3.10', install_requires=['six'])").unwrap();
        let config = Config::with_cache_dir(dir.path().join("cache"));
        let py39 = select_compatible_environment("39", "linux").unwrap();
        let err = load_setup_py(&path, &config, &py39).await.unwrap_err();
        assert!(matches!(err, PydepsError::IncompatibleManifest { .. }));

        let py311 = select_compatible_environment("311", "linux").unwrap();
        let manifest = load_setup_py(&path, &config, &py311).await.unwrap();
        assert_eq!(manifest.requirements.len(), 1);
        assert_eq!(manifest.package_data().dependencies[0].purl, "pkg:pypi/six");
    }

    #[tokio::test]
    async fn setup_cfg_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("setup.py");
        std::fs::write(&path, "from setuptools import setup\nsetup()\n").unwrap();
        std::fs::write(
            dir.path().join("setup.cfg"),
            "[options]\ninstall_requires =\n    click>=8\n",
        )
        .unwrap();
        let config = Config::with_cache_dir(dir.path().join("cache"));
        let env = select_compatible_environment("310", "linux").unwrap();
        let manifest = load_setup_py(&path, &config, &env).await.unwrap();
        let names: Vec<String> = manifest.requirements.iter().map(|r| r.name.clone()).collect();
        assert_eq!(names, vec!["click"]);
    }
}
