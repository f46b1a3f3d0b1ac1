// pydeps-common/src/config.rs
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::{BaseDirs, UserDirs};
use tracing::debug;

use super::error::{PydepsError, Result};

pub const DEFAULT_INDEX_URL: &str = "https://pypi.org/simple";
/// Base of the per-project JSON API (`<base>/<name>/json`).
pub const PYPI_JSON_API_URL: &str = "https://pypi.org/pypi";
pub const DEFAULT_PYTHON_VERSION: &str = "39";
pub const DEFAULT_OPERATING_SYSTEM: &str = "linux";
pub const DEFAULT_MAX_ROUNDS: usize = 200_000;
const ENV_PREFIX: &str = "PYDEPS_";

/// What to do with a `setup.py` whose statically declared dependency list may
/// be incomplete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SetupPyFallback {
    /// Consult `setup.cfg` (and, when opted in, execution) only when the static
    /// `install_requires` list is empty.
    #[default]
    WhenEmpty,
    /// Always merge the fallback sources into the static list.
    Always,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub python_version: String,
    pub operating_system: String,
    pub index_urls: Vec<String>,
    pub cache_dir: PathBuf,
    pub max_rounds: usize,
    pub use_cached_index: bool,
    pub merge_indexes: bool,
    /// List versions from the PyPI JSON API instead of `index_urls`.
    pub use_pypi_json_api: bool,
    pub prefer_source: bool,
    pub ignore_errors: bool,
    pub analyze_setup_py_insecurely: bool,
    pub setup_py_fallback: SetupPyFallback,
    pub netrc_file: Option<PathBuf>,
    pub timeout: Option<Duration>,
    pub python_executable: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        debug!("Loading pydeps configuration");

        let python_version = env_var("DEFAULT_PYTHON_VERSION")
            .unwrap_or_else(|| DEFAULT_PYTHON_VERSION.to_string());
        let operating_system =
            env_var("DEFAULT_OS").unwrap_or_else(|| DEFAULT_OPERATING_SYSTEM.to_string());

        let index_urls = match env_var("INDEX_URL") {
            Some(raw) => parse_index_urls(&raw)?,
            None => vec![DEFAULT_INDEX_URL.to_string()],
        };

        let cache_dir = env_var("CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(default_cache_dir);
        debug!("Effective cache dir set to: {}", cache_dir.display());

        let timeout = match env_var("TIMEOUT") {
            Some(raw) => Some(humantime::parse_duration(&raw).map_err(|e| {
                PydepsError::Config(format!("Invalid {ENV_PREFIX}TIMEOUT '{raw}': {e}"))
            })?),
            None => None,
        };

        let python_executable = env_var("PYTHON").unwrap_or_else(|| "python3".to_string());

        debug!("Configuration loaded successfully.");
        Ok(Self {
            python_version,
            operating_system,
            index_urls,
            cache_dir,
            max_rounds: DEFAULT_MAX_ROUNDS,
            use_cached_index: false,
            merge_indexes: false,
            use_pypi_json_api: false,
            prefer_source: false,
            ignore_errors: false,
            analyze_setup_py_insecurely: false,
            setup_py_fallback: SetupPyFallback::WhenEmpty,
            netrc_file: None,
            timeout,
            python_executable,
        })
    }

    /// A configuration rooted at `cache_dir` with every other value at its
    /// default, independent of the process environment.
    pub fn with_cache_dir(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            python_version: DEFAULT_PYTHON_VERSION.to_string(),
            operating_system: DEFAULT_OPERATING_SYSTEM.to_string(),
            index_urls: vec![DEFAULT_INDEX_URL.to_string()],
            cache_dir: cache_dir.into(),
            max_rounds: DEFAULT_MAX_ROUNDS,
            use_cached_index: false,
            merge_indexes: false,
            use_pypi_json_api: false,
            prefer_source: false,
            ignore_errors: false,
            analyze_setup_py_insecurely: false,
            setup_py_fallback: SetupPyFallback::WhenEmpty,
            netrc_file: None,
            timeout: None,
            python_executable: "python3".to_string(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn index_cache_dir(&self) -> PathBuf {
        self.cache_dir.join("index")
    }

    pub fn artifact_cache_dir(&self) -> PathBuf {
        self.cache_dir.join("artifacts")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.cache_dir.join("logs")
    }

    pub fn home_dir(&self) -> PathBuf {
        UserDirs::new().map_or_else(|| PathBuf::from("/"), |ud| ud.home_dir().to_path_buf())
    }

    /// `--netrc` if given, else `~/.netrc`, else `~/_netrc`.
    pub fn resolve_netrc_path(&self) -> Result<Option<PathBuf>> {
        if let Some(path) = &self.netrc_file {
            if !path.exists() {
                return Err(PydepsError::Config(format!(
                    "Missing netrc file {}",
                    path.display()
                )));
            }
            return Ok(Some(path.clone()));
        }
        let home = self.home_dir();
        for candidate in [".netrc", "_netrc"] {
            let path = home.join(candidate);
            if path.is_file() {
                debug!("Using netrc file {}", path.display());
                return Ok(Some(path));
            }
        }
        Ok(None)
    }

    pub fn is_default_index(&self, index_url: &str) -> bool {
        index_url.trim_end_matches('/') == DEFAULT_INDEX_URL
    }
}

/// Splits a comma separated index list, trimming trailing slashes.
pub fn parse_index_urls(raw: &str) -> Result<Vec<String>> {
    let urls: Vec<String> = raw
        .split(',')
        .map(|s| s.trim().trim_end_matches('/').to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if urls.is_empty() {
        return Err(PydepsError::Config(format!(
            "{ENV_PREFIX}INDEX_URL must contain at least one URL"
        )));
    }
    Ok(urls)
}

fn env_var(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}{name}"))
        .ok()
        .filter(|s| !s.trim().is_empty())
}

fn default_cache_dir() -> PathBuf {
    BaseDirs::new()
        .map(|dirs| dirs.cache_dir().join("pydeps"))
        .unwrap_or_else(|| PathBuf::from(".pydeps-cache"))
}

pub fn load_config() -> Result<Config> {
    Config::load()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_urls_are_split_and_trimmed() {
        let urls = parse_index_urls("https://a.example/simple/, https://b.example/simple").unwrap();
        assert_eq!(
            urls,
            vec![
                "https://a.example/simple".to_string(),
                "https://b.example/simple".to_string()
            ]
        );
        assert!(parse_index_urls(" , ").is_err());
    }

    #[test]
    fn default_index_detection_ignores_trailing_slash() {
        let config = Config::with_cache_dir("/tmp/x");
        assert!(config.is_default_index("https://pypi.org/simple/"));
        assert!(!config.is_default_index("https://mirror.example/simple"));
    }
}
