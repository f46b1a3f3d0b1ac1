// pydeps/src/cli/resolve.rs
use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use colored::Colorize;
use pydeps_aio::{write_json_async, write_json_stdout};
use pydeps_common::config::SetupPyFallback;
use pydeps_common::error::{PydepsError, Result};
use pydeps_common::Config;
use pydeps_core::{resolve_dependencies, GraphFormat, ResolveRequest};
use tracing::debug;

#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// pip requirements file; may be repeated.
    #[arg(short = 'r', long = "requirement", value_name = "FILE")]
    pub requirement_files: Vec<PathBuf>,

    /// Requirement string such as `requests>=2`; may be repeated.
    #[arg(short = 's', long = "specifier", value_name = "REQ")]
    pub specifiers: Vec<String>,

    #[arg(long = "setup-py", value_name = "FILE")]
    pub setup_py: Option<PathBuf>,

    /// Target python version, e.g. 39 or 3.9.
    #[arg(short = 'p', long)]
    pub python_version: Option<String>,

    /// Target operating system: linux, mac or windows.
    #[arg(short = 'o', long)]
    pub operating_system: Option<String>,

    /// Simple index URL; may be repeated. Replaces the configured indexes.
    #[arg(long = "index-url", value_name = "URL")]
    pub index_urls: Vec<String>,

    #[arg(long, value_name = "FILE")]
    pub netrc: Option<PathBuf>,

    /// Write the JSON document here, or to stdout with `-`.
    #[arg(long, value_name = "FILE")]
    pub json: Option<PathBuf>,

    /// Emit a nested tree of purls instead of the flat graph.
    #[arg(long, conflicts_with = "pdt_output")]
    pub tree: bool,

    /// Emit a pipdeptree-style tree instead of the flat graph.
    #[arg(long)]
    pub pdt_output: bool,

    /// Echo only the file name of each input file.
    #[arg(long)]
    pub generic_paths: bool,

    /// List versions from the PyPI JSON API instead of the simple indexes.
    #[arg(long)]
    pub use_pypi_json_api: bool,

    #[arg(long)]
    pub max_rounds: Option<usize>,

    /// Read index pages from the cache when present.
    #[arg(long)]
    pub use_cached_index: bool,

    /// Combine versions from every index instead of stopping at the first hit.
    #[arg(long)]
    pub merge_indexes: bool,

    /// Report source distributions instead of wheels.
    #[arg(long)]
    pub prefer_source: bool,

    #[arg(long)]
    pub ignore_errors: bool,

    /// Run setup.py in a python subprocess to read its requirements.
    #[arg(long)]
    pub analyze_setup_py_insecurely: bool,

    /// Also consult setup.cfg when setup.py declares requirements.
    #[arg(long)]
    pub always_read_setup_cfg: bool,

    /// Overall limit, e.g. `90s` or `5m`.
    #[arg(long, value_parser = humantime::parse_duration)]
    pub timeout: Option<Duration>,
}

impl ResolveArgs {
    /// Layers the flags over the loaded configuration.
    pub fn apply(&self, mut config: Config) -> Result<Config> {
        if let Some(version) = &self.python_version {
            config.python_version = version.clone();
        }
        if let Some(os) = &self.operating_system {
            config.operating_system = os.clone();
        }
        if !self.index_urls.is_empty() {
            config.index_urls = self
                .index_urls
                .iter()
                .map(|url| url.trim_end_matches('/').to_string())
                .collect();
        }
        if let Some(netrc) = &self.netrc {
            config.netrc_file = Some(netrc.clone());
        }
        if let Some(max_rounds) = self.max_rounds {
            if max_rounds == 0 {
                return Err(PydepsError::Config("--max-rounds must be positive".to_string()));
            }
            config.max_rounds = max_rounds;
        }
        if self.timeout.is_some() {
            config.timeout = self.timeout;
        }
        config.use_cached_index |= self.use_cached_index;
        config.merge_indexes |= self.merge_indexes;
        config.use_pypi_json_api |= self.use_pypi_json_api;
        config.prefer_source |= self.prefer_source;
        config.ignore_errors |= self.ignore_errors;
        config.analyze_setup_py_insecurely |= self.analyze_setup_py_insecurely;
        if self.always_read_setup_cfg {
            config.setup_py_fallback = SetupPyFallback::Always;
        }
        Ok(config)
    }

    pub fn format(&self) -> GraphFormat {
        if self.pdt_output {
            GraphFormat::Pdt
        } else if self.tree {
            GraphFormat::Tree
        } else {
            GraphFormat::Flat
        }
    }

    pub async fn run(&self, config: &Config) -> Result<()> {
        if self.requirement_files.is_empty() && self.specifiers.is_empty() && self.setup_py.is_none() {
            return Err(PydepsError::Config(
                "nothing to resolve: pass --requirement, --specifier or --setup-py".to_string(),
            ));
        }
        let config = self.apply(config.clone())?;
        debug!(
            "Resolving for python {} on {} using {} index(es)",
            config.python_version,
            config.operating_system,
            config.index_urls.len()
        );

        let request = ResolveRequest {
            requirement_files: self.requirement_files.clone(),
            setup_py_file: self.setup_py.clone(),
            specifiers: self.specifiers.clone(),
            format: self.format(),
            generic_paths: self.generic_paths,
        };
        let resolution = resolve_dependencies(&request, &config).await?;

        match self.json.as_deref() {
            Some(path) if path.as_os_str() == "-" => write_json_stdout(&resolution)?,
            Some(path) => {
                write_json_async(path, &resolution).await?;
                eprintln!(
                    "{} Resolved {} package(s); wrote {}",
                    "==>".bold().blue(),
                    resolution.packages.len(),
                    path.display()
                );
            }
            None => write_json_stdout(&resolution)?,
        }
        Ok(())
    }
}
