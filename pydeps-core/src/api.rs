// pydeps-core/src/api.rs
//! Manifests in, resolution document out.

use std::path::PathBuf;
use std::sync::Arc;

use pydeps_common::config::Config;
use pydeps_common::dependency::{
    flat_graph_entries, to_flat_graph, to_package_list, to_pdt_tree, to_tree, DependencyResolver,
    ResolutionContext, ResolutionGraph,
};
use pydeps_common::error::{PydepsError, Result};
use pydeps_common::model::{select_compatible_environment, Environment, Requirement};
use pydeps_net::http::{HttpFetcher, IndexFetcher};
use pydeps_net::netrc::Netrc;
use pydeps_net::registry::RegistryClient;
use serde::Serialize;
use tracing::{debug, warn};

use crate::manifest::{
    generic_path, load_setup_py, parse_requirements_file, FileEntry, ManifestPackageData,
};
use crate::package_data::{PackageData, PackageDataFetcher};
use crate::provider::PypiProvider;

/// Shape of the `resolution` member.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GraphFormat {
    #[default]
    Flat,
    Tree,
    /// pipdeptree-style nested nodes.
    Pdt,
}

/// What to resolve.
#[derive(Debug, Clone, Default)]
pub struct ResolveRequest {
    pub requirement_files: Vec<PathBuf>,
    pub setup_py_file: Option<PathBuf>,
    pub specifiers: Vec<String>,
    pub format: GraphFormat,
    /// Echo manifest paths without their directory, for output that does not
    /// depend on where the inputs live.
    pub generic_paths: bool,
}

/// The output document: echoed manifests, enriched packages and the graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub files: Vec<FileEntry>,
    pub packages: Vec<PackageData>,
    pub resolution: ResolutionGraph,
}

impl Resolution {
    fn empty(files: Vec<FileEntry>) -> Self {
        Self {
            files,
            packages: Vec::new(),
            resolution: ResolutionGraph::Flat(Vec::new()),
        }
    }
}

pub async fn resolve_dependencies(request: &ResolveRequest, config: &Config) -> Result<Resolution> {
    let fetcher = HttpFetcher::new(config.timeout)?;
    resolve_dependencies_with(request, config, fetcher).await
}

/// [`resolve_dependencies`] over any transport.
pub async fn resolve_dependencies_with<F: IndexFetcher>(
    request: &ResolveRequest,
    config: &Config,
    fetcher: F,
) -> Result<Resolution> {
    let environment =
        select_compatible_environment(&config.python_version, &config.operating_system)?;
    debug!(
        "Target environment: python {} on {}",
        environment.python_version_string(),
        environment.operating_system().as_str()
    );

    let echoed_path = |path: &PathBuf| {
        if request.generic_paths {
            generic_path(path)
        } else {
            path.display().to_string()
        }
    };

    let netrc = match config.resolve_netrc_path()? {
        Some(path) => Some(Netrc::load(&path)?),
        None => None,
    };

    let mut config = config.clone();
    let mut direct: Vec<Requirement> = Vec::new();
    let mut files: Vec<FileEntry> = Vec::new();

    for path in &request.requirement_files {
        let parsed = parse_requirements_file(path)?;
        for url in parsed.index_urls() {
            if !config.index_urls.contains(&url) {
                config.index_urls.push(url);
            }
        }
        direct.extend(parsed.requirements.iter().cloned());
        files.push(FileEntry::new(echoed_path(path), parsed.package_data()));
    }

    for specifier in &request.specifiers {
        direct.push(Requirement::parse(specifier)?);
    }

    if let Some(path) = &request.setup_py_file {
        match load_setup_py(path, &config, &environment).await {
            Ok(manifest) => {
                direct.extend(manifest.requirements.iter().cloned());
                files.push(FileEntry::new(echoed_path(path), manifest.package_data()));
            }
            Err(e @ PydepsError::IncompatibleManifest { .. }) if !direct.is_empty() => {
                warn!("{e}; continuing without it");
                files.push(FileEntry::new(
                    echoed_path(path),
                    ManifestPackageData::new("pypi_setup_py"),
                ));
            }
            Err(e) => return Err(e),
        }
    }

    let direct = applicable_requirements(direct, &environment)?;
    if direct.is_empty() {
        debug!("No direct requirements to resolve");
        return Ok(Resolution::empty(files));
    }
    for requirement in &direct {
        debug!("Direct requirement: {requirement}");
    }

    let environment = Arc::new(environment);
    let context = ResolutionContext::from_config(&config, Arc::clone(&environment));
    let registry = RegistryClient::from_config(fetcher, &config, netrc.as_ref())?;
    for endpoint in registry.endpoints() {
        debug!("Index: {}", endpoint.url);
    }
    let provider = PypiProvider::new(registry, context.clone());

    let run = resolve_with_provider(&provider, &context, &direct, request.format);
    let (resolution, packages) = match config.timeout {
        Some(limit) => tokio::time::timeout(limit, run).await.map_err(|_| {
            PydepsError::Timeout(humantime::format_duration(limit).to_string())
        })??,
        None => run.await?,
    };

    Ok(Resolution {
        files,
        packages,
        resolution,
    })
}

async fn resolve_with_provider<F: IndexFetcher>(
    provider: &PypiProvider<F>,
    context: &ResolutionContext,
    direct: &[Requirement],
    format: GraphFormat,
) -> Result<(ResolutionGraph, Vec<PackageData>)> {
    let result = DependencyResolver::new(provider, context).resolve(direct).await?;
    let graph = match format {
        GraphFormat::Flat => ResolutionGraph::Flat(flat_graph_entries(&to_flat_graph(&result))),
        GraphFormat::Tree => ResolutionGraph::Tree(to_tree(&result)),
        GraphFormat::Pdt => ResolutionGraph::Pdt(to_pdt_tree(&result)),
    };
    let mut packages = Vec::new();
    for package in to_package_list(&result) {
        packages.extend(provider.fetch_package_data(&package).await?);
    }
    Ok((graph, packages))
}

/// Drops direct requirements whose marker excludes the target.
fn applicable_requirements(
    requirements: Vec<Requirement>,
    environment: &Environment,
) -> Result<Vec<Requirement>> {
    let mut kept = Vec::with_capacity(requirements.len());
    for requirement in requirements {
        if requirement.applies_to(environment.markers())? {
            kept.push(requirement);
        } else {
            debug!("Skipping {requirement}: marker excludes the target");
        }
    }
    Ok(kept)
}
