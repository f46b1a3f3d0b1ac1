// pydeps-core/src/provider.rs
//! Candidate provider backed by simple-index registries.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::join_all;
use pydeps_aio::extract::{read_sdist_manifest_async, read_wheel_metadata_async, SdistManifest};
use pydeps_common::dependency::{CandidateProvider, ResolutionContext};
use pydeps_common::error::Result;
use pydeps_common::model::artifact::{Artifact, PackageVersion};
use pydeps_common::model::metadata::{parse_requirement_lines, requires_txt_lines, CoreMetadata};
use pydeps_common::model::{Candidate, Requirement, Version};
use pydeps_common::model::specifier::SpecifierSet;
use pydeps_net::http::IndexFetcher;
use pydeps_net::registry::RegistryClient;
use tracing::{debug, warn};

use crate::manifest::setup_py::{parse_setup_cfg_text, parse_setup_py_text};

type DependencyMemo = BTreeMap<(String, Version), Arc<Vec<Requirement>>>;

pub struct PypiProvider<F: IndexFetcher> {
    registry: RegistryClient<F>,
    context: ResolutionContext,
    versions: Mutex<BTreeMap<String, Arc<Vec<PackageVersion>>>>,
    dependencies: Mutex<DependencyMemo>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<F: IndexFetcher> PypiProvider<F> {
    pub fn new(registry: RegistryClient<F>, context: ResolutionContext) -> Self {
        Self {
            registry,
            context,
            versions: Mutex::new(BTreeMap::new()),
            dependencies: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn registry(&self) -> &RegistryClient<F> {
        &self.registry
    }

    pub fn context(&self) -> &ResolutionContext {
        &self.context
    }

    /// Every listed version of `name`, newest first. Listings are fetched
    /// once per run.
    pub async fn versions(&self, name: &str) -> Arc<Vec<PackageVersion>> {
        if let Some(found) = lock(&self.versions).get(name) {
            return Arc::clone(found);
        }
        let listed = Arc::new(self.registry.list_versions(name).await);
        lock(&self.versions)
            .entry(name.to_string())
            .or_insert(listed)
            .clone()
    }

    /// The artifact a version would be fetched from here, or `None` when
    /// nothing published for it is installable.
    pub fn choose_artifact(&self, version: &PackageVersion, allow_yanked: bool) -> Option<Artifact> {
        let environment = &self.context.environment;
        let usable = version
            .artifacts
            .iter()
            .filter(|a| allow_yanked || !a.yanked)
            .filter(|a| environment.is_compatible(a));
        let mut wheel: Option<(usize, &Artifact)> = None;
        let mut sdist: Option<&Artifact> = None;
        for artifact in usable {
            if artifact.is_sdist() {
                sdist = sdist.or(Some(artifact));
            } else if let Some(rank) = environment.wheel_rank(artifact) {
                if wheel.map_or(true, |(best, _)| rank < best) {
                    wheel = Some((rank, artifact));
                }
            }
        }
        let wheel = wheel.map(|(_, a)| a);
        let chosen = if self.context.prefer_source {
            sdist.or(wheel)
        } else {
            wheel.or(sdist)
        };
        chosen.cloned()
    }

    /// Raw `Requires-Dist` of a candidate's artifact, before marker
    /// evaluation. Failures are logged and read as no dependencies.
    async fn requirements_of(&self, candidate: &Candidate) -> Arc<Vec<Requirement>> {
        let key = (candidate.name.clone(), candidate.version.clone());
        if let Some(found) = lock(&self.dependencies).get(&key) {
            return Arc::clone(found);
        }
        let requirements = match &candidate.artifact {
            Some(artifact) => match self.load_requirements(artifact).await {
                Ok(requirements) => requirements,
                Err(e) => {
                    if self.context.ignore_errors {
                        debug!("Ignoring metadata failure for {candidate}: {e}");
                    } else {
                        warn!("Could not read dependencies of {candidate}: {e}");
                    }
                    Vec::new()
                }
            },
            None => Vec::new(),
        };
        lock(&self.dependencies)
            .entry(key)
            .or_insert_with(|| Arc::new(requirements))
            .clone()
    }

    async fn load_requirements(&self, artifact: &Artifact) -> Result<Vec<Requirement>> {
        if artifact.has_metadata {
            match self.registry.fetch_metadata(artifact).await {
                Ok(Some(text)) => {
                    debug!("Using published metadata for {}", artifact.filename);
                    return Ok(CoreMetadata::parse(&text).requirements());
                }
                Ok(None) => {}
                Err(e) => debug!("Metadata file for {} unavailable: {e}", artifact.filename),
            }
        }

        let bytes = self.registry.fetch_artifact(artifact).await?;
        if artifact.is_wheel() {
            return Ok(match read_wheel_metadata_async(bytes).await? {
                Some(text) => CoreMetadata::parse(&text).requirements(),
                None => {
                    warn!("{} has no METADATA", artifact.filename);
                    Vec::new()
                }
            });
        }
        let manifest = read_sdist_manifest_async(bytes, artifact.filename.clone()).await?;
        Ok(sdist_requirements(&manifest, &artifact.filename))
    }
}

/// PKG-INFO `Requires-Dist`, then egg-info `requires.txt`, then static
/// `setup.py`, then `setup.cfg`.
fn sdist_requirements(manifest: &SdistManifest, filename: &str) -> Vec<Requirement> {
    if let Some(pkg_info) = &manifest.pkg_info {
        let metadata = CoreMetadata::parse(pkg_info);
        if !metadata.requires_dist.is_empty() {
            return metadata.requirements();
        }
    }
    if let Some(requires_txt) = &manifest.requires_txt {
        let lines = requires_txt_lines(requires_txt);
        return parse_requirement_lines(lines.iter().map(String::as_str));
    }
    let mut lines: Vec<String> = Vec::new();
    if let Some(setup_py) = &manifest.setup_py {
        lines = parse_setup_py_text(setup_py).requirement_lines();
    }
    if lines.is_empty() {
        if let Some(setup_cfg) = &manifest.setup_cfg {
            lines = parse_setup_cfg_text(setup_cfg).requirement_lines();
        }
    }
    if lines.is_empty() {
        debug!("No declared dependencies found in {filename}");
    }
    parse_requirement_lines(lines.iter().map(String::as_str))
}

impl<F: IndexFetcher> CandidateProvider for PypiProvider<F> {
    async fn find_matches(
        &self,
        identifier: &str,
        requirements: &[Arc<Requirement>],
    ) -> Result<Vec<Candidate>> {
        let Some(first) = requirements.first() else {
            return Ok(Vec::new());
        };
        let name = first.name.clone();
        let extras = first.extras.clone();
        let specifier = requirements
            .iter()
            .fold(SpecifierSet::default(), |acc, r| acc.merged(&r.specifier));
        let pinned = requirements.iter().any(|r| r.specifier.is_pinned());

        let versions = self.versions(&name).await;
        let mut installable: BTreeMap<&Version, Artifact> = BTreeMap::new();
        for version in versions.iter() {
            if version.is_yanked() && !pinned {
                debug!("Skipping yanked {name} {}", version.version);
                continue;
            }
            match self.choose_artifact(version, pinned) {
                Some(artifact) => {
                    installable.insert(&version.version, artifact);
                }
                None => debug!("No installable artifact for {name} {}", version.version),
            }
        }

        let allowed = specifier.filter(
            versions
                .iter()
                .map(|v| &v.version)
                .filter(|v| installable.contains_key(v)),
            None,
        );
        let candidates: Vec<Candidate> = allowed
            .into_iter()
            .filter_map(|version| {
                let artifact = installable.get(version)?.clone();
                Some(
                    Candidate::new(name.clone(), version.clone())
                        .with_extras(extras.clone())
                        .with_artifact(artifact),
                )
            })
            .collect();
        debug!("{identifier}: {} candidate(s) for {specifier}", candidates.len());
        Ok(candidates)
    }

    async fn get_dependencies(&self, candidate: &Candidate) -> Result<Vec<Requirement>> {
        let requirements = self.requirements_of(candidate).await;
        let markers = self.context.environment.markers();
        let mut dependencies = Vec::new();

        if !candidate.extras.is_empty() {
            // `name[extra]` pins the same release as `name`.
            let mut base = Requirement::unconstrained(&candidate.name);
            base.specifier = SpecifierSet::parse(&format!("=={}", candidate.version))?;
            dependencies.push(base);
        }

        for requirement in requirements.iter() {
            let applies = if candidate.extras.is_empty() {
                requirement.applies_to(markers)
            } else {
                let gated = requirement
                    .marker
                    .as_ref()
                    .is_some_and(|marker| marker.mentions_extra());
                if !gated {
                    continue;
                }
                candidate.extras.iter().try_fold(false, |any, extra| {
                    Ok::<bool, pydeps_common::PydepsError>(
                        any || requirement.applies_to(&markers.with_extra(extra))?,
                    )
                })
            };
            match applies {
                Ok(true) => dependencies.push(requirement.clone()),
                Ok(false) => {}
                Err(e) => warn!("Skipping {requirement} of {candidate}: {e}"),
            }
        }
        Ok(dependencies)
    }

    async fn prefetch(&self, names: &[String]) {
        let missing: Vec<&String> = {
            let memo = lock(&self.versions);
            names.iter().filter(|n| !memo.contains_key(*n)).collect()
        };
        if missing.len() < 2 {
            return;
        }
        debug!("Prefetching {} listings", missing.len());
        let listed = join_all(missing.iter().map(|name| self.registry.list_versions(name))).await;
        let mut memo = lock(&self.versions);
        for (name, versions) in missing.into_iter().zip(listed) {
            memo.entry(name.clone()).or_insert_with(|| Arc::new(versions));
        }
    }
}
