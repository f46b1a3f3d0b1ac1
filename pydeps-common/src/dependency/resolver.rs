// pydeps-common/src/dependency/resolver.rs
//! Backtracking resolution over a [`CandidateProvider`].
//!
//! The engine keeps one working [`State`] plus a stack of snapshots taken
//! after every successful pin. Candidates live in an index-addressed pool so
//! snapshots only copy ids. When every candidate of the chosen identifier
//! conflicts, the engine backjumps: pins whose dependencies do not touch the
//! conflicting identifiers are dropped unchanged, and the newest pin that does
//! is recorded as incompatible in the criteria of the restored snapshot.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use tracing::{debug, warn};

use super::context::ResolutionContext;
use super::provider::CandidateProvider;
use crate::error::{ConflictCause, ConflictReport, PydepsError, Result};
use crate::model::candidate::Candidate;
use crate::model::requirement::Requirement;
use crate::model::version::Version;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct CandidateId(usize);

#[derive(Debug, Default)]
struct CandidatePool {
    candidates: Vec<Candidate>,
    index: BTreeMap<(String, Version), CandidateId>,
}

impl CandidatePool {
    fn intern(&mut self, candidate: Candidate) -> CandidateId {
        let key = (candidate.identifier(), candidate.version.clone());
        if let Some(id) = self.index.get(&key) {
            return *id;
        }
        let id = CandidateId(self.candidates.len());
        self.candidates.push(candidate);
        self.index.insert(key, id);
        id
    }

    fn get(&self, id: CandidateId) -> &Candidate {
        &self.candidates[id.0]
    }
}

#[derive(Debug, Clone)]
struct RequirementInformation {
    requirement: Arc<Requirement>,
    parent: Option<CandidateId>,
}

#[derive(Debug, Clone)]
struct Criterion {
    candidates: Vec<CandidateId>,
    information: Vec<RequirementInformation>,
    incompatibilities: Vec<CandidateId>,
}

impl Criterion {
    fn requirements(&self) -> Vec<Arc<Requirement>> {
        self.information
            .iter()
            .map(|info| Arc::clone(&info.requirement))
            .collect()
    }
}

/// No candidate satisfies the accumulated requirements of `identifier`.
#[derive(Debug, Clone)]
struct Conflict {
    identifier: String,
    information: Vec<RequirementInformation>,
}

#[derive(Debug, Clone, Default)]
struct State {
    mapping: BTreeMap<String, CandidateId>,
    pin_order: Vec<String>,
    criteria: BTreeMap<String, Criterion>,
}

impl State {
    fn pin(&mut self, name: &str, id: CandidateId) {
        self.pin_order.retain(|n| n != name);
        self.pin_order.push(name.to_string());
        self.mapping.insert(name.to_string(), id);
    }

    fn pop_pin(&mut self) -> Option<(String, CandidateId)> {
        let name = self.pin_order.pop()?;
        let id = self.mapping.remove(&name)?;
        Some((name, id))
    }
}

/// Progress of one identifier within a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierStatus {
    /// Not pinned, or pinned to a candidate some requirement now rejects.
    Pending,
    Satisfied,
    /// Every remaining candidate conflicts.
    Conflicted,
}

/// A requirement edge between two pinned identifiers. `parent` is `None` for
/// direct requirements.
#[derive(Debug, Clone)]
pub struct ResolvedEdge {
    pub parent: Option<String>,
    pub child: String,
    pub requirement: Arc<Requirement>,
}

#[derive(Debug, Clone)]
pub struct ResolutionResult {
    /// Identifier to pinned candidate.
    pub pins: BTreeMap<String, Candidate>,
    pub edges: Vec<ResolvedEdge>,
    /// Identifiers of the direct requirements, in input order.
    pub roots: Vec<String>,
}

pub struct DependencyResolver<'a, P: CandidateProvider> {
    provider: &'a P,
    context: &'a ResolutionContext,
    pool: CandidatePool,
    current: State,
    history: Vec<State>,
}

impl<'a, P: CandidateProvider> DependencyResolver<'a, P> {
    pub fn new(provider: &'a P, context: &'a ResolutionContext) -> Self {
        Self {
            provider,
            context,
            pool: CandidatePool::default(),
            current: State::default(),
            history: Vec::new(),
        }
    }

    pub async fn resolve(&mut self, requirements: &[Requirement]) -> Result<ResolutionResult> {
        debug!(
            "Starting resolution for {} direct requirement(s), max {} rounds",
            requirements.len(),
            self.context.max_rounds
        );
        self.pool = CandidatePool::default();
        self.current = State::default();
        self.history.clear();

        let names: BTreeSet<String> = requirements.iter().map(|r| r.name.clone()).collect();
        self.provider
            .prefetch(&names.into_iter().collect::<Vec<_>>())
            .await;

        let mut roots: Vec<String> = Vec::new();
        for requirement in requirements {
            if requirement.url.is_none() && !roots.contains(&requirement.key()) {
                roots.push(requirement.key());
            }
            let mut criteria = std::mem::take(&mut self.current.criteria);
            let outcome = self
                .add_to_criteria(&mut criteria, Arc::new(requirement.clone()), None)
                .await;
            self.current.criteria = criteria;
            if let Err(conflict) = outcome? {
                warn!("Direct requirements conflict on {}", conflict.identifier);
                return Err(PydepsError::ResolutionImpossible(
                    self.conflict_report(&conflict.information),
                ));
            }
        }
        self.push_new_state();

        for round in 0..self.context.max_rounds {
            let unsatisfied: Vec<&String> = self
                .current
                .criteria
                .keys()
                .filter(|name| self.status(name) == IdentifierStatus::Pending)
                .collect();

            let Some(name) = unsatisfied
                .into_iter()
                .min_by_key(|name| (self.current.criteria[*name].candidates.len(), *name))
                .cloned()
            else {
                debug!("Resolution finished after {round} rounds");
                return Ok(self.build_result(roots));
            };

            debug!(
                "Round {round}: pinning {name} ({} candidates)",
                self.current.criteria[&name].candidates.len()
            );
            let causes = self.attempt_to_pin(&name).await?;
            if causes.is_empty() {
                self.push_new_state();
                continue;
            }

            debug!("{name} is {:?}; backtracking", IdentifierStatus::Conflicted);
            let information: Vec<RequirementInformation> =
                causes.into_iter().flat_map(|c| c.information).collect();
            if !self.backjump(&information).await? {
                return Err(PydepsError::ResolutionImpossible(
                    self.conflict_report(&information),
                ));
            }
        }

        let pinned = self
            .current
            .pin_order
            .iter()
            .filter_map(|name| self.current.mapping.get(name))
            .map(|id| self.pool.get(*id).to_string())
            .collect();
        Err(PydepsError::RoundLimitExceeded {
            rounds: self.context.max_rounds,
            pinned,
        })
    }

    fn status(&self, name: &str) -> IdentifierStatus {
        let (Some(id), Some(criterion)) =
            (self.current.mapping.get(name), self.current.criteria.get(name))
        else {
            return IdentifierStatus::Pending;
        };
        let candidate = self.pool.get(*id);
        if criterion
            .information
            .iter()
            .all(|info| self.provider.is_satisfied_by(&info.requirement, candidate))
        {
            IdentifierStatus::Satisfied
        } else {
            IdentifierStatus::Pending
        }
    }

    fn push_new_state(&mut self) {
        self.history.push(self.current.clone());
    }

    async fn find_matches(
        &mut self,
        identifier: &str,
        requirements: &[Arc<Requirement>],
        incompatibilities: &[CandidateId],
    ) -> Result<Vec<CandidateId>> {
        let provider = self.provider;
        let found = provider.find_matches(identifier, requirements).await?;
        let mut ids = Vec::with_capacity(found.len());
        for candidate in found {
            let id = self.pool.intern(candidate);
            if !incompatibilities.contains(&id) && !ids.contains(&id) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    async fn add_to_criteria(
        &mut self,
        criteria: &mut BTreeMap<String, Criterion>,
        requirement: Arc<Requirement>,
        parent: Option<CandidateId>,
    ) -> Result<std::result::Result<(), Conflict>> {
        if let Some(url) = &requirement.url {
            warn!("Skipping direct URL requirement {} @ {url}", requirement.name);
            return Ok(Ok(()));
        }
        let identifier = requirement.key();
        let (mut information, incompatibilities) = match criteria.get(&identifier) {
            Some(existing) => (
                existing.information.clone(),
                existing.incompatibilities.clone(),
            ),
            None => (Vec::new(), Vec::new()),
        };
        information.push(RequirementInformation {
            requirement,
            parent,
        });
        let requirements: Vec<Arc<Requirement>> = information
            .iter()
            .map(|info| Arc::clone(&info.requirement))
            .collect();
        let candidates = self
            .find_matches(&identifier, &requirements, &incompatibilities)
            .await?;
        if candidates.is_empty() {
            return Ok(Err(Conflict {
                identifier,
                information,
            }));
        }
        criteria.insert(
            identifier,
            Criterion {
                candidates,
                information,
                incompatibilities,
            },
        );
        Ok(Ok(()))
    }

    async fn updated_criteria(
        &mut self,
        candidate_id: CandidateId,
    ) -> Result<std::result::Result<BTreeMap<String, Criterion>, Conflict>> {
        let mut criteria = self.current.criteria.clone();
        let provider = self.provider;
        let candidate = self.pool.get(candidate_id).clone();
        let dependencies = provider.get_dependencies(&candidate).await?;

        let names: BTreeSet<String> = dependencies.iter().map(|r| r.name.clone()).collect();
        provider.prefetch(&names.into_iter().collect::<Vec<_>>()).await;

        for dependency in dependencies {
            if let Err(conflict) = self
                .add_to_criteria(&mut criteria, Arc::new(dependency), Some(candidate_id))
                .await?
            {
                debug!("{candidate} conflicts on {}", conflict.identifier);
                return Ok(Err(conflict));
            }
        }
        Ok(Ok(criteria))
    }

    /// Pins the first candidate of `name` whose dependencies merge cleanly.
    /// Returns the conflicts seen when none does.
    async fn attempt_to_pin(&mut self, name: &str) -> Result<Vec<Conflict>> {
        let Some(criterion) = self.current.criteria.get(name).cloned() else {
            return Ok(Vec::new());
        };
        let mut causes = Vec::new();
        for candidate_id in criterion.candidates.iter().copied() {
            let criteria = match self.updated_criteria(candidate_id).await? {
                Ok(criteria) => criteria,
                Err(conflict) => {
                    causes.push(conflict);
                    continue;
                }
            };

            let candidate = self.pool.get(candidate_id);
            if let Some(info) = criterion
                .information
                .iter()
                .find(|info| !self.provider.is_satisfied_by(&info.requirement, candidate))
            {
                return Err(PydepsError::Generic(format!(
                    "Provider offered {candidate}, which does not satisfy {}",
                    info.requirement
                )));
            }

            debug!("Pinned {candidate}");
            self.current.criteria = criteria;
            self.current.pin(name, candidate_id);
            return Ok(Vec::new());
        }
        Ok(causes)
    }

    /// Identifiers named by a conflict: the requirements themselves and the
    /// candidates that asked for them.
    fn incompatible_identifiers(&self, causes: &[RequirementInformation]) -> BTreeSet<String> {
        let mut identifiers: BTreeSet<String> =
            causes.iter().map(|info| info.requirement.key()).collect();
        identifiers.extend(
            causes
                .iter()
                .filter_map(|info| info.parent)
                .map(|id| self.pool.get(id).identifier()),
        );
        identifiers
    }

    /// Whether any dependency of the pinned candidate is among `identifiers`.
    async fn depends_on_any(
        &self,
        candidate_id: CandidateId,
        identifiers: &BTreeSet<String>,
    ) -> Result<bool> {
        let dependencies = self
            .provider
            .get_dependencies(self.pool.get(candidate_id))
            .await?;
        Ok(dependencies
            .iter()
            .any(|dependency| identifiers.contains(&dependency.key())))
    }

    /// Drops pins, newest first, down to the most recent one whose
    /// dependencies touch the conflict, marks that candidate incompatible and
    /// narrows the criteria of the snapshot below it. Repeats while the
    /// narrowed criteria leave some identifier without candidates.
    async fn backjump(&mut self, causes: &[RequirementInformation]) -> Result<bool> {
        let incompatible = self.incompatible_identifiers(causes);
        debug!(
            "Conflict involves {}",
            incompatible.iter().cloned().collect::<Vec<_>>().join(", ")
        );
        loop {
            let (mut broken, name, candidate_id) = loop {
                if self.history.len() < 2 {
                    return Ok(false);
                }
                let Some(mut broken) = self.history.pop() else {
                    return Ok(false);
                };
                let Some((name, candidate_id)) = broken.pop_pin() else {
                    continue;
                };
                if self.depends_on_any(candidate_id, &incompatible).await? {
                    break (broken, name, candidate_id);
                }
                debug!(
                    "Backjumping over {}: unrelated to the conflict",
                    self.pool.get(candidate_id)
                );
            };
            let Some(base) = self.history.last() else {
                return Ok(false);
            };
            self.current = base.clone();
            debug!("Backtracking: dropping {}", self.pool.get(candidate_id));

            let mut incompatibilities: Vec<(String, Vec<CandidateId>)> =
                std::mem::take(&mut broken.criteria)
                    .into_iter()
                    .map(|(key, criterion)| (key, criterion.incompatibilities))
                    .collect();
            incompatibilities.push((name, vec![candidate_id]));

            if self.patch_criteria(incompatibilities).await? {
                return Ok(true);
            }
        }
    }

    async fn patch_criteria(
        &mut self,
        incompatibilities_from_broken: Vec<(String, Vec<CandidateId>)>,
    ) -> Result<bool> {
        for (identifier, mut incompatibilities) in incompatibilities_from_broken {
            if incompatibilities.is_empty() {
                continue;
            }
            let Some(criterion) = self.current.criteria.get(&identifier).cloned() else {
                continue;
            };
            incompatibilities.extend(criterion.incompatibilities.iter().copied());
            incompatibilities.sort();
            incompatibilities.dedup();

            let requirements = criterion.requirements();
            let candidates = self
                .find_matches(&identifier, &requirements, &incompatibilities)
                .await?;
            if candidates.is_empty() {
                debug!("No candidates left for {identifier}");
                return Ok(false);
            }
            self.current.criteria.insert(
                identifier,
                Criterion {
                    candidates,
                    information: criterion.information,
                    incompatibilities,
                },
            );
        }
        Ok(true)
    }

    fn conflict_report(&self, information: &[RequirementInformation]) -> ConflictReport {
        let mut packages: Vec<String> = Vec::new();
        let mut causes: Vec<ConflictCause> = Vec::new();
        for info in information {
            if !packages.contains(&info.requirement.name) {
                packages.push(info.requirement.name.clone());
            }
            let cause = ConflictCause {
                requirement: info.requirement.to_string(),
                parent: info.parent.map(|id| self.pool.get(id).to_string()),
            };
            if !causes.contains(&cause) {
                causes.push(cause);
            }
        }
        ConflictReport { packages, causes }
    }

    fn build_result(&self, roots: Vec<String>) -> ResolutionResult {
        let state = &self.current;
        let mut edges = Vec::new();
        for (child, criterion) in &state.criteria {
            for info in &criterion.information {
                let parent = match info.parent {
                    None => None,
                    Some(parent_id) => {
                        let key = self.pool.get(parent_id).identifier();
                        // Requirements left behind by an undone pin are stale.
                        if state.mapping.get(&key) != Some(&parent_id) {
                            continue;
                        }
                        Some(key)
                    }
                };
                edges.push(ResolvedEdge {
                    parent,
                    child: child.clone(),
                    requirement: Arc::clone(&info.requirement),
                });
            }
        }

        let mut reachable: BTreeSet<String> = BTreeSet::new();
        let mut queue: VecDeque<String> = roots.iter().cloned().collect();
        while let Some(key) = queue.pop_front() {
            if !state.mapping.contains_key(&key) || !reachable.insert(key.clone()) {
                continue;
            }
            for edge in edges
                .iter()
                .filter(|edge| edge.parent.as_deref() == Some(key.as_str()))
            {
                queue.push_back(edge.child.clone());
            }
        }

        edges.retain(|edge| {
            reachable.contains(&edge.child)
                && edge.parent.as_ref().map_or(true, |p| reachable.contains(p))
        });
        let pins = state
            .mapping
            .iter()
            .filter(|(key, _)| reachable.contains(*key))
            .map(|(key, id)| (key.clone(), self.pool.get(*id).clone()))
            .collect();
        ResolutionResult {
            pins,
            edges,
            roots: roots
                .into_iter()
                .filter(|root| reachable.contains(root))
                .collect(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::environment::select_compatible_environment;

    /// Registry-free provider over a fixed package table.
    #[derive(Default)]
    pub(crate) struct TableProvider {
        packages: BTreeMap<String, Vec<(Version, Vec<Requirement>)>>,
    }

    impl TableProvider {
        pub(crate) fn add(&mut self, name: &str, version: &str, deps: &[&str]) -> &mut Self {
            let deps = deps.iter().map(|d| Requirement::parse(d).unwrap()).collect();
            self.packages
                .entry(name.to_string())
                .or_default()
                .push((Version::parse(version).unwrap(), deps));
            self
        }
    }

    impl CandidateProvider for TableProvider {
        async fn find_matches(
            &self,
            _identifier: &str,
            requirements: &[Arc<Requirement>],
        ) -> Result<Vec<Candidate>> {
            let name = &requirements[0].name;
            let extras: BTreeSet<String> = requirements
                .iter()
                .flat_map(|r| r.extras.iter().cloned())
                .collect();
            let mut versions: Vec<&Version> = self
                .packages
                .get(name)
                .map(|entries| entries.iter().map(|(v, _)| v).collect())
                .unwrap_or_default();
            versions.sort();
            versions.reverse();
            Ok(versions
                .into_iter()
                .filter(|v| requirements.iter().all(|r| r.specifier.contains(v, None)))
                .map(|v| Candidate::new(name.clone(), v.clone()).with_extras(extras.clone()))
                .collect())
        }

        async fn get_dependencies(&self, candidate: &Candidate) -> Result<Vec<Requirement>> {
            let mut deps = Vec::new();
            if !candidate.extras.is_empty() {
                deps.push(Requirement::parse(&format!(
                    "{}=={}",
                    candidate.name, candidate.version
                ))?);
            }
            if let Some(entries) = self.packages.get(&candidate.name) {
                for (version, reqs) in entries {
                    if *version == candidate.version {
                        deps.extend(reqs.iter().cloned());
                    }
                }
            }
            Ok(deps)
        }
    }

    pub(crate) fn context(max_rounds: usize) -> ResolutionContext {
        let env = select_compatible_environment("39", "linux").unwrap();
        ResolutionContext::new(Arc::new(env), max_rounds)
    }

    fn reqs(lines: &[&str]) -> Vec<Requirement> {
        lines.iter().map(|l| Requirement::parse(l).unwrap()).collect()
    }

    fn pinned(result: &ResolutionResult) -> Vec<String> {
        result.pins.values().map(ToString::to_string).collect()
    }

    #[tokio::test]
    async fn resolves_a_chain_newest_first() {
        let mut table = TableProvider::default();
        table
            .add("a", "1.0", &["b>=1"])
            .add("a", "2.0", &["b>=2"])
            .add("b", "1.0", &[])
            .add("b", "2.0", &["c"])
            .add("c", "0.1", &[]);
        let ctx = context(100);
        let result = DependencyResolver::new(&table, &ctx)
            .resolve(&reqs(&["a"]))
            .await
            .unwrap();
        assert_eq!(pinned(&result), vec!["a==2.0", "b==2.0", "c==0.1"]);
        assert_eq!(result.roots, vec!["a".to_string()]);
        let edges: Vec<(Option<String>, String)> = result
            .edges
            .iter()
            .map(|e| (e.parent.clone(), e.child.clone()))
            .collect();
        assert!(edges.contains(&(None, "a".to_string())));
        assert!(edges.contains(&(Some("a".to_string()), "b".to_string())));
        assert!(edges.contains(&(Some("b".to_string()), "c".to_string())));
    }

    #[tokio::test]
    async fn backtracks_past_a_dead_end() {
        let mut table = TableProvider::default();
        table
            .add("a", "1.0", &[])
            .add("a", "2.0", &["b==1.0"])
            .add("b", "1.0", &["c>=2"])
            .add("c", "1.0", &[]);
        let ctx = context(100);
        let result = DependencyResolver::new(&table, &ctx)
            .resolve(&reqs(&["a"]))
            .await
            .unwrap();
        assert_eq!(pinned(&result), vec!["a==1.0"]);
        assert!(result.edges.iter().all(|e| e.child == "a"));
    }

    #[tokio::test]
    async fn conflicting_direct_requirements_fail_immediately() {
        let mut table = TableProvider::default();
        table.add("a", "1.0", &[]).add("a", "2.0", &[]);
        let ctx = context(100);
        let err = DependencyResolver::new(&table, &ctx)
            .resolve(&reqs(&["a<1.5", "a>=2"]))
            .await
            .unwrap_err();
        let report = match err {
            PydepsError::ResolutionImpossible(report) => report,
            other => panic!("expected ResolutionImpossible, got {other:?}"),
        };
        assert_eq!(report.packages, vec!["a".to_string()]);
        assert_eq!(report.causes.len(), 2);
        assert!(report.causes.iter().all(|c| c.parent.is_none()));
    }

    #[tokio::test]
    async fn transitive_conflict_names_both_parents() {
        let mut table = TableProvider::default();
        table
            .add("x", "1.0", &["z<2"])
            .add("y", "1.0", &["z>=2"])
            .add("z", "1.0", &[])
            .add("z", "2.0", &[]);
        let ctx = context(100);
        let err = DependencyResolver::new(&table, &ctx)
            .resolve(&reqs(&["x==1.0", "y==1.0"]))
            .await
            .unwrap_err();
        let report = match err {
            PydepsError::ResolutionImpossible(report) => report,
            other => panic!("expected ResolutionImpossible, got {other:?}"),
        };
        assert_eq!(report.packages, vec!["z".to_string()]);
        let parents: Vec<Option<String>> = report.causes.iter().map(|c| c.parent.clone()).collect();
        assert_eq!(
            parents,
            vec![Some("x==1.0".to_string()), Some("y==1.0".to_string())]
        );
    }

    fn pathological_table() -> TableProvider {
        // Every b rejects every a, so each a version costs a pin and a failed round.
        let mut table = TableProvider::default();
        for i in 1..=30 {
            let version = format!("{i}.0");
            table.add("a", &version, &["b"]);
            table.add("b", &version, &["a==0"]);
        }
        table
    }

    #[tokio::test]
    async fn round_limit_terminates_the_search() {
        let table = pathological_table();
        let ctx = context(10);
        let err = DependencyResolver::new(&table, &ctx)
            .resolve(&reqs(&["a"]))
            .await
            .unwrap_err();
        assert!(
            matches!(err, PydepsError::RoundLimitExceeded { rounds: 10, .. }),
            "{err:?}"
        );
    }

    #[tokio::test]
    async fn exhausted_search_reports_the_conflict() {
        let table = pathological_table();
        let ctx = context(1_000);
        let err = DependencyResolver::new(&table, &ctx)
            .resolve(&reqs(&["a"]))
            .await
            .unwrap_err();
        let report = match err {
            PydepsError::ResolutionImpossible(report) => report,
            other => panic!("expected ResolutionImpossible, got {other:?}"),
        };
        assert_eq!(report.packages, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn backjumps_over_unrelated_pins() {
        let mut table = TableProvider::default();
        table
            .add("a", "1.0", &[])
            .add("a", "2.0", &["c>=2"])
            .add("c", "1.0", &[])
            .add("c", "2.0", &[]);
        for i in 1..=100 {
            table.add("u", &format!("{i}.0"), &[]);
        }
        for i in 1..=150 {
            table.add("v", &format!("{i}.0"), &["c<2"]);
        }
        // Retrying every u before reaching a would need hundreds of rounds.
        let ctx = context(60);
        let result = DependencyResolver::new(&table, &ctx)
            .resolve(&reqs(&["a", "u", "v"]))
            .await
            .unwrap();
        assert_eq!(
            pinned(&result),
            vec!["a==1.0", "c==1.0", "u==100.0", "v==150.0"]
        );
    }

    #[tokio::test]
    async fn extras_pin_alongside_the_base_package() {
        let mut table = TableProvider::default();
        table.add("a", "1.0", &[]).add("a", "1.1", &[]);
        let ctx = context(100);
        let result = DependencyResolver::new(&table, &ctx)
            .resolve(&reqs(&["a[fast]", "a<1.1"]))
            .await
            .unwrap();
        assert_eq!(pinned(&result), vec!["a==1.0", "a[fast]==1.0"]);
    }

    #[tokio::test]
    async fn input_order_does_not_change_pins() {
        let mut table = TableProvider::default();
        table
            .add("a", "1.0", &["c<2"])
            .add("a", "2.0", &["c>=3"])
            .add("b", "1.0", &["c>=1"])
            .add("c", "1.0", &[])
            .add("c", "2.5", &[]);
        let ctx = context(100);
        let forward = DependencyResolver::new(&table, &ctx)
            .resolve(&reqs(&["a", "b", "c"]))
            .await
            .unwrap();
        let backward = DependencyResolver::new(&table, &ctx)
            .resolve(&reqs(&["c", "b", "a"]))
            .await
            .unwrap();
        assert_eq!(pinned(&forward), pinned(&backward));
        assert_eq!(pinned(&forward), vec!["a==1.0", "b==1.0", "c==1.0"]);
    }
}
