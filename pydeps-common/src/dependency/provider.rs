// pydeps-common/src/dependency/provider.rs
//! The seam between the resolution engine and a package source.

use std::sync::Arc;

use crate::error::Result;
use crate::model::candidate::{Candidate, PackageIdentity};
use crate::model::requirement::Requirement;

/// Supplies candidates and their dependencies to the engine.
///
/// `find_matches` must return a deterministic, preference-ordered list: the
/// engine tries candidates front to back and never reorders them.
#[allow(async_fn_in_trait)]
pub trait CandidateProvider {
    fn identify(&self, candidate: &Candidate) -> PackageIdentity {
        candidate.identity()
    }

    /// Candidates for `identifier` that satisfy every requirement in
    /// `requirements`, best first.
    async fn find_matches(
        &self,
        identifier: &str,
        requirements: &[Arc<Requirement>],
    ) -> Result<Vec<Candidate>>;

    /// Name, specifier (pre-releases allowed) and extras subset.
    fn is_satisfied_by(&self, requirement: &Requirement, candidate: &Candidate) -> bool {
        requirement.name == candidate.name
            && requirement
                .specifier
                .contains(&candidate.version, Some(true))
            && requirement.extras.is_subset(&candidate.extras)
    }

    /// Dependencies of `candidate` that apply to the active environment.
    async fn get_dependencies(&self, candidate: &Candidate) -> Result<Vec<Requirement>>;

    /// Warms listings for `names` ahead of the `find_matches` calls that
    /// follow. Implementations fetch concurrently and merge before returning.
    async fn prefetch(&self, _names: &[String]) {}
}
