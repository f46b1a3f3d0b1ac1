// pydeps-common/src/dependency/graph.rs
//! Views over a finished resolution: flat parent/children mapping, nested
//! tree and package list. Extras identifiers fold into their base package.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use super::resolver::ResolutionResult;
use crate::model::artifact::Artifact;
use crate::model::candidate::PackageIdentity;

pub type FlatGraph = BTreeMap<PackageIdentity, BTreeSet<PackageIdentity>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlatEntry {
    pub package: String,
    pub dependencies: Vec<String>,
}

/// Nested view keyed by purl.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeNode {
    pub package: String,
    pub dependencies: Vec<TreeNode>,
    /// Set on a node that repeats one of its ancestors; its children are cut.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub cycle: bool,
}

/// Nested view in the pipdeptree JSON shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PdtNode {
    pub key: String,
    pub package_name: String,
    pub installed_version: String,
    pub dependencies: Vec<PdtNode>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub cycle: bool,
}

trait NestedNode: Sized {
    fn leaf(identity: &PackageIdentity) -> Self;
    fn push_child(&mut self, child: Self);
    fn mark_cycle(&mut self);
}

impl NestedNode for TreeNode {
    fn leaf(identity: &PackageIdentity) -> Self {
        Self {
            package: identity.purl(),
            dependencies: Vec::new(),
            cycle: false,
        }
    }

    fn push_child(&mut self, child: Self) {
        self.dependencies.push(child);
    }

    fn mark_cycle(&mut self) {
        self.cycle = true;
    }
}

impl NestedNode for PdtNode {
    fn leaf(identity: &PackageIdentity) -> Self {
        Self {
            key: identity.name.clone(),
            package_name: identity.name.clone(),
            installed_version: identity.version.to_string(),
            dependencies: Vec::new(),
            cycle: false,
        }
    }

    fn push_child(&mut self, child: Self) {
        self.dependencies.push(child);
    }

    fn mark_cycle(&mut self) {
        self.cycle = true;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedPackage {
    pub identity: PackageIdentity,
    pub artifact: Option<Artifact>,
}

/// The `resolution` member of the output document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ResolutionGraph {
    Flat(Vec<FlatEntry>),
    Tree(Vec<TreeNode>),
    Pdt(Vec<PdtNode>),
}

/// Direct children per resolved package; leaves map to an empty set.
pub fn to_flat_graph(result: &ResolutionResult) -> FlatGraph {
    let mut graph: FlatGraph = BTreeMap::new();
    for candidate in result.pins.values() {
        graph.entry(candidate.identity()).or_default();
    }
    for edge in &result.edges {
        let Some(parent) = edge.parent.as_ref().and_then(|p| result.pins.get(p)) else {
            continue;
        };
        let Some(child) = result.pins.get(&edge.child) else {
            continue;
        };
        let (parent, child) = (parent.identity(), child.identity());
        // `name[extra]` depends on `name` itself.
        if parent != child {
            graph.entry(parent).or_default().insert(child);
        }
    }
    graph
}

pub fn flat_graph_entries(graph: &FlatGraph) -> Vec<FlatEntry> {
    graph
        .iter()
        .map(|(package, children)| FlatEntry {
            package: package.purl(),
            dependencies: children.iter().map(PackageIdentity::purl).collect(),
        })
        .collect()
}

pub fn to_tree(result: &ResolutionResult) -> Vec<TreeNode> {
    nested(result)
}

pub fn to_pdt_tree(result: &ResolutionResult) -> Vec<PdtNode> {
    nested(result)
}

/// One tree per direct requirement. Cycles are cut with a marker.
fn nested<N: NestedNode>(result: &ResolutionResult) -> Vec<N> {
    let graph = to_flat_graph(result);
    let roots: BTreeSet<PackageIdentity> = result
        .roots
        .iter()
        .filter_map(|root| result.pins.get(root))
        .map(|candidate| candidate.identity())
        .collect();
    let mut path = Vec::new();
    roots
        .iter()
        .map(|root| build_node(root, &graph, &mut path))
        .collect()
}

fn build_node<N: NestedNode>(
    identity: &PackageIdentity,
    graph: &FlatGraph,
    path: &mut Vec<PackageIdentity>,
) -> N {
    let mut node = N::leaf(identity);
    if path.contains(identity) {
        node.mark_cycle();
        return node;
    }
    path.push(identity.clone());
    if let Some(children) = graph.get(identity) {
        for child in children {
            node.push_child(build_node(child, graph, path));
        }
    }
    path.pop();
    node
}

/// One entry per resolved package identity, ordered by name then version.
/// The artifact comes from the plain (no extras) pin when there is one.
pub fn to_package_list(result: &ResolutionResult) -> Vec<ResolvedPackage> {
    let mut packages: BTreeMap<PackageIdentity, Option<Artifact>> = BTreeMap::new();
    for candidate in result.pins.values() {
        let slot = packages.entry(candidate.identity()).or_insert(None);
        if slot.is_none() || candidate.extras.is_empty() {
            *slot = candidate.artifact.clone();
        }
    }
    packages
        .into_iter()
        .map(|(identity, artifact)| ResolvedPackage { identity, artifact })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::dependency::resolver::tests::{context, TableProvider};
    use crate::dependency::resolver::{DependencyResolver, ResolvedEdge};
    use crate::model::candidate::Candidate;
    use crate::model::requirement::Requirement;
    use crate::model::version::Version;

    async fn resolve(table: &TableProvider, lines: &[&str]) -> ResolutionResult {
        let reqs: Vec<Requirement> = lines.iter().map(|l| Requirement::parse(l).unwrap()).collect();
        let ctx = context(100);
        DependencyResolver::new(table, &ctx).resolve(&reqs).await.unwrap()
    }

    #[tokio::test]
    async fn flat_and_tree_views_agree() {
        let mut table = TableProvider::default();
        table
            .add("app", "1.0", &["lib[speed]>=1", "util"])
            .add("lib", "1.2", &["util<2"])
            .add("util", "1.5", &[]);
        let result = resolve(&table, &["app"]).await;

        let flat = flat_graph_entries(&to_flat_graph(&result));
        assert_eq!(
            flat,
            vec![
                FlatEntry {
                    package: "pkg:pypi/app@1.0".to_string(),
                    dependencies: vec![
                        "pkg:pypi/lib@1.2".to_string(),
                        "pkg:pypi/util@1.5".to_string()
                    ],
                },
                FlatEntry {
                    package: "pkg:pypi/lib@1.2".to_string(),
                    dependencies: vec!["pkg:pypi/util@1.5".to_string()],
                },
                FlatEntry {
                    package: "pkg:pypi/util@1.5".to_string(),
                    dependencies: vec![],
                },
            ]
        );

        let tree = to_tree(&result);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].package, "pkg:pypi/app@1.0");
        assert_eq!(tree[0].dependencies[0].package, "pkg:pypi/lib@1.2");
        assert_eq!(
            tree[0].dependencies[0].dependencies[0].package,
            "pkg:pypi/util@1.5"
        );

        let pdt = to_pdt_tree(&result);
        assert_eq!(pdt.len(), 1);
        assert_eq!(pdt[0].key, "app");
        assert_eq!(pdt[0].dependencies.len(), 2);
        assert_eq!(pdt[0].dependencies[0].dependencies[0].installed_version, "1.5");

        let packages = to_package_list(&result);
        let names: Vec<String> = packages.iter().map(|p| p.identity.purl()).collect();
        assert_eq!(
            names,
            vec!["pkg:pypi/app@1.0", "pkg:pypi/lib@1.2", "pkg:pypi/util@1.5"]
        );
    }

    #[tokio::test]
    async fn single_package_without_children() {
        let mut table = TableProvider::default();
        table.add("pkg-a", "1.5", &[]);
        let result = resolve(&table, &["pkg-a>=1.0,<2.0"]).await;
        let graph = to_flat_graph(&result);
        assert_eq!(graph.len(), 1);
        assert!(graph.values().all(BTreeSet::is_empty));
        let json = serde_json::to_value(ResolutionGraph::Pdt(to_pdt_tree(&result))).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{
                "key": "pkg-a",
                "package_name": "pkg-a",
                "installed_version": "1.5",
                "dependencies": []
            }])
        );
        let json = serde_json::to_value(ResolutionGraph::Tree(to_tree(&result))).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{ "package": "pkg:pypi/pkg-a@1.5", "dependencies": [] }])
        );
    }

    #[test]
    fn cycles_are_cut_with_a_marker() {
        let a = Candidate::new("a", Version::parse("1.0").unwrap());
        let b = Candidate::new("b", Version::parse("2.0").unwrap());
        let edge = |parent: Option<&str>, child: &str| ResolvedEdge {
            parent: parent.map(str::to_string),
            child: child.to_string(),
            requirement: Arc::new(Requirement::unconstrained(child)),
        };
        let result = ResolutionResult {
            pins: [("a".to_string(), a), ("b".to_string(), b)].into_iter().collect(),
            edges: vec![edge(None, "a"), edge(Some("a"), "b"), edge(Some("b"), "a")],
            roots: vec!["a".to_string()],
        };
        let tree = to_pdt_tree(&result);
        let b_node = &tree[0].dependencies[0];
        assert_eq!(b_node.key, "b");
        let again = &b_node.dependencies[0];
        assert_eq!(again.key, "a");
        assert!(again.cycle);
        assert!(again.dependencies.is_empty());
        let json = serde_json::to_value(&tree[0]).unwrap();
        assert!(json.get("cycle").is_none());

        let purls = to_tree(&result);
        let again = &purls[0].dependencies[0].dependencies[0];
        assert_eq!(again.package, "pkg:pypi/a@1.0");
        assert!(again.cycle);
    }
}
