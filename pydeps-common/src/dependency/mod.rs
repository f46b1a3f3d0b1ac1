pub mod context;
pub mod graph;
pub mod provider;
pub mod resolver;

pub use context::ResolutionContext;
pub use graph::{
    flat_graph_entries, to_flat_graph, to_package_list, to_pdt_tree, to_tree, FlatEntry, PdtNode,
    ResolutionGraph, ResolvedPackage, TreeNode,
};
pub use provider::CandidateProvider;
pub use resolver::{DependencyResolver, IdentifierStatus, ResolutionResult, ResolvedEdge};
