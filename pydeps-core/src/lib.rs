// pydeps-core/src/lib.rs
pub mod api;
pub mod manifest;
pub mod package_data;
pub mod provider;

pub use api::{
    resolve_dependencies, resolve_dependencies_with, GraphFormat, Resolution, ResolveRequest,
};
pub use manifest::{FileEntry, ManifestPackageData};
pub use package_data::{PackageData, PackageDataFetcher};
pub use provider::PypiProvider;
