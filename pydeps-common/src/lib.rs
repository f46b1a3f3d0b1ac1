// pydeps-common/src/lib.rs
pub mod cache;
pub mod config;
pub mod dependency;
pub mod error;
pub mod model;

// Re-export key types
pub use cache::{Cache, CacheMode};
pub use config::Config;
pub use error::{PydepsError, Result};
pub use model::{Candidate, Environment, PackageIdentity, Requirement, Version};
