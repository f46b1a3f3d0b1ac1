// src/model/mod.rs
// Declares the modules within the model directory.
pub mod artifact;
pub mod candidate;
pub mod environment;
pub mod marker;
pub mod metadata;
pub mod requirement;
pub mod specifier;
pub mod version;

// Re-export
pub use artifact::{Artifact, DistributionKind, PackageVersion, WheelTag};
pub use candidate::{Candidate, PackageIdentity};
pub use environment::{select_compatible_environment, Environment, OperatingSystem};
pub use marker::{evaluate_marker, MarkerEnvironment, MarkerTree};
pub use metadata::CoreMetadata;
pub use requirement::{canonicalize_name, Requirement};
pub use specifier::{parse_specifier, Specifier, SpecifierSet};
pub use version::Version;
