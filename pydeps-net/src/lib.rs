// pydeps-net/src/lib.rs
pub mod http;
pub mod json_api;
pub mod netrc;
pub mod registry;
pub mod simple;
pub mod validation;

pub use http::{build_http_client, HttpFetcher, IndexFetcher};
pub use json_api::parse_json_api_page;
pub use netrc::{Credentials, Netrc};
pub use pydeps_common::{
    cache::{Cache, CacheMode, CachedPage},
    error::{PydepsError, Result},
    Config,
};
pub use registry::{EndpointKind, IndexEndpoint, RegistryClient};
pub use simple::parse_project_page;
pub use validation::{sha256_hex, validate_url, verify_checksum, verify_content_type};
