// pydeps-common/src/dependency/context.rs
use std::sync::Arc;

use crate::config::Config;
use crate::model::environment::Environment;

/// Immutable per-run settings threaded through the provider and the engine.
#[derive(Debug, Clone)]
pub struct ResolutionContext {
    pub environment: Arc<Environment>,
    pub max_rounds: usize,
    pub prefer_source: bool,
    pub ignore_errors: bool,
}

impl ResolutionContext {
    pub fn new(environment: Arc<Environment>, max_rounds: usize) -> Self {
        Self {
            environment,
            max_rounds,
            prefer_source: false,
            ignore_errors: false,
        }
    }

    pub fn from_config(config: &Config, environment: Arc<Environment>) -> Self {
        Self {
            environment,
            max_rounds: config.max_rounds,
            prefer_source: config.prefer_source,
            ignore_errors: config.ignore_errors,
        }
    }
}
