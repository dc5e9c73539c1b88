//! Ordered composition of keyed limiter registries.

use std::sync::Arc;

use tracing::debug;

use crate::error::{LedgerError, Result};

use super::registry::KeyedLimiterRegistry;
use super::RequestIdentity;

/// An ordered list of registries consulted before a handler runs.
///
/// The first registry to deny short-circuits the chain: later registries
/// are not consulted and the handler never runs. Order only affects which
/// stage gets to deny first, not the observable rejection.
#[derive(Clone)]
pub struct LimiterChain {
    stages: Vec<Arc<KeyedLimiterRegistry>>,
}

impl LimiterChain {
    /// Build a chain from registries in the order they should be consulted.
    pub fn new(stages: Vec<Arc<KeyedLimiterRegistry>>) -> Self {
        Self { stages }
    }

    /// Consult every stage in order.
    ///
    /// Returns `Err(AdmissionDenied)` naming the first denying registry, or
    /// `Ok(())` when all stages admit.
    pub fn check(&self, identity: &RequestIdentity) -> Result<()> {
        for registry in &self.stages {
            if !registry.admit(identity) {
                debug!(limiter = registry.name(), "Request denied by limiter chain");
                return Err(LedgerError::AdmissionDenied {
                    limiter: registry.name().to_string(),
                });
            }
        }
        Ok(())
    }
}
