//! Admission control: per-key token buckets, keyed registries, and the
//! limiter chain applied in front of every endpoint.

mod bucket;
mod chain;
mod registry;

pub use bucket::TokenBucket;
pub use chain::LimiterChain;
pub use registry::{KeyFn, KeyedLimiterRegistry};

use std::net::IpAddr;

/// The slice of a request that rate limiters key on.
///
/// Built by the HTTP layer from the connection's peer address and, where
/// the route carries one, the target user path parameter.
#[derive(Debug, Clone, Default)]
pub struct RequestIdentity {
    /// Client IP, port already stripped
    pub peer: Option<IpAddr>,
    /// Target user id from the request path
    pub user: Option<String>,
}

impl RequestIdentity {
    /// Identity carrying only a peer address.
    pub fn from_peer(peer: IpAddr) -> Self {
        Self {
            peer: Some(peer),
            user: None,
        }
    }

    /// Attach a target user id.
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }
}
