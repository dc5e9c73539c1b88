//! Admission middleware applying a limiter chain before the handler.

use std::collections::HashMap;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Path, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::admission::{LimiterChain, RequestIdentity};

/// Admission for endpoints limited by client IP only.
pub async fn ip_admit(
    State(chain): State<LimiterChain>,
    request: Request,
    next: Next,
) -> Response {
    let identity = peer_identity(&request);
    run_checked(chain, identity, request, next).await
}

/// Admission for per-user endpoints: the chain sees both the client IP and
/// the `{user_id}` path parameter.
pub async fn user_scoped_admit(
    State(chain): State<LimiterChain>,
    Path(params): Path<HashMap<String, String>>,
    request: Request,
    next: Next,
) -> Response {
    let mut identity = peer_identity(&request);
    identity.user = params.get("user_id").cloned();
    run_checked(chain, identity, request, next).await
}

/// Client IP from the connection info, port stripped by construction.
fn peer_identity(request: &Request) -> RequestIdentity {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    RequestIdentity { peer, user: None }
}

async fn run_checked(
    chain: LimiterChain,
    identity: RequestIdentity,
    request: Request,
    next: Next,
) -> Response {
    match chain.check(&identity) {
        Ok(()) => next.run(request).await,
        Err(err) => err.into_response(),
    }
}
