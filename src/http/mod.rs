//! HTTP surface: router construction, handlers, and admission middleware.

mod handlers;
mod limit;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware, Router};
use tracing::error;

use crate::admission::{KeyedLimiterRegistry, LimiterChain};
use crate::config::AdmissionConfig;
use crate::error::LedgerError;
use crate::service::LedgerService;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<LedgerService>,
}

/// The named registries every endpoint chain draws from.
///
/// Owned by the service instance and passed to the router builder rather
/// than living in process globals; refill tickers are spawned explicitly
/// via [`start`](Self::start).
pub struct AdmissionControl {
    ip: Arc<KeyedLimiterRegistry>,
    user: Arc<KeyedLimiterRegistry>,
}

impl AdmissionControl {
    /// Build the IP and user registries from configuration.
    pub fn from_config(config: &AdmissionConfig) -> Self {
        Self {
            ip: Arc::new(KeyedLimiterRegistry::ip_keyed(config.ip_capacity)),
            user: Arc::new(KeyedLimiterRegistry::user_keyed(config.user_capacity)),
        }
    }

    /// Spawn both refill tickers. Must run inside a tokio runtime.
    pub fn start(&self) {
        Arc::clone(&self.ip).start();
        Arc::clone(&self.user).start();
    }

    /// Chain for endpoints limited by client IP only.
    pub fn ip_chain(&self) -> LimiterChain {
        LimiterChain::new(vec![Arc::clone(&self.ip)])
    }

    /// Chain for per-user endpoints: client IP first, then target user.
    pub fn ip_user_chain(&self) -> LimiterChain {
        LimiterChain::new(vec![Arc::clone(&self.ip), Arc::clone(&self.user)])
    }
}

/// Build the router with per-endpoint limiter chains.
///
/// The create endpoints are limited by client IP; the per-user read
/// endpoints by client IP and then by the target user.
pub fn build_router(service: Arc<LedgerService>, admission: &AdmissionControl) -> Router {
    let ip_chain = admission.ip_chain();
    let ip_user_chain = admission.ip_user_chain();

    let state = AppState { service };

    let create_routes = Router::new()
        .route("/user", post(handlers::create_user))
        .route("/account", post(handlers::create_account))
        .route("/transfer", post(handlers::create_transfer))
        .route_layer(middleware::from_fn_with_state(ip_chain, limit::ip_admit));

    let read_routes = Router::new()
        .route("/user/{user_id}", get(handlers::get_user))
        .route("/account/{user_id}", get(handlers::get_accounts))
        .route(
            "/transfer/in/{user_id}",
            get(handlers::get_incoming_transfers),
        )
        .route(
            "/transfer/out/{user_id}",
            get(handlers::get_outgoing_transfers),
        )
        .route_layer(middleware::from_fn_with_state(
            ip_user_chain,
            limit::user_scoped_admit,
        ));

    create_routes.merge(read_routes).with_state(state)
}

impl IntoResponse for LedgerError {
    fn into_response(self) -> Response {
        // Both denial kinds map to the same status class with a fixed,
        // human-readable body.
        if self.is_denial() {
            return (StatusCode::TOO_MANY_REQUESTS, "Rate Limit Exceeded").into_response();
        }

        match self {
            LedgerError::NotFound { .. } => {
                (StatusCode::NOT_FOUND, self.to_string()).into_response()
            }
            other => {
                error!(error = %other, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
            }
        }
    }
}
