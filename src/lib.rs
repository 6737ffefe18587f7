pub mod config;
pub mod error;
pub mod state;
pub mod auth;
pub mod token;
pub mod authz;
pub mod gate;
pub mod service;
pub mod db;
pub mod models;
pub mod middleware;
pub mod routes;
pub mod notify;
pub mod rate_limit;

use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderName, HeaderValue};
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::auth::Argon2Hasher;
use crate::config::Config;
use crate::db::Repositories;
use crate::gate::Gate;
use crate::middleware::audit::RepositoryAuditSink;
use crate::notify::Notifier;
use crate::service::{DirectoryService, IdentityService};
use crate::state::{AppState, SharedState};
use crate::token::TokenEngine;

pub fn build_app(
    repos: Repositories,
    config: Config,
    notifier: Arc<dyn Notifier>,
) -> (Router, SharedState) {
    let tokens = TokenEngine::new(config.token_settings(), &repos);
    let gate = Gate::new(
        tokens.clone(),
        repos.roles.clone(),
        Arc::new(RepositoryAuditSink::new(repos.audit.clone())),
        config.call_timeout,
    );
    let identity = IdentityService::new(
        repos.clone(),
        tokens.clone(),
        Arc::new(Argon2Hasher),
        notifier,
        config.standalone_tenant.clone(),
    );
    let directory = DirectoryService::new(repos.clone(), tokens, config.role_delete);
    let max_body_size = config.max_body_size;

    let state: SharedState = Arc::new(AppState {
        config,
        repos,
        gate,
        identity,
        directory,
    });

    // Security headers
    let headers = ServiceBuilder::new()
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("x-content-type-options"),
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("x-frame-options"),
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("referrer-policy"),
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ));

    let app = Router::new()
        .merge(routes::api_routes())
        .route("/health", axum::routing::get(health))
        .layer(RequestBodyLimitLayer::new(max_body_size))
        .layer(headers)
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    (app, state)
}

async fn health() -> &'static str {
    "ok"
}
