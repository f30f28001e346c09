//! Admin HTTP API over the control service.
//!
//! Bearer-token protected, JSON in and out. Disabled unless
//! `[admin] enabled = true`.

pub mod auth;
pub mod handlers;

use std::sync::Arc;
use std::time::Instant;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::control::ProxyService;

/// Largest accepted admin request body.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// State shared by admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub service: Arc<ProxyService>,
    pub api_key: Arc<str>,
    pub started: Instant,
}

impl AdminState {
    pub fn new(service: Arc<ProxyService>, api_key: &str) -> Self {
        Self {
            service,
            api_key: Arc::from(api_key),
            started: Instant::now(),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/ports", get(get_ports))
        .route("/admin/ports/{port}", post(add_port).delete(remove_port))
        .route("/admin/ports/{port}/groups", post(add_group).delete(remove_group))
        .route("/admin/ports/{port}/backends", put(update_backends))
        .route("/admin/ports/{port}/activate", post(activate_backend))
        .route("/admin/ports/{port}/deactivate", post(deactivate_backend))
        .route("/admin/ports/{port}/select", post(select_healthy_backend))
        .route("/admin/ports/{port}/check", get(check_group))
        .route("/admin/check", post(check_backend))
        .route("/admin/reconcile", post(reconcile))
        .route("/admin/listeners", get(get_listeners))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
