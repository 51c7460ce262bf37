//! Ministry stock ledger - backend
//!
//! Products, the stock ledger, the replenishment and disbursement approval
//! workflows and stock analytics, served over HTTP.

use std::sync::Arc;

use axum::{routing::get, Router};
use shared::Permissions;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod config;
pub mod error;
pub mod events;
pub mod external;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod store;

pub use config::Config;

use crate::middleware::CurrentUser;
use crate::services::{PermissionService, StockContext};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub ctx: StockContext,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn permission_service(&self) -> PermissionService {
        PermissionService::new(self.ctx.directory.clone())
    }

    /// Permissions of the caller, derived afresh for every call
    pub fn resolve(&self, user: &CurrentUser) -> Permissions {
        self.permission_service().resolve(&user.0)
    }
}

/// Create the application router with all routes and middleware
pub fn create_app(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .nest("/api/v1", routes::api_routes(state.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Root endpoint
async fn root() -> &'static str {
    "Ministry Stock Ledger API v1.0"
}
