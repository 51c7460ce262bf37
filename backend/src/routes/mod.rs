//! Route definitions for the stock ledger API

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::services::workflow::{Disbursement, Replenishment, WorkflowVariant};
use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes
pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Health check (public)
        .route("/health", get(handlers::health_check))
        // Protected routes
        .merge(protected_routes(state))
}

fn protected_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/me/permissions", get(handlers::get_my_permissions))
        .nest("/products", product_routes())
        .nest("/stock", stock_routes())
        .nest("/replenishments", workflow_routes::<Replenishment>())
        .nest("/disbursements", workflow_routes::<Disbursement>())
        .nest("/statistics", statistics_routes())
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Product catalog routes
fn product_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::list_products).post(handlers::create_product),
        )
        .route(
            "/:product_id",
            get(handlers::get_product)
                .put(handlers::update_product)
                .delete(handlers::delete_product),
        )
        .route("/:product_id/health", get(handlers::get_product_health))
        .route("/:product_id/replenish", post(handlers::direct_replenish))
}

/// Direct movements and movement history
fn stock_routes() -> Router<AppState> {
    Router::new()
        .route("/give", post(handlers::give_cart))
        .route("/movements", get(handlers::list_movements))
        .route("/summary", get(handlers::get_stock_summary))
}

/// Request routes, mounted once per workflow kind
fn workflow_routes<V: WorkflowVariant>() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::list_requests::<V>).post(handlers::create_request::<V>),
        )
        .route("/bulk-transition", post(handlers::bulk_transition::<V>))
        .route(
            "/:request_id",
            get(handlers::get_request::<V>)
                .put(handlers::update_request::<V>)
                .delete(handlers::delete_request::<V>),
        )
        .route("/:request_id/transition", post(handlers::transition_request::<V>))
        .route("/:request_id/history", get(handlers::get_request_history::<V>))
        .route(
            "/:request_id/documents",
            get(handlers::list_request_documents::<V>)
                .post(handlers::upload_request_document::<V>),
        )
}

/// Analytics routes
fn statistics_routes() -> Router<AppState> {
    Router::new().route(
        "/structures/:structure_id",
        get(handlers::get_structure_statistics),
    )
}
