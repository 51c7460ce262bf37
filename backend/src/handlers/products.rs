//! HTTP handlers for the product catalog

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use shared::{Product, ProductHealth};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::analytics::AnalyticsService;
use crate::services::product::{CreateProductInput, ProductService, UpdateProductInput};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ProductListQuery {
    pub structure_id: Option<Uuid>,
}

/// Create a product
pub async fn create_product(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateProductInput>,
) -> AppResult<(StatusCode, Json<Product>)> {
    let permissions = state.resolve(&current_user);
    let service = ProductService::new(state.ctx);
    let product = service.create_product(&permissions, input).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// List products visible to the user
pub async fn list_products(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<ProductListQuery>,
) -> AppResult<Json<Vec<Product>>> {
    let permissions = state.resolve(&current_user);
    let service = ProductService::new(state.ctx);
    let products = service
        .list_products(&permissions, query.structure_id)
        .await?;
    Ok(Json(products))
}

/// Get a product
pub async fn get_product(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(product_id): Path<Uuid>,
) -> AppResult<Json<Product>> {
    let permissions = state.resolve(&current_user);
    let service = ProductService::new(state.ctx);
    Ok(Json(service.get_product(&permissions, product_id).await?))
}

/// Update name, unit and description of a product
pub async fn update_product(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(product_id): Path<Uuid>,
    Json(input): Json<UpdateProductInput>,
) -> AppResult<Json<Product>> {
    let permissions = state.resolve(&current_user);
    let service = ProductService::new(state.ctx);
    let product = service
        .update_product(&permissions, product_id, input)
        .await?;
    Ok(Json(product))
}

/// Delete a product
pub async fn delete_product(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(product_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let permissions = state.resolve(&current_user);
    let service = ProductService::new(state.ctx);
    service.delete_product(&permissions, product_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Stock level of a product
pub async fn get_product_health(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(product_id): Path<Uuid>,
) -> AppResult<Json<ProductHealth>> {
    let permissions = state.resolve(&current_user);
    let service = AnalyticsService::new(state.ctx);
    Ok(Json(service.stock_health(&permissions, product_id).await?))
}
