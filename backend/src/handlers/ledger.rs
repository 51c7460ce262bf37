//! HTTP handlers for direct stock movements and movement history

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use shared::{LedgerEntry, MovementLine};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::ledger::{LedgerService, MovementQuery};
use crate::services::reporting::ReportingService;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct DirectReplenishInput {
    pub quantity: i64,
    pub unit_price: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct GiveCartInput {
    pub structure_id: Uuid,
    pub items: Vec<MovementLine>,
}

#[derive(Debug, Deserialize)]
pub struct MovementExportQuery {
    pub structure_id: Option<Uuid>,
    pub product_id: Option<Uuid>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub format: Option<String>, // "json" or "csv"
}

/// Administrative replenishment outside the approval workflow
pub async fn direct_replenish(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(product_id): Path<Uuid>,
    Json(input): Json<DirectReplenishInput>,
) -> AppResult<Json<LedgerEntry>> {
    let permissions = state.resolve(&current_user);
    let service = LedgerService::new(state.ctx);
    let entry = service
        .direct_replenish(&permissions, product_id, input.quantity, input.unit_price)
        .await?;
    Ok(Json(entry))
}

/// Disburse a cart of products in one movement
pub async fn give_cart(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<GiveCartInput>,
) -> AppResult<Json<Vec<LedgerEntry>>> {
    let permissions = state.resolve(&current_user);
    let service = LedgerService::new(state.ctx);
    let entries = service
        .direct_disburse(&permissions, input.structure_id, &input.items)
        .await?;
    Ok(Json(entries))
}

/// Ledger movements, as JSON or as a CSV download
pub async fn list_movements(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<MovementExportQuery>,
) -> AppResult<impl IntoResponse> {
    let permissions = state.resolve(&current_user);
    let filter = MovementQuery {
        structure_id: query.structure_id,
        product_id: query.product_id,
        start: query.start,
        end: query.end,
    };

    if query.format.as_deref() == Some("csv") {
        let service = ReportingService::new(state.ctx);
        let csv = service
            .export_movements_csv(&permissions, &filter)
            .await?;
        Ok((
            [
                (header::CONTENT_TYPE, "text/csv"),
                (
                    header::CONTENT_DISPOSITION,
                    "attachment; filename=\"stock_movements.csv\"",
                ),
            ],
            csv,
        )
            .into_response())
    } else {
        let service = LedgerService::new(state.ctx);
        let entries = service.movement_history(&permissions, &filter).await?;
        Ok(Json(entries).into_response())
    }
}
