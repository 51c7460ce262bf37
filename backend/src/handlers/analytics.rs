//! HTTP handlers for stock analytics

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use shared::{StockSummary, StructureStatistics};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::analytics::AnalyticsService;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    pub structure_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct PeriodQuery {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// Stock level counts and critical products
pub async fn get_stock_summary(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<SummaryQuery>,
) -> AppResult<Json<StockSummary>> {
    let permissions = state.resolve(&current_user);
    let service = AnalyticsService::new(state.ctx);
    let summary = service
        .stock_summary(&permissions, query.structure_id)
        .await?;
    Ok(Json(summary))
}

/// Activity of a structure over a period
pub async fn get_structure_statistics(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(structure_id): Path<Uuid>,
    Query(query): Query<PeriodQuery>,
) -> AppResult<Json<StructureStatistics>> {
    let permissions = state.resolve(&current_user);
    let service = AnalyticsService::new(state.ctx);
    let statistics = service
        .period_statistics(&permissions, structure_id, query.start, query.end)
        .await?;
    Ok(Json(statistics))
}
