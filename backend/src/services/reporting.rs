//! Reporting service for ledger movement exports

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::{listing_filter, LedgerEntry, Permissions, Product};
use uuid::Uuid;

use super::ledger::{LedgerService, MovementQuery};
use super::StockContext;
use crate::error::{AppError, AppResult};
use crate::store::ProductFilter;

/// Reporting service
#[derive(Clone)]
pub struct ReportingService {
    ctx: StockContext,
    ledger: LedgerService,
}

/// One exported ledger movement
#[derive(Debug, Clone, Serialize)]
pub struct MovementReportRow {
    pub date: DateTime<Utc>,
    pub product_id: Uuid,
    pub product_name: String,
    pub unit: String,
    pub direction: &'static str,
    pub quantity: i64,
    /// Positive for stock in, negative for stock out
    pub signed_quantity: i64,
    pub structure_id: Uuid,
    pub source: String,
    pub request_id: Option<Uuid>,
}

impl MovementReportRow {
    fn new(entry: &LedgerEntry, product: Option<&Product>) -> Self {
        Self {
            date: entry.created_at,
            product_id: entry.product_id,
            product_name: product.map(|p| p.name.clone()).unwrap_or_default(),
            unit: product.map(|p| p.unit.clone()).unwrap_or_default(),
            direction: entry.direction.as_str(),
            quantity: entry.quantity,
            signed_quantity: entry.direction.signed(entry.quantity),
            structure_id: entry.structure_id,
            source: entry
                .source
                .as_ref()
                .map(|s| s.kind.as_str())
                .unwrap_or("DIRECT")
                .to_string(),
            request_id: entry.source.as_ref().map(|s| s.request_id),
        }
    }
}

impl ReportingService {
    pub fn new(ctx: StockContext) -> Self {
        let ledger = LedgerService::new(ctx.clone());
        Self { ctx, ledger }
    }

    /// Movements visible to the user, newest first, with product names
    pub async fn movement_report(
        &self,
        permissions: &Permissions,
        query: &MovementQuery,
    ) -> AppResult<Vec<MovementReportRow>> {
        let entries = self.ledger.movement_history(permissions, query).await?;

        let products = self
            .ctx
            .store
            .list_products(&ProductFilter {
                listing: listing_filter(permissions),
                structure_id: query.structure_id,
            })
            .await?;
        let by_id: HashMap<Uuid, &Product> = products.iter().map(|p| (p.id, p)).collect();

        Ok(entries
            .iter()
            .map(|entry| MovementReportRow::new(entry, by_id.get(&entry.product_id).copied()))
            .collect())
    }

    pub async fn export_movements_csv(
        &self,
        permissions: &Permissions,
        query: &MovementQuery,
    ) -> AppResult<String> {
        let rows = self.movement_report(permissions, query).await?;
        tracing::info!(rows = rows.len(), "movement export generated");
        Self::export_to_csv(&rows)
    }

    /// Export report data as CSV
    pub fn export_to_csv<T: Serialize>(data: &[T]) -> AppResult<String> {
        let mut wtr = csv::Writer::from_writer(vec![]);
        for record in data {
            wtr.serialize(record)
                .map_err(|e| AppError::Internal(format!("CSV serialization error: {}", e)))?;
        }
        let bytes = wtr
            .into_inner()
            .map_err(|e| AppError::Internal(format!("CSV writer error: {}", e)))?;
        String::from_utf8(bytes)
            .map_err(|e| AppError::Internal(format!("UTF-8 conversion error: {}", e)))
    }
}
