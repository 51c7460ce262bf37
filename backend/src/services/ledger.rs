//! Stock ledger service
//!
//! The only way product quantities change. Workflow validations go through
//! the store's transition commit; the entry points here cover direct
//! corrections, the bulk "give" cart and movement history.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use shared::{
    listing_filter, validate_quantity, validate_unit_price, LedgerEntry, MovementDirection,
    MovementLine, Period, Permissions,
};
use uuid::Uuid;

use super::{PermissionService, StockContext};
use crate::error::{AppError, AppResult};
use crate::store::{LedgerFilter, MovementBatch};

#[derive(Clone)]
pub struct LedgerService {
    ctx: StockContext,
    permissions: PermissionService,
}

/// Query for movement history
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MovementQuery {
    pub structure_id: Option<Uuid>,
    pub product_id: Option<Uuid>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// Merge lines for the same product, keeping first-seen order.
///
/// Quantities are summed; the last unit price given wins.
pub fn aggregate_lines(lines: &[MovementLine]) -> AppResult<Vec<MovementLine>> {
    let mut merged: Vec<MovementLine> = Vec::with_capacity(lines.len());

    for line in lines {
        validate_quantity(line.quantity).map_err(|msg| {
            AppError::validation("quantity", msg, "La quantité doit être supérieure à zéro")
        })?;

        match merged.iter_mut().find(|m| m.product_id == line.product_id) {
            Some(existing) => {
                existing.quantity = existing.quantity.checked_add(line.quantity).ok_or_else(|| {
                    AppError::validation("quantity", "Quantity overflow", "Quantité trop grande")
                })?;
                if line.unit_price.is_some() {
                    existing.unit_price = line.unit_price;
                }
            }
            None => merged.push(line.clone()),
        }
    }

    Ok(merged)
}

impl LedgerService {
    pub fn new(ctx: StockContext) -> Self {
        let permissions = PermissionService::new(ctx.directory.clone());
        Self { ctx, permissions }
    }

    /// Apply one movement to a product of `structure_id`.
    pub async fn apply_movement(
        &self,
        product_id: Uuid,
        direction: MovementDirection,
        quantity: i64,
        structure_id: Uuid,
    ) -> AppResult<LedgerEntry> {
        let line = MovementLine {
            product_id,
            quantity,
            unit_price: None,
        };
        let mut entries = self
            .apply_bulk_movement(std::slice::from_ref(&line), direction, structure_id)
            .await?;
        entries
            .pop()
            .ok_or_else(|| AppError::Internal("movement produced no ledger entry".to_string()))
    }

    /// Apply several lines atomically: all of them or none.
    #[tracing::instrument(skip(self, lines), fields(lines = lines.len()))]
    pub async fn apply_bulk_movement(
        &self,
        lines: &[MovementLine],
        direction: MovementDirection,
        structure_id: Uuid,
    ) -> AppResult<Vec<LedgerEntry>> {
        let lines = aggregate_lines(lines)?;
        if lines.is_empty() {
            return Err(AppError::validation(
                "items",
                "At least one item is required",
                "Au moins un article est requis",
            ));
        }

        let batch = MovementBatch {
            direction,
            structure_id,
            lines,
            source: None,
        };
        let entries = self.ctx.store.apply_movements(&batch).await?;

        for entry in &entries {
            self.ctx.events.stock_updated(entry.structure_id, entry.product_id);
        }
        tracing::info!(
            direction = direction.as_str(),
            %structure_id,
            entries = entries.len(),
            "stock movement applied"
        );
        Ok(entries)
    }

    /// Administrative stock increase outside the approval workflow
    pub async fn direct_replenish(
        &self,
        permissions: &Permissions,
        product_id: Uuid,
        quantity: i64,
        unit_price: Option<Decimal>,
    ) -> AppResult<LedgerEntry> {
        let product = self
            .ctx
            .store
            .get_product(product_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Product {}", product_id)))?;
        self.permissions
            .require_manage(permissions, product.structure_id)
            .await?;

        if let Some(price) = unit_price {
            validate_unit_price(price).map_err(|msg| {
                AppError::validation("unit_price", msg, "Le prix unitaire ne peut pas être négatif")
            })?;
        }

        let line = MovementLine {
            product_id,
            quantity,
            unit_price,
        };
        let mut entries = self
            .apply_bulk_movement(
                std::slice::from_ref(&line),
                MovementDirection::In,
                product.structure_id,
            )
            .await?;
        entries
            .pop()
            .ok_or_else(|| AppError::Internal("movement produced no ledger entry".to_string()))
    }

    /// Bulk disbursement of a cart of products from one structure
    pub async fn direct_disburse(
        &self,
        permissions: &Permissions,
        structure_id: Uuid,
        items: &[MovementLine],
    ) -> AppResult<Vec<LedgerEntry>> {
        self.permissions
            .require_manage(permissions, structure_id)
            .await?;

        let lines: Vec<MovementLine> = items
            .iter()
            .map(|item| MovementLine {
                product_id: item.product_id,
                quantity: item.quantity,
                unit_price: None,
            })
            .collect();

        self.apply_bulk_movement(&lines, MovementDirection::Out, structure_id)
            .await
    }

    /// Ledger entries visible to the user, newest first
    pub async fn movement_history(
        &self,
        permissions: &Permissions,
        query: &MovementQuery,
    ) -> AppResult<Vec<LedgerEntry>> {
        if !permissions.can_read {
            return Err(AppError::unauthorized(
                "You cannot read stock movements",
                "Vous ne pouvez pas consulter les mouvements de stock",
            ));
        }
        if let Some(structure_id) = query.structure_id {
            self.permissions.require_read(permissions, structure_id).await?;
        }

        let period = match (query.start, query.end) {
            (None, None) => None,
            (start, end) => {
                let period = Period::or_last_month(start, end, Utc::now());
                if !period.is_valid() {
                    return Err(AppError::validation(
                        "start",
                        "Start date must precede end date",
                        "La date de début doit précéder la date de fin",
                    ));
                }
                Some(period)
            }
        };

        let filter = LedgerFilter {
            listing: listing_filter(permissions),
            structure_id: query.structure_id,
            product_id: query.product_id,
            period,
        };
        self.ctx.store.list_ledger(&filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(product_id: Uuid, quantity: i64) -> MovementLine {
        MovementLine {
            product_id,
            quantity,
            unit_price: None,
        }
    }

    #[test]
    fn test_aggregate_merges_duplicates() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let merged = aggregate_lines(&[line(a, 3), line(b, 1), line(a, 4)]).unwrap();

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].product_id, a);
        assert_eq!(merged[0].quantity, 7);
        assert_eq!(merged[1].quantity, 1);
    }

    #[test]
    fn test_aggregate_rejects_non_positive_lines() {
        let a = Uuid::new_v4();
        let err = aggregate_lines(&[line(a, 5), line(a, -2)]).unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }
}
