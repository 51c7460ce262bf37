//! Stock analytics
//!
//! Health levels come from current quantities. Period statistics are built
//! from the requests created in the window, not from the ledger, so pending
//! and rejected requests are counted alongside validated ones.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use shared::{
    listing_filter, product_health, round_money, BucketTotals, DisbursementStats, ListingFilter,
    Period, Permissions, Product, ProductHealth, ProductReplenishmentRollup, ProductStatistics,
    ReplenishmentStats, ReplenishmentTotals, RequestStatus, StatisticsOverview, StatusBuckets,
    StockLevel, StockMetrics, StockSummary, StructureRef, StructureReplenishment,
    StructureStatistics, TopProducts, WorkflowKind, WorkflowRequest,
};
use uuid::Uuid;

use super::{PermissionService, StockContext};
use crate::error::{AppError, AppResult};
use crate::store::{ProductFilter, RequestFilter};

/// Size of each top-products ranking
pub const TOP_PRODUCTS: usize = 5;

#[derive(Clone)]
pub struct AnalyticsService {
    ctx: StockContext,
    permissions: PermissionService,
}

impl AnalyticsService {
    pub fn new(ctx: StockContext) -> Self {
        let permissions = PermissionService::new(ctx.directory.clone());
        Self { ctx, permissions }
    }

    pub async fn stock_health(
        &self,
        permissions: &Permissions,
        product_id: Uuid,
    ) -> AppResult<ProductHealth> {
        let product = self
            .ctx
            .store
            .get_product(product_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Product {}", product_id)))?;
        self.permissions
            .require_read(permissions, product.structure_id)
            .await?;
        Ok(product_health(&product))
    }

    /// Level counts over every product the user can see.
    pub async fn stock_summary(
        &self,
        permissions: &Permissions,
        structure_id: Option<Uuid>,
    ) -> AppResult<StockSummary> {
        if let Some(structure_id) = structure_id {
            self.permissions.require_read(permissions, structure_id).await?;
        }
        let filter = ProductFilter {
            listing: listing_filter(permissions),
            structure_id,
        };

        match self.ctx.store.list_products(&filter).await {
            Ok(products) => Ok(summarize(&products)),
            Err(err) => {
                tracing::warn!(error = %err, "stock summary unavailable, returning empty summary");
                Ok(StockSummary::default())
            }
        }
    }

    /// Activity of one structure over `[start, end]`, last month by default.
    #[tracing::instrument(skip(self, permissions), fields(user_id = %permissions.user_id))]
    pub async fn period_statistics(
        &self,
        permissions: &Permissions,
        structure_id: Uuid,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> AppResult<StructureStatistics> {
        let structure = self.permissions.require_read(permissions, structure_id).await?;

        let period = Period::or_last_month(start, end, Utc::now());
        if !period.is_valid() {
            return Err(AppError::validation(
                "start",
                "Start date must precede end date",
                "La date de début doit précéder la date de fin",
            ));
        }

        let reads = async {
            let products = self
                .ctx
                .store
                .list_products(&ProductFilter {
                    listing: ListingFilter::Ministere(structure.ministere_id),
                    structure_id: None,
                })
                .await?;
            let requests = self
                .ctx
                .store
                .list_requests(&RequestFilter {
                    listing: ListingFilter::Ministere(structure.ministere_id),
                    kind: None,
                    structure_id: None,
                    status: None,
                    period: Some(period),
                })
                .await?;
            let structures = self
                .ctx
                .directory
                .list_structures(structure.ministere_id)
                .await?;
            Ok::<_, AppError>((products, requests, structures))
        };

        match reads.await {
            Ok((products, requests, structures)) => Ok(compute_statistics(
                &structure,
                period,
                &products,
                &requests,
                &structures,
            )),
            Err(err) => {
                tracing::warn!(
                    %structure_id,
                    error = %err,
                    "statistics reads failed, returning empty statistics"
                );
                Ok(StructureStatistics::empty(
                    structure.id,
                    structure.name,
                    structure.ministere_id,
                    period,
                ))
            }
        }
    }
}

/// Count products per stock level and collect the critical ones.
pub fn summarize(products: &[Product]) -> StockSummary {
    let mut summary = StockSummary {
        total_products: products.len(),
        ..StockSummary::default()
    };

    for product in products {
        let health = product_health(product);
        match health.health.level {
            StockLevel::Normal => summary.normal += 1,
            StockLevel::Alert => summary.alert += 1,
            StockLevel::Low => summary.low += 1,
            StockLevel::OutOfStock => summary.out_of_stock += 1,
        }
        if health.health.level.is_critical() {
            summary.critical.push(health);
        }
    }

    summary
        .critical
        .sort_by(|a, b| a.health.percentage.cmp(&b.health.percentage));
    summary
}

fn rate(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator > Decimal::ZERO {
        round_money(numerator / denominator)
    } else {
        Decimal::ZERO
    }
}

fn replenishment_stats(requests: &[&WorkflowRequest]) -> ReplenishmentStats {
    let total_quantity: i64 = requests.iter().map(|r| r.quantity).sum();
    let total_value: Decimal = requests.iter().map(|r| r.declared_value()).sum();
    let last = requests.iter().max_by_key(|r| r.created_at);

    ReplenishmentStats {
        count: requests.len(),
        total_quantity,
        total_value: round_money(total_value),
        average_unit_price: rate(total_value, Decimal::from(total_quantity)),
        last_unit_price: last.and_then(|r| r.details.unit_price()),
        last_date: last.map(|r| r.created_at),
    }
}

fn product_statistics(
    product: &Product,
    replenishments: &[&WorkflowRequest],
    disbursements: &[&WorkflowRequest],
) -> ProductStatistics {
    let replenishments = replenishment_stats(replenishments);

    let disbursed_quantity: i64 = disbursements.iter().map(|r| r.quantity).sum();
    let disbursements = DisbursementStats {
        count: disbursements.len(),
        total_quantity: disbursed_quantity,
        estimated_value: round_money(
            Decimal::from(disbursed_quantity) * replenishments.average_unit_price,
        ),
        last_date: disbursements.iter().map(|r| r.created_at).max(),
    };

    let current = Decimal::from(product.quantity);
    let initial = Decimal::from(product.initial_quantity);
    let stock = StockMetrics {
        current: product.quantity,
        initial: product.initial_quantity,
        utilisation_rate: rate((initial - current) * Decimal::ONE_HUNDRED, initial),
        rotation_rate: rate(
            Decimal::from(replenishments.total_quantity),
            (initial + current) / Decimal::TWO,
        ),
    };

    ProductStatistics {
        product_id: product.id,
        product_name: product.name.clone(),
        product_unit: product.unit.clone(),
        replenishments,
        disbursements,
        stock,
    }
}

fn bucket<F, V>(requests: &[&WorkflowRequest], keep: F, value: V) -> BucketTotals
where
    F: Fn(RequestStatus) -> bool,
    V: Fn(&WorkflowRequest) -> Decimal,
{
    let selected: Vec<&WorkflowRequest> =
        requests.iter().copied().filter(|r| keep(r.status)).collect();
    BucketTotals {
        count: selected.len(),
        quantity: selected.iter().map(|r| r.quantity).sum(),
        value: round_money(selected.iter().map(|r| value(*r)).sum()),
    }
}

/// Split requests into pending, validated and rejected totals.
fn status_buckets<V>(requests: &[&WorkflowRequest], value: V) -> StatusBuckets
where
    V: Fn(&WorkflowRequest) -> Decimal,
{
    StatusBuckets {
        pending: bucket(requests, |s| s.is_pending(), &value),
        validated: bucket(requests, |s| s == RequestStatus::ValideOrdonnateur, &value),
        rejected: bucket(requests, |s| s == RequestStatus::Rejete, &value),
    }
}

fn top_by<F>(stats: &[ProductStatistics], compare: F) -> Vec<ProductStatistics>
where
    F: Fn(&ProductStatistics, &ProductStatistics) -> Ordering,
{
    let mut ranked = stats.to_vec();
    ranked.sort_by(|a, b| compare(b, a));
    ranked.truncate(TOP_PRODUCTS);
    ranked
}

fn totals(requests: &[&WorkflowRequest]) -> ReplenishmentTotals {
    ReplenishmentTotals {
        count: requests.len(),
        total_quantity: requests.iter().map(|r| r.quantity).sum(),
        total_value: round_money(requests.iter().map(|r| r.declared_value()).sum()),
    }
}

/// Replenishments of the whole ministry grouped by product, then structure.
fn ministry_rollup(
    products: &[Product],
    requests: &[WorkflowRequest],
    structures: &[StructureRef],
) -> Vec<ProductReplenishmentRollup> {
    let product_index: HashMap<Uuid, &Product> = products.iter().map(|p| (p.id, p)).collect();
    let structure_index: HashMap<Uuid, &StructureRef> =
        structures.iter().map(|s| (s.id, s)).collect();

    // first-seen order, product then structure
    let mut grouped: Vec<(Uuid, Vec<(Uuid, Vec<&WorkflowRequest>)>)> = Vec::new();
    for request in requests
        .iter()
        .filter(|r| r.kind == WorkflowKind::Replenishment)
    {
        let index = match grouped.iter().position(|(id, _)| *id == request.product_id) {
            Some(index) => index,
            None => {
                grouped.push((request.product_id, Vec::new()));
                grouped.len() - 1
            }
        };
        let per_structure = &mut grouped[index].1;
        match per_structure
            .iter_mut()
            .find(|(id, _)| *id == request.structure_id)
        {
            Some((_, list)) => list.push(request),
            None => per_structure.push((request.structure_id, vec![request])),
        }
    }

    let mut rollups: Vec<ProductReplenishmentRollup> = grouped
        .into_iter()
        .map(|(product_id, per_structure)| {
            let structures: Vec<StructureReplenishment> = per_structure
                .into_iter()
                .map(|(structure_id, list)| {
                    let structure = structure_index.get(&structure_id);
                    StructureReplenishment {
                        structure_id,
                        structure_name: structure.map(|s| s.name.clone()).unwrap_or_default(),
                        ministere_abbreviation: structure
                            .and_then(|s| s.ministere_abbreviation.clone()),
                        totals: totals(&list),
                    }
                })
                .collect();

            let totals = ReplenishmentTotals {
                count: structures.iter().map(|s| s.totals.count).sum(),
                total_quantity: structures.iter().map(|s| s.totals.total_quantity).sum(),
                total_value: round_money(structures.iter().map(|s| s.totals.total_value).sum()),
            };
            let product = product_index.get(&product_id);

            ProductReplenishmentRollup {
                product_id,
                product_name: product.map(|p| p.name.clone()).unwrap_or_default(),
                product_unit: product.map(|p| p.unit.clone()).unwrap_or_default(),
                structures,
                totals,
            }
        })
        .collect();

    rollups.sort_by(|a, b| b.totals.total_value.cmp(&a.totals.total_value));
    rollups
}

/// Build the statistics of `structure` from ministry-wide reads.
///
/// `products` and `requests` cover the whole ministry; `requests` must
/// already be restricted to the period.
pub fn compute_statistics(
    structure: &StructureRef,
    period: Period,
    products: &[Product],
    requests: &[WorkflowRequest],
    structures: &[StructureRef],
) -> StructureStatistics {
    let own: Vec<&WorkflowRequest> = requests
        .iter()
        .filter(|r| r.structure_id == structure.id && period.contains(r.created_at))
        .collect();
    let (replenishments, disbursements): (Vec<&WorkflowRequest>, Vec<&WorkflowRequest>) = own
        .iter()
        .copied()
        .partition(|r| r.kind == WorkflowKind::Replenishment);

    let per_product: Vec<ProductStatistics> = products
        .iter()
        .filter(|p| p.structure_id == structure.id)
        .map(|product| {
            let reps: Vec<&WorkflowRequest> = replenishments
                .iter()
                .copied()
                .filter(|r| r.product_id == product.id)
                .collect();
            let dis: Vec<&WorkflowRequest> = disbursements
                .iter()
                .copied()
                .filter(|r| r.product_id == product.id)
                .collect();
            product_statistics(product, &reps, &dis)
        })
        .collect();

    let average_prices: HashMap<Uuid, Decimal> = per_product
        .iter()
        .map(|p| (p.product_id, p.replenishments.average_unit_price))
        .collect();
    let overview = StatisticsOverview {
        total_replenishments: replenishments.len(),
        replenished_quantity: replenishments.iter().map(|r| r.quantity).sum(),
        replenished_value: round_money(replenishments.iter().map(|r| r.declared_value()).sum()),
        total_disbursements: disbursements.len(),
        disbursed_quantity: disbursements.iter().map(|r| r.quantity).sum(),
        disbursed_value: round_money(
            per_product
                .iter()
                .map(|p| p.disbursements.estimated_value)
                .sum(),
        ),
        distinct_products: own
            .iter()
            .map(|r| r.product_id)
            .collect::<HashSet<_>>()
            .len(),
        replenishments: status_buckets(&replenishments, WorkflowRequest::declared_value),
        disbursements: status_buckets(&disbursements, |r| {
            average_prices
                .get(&r.product_id)
                .map_or(Decimal::ZERO, |price| Decimal::from(r.quantity) * *price)
        }),
    };

    let top_products = TopProducts {
        most_replenished: top_by(&per_product, |a, b| {
            a.replenishments.total_quantity.cmp(&b.replenishments.total_quantity)
        }),
        most_disbursed: top_by(&per_product, |a, b| {
            a.disbursements.total_quantity.cmp(&b.disbursements.total_quantity)
        }),
        highest_value: top_by(&per_product, |a, b| {
            a.replenishments.total_value.cmp(&b.replenishments.total_value)
        }),
    };

    let in_period: Vec<WorkflowRequest> = requests
        .iter()
        .filter(|r| r.ministere_id == structure.ministere_id && period.contains(r.created_at))
        .cloned()
        .collect();

    StructureStatistics {
        structure_id: structure.id,
        structure_name: structure.name.clone(),
        ministere_id: structure.ministere_id,
        period,
        overview,
        per_product,
        top_products,
        ministry_replenishments: ministry_rollup(products, &in_period, structures),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use shared::RequestDetails;

    fn structure(ministere_id: Uuid, name: &str) -> StructureRef {
        StructureRef {
            id: Uuid::new_v4(),
            ministere_id,
            name: name.to_string(),
            abbreviation: None,
            ministere_abbreviation: Some("MS".to_string()),
        }
    }

    fn product(structure: &StructureRef, quantity: i64, initial: i64) -> Product {
        let now = Utc::now();
        Product {
            id: Uuid::new_v4(),
            name: "Gants".to_string(),
            unit: "boîte".to_string(),
            description: None,
            quantity,
            initial_quantity: initial,
            price: None,
            structure_id: structure.id,
            ministere_id: structure.ministere_id,
            created_at: now,
            updated_at: now,
        }
    }

    fn request(
        product: &Product,
        quantity: i64,
        status: RequestStatus,
        details: RequestDetails,
    ) -> WorkflowRequest {
        let now = Utc::now();
        WorkflowRequest {
            id: Uuid::new_v4(),
            sequence_number: "ALI-2026-0001".to_string(),
            kind: details.kind(),
            product_id: product.id,
            quantity,
            status,
            locked: false,
            observations: None,
            structure_id: product.structure_id,
            ministere_id: product.ministere_id,
            created_by: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            details,
        }
    }

    fn replenishment(product: &Product, quantity: i64, price: i64, status: RequestStatus) -> WorkflowRequest {
        request(
            product,
            quantity,
            status,
            RequestDetails::Replenishment {
                supplier_name: "Fournisseur".to_string(),
                supplier_tax_id: None,
                unit_price: Decimal::from(price),
            },
        )
    }

    fn disbursement(product: &Product, quantity: i64, status: RequestStatus) -> WorkflowRequest {
        request(
            product,
            quantity,
            status,
            RequestDetails::Disbursement {
                beneficiary_name: "Centre".to_string(),
                beneficiary_phone: None,
                requested_date: Utc::now().date_naive(),
                external_reference: None,
                reason: None,
            },
        )
    }

    fn window() -> Period {
        let now = Utc::now();
        Period::new(now - Duration::days(1), now + Duration::days(1))
    }

    #[test]
    fn test_replenishment_value_and_average_price() {
        let ministere = Uuid::new_v4();
        let s = structure(ministere, "Hôpital");
        let p = product(&s, 150, 100);
        let requests = vec![
            replenishment(&p, 50, 10, RequestStatus::ValideOrdonnateur),
            replenishment(&p, 50, 20, RequestStatus::Saisie),
        ];

        let stats = compute_statistics(&s, window(), &[p], &requests, &[s.clone()]);
        let product_stats = &stats.per_product[0];

        assert_eq!(product_stats.replenishments.total_value, Decimal::from(1500));
        assert_eq!(product_stats.replenishments.average_unit_price, Decimal::from(15));
        assert_eq!(stats.overview.replenished_value, Decimal::from(1500));
        assert_eq!(stats.overview.replenishments.validated.count, 1);
        assert_eq!(stats.overview.replenishments.pending.count, 1);
    }

    #[test]
    fn test_disbursement_valued_at_average_price() {
        let ministere = Uuid::new_v4();
        let s = structure(ministere, "Hôpital");
        let p = product(&s, 80, 100);
        let requests = vec![
            replenishment(&p, 10, 4, RequestStatus::ValideOrdonnateur),
            disbursement(&p, 20, RequestStatus::Rejete),
        ];

        let stats = compute_statistics(&s, window(), &[p], &requests, &[s.clone()]);

        assert_eq!(stats.per_product[0].disbursements.estimated_value, Decimal::from(80));
        assert_eq!(stats.overview.disbursed_value, Decimal::from(80));
        assert_eq!(stats.overview.disbursements.rejected.count, 1);
        assert_eq!(stats.overview.distinct_products, 1);
    }

    #[test]
    fn test_status_buckets_split_quantity_and_value() {
        let s = structure(Uuid::new_v4(), "Hôpital");
        let p = product(&s, 100, 100);
        let requests = vec![
            replenishment(&p, 10, 4, RequestStatus::ValideOrdonnateur),
            replenishment(&p, 5, 4, RequestStatus::Rejete),
            replenishment(&p, 20, 4, RequestStatus::InstanceDirecteur),
            disbursement(&p, 3, RequestStatus::ValideOrdonnateur),
            disbursement(&p, 6, RequestStatus::Rejete),
            disbursement(&p, 2, RequestStatus::Saisie),
        ];

        let stats = compute_statistics(&s, window(), &[p], &requests, &[s.clone()]);
        let replenishments = &stats.overview.replenishments;
        let disbursements = &stats.overview.disbursements;

        assert_eq!(
            replenishments.validated,
            BucketTotals { count: 1, quantity: 10, value: Decimal::from(40) }
        );
        assert_eq!(
            replenishments.rejected,
            BucketTotals { count: 1, quantity: 5, value: Decimal::from(20) }
        );
        assert_eq!(
            replenishments.pending,
            BucketTotals { count: 1, quantity: 20, value: Decimal::from(80) }
        );
        assert_eq!(disbursements.validated.quantity, 3);
        assert_eq!(disbursements.validated.value, Decimal::from(12));
        assert_eq!(disbursements.rejected.quantity, 6);
        assert_eq!(disbursements.rejected.value, Decimal::from(24));
        assert_eq!(disbursements.pending.count, 1);
        assert_eq!(disbursements.pending.value, Decimal::from(8));
    }

    #[test]
    fn test_stock_rates() {
        let ministere = Uuid::new_v4();
        let s = structure(ministere, "Hôpital");
        let p = product(&s, 60, 100);
        let requests = vec![replenishment(&p, 40, 1, RequestStatus::Saisie)];

        let stats = compute_statistics(&s, window(), &[p], &requests, &[]);
        let stock = &stats.per_product[0].stock;

        assert_eq!(stock.utilisation_rate, Decimal::from(40));
        // 40 / ((100 + 60) / 2)
        assert_eq!(stock.rotation_rate, Decimal::new(50, 2));
    }

    #[test]
    fn test_zero_initial_quantity_rates_are_zero() {
        let s = structure(Uuid::new_v4(), "Hôpital");
        let p = product(&s, 0, 0);

        let stats = compute_statistics(&s, window(), &[p], &[], &[]);

        assert_eq!(stats.per_product[0].stock.utilisation_rate, Decimal::ZERO);
        assert_eq!(stats.per_product[0].stock.rotation_rate, Decimal::ZERO);
    }

    #[test]
    fn test_top_products_are_capped() {
        let s = structure(Uuid::new_v4(), "Hôpital");
        let products: Vec<Product> = (0..7).map(|_| product(&s, 10, 10)).collect();
        let requests: Vec<WorkflowRequest> = products
            .iter()
            .enumerate()
            .map(|(i, p)| replenishment(p, i as i64 + 1, 1, RequestStatus::Saisie))
            .collect();

        let stats = compute_statistics(&s, window(), &products, &requests, &[]);

        assert_eq!(stats.top_products.most_replenished.len(), TOP_PRODUCTS);
        assert_eq!(stats.top_products.most_replenished[0].replenishments.total_quantity, 7);
    }

    #[test]
    fn test_ministry_rollup_spans_structures() {
        let ministere = Uuid::new_v4();
        let a = structure(ministere, "Hôpital A");
        let b = structure(ministere, "Hôpital B");
        let pa = product(&a, 10, 10);
        let pb = product(&b, 10, 10);
        let requests = vec![
            replenishment(&pa, 5, 2, RequestStatus::Saisie),
            replenishment(&pb, 5, 10, RequestStatus::Saisie),
        ];

        let stats = compute_statistics(
            &a,
            window(),
            &[pa, pb.clone()],
            &requests,
            &[a.clone(), b.clone()],
        );

        assert_eq!(stats.ministry_replenishments.len(), 2);
        assert_eq!(stats.ministry_replenishments[0].product_id, pb.id);
        assert_eq!(stats.ministry_replenishments[0].structures[0].structure_name, "Hôpital B");
        assert_eq!(stats.overview.total_replenishments, 1);
    }

    #[test]
    fn test_summary_counts_levels() {
        let s = structure(Uuid::new_v4(), "Hôpital");
        let products = vec![
            product(&s, 0, 100),
            product(&s, 5, 100),
            product(&s, 10, 100),
            product(&s, 90, 100),
        ];

        let summary = summarize(&products);

        assert_eq!(summary.total_products, 4);
        assert_eq!(summary.out_of_stock, 1);
        assert_eq!(summary.low, 1);
        assert_eq!(summary.alert, 1);
        assert_eq!(summary.normal, 1);
        assert_eq!(summary.critical_count(), 2);
        assert_eq!(summary.critical[0].quantity, 0);
    }
}
