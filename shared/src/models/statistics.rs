//! Stock health and period statistics

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::Period;

/// Stock level classification relative to the initial quantity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockLevel {
    OutOfStock,
    Low,
    Alert,
    Normal,
}

impl StockLevel {
    pub fn label(&self) -> &'static str {
        match self {
            StockLevel::OutOfStock => "Rupture de stock",
            StockLevel::Low => "Stock faible",
            StockLevel::Alert => "Stock d'alerte",
            StockLevel::Normal => "Stock normal",
        }
    }

    /// Low and out-of-stock products need attention
    pub fn is_critical(&self) -> bool {
        matches!(self, StockLevel::OutOfStock | StockLevel::Low)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockHealth {
    pub level: StockLevel,
    pub low_threshold: i64,
    pub alert_threshold: i64,
    /// Current quantity as a whole percentage of the initial quantity
    pub percentage: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductHealth {
    pub product_id: Uuid,
    pub name: String,
    pub unit: String,
    pub structure_id: Uuid,
    pub quantity: i64,
    pub initial_quantity: i64,
    pub health: StockHealth,
}

/// Counts per stock level over every product a user can see
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StockSummary {
    pub total_products: usize,
    pub normal: usize,
    pub alert: usize,
    pub low: usize,
    pub out_of_stock: usize,
    pub critical: Vec<ProductHealth>,
}

impl StockSummary {
    pub fn critical_count(&self) -> usize {
        self.low + self.out_of_stock
    }
}

// ============================================================================
// Period statistics
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatisticsOverview {
    pub total_replenishments: usize,
    pub replenished_quantity: i64,
    pub replenished_value: Decimal,
    pub total_disbursements: usize,
    pub disbursed_quantity: i64,
    pub disbursed_value: Decimal,
    pub distinct_products: usize,
    pub replenishments: StatusBuckets,
    pub disbursements: StatusBuckets,
}

/// Count, quantity and value of the requests in one status bucket
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BucketTotals {
    pub count: usize,
    pub quantity: i64,
    pub value: Decimal,
}

/// Requests of one kind split by outcome
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusBuckets {
    /// Still moving along the chain
    pub pending: BucketTotals,
    /// Reached `VALIDE_ORDONNATEUR`
    pub validated: BucketTotals,
    pub rejected: BucketTotals,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplenishmentStats {
    pub count: usize,
    pub total_quantity: i64,
    pub total_value: Decimal,
    pub average_unit_price: Decimal,
    pub last_unit_price: Option<Decimal>,
    pub last_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisbursementStats {
    pub count: usize,
    pub total_quantity: i64,
    /// Disbursed quantity valued at the average replenishment price
    pub estimated_value: Decimal,
    pub last_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StockMetrics {
    pub current: i64,
    pub initial: i64,
    /// Percentage of the initial stock consumed
    pub utilisation_rate: Decimal,
    /// Replenished quantity over average stock
    pub rotation_rate: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductStatistics {
    pub product_id: Uuid,
    pub product_name: String,
    pub product_unit: String,
    pub replenishments: ReplenishmentStats,
    pub disbursements: DisbursementStats,
    pub stock: StockMetrics,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopProducts {
    pub most_replenished: Vec<ProductStatistics>,
    pub most_disbursed: Vec<ProductStatistics>,
    pub highest_value: Vec<ProductStatistics>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplenishmentTotals {
    pub count: usize,
    pub total_quantity: i64,
    pub total_value: Decimal,
}

/// One structure's share of a product's replenishments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureReplenishment {
    pub structure_id: Uuid,
    pub structure_name: String,
    pub ministere_abbreviation: Option<String>,
    pub totals: ReplenishmentTotals,
}

/// Replenishments of one product across the structures of a ministry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductReplenishmentRollup {
    pub product_id: Uuid,
    pub product_name: String,
    pub product_unit: String,
    pub structures: Vec<StructureReplenishment>,
    pub totals: ReplenishmentTotals,
}

/// Activity of a structure over a time window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureStatistics {
    pub structure_id: Uuid,
    pub structure_name: String,
    pub ministere_id: Uuid,
    pub period: Period,
    pub overview: StatisticsOverview,
    pub per_product: Vec<ProductStatistics>,
    pub top_products: TopProducts,
    pub ministry_replenishments: Vec<ProductReplenishmentRollup>,
}

impl StructureStatistics {
    /// Zeroed statistics, returned when the underlying reads fail
    pub fn empty(structure_id: Uuid, structure_name: String, ministere_id: Uuid, period: Period) -> Self {
        Self {
            structure_id,
            structure_name,
            ministere_id,
            period,
            overview: StatisticsOverview::default(),
            per_product: Vec::new(),
            top_products: TopProducts::default(),
            ministry_replenishments: Vec::new(),
        }
    }
}

/// Round a money amount or rate to two decimals
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp(2)
}
