//! Products and the stock ledger

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::WorkflowKind;

/// A stockable item owned by a structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub unit: String,
    pub description: Option<String>,
    pub quantity: i64,
    /// Baseline for threshold math, fixed at creation
    pub initial_quantity: i64,
    /// Latest known unit price, set by validated replenishments
    pub price: Option<Decimal>,
    pub structure_id: Uuid,
    pub ministere_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Direction of a stock movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MovementDirection {
    In,
    Out,
}

impl MovementDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementDirection::In => "IN",
            MovementDirection::Out => "OUT",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "IN" => Some(MovementDirection::In),
            "OUT" => Some(MovementDirection::Out),
            _ => None,
        }
    }

    /// Signed quantity as it contributes to the product balance
    pub fn signed(&self, quantity: i64) -> i64 {
        match self {
            MovementDirection::In => quantity,
            MovementDirection::Out => -quantity,
        }
    }
}

/// Workflow request a ledger entry originates from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSource {
    pub kind: WorkflowKind,
    pub request_id: Uuid,
}

/// Immutable record of one stock quantity change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub product_id: Uuid,
    pub direction: MovementDirection,
    pub quantity: i64,
    pub structure_id: Uuid,
    pub ministere_id: Uuid,
    pub source: Option<LedgerSource>,
    pub created_at: DateTime<Utc>,
}

/// One line of a movement batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementLine {
    pub product_id: Uuid,
    pub quantity: i64,
    /// New latest unit price to record on the product (replenishments only)
    #[serde(default)]
    pub unit_price: Option<Decimal>,
}

/// Balance of a product recomputed from its ledger
pub fn ledger_balance(initial_quantity: i64, entries: &[LedgerEntry]) -> i64 {
    entries
        .iter()
        .fold(initial_quantity, |acc, e| acc + e.direction.signed(e.quantity))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(direction: MovementDirection, quantity: i64) -> LedgerEntry {
        LedgerEntry {
            id: Uuid::new_v4(),
            product_id: Uuid::nil(),
            direction,
            quantity,
            structure_id: Uuid::nil(),
            ministere_id: Uuid::nil(),
            source: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_ledger_balance() {
        let entries = vec![
            entry(MovementDirection::In, 50),
            entry(MovementDirection::Out, 20),
            entry(MovementDirection::In, 10),
            entry(MovementDirection::Out, 15),
        ];

        // 100 + 50 - 20 + 10 - 15 = 125
        assert_eq!(ledger_balance(100, &entries), 125);
        assert_eq!(ledger_balance(7, &[]), 7);
    }

    #[test]
    fn test_direction_codes() {
        assert_eq!(MovementDirection::parse("IN"), Some(MovementDirection::In));
        assert_eq!(MovementDirection::parse("OUT"), Some(MovementDirection::Out));
        assert_eq!(MovementDirection::parse("out"), None);
        assert_eq!(MovementDirection::Out.signed(4), -4);
    }
}
