//! Business logic services for the stock ledger

use std::sync::Arc;

use crate::events::StockEvents;
use crate::external::DocumentStore;
use crate::store::{OrgDirectory, StockStore};

pub mod analytics;
pub mod ledger;
pub mod permission;
pub mod product;
pub mod reporting;
pub mod workflow;

pub use analytics::AnalyticsService;
pub use ledger::LedgerService;
pub use permission::PermissionService;
pub use product::ProductService;
pub use reporting::ReportingService;
pub use workflow::{
    Disbursement, DisbursementEngine, Replenishment, ReplenishmentEngine, WorkflowEngine,
    WorkflowVariant,
};

/// Collaborators shared by every service
#[derive(Clone)]
pub struct StockContext {
    pub store: Arc<dyn StockStore>,
    pub directory: Arc<dyn OrgDirectory>,
    pub documents: Arc<dyn DocumentStore>,
    pub events: StockEvents,
}
