//! Storage ports
//!
//! Services only talk to storage through [`StockStore`] and
//! [`OrgDirectory`]. Every method that changes more than one record is
//! atomic: either all of its writes are visible afterwards or none are.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::{
    ApprovalHistoryEntry, LedgerEntry, LedgerSource, ListingFilter, MovementDirection,
    MovementLine, Period, Product, RequestDocument, RequestStatus, StructureRef, WorkflowKind,
    WorkflowRequest,
};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

pub mod memory;
pub mod postgres;

pub use memory::{FaultPoint, InMemoryDirectory, InMemoryStore};
pub use postgres::{PgDirectory, PgStockStore};

/// Lines to apply to the ledger in one transaction
#[derive(Debug, Clone)]
pub struct MovementBatch {
    pub direction: MovementDirection,
    /// Every product of the batch must belong to this structure
    pub structure_id: Uuid,
    pub lines: Vec<MovementLine>,
    pub source: Option<LedgerSource>,
}

/// A planned workflow transition, committed as one unit
#[derive(Debug, Clone)]
pub struct TransitionCommit {
    pub request_id: Uuid,
    /// Status the request had when the transition was planned
    pub expected_status: RequestStatus,
    pub new_status: RequestStatus,
    pub lock: bool,
    pub observations: Option<String>,
    pub history: ApprovalHistoryEntry,
    pub movement: Option<MovementBatch>,
    pub committed_at: DateTime<Utc>,
}

/// Editable fields of a request, written back by an originator
#[derive(Debug, Clone)]
pub struct RequestRevision {
    pub request_id: Uuid,
    pub expected_status: RequestStatus,
    pub revised: WorkflowRequest,
    pub history: ApprovalHistoryEntry,
}

#[derive(Debug, Clone)]
pub struct ProductFilter {
    pub listing: ListingFilter,
    pub structure_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct LedgerFilter {
    pub listing: ListingFilter,
    pub structure_id: Option<Uuid>,
    pub product_id: Option<Uuid>,
    pub period: Option<Period>,
}

#[derive(Debug, Clone)]
pub struct RequestFilter {
    pub listing: ListingFilter,
    pub kind: Option<WorkflowKind>,
    pub structure_id: Option<Uuid>,
    pub status: Option<RequestStatus>,
    pub period: Option<Period>,
}

impl RequestFilter {
    pub fn matches(&self, request: &WorkflowRequest) -> bool {
        self.listing.admits(request.structure_id, request.ministere_id)
            && self.kind.map_or(true, |k| k == request.kind)
            && self.structure_id.map_or(true, |s| s == request.structure_id)
            && self.status.map_or(true, |s| s == request.status)
            && self.period.map_or(true, |p| p.contains(request.created_at))
    }
}

impl LedgerFilter {
    pub fn matches(&self, entry: &LedgerEntry) -> bool {
        self.listing.admits(entry.structure_id, entry.ministere_id)
            && self.structure_id.map_or(true, |s| s == entry.structure_id)
            && self.product_id.map_or(true, |p| p == entry.product_id)
            && self.period.map_or(true, |p| p.contains(entry.created_at))
    }
}

impl ProductFilter {
    pub fn matches(&self, product: &Product) -> bool {
        self.listing.admits(product.structure_id, product.ministere_id)
            && self.structure_id.map_or(true, |s| s == product.structure_id)
    }
}

/// New quantity of a product after one movement line.
///
/// Sufficiency is checked by the caller; this only guards the arithmetic.
pub(crate) fn moved_quantity(
    current: i64,
    direction: MovementDirection,
    quantity: i64,
) -> AppResult<i64> {
    current
        .checked_add(direction.signed(quantity))
        .ok_or_else(|| {
            AppError::validation(
                "quantity",
                "Resulting stock quantity is too large",
                "La quantité en stock résultante est trop grande",
            )
        })
}

/// Persistence of products, the ledger and workflow requests
#[async_trait]
pub trait StockStore: Send + Sync {
    /// Cheap connectivity check used by the health endpoint
    async fn ping(&self) -> AppResult<()>;

    // Products
    async fn insert_product(&self, product: &Product) -> AppResult<()>;

    async fn get_product(&self, product_id: Uuid) -> AppResult<Option<Product>>;

    async fn list_products(&self, filter: &ProductFilter) -> AppResult<Vec<Product>>;

    /// Update descriptive fields only; quantities belong to the ledger
    async fn update_product_details(
        &self,
        product_id: Uuid,
        name: &str,
        unit: &str,
        description: Option<&str>,
    ) -> AppResult<Product>;

    /// Fails with a conflict while ledger entries or requests reference it
    async fn delete_product(&self, product_id: Uuid) -> AppResult<()>;

    // Ledger
    /// Lock the touched products, check ownership and sufficiency, then
    /// write quantities and entries. Nothing is written on failure.
    async fn apply_movements(&self, batch: &MovementBatch) -> AppResult<Vec<LedgerEntry>>;

    /// Newest first
    async fn list_ledger(&self, filter: &LedgerFilter) -> AppResult<Vec<LedgerEntry>>;

    // Workflow requests
    /// Highest counter already used with this sequence prefix, plus one
    async fn next_sequence(&self, prefix: &str) -> AppResult<u32>;

    /// Insert a request together with its creation history row
    async fn insert_request(
        &self,
        request: &WorkflowRequest,
        history: &ApprovalHistoryEntry,
    ) -> AppResult<()>;

    async fn get_request(&self, request_id: Uuid) -> AppResult<Option<WorkflowRequest>>;

    /// Newest first
    async fn list_requests(&self, filter: &RequestFilter) -> AppResult<Vec<WorkflowRequest>>;

    /// Status, lock, history row and optional ledger movement in one
    /// transaction. Fails with `Locked` or a conflict when the stored request
    /// no longer matches `expected_status`.
    async fn commit_transition(&self, commit: &TransitionCommit) -> AppResult<WorkflowRequest>;

    async fn revise_request(&self, revision: &RequestRevision) -> AppResult<WorkflowRequest>;

    /// Remove a request with its history and document references
    async fn delete_request(&self, request_id: Uuid, expected_status: RequestStatus)
        -> AppResult<()>;

    /// Oldest first
    async fn list_history(&self, request_id: Uuid) -> AppResult<Vec<ApprovalHistoryEntry>>;

    async fn insert_document(&self, document: &RequestDocument) -> AppResult<()>;

    async fn list_documents(&self, request_id: Uuid) -> AppResult<Vec<RequestDocument>>;
}

/// Read-only view of the organizational directory
#[async_trait]
pub trait OrgDirectory: Send + Sync {
    async fn get_structure(&self, structure_id: Uuid) -> AppResult<Option<StructureRef>>;

    async fn list_structures(&self, ministere_id: Uuid) -> AppResult<Vec<StructureRef>>;
}
