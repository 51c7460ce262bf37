//! In-memory storage adapter
//!
//! All state sits behind one async mutex. Multi-record writes are applied to
//! a staged copy which replaces the live state only once every step
//! succeeded, so a failure anywhere leaves nothing behind.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::{
    sequence_counter, validate_quantity, ApprovalHistoryEntry, LedgerEntry, MovementDirection,
    Product, RequestDocument, RequestStatus, StructureRef, WorkflowRequest,
};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::{
    moved_quantity, LedgerFilter, MovementBatch, OrgDirectory, ProductFilter, RequestFilter,
    RequestRevision, StockStore, TransitionCommit,
};
use crate::error::{AppError, AppResult};

/// Failure that can be injected into the next matching commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPoint {
    /// After the request status and history are staged, before the ledger write
    BeforeLedgerInsert,
}

#[derive(Debug, Default, Clone)]
struct State {
    products: BTreeMap<Uuid, Product>,
    ledger: Vec<LedgerEntry>,
    requests: HashMap<Uuid, WorkflowRequest>,
    history: Vec<ApprovalHistoryEntry>,
    documents: Vec<RequestDocument>,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
    fault: Mutex<Option<FaultPoint>>,
    fail_reads: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next commit reaching `point` fail.
    pub async fn inject_fault(&self, point: FaultPoint) {
        *self.fault.lock().await = Some(point);
    }

    /// Make list queries fail until switched off again.
    pub fn set_read_failure(&self, failing: bool) {
        self.fail_reads.store(failing, Ordering::SeqCst);
    }

    fn check_reads(&self) -> AppResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(AppError::Internal("storage reads unavailable".to_string()));
        }
        Ok(())
    }
}

fn stale_request(request_id: Uuid) -> AppError {
    AppError::Conflict {
        resource: "status".to_string(),
        message: format!("Request {} changed since it was read", request_id),
        message_fr: format!("La demande {} a été modifiée entre-temps", request_id),
    }
}

fn apply_batch(
    state: &mut State,
    batch: &MovementBatch,
    at: DateTime<Utc>,
) -> AppResult<Vec<LedgerEntry>> {
    let mut entries = Vec::with_capacity(batch.lines.len());

    for line in &batch.lines {
        validate_quantity(line.quantity)
            .map_err(|msg| AppError::validation("quantity", msg, "La quantité doit être positive"))?;

        let product = state
            .products
            .get_mut(&line.product_id)
            .ok_or_else(|| AppError::NotFound(format!("Product {}", line.product_id)))?;

        if product.structure_id != batch.structure_id {
            return Err(AppError::InvalidStructure(format!(
                "product {} does not belong to structure {}",
                product.id, batch.structure_id
            )));
        }

        if batch.direction == MovementDirection::Out && product.quantity < line.quantity {
            return Err(AppError::InsufficientStock {
                product_id: product.id,
                available: product.quantity,
                requested: line.quantity,
            });
        }

        product.quantity = moved_quantity(product.quantity, batch.direction, line.quantity)?;
        if let Some(price) = line.unit_price {
            product.price = Some(price);
        }
        product.updated_at = at;

        entries.push(LedgerEntry {
            id: Uuid::new_v4(),
            product_id: product.id,
            direction: batch.direction,
            quantity: line.quantity,
            structure_id: product.structure_id,
            ministere_id: product.ministere_id,
            source: batch.source,
            created_at: at,
        });
    }

    state.ledger.extend(entries.iter().cloned());
    Ok(entries)
}

#[async_trait]
impl StockStore for InMemoryStore {
    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }

    async fn insert_product(&self, product: &Product) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if state.products.contains_key(&product.id) {
            return Err(AppError::Conflict {
                resource: "product".to_string(),
                message: format!("Product {} already exists", product.id),
                message_fr: format!("Le produit {} existe déjà", product.id),
            });
        }
        state.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn get_product(&self, product_id: Uuid) -> AppResult<Option<Product>> {
        Ok(self.state.lock().await.products.get(&product_id).cloned())
    }

    async fn list_products(&self, filter: &ProductFilter) -> AppResult<Vec<Product>> {
        self.check_reads()?;
        let state = self.state.lock().await;
        let mut products: Vec<Product> = state
            .products
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        products.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(products)
    }

    async fn update_product_details(
        &self,
        product_id: Uuid,
        name: &str,
        unit: &str,
        description: Option<&str>,
    ) -> AppResult<Product> {
        let mut state = self.state.lock().await;
        let product = state
            .products
            .get_mut(&product_id)
            .ok_or_else(|| AppError::NotFound(format!("Product {}", product_id)))?;
        product.name = name.to_string();
        product.unit = unit.to_string();
        product.description = description.map(str::to_string);
        product.updated_at = Utc::now();
        Ok(product.clone())
    }

    async fn delete_product(&self, product_id: Uuid) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let referenced = state.ledger.iter().any(|e| e.product_id == product_id)
            || state.requests.values().any(|r| r.product_id == product_id);
        if referenced {
            return Err(AppError::Conflict {
                resource: "product".to_string(),
                message: "Product is referenced by stock movements or requests".to_string(),
                message_fr: "Le produit est référencé par des mouvements ou des demandes"
                    .to_string(),
            });
        }
        state
            .products
            .remove(&product_id)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("Product {}", product_id)))
    }

    async fn apply_movements(&self, batch: &MovementBatch) -> AppResult<Vec<LedgerEntry>> {
        let mut guard = self.state.lock().await;
        let mut staged = guard.clone();
        let entries = apply_batch(&mut staged, batch, Utc::now())?;
        *guard = staged;
        Ok(entries)
    }

    async fn list_ledger(&self, filter: &LedgerFilter) -> AppResult<Vec<LedgerEntry>> {
        self.check_reads()?;
        let state = self.state.lock().await;
        let mut entries: Vec<LedgerEntry> = state
            .ledger
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        entries.reverse();
        Ok(entries)
    }

    async fn next_sequence(&self, prefix: &str) -> AppResult<u32> {
        let state = self.state.lock().await;
        let highest = state
            .requests
            .values()
            .filter(|r| r.sequence_number.starts_with(prefix))
            .filter_map(|r| sequence_counter(&r.sequence_number))
            .max()
            .unwrap_or(0);
        Ok(highest + 1)
    }

    async fn insert_request(
        &self,
        request: &WorkflowRequest,
        history: &ApprovalHistoryEntry,
    ) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if state
            .requests
            .values()
            .any(|r| r.sequence_number == request.sequence_number)
        {
            return Err(AppError::Conflict {
                resource: "sequence_number".to_string(),
                message: format!("Sequence number {} already used", request.sequence_number),
                message_fr: format!("Le numéro {} est déjà utilisé", request.sequence_number),
            });
        }
        state.requests.insert(request.id, request.clone());
        state.history.push(history.clone());
        Ok(())
    }

    async fn get_request(&self, request_id: Uuid) -> AppResult<Option<WorkflowRequest>> {
        Ok(self.state.lock().await.requests.get(&request_id).cloned())
    }

    async fn list_requests(&self, filter: &RequestFilter) -> AppResult<Vec<WorkflowRequest>> {
        self.check_reads()?;
        let state = self.state.lock().await;
        let mut requests: Vec<WorkflowRequest> = state
            .requests
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(requests)
    }

    async fn commit_transition(&self, commit: &TransitionCommit) -> AppResult<WorkflowRequest> {
        let mut guard = self.state.lock().await;
        let fault = if commit.movement.is_some() {
            self.fault.lock().await.take()
        } else {
            None
        };
        let mut staged = guard.clone();

        let request = staged
            .requests
            .get_mut(&commit.request_id)
            .ok_or_else(|| AppError::NotFound(format!("Request {}", commit.request_id)))?;
        if request.locked {
            return Err(AppError::Locked);
        }
        if request.status != commit.expected_status {
            return Err(stale_request(commit.request_id));
        }

        request.status = commit.new_status;
        request.locked = commit.lock;
        if let Some(observations) = &commit.observations {
            request.observations = Some(observations.clone());
        }
        request.updated_at = commit.committed_at;
        let updated = request.clone();

        staged.history.push(commit.history.clone());

        if let Some(batch) = &commit.movement {
            if fault == Some(FaultPoint::BeforeLedgerInsert) {
                return Err(AppError::Internal(
                    "injected fault before ledger insert".to_string(),
                ));
            }
            apply_batch(&mut staged, batch, commit.committed_at)?;
        }

        *guard = staged;
        Ok(updated)
    }

    async fn revise_request(&self, revision: &RequestRevision) -> AppResult<WorkflowRequest> {
        let mut state = self.state.lock().await;
        let current = state
            .requests
            .get(&revision.request_id)
            .ok_or_else(|| AppError::NotFound(format!("Request {}", revision.request_id)))?;
        if current.locked {
            return Err(AppError::Locked);
        }
        if current.status != revision.expected_status {
            return Err(stale_request(revision.request_id));
        }

        state
            .requests
            .insert(revision.request_id, revision.revised.clone());
        state.history.push(revision.history.clone());
        Ok(revision.revised.clone())
    }

    async fn delete_request(
        &self,
        request_id: Uuid,
        expected_status: RequestStatus,
    ) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let current = state
            .requests
            .get(&request_id)
            .ok_or_else(|| AppError::NotFound(format!("Request {}", request_id)))?;
        if current.status != expected_status {
            return Err(stale_request(request_id));
        }

        state.requests.remove(&request_id);
        state.history.retain(|h| h.request_id != request_id);
        state.documents.retain(|d| d.request_id != request_id);
        Ok(())
    }

    async fn list_history(&self, request_id: Uuid) -> AppResult<Vec<ApprovalHistoryEntry>> {
        let state = self.state.lock().await;
        let mut history: Vec<ApprovalHistoryEntry> = state
            .history
            .iter()
            .filter(|h| h.request_id == request_id)
            .cloned()
            .collect();
        history.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(history)
    }

    async fn insert_document(&self, document: &RequestDocument) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if !state.requests.contains_key(&document.request_id) {
            return Err(AppError::NotFound(format!("Request {}", document.request_id)));
        }
        state.documents.push(document.clone());
        Ok(())
    }

    async fn list_documents(&self, request_id: Uuid) -> AppResult<Vec<RequestDocument>> {
        let state = self.state.lock().await;
        Ok(state
            .documents
            .iter()
            .filter(|d| d.request_id == request_id)
            .cloned()
            .collect())
    }
}

/// Directory backed by a fixed set of structures
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    structures: RwLock<HashMap<Uuid, StructureRef>>,
}

impl InMemoryDirectory {
    pub fn new(structures: Vec<StructureRef>) -> Self {
        Self {
            structures: RwLock::new(structures.into_iter().map(|s| (s.id, s)).collect()),
        }
    }

    pub async fn insert(&self, structure: StructureRef) {
        self.structures.write().await.insert(structure.id, structure);
    }
}

#[async_trait]
impl OrgDirectory for InMemoryDirectory {
    async fn get_structure(&self, structure_id: Uuid) -> AppResult<Option<StructureRef>> {
        Ok(self.structures.read().await.get(&structure_id).cloned())
    }

    async fn list_structures(&self, ministere_id: Uuid) -> AppResult<Vec<StructureRef>> {
        let mut structures: Vec<StructureRef> = self
            .structures
            .read()
            .await
            .values()
            .filter(|s| s.ministere_id == ministere_id)
            .cloned()
            .collect();
        structures.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(structures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::MovementLine;

    fn product(structure_id: Uuid, quantity: i64) -> Product {
        let now = Utc::now();
        Product {
            id: Uuid::new_v4(),
            name: "Ramette A4".to_string(),
            unit: "carton".to_string(),
            description: None,
            quantity,
            initial_quantity: quantity,
            price: None,
            structure_id,
            ministere_id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
        }
    }

    fn batch(direction: MovementDirection, structure_id: Uuid, lines: &[(Uuid, i64)]) -> MovementBatch {
        MovementBatch {
            direction,
            structure_id,
            lines: lines
                .iter()
                .map(|(product_id, quantity)| MovementLine {
                    product_id: *product_id,
                    quantity: *quantity,
                    unit_price: None,
                })
                .collect(),
            source: None,
        }
    }

    #[tokio::test]
    async fn test_failed_batch_leaves_nothing() {
        let store = InMemoryStore::new();
        let structure = Uuid::new_v4();
        let a = product(structure, 10);
        let b = product(structure, 2);
        store.insert_product(&a).await.unwrap();
        store.insert_product(&b).await.unwrap();

        let err = store
            .apply_movements(&batch(MovementDirection::Out, structure, &[(a.id, 4), (b.id, 5)]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InsufficientStock { available: 2, requested: 5, .. }));

        assert_eq!(store.get_product(a.id).await.unwrap().unwrap().quantity, 10);
        let filter = LedgerFilter {
            listing: shared::ListingFilter::Everything,
            structure_id: None,
            product_id: None,
            period: None,
        };
        assert!(store.list_ledger(&filter).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_foreign_product_is_rejected() {
        let store = InMemoryStore::new();
        let p = product(Uuid::new_v4(), 10);
        store.insert_product(&p).await.unwrap();

        let err = store
            .apply_movements(&batch(MovementDirection::In, Uuid::new_v4(), &[(p.id, 1)]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidStructure(_)));
    }
}
