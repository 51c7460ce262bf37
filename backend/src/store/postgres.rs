//! PostgreSQL storage adapter
//!
//! Multi-record writes run in one transaction. Product rows are locked with
//! `SELECT ... FOR UPDATE` in id order, request rows before anything else.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use shared::{
    sequence_counter, validate_quantity, ApprovalHistoryEntry, HistoryAction, LedgerEntry,
    LedgerSource, ListingFilter, MovementDirection, Product, RequestDetails, RequestDocument,
    RequestStatus, StructureRef, WorkflowKind, WorkflowRequest,
};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{
    moved_quantity, LedgerFilter, MovementBatch, OrgDirectory, ProductFilter, RequestFilter,
    RequestRevision, StockStore, TransitionCommit,
};
use crate::error::{AppError, AppResult};

/// Stock store backed by PostgreSQL
#[derive(Clone)]
pub struct PgStockStore {
    db: PgPool,
}

impl PgStockStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

// ============================================================================
// Rows
// ============================================================================

#[derive(Debug, FromRow)]
struct ProductRow {
    id: Uuid,
    name: String,
    unit: String,
    description: Option<String>,
    quantity: i64,
    initial_quantity: i64,
    price: Option<Decimal>,
    structure_id: Uuid,
    ministere_id: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: row.id,
            name: row.name,
            unit: row.unit,
            description: row.description,
            quantity: row.quantity,
            initial_quantity: row.initial_quantity,
            price: row.price,
            structure_id: row.structure_id,
            ministere_id: row.ministere_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct LedgerRow {
    id: Uuid,
    product_id: Uuid,
    direction: String,
    quantity: i64,
    structure_id: Uuid,
    ministere_id: Uuid,
    request_kind: Option<String>,
    request_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl TryFrom<LedgerRow> for LedgerEntry {
    type Error = AppError;

    fn try_from(row: LedgerRow) -> AppResult<Self> {
        let direction = MovementDirection::parse(&row.direction)
            .ok_or_else(|| AppError::Internal(format!("Unknown direction {}", row.direction)))?;
        let source = match (row.request_kind.as_deref(), row.request_id) {
            (Some(kind), Some(request_id)) => Some(LedgerSource {
                kind: parse_kind(kind)?,
                request_id,
            }),
            _ => None,
        };
        Ok(LedgerEntry {
            id: row.id,
            product_id: row.product_id,
            direction,
            quantity: row.quantity,
            structure_id: row.structure_id,
            ministere_id: row.ministere_id,
            source,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct RequestRow {
    id: Uuid,
    sequence_number: String,
    kind: String,
    product_id: Uuid,
    quantity: i64,
    status: String,
    locked: bool,
    observations: Option<String>,
    structure_id: Uuid,
    ministere_id: Uuid,
    created_by: Uuid,
    supplier_name: Option<String>,
    supplier_tax_id: Option<String>,
    unit_price: Option<Decimal>,
    beneficiary_name: Option<String>,
    beneficiary_phone: Option<String>,
    requested_date: Option<NaiveDate>,
    external_reference: Option<String>,
    reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RequestRow> for WorkflowRequest {
    type Error = AppError;

    fn try_from(row: RequestRow) -> AppResult<Self> {
        let kind = parse_kind(&row.kind)?;
        let details = match kind {
            WorkflowKind::Replenishment => RequestDetails::Replenishment {
                supplier_name: row.supplier_name.unwrap_or_default(),
                supplier_tax_id: row.supplier_tax_id,
                unit_price: row.unit_price.unwrap_or(Decimal::ZERO),
            },
            WorkflowKind::Disbursement => RequestDetails::Disbursement {
                beneficiary_name: row.beneficiary_name.unwrap_or_default(),
                beneficiary_phone: row.beneficiary_phone,
                requested_date: row
                    .requested_date
                    .unwrap_or_else(|| row.created_at.date_naive()),
                external_reference: row.external_reference,
                reason: row.reason,
            },
        };
        Ok(WorkflowRequest {
            id: row.id,
            sequence_number: row.sequence_number,
            kind,
            product_id: row.product_id,
            quantity: row.quantity,
            status: parse_status(&row.status)?,
            locked: row.locked,
            observations: row.observations,
            structure_id: row.structure_id,
            ministere_id: row.ministere_id,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
            details,
        })
    }
}

#[derive(Debug, FromRow)]
struct HistoryRow {
    id: Uuid,
    request_id: Uuid,
    action: String,
    previous_status: Option<String>,
    new_status: String,
    actor_role: String,
    actor_id: Uuid,
    observations: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<HistoryRow> for ApprovalHistoryEntry {
    type Error = AppError;

    fn try_from(row: HistoryRow) -> AppResult<Self> {
        let action = HistoryAction::parse(&row.action)
            .ok_or_else(|| AppError::Internal(format!("Unknown history action {}", row.action)))?;
        let previous_status = row.previous_status.as_deref().map(parse_status).transpose()?;
        Ok(ApprovalHistoryEntry {
            id: row.id,
            request_id: row.request_id,
            action,
            previous_status,
            new_status: parse_status(&row.new_status)?,
            actor_role: row.actor_role,
            actor_id: row.actor_id,
            observations: row.observations,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct DocumentRow {
    id: Uuid,
    request_id: Uuid,
    document_type: String,
    file_name: String,
    reference: String,
    created_at: DateTime<Utc>,
}

impl From<DocumentRow> for RequestDocument {
    fn from(row: DocumentRow) -> Self {
        RequestDocument {
            id: row.id,
            request_id: row.request_id,
            document_type: row.document_type,
            file_name: row.file_name,
            reference: row.reference,
            created_at: row.created_at,
        }
    }
}

/// Row for the request lock query
#[derive(Debug, FromRow)]
struct RequestStateRow {
    status: String,
    locked: bool,
}

fn parse_kind(value: &str) -> AppResult<WorkflowKind> {
    WorkflowKind::parse(value)
        .ok_or_else(|| AppError::Internal(format!("Unknown request kind {}", value)))
}

fn parse_status(value: &str) -> AppResult<RequestStatus> {
    RequestStatus::parse(value)
        .ok_or_else(|| AppError::Internal(format!("Unknown request status {}", value)))
}

const PRODUCT_COLUMNS: &str = "id, name, unit, description, quantity, initial_quantity, price, \
     structure_id, ministere_id, created_at, updated_at";

const REQUEST_COLUMNS: &str = "id, sequence_number, kind, product_id, quantity, status, locked, \
     observations, structure_id, ministere_id, created_by, supplier_name, supplier_tax_id, \
     unit_price, beneficiary_name, beneficiary_phone, requested_date, external_reference, reason, \
     created_at, updated_at";

/// `(ministere, structure)` bounds for a listing, `None` when nothing is visible
fn listing_bounds(listing: ListingFilter) -> Option<(Option<Uuid>, Option<Uuid>)> {
    match listing {
        ListingFilter::Everything => Some((None, None)),
        ListingFilter::Ministere(id) => Some((Some(id), None)),
        ListingFilter::Structure(id) => Some((None, Some(id))),
        ListingFilter::Nothing => None,
    }
}

/// Flattened variant columns of a request
struct DetailColumns<'a> {
    supplier_name: Option<&'a str>,
    supplier_tax_id: Option<&'a str>,
    unit_price: Option<Decimal>,
    beneficiary_name: Option<&'a str>,
    beneficiary_phone: Option<&'a str>,
    requested_date: Option<NaiveDate>,
    external_reference: Option<&'a str>,
    reason: Option<&'a str>,
}

impl<'a> From<&'a RequestDetails> for DetailColumns<'a> {
    fn from(details: &'a RequestDetails) -> Self {
        match details {
            RequestDetails::Replenishment {
                supplier_name,
                supplier_tax_id,
                unit_price,
            } => DetailColumns {
                supplier_name: Some(supplier_name),
                supplier_tax_id: supplier_tax_id.as_deref(),
                unit_price: Some(*unit_price),
                beneficiary_name: None,
                beneficiary_phone: None,
                requested_date: None,
                external_reference: None,
                reason: None,
            },
            RequestDetails::Disbursement {
                beneficiary_name,
                beneficiary_phone,
                requested_date,
                external_reference,
                reason,
            } => DetailColumns {
                supplier_name: None,
                supplier_tax_id: None,
                unit_price: None,
                beneficiary_name: Some(beneficiary_name),
                beneficiary_phone: beneficiary_phone.as_deref(),
                requested_date: Some(*requested_date),
                external_reference: external_reference.as_deref(),
                reason: reason.as_deref(),
            },
        }
    }
}

fn stale_request(request_id: Uuid) -> AppError {
    AppError::Conflict {
        resource: "status".to_string(),
        message: format!("Request {} changed since it was read", request_id),
        message_fr: format!("La demande {} a été modifiée entre-temps", request_id),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

// ============================================================================
// Transaction helpers
// ============================================================================

async fn insert_history(
    tx: &mut Transaction<'_, Postgres>,
    entry: &ApprovalHistoryEntry,
) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO approval_history
            (id, request_id, action, previous_status, new_status, actor_role, actor_id, observations, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(entry.id)
    .bind(entry.request_id)
    .bind(entry.action.as_str())
    .bind(entry.previous_status.map(|s| s.as_str()))
    .bind(entry.new_status.as_str())
    .bind(&entry.actor_role)
    .bind(entry.actor_id)
    .bind(&entry.observations)
    .bind(entry.created_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Lock a request row and check it still has the expected status.
async fn lock_request(
    tx: &mut Transaction<'_, Postgres>,
    request_id: Uuid,
    expected_status: RequestStatus,
    reject_locked: bool,
) -> AppResult<()> {
    let row = sqlx::query_as::<_, RequestStateRow>(
        "SELECT status, locked FROM workflow_requests WHERE id = $1 FOR UPDATE",
    )
    .bind(request_id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Request {}", request_id)))?;

    if reject_locked && row.locked {
        return Err(AppError::Locked);
    }
    if parse_status(&row.status)? != expected_status {
        return Err(stale_request(request_id));
    }
    Ok(())
}

/// Validate every line against locked rows, then write.
async fn apply_batch(
    tx: &mut Transaction<'_, Postgres>,
    batch: &MovementBatch,
    at: DateTime<Utc>,
) -> AppResult<Vec<LedgerEntry>> {
    let mut ids: Vec<Uuid> = batch.lines.iter().map(|l| l.product_id).collect();
    ids.sort();
    ids.dedup();

    let locked = sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {} FROM products WHERE id = ANY($1) ORDER BY id FOR UPDATE",
        PRODUCT_COLUMNS
    ))
    .bind(&ids)
    .fetch_all(&mut **tx)
    .await?;

    let mut products: HashMap<Uuid, ProductRow> =
        locked.into_iter().map(|row| (row.id, row)).collect();

    for line in &batch.lines {
        validate_quantity(line.quantity)
            .map_err(|msg| AppError::validation("quantity", msg, "La quantité doit être positive"))?;

        let product = products
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
    }

    let mut entries = Vec::with_capacity(batch.lines.len());
    for line in &batch.lines {
        let delta = batch.direction.signed(line.quantity);
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            r#"
            UPDATE products
            SET quantity = quantity + $1, price = COALESCE($2, price), updated_at = $3
            WHERE id = $4
            RETURNING {}
            "#,
            PRODUCT_COLUMNS
        ))
        .bind(delta)
        .bind(line.unit_price)
        .bind(at)
        .bind(line.product_id)
        .fetch_one(&mut **tx)
        .await?;

        let entry = LedgerEntry {
            id: Uuid::new_v4(),
            product_id: row.id,
            direction: batch.direction,
            quantity: line.quantity,
            structure_id: row.structure_id,
            ministere_id: row.ministere_id,
            source: batch.source,
            created_at: at,
        };

        sqlx::query(
            r#"
            INSERT INTO ledger_entries
                (id, product_id, direction, quantity, structure_id, ministere_id, request_kind, request_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(entry.id)
        .bind(entry.product_id)
        .bind(entry.direction.as_str())
        .bind(entry.quantity)
        .bind(entry.structure_id)
        .bind(entry.ministere_id)
        .bind(entry.source.map(|s| s.kind.as_str()))
        .bind(entry.source.map(|s| s.request_id))
        .bind(entry.created_at)
        .execute(&mut **tx)
        .await?;

        entries.push(entry);
    }

    Ok(entries)
}

// ============================================================================
// StockStore
// ============================================================================

#[async_trait]
impl StockStore for PgStockStore {
    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.db).await?;
        Ok(())
    }

    async fn insert_product(&self, product: &Product) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO products
                (id, name, unit, description, quantity, initial_quantity, price,
                 structure_id, ministere_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(product.id)
        .bind(&product.name)
        .bind(&product.unit)
        .bind(&product.description)
        .bind(product.quantity)
        .bind(product.initial_quantity)
        .bind(product.price)
        .bind(product.structure_id)
        .bind(product.ministere_id)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn get_product(&self, product_id: Uuid) -> AppResult<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {} FROM products WHERE id = $1",
            PRODUCT_COLUMNS
        ))
        .bind(product_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(Product::from))
    }

    async fn list_products(&self, filter: &ProductFilter) -> AppResult<Vec<Product>> {
        let Some((ministere_id, scope_structure)) = listing_bounds(filter.listing) else {
            return Ok(Vec::new());
        };

        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            r#"
            SELECT {} FROM products
            WHERE ($1::uuid IS NULL OR ministere_id = $1)
              AND ($2::uuid IS NULL OR structure_id = $2)
              AND ($3::uuid IS NULL OR structure_id = $3)
            ORDER BY name
            "#,
            PRODUCT_COLUMNS
        ))
        .bind(ministere_id)
        .bind(scope_structure)
        .bind(filter.structure_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn update_product_details(
        &self,
        product_id: Uuid,
        name: &str,
        unit: &str,
        description: Option<&str>,
    ) -> AppResult<Product> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            r#"
            UPDATE products SET name = $1, unit = $2, description = $3, updated_at = NOW()
            WHERE id = $4
            RETURNING {}
            "#,
            PRODUCT_COLUMNS
        ))
        .bind(name)
        .bind(unit)
        .bind(description)
        .bind(product_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Product {}", product_id)))?;
        Ok(row.into())
    }

    async fn delete_product(&self, product_id: Uuid) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        let exists = sqlx::query_scalar::<_, Uuid>("SELECT id FROM products WHERE id = $1 FOR UPDATE")
            .bind(product_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(AppError::NotFound(format!("Product {}", product_id)));
        }

        let referenced = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(SELECT 1 FROM ledger_entries WHERE product_id = $1)
                OR EXISTS(SELECT 1 FROM workflow_requests WHERE product_id = $1)
            "#,
        )
        .bind(product_id)
        .fetch_one(&mut *tx)
        .await?;
        if referenced {
            return Err(AppError::Conflict {
                resource: "product".to_string(),
                message: "Product is referenced by stock movements or requests".to_string(),
                message_fr: "Le produit est référencé par des mouvements ou des demandes"
                    .to_string(),
            });
        }

        sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(product_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn apply_movements(&self, batch: &MovementBatch) -> AppResult<Vec<LedgerEntry>> {
        let mut tx = self.db.begin().await?;
        let entries = apply_batch(&mut tx, batch, Utc::now()).await?;
        tx.commit().await?;
        Ok(entries)
    }

    async fn list_ledger(&self, filter: &LedgerFilter) -> AppResult<Vec<LedgerEntry>> {
        let Some((ministere_id, scope_structure)) = listing_bounds(filter.listing) else {
            return Ok(Vec::new());
        };

        let rows = sqlx::query_as::<_, LedgerRow>(
            r#"
            SELECT id, product_id, direction, quantity, structure_id, ministere_id,
                   request_kind, request_id, created_at
            FROM ledger_entries
            WHERE ($1::uuid IS NULL OR ministere_id = $1)
              AND ($2::uuid IS NULL OR structure_id = $2)
              AND ($3::uuid IS NULL OR structure_id = $3)
              AND ($4::uuid IS NULL OR product_id = $4)
              AND ($5::timestamptz IS NULL OR created_at >= $5)
              AND ($6::timestamptz IS NULL OR created_at <= $6)
            ORDER BY created_at DESC
            "#,
        )
        .bind(ministere_id)
        .bind(scope_structure)
        .bind(filter.structure_id)
        .bind(filter.product_id)
        .bind(filter.period.map(|p| p.start))
        .bind(filter.period.map(|p| p.end))
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(LedgerEntry::try_from).collect()
    }

    async fn next_sequence(&self, prefix: &str) -> AppResult<u32> {
        let numbers = sqlx::query_scalar::<_, String>(
            "SELECT sequence_number FROM workflow_requests WHERE starts_with(sequence_number, $1)",
        )
        .bind(prefix)
        .fetch_all(&self.db)
        .await?;

        let highest = numbers
            .iter()
            .filter_map(|n| sequence_counter(n))
            .max()
            .unwrap_or(0);
        Ok(highest + 1)
    }

    async fn insert_request(
        &self,
        request: &WorkflowRequest,
        history: &ApprovalHistoryEntry,
    ) -> AppResult<()> {
        let mut tx = self.db.begin().await?;
        let details = DetailColumns::from(&request.details);

        let inserted = sqlx::query(
            r#"
            INSERT INTO workflow_requests
                (id, sequence_number, kind, product_id, quantity, status, locked, observations,
                 structure_id, ministere_id, created_by, supplier_name, supplier_tax_id, unit_price,
                 beneficiary_name, beneficiary_phone, requested_date, external_reference, reason,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21)
            "#,
        )
        .bind(request.id)
        .bind(&request.sequence_number)
        .bind(request.kind.as_str())
        .bind(request.product_id)
        .bind(request.quantity)
        .bind(request.status.as_str())
        .bind(request.locked)
        .bind(&request.observations)
        .bind(request.structure_id)
        .bind(request.ministere_id)
        .bind(request.created_by)
        .bind(details.supplier_name)
        .bind(details.supplier_tax_id)
        .bind(details.unit_price)
        .bind(details.beneficiary_name)
        .bind(details.beneficiary_phone)
        .bind(details.requested_date)
        .bind(details.external_reference)
        .bind(details.reason)
        .bind(request.created_at)
        .bind(request.updated_at)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(err) if is_unique_violation(&err) => {
                return Err(AppError::Conflict {
                    resource: "sequence_number".to_string(),
                    message: format!("Sequence number {} already used", request.sequence_number),
                    message_fr: format!("Le numéro {} est déjà utilisé", request.sequence_number),
                });
            }
            Err(err) => return Err(err.into()),
        }

        insert_history(&mut tx, history).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_request(&self, request_id: Uuid) -> AppResult<Option<WorkflowRequest>> {
        let row = sqlx::query_as::<_, RequestRow>(&format!(
            "SELECT {} FROM workflow_requests WHERE id = $1",
            REQUEST_COLUMNS
        ))
        .bind(request_id)
        .fetch_optional(&self.db)
        .await?;
        row.map(WorkflowRequest::try_from).transpose()
    }

    async fn list_requests(&self, filter: &RequestFilter) -> AppResult<Vec<WorkflowRequest>> {
        let Some((ministere_id, scope_structure)) = listing_bounds(filter.listing) else {
            return Ok(Vec::new());
        };

        let rows = sqlx::query_as::<_, RequestRow>(&format!(
            r#"
            SELECT {} FROM workflow_requests
            WHERE ($1::uuid IS NULL OR ministere_id = $1)
              AND ($2::uuid IS NULL OR structure_id = $2)
              AND ($3::uuid IS NULL OR structure_id = $3)
              AND ($4::text IS NULL OR kind = $4)
              AND ($5::text IS NULL OR status = $5)
              AND ($6::timestamptz IS NULL OR created_at >= $6)
              AND ($7::timestamptz IS NULL OR created_at <= $7)
            ORDER BY created_at DESC
            "#,
            REQUEST_COLUMNS
        ))
        .bind(ministere_id)
        .bind(scope_structure)
        .bind(filter.structure_id)
        .bind(filter.kind.map(|k| k.as_str()))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.period.map(|p| p.start))
        .bind(filter.period.map(|p| p.end))
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(WorkflowRequest::try_from).collect()
    }

    async fn commit_transition(&self, commit: &TransitionCommit) -> AppResult<WorkflowRequest> {
        let mut tx = self.db.begin().await?;
        lock_request(&mut tx, commit.request_id, commit.expected_status, true).await?;

        let row = sqlx::query_as::<_, RequestRow>(&format!(
            r#"
            UPDATE workflow_requests
            SET status = $1, locked = $2, observations = COALESCE($3, observations), updated_at = $4
            WHERE id = $5
            RETURNING {}
            "#,
            REQUEST_COLUMNS
        ))
        .bind(commit.new_status.as_str())
        .bind(commit.lock)
        .bind(&commit.observations)
        .bind(commit.committed_at)
        .bind(commit.request_id)
        .fetch_one(&mut *tx)
        .await?;

        insert_history(&mut tx, &commit.history).await?;

        if let Some(batch) = &commit.movement {
            apply_batch(&mut tx, batch, commit.committed_at).await?;
        }

        tx.commit().await?;
        row.try_into()
    }

    async fn revise_request(&self, revision: &RequestRevision) -> AppResult<WorkflowRequest> {
        let mut tx = self.db.begin().await?;
        lock_request(&mut tx, revision.request_id, revision.expected_status, true).await?;

        let revised = &revision.revised;
        let details = DetailColumns::from(&revised.details);
        let row = sqlx::query_as::<_, RequestRow>(&format!(
            r#"
            UPDATE workflow_requests
            SET quantity = $1, status = $2, observations = $3, supplier_name = $4,
                supplier_tax_id = $5, unit_price = $6, beneficiary_name = $7,
                beneficiary_phone = $8, requested_date = $9, external_reference = $10,
                reason = $11, updated_at = $12
            WHERE id = $13
            RETURNING {}
            "#,
            REQUEST_COLUMNS
        ))
        .bind(revised.quantity)
        .bind(revised.status.as_str())
        .bind(&revised.observations)
        .bind(details.supplier_name)
        .bind(details.supplier_tax_id)
        .bind(details.unit_price)
        .bind(details.beneficiary_name)
        .bind(details.beneficiary_phone)
        .bind(details.requested_date)
        .bind(details.external_reference)
        .bind(details.reason)
        .bind(revised.updated_at)
        .bind(revision.request_id)
        .fetch_one(&mut *tx)
        .await?;

        insert_history(&mut tx, &revision.history).await?;
        tx.commit().await?;
        row.try_into()
    }

    async fn delete_request(
        &self,
        request_id: Uuid,
        expected_status: RequestStatus,
    ) -> AppResult<()> {
        let mut tx = self.db.begin().await?;
        lock_request(&mut tx, request_id, expected_status, false).await?;

        // history and documents cascade
        sqlx::query("DELETE FROM workflow_requests WHERE id = $1")
            .bind(request_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn list_history(&self, request_id: Uuid) -> AppResult<Vec<ApprovalHistoryEntry>> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT id, request_id, action, previous_status, new_status, actor_role, actor_id,
                   observations, created_at
            FROM approval_history
            WHERE request_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(request_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(ApprovalHistoryEntry::try_from).collect()
    }

    async fn insert_document(&self, document: &RequestDocument) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO request_documents (id, request_id, document_type, file_name, reference, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(document.id)
        .bind(document.request_id)
        .bind(&document.document_type)
        .bind(&document.file_name)
        .bind(&document.reference)
        .bind(document.created_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn list_documents(&self, request_id: Uuid) -> AppResult<Vec<RequestDocument>> {
        let rows = sqlx::query_as::<_, DocumentRow>(
            r#"
            SELECT id, request_id, document_type, file_name, reference, created_at
            FROM request_documents
            WHERE request_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(request_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(RequestDocument::from).collect())
    }
}

// ============================================================================
// OrgDirectory
// ============================================================================

/// Directory reading the `structures` and `ministeres` tables
#[derive(Clone)]
pub struct PgDirectory {
    db: PgPool,
}

impl PgDirectory {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[derive(Debug, FromRow)]
struct StructureRow {
    id: Uuid,
    ministere_id: Uuid,
    name: String,
    abbreviation: Option<String>,
    ministere_abbreviation: Option<String>,
}

impl From<StructureRow> for StructureRef {
    fn from(row: StructureRow) -> Self {
        StructureRef {
            id: row.id,
            ministere_id: row.ministere_id,
            name: row.name,
            abbreviation: row.abbreviation,
            ministere_abbreviation: row.ministere_abbreviation,
        }
    }
}

#[async_trait]
impl OrgDirectory for PgDirectory {
    async fn get_structure(&self, structure_id: Uuid) -> AppResult<Option<StructureRef>> {
        let row = sqlx::query_as::<_, StructureRow>(
            r#"
            SELECT s.id, s.ministere_id, s.name, s.abbreviation,
                   m.abbreviation AS ministere_abbreviation
            FROM structures s
            JOIN ministeres m ON m.id = s.ministere_id
            WHERE s.id = $1
            "#,
        )
        .bind(structure_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(StructureRef::from))
    }

    async fn list_structures(&self, ministere_id: Uuid) -> AppResult<Vec<StructureRef>> {
        let rows = sqlx::query_as::<_, StructureRow>(
            r#"
            SELECT s.id, s.ministere_id, s.name, s.abbreviation,
                   m.abbreviation AS ministere_abbreviation
            FROM structures s
            JOIN ministeres m ON m.id = s.ministere_id
            WHERE s.ministere_id = $1
            ORDER BY s.name
            "#,
        )
        .bind(ministere_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(StructureRef::from).collect())
    }
}
