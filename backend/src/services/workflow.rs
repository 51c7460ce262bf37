//! Approval workflow engine
//!
//! One engine serves both request kinds. A [`WorkflowVariant`] supplies
//! the stage chain and the kind-specific rules; everything else (locking,
//! history, atomic commit of the final movement) lives in
//! [`WorkflowEngine`].

use std::marker::PhantomData;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use shared::{
    disbursement_prefix, format_sequence_number, listing_filter, replenishment_prefix,
    validate_phone, validate_quantity, validate_required_text, validate_unit_price, Actor,
    ApprovalHistoryEntry, HistoryAction, LedgerSource, MovementLine, Period, Permissions, Product,
    RequestDetails, RequestDocument, RequestStatus, StageChain, StructureRef, WorkflowAction,
    WorkflowKind, WorkflowRequest, DISBURSEMENT_CHAIN, REPLENISHMENT_CHAIN,
};
use uuid::Uuid;

use super::{PermissionService, StockContext};
use crate::error::{AppError, AppResult, ErrorDetail};
use crate::external::DocumentUpload;
use crate::store::{MovementBatch, RequestFilter, RequestRevision, TransitionCommit};

/// Attempts at picking a free sequence number before giving up
const SEQUENCE_ATTEMPTS: usize = 3;

// ============================================================================
// Variants
// ============================================================================

/// Kind-specific behavior plugged into the engine
pub trait WorkflowVariant: Send + Sync + 'static {
    const KIND: WorkflowKind;

    /// Used in log lines and error messages
    const LABEL: &'static str;

    fn chain() -> &'static StageChain;

    fn sequence_prefix(structure: &StructureRef, year: i32) -> String;

    fn validate_details(details: &RequestDetails) -> AppResult<()>;

    /// Extra checks when a request is created or edited
    fn check_product(_product: &Product, _quantity: i64) -> AppResult<()> {
        Ok(())
    }
}

/// Alimentation: stock increase from a supplier
#[derive(Debug, Clone, Copy, Default)]
pub struct Replenishment;

/// Octroi: stock decrease to a beneficiary
#[derive(Debug, Clone, Copy, Default)]
pub struct Disbursement;

fn wrong_kind(expected: WorkflowKind) -> AppError {
    AppError::validation(
        "details",
        format!("Details must describe a {} request", expected.as_str()),
        format!("Les détails doivent décrire une demande {}", expected.as_str()),
    )
}

impl WorkflowVariant for Replenishment {
    const KIND: WorkflowKind = WorkflowKind::Replenishment;
    const LABEL: &'static str = "Replenishment";

    fn chain() -> &'static StageChain {
        &REPLENISHMENT_CHAIN
    }

    fn sequence_prefix(_structure: &StructureRef, year: i32) -> String {
        replenishment_prefix(year)
    }

    fn validate_details(details: &RequestDetails) -> AppResult<()> {
        let RequestDetails::Replenishment {
            supplier_name,
            unit_price,
            ..
        } = details
        else {
            return Err(wrong_kind(Self::KIND));
        };

        validate_required_text(supplier_name).map_err(|msg| {
            AppError::validation("supplier_name", msg, "Le nom du fournisseur est obligatoire")
        })?;
        validate_unit_price(*unit_price).map_err(|msg| {
            AppError::validation("unit_price", msg, "Le prix unitaire ne peut pas être négatif")
        })?;
        Ok(())
    }
}

impl WorkflowVariant for Disbursement {
    const KIND: WorkflowKind = WorkflowKind::Disbursement;
    const LABEL: &'static str = "Disbursement";

    fn chain() -> &'static StageChain {
        &DISBURSEMENT_CHAIN
    }

    fn sequence_prefix(structure: &StructureRef, year: i32) -> String {
        disbursement_prefix(
            structure.ministere_abbreviation.as_deref(),
            structure.abbreviation.as_deref(),
            year,
        )
    }

    fn validate_details(details: &RequestDetails) -> AppResult<()> {
        let RequestDetails::Disbursement {
            beneficiary_name,
            beneficiary_phone,
            ..
        } = details
        else {
            return Err(wrong_kind(Self::KIND));
        };

        validate_required_text(beneficiary_name).map_err(|msg| {
            AppError::validation(
                "beneficiary_name",
                msg,
                "Le nom du bénéficiaire est obligatoire",
            )
        })?;
        if let Some(phone) = beneficiary_phone.as_deref().filter(|p| !p.trim().is_empty()) {
            validate_phone(phone).map_err(|msg| {
                AppError::validation("beneficiary_phone", msg, "Numéro de téléphone invalide")
            })?;
        }
        Ok(())
    }

    /// A disbursement cannot ask for more than is currently in stock.
    fn check_product(product: &Product, quantity: i64) -> AppResult<()> {
        if product.quantity < quantity {
            return Err(AppError::InsufficientStock {
                product_id: product.id,
                available: product.quantity,
                requested: quantity,
            });
        }
        Ok(())
    }
}

// ============================================================================
// Inputs and outputs
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CreateRequestInput {
    pub structure_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i64,
    pub observations: Option<String>,
    pub details: RequestDetails,
}

/// Fields an originator may change while the request is editable
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateRequestInput {
    pub quantity: Option<i64>,
    pub observations: Option<String>,
    pub details: Option<RequestDetails>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestQuery {
    pub structure_id: Option<Uuid>,
    pub status: Option<RequestStatus>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// Outcome of one item of a bulk transition
#[derive(Debug, Clone, Serialize)]
pub struct BulkItemResult {
    pub request_id: Uuid,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<RequestStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkTransitionReport {
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<BulkItemResult>,
}

/// A request together with what the current user may do with it
#[derive(Debug, Clone, Serialize)]
pub struct RequestView {
    #[serde(flatten)]
    pub request: WorkflowRequest,
    pub allowed_actions: Vec<WorkflowAction>,
    pub editable: bool,
}

// ============================================================================
// Engine
// ============================================================================

pub struct WorkflowEngine<V: WorkflowVariant> {
    ctx: StockContext,
    permissions: PermissionService,
    _variant: PhantomData<V>,
}

pub type ReplenishmentEngine = WorkflowEngine<Replenishment>;
pub type DisbursementEngine = WorkflowEngine<Disbursement>;

impl<V: WorkflowVariant> Clone for WorkflowEngine<V> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
            permissions: self.permissions.clone(),
            _variant: PhantomData,
        }
    }
}

fn is_originator(permissions: &Permissions) -> bool {
    permissions.is_admin || permissions.role.map_or(false, |r| r.is_originator())
}

fn not_originator() -> AppError {
    AppError::unauthorized(
        "Only data entry agents and purchasing managers can modify requests",
        "Seuls les agents de saisie et les responsables achats peuvent modifier les demandes",
    )
}

fn not_editable(status: RequestStatus) -> AppError {
    AppError::Conflict {
        resource: "status".to_string(),
        message: format!("Request can no longer be modified in status {}", status),
        message_fr: format!("La demande ne peut plus être modifiée au statut {}", status),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl<V: WorkflowVariant> WorkflowEngine<V> {
    pub fn new(ctx: StockContext) -> Self {
        let permissions = PermissionService::new(ctx.directory.clone());
        Self {
            ctx,
            permissions,
            _variant: PhantomData,
        }
    }

    /// Load a request of this engine's kind
    async fn load(&self, request_id: Uuid) -> AppResult<WorkflowRequest> {
        self.ctx
            .store
            .get_request(request_id)
            .await?
            .filter(|r| r.kind == V::KIND)
            .ok_or_else(|| AppError::NotFound(format!("{} {}", V::LABEL, request_id)))
    }

    /// Load a request the user can see, with its directory structure
    async fn load_readable(
        &self,
        permissions: &Permissions,
        request_id: Uuid,
    ) -> AppResult<(WorkflowRequest, StructureRef)> {
        let request = self.load(request_id).await?;
        let structure = self
            .permissions
            .attached_structure(request.structure_id, request.ministere_id)
            .await?;
        self.permissions.ensure_readable(permissions, &structure)?;
        Ok((request, structure))
    }

    async fn load_product(&self, product_id: Uuid, structure: &StructureRef) -> AppResult<Product> {
        let product = self
            .ctx
            .store
            .get_product(product_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Product {}", product_id)))?;
        if product.structure_id != structure.id {
            return Err(AppError::InvalidStructure(format!(
                "product {} does not belong to structure {}",
                product_id, structure.id
            )));
        }
        Ok(product)
    }

    fn validate_quantity(quantity: i64) -> AppResult<()> {
        validate_quantity(quantity).map_err(|msg| {
            AppError::validation("quantity", msg, "La quantité doit être supérieure à zéro")
        })
    }

    /// Create a request in the chain's initial status.
    #[tracing::instrument(skip(self, permissions, input), fields(kind = V::LABEL, user_id = %permissions.user_id))]
    pub async fn create(
        &self,
        permissions: &Permissions,
        input: CreateRequestInput,
    ) -> AppResult<WorkflowRequest> {
        let structure = self
            .permissions
            .require_manage(permissions, input.structure_id)
            .await?;
        Self::validate_quantity(input.quantity)?;
        V::validate_details(&input.details)?;

        let product = self.load_product(input.product_id, &structure).await?;
        V::check_product(&product, input.quantity)?;

        let chain = V::chain();
        let now = Utc::now();
        let prefix = V::sequence_prefix(&structure, now.year());
        let observations = non_blank(input.observations);

        for _ in 0..SEQUENCE_ATTEMPTS {
            let counter = self.ctx.store.next_sequence(&prefix).await?;
            let request = WorkflowRequest {
                id: Uuid::new_v4(),
                sequence_number: format_sequence_number(&prefix, counter),
                kind: V::KIND,
                product_id: product.id,
                quantity: input.quantity,
                status: chain.initial,
                locked: false,
                observations: observations.clone(),
                structure_id: structure.id,
                ministere_id: structure.ministere_id,
                created_by: permissions.user_id,
                created_at: now,
                updated_at: now,
                details: input.details.clone(),
            };
            let history = ApprovalHistoryEntry {
                id: Uuid::new_v4(),
                request_id: request.id,
                action: HistoryAction::Creation,
                previous_status: None,
                new_status: chain.initial,
                actor_role: permissions.actor_label(),
                actor_id: permissions.user_id,
                observations: observations.clone(),
                created_at: now,
            };

            match self.ctx.store.insert_request(&request, &history).await {
                Ok(()) => {
                    tracing::info!(
                        request_id = %request.id,
                        sequence_number = %request.sequence_number,
                        "request created"
                    );
                    return Ok(request);
                }
                Err(AppError::Conflict { resource, .. }) if resource == "sequence_number" => {
                    tracing::debug!(%prefix, counter, "sequence number taken, retrying");
                }
                Err(err) => return Err(err),
            }
        }

        Err(AppError::Conflict {
            resource: "sequence_number".to_string(),
            message: "Could not allocate a sequence number, please retry".to_string(),
            message_fr: "Impossible d'attribuer un numéro, veuillez réessayer".to_string(),
        })
    }

    /// Move a request one step along its chain.
    ///
    /// The final validation writes the ledger movement in the same commit
    /// as the status change.
    #[tracing::instrument(skip(self, permissions, observations), fields(kind = V::LABEL, user_id = %permissions.user_id))]
    pub async fn transition(
        &self,
        permissions: &Permissions,
        request_id: Uuid,
        action: WorkflowAction,
        observations: Option<String>,
    ) -> AppResult<WorkflowRequest> {
        let actor = Actor::from_permissions(permissions).ok_or_else(|| {
            AppError::unauthorized(
                "Your account has no role allowed to approve requests",
                "Votre compte n'a aucun rôle autorisé à valider des demandes",
            )
        })?;
        let (request, _) = self.load_readable(permissions, request_id).await?;

        let observations = non_blank(observations);
        let plan = V::chain().plan_transition(
            request.status,
            request.locked,
            actor,
            action,
            observations.as_deref(),
        )?;

        let now = Utc::now();
        let movement = plan.movement.map(|direction| MovementBatch {
            direction,
            structure_id: request.structure_id,
            lines: vec![MovementLine {
                product_id: request.product_id,
                quantity: request.quantity,
                unit_price: request.details.unit_price(),
            }],
            source: Some(LedgerSource {
                kind: V::KIND,
                request_id: request.id,
            }),
        });

        let commit = TransitionCommit {
            request_id: request.id,
            expected_status: plan.from,
            new_status: plan.to,
            lock: plan.locks,
            observations: observations.clone(),
            history: ApprovalHistoryEntry {
                id: Uuid::new_v4(),
                request_id: request.id,
                action: HistoryAction::from(action),
                previous_status: Some(plan.from),
                new_status: plan.to,
                actor_role: permissions.actor_label(),
                actor_id: permissions.user_id,
                observations,
                created_at: now,
            },
            movement,
            committed_at: now,
        };

        let updated = self.ctx.store.commit_transition(&commit).await?;

        if commit.movement.is_some() {
            self.ctx
                .events
                .stock_updated(updated.structure_id, updated.product_id);
        }
        tracing::info!(
            request_id = %updated.id,
            action = %action,
            from = %plan.from,
            to = %plan.to,
            "request transitioned"
        );
        Ok(updated)
    }

    /// Apply the same action to several requests, each on its own.
    pub async fn bulk_transition(
        &self,
        permissions: &Permissions,
        request_ids: &[Uuid],
        action: WorkflowAction,
        observations: Option<String>,
    ) -> BulkTransitionReport {
        let mut results = Vec::with_capacity(request_ids.len());

        for &request_id in request_ids {
            let result = match self
                .transition(permissions, request_id, action, observations.clone())
                .await
            {
                Ok(request) => BulkItemResult {
                    request_id,
                    success: true,
                    status: Some(request.status),
                    error: None,
                },
                Err(err) => {
                    tracing::warn!(%request_id, error = %err, "bulk transition item failed");
                    BulkItemResult {
                        request_id,
                        success: false,
                        status: None,
                        error: Some(err.detail().1),
                    }
                }
            };
            results.push(result);
        }

        let succeeded = results.iter().filter(|r| r.success).count();
        BulkTransitionReport {
            succeeded,
            failed: results.len() - succeeded,
            results,
        }
    }

    /// Edit a request; it goes back to the start of its chain.
    #[tracing::instrument(skip(self, permissions, input), fields(kind = V::LABEL, user_id = %permissions.user_id))]
    pub async fn update(
        &self,
        permissions: &Permissions,
        request_id: Uuid,
        input: UpdateRequestInput,
    ) -> AppResult<WorkflowRequest> {
        if !is_originator(permissions) {
            return Err(not_originator());
        }
        let request = self.load(request_id).await?;
        let structure = self
            .permissions
            .require_manage(permissions, request.structure_id)
            .await?;

        let chain = V::chain();
        if request.locked {
            return Err(AppError::Locked);
        }
        if !chain.is_editable(request.status) {
            return Err(not_editable(request.status));
        }

        let quantity = input.quantity.unwrap_or(request.quantity);
        Self::validate_quantity(quantity)?;
        let details = input.details.unwrap_or_else(|| request.details.clone());
        V::validate_details(&details)?;

        let product = self.load_product(request.product_id, &structure).await?;
        V::check_product(&product, quantity)?;

        let now = Utc::now();
        let observations = non_blank(input.observations).or_else(|| request.observations.clone());
        let revised = WorkflowRequest {
            quantity,
            status: chain.initial,
            observations: observations.clone(),
            updated_at: now,
            details,
            ..request.clone()
        };
        let revision = RequestRevision {
            request_id,
            expected_status: request.status,
            revised,
            history: ApprovalHistoryEntry {
                id: Uuid::new_v4(),
                request_id,
                action: HistoryAction::Modification,
                previous_status: Some(request.status),
                new_status: chain.initial,
                actor_role: permissions.actor_label(),
                actor_id: permissions.user_id,
                observations,
                created_at: now,
            },
        };

        let updated = self.ctx.store.revise_request(&revision).await?;
        tracing::info!(%request_id, "request modified");
        Ok(updated)
    }

    /// Delete a request that is still editable, or one that was rejected.
    #[tracing::instrument(skip(self, permissions), fields(kind = V::LABEL, user_id = %permissions.user_id))]
    pub async fn delete(&self, permissions: &Permissions, request_id: Uuid) -> AppResult<()> {
        if !is_originator(permissions) {
            return Err(not_originator());
        }
        let request = self.load(request_id).await?;
        self.permissions
            .require_manage(permissions, request.structure_id)
            .await?;

        let deletable = request.status == RequestStatus::Rejete
            || (!request.locked && V::chain().is_editable(request.status));
        if !deletable {
            return Err(if request.locked {
                AppError::Locked
            } else {
                not_editable(request.status)
            });
        }

        self.ctx
            .store
            .delete_request(request_id, request.status)
            .await?;
        tracing::info!(%request_id, "request deleted");
        Ok(())
    }

    pub async fn get(&self, permissions: &Permissions, request_id: Uuid) -> AppResult<RequestView> {
        let (request, _) = self.load_readable(permissions, request_id).await?;
        Ok(self.view(permissions, request))
    }

    fn view(&self, permissions: &Permissions, request: WorkflowRequest) -> RequestView {
        let chain = V::chain();
        let allowed_actions = match Actor::from_permissions(permissions) {
            Some(actor) if !request.locked => chain.allowed_actions(request.status, actor),
            _ => Vec::new(),
        };
        let editable = is_originator(permissions)
            && permissions.can_create
            && !request.locked
            && chain.is_editable(request.status);
        RequestView {
            request,
            allowed_actions,
            editable,
        }
    }

    /// Requests visible to the user, newest first
    pub async fn list(
        &self,
        permissions: &Permissions,
        query: &RequestQuery,
    ) -> AppResult<Vec<RequestView>> {
        if !permissions.can_read {
            return Err(AppError::unauthorized(
                "You cannot read requests",
                "Vous ne pouvez pas consulter les demandes",
            ));
        }
        if let Some(structure_id) = query.structure_id {
            self.permissions.require_read(permissions, structure_id).await?;
        }

        let period = match (query.start, query.end) {
            (None, None) => None,
            (start, end) => Some(Period::or_last_month(start, end, Utc::now())),
        };
        let filter = RequestFilter {
            listing: listing_filter(permissions),
            kind: Some(V::KIND),
            structure_id: query.structure_id,
            status: query.status,
            period,
        };

        let requests = self.ctx.store.list_requests(&filter).await?;
        Ok(requests
            .into_iter()
            .map(|r| self.view(permissions, r))
            .collect())
    }

    /// Approval trail, oldest first
    pub async fn history(
        &self,
        permissions: &Permissions,
        request_id: Uuid,
    ) -> AppResult<Vec<ApprovalHistoryEntry>> {
        self.load_readable(permissions, request_id).await?;
        self.ctx.store.list_history(request_id).await
    }

    /// Send a supporting document to the document store and keep its reference.
    pub async fn attach_document(
        &self,
        permissions: &Permissions,
        request_id: Uuid,
        document_type: &str,
        file_name: &str,
        content: Vec<u8>,
    ) -> AppResult<RequestDocument> {
        if !is_originator(permissions) {
            return Err(not_originator());
        }
        let request = self.load(request_id).await?;
        self.permissions
            .require_manage(permissions, request.structure_id)
            .await?;

        validate_required_text(document_type).map_err(|msg| {
            AppError::validation("document_type", msg, "Le type de document est obligatoire")
        })?;
        validate_required_text(file_name).map_err(|msg| {
            AppError::validation("file_name", msg, "Le nom du fichier est obligatoire")
        })?;
        if content.is_empty() {
            return Err(AppError::validation(
                "file",
                "File is empty",
                "Le fichier est vide",
            ));
        }

        let upload = DocumentUpload {
            request_id,
            document_type: document_type.trim().to_string(),
            file_name: file_name.trim().to_string(),
            content,
        };
        let reference = self.ctx.documents.store(&upload).await?;

        let document = RequestDocument {
            id: Uuid::new_v4(),
            request_id,
            document_type: upload.document_type,
            file_name: upload.file_name,
            reference,
            created_at: Utc::now(),
        };
        self.ctx.store.insert_document(&document).await?;
        Ok(document)
    }

    pub async fn list_documents(
        &self,
        permissions: &Permissions,
        request_id: Uuid,
    ) -> AppResult<Vec<RequestDocument>> {
        self.load_readable(permissions, request_id).await?;
        self.ctx.store.list_documents(request_id).await
    }
}
