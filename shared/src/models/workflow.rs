//! Workflow requests, statuses and approval history

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which approval chain a request follows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowKind {
    /// Alimentation: stock increase from a supplier
    Replenishment,
    /// Octroi: stock decrease to a beneficiary
    Disbursement,
}

impl WorkflowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowKind::Replenishment => "REPLENISHMENT",
            WorkflowKind::Disbursement => "DISBURSEMENT",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "REPLENISHMENT" => Some(WorkflowKind::Replenishment),
            "DISBURSEMENT" => Some(WorkflowKind::Disbursement),
            _ => None,
        }
    }
}

/// Status of a request within its chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Saisie,
    InstanceFinancier,
    ValideFinancier,
    InstanceDirecteur,
    ValideDirecteur,
    InstanceOrdonnateur,
    ValideOrdonnateur,
    Rejete,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 8] = [
        RequestStatus::Saisie,
        RequestStatus::InstanceFinancier,
        RequestStatus::ValideFinancier,
        RequestStatus::InstanceDirecteur,
        RequestStatus::ValideDirecteur,
        RequestStatus::InstanceOrdonnateur,
        RequestStatus::ValideOrdonnateur,
        RequestStatus::Rejete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Saisie => "SAISIE",
            RequestStatus::InstanceFinancier => "INSTANCE_FINANCIER",
            RequestStatus::ValideFinancier => "VALIDE_FINANCIER",
            RequestStatus::InstanceDirecteur => "INSTANCE_DIRECTEUR",
            RequestStatus::ValideDirecteur => "VALIDE_DIRECTEUR",
            RequestStatus::InstanceOrdonnateur => "INSTANCE_ORDONNATEUR",
            RequestStatus::ValideOrdonnateur => "VALIDE_ORDONNATEUR",
            RequestStatus::Rejete => "REJETE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        RequestStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == value)
    }

    /// Pending means neither finally validated nor rejected
    pub fn is_pending(&self) -> bool {
        !matches!(self, RequestStatus::ValideOrdonnateur | RequestStatus::Rejete)
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action an approver takes on a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowAction {
    Instance,
    MaintenirInstance,
    Validate,
    Reject,
}

impl WorkflowAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowAction::Instance => "INSTANCE",
            WorkflowAction::MaintenirInstance => "MAINTENIR_INSTANCE",
            WorkflowAction::Validate => "VALIDATE",
            WorkflowAction::Reject => "REJECT",
        }
    }

    /// Holding or rejecting a request must be explained
    pub fn requires_observations(&self) -> bool {
        !matches!(self, WorkflowAction::Validate)
    }
}

impl std::fmt::Display for WorkflowAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action recorded in the approval history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HistoryAction {
    Creation,
    Modification,
    Instance,
    MaintenirInstance,
    Validate,
    Reject,
}

impl HistoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryAction::Creation => "CREATION",
            HistoryAction::Modification => "MODIFICATION",
            HistoryAction::Instance => "INSTANCE",
            HistoryAction::MaintenirInstance => "MAINTENIR_INSTANCE",
            HistoryAction::Validate => "VALIDATE",
            HistoryAction::Reject => "REJECT",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "CREATION" => Some(HistoryAction::Creation),
            "MODIFICATION" => Some(HistoryAction::Modification),
            "INSTANCE" => Some(HistoryAction::Instance),
            "MAINTENIR_INSTANCE" => Some(HistoryAction::MaintenirInstance),
            "VALIDATE" => Some(HistoryAction::Validate),
            "REJECT" => Some(HistoryAction::Reject),
            _ => None,
        }
    }
}

impl From<WorkflowAction> for HistoryAction {
    fn from(action: WorkflowAction) -> Self {
        match action {
            WorkflowAction::Instance => HistoryAction::Instance,
            WorkflowAction::MaintenirInstance => HistoryAction::MaintenirInstance,
            WorkflowAction::Validate => HistoryAction::Validate,
            WorkflowAction::Reject => HistoryAction::Reject,
        }
    }
}

/// Variant-specific request fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestDetails {
    Replenishment {
        supplier_name: String,
        supplier_tax_id: Option<String>,
        unit_price: Decimal,
    },
    Disbursement {
        beneficiary_name: String,
        beneficiary_phone: Option<String>,
        requested_date: NaiveDate,
        external_reference: Option<String>,
        reason: Option<String>,
    },
}

impl RequestDetails {
    pub fn kind(&self) -> WorkflowKind {
        match self {
            RequestDetails::Replenishment { .. } => WorkflowKind::Replenishment,
            RequestDetails::Disbursement { .. } => WorkflowKind::Disbursement,
        }
    }

    pub fn unit_price(&self) -> Option<Decimal> {
        match self {
            RequestDetails::Replenishment { unit_price, .. } => Some(*unit_price),
            RequestDetails::Disbursement { .. } => None,
        }
    }
}

/// A replenishment or disbursement moving through its approval chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRequest {
    pub id: Uuid,
    pub sequence_number: String,
    pub kind: WorkflowKind,
    pub product_id: Uuid,
    pub quantity: i64,
    pub status: RequestStatus,
    pub locked: bool,
    pub observations: Option<String>,
    pub structure_id: Uuid,
    pub ministere_id: Uuid,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub details: RequestDetails,
}

impl WorkflowRequest {
    /// Value of the request at its own unit price (replenishments only)
    pub fn declared_value(&self) -> Decimal {
        self.details
            .unit_price()
            .map(|price| price * Decimal::from(self.quantity))
            .unwrap_or(Decimal::ZERO)
    }
}

/// One row of a request's approval trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalHistoryEntry {
    pub id: Uuid,
    pub request_id: Uuid,
    pub action: HistoryAction,
    pub previous_status: Option<RequestStatus>,
    pub new_status: RequestStatus,
    pub actor_role: String,
    pub actor_id: Uuid,
    pub observations: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Reference to a document kept by the external document store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestDocument {
    pub id: Uuid,
    pub request_id: Uuid,
    pub document_type: String,
    pub file_name: String,
    pub reference: String,
    pub created_at: DateTime<Utc>,
}
