//! Organizational roles

use serde::{Deserialize, Serialize};

/// Closed set of roles known to the platform.
///
/// Role names arrive from the identity provider as free text with
/// inconsistent casing ("Responsable Achats" / "Responsable achats").
/// They are resolved once with [`Role::parse`]; everything downstream
/// matches on the enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Agent de saisie
    DataEntry,
    /// Responsable achats
    PurchasingManager,
    /// Directeur de la structure
    Director,
    /// Directeur financier
    FinancialDirector,
    /// Responsable financier
    FinancialManager,
    /// Ordonnateur
    DisbursingOfficer,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::DataEntry,
        Role::PurchasingManager,
        Role::Director,
        Role::FinancialDirector,
        Role::FinancialManager,
        Role::DisbursingOfficer,
    ];

    /// Resolve a role label, ignoring case and surrounding whitespace.
    pub fn parse(name: &str) -> Option<Self> {
        let normalized = name.trim().to_lowercase();
        match normalized.as_str() {
            "agent de saisie" | "data_entry" => Some(Role::DataEntry),
            "responsable achats" | "purchasing_manager" => Some(Role::PurchasingManager),
            "directeur" | "directeur de la structure" | "directeur de structure" | "director" => {
                Some(Role::Director)
            }
            "directeur financier" | "financial_director" => Some(Role::FinancialDirector),
            "responsable financier" | "financial_manager" => Some(Role::FinancialManager),
            "ordonnateur" | "disbursing_officer" => Some(Role::DisbursingOfficer),
            _ => None,
        }
    }

    /// Canonical French label, as recorded in approval history
    pub fn label(&self) -> &'static str {
        match self {
            Role::DataEntry => "Agent de saisie",
            Role::PurchasingManager => "Responsable achats",
            Role::Director => "Directeur",
            Role::FinancialDirector => "Directeur financier",
            Role::FinancialManager => "Responsable financier",
            Role::DisbursingOfficer => "Ordonnateur",
        }
    }

    /// Financial director and financial manager share the financial stage.
    pub fn is_financial(&self) -> bool {
        matches!(self, Role::FinancialDirector | Role::FinancialManager)
    }

    /// Roles allowed to originate, edit and delete workflow requests.
    pub fn is_originator(&self) -> bool {
        matches!(self, Role::DataEntry | Role::PurchasingManager)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
