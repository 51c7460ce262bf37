//! User identity and resolved permissions

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Role;

/// Identity as supplied by the session provider.
///
/// Nothing in here is trusted until it has gone through
/// [`crate::permissions::resolve_scope`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserIdentity {
    pub user_id: Uuid,
    pub role_name: Option<String>,
    pub is_admin: bool,
    pub is_approved: bool,
    pub structure_id: Option<Uuid>,
    pub ministere_id: Option<Uuid>,
}

/// Breadth of organizational data a user may act upon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessScope {
    None,
    Structure,
    Ministere,
    All,
}

/// Result of resolving a user's identity.
///
/// Built once per incoming call and passed explicitly through services.
#[derive(Debug, Clone, Serialize)]
pub struct Permissions {
    pub user_id: Uuid,
    pub role: Option<Role>,
    pub is_admin: bool,
    pub scope: AccessScope,
    pub can_create: bool,
    pub can_read: bool,
    pub structure_id: Option<Uuid>,
    pub ministere_id: Option<Uuid>,
}

impl Permissions {
    /// Fail-closed permissions for a user with no usable attachment.
    pub fn denied(user_id: Uuid, role: Option<Role>) -> Self {
        Self {
            user_id,
            role,
            is_admin: false,
            scope: AccessScope::None,
            can_create: false,
            can_read: false,
            structure_id: None,
            ministere_id: None,
        }
    }

    /// Label written to approval history for actions taken by this user
    pub fn actor_label(&self) -> String {
        if self.is_admin {
            "Admin".to_string()
        } else {
            self.role
                .map(|r| r.label().to_string())
                .unwrap_or_else(|| "Inconnu".to_string())
        }
    }
}
