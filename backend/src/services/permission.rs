//! Permission checks against the organizational directory

use std::sync::Arc;

use serde::Serialize;
use shared::{
    can_manage_entity, can_read_structure, resolve_scope, AccessScope, Permissions, StructureRef,
    UserIdentity,
};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::store::OrgDirectory;

/// Resolves scopes and checks them against directory structures
#[derive(Clone)]
pub struct PermissionService {
    directory: Arc<dyn OrgDirectory>,
}

/// What a user may do, as shown to clients
#[derive(Debug, Clone, Serialize)]
pub struct PermissionsInfo {
    pub user_id: Uuid,
    pub role: Option<String>,
    pub is_admin: bool,
    pub scope: AccessScope,
    pub can_create: bool,
    pub can_read: bool,
    pub structure: Option<StructureRef>,
    pub ministere_id: Option<Uuid>,
}

impl PermissionService {
    pub fn new(directory: Arc<dyn OrgDirectory>) -> Self {
        Self { directory }
    }

    pub fn resolve(&self, user: &UserIdentity) -> Permissions {
        let permissions = resolve_scope(user);
        tracing::debug!(
            user_id = %user.user_id,
            scope = ?permissions.scope,
            "permissions resolved"
        );
        permissions
    }

    /// Directory structure, `InvalidStructure` when unknown
    pub async fn structure(&self, structure_id: Uuid) -> AppResult<StructureRef> {
        self.directory
            .get_structure(structure_id)
            .await?
            .ok_or_else(|| AppError::InvalidStructure(format!("unknown structure {}", structure_id)))
    }

    /// Structure of a stored record, checked against its denormalized ministry
    pub async fn attached_structure(
        &self,
        structure_id: Uuid,
        ministere_id: Uuid,
    ) -> AppResult<StructureRef> {
        let structure = self.structure(structure_id).await?;
        if structure.ministere_id != ministere_id {
            return Err(AppError::InvalidStructure(format!(
                "structure {} does not belong to ministry {}",
                structure_id, ministere_id
            )));
        }
        Ok(structure)
    }

    /// The user must be able to create and edit records of this structure.
    pub async fn require_manage(
        &self,
        permissions: &Permissions,
        structure_id: Uuid,
    ) -> AppResult<StructureRef> {
        if !permissions.can_create {
            return Err(AppError::unauthorized(
                "Your role cannot create or modify stock records",
                "Votre rôle ne permet pas de créer ou modifier des enregistrements de stock",
            ));
        }
        let structure = self.structure(structure_id).await?;
        if !can_manage_entity(permissions, &structure) {
            return Err(AppError::unauthorized(
                "Structure is outside your scope",
                "Cette structure est hors de votre périmètre",
            ));
        }
        Ok(structure)
    }

    /// The user must be able to see records of this structure.
    pub async fn require_read(
        &self,
        permissions: &Permissions,
        structure_id: Uuid,
    ) -> AppResult<StructureRef> {
        let structure = self.structure(structure_id).await?;
        self.ensure_readable(permissions, &structure)?;
        Ok(structure)
    }

    pub fn ensure_readable(
        &self,
        permissions: &Permissions,
        structure: &StructureRef,
    ) -> AppResult<()> {
        if can_read_structure(permissions, structure) {
            Ok(())
        } else {
            Err(AppError::unauthorized(
                "Structure is outside your scope",
                "Cette structure est hors de votre périmètre",
            ))
        }
    }

    pub async fn info(&self, permissions: &Permissions) -> AppResult<PermissionsInfo> {
        let structure = match permissions.structure_id {
            Some(id) => self.directory.get_structure(id).await?,
            None => None,
        };

        Ok(PermissionsInfo {
            user_id: permissions.user_id,
            role: permissions.role.map(|r| r.label().to_string()),
            is_admin: permissions.is_admin,
            scope: permissions.scope,
            can_create: permissions.can_create,
            can_read: permissions.can_read,
            structure,
            ministere_id: permissions.ministere_id,
        })
    }
}
