//! Permission resolver tests
//!
//! Scope derivation per role, fail-closed behavior and the directory checks
//! built on top of it.

mod support;

use shared::{
    can_manage_entity, can_read_structure, resolve_scope, AccessScope, ListingFilter, Role,
    UserIdentity,
};
use stock_backend::error::AppError;
use stock_backend::services::PermissionService;
use uuid::Uuid;

use support::Harness;

fn identity(role: Option<&str>, structure_id: Option<Uuid>, ministere_id: Option<Uuid>) -> UserIdentity {
    UserIdentity {
        user_id: Uuid::new_v4(),
        role_name: role.map(str::to_string),
        is_admin: false,
        is_approved: true,
        structure_id,
        ministere_id,
    }
}

// ============================================================================
// Scope Resolution
// ============================================================================

#[test]
fn test_scope_per_role() {
    let structure_id = Some(Uuid::new_v4());
    let ministere_id = Some(Uuid::new_v4());

    let cases = [
        ("Agent de saisie", AccessScope::Structure, true),
        ("Responsable achats", AccessScope::Ministere, true),
        ("Directeur", AccessScope::Structure, false),
        ("Directeur financier", AccessScope::Ministere, false),
        ("Responsable financier", AccessScope::Ministere, false),
        ("Ordonnateur", AccessScope::Ministere, false),
    ];

    for (role, scope, can_create) in cases {
        let permissions = resolve_scope(&identity(Some(role), structure_id, ministere_id));
        assert_eq!(permissions.scope, scope, "{role}");
        assert_eq!(permissions.can_create, can_create, "{role}");
        assert!(permissions.can_read, "{role}");
    }
}

#[test]
fn test_role_names_are_case_insensitive() {
    let permissions = resolve_scope(&identity(
        Some("  RESPONSABLE Achats "),
        None,
        Some(Uuid::new_v4()),
    ));
    assert_eq!(permissions.role, Some(Role::PurchasingManager));
}

#[test]
fn test_unresolvable_users_get_nothing() {
    let ministere_id = Some(Uuid::new_v4());

    // structure role without a structure
    let missing_structure = resolve_scope(&identity(Some("Agent de saisie"), None, ministere_id));
    // unknown role
    let unknown = resolve_scope(&identity(Some("Stagiaire"), Some(Uuid::new_v4()), ministere_id));
    // not approved yet
    let mut pending = identity(Some("Directeur"), Some(Uuid::new_v4()), ministere_id);
    pending.is_approved = false;
    let pending = resolve_scope(&pending);

    for permissions in [missing_structure, unknown, pending] {
        assert_eq!(permissions.scope, AccessScope::None);
        assert!(!permissions.can_create);
        assert!(!permissions.can_read);
    }
}

#[test]
fn test_admin_sees_everything() {
    let mut admin = identity(None, None, None);
    admin.is_admin = true;
    let permissions = resolve_scope(&admin);

    assert_eq!(permissions.scope, AccessScope::All);
    assert!(permissions.can_create);
    assert_eq!(shared::listing_filter(&permissions), ListingFilter::Everything);
}

// ============================================================================
// Directory Checks
// ============================================================================

#[test]
fn test_manage_and_read_follow_scope() {
    let h = Harness::new();
    let clerk = h.user(Role::DataEntry);
    let buyer = h.user(Role::PurchasingManager);
    let director = h.user(Role::Director);

    assert!(can_manage_entity(&clerk, &h.structure));
    assert!(!can_manage_entity(&clerk, &h.sibling));
    assert!(can_manage_entity(&buyer, &h.sibling));
    assert!(!can_manage_entity(&buyer, &h.foreign));
    assert!(!can_manage_entity(&director, &h.structure));
    assert!(can_read_structure(&director, &h.structure));
    assert!(!can_read_structure(&director, &h.sibling));
}

#[tokio::test]
async fn test_unknown_structure_is_invalid() {
    let h = Harness::new();
    let service = PermissionService::new(h.ctx.directory.clone());

    let err = service
        .require_manage(&h.user(Role::DataEntry), Uuid::new_v4())
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::InvalidStructure(_)));
}

#[tokio::test]
async fn test_mismatched_ministry_is_invalid() {
    let h = Harness::new();
    let service = PermissionService::new(h.ctx.directory.clone());

    let err = service
        .attached_structure(h.structure.id, h.foreign.ministere_id)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::InvalidStructure(_)));
}

#[tokio::test]
async fn test_permissions_info() {
    let h = Harness::new();
    let service = PermissionService::new(h.ctx.directory.clone());

    let info = service.info(&h.user(Role::DataEntry)).await.unwrap();

    assert_eq!(info.role.as_deref(), Some("Agent de saisie"));
    assert_eq!(info.scope, AccessScope::Structure);
    assert_eq!(info.structure.map(|s| s.id), Some(h.structure.id));
}
