//! Permission resolution
//!
//! A user's rights are derived from their role and organizational
//! attachment every time they make a call. Anything that cannot be
//! resolved cleanly results in no rights at all.

use uuid::Uuid;

use crate::models::{AccessScope, Permissions, Role, StructureRef, UserIdentity};

/// Resolve the scope and rights of a user.
pub fn resolve_scope(user: &UserIdentity) -> Permissions {
    let role = user.role_name.as_deref().and_then(Role::parse);

    if !user.is_approved {
        return Permissions::denied(user.user_id, role);
    }

    if user.is_admin {
        return Permissions {
            user_id: user.user_id,
            role,
            is_admin: true,
            scope: AccessScope::All,
            can_create: true,
            can_read: true,
            structure_id: user.structure_id,
            ministere_id: user.ministere_id,
        };
    }

    let Some(role) = role else {
        return Permissions::denied(user.user_id, None);
    };

    let (scope, can_create) = match role {
        Role::DataEntry => (AccessScope::Structure, true),
        Role::PurchasingManager => (AccessScope::Ministere, true),
        Role::Director => (AccessScope::Structure, false),
        Role::FinancialDirector | Role::FinancialManager | Role::DisbursingOfficer => {
            (AccessScope::Ministere, false)
        }
    };

    let attached = match scope {
        AccessScope::Structure => user.structure_id.is_some() && user.ministere_id.is_some(),
        AccessScope::Ministere => user.ministere_id.is_some(),
        AccessScope::None | AccessScope::All => false,
    };
    if !attached {
        return Permissions::denied(user.user_id, Some(role));
    }

    Permissions {
        user_id: user.user_id,
        role: Some(role),
        is_admin: false,
        scope,
        can_create,
        can_read: true,
        structure_id: user.structure_id,
        ministere_id: user.ministere_id,
    }
}

fn in_scope(permissions: &Permissions, target: &StructureRef) -> bool {
    match permissions.scope {
        AccessScope::All => true,
        AccessScope::Structure => permissions.structure_id == Some(target.id),
        AccessScope::Ministere => permissions.ministere_id == Some(target.ministere_id),
        AccessScope::None => false,
    }
}

/// May the user create, edit or delete records of this structure?
pub fn can_manage_entity(permissions: &Permissions, target: &StructureRef) -> bool {
    permissions.can_create && in_scope(permissions, target)
}

/// May the user see (and approve) records of this structure?
pub fn can_read_structure(permissions: &Permissions, target: &StructureRef) -> bool {
    permissions.can_read && in_scope(permissions, target)
}

/// Organizational filter to apply to listings for this user.
pub fn listing_filter(permissions: &Permissions) -> ListingFilter {
    match permissions.scope {
        AccessScope::All => ListingFilter::Everything,
        AccessScope::Structure => permissions
            .structure_id
            .map(ListingFilter::Structure)
            .unwrap_or(ListingFilter::Nothing),
        AccessScope::Ministere => permissions
            .ministere_id
            .map(ListingFilter::Ministere)
            .unwrap_or(ListingFilter::Nothing),
        AccessScope::None => ListingFilter::Nothing,
    }
}

/// Organizational restriction applied to list queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingFilter {
    Everything,
    Ministere(Uuid),
    Structure(Uuid),
    Nothing,
}

impl ListingFilter {
    pub fn admits(&self, structure_id: Uuid, ministere_id: Uuid) -> bool {
        match self {
            ListingFilter::Everything => true,
            ListingFilter::Ministere(id) => *id == ministere_id,
            ListingFilter::Structure(id) => *id == structure_id,
            ListingFilter::Nothing => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(role: Option<&str>, structure: Option<Uuid>, ministere: Option<Uuid>) -> UserIdentity {
        UserIdentity {
            user_id: Uuid::new_v4(),
            role_name: role.map(str::to_string),
            is_admin: false,
            is_approved: true,
            structure_id: structure,
            ministere_id: ministere,
        }
    }

    fn structure(id: Uuid, ministere_id: Uuid) -> StructureRef {
        StructureRef {
            id,
            ministere_id,
            name: "Direction des moyens".to_string(),
            abbreviation: Some("DM".to_string()),
            ministere_abbreviation: Some("MS".to_string()),
        }
    }

    #[test]
    fn test_admin_has_everything() {
        let mut user = identity(None, None, None);
        user.is_admin = true;
        let perms = resolve_scope(&user);

        assert_eq!(perms.scope, AccessScope::All);
        assert!(perms.can_create && perms.can_read);
        assert!(can_manage_entity(&perms, &structure(Uuid::new_v4(), Uuid::new_v4())));
    }

    #[test]
    fn test_unapproved_user_is_denied() {
        let mut user = identity(Some("Agent de saisie"), Some(Uuid::new_v4()), Some(Uuid::new_v4()));
        user.is_approved = false;
        let perms = resolve_scope(&user);

        assert_eq!(perms.scope, AccessScope::None);
        assert!(!perms.can_read);
    }

    #[test]
    fn test_unknown_or_missing_role_is_denied() {
        let ids = (Some(Uuid::new_v4()), Some(Uuid::new_v4()));
        assert_eq!(resolve_scope(&identity(None, ids.0, ids.1)).scope, AccessScope::None);
        assert_eq!(resolve_scope(&identity(Some("Stagiaire"), ids.0, ids.1)).scope, AccessScope::None);
    }

    #[test]
    fn test_role_table() {
        let s = Some(Uuid::new_v4());
        let m = Some(Uuid::new_v4());
        let cases = [
            ("Agent de saisie", AccessScope::Structure, true),
            ("Responsable Achats", AccessScope::Ministere, true),
            ("Directeur", AccessScope::Structure, false),
            ("Directeur financier", AccessScope::Ministere, false),
            ("Responsable financier", AccessScope::Ministere, false),
            ("Ordonnateur", AccessScope::Ministere, false),
        ];
        for (role, scope, can_create) in cases {
            let perms = resolve_scope(&identity(Some(role), s, m));
            assert_eq!(perms.scope, scope, "{role}");
            assert_eq!(perms.can_create, can_create, "{role}");
            assert!(perms.can_read, "{role}");
        }
    }

    #[test]
    fn test_missing_attachment_fails_closed() {
        let m = Some(Uuid::new_v4());
        let perms = resolve_scope(&identity(Some("Agent de saisie"), None, m));
        assert_eq!(perms.scope, AccessScope::None);
        assert!(!perms.can_create);

        let perms = resolve_scope(&identity(Some("Responsable achats"), Some(Uuid::new_v4()), None));
        assert_eq!(perms.scope, AccessScope::None);
    }

    #[test]
    fn test_structure_scope_boundaries() {
        let ministere = Uuid::new_v4();
        let own = Uuid::new_v4();
        let perms = resolve_scope(&identity(Some("Agent de saisie"), Some(own), Some(ministere)));

        assert!(can_manage_entity(&perms, &structure(own, ministere)));
        assert!(!can_manage_entity(&perms, &structure(Uuid::new_v4(), ministere)));
    }

    #[test]
    fn test_ministere_scope_boundaries() {
        let ministere = Uuid::new_v4();
        let perms = resolve_scope(&identity(Some("Responsable achats"), Some(Uuid::new_v4()), Some(ministere)));

        assert!(can_manage_entity(&perms, &structure(Uuid::new_v4(), ministere)));
        assert!(!can_manage_entity(&perms, &structure(Uuid::new_v4(), Uuid::new_v4())));
    }

    #[test]
    fn test_approvers_read_but_do_not_manage() {
        let ministere = Uuid::new_v4();
        let target = structure(Uuid::new_v4(), ministere);
        let perms = resolve_scope(&identity(Some("Ordonnateur"), None, Some(ministere)));

        assert!(can_read_structure(&perms, &target));
        assert!(!can_manage_entity(&perms, &target));
    }

    #[test]
    fn test_listing_filter() {
        let s = Uuid::new_v4();
        let m = Uuid::new_v4();
        let director = resolve_scope(&identity(Some("Directeur"), Some(s), Some(m)));
        assert_eq!(listing_filter(&director), ListingFilter::Structure(s));
        assert!(ListingFilter::Ministere(m).admits(Uuid::new_v4(), m));
        assert!(!ListingFilter::Nothing.admits(s, m));
    }
}
