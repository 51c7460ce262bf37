//! Approval stage chains
//!
//! Each workflow kind is described by a static table of rules
//! `(from statuses, stage, action) -> next status`. The engine never
//! branches on the kind itself: it plans every transition through
//! [`StageChain::plan_transition`] against the chain of the request.

use serde::Serialize;
use thiserror::Error;

use crate::models::{MovementDirection, Permissions, RequestStatus, Role, WorkflowAction, WorkflowKind};
use crate::validation::validate_observations;

/// Approval stage, i.e. which roles may act on a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Directeur financier or responsable financier
    Financial,
    Director,
    /// Ordonnateur
    Ordonnateur,
}

impl Stage {
    pub fn admits(&self, role: Role) -> bool {
        match self {
            Stage::Financial => role.is_financial(),
            Stage::Director => role == Role::Director,
            Stage::Ordonnateur => role == Role::DisbursingOfficer,
        }
    }
}

/// Who is acting on a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    /// Acts as every role at once
    Admin,
    Role(Role),
}

impl Actor {
    pub fn from_permissions(permissions: &Permissions) -> Option<Self> {
        if permissions.is_admin {
            Some(Actor::Admin)
        } else {
            permissions.role.map(Actor::Role)
        }
    }

    pub fn can_act_at(&self, stage: Stage) -> bool {
        match self {
            Actor::Admin => true,
            Actor::Role(role) => stage.admits(*role),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Actor::Admin => "Admin",
            Actor::Role(role) => role.label(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StageRule {
    pub from: &'static [RequestStatus],
    pub stage: Stage,
    pub action: WorkflowAction,
    pub to: RequestStatus,
}

/// Static description of one approval workflow
#[derive(Debug)]
pub struct StageChain {
    pub kind: WorkflowKind,
    pub initial: RequestStatus,
    pub rules: &'static [StageRule],
    /// Statuses in which an originator may still edit or delete the request
    pub editable: &'static [RequestStatus],
    /// Ledger direction applied at final validation
    pub movement: MovementDirection,
}

const fn rule(
    from: &'static [RequestStatus],
    stage: Stage,
    action: WorkflowAction,
    to: RequestStatus,
) -> StageRule {
    StageRule {
        from,
        stage,
        action,
        to,
    }
}

use RequestStatus::*;
use WorkflowAction::*;

const REPLENISHMENT_RULES: &[StageRule] = &[
    rule(&[Saisie, InstanceFinancier], Stage::Financial, MaintenirInstance, InstanceFinancier),
    rule(&[Saisie, InstanceFinancier], Stage::Financial, Validate, ValideFinancier),
    rule(&[ValideFinancier, InstanceDirecteur], Stage::Director, Instance, InstanceFinancier),
    rule(&[ValideFinancier, InstanceDirecteur], Stage::Director, Validate, ValideDirecteur),
    rule(&[ValideDirecteur, InstanceOrdonnateur], Stage::Ordonnateur, Instance, ValideFinancier),
    rule(&[ValideDirecteur, InstanceOrdonnateur], Stage::Ordonnateur, Validate, ValideOrdonnateur),
    rule(&[ValideDirecteur, InstanceOrdonnateur], Stage::Ordonnateur, Reject, Rejete),
];

const DISBURSEMENT_RULES: &[StageRule] = &[
    rule(&[Saisie, InstanceDirecteur], Stage::Director, Instance, InstanceDirecteur),
    rule(&[Saisie, InstanceDirecteur], Stage::Director, Validate, ValideDirecteur),
    rule(&[ValideDirecteur], Stage::Financial, Validate, ValideFinancier),
    rule(&[ValideFinancier], Stage::Ordonnateur, Instance, InstanceOrdonnateur),
    rule(&[ValideFinancier, InstanceOrdonnateur], Stage::Ordonnateur, Validate, ValideOrdonnateur),
    rule(&[ValideFinancier, InstanceOrdonnateur], Stage::Ordonnateur, Reject, Rejete),
];

/// Alimentation: financial stage first, then director, then ordonnateur.
pub static REPLENISHMENT_CHAIN: StageChain = StageChain {
    kind: WorkflowKind::Replenishment,
    initial: InstanceFinancier,
    rules: REPLENISHMENT_RULES,
    editable: &[Saisie, InstanceFinancier],
    movement: MovementDirection::In,
};

/// Octroi: director first, then financial, then ordonnateur.
pub static DISBURSEMENT_CHAIN: StageChain = StageChain {
    kind: WorkflowKind::Disbursement,
    initial: Saisie,
    rules: DISBURSEMENT_RULES,
    editable: &[Saisie, InstanceDirecteur, InstanceOrdonnateur],
    movement: MovementDirection::Out,
};

/// Statuses after which a request is locked for good
pub fn is_terminal(status: RequestStatus) -> bool {
    matches!(status, ValideOrdonnateur | Rejete)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("request is locked")]
    Locked,

    #[error("{actor} cannot {action} a request in status {status}")]
    RoleNotPermitted {
        actor: String,
        status: RequestStatus,
        action: WorkflowAction,
    },

    #[error("observations are required to {0}")]
    ObservationsRequired(WorkflowAction),
}

/// Outcome of a successful plan, to be committed atomically by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedTransition {
    pub action: WorkflowAction,
    pub from: RequestStatus,
    pub to: RequestStatus,
    pub locks: bool,
    pub movement: Option<MovementDirection>,
}

impl StageChain {
    pub fn is_editable(&self, status: RequestStatus) -> bool {
        self.editable.contains(&status)
    }

    fn find_rule(&self, status: RequestStatus, actor: Actor, action: WorkflowAction) -> Option<&StageRule> {
        self.rules.iter().find(|r| {
            r.action == action && r.from.contains(&status) && actor.can_act_at(r.stage)
        })
    }

    /// Actions the actor may take at this status, in table order
    pub fn allowed_actions(&self, status: RequestStatus, actor: Actor) -> Vec<WorkflowAction> {
        let mut actions = Vec::new();
        for r in self.rules {
            if r.from.contains(&status) && actor.can_act_at(r.stage) && !actions.contains(&r.action) {
                actions.push(r.action);
            }
        }
        actions
    }

    /// Validate a transition without touching anything.
    ///
    /// Checks run in a fixed order: lock, then role and status, then
    /// observations.
    pub fn plan_transition(
        &self,
        status: RequestStatus,
        locked: bool,
        actor: Actor,
        action: WorkflowAction,
        observations: Option<&str>,
    ) -> Result<PlannedTransition, ChainError> {
        if locked {
            return Err(ChainError::Locked);
        }

        let rule = self
            .find_rule(status, actor, action)
            .ok_or_else(|| ChainError::RoleNotPermitted {
                actor: actor.label().to_string(),
                status,
                action,
            })?;

        if action.requires_observations() && validate_observations(observations).is_err() {
            return Err(ChainError::ObservationsRequired(action));
        }

        let movement = (rule.to == ValideOrdonnateur).then_some(self.movement);

        Ok(PlannedTransition {
            action,
            from: status,
            to: rule.to,
            locks: is_terminal(rule.to),
            movement,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FINANCIAL: Actor = Actor::Role(Role::FinancialManager);
    const DIRECTOR: Actor = Actor::Role(Role::Director);
    const ORDONNATEUR: Actor = Actor::Role(Role::DisbursingOfficer);

    fn plan(
        chain: &StageChain,
        status: RequestStatus,
        actor: Actor,
        action: WorkflowAction,
    ) -> Result<PlannedTransition, ChainError> {
        chain.plan_transition(status, false, actor, action, Some("vu"))
    }

    // ========================================================================
    // Replenishment chain
    // ========================================================================

    #[test]
    fn test_replenishment_happy_path() {
        let chain = &REPLENISHMENT_CHAIN;
        assert_eq!(chain.initial, InstanceFinancier);

        let step = plan(chain, InstanceFinancier, FINANCIAL, Validate).unwrap();
        assert_eq!(step.to, ValideFinancier);
        assert!(step.movement.is_none());

        let step = plan(chain, ValideFinancier, DIRECTOR, Validate).unwrap();
        assert_eq!(step.to, ValideDirecteur);

        let step = plan(chain, ValideDirecteur, ORDONNATEUR, Validate).unwrap();
        assert_eq!(step.to, ValideOrdonnateur);
        assert!(step.locks);
        assert_eq!(step.movement, Some(MovementDirection::In));
    }

    #[test]
    fn test_replenishment_instances_send_back() {
        let chain = &REPLENISHMENT_CHAIN;
        assert_eq!(
            plan(chain, InstanceFinancier, Actor::Role(Role::FinancialDirector), MaintenirInstance)
                .unwrap()
                .to,
            InstanceFinancier
        );
        assert_eq!(plan(chain, ValideFinancier, DIRECTOR, Instance).unwrap().to, InstanceFinancier);
        assert_eq!(plan(chain, ValideDirecteur, ORDONNATEUR, Instance).unwrap().to, ValideFinancier);
        assert_eq!(plan(chain, InstanceDirecteur, DIRECTOR, Validate).unwrap().to, ValideDirecteur);
    }

    #[test]
    fn test_replenishment_reject_locks_without_movement() {
        let step = plan(&REPLENISHMENT_CHAIN, InstanceOrdonnateur, ORDONNATEUR, Reject).unwrap();
        assert_eq!(step.to, Rejete);
        assert!(step.locks);
        assert!(step.movement.is_none());
    }

    #[test]
    fn test_director_cannot_validate_first_replenishment_stage() {
        let err = plan(&REPLENISHMENT_CHAIN, InstanceFinancier, DIRECTOR, Validate).unwrap_err();
        assert!(matches!(err, ChainError::RoleNotPermitted { status: InstanceFinancier, .. }));
    }

    // ========================================================================
    // Disbursement chain
    // ========================================================================

    #[test]
    fn test_disbursement_happy_path() {
        let chain = &DISBURSEMENT_CHAIN;
        assert_eq!(chain.initial, Saisie);
        assert_eq!(plan(chain, Saisie, DIRECTOR, Validate).unwrap().to, ValideDirecteur);
        assert_eq!(plan(chain, ValideDirecteur, FINANCIAL, Validate).unwrap().to, ValideFinancier);

        let last = plan(chain, ValideFinancier, ORDONNATEUR, Validate).unwrap();
        assert_eq!(last.to, ValideOrdonnateur);
        assert_eq!(last.movement, Some(MovementDirection::Out));
    }

    #[test]
    fn test_disbursement_ordonnateur_instance_then_validate() {
        let chain = &DISBURSEMENT_CHAIN;
        assert_eq!(plan(chain, ValideFinancier, ORDONNATEUR, Instance).unwrap().to, InstanceOrdonnateur);
        assert_eq!(plan(chain, InstanceOrdonnateur, ORDONNATEUR, Validate).unwrap().to, ValideOrdonnateur);
        assert!(plan(chain, InstanceOrdonnateur, ORDONNATEUR, Instance).is_err());
    }

    #[test]
    fn test_chains_are_asymmetric() {
        // Financial acts first on replenishments, second on disbursements.
        assert!(plan(&REPLENISHMENT_CHAIN, InstanceFinancier, FINANCIAL, Validate).is_ok());
        assert!(plan(&DISBURSEMENT_CHAIN, Saisie, FINANCIAL, Validate).is_err());
        assert!(plan(&DISBURSEMENT_CHAIN, Saisie, DIRECTOR, Validate).is_ok());
        assert!(plan(&REPLENISHMENT_CHAIN, Saisie, DIRECTOR, Validate).is_err());
    }

    // ========================================================================
    // Guards
    // ========================================================================

    #[test]
    fn test_locked_is_checked_first() {
        let err = REPLENISHMENT_CHAIN
            .plan_transition(ValideOrdonnateur, true, DIRECTOR, Instance, None)
            .unwrap_err();
        assert_eq!(err, ChainError::Locked);
    }

    #[test]
    fn test_role_checked_before_observations() {
        let err = DISBURSEMENT_CHAIN
            .plan_transition(Saisie, false, ORDONNATEUR, Reject, None)
            .unwrap_err();
        assert!(matches!(err, ChainError::RoleNotPermitted { .. }));
    }

    #[test]
    fn test_observations_required_for_holds_and_rejections() {
        for (status, action) in [(ValideFinancier, Instance), (InstanceOrdonnateur, Reject)] {
            let err = DISBURSEMENT_CHAIN
                .plan_transition(status, false, Actor::Admin, action, Some("   "))
                .unwrap_err();
            assert_eq!(err, ChainError::ObservationsRequired(action));
        }
        assert!(DISBURSEMENT_CHAIN
            .plan_transition(ValideFinancier, false, ORDONNATEUR, Validate, None)
            .is_ok());
    }

    #[test]
    fn test_rejection_needs_non_blank_observations() {
        for observations in [None, Some("\t\n")] {
            let err = REPLENISHMENT_CHAIN
                .plan_transition(ValideDirecteur, false, ORDONNATEUR, Reject, observations)
                .unwrap_err();
            assert_eq!(err, ChainError::ObservationsRequired(Reject));
        }
        assert!(REPLENISHMENT_CHAIN
            .plan_transition(ValideDirecteur, false, ORDONNATEUR, Reject, Some("Facture absente"))
            .is_ok());
    }

    #[test]
    fn test_admin_acts_at_every_stage_but_follows_table() {
        for status in [Saisie, ValideDirecteur, ValideFinancier] {
            assert!(plan(&DISBURSEMENT_CHAIN, status, Actor::Admin, Validate).is_ok());
        }
        assert!(plan(&DISBURSEMENT_CHAIN, Rejete, Actor::Admin, Validate).is_err());
        assert!(plan(&DISBURSEMENT_CHAIN, ValideDirecteur, Actor::Admin, Reject).is_err());
    }

    #[test]
    fn test_originators_cannot_approve() {
        for role in [Role::DataEntry, Role::PurchasingManager] {
            for chain in [&REPLENISHMENT_CHAIN, &DISBURSEMENT_CHAIN] {
                for status in RequestStatus::ALL {
                    assert!(chain.allowed_actions(status, Actor::Role(role)).is_empty());
                }
            }
        }
    }

    #[test]
    fn test_allowed_actions() {
        assert_eq!(
            DISBURSEMENT_CHAIN.allowed_actions(ValideFinancier, ORDONNATEUR),
            vec![Instance, Validate, Reject]
        );
        assert_eq!(
            REPLENISHMENT_CHAIN.allowed_actions(InstanceFinancier, FINANCIAL),
            vec![MaintenirInstance, Validate]
        );
        assert!(REPLENISHMENT_CHAIN.allowed_actions(Rejete, Actor::Admin).is_empty());
    }

    #[test]
    fn test_editable_statuses() {
        assert!(REPLENISHMENT_CHAIN.is_editable(InstanceFinancier));
        assert!(!REPLENISHMENT_CHAIN.is_editable(ValideFinancier));
        assert!(DISBURSEMENT_CHAIN.is_editable(InstanceOrdonnateur));
        assert!(!DISBURSEMENT_CHAIN.is_editable(ValideDirecteur));
    }
}
