use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::authorization::Capability;
use crate::domain::approval::{ApprovalAction, ApprovalStatus};

/// What the acting user is allowed to do on the subject, resolved by the
/// caller before the machine runs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ActorPermissions {
    capabilities: BTreeSet<Capability>,
    is_creator: bool,
}

impl ActorPermissions {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities.insert(capability);
        self
    }

    pub fn as_creator(mut self) -> Self {
        self.is_creator = true;
        self
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn is_creator(&self) -> bool {
        self.is_creator
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: ApprovalStatus,
    pub action: ApprovalAction,
    pub to: ApprovalStatus,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("invalid transition from {from} using action {action}")]
    InvalidTransition { from: ApprovalStatus, action: ApprovalAction },
    #[error("action {action} requires `{required}` capability")]
    Unauthorized { action: ApprovalAction, required: Capability },
}

/// Pure transition rules. Holds no state; the current status always comes
/// from the caller.
#[derive(Clone, Copy, Debug, Default)]
pub struct ApprovalStateMachine;

impl ApprovalStateMachine {
    pub fn initial_state(&self) -> ApprovalStatus {
        ApprovalStatus::Draft
    }

    /// Capability an action is checked against. `Submit` has none.
    pub fn required_capability(action: ApprovalAction) -> Option<Capability> {
        match action {
            ApprovalAction::Approve | ApprovalAction::Reject => Some(Capability::Approve),
            ApprovalAction::Cancel => Some(Capability::Cancel),
            ApprovalAction::Rollback => Some(Capability::Rollback),
            ApprovalAction::Force => Some(Capability::Force),
            ApprovalAction::Submit => None,
        }
    }

    /// Applies an organic action. The transition table is checked before the
    /// guard, so an impossible action reports `InvalidTransition` regardless
    /// of permissions. `Submit` is only valid on a draft and needs no
    /// capability. `Force` is not a table action.
    pub fn apply(
        &self,
        current: ApprovalStatus,
        action: ApprovalAction,
        permissions: &ActorPermissions,
    ) -> Result<Transition, TransitionError> {
        use ApprovalAction::{Approve, Cancel, Reject, Rollback, Submit};
        use ApprovalStatus::{Approved, Canceled, Draft, Rejected};

        let to = match (current.effective(), action) {
            (Draft, Submit) => Draft,
            (Draft, Approve) => Approved,
            (Draft, Reject) => Rejected,
            (Draft, Cancel) => Canceled,
            (Approved, Rollback) | (Rejected, Rollback) => ApprovalStatus::Rollback,
            _ => return Err(TransitionError::InvalidTransition { from: current, action }),
        };

        let allowed = match action {
            Submit => true,
            Cancel => permissions.is_creator() || permissions.has(Capability::Cancel),
            other => Self::required_capability(other)
                .map(|capability| permissions.has(capability))
                .unwrap_or(false),
        };
        if !allowed {
            let required = Self::required_capability(action).unwrap_or(Capability::Force);
            return Err(TransitionError::Unauthorized { action, required });
        }

        Ok(Transition { from: current, action, to })
    }

    /// Moves to any status, skipping the table. Only the force capability is
    /// consulted.
    pub fn force(
        &self,
        current: ApprovalStatus,
        target: ApprovalStatus,
        permissions: &ActorPermissions,
    ) -> Result<Transition, TransitionError> {
        if !permissions.has(Capability::Force) {
            return Err(TransitionError::Unauthorized {
                action: ApprovalAction::Force,
                required: Capability::Force,
            });
        }

        Ok(Transition { from: current, action: ApprovalAction::Force, to: target })
    }
}

#[cfg(test)]
mod tests {
    use crate::approvals::machine::{
        ActorPermissions, ApprovalStateMachine, Transition, TransitionError,
    };
    use crate::authorization::Capability;
    use crate::domain::approval::{ApprovalAction, ApprovalStatus};

    fn approver() -> ActorPermissions {
        ActorPermissions::none().with_capability(Capability::Approve)
    }

    #[test]
    fn draft_can_be_approved_rejected_or_canceled() {
        let machine = ApprovalStateMachine;
        let draft = machine.initial_state();

        let approved = machine.apply(draft, ApprovalAction::Approve, &approver()).expect("approve");
        let rejected = machine.apply(draft, ApprovalAction::Reject, &approver()).expect("reject");
        let canceled = machine
            .apply(draft, ApprovalAction::Cancel, &ActorPermissions::none().as_creator())
            .expect("creator cancels");

        assert_eq!(approved.to, ApprovalStatus::Approved);
        assert_eq!(rejected.to, ApprovalStatus::Rejected);
        assert_eq!(canceled.to, ApprovalStatus::Canceled);
    }

    #[test]
    fn approving_twice_is_invalid() {
        let machine = ApprovalStateMachine;
        let error = machine
            .apply(ApprovalStatus::Approved, ApprovalAction::Approve, &approver())
            .expect_err("already approved");

        assert_eq!(
            error,
            TransitionError::InvalidTransition {
                from: ApprovalStatus::Approved,
                action: ApprovalAction::Approve
            }
        );
    }

    #[test]
    fn rollback_reopens_approved_and_rejected_only() {
        let machine = ApprovalStateMachine;
        let permissions = ActorPermissions::none().with_capability(Capability::Rollback);

        for from in [ApprovalStatus::Approved, ApprovalStatus::Rejected] {
            let transition =
                machine.apply(from, ApprovalAction::Rollback, &permissions).expect("rollback");
            assert_eq!(transition.to, ApprovalStatus::Rollback);
            assert_eq!(transition.to.effective(), ApprovalStatus::Draft);
        }

        for from in [ApprovalStatus::Draft, ApprovalStatus::Canceled, ApprovalStatus::Rollback] {
            let error = machine
                .apply(from, ApprovalAction::Rollback, &permissions)
                .expect_err("nothing to roll back");
            assert!(matches!(error, TransitionError::InvalidTransition { .. }));
        }
    }

    #[test]
    fn rolled_back_subject_accepts_draft_actions() {
        let machine = ApprovalStateMachine;
        let transition = machine
            .apply(ApprovalStatus::Rollback, ApprovalAction::Approve, &approver())
            .expect("rollback behaves as draft");

        assert_eq!(
            transition,
            Transition {
                from: ApprovalStatus::Rollback,
                action: ApprovalAction::Approve,
                to: ApprovalStatus::Approved
            }
        );
    }

    #[test]
    fn canceled_is_terminal_for_every_table_action() {
        let machine = ApprovalStateMachine;
        let everything = ActorPermissions::none()
            .with_capability(Capability::Approve)
            .with_capability(Capability::Cancel)
            .with_capability(Capability::Rollback)
            .as_creator();

        for action in [
            ApprovalAction::Approve,
            ApprovalAction::Reject,
            ApprovalAction::Cancel,
            ApprovalAction::Rollback,
        ] {
            assert!(matches!(
                machine.apply(ApprovalStatus::Canceled, action, &everything),
                Err(TransitionError::InvalidTransition { .. })
            ));
        }
    }

    #[test]
    fn guards_require_matching_capability() {
        let machine = ApprovalStateMachine;

        let error = machine
            .apply(ApprovalStatus::Draft, ApprovalAction::Approve, &ActorPermissions::none())
            .expect_err("no approve capability");
        assert_eq!(
            error,
            TransitionError::Unauthorized {
                action: ApprovalAction::Approve,
                required: Capability::Approve
            }
        );

        let error = machine
            .apply(ApprovalStatus::Draft, ApprovalAction::Cancel, &approver())
            .expect_err("approver is not creator");
        assert_eq!(
            error,
            TransitionError::Unauthorized {
                action: ApprovalAction::Cancel,
                required: Capability::Cancel
            }
        );
    }

    #[test]
    fn invalid_combination_wins_over_missing_capability() {
        let machine = ApprovalStateMachine;
        let error = machine
            .apply(ApprovalStatus::Draft, ApprovalAction::Rollback, &ActorPermissions::none())
            .expect_err("draft cannot roll back");

        assert!(matches!(error, TransitionError::InvalidTransition { .. }));
    }

    #[test]
    fn submit_is_only_valid_on_a_draft() {
        let machine = ApprovalStateMachine;

        for from in [ApprovalStatus::Draft, ApprovalStatus::Rollback] {
            let transition = machine
                .apply(from, ApprovalAction::Submit, &ActorPermissions::none())
                .expect("anyone submits a draft");
            assert_eq!(transition.to, ApprovalStatus::Draft);
        }

        for from in [ApprovalStatus::Approved, ApprovalStatus::Rejected, ApprovalStatus::Canceled] {
            let error = machine
                .apply(from, ApprovalAction::Submit, &ActorPermissions::none().as_creator())
                .expect_err("decided subjects cannot be resubmitted");
            assert_eq!(
                error,
                TransitionError::InvalidTransition { from, action: ApprovalAction::Submit }
            );
        }
    }

    #[test]
    fn force_is_not_a_table_action() {
        let machine = ApprovalStateMachine;
        let admin = ActorPermissions::none().with_capability(Capability::Force);

        assert!(matches!(
            machine.apply(ApprovalStatus::Draft, ApprovalAction::Force, &admin),
            Err(TransitionError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn force_reaches_any_status_with_force_capability() {
        let machine = ApprovalStateMachine;
        let admin = ActorPermissions::none().with_capability(Capability::Force);

        let transition = machine
            .force(ApprovalStatus::Canceled, ApprovalStatus::Rejected, &admin)
            .expect("forced");
        assert_eq!(transition.action, ApprovalAction::Force);
        assert_eq!(transition.to, ApprovalStatus::Rejected);

        let error = machine
            .force(ApprovalStatus::Canceled, ApprovalStatus::Rejected, &approver())
            .expect_err("approver cannot force");
        assert!(matches!(error, TransitionError::Unauthorized { required: Capability::Force, .. }));
    }
}
