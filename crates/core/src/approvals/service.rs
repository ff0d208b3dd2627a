use crate::approvals::machine::{ActorPermissions, ApprovalStateMachine, TransitionError};
use crate::authorization::{Authorizer, Capability};
use crate::domain::approval::{
    ActorId, ApprovalAction, ApprovalEvent, ApprovalStatus, NewApprovalEvent,
};
use crate::domain::subject::{ApprovalSubject, SubjectId, SubjectRef, SubjectType};
use crate::errors::ApprovalError;
use crate::store::{AppendGuard, ApprovalEventStore, StoreError};

/// Entry point for approval workflows. Holds no per-request state; every
/// request goes through a fresh [`ApprovalHandle`] from [`Self::model`].
pub struct ApprovalService<S, A> {
    store: S,
    authorizer: A,
    machine: ApprovalStateMachine,
}

impl<S, A> ApprovalService<S, A>
where
    S: ApprovalEventStore,
    A: Authorizer,
{
    pub fn new(store: S, authorizer: A) -> Self {
        Self { store, authorizer, machine: ApprovalStateMachine }
    }

    pub fn event_store(&self) -> &S {
        &self.store
    }

    pub fn model(
        &self,
        subject_type: impl Into<SubjectType>,
        subject_id: impl Into<SubjectId>,
    ) -> ApprovalHandle<'_, S, A> {
        ApprovalHandle::new(self, SubjectRef::new(subject_type, subject_id), None)
    }

    /// Like [`Self::model`], taking the subject from the entity itself. The
    /// entity's `created_by` counts as its creator for the cancel guard.
    pub fn model_of<T>(&self, entity: &T) -> ApprovalHandle<'_, S, A>
    where
        T: ApprovalSubject,
    {
        ApprovalHandle::new(self, entity.subject_ref(), entity.audit_stamp().created_by)
    }
}

/// A pending request against one subject. Setters return a new handle;
/// terminal actions consume it.
#[must_use]
pub struct ApprovalHandle<'a, S, A> {
    service: &'a ApprovalService<S, A>,
    subject: SubjectRef,
    creator_hint: Option<ActorId>,
    actor: Option<ActorId>,
    status: Option<ApprovalStatus>,
    binary_flag: i64,
}

impl<'a, S, A> ApprovalHandle<'a, S, A>
where
    S: ApprovalEventStore,
    A: Authorizer,
{
    fn new(
        service: &'a ApprovalService<S, A>,
        subject: SubjectRef,
        creator_hint: Option<ActorId>,
    ) -> Self {
        Self { service, subject, creator_hint, actor: None, status: None, binary_flag: 0 }
    }

    pub fn subject(&self) -> &SubjectRef {
        &self.subject
    }

    pub fn binary(self, binary_flag: i64) -> Self {
        Self { binary_flag, ..self }
    }

    pub fn status(self, status: ApprovalStatus) -> Self {
        Self { status: Some(status), ..self }
    }

    pub fn user(self, actor: impl Into<ActorId>) -> Self {
        Self { actor: Some(actor.into()), ..self }
    }

    pub async fn get(&self) -> Result<Option<ApprovalEvent>, ApprovalError> {
        Ok(self.service.store.latest(&self.subject).await?)
    }

    pub async fn history(&self) -> Result<Vec<ApprovalEvent>, ApprovalError> {
        Ok(self.service.store.history(&self.subject).await?)
    }

    /// Status the next transition is decided from. Subjects with no events
    /// are drafts.
    pub async fn current_status(&self) -> Result<ApprovalStatus, ApprovalError> {
        let latest = self.get().await?;
        Ok(latest
            .map(|event| event.status.effective())
            .unwrap_or_else(|| self.service.machine.initial_state()))
    }

    /// Records a submission as DRAFT. Needs no capability, but only a subject
    /// that is currently a draft (or has no events) accepts it.
    pub async fn store(self) -> Result<ApprovalEvent, ApprovalError> {
        self.transition(ApprovalAction::Submit).await
    }

    pub async fn approve(self) -> Result<ApprovalEvent, ApprovalError> {
        self.transition(ApprovalAction::Approve).await
    }

    pub async fn reject(self) -> Result<ApprovalEvent, ApprovalError> {
        self.transition(ApprovalAction::Reject).await
    }

    pub async fn cancel(self) -> Result<ApprovalEvent, ApprovalError> {
        self.transition(ApprovalAction::Cancel).await
    }

    pub async fn rollback(self) -> Result<ApprovalEvent, ApprovalError> {
        self.transition(ApprovalAction::Rollback).await
    }

    /// Moves the subject to the status set via [`Self::status`], whatever its
    /// current state. Needs the force capability and nothing else.
    pub async fn force(self) -> Result<ApprovalEvent, ApprovalError> {
        let actor = self.require_actor(ApprovalAction::Force)?;
        let target = self.status.ok_or(ApprovalError::MissingStatus)?;

        let permissions = self.permissions_for(&actor, Capability::Force);
        let current = self.current_status().await?;
        let transition = self
            .service
            .machine
            .force(current, target, &permissions)
            .map_err(|error| self.rejection(error, &actor))?;

        let event = self.pending_event(transition.to, ApprovalAction::Force, actor);
        Ok(self.service.store.append(event, AppendGuard::Unconditional).await?)
    }

    async fn transition(self, action: ApprovalAction) -> Result<ApprovalEvent, ApprovalError> {
        let actor = self.require_actor(action)?;

        let latest = self.service.store.latest(&self.subject).await?;
        let current = latest
            .as_ref()
            .map(|event| event.status)
            .unwrap_or_else(|| self.service.machine.initial_state());

        let mut permissions = ActorPermissions::none();
        if let Some(capability) = ApprovalStateMachine::required_capability(action) {
            permissions = self.permissions_for(&actor, capability);
        }
        if action == ApprovalAction::Cancel
            && !permissions.has(Capability::Cancel)
            && self.is_creator(&actor).await?
        {
            permissions = permissions.as_creator();
        }

        let transition = self
            .service
            .machine
            .apply(current, action, &permissions)
            .map_err(|error| self.rejection(error, &actor))?;

        let event = self.pending_event(transition.to, action, actor);
        let guard = AppendGuard::ExpectLatest(latest.map(|event| event.id));
        match self.service.store.append(event, guard).await {
            Ok(stored) => Ok(stored),
            Err(StoreError::Conflict { current, .. }) => Err(ApprovalError::InvalidTransition {
                from: current.unwrap_or_else(|| self.service.machine.initial_state()),
                action,
            }),
            Err(other) => Err(other.into()),
        }
    }

    fn require_actor(&self, action: ApprovalAction) -> Result<ActorId, ApprovalError> {
        self.actor.clone().ok_or(ApprovalError::MissingActor { action })
    }

    fn permissions_for(&self, actor: &ActorId, capability: Capability) -> ActorPermissions {
        let granted =
            self.service.authorizer.is_allowed(actor, &self.subject.subject_type, capability);
        if granted {
            ActorPermissions::none().with_capability(capability)
        } else {
            ActorPermissions::none()
        }
    }

    async fn is_creator(&self, actor: &ActorId) -> Result<bool, ApprovalError> {
        if self.creator_hint.as_ref() == Some(actor) {
            return Ok(true);
        }

        let first = self.service.store.history_page(&self.subject, None, 1).await?;
        Ok(first.first().is_some_and(|event| &event.actor_id == actor))
    }

    fn rejection(&self, error: TransitionError, actor: &ActorId) -> ApprovalError {
        match error {
            TransitionError::InvalidTransition { from, action } => {
                ApprovalError::InvalidTransition { from, action }
            }
            TransitionError::Unauthorized { required, .. } => ApprovalError::Unauthorized {
                actor: actor.clone(),
                subject_type: self.subject.subject_type.clone(),
                capability: required,
            },
        }
    }

    fn pending_event(
        &self,
        status: ApprovalStatus,
        action: ApprovalAction,
        actor: ActorId,
    ) -> NewApprovalEvent {
        NewApprovalEvent::new(self.subject.clone(), status, action, actor)
            .with_binary_flag(self.binary_flag)
    }
}
