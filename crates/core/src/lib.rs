pub mod approvals;
pub mod authorization;
pub mod config;
pub mod domain;
pub mod errors;
pub mod identity;
pub mod store;

pub use approvals::{
    ActorPermissions, ApprovalHandle, ApprovalService, ApprovalStateMachine, Transition,
    TransitionError,
};
pub use authorization::{Authorizer, Capability, CapabilityGrant, GrantAuthorizer};
pub use domain::approval::{
    ActorId, ApprovalAction, ApprovalEvent, ApprovalStatus, EventId, NewApprovalEvent,
};
pub use domain::audited::{AuditStamp, Audited};
pub use domain::subject::{ApprovalSubject, SubjectId, SubjectRef, SubjectType};
pub use errors::{ApprovalError, InterfaceError};
pub use identity::{Actor, IdentityDirectory, IdentityError, InMemoryIdentityDirectory};
pub use store::{
    AppendGuard, ApprovalEventStore, HistoryCursor, InMemoryApprovalEventStore, StoreError,
};

pub use chrono;
