//! Approval workflow: the pure transition rules and the service façade that
//! binds them to a store and an authorizer.

pub mod machine;
pub mod service;

pub use machine::{ActorPermissions, ApprovalStateMachine, Transition, TransitionError};
pub use service::{ApprovalHandle, ApprovalService};
