use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::audited::{AuditStamp, Audited};
use crate::domain::subject::SubjectRef;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(pub i64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActorId(pub String);

impl From<&str> for ActorId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for ActorId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle phase of an approvable subject.
///
/// `Canceled` is terminal. `Rollback` records that an approval or rejection was
/// undone; a subject whose latest event is `Rollback` behaves as `Draft`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Draft,
    Approved,
    Rejected,
    Canceled,
    Rollback,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Canceled => "canceled",
            Self::Rollback => "rollback",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "canceled" | "cancelled" => Some(Self::Canceled),
            "rollback" => Some(Self::Rollback),
            _ => None,
        }
    }

    /// Status used when deciding the next transition.
    pub fn effective(self) -> Self {
        match self {
            Self::Rollback => Self::Draft,
            other => other,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Canceled)
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verb recorded on every event. Forced transitions keep `Force` here even
/// though their status is whatever target the caller chose.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalAction {
    Submit,
    Approve,
    Reject,
    Cancel,
    Rollback,
    Force,
}

impl ApprovalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Cancel => "cancel",
            Self::Rollback => "rollback",
            Self::Force => "force",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "submit" => Some(Self::Submit),
            "approve" => Some(Self::Approve),
            "reject" => Some(Self::Reject),
            "cancel" => Some(Self::Cancel),
            "rollback" => Some(Self::Rollback),
            "force" => Some(Self::Force),
            _ => None,
        }
    }
}

impl fmt::Display for ApprovalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalEvent {
    pub id: EventId,
    pub subject: SubjectRef,
    pub status: ApprovalStatus,
    pub action: ApprovalAction,
    pub actor_id: ActorId,
    pub binary_flag: i64,
    pub created_at: DateTime<Utc>,
}

impl ApprovalEvent {
    pub fn is_forced(&self) -> bool {
        self.action == ApprovalAction::Force
    }

    /// Ordering key for "most recent": creation time, then id.
    pub fn recency_key(&self) -> (DateTime<Utc>, EventId) {
        (self.created_at, self.id)
    }
}

impl Audited for ApprovalEvent {
    fn audit_stamp(&self) -> AuditStamp {
        AuditStamp::created(self.actor_id.clone())
    }
}

/// An event that has not been stored yet. The store fills in `id` and
/// `created_at` when they are absent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewApprovalEvent {
    pub id: Option<EventId>,
    pub subject: SubjectRef,
    pub status: ApprovalStatus,
    pub action: ApprovalAction,
    pub actor_id: ActorId,
    pub binary_flag: i64,
    pub created_at: Option<DateTime<Utc>>,
}

impl NewApprovalEvent {
    pub fn new(
        subject: SubjectRef,
        status: ApprovalStatus,
        action: ApprovalAction,
        actor_id: ActorId,
    ) -> Self {
        Self { id: None, subject, status, action, actor_id, binary_flag: 0, created_at: None }
    }

    pub fn with_id(mut self, id: EventId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn with_binary_flag(mut self, binary_flag: i64) -> Self {
        self.binary_flag = binary_flag;
        self
    }

    pub fn into_event(self, id: EventId, created_at: DateTime<Utc>) -> ApprovalEvent {
        ApprovalEvent {
            id,
            subject: self.subject,
            status: self.status,
            action: self.action,
            actor_id: self.actor_id,
            binary_flag: self.binary_flag,
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use crate::domain::approval::{
        ActorId, ApprovalAction, ApprovalStatus, EventId, NewApprovalEvent,
    };
    use crate::domain::audited::Audited;
    use crate::domain::subject::SubjectRef;

    #[test]
    fn rollback_is_effectively_draft() {
        assert_eq!(ApprovalStatus::Rollback.effective(), ApprovalStatus::Draft);
        assert_eq!(ApprovalStatus::Approved.effective(), ApprovalStatus::Approved);
        assert!(ApprovalStatus::Canceled.is_terminal());
        assert!(!ApprovalStatus::Rejected.is_terminal());
    }

    #[test]
    fn status_parse_accepts_both_cancel_spellings() {
        assert_eq!(ApprovalStatus::parse(" Cancelled "), Some(ApprovalStatus::Canceled));
        assert_eq!(ApprovalStatus::parse("canceled"), Some(ApprovalStatus::Canceled));
        assert_eq!(ApprovalStatus::parse("pending"), None);
        assert_eq!(ApprovalAction::parse("FORCE"), Some(ApprovalAction::Force));
    }

    #[test]
    fn status_serializes_as_snake_case() {
        let encoded = serde_json::to_string(&ApprovalStatus::Rollback).expect("serialize");
        assert_eq!(encoded, "\"rollback\"");
    }

    #[test]
    fn new_event_defaults_binary_flag_to_zero_and_keeps_actor_as_creator() {
        let created_at = Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).single().expect("timestamp");
        let event = NewApprovalEvent::new(
            SubjectRef::new("item", 7),
            ApprovalStatus::Draft,
            ApprovalAction::Submit,
            ActorId::from("u-100"),
        )
        .into_event(EventId(1), created_at);

        assert_eq!(event.binary_flag, 0);
        assert!(!event.is_forced());
        assert_eq!(event.recency_key(), (created_at, EventId(1)));
        assert_eq!(event.audit_stamp().created_by, Some(ActorId::from("u-100")));
    }
}
