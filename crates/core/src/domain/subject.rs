use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::audited::Audited;

/// Kind of domain entity taking part in approval, e.g. `item` or `payment`.
/// Normalized to trimmed lowercase so lookups are case-insensitive.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubjectType(String);

impl SubjectType {
    pub fn new(value: impl AsRef<str>) -> Self {
        Self(value.as_ref().trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SubjectType {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SubjectType {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for SubjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of the subject within its type. Integer and string keys are
/// both accepted and stored in their textual form.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubjectId(pub String);

impl From<i64> for SubjectId {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

impl From<u64> for SubjectId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl From<i32> for SubjectId {
    fn from(value: i32) -> Self {
        Self(value.to_string())
    }
}

impl From<&str> for SubjectId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for SubjectId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Weak reference to an approvable entity. Nothing here checks the entity exists.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubjectRef {
    pub subject_type: SubjectType,
    pub subject_id: SubjectId,
}

impl SubjectRef {
    pub fn new(subject_type: impl Into<SubjectType>, subject_id: impl Into<SubjectId>) -> Self {
        Self { subject_type: subject_type.into(), subject_id: subject_id.into() }
    }
}

impl fmt::Display for SubjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.subject_type, self.subject_id)
    }
}

/// Implemented by domain entities that go through approval. The subject type
/// is fixed per Rust type, so callers never pass type strings around after
/// picking the entity.
pub trait ApprovalSubject: Audited {
    const SUBJECT_TYPE: &'static str;

    fn subject_id(&self) -> SubjectId;

    fn subject_ref(&self) -> SubjectRef {
        SubjectRef::new(Self::SUBJECT_TYPE, self.subject_id())
    }
}
