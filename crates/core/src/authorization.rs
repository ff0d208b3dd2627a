use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::approval::ActorId;
use crate::domain::subject::SubjectType;

/// Permission an actor may hold for a subject type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Covers both approve and reject.
    Approve,
    Cancel,
    Rollback,
    #[serde(alias = "admin")]
    Force,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Cancel => "cancel",
            Self::Rollback => "rollback",
            Self::Force => "force",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "approve" => Some(Self::Approve),
            "cancel" => Some(Self::Cancel),
            "rollback" => Some(Self::Rollback),
            "force" | "admin" => Some(Self::Force),
            _ => None,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub trait Authorizer: Send + Sync {
    fn is_allowed(&self, actor: &ActorId, subject_type: &SubjectType, capability: Capability)
        -> bool;
}

/// One configured permission entry. `actor` and `subject_type` accept `*`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityGrant {
    pub actor: String,
    pub subject_type: String,
    pub capabilities: Vec<Capability>,
}

impl CapabilityGrant {
    pub fn new(
        actor: impl Into<String>,
        subject_type: impl Into<String>,
        capabilities: Vec<Capability>,
    ) -> Self {
        Self { actor: actor.into(), subject_type: subject_type.into(), capabilities }
    }

    fn matches(&self, actor: &ActorId, subject_type: &SubjectType, capability: Capability) -> bool {
        matches_with_wildcard(&self.actor, &actor.0)
            && matches_with_wildcard(&self.subject_type, subject_type.as_str())
            && self.capabilities.contains(&capability)
    }
}

#[derive(Clone, Debug, Default)]
pub struct GrantAuthorizer {
    grants: Vec<CapabilityGrant>,
}

impl GrantAuthorizer {
    pub fn new(grants: Vec<CapabilityGrant>) -> Self {
        Self { grants }
    }

    pub fn grants(&self) -> &[CapabilityGrant] {
        &self.grants
    }
}

impl Authorizer for GrantAuthorizer {
    fn is_allowed(
        &self,
        actor: &ActorId,
        subject_type: &SubjectType,
        capability: Capability,
    ) -> bool {
        self.grants.iter().any(|grant| grant.matches(actor, subject_type, capability))
    }
}

fn matches_with_wildcard(pattern: &str, value: &str) -> bool {
    let pattern = normalize_key(pattern);
    pattern == "*" || pattern == normalize_key(value)
}

fn normalize_key(value: &str) -> String {
    value.trim().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use crate::authorization::{Authorizer, Capability, CapabilityGrant, GrantAuthorizer};
    use crate::domain::approval::ActorId;
    use crate::domain::subject::SubjectType;

    fn authorizer() -> GrantAuthorizer {
        GrantAuthorizer::new(vec![
            CapabilityGrant::new("u-approver", "item", vec![Capability::Approve]),
            CapabilityGrant::new("u-admin", "*", vec![Capability::Force, Capability::Rollback]),
            CapabilityGrant::new("*", "payment", vec![Capability::Cancel]),
        ])
    }

    #[test]
    fn grant_applies_only_to_its_subject_type() {
        let authorizer = authorizer();
        let approver = ActorId::from("u-approver");

        assert!(authorizer.is_allowed(&approver, &SubjectType::new("item"), Capability::Approve));
        assert!(!authorizer.is_allowed(
            &approver,
            &SubjectType::new("payment"),
            Capability::Approve
        ));
        assert!(!authorizer.is_allowed(&approver, &SubjectType::new("item"), Capability::Force));
    }

    #[test]
    fn wildcards_match_any_actor_or_subject_type() {
        let authorizer = authorizer();

        assert!(authorizer.is_allowed(
            &ActorId::from("u-admin"),
            &SubjectType::new("invoice"),
            Capability::Force
        ));
        assert!(authorizer.is_allowed(
            &ActorId::from("anyone"),
            &SubjectType::new("Payment"),
            Capability::Cancel
        ));
    }

    #[test]
    fn empty_authorizer_denies_everything() {
        let authorizer = GrantAuthorizer::default();
        assert!(!authorizer.is_allowed(
            &ActorId::from("u-1"),
            &SubjectType::new("item"),
            Capability::Approve
        ));
    }

    #[test]
    fn capability_parse_treats_admin_as_force() {
        assert_eq!(Capability::parse("admin"), Some(Capability::Force));
        assert_eq!(Capability::parse("Rollback"), Some(Capability::Rollback));
        assert_eq!(Capability::parse("delete"), None);
    }
}
