use serde::{Deserialize, Serialize};

use crate::domain::approval::ActorId;
use crate::identity::{Actor, IdentityDirectory, IdentityError};

/// Ownership fields an entity carries. Entities hold one of these as a plain
/// value and expose it through [`Audited`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditStamp {
    pub created_by: Option<ActorId>,
    pub updated_by: Option<ActorId>,
    pub deleted_by: Option<ActorId>,
}

impl AuditStamp {
    pub fn created(actor: ActorId) -> Self {
        Self { created_by: Some(actor), updated_by: None, deleted_by: None }
    }

    pub fn updated(self, actor: ActorId) -> Self {
        Self { updated_by: Some(actor), ..self }
    }

    pub fn deleted(self, actor: ActorId) -> Self {
        Self { deleted_by: Some(actor), ..self }
    }
}

pub trait Audited {
    fn audit_stamp(&self) -> AuditStamp;

    fn created_by(
        &self,
        directory: &dyn IdentityDirectory,
    ) -> Result<Option<Actor>, IdentityError> {
        resolve(directory, self.audit_stamp().created_by)
    }

    fn updated_by(
        &self,
        directory: &dyn IdentityDirectory,
    ) -> Result<Option<Actor>, IdentityError> {
        resolve(directory, self.audit_stamp().updated_by)
    }

    fn deleted_by(
        &self,
        directory: &dyn IdentityDirectory,
    ) -> Result<Option<Actor>, IdentityError> {
        resolve(directory, self.audit_stamp().deleted_by)
    }
}

fn resolve(
    directory: &dyn IdentityDirectory,
    actor_id: Option<ActorId>,
) -> Result<Option<Actor>, IdentityError> {
    match actor_id {
        Some(actor_id) => directory.find_actor(&actor_id),
        None => Ok(None),
    }
}
