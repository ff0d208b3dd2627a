use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::approval::ActorId;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: ActorId,
    pub display_name: String,
}

impl Actor {
    pub fn new(id: impl Into<ActorId>, display_name: impl Into<String>) -> Self {
        Self { id: id.into(), display_name: display_name.into() }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("identity lookup failed: {0}")]
    Lookup(String),
}

/// Resolves actor ids to users. The approval engine itself never calls this;
/// it trusts the ids it is given.
pub trait IdentityDirectory: Send + Sync {
    fn find_actor(&self, id: &ActorId) -> Result<Option<Actor>, IdentityError>;
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryIdentityDirectory {
    actors: HashMap<ActorId, Actor>,
}

impl InMemoryIdentityDirectory {
    pub fn with_actors(actors: Vec<Actor>) -> Self {
        Self { actors: actors.into_iter().map(|actor| (actor.id.clone(), actor)).collect() }
    }
}

impl IdentityDirectory for InMemoryIdentityDirectory {
    fn find_actor(&self, id: &ActorId) -> Result<Option<Actor>, IdentityError> {
        Ok(self.actors.get(id).cloned())
    }
}
