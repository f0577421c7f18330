use serde::{Deserialize, Serialize};

/// Identity recorded on audit entries for a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Identifier of the user (or process) performing the mutation.
    pub id: String,
    /// Role the actor was acting under (e.g. `"admin"`, `"parent"`).
    pub role: String,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: role.into(),
        }
    }

    /// The engine itself, for mutations with no human actor.
    #[must_use]
    pub fn system() -> Self {
        Self::new("system", "system")
    }
}

impl Default for Actor {
    fn default() -> Self {
        Self::system()
    }
}
