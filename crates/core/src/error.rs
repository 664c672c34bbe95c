use crate::types::DbId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unknown channel type: {0}")]
    UnknownChannel(String),

    #[error("Unknown audience: {0}")]
    UnknownAudience(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
