use booru_db::{DbError, ValidationErrors};

#[derive(Debug, thiserror::Error)]
pub enum PostsError {
    /// The request body does not have the expected shape.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("invalid {entity}: {}", .errors.messages().join("; "))]
    Validation {
        entity: String,
        errors: ValidationErrors,
    },

    #[error("source {0} not found")]
    SourceNotFound(u64),

    #[error("{0} was stored without a generated id")]
    MissingId(&'static str),

    #[error("storage error: {0}")]
    Storage(#[from] DbError),
}

impl PostsError {
    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidPayload(message.into())
    }

    #[must_use]
    pub fn validation(entity: impl Into<String>, errors: ValidationErrors) -> Self {
        Self::Validation {
            entity: entity.into(),
            errors,
        }
    }
}
