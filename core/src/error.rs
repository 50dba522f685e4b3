use thiserror::Error;

/// Failures callers are expected to tell apart (missing record, name clash,
/// bad input, insufficient role). Everything else travels as plain `anyhow`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LarderError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Invalid(String),
    #[error("{0}")]
    Forbidden(String),
}

impl LarderError {
    pub fn recipe_not_found(name: &str) -> Self {
        Self::NotFound(format!("Recipe '{name}' not found"))
    }

    pub fn user_not_found(username: &str) -> Self {
        Self::NotFound(format!("User '{username}' not found"))
    }
}
