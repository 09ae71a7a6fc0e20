use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    #[error("empty id")]
    Empty,

    /// The prefix names another id type.
    #[error("expected a '{expected}' id, found prefix '{found}'")]
    WrongKind {
        expected: &'static str,
        found: String,
    },

    #[error("malformed id '{value}': {reason}")]
    Malformed { value: String, reason: String },
}

impl IdError {
    pub(crate) fn malformed(value: &str, reason: impl Into<String>) -> Self {
        IdError::Malformed {
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}
