use thiserror::Error;

/// Main error type for ticket relations
#[derive(Error, Debug)]
pub enum RelationError {
    /// A relation or ticket change failed validation; shown to the user as a warning
    #[error("{0}")]
    Validation(String),

    /// An identical relation is already stored
    #[error("Relation {0} already exists")]
    AlreadyExists(String),

    /// A ticket or relation id that does not resolve
    #[error("{0} does not exist")]
    NotFound(String),

    /// Missing capability for the requesting user
    #[error("Permission denied: {0}")]
    Permission(String),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RelationError {
    /// Builds a validation error from a list of messages, one per line
    pub fn from_messages<I, S>(messages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = messages
            .into_iter()
            .map(|m| m.as_ref().to_string())
            .collect::<Vec<_>>()
            .join("\n");
        RelationError::Validation(joined)
    }

    /// True for errors the user caused and can fix by changing input
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            RelationError::Validation(_) | RelationError::AlreadyExists(_)
        )
    }
}

/// Convenient Result type using RelationError
pub type Result<T> = std::result::Result<T, RelationError>;
