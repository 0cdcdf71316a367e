use rusqlite::ErrorCode;

/// Errors surfaced by the store. SQLite errors pass through unmodified.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error("DB lock poisoned: {0}")]
    Lock(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

impl DbError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// True for UNIQUE and PRIMARY KEY constraint failures.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Self::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => {
                e.code == ErrorCode::ConstraintViolation
                    && (e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                        || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
            }
            _ => false,
        }
    }
}
