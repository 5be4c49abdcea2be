use std::error::Error as StdError;

type BoxedCause = Box<dyn StdError + Send + Sync + 'static>;

/// A rejected input or a violated business rule.
///
/// Always recoverable by correcting the input; never indicates corrupt data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {reason}")]
pub struct ValidationError {
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Failures detected by the stores themselves rather than reported by SQLite.
#[derive(Debug, thiserror::Error)]
pub enum StorageFailure {
    #[error("no rows affected")]
    NoRowsAffected,
    #[error("no generated key returned")]
    MissingGeneratedKey,
    #[error("column {column} holds an unreadable value: {reason}")]
    CorruptRow { column: &'static str, reason: String },
}

/// A data-access failure. Always carries the original cause.
#[derive(Debug, thiserror::Error)]
#[error("{message}: {source}")]
pub struct StorageError {
    message: String,
    #[source]
    source: BoxedCause,
}

impl StorageError {
    pub fn new(message: impl Into<String>, source: impl Into<BoxedCause>) -> Self {
        Self {
            message: message.into(),
            source: source.into(),
        }
    }

    /// Wraps a SQLite error with a description of the statement that failed.
    pub fn sqlite(message: impl Into<String>, source: rusqlite::Error) -> Self {
        Self::new(message, source)
    }

    pub fn failure(message: impl Into<String>, failure: StorageFailure) -> Self {
        Self::new(message, failure)
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the SQLite error at the bottom of the cause chain, if any.
    pub fn sqlite_cause(&self) -> Option<&rusqlite::Error> {
        let root: &(dyn StdError + 'static) = self.source.as_ref();
        let mut current = Some(root);
        while let Some(err) = current {
            if let Some(sqlite) = err.downcast_ref::<rusqlite::Error>() {
                return Some(sqlite);
            }
            current = err.source();
        }
        None
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClinicError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("failed to read configuration file: {0}")]
    ConfigRead(std::io::Error),
    #[error("failed to parse configuration file: {0}")]
    ConfigParse(serde_yaml::Error),
}

impl ClinicError {
    /// Shorthand for a [`ClinicError::Validation`].
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ClinicError::Validation(ValidationError::new(field, reason))
    }

    /// Re-wraps a storage failure raised inside a composite transaction with
    /// the name of that transaction, keeping the original error as the cause.
    ///
    /// Validation failures pass through untouched.
    pub(crate) fn within(self, message: &str) -> Self {
        match self {
            ClinicError::Storage(inner) => {
                ClinicError::Storage(StorageError::new(message.to_string(), inner))
            }
            other => other,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, ClinicError::Validation(_))
    }

    pub fn is_storage(&self) -> bool {
        matches!(self, ClinicError::Storage(_))
    }
}

pub type ClinicResult<T> = std::result::Result<T, ClinicError>;
pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_displays_field_and_reason() {
        let err = ValidationError::new("national_id", "must contain 7 or 8 digits");
        assert_eq!(err.to_string(), "national_id: must contain 7 or 8 digits");
    }

    #[test]
    fn test_within_keeps_original_cause() {
        let original =
            StorageError::failure("failed to create patient", StorageFailure::NoRowsAffected);
        let wrapped = ClinicError::from(original).within("failed to admit patient");

        let ClinicError::Storage(storage) = wrapped else {
            panic!("expected a storage error");
        };
        assert_eq!(storage.message(), "failed to admit patient");

        let cause = StdError::source(&storage).expect("cause should be kept");
        assert!(cause.to_string().contains("failed to create patient"));
        assert!(cause.to_string().contains("no rows affected"));
    }

    #[test]
    fn test_within_leaves_validation_errors_alone() {
        let err = ClinicError::validation("patient", "already has a clinical record");
        let wrapped = err.within("failed to associate clinical record");
        assert!(wrapped.is_validation());
    }

    #[test]
    fn test_sqlite_cause_walks_nested_errors() {
        let inner = StorageError::sqlite(
            "failed to read patient",
            rusqlite::Error::QueryReturnedNoRows,
        );
        let outer = StorageError::new("failed to delete patient", inner);
        assert!(matches!(
            outer.sqlite_cause(),
            Some(rusqlite::Error::QueryReturnedNoRows)
        ));
    }
}
