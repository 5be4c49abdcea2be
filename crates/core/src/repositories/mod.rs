//! Record stores.
//!
//! One store per table. Every operation takes the connection to run on explicitly, so the same
//! call works in autocommit mode or inside a caller's transaction (a `rusqlite::Transaction`
//! derefs to a `Connection`). Stores only map rows and execute statements; business rules live
//! in the services.

pub mod clinical_record;
pub mod patient;

pub use clinical_record::ClinicalRecordStore;
pub use patient::PatientStore;

use crate::error::{StorageError, StorageFailure, StorageResult};
use rusqlite::Connection;

/// CRUD operations shared by every store.
///
/// Reads never return soft-deleted rows. `update` and `delete` report whether a row matched
/// rather than failing when none did.
pub trait RecordStore {
    type Entity;
    type Id: Copy;

    /// Inserts `entity` and returns it with its generated id.
    fn create(&self, conn: &Connection, entity: &Self::Entity) -> StorageResult<Self::Entity>;

    fn read(&self, conn: &Connection, id: Self::Id) -> StorageResult<Option<Self::Entity>>;

    /// All active rows in id order.
    fn list_all(&self, conn: &Connection) -> StorageResult<Vec<Self::Entity>>;

    /// Overwrites the row with `entity`'s id.
    fn update(&self, conn: &Connection, entity: &Self::Entity) -> StorageResult<bool>;

    /// Sets the soft-delete flag.
    fn delete(&self, conn: &Connection, id: Self::Id) -> StorageResult<bool>;
}

/// Checks an INSERT's outcome and returns the generated key.
pub(crate) fn generated_key(
    conn: &Connection,
    rows_affected: usize,
    what: &str,
) -> StorageResult<i64> {
    if rows_affected == 0 {
        return Err(StorageError::failure(
            format!("failed to create {what}"),
            StorageFailure::NoRowsAffected,
        ));
    }

    let id = conn.last_insert_rowid();
    if id <= 0 {
        return Err(StorageError::failure(
            format!("failed to create {what}"),
            StorageFailure::MissingGeneratedKey,
        ));
    }
    Ok(id)
}

/// Maps `QueryReturnedNoRows` to `None`, keeping every other failure.
pub(crate) fn optional_row<T>(
    result: rusqlite::Result<T>,
    message: &str,
) -> StorageResult<Option<T>> {
    match result {
        Ok(row) => Ok(Some(row)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(StorageError::sqlite(message.to_string(), e)),
    }
}
