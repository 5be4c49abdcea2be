//! Connection provider and transaction scope.
//!
//! Every service call acquires its own connection through [`Database::connect`] and drops it
//! before returning. Composite writes go through [`Database::with_transaction`], which commits on
//! success and rolls back on any error. Once the transaction ends SQLite returns the connection
//! to autocommit mode, and the connection itself is released when the helper returns.

use crate::config::CoreConfig;
use crate::constants::{CLINICAL_RECORD_TABLE, PATIENT_TABLE};
use crate::error::{StorageError, StorageResult};
use rusqlite::{Connection, OpenFlags, Transaction};
use std::sync::Arc;

/// Connection provider configured from [`CoreConfig`].
#[derive(Clone, Debug)]
pub struct Database {
    cfg: Arc<CoreConfig>,
}

impl Database {
    pub fn new(cfg: Arc<CoreConfig>) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.cfg
    }

    /// Opens a ready-to-use connection.
    ///
    /// The database file is created if it does not exist. Foreign keys are enforced and the
    /// configured busy timeout applies.
    pub fn connect(&self) -> StorageResult<Connection> {
        let path = self.cfg.database_path();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| {
            StorageError::sqlite(format!("failed to open database {}", path.display()), e)
        })?;

        conn.busy_timeout(self.cfg.busy_timeout())
            .map_err(|e| StorageError::sqlite("failed to set busy timeout", e))?;
        conn.pragma_update(None, "foreign_keys", true)
            .map_err(|e| StorageError::sqlite("failed to enable foreign keys", e))?;

        Ok(conn)
    }

    /// Startup probe: can a connection be established and used?
    pub fn check_connection(&self) -> StorageResult<()> {
        let conn = self.connect()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map_err(|e| StorageError::sqlite("database did not answer a trivial query", e))?;
        Ok(())
    }

    /// Creates the patient and clinical record tables if they are missing.
    pub fn initialise_schema(&self) -> StorageResult<()> {
        let conn = self.connect()?;
        conn.execute_batch(&schema_sql())
            .map_err(|e| StorageError::sqlite("failed to create schema", e))?;
        tracing::info!("schema ready at {}", self.cfg.database_path().display());
        Ok(())
    }

    /// Runs `f` on a fresh connection in autocommit mode.
    pub fn with_connection<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Connection) -> Result<T, E>,
        E: From<StorageError>,
    {
        let conn = self.connect()?;
        f(&conn)
    }

    /// Runs `f` inside a single transaction on a fresh connection.
    ///
    /// Commits when `f` returns `Ok`. Any `Err` from `f` rolls the whole unit back before it is
    /// returned, so nothing `f` wrote is left committed. `label` names the unit of work in logs.
    pub fn with_transaction<T, E, F>(&self, label: &str, f: F) -> Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, E>,
        E: From<StorageError>,
    {
        let mut conn = self.connect()?;
        run_in_transaction(&mut conn, label, f)
    }
}

/// Runs `f` in a transaction on `conn`, committing on `Ok` and rolling back on `Err`.
///
/// `conn` is back in autocommit mode when this returns, whatever the outcome.
pub(crate) fn run_in_transaction<T, E, F>(conn: &mut Connection, label: &str, f: F) -> Result<T, E>
where
    F: FnOnce(&Transaction<'_>) -> Result<T, E>,
    E: From<StorageError>,
{
    let tx = conn
        .transaction()
        .map_err(|e| StorageError::sqlite(format!("failed to begin {label}"), e))?;

    match f(&tx) {
        Ok(value) => {
            tx.commit()
                .map_err(|e| StorageError::sqlite(format!("failed to commit {label}"), e))?;
            tracing::debug!("committed {label}");
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback() {
                tracing::error!("rollback of {label} failed: {rollback_err}");
            } else {
                tracing::warn!("rolled back {label}");
            }
            Err(err)
        }
    }
}

fn schema_sql() -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {PATIENT_TABLE} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            eliminado INTEGER NOT NULL DEFAULT 0,
            apellido TEXT NOT NULL,
            nombre TEXT NOT NULL,
            dni TEXT NOT NULL,
            fecha_nac TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_{PATIENT_TABLE}_dni ON {PATIENT_TABLE} (dni);

        CREATE TABLE IF NOT EXISTS {CLINICAL_RECORD_TABLE} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            eliminado INTEGER NOT NULL DEFAULT 0,
            nro_historia TEXT NOT NULL,
            grupo_sangre TEXT NOT NULL,
            antecedentes TEXT NOT NULL,
            medicacionActual TEXT,
            observaciones TEXT NOT NULL,
            id_paciente INTEGER NULL REFERENCES {PATIENT_TABLE} (id)
        );
        CREATE INDEX IF NOT EXISTS idx_{CLINICAL_RECORD_TABLE}_nro
            ON {CLINICAL_RECORD_TABLE} (nro_historia);
        CREATE INDEX IF NOT EXISTS idx_{CLINICAL_RECORD_TABLE}_paciente
            ON {CLINICAL_RECORD_TABLE} (id_paciente);"
    )
}
