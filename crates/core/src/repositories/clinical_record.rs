//! Clinical record store.

use super::patient::parse_blood_type;
use super::{generated_key, optional_row, RecordStore};
use crate::error::{StorageError, StorageResult};
use crate::models::ClinicalRecord;
use clinic_types::{ClinicalRecordId, PatientId};
use rusqlite::{params, Connection, Row};

macro_rules! select_record {
    ($filter:literal) => {
        concat!(
            "SELECT id, eliminado, nro_historia, grupo_sangre, antecedentes,
                    medicacionActual, observaciones, id_paciente
             FROM historiaClinica
             WHERE eliminado = 0 ",
            $filter,
            " ORDER BY id"
        )
    };
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ClinicalRecordStore;

impl ClinicalRecordStore {
    pub fn new() -> Self {
        Self
    }

    /// Finds the active record with `record_number`.
    pub fn find_by_record_number(
        &self,
        conn: &Connection,
        record_number: &str,
    ) -> StorageResult<Option<ClinicalRecord>> {
        tracing::debug!("finding clinical record {record_number:?}");
        let result = conn.query_row(
            select_record!("AND nro_historia = ?1"),
            params![record_number],
            RecordRow::from_row,
        );
        optional_row(result, "failed to find clinical record by number")?
            .map(RecordRow::into_record)
            .transpose()
    }

    /// Finds the active record owned by `patient_id`.
    pub fn find_by_patient_id(
        &self,
        conn: &Connection,
        patient_id: PatientId,
    ) -> StorageResult<Option<ClinicalRecord>> {
        tracing::debug!("finding clinical record of patient {patient_id}");
        let result = conn.query_row(
            select_record!("AND id_paciente = ?1"),
            params![patient_id.get()],
            RecordRow::from_row,
        );
        optional_row(result, "failed to find clinical record by patient")?
            .map(RecordRow::into_record)
            .transpose()
    }
}

impl RecordStore for ClinicalRecordStore {
    type Entity = ClinicalRecord;
    type Id = ClinicalRecordId;

    fn create(&self, conn: &Connection, record: &ClinicalRecord) -> StorageResult<ClinicalRecord> {
        let rows = conn
            .execute(
                "INSERT INTO historiaClinica (eliminado, nro_historia, grupo_sangre, antecedentes,
                     medicacionActual, observaciones, id_paciente)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.deleted,
                    record.record_number,
                    record.blood_type.as_str(),
                    record.medical_history,
                    record.current_medication,
                    record.observations,
                    record.patient_id.map(PatientId::get),
                ],
            )
            .map_err(|e| StorageError::sqlite("failed to create clinical record", e))?;

        let id = ClinicalRecordId::new(generated_key(conn, rows, "clinical record")?);
        tracing::debug!("created clinical record {id}");
        Ok(record.clone().with_id(id))
    }

    fn read(
        &self,
        conn: &Connection,
        id: ClinicalRecordId,
    ) -> StorageResult<Option<ClinicalRecord>> {
        tracing::debug!("reading clinical record {id}");
        let result = conn.query_row(
            select_record!("AND id = ?1"),
            params![id.get()],
            RecordRow::from_row,
        );
        optional_row(result, "failed to read clinical record")?
            .map(RecordRow::into_record)
            .transpose()
    }

    fn list_all(&self, conn: &Connection) -> StorageResult<Vec<ClinicalRecord>> {
        tracing::debug!("listing clinical records");
        let mut stmt = conn
            .prepare(select_record!(""))
            .map_err(|e| StorageError::sqlite("failed to list clinical records", e))?;
        let rows = stmt
            .query_map([], RecordRow::from_row)
            .map_err(|e| StorageError::sqlite("failed to list clinical records", e))?;

        rows.map(|row| {
            row.map_err(|e| StorageError::sqlite("failed to list clinical records", e))
                .and_then(RecordRow::into_record)
        })
        .collect()
    }

    /// Overwrites every column except the soft-delete flag, owner included.
    fn update(&self, conn: &Connection, record: &ClinicalRecord) -> StorageResult<bool> {
        let Some(id) = record.id else {
            return Ok(false);
        };

        let rows = conn
            .execute(
                "UPDATE historiaClinica SET nro_historia = ?1, grupo_sangre = ?2,
                     antecedentes = ?3, medicacionActual = ?4, observaciones = ?5,
                     id_paciente = ?6
                 WHERE id = ?7 AND eliminado = 0",
                params![
                    record.record_number,
                    record.blood_type.as_str(),
                    record.medical_history,
                    record.current_medication,
                    record.observations,
                    record.patient_id.map(PatientId::get),
                    id.get(),
                ],
            )
            .map_err(|e| StorageError::sqlite("failed to update clinical record", e))?;
        tracing::debug!("updated clinical record {id}: {rows} row(s)");
        Ok(rows > 0)
    }

    fn delete(&self, conn: &Connection, id: ClinicalRecordId) -> StorageResult<bool> {
        let rows = conn
            .execute(
                "UPDATE historiaClinica SET eliminado = 1 WHERE id = ?1 AND eliminado = 0",
                params![id.get()],
            )
            .map_err(|e| StorageError::sqlite("failed to delete clinical record", e))?;
        tracing::debug!("soft-deleted clinical record {id}: {rows} row(s)");
        Ok(rows > 0)
    }
}

struct RecordRow {
    id: i64,
    deleted: bool,
    record_number: String,
    blood_type: String,
    medical_history: String,
    current_medication: Option<String>,
    observations: String,
    patient_id: Option<i64>,
}

impl RecordRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            deleted: row.get(1)?,
            record_number: row.get(2)?,
            blood_type: row.get(3)?,
            medical_history: row.get(4)?,
            current_medication: row.get(5)?,
            observations: row.get(6)?,
            patient_id: row.get(7)?,
        })
    }

    fn into_record(self) -> StorageResult<ClinicalRecord> {
        Ok(ClinicalRecord {
            id: Some(ClinicalRecordId::new(self.id)),
            deleted: self.deleted,
            record_number: self.record_number,
            blood_type: parse_blood_type(&self.blood_type)?,
            medical_history: self.medical_history,
            current_medication: self.current_medication,
            observations: self.observations,
            patient_id: self.patient_id.map(PatientId::new),
        })
    }
}
