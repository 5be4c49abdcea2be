//! Patient store.
//!
//! Reads join the patient's active clinical record (if any) in the same query, so a loaded
//! [`Patient`] always carries its current record.

use super::{generated_key, optional_row, RecordStore};
use crate::error::{StorageError, StorageFailure, StorageResult};
use crate::models::{ClinicalRecord, Patient};
use chrono::NaiveDate;
use clinic_types::{BloodType, ClinicalRecordId, PatientId};
use rusqlite::{params, Connection, Row};

const DATE_FORMAT: &str = "%Y-%m-%d";

macro_rules! select_patient {
    ($filter:literal) => {
        concat!(
            "SELECT p.id, p.eliminado, p.apellido, p.nombre, p.dni, p.fecha_nac,
                    hc.id, hc.eliminado, hc.nro_historia, hc.grupo_sangre,
                    hc.antecedentes, hc.medicacionActual, hc.observaciones
             FROM paciente p
             LEFT JOIN historiaClinica hc ON p.id = hc.id_paciente AND hc.eliminado = 0
             WHERE p.eliminado = 0 ",
            $filter,
            " ORDER BY p.id, hc.id"
        )
    };
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PatientStore;

impl PatientStore {
    pub fn new() -> Self {
        Self
    }

    /// Finds the active patient holding `national_id`.
    pub fn find_by_national_id(
        &self,
        conn: &Connection,
        national_id: &str,
    ) -> StorageResult<Option<Patient>> {
        tracing::debug!("finding patient by national ID");
        let result = conn.query_row(
            select_patient!("AND p.dni = ?1"),
            params![national_id],
            PatientRow::from_row,
        );
        optional_row(result, "failed to find patient by national ID")?
            .map(PatientRow::into_patient)
            .transpose()
    }
}

impl RecordStore for PatientStore {
    type Entity = Patient;
    type Id = PatientId;

    fn create(&self, conn: &Connection, patient: &Patient) -> StorageResult<Patient> {
        let rows = conn
            .execute(
                "INSERT INTO paciente (eliminado, apellido, nombre, dni, fecha_nac)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    patient.deleted,
                    patient.surname,
                    patient.given_name,
                    patient.national_id,
                    patient.birth_date.format(DATE_FORMAT).to_string(),
                ],
            )
            .map_err(|e| StorageError::sqlite("failed to create patient", e))?;

        let id = PatientId::new(generated_key(conn, rows, "patient")?);
        tracing::debug!("created patient {id}");
        Ok(patient.clone().with_id(id))
    }

    fn read(&self, conn: &Connection, id: PatientId) -> StorageResult<Option<Patient>> {
        tracing::debug!("reading patient {id}");
        let result = conn.query_row(
            select_patient!("AND p.id = ?1"),
            params![id.get()],
            PatientRow::from_row,
        );
        optional_row(result, "failed to read patient")?
            .map(PatientRow::into_patient)
            .transpose()
    }

    fn list_all(&self, conn: &Connection) -> StorageResult<Vec<Patient>> {
        tracing::debug!("listing patients");
        let mut stmt = conn
            .prepare(select_patient!(""))
            .map_err(|e| StorageError::sqlite("failed to list patients", e))?;
        let rows = stmt
            .query_map([], PatientRow::from_row)
            .map_err(|e| StorageError::sqlite("failed to list patients", e))?;

        let mut patients: Vec<Patient> = Vec::new();
        for row in rows {
            let row = row.map_err(|e| StorageError::sqlite("failed to list patients", e))?;
            // Rows are ordered by patient id; a repeated id means a second joined record.
            if patients.last().and_then(|p| p.id) == Some(PatientId::new(row.id)) {
                tracing::warn!("patient {} has more than one active clinical record", row.id);
                continue;
            }
            patients.push(row.into_patient()?);
        }
        Ok(patients)
    }

    fn update(&self, conn: &Connection, patient: &Patient) -> StorageResult<bool> {
        let Some(id) = patient.id else {
            return Ok(false);
        };

        let rows = conn
            .execute(
                "UPDATE paciente SET apellido = ?1, nombre = ?2, dni = ?3, fecha_nac = ?4
                 WHERE id = ?5 AND eliminado = 0",
                params![
                    patient.surname,
                    patient.given_name,
                    patient.national_id,
                    patient.birth_date.format(DATE_FORMAT).to_string(),
                    id.get(),
                ],
            )
            .map_err(|e| StorageError::sqlite("failed to update patient", e))?;
        tracing::debug!("updated patient {id}: {rows} row(s)");
        Ok(rows > 0)
    }

    fn delete(&self, conn: &Connection, id: PatientId) -> StorageResult<bool> {
        let rows = conn
            .execute(
                "UPDATE paciente SET eliminado = 1 WHERE id = ?1 AND eliminado = 0",
                params![id.get()],
            )
            .map_err(|e| StorageError::sqlite("failed to delete patient", e))?;
        tracing::debug!("soft-deleted patient {id}: {rows} row(s)");
        Ok(rows > 0)
    }
}

// Internal row type for the patient/clinical record join.
struct PatientRow {
    id: i64,
    deleted: bool,
    surname: String,
    given_name: String,
    national_id: String,
    birth_date: String,
    record_id: Option<i64>,
    record_deleted: Option<bool>,
    record_number: Option<String>,
    blood_type: Option<String>,
    medical_history: Option<String>,
    current_medication: Option<String>,
    observations: Option<String>,
}

impl PatientRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            deleted: row.get(1)?,
            surname: row.get(2)?,
            given_name: row.get(3)?,
            national_id: row.get(4)?,
            birth_date: row.get(5)?,
            record_id: row.get(6)?,
            record_deleted: row.get(7)?,
            record_number: row.get(8)?,
            blood_type: row.get(9)?,
            medical_history: row.get(10)?,
            current_medication: row.get(11)?,
            observations: row.get(12)?,
        })
    }

    fn into_patient(self) -> StorageResult<Patient> {
        let id = PatientId::new(self.id);
        let birth_date = parse_date(&self.birth_date)?;

        let clinical_record = match self.record_id {
            Some(record_id) => {
                let blood_type = self.blood_type.as_deref().unwrap_or_default();
                Some(ClinicalRecord {
                    id: Some(ClinicalRecordId::new(record_id)),
                    deleted: self.record_deleted.unwrap_or(false),
                    record_number: self.record_number.unwrap_or_default(),
                    blood_type: parse_blood_type(blood_type)?,
                    medical_history: self.medical_history.unwrap_or_default(),
                    current_medication: self.current_medication,
                    observations: self.observations.unwrap_or_default(),
                    patient_id: Some(id),
                })
            }
            None => None,
        };

        Ok(Patient {
            id: Some(id),
            deleted: self.deleted,
            surname: self.surname,
            given_name: self.given_name,
            national_id: self.national_id,
            birth_date,
            clinical_record,
        })
    }
}

fn parse_date(raw: &str) -> StorageResult<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|e| {
        StorageError::failure(
            "failed to map patient row",
            StorageFailure::CorruptRow {
                column: "fecha_nac",
                reason: e.to_string(),
            },
        )
    })
}

pub(crate) fn parse_blood_type(raw: &str) -> StorageResult<BloodType> {
    raw.parse::<BloodType>().map_err(|e| {
        StorageError::failure(
            "failed to map clinical record row",
            StorageFailure::CorruptRow {
                column: "grupo_sangre",
                reason: e.to_string(),
            },
        )
    })
}
