//! Patient service.
//!
//! Orchestrates validation, uniqueness checks and persistence for patients, and owns the
//! composite transactions that touch both tables: admitting a patient together with a clinical
//! record, deleting a patient with its record, and associating an existing record.

use crate::clinical::ensure_record_number_free;
use crate::config::CoreConfig;
use crate::db::Database;
use crate::error::{ClinicError, ClinicResult, StorageError, StorageFailure};
use crate::models::{ClinicalRecord, Patient};
use crate::repositories::{ClinicalRecordStore, PatientStore, RecordStore};
use crate::validation::{
    require_national_id, require_positive, validate_clinical_record, validate_patient,
};
use clinic_types::{ClinicalRecordId, PatientId};
use rusqlite::Connection;
use std::sync::Arc;

/// Pure patient data operations - no presentation concerns.
#[derive(Clone, Debug)]
pub struct PatientService {
    db: Database,
    patients: PatientStore,
    records: ClinicalRecordStore,
}

impl PatientService {
    pub fn new(cfg: Arc<CoreConfig>) -> Self {
        Self::with_database(Database::new(cfg))
    }

    pub fn with_database(db: Database) -> Self {
        Self {
            db,
            patients: PatientStore::new(),
            records: ClinicalRecordStore::new(),
        }
    }

    /// Stores a new patient and returns it with its generated id.
    ///
    /// # Errors
    ///
    /// Returns a validation error for bad input or when another active patient already holds
    /// the national ID, and a storage error if the write fails.
    pub fn insert(&self, patient: &Patient) -> ClinicResult<Patient> {
        validate_patient(patient)?;

        self.db.with_transaction("patient insert", |tx| {
            ensure_national_id_free(&self.patients, tx, &patient.national_id, None)?;
            let created = self.patients.create(tx, patient)?;
            Ok(created)
        })
    }

    /// Overwrites every caller-editable field of an existing patient.
    ///
    /// Returns the patient as stored afterwards, with its active record attached.
    pub fn update(&self, patient: &Patient) -> ClinicResult<Patient> {
        validate_patient(patient)?;
        let Some(id) = patient.id else {
            return Err(ClinicError::validation("id", "is required"));
        };

        self.db.with_transaction("patient update", |tx| {
            self.require_patient(tx, id)?;
            ensure_national_id_free(&self.patients, tx, &patient.national_id, Some(id))?;

            if !self.patients.update(tx, patient)? {
                return Err(ClinicError::validation(
                    "id",
                    format!("patient {id} was not updated"),
                ));
            }
            self.require_patient(tx, id)
        })
    }

    /// Soft-deletes a patient and, with it, the patient's active clinical record.
    pub fn delete(&self, id: PatientId) -> ClinicResult<()> {
        require_positive(id.get(), "id")?;

        self.db
            .with_transaction("cascading patient delete", |tx| -> ClinicResult<()> {
                self.require_patient(tx, id)?;

                if !self.patients.delete(tx, id)? {
                    return Err(no_rows("failed to delete patient"));
                }
                if let Some(record) = self.records.find_by_patient_id(tx, id)? {
                    if let Some(record_id) = record.id {
                        if !self.records.delete(tx, record_id)? {
                            return Err(no_rows("failed to delete clinical record"));
                        }
                        tracing::debug!("cascaded delete to clinical record {record_id}");
                    }
                }
                Ok(())
            })
            .map_err(|e| e.within("failed to delete patient"))?;

        tracing::info!("deleted patient {id}");
        Ok(())
    }

    /// Creates a patient and its clinical record atomically.
    ///
    /// The record's owner is set to the new patient regardless of what the caller supplied.
    /// Either both rows are committed or neither is. The returned patient carries the created
    /// record.
    pub fn create_with_clinical_record(
        &self,
        patient: &Patient,
        record: &ClinicalRecord,
    ) -> ClinicResult<Patient> {
        validate_patient(patient)?;
        validate_clinical_record(record)?;

        let created = self
            .db
            .with_transaction("patient admission", |tx| -> ClinicResult<Patient> {
                ensure_national_id_free(&self.patients, tx, &patient.national_id, None)?;
                ensure_record_number_free(&self.records, tx, &record.record_number, None)?;

                let created = self.patients.create(tx, patient)?;
                let Some(patient_id) = created.id else {
                    return Err(StorageError::failure(
                        "failed to create patient",
                        StorageFailure::MissingGeneratedKey,
                    )
                    .into());
                };

                let owned = record.clone().with_patient_id(patient_id);
                let created_record = self.records.create(tx, &owned)?;
                Ok(created.with_clinical_record(created_record))
            })
            .map_err(|e| e.within("failed to create patient with clinical record"))?;

        tracing::info!(
            "admitted patient {} with clinical record {}",
            display_id(created.id),
            display_id(created.clinical_record.as_ref().and_then(|r| r.id)),
        );
        Ok(created)
    }

    /// Links an unowned clinical record to a patient without one.
    ///
    /// Returns the patient with the linked record attached.
    pub fn associate(
        &self,
        patient_id: PatientId,
        record_id: ClinicalRecordId,
    ) -> ClinicResult<Patient> {
        require_positive(patient_id.get(), "patient_id")?;
        require_positive(record_id.get(), "record_id")?;

        let patient = self
            .db
            .with_transaction("clinical record association", |tx| -> ClinicResult<Patient> {
                let patient = self.require_patient(tx, patient_id)?;
                let Some(record) = self.records.read(tx, record_id)? else {
                    return Err(ClinicError::validation(
                        "record_id",
                        format!("clinical record {record_id} not found"),
                    ));
                };

                if patient.clinical_record.is_some()
                    || self.records.find_by_patient_id(tx, patient_id)?.is_some()
                {
                    return Err(ClinicError::validation(
                        "patient_id",
                        format!("patient {patient_id} already has a clinical record"),
                    ));
                }
                if let Some(owner) = record.patient_id {
                    return Err(ClinicError::validation(
                        "record_id",
                        format!("clinical record {record_id} already belongs to patient {owner}"),
                    ));
                }

                let linked = record.with_patient_id(patient_id);
                if !self.records.update(tx, &linked)? {
                    return Err(no_rows("failed to link clinical record"));
                }
                Ok(patient.with_clinical_record(linked))
            })
            .map_err(|e| e.within("failed to associate clinical record"))?;

        tracing::info!("associated clinical record {record_id} with patient {patient_id}");
        Ok(patient)
    }

    pub fn by_id(&self, id: PatientId) -> ClinicResult<Option<Patient>> {
        require_positive(id.get(), "id")?;
        self.db.with_connection(|conn| Ok(self.patients.read(conn, id)?))
    }

    pub fn by_national_id(&self, national_id: &str) -> ClinicResult<Option<Patient>> {
        require_national_id(national_id)?;
        self.db
            .with_connection(|conn| Ok(self.patients.find_by_national_id(conn, national_id)?))
    }

    /// All active patients in id order, each with its active record attached.
    pub fn list_all(&self) -> ClinicResult<Vec<Patient>> {
        self.db.with_connection(|conn| Ok(self.patients.list_all(conn)?))
    }

    fn require_patient(&self, conn: &Connection, id: PatientId) -> ClinicResult<Patient> {
        self.patients
            .read(conn, id)?
            .ok_or_else(|| ClinicError::validation("id", format!("patient {id} not found")))
    }
}

/// Fails when an active patient other than `except` holds `national_id`.
pub(crate) fn ensure_national_id_free(
    patients: &PatientStore,
    conn: &Connection,
    national_id: &str,
    except: Option<PatientId>,
) -> ClinicResult<()> {
    match patients.find_by_national_id(conn, national_id)? {
        Some(existing) if existing.id != except => Err(ClinicError::validation(
            "national_id",
            format!("a patient with national ID {national_id} already exists"),
        )),
        _ => Ok(()),
    }
}

fn no_rows(message: &str) -> ClinicError {
    StorageError::failure(message.to_string(), StorageFailure::NoRowsAffected).into()
}

fn display_id<T: std::fmt::Display>(id: Option<T>) -> String {
    id.map(|id| id.to_string()).unwrap_or_else(|| "-".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clinical::ClinicalRecordService;
    use crate::constants::{CLINICAL_RECORD_TABLE, PATIENT_TABLE};
    use crate::db::test_support::{count_rows, test_database};
    use chrono::NaiveDate;
    use clinic_types::BloodType;
    use tempfile::TempDir;

    fn service(temp_dir: &TempDir) -> PatientService {
        PatientService::with_database(test_database(temp_dir))
    }

    fn patient(national_id: &str) -> Patient {
        Patient::new(
            "Fernández",
            "Martín",
            national_id,
            NaiveDate::from_ymd_opt(1979, 11, 3).unwrap(),
        )
    }

    fn record(number: &str) -> ClinicalRecord {
        ClinicalRecord::new(number, BloodType::OPositive, "Hypertension", "Follow up monthly")
    }

    #[test]
    fn test_insert_then_by_id_returns_equal_patient() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let service = service(&temp_dir);

        let created = service.insert(&patient("20111222")).expect("insert should succeed");
        let id = created.id.expect("id should be assigned");

        let loaded = service.by_id(id).unwrap().expect("patient should exist");
        assert_eq!(loaded, created);
        assert!(!loaded.deleted);
        assert_eq!(loaded.surname, "Fernández");
        assert_eq!(loaded.birth_date, NaiveDate::from_ymd_opt(1979, 11, 3).unwrap());
    }

    #[test]
    fn test_insert_rejects_invalid_patient_without_touching_storage() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let service = service(&temp_dir);

        let err = service
            .insert(&patient("12-34"))
            .expect_err("invalid national ID should fail");
        assert!(err.is_validation());
        assert_eq!(count_rows(&service.db, PATIENT_TABLE, true), 0);
    }

    #[test]
    fn test_duplicate_national_id_is_rejected_only_while_active() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let service = service(&temp_dir);

        let first = service.insert(&patient("20111222")).unwrap();
        let err = service
            .insert(&patient("20111222"))
            .expect_err("duplicate should fail");
        assert!(err.is_validation());

        service.delete(first.id.unwrap()).unwrap();
        service
            .insert(&patient("20111222"))
            .expect("national ID of a deleted patient can be reused");
    }

    #[test]
    fn test_update_overwrites_fields_and_rejects_unknown_patient() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let service = service(&temp_dir);

        let created = service.insert(&patient("20111222")).unwrap();
        let changed = Patient {
            given_name: "Martina".into(),
            ..created.clone()
        };
        let updated = service.update(&changed).expect("update should succeed");
        assert_eq!(updated.given_name, "Martina");
        assert_eq!(updated.id, created.id);

        let ghost = patient("20999888").with_id(PatientId::new(404));
        assert!(service.update(&ghost).unwrap_err().is_validation());

        let unstored = patient("20999888");
        assert!(service.update(&unstored).unwrap_err().is_validation());
    }

    #[test]
    fn test_update_may_keep_own_national_id_but_not_take_another() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let service = service(&temp_dir);

        let first = service.insert(&patient("20111222")).unwrap();
        service.insert(&patient("20333444")).unwrap();

        service.update(&first).expect("own national ID is not a conflict");

        let stealing = Patient {
            national_id: "20333444".into(),
            ..first
        };
        let err = service.update(&stealing).expect_err("should conflict");
        assert!(matches!(err, ClinicError::Validation(ref v) if v.field == "national_id"));
    }

    #[test]
    fn test_create_with_clinical_record_persists_both_and_links_them() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let service = service(&temp_dir);

        let created = service
            .create_with_clinical_record(&patient("20111222"), &record("HC-100"))
            .expect("admission should succeed");
        let patient_id = created.id.expect("patient id");
        let attached = created.clinical_record.clone().expect("record attached");
        assert!(attached.id.is_some());
        assert_eq!(attached.patient_id, Some(patient_id));

        let loaded = service.by_id(patient_id).unwrap().expect("patient exists");
        assert_eq!(loaded, created);
    }

    #[test]
    fn test_create_with_clinical_record_rolls_back_when_record_insert_fails() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let service = service(&temp_dir);
        service
            .db
            .connect()
            .expect("should connect")
            .execute_batch(
                "CREATE TRIGGER fail_record_insert BEFORE INSERT ON historiaClinica
                 BEGIN SELECT RAISE(ABORT, 'forced failure'); END;",
            )
            .expect("trigger should install");

        let err = service
            .create_with_clinical_record(&patient("20111222"), &record("HC-100"))
            .expect_err("record insert should fail");

        let ClinicError::Storage(storage) = &err else {
            panic!("expected a storage error, got {err:?}");
        };
        assert_eq!(storage.message(), "failed to create patient with clinical record");
        assert!(storage.sqlite_cause().is_some(), "original cause must be kept");

        assert_eq!(count_rows(&service.db, PATIENT_TABLE, true), 0);
        assert_eq!(count_rows(&service.db, CLINICAL_RECORD_TABLE, true), 0);
    }

    #[test]
    fn test_create_with_clinical_record_rejects_duplicate_record_number() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let service = service(&temp_dir);

        service
            .create_with_clinical_record(&patient("20111222"), &record("HC-100"))
            .unwrap();
        let err = service
            .create_with_clinical_record(&patient("20333444"), &record("HC-100"))
            .expect_err("record number is taken");
        assert!(matches!(err, ClinicError::Validation(ref v) if v.field == "record_number"));
        assert_eq!(count_rows(&service.db, PATIENT_TABLE, true), 1);
    }

    #[test]
    fn test_create_with_clinical_record_rejects_duplicate_national_id() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let service = service(&temp_dir);

        service.insert(&patient("20111222")).unwrap();
        let err = service
            .create_with_clinical_record(&patient("20111222"), &record("HC-100"))
            .expect_err("national ID is taken");

        assert!(matches!(err, ClinicError::Validation(ref v) if v.field == "national_id"));
        assert_eq!(count_rows(&service.db, PATIENT_TABLE, true), 1);
        assert_eq!(count_rows(&service.db, CLINICAL_RECORD_TABLE, true), 0);
    }

    #[test]
    fn test_delete_cascades_to_clinical_record_as_soft_delete() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let service = service(&temp_dir);

        let created = service
            .create_with_clinical_record(&patient("20111222"), &record("HC-100"))
            .unwrap();
        let patient_id = created.id.unwrap();

        service.delete(patient_id).expect("delete should succeed");

        assert_eq!(service.by_id(patient_id).unwrap(), None);
        assert!(service.list_all().unwrap().is_empty());
        assert_eq!(count_rows(&service.db, PATIENT_TABLE, false), 0);
        assert_eq!(count_rows(&service.db, CLINICAL_RECORD_TABLE, false), 0);
        assert_eq!(count_rows(&service.db, PATIENT_TABLE, true), 1);
        assert_eq!(count_rows(&service.db, CLINICAL_RECORD_TABLE, true), 1);
    }

    #[test]
    fn test_delete_hides_cascaded_record_from_record_service() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let service = service(&temp_dir);
        let records = ClinicalRecordService::with_database(service.db.clone());

        let created = service
            .create_with_clinical_record(&patient("20111222"), &record("HC-100"))
            .unwrap();
        let patient_id = created.id.unwrap();
        let record_id = created.clinical_record.and_then(|r| r.id).unwrap();
        let kept = records.insert(&record("HC-200")).unwrap();

        service.delete(patient_id).expect("delete should succeed");

        assert_eq!(records.list_all().unwrap(), vec![kept]);
        assert_eq!(records.by_id(record_id).unwrap(), None);
        assert_eq!(records.by_patient_id(patient_id).unwrap(), None);
        assert_eq!(records.by_record_number("HC-100").unwrap(), None);
    }

    #[test]
    fn test_delete_unknown_patient_is_a_validation_error() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let service = service(&temp_dir);

        assert!(service.delete(PatientId::new(9)).unwrap_err().is_validation());
        assert!(service.delete(PatientId::new(0)).unwrap_err().is_validation());
    }

    #[test]
    fn test_associate_links_free_partners() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let service = service(&temp_dir);
        let records = ClinicalRecordService::with_database(service.db.clone());

        let patient_id = service.insert(&patient("20111222")).unwrap().id.unwrap();
        let record_id = records.insert(&record("HC-7")).unwrap().id.unwrap();

        let linked = service
            .associate(patient_id, record_id)
            .expect("association should succeed");
        let attached = linked.clinical_record.expect("record attached");
        assert_eq!(attached.id, Some(record_id));
        assert_eq!(attached.patient_id, Some(patient_id));

        let reloaded = service.by_id(patient_id).unwrap().unwrap();
        assert_eq!(reloaded.clinical_record.and_then(|r| r.id), Some(record_id));
        let owned = records.by_patient_id(patient_id).unwrap().unwrap();
        assert_eq!(owned.id, Some(record_id));
    }

    #[test]
    fn test_associate_refuses_partners_that_are_already_linked() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let service = service(&temp_dir);
        let records = ClinicalRecordService::with_database(service.db.clone());

        let admitted = service
            .create_with_clinical_record(&patient("20111222"), &record("HC-1"))
            .unwrap();
        let admitted_id = admitted.id.unwrap();
        let owned_record_id = admitted.clinical_record.unwrap().id.unwrap();

        let loose_record_id = records.insert(&record("HC-2")).unwrap().id.unwrap();
        let free_patient_id = service.insert(&patient("20333444")).unwrap().id.unwrap();

        let err = service
            .associate(admitted_id, loose_record_id)
            .expect_err("patient already has a record");
        assert!(err.is_validation());

        let err = service
            .associate(free_patient_id, owned_record_id)
            .expect_err("record already has an owner");
        assert!(err.is_validation());

        let err = service
            .associate(free_patient_id, ClinicalRecordId::new(999))
            .expect_err("record does not exist");
        assert!(err.is_validation());

        let err = service
            .associate(PatientId::new(999), loose_record_id)
            .expect_err("patient does not exist");
        assert!(matches!(err, ClinicError::Validation(ref v) if v.field == "id"));

        assert_eq!(records.by_id(loose_record_id).unwrap().unwrap().patient_id, None);
    }

    #[test]
    fn test_lookups_validate_inputs() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let service = service(&temp_dir);

        service.insert(&patient("20111222")).unwrap();
        assert!(service.by_national_id("20111222").unwrap().is_some());
        assert!(service.by_national_id("20999999").unwrap().is_none());
        assert!(service.by_national_id("abc").unwrap_err().is_validation());
        assert!(service.by_id(PatientId::new(-1)).unwrap_err().is_validation());
    }
}
