//! Clinical record service.
//!
//! CRUD for clinical records plus [`ClinicalRecordService::create_or_merge`], the accumulating
//! write: a patient keeps a single active record, and new entries for that patient are folded
//! into it instead of creating a second one.

use crate::config::CoreConfig;
use crate::db::Database;
use crate::error::{ClinicError, ClinicResult, StorageError, StorageFailure};
use crate::models::ClinicalRecord;
use crate::repositories::{ClinicalRecordStore, PatientStore, RecordStore};
use crate::validation::{require_non_empty, require_positive, validate_clinical_record};
use chrono::Local;
use clinic_types::{ClinicalRecordId, PatientId};
use rusqlite::Connection;
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct ClinicalRecordService {
    db: Database,
    records: ClinicalRecordStore,
    patients: PatientStore,
}

impl ClinicalRecordService {
    pub fn new(cfg: Arc<CoreConfig>) -> Self {
        Self::with_database(Database::new(cfg))
    }

    pub fn with_database(db: Database) -> Self {
        Self {
            db,
            records: ClinicalRecordStore::new(),
            patients: PatientStore::new(),
        }
    }

    /// Stores a new clinical record.
    ///
    /// A record may be created unowned. When an owner is given it must be an active patient
    /// without a record of its own.
    pub fn insert(&self, record: &ClinicalRecord) -> ClinicResult<ClinicalRecord> {
        validate_clinical_record(record)?;

        self.db.with_transaction("clinical record insert", |tx| {
            ensure_record_number_free(&self.records, tx, &record.record_number, None)?;
            if let Some(patient_id) = record.patient_id {
                self.ensure_owner_available(tx, patient_id, None)?;
            }
            let created = self.records.create(tx, record)?;
            Ok(created)
        })
    }

    /// Overwrites an existing record, owner included.
    pub fn update(&self, record: &ClinicalRecord) -> ClinicResult<ClinicalRecord> {
        validate_clinical_record(record)?;
        let Some(id) = record.id else {
            return Err(ClinicError::validation("id", "is required"));
        };

        self.db.with_transaction("clinical record update", |tx| {
            self.require_record(tx, id)?;
            ensure_record_number_free(&self.records, tx, &record.record_number, Some(id))?;
            if let Some(patient_id) = record.patient_id {
                self.ensure_owner_available(tx, patient_id, Some(id))?;
            }

            if !self.records.update(tx, record)? {
                return Err(ClinicError::validation(
                    "id",
                    format!("clinical record {id} was not updated"),
                ));
            }
            self.require_record(tx, id)
        })
    }

    /// Soft-deletes a clinical record. The owning patient is left untouched.
    pub fn delete(&self, id: ClinicalRecordId) -> ClinicResult<()> {
        require_positive(id.get(), "id")?;

        self.db.with_transaction("clinical record delete", |tx| {
            self.require_record(tx, id)?;
            if !self.records.delete(tx, id)? {
                return Err(ClinicError::validation(
                    "id",
                    format!("clinical record {id} was not deleted"),
                ));
            }
            Ok(())
        })
    }

    /// Creates the patient's record, or folds `record` into the one the patient already has.
    ///
    /// When the patient has an active record, its id and record number are kept, the history,
    /// observations and medication are accumulated and the blood type is replaced (see
    /// [`ClinicalRecord::accumulate`]). Returns the record as stored.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the record has no owner or the owner does not exist.
    pub fn create_or_merge(&self, record: &ClinicalRecord) -> ClinicResult<ClinicalRecord> {
        validate_clinical_record(record)?;
        let Some(patient_id) = record.patient_id else {
            return Err(ClinicError::validation("patient_id", "is required"));
        };

        let (stored, merged) = self
            .db
            .with_transaction(
                "clinical record merge",
                |tx| -> ClinicResult<(ClinicalRecord, bool)> {
                    if self.patients.read(tx, patient_id)?.is_none() {
                        return Err(ClinicError::validation(
                            "patient_id",
                            format!("patient {patient_id} not found"),
                        ));
                    }

                    match self.records.find_by_patient_id(tx, patient_id)? {
                        None => {
                            ensure_record_number_free(
                                &self.records,
                                tx,
                                &record.record_number,
                                None,
                            )?;
                            Ok((self.records.create(tx, record)?, false))
                        }
                        Some(existing) => {
                            let accumulated =
                                existing.accumulate(record, Local::now().naive_local());
                            if !self.records.update(tx, &accumulated)? {
                                return Err(StorageError::failure(
                                    "failed to merge clinical record",
                                    StorageFailure::NoRowsAffected,
                                )
                                .into());
                            }
                            Ok((accumulated, true))
                        }
                    }
                },
            )
            .map_err(|e| e.within("failed to create or merge clinical record"))?;

        if merged {
            tracing::info!("merged new entry into clinical record of patient {patient_id}");
        } else {
            tracing::info!("created clinical record for patient {patient_id}");
        }
        Ok(stored)
    }

    pub fn by_id(&self, id: ClinicalRecordId) -> ClinicResult<Option<ClinicalRecord>> {
        require_positive(id.get(), "id")?;
        self.db.with_connection(|conn| Ok(self.records.read(conn, id)?))
    }

    pub fn by_record_number(&self, record_number: &str) -> ClinicResult<Option<ClinicalRecord>> {
        require_non_empty(record_number, "record_number")?;
        self.db
            .with_connection(|conn| Ok(self.records.find_by_record_number(conn, record_number)?))
    }

    pub fn by_patient_id(&self, patient_id: PatientId) -> ClinicResult<Option<ClinicalRecord>> {
        require_positive(patient_id.get(), "patient_id")?;
        self.db
            .with_connection(|conn| Ok(self.records.find_by_patient_id(conn, patient_id)?))
    }

    pub fn list_all(&self) -> ClinicResult<Vec<ClinicalRecord>> {
        self.db.with_connection(|conn| Ok(self.records.list_all(conn)?))
    }

    fn require_record(
        &self,
        conn: &Connection,
        id: ClinicalRecordId,
    ) -> ClinicResult<ClinicalRecord> {
        self.records.read(conn, id)?.ok_or_else(|| {
            ClinicError::validation("id", format!("clinical record {id} not found"))
        })
    }

    /// The owner must be an active patient whose record, if any, is `except`.
    fn ensure_owner_available(
        &self,
        conn: &Connection,
        patient_id: PatientId,
        except: Option<ClinicalRecordId>,
    ) -> ClinicResult<()> {
        if self.patients.read(conn, patient_id)?.is_none() {
            return Err(ClinicError::validation(
                "patient_id",
                format!("patient {patient_id} not found"),
            ));
        }
        match self.records.find_by_patient_id(conn, patient_id)? {
            Some(existing) if existing.id != except => Err(ClinicError::validation(
                "patient_id",
                format!("patient {patient_id} already has a clinical record"),
            )),
            _ => Ok(()),
        }
    }
}

/// Fails when an active record other than `except` uses `record_number`.
pub(crate) fn ensure_record_number_free(
    records: &ClinicalRecordStore,
    conn: &Connection,
    record_number: &str,
    except: Option<ClinicalRecordId>,
) -> ClinicResult<()> {
    match records.find_by_record_number(conn, record_number)? {
        Some(existing) if existing.id != except => Err(ClinicError::validation(
            "record_number",
            format!("a clinical record numbered {record_number} already exists"),
        )),
        _ => Ok(()),
    }
}
