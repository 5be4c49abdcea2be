//! Patient and clinical record value types.
//!
//! Both entities are plain values. Services never mutate a record in place; operations that
//! change a record (assigning an id, linking an owner, accumulating history) return a new value.

use crate::constants::{MERGE_ENTRY_MARKER, MERGE_TIMESTAMP_FORMAT};
use chrono::{NaiveDate, NaiveDateTime};
use clinic_types::{BloodType, ClinicalRecordId, PatientId};
use serde::{Deserialize, Serialize};

/// A patient, optionally carrying its single active clinical record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
    /// `None` until the patient has been stored.
    pub id: Option<PatientId>,
    pub deleted: bool,
    pub surname: String,
    pub given_name: String,
    pub national_id: String,
    pub birth_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clinical_record: Option<ClinicalRecord>,
}

impl Patient {
    pub fn new(
        surname: impl Into<String>,
        given_name: impl Into<String>,
        national_id: impl Into<String>,
        birth_date: NaiveDate,
    ) -> Self {
        Self {
            id: None,
            deleted: false,
            surname: surname.into(),
            given_name: given_name.into(),
            national_id: national_id.into(),
            birth_date,
            clinical_record: None,
        }
    }

    pub fn with_id(self, id: PatientId) -> Self {
        Self {
            id: Some(id),
            ..self
        }
    }

    pub fn with_clinical_record(self, record: ClinicalRecord) -> Self {
        Self {
            clinical_record: Some(record),
            ..self
        }
    }

    /// `"Surname, Given"` as shown in listings.
    pub fn full_name(&self) -> String {
        format!("{}, {}", self.surname, self.given_name)
    }
}

/// A clinical record. At most one active record exists per patient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClinicalRecord {
    /// `None` until the record has been stored.
    pub id: Option<ClinicalRecordId>,
    pub deleted: bool,
    /// Unique among active records. Merging never changes it.
    pub record_number: String,
    pub blood_type: BloodType,
    pub medical_history: String,
    pub current_medication: Option<String>,
    pub observations: String,
    /// Owning patient, `None` while the record is unassociated.
    pub patient_id: Option<PatientId>,
}

impl ClinicalRecord {
    pub fn new(
        record_number: impl Into<String>,
        blood_type: BloodType,
        medical_history: impl Into<String>,
        observations: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            deleted: false,
            record_number: record_number.into(),
            blood_type,
            medical_history: medical_history.into(),
            current_medication: None,
            observations: observations.into(),
            patient_id: None,
        }
    }

    pub fn with_id(self, id: ClinicalRecordId) -> Self {
        Self {
            id: Some(id),
            ..self
        }
    }

    pub fn with_medication(self, medication: impl Into<String>) -> Self {
        Self {
            current_medication: Some(medication.into()),
            ..self
        }
    }

    pub fn with_patient_id(self, patient_id: PatientId) -> Self {
        Self {
            patient_id: Some(patient_id),
            ..self
        }
    }

    /// Folds `incoming` into this stored record and returns the accumulated record.
    ///
    /// - `id`, `record_number` and the owner are kept from `self`.
    /// - `medical_history` and `observations` become `existing + separator + incoming`,
    ///   even when the incoming text is empty.
    /// - `current_medication` is appended only when the incoming value is non-blank;
    ///   otherwise the stored value is kept.
    /// - `blood_type` is replaced by the incoming value.
    pub fn accumulate(&self, incoming: &ClinicalRecord, at: NaiveDateTime) -> ClinicalRecord {
        let separator = merge_separator(at);

        let current_medication = match incoming.current_medication.as_deref() {
            Some(new) if !new.trim().is_empty() => {
                let base = self.current_medication.as_deref().unwrap_or_default();
                Some(format!("{base}{separator}{new}"))
            }
            _ => self.current_medication.clone(),
        };

        ClinicalRecord {
            id: self.id,
            deleted: self.deleted,
            record_number: self.record_number.clone(),
            blood_type: incoming.blood_type,
            medical_history: format!(
                "{}{separator}{}",
                self.medical_history, incoming.medical_history
            ),
            current_medication,
            observations: format!("{}{separator}{}", self.observations, incoming.observations),
            patient_id: self.patient_id.or(incoming.patient_id),
        }
    }
}

/// The line written between two accumulated entries.
pub fn merge_separator(at: NaiveDateTime) -> String {
    format!(
        "\n\n{MERGE_ENTRY_MARKER} {} ---\n",
        at.format(MERGE_TIMESTAMP_FORMAT)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamp() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(9, 30, 15)
            .unwrap()
    }

    fn stored() -> ClinicalRecord {
        ClinicalRecord::new("HC-1", BloodType::OPositive, "H1", "O1")
            .with_id(ClinicalRecordId::new(10))
            .with_patient_id(PatientId::new(3))
    }

    #[test]
    fn test_merge_separator_embeds_formatted_timestamp() {
        assert_eq!(
            merge_separator(stamp()),
            "\n\n--- ENTRY: 05/03/2024 09:30:15 ---\n"
        );
    }

    #[test]
    fn test_accumulate_appends_history_and_observations_in_order() {
        let incoming = ClinicalRecord::new("HC-OTHER", BloodType::ANegative, "H2", "O2");
        let merged = stored().accumulate(&incoming, stamp());

        let sep = merge_separator(stamp());
        assert_eq!(merged.medical_history, format!("H1{sep}H2"));
        assert_eq!(merged.observations, format!("O1{sep}O2"));
    }

    #[test]
    fn test_accumulate_replaces_blood_type_and_keeps_identity() {
        let incoming = ClinicalRecord::new("HC-OTHER", BloodType::ANegative, "H2", "O2");
        let merged = stored().accumulate(&incoming, stamp());

        assert_eq!(merged.blood_type, BloodType::ANegative);
        assert_eq!(merged.id, Some(ClinicalRecordId::new(10)));
        assert_eq!(merged.record_number, "HC-1");
        assert_eq!(merged.patient_id, Some(PatientId::new(3)));
    }

    #[test]
    fn test_accumulate_medication_rules() {
        let sep = merge_separator(stamp());

        // No previous medication: starts fresh behind a separator.
        let incoming = ClinicalRecord::new("x", BloodType::OPositive, "h", "o")
            .with_medication("Ibuprofen");
        let merged = stored().accumulate(&incoming, stamp());
        assert_eq!(merged.current_medication, Some(format!("{sep}Ibuprofen")));

        // Previous medication and new medication: appended.
        let with_med = stored().with_medication("Salbutamol");
        let merged = with_med.accumulate(&incoming, stamp());
        assert_eq!(
            merged.current_medication,
            Some(format!("Salbutamol{sep}Ibuprofen"))
        );

        // Blank incoming medication keeps the stored value untouched.
        let blank = ClinicalRecord::new("x", BloodType::OPositive, "h", "o").with_medication("  ");
        let merged = with_med.accumulate(&blank, stamp());
        assert_eq!(merged.current_medication, Some("Salbutamol".to_string()));
    }

    #[test]
    fn test_accumulate_does_not_touch_either_input() {
        let original = stored();
        let incoming = ClinicalRecord::new("HC-OTHER", BloodType::BPositive, "H2", "O2");
        let _ = original.accumulate(&incoming, stamp());

        assert_eq!(original, stored());
        assert_eq!(incoming.medical_history, "H2");
    }

    #[test]
    fn test_patient_builders_return_new_values() {
        let birth = NaiveDate::from_ymd_opt(1990, 1, 1).unwrap();
        let patient = Patient::new("Gómez", "Ana", "1234567", birth);
        let stored = patient.clone().with_id(PatientId::new(5));

        assert_eq!(patient.id, None);
        assert_eq!(stored.id, Some(PatientId::new(5)));
        assert_eq!(stored.full_name(), "Gómez, Ana");
    }

    #[test]
    fn test_patient_json_omits_missing_record_and_uses_canonical_blood_type() {
        let birth = NaiveDate::from_ymd_opt(1990, 1, 1).unwrap();
        let patient = Patient::new("Gómez", "Ana", "1234567", birth).with_id(PatientId::new(5));
        let json = serde_json::to_value(&patient).expect("should serialize");
        assert_eq!(json["id"], 5);
        assert_eq!(json["birth_date"], "1990-01-01");
        assert!(json.get("clinical_record").is_none());

        let with_record = patient.with_clinical_record(stored());
        let json = serde_json::to_value(&with_record).expect("should serialize");
        assert_eq!(json["clinical_record"]["blood_type"], "O+");

        let back: Patient = serde_json::from_value(json).expect("should deserialize");
        assert_eq!(back, with_record);
    }
}
