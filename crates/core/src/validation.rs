//! Input validation utilities.
//!
//! Each check either returns `Ok(())` or a [`ValidationError`] naming the offending field.
//! Checks never touch storage, so callers chain them before any store call and a failed
//! check leaves nothing behind.

use crate::constants::{
    EARLIEST_BIRTH_DATE, MAX_GIVEN_NAME_LEN, MAX_MEDICATION_LEN, MAX_NATIONAL_ID_LEN,
    MAX_RECORD_NUMBER_LEN, MAX_SURNAME_LEN,
};
use crate::error::ValidationError;
use crate::models::{ClinicalRecord, Patient};
use chrono::{Local, NaiveDate};

pub type ValidationResult = Result<(), ValidationError>;

/// Rejects empty or whitespace-only text.
pub fn require_non_empty(value: &str, field: &str) -> ValidationResult {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "is required"));
    }
    Ok(())
}

/// Rejects text longer than `max` characters. Absent values pass.
pub fn require_max_len(value: Option<&str>, max: usize, field: &str) -> ValidationResult {
    match value {
        Some(v) if v.chars().count() > max => Err(ValidationError::new(
            field,
            format!("exceeds maximum length of {max} characters"),
        )),
        _ => Ok(()),
    }
}

/// Accepts only ASCII letters, Spanish accented vowels, `ñ`/`Ñ` and ASCII whitespace.
///
/// Blank values pass; pair with [`require_non_empty`] when the field is mandatory.
pub fn require_letters_only(value: &str, field: &str) -> ValidationResult {
    if value.trim().is_empty() {
        return Ok(());
    }

    let ok = value.chars().all(|c| {
        c.is_ascii_alphabetic()
            || c.is_ascii_whitespace()
            || matches!(
                c,
                'á' | 'é' | 'í' | 'ó' | 'ú' | 'Á' | 'É' | 'Í' | 'Ó' | 'Ú' | 'ñ' | 'Ñ'
            )
    });

    if !ok {
        return Err(ValidationError::new(
            field,
            "may only contain letters, spaces and accents",
        ));
    }
    Ok(())
}

/// A national ID is a string of 7 or 8 ASCII digits.
pub fn require_national_id(value: &str) -> ValidationResult {
    require_non_empty(value, "national_id")?;

    let digits_only = value.bytes().all(|b| b.is_ascii_digit());
    if !digits_only || !(7..=8).contains(&value.len()) {
        return Err(ValidationError::new(
            "national_id",
            "must contain between 7 and 8 numeric digits",
        ));
    }
    Ok(())
}

/// Checks a date of birth against today's local date.
pub fn require_birth_date(date: NaiveDate) -> ValidationResult {
    require_birth_date_on(date, Local::now().date_naive())
}

/// Checks that `date` lies within `[1900-01-01, today]`.
pub fn require_birth_date_on(date: NaiveDate, today: NaiveDate) -> ValidationResult {
    let (y, m, d) = EARLIEST_BIRTH_DATE;
    let earliest = NaiveDate::from_ymd_opt(y, m, d).unwrap_or(NaiveDate::MIN);

    if date < earliest {
        return Err(ValidationError::new(
            "birth_date",
            format!("cannot be earlier than {earliest}"),
        ));
    }
    if date > today {
        return Err(ValidationError::new("birth_date", "cannot be in the future"));
    }
    Ok(())
}

/// Rejects zero and negative numbers.
pub fn require_positive(value: i64, field: &str) -> ValidationResult {
    if value <= 0 {
        return Err(ValidationError::new(field, "must be a positive number"));
    }
    Ok(())
}

/// Validates every caller-supplied field of a patient.
pub fn validate_patient(patient: &Patient) -> ValidationResult {
    validate_patient_on(patient, Local::now().date_naive())
}

pub(crate) fn validate_patient_on(patient: &Patient, today: NaiveDate) -> ValidationResult {
    require_non_empty(&patient.surname, "surname")?;
    require_letters_only(&patient.surname, "surname")?;
    require_non_empty(&patient.given_name, "given_name")?;
    require_letters_only(&patient.given_name, "given_name")?;
    require_national_id(&patient.national_id)?;
    require_birth_date_on(patient.birth_date, today)?;

    require_max_len(Some(patient.surname.as_str()), MAX_SURNAME_LEN, "surname")?;
    require_max_len(Some(patient.given_name.as_str()), MAX_GIVEN_NAME_LEN, "given_name")?;
    require_max_len(Some(patient.national_id.as_str()), MAX_NATIONAL_ID_LEN, "national_id")?;
    Ok(())
}

/// Validates every caller-supplied field of a clinical record.
///
/// The blood type is enforced by its type and needs no runtime check.
pub fn validate_clinical_record(record: &ClinicalRecord) -> ValidationResult {
    require_non_empty(&record.record_number, "record_number")?;
    require_non_empty(&record.medical_history, "medical_history")?;
    require_non_empty(&record.observations, "observations")?;

    require_max_len(
        Some(record.record_number.as_str()),
        MAX_RECORD_NUMBER_LEN,
        "record_number",
    )?;
    require_max_len(
        record.current_medication.as_deref(),
        MAX_MEDICATION_LEN,
        "current_medication",
    )?;
    Ok(())
}
