//! Constants used throughout the clinic core crate.
//!
//! Table names, field limits and defaults live here so that stores,
//! validators and configuration agree on them.

use std::time::Duration;

/// Default SQLite database file when no explicit path is configured.
pub const DEFAULT_DATABASE_PATH: &str = "clinic.db";

/// Default time a connection waits on a locked database before failing.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Table holding patients.
pub const PATIENT_TABLE: &str = "paciente";

/// Table holding clinical records.
pub const CLINICAL_RECORD_TABLE: &str = "historiaClinica";

/// Maximum length of a patient's surname.
pub const MAX_SURNAME_LEN: usize = 40;

/// Maximum length of a patient's given name.
pub const MAX_GIVEN_NAME_LEN: usize = 40;

/// Maximum length of a national ID as stored.
pub const MAX_NATIONAL_ID_LEN: usize = 15;

/// Maximum length of a clinical record number.
pub const MAX_RECORD_NUMBER_LEN: usize = 20;

/// Maximum length of the current-medication field on input.
pub const MAX_MEDICATION_LEN: usize = 255;

/// Earliest accepted date of birth as `(year, month, day)`.
pub const EARLIEST_BIRTH_DATE: (i32, u32, u32) = (1900, 1, 1);

/// chrono format of the timestamp embedded in a merge separator line.
pub const MERGE_TIMESTAMP_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

/// Prefix of the separator written between accumulated entries.
pub const MERGE_ENTRY_MARKER: &str = "--- ENTRY:";
