//! # Clinic Core
//!
//! Core business logic for the clinic patient record system.
//!
//! This crate holds everything below the presentation layer:
//! - Patient and clinical record value types and their validation
//! - SQLite persistence through per-table record stores with soft delete
//! - The patient and clinical record services, including the composite transactions
//!   (admission, cascading delete, association) and the accumulating record merge
//!
//! **No presentation concerns**: argument parsing, output formatting and log subscriber setup
//! belong in the `cli` crate.

pub mod clinical;
pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod models;
pub mod patient;
pub mod repositories;
pub mod validation;

pub use clinic_types::{BloodType, BloodTypeError, ClinicalRecordId, PatientId};
pub use clinical::ClinicalRecordService;
pub use config::{resolve_database_path, CoreConfig};
pub use db::Database;
pub use error::{ClinicError, ClinicResult, StorageError, StorageResult, ValidationError};
pub use models::{ClinicalRecord, Patient};
pub use patient::PatientService;
