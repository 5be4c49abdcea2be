use anyhow::Context;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use clinic_core::{
    resolve_database_path, ClinicalRecord, ClinicalRecordService, CoreConfig, Database, Patient,
    PatientService,
};
use clinic_types::{BloodType, ClinicalRecordId, PatientId};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "clinic")]
#[command(about = "Clinic patient and clinical record CLI")]
struct Cli {
    /// YAML settings file (falls back to CLINIC_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// SQLite database file (falls back to CLINIC_DATABASE_PATH, then clinic.db)
    #[arg(long, global = true)]
    database: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the database can be reached
    Check,
    /// Create the tables if they do not exist
    InitDb,
    /// Patient operations
    #[command(subcommand)]
    Patient(PatientCommand),
    /// Clinical record operations
    #[command(subcommand)]
    Record(RecordCommand),
    /// Create a patient together with its clinical record
    Admit {
        #[command(flatten)]
        patient: PatientFields,
        #[command(flatten)]
        record: RecordFields,
    },
    /// Link an unowned clinical record to a patient without one
    Associate {
        patient_id: PatientId,
        record_id: ClinicalRecordId,
    },
}

#[derive(Subcommand)]
enum PatientCommand {
    /// Add a patient
    Add(PatientFields),
    /// List active patients
    List {
        #[arg(long)]
        json: bool,
    },
    /// Show one patient
    Show {
        id: PatientId,
        #[arg(long)]
        json: bool,
    },
    /// Find a patient by national ID
    Find {
        national_id: String,
        #[arg(long)]
        json: bool,
    },
    /// Change a patient's details; omitted fields keep their stored value
    Update {
        id: PatientId,
        #[arg(long)]
        surname: Option<String>,
        #[arg(long)]
        given_name: Option<String>,
        #[arg(long)]
        national_id: Option<String>,
        /// Date of birth (YYYY-MM-DD)
        #[arg(long)]
        birth_date: Option<NaiveDate>,
    },
    /// Delete a patient and its clinical record
    Delete { id: PatientId },
}

#[derive(Subcommand)]
enum RecordCommand {
    /// Add a clinical record, optionally owned by a patient
    Add {
        #[command(flatten)]
        record: RecordFields,
        #[arg(long)]
        patient_id: Option<PatientId>,
    },
    /// List active clinical records
    List {
        #[arg(long)]
        json: bool,
    },
    /// Show one clinical record
    Show {
        id: ClinicalRecordId,
        #[arg(long)]
        json: bool,
    },
    /// Find a clinical record by number or by owning patient
    Find {
        #[arg(long, conflicts_with = "patient_id", required_unless_present = "patient_id")]
        number: Option<String>,
        #[arg(long)]
        patient_id: Option<PatientId>,
        #[arg(long)]
        json: bool,
    },
    /// Add an entry to a patient's record, creating the record if needed
    Merge {
        #[command(flatten)]
        record: RecordFields,
        #[arg(long)]
        patient_id: PatientId,
    },
    /// Change a clinical record; omitted fields keep their stored value
    Update {
        id: ClinicalRecordId,
        #[arg(long)]
        number: Option<String>,
        #[arg(long)]
        blood_type: Option<BloodType>,
        #[arg(long)]
        history: Option<String>,
        #[arg(long)]
        observations: Option<String>,
        #[arg(long)]
        medication: Option<String>,
        #[arg(long)]
        patient_id: Option<PatientId>,
    },
    /// Delete a clinical record
    Delete { id: ClinicalRecordId },
}

#[derive(Args)]
struct PatientFields {
    #[arg(long)]
    surname: String,
    #[arg(long)]
    given_name: String,
    #[arg(long)]
    national_id: String,
    /// Date of birth (YYYY-MM-DD)
    #[arg(long)]
    birth_date: NaiveDate,
}

impl PatientFields {
    fn into_patient(self) -> Patient {
        Patient::new(self.surname, self.given_name, self.national_id, self.birth_date)
    }
}

#[derive(Args)]
struct RecordFields {
    /// Clinical record number
    #[arg(long)]
    number: String,
    /// One of A+, A-, B+, B-, AB+, AB-, O+, O-
    #[arg(long)]
    blood_type: BloodType,
    /// Medical history
    #[arg(long)]
    history: String,
    #[arg(long)]
    observations: String,
    /// Current medication
    #[arg(long)]
    medication: Option<String>,
}

impl RecordFields {
    fn into_record(self) -> ClinicalRecord {
        let record =
            ClinicalRecord::new(self.number, self.blood_type, self.history, self.observations);
        match self.medication {
            Some(medication) => record.with_medication(medication),
            None => record,
        }
    }
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("clinic=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let cfg = Arc::new(load_config(&cli)?);
    let db = Database::new(cfg.clone());
    tracing::debug!("using database {}", cfg.database_path().display());

    db.check_connection().with_context(|| {
        format!(
            "cannot connect to database {}",
            cfg.database_path().display()
        )
    })?;

    let patients = PatientService::with_database(db.clone());
    let records = ClinicalRecordService::with_database(db.clone());

    match cli.command {
        Commands::Check => {
            println!("Database {} is reachable.", cfg.database_path().display());
        }
        Commands::InitDb => {
            db.initialise_schema()?;
            println!("Schema ready at {}.", cfg.database_path().display());
        }
        Commands::Patient(command) => run_patient(&patients, command)?,
        Commands::Record(command) => run_record(&records, command)?,
        Commands::Admit { patient, record } => {
            let admitted = patients
                .create_with_clinical_record(&patient.into_patient(), &record.into_record())?;
            println!("Admitted patient:");
            print_patient(&admitted);
        }
        Commands::Associate {
            patient_id,
            record_id,
        } => {
            let patient = patients.associate(patient_id, record_id)?;
            println!("Associated clinical record {record_id} with patient {patient_id}.");
            print_patient(&patient);
        }
    }

    Ok(())
}

/// Resolves configuration: settings file first, then an explicit database path, then the default.
fn load_config(cli: &Cli) -> anyhow::Result<CoreConfig> {
    let settings_file = cli.config.clone().or_else(|| {
        std::env::var("CLINIC_CONFIG")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
    });

    if let Some(path) = settings_file {
        return CoreConfig::from_yaml_file(&path)
            .with_context(|| format!("failed to load settings from {}", path.display()));
    }

    let database_path = resolve_database_path(&[
        cli.database.clone(),
        std::env::var("CLINIC_DATABASE_PATH").ok(),
    ]);
    Ok(CoreConfig::with_database_path(database_path)?)
}

fn run_patient(service: &PatientService, command: PatientCommand) -> anyhow::Result<()> {
    match command {
        PatientCommand::Add(fields) => {
            let created = service.insert(&fields.into_patient())?;
            println!("Created patient:");
            print_patient(&created);
        }
        PatientCommand::List { json } => {
            let patients = service.list_all()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&patients)?);
            } else if patients.is_empty() {
                println!("No patients found.");
            } else {
                for patient in &patients {
                    println!(
                        "ID: {}, Name: {}, National ID: {}, Record: {}",
                        display_id(patient.id),
                        patient.full_name(),
                        patient.national_id,
                        patient
                            .clinical_record
                            .as_ref()
                            .map(|r| r.record_number.as_str())
                            .unwrap_or("-"),
                    );
                }
            }
        }
        PatientCommand::Show { id, json } => {
            let patient = service.by_id(id)?;
            show(patient.as_ref(), json, print_patient, &format!("patient {id}"))?;
        }
        PatientCommand::Find { national_id, json } => {
            let patient = service.by_national_id(&national_id)?;
            show(
                patient.as_ref(),
                json,
                print_patient,
                &format!("patient with national ID {national_id}"),
            )?;
        }
        PatientCommand::Update {
            id,
            surname,
            given_name,
            national_id,
            birth_date,
        } => {
            let current = service
                .by_id(id)?
                .with_context(|| format!("patient {id} not found"))?;
            let changed = Patient {
                surname: surname.unwrap_or(current.surname),
                given_name: given_name.unwrap_or(current.given_name),
                national_id: national_id.unwrap_or(current.national_id),
                birth_date: birth_date.unwrap_or(current.birth_date),
                ..current
            };
            let updated = service.update(&changed)?;
            println!("Updated patient:");
            print_patient(&updated);
        }
        PatientCommand::Delete { id } => {
            service.delete(id)?;
            println!("Deleted patient {id} and its clinical record.");
        }
    }
    Ok(())
}

fn run_record(service: &ClinicalRecordService, command: RecordCommand) -> anyhow::Result<()> {
    match command {
        RecordCommand::Add { record, patient_id } => {
            let record = record.into_record();
            let record = match patient_id {
                Some(patient_id) => record.with_patient_id(patient_id),
                None => record,
            };
            let created = service.insert(&record)?;
            println!("Created clinical record:");
            print_record(&created);
        }
        RecordCommand::List { json } => {
            let records = service.list_all()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else if records.is_empty() {
                println!("No clinical records found.");
            } else {
                for record in &records {
                    println!(
                        "ID: {}, Number: {}, Blood type: {}, Patient: {}",
                        display_id(record.id),
                        record.record_number,
                        record.blood_type,
                        display_id(record.patient_id),
                    );
                }
            }
        }
        RecordCommand::Show { id, json } => {
            let record = service.by_id(id)?;
            show(record.as_ref(), json, print_record, &format!("clinical record {id}"))?;
        }
        RecordCommand::Find {
            number,
            patient_id,
            json,
        } => {
            let (record, label) = match (number, patient_id) {
                (Some(number), _) => (
                    service.by_record_number(&number)?,
                    format!("clinical record {number}"),
                ),
                (None, Some(patient_id)) => (
                    service.by_patient_id(patient_id)?,
                    format!("clinical record of patient {patient_id}"),
                ),
                (None, None) => anyhow::bail!("either --number or --patient-id is required"),
            };
            show(record.as_ref(), json, print_record, &label)?;
        }
        RecordCommand::Merge { record, patient_id } => {
            let incoming = record.into_record().with_patient_id(patient_id);
            let stored = service.create_or_merge(&incoming)?;
            println!("Clinical record of patient {patient_id}:");
            print_record(&stored);
        }
        RecordCommand::Update {
            id,
            number,
            blood_type,
            history,
            observations,
            medication,
            patient_id,
        } => {
            let current = service
                .by_id(id)?
                .with_context(|| format!("clinical record {id} not found"))?;
            let changed = ClinicalRecord {
                record_number: number.unwrap_or(current.record_number),
                blood_type: blood_type.unwrap_or(current.blood_type),
                medical_history: history.unwrap_or(current.medical_history),
                observations: observations.unwrap_or(current.observations),
                current_medication: medication.or(current.current_medication),
                patient_id: patient_id.or(current.patient_id),
                ..current
            };
            let updated = service.update(&changed)?;
            println!("Updated clinical record:");
            print_record(&updated);
        }
        RecordCommand::Delete { id } => {
            service.delete(id)?;
            println!("Deleted clinical record {id}.");
        }
    }
    Ok(())
}

fn show<T: serde::Serialize>(
    value: Option<&T>,
    json: bool,
    print: fn(&T),
    what: &str,
) -> anyhow::Result<()> {
    match value {
        Some(value) if json => println!("{}", serde_json::to_string_pretty(value)?),
        Some(value) => print(value),
        None => println!("No {what} found."),
    }
    Ok(())
}

fn print_patient(patient: &Patient) {
    println!("  ID:            {}", display_id(patient.id));
    println!("  Name:          {}", patient.full_name());
    println!("  National ID:   {}", patient.national_id);
    println!("  Date of birth: {}", patient.birth_date.format("%d/%m/%Y"));
    match &patient.clinical_record {
        Some(record) => {
            println!("  Clinical record:");
            print_record(record);
        }
        None => println!("  Clinical record: none"),
    }
}

fn print_record(record: &ClinicalRecord) {
    println!("  Record ID:     {}", display_id(record.id));
    println!("  Number:        {}", record.record_number);
    println!("  Blood type:    {}", record.blood_type);
    println!("  Patient:       {}", display_id(record.patient_id));
    println!("  Medication:    {}", record.current_medication.as_deref().unwrap_or("-"));
    println!("  History:\n{}", indent(&record.medical_history));
    println!("  Observations:\n{}", indent(&record.observations));
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|line| format!("    {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn display_id<T: std::fmt::Display>(id: Option<T>) -> String {
    id.map(|id| id.to_string()).unwrap_or_else(|| "-".into())
}
