//! Shared value types for the clinic record system.
//!
//! These types carry no storage or service concerns. They exist so that the
//! core crate and the CLI agree on how identifiers and blood types are
//! represented, parsed and displayed.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Errors that can occur when parsing a blood type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BloodTypeError {
    /// The input did not match any of the eight ABO/Rh groups.
    #[error("invalid blood type: {0}")]
    Unknown(String),
}

/// ABO group combined with the Rh factor.
///
/// The canonical textual form is the one written to storage: `A+`, `A-`,
/// `B+`, `B-`, `AB+`, `AB-`, `O+`, `O-`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BloodType {
    APositive,
    ANegative,
    BPositive,
    BNegative,
    AbPositive,
    AbNegative,
    OPositive,
    ONegative,
}

impl BloodType {
    /// All eight groups, in their conventional display order.
    pub const ALL: [BloodType; 8] = [
        BloodType::APositive,
        BloodType::ANegative,
        BloodType::BPositive,
        BloodType::BNegative,
        BloodType::AbPositive,
        BloodType::AbNegative,
        BloodType::OPositive,
        BloodType::ONegative,
    ];

    /// Returns the canonical textual form, e.g. `"AB-"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            BloodType::APositive => "A+",
            BloodType::ANegative => "A-",
            BloodType::BPositive => "B+",
            BloodType::BNegative => "B-",
            BloodType::AbPositive => "AB+",
            BloodType::AbNegative => "AB-",
            BloodType::OPositive => "O+",
            BloodType::ONegative => "O-",
        }
    }
}

impl fmt::Display for BloodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BloodType {
    type Err = BloodTypeError;

    /// Parses the canonical form case-insensitively, ignoring surrounding whitespace.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        BloodType::ALL
            .into_iter()
            .find(|bt| bt.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| BloodTypeError::Unknown(s.to_string()))
    }
}

impl Serialize for BloodType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for BloodType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

macro_rules! surrogate_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            pub const fn new(raw: i64) -> Self {
                Self(raw)
            }

            /// Returns the raw database identifier.
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse::<i64>().map(Self)
            }
        }
    };
}

surrogate_id!(
    /// Surrogate key of a row in the patient table.
    PatientId
);

surrogate_id!(
    /// Surrogate key of a row in the clinical record table.
    ClinicalRecordId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blood_type_parses_case_insensitively() {
        assert_eq!("ab-".parse::<BloodType>().unwrap(), BloodType::AbNegative);
        assert_eq!(" O+ ".parse::<BloodType>().unwrap(), BloodType::OPositive);
    }

    #[test]
    fn test_blood_type_rejects_unknown_group() {
        let err = "C+".parse::<BloodType>().expect_err("C+ is not a blood type");
        assert_eq!(err, BloodTypeError::Unknown("C+".into()));
    }

    #[test]
    fn test_every_blood_type_parses_back_from_its_display_form() {
        for bt in BloodType::ALL {
            assert_eq!(bt.to_string().parse::<BloodType>().unwrap(), bt);
        }
    }

    #[test]
    fn test_ids_and_blood_types_serialise_as_bare_values() {
        assert_eq!(serde_json::to_string(&PatientId::new(42)).unwrap(), "42");
        assert_eq!(
            serde_json::to_string(&BloodType::AbPositive).unwrap(),
            "\"AB+\""
        );
        let parsed: BloodType = serde_json::from_str("\"o-\"").unwrap();
        assert_eq!(parsed, BloodType::ONegative);
    }

    #[test]
    fn test_id_from_str_trims_input() {
        assert_eq!(" 7 ".parse::<ClinicalRecordId>().unwrap().get(), 7);
        assert!("seven".parse::<PatientId>().is_err());
    }
}
