use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const KEY_SEPARATOR: &str = " - ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormType {
    Theory,
    Practical,
}

impl FormType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Theory => "Theory",
            Self::Practical => "Practical",
        }
    }
}

impl fmt::Display for FormType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FormType {
    type Err = SnapshotError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "theory" => Ok(Self::Theory),
            "practical" => Ok(Self::Practical),
            _ => Err(SnapshotError::UnknownFormType(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacultyAssignment {
    pub faculty_name: String,
    pub subject: String,
}

impl FacultyAssignment {
    pub fn key(&self) -> String {
        format!("{}{}{}", self.faculty_name, KEY_SEPARATOR, self.subject)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormPayload {
    pub id: String,
    pub name: String,
    pub branch: String,
    pub form_type: FormType,
    pub faculties: Vec<FacultyAssignment>,
}

/// Point-in-time read of a form's running rating sums.
///
/// `entries` keeps the order keys were stored in; every report derived from
/// the snapshot lists faculty in that order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccumulatorSnapshot {
    pub entries: Vec<(String, Vec<f64>)>,
    pub total_submissions: u64,
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("accumulator is not a JSON object of rating arrays: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("accumulator entry {0} is not an array of numbers")]
    InvalidEntry(String),
    #[error("negative submission counter: {0}")]
    NegativeTotal(i64),
    #[error("unknown form type: {0}")]
    UnknownFormType(String),
}

impl AccumulatorSnapshot {
    /// Builds a snapshot from the raw store columns. A missing or blank map is
    /// a form with no faculty yet, and a missing counter means no submissions.
    pub fn from_store(report: Option<&str>, total: Option<i64>) -> Result<Self, SnapshotError> {
        let total_submissions = match total.unwrap_or(0) {
            value if value < 0 => return Err(SnapshotError::NegativeTotal(value)),
            value => value as u64,
        };

        let raw = report
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .unwrap_or("{}");
        let map: serde_json::Map<String, serde_json::Value> = serde_json::from_str(raw)?;

        let mut entries = Vec::with_capacity(map.len());
        for (key, value) in map {
            let sums: Vec<f64> = serde_json::from_value(value)
                .map_err(|_| SnapshotError::InvalidEntry(key.clone()))?;
            entries.push((key, sums));
        }

        Ok(Self {
            entries,
            total_submissions,
        })
    }

    /// Serializes the sums back into the store's JSON text, keeping key order.
    pub fn entries_json(&self) -> String {
        let map: serde_json::Map<String, serde_json::Value> = self
            .entries
            .iter()
            .map(|(key, sums)| (key.clone(), serde_json::json!(sums)))
            .collect();
        serde_json::Value::Object(map).to_string()
    }

    pub fn entry(&self, key: &str) -> Option<&[f64]> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, sums)| sums.as_slice())
    }
}

/// A stored form as listed on the dashboard, newest first.
#[derive(Debug, Clone, PartialEq)]
pub struct FormListing {
    pub form: FormPayload,
    pub created_at: DateTime<Utc>,
}

/// One row of a form's submission log.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionRecord {
    pub source_key: String,
    pub respondent_name: String,
    pub roll_no: String,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FacultyReport {
    pub faculty_name: String,
    pub subject: String,
    pub question_averages: Vec<f64>,
    pub overall_average: f64,
    pub percentage_score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub total_submissions: u64,
    pub faculties: Vec<FacultyReport>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReportOutcome {
    NoSubmissions,
    Ready(Report),
}
