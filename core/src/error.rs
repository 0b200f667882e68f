use std::fmt;
use std::path::PathBuf;

use chrono::NaiveDate;
use rusqlite::ErrorCode;
use thiserror::Error;

use crate::metrics::AnchorPoint;
use crate::models::{EquipmentId, Reading};

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Which cumulative counter an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    Running,
    Loaded,
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Counter::Running => f.write_str("running"),
            Counter::Loaded => f.write_str("loaded"),
        }
    }
}

/// Rejected input. Terminal: retrying the same input fails the same way.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("{field} must be a finite number, got {value}")]
    NonFinite { field: &'static str, value: f64 },

    #[error("{field} must not be negative, got {value}")]
    Negative { field: &'static str, value: f64 },

    #[error("{counter} hours {submitted} regress below {anchor_value} from the {anchor}")]
    Regression {
        counter: Counter,
        submitted: f64,
        anchor_value: f64,
        anchor: AnchorPoint,
    },

    #[error(
        "{counter} hours {submitted} exceed {successor_value} \
         from the reading dated {successor_date}"
    )]
    ExceedsSuccessor {
        counter: Counter,
        submitted: f64,
        successor_value: f64,
        successor_date: NaiveDate,
    },

    #[error("equipment name must not be empty")]
    EmptyName,

    #[error("baseline loaded hours {loaded} exceed baseline running hours {running}")]
    BaselineLoadedExceedsRunning { loaded: f64, running: f64 },

    #[error("date range starts {from} after it ends {to}")]
    InvertedRange { from: NaiveDate, to: NaiveDate },

    #[error("invalid date {0:?}, expected YYYY-MM-DD")]
    InvalidDate(String),
}

/// Failure reported by a storage adapter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("store temporarily unavailable: {0}")]
    Transient(String),

    #[error("store rejected write: {0}")]
    Constraint(String),

    #[error("store failure: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
                StoreError::Transient(err.to_string())
            }
            Some(ErrorCode::ConstraintViolation) => StoreError::Constraint(err.to_string()),
            _ => StoreError::Backend(err.to_string()),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Follow-up stage that runs after the primary reading write commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Cascade,
    Schedule,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Cascade => f.write_str("cascade recalculation"),
            Stage::Schedule => f.write_str("schedule refresh"),
        }
    }
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("equipment not found: {0}")]
    EquipmentNotFound(EquipmentId),

    #[error("no reading for equipment {equipment_id} on {date}")]
    ReadingNotFound {
        equipment_id: EquipmentId,
        date: NaiveDate,
    },

    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("constraint violation for equipment {equipment_id} on {date}: {detail}")]
    ConstraintViolation {
        equipment_id: EquipmentId,
        date: NaiveDate,
        detail: String,
    },

    #[error("transient store error: {0}")]
    TransientStore(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The reading write committed; a later stage did not. Re-running the
    /// stage (`recalculate` / `refresh_schedule`) completes the submission.
    #[error("reading committed but {stage} failed: {source}")]
    PartialCommit {
        stage: Stage,
        committed: Box<Reading>,
        source: Box<LedgerError>,
    },
}

impl LedgerError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LedgerError::TransientStore(_) | LedgerError::PartialCommit { .. }
        )
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Transient(message) => LedgerError::TransientStore(message),
            StoreError::Constraint(message) | StoreError::Backend(message) => {
                LedgerError::Store(message)
            }
        }
    }
}
