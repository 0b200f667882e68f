//! Foreign-function surface for host apps.
//!
//! Dates cross the boundary as `YYYY-MM-DD` strings and enums as their
//! lowercase names. Errors are flattened to a message per category.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;

use crate::config::LedgerConfig;
use crate::engine::LedgerEngine;
use crate::error::{ConfigError, LedgerError, StoreError, ValidationError};
use crate::metrics::UsageSummary;
use crate::models::{
    Alert, EquipmentId, EquipmentStatus, EquipmentSummary, MaintenanceSchedule, NewEquipment,
    Reading, ServiceDue, SubmitReading, UnknownVariant,
};
use crate::storage::{AlertFilter, DateRange, SqliteStore};

#[derive(Debug, thiserror::Error, uniffi::Error)]
#[uniffi(flat_error)]
pub enum FfiLedgerError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    ConstraintViolation(String),
    #[error("{0}")]
    Transient(String),
    #[error("{0}")]
    PartialCommit(String),
    #[error("{0}")]
    Storage(String),
    #[error("{0}")]
    Config(String),
}

impl From<LedgerError> for FfiLedgerError {
    fn from(err: LedgerError) -> Self {
        let message = err.to_string();
        match err {
            LedgerError::EquipmentNotFound(_) | LedgerError::ReadingNotFound { .. } => {
                FfiLedgerError::NotFound(message)
            }
            LedgerError::Validation(_) => FfiLedgerError::Validation(message),
            LedgerError::ConstraintViolation { .. } => FfiLedgerError::ConstraintViolation(message),
            LedgerError::TransientStore(_) => FfiLedgerError::Transient(message),
            LedgerError::PartialCommit { .. } => FfiLedgerError::PartialCommit(message),
            LedgerError::Store(_) => FfiLedgerError::Storage(message),
            LedgerError::Config(_) => FfiLedgerError::Config(message),
        }
    }
}

impl From<StoreError> for FfiLedgerError {
    fn from(err: StoreError) -> Self {
        LedgerError::from(err).into()
    }
}

impl From<ConfigError> for FfiLedgerError {
    fn from(err: ConfigError) -> Self {
        FfiLedgerError::Config(err.to_string())
    }
}

impl From<ValidationError> for FfiLedgerError {
    fn from(err: ValidationError) -> Self {
        LedgerError::from(err).into()
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ValidationError::InvalidDate(raw.to_string()))
}

fn parse_range(from: Option<String>, to: Option<String>) -> Result<DateRange, ValidationError> {
    Ok(DateRange {
        from: from.as_deref().map(parse_date).transpose()?,
        to: to.as_deref().map(parse_date).transpose()?,
    })
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiEquipment {
    pub id: String,
    pub name: String,
    pub status: String,
    pub baseline_running_hours: f64,
    pub baseline_loaded_hours: f64,
    pub latest_running_hours: f64,
    pub latest_loaded_hours: f64,
    pub overall_efficiency_percent: f64,
    pub schedule: Option<FfiSchedule>,
}

impl From<EquipmentSummary> for FfiEquipment {
    fn from(summary: EquipmentSummary) -> Self {
        let equipment = summary.equipment;
        Self {
            id: equipment.id.0,
            name: equipment.name,
            status: equipment.status.as_str().to_string(),
            baseline_running_hours: equipment.baseline_running_hours,
            baseline_loaded_hours: equipment.baseline_loaded_hours,
            latest_running_hours: equipment.latest_running_hours,
            latest_loaded_hours: equipment.latest_loaded_hours,
            overall_efficiency_percent: summary.overall_efficiency_percent,
            schedule: summary.schedule.map(FfiSchedule::from),
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiReadingInput {
    pub equipment_id: String,
    pub date: String,
    pub running_hours: f64,
    pub loaded_hours: f64,
    pub pressure: Option<f64>,
    pub temperature: Option<f64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiReading {
    pub id: String,
    pub equipment_id: String,
    pub date: String,
    pub cumulative_running_hours: f64,
    pub cumulative_loaded_hours: f64,
    pub daily_running_hours: f64,
    pub daily_loaded_hours: f64,
    pub efficiency_percent: f64,
    pub pressure: Option<f64>,
    pub temperature: Option<f64>,
    pub notes: Option<String>,
}

impl From<Reading> for FfiReading {
    fn from(reading: Reading) -> Self {
        Self {
            id: reading.id.0,
            equipment_id: reading.equipment_id.0,
            date: reading.date.to_string(),
            cumulative_running_hours: reading.cumulative_running_hours,
            cumulative_loaded_hours: reading.cumulative_loaded_hours,
            daily_running_hours: reading.daily_running_hours,
            daily_loaded_hours: reading.daily_loaded_hours,
            efficiency_percent: reading.efficiency_percent,
            pressure: reading.pressure,
            temperature: reading.temperature,
            notes: reading.notes,
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiSchedule {
    pub service_interval_hours: u32,
    pub current_hours: f64,
    pub hours_remaining: f64,
    pub days_remaining: i64,
    pub next_service_date: String,
    pub urgency: String,
}

impl From<MaintenanceSchedule> for FfiSchedule {
    fn from(schedule: MaintenanceSchedule) -> Self {
        Self {
            service_interval_hours: schedule.service_interval_hours,
            current_hours: schedule.current_hours,
            hours_remaining: schedule.hours_remaining,
            days_remaining: schedule.days_remaining,
            next_service_date: schedule.next_service_date.to_string(),
            urgency: schedule.urgency.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiServiceDue {
    pub equipment_id: String,
    pub equipment_name: String,
    pub current_hours: f64,
    pub next_service_hours: u32,
    pub hours_remaining: f64,
    pub days_remaining: i64,
    pub next_service_date: String,
    pub urgency: String,
}

impl From<ServiceDue> for FfiServiceDue {
    fn from(due: ServiceDue) -> Self {
        Self {
            equipment_id: due.equipment_id.0,
            equipment_name: due.equipment_name,
            current_hours: due.current_hours,
            next_service_hours: due.next_service_hours,
            hours_remaining: due.hours_remaining,
            days_remaining: due.days_remaining,
            next_service_date: due.next_service_date.to_string(),
            urgency: due.urgency.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiUsageSummary {
    pub reading_count: u64,
    pub first_date: Option<String>,
    pub last_date: Option<String>,
    pub total_running_hours: f64,
    pub total_loaded_hours: f64,
    pub efficiency_percent: f64,
    pub avg_daily_running_hours: f64,
}

impl From<UsageSummary> for FfiUsageSummary {
    fn from(summary: UsageSummary) -> Self {
        Self {
            reading_count: summary.reading_count,
            first_date: summary.first_date.map(|d| d.to_string()),
            last_date: summary.last_date.map(|d| d.to_string()),
            total_running_hours: summary.total_running_hours,
            total_loaded_hours: summary.total_loaded_hours,
            efficiency_percent: summary.efficiency_percent,
            avg_daily_running_hours: summary.avg_daily_running_hours,
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiAlert {
    pub id: String,
    pub equipment_id: String,
    pub service_interval_hours: u32,
    pub severity: String,
    pub urgency: String,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    pub is_resolved: bool,
    pub created_at_unix: i64,
}

impl From<Alert> for FfiAlert {
    fn from(alert: Alert) -> Self {
        Self {
            id: alert.id.0,
            equipment_id: alert.equipment_id.0,
            service_interval_hours: alert.service_interval_hours,
            severity: alert.severity.as_str().to_string(),
            urgency: alert.urgency.as_str().to_string(),
            title: alert.title,
            message: alert.message,
            is_read: alert.is_read,
            is_resolved: alert.is_resolved,
            created_at_unix: alert.created_at.timestamp(),
        }
    }
}

/// A ledger backed by an SQLite database file.
#[derive(uniffi::Object)]
pub struct HourLedger {
    engine: LedgerEngine<SqliteStore>,
}

fn load_config(config_json: Option<String>) -> Result<LedgerConfig, FfiLedgerError> {
    Ok(match config_json {
        Some(raw) => LedgerConfig::from_json_str(&raw)?,
        None => LedgerConfig::default(),
    })
}

#[uniffi::export]
impl HourLedger {
    /// Open (or create) the ledger at `path`. `config_json` overrides the
    /// default configuration.
    #[uniffi::constructor]
    pub fn open(path: String, config_json: Option<String>) -> Result<Arc<Self>, FfiLedgerError> {
        let config = load_config(config_json)?;
        let store = SqliteStore::open_with_timeout(
            &path,
            Duration::from_millis(config.store_busy_timeout_ms),
        )?;
        Ok(Arc::new(Self {
            engine: LedgerEngine::new(store, config)?,
        }))
    }

    #[uniffi::constructor]
    pub fn open_in_memory(config_json: Option<String>) -> Result<Arc<Self>, FfiLedgerError> {
        let config = load_config(config_json)?;
        Ok(Arc::new(Self {
            engine: LedgerEngine::new(SqliteStore::in_memory()?, config)?,
        }))
    }

    pub fn register_equipment(
        &self,
        name: String,
        baseline_running_hours: f64,
        baseline_loaded_hours: f64,
    ) -> Result<FfiEquipment, FfiLedgerError> {
        let created = self.engine.register_equipment(NewEquipment::new(
            name,
            baseline_running_hours,
            baseline_loaded_hours,
        ))?;
        self.get_equipment(created.id.0)
    }

    pub fn set_equipment_status(
        &self,
        equipment_id: String,
        status: String,
    ) -> Result<FfiEquipment, FfiLedgerError> {
        let status: EquipmentStatus = status.parse().map_err(|err: UnknownVariant| {
            FfiLedgerError::Validation(err.to_string())
        })?;
        let id = EquipmentId(equipment_id);
        self.engine.set_equipment_status(&id, status)?;
        self.get_equipment(id.0)
    }

    pub fn submit_reading(&self, input: FfiReadingInput) -> Result<FfiReading, FfiLedgerError> {
        let mut submission = SubmitReading::new(
            EquipmentId(input.equipment_id),
            parse_date(&input.date)?,
            input.running_hours,
            input.loaded_hours,
        );
        submission.pressure = input.pressure;
        submission.temperature = input.temperature;
        submission.notes = input.notes;
        Ok(self.engine.submit_reading(submission)?.into())
    }

    pub fn delete_reading(
        &self,
        equipment_id: String,
        date: String,
    ) -> Result<FfiReading, FfiLedgerError> {
        let date = parse_date(&date)?;
        Ok(self
            .engine
            .delete_reading(&EquipmentId(equipment_id), date)?
            .into())
    }

    pub fn recalculate(&self, equipment_id: String, from: String) -> Result<u64, FfiLedgerError> {
        let from = parse_date(&from)?;
        let rewritten = self.engine.recalculate(&EquipmentId(equipment_id), from)?;
        Ok(rewritten as u64)
    }

    pub fn list_readings(
        &self,
        equipment_id: String,
        from: Option<String>,
        to: Option<String>,
    ) -> Result<Vec<FfiReading>, FfiLedgerError> {
        let range = parse_range(from, to)?;
        let readings = self.engine.list_readings(&EquipmentId(equipment_id), range)?;
        Ok(readings.into_iter().map(FfiReading::from).collect())
    }

    pub fn get_equipment(&self, equipment_id: String) -> Result<FfiEquipment, FfiLedgerError> {
        Ok(self.engine.get_equipment(&EquipmentId(equipment_id))?.into())
    }

    pub fn list_equipment(&self) -> Result<Vec<FfiEquipment>, FfiLedgerError> {
        self.engine
            .list_equipment()?
            .into_iter()
            .map(|equipment| self.get_equipment(equipment.id.0))
            .collect()
    }

    pub fn refresh_schedule(
        &self,
        equipment_id: String,
    ) -> Result<Option<FfiSchedule>, FfiLedgerError> {
        let schedule = self.engine.refresh_schedule(&EquipmentId(equipment_id))?;
        Ok(schedule.map(FfiSchedule::from))
    }

    pub fn list_service_due(&self) -> Result<Vec<FfiServiceDue>, FfiLedgerError> {
        let due = self.engine.list_service_due()?;
        Ok(due.into_iter().map(FfiServiceDue::from).collect())
    }

    pub fn usage_summary(
        &self,
        equipment_id: String,
        from: Option<String>,
        to: Option<String>,
    ) -> Result<FfiUsageSummary, FfiLedgerError> {
        let range = parse_range(from, to)?;
        Ok(self
            .engine
            .usage_summary(&EquipmentId(equipment_id), range)?
            .into())
    }

    pub fn list_alerts(
        &self,
        equipment_id: Option<String>,
        unresolved_only: bool,
    ) -> Result<Vec<FfiAlert>, FfiLedgerError> {
        let filter = AlertFilter {
            equipment_id: equipment_id.map(EquipmentId),
            unresolved_only,
        };
        let alerts = self.engine.list_alerts(&filter)?;
        Ok(alerts.into_iter().map(FfiAlert::from).collect())
    }
}
