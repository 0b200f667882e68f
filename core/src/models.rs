use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::metrics::{self, DailyDelta};

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Fresh random identifier, assigned by a store on insert.
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

string_id!(EquipmentId);
string_id!(ReadingId);
string_id!(AlertId);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} {value:?}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EquipmentStatus {
    Running,
    Standby,
    Maintenance,
    Offline,
}

impl EquipmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EquipmentStatus::Running => "running",
            EquipmentStatus::Standby => "standby",
            EquipmentStatus::Maintenance => "maintenance",
            EquipmentStatus::Offline => "offline",
        }
    }
}

impl fmt::Display for EquipmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EquipmentStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(EquipmentStatus::Running),
            "standby" => Ok(EquipmentStatus::Standby),
            "maintenance" => Ok(EquipmentStatus::Maintenance),
            "offline" => Ok(EquipmentStatus::Offline),
            other => Err(UnknownVariant {
                kind: "equipment status",
                value: other.to_string(),
            }),
        }
    }
}

/// A pair of cumulative hour counters as reported by the equipment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Counters {
    pub running: f64,
    pub loaded: f64,
}

impl Counters {
    pub fn new(running: f64, loaded: f64) -> Self {
        Self { running, loaded }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Equipment {
    pub id: EquipmentId,
    pub name: String,
    pub status: EquipmentStatus,
    pub baseline_running_hours: f64,
    pub baseline_loaded_hours: f64,
    /// Cumulative values of the newest reading, or the baseline when there is none.
    pub latest_running_hours: f64,
    pub latest_loaded_hours: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Equipment {
    pub fn baseline(&self) -> Counters {
        Counters::new(self.baseline_running_hours, self.baseline_loaded_hours)
    }

    pub fn latest(&self) -> Counters {
        Counters::new(self.latest_running_hours, self.latest_loaded_hours)
    }

    pub fn overall_efficiency_percent(&self) -> f64 {
        metrics::efficiency_percent(self.latest_loaded_hours, self.latest_running_hours)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewEquipment {
    pub name: String,
    pub status: EquipmentStatus,
    pub baseline_running_hours: f64,
    pub baseline_loaded_hours: f64,
}

impl NewEquipment {
    pub fn new(
        name: impl Into<String>,
        baseline_running_hours: f64,
        baseline_loaded_hours: f64,
    ) -> Self {
        Self {
            name: name.into(),
            status: EquipmentStatus::Running,
            baseline_running_hours,
            baseline_loaded_hours,
        }
    }

    pub fn with_status(mut self, status: EquipmentStatus) -> Self {
        self.status = status;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub id: ReadingId,
    pub equipment_id: EquipmentId,
    pub date: NaiveDate,
    pub cumulative_running_hours: f64,
    pub cumulative_loaded_hours: f64,
    pub daily_running_hours: f64,
    pub daily_loaded_hours: f64,
    pub efficiency_percent: f64,
    pub pressure: Option<f64>,
    pub temperature: Option<f64>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reading {
    pub fn counters(&self) -> Counters {
        Counters::new(self.cumulative_running_hours, self.cumulative_loaded_hours)
    }

    pub fn delta(&self) -> DailyDelta {
        DailyDelta {
            daily_running_hours: self.daily_running_hours,
            daily_loaded_hours: self.daily_loaded_hours,
            efficiency_percent: self.efficiency_percent,
        }
    }
}

/// A fully derived reading ready to be written. The store assigns the id on
/// first insert and keeps both id and `created_at` when the date already exists.
#[derive(Clone, Debug, PartialEq)]
pub struct ReadingDraft {
    pub equipment_id: EquipmentId,
    pub date: NaiveDate,
    pub counters: Counters,
    pub delta: DailyDelta,
    pub pressure: Option<f64>,
    pub temperature: Option<f64>,
    pub notes: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// A caller's cumulative reading for one equipment and date.
#[derive(Clone, Debug, PartialEq)]
pub struct SubmitReading {
    pub equipment_id: EquipmentId,
    pub date: NaiveDate,
    pub running_hours: f64,
    pub loaded_hours: f64,
    pub pressure: Option<f64>,
    pub temperature: Option<f64>,
    pub notes: Option<String>,
}

impl SubmitReading {
    pub fn new(
        equipment_id: EquipmentId,
        date: NaiveDate,
        running_hours: f64,
        loaded_hours: f64,
    ) -> Self {
        Self {
            equipment_id,
            date,
            running_hours,
            loaded_hours,
            pressure: None,
            temperature: None,
            notes: None,
        }
    }

    pub fn with_pressure(mut self, pressure: f64) -> Self {
        self.pressure = Some(pressure);
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn counters(&self) -> Counters {
        Counters::new(self.running_hours, self.loaded_hours)
    }
}

/// Urgency tiers, declared from most to least urgent so that `Ord` sorts
/// critical first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Critical,
    High,
    Medium,
    Low,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Critical => "critical",
            Urgency::High => "high",
            Urgency::Medium => "medium",
            Urgency::Low => "low",
        }
    }

    pub fn is_alerting(&self) -> bool {
        matches!(self, Urgency::Critical | Urgency::High)
    }

    pub fn is_more_urgent_than(&self, other: Urgency) -> bool {
        *self < other
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Urgency {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "critical" => Ok(Urgency::Critical),
            "high" => Ok(Urgency::High),
            "medium" => Ok(Urgency::Medium),
            "low" => Ok(Urgency::Low),
            other => Err(UnknownVariant {
                kind: "urgency",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceSchedule {
    pub equipment_id: EquipmentId,
    pub service_interval_hours: u32,
    pub current_hours: f64,
    pub hours_remaining: f64,
    pub days_remaining: i64,
    pub next_service_date: NaiveDate,
    pub urgency: Urgency,
    pub refreshed_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Critical,
    Warning,
}

impl AlertSeverity {
    /// Only the alerting tiers map to a severity.
    pub fn for_urgency(urgency: Urgency) -> Option<Self> {
        match urgency {
            Urgency::Critical => Some(AlertSeverity::Critical),
            Urgency::High => Some(AlertSeverity::Warning),
            Urgency::Medium | Urgency::Low => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Critical => "critical",
            AlertSeverity::Warning => "warning",
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertSeverity {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "critical" => Ok(AlertSeverity::Critical),
            "warning" => Ok(AlertSeverity::Warning),
            other => Err(UnknownVariant {
                kind: "alert severity",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub equipment_id: EquipmentId,
    pub service_interval_hours: u32,
    pub severity: AlertSeverity,
    pub urgency: Urgency,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    pub is_resolved: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewAlert {
    pub equipment_id: EquipmentId,
    pub service_interval_hours: u32,
    pub severity: AlertSeverity,
    pub urgency: Urgency,
    pub title: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// One row of the service-due listing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServiceDue {
    pub equipment_id: EquipmentId,
    pub equipment_name: String,
    pub current_hours: f64,
    pub next_service_hours: u32,
    pub hours_remaining: f64,
    pub days_remaining: i64,
    pub next_service_date: NaiveDate,
    pub urgency: Urgency,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EquipmentSummary {
    pub equipment: Equipment,
    pub overall_efficiency_percent: f64,
    pub schedule: Option<MaintenanceSchedule>,
}
