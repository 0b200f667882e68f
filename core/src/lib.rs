pub mod alerts;
pub mod cascade;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod ffi;
pub mod horizon;
pub mod metrics;
pub mod migrations;
pub mod models;
pub mod reconciler;
pub mod storage;

uniffi::setup_scaffolding!();

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{AlertPolicy, DailyUsage, LedgerConfig, UrgencyThresholds};
pub use engine::LedgerEngine;
pub use error::{ConfigError, LedgerError, StoreError, ValidationError};
pub use ffi::{FfiLedgerError, HourLedger};
pub use metrics::{DailyDelta, UsageSummary};
pub use models::{
    Alert, AlertId, AlertSeverity, Counters, Equipment, EquipmentId, EquipmentStatus,
    EquipmentSummary, MaintenanceSchedule, NewEquipment, Reading, ReadingId, ServiceDue,
    SubmitReading, Urgency,
};
pub use storage::{
    AlertFilter, DateRange, InMemoryStore, LedgerStore, LedgerTx, SqliteStore, StoreOp,
};
