//! The ledger engine: the public entry point composing reconciliation, cascade,
//! maintenance horizon and alerting over a [`LedgerStore`].
//!
//! Every mutating operation takes the lock of the equipment it touches, so the
//! reconcile → cascade → refresh sequence for one equipment never interleaves
//! with another writer for the same equipment. Each stage runs in its own store
//! transaction. Once the reading write has committed, a failing follow-up stage
//! is reported as [`LedgerError::PartialCommit`] and the committed reading stays.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use parking_lot::Mutex;

use crate::alerts;
use crate::cascade::{self, CascadeReport};
use crate::clock::{Clock, SystemClock};
use crate::config::LedgerConfig;
use crate::error::{LedgerError, Result, Stage, ValidationError};
use crate::horizon::{self, Refresh};
use crate::metrics::UsageSummary;
use crate::models::{
    Alert, Equipment, EquipmentId, EquipmentStatus, EquipmentSummary, MaintenanceSchedule,
    NewEquipment, Reading, ServiceDue, SubmitReading,
};
use crate::reconciler;
use crate::storage::{AlertFilter, DateRange, LedgerStore, LedgerTx};

/// One mutex per equipment id. An entry lives only while some caller holds
/// or waits on it, so ids that never turn out to exist leave nothing behind.
#[derive(Debug, Default)]
struct EquipmentLocks {
    locks: Mutex<HashMap<EquipmentId, Arc<Mutex<()>>>>,
}

impl EquipmentLocks {
    fn with<T>(&self, id: &EquipmentId, f: impl FnOnce() -> T) -> T {
        let lock = self.locks.lock().entry(id.clone()).or_default().clone();
        let value = {
            let _guard = lock.lock();
            f()
        };
        // Clones are only handed out under the registry lock, so a count of
        // two (registry and ours) means nobody else holds or waits on it.
        let mut locks = self.locks.lock();
        if Arc::strong_count(&lock) == 2 {
            locks.remove(id);
        }
        value
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().len()
    }
}

fn load_equipment(tx: &mut dyn LedgerTx, id: &EquipmentId) -> Result<Equipment> {
    tx.get_equipment(id)?
        .ok_or_else(|| LedgerError::EquipmentNotFound(id.clone()))
}

fn validate_new_equipment(equipment: &NewEquipment) -> std::result::Result<(), ValidationError> {
    if equipment.name.trim().is_empty() {
        return Err(ValidationError::EmptyName);
    }
    for (field, value) in [
        ("baseline running hours", equipment.baseline_running_hours),
        ("baseline loaded hours", equipment.baseline_loaded_hours),
    ] {
        if !value.is_finite() {
            return Err(ValidationError::NonFinite { field, value });
        }
        if value < 0.0 {
            return Err(ValidationError::Negative { field, value });
        }
    }
    if equipment.baseline_loaded_hours > equipment.baseline_running_hours {
        return Err(ValidationError::BaselineLoadedExceedsRunning {
            loaded: equipment.baseline_loaded_hours,
            running: equipment.baseline_running_hours,
        });
    }
    Ok(())
}

pub struct LedgerEngine<S, C = SystemClock> {
    store: S,
    config: LedgerConfig,
    clock: C,
    locks: EquipmentLocks,
}

impl<S: LedgerStore> LedgerEngine<S, SystemClock> {
    pub fn new(store: S, config: LedgerConfig) -> Result<Self> {
        Self::with_clock(store, config, SystemClock)
    }
}

impl<S: LedgerStore, C: Clock> LedgerEngine<S, C> {
    pub fn with_clock(store: S, config: LedgerConfig, clock: C) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            config,
            clock,
            locks: EquipmentLocks::default(),
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Create an equipment and its initial schedule in one transaction.
    pub fn register_equipment(&self, equipment: NewEquipment) -> Result<Equipment> {
        validate_new_equipment(&equipment)?;
        let now = self.clock.now();
        let today = self.clock.today();
        let (created, refresh) = self.store.transaction(|tx| {
            let created = tx.insert_equipment(equipment, now)?;
            let refresh = horizon::refresh(tx, &self.config, &created, now, today)?;
            Ok::<_, LedgerError>((created, refresh))
        })?;
        tracing::info!(
            equipment_id = %created.id,
            name = %created.name,
            baseline_running = created.baseline_running_hours,
            "equipment registered"
        );
        self.maybe_alert(&created, &refresh);
        Ok(created)
    }

    pub fn set_equipment_status(
        &self,
        id: &EquipmentId,
        status: EquipmentStatus,
    ) -> Result<Equipment> {
        self.locks.with(id, || {
            let now = self.clock.now();
            self.store.transaction(|tx| {
                let mut equipment = load_equipment(tx, id)?;
                if equipment.status != status {
                    equipment.status = status;
                    equipment.updated_at = now;
                    tx.update_equipment(&equipment)?;
                }
                Ok(equipment)
            })
        })
    }

    /// Record a cumulative reading, repair every later reading and refresh
    /// the maintenance schedule.
    pub fn submit_reading(&self, submission: SubmitReading) -> Result<Reading> {
        let equipment_id = submission.equipment_id.clone();
        let date = submission.date;
        self.locks.with(&equipment_id, || {
            let now = self.clock.now();
            let reconciled = self
                .store
                .transaction(|tx| reconciler::reconcile(tx, submission, now))?;
            tracing::info!(
                equipment_id = %equipment_id,
                date = %date,
                running = reconciled.reading.cumulative_running_hours,
                loaded = reconciled.reading.cumulative_loaded_hours,
                daily_running = reconciled.reading.daily_running_hours,
                efficiency = reconciled.reading.efficiency_percent,
                loaded_clamped = reconciled.loaded_clamped,
                repaired = reconciled.repaired,
                "reading committed"
            );

            self.follow_up(&equipment_id, date, reconciled.reading)
        })
    }

    /// Remove the reading on `date`, then re-derive the readings after it and
    /// refresh the schedule. Returns the removed reading.
    pub fn delete_reading(&self, id: &EquipmentId, date: NaiveDate) -> Result<Reading> {
        self.locks.with(id, || {
            let now = self.clock.now();
            let removed = self
                .store
                .transaction(|tx| reconciler::remove(tx, id, date, now))?;
            tracing::info!(equipment_id = %id, date = %date, "reading deleted");

            self.follow_up(id, date, removed)
        })
    }

    /// Re-run the cascade from `from` and refresh the schedule. This completes
    /// a submission that ended in [`LedgerError::PartialCommit`]. Returns the
    /// number of readings whose derived fields changed.
    pub fn recalculate(&self, id: &EquipmentId, from: NaiveDate) -> Result<usize> {
        self.locks.with(id, || {
            let report = self.cascade(id, from)?;
            self.refresh_locked(id)?;
            Ok(report.rewritten)
        })
    }

    pub fn refresh_schedule(&self, id: &EquipmentId) -> Result<Option<MaintenanceSchedule>> {
        self.locks.with(id, || self.refresh_locked(id))
    }

    /// Readings in `range`, ascending by date.
    pub fn list_readings(&self, id: &EquipmentId, range: DateRange) -> Result<Vec<Reading>> {
        range.validate()?;
        self.store.transaction(|tx| {
            load_equipment(tx, id)?;
            Ok(tx.list_readings(id, &range)?)
        })
    }

    pub fn get_equipment(&self, id: &EquipmentId) -> Result<EquipmentSummary> {
        self.store.transaction(|tx| {
            let equipment = load_equipment(tx, id)?;
            let schedule = tx.list_schedules(Some(id))?.into_iter().next();
            Ok(EquipmentSummary {
                overall_efficiency_percent: equipment.overall_efficiency_percent(),
                equipment,
                schedule,
            })
        })
    }

    pub fn list_equipment(&self) -> Result<Vec<Equipment>> {
        self.store.transaction(|tx| Ok(tx.list_equipment()?))
    }

    /// Every equipment with a live schedule, most urgent first and then by
    /// hours remaining.
    pub fn list_service_due(&self) -> Result<Vec<ServiceDue>> {
        let (equipment, schedules) = self.store.transaction(|tx| {
            let equipment = tx.list_equipment()?;
            let schedules = tx.list_schedules(None)?;
            Ok::<_, LedgerError>((equipment, schedules))
        })?;

        let names: HashMap<EquipmentId, String> = equipment
            .into_iter()
            .map(|equipment| (equipment.id, equipment.name))
            .collect();
        let mut due: Vec<ServiceDue> = schedules
            .into_iter()
            .filter_map(|schedule| {
                let equipment_name = names.get(&schedule.equipment_id)?.clone();
                Some(ServiceDue {
                    equipment_id: schedule.equipment_id,
                    equipment_name,
                    current_hours: schedule.current_hours,
                    next_service_hours: schedule.service_interval_hours,
                    hours_remaining: schedule.hours_remaining,
                    days_remaining: schedule.days_remaining,
                    next_service_date: schedule.next_service_date,
                    urgency: schedule.urgency,
                })
            })
            .collect();
        due.sort_by(|a, b| {
            a.urgency
                .cmp(&b.urgency)
                .then(a.hours_remaining.total_cmp(&b.hours_remaining))
                .then_with(|| a.equipment_id.cmp(&b.equipment_id))
        });
        Ok(due)
    }

    pub fn usage_summary(&self, id: &EquipmentId, range: DateRange) -> Result<UsageSummary> {
        let readings = self.list_readings(id, range)?;
        Ok(UsageSummary::compute(&readings))
    }

    pub fn list_alerts(&self, filter: &AlertFilter) -> Result<Vec<Alert>> {
        self.store.transaction(|tx| Ok(tx.list_alerts(filter)?))
    }

    /// Cascade and schedule stages after a committed write. Caller holds the
    /// equipment lock.
    fn follow_up(&self, id: &EquipmentId, from: NaiveDate, committed: Reading) -> Result<Reading> {
        if let Err(source) = self.cascade(id, from) {
            return Err(self.partial_commit(Stage::Cascade, committed, source));
        }
        if let Err(source) = self.refresh_locked(id) {
            return Err(self.partial_commit(Stage::Schedule, committed, source));
        }
        Ok(committed)
    }

    fn partial_commit(&self, stage: Stage, committed: Reading, source: LedgerError) -> LedgerError {
        tracing::warn!(
            equipment_id = %committed.equipment_id,
            date = %committed.date,
            stage = %stage,
            error = %source,
            "follow-up stage failed after reading commit"
        );
        LedgerError::PartialCommit {
            stage,
            committed: Box::new(committed),
            source: Box::new(source),
        }
    }

    fn cascade(&self, id: &EquipmentId, from: NaiveDate) -> Result<CascadeReport> {
        let now = self.clock.now();
        self.store.transaction(|tx| {
            let equipment = load_equipment(tx, id)?;
            Ok(cascade::run(tx, &equipment, from, now)?)
        })
    }

    fn refresh_locked(&self, id: &EquipmentId) -> Result<Option<MaintenanceSchedule>> {
        let now = self.clock.now();
        let today = self.clock.today();
        let (equipment, refresh) = self.store.transaction(|tx| {
            let equipment = load_equipment(tx, id)?;
            let refresh = horizon::refresh(tx, &self.config, &equipment, now, today)?;
            Ok::<_, LedgerError>((equipment, refresh))
        })?;
        self.maybe_alert(&equipment, &refresh);
        Ok(refresh.schedule)
    }

    fn maybe_alert(&self, equipment: &Equipment, refresh: &Refresh) {
        let Some(schedule) = &refresh.schedule else {
            return;
        };
        let policy = self.config.alert_policy;
        if !alerts::should_alert(policy, refresh.previous_urgency, schedule.urgency) {
            return;
        }
        if let Some(alert) = alerts::compose(equipment, schedule, self.clock.now()) {
            alerts::dispatch(&self.store, alert);
        }
    }
}
