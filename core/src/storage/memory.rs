use std::collections::BTreeMap;
use std::ops::Bound;

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::{Mutex, RwLock};

use crate::error::StoreError;
use crate::metrics::DailyDelta;
use crate::models::{
    Alert, AlertId, Equipment, EquipmentId, MaintenanceSchedule, NewAlert, NewEquipment, Reading,
    ReadingDraft, ReadingId,
};
use crate::storage::{AlertFilter, DateRange, LedgerStore, LedgerTx};

/// Store operations that can be made to fail on purpose.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StoreOp {
    UpsertReading,
    UpdateReadingDeltas,
    UpsertSchedule,
    InsertAlert,
    Commit,
}

#[derive(Debug)]
struct Fault {
    op: StoreOp,
    remaining_successes: usize,
    error: StoreError,
}

#[derive(Clone, Debug)]
struct EquipmentSlice {
    equipment: Equipment,
    readings: BTreeMap<NaiveDate, Reading>,
    schedules: BTreeMap<u32, MaintenanceSchedule>,
}

#[derive(Debug, Default)]
struct Tables {
    equipment: BTreeMap<EquipmentId, EquipmentSlice>,
    alerts: Vec<Alert>,
}

/// Ledger store held entirely in memory.
///
/// A transaction copies the slices of the equipment it touches and publishes
/// the modified ones on commit, so transactions on different equipment never
/// wait for each other beyond the brief copy and publish.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    faults: Mutex<Vec<Fault>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let `op` succeed `successes` more times, then fail once with a
    /// transient error.
    pub fn fail_after(&self, op: StoreOp, successes: usize) {
        let error = StoreError::Transient(format!("injected {op:?} failure"));
        self.fail_after_with(op, successes, error);
    }

    /// Like [`fail_after`](Self::fail_after), failing with `error`. Faults
    /// queued for the same operation fire in the order they were added.
    pub fn fail_after_with(&self, op: StoreOp, successes: usize, error: StoreError) {
        self.faults.lock().push(Fault {
            op,
            remaining_successes: successes,
            error,
        });
    }

    fn trip(&self, op: StoreOp) -> Result<(), StoreError> {
        let mut faults = self.faults.lock();
        let Some(index) = faults.iter().position(|fault| fault.op == op) else {
            return Ok(());
        };
        if faults[index].remaining_successes > 0 {
            faults[index].remaining_successes -= 1;
            return Ok(());
        }
        Err(faults.remove(index).error)
    }
}

impl LedgerStore for InMemoryStore {
    fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(&mut dyn LedgerTx) -> Result<T, E>,
    {
        let mut tx = MemoryTx {
            store: self,
            staged: BTreeMap::new(),
            alerts: Vec::new(),
        };
        let value = f(&mut tx)?;
        self.trip(StoreOp::Commit)?;
        tx.commit();
        Ok(value)
    }
}

#[derive(Debug)]
struct Staged {
    slice: EquipmentSlice,
    dirty: bool,
}

struct MemoryTx<'a> {
    store: &'a InMemoryStore,
    staged: BTreeMap<EquipmentId, Staged>,
    alerts: Vec<Alert>,
}

impl MemoryTx<'_> {
    fn load(&mut self, id: &EquipmentId) -> bool {
        if self.staged.contains_key(id) {
            return true;
        }
        let committed = self.store.tables.read().equipment.get(id).cloned();
        match committed {
            Some(slice) => {
                self.staged.insert(id.clone(), Staged { slice, dirty: false });
                true
            }
            None => false,
        }
    }

    fn slice(&mut self, id: &EquipmentId) -> Option<&EquipmentSlice> {
        if self.load(id) {
            self.staged.get(id).map(|staged| &staged.slice)
        } else {
            None
        }
    }

    fn slice_mut(&mut self, id: &EquipmentId) -> Result<&mut EquipmentSlice, StoreError> {
        self.load(id);
        match self.staged.get_mut(id) {
            Some(staged) => {
                staged.dirty = true;
                Ok(&mut staged.slice)
            }
            None => Err(StoreError::Constraint(format!(
                "equipment {id} does not exist"
            ))),
        }
    }

    fn commit(self) {
        let mut tables = self.store.tables.write();
        for (id, staged) in self.staged {
            if staged.dirty {
                tables.equipment.insert(id, staged.slice);
            }
        }
        tables.alerts.extend(self.alerts);
    }
}

fn check_delta(delta: &DailyDelta) -> Result<(), StoreError> {
    delta
        .check()
        .map_err(|breach| StoreError::Constraint(breach.to_string()))
}

impl LedgerTx for MemoryTx<'_> {
    fn get_equipment(&mut self, id: &EquipmentId) -> Result<Option<Equipment>, StoreError> {
        Ok(self.slice(id).map(|slice| slice.equipment.clone()))
    }

    fn list_equipment(&mut self) -> Result<Vec<Equipment>, StoreError> {
        let mut all: BTreeMap<EquipmentId, Equipment> = self
            .store
            .tables
            .read()
            .equipment
            .iter()
            .map(|(id, slice)| (id.clone(), slice.equipment.clone()))
            .collect();
        for (id, staged) in &self.staged {
            all.insert(id.clone(), staged.slice.equipment.clone());
        }
        let mut equipment: Vec<Equipment> = all.into_values().collect();
        equipment.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(equipment)
    }

    fn insert_equipment(
        &mut self,
        equipment: NewEquipment,
        at: DateTime<Utc>,
    ) -> Result<Equipment, StoreError> {
        let record = Equipment {
            id: EquipmentId::generate(),
            name: equipment.name,
            status: equipment.status,
            baseline_running_hours: equipment.baseline_running_hours,
            baseline_loaded_hours: equipment.baseline_loaded_hours,
            latest_running_hours: equipment.baseline_running_hours,
            latest_loaded_hours: equipment.baseline_loaded_hours,
            created_at: at,
            updated_at: at,
        };
        self.staged.insert(
            record.id.clone(),
            Staged {
                slice: EquipmentSlice {
                    equipment: record.clone(),
                    readings: BTreeMap::new(),
                    schedules: BTreeMap::new(),
                },
                dirty: true,
            },
        );
        Ok(record)
    }

    fn update_equipment(&mut self, equipment: &Equipment) -> Result<(), StoreError> {
        let slice = self.slice_mut(&equipment.id)?;
        slice.equipment = equipment.clone();
        Ok(())
    }

    fn get_reading(
        &mut self,
        equipment_id: &EquipmentId,
        date: NaiveDate,
    ) -> Result<Option<Reading>, StoreError> {
        Ok(self
            .slice(equipment_id)
            .and_then(|slice| slice.readings.get(&date).cloned()))
    }

    fn reading_before(
        &mut self,
        equipment_id: &EquipmentId,
        date: NaiveDate,
    ) -> Result<Option<Reading>, StoreError> {
        Ok(self.slice(equipment_id).and_then(|slice| {
            slice
                .readings
                .range(..date)
                .next_back()
                .map(|(_, reading)| reading.clone())
        }))
    }

    fn reading_after(
        &mut self,
        equipment_id: &EquipmentId,
        date: NaiveDate,
    ) -> Result<Option<Reading>, StoreError> {
        Ok(self.slice(equipment_id).and_then(|slice| {
            slice
                .readings
                .range((Bound::Excluded(date), Bound::Unbounded))
                .next()
                .map(|(_, reading)| reading.clone())
        }))
    }

    fn latest_reading(
        &mut self,
        equipment_id: &EquipmentId,
    ) -> Result<Option<Reading>, StoreError> {
        Ok(self
            .slice(equipment_id)
            .and_then(|slice| slice.readings.values().next_back().cloned()))
    }

    fn list_readings(
        &mut self,
        equipment_id: &EquipmentId,
        range: &DateRange,
    ) -> Result<Vec<Reading>, StoreError> {
        if range.validate().is_err() {
            return Ok(Vec::new());
        }
        let lower = range.from.map_or(Bound::Unbounded, Bound::Included);
        let upper = range.to.map_or(Bound::Unbounded, Bound::Included);
        Ok(self
            .slice(equipment_id)
            .map(|slice| {
                slice
                    .readings
                    .range((lower, upper))
                    .map(|(_, reading)| reading.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    fn upsert_reading(&mut self, draft: ReadingDraft) -> Result<Reading, StoreError> {
        self.store.trip(StoreOp::UpsertReading)?;
        check_delta(&draft.delta)?;
        let slice = self.slice_mut(&draft.equipment_id)?;
        let (id, created_at) = match slice.readings.get(&draft.date) {
            Some(existing) => (existing.id.clone(), existing.created_at),
            None => (ReadingId::generate(), draft.recorded_at),
        };
        let reading = Reading {
            id,
            equipment_id: draft.equipment_id,
            date: draft.date,
            cumulative_running_hours: draft.counters.running,
            cumulative_loaded_hours: draft.counters.loaded,
            daily_running_hours: draft.delta.daily_running_hours,
            daily_loaded_hours: draft.delta.daily_loaded_hours,
            efficiency_percent: draft.delta.efficiency_percent,
            pressure: draft.pressure,
            temperature: draft.temperature,
            notes: draft.notes,
            created_at,
            updated_at: draft.recorded_at,
        };
        slice.readings.insert(reading.date, reading.clone());
        Ok(reading)
    }

    fn update_reading_deltas(
        &mut self,
        equipment_id: &EquipmentId,
        date: NaiveDate,
        delta: &DailyDelta,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.store.trip(StoreOp::UpdateReadingDeltas)?;
        check_delta(delta)?;
        let slice = self.slice_mut(equipment_id)?;
        let reading = slice.readings.get_mut(&date).ok_or_else(|| {
            StoreError::Constraint(format!("no reading for {equipment_id} on {date}"))
        })?;
        reading.daily_running_hours = delta.daily_running_hours;
        reading.daily_loaded_hours = delta.daily_loaded_hours;
        reading.efficiency_percent = delta.efficiency_percent;
        reading.updated_at = at;
        Ok(())
    }

    fn delete_reading(
        &mut self,
        equipment_id: &EquipmentId,
        date: NaiveDate,
    ) -> Result<Option<Reading>, StoreError> {
        if self.slice(equipment_id).is_none() {
            return Ok(None);
        }
        let slice = self.slice_mut(equipment_id)?;
        Ok(slice.readings.remove(&date))
    }

    fn get_schedule(
        &mut self,
        equipment_id: &EquipmentId,
        service_interval_hours: u32,
    ) -> Result<Option<MaintenanceSchedule>, StoreError> {
        Ok(self
            .slice(equipment_id)
            .and_then(|slice| slice.schedules.get(&service_interval_hours).cloned()))
    }

    fn upsert_schedule(&mut self, schedule: &MaintenanceSchedule) -> Result<(), StoreError> {
        self.store.trip(StoreOp::UpsertSchedule)?;
        let slice = self.slice_mut(&schedule.equipment_id)?;
        slice
            .schedules
            .insert(schedule.service_interval_hours, schedule.clone());
        Ok(())
    }

    fn retain_schedule(
        &mut self,
        equipment_id: &EquipmentId,
        keep: Option<u32>,
    ) -> Result<usize, StoreError> {
        let slice = self.slice_mut(equipment_id)?;
        let before = slice.schedules.len();
        slice
            .schedules
            .retain(|interval, _| Some(*interval) == keep);
        Ok(before - slice.schedules.len())
    }

    fn list_schedules(
        &mut self,
        equipment_id: Option<&EquipmentId>,
    ) -> Result<Vec<MaintenanceSchedule>, StoreError> {
        if let Some(id) = equipment_id {
            return Ok(self
                .slice(id)
                .map(|slice| slice.schedules.values().cloned().collect())
                .unwrap_or_default());
        }
        let mut all: BTreeMap<EquipmentId, Vec<MaintenanceSchedule>> = self
            .store
            .tables
            .read()
            .equipment
            .iter()
            .map(|(id, slice)| (id.clone(), slice.schedules.values().cloned().collect()))
            .collect();
        for (id, staged) in &self.staged {
            all.insert(
                id.clone(),
                staged.slice.schedules.values().cloned().collect(),
            );
        }
        Ok(all.into_values().flatten().collect())
    }

    fn insert_alert(&mut self, alert: NewAlert) -> Result<Alert, StoreError> {
        self.store.trip(StoreOp::InsertAlert)?;
        if self.slice(&alert.equipment_id).is_none() {
            return Err(StoreError::Constraint(format!(
                "equipment {} does not exist",
                alert.equipment_id
            )));
        }
        let record = Alert {
            id: AlertId::generate(),
            equipment_id: alert.equipment_id,
            service_interval_hours: alert.service_interval_hours,
            severity: alert.severity,
            urgency: alert.urgency,
            title: alert.title,
            message: alert.message,
            is_read: false,
            is_resolved: false,
            created_at: alert.created_at,
        };
        self.alerts.push(record.clone());
        Ok(record)
    }

    fn list_alerts(&mut self, filter: &AlertFilter) -> Result<Vec<Alert>, StoreError> {
        let committed = self.store.tables.read().alerts.clone();
        Ok(committed
            .into_iter()
            .chain(self.alerts.iter().cloned())
            .filter(|alert| filter.matches(alert))
            .collect())
    }
}
