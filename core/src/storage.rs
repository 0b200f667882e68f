pub mod memory;
pub mod sqlite;

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::{StoreError, ValidationError};
use crate::metrics::DailyDelta;
use crate::models::{
    Alert, Equipment, EquipmentId, MaintenanceSchedule, NewAlert, NewEquipment, Reading,
    ReadingDraft,
};

pub use memory::{InMemoryStore, StoreOp};
pub use sqlite::SqliteStore;

/// Inclusive date window; an open end is unbounded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn since(from: NaiveDate) -> Self {
        Self {
            from: Some(from),
            to: None,
        }
    }

    pub fn until(to: NaiveDate) -> Self {
        Self {
            from: None,
            to: Some(to),
        }
    }

    pub fn between(from: NaiveDate, to: NaiveDate) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from.map_or(true, |from| date >= from) && self.to.map_or(true, |to| date <= to)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match (self.from, self.to) {
            (Some(from), Some(to)) if from > to => Err(ValidationError::InvertedRange { from, to }),
            _ => Ok(()),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AlertFilter {
    pub equipment_id: Option<EquipmentId>,
    pub unresolved_only: bool,
}

impl AlertFilter {
    pub fn for_equipment(equipment_id: EquipmentId) -> Self {
        Self {
            equipment_id: Some(equipment_id),
            unresolved_only: false,
        }
    }

    pub fn matches(&self, alert: &Alert) -> bool {
        self.equipment_id
            .as_ref()
            .map_or(true, |id| *id == alert.equipment_id)
            && !(self.unresolved_only && alert.is_resolved)
    }
}

/// Operations available inside one store transaction.
///
/// Reading lists are always ascending by date. Writes become visible to other
/// transactions only when the enclosing [`LedgerStore::transaction`] commits.
pub trait LedgerTx {
    fn get_equipment(&mut self, id: &EquipmentId) -> Result<Option<Equipment>, StoreError>;
    fn list_equipment(&mut self) -> Result<Vec<Equipment>, StoreError>;
    fn insert_equipment(
        &mut self,
        equipment: NewEquipment,
        at: DateTime<Utc>,
    ) -> Result<Equipment, StoreError>;
    fn update_equipment(&mut self, equipment: &Equipment) -> Result<(), StoreError>;

    fn get_reading(
        &mut self,
        equipment_id: &EquipmentId,
        date: NaiveDate,
    ) -> Result<Option<Reading>, StoreError>;
    /// Reading with the largest date strictly before `date`.
    fn reading_before(
        &mut self,
        equipment_id: &EquipmentId,
        date: NaiveDate,
    ) -> Result<Option<Reading>, StoreError>;
    /// Reading with the smallest date strictly after `date`.
    fn reading_after(
        &mut self,
        equipment_id: &EquipmentId,
        date: NaiveDate,
    ) -> Result<Option<Reading>, StoreError>;
    fn latest_reading(&mut self, equipment_id: &EquipmentId) -> Result<Option<Reading>, StoreError>;
    fn list_readings(
        &mut self,
        equipment_id: &EquipmentId,
        range: &DateRange,
    ) -> Result<Vec<Reading>, StoreError>;
    /// Insert or replace the reading for `(equipment_id, date)`. An existing
    /// reading keeps its id and `created_at`.
    fn upsert_reading(&mut self, draft: ReadingDraft) -> Result<Reading, StoreError>;
    /// Rewrite only the derived fields of an existing reading.
    fn update_reading_deltas(
        &mut self,
        equipment_id: &EquipmentId,
        date: NaiveDate,
        delta: &DailyDelta,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
    fn delete_reading(
        &mut self,
        equipment_id: &EquipmentId,
        date: NaiveDate,
    ) -> Result<Option<Reading>, StoreError>;

    fn get_schedule(
        &mut self,
        equipment_id: &EquipmentId,
        service_interval_hours: u32,
    ) -> Result<Option<MaintenanceSchedule>, StoreError>;
    fn upsert_schedule(&mut self, schedule: &MaintenanceSchedule) -> Result<(), StoreError>;
    /// Delete every schedule of the equipment except the one for `keep`.
    /// Returns the number of removed schedules.
    fn retain_schedule(
        &mut self,
        equipment_id: &EquipmentId,
        keep: Option<u32>,
    ) -> Result<usize, StoreError>;
    fn list_schedules(
        &mut self,
        equipment_id: Option<&EquipmentId>,
    ) -> Result<Vec<MaintenanceSchedule>, StoreError>;

    fn insert_alert(&mut self, alert: NewAlert) -> Result<Alert, StoreError>;
    fn list_alerts(&mut self, filter: &AlertFilter) -> Result<Vec<Alert>, StoreError>;
}

/// A persistent home for the ledger.
///
/// `transaction` commits when the closure returns `Ok` and rolls back every
/// write of the closure otherwise. Transactions touching the same equipment
/// must be serialized by the caller; the engine does this with a
/// per-equipment lock.
pub trait LedgerStore: Send + Sync {
    fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(&mut dyn LedgerTx) -> Result<T, E>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(raw: &str) -> NaiveDate {
        raw.parse().unwrap()
    }

    #[test]
    fn test_date_range_contains() {
        let range = DateRange::between(date("2024-01-02"), date("2024-01-04"));
        assert!(!range.contains(date("2024-01-01")));
        assert!(range.contains(date("2024-01-02")));
        assert!(range.contains(date("2024-01-04")));
        assert!(!range.contains(date("2024-01-05")));
        assert!(DateRange::all().contains(date("1999-12-31")));
        assert!(DateRange::until(date("2024-01-04")).contains(date("2020-01-01")));
    }

    #[test]
    fn test_inverted_range_rejected() {
        let range = DateRange::between(date("2024-02-01"), date("2024-01-01"));
        assert!(matches!(
            range.validate(),
            Err(ValidationError::InvertedRange { .. })
        ));
        assert!(DateRange::since(date("2024-02-01")).validate().is_ok());
    }
}
