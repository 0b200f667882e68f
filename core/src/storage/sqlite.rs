//! `SQLite`-backed ledger store.
//!
//! Each [`LedgerStore::transaction`] runs as one `BEGIN IMMEDIATE` transaction
//! on a single connection. A busy timeout bounds how long a transaction waits
//! for the write lock; expiry surfaces as [`StoreError::Transient`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

use crate::config::DEFAULT_BUSY_TIMEOUT_MS;
use crate::error::StoreError;
use crate::metrics::DailyDelta;
use crate::migrations;
use crate::models::{
    Alert, AlertId, AlertSeverity, Equipment, EquipmentId, EquipmentStatus, MaintenanceSchedule,
    NewAlert, NewEquipment, Reading, ReadingDraft, ReadingId, Urgency,
};
use crate::storage::{AlertFilter, DateRange, LedgerStore, LedgerTx};

macro_rules! sql_text_id {
    ($name:ident) => {
        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                String::column_result(value).map($name)
            }
        }
    };
}

macro_rules! sql_text_enum {
    ($name:ident) => {
        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|err| FromSqlError::Other(Box::new(err)))
            }
        }
    };
}

sql_text_id!(EquipmentId);
sql_text_id!(ReadingId);
sql_text_id!(AlertId);
sql_text_enum!(EquipmentStatus);
sql_text_enum!(Urgency);
sql_text_enum!(AlertSeverity);

const EQUIPMENT_COLUMNS: &str = "id, name, status, baseline_running_hours, baseline_loaded_hours, \
     latest_running_hours, latest_loaded_hours, created_at, updated_at";
const READING_COLUMNS: &str = "id, equipment_id, reading_date, \
     cumulative_running_hours, cumulative_loaded_hours, \
     daily_running_hours, daily_loaded_hours, efficiency_percent, \
     pressure, temperature, notes, created_at, updated_at";
const SCHEDULE_COLUMNS: &str = "equipment_id, service_interval_hours, current_hours, \
     hours_remaining, days_remaining, next_service_date, urgency, refreshed_at";
const ALERT_COLUMNS: &str = "id, equipment_id, service_interval_hours, severity, urgency, \
     title, message, is_read, is_resolved, created_at";

fn equipment_from_row(row: &Row<'_>) -> rusqlite::Result<Equipment> {
    Ok(Equipment {
        id: row.get(0)?,
        name: row.get(1)?,
        status: row.get(2)?,
        baseline_running_hours: row.get(3)?,
        baseline_loaded_hours: row.get(4)?,
        latest_running_hours: row.get(5)?,
        latest_loaded_hours: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn reading_from_row(row: &Row<'_>) -> rusqlite::Result<Reading> {
    Ok(Reading {
        id: row.get(0)?,
        equipment_id: row.get(1)?,
        date: row.get(2)?,
        cumulative_running_hours: row.get(3)?,
        cumulative_loaded_hours: row.get(4)?,
        daily_running_hours: row.get(5)?,
        daily_loaded_hours: row.get(6)?,
        efficiency_percent: row.get(7)?,
        pressure: row.get(8)?,
        temperature: row.get(9)?,
        notes: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

fn schedule_from_row(row: &Row<'_>) -> rusqlite::Result<MaintenanceSchedule> {
    Ok(MaintenanceSchedule {
        equipment_id: row.get(0)?,
        service_interval_hours: row.get(1)?,
        current_hours: row.get(2)?,
        hours_remaining: row.get(3)?,
        days_remaining: row.get(4)?,
        next_service_date: row.get(5)?,
        urgency: row.get(6)?,
        refreshed_at: row.get(7)?,
    })
}

fn alert_from_row(row: &Row<'_>) -> rusqlite::Result<Alert> {
    Ok(Alert {
        id: row.get(0)?,
        equipment_id: row.get(1)?,
        service_interval_hours: row.get(2)?,
        severity: row.get(3)?,
        urgency: row.get(4)?,
        title: row.get(5)?,
        message: row.get(6)?,
        is_read: row.get(7)?,
        is_resolved: row.get(8)?,
        created_at: row.get(9)?,
    })
}

/// The ledger store backed by `SQLite`.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Opens or creates a ledger database at `path`, applying pending
    /// migrations. WAL mode is enabled for concurrent readers.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_with_timeout(path, Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))
    }

    pub fn open_with_timeout(
        path: impl AsRef<Path>,
        busy_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let mut conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        Self::initialize(&mut conn, busy_timeout)?;
        tracing::debug!(path = %path.display(), "opened sqlite ledger store");
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// Creates a private in-memory database.
    pub fn in_memory() -> Result<Self, StoreError> {
        let mut conn = Connection::open_in_memory()?;
        Self::initialize(&mut conn, Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn initialize(conn: &mut Connection, busy_timeout: Duration) -> Result<(), StoreError> {
        conn.busy_timeout(busy_timeout)?;
        conn.pragma_update(None, "foreign_keys", true)?;
        migrations::ensure_schema(conn)?;
        Ok(())
    }
}

impl LedgerStore for SqliteStore {
    fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(&mut dyn LedgerTx) -> Result<T, E>,
    {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StoreError::from)?;
        // Dropping `tx` on the error path rolls back.
        let value = f(&mut SqliteTx { conn: &tx })?;
        tx.commit().map_err(StoreError::from)?;
        Ok(value)
    }
}

struct SqliteTx<'a> {
    conn: &'a Connection,
}

impl SqliteTx<'_> {
    fn reading_where(
        &self,
        clause: &str,
        equipment_id: &EquipmentId,
        date: NaiveDate,
    ) -> Result<Option<Reading>, StoreError> {
        let sql = format!(
            "SELECT {READING_COLUMNS} FROM readings WHERE equipment_id = ?1 AND {clause} LIMIT 1"
        );
        Ok(self
            .conn
            .query_row(&sql, params![equipment_id, date], reading_from_row)
            .optional()?)
    }
}

impl LedgerTx for SqliteTx<'_> {
    fn get_equipment(&mut self, id: &EquipmentId) -> Result<Option<Equipment>, StoreError> {
        let sql = format!("SELECT {EQUIPMENT_COLUMNS} FROM equipment WHERE id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![id], equipment_from_row)
            .optional()?)
    }

    fn list_equipment(&mut self) -> Result<Vec<Equipment>, StoreError> {
        let sql = format!("SELECT {EQUIPMENT_COLUMNS} FROM equipment ORDER BY name ASC, id ASC");
        let mut stmt = self.conn.prepare(&sql)?;
        let equipment = stmt
            .query_map([], equipment_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
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
        self.conn.execute(
            &format!(
                "INSERT INTO equipment ({EQUIPMENT_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
            ),
            params![
                record.id,
                record.name,
                record.status,
                record.baseline_running_hours,
                record.baseline_loaded_hours,
                record.latest_running_hours,
                record.latest_loaded_hours,
                record.created_at,
                record.updated_at,
            ],
        )?;
        Ok(record)
    }

    fn update_equipment(&mut self, equipment: &Equipment) -> Result<(), StoreError> {
        let changed = self.conn.execute(
            "UPDATE equipment
             SET name = ?2, status = ?3, latest_running_hours = ?4,
                 latest_loaded_hours = ?5, updated_at = ?6
             WHERE id = ?1",
            params![
                equipment.id,
                equipment.name,
                equipment.status,
                equipment.latest_running_hours,
                equipment.latest_loaded_hours,
                equipment.updated_at,
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::Constraint(format!(
                "equipment {} does not exist",
                equipment.id
            )));
        }
        Ok(())
    }

    fn get_reading(
        &mut self,
        equipment_id: &EquipmentId,
        date: NaiveDate,
    ) -> Result<Option<Reading>, StoreError> {
        self.reading_where("reading_date = ?2", equipment_id, date)
    }

    fn reading_before(
        &mut self,
        equipment_id: &EquipmentId,
        date: NaiveDate,
    ) -> Result<Option<Reading>, StoreError> {
        self.reading_where(
            "reading_date < ?2 ORDER BY reading_date DESC",
            equipment_id,
            date,
        )
    }

    fn reading_after(
        &mut self,
        equipment_id: &EquipmentId,
        date: NaiveDate,
    ) -> Result<Option<Reading>, StoreError> {
        self.reading_where(
            "reading_date > ?2 ORDER BY reading_date ASC",
            equipment_id,
            date,
        )
    }

    fn latest_reading(
        &mut self,
        equipment_id: &EquipmentId,
    ) -> Result<Option<Reading>, StoreError> {
        let sql = format!(
            "SELECT {READING_COLUMNS} FROM readings
             WHERE equipment_id = ?1 ORDER BY reading_date DESC LIMIT 1"
        );
        Ok(self
            .conn
            .query_row(&sql, params![equipment_id], reading_from_row)
            .optional()?)
    }

    fn list_readings(
        &mut self,
        equipment_id: &EquipmentId,
        range: &DateRange,
    ) -> Result<Vec<Reading>, StoreError> {
        let sql = format!(
            "SELECT {READING_COLUMNS} FROM readings
             WHERE equipment_id = ?1
               AND (?2 IS NULL OR reading_date >= ?2)
               AND (?3 IS NULL OR reading_date <= ?3)
             ORDER BY reading_date ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let readings = stmt
            .query_map(params![equipment_id, range.from, range.to], reading_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(readings)
    }

    fn upsert_reading(&mut self, draft: ReadingDraft) -> Result<Reading, StoreError> {
        self.conn.execute(
            &format!(
                "INSERT INTO readings ({READING_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)
                 ON CONFLICT (equipment_id, reading_date) DO UPDATE SET
                     cumulative_running_hours = excluded.cumulative_running_hours,
                     cumulative_loaded_hours = excluded.cumulative_loaded_hours,
                     daily_running_hours = excluded.daily_running_hours,
                     daily_loaded_hours = excluded.daily_loaded_hours,
                     efficiency_percent = excluded.efficiency_percent,
                     pressure = excluded.pressure,
                     temperature = excluded.temperature,
                     notes = excluded.notes,
                     updated_at = excluded.updated_at"
            ),
            params![
                ReadingId::generate(),
                draft.equipment_id,
                draft.date,
                draft.counters.running,
                draft.counters.loaded,
                draft.delta.daily_running_hours,
                draft.delta.daily_loaded_hours,
                draft.delta.efficiency_percent,
                draft.pressure,
                draft.temperature,
                draft.notes,
                draft.recorded_at,
            ],
        )?;
        self.get_reading(&draft.equipment_id, draft.date)?
            .ok_or_else(|| StoreError::Backend("upserted reading vanished".to_string()))
    }

    fn update_reading_deltas(
        &mut self,
        equipment_id: &EquipmentId,
        date: NaiveDate,
        delta: &DailyDelta,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let changed = self.conn.execute(
            "UPDATE readings
             SET daily_running_hours = ?3, daily_loaded_hours = ?4,
                 efficiency_percent = ?5, updated_at = ?6
             WHERE equipment_id = ?1 AND reading_date = ?2",
            params![
                equipment_id,
                date,
                delta.daily_running_hours,
                delta.daily_loaded_hours,
                delta.efficiency_percent,
                at,
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::Constraint(format!(
                "no reading for {equipment_id} on {date}"
            )));
        }
        Ok(())
    }

    fn delete_reading(
        &mut self,
        equipment_id: &EquipmentId,
        date: NaiveDate,
    ) -> Result<Option<Reading>, StoreError> {
        let existing = self.get_reading(equipment_id, date)?;
        if existing.is_some() {
            self.conn.execute(
                "DELETE FROM readings WHERE equipment_id = ?1 AND reading_date = ?2",
                params![equipment_id, date],
            )?;
        }
        Ok(existing)
    }

    fn get_schedule(
        &mut self,
        equipment_id: &EquipmentId,
        service_interval_hours: u32,
    ) -> Result<Option<MaintenanceSchedule>, StoreError> {
        let sql = format!(
            "SELECT {SCHEDULE_COLUMNS} FROM maintenance_schedules
             WHERE equipment_id = ?1 AND service_interval_hours = ?2"
        );
        Ok(self
            .conn
            .query_row(&sql, params![equipment_id, service_interval_hours], schedule_from_row)
            .optional()?)
    }

    fn upsert_schedule(&mut self, schedule: &MaintenanceSchedule) -> Result<(), StoreError> {
        self.conn.execute(
            &format!(
                "INSERT INTO maintenance_schedules ({SCHEDULE_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT (equipment_id, service_interval_hours) DO UPDATE SET
                     current_hours = excluded.current_hours,
                     hours_remaining = excluded.hours_remaining,
                     days_remaining = excluded.days_remaining,
                     next_service_date = excluded.next_service_date,
                     urgency = excluded.urgency,
                     refreshed_at = excluded.refreshed_at"
            ),
            params![
                schedule.equipment_id,
                schedule.service_interval_hours,
                schedule.current_hours,
                schedule.hours_remaining,
                schedule.days_remaining,
                schedule.next_service_date,
                schedule.urgency,
                schedule.refreshed_at,
            ],
        )?;
        Ok(())
    }

    fn retain_schedule(
        &mut self,
        equipment_id: &EquipmentId,
        keep: Option<u32>,
    ) -> Result<usize, StoreError> {
        let removed = self.conn.execute(
            "DELETE FROM maintenance_schedules
             WHERE equipment_id = ?1 AND (?2 IS NULL OR service_interval_hours <> ?2)",
            params![equipment_id, keep],
        )?;
        Ok(removed)
    }

    fn list_schedules(
        &mut self,
        equipment_id: Option<&EquipmentId>,
    ) -> Result<Vec<MaintenanceSchedule>, StoreError> {
        let sql = format!(
            "SELECT {SCHEDULE_COLUMNS} FROM maintenance_schedules
             WHERE ?1 IS NULL OR equipment_id = ?1
             ORDER BY equipment_id ASC, service_interval_hours ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let schedules = stmt
            .query_map(params![equipment_id], schedule_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(schedules)
    }

    fn insert_alert(&mut self, alert: NewAlert) -> Result<Alert, StoreError> {
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
        self.conn.execute(
            &format!(
                "INSERT INTO alerts ({ALERT_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
            ),
            params![
                record.id,
                record.equipment_id,
                record.service_interval_hours,
                record.severity,
                record.urgency,
                record.title,
                record.message,
                record.is_read,
                record.is_resolved,
                record.created_at,
            ],
        )?;
        Ok(record)
    }

    fn list_alerts(&mut self, filter: &AlertFilter) -> Result<Vec<Alert>, StoreError> {
        let sql = format!(
            "SELECT {ALERT_COLUMNS} FROM alerts
             WHERE (?1 IS NULL OR equipment_id = ?1)
               AND (?2 = 0 OR is_resolved = 0)
             ORDER BY created_at ASC, rowid ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let alerts = stmt
            .query_map(
                params![filter.equipment_id, filter.unresolved_only],
                alert_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(alerts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Counters, NewEquipment};

    fn date(raw: &str) -> NaiveDate {
        raw.parse().unwrap()
    }

    fn draft(equipment_id: &EquipmentId, day: &str, running: f64, loaded: f64) -> ReadingDraft {
        ReadingDraft {
            equipment_id: equipment_id.clone(),
            date: date(day),
            counters: Counters::new(running, loaded),
            delta: DailyDelta::default(),
            pressure: Some(7.5),
            temperature: None,
            notes: Some("shift A".to_string()),
            recorded_at: Utc::now(),
        }
    }

    fn register(store: &SqliteStore, name: &str) -> Equipment {
        store
            .transaction(|tx| tx.insert_equipment(NewEquipment::new(name, 0.0, 0.0), Utc::now()))
            .unwrap()
    }

    #[test]
    fn test_equipment_round_trip() {
        let store = SqliteStore::in_memory().unwrap();
        let created = register(&store, "Compressor A");

        let loaded = store
            .transaction(|tx| tx.get_equipment(&created.id))
            .unwrap()
            .unwrap();
        assert_eq!(loaded.name, "Compressor A");
        assert_eq!(loaded.status, EquipmentStatus::Running);
        assert_eq!(loaded.created_at, created.created_at);
    }

    #[test]
    fn test_upsert_preserves_id_and_created_at() {
        let store = SqliteStore::in_memory().unwrap();
        let equipment = register(&store, "Compressor A");

        let first = store
            .transaction(|tx| tx.upsert_reading(draft(&equipment.id, "2024-01-01", 10.0, 5.0)))
            .unwrap();
        let mut edit = draft(&equipment.id, "2024-01-01", 12.0, 6.0);
        edit.recorded_at = first.created_at + chrono::Duration::minutes(5);
        edit.notes = None;
        let second = store.transaction(|tx| tx.upsert_reading(edit)).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.cumulative_running_hours, 12.0);
        assert_eq!(second.notes, None);
        assert_eq!(second.pressure, Some(7.5));
    }

    #[test]
    fn test_range_queries_are_ordered() {
        let store = SqliteStore::in_memory().unwrap();
        let equipment = register(&store, "Compressor A");
        let id = equipment.id.clone();
        store
            .transaction(|tx| {
                tx.upsert_reading(draft(&id, "2024-01-05", 50.0, 25.0))?;
                tx.upsert_reading(draft(&id, "2024-01-01", 10.0, 5.0))?;
                tx.upsert_reading(draft(&id, "2024-01-03", 30.0, 15.0))?;
                Ok::<_, StoreError>(())
            })
            .unwrap();

        let all = store
            .transaction(|tx| tx.list_readings(&id, &DateRange::all()))
            .unwrap();
        let dates: Vec<_> = all.iter().map(|r| r.date.to_string()).collect();
        assert_eq!(dates, vec!["2024-01-01", "2024-01-03", "2024-01-05"]);

        store
            .transaction(|tx| {
                let window = tx.list_readings(&id, &DateRange::since(date("2024-01-02")))?;
                assert_eq!(window.len(), 2);
                let before = tx.reading_before(&id, date("2024-01-05"))?.unwrap();
                assert_eq!(before.date, date("2024-01-03"));
                let after = tx.reading_after(&id, date("2024-01-01"))?.unwrap();
                assert_eq!(after.date, date("2024-01-03"));
                assert_eq!(tx.latest_reading(&id)?.unwrap().date, date("2024-01-05"));
                Ok::<_, StoreError>(())
            })
            .unwrap();
    }

    #[test]
    fn test_check_constraint_maps_to_constraint_error() {
        let store = SqliteStore::in_memory().unwrap();
        let equipment = register(&store, "Compressor A");
        let mut bad = draft(&equipment.id, "2024-01-01", 10.0, 5.0);
        bad.delta = DailyDelta {
            daily_running_hours: 1.0,
            daily_loaded_hours: 3.0,
            efficiency_percent: 100.0,
        };
        let result = store.transaction(|tx| tx.upsert_reading(bad));
        assert!(matches!(result, Err(StoreError::Constraint(_))));
    }

    #[test]
    fn test_rollback_discards_writes() {
        let store = SqliteStore::in_memory().unwrap();
        let equipment = register(&store, "Compressor A");
        let result: Result<(), StoreError> = store.transaction(|tx| {
            tx.upsert_reading(draft(&equipment.id, "2024-01-01", 10.0, 5.0))?;
            Err(StoreError::Transient("timeout".into()))
        });
        assert!(result.is_err());
        let readings = store
            .transaction(|tx| tx.list_readings(&equipment.id, &DateRange::all()))
            .unwrap();
        assert!(readings.is_empty());
    }

    #[test]
    fn test_alerts_filtered_by_equipment() {
        let store = SqliteStore::in_memory().unwrap();
        let a = register(&store, "Compressor A");
        let b = register(&store, "Compressor B");
        let alert = |equipment_id: &EquipmentId| NewAlert {
            equipment_id: equipment_id.clone(),
            service_interval_hours: 1000,
            severity: AlertSeverity::Warning,
            urgency: Urgency::High,
            title: "service due".to_string(),
            message: "soon".to_string(),
            created_at: Utc::now(),
        };
        store
            .transaction(|tx| {
                tx.insert_alert(alert(&a.id))?;
                tx.insert_alert(alert(&b.id))?;
                Ok::<_, StoreError>(())
            })
            .unwrap();

        let only_a = store
            .transaction(|tx| tx.list_alerts(&AlertFilter::for_equipment(a.id.clone())))
            .unwrap();
        assert_eq!(only_a.len(), 1);
        assert_eq!(only_a[0].severity, AlertSeverity::Warning);
        let all = store
            .transaction(|tx| tx.list_alerts(&AlertFilter::default()))
            .unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_reopen_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        let id = {
            let store = SqliteStore::open(&path).unwrap();
            let equipment = register(&store, "Compressor A");
            store
                .transaction(|tx| tx.upsert_reading(draft(&equipment.id, "2024-01-01", 10.0, 5.0)))
                .unwrap();
            equipment.id
        };

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.path(), Some(path.as_path()));
        let readings = store
            .transaction(|tx| tx.list_readings(&id, &DateRange::all()))
            .unwrap();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].cumulative_running_hours, 10.0);
    }
}
