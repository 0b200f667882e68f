//! Validation and persistence of a single cumulative reading.
//!
//! Everything here runs inside one store transaction handed in by the engine.
//! Cascade and schedule work happen afterwards in their own transactions.

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::{Counter, LedgerError, Result, StoreError, ValidationError};
use crate::metrics::{self, Anchor, Derivation};
use crate::models::{Counters, Equipment, EquipmentId, Reading, ReadingDraft, SubmitReading};
use crate::storage::LedgerTx;

/// Outcome of a reconciled submission.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub reading: Reading,
    /// The submitted loaded counter was pulled down to keep the loaded delta
    /// within the running delta.
    pub loaded_clamped: bool,
    /// The derived fields needed the one-shot repair before the store took them.
    pub repaired: bool,
    /// The reading is now the newest one and `latest_*` was updated.
    pub is_latest: bool,
}

/// Reject non-finite or negative counters and non-finite sensor values.
pub fn validate_submission(
    submission: &SubmitReading,
) -> std::result::Result<(), ValidationError> {
    for (field, value) in [
        ("running hours", submission.running_hours),
        ("loaded hours", submission.loaded_hours),
    ] {
        if !value.is_finite() {
            return Err(ValidationError::NonFinite { field, value });
        }
        if value < 0.0 {
            return Err(ValidationError::Negative { field, value });
        }
    }
    for (field, value) in [
        ("pressure", submission.pressure),
        ("temperature", submission.temperature),
    ] {
        if let Some(value) = value.filter(|v| !v.is_finite()) {
            return Err(ValidationError::NonFinite { field, value });
        }
    }
    Ok(())
}

/// Nearest reading strictly before `date`, or the equipment baseline.
pub fn resolve_anchor(
    tx: &mut dyn LedgerTx,
    equipment: &Equipment,
    date: NaiveDate,
) -> std::result::Result<Anchor, StoreError> {
    Ok(match tx.reading_before(&equipment.id, date)? {
        Some(previous) => Anchor::reading(&previous),
        None => Anchor::baseline(equipment),
    })
}

fn check_regression(
    anchor: &Anchor,
    current: Counters,
) -> std::result::Result<(), ValidationError> {
    for (counter, submitted, anchor_value) in [
        (Counter::Running, current.running, anchor.counters.running),
        (Counter::Loaded, current.loaded, anchor.counters.loaded),
    ] {
        if submitted < anchor_value {
            return Err(ValidationError::Regression {
                counter,
                submitted,
                anchor_value,
                anchor: anchor.point,
            });
        }
    }
    Ok(())
}

/// The persisted counters must not pass the next later reading, otherwise the
/// cascade would have to produce a negative delta for it.
fn check_successor(
    successor: &Reading,
    persisted: Counters,
) -> std::result::Result<(), ValidationError> {
    for (counter, submitted, successor_value) in [
        (
            Counter::Running,
            persisted.running,
            successor.cumulative_running_hours,
        ),
        (
            Counter::Loaded,
            persisted.loaded,
            successor.cumulative_loaded_hours,
        ),
    ] {
        if submitted > successor_value {
            return Err(ValidationError::ExceedsSuccessor {
                counter,
                submitted,
                successor_value,
                successor_date: successor.date,
            });
        }
    }
    Ok(())
}

/// Validate, derive and upsert one reading, then refresh the `latest_*`
/// cache when the reading is the newest for its equipment.
pub fn reconcile(
    tx: &mut dyn LedgerTx,
    submission: SubmitReading,
    at: DateTime<Utc>,
) -> Result<Reconciled> {
    let mut equipment = tx
        .get_equipment(&submission.equipment_id)?
        .ok_or_else(|| LedgerError::EquipmentNotFound(submission.equipment_id.clone()))?;
    validate_submission(&submission)?;

    let current = submission.counters();
    let anchor = resolve_anchor(tx, &equipment, submission.date)?;
    check_regression(&anchor, current)?;

    let derivation = metrics::derive(anchor.counters, current);
    let successor = tx.reading_after(&equipment.id, submission.date)?;
    if let Some(successor) = &successor {
        check_successor(successor, derivation.persisted)?;
    }

    let draft = ReadingDraft {
        equipment_id: submission.equipment_id,
        date: submission.date,
        counters: derivation.persisted,
        delta: derivation.delta,
        pressure: submission.pressure,
        temperature: submission.temperature,
        notes: submission.notes,
        recorded_at: at,
    };
    let (reading, repaired) = persist(tx, draft, anchor.counters, current)?;

    let is_latest = successor.is_none();
    if is_latest {
        equipment.latest_running_hours = reading.cumulative_running_hours;
        equipment.latest_loaded_hours = reading.cumulative_loaded_hours;
        equipment.updated_at = at;
        tx.update_equipment(&equipment)?;
    }

    Ok(Reconciled {
        loaded_clamped: derivation.loaded_clamped,
        reading,
        repaired,
        is_latest,
    })
}

/// Upsert `draft`, repairing its derived fields once if they break an
/// invariant or the store rejects them.
///
/// Returns the stored reading and whether a repair was needed. A second
/// rejection surfaces as [`LedgerError::ConstraintViolation`].
pub fn persist(
    tx: &mut dyn LedgerTx,
    draft: ReadingDraft,
    anchor: Counters,
    current: Counters,
) -> Result<(Reading, bool)> {
    let first_failure = match draft.delta.check() {
        Ok(()) => match tx.upsert_reading(draft.clone()) {
            Ok(reading) => return Ok((reading, false)),
            Err(StoreError::Constraint(detail)) => detail,
            Err(other) => return Err(other.into()),
        },
        Err(breach) => breach.to_string(),
    };

    let Derivation {
        delta, persisted, ..
    } = metrics::realign(anchor, current, draft.delta.repaired());
    tracing::warn!(
        equipment_id = %draft.equipment_id,
        date = %draft.date,
        reason = %first_failure,
        "repairing derived reading fields"
    );

    let violation = |detail: String| LedgerError::ConstraintViolation {
        equipment_id: draft.equipment_id.clone(),
        date: draft.date,
        detail,
    };
    if let Err(breach) = delta.check() {
        return Err(violation(breach.to_string()));
    }
    let retry = ReadingDraft {
        counters: persisted,
        delta,
        ..draft.clone()
    };
    match tx.upsert_reading(retry) {
        Ok(reading) => Ok((reading, true)),
        Err(StoreError::Constraint(detail)) => Err(violation(detail)),
        Err(other) => Err(other.into()),
    }
}

/// Remove the reading for `date` and point `latest_*` at whatever is now the
/// newest reading, or the baseline.
pub fn remove(
    tx: &mut dyn LedgerTx,
    equipment_id: &EquipmentId,
    date: NaiveDate,
    at: DateTime<Utc>,
) -> Result<Reading> {
    let mut equipment = tx
        .get_equipment(equipment_id)?
        .ok_or_else(|| LedgerError::EquipmentNotFound(equipment_id.clone()))?;
    let removed = tx
        .delete_reading(equipment_id, date)?
        .ok_or_else(|| LedgerError::ReadingNotFound {
            equipment_id: equipment_id.clone(),
            date,
        })?;

    let latest = match tx.latest_reading(equipment_id)? {
        Some(reading) => reading.counters(),
        None => equipment.baseline(),
    };
    if latest != equipment.latest() {
        equipment.latest_running_hours = latest.running;
        equipment.latest_loaded_hours = latest.loaded;
        equipment.updated_at = at;
        tx.update_equipment(&equipment)?;
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{AnchorPoint, DailyDelta};
    use crate::models::NewEquipment;
    use crate::storage::{DateRange, InMemoryStore, LedgerStore, StoreOp};

    fn date(raw: &str) -> NaiveDate {
        raw.parse().unwrap()
    }

    fn seeded(baseline_running: f64, baseline_loaded: f64) -> (InMemoryStore, EquipmentId) {
        let store = InMemoryStore::new();
        let equipment = store
            .transaction(|tx| {
                tx.insert_equipment(
                    NewEquipment::new("Compressor A", baseline_running, baseline_loaded),
                    Utc::now(),
                )
            })
            .unwrap();
        (store, equipment.id)
    }

    fn submit(
        store: &InMemoryStore,
        id: &EquipmentId,
        day: &str,
        running: f64,
        loaded: f64,
    ) -> Result<Reconciled> {
        store.transaction(|tx| {
            reconcile(
                tx,
                SubmitReading::new(id.clone(), date(day), running, loaded),
                Utc::now(),
            )
        })
    }

    #[test]
    fn test_first_reading_uses_baseline() {
        let (store, id) = seeded(40.0, 30.0);
        let outcome = submit(&store, &id, "2024-01-01", 100.0, 80.0).unwrap();
        assert_eq!(outcome.reading.daily_running_hours, 60.0);
        assert_eq!(outcome.reading.daily_loaded_hours, 50.0);
        assert_eq!(outcome.reading.efficiency_percent, 83.33);
        assert!(outcome.is_latest);
        assert!(!outcome.repaired);

        let equipment = store
            .transaction(|tx| tx.get_equipment(&id))
            .unwrap()
            .unwrap();
        assert_eq!(equipment.latest(), Counters::new(100.0, 80.0));
    }

    #[test]
    fn test_regression_reports_anchor() {
        let (store, id) = seeded(0.0, 0.0);
        submit(&store, &id, "2024-01-02", 50.0, 30.0).unwrap();
        let err = submit(&store, &id, "2024-01-03", 45.0, 35.0).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Validation(ValidationError::Regression {
                counter: Counter::Running,
                anchor: AnchorPoint::Reading(d),
                ..
            }) if d == date("2024-01-02")
        ));

        let backfill = submit(&store, &id, "2024-01-01", 10.0, 0.0).unwrap();
        assert!(!backfill.is_latest);
    }

    #[test]
    fn test_regression_against_baseline() {
        let (store, id) = seeded(100.0, 50.0);
        let err = submit(&store, &id, "2024-01-01", 90.0, 60.0).unwrap_err();
        assert_eq!(
            err.to_string(),
            "validation failed: running hours 90 regress below 100 from the baseline"
        );
    }

    #[test]
    fn test_successor_bound() {
        let (store, id) = seeded(0.0, 0.0);
        submit(&store, &id, "2024-01-05", 100.0, 60.0).unwrap();
        let err = submit(&store, &id, "2024-01-03", 120.0, 50.0).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Validation(ValidationError::ExceedsSuccessor {
                counter: Counter::Running,
                ..
            })
        ));

        let backfill = submit(&store, &id, "2024-01-03", 70.0, 40.0).unwrap();
        assert!(!backfill.is_latest);
        let equipment = store
            .transaction(|tx| tx.get_equipment(&id))
            .unwrap()
            .unwrap();
        assert_eq!(equipment.latest(), Counters::new(100.0, 60.0));
    }

    #[test]
    fn test_clamped_loaded_is_persisted_realigned() {
        let (store, id) = seeded(100.0, 50.0);
        let outcome = submit(&store, &id, "2024-01-01", 110.0, 75.0).unwrap();
        assert!(outcome.loaded_clamped);
        assert_eq!(outcome.reading.cumulative_loaded_hours, 60.0);
        assert_eq!(outcome.reading.daily_loaded_hours, 10.0);
        assert_eq!(outcome.reading.efficiency_percent, 100.0);
    }

    #[test]
    fn test_rejects_non_finite_and_negative() {
        let (store, id) = seeded(0.0, 0.0);
        let err = submit(&store, &id, "2024-01-01", f64::NAN, 0.0).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Validation(ValidationError::NonFinite { .. })
        ));
        let err = submit(&store, &id, "2024-01-01", 10.0, -1.0).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Validation(ValidationError::Negative { .. })
        ));

        let submission = SubmitReading::new(id, date("2024-01-01"), 1.0, 1.0)
            .with_pressure(f64::INFINITY);
        assert!(matches!(
            validate_submission(&submission),
            Err(ValidationError::NonFinite {
                field: "pressure",
                ..
            })
        ));
    }

    #[test]
    fn test_unknown_equipment() {
        let store = InMemoryStore::new();
        let err = submit(&store, &EquipmentId::from("ghost"), "2024-01-01", 1.0, 1.0).unwrap_err();
        assert!(matches!(err, LedgerError::EquipmentNotFound(_)));
    }

    #[test]
    fn test_persist_repairs_once() {
        let (store, id) = seeded(0.0, 0.0);
        let anchor = Counters::new(0.0, 0.0);
        let current = Counters::new(10.0, 14.0);
        let broken = ReadingDraft {
            equipment_id: id.clone(),
            date: date("2024-01-01"),
            counters: current,
            delta: DailyDelta {
                daily_running_hours: 10.0,
                daily_loaded_hours: 14.0,
                efficiency_percent: 140.0,
            },
            pressure: None,
            temperature: None,
            notes: None,
            recorded_at: Utc::now(),
        };
        let (reading, repaired) = store
            .transaction(|tx| persist(tx, broken, anchor, current))
            .unwrap();
        assert!(repaired);
        assert_eq!(reading.daily_loaded_hours, 10.0);
        assert_eq!(reading.cumulative_loaded_hours, 10.0);
        assert_eq!(reading.efficiency_percent, 100.0);
    }

    #[test]
    fn test_second_rejection_is_a_constraint_violation() {
        let (store, id) = seeded(0.0, 0.0);
        for detail in ["CHECK failed", "CHECK failed again"] {
            store.fail_after_with(
                StoreOp::UpsertReading,
                0,
                StoreError::Constraint(detail.to_string()),
            );
        }

        let err = submit(&store, &id, "2024-01-01", 10.0, 5.0).unwrap_err();
        match err {
            LedgerError::ConstraintViolation {
                equipment_id,
                date: day,
                detail,
            } => {
                assert_eq!(equipment_id, id);
                assert_eq!(day, date("2024-01-01"));
                assert_eq!(detail, "CHECK failed again");
            }
            other => panic!("expected constraint violation, got {other:?}"),
        }
        let readings = store
            .transaction(|tx| tx.list_readings(&id, &DateRange::all()))
            .unwrap();
        assert!(readings.is_empty());
    }

    #[test]
    fn test_single_rejection_is_retried() {
        let (store, id) = seeded(0.0, 0.0);
        store.fail_after_with(
            StoreOp::UpsertReading,
            0,
            StoreError::Constraint("CHECK failed".to_string()),
        );
        let outcome = submit(&store, &id, "2024-01-01", 10.0, 5.0).unwrap();
        assert!(outcome.repaired);
        assert_eq!(outcome.reading.daily_running_hours, 10.0);
        assert_eq!(outcome.reading.efficiency_percent, 50.0);
    }

    #[test]
    fn test_unknown_equipment_wins_over_invalid_values() {
        let store = InMemoryStore::new();
        let ghost = EquipmentId::from("ghost");
        let err = submit(&store, &ghost, "2024-01-01", f64::NAN, -1.0).unwrap_err();
        assert!(matches!(err, LedgerError::EquipmentNotFound(id) if id == ghost));
    }

    #[test]
    fn test_remove_restores_latest() {
        let (store, id) = seeded(5.0, 2.0);
        submit(&store, &id, "2024-01-01", 10.0, 6.0).unwrap();
        submit(&store, &id, "2024-01-02", 20.0, 12.0).unwrap();

        let removed = store
            .transaction(|tx| remove(tx, &id, date("2024-01-02"), Utc::now()))
            .unwrap();
        assert_eq!(removed.cumulative_running_hours, 20.0);
        let equipment = store
            .transaction(|tx| tx.get_equipment(&id))
            .unwrap()
            .unwrap();
        assert_eq!(equipment.latest(), Counters::new(10.0, 6.0));

        store
            .transaction(|tx| remove(tx, &id, date("2024-01-01"), Utc::now()))
            .unwrap();
        let equipment = store
            .transaction(|tx| tx.get_equipment(&id))
            .unwrap()
            .unwrap();
        assert_eq!(equipment.latest(), equipment.baseline());
        let readings = store
            .transaction(|tx| tx.list_readings(&id, &DateRange::all()))
            .unwrap();
        assert!(readings.is_empty());

        let missing = store.transaction(|tx| remove(tx, &id, date("2024-01-01"), Utc::now()));
        assert!(matches!(missing, Err(LedgerError::ReadingNotFound { .. })));
    }
}
