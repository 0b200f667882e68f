mod common;

use chrono::Utc;
use common::{date, reading, register};
use hourlog_core::error::Stage;
use hourlog_core::{
    AlertFilter, DailyDelta, DateRange, FfiLedgerError, LedgerConfig, LedgerError, LedgerStore,
    StoreError, StoreOp, Urgency,
};

#[test]
fn test_cascade_failure_keeps_committed_reading() {
    let engine = common::memory_engine(LedgerConfig::default());
    let id = register(&engine, "Compressor A", 0.0, 0.0);
    engine.submit_reading(reading(&id, "2024-01-01", 10.0, 5.0)).unwrap();
    engine.submit_reading(reading(&id, "2024-01-03", 30.0, 20.0)).unwrap();

    engine.store().fail_after(StoreOp::UpdateReadingDeltas, 0);
    let err = engine
        .submit_reading(reading(&id, "2024-01-02", 20.0, 10.0))
        .unwrap_err();
    assert!(err.is_retryable());
    match &err {
        LedgerError::PartialCommit {
            stage, committed, ..
        } => {
            assert_eq!(*stage, Stage::Cascade);
            assert_eq!(committed.date, date("2024-01-02"));
        }
        other => panic!("expected partial commit, got {other:?}"),
    }

    // The reading is there, the later one still carries its stale delta.
    let readings = engine.list_readings(&id, DateRange::all()).unwrap();
    assert_eq!(readings.len(), 3);
    assert_eq!(readings[2].daily_running_hours, 20.0);

    assert_eq!(engine.recalculate(&id, date("2024-01-02")).unwrap(), 1);
    let readings = engine.list_readings(&id, DateRange::all()).unwrap();
    assert_eq!(readings[2].daily_running_hours, 10.0);
    assert_eq!(readings[2].daily_loaded_hours, 10.0);
    assert_eq!(readings[2].efficiency_percent, 100.0);
}

#[test]
fn test_failed_cascade_writes_nothing() {
    let engine = common::memory_engine(LedgerConfig::default());
    let id = register(&engine, "Compressor A", 0.0, 0.0);
    engine.submit_reading(reading(&id, "2024-01-01", 10.0, 5.0)).unwrap();
    engine.submit_reading(reading(&id, "2024-01-02", 20.0, 10.0)).unwrap();
    engine.submit_reading(reading(&id, "2024-01-03", 30.0, 20.0)).unwrap();

    engine
        .store()
        .transaction(|tx| {
            for day in ["2024-01-02", "2024-01-03"] {
                tx.update_reading_deltas(&id, date(day), &DailyDelta::default(), Utc::now())?;
            }
            Ok::<_, StoreError>(())
        })
        .unwrap();
    let stale = engine.list_readings(&id, DateRange::all()).unwrap();

    // The first rewrite succeeds, the second fails: neither may stick.
    engine.store().fail_after(StoreOp::UpdateReadingDeltas, 1);
    let err = engine.recalculate(&id, date("2024-01-01")).unwrap_err();
    assert!(matches!(err, LedgerError::TransientStore(_)));
    assert_eq!(engine.list_readings(&id, DateRange::all()).unwrap(), stale);

    assert_eq!(engine.recalculate(&id, date("2024-01-01")).unwrap(), 2);
    let repaired = engine.list_readings(&id, DateRange::all()).unwrap();
    assert_eq!(
        repaired[1].delta(),
        DailyDelta::between(repaired[0].counters(), repaired[1].counters())
    );
    assert_eq!(repaired[2].daily_running_hours, 10.0);
    assert_eq!(repaired[2].daily_loaded_hours, 10.0);
    assert_eq!(repaired[2].efficiency_percent, 100.0);
}

#[test]
fn test_schedule_failure_is_reported_and_recoverable() {
    let engine = common::memory_engine(LedgerConfig::default());
    let id = register(&engine, "Compressor A", 0.0, 0.0);

    engine.store().fail_after(StoreOp::UpsertSchedule, 0);
    let err = engine
        .submit_reading(reading(&id, "2024-02-29", 950.0, 700.0))
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::PartialCommit {
            stage: Stage::Schedule,
            ..
        }
    ));
    let stale = engine.get_equipment(&id).unwrap();
    assert_eq!(stale.equipment.latest_running_hours, 950.0);
    assert_eq!(stale.schedule.unwrap().current_hours, 0.0);

    let schedule = engine.refresh_schedule(&id).unwrap().unwrap();
    assert_eq!(schedule.current_hours, 950.0);
    assert_eq!(schedule.urgency, Urgency::High);
}

#[test]
fn test_alert_failure_does_not_roll_back_schedule() {
    let engine = common::memory_engine(LedgerConfig::default());
    let id = register(&engine, "Compressor A", 0.0, 0.0);

    engine.store().fail_after(StoreOp::InsertAlert, 0);
    engine
        .submit_reading(reading(&id, "2024-02-29", 950.0, 700.0))
        .unwrap();

    let schedule = engine.get_equipment(&id).unwrap().schedule.unwrap();
    assert_eq!(schedule.urgency, Urgency::High);
    assert!(engine
        .list_alerts(&AlertFilter::default())
        .unwrap()
        .is_empty());
}

#[test]
fn test_transient_commit_failure_is_retryable() {
    let engine = common::memory_engine(LedgerConfig::default());
    let id = register(&engine, "Compressor A", 0.0, 0.0);

    engine.store().fail_after(StoreOp::Commit, 0);
    let err = engine
        .submit_reading(reading(&id, "2024-01-01", 10.0, 5.0))
        .unwrap_err();
    assert!(matches!(err, LedgerError::TransientStore(_)));
    assert!(err.is_retryable());
    assert!(engine.list_readings(&id, DateRange::all()).unwrap().is_empty());

    let retried = engine
        .submit_reading(reading(&id, "2024-01-01", 10.0, 5.0))
        .unwrap();
    assert_eq!(retried.daily_running_hours, 10.0);
}

#[test]
fn test_repeated_constraint_rejection_commits_nothing() {
    let engine = common::memory_engine(LedgerConfig::default());
    let id = register(&engine, "Compressor A", 0.0, 0.0);
    engine.submit_reading(reading(&id, "2024-01-01", 10.0, 5.0)).unwrap();
    let schedule_before = engine.get_equipment(&id).unwrap().schedule;

    for _ in 0..2 {
        engine.store().fail_after_with(
            StoreOp::UpsertReading,
            0,
            StoreError::Constraint("CHECK constraint failed: readings".to_string()),
        );
    }
    let err = engine
        .submit_reading(reading(&id, "2024-01-02", 20.0, 10.0))
        .unwrap_err();
    assert!(!err.is_retryable());
    match &err {
        LedgerError::ConstraintViolation {
            equipment_id, date: day, ..
        } => {
            assert_eq!(equipment_id, &id);
            assert_eq!(*day, date("2024-01-02"));
        }
        other => panic!("expected constraint violation, got {other:?}"),
    }
    assert!(matches!(
        FfiLedgerError::from(err),
        FfiLedgerError::ConstraintViolation(_)
    ));

    let readings = engine.list_readings(&id, DateRange::all()).unwrap();
    assert_eq!(readings.len(), 1);
    let summary = engine.get_equipment(&id).unwrap();
    assert_eq!(summary.equipment.latest_running_hours, 10.0);
    assert_eq!(summary.schedule, schedule_before);

    // A single rejection is repaired and retried.
    engine.store().fail_after_with(
        StoreOp::UpsertReading,
        0,
        StoreError::Constraint("CHECK constraint failed: readings".to_string()),
    );
    let stored = engine
        .submit_reading(reading(&id, "2024-01-02", 20.0, 10.0))
        .unwrap();
    assert_eq!(stored.daily_running_hours, 10.0);
    assert_eq!(stored.efficiency_percent, 50.0);
}
