#![allow(dead_code)]

use chrono::NaiveDate;
use hourlog_core::{
    EquipmentId, FixedClock, InMemoryStore, LedgerConfig, LedgerEngine, LedgerStore, NewEquipment,
    SqliteStore, SubmitReading,
};

pub fn date(raw: &str) -> NaiveDate {
    raw.parse().unwrap()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn memory_engine(config: LedgerConfig) -> LedgerEngine<InMemoryStore, FixedClock> {
    init_tracing();
    LedgerEngine::with_clock(InMemoryStore::new(), config, FixedClock::on(date("2024-03-01")))
        .unwrap()
}

pub fn sqlite_engine(config: LedgerConfig) -> LedgerEngine<SqliteStore, FixedClock> {
    init_tracing();
    LedgerEngine::with_clock(
        SqliteStore::in_memory().unwrap(),
        config,
        FixedClock::on(date("2024-03-01")),
    )
    .unwrap()
}

pub fn register<S: LedgerStore>(
    engine: &LedgerEngine<S, FixedClock>,
    name: &str,
    running: f64,
    loaded: f64,
) -> EquipmentId {
    engine
        .register_equipment(NewEquipment::new(name, running, loaded))
        .unwrap()
        .id
}

pub fn reading(id: &EquipmentId, day: &str, running: f64, loaded: f64) -> SubmitReading {
    SubmitReading::new(id.clone(), date(day), running, loaded)
}

/// Runs a scenario against both store adapters.
#[allow(unused_macros)]
macro_rules! for_each_store {
    ($scenario:ident) => {
        mod $scenario {
            use super::*;

            #[test]
            fn in_memory() {
                $scenario(&common::memory_engine(hourlog_core::LedgerConfig::default()));
            }

            #[test]
            fn sqlite() {
                $scenario(&common::sqlite_engine(hourlog_core::LedgerConfig::default()));
            }
        }
    };
}
