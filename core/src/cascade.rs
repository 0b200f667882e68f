//! Re-derivation of delta fields for readings after an edit point.
//!
//! The cascade is a left fold over the readings that follow date `D`: each
//! reading is diffed against the one before it and becomes the anchor for the
//! next. Cumulative counters are never touched, so running it twice yields the
//! same ledger as running it once.

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::StoreError;
use crate::metrics::{Anchor, DailyDelta};
use crate::models::{Counters, Equipment, Reading};
use crate::storage::{DateRange, LedgerTx};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CascadeReport {
    /// Readings after the edit point
    pub examined: usize,
    /// Readings whose derived fields changed and were written back
    pub rewritten: usize,
}

/// Deltas for `readings` (ascending) folded from `anchor`.
pub fn recompute(anchor: Counters, readings: &[Reading]) -> Vec<DailyDelta> {
    readings
        .iter()
        .scan(anchor, |previous, reading| {
            let current = reading.counters();
            let delta = DailyDelta::between(*previous, current);
            *previous = current;
            Some(delta)
        })
        .collect()
}

/// Anchor for a cascade starting after `from`: the reading on `from`, else the
/// nearest earlier one, else the baseline.
pub fn resolve_anchor(
    tx: &mut dyn LedgerTx,
    equipment: &Equipment,
    from: NaiveDate,
) -> Result<Anchor, StoreError> {
    if let Some(reading) = tx.get_reading(&equipment.id, from)? {
        return Ok(Anchor::reading(&reading));
    }
    Ok(match tx.reading_before(&equipment.id, from)? {
        Some(previous) => Anchor::reading(&previous),
        None => Anchor::baseline(equipment),
    })
}

/// Rewrite the derived fields of every reading dated after `from`.
pub fn run(
    tx: &mut dyn LedgerTx,
    equipment: &Equipment,
    from: NaiveDate,
    at: DateTime<Utc>,
) -> Result<CascadeReport, StoreError> {
    let anchor = resolve_anchor(tx, equipment, from)?;
    let later: Vec<Reading> = tx
        .list_readings(&equipment.id, &DateRange::since(from))?
        .into_iter()
        .filter(|reading| reading.date > from)
        .collect();

    let mut report = CascadeReport {
        examined: later.len(),
        rewritten: 0,
    };
    for (reading, delta) in later.iter().zip(recompute(anchor.counters, &later)) {
        if reading.delta() == delta {
            continue;
        }
        tx.update_reading_deltas(&equipment.id, reading.date, &delta, at)?;
        report.rewritten += 1;
    }

    tracing::debug!(
        equipment_id = %equipment.id,
        from = %from,
        anchor = %anchor.point,
        examined = report.examined,
        rewritten = report.rewritten,
        "cascade recalculated"
    );
    Ok(report)
}
