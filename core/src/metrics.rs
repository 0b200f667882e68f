//! Delta and efficiency computation for cumulative hour readings.
//!
//! This module provides pure functions to derive per-day usage from pairs of
//! cumulative counters. All inputs are plain data structures - no database or
//! storage dependencies. The reconciler and the cascade recalculator share
//! these formulas so that a reading derived on submission and the same
//! reading re-derived later always agree.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Counters, Equipment, Reading};

/// Where an anchor's counters came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorPoint {
    /// The equipment's baseline counters at the start of tracking
    Baseline,
    /// A stored reading on the given date
    Reading(NaiveDate),
}

impl fmt::Display for AnchorPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnchorPoint::Baseline => f.write_str("baseline"),
            AnchorPoint::Reading(date) => write!(f, "reading dated {date}"),
        }
    }
}

/// Subtraction basis for a delta: the nearest earlier reading or the baseline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    pub counters: Counters,
    pub point: AnchorPoint,
}

impl Anchor {
    pub fn baseline(equipment: &Equipment) -> Self {
        Self {
            counters: equipment.baseline(),
            point: AnchorPoint::Baseline,
        }
    }

    pub fn reading(reading: &Reading) -> Self {
        Self {
            counters: reading.counters(),
            point: AnchorPoint::Reading(reading.date),
        }
    }
}

/// The derived fields of a reading.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DailyDelta {
    pub daily_running_hours: f64,
    pub daily_loaded_hours: f64,
    pub efficiency_percent: f64,
}

/// A derived-field invariant that does not hold.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvariantBreach {
    #[error("{field} is not a finite number")]
    NonFinite { field: &'static str },

    #[error("daily running hours {0} are negative")]
    NegativeRunning(f64),

    #[error("daily loaded hours {loaded} outside [0, {running}]")]
    LoadedOutOfBounds { loaded: f64, running: f64 },

    #[error("efficiency {0}% outside [0, 100]")]
    EfficiencyOutOfRange(f64),
}

impl DailyDelta {
    /// Delta of `current` against `anchor`.
    ///
    /// Running hours never go below zero and loaded hours are clamped into
    /// `[0, daily_running]`.
    pub fn between(anchor: Counters, current: Counters) -> Self {
        let daily_running_hours = (current.running - anchor.running).max(0.0);
        let daily_loaded_hours = (current.loaded - anchor.loaded).clamp(0.0, daily_running_hours);
        Self {
            daily_running_hours,
            daily_loaded_hours,
            efficiency_percent: efficiency_percent(daily_loaded_hours, daily_running_hours),
        }
    }

    /// Checks `0 <= loaded <= running` and `0 <= efficiency <= 100`.
    pub fn check(&self) -> Result<(), InvariantBreach> {
        for (field, value) in [
            ("daily running hours", self.daily_running_hours),
            ("daily loaded hours", self.daily_loaded_hours),
            ("efficiency", self.efficiency_percent),
        ] {
            if !value.is_finite() {
                return Err(InvariantBreach::NonFinite { field });
            }
        }
        if self.daily_running_hours < 0.0 {
            return Err(InvariantBreach::NegativeRunning(self.daily_running_hours));
        }
        if self.daily_loaded_hours < 0.0 || self.daily_loaded_hours > self.daily_running_hours {
            return Err(InvariantBreach::LoadedOutOfBounds {
                loaded: self.daily_loaded_hours,
                running: self.daily_running_hours,
            });
        }
        if !(0.0..=100.0).contains(&self.efficiency_percent) {
            return Err(InvariantBreach::EfficiencyOutOfRange(self.efficiency_percent));
        }
        Ok(())
    }

    /// Deterministic repair: non-finite values become zero, then every field
    /// is re-clamped and efficiency recomputed.
    pub fn repaired(&self) -> Self {
        let finite_or_zero = |v: f64| if v.is_finite() { v } else { 0.0 };
        let daily_running_hours = finite_or_zero(self.daily_running_hours).max(0.0);
        let daily_loaded_hours =
            finite_or_zero(self.daily_loaded_hours).clamp(0.0, daily_running_hours);
        Self {
            daily_running_hours,
            daily_loaded_hours,
            efficiency_percent: efficiency_percent(daily_loaded_hours, daily_running_hours),
        }
    }
}

/// A delta together with the cumulative values that should be persisted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Derivation {
    pub delta: DailyDelta,
    /// Cumulative counters consistent with `delta`. Loaded hours are pulled
    /// down to `anchor.loaded + daily_loaded` when clamping reduced the delta.
    pub persisted: Counters,
    pub loaded_clamped: bool,
}

/// Derive a new reading's fields from its anchor and the submitted counters.
pub fn derive(anchor: Counters, current: Counters) -> Derivation {
    let delta = DailyDelta::between(anchor, current);
    realign(anchor, current, delta)
}

/// Recompute persisted counters for an already computed (possibly repaired) delta.
pub fn realign(anchor: Counters, current: Counters, delta: DailyDelta) -> Derivation {
    let raw_loaded = current.loaded - anchor.loaded;
    let loaded_clamped = delta.daily_loaded_hours < raw_loaded;
    let persisted = if loaded_clamped {
        Counters::new(current.running, anchor.loaded + delta.daily_loaded_hours)
    } else {
        current
    };
    Derivation {
        delta,
        persisted,
        loaded_clamped,
    }
}

/// `loaded / running * 100`, clamped to `[0, 100]` and rounded to hundredths.
/// Zero when no running hours accrued.
pub fn efficiency_percent(loaded_hours: f64, running_hours: f64) -> f64 {
    if running_hours > 0.0 {
        round_hundredths((loaded_hours / running_hours * 100.0).clamp(0.0, 100.0))
    } else {
        0.0
    }
}

pub fn round_hundredths(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Average running hours per calendar day between the first and last reading.
///
/// Readings must be ascending by date. Returns `None` when the span is shorter
/// than a day or no hours accrued, so callers can fall back to a fixed figure.
pub fn average_daily_running_hours(readings: &[Reading]) -> Option<f64> {
    let (first, last) = (readings.first()?, readings.last()?);
    let days = (last.date - first.date).num_days();
    let hours = last.cumulative_running_hours - first.cumulative_running_hours;
    if days <= 0 || hours <= 0.0 {
        return None;
    }
    Some(hours / days as f64)
}

/// Usage totals over a window of readings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSummary {
    /// Number of readings in the window
    pub reading_count: u64,
    /// First reading date in the window
    pub first_date: Option<NaiveDate>,
    /// Last reading date in the window
    pub last_date: Option<NaiveDate>,
    /// Sum of daily running hours
    pub total_running_hours: f64,
    /// Sum of daily loaded hours
    pub total_loaded_hours: f64,
    /// Loaded share of running hours across the whole window
    pub efficiency_percent: f64,
    /// Mean daily running hours per reading
    pub avg_daily_running_hours: f64,
}

impl UsageSummary {
    pub fn compute(readings: &[Reading]) -> Self {
        let total_running_hours: f64 = readings.iter().map(|r| r.daily_running_hours).sum();
        let total_loaded_hours: f64 = readings.iter().map(|r| r.daily_loaded_hours).sum();
        let avg_daily_running_hours = if readings.is_empty() {
            0.0
        } else {
            total_running_hours / readings.len() as f64
        };

        UsageSummary {
            reading_count: readings.len() as u64,
            first_date: readings.first().map(|r| r.date),
            last_date: readings.last().map(|r| r.date),
            total_running_hours,
            total_loaded_hours,
            efficiency_percent: efficiency_percent(total_loaded_hours, total_running_hours),
            avg_daily_running_hours,
        }
    }
}
