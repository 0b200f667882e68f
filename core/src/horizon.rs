//! Maintenance horizon: next service threshold, time left and urgency.

use chrono::{DateTime, Days, NaiveDate, Utc};

use crate::config::{DailyUsage, LedgerConfig, UrgencyThresholds};
use crate::error::StoreError;
use crate::metrics;
use crate::models::{Equipment, EquipmentId, MaintenanceSchedule, Urgency};
use crate::storage::{DateRange, LedgerTx};

/// Distance from the current counter to the next service threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Horizon {
    pub service_interval_hours: u32,
    pub hours_remaining: f64,
    pub days_remaining: i64,
    pub urgency: Urgency,
}

impl Horizon {
    /// `None` once `current_hours` has passed every configured threshold.
    pub fn compute(
        config: &LedgerConfig,
        current_hours: f64,
        daily_usage_hours: f64,
    ) -> Option<Self> {
        let service_interval_hours = config.next_service_interval(current_hours)?;
        let hours_remaining = f64::from(service_interval_hours) - current_hours;
        let days_remaining = (hours_remaining / daily_usage_hours).floor() as i64;
        Some(Self {
            service_interval_hours,
            hours_remaining,
            days_remaining,
            urgency: classify(days_remaining, &config.urgency),
        })
    }

    pub fn due_date(&self, today: NaiveDate) -> NaiveDate {
        u64::try_from(self.days_remaining)
            .ok()
            .and_then(|days| today.checked_add_days(Days::new(days)))
            .unwrap_or(if self.days_remaining < 0 {
                today
            } else {
                NaiveDate::MAX
            })
    }
}

pub fn classify(days_remaining: i64, thresholds: &UrgencyThresholds) -> Urgency {
    if days_remaining <= 0 {
        Urgency::Critical
    } else if days_remaining <= thresholds.high_within_days {
        Urgency::High
    } else if days_remaining <= thresholds.medium_within_days {
        Urgency::Medium
    } else {
        Urgency::Low
    }
}

/// Hours of running time assumed per calendar day for `equipment_id`.
pub fn daily_usage_hours(
    tx: &mut dyn LedgerTx,
    usage: &DailyUsage,
    equipment_id: &EquipmentId,
    today: NaiveDate,
) -> Result<f64, StoreError> {
    match usage {
        DailyUsage::Fixed { hours_per_day } => Ok(*hours_per_day),
        DailyUsage::HistoricalAverage {
            lookback_days,
            fallback_hours_per_day,
        } => {
            let since = today
                .checked_sub_days(Days::new(u64::from(*lookback_days)))
                .unwrap_or(NaiveDate::MIN);
            let readings = tx.list_readings(equipment_id, &DateRange::since(since))?;
            Ok(metrics::average_daily_running_hours(&readings).unwrap_or(*fallback_hours_per_day))
        }
    }
}

/// Result of refreshing one equipment's schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct Refresh {
    pub schedule: Option<MaintenanceSchedule>,
    /// Urgency previously stored for the same interval, if any.
    pub previous_urgency: Option<Urgency>,
}

/// Recompute and store the schedule for the equipment's newest running hours.
///
/// Schedules for other intervals of the same equipment are removed, so an
/// equipment past its last threshold ends up with none.
pub fn refresh(
    tx: &mut dyn LedgerTx,
    config: &LedgerConfig,
    equipment: &Equipment,
    now: DateTime<Utc>,
    today: NaiveDate,
) -> Result<Refresh, StoreError> {
    let current_hours = equipment.latest_running_hours;
    let usage = daily_usage_hours(tx, &config.daily_usage, &equipment.id, today)?;

    let Some(horizon) = Horizon::compute(config, current_hours, usage) else {
        let removed = tx.retain_schedule(&equipment.id, None)?;
        tracing::debug!(
            equipment_id = %equipment.id,
            current_hours,
            removed,
            "service thresholds exhausted"
        );
        return Ok(Refresh {
            schedule: None,
            previous_urgency: None,
        });
    };

    let previous_urgency = tx
        .get_schedule(&equipment.id, horizon.service_interval_hours)?
        .map(|schedule| schedule.urgency);
    let schedule = MaintenanceSchedule {
        equipment_id: equipment.id.clone(),
        service_interval_hours: horizon.service_interval_hours,
        current_hours,
        hours_remaining: horizon.hours_remaining,
        days_remaining: horizon.days_remaining,
        next_service_date: horizon.due_date(today),
        urgency: horizon.urgency,
        refreshed_at: now,
    };
    tx.upsert_schedule(&schedule)?;
    tx.retain_schedule(&equipment.id, Some(horizon.service_interval_hours))?;

    tracing::debug!(
        equipment_id = %equipment.id,
        interval = horizon.service_interval_hours,
        hours_remaining = horizon.hours_remaining,
        days_remaining = horizon.days_remaining,
        urgency = %horizon.urgency,
        "schedule refreshed"
    );
    Ok(Refresh {
        schedule: Some(schedule),
        previous_urgency,
    })
}
