//! Best-effort maintenance alerts.

use chrono::{DateTime, Utc};

use crate::config::AlertPolicy;
use crate::models::{Alert, AlertSeverity, Equipment, MaintenanceSchedule, NewAlert, Urgency};
use crate::storage::LedgerStore;

/// Whether a refresh that moved a schedule from `previous` to `current`
/// deserves an alert under `policy`.
pub fn should_alert(policy: AlertPolicy, previous: Option<Urgency>, current: Urgency) -> bool {
    if !current.is_alerting() {
        return false;
    }
    match policy {
        AlertPolicy::EveryRefresh => true,
        AlertPolicy::OnEscalation => {
            previous.map_or(true, |before| current.is_more_urgent_than(before))
        }
    }
}

/// Build the alert for an alerting schedule; `None` for medium and low.
pub fn compose(
    equipment: &Equipment,
    schedule: &MaintenanceSchedule,
    at: DateTime<Utc>,
) -> Option<NewAlert> {
    let severity = AlertSeverity::for_urgency(schedule.urgency)?;
    let title = match severity {
        AlertSeverity::Critical => format!(
            "{} service due now for {}",
            schedule.service_interval_hours, equipment.name
        ),
        AlertSeverity::Warning => format!(
            "{} service approaching for {}",
            schedule.service_interval_hours, equipment.name
        ),
    };
    let message = format!(
        "{} is at {:.1} running hours, {:.1} hours ({} days) before the {} hour service due {}.",
        equipment.name,
        schedule.current_hours,
        schedule.hours_remaining,
        schedule.days_remaining,
        schedule.service_interval_hours,
        schedule.next_service_date,
    );
    Some(NewAlert {
        equipment_id: equipment.id.clone(),
        service_interval_hours: schedule.service_interval_hours,
        severity,
        urgency: schedule.urgency,
        title,
        message,
        created_at: at,
    })
}

/// Persist `alert` in its own transaction. Failures are logged and dropped.
pub fn dispatch<S: LedgerStore>(store: &S, alert: NewAlert) -> Option<Alert> {
    let equipment_id = alert.equipment_id.clone();
    match store.transaction(|tx| tx.insert_alert(alert)) {
        Ok(stored) => {
            tracing::info!(
                equipment_id = %stored.equipment_id,
                severity = %stored.severity,
                interval = stored.service_interval_hours,
                "maintenance alert raised"
            );
            Some(stored)
        }
        Err(err) => {
            tracing::warn!(
                equipment_id = %equipment_id,
                error = %err,
                "dropping maintenance alert"
            );
            None
        }
    }
}
