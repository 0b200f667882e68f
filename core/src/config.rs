use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_SERVICE_INTERVALS_HOURS: [u32; 5] = [1_000, 2_000, 4_000, 8_000, 16_000];
pub const DEFAULT_DAILY_USAGE_HOURS: f64 = 8.0;
pub const DEFAULT_HIGH_WITHIN_DAYS: i64 = 7;
pub const DEFAULT_MEDIUM_WITHIN_DAYS: i64 = 30;
pub const DEFAULT_LOOKBACK_DAYS: u32 = 30;
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// How hours remaining are converted into days remaining.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DailyUsage {
    /// Same assumed usage for every equipment.
    Fixed { hours_per_day: f64 },
    /// Average running hours per calendar day over the readings of the last
    /// `lookback_days`, or `fallback_hours_per_day` without enough history.
    HistoricalAverage {
        lookback_days: u32,
        fallback_hours_per_day: f64,
    },
}

impl Default for DailyUsage {
    fn default() -> Self {
        DailyUsage::Fixed {
            hours_per_day: DEFAULT_DAILY_USAGE_HOURS,
        }
    }
}

/// Day counts at or below which a schedule becomes high / medium urgency.
/// Zero or fewer days is always critical.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UrgencyThresholds {
    pub high_within_days: i64,
    pub medium_within_days: i64,
}

impl Default for UrgencyThresholds {
    fn default() -> Self {
        Self {
            high_within_days: DEFAULT_HIGH_WITHIN_DAYS,
            medium_within_days: DEFAULT_MEDIUM_WITHIN_DAYS,
        }
    }
}

/// When a high or critical schedule produces an alert.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertPolicy {
    /// Only when the tier for the same interval rises into high or critical.
    #[default]
    OnEscalation,
    /// On every refresh while the tier stays high or critical.
    EveryRefresh,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LedgerConfig {
    pub service_intervals_hours: Vec<u32>,
    pub daily_usage: DailyUsage,
    pub urgency: UrgencyThresholds,
    pub alert_policy: AlertPolicy,
    pub store_busy_timeout_ms: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            service_intervals_hours: DEFAULT_SERVICE_INTERVALS_HOURS.to_vec(),
            daily_usage: DailyUsage::default(),
            urgency: UrgencyThresholds::default(),
            alert_policy: AlertPolicy::default(),
            store_busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl LedgerConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn with_service_intervals(mut self, hours: impl Into<Vec<u32>>) -> Self {
        self.service_intervals_hours = hours.into();
        self
    }

    pub fn with_daily_usage(mut self, usage: DailyUsage) -> Self {
        self.daily_usage = usage;
        self
    }

    pub fn with_alert_policy(mut self, policy: AlertPolicy) -> Self {
        self.alert_policy = policy;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_intervals_hours.is_empty() {
            return Err(ConfigError::Invalid(
                "service_intervals_hours must not be empty".to_string(),
            ));
        }
        if self.service_intervals_hours.contains(&0) {
            return Err(ConfigError::Invalid(
                "service intervals must be positive".to_string(),
            ));
        }
        if self
            .service_intervals_hours
            .windows(2)
            .any(|pair| pair[0] >= pair[1])
        {
            return Err(ConfigError::Invalid(
                "service intervals must be strictly ascending".to_string(),
            ));
        }

        let usage_ok = |hours: f64| hours.is_finite() && hours > 0.0;
        match &self.daily_usage {
            DailyUsage::Fixed { hours_per_day } if !usage_ok(*hours_per_day) => {
                return Err(ConfigError::Invalid(format!(
                    "hours_per_day must be positive, got {hours_per_day}"
                )));
            }
            DailyUsage::HistoricalAverage {
                lookback_days,
                fallback_hours_per_day,
            } => {
                if *lookback_days == 0 {
                    return Err(ConfigError::Invalid(
                        "lookback_days must be at least 1".to_string(),
                    ));
                }
                if !usage_ok(*fallback_hours_per_day) {
                    return Err(ConfigError::Invalid(format!(
                        "fallback_hours_per_day must be positive, got {fallback_hours_per_day}"
                    )));
                }
            }
            DailyUsage::Fixed { .. } => {}
        }

        let UrgencyThresholds {
            high_within_days,
            medium_within_days,
        } = self.urgency;
        if high_within_days < 0 || medium_within_days < high_within_days {
            return Err(ConfigError::Invalid(format!(
                "urgency thresholds must satisfy \
                 0 <= high ({high_within_days}) <= medium ({medium_within_days})"
            )));
        }
        Ok(())
    }

    /// Smallest configured threshold strictly above `current_hours`.
    pub fn next_service_interval(&self, current_hours: f64) -> Option<u32> {
        self.service_intervals_hours
            .iter()
            .copied()
            .filter(|&threshold| f64::from(threshold) > current_hours)
            .min()
    }
}
