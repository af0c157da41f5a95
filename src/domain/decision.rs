use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Per-domain thresholds (e.g. EV charging, washing machine)
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ThresholdConfig {
    /// Wh per step above which solar alone covers the consumer
    pub pv_threshold: f64,
    /// Wh per step above which solar at least covers the base load
    pub base_load: f64,
    /// Hours above `pv_threshold` needed for abundant solar
    pub pv_time_limit: u32,
    /// Hours above `base_load` needed for partial solar
    pub base_time_limit: u32,
}

/// Operating recommendation for one threshold domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Mode {
    /// Enough surplus to run on solar alone
    AbundantSolar,
    /// Solar covers the base load for a while
    PartialSolar,
    /// Run on grid power
    GridOnly,
}

/// Payload strings published for each mode
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModeLabels {
    #[serde(default = "default_abundant")]
    pub abundant: String,
    #[serde(default = "default_partial")]
    pub partial: String,
    #[serde(default = "default_grid")]
    pub grid: String,
}

fn default_abundant() -> String {
    "green".to_string()
}

fn default_partial() -> String {
    "yellow".to_string()
}

fn default_grid() -> String {
    "red".to_string()
}

impl Default for ModeLabels {
    fn default() -> Self {
        Self {
            abundant: default_abundant(),
            partial: default_partial(),
            grid: default_grid(),
        }
    }
}

impl ModeLabels {
    pub fn label(&self, mode: Mode) -> &str {
        match mode {
            Mode::AbundantSolar => &self.abundant,
            Mode::PartialSolar => &self.partial,
            Mode::GridOnly => &self.grid,
        }
    }
}

/// Aggregate over the evaluation window
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub hours_above_pv: u32,
    pub hours_above_base: u32,
    pub ideal_start: Option<DateTime<Utc>>,
    pub good_start: Option<DateTime<Utc>>,
    pub total_yield_wh: f64,
    pub peak_power_w: f64,
}

impl Prediction {
    /// All-zero prediction for a window without forecast points
    pub fn empty(window_start: DateTime<Utc>, window_end: DateTime<Utc>) -> Self {
        Self {
            window_start,
            window_end,
            hours_above_pv: 0,
            hours_above_base: 0,
            ideal_start: None,
            good_start: None,
            total_yield_wh: 0.0,
            peak_power_w: 0.0,
        }
    }

    pub fn total_yield_kwh(&self) -> f64 {
        self.total_yield_wh / 1000.0
    }
}
