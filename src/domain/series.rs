use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fmt;

use crate::error::ParseError;

/// Forecast station code as used in the MOSMIX single-station paths (e.g. `P444`)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ForecastStation(String);

impl ForecastStation {
    /// Returns `None` for an empty or blank code
    pub fn new(code: impl Into<String>) -> Option<Self> {
        let code = code.into().trim().to_string();
        if code.is_empty() {
            None
        } else {
            Some(Self(code))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ForecastStation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Time-aligned raw irradiance series (kJ/m² accumulated over the preceding hour)
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastSeries {
    timestamps: Vec<DateTime<Utc>>,
    values: Vec<f64>,
}

impl ForecastSeries {
    /// Build a series, rejecting mismatched lengths and out-of-order time steps
    pub fn new(timestamps: Vec<DateTime<Utc>>, values: Vec<f64>) -> Result<Self, ParseError> {
        check_alignment(&timestamps, values.len())?;
        Ok(Self { timestamps, values })
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Derive a yield series point by point; alignment carries over unchanged
    pub fn to_yield(&self, f: impl Fn(f64) -> f64) -> YieldSeries {
        YieldSeries {
            timestamps: self.timestamps.clone(),
            values_wh: self.values.iter().map(|v| f(*v)).collect(),
        }
    }
}

/// Predicted PV energy per forecast step (Wh), aligned with the source timestamps
#[derive(Debug, Clone, PartialEq)]
pub struct YieldSeries {
    timestamps: Vec<DateTime<Utc>>,
    values_wh: Vec<f64>,
}

impl YieldSeries {
    pub fn new(timestamps: Vec<DateTime<Utc>>, values_wh: Vec<f64>) -> Result<Self, ParseError> {
        check_alignment(&timestamps, values_wh.len())?;
        Ok(Self {
            timestamps,
            values_wh,
        })
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn values_wh(&self) -> &[f64] {
        &self.values_wh
    }

    pub fn len(&self) -> usize {
        self.values_wh.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values_wh.is_empty()
    }

    /// Iterate `(timestamp, Wh)` pairs in forecast order
    pub fn points(&self) -> impl Iterator<Item = (DateTime<Utc>, f64)> + '_ {
        self.timestamps
            .iter()
            .copied()
            .zip(self.values_wh.iter().copied())
    }
}

fn check_alignment(timestamps: &[DateTime<Utc>], values: usize) -> Result<(), ParseError> {
    if timestamps.len() != values {
        return Err(ParseError::LengthMismatch {
            timestamps: timestamps.len(),
            values,
        });
    }
    if let Some(index) = timestamps
        .windows(2)
        .position(|w| w[1] < w[0])
        .map(|i| i + 1)
    {
        return Err(ParseError::NonMonotonic { index });
    }
    Ok(())
}

/// PV installation parameters
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct InstallationProfile {
    /// Nameplate peak power (kWp)
    pub peak_power_kw: f64,
    /// Overall system efficiency, in (0, 1]
    pub efficiency: f64,
}

impl InstallationProfile {
    /// Effective collector factor applied to irradiance
    pub fn pvarea(&self) -> f64 {
        self.peak_power_kw * self.efficiency
    }
}
