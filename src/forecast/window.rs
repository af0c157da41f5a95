//! Rolling 24 h aggregation and mode classification
//!
//! The window is the closed interval `[now, now + 24h]`, anchored at the time the
//! run starts. Each MOSMIX step covers one hour, so a step's energy in Wh is also
//! its mean power in W, and counting steps counts hours.

use chrono::{DateTime, Duration, Utc};

use crate::domain::{Mode, Prediction, ThresholdConfig, YieldSeries};

pub const WINDOW_HOURS: i64 = 24;

/// Aggregate the next 24 h of `series` and classify the result.
pub fn evaluate(
    series: &YieldSeries,
    thresholds: &ThresholdConfig,
    now: DateTime<Utc>,
) -> (Prediction, Mode) {
    let window_end = now + Duration::hours(WINDOW_HOURS);
    let mut prediction = Prediction::empty(now, window_end);

    for (ts, wh) in series.points().filter(|(ts, _)| *ts >= now && *ts <= window_end) {
        prediction.total_yield_wh += wh;
        if wh > prediction.peak_power_w {
            prediction.peak_power_w = wh;
        }
        if wh > thresholds.pv_threshold {
            prediction.hours_above_pv += 1;
            prediction.ideal_start.get_or_insert(ts);
        }
        if wh > thresholds.base_load {
            prediction.hours_above_base += 1;
            prediction.good_start.get_or_insert(ts);
        }
    }

    let mode = classify(&prediction, thresholds);
    (prediction, mode)
}

/// Abundant solar wins over partial solar when both limits are met.
pub fn classify(prediction: &Prediction, thresholds: &ThresholdConfig) -> Mode {
    if prediction.hours_above_pv >= thresholds.pv_time_limit {
        Mode::AbundantSolar
    } else if prediction.hours_above_base >= thresholds.base_time_limit {
        Mode::PartialSolar
    } else {
        Mode::GridOnly
    }
}
