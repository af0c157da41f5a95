use crate::domain::{ForecastSeries, YieldSeries};

/// kJ to Wh
pub const KJ_TO_WH: f64 = 1.0 / 3.6;

/// Convert hourly irradiance (kJ/m²) into predicted PV energy (Wh) per step.
///
/// `pvarea` is the installation's effective collector factor
/// (peak power × efficiency); it is validated at startup.
pub fn convert(series: &ForecastSeries, pvarea: f64) -> YieldSeries {
    series.to_yield(|kj| kj * KJ_TO_WH * pvarea)
}
