//! Decision publishing
//!
//! Each metric goes out as its own message so a consumer can subscribe to just
//! the mode. Sink failures are reported per message and never retried here.

#[cfg(feature = "mqtt")]
pub mod mqtt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::info;

use crate::domain::{Mode, ModeLabels, Prediction};
use crate::error::PublishError;

#[cfg(feature = "mqtt")]
pub use mqtt::MqttSink;

/// Published in place of a start time when the threshold is never exceeded
pub const NO_START: &str = "none";

/// Topic/payload sink, e.g. an MQTT broker
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DecisionSink: Send + Sync {
    async fn publish(&self, topic: &str, payload: &str) -> Result<(), PublishError>;
}

/// Writes every message to the log instead of a broker
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl DecisionSink for LogSink {
    async fn publish(&self, topic: &str, payload: &str) -> Result<(), PublishError> {
        info!(topic, payload, "decision message");
        Ok(())
    }
}

/// JSON document published on `<prefix>/<domain>/summary`
#[derive(Debug, Clone, Serialize)]
pub struct DecisionSummary<'a> {
    pub domain: &'a str,
    pub mode: Mode,
    pub label: &'a str,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub total_yield_kwh: f64,
    pub peak_power_w: f64,
    pub hours_above_pv: u32,
    pub hours_above_base: u32,
    pub ideal_start: Option<DateTime<Utc>>,
    pub good_start: Option<DateTime<Utc>>,
}

/// Builds the topic/payload pairs for one domain decision
#[derive(Debug, Clone)]
pub struct MessageFormatter {
    prefix: String,
    tz: Tz,
}

impl MessageFormatter {
    pub fn new(prefix: &str, tz: Tz) -> Self {
        Self {
            prefix: prefix.trim_end_matches('/').to_string(),
            tz,
        }
    }

    pub fn topic(&self, domain: &str, metric: &str) -> String {
        format!("{}/{}/{}", self.prefix, domain, metric)
    }

    /// Local `HH:MM`, or [`NO_START`]
    pub fn start_time(&self, start: Option<DateTime<Utc>>) -> String {
        start
            .map(|t| t.with_timezone(&self.tz).format("%H:%M").to_string())
            .unwrap_or_else(|| NO_START.to_string())
    }

    pub fn messages(
        &self,
        domain: &str,
        labels: &ModeLabels,
        prediction: &Prediction,
        mode: Mode,
    ) -> Vec<(String, String)> {
        let label = labels.label(mode);
        let summary = DecisionSummary {
            domain,
            mode,
            label,
            window_start: prediction.window_start,
            window_end: prediction.window_end,
            total_yield_kwh: round2(prediction.total_yield_kwh()),
            peak_power_w: prediction.peak_power_w.round(),
            hours_above_pv: prediction.hours_above_pv,
            hours_above_base: prediction.hours_above_base,
            ideal_start: prediction.ideal_start,
            good_start: prediction.good_start,
        };

        let mut out = vec![
            (self.topic(domain, "mode"), label.to_string()),
            (
                self.topic(domain, "yield_kwh"),
                format!("{:.2}", prediction.total_yield_kwh()),
            ),
            (
                self.topic(domain, "peak_w"),
                format!("{:.0}", prediction.peak_power_w),
            ),
            (
                self.topic(domain, "ideal_start"),
                self.start_time(prediction.ideal_start),
            ),
            (
                self.topic(domain, "good_start"),
                self.start_time(prediction.good_start),
            ),
            (
                self.topic(domain, "hours_pv"),
                prediction.hours_above_pv.to_string(),
            ),
            (
                self.topic(domain, "hours_base"),
                prediction.hours_above_base.to_string(),
            ),
        ];
        if let Ok(json) = serde_json::to_string(&summary) {
            out.push((self.topic(domain, "summary"), json));
        }
        out
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
