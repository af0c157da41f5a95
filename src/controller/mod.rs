pub mod scheduler;

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{Config, DomainConfig};
use crate::domain::{ForecastStation, InstallationProfile, Mode, Prediction};
use crate::error::{ConfigError, PipelineError};
use crate::forecast::{convert, evaluate, parse_forecast, ForecastSource};
use crate::publish::{DecisionSink, MessageFormatter};

pub use scheduler::{next_run_after, DailyScheduler, TaskStatus};

/// Outcome for one threshold domain
#[derive(Debug, Clone, PartialEq)]
pub struct DomainDecision {
    pub domain: String,
    pub prediction: Prediction,
    pub mode: Mode,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub decisions: Vec<DomainDecision>,
    pub publish_failures: usize,
}

/// Forecast-to-decision pipeline: fetch, parse, convert, classify, publish
pub struct Pipeline {
    station: ForecastStation,
    element: String,
    installation: InstallationProfile,
    domains: Vec<DomainConfig>,
    formatter: MessageFormatter,
    source: Arc<dyn ForecastSource>,
    sink: Arc<dyn DecisionSink>,
}

impl Pipeline {
    pub fn new(
        cfg: &Config,
        source: Arc<dyn ForecastSource>,
        sink: Arc<dyn DecisionSink>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            station: cfg.station.station()?,
            element: cfg.station.element.clone(),
            installation: cfg.installation,
            domains: cfg.domains.clone(),
            formatter: MessageFormatter::new(&cfg.mqtt.topic_prefix, cfg.schedule.tz()?),
            source,
            sink,
        })
    }

    /// Fetch the latest forecast and classify every domain for the window starting at `now`
    pub async fn evaluate(&self, now: DateTime<Utc>) -> Result<Vec<DomainDecision>, PipelineError> {
        let document = self.source.fetch_document(&self.station).await?;
        let series = parse_forecast(&document, &self.element)?;
        let yields = convert(&series, self.installation.pvarea());

        let decisions = self
            .domains
            .iter()
            .map(|domain| {
                let (prediction, mode) = evaluate(&yields, &domain.thresholds, now);
                info!(
                    domain = %domain.name,
                    %mode,
                    hours_above_pv = prediction.hours_above_pv,
                    hours_above_base = prediction.hours_above_base,
                    total_yield_wh = prediction.total_yield_wh,
                    peak_power_w = prediction.peak_power_w,
                    "domain classified"
                );
                DomainDecision {
                    domain: domain.name.clone(),
                    prediction,
                    mode,
                }
            })
            .collect();
        Ok(decisions)
    }

    /// Hand every message to the sink; returns how many were rejected
    pub async fn publish(&self, decisions: &[DomainDecision]) -> usize {
        let mut failures = 0;
        for (decision, domain) in decisions.iter().zip(&self.domains) {
            let messages = self.formatter.messages(
                &decision.domain,
                &domain.labels,
                &decision.prediction,
                decision.mode,
            );
            for (topic, payload) in messages {
                if let Err(e) = self.sink.publish(&topic, &payload).await {
                    warn!(error = %e, %topic, "publish failed");
                    failures += 1;
                }
            }
        }
        failures
    }

    /// One complete run. Nothing is published unless every domain was evaluated.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<RunReport, PipelineError> {
        let decisions = self.evaluate(now).await?;
        let publish_failures = self.publish(&decisions).await;
        info!(
            station = %self.station,
            domains = decisions.len(),
            publish_failures,
            "pipeline run finished"
        );
        Ok(RunReport {
            decisions,
            publish_failures,
        })
    }
}
