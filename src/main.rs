use anyhow::Result;
use pv_mode_advisor::{config, controller, forecast, publish, telemetry};
use config::Config;
use controller::{DailyScheduler, Pipeline};
use std::sync::Arc;
use telemetry::init_tracing;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cfg = Config::load()?;
    init_tracing(&cfg.logging);

    let source = Arc::new(forecast::MosmixFetcher::new(
        cfg.station.base_url.clone(),
        cfg.station.http_timeout(),
    )?);

    #[cfg(feature = "mqtt")]
    let (sink, mqtt_task) = {
        let (sink, task) = publish::MqttSink::connect(&cfg.mqtt);
        (Arc::new(sink), task)
    };
    #[cfg(not(feature = "mqtt"))]
    let sink = Arc::new(publish::LogSink);

    let pipeline = Arc::new(Pipeline::new(&cfg, source, sink.clone())?);
    let scheduler = DailyScheduler::new(
        pipeline,
        cfg.schedule.run_at_time()?,
        cfg.schedule.tz()?,
        cfg.schedule.run_on_startup,
    );

    info!(
        station = %cfg.station.code,
        element = %cfg.station.element,
        domains = cfg.domains.len(),
        run_at = %cfg.schedule.run_at,
        timezone = %cfg.schedule.timezone,
        "starting PV mode advisor"
    );

    tokio::select! {
        _ = scheduler.run() => {}
        _ = telemetry::shutdown_signal() => {}
    }

    #[cfg(feature = "mqtt")]
    {
        sink.disconnect().await;
        mqtt_task.abort();
    }

    let status = scheduler.status().await;
    warn!(
        runs = status.run_count,
        failures = status.error_count,
        "shutdown complete"
    );
    Ok(())
}
