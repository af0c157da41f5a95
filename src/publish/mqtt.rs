use async_trait::async_trait;
use rumqttc::{AsyncClient, MqttOptions, QoS};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::DecisionSink;
use crate::config::MqttConfig;
use crate::error::PublishError;

/// Publishes decisions to an MQTT broker.
///
/// The event loop runs on its own task and reconnects on error; messages queued
/// while the broker is down are delivered once it comes back.
#[derive(Debug, Clone)]
pub struct MqttSink {
    client: AsyncClient,
    retain: bool,
}

impl MqttSink {
    pub fn connect(cfg: &MqttConfig) -> (Self, JoinHandle<()>) {
        let mut options = MqttOptions::new(&cfg.client_id, &cfg.host, cfg.port);
        options.set_keep_alive(Duration::from_secs(30));
        if let (Some(username), Some(password)) = (&cfg.username, &cfg.password) {
            options.set_credentials(username, password);
        }
        let (client, mut eventloop) = AsyncClient::new(options, 64);
        let handle = tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(event) => debug!(?event, "mqtt event"),
                    Err(err) => {
                        warn!(error = %err, "mqtt event loop error");
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        });
        (
            Self {
                client,
                retain: cfg.retain,
            },
            handle,
        )
    }

    pub async fn disconnect(&self) {
        if let Err(e) = self.client.disconnect().await {
            debug!(error = %e, "mqtt disconnect failed");
        }
    }
}

#[async_trait]
impl DecisionSink for MqttSink {
    async fn publish(&self, topic: &str, payload: &str) -> Result<(), PublishError> {
        self.client
            .publish(topic, QoS::AtLeastOnce, self.retain, payload.as_bytes().to_vec())
            .await
            .map_err(|e| PublishError::Client {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }
}
