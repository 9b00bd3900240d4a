use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS,
};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::MqttSettings;
use crate::error::MonitorError;
use crate::sink::AlertSink;

const REQUEST_CHANNEL_CAPACITY: usize = 10;
const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

/// MQTT broker session. The event loop is driven on its own task once the
/// broker has accepted the connection.
pub struct MqttSink {
    client: AsyncClient,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl MqttSink {
    /// Connect and wait for the broker's CONNACK, so bad addresses and
    /// rejected credentials fail here rather than on the first publish.
    pub async fn connect(settings: &MqttSettings) -> Result<Self, MonitorError> {
        let client_id = settings
            .client_id
            .clone()
            .unwrap_or_else(|| format!("eq-alert-{}", Uuid::new_v4()));

        let mut options = MqttOptions::new(client_id, &settings.host, settings.port);
        options.set_keep_alive(settings.keep_alive);
        if let Some((username, password)) = &settings.credentials {
            options.set_credentials(username, password);
        }

        info!(
            "Connecting to MQTT server {}:{}...",
            settings.host, settings.port
        );
        let (client, mut event_loop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);
        wait_for_connack(&mut event_loop).await?;
        debug!("MQTT client connected.");

        let driver = tokio::spawn(drive_event_loop(event_loop));
        Ok(Self {
            client,
            driver: Mutex::new(Some(driver)),
        })
    }
}

async fn wait_for_connack(event_loop: &mut EventLoop) -> Result<(), MonitorError> {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    return Ok(());
                }
                return Err(MonitorError::mqtt(format!(
                    "broker refused connection: {:?}",
                    ack.code
                )));
            }
            Ok(_) => {}
            Err(e) => return Err(MonitorError::mqtt(e)),
        }
    }
}

async fn drive_event_loop(mut event_loop: EventLoop) {
    loop {
        match event_loop.poll().await {
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("MQTT disconnect sent");
                break;
            }
            Ok(Event::Incoming(incoming)) => {
                debug!("MQTT incoming: {:?}", incoming);
            }
            Ok(_) => {}
            Err(e) => {
                error!("MQTT error: {}", e);
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

#[async_trait]
impl AlertSink for MqttSink {
    /// Queue the payload without waiting. A full request queue (broker down
    /// and reconnecting) is reported as a publish failure.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), MonitorError> {
        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload)
            .map_err(|e| MonitorError::Publish(e.to_string()))
    }

    async fn disconnect(&self) -> Result<(), MonitorError> {
        let driver = self.driver.lock().take();
        let Some(driver) = driver else {
            return Ok(());
        };

        let requested = self.client.try_disconnect().map_err(MonitorError::mqtt);

        let abort = driver.abort_handle();
        if tokio::time::timeout(DISCONNECT_GRACE, driver).await.is_err() {
            warn!("MQTT event loop did not stop in time, aborting");
            abort.abort();
        }

        requested?;
        info!("MQTT session closed");
        Ok(())
    }
}
