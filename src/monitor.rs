use std::future::Future;

use tracing::{debug, error, info, warn};

use crate::config::{Config, MqttSettings, TelegramSettings};
use crate::error::MonitorError;
use crate::magnitude::MagnitudeExtractor;
use crate::platform::telegram::TelegramSource;
use crate::platform::{ChatId, ChatSource, Dialog, IncomingMessage};
use crate::rate_limit::RateLimiter;
use crate::sink::mqtt::MqttSink;
use crate::sink::{AlertPayload, AlertSink};

/// Rate-limiter key for the message handler. One key for the whole stream,
/// so messages from different chats share the same window.
const MESSAGE_HANDLER: &str = "message_handler";

/// A configured chat name resolved against the account's dialogs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedChat {
    pub name: String,
    pub id: ChatId,
}

/// The set of chats whose messages are inspected for alerts
#[derive(Debug, Clone, Default)]
pub struct WatchedChats {
    chats: Vec<WatchedChat>,
}

impl WatchedChats {
    /// Match configured names against dialog names exactly. Every dialog with
    /// a matching name is watched; names matching nothing are logged and
    /// skipped.
    pub fn resolve(names: &[String], dialogs: &[Dialog]) -> Self {
        let chats: Vec<WatchedChat> = dialogs
            .iter()
            .filter(|dialog| names.contains(&dialog.name))
            .map(|dialog| {
                debug!("Monitoring: {} ({})", dialog.name, dialog.id);
                WatchedChat {
                    name: dialog.name.clone(),
                    id: dialog.id,
                }
            })
            .collect();

        for name in names {
            if !chats.iter().any(|chat| &chat.name == name) {
                warn!("Configured chat '{}' matches no dialog, ignoring it", name);
            }
        }

        Self { chats }
    }

    pub fn contains(&self, id: ChatId) -> bool {
        self.chats.iter().any(|chat| chat.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.chats.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WatchedChat> {
        self.chats.iter()
    }
}

/// Relays magnitudes found in watched Telegram chats to an MQTT topic.
pub struct EarthquakeMonitor {
    chat_names: Vec<String>,
    topic: String,
    extractor: MagnitudeExtractor,
    limiter: RateLimiter,
    telegram: TelegramSettings,
    mqtt: MqttSettings,
}

impl EarthquakeMonitor {
    /// Validate `config` and build the monitor from it. Nothing connects yet.
    pub fn new(config: &Config) -> Result<Self, MonitorError> {
        config.validate()?;
        if config.debug {
            debug!("Debug mode enabled.");
        }
        Ok(Self {
            chat_names: config.chat_names.clone(),
            topic: config.mqtt_topic.clone(),
            extractor: MagnitudeExtractor::new(&config.trigger_word, config.max_word_distance),
            limiter: RateLimiter::new(config.alert_interval()),
            telegram: config.telegram(),
            mqtt: config.mqtt(),
        })
    }

    /// Open the Telegram and MQTT sessions, then watch until the Telegram
    /// session ends or `shutdown` completes. Both sessions are closed before
    /// this returns.
    pub async fn start<F>(&self, shutdown: F) -> Result<(), MonitorError>
    where
        F: Future<Output = ()>,
    {
        info!("Configuring Telegram client...");
        self.start_with(
            TelegramSource::connect(&self.telegram),
            MqttSink::connect(&self.mqtt),
            shutdown,
        )
        .await
    }

    /// Open the chat session, then the broker session, then run. If the
    /// broker cannot be reached the chat session is closed before the error
    /// is returned.
    pub async fn start_with<C, A, CF, AF, F>(
        &self,
        connect_chat: CF,
        connect_sink: AF,
        shutdown: F,
    ) -> Result<(), MonitorError>
    where
        C: ChatSource,
        A: AlertSink,
        CF: Future<Output = Result<C, MonitorError>>,
        AF: Future<Output = Result<A, MonitorError>>,
        F: Future<Output = ()>,
    {
        let mut source = connect_chat.await?;

        let sink = match connect_sink.await {
            Ok(sink) => sink,
            Err(e) => {
                if let Err(close_err) = source.disconnect().await {
                    warn!("Failed to close Telegram session: {}", close_err);
                }
                return Err(e);
            }
        };

        self.run(source, sink, shutdown).await
    }

    /// Watch `source` and publish to `sink` with both sessions already open.
    pub async fn run<C, A, F>(&self, mut source: C, sink: A, shutdown: F) -> Result<(), MonitorError>
    where
        C: ChatSource,
        A: AlertSink,
        F: Future<Output = ()>,
    {
        let outcome = self.watch(&mut source, &sink, shutdown).await;
        close_sessions(&mut source, &sink).await;
        outcome
    }

    async fn watch<C, A, F>(&self, source: &mut C, sink: &A, shutdown: F) -> Result<(), MonitorError>
    where
        C: ChatSource,
        A: AlertSink,
        F: Future<Output = ()>,
    {
        let dialogs = source.dialogs().await?;
        let watched = WatchedChats::resolve(&self.chat_names, &dialogs);
        if watched.is_empty() {
            warn!("None of the configured chats were found, no alerts will be published");
        }

        let ids: Vec<String> = watched.iter().map(|chat| chat.id.to_string()).collect();
        info!("Listening for messages in chats: {}", ids.join(", "));

        tokio::pin!(shutdown);
        loop {
            let message = tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping monitor");
                    return Ok(());
                }
                next = source.next_message() => match next? {
                    Some(message) => message,
                    None => {
                        info!("Telegram session disconnected");
                        return Ok(());
                    }
                },
            };

            // A stalled publish must not hold off shutdown.
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested while handling a message, stopping monitor");
                    return Ok(());
                }
                _ = self.handle_incoming_message(&watched, sink, &message) => {}
            }
        }
    }

    /// Rate-limited entry point for every incoming message.
    pub async fn handle_incoming_message<A>(
        &self,
        watched: &WatchedChats,
        sink: &A,
        message: &IncomingMessage,
    ) where
        A: AlertSink,
    {
        let handled = self
            .limiter
            .guard(MESSAGE_HANDLER, || self.process_message(watched, sink, message))
            .await;
        if handled.is_none() {
            debug!(
                "Dropped message in {} received at {}",
                message.chat_id, message.received_at
            );
        }
    }

    async fn process_message<A>(&self, watched: &WatchedChats, sink: &A, message: &IncomingMessage)
    where
        A: AlertSink,
    {
        info!("Received message in {}: {}", message.chat_id, message.text);
        if !watched.contains(message.chat_id) {
            return;
        }

        info!("Earthquake alert received.");
        let Some(magnitude) = self.extractor.extract(&message.text) else {
            debug!("No magnitude found in message");
            return;
        };

        let payload = AlertPayload::new(magnitude, &message.text);
        if let Err(e) = self.publish(sink, &payload).await {
            error!("Failed to publish alert: {}", e);
        }
    }

    async fn publish<A>(&self, sink: &A, payload: &AlertPayload) -> Result<(), MonitorError>
    where
        A: AlertSink,
    {
        let bytes = payload.to_bytes()?;
        info!("Publishing to MQTT: {}", String::from_utf8_lossy(&bytes));
        sink.publish(&self.topic, bytes).await
    }
}

/// Close both sessions. Failures are logged and do not stop the other close.
async fn close_sessions<C, A>(source: &mut C, sink: &A)
where
    C: ChatSource,
    A: AlertSink,
{
    let (chat, broker) = tokio::join!(source.disconnect(), sink.disconnect());
    if let Err(e) = chat {
        warn!("Failed to close Telegram session: {}", e);
    }
    if let Err(e) = broker {
        warn!("Failed to close MQTT session: {}", e);
    }
}
