use async_trait::async_trait;
use chrono::Utc;
use grammers_client::{Client, Config as ClientConfig, InitParams, Update};
use grammers_session::Session;
use tracing::{debug, info};

use crate::config::TelegramSettings;
use crate::error::MonitorError;
use crate::platform::{ChatSource, Dialog, IncomingMessage};

/// Decode the hex-encoded session blob issued by a prior interactive login.
pub fn decode_session(encoded: &str) -> Result<Session, MonitorError> {
    let bytes = hex::decode(encoded.trim()).map_err(|e| {
        MonitorError::Configuration(format!("telegram_session_hash is not valid hex: {}", e))
    })?;
    Session::load(&bytes).map_err(|e| {
        MonitorError::Configuration(format!(
            "telegram_session_hash is not a valid session: {:?}",
            e
        ))
    })
}

/// Telegram user session delivering incoming messages from every chat
pub struct TelegramSource {
    client: Option<Client>,
}

impl TelegramSource {
    /// Open the session and make sure the stored credential is still authorized.
    pub async fn connect(settings: &TelegramSettings) -> Result<Self, MonitorError> {
        let session = decode_session(&settings.session)?;

        info!("Connecting to Telegram (api id {})...", settings.api_id);
        let client = Client::connect(ClientConfig {
            session,
            api_id: settings.api_id,
            api_hash: settings.api_hash.clone(),
            params: InitParams {
                catch_up: false,
                ..Default::default()
            },
        })
        .await
        .map_err(MonitorError::telegram)?;

        let authorized = client
            .is_authorized()
            .await
            .map_err(MonitorError::telegram)?;
        if !authorized {
            return Err(MonitorError::telegram(
                "session credential is not authorized, log in again to issue a new one",
            ));
        }

        debug!("Telegram client started.");
        Ok(Self {
            client: Some(client),
        })
    }
}

#[async_trait]
impl ChatSource for TelegramSource {
    async fn dialogs(&mut self) -> Result<Vec<Dialog>, MonitorError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| MonitorError::telegram("not connected"))?;

        let mut iter = client.iter_dialogs();
        let mut dialogs = Vec::new();
        while let Some(dialog) = iter.next().await.map_err(MonitorError::telegram)? {
            let chat = dialog.chat();
            dialogs.push(Dialog {
                id: chat.id(),
                name: chat.name().to_string(),
            });
        }

        debug!("Fetched {} dialogs", dialogs.len());
        Ok(dialogs)
    }

    async fn next_message(&mut self) -> Result<Option<IncomingMessage>, MonitorError> {
        let Some(client) = self.client.as_ref() else {
            return Ok(None);
        };

        loop {
            let update = client.next_update().await.map_err(MonitorError::telegram)?;
            if let Update::NewMessage(message) = update {
                if message.outgoing() {
                    continue;
                }
                return Ok(Some(IncomingMessage {
                    chat_id: message.chat().id(),
                    text: message.text().to_string(),
                    received_at: Utc::now(),
                }));
            }
        }
    }

    async fn disconnect(&mut self) -> Result<(), MonitorError> {
        // Dropping the last handle closes the connection.
        if self.client.take().is_some() {
            info!("Telegram session closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_session_rejects_bad_hex() {
        let err = decode_session("not-hex").err().unwrap();
        assert!(matches!(err, MonitorError::Configuration(_)));
        assert!(err.to_string().contains("hex"));
    }

    #[tokio::test]
    async fn test_connect_fails_before_network_on_bad_session() {
        let settings = TelegramSettings {
            api_id: 1,
            api_hash: "hash".to_string(),
            session: "zz".to_string(),
        };
        let result = TelegramSource::connect(&settings).await;
        assert!(matches!(result, Err(MonitorError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_disconnected_source_ends_stream() {
        let mut source = TelegramSource { client: None };
        assert!(source.next_message().await.unwrap().is_none());
        assert!(source.disconnect().await.is_ok());
        assert!(source.dialogs().await.is_err());
    }
}
