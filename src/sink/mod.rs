pub mod mqtt;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::MonitorError;

/// Message published for every extracted magnitude
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertPayload {
    pub magnitude: String,
    pub complete_message: String,
}

impl AlertPayload {
    pub fn new(magnitude: &str, complete_message: &str) -> Self {
        Self {
            magnitude: magnitude.to_string(),
            complete_message: complete_message.to_string(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, MonitorError> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// A broker session that accepts topic-addressed payloads
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), MonitorError>;

    async fn disconnect(&self) -> Result<(), MonitorError>;
}
