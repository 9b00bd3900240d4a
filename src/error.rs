use thiserror::Error;

/// Failures surfaced by the monitor and its collaborators
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Connection to {service} failed: {reason}")]
    Connection {
        service: &'static str,
        reason: String,
    },

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MonitorError {
    pub fn telegram(reason: impl std::fmt::Display) -> Self {
        MonitorError::Connection {
            service: "telegram",
            reason: reason.to_string(),
        }
    }

    pub fn mqtt(reason: impl std::fmt::Display) -> Self {
        MonitorError::Connection {
            service: "mqtt",
            reason: reason.to_string(),
        }
    }
}
