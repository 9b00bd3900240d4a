use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::error::MonitorError;
use crate::magnitude::{DEFAULT_TRIGGER_WORD, MAX_WORD_DISTANCE};
use crate::rate_limit::DEFAULT_INTERVAL_SECS;

pub const DEFAULT_CONFIG_PATH: &str = "/data/options.json";

/// Options file contents. Keys are flat, matching the add-on options layout.
#[derive(Deserialize, Clone)]
pub struct Config {
    #[serde(deserialize_with = "deserialize_api_id")]
    pub telegram_api_id: i32,
    pub telegram_api_hash: String,
    pub telegram_session_hash: String,
    pub chat_names: Vec<String>,

    pub mqtt_server: String,
    pub mqtt_port: u16,
    #[serde(default = "default_mqtt_topic")]
    pub mqtt_topic: String,
    #[serde(default)]
    pub mqtt_username: Option<String>,
    #[serde(default)]
    pub mqtt_password: Option<String>,
    #[serde(default)]
    pub mqtt_client_id: Option<String>,
    #[serde(default = "default_keep_alive_secs")]
    pub mqtt_keep_alive_secs: u64,

    #[serde(default = "default_alert_interval_secs")]
    pub alert_interval_secs: u64,
    #[serde(default = "default_trigger_word")]
    pub trigger_word: String,
    #[serde(default = "default_max_word_distance")]
    pub max_word_distance: usize,

    #[serde(default)]
    pub debug: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

/// Settings needed to open the Telegram user session
#[derive(Clone)]
pub struct TelegramSettings {
    pub api_id: i32,
    pub api_hash: String,
    pub session: String,
}

/// Settings needed to open the MQTT session
#[derive(Clone)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub client_id: Option<String>,
    pub credentials: Option<(String, String)>,
    pub keep_alive: Duration,
}

fn default_mqtt_topic() -> String {
    "infp/eq_alert".to_string()
}

fn default_keep_alive_secs() -> u64 {
    30
}

fn default_alert_interval_secs() -> u64 {
    DEFAULT_INTERVAL_SECS
}

fn default_trigger_word() -> String {
    DEFAULT_TRIGGER_WORD.to_string()
}

fn default_max_word_distance() -> usize {
    MAX_WORD_DISTANCE
}

fn default_log_dir() -> PathBuf {
    PathBuf::from(".")
}

/// Accepts the api id either as a number or as a numeric string.
fn deserialize_api_id<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ApiId {
        Number(i64),
        Text(String),
    }

    let raw = match ApiId::deserialize(deserializer)? {
        ApiId::Number(n) => n,
        ApiId::Text(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| serde::de::Error::custom(format!("api id '{}' is not a number", s)))?,
    };
    i32::try_from(raw).map_err(|_| serde::de::Error::custom(format!("api id {} out of range", raw)))
}

impl Config {
    /// Read and validate the options file. `.toml` files are parsed as TOML,
    /// everything else as JSON.
    pub fn load(path: &Path) -> Result<Self, MonitorError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MonitorError::Configuration(format!(
                "failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        let config = if is_toml {
            Self::from_toml(&content)?
        } else {
            Self::from_json(&content)?
        };

        config.validate()?;
        Ok(config)
    }

    pub fn from_json(content: &str) -> Result<Self, MonitorError> {
        serde_json::from_str(content)
            .map_err(|e| MonitorError::Configuration(format!("failed to parse JSON options: {}", e)))
    }

    pub fn from_toml(content: &str) -> Result<Self, MonitorError> {
        toml::from_str(content)
            .map_err(|e| MonitorError::Configuration(format!("failed to parse TOML options: {}", e)))
    }

    /// Check every constraint that can be checked before connecting.
    pub fn validate(&self) -> Result<(), MonitorError> {
        fn require(ok: bool, message: &str) -> Result<(), MonitorError> {
            if ok {
                Ok(())
            } else {
                Err(MonitorError::Configuration(message.to_string()))
            }
        }

        require(
            !self.telegram_api_hash.trim().is_empty(),
            "telegram_api_hash must not be empty",
        )?;
        require(
            !self.telegram_session_hash.trim().is_empty(),
            "telegram_session_hash must not be empty",
        )?;
        require(
            hex::decode(self.telegram_session_hash.trim()).is_ok(),
            "telegram_session_hash must be hex-encoded",
        )?;
        require(!self.chat_names.is_empty(), "chat_names must not be empty")?;
        require(
            self.chat_names.iter().all(|name| !name.trim().is_empty()),
            "chat_names must not contain blank names",
        )?;
        require(
            !self.mqtt_server.trim().is_empty(),
            "mqtt_server must not be empty",
        )?;
        require(
            self.mqtt_port != 0,
            "mqtt_port must be between 1 and 65535",
        )?;
        require(
            self.mqtt_keep_alive_secs >= 1,
            "mqtt_keep_alive_secs must be at least 1",
        )?;
        require(!self.mqtt_topic.is_empty(), "mqtt_topic must not be empty")?;
        require(
            !self.mqtt_topic.contains(['+', '#']),
            "mqtt_topic must not contain wildcards",
        )?;
        require(
            self.mqtt_username.is_some() == self.mqtt_password.is_some(),
            "mqtt_username and mqtt_password must be set together",
        )?;
        require(
            !self.trigger_word.trim().is_empty(),
            "trigger_word must not be empty",
        )?;
        require(
            self.max_word_distance >= 1,
            "max_word_distance must be at least 1",
        )?;

        Ok(())
    }

    pub fn telegram(&self) -> TelegramSettings {
        TelegramSettings {
            api_id: self.telegram_api_id,
            api_hash: self.telegram_api_hash.clone(),
            session: self.telegram_session_hash.clone(),
        }
    }

    /// Broker settings
    pub fn mqtt(&self) -> MqttSettings {
        let credentials = match (&self.mqtt_username, &self.mqtt_password) {
            (Some(user), Some(pass)) => Some((user.clone(), pass.clone())),
            _ => None,
        };
        MqttSettings {
            host: self.mqtt_server.clone(),
            port: self.mqtt_port,
            client_id: self.mqtt_client_id.clone(),
            credentials,
            keep_alive: Duration::from_secs(self.mqtt_keep_alive_secs),
        }
    }

    pub fn alert_interval(&self) -> Duration {
        Duration::from_secs(self.alert_interval_secs)
    }
}

const REDACTED: &str = "<redacted>";

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("telegram_api_id", &self.telegram_api_id)
            .field("telegram_api_hash", &REDACTED)
            .field("telegram_session_hash", &REDACTED)
            .field("chat_names", &self.chat_names)
            .field("mqtt_server", &self.mqtt_server)
            .field("mqtt_port", &self.mqtt_port)
            .field("mqtt_topic", &self.mqtt_topic)
            .field("mqtt_username", &self.mqtt_username)
            .field("mqtt_password", &self.mqtt_password.as_ref().map(|_| REDACTED))
            .field("mqtt_client_id", &self.mqtt_client_id)
            .field("alert_interval_secs", &self.alert_interval_secs)
            .field("trigger_word", &self.trigger_word)
            .field("max_word_distance", &self.max_word_distance)
            .field("debug", &self.debug)
            .field("log_dir", &self.log_dir)
            .finish()
    }
}

impl fmt::Debug for TelegramSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramSettings")
            .field("api_id", &self.api_id)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for MqttSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MqttSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("client_id", &self.client_id)
            .field("username", &self.credentials.as_ref().map(|(user, _)| user))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"{
        "telegram_api_id": 12345,
        "telegram_api_hash": "abcdef",
        "telegram_session_hash": "0a0b0c",
        "chat_names": ["INGV terremoti"],
        "mqtt_server": "broker.local",
        "mqtt_port": 1883
    }"#;

    fn minimal() -> Config {
        Config::from_json(MINIMAL).unwrap()
    }

    #[test]
    fn test_defaults_applied() {
        let config = minimal();
        assert_eq!(config.mqtt_topic, "infp/eq_alert");
        assert_eq!(config.alert_interval_secs, 120);
        assert_eq!(config.trigger_word, "magnitudine");
        assert_eq!(config.max_word_distance, 3);
        assert!(!config.debug);
        assert!(config.mqtt_username.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_api_id_as_string() {
        let json = MINIMAL.replace("12345", r#""12345""#);
        let config = Config::from_json(&json).unwrap();
        assert_eq!(config.telegram_api_id, 12345);
    }

    #[test]
    fn test_api_id_not_numeric() {
        let json = MINIMAL.replace("12345", r#""abc""#);
        assert!(matches!(
            Config::from_json(&json),
            Err(MonitorError::Configuration(_))
        ));
    }

    #[test]
    fn test_missing_required_key() {
        let json = MINIMAL.replace(r#""mqtt_server": "broker.local","#, "");
        let err = Config::from_json(&json).unwrap_err();
        assert!(err.to_string().contains("mqtt_server"));
    }

    #[test]
    fn test_empty_chat_names_rejected() {
        let mut config = minimal();
        config.chat_names.clear();
        assert!(matches!(
            config.validate(),
            Err(MonitorError::Configuration(_))
        ));
    }

    #[test]
    fn test_port_range() {
        let mut config = minimal();
        config.mqtt_port = 0;
        assert!(config.validate().is_err());
        config.mqtt_port = 8883;
        assert!(config.validate().is_ok());
        assert_eq!(config.mqtt().port, 8883);
    }

    #[test]
    fn test_port_above_range_rejected_on_parse() {
        let json = MINIMAL.replace("1883", "70000");
        assert!(matches!(
            Config::from_json(&json),
            Err(MonitorError::Configuration(_))
        ));
    }

    #[test]
    fn test_topic_wildcards_rejected() {
        let mut config = minimal();
        config.mqtt_topic = "alerts/#".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_credentials_must_be_paired() {
        let mut config = minimal();
        config.mqtt_username = Some("user".to_string());
        assert!(config.validate().is_err());

        config.mqtt_password = Some("secret".to_string());
        assert!(config.validate().is_ok());
        assert_eq!(
            config.mqtt().credentials,
            Some(("user".to_string(), "secret".to_string()))
        );
    }

    #[test]
    fn test_debug_output_redacts_secrets() {
        let mut config = minimal();
        config.mqtt_password = Some("hunter2".to_string());
        let printed = format!("{:?}", config);
        assert!(!printed.contains("abcdef"));
        assert!(!printed.contains("0a0b0c"));
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("broker.local"));
    }

    #[test]
    fn test_load_json_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.chat_names, vec!["INGV terremoti".to_string()]);
    }

    #[test]
    fn test_load_toml_file() {
        let toml = r#"
            telegram_api_id = 12345
            telegram_api_hash = "abcdef"
            telegram_session_hash = "0a0b0c"
            chat_names = ["INGV terremoti", "Protezione Civile"]
            mqtt_server = "broker.local"
            mqtt_port = 1883
            mqtt_topic = "home/eq"
            debug = true
        "#;
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(toml.as_bytes()).unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.chat_names.len(), 2);
        assert_eq!(config.mqtt_topic, "home/eq");
        assert!(config.debug);
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load(Path::new("/nonexistent/options.json")).unwrap_err();
        assert!(matches!(err, MonitorError::Configuration(_)));
    }
}
