use clap::ArgMatches;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::mqtt::topic;
use crate::utils::error::GatewayError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub mqtt: MqttConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    pub broker: String,                 // Broker URL, tcp:// or ssl://
    pub client_id: String,              // MQTT client ID
    #[serde(default)]
    pub username: String,               // MQTT username
    #[serde(default)]
    pub password: String,               // MQTT password
    pub request_topic: String,          // Placeholder format for request topics
    pub response_topic: String,         // Placeholder format for response topics
    #[serde(default)]
    pub ca_cert_path: Option<String>,   // Path to CA certificate
    #[serde(default)]
    pub cert_path: Option<String>,      // Path to client certificate
    #[serde(default)]
    pub key_path: Option<String>,       // Path to client key
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub workers: usize,                 // Worker pool size
    pub queue_depth_per_worker: usize,  // Queue capacity = workers * depth
    pub overflow_policy: OverflowPolicy,
    pub counter_interval_seconds: u64,  // Throughput logging period
    pub drain_timeout_seconds: u64,     // Hard deadline for shutdown drain
}

/// What the enqueue path does when the bounded queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Block the subscription callback until a worker frees a slot. This is
    /// backpressure onto the broker and can stall upstream delivery.
    Block,
    /// Answer immediately with a queue-full error response and drop.
    Reject,
    /// Evict the oldest queued message to make room.
    DropOldest,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_depth_per_worker: 10,
            overflow_policy: OverflowPolicy::Block,
            counter_interval_seconds: 60,
            drain_timeout_seconds: 30,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mqtt: MqttConfig {
                broker: "tcp://localhost:1883".to_string(),
                client_id: "mqtt-modbus-gateway".to_string(),
                username: String::new(),
                password: String::new(),
                request_topic: "modbus/{device}/request".to_string(),
                response_topic: "modbus/{device}/response".to_string(),
                ca_cert_path: None,
                cert_path: None,
                key_path: None,
            },
            gateway: GatewayConfig::default(),
        }
    }
}

impl Config {
    pub fn from_matches(matches: &ArgMatches) -> Result<Self, GatewayError> {
        let mut config = match matches.get_one::<String>("config") {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        if let Some(workers) = matches.get_one::<String>("workers") {
            config.gateway.workers = workers
                .parse()
                .map_err(|_| GatewayError::ConfigError("workers must be a number".to_string()))?;
        }

        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, GatewayError> {
        let content = std::fs::read_to_string(&path).map_err(|e| {
            GatewayError::ConfigError(format!(
                "unable to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), GatewayError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| GatewayError::ConfigError(format!("unable to create {}: {}", parent.display(), e)))?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| GatewayError::ConfigError(format!("TOML error: {}", e)))?;
        std::fs::write(&path, content).map_err(|e| {
            GatewayError::ConfigError(format!(
                "unable to write config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Ok(())
    }

    /// Checks required fields and logical consistency. The gateway never
    /// starts on a config that fails here.
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.mqtt.broker.is_empty() {
            return Err(GatewayError::ConfigError(
                "mqtt.broker must be specified".to_string(),
            ));
        }
        if self.mqtt.client_id.is_empty() {
            return Err(GatewayError::ConfigError(
                "mqtt.client_id must be specified".to_string(),
            ));
        }
        if self.mqtt.request_topic.is_empty() {
            return Err(GatewayError::ConfigError(
                "mqtt.request_topic must be specified".to_string(),
            ));
        }
        if self.mqtt.response_topic.is_empty() {
            return Err(GatewayError::ConfigError(
                "mqtt.response_topic must be specified".to_string(),
            ));
        }

        // Response correlation reuses the placeholder values captured from
        // the request topic, so the two formats must name the same set.
        let request_names = topic::placeholder_names(&self.mqtt.request_topic);
        let response_names = topic::placeholder_names(&self.mqtt.response_topic);
        if request_names != response_names {
            return Err(GatewayError::ConfigError(format!(
                "request_topic placeholders {:?} do not match response_topic placeholders {:?}",
                request_names, response_names
            )));
        }

        if self.gateway.workers == 0 {
            return Err(GatewayError::ConfigError(
                "gateway.workers must be greater than zero".to_string(),
            ));
        }
        if self.gateway.queue_depth_per_worker == 0 {
            return Err(GatewayError::ConfigError(
                "gateway.queue_depth_per_worker must be greater than zero".to_string(),
            ));
        }

        match (&self.mqtt.cert_path, &self.mqtt.key_path) {
            (Some(_), None) | (None, Some(_)) => Err(GatewayError::ConfigError(
                "cert_path and key_path must be configured together".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Total capacity of the inbound message queue.
    pub fn queue_capacity(&self) -> usize {
        self.gateway.workers * self.gateway.queue_depth_per_worker
    }
}
