//! MQTT to Modbus TCP Gateway Library
//!
//! This library bridges MQTT request/response topics to Modbus TCP devices:
//! ASCII register commands arrive on a wildcard subscription, are parsed and
//! validated, dispatched concurrently against a pluggable execution backend,
//! and the correlated response is published back on a per-device topic.

pub mod backend;
pub mod cli;
pub mod config;
pub mod gateway;
pub mod mqtt;
pub mod protocol;
pub mod utils;

// Re-export commonly used types
pub use backend::{DummyBackend, ExecutionBackend, ModbusBackend};
pub use config::{Config, OverflowPolicy};
pub use gateway::{Gateway, InboundMessage, RequestCounter, ResponsePublisher};
pub use mqtt::MqttClient;
pub use protocol::OperationRequest;
pub use utils::error::GatewayError;

pub const VERSION: &str = "0.1.0";
