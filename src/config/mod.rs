pub mod settings;

pub use settings::{Config, GatewayConfig, MqttConfig, OverflowPolicy};
