pub mod client;
pub mod tls;
pub mod topic;

pub use client::MqttClient;
