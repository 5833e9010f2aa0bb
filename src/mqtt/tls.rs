//! TLS material loading for ssl:// broker connections.

use std::fs;

use rumqttc::{TlsConfiguration, Transport};

use crate::config::MqttConfig;
use crate::utils::error::GatewayError;

fn read_pem(path: &str, what: &str) -> Result<Vec<u8>, GatewayError> {
    fs::read(path)
        .map_err(|e| GatewayError::TlsError(format!("failed to read {} {}: {}", what, path, e)))
}

/// Builds the TLS transport from the configured certificate paths.
///
/// The CA bundle is required; a client certificate and key are optional and
/// must come as a pair (enforced by `Config::validate`).
pub fn transport(config: &MqttConfig) -> Result<Transport, GatewayError> {
    let ca = match &config.ca_cert_path {
        Some(path) => read_pem(path, "CA certificate")?,
        None => {
            return Err(GatewayError::TlsError(
                "ca_cert_path is required for ssl:// brokers".to_string(),
            ))
        }
    };

    let client_auth = match (&config.cert_path, &config.key_path) {
        (Some(cert), Some(key)) => Some((
            read_pem(cert, "client certificate")?,
            read_pem(key, "client key")?,
        )),
        _ => None,
    };

    Ok(Transport::Tls(TlsConfiguration::Simple {
        ca,
        alpn: None,
        client_auth,
    }))
}
