use std::sync::Arc;

use anyhow::{bail, Result};
use log::info;

use mqtt_modbus_gateway::backend::{DummyBackend, ExecutionBackend, ModbusBackend};
use mqtt_modbus_gateway::cli;
use mqtt_modbus_gateway::config::Config;
use mqtt_modbus_gateway::gateway::Gateway;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = cli::build_cli().get_matches();

    if let Some(sub) = matches.subcommand_matches("generate-config") {
        let path = sub
            .get_one::<String>("output")
            .map(String::as_str)
            .unwrap_or("config.toml");
        Config::default().save_to_file(path)?;
        println!("Wrote default configuration to {}", path);
        return Ok(());
    }

    let config = Config::from_matches(&matches)?;
    config.validate()?;

    let backend: Arc<dyn ExecutionBackend> = match matches
        .get_one::<String>("backend")
        .map(String::as_str)
        .unwrap_or("modbus")
    {
        "modbus" => Arc::new(ModbusBackend::new()),
        "dummy" => {
            info!("🔧 Using dummy backend, no device traffic will be generated");
            Arc::new(DummyBackend::default())
        }
        other => bail!("unknown backend {:?}, expected modbus or dummy", other),
    };

    info!(
        "🚀 Starting MQTT Modbus gateway v{}...",
        mqtt_modbus_gateway::VERSION
    );
    let mut gateway = Gateway::start(config, backend)?;

    info!("Gateway is running. Waiting for messages...");
    tokio::signal::ctrl_c().await?;
    info!("Received termination signal. Shutting down...");

    gateway.stop().await;
    info!("Gateway stopped gracefully.");
    Ok(())
}
