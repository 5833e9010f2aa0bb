use clap::{Arg, Command};

pub fn build_cli() -> Command {
    Command::new("mqtt_modbus_gateway")
        .version(crate::VERSION)
        .about("MQTT to Modbus TCP gateway for remote register access")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Path to TOML configuration file"),
        )
        .arg(
            Arg::new("workers")
                .short('w')
                .long("workers")
                .value_name("COUNT")
                .help("Override the worker pool size"),
        )
        .arg(
            Arg::new("backend")
                .short('b')
                .long("backend")
                .value_name("KIND")
                .help("Execution backend: modbus (default) or dummy"),
        )
        .subcommand(
            Command::new("generate-config")
                .about("Write a default configuration file and exit")
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .value_name("FILE")
                        .help("Destination path (default: config.toml)"),
                ),
        )
}
