// src/lib.rs
//
// serbridge: RFC 2217 serial to network (TCP/IP) redirector.

pub mod cli;
pub mod io;
pub mod logging;
pub mod redirector;
pub mod server;
pub mod settings;

use anyhow::Context;
use clap::Parser;

use cli::Cli;
use server::Server;
use settings::BridgeConfig;

/// Print the serial ports found on this machine.
fn print_ports(json: bool) -> anyhow::Result<()> {
    let ports = io::serial::list_ports()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&ports)?);
        return Ok(());
    }
    if ports.is_empty() {
        println!("No serial ports found.");
    }
    for port in ports {
        let detail = [port.manufacturer, port.product, port.serial_number]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(", ");
        match (port.vid, port.pid) {
            (Some(vid), Some(pid)) => println!(
                "{:<24} {:<9} {:04x}:{:04x} {}",
                port.port_name, port.port_type, vid, pid, detail
            ),
            _ => println!("{:<24} {}", port.port_name, port.port_type),
        }
    }
    Ok(())
}

pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if cli.list_ports {
        return print_ports(cli.json);
    }

    let config = BridgeConfig::resolve(&cli)?;
    let addr = config.validate()?;
    logging::init(config.verbosity, config.log_dir.as_deref())
        .context("failed to initialise logging")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;

    runtime
        .block_on(Server::new(config).run(addr))
        .with_context(|| format!("failed to serve on {}", addr))
}
