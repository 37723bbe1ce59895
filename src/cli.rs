// src/cli.rs
//
// Command-line surface. Every option is optional so values from the config
// file are only overridden when given on the command line.

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Default, Parser)]
#[command(
    name = "serbridge",
    version,
    about = "RFC 2217 serial to network (TCP/IP) redirector",
    after_help = "\
NOTE: no security measures are implemented. Anyone can remotely connect
to this service over the network.

Only one connection at once is supported. When the connection is terminated
it waits for the next connect.

Examples:
  serbridge /dev/ttyACM0
  serbridge -p 7000 -vv COM3
  serbridge --list-ports --json"
)]
pub struct Cli {
    /// Serial port to serve (e.g. /dev/ttyUSB0, COM3, loop://)
    pub port: Option<String>,

    /// Local TCP port [default: 2217]
    #[arg(short = 'p', long = "localport", value_name = "N")]
    pub local_port: Option<u16>,

    /// Address to listen on [default: 0.0.0.0]
    #[arg(long = "bind", value_name = "ADDR")]
    pub bind_address: Option<String>,

    /// Print more diagnostic messages (can be given multiple times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Initial baud rate of the serial port [default: 9600]
    #[arg(long, value_name = "N")]
    pub baud: Option<u32>,

    /// Serial read timeout in milliseconds [default: 3000]
    #[arg(long, value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Bridge raw bytes without the RFC 2217 control channel
    #[arg(long)]
    pub raw: bool,

    /// Configuration file (TOML)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Also write logs to a timestamped file in this directory
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// List available serial ports and exit
    #[arg(long)]
    pub list_ports: bool,

    /// Print the port list as JSON
    #[arg(long, requires = "list_ports")]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_short_options() {
        let cli = Cli::parse_from(["serbridge", "-p", "7000", "-vvv", "/dev/ttyUSB0"]);
        assert_eq!(cli.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(cli.local_port, Some(7000));
        assert_eq!(cli.verbose, 3);
        assert!(!cli.raw);
    }

    #[test]
    fn test_defaults_are_left_unset() {
        let cli = Cli::parse_from(["serbridge"]);
        assert!(cli.port.is_none());
        assert!(cli.local_port.is_none());
        assert!(cli.baud.is_none());
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn test_json_requires_list_ports() {
        assert!(Cli::try_parse_from(["serbridge", "--json"]).is_err());
        let cli = Cli::parse_from(["serbridge", "--list-ports", "--json"]);
        assert!(cli.list_ports && cli.json);
    }
}
