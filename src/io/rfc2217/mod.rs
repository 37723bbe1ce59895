// src/io/rfc2217/mod.rs
//
// RFC 2217 (Telnet COM-PORT-OPTION) support for the server side of a
// redirected serial port.

mod manager;
mod options;
pub mod protocol;

pub use manager::{escape_iac, PortManager};
pub use options::{Negotiation, OptionState, TelnetOption};
