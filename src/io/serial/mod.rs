// src/io/serial/mod.rs
//
// Serial port driver.
//
// Provides the SerialLine abstraction used by the redirector, the serialport
// backed implementation, an in-memory line (loop:// and tests), and the
// line-setting types shared with the RFC 2217 port manager.

mod line;
mod memory;
mod native;
pub(crate) mod utils;

use std::time::Duration;

use crate::io::error::IoError;

pub use line::SerialLine;
pub use memory::{MemorySerialLine, LOOPBACK_URL};
pub use native::{list_ports, open_native, NativeSerialLine, SerialConfig, SerialPortInfo};
pub use utils::{FlowControl, LineSettings, ModemLines, Parity, Purge, StopBits};

/// Open the configured port. `loop://` opens an in-memory loopback line.
pub fn open_serial(config: &SerialConfig) -> Result<Box<dyn SerialLine>, IoError> {
    if config.port.is_empty() {
        return Err(IoError::configuration("no serial port given"));
    }
    if config.port == LOOPBACK_URL {
        let mut line = MemorySerialLine::loopback(Duration::from_millis(config.timeout_ms));
        line.apply_settings(&config.line)?;
        return Ok(Box::new(line));
    }
    Ok(Box::new(open_native(config)?))
}
