// src/io/serial/native.rs
//
// SerialLine implementation backed by the serialport crate, plus port
// opening and enumeration.

use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::time::Duration;

use super::line::SerialLine;
use super::utils::{self, FlowControl, LineSettings, ModemLines, Parity, Purge, StopBits};
use crate::io::error::IoError;

// ============================================================================
// Types and Configuration
// ============================================================================

/// Serial port configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Device path (e.g., "/dev/ttyUSB0", "COM3")
    pub port: String,
    /// Read timeout in milliseconds. Bounds how long the reader activity can
    /// take to notice a shutdown when the line is idle.
    pub timeout_ms: u64,
    #[serde(flatten)]
    pub line: LineSettings,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            timeout_ms: 3000,
            line: LineSettings::default(),
        }
    }
}

/// Information about an available serial port
#[derive(Clone, Debug, Serialize)]
pub struct SerialPortInfo {
    pub port_name: String,
    pub port_type: String,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
}

// ============================================================================
// Native Serial Line
// ============================================================================

pub struct NativeSerialLine {
    name: String,
    port: Box<dyn serialport::SerialPort>,
}

impl NativeSerialLine {
    fn err(&self, e: impl std::fmt::Display) -> IoError {
        IoError::serial(&self.name, e.to_string())
    }
}

/// Open a serial port with the configured line settings and read timeout.
pub fn open_native(config: &SerialConfig) -> Result<NativeSerialLine, IoError> {
    let line = &config.line;
    let port = serialport::new(&config.port, line.baud_rate)
        .data_bits(utils::to_serialport_data_bits(line.data_bits)?)
        .parity(utils::to_serialport_parity(line.parity)?)
        .stop_bits(utils::to_serialport_stop_bits(line.stop_bits)?)
        .flow_control(utils::to_serialport_flow_control(line.flow_control))
        .timeout(Duration::from_millis(config.timeout_ms))
        .open()
        .map_err(|e| IoError::connection(&config.port, e.to_string()))?;

    tracing::debug!(
        "[serial] Opened {} at {} (timeout {} ms)",
        config.port,
        line.summary(),
        config.timeout_ms
    );

    Ok(NativeSerialLine {
        name: config.port.clone(),
        port,
    })
}

impl SerialLine for NativeSerialLine {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.port.read(buf)
    }

    fn bytes_to_read(&self) -> std::io::Result<u32> {
        Ok(self.port.bytes_to_read()?)
    }

    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.port.write_all(buf)?;
        self.port.flush()
    }

    fn settings(&self) -> Result<LineSettings, IoError> {
        Ok(LineSettings {
            baud_rate: self.port.baud_rate().map_err(|e| self.err(e))?,
            data_bits: utils::from_serialport_data_bits(
                self.port.data_bits().map_err(|e| self.err(e))?,
            ),
            parity: utils::from_serialport_parity(self.port.parity().map_err(|e| self.err(e))?),
            stop_bits: utils::from_serialport_stop_bits(
                self.port.stop_bits().map_err(|e| self.err(e))?,
            ),
            flow_control: utils::from_serialport_flow_control(
                self.port.flow_control().map_err(|e| self.err(e))?,
            ),
        })
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<(), IoError> {
        self.port.set_baud_rate(baud_rate).map_err(|e| self.err(e))
    }

    fn set_data_bits(&mut self, data_bits: u8) -> Result<(), IoError> {
        let bits = utils::to_serialport_data_bits(data_bits)?;
        self.port.set_data_bits(bits).map_err(|e| self.err(e))
    }

    fn set_parity(&mut self, parity: Parity) -> Result<(), IoError> {
        let parity = utils::to_serialport_parity(parity)?;
        self.port.set_parity(parity).map_err(|e| self.err(e))
    }

    fn set_stop_bits(&mut self, stop_bits: StopBits) -> Result<(), IoError> {
        let bits = utils::to_serialport_stop_bits(stop_bits)?;
        self.port.set_stop_bits(bits).map_err(|e| self.err(e))
    }

    fn set_flow_control(&mut self, flow_control: FlowControl) -> Result<(), IoError> {
        self.port
            .set_flow_control(utils::to_serialport_flow_control(flow_control))
            .map_err(|e| self.err(e))
    }

    fn set_rts(&mut self, level: bool) -> Result<(), IoError> {
        self.port
            .write_request_to_send(level)
            .map_err(|e| self.err(e))
    }

    fn set_dtr(&mut self, level: bool) -> Result<(), IoError> {
        self.port
            .write_data_terminal_ready(level)
            .map_err(|e| self.err(e))
    }

    fn set_break(&mut self, on: bool) -> Result<(), IoError> {
        let result = if on {
            self.port.set_break()
        } else {
            self.port.clear_break()
        };
        result.map_err(|e| self.err(e))
    }

    fn modem_lines(&mut self) -> Result<ModemLines, IoError> {
        Ok(ModemLines {
            cts: self.port.read_clear_to_send().map_err(|e| self.err(e))?,
            dsr: self.port.read_data_set_ready().map_err(|e| self.err(e))?,
            ri: self.port.read_ring_indicator().map_err(|e| self.err(e))?,
            cd: self.port.read_carrier_detect().map_err(|e| self.err(e))?,
        })
    }

    fn purge(&mut self, which: Purge) -> Result<(), IoError> {
        self.port
            .clear(utils::to_clear_buffer(which))
            .map_err(|e| self.err(e))
    }

    fn try_clone(&self) -> Result<Box<dyn SerialLine>, IoError> {
        let port = self.port.try_clone().map_err(|e| self.err(e))?;
        Ok(Box::new(NativeSerialLine {
            name: self.name.clone(),
            port,
        }))
    }
}

// ============================================================================
// Port Enumeration
// ============================================================================

/// List available serial ports
///
/// On macOS, filters out /dev/tty.* devices and only shows /dev/cu.* devices.
/// The cu (calling unit) devices are non-blocking and preferred for outgoing connections.
/// The tty (terminal) devices block on open waiting for carrier detect.
pub fn list_ports() -> Result<Vec<SerialPortInfo>, IoError> {
    let ports = serialport::available_ports()
        .map_err(|e| IoError::serial("serial", format!("Failed to enumerate ports: {}", e)))?;

    Ok(ports
        .into_iter()
        .filter(|_p| {
            #[cfg(target_os = "macos")]
            {
                !_p.port_name.starts_with("/dev/tty.")
            }
            #[cfg(not(target_os = "macos"))]
            {
                true
            }
        })
        .map(|p| {
            let (port_type, manufacturer, product, serial_number, vid, pid) = match p.port_type {
                serialport::SerialPortType::UsbPort(info) => (
                    "USB".to_string(),
                    info.manufacturer,
                    info.product,
                    info.serial_number,
                    Some(info.vid),
                    Some(info.pid),
                ),
                serialport::SerialPortType::BluetoothPort => {
                    ("Bluetooth".to_string(), None, None, None, None, None)
                }
                serialport::SerialPortType::PciPort => {
                    ("PCI".to_string(), None, None, None, None, None)
                }
                serialport::SerialPortType::Unknown => {
                    ("Unknown".to_string(), None, None, None, None, None)
                }
            };
            SerialPortInfo {
                port_name: p.port_name,
                port_type,
                manufacturer,
                product,
                serial_number,
                vid,
                pid,
            }
        })
        .collect())
}
