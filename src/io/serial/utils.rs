// src/io/serial/utils.rs
//
// Line-setting types shared by the serial driver, the RFC 2217 port manager and
// the config file, plus conversions to and from the serialport crate's types.

use serde::{Deserialize, Serialize};
use serialport::{
    ClearBuffer, DataBits as SpDataBits, FlowControl as SpFlowControl, Parity as SpParity,
    StopBits as SpStopBits,
};

use crate::io::error::IoError;

// ============================================================================
// Types
// ============================================================================

/// Parity setting for serial port configuration
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
    Mark,
    Space,
}

/// Stop bit setting. 1.5 stop bits exists on the wire protocol but not in the native driver.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopBits {
    #[default]
    One,
    OnePointFive,
    Two,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowControl {
    #[default]
    None,
    /// XON/XOFF
    Software,
    /// RTS/CTS
    Hardware,
}

/// Complete line configuration of a serial port.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineSettings {
    pub baud_rate: u32,
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
}

impl Default for LineSettings {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            data_bits: 8,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
        }
    }
}

impl LineSettings {
    /// Short form such as "115200 8-N-1"
    pub fn summary(&self) -> String {
        let parity = match self.parity {
            Parity::None => 'N',
            Parity::Odd => 'O',
            Parity::Even => 'E',
            Parity::Mark => 'M',
            Parity::Space => 'S',
        };
        let stop = match self.stop_bits {
            StopBits::One => "1",
            StopBits::OnePointFive => "1.5",
            StopBits::Two => "2",
        };
        format!("{} {}-{}-{}", self.baud_rate, self.data_bits, parity, stop)
    }
}

/// Snapshot of the modem status input lines.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ModemLines {
    pub cts: bool,
    pub dsr: bool,
    pub ri: bool,
    pub cd: bool,
}

/// Which driver buffer to discard
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Purge {
    Receive,
    Transmit,
    Both,
}

// ============================================================================
// Conversion Functions
// ============================================================================

/// Convert our Parity enum to serialport crate's Parity type
pub fn to_serialport_parity(p: Parity) -> Result<SpParity, IoError> {
    match p {
        Parity::None => Ok(SpParity::None),
        Parity::Odd => Ok(SpParity::Odd),
        Parity::Even => Ok(SpParity::Even),
        Parity::Mark | Parity::Space => Err(IoError::configuration(format!(
            "{:?} parity is not supported by the serial driver",
            p
        ))),
    }
}

pub fn from_serialport_parity(p: SpParity) -> Parity {
    match p {
        SpParity::None => Parity::None,
        SpParity::Odd => Parity::Odd,
        SpParity::Even => Parity::Even,
    }
}

/// Convert data bits count to serialport crate's DataBits type
pub fn to_serialport_data_bits(bits: u8) -> Result<SpDataBits, IoError> {
    match bits {
        5 => Ok(SpDataBits::Five),
        6 => Ok(SpDataBits::Six),
        7 => Ok(SpDataBits::Seven),
        8 => Ok(SpDataBits::Eight),
        _ => Err(IoError::configuration(format!(
            "{} data bits is not supported (expected 5-8)",
            bits
        ))),
    }
}

pub fn from_serialport_data_bits(bits: SpDataBits) -> u8 {
    match bits {
        SpDataBits::Five => 5,
        SpDataBits::Six => 6,
        SpDataBits::Seven => 7,
        SpDataBits::Eight => 8,
    }
}

/// Convert our StopBits enum to serialport crate's StopBits type
pub fn to_serialport_stop_bits(bits: StopBits) -> Result<SpStopBits, IoError> {
    match bits {
        StopBits::One => Ok(SpStopBits::One),
        StopBits::Two => Ok(SpStopBits::Two),
        StopBits::OnePointFive => Err(IoError::configuration(
            "1.5 stop bits is not supported by the serial driver",
        )),
    }
}

pub fn from_serialport_stop_bits(bits: SpStopBits) -> StopBits {
    match bits {
        SpStopBits::One => StopBits::One,
        SpStopBits::Two => StopBits::Two,
    }
}

pub fn to_serialport_flow_control(flow: FlowControl) -> SpFlowControl {
    match flow {
        FlowControl::None => SpFlowControl::None,
        FlowControl::Software => SpFlowControl::Software,
        FlowControl::Hardware => SpFlowControl::Hardware,
    }
}

pub fn from_serialport_flow_control(flow: SpFlowControl) -> FlowControl {
    match flow {
        SpFlowControl::None => FlowControl::None,
        SpFlowControl::Software => FlowControl::Software,
        SpFlowControl::Hardware => FlowControl::Hardware,
    }
}

pub fn to_clear_buffer(purge: Purge) -> ClearBuffer {
    match purge {
        Purge::Receive => ClearBuffer::Input,
        Purge::Transmit => ClearBuffer::Output,
        Purge::Both => ClearBuffer::All,
    }
}

// ============================================================================
// Tests
// ============================================================================
